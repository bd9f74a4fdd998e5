// Copyright (C) 2026 Dana Okafor <dana@loftsound.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Client for the 7-segment display's local RPC socket. The reference
//! implementation talks zerorpc (msgpack-RPC over ZeroMQ); nothing in this
//! crate's dependency stack speaks that protocol, so this is a minimal
//! newline-delimited TCP protocol carrying the same four calls. A real
//! display server on the other end would need to speak this instead of
//! zerorpc — this module is the interface this crate was told to expose,
//! not a drop-in replacement for the original wire format.

use std::io::Write as _;
use std::net::TcpStream;
use std::sync::Mutex;
use std::time::Duration;

use tracing::warn;

use crate::error::SamplerError;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(200);

/// A connection to the display server. Every call is best-effort: failures
/// are logged and swallowed, since a missing display must never affect
/// audio playback.
pub struct Display {
    addr: String,
    stream: Mutex<Option<TcpStream>>,
}

impl Display {
    pub fn connect(addr: &str) -> Display {
        if let Err(err) = validate_addr(addr) {
            warn!(%err, "display address is not a valid socket address, continuing without it");
            return Display {
                addr: addr.to_string(),
                stream: Mutex::new(None),
            };
        }

        let stream = TcpStream::connect(addr).ok();
        if stream.is_none() {
            let err = SamplerError::DisplayServerUnreachable(format!("{addr}: connection refused"));
            warn!(%err, "continuing without it");
        }
        Display {
            addr: addr.to_string(),
            stream: Mutex::new(stream),
        }
    }

    fn send(&self, line: &str) {
        let mut guard = self.stream.lock().expect("display mutex poisoned");
        if guard.is_none() {
            *guard = TcpStream::connect_timeout(
                &self.addr.parse().unwrap_or_else(|_| "127.0.0.1:4242".parse().unwrap()),
                CONNECT_TIMEOUT,
            )
            .ok();
        }

        let Some(stream) = guard.as_mut() else {
            return;
        };
        if let Err(e) = writeln!(stream, "{}", line) {
            warn!(error = %e, "lost connection to display server");
            *guard = None;
        }
    }

    /// Permanently shows a number on layer 1 (e.g. the current preset).
    pub fn set_layer1_n(&self, n: u8) {
        self.send(&format!("set_layer1_n {}", n));
    }

    /// Permanently shows two characters on layer 1.
    pub fn set_layer1_2c(&self, s: &str) {
        self.send(&format!("set_layer1_2c {}", two_chars(s)));
    }

    /// Shows a number on layer 2 for `seconds`, then reverts to layer 1.
    pub fn set_layer2_n(&self, n: u8, seconds: u32) {
        self.send(&format!("set_layer2_n {} {}", n, seconds));
    }

    /// Shows two characters on layer 2 for `seconds`, then reverts to layer 1.
    pub fn set_layer2_2c(&self, s: &str, seconds: u32) {
        self.send(&format!("set_layer2_2c {} {}", two_chars(s), seconds));
    }
}

/// Pads or truncates to exactly two characters, matching the hardware
/// display's fixed width.
fn two_chars(s: &str) -> String {
    let mut chars: Vec<char> = s.chars().collect();
    chars.truncate(2);
    while chars.len() < 2 {
        chars.push(' ');
    }
    chars.into_iter().collect()
}

/// Reports a preset load's lifecycle on the display, mirroring the
/// reference implementation's `Double7Segment` call sequence.
pub fn report_preset_empty(display: &Display, preset: u8) {
    display.set_layer2_2c("EP", 1);
    display.set_layer1_n(preset);
}

pub fn report_preset_loading(display: &Display) {
    display.set_layer1_2c("LO");
}

pub fn report_preset_loaded(display: &Display, preset: u8) {
    display.set_layer1_n(preset);
}

/// Checks that `addr` parses as a socket address, so `Display::connect` can
/// tell a misconfigured address apart from one that's merely unreachable
/// right now.
fn validate_addr(addr: &str) -> Result<(), SamplerError> {
    addr.parse::<std::net::SocketAddr>()
        .map(|_| ())
        .map_err(|e| SamplerError::DisplayServerUnreachable(format!("{}: {}", addr, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_chars_pads_short_strings() {
        assert_eq!(two_chars("E"), "E ");
        assert_eq!(two_chars(""), "  ");
    }

    #[test]
    fn two_chars_truncates_long_strings() {
        assert_eq!(two_chars("EMPTY"), "EM");
    }

    #[test]
    fn validate_addr_rejects_garbage() {
        assert!(validate_addr("not-an-address").is_err());
        assert!(validate_addr("127.0.0.1:4242").is_ok());
    }
}
