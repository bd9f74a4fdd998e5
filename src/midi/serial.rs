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

//! Raw MIDI byte framing for a UART connection (e.g. the Raspberry Pi's
//! `/dev/serial0`, underclocked to the MIDI baud rate of 31250 outside this
//! program's control). Reads one byte at a time and resyncs on any byte
//! with the status bit set, exactly like a real MIDI receiver must.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, info};

use crate::dispatcher::Dispatcher;
use crate::error::SamplerError;

const PROGRAM_CHANGE: u8 = 0xC;

/// Reads framed 3-byte MIDI messages from `source`, dispatching each one.
/// Runs until the source returns an error or EOF.
pub fn read_messages<R: Read>(mut source: R, dispatcher: &Dispatcher) -> Result<(), SamplerError> {
    let mut message = [0u8; 3];
    let mut byte = [0u8; 1];

    loop {
        let mut i = 0usize;
        let mut len = message.len();
        while i < message.len() {
            source.read_exact(&mut byte)?;
            let data = byte[0];

            if data & 0x80 != 0 {
                if i != 0 {
                    let err = SamplerError::MidiByteFramingError(format!(
                        "stray status byte 0x{data:02x} at offset {i}, resyncing"
                    ));
                    debug!(%err);
                }
                i = 0;
            }
            message[i] = data;

            let is_program_change =
                i == 1 && (message[0] >> 4) == PROGRAM_CHANGE;
            if is_program_change {
                message[2] = 0;
                len = 2;
                break;
            }

            i += 1;
        }

        dispatcher.handle_message(&message[..len]);
    }
}

/// Opens the given UART device path and spawns a background thread that
/// reads framed MIDI messages from it for the lifetime of the process.
pub fn watch(path: &Path, dispatcher: Arc<Dispatcher>) -> Result<(), SamplerError> {
    let file = std::fs::File::open(path)?;
    let path = path.to_path_buf();
    info!(path = %path.display(), "watching serial MIDI port");

    thread::spawn(move || {
        if let Err(e) = read_messages(file, &dispatcher) {
            error!(path = %path.display(), error = %e, "serial MIDI reader stopped");
        }
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn dispatcher_with_channel() -> Arc<Dispatcher> {
        let (engine, _mixer) = crate::engine::Engine::new(1, PathBuf::from("."), 32);
        Arc::new(Dispatcher::new(Arc::new(engine)))
    }

    #[test]
    fn frames_a_three_byte_note_on_message() {
        let dispatcher = dispatcher_with_channel();
        let bytes: &[u8] = &[0x90, 60, 100];
        read_messages(bytes, &dispatcher).unwrap_err(); // EOF after one message
    }

    #[test]
    fn program_change_dispatches_after_two_bytes() {
        let dispatcher = dispatcher_with_channel();
        // Status + one data byte, then a new status byte starts the next
        // message: the reader should have synthesized data2=0 and moved on
        // without blocking on a third byte for the program change.
        let bytes: &[u8] = &[0xC0, 5, 0x90, 60, 100];
        let _ = read_messages(bytes, &dispatcher);
    }

    #[test]
    fn resyncs_on_stray_status_byte_mid_message() {
        let dispatcher = dispatcher_with_channel();
        // A stray status byte arrives as what would have been data2; the
        // reader must restart framing from it rather than treating it as data.
        let bytes: &[u8] = &[0x90, 60, 0x80, 60, 0];
        let _ = read_messages(bytes, &dispatcher);
    }
}
