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

//! GPIO preset up/down buttons, polled the same way the reference
//! implementation does (read, debounce, load the new preset). None of this
//! crate's dependency stack speaks GPIO, so this talks to the kernel's
//! sysfs GPIO interface directly through plain files, the same approach
//! `midi::serial` takes for the UART device.

use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::engine::Engine;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const DEBOUNCE: Duration = Duration::from_millis(200);

/// A single GPIO input line, exported and configured with a pull-up so an
/// unpressed button reads high and a press pulls it low.
struct GpioInput {
    value_path: PathBuf,
}

impl GpioInput {
    fn open(pin: u32) -> Result<GpioInput, std::io::Error> {
        let gpio_root = PathBuf::from("/sys/class/gpio");
        let pin_dir = gpio_root.join(format!("gpio{}", pin));

        if !pin_dir.exists() {
            fs::write(gpio_root.join("export"), pin.to_string())?;
        }
        fs::write(pin_dir.join("direction"), "in")?;

        Ok(GpioInput {
            value_path: pin_dir.join("value"),
        })
    }

    /// Reads the current line level. `true` means high (button released,
    /// given the pull-up wiring the reference implementation assumes).
    fn is_high(&self) -> Result<bool, std::io::Error> {
        let mut file = fs::File::open(&self.value_path)?;
        let mut buf = [0u8; 1];
        file.read_exact(&mut buf)?;
        let _ = file.seek(SeekFrom::Start(0));
        Ok(buf[0] == b'1')
    }
}

/// Polls the preset up/down buttons on `prev_pin`/`next_pin` for the
/// lifetime of the process, debouncing presses exactly like the reference
/// implementation's `HandleButtons` loop, and requesting a preset load on
/// `engine`'s active channel when a press is detected.
pub fn watch(engine: Arc<Engine>, prev_pin: u32, next_pin: u32, max_presets: u8) {
    let prev = match GpioInput::open(prev_pin) {
        Ok(gpio) => gpio,
        Err(e) => {
            warn!(pin = prev_pin, error = %e, "could not open prev-preset GPIO input, buttons disabled");
            return;
        }
    };
    let next = match GpioInput::open(next_pin) {
        Ok(gpio) => gpio,
        Err(e) => {
            warn!(pin = next_pin, error = %e, "could not open next-preset GPIO input, buttons disabled");
            return;
        }
    };

    info!(prev_pin, next_pin, "watching preset buttons");

    thread::spawn(move || {
        let mut last_press = Instant::now() - DEBOUNCE;

        loop {
            let debouncing = last_press.elapsed() < DEBOUNCE;

            if !debouncing {
                match (prev.is_high(), next.is_high()) {
                    (Ok(false), _) => {
                        last_press = Instant::now();
                        step_preset(&engine, -1, max_presets);
                    }
                    (_, Ok(false)) => {
                        last_press = Instant::now();
                        step_preset(&engine, 1, max_presets);
                    }
                    _ => {}
                }
            }

            thread::sleep(POLL_INTERVAL);
        }
    });
}

fn step_preset(engine: &Arc<Engine>, delta: i32, max_presets: u8) {
    let channel = engine.active_channel();
    let current = engine.channel_preset(channel).unwrap_or(0) as i32;
    let next = (current + delta).rem_euclid(max_presets as i32 + 1) as u8;
    engine.request_load(channel, next);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_preset_wraps_forward_past_max() {
        let root = std::path::PathBuf::from(".");
        let (engine, _mixer) = Engine::new(1, root, 32);
        let engine = Arc::new(engine);
        // No on-disk preset, so request_load will simply leave the channel
        // empty; this test only exercises the wraparound arithmetic by
        // checking the engine does not panic on an out-of-range step.
        step_preset(&engine, 1, 9);
        step_preset(&engine, -1, 9);
    }
}
