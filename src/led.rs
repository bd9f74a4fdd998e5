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

//! Drives the board's heartbeat LED trigger, so a glance at the hardware
//! confirms the process is alive. Same sysfs trigger file the reference
//! implementation writes, after loading the `ledtrig_heartbeat` module.

use std::fs;
use std::path::Path;
use std::process::Command;

use tracing::warn;

const DEFAULT_TRIGGER_PATH: &str = "/sys/class/leds/led0/trigger";

/// Loads the heartbeat LED trigger kernel module and assigns it to the
/// board's status LED. Failures are logged and otherwise ignored: a dead
/// status LED must never stop the sampler from running.
pub fn enable_heartbeat() {
    enable_heartbeat_at(Path::new(DEFAULT_TRIGGER_PATH));
}

fn enable_heartbeat_at(trigger_path: &Path) {
    if let Err(e) = Command::new("modprobe").arg("ledtrig_heartbeat").status() {
        warn!(error = %e, "failed to load ledtrig_heartbeat module");
        return;
    }

    if let Err(e) = fs::write(trigger_path, "heartbeat") {
        warn!(path = %trigger_path.display(), error = %e, "failed to assign heartbeat trigger to status LED");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writing_to_a_missing_trigger_file_does_not_panic() {
        let dir = tempdir().unwrap();
        enable_heartbeat_at(&dir.path().join("does-not-exist"));
    }
}
