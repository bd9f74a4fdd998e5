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

//! Optional YAML configuration, loaded the same way the teacher's
//! `config::playlist::Playlist` is: `config::Config::builder()` over a
//! single file source, deserialized with `serde`. Every field has a
//! compiled-in default so the binary runs with no config file at all.

use std::path::PathBuf;

use config::{Config, File};
use serde::Deserialize;

use crate::error::SamplerError;

fn default_samples_dir() -> String {
    "samples".to_string()
}
fn default_max_polyphony() -> usize {
    80
}
fn default_max_presets() -> u8 {
    99
}
fn default_ignore_midi_after_boot_secs() -> u64 {
    2
}
fn default_channel_count() -> usize {
    1
}
fn default_display_addr() -> String {
    "127.0.0.1:4242".to_string()
}

/// The sampler's overridable settings. Every field defaults to the named
/// constant from spec.md §6 when the config file is absent or omits it.
#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default = "default_samples_dir")]
    pub samples_dir: String,

    #[serde(default = "default_max_polyphony")]
    pub max_polyphony: usize,

    #[serde(default = "default_max_presets")]
    pub max_presets: u8,

    #[serde(default = "default_ignore_midi_after_boot_secs")]
    pub ignore_midi_after_boot_secs: u64,

    #[serde(default)]
    pub audio_device: Option<String>,

    #[serde(default)]
    pub midi_device: Option<String>,

    #[serde(default)]
    pub serial_midi_device: Option<String>,

    #[serde(default = "default_display_addr")]
    pub display_addr: String,

    #[serde(default = "default_channel_count")]
    pub channel_count: usize,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            samples_dir: default_samples_dir(),
            max_polyphony: default_max_polyphony(),
            max_presets: default_max_presets(),
            ignore_midi_after_boot_secs: default_ignore_midi_after_boot_secs(),
            audio_device: None,
            midi_device: None,
            serial_midi_device: None,
            display_addr: default_display_addr(),
            channel_count: default_channel_count(),
        }
    }
}

impl Settings {
    /// Loads settings from a YAML file, falling back to pure compiled-in
    /// defaults if `path` is `None`.
    pub fn load(path: Option<&PathBuf>) -> Result<Settings, SamplerError> {
        let Some(path) = path else {
            return Ok(Settings::default());
        };

        Ok(Config::builder()
            .add_source(File::from(path.as_path()))
            .build()?
            .try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_apply_with_no_config_file() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.max_polyphony, 80);
        assert_eq!(settings.max_presets, 99);
        assert_eq!(settings.channel_count, 1);
    }

    #[test]
    fn partial_config_file_keeps_remaining_defaults() {
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        writeln!(file, "max_polyphony: 16").unwrap();
        writeln!(file, "samples_dir: /srv/samples").unwrap();

        let settings = Settings::load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(settings.max_polyphony, 16);
        assert_eq!(settings.samples_dir, "/srv/samples");
        // Untouched field keeps its compiled-in default.
        assert_eq!(settings.max_presets, 99);
    }
}
