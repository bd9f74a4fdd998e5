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
use std::path::PathBuf;

/// Typed errors for the sampler. Nothing inside the audio callback is allowed
/// to fail: missing samples manifest as silence and accumulators saturate.
/// These variants cover the loader, device setup and external collaborators.
#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    #[error("failed to open audio device: {0}")]
    AudioDeviceOpenFailed(String),

    #[error("malformed WAVE file {path}: {reason}")]
    MalformedWave { path: PathBuf, reason: String },

    #[error("definition.txt parse error at {path}:{line}: {reason}")]
    DefinitionParseError {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("preset directory missing for preset {0}")]
    PresetDirectoryMissing(u8),

    #[error("display server unreachable: {0}")]
    DisplayServerUnreachable(String),

    #[error("MIDI byte framing error: {0}")]
    MidiByteFramingError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config load/parse error: {0}")]
    Config(#[from] config::ConfigError),
}
