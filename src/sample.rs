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

//! The sample data model: a decoded, immutable `Sample` and the dense
//! 128x128 note/velocity lookup table that indexes them per channel.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::SamplerError;
use crate::wav;

/// One decoded WAV, immutable after load. Always interleaved stereo.
pub struct Sample {
    pub origin: PathBuf,
    pub midinote: u8,
    pub velocity: u8,
    /// Interleaved stereo frames, `L, R, L, R, ...`. Always has one extra
    /// silent guard frame appended past `nframes` so the mixer's
    /// floor(p)+1 interpolation read never runs off the end of the buffer.
    frames: Vec<i16>,
    /// The number of frames to play before looping or stopping. For a
    /// looped sample this is `loop_end + 2` (two guard frames for
    /// interpolation across the wrap); otherwise the file's frame count.
    pub nframes: u32,
    /// `(loop_start, loop_end)`, if the WAV carried a usable `smpl` loop.
    pub loop_region: Option<(u32, u32)>,
    /// Retained `cue ` chunk sample offsets. Not consumed by playback.
    pub cues: Vec<u32>,
}

impl Sample {
    /// Loads a WAV file from disk and assigns it to the given note/velocity cell.
    pub fn load(path: &Path, midinote: u8, velocity: u8) -> Result<Sample, SamplerError> {
        let raw = wav::read(path)?;

        let nframes = match raw.loop_region {
            Some((_, loop_end)) => loop_end.saturating_add(2),
            None => raw.frame_count,
        };

        let mut frames = raw.frames;
        // Make sure the buffer covers nframes + 1 guard frame regardless of
        // what the file actually contained (a malformed loop point past the
        // end of data shouldn't panic the mixer).
        let needed_frames = (nframes as usize) + 1;
        if frames.len() / 2 < needed_frames {
            frames.resize(needed_frames * 2, 0);
        }

        Ok(Sample {
            origin: path.to_path_buf(),
            midinote,
            velocity,
            frames,
            nframes,
            loop_region: raw.loop_region,
            cues: raw.cues,
        })
    }

    /// Returns the `(left, right)` pair at the given frame index. Out-of-range
    /// indices return silence rather than panicking.
    #[inline]
    pub fn frame_at(&self, index: u32) -> (f32, f32) {
        let idx = (index as usize) * 2;
        if idx + 1 >= self.frames.len() {
            return (0.0, 0.0);
        }
        (self.frames[idx] as f32, self.frames[idx + 1] as f32)
    }

    pub fn memory_size(&self) -> usize {
        self.frames.len() * std::mem::size_of::<i16>()
    }

    /// Builds a `Sample` directly from decoded frames, bypassing the WAV
    /// reader. Used by other modules' tests that need a `Sample` without a
    /// file on disk; not part of the public loading path.
    #[cfg(test)]
    pub fn for_test(
        midinote: u8,
        velocity: u8,
        frames: Vec<i16>,
        nframes: u32,
        loop_region: Option<(u32, u32)>,
    ) -> Sample {
        Sample {
            origin: PathBuf::from("test.wav"),
            midinote,
            velocity,
            frames,
            nframes,
            loop_region,
            cues: vec![],
        }
    }
}

/// A dense note x velocity lookup table for one MIDI channel. Built in
/// isolation by the loader, then published atomically; never mutated in
/// place once shared.
pub struct SampleMap {
    cells: Box<[[Option<Arc<Sample>>; 128]; 128]>,
}

impl SampleMap {
    pub fn empty() -> SampleMap {
        SampleMap {
            cells: Box::new(std::array::from_fn(|_| std::array::from_fn(|_| None))),
        }
    }

    pub fn get(&self, midinote: u8, velocity: u8) -> Option<&Arc<Sample>> {
        self.cells[midinote as usize][velocity as usize].as_ref()
    }

    pub fn set(&mut self, midinote: u8, velocity: u8, sample: Arc<Sample>) {
        self.cells[midinote as usize][velocity as usize] = Some(sample);
    }

    pub fn row(&self, midinote: u8) -> &[Option<Arc<Sample>>; 128] {
        &self.cells[midinote as usize]
    }

    pub fn set_row(&mut self, midinote: u8, row: [Option<Arc<Sample>>; 128]) {
        self.cells[midinote as usize] = row;
    }
}

impl Default for SampleMap {
    fn default() -> Self {
        Self::empty()
    }
}

/// Per-channel state: the preset currently selected and the published
/// sample map for it. Exactly one `SampleMap` is current at any time.
pub struct ChannelState {
    pub preset: u8,
    map: Arc<SampleMap>,
}

impl ChannelState {
    pub fn new() -> ChannelState {
        ChannelState {
            preset: 0,
            map: Arc::new(SampleMap::empty()),
        }
    }

    pub fn map(&self) -> Arc<SampleMap> {
        self.map.clone()
    }

    /// Atomically swaps in a newly-built map. Voices already playing keep
    /// their own `Arc<Sample>` reference, so the old map's samples stay
    /// alive until those voices end even though the map itself is replaced.
    pub fn publish(&mut self, map: SampleMap) {
        self.map = Arc::new(map);
    }
}

impl Default for ChannelState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(midinote: u8, velocity: u8) -> Arc<Sample> {
        Arc::new(Sample {
            origin: PathBuf::from("test.wav"),
            midinote,
            velocity,
            frames: vec![0; 8],
            nframes: 3,
            loop_region: None,
            cues: vec![],
        })
    }

    #[test]
    fn empty_map_returns_none_everywhere() {
        let map = SampleMap::empty();
        assert!(map.get(60, 100).is_none());
        assert!(map.get(0, 0).is_none());
        assert!(map.get(127, 127).is_none());
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut map = SampleMap::empty();
        map.set(60, 100, sample(60, 100));
        assert!(map.get(60, 100).is_some());
        assert!(map.get(60, 99).is_none());
    }

    #[test]
    fn channel_state_publish_swaps_the_whole_map() {
        let mut channel = ChannelState::new();
        let before = channel.map();
        assert!(before.get(60, 100).is_none());

        let mut new_map = SampleMap::empty();
        new_map.set(60, 100, sample(60, 100));
        channel.publish(new_map);

        let after = channel.map();
        assert!(after.get(60, 100).is_some());
        // The old map is still alive via `before` even though it's no
        // longer the channel's current map.
        assert!(before.get(60, 100).is_none());
    }
}
