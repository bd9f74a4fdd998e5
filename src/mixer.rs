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

//! The voice mixer: the pull-model inner loop that runs inside the audio
//! device callback. Everything here must avoid allocation and blocking.

use std::sync::Arc;
use std::sync::OnceLock;

use crossbeam_channel::Receiver;

use crate::sample::Sample;

/// Number of semitones of upward pitch shift the speed table covers.
const SPEED_STEPS: usize = 84;
/// Length of the descending portion of the fade-out curve; fade-out is
/// silent for any index at or past this.
pub const FADEOUT_LEN: usize = 30_000;

fn speed_table() -> &'static [f32; SPEED_STEPS] {
    static TABLE: OnceLock<[f32; SPEED_STEPS]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0f32; SPEED_STEPS];
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = 2f32.powf(i as f32 / 12.0);
        }
        table
    })
}

fn fadeout_table() -> &'static [f32; FADEOUT_LEN] {
    static TABLE: OnceLock<[f32; FADEOUT_LEN]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0f32; FADEOUT_LEN];
        let last = (FADEOUT_LEN - 1) as f64;
        for (i, slot) in table.iter_mut().enumerate() {
            let x = (last - i as f64) / last;
            *slot = x.powi(6) as f32;
        }
        table
    })
}

#[inline]
fn fadeout_gain(index: usize) -> f32 {
    if index >= FADEOUT_LEN {
        0.0
    } else {
        fadeout_table()[index]
    }
}

/// One currently sounding instance of a sample.
pub struct Voice {
    id: u64,
    sample: Arc<Sample>,
    pos: f64,
    is_fadeout: bool,
    fadeout_pos: usize,
    rate: f32,
    dead: bool,
}

impl Voice {
    /// Creates a new voice for the given note, deriving its pitch ratio from
    /// the semitone distance to the sample's own native note, clamped to
    /// `[0, 83]` (no downward pitch shift, no more than 83 semitones up).
    pub fn new(id: u64, sample: Arc<Sample>, note: u8) -> Voice {
        let semitones = (note as i32 - sample.midinote as i32).clamp(0, 83) as usize;
        let rate = speed_table()[semitones];
        Voice {
            id,
            sample,
            pos: 0.0,
            is_fadeout: false,
            fadeout_pos: 0,
            rate,
            dead: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }
}

/// Commands produced by the MIDI dispatcher and drained by the audio
/// callback at the top of each block. Keeping this a plain enum over a
/// bounded channel means the dispatcher never touches the live-voice list
/// directly and the callback never blocks waiting for one.
pub enum EngineCommand {
    NoteOn(Voice),
    /// Marks the named voices (by id) as fading out. Already-dead ids are
    /// ignored.
    FadeOut(Vec<u64>),
}

/// Runs inside the audio device's pull callback. Owns the live-voice list
/// exclusively; nothing else may touch it.
pub struct Mixer {
    voices: Vec<Voice>,
    max_polyphony: usize,
    commands: Receiver<EngineCommand>,
    volume: Arc<parking_lot::Mutex<f32>>,
    cached_volume: f32,
    scratch: Vec<f32>,
}

impl Mixer {
    pub fn new(
        max_polyphony: usize,
        commands: Receiver<EngineCommand>,
        volume: Arc<parking_lot::Mutex<f32>>,
    ) -> Mixer {
        let cached_volume = *volume.lock();
        Mixer {
            voices: Vec::with_capacity(max_polyphony),
            max_polyphony,
            commands,
            volume,
            cached_volume,
            scratch: Vec::new(),
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                EngineCommand::NoteOn(voice) => self.voices.push(voice),
                EngineCommand::FadeOut(ids) => {
                    for voice in self.voices.iter_mut() {
                        if ids.contains(&voice.id()) {
                            voice.is_fadeout = true;
                        }
                    }
                }
            }
        }
    }

    /// Drops the oldest voices if the live list exceeds the polyphony cap.
    /// Stable keep-tail: the most recently started voices survive.
    fn enforce_polyphony_cap(&mut self) {
        if self.voices.len() > self.max_polyphony {
            let excess = self.voices.len() - self.max_polyphony;
            self.voices.drain(0..excess);
        }
    }

    /// Renders exactly `frames` stereo int16 frames into `out` (length
    /// `frames * 2`, interleaved L, R). Never allocates once `scratch` has
    /// grown to cover the largest block size this engine has seen.
    pub fn process_block(&mut self, out: &mut [i16], frames: usize) {
        debug_assert_eq!(out.len(), frames * 2);

        self.drain_commands();
        self.enforce_polyphony_cap();

        if let Some(volume) = self.volume.try_lock() {
            self.cached_volume = *volume;
        }

        if self.scratch.len() < frames * 2 {
            self.scratch.resize(frames * 2, 0.0);
        }
        let scratch = &mut self.scratch[..frames * 2];
        scratch.fill(0.0);

        for voice in self.voices.iter_mut() {
            let mut p = voice.pos;
            for i in 0..frames {
                let base = p.floor() as u32;
                let frac = (p - base as f64) as f32;
                let (l0, r0) = voice.sample.frame_at(base);
                let (l1, r1) = voice.sample.frame_at(base + 1);
                let mut left = l0 + (l1 - l0) * frac;
                let mut right = r0 + (r1 - r0) * frac;

                if voice.is_fadeout {
                    let gain = fadeout_gain(voice.fadeout_pos + i);
                    left *= gain;
                    right *= gain;
                }

                scratch[i * 2] += left;
                scratch[i * 2 + 1] += right;

                p += voice.rate as f64;
                if p >= voice.sample.nframes as f64 {
                    match voice.sample.loop_region {
                        Some((loop_start, loop_end)) => {
                            p = loop_start as f64 + (p - loop_end as f64);
                        }
                        None => {
                            voice.dead = true;
                            break;
                        }
                    }
                }
            }
            voice.pos = p;

            if voice.is_fadeout {
                voice.fadeout_pos += frames;
                if voice.fadeout_pos >= FADEOUT_LEN {
                    voice.dead = true;
                }
            }
        }

        let volume = self.cached_volume;
        for i in 0..frames {
            out[i * 2] = (scratch[i * 2] * volume).clamp(-32768.0, 32767.0) as i16;
            out[i * 2 + 1] = (scratch[i * 2 + 1] * volume).clamp(-32768.0, 32767.0) as i16;
        }

        self.voices.retain(|voice| !voice.dead);
    }

    pub fn live_voice_count(&self) -> usize {
        self.voices.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::Sample;
    use crossbeam_channel::unbounded;

    fn flat_sample(value: i16, frames: u32, loop_region: Option<(u32, u32)>) -> Arc<Sample> {
        let mut data = vec![value; (frames as usize + 1) * 2];
        // A distinguishing pattern so interpolation is exercised meaningfully.
        for (i, chunk) in data.chunks_mut(2).enumerate() {
            chunk[0] = value.saturating_add(i as i16);
            chunk[1] = value;
        }
        Arc::new(Sample::for_test(60, 100, data, frames, loop_region))
    }

    fn test_mixer(max_polyphony: usize) -> (Mixer, crossbeam_channel::Sender<EngineCommand>) {
        let (tx, rx) = unbounded();
        let volume = Arc::new(parking_lot::Mutex::new(1.0));
        (Mixer::new(max_polyphony, rx, volume), tx)
    }

    #[test]
    fn pitch_ratio_matches_semitone_distance() {
        let sample = flat_sample(0, 100, None);
        let voice = Voice::new(1, sample.clone(), 60);
        assert!((voice.rate() - 1.0).abs() < 1e-6);

        let voice_up = Voice::new(2, sample.clone(), 72);
        assert!((voice_up.rate() - 2.0).abs() < 1e-4);

        // Clamped: 200 semitones above midinote clamps to 83.
        let voice_clamped = Voice::new(3, sample, 255);
        let expected = 2f32.powf(83.0 / 12.0);
        assert!((voice_clamped.rate() - expected).abs() < 1e-2);
    }

    #[test]
    fn polyphony_cap_keeps_most_recent_voices() {
        let (mut mixer, tx) = test_mixer(4);
        let sample = flat_sample(0, 1000, None);
        for id in 0..10u64 {
            tx.send(EngineCommand::NoteOn(Voice::new(id, sample.clone(), 60)))
                .unwrap();
        }
        let mut out = vec![0i16; 16 * 2];
        mixer.process_block(&mut out, 16);
        assert_eq!(mixer.live_voice_count(), 4);
    }

    #[test]
    fn fadeout_voice_dies_after_l_frames() {
        let (mut mixer, tx) = test_mixer(80);
        let sample = flat_sample(1000, 50_000, None);
        tx.send(EngineCommand::NoteOn(Voice::new(1, sample, 60)))
            .unwrap();
        let mut out = vec![0i16; 512 * 2];
        mixer.process_block(&mut out, 512);
        tx.send(EngineCommand::FadeOut(vec![1])).unwrap();

        let mut frames_rendered = 0usize;
        while mixer.live_voice_count() > 0 && frames_rendered < FADEOUT_LEN + 1024 {
            mixer.process_block(&mut out, 512);
            frames_rendered += 512;
        }
        assert_eq!(mixer.live_voice_count(), 0);
        assert!(frames_rendered >= FADEOUT_LEN);
    }

    #[test]
    fn looped_sample_wraps_instead_of_dying() {
        let (mut mixer, tx) = test_mixer(80);
        let sample = flat_sample(0, 10, Some((2, 8)));
        tx.send(EngineCommand::NoteOn(Voice::new(1, sample, 60)))
            .unwrap();
        let mut out = vec![0i16; 64 * 2];
        // Enough frames to cross the loop point several times over.
        mixer.process_block(&mut out, 64);
        assert_eq!(mixer.live_voice_count(), 1);
    }

    #[test]
    fn non_looped_sample_dies_at_end() {
        let (mut mixer, tx) = test_mixer(80);
        let sample = flat_sample(0, 4, None);
        tx.send(EngineCommand::NoteOn(Voice::new(1, sample, 60)))
            .unwrap();
        let mut out = vec![0i16; 64 * 2];
        mixer.process_block(&mut out, 64);
        assert_eq!(mixer.live_voice_count(), 0);
    }

    #[test]
    fn mixing_is_order_independent() {
        let sample_a = flat_sample(100, 1000, None);
        let sample_b = flat_sample(-200, 1000, None);

        let (mut mixer1, tx1) = test_mixer(80);
        tx1.send(EngineCommand::NoteOn(Voice::new(1, sample_a.clone(), 60)))
            .unwrap();
        tx1.send(EngineCommand::NoteOn(Voice::new(2, sample_b.clone(), 60)))
            .unwrap();
        let mut out1 = vec![0i16; 32 * 2];
        mixer1.process_block(&mut out1, 32);

        let (mut mixer2, tx2) = test_mixer(80);
        tx2.send(EngineCommand::NoteOn(Voice::new(2, sample_b, 60)))
            .unwrap();
        tx2.send(EngineCommand::NoteOn(Voice::new(1, sample_a, 60)))
            .unwrap();
        let mut out2 = vec![0i16; 32 * 2];
        mixer2.process_block(&mut out2, 32);

        assert_eq!(out1, out2);
    }
}
