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

//! Decodes raw MIDI bytes and turns them into engine state changes: voices
//! spawned or faded out, sustain pedal tracking, and preset (program
//! change) reloads. Runs on whichever thread owns the MIDI input
//! connection; never touches the live-voice list directly.

use std::collections::HashMap;
use std::sync::Arc;

use midly::live::LiveEvent;
use midly::MidiMessage;
use parking_lot::Mutex;
use tracing::debug;

use crate::engine::Engine;
use crate::mixer::{EngineCommand, Voice};

const SUSTAIN_CONTROLLER: u8 = 64;
const SUSTAIN_ON_THRESHOLD: u8 = 64;

#[derive(Default)]
struct ChannelDispatchState {
    playing_notes: HashMap<u8, Vec<u64>>,
    sustain_held: Vec<u64>,
    sustain: bool,
}

/// Per-channel bookkeeping for note-on/note-off/sustain routing. Shared
/// between however many MIDI input devices are connected; never read by
/// the audio callback.
pub struct Dispatcher {
    engine: Arc<Engine>,
    states: Vec<Mutex<ChannelDispatchState>>,
}

impl Dispatcher {
    pub fn new(engine: Arc<Engine>) -> Dispatcher {
        let states = (0..engine.channel_count().max(1))
            .map(|_| Mutex::new(ChannelDispatchState::default()))
            .collect();
        Dispatcher { engine, states }
    }

    /// Handles one raw MIDI message (status byte plus up to two data
    /// bytes). Malformed or unrecognized messages are ignored.
    pub fn handle_message(&self, raw: &[u8]) {
        let Ok(event) = LiveEvent::parse(raw) else {
            return;
        };
        let LiveEvent::Midi { channel, message } = event else {
            return;
        };
        let channel = channel.as_int() as usize;
        if channel >= self.states.len() {
            return;
        }

        match message {
            MidiMessage::NoteOn { key, vel } if vel.as_int() == 0 => {
                self.note_off(channel, key.as_int())
            }
            MidiMessage::NoteOn { key, vel } => self.note_on(channel, key.as_int(), vel.as_int()),
            MidiMessage::NoteOff { key, .. } => self.note_off(channel, key.as_int()),
            MidiMessage::ProgramChange { program } => {
                let preset = program.as_int();
                debug!(channel, preset, "program change");
                self.engine.request_load(channel, preset);
            }
            MidiMessage::Controller { controller, value }
                if controller.as_int() == SUSTAIN_CONTROLLER =>
            {
                self.sustain(channel, value.as_int() >= SUSTAIN_ON_THRESHOLD)
            }
            _ => {}
        }
    }

    fn note_on(&self, channel: usize, note: u8, velocity: u8) {
        let transpose = self.engine.global().transpose();
        let Some(midinote) = transposed(note, transpose) else {
            return;
        };

        let Some(map) = self.engine.channel_map(channel) else {
            return;
        };
        let Some(sample) = map.get(midinote, velocity) else {
            return;
        };

        let id = self.engine.next_voice_id();
        let voice = Voice::new(id, sample.clone(), midinote);
        self.engine.send_command(EngineCommand::NoteOn(voice));

        self.states[channel]
            .lock()
            .playing_notes
            .entry(midinote)
            .or_default()
            .push(id);
    }

    fn note_off(&self, channel: usize, note: u8) {
        let transpose = self.engine.global().transpose();
        let Some(midinote) = transposed(note, transpose) else {
            return;
        };

        let mut state = self.states[channel].lock();
        let Some(ids) = state.playing_notes.remove(&midinote) else {
            return;
        };
        if state.sustain {
            state.sustain_held.extend(ids);
        } else {
            drop(state);
            self.engine.send_command(EngineCommand::FadeOut(ids));
        }
    }

    fn sustain(&self, channel: usize, held: bool) {
        let mut state = self.states[channel].lock();
        state.sustain = held;
        if !held {
            let ids = std::mem::take(&mut state.sustain_held);
            drop(state);
            if !ids.is_empty() {
                self.engine.send_command(EngineCommand::FadeOut(ids));
            }
        }
    }
}

fn transposed(note: u8, transpose: i32) -> Option<u8> {
    let shifted = note as i32 + transpose;
    if (0..=127).contains(&shifted) {
        Some(shifted as u8)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn engine_with_loaded_note(midinote: u8, velocity: u8) -> Arc<Engine> {
        let (engine, _mixer) = Engine::new(1, PathBuf::from("."), 32);
        let engine = Arc::new(engine);

        let mut map = crate::sample::SampleMap::empty();
        let sample = Arc::new(crate::sample::Sample::for_test(
            midinote,
            velocity,
            vec![0; 16],
            3,
            None,
        ));
        map.set(midinote, velocity, sample);
        engine.publish_for_test(0, map);
        engine
    }

    #[test]
    fn note_on_then_off_round_trips_without_panicking() {
        let engine = engine_with_loaded_note(60, 100);
        let dispatcher = Dispatcher::new(engine);
        dispatcher.handle_message(&[0x90, 60, 100]);
        dispatcher.handle_message(&[0x80, 60, 0]);
    }

    #[test]
    fn note_on_with_zero_velocity_is_treated_as_note_off() {
        let engine = engine_with_loaded_note(60, 100);
        let dispatcher = Dispatcher::new(engine);
        dispatcher.handle_message(&[0x90, 60, 100]);
        dispatcher.handle_message(&[0x90, 60, 0]);
        let state = dispatcher.states[0].lock();
        assert!(state.playing_notes.is_empty());
    }

    #[test]
    fn sustain_holds_notes_until_pedal_release() {
        let engine = engine_with_loaded_note(60, 100);
        let dispatcher = Dispatcher::new(engine);
        dispatcher.handle_message(&[0xB0, 64, 127]); // sustain on
        dispatcher.handle_message(&[0x90, 60, 100]);
        dispatcher.handle_message(&[0x80, 60, 0]);
        {
            let state = dispatcher.states[0].lock();
            assert_eq!(state.sustain_held.len(), 1);
        }
        dispatcher.handle_message(&[0xB0, 64, 0]); // sustain off
        let state = dispatcher.states[0].lock();
        assert!(state.sustain_held.is_empty());
    }

    #[test]
    fn program_change_triggers_a_reload() {
        let (engine, _mixer) = Engine::new(1, PathBuf::from("."), 32);
        let engine = Arc::new(engine);
        let dispatcher = Dispatcher::new(engine.clone());
        dispatcher.handle_message(&[0xC0, 5]);
        // request_load is async; just assert it didn't panic and the
        // channel index is still valid.
        assert_eq!(engine.channel_count(), 1);
    }

    #[test]
    fn out_of_range_transpose_drops_the_note() {
        assert_eq!(transposed(0, -1), None);
        assert_eq!(transposed(127, 1), None);
        assert_eq!(transposed(60, 12), Some(72));
    }
}
