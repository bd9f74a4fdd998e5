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

//! Ties the sample store, preset loader and voice mixer together behind one
//! handle shared by the MIDI dispatcher, the control plane, and `main`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::loader::{self, LoadOutcome};
use crate::mixer::{EngineCommand, Mixer};
use crate::playsync::CancelHandle;
use crate::sample::ChannelState;

const DEFAULT_VOLUME: f32 = 0.251_188_64; // 10^(-12/20)

/// Scalars shared between the preset loader (writer) and the mixer
/// (reader). Kept separate from `ChannelState` because they are
/// engine-wide, not per-channel, matching the reference implementation's
/// single pair of `globalvolume`/`globaltranspose` globals.
pub struct GlobalState {
    volume: Arc<Mutex<f32>>,
    transpose: AtomicI32,
}

impl GlobalState {
    fn new() -> GlobalState {
        GlobalState {
            volume: Arc::new(Mutex::new(DEFAULT_VOLUME)),
            transpose: AtomicI32::new(0),
        }
    }

    pub fn transpose(&self) -> i32 {
        self.transpose.load(Ordering::Relaxed)
    }

    pub fn volume_handle(&self) -> Arc<Mutex<f32>> {
        self.volume.clone()
    }

    fn reset(&self) {
        *self.volume.lock() = DEFAULT_VOLUME;
        self.transpose.store(0, Ordering::Relaxed);
    }

    fn apply_loaded(&self, volume: f32, transpose: i32) {
        *self.volume.lock() = volume;
        self.transpose.store(transpose, Ordering::Relaxed);
    }
}

struct LoaderSlot {
    cancel: CancelHandle,
    join: JoinHandle<()>,
}

/// The whole engine: one sample-mixing voice pool shared across every
/// channel, with each channel able to carry an independently loaded preset.
pub struct Engine {
    channels: Vec<RwLock<ChannelState>>,
    global: Arc<GlobalState>,
    commands: Sender<EngineCommand>,
    samples_root: PathBuf,
    next_voice_id: AtomicUsize,
    active_channel: AtomicUsize,
    loaders: Mutex<HashMap<usize, LoaderSlot>>,
    #[cfg(feature = "display")]
    display: Mutex<Option<Arc<crate::display::Display>>>,
}

impl Engine {
    /// Builds the engine and the `Mixer` that should be driven from inside
    /// the audio device's pull callback. The two are split apart because
    /// they live on different threads: the engine is shared widely behind
    /// an `Arc`, the mixer is owned exclusively by the audio callback.
    pub fn new(channel_count: usize, samples_root: PathBuf, max_polyphony: usize) -> (Engine, Mixer) {
        let (tx, rx) = crossbeam_channel::bounded(1024);
        let global = Arc::new(GlobalState::new());
        let mixer = Mixer::new(max_polyphony, rx, global.volume_handle());

        let engine = Engine {
            channels: (0..channel_count.max(1)).map(|_| RwLock::new(ChannelState::new())).collect(),
            global,
            commands: tx,
            samples_root,
            next_voice_id: AtomicUsize::new(0),
            active_channel: AtomicUsize::new(0),
            loaders: Mutex::new(HashMap::new()),
            #[cfg(feature = "display")]
            display: Mutex::new(None),
        };

        (engine, mixer)
    }

    /// Attaches a display client; every subsequent preset load reports its
    /// lifecycle (loading / empty / loaded) to it.
    #[cfg(feature = "display")]
    pub fn set_display(&self, display: Arc<crate::display::Display>) {
        *self.display.lock() = Some(display);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn set_active_channel(&self, channel: usize) {
        if channel < self.channels.len() {
            self.active_channel.store(channel, Ordering::Relaxed);
        }
    }

    pub fn active_channel(&self) -> usize {
        self.active_channel.load(Ordering::Relaxed)
    }

    pub fn global(&self) -> &GlobalState {
        &self.global
    }

    pub fn channel_map(&self, channel: usize) -> Option<Arc<crate::sample::SampleMap>> {
        self.channels.get(channel).map(|c| c.read().map())
    }

    pub fn channel_preset(&self, channel: usize) -> Option<u8> {
        self.channels.get(channel).map(|c| c.read().preset)
    }

    pub fn next_voice_id(&self) -> u64 {
        self.next_voice_id.fetch_add(1, Ordering::Relaxed) as u64
    }

    pub fn send_command(&self, command: EngineCommand) {
        // The channel is bounded but generously sized; dropping a command
        // under sustained overload is preferable to blocking the dispatcher.
        let _ = self.commands.try_send(command);
    }

    /// Starts loading `preset` onto `channel` in the background, cancelling
    /// and joining any load already in flight for that channel first.
    pub fn request_load(self: &Arc<Engine>, channel: usize, preset: u8) {
        if channel >= self.channels.len() {
            return;
        }

        let previous = self.loaders.lock().remove(&channel);
        if let Some(previous) = previous {
            previous.cancel.cancel();
            let _ = previous.join.join();
        }

        let cancel = CancelHandle::new();
        let cancel_for_thread = cancel.clone();
        let engine = self.clone();

        let join = thread::spawn(move || {
            engine.global.reset();
            #[cfg(feature = "display")]
            if let Some(display) = engine.display.lock().clone() {
                crate::display::report_preset_loading(&display);
            }

            match loader::load_preset(&engine.samples_root, preset, &cancel_for_thread) {
                LoadOutcome::Loaded { map, volume, transpose } => {
                    engine.global.apply_loaded(volume, transpose);
                    let mut state = engine.channels[channel].write();
                    state.preset = preset;
                    state.publish(map);
                    info!(channel, preset, "channel preset published");
                    #[cfg(feature = "display")]
                    if let Some(display) = engine.display.lock().clone() {
                        crate::display::report_preset_loaded(&display, preset);
                    }
                }
                LoadOutcome::PresetEmpty => {
                    #[cfg(feature = "display")]
                    if let Some(display) = engine.display.lock().clone() {
                        crate::display::report_preset_empty(&display, preset);
                    }
                }
                LoadOutcome::Cancelled => {}
            }
        });

        self.loaders.lock().insert(channel, LoaderSlot { cancel, join });
    }

    /// Publishes a map directly, bypassing the on-disk loader. Only for
    /// tests that need a populated channel without writing WAV fixtures.
    #[cfg(test)]
    pub fn publish_for_test(&self, channel: usize, map: crate::sample::SampleMap) {
        self.channels[channel].write().publish(map);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn request_load_publishes_a_map_for_an_existing_preset() {
        let root = tempdir().unwrap();
        let preset_dir = root.path().join("1 Test");
        fs::create_dir(&preset_dir).unwrap();

        let (engine, _mixer) = Engine::new(1, root.path().to_path_buf(), 32);
        let engine = Arc::new(engine);
        engine.request_load(0, 1);

        // Join the loader synchronously by requesting again (which joins
        // the in-flight loader before returning) and then checking state.
        engine.request_load(0, 1);
        assert_eq!(engine.channel_preset(0), Some(1));
    }

    #[test]
    fn request_load_on_missing_channel_is_a_no_op() {
        let root = tempdir().unwrap();
        let (engine, _mixer) = Engine::new(1, root.path().to_path_buf(), 32);
        let engine = Arc::new(engine);
        engine.request_load(5, 1);
        assert_eq!(engine.channel_preset(5), None);
    }

    #[test]
    fn active_channel_is_clamped_to_the_configured_count() {
        let root = tempdir().unwrap();
        let (engine, _mixer) = Engine::new(2, root.path().to_path_buf(), 32);
        engine.set_active_channel(1);
        assert_eq!(engine.active_channel(), 1);
        engine.set_active_channel(99);
        assert_eq!(engine.active_channel(), 1);
    }
}
