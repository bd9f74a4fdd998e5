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
mod audio;
mod config;
mod dispatcher;
mod engine;
mod error;
mod loader;
mod mixer;
mod playsync;
mod sample;
mod util;
mod wav;

#[cfg(feature = "buttons")]
mod buttons;
#[cfg(feature = "display")]
mod display;
#[cfg(feature = "system-led")]
mod led;
mod midi;

use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Settings;
use crate::engine::Engine;
use crate::error::SamplerError;

/// Default GPIO BCM pin numbers for the preset down/up buttons, matching
/// the reference hardware wiring. Not otherwise configurable.
#[cfg(feature = "buttons")]
const BUTTON_PREV_PIN: u32 = 27;
#[cfg(feature = "buttons")]
const BUTTON_NEXT_PIN: u32 = 17;

#[derive(Parser)]
#[clap(
    author = "Dana Okafor",
    version = "0.1.0",
    about = "An embedded polyphonic MIDI sampler."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Starts the sampler: opens the audio device, connects MIDI input, and
    /// runs until interrupted.
    Run {
        /// Path to an optional YAML config file.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Discard MIDI input for a few seconds after each port is opened,
        /// to ride out spurious boot-time bytes on some hardware.
        #[arg(long)]
        boot: bool,
    },
    /// Lists the available audio output devices.
    Devices {},
    /// Lists the available MIDI input devices.
    MidiDevices {},
    /// Lists and validates every preset directory under the given samples directory.
    Presets {
        /// Path to the samples directory.
        samples_dir: String,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, boot } => run(config, boot)?,
        Commands::Devices {} => {
            let devices = audio::list_devices()?;
            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }
            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::MidiDevices {} => {
            let devices = midi::list_devices()?;
            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }
            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Presets { samples_dir } => print_presets(&PathBuf::from(samples_dir))?,
    }

    Ok(())
}

fn run(config_path: Option<PathBuf>, boot: bool) -> Result<(), Box<dyn Error>> {
    let settings = Settings::load(config_path.as_ref())?;

    let (engine, mixer) = Engine::new(
        settings.channel_count,
        PathBuf::from(&settings.samples_dir),
        settings.max_polyphony,
    );
    let engine = Arc::new(engine);

    #[cfg(feature = "display")]
    {
        let display = Arc::new(display::Display::connect(&settings.display_addr));
        engine.set_display(display);
    }

    let audio_device = match &settings.audio_device {
        Some(name) => audio::get_device(name)?,
        None => audio::list_devices()?
            .into_iter()
            .next()
            .ok_or("no audio output device available")?,
    };
    info!(device = %audio_device, "opening audio device");
    let _stream = audio_device
        .start(mixer)
        .map_err(|e| SamplerError::AudioDeviceOpenFailed(e.to_string()))?;

    let dispatcher = Arc::new(dispatcher::Dispatcher::new(engine.clone()));

    let midi_device = match &settings.midi_device {
        Some(name) => Some(midi::get_device(name)?),
        None => midi::list_devices()?.into_iter().map(Arc::from).next(),
    };

    if let Some(midi_device) = midi_device {
        if boot {
            info!(
                seconds = settings.ignore_midi_after_boot_secs,
                "discarding MIDI input for the boot settle window"
            );
            thread::sleep(Duration::from_secs(settings.ignore_midi_after_boot_secs));
        }
        info!(device = %midi_device, "watching MIDI input");
        midi_device.watch_events(dispatcher.clone())?;
    } else {
        warn!("no MIDI input device available, running with audio only");
    }

    #[cfg(feature = "serial-midi")]
    if let Some(path) = &settings.serial_midi_device {
        midi::serial::watch(std::path::Path::new(path), dispatcher.clone())?;
    }

    #[cfg(feature = "buttons")]
    buttons::watch(engine.clone(), BUTTON_PREV_PIN, BUTTON_NEXT_PIN, settings.max_presets);

    #[cfg(feature = "system-led")]
    led::enable_heartbeat();

    info!("sampler running, press Ctrl-C to stop");
    loop {
        thread::sleep(Duration::from_secs(60));
    }
}

/// Lists every directory under `samples_dir` that looks like a preset
/// (`"<number> <name>"`), flagging ones whose number doesn't parse and
/// noting whether each carries a `definition.txt`.
fn print_presets(samples_dir: &PathBuf) -> Result<(), Box<dyn Error>> {
    let mut entries: Vec<_> = std::fs::read_dir(samples_dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .collect();
    entries.sort_by_key(|e| e.file_name());

    if entries.is_empty() {
        println!("No preset directories found in {}.", samples_dir.display());
        return Ok(());
    }

    println!("Presets (count: {}):", entries.len());
    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        let number = name.split_whitespace().next().and_then(|n| n.parse::<u8>().ok());
        let has_definition = entry.path().join("definition.txt").exists();

        match number {
            Some(n) => println!(
                "- {} (preset {}, definition.txt: {})",
                name, n, has_definition
            ),
            None => println!("- {} (WARNING: directory name does not start with a preset number)", name),
        }
    }

    Ok(())
}
