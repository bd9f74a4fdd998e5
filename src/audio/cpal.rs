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
use std::{error::Error, fmt};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info};

use crate::audio::thread_priority;
use crate::mixer::Mixer;

const SAMPLE_RATE: u32 = 44_100;
const BLOCK_SIZE: u32 = 512;
const CHANNELS: u16 = 2;

/// A small wrapper around a cpal::Device, sized for the sampler's needs
/// (stereo, fixed sample rate) rather than the generic multichannel case.
pub struct Device {
    name: String,
    host_id: cpal::HostId,
    device: cpal::Device,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.host_id.name())
    }
}

impl Device {
    pub fn list() -> Result<Vec<Box<dyn super::Device>>, Box<dyn Error>> {
        Ok(Device::list_cpal_devices()?
            .into_iter()
            .map(|device| {
                let device: Box<dyn super::Device> = Box::new(device);
                device
            })
            .collect())
    }

    fn list_cpal_devices() -> Result<Vec<Device>, Box<dyn Error>> {
        // Suppress noisy host/driver output while enumerating.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = cpal::host_from_id(host_id)?.devices()?;
            for device in host_devices {
                let supports_stereo_output = device
                    .supported_output_configs()?
                    .any(|config| config.channels() >= CHANNELS);
                if supports_stereo_output {
                    devices.push(Device {
                        name: device.name()?,
                        host_id,
                        device,
                    });
                }
            }
        }
        devices.sort_by_key(|device| device.name.clone());
        Ok(devices)
    }

    pub fn get(name: &str) -> Result<Device, Box<dyn Error>> {
        Device::list_cpal_devices()?
            .into_iter()
            .find(|device| device.name == name)
            .ok_or_else(|| format!("no audio device found with name {}", name).into())
    }
}

/// Keeps the cpal stream alive; dropping it stops playback.
pub struct CpalStreamHandle {
    _stream: cpal::Stream,
}

impl super::StreamHandle for CpalStreamHandle {}

impl super::Device for Device {
    fn start(&self, mixer: Mixer) -> Result<Box<dyn super::StreamHandle>, Box<dyn Error>> {
        let mut mixer = mixer;
        let mut priority_set = false;
        let priority = thread_priority::callback_thread_priority();
        let rt_audio = thread_priority::rt_audio_enabled();

        let stream = self.device.build_output_stream(
            &cpal::StreamConfig {
                channels: CHANNELS,
                sample_rate: cpal::SampleRate(SAMPLE_RATE),
                buffer_size: cpal::BufferSize::Fixed(BLOCK_SIZE),
            },
            move |data: &mut [i16], _| {
                thread_priority::configure_audio_thread_priority(priority, rt_audio, &mut priority_set);
                let frames = data.len() / CHANNELS as usize;
                mixer.process_block(data, frames);
            },
            |err: cpal::StreamError| {
                error!(err = %err, "error during audio stream");
            },
            None,
        )?;
        stream.play()?;
        info!(device = %self.name, sample_rate = SAMPLE_RATE, block_size = BLOCK_SIZE, "audio stream started");

        Ok(Box::new(CpalStreamHandle { _stream: stream }))
    }
}
