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
use std::{
    collections::HashMap,
    error::Error,
    fmt, mem,
    sync::{Arc, Mutex},
};

use midir::{MidiInput, MidiInputConnection, MidiInputPort};
use tracing::{debug, info, span, Level};

use crate::dispatcher::Dispatcher;

pub struct Device {
    name: String,
    input_port: MidiInputPort,
    event_connection: Mutex<Option<MidiInputConnection<()>>>,
}

impl super::Device for Device {
    fn watch_events(&self, dispatcher: Arc<Dispatcher>) -> Result<(), Box<dyn Error>> {
        let span = span!(Level::INFO, "watch midi events");
        let _enter = span.enter();

        let mut event_connection = self.event_connection.lock().expect("unable to get lock");
        if event_connection.is_some() {
            return Err("already watching events".into());
        }

        info!(device = self.name, "watching MIDI events");

        let input = MidiInput::new("loftbox midi input")?;
        *event_connection = Some(input.connect(
            &self.input_port,
            "loftbox input watcher",
            move |_, raw_event, _| {
                debug!(bytes = ?raw_event, "received MIDI event");
                dispatcher.handle_message(raw_event);
            },
            (),
        )?);

        Ok(())
    }

    fn stop_watch_events(&self) {
        let event_connection = self
            .event_connection
            .lock()
            .expect("error getting mutex")
            .take();
        mem::drop(event_connection);
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Input)", self.name)
    }
}

/// Lists midir input devices and produces the Device trait.
pub fn list() -> Result<Vec<Box<dyn super::Device>>, Box<dyn Error>> {
    Ok(list_midir_devices()?
        .into_iter()
        .map(|device| {
            let device: Box<dyn super::Device> = Box::new(device);
            device
        })
        .collect())
}

fn list_midir_devices() -> Result<Vec<Device>, Box<dyn Error>> {
    let input = MidiInput::new("loftbox input listing")?;
    let mut devices: HashMap<String, Device> = HashMap::new();

    for port in input.ports() {
        let name = input.port_name(&port)?;
        devices.insert(
            name.clone(),
            Device {
                name,
                input_port: port,
                event_connection: Mutex::new(None),
            },
        );
    }

    let mut sorted_devices: Vec<Device> = devices.into_iter().map(|entry| entry.1).collect();
    sorted_devices.sort_by_key(|device| device.name.clone());
    Ok(sorted_devices)
}

/// Gets the given midir device, matching names by substring like the
/// original program's device resolution.
pub fn get(name: &str) -> Result<Device, Box<dyn Error>> {
    let mut matches = list_midir_devices()?
        .into_iter()
        .filter(|device| device.name.contains(name))
        .collect::<Vec<Device>>();

    if matches.is_empty() {
        return Err(format!("no MIDI device found with name {}", name).into());
    }
    if matches.len() > 1 {
        return Err(format!(
            "found too many devices that match ({}), use a less ambiguous device name",
            matches
                .iter()
                .map(|device| device.name.clone())
                .collect::<Vec<String>>()
                .join(", ")
        )
        .into());
    }

    Ok(matches.swap_remove(0))
}
