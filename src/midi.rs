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
use std::{error::Error, fmt, sync::Arc};

use crate::dispatcher::Dispatcher;

mod midir;
#[cfg(feature = "serial-midi")]
pub mod serial;

/// A MIDI input device that can forward raw messages to a dispatcher.
pub trait Device: fmt::Display + Send + Sync {
    /// Connects to the device and calls `dispatcher.handle_message` for
    /// every raw MIDI message received, for as long as the connection is
    /// kept open (until [`Device::stop_watch_events`] is called or the
    /// device is dropped).
    fn watch_events(&self, dispatcher: Arc<Dispatcher>) -> Result<(), Box<dyn Error>>;

    /// Stops watching events, dropping the underlying connection.
    fn stop_watch_events(&self);
}

/// Lists devices known to midir.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, Box<dyn Error>> {
    midir::list()
}

/// Gets a device with the given name. Names are matched as substrings, the
/// same way the original program's `--midi-device` resolution works, and
/// error out if more than one device matches.
pub fn get_device(name: &str) -> Result<Arc<dyn Device>, Box<dyn Error>> {
    Ok(Arc::new(midir::get(name)?))
}
