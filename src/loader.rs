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

//! Preset loading: resolving a preset number to a directory, parsing its
//! `definition.txt` DSL, and filling in the dense note/velocity grid.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::error::SamplerError;
use crate::playsync::CancelHandle;
use crate::sample::{Sample, SampleMap};
use crate::util::filename_display;

const DEFAULT_VOLUME: f32 = 0.251_188_64; // 10^(-12/20)
const NOTE_NAMES: [&str; 12] = [
    "c", "c#", "d", "d#", "e", "f", "f#", "g", "g#", "a", "a#", "b",
];

/// Outcome of attempting to load a preset onto a channel.
pub enum LoadOutcome {
    /// The map was built and is ready to publish.
    Loaded { map: SampleMap, volume: f32, transpose: i32 },
    /// No directory exists for this preset number; the caller should keep
    /// whatever was already playing.
    PresetEmpty,
    /// A newer load request for the same channel arrived first.
    Cancelled,
}

/// Finds the directory under `samples_root` whose name starts with
/// `"{preset} "`. Falls back to `samples_root` itself if it has no entries
/// at all (mirrors `ActuallyLoad`'s `samplesdir = SAMPLES_DIR if
/// os.listdir(SAMPLES_DIR) else '.'`).
fn resolve_preset_dir(samples_root: &Path, preset: u8) -> Option<PathBuf> {
    let root = if fs::read_dir(samples_root)
        .map(|mut it| it.next().is_none())
        .unwrap_or(true)
    {
        Path::new(".")
    } else {
        samples_root
    };

    let prefix = format!("{} ", preset);
    fs::read_dir(root).ok()?.filter_map(|e| e.ok()).find_map(|entry| {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(&prefix) {
            Some(entry.path())
        } else {
            None
        }
    })
}

/// One parsed mapping rule from `definition.txt`: a compiled filename
/// pattern plus the default note/velocity/notename to use for fields the
/// filename doesn't capture.
struct MappingRule {
    pattern: Regex,
    default_midinote: u8,
    default_velocity: u8,
    default_notename: Option<u8>,
}

fn build_mapping_rule(line: &str) -> Result<MappingRule, String> {
    let (pattern_part, suffix) = match line.find(',') {
        Some(idx) => (&line[..idx], Some(&line[idx + 1..])),
        None => (line, None),
    };

    let mut default_midinote: u8 = 0;
    let mut default_velocity: u8 = 127;
    let mut default_notename: Option<u8> = None;

    if let Some(suffix) = suffix {
        for clause in suffix.split(',') {
            let clause = clause.trim().trim_start_matches('%');
            let Some((key, value)) = clause.split_once('=') else {
                continue;
            };
            match key.trim() {
                "midinote" => {
                    default_midinote = value.trim().parse().map_err(|_| {
                        format!("invalid midinote default {:?}", value)
                    })?;
                }
                "velocity" => {
                    default_velocity = value.trim().parse().map_err(|_| {
                        format!("invalid velocity default {:?}", value)
                    })?;
                }
                "notename" => {
                    default_notename = Some(
                        notename_to_midinote(value.trim())
                            .ok_or_else(|| format!("invalid notename default {:?}", value))?,
                    );
                }
                _ => {}
            }
        }
    }

    let escaped = regex::escape(pattern_part);
    let escaped = escaped.replace(r"\*", ".*?");
    let escaped = escaped.replace("%midinote", r"(?P<midinote>\d+)");
    let escaped = escaped.replace("%velocity", r"(?P<velocity>\d+)");
    let escaped = escaped.replace("%notename", r"(?P<notename>[A-Ga-g]#?[0-9])");

    let pattern = Regex::new(&format!("^{}$", escaped))
        .map_err(|e| format!("bad pattern: {}", e))?;

    Ok(MappingRule {
        pattern,
        default_midinote,
        default_velocity,
        default_notename,
    })
}

fn notename_to_midinote(notename: &str) -> Option<u8> {
    let (letter_part, octave_part) = notename.split_at(notename.len() - 1);
    let octave: i32 = octave_part.parse().ok()?;
    let index = NOTE_NAMES
        .iter()
        .position(|n| n.eq_ignore_ascii_case(letter_part))? as i32;
    // Matches the reference implementation's own octave convention
    // (`(octave + 2) * 12`), which is offset by one from standard MIDI
    // scientific pitch notation.
    let midinote = index + (octave + 2) * 12;
    if (0..=127).contains(&midinote) {
        Some(midinote as u8)
    } else {
        None
    }
}

/// Scans `definition.txt` and/or the flat `<note>.wav` fallback, producing a
/// fully dense `SampleMap` for one preset directory. Returns
/// [`LoadOutcome::Cancelled`] as soon as `cancel` flips, at whichever file or
/// row boundary it next checks.
fn scan_preset_dir(
    preset_dir: &Path,
    cancel: &CancelHandle,
) -> Result<(SampleMap, f32, i32), ()> {
    let mut map = SampleMap::empty();
    let mut populated: HashSet<(u8, u8)> = HashSet::new();
    let mut volume = DEFAULT_VOLUME;
    let mut transpose: i32 = 0;

    let definition_path = preset_dir.join("definition.txt");
    if definition_path.exists() {
        let content = match fs::read_to_string(&definition_path) {
            Ok(content) => content,
            Err(e) => {
                error!(path = %definition_path.display(), error = %e, "could not read definition.txt");
                String::new()
            }
        };

        let dir_entries: Vec<String> = fs::read_dir(preset_dir)
            .ok()
            .into_iter()
            .flatten()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();

        for (lineno, raw_line) in content.lines().enumerate() {
            if cancel.is_cancelled() {
                return Err(());
            }
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(pos) = line.find("%%volume=") {
                let rest = &line[pos + "%%volume=".len()..];
                let digits: String = rest
                    .chars()
                    .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                    .collect();
                match digits.parse::<f32>() {
                    Ok(db) => volume *= 10f32.powf(db / 20.0),
                    Err(_) => warn!(line = lineno + 1, "malformed %%volume directive"),
                }
                continue;
            }
            if let Some(pos) = line.find("%%transpose=") {
                let rest = &line[pos + "%%transpose=".len()..];
                let digits: String = rest
                    .chars()
                    .take_while(|c| c.is_ascii_digit() || *c == '-')
                    .collect();
                match digits.parse::<i32>() {
                    Ok(t) => transpose = t,
                    Err(_) => warn!(line = lineno + 1, "malformed %%transpose directive"),
                }
                continue;
            }

            let rule = match build_mapping_rule(line) {
                Ok(rule) => rule,
                Err(reason) => {
                    let err = SamplerError::DefinitionParseError {
                        path: definition_path.clone(),
                        line: lineno + 1,
                        reason,
                    };
                    error!(%err, "could not parse definition.txt line");
                    continue;
                }
            };

            for filename in &dir_entries {
                if cancel.is_cancelled() {
                    return Err(());
                }
                let Some(caps) = rule.pattern.captures(filename) else {
                    continue;
                };

                let mut midinote = rule.default_notename.unwrap_or(rule.default_midinote);
                let mut velocity = rule.default_velocity;

                if let Some(m) = caps.name("notename") {
                    if let Some(n) = notename_to_midinote(m.as_str()) {
                        midinote = n;
                    }
                } else if let Some(m) = caps.name("midinote") {
                    if let Ok(n) = m.as_str().parse::<u32>() {
                        if n <= 127 {
                            midinote = n as u8;
                        }
                    }
                }
                if let Some(m) = caps.name("velocity") {
                    if let Ok(v) = m.as_str().parse::<u32>() {
                        if v <= 127 {
                            velocity = v as u8;
                        }
                    }
                }

                let path = preset_dir.join(filename);
                match Sample::load(&path, midinote, velocity) {
                    Ok(sample) => {
                        debug!(file = %filename_display(&path), midinote, velocity, "mapped sample");
                        map.set(midinote, velocity, Arc::new(sample));
                        populated.insert((midinote, velocity));
                    }
                    Err(e) => {
                        warn!(file = %filename_display(&path), error = %e, "skipping unreadable sample");
                    }
                }
            }
        }
    } else {
        for note in 0..=126u8 {
            if cancel.is_cancelled() {
                return Err(());
            }
            let path = preset_dir.join(format!("{}.wav", note));
            if !path.exists() {
                continue;
            }
            match Sample::load(&path, note, 127) {
                Ok(sample) => {
                    map.set(note, 127, Arc::new(sample));
                    populated.insert((note, 127));
                }
                Err(e) => {
                    warn!(file = %filename_display(&path), error = %e, "skipping unreadable sample");
                }
            }
        }
    }

    if cancel.is_cancelled() {
        return Err(());
    }
    dense_fill_in(&mut map, &populated);

    Ok((map, volume, transpose))
}

/// Two-pass dense fill-in: within each note row, carries the first populated
/// sample backward to velocity 0 and every subsequent sample forward to the
/// next populated velocity; entirely empty rows copy the previous note's row.
fn dense_fill_in(map: &mut SampleMap, populated: &HashSet<(u8, u8)>) {
    for midinote in 0..=127u8 {
        let mut last: Option<Arc<Sample>> = None;
        let mut row_has_sample = false;

        for velocity in 0..=127u8 {
            if populated.contains(&(midinote, velocity)) {
                row_has_sample = true;
                let sample = map.get(midinote, velocity).cloned();
                if let Some(sample) = sample {
                    if last.is_none() {
                        for v in 0..velocity {
                            map.set(midinote, v, sample.clone());
                        }
                    }
                    last = Some(sample);
                }
            } else if let Some(ref sample) = last {
                map.set(midinote, velocity, sample.clone());
            }
        }

        if !row_has_sample && midinote > 0 {
            let prev_row = map.row(midinote - 1).clone();
            map.set_row(midinote, prev_row);
        }
    }
}

/// Attempts to load `preset` for a channel, checking `cancel` between every
/// file match and before the fill-in sweep.
pub fn load_preset(samples_root: &Path, preset: u8, cancel: &CancelHandle) -> LoadOutcome {
    let Some(preset_dir) = resolve_preset_dir(samples_root, preset) else {
        let err = SamplerError::PresetDirectoryMissing(preset);
        info!(%err, "leaving channel unchanged");
        return LoadOutcome::PresetEmpty;
    };

    info!(preset, dir = %preset_dir.display(), "loading preset");
    match scan_preset_dir(&preset_dir, cancel) {
        Ok((map, volume, transpose)) => {
            info!(preset, "preset loaded");
            LoadOutcome::Loaded {
                map,
                volume,
                transpose,
            }
        }
        Err(()) => {
            debug!(preset, "preset load cancelled");
            LoadOutcome::Cancelled
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write as _;
    use tempfile::tempdir;

    fn write_sine_wav(path: &Path) {
        // Minimal valid mono 16-bit PCM WAV, 4 frames.
        let mut data = Vec::new();
        data.extend_from_slice(b"RIFF");
        data.extend_from_slice(&0u32.to_le_bytes()); // patched below
        data.extend_from_slice(b"WAVE");
        data.extend_from_slice(b"fmt ");
        data.extend_from_slice(&16u32.to_le_bytes());
        data.extend_from_slice(&1u16.to_le_bytes()); // PCM
        data.extend_from_slice(&1u16.to_le_bytes()); // mono
        data.extend_from_slice(&44100u32.to_le_bytes());
        data.extend_from_slice(&88200u32.to_le_bytes());
        data.extend_from_slice(&2u16.to_le_bytes());
        data.extend_from_slice(&16u16.to_le_bytes());
        let samples: [i16; 4] = [100, -100, 200, -200];
        let sample_bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        data.extend_from_slice(b"data");
        data.extend_from_slice(&(sample_bytes.len() as u32).to_le_bytes());
        data.extend_from_slice(&sample_bytes);
        let riff_len = (data.len() - 8) as u32;
        data[4..8].copy_from_slice(&riff_len.to_le_bytes());

        let mut file = File::create(path).unwrap();
        file.write_all(&data).unwrap();
    }

    #[test]
    fn resolves_exact_space_prefixed_directory() {
        let root = tempdir().unwrap();
        fs::create_dir(root.path().join("1 Other")).unwrap();
        fs::create_dir(root.path().join("10 Grand Piano")).unwrap();

        let resolved = resolve_preset_dir(root.path(), 10).unwrap();
        assert!(resolved.ends_with("10 Grand Piano"));

        // Preset 1 must not match "10 Grand Piano".
        let resolved_one = resolve_preset_dir(root.path(), 1).unwrap();
        assert!(resolved_one.ends_with("1 Other"));
    }

    #[test]
    fn missing_preset_directory_yields_preset_empty() {
        let root = tempdir().unwrap();
        fs::create_dir(root.path().join("1 Only")).unwrap();
        let cancel = CancelHandle::new();
        match load_preset(root.path(), 99, &cancel) {
            LoadOutcome::PresetEmpty => {}
            _ => panic!("expected PresetEmpty"),
        }
    }

    #[test]
    fn fallback_mapping_without_definition_txt() {
        let root = tempdir().unwrap();
        let preset_dir = root.path().join("1 Fallback");
        fs::create_dir(&preset_dir).unwrap();
        write_sine_wav(&preset_dir.join("60.wav"));

        let cancel = CancelHandle::new();
        match load_preset(root.path(), 1, &cancel) {
            LoadOutcome::Loaded { map, .. } => {
                assert!(map.get(60, 127).is_some());
                // Dense fill-in should have carried note 60's sample across
                // all velocities and across every other note's row too.
                assert!(map.get(60, 0).is_some());
                assert!(map.get(0, 0).is_some());
            }
            _ => panic!("expected Loaded"),
        }
    }

    #[test]
    fn definition_txt_directives_and_named_captures() {
        let root = tempdir().unwrap();
        let preset_dir = root.path().join("2 Custom");
        fs::create_dir(&preset_dir).unwrap();
        write_sine_wav(&preset_dir.join("note_60_vel_100.wav"));

        let mut def = File::create(preset_dir.join("definition.txt")).unwrap();
        writeln!(def, "%%volume=-6").unwrap();
        writeln!(def, "%%transpose=2").unwrap();
        writeln!(def, "note_%midinote_vel_%velocity.wav").unwrap();
        drop(def);

        let cancel = CancelHandle::new();
        match load_preset(root.path(), 2, &cancel) {
            LoadOutcome::Loaded {
                map,
                volume,
                transpose,
            } => {
                assert!(map.get(60, 100).is_some());
                assert_eq!(transpose, 2);
                assert!(volume < DEFAULT_VOLUME);
            }
            _ => panic!("expected Loaded"),
        }
    }

    #[test]
    fn notename_default_is_honored_when_no_capture_present() {
        let root = tempdir().unwrap();
        let preset_dir = root.path().join("3 Kick");
        fs::create_dir(&preset_dir).unwrap();
        write_sine_wav(&preset_dir.join("kick.wav"));

        let mut def = File::create(preset_dir.join("definition.txt")).unwrap();
        writeln!(def, "kick.wav, %notename=c2").unwrap();
        drop(def);

        let cancel = CancelHandle::new();
        match load_preset(root.path(), 3, &cancel) {
            LoadOutcome::Loaded { map, .. } => {
                let expected = notename_to_midinote("c2").unwrap();
                assert!(map.get(expected, 127).is_some());
                assert!(map.get(0, 127).is_none());
            }
            _ => panic!("expected Loaded"),
        }
    }

    #[test]
    fn notename_placeholder_resolves_to_midinote() {
        assert_eq!(notename_to_midinote("c4"), Some(72));
        assert_eq!(notename_to_midinote("C4"), Some(72));
        assert_eq!(notename_to_midinote("c#4"), Some(73));
    }

    #[test]
    fn dense_fill_in_carries_backward_forward_and_across_rows() {
        let mut map = SampleMap::empty();
        let mut populated = HashSet::new();
        let sample = Arc::new(Sample::for_test(60, 40, vec![0; 16], 3, None));
        map.set(60, 40, sample);
        populated.insert((60, 40));

        dense_fill_in(&mut map, &populated);

        // Backward carry to velocity 0.
        assert!(map.get(60, 0).is_some());
        // Forward carry to velocity 127.
        assert!(map.get(60, 127).is_some());
        // Row 61 had nothing of its own, so it copies row 60.
        assert!(map.get(61, 0).is_some());
        // Row 0 stays empty: no predecessor to copy from.
        if populated.iter().all(|(n, _)| *n != 0) {
            assert!(map.get(0, 0).is_none());
        }
    }
}
