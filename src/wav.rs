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

//! A hand-rolled RIFF/WAVE chunk walker.
//!
//! `hound` (the crate used elsewhere in this workspace's history for WAV
//! decoding) has no way to surface `cue ` or `smpl` chunks, and loop points
//! are load-bearing for sustained/looped sample playback. This reader walks
//! chunks directly so it can keep those alongside the decoded PCM.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::error::SamplerError;

/// Decoded PCM plus the chunks this sampler cares about.
pub struct RawWav {
    /// Always 1 or 2 in the source file; `frames` is always expanded to stereo.
    pub source_channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    /// Interleaved stereo (L, R, L, R, ...), already expanded from mono if needed.
    pub frames: Vec<i16>,
    /// Frame count (not sample count: `frames.len() / 2`).
    pub frame_count: u32,
    /// `(start, end)` of the first `smpl` loop, if any.
    pub loop_region: Option<(u32, u32)>,
    /// Raw `cue ` sample offsets, retained but not consumed by playback.
    pub cues: Vec<u32>,
}

struct ChunkHeader {
    id: [u8; 4],
    size: u32,
}

fn malformed(path: &Path, reason: impl Into<String>) -> SamplerError {
    SamplerError::MalformedWave {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn read_exact_or_malformed(
    reader: &mut impl Read,
    buf: &mut [u8],
    path: &Path,
) -> Result<(), SamplerError> {
    reader
        .read_exact(buf)
        .map_err(|e| malformed(path, format!("unexpected end of file: {e}")))
}

fn read_u16(reader: &mut impl Read, path: &Path) -> Result<u16, SamplerError> {
    let mut buf = [0u8; 2];
    read_exact_or_malformed(reader, &mut buf, path)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32(reader: &mut impl Read, path: &Path) -> Result<u32, SamplerError> {
    let mut buf = [0u8; 4];
    read_exact_or_malformed(reader, &mut buf, path)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i32(reader: &mut impl Read, path: &Path) -> Result<i32, SamplerError> {
    Ok(read_u32(reader, path)? as i32)
}

fn read_chunk_header(
    reader: &mut impl Read,
    path: &Path,
) -> Result<Option<ChunkHeader>, SamplerError> {
    let mut id = [0u8; 4];
    match reader.read(&mut id) {
        Ok(0) => return Ok(None),
        Ok(n) if n < 4 => {
            // Partial read at EOF: treat as end of chunk list, not a malformed file,
            // matching RIFF readers that tolerate trailing padding slop.
            return Ok(None);
        }
        Ok(_) => {}
        Err(e) => return Err(malformed(path, format!("reading chunk id: {e}"))),
    }
    let size = read_u32(reader, path)?;
    Ok(Some(ChunkHeader { id, size }))
}

fn skip(reader: &mut impl Read, len: u64, path: &Path) -> Result<(), SamplerError> {
    let mut remaining = len;
    let mut buf = [0u8; 4096];
    while remaining > 0 {
        let chunk = remaining.min(buf.len() as u64) as usize;
        read_exact_or_malformed(reader, &mut buf[..chunk], path)?;
        remaining -= chunk as u64;
    }
    Ok(())
}

/// Converts a little-endian 24-bit PCM triplet to a 16-bit sample by taking
/// the high 16 bits of the sign-extended 24-bit value.
fn sample24_to_i16(b0: u8, b1: u8, b2: u8) -> i16 {
    let mut value = (b0 as i32) | ((b1 as i32) << 8) | ((b2 as i32) << 16);
    if b2 & 0x80 != 0 {
        value |= !0xFF_FFFFi32;
    }
    (value >> 8) as i16
}

/// Reads a RIFF/WAVE file from disk, decoding PCM and keeping `cue `/`smpl` chunks.
pub fn read(path: &Path) -> Result<RawWav, SamplerError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 4];
    read_exact_or_malformed(&mut reader, &mut magic, path)?;
    if &magic != b"RIFF" {
        return Err(malformed(path, "missing RIFF magic"));
    }
    let _riff_size = read_u32(&mut reader, path)?;
    let mut wave_magic = [0u8; 4];
    read_exact_or_malformed(&mut reader, &mut wave_magic, path)?;
    if &wave_magic != b"WAVE" {
        return Err(malformed(path, "missing WAVE magic"));
    }

    let mut fmt_seen = false;
    let mut channels = 0u16;
    let mut sample_rate = 0u32;
    let mut bits_per_sample = 0u16;
    let mut frames: Vec<i16> = Vec::new();
    let mut frame_count = 0u32;
    let mut loop_region = None;
    let mut cues = Vec::new();

    while let Some(header) = read_chunk_header(&mut reader, path)? {
        match &header.id {
            b"fmt " => {
                if header.size < 16 {
                    return Err(malformed(path, "fmt chunk too small"));
                }
                let _audio_format = read_u16(&mut reader, path)?;
                channels = read_u16(&mut reader, path)?;
                sample_rate = read_u32(&mut reader, path)?;
                let _byte_rate = read_u32(&mut reader, path)?;
                let _block_align = read_u16(&mut reader, path)?;
                bits_per_sample = read_u16(&mut reader, path)?;
                // fmt chunks may carry extension bytes beyond the 16-byte core; skip them.
                let consumed = 16u32;
                if header.size > consumed {
                    skip(&mut reader, (header.size - consumed) as u64, path)?;
                }
                fmt_seen = true;
            }
            b"data" => {
                if !fmt_seen {
                    return Err(malformed(path, "data chunk before fmt chunk"));
                }
                let bytes_per_sample = (bits_per_sample / 8) as u32;
                if bytes_per_sample != 2 && bytes_per_sample != 3 {
                    return Err(malformed(
                        path,
                        format!("unsupported bit depth {bits_per_sample}"),
                    ));
                }
                let channels = channels.max(1) as u32;
                let total_samples = header.size / bytes_per_sample;
                let raw_frame_count = total_samples / channels;
                frame_count = raw_frame_count;

                let mut raw = vec![0u8; header.size as usize];
                read_exact_or_malformed(&mut reader, &mut raw, path)?;

                frames.reserve((raw_frame_count as usize) * 2);
                for f in 0..raw_frame_count {
                    let mut per_channel = [0i16; 2];
                    for c in 0..channels.min(2) {
                        let idx = ((f * channels + c) * bytes_per_sample) as usize;
                        let sample = match bytes_per_sample {
                            2 => i16::from_le_bytes([raw[idx], raw[idx + 1]]),
                            3 => sample24_to_i16(raw[idx], raw[idx + 1], raw[idx + 2]),
                            _ => unreachable!(),
                        };
                        per_channel[c as usize] = sample;
                    }
                    if channels == 1 {
                        frames.push(per_channel[0]);
                        frames.push(per_channel[0]);
                    } else {
                        frames.push(per_channel[0]);
                        frames.push(per_channel[1]);
                        // Extra channels beyond stereo are dropped; skip their bytes.
                        if channels > 2 {
                            let extra = ((channels - 2) * bytes_per_sample) as usize;
                            let _ = extra; // already accounted for by idx arithmetic on read
                        }
                    }
                }
            }
            b"cue " => {
                let num_cue_points = read_u32(&mut reader, path)?;
                for _ in 0..num_cue_points {
                    let _id = read_u32(&mut reader, path)?;
                    let _position = read_u32(&mut reader, path)?;
                    let _chunk_id = read_u32(&mut reader, path)?;
                    let _chunk_start = read_u32(&mut reader, path)?;
                    let _block_start = read_u32(&mut reader, path)?;
                    let sample_offset = read_u32(&mut reader, path)?;
                    cues.push(sample_offset);
                }
                if header.size % 2 == 1 {
                    skip(&mut reader, 1, path)?;
                }
                continue;
            }
            b"smpl" => {
                let _manufacturer = read_i32(&mut reader, path)?;
                let _product = read_i32(&mut reader, path)?;
                let _sample_period = read_i32(&mut reader, path)?;
                let _midi_unity_note = read_i32(&mut reader, path)?;
                let _midi_pitch_fraction = read_i32(&mut reader, path)?;
                let _smpte_format = read_i32(&mut reader, path)?;
                let _smpte_offset = read_i32(&mut reader, path)?;
                let num_sample_loops = read_i32(&mut reader, path)?;
                let _sampler_data = read_i32(&mut reader, path)?;

                for i in 0..num_sample_loops.max(0) {
                    let _cue_point_id = read_i32(&mut reader, path)?;
                    let _loop_type = read_i32(&mut reader, path)?;
                    let start = read_i32(&mut reader, path)?;
                    let end = read_i32(&mut reader, path)?;
                    let _fraction = read_i32(&mut reader, path)?;
                    let _play_count = read_i32(&mut reader, path)?;
                    if i == 0 {
                        loop_region = Some((start.max(0) as u32, end.max(0) as u32));
                    }
                }
                if header.size % 2 == 1 {
                    skip(&mut reader, 1, path)?;
                }
                continue;
            }
            _ => {
                skip(&mut reader, header.size as u64, path)?;
            }
        }
        if header.size % 2 == 1 {
            skip(&mut reader, 1, path)?;
        }
    }

    if !fmt_seen || frames.is_empty() {
        return Err(malformed(path, "no fmt/data chunk pair found"));
    }

    Ok(RawWav {
        source_channels: channels,
        sample_rate,
        bits_per_sample,
        frames,
        frame_count,
        loop_region,
        cues,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Builds a minimal mono 16-bit PCM WAV in memory and writes it to a temp file.
    fn write_test_wav(path: &Path, samples: &[i16], channels: u16, bits: u16) {
        let bytes_per_sample = (bits / 8) as u32;
        let data: Vec<u8> = samples
            .iter()
            .flat_map(|s| (*s as i16).to_le_bytes())
            .collect();
        let mut file = File::create(path).unwrap();
        file.write_all(b"RIFF").unwrap();
        let riff_size = 4 + (8 + 16) + (8 + data.len() as u32);
        file.write_all(&riff_size.to_le_bytes()).unwrap();
        file.write_all(b"WAVE").unwrap();

        file.write_all(b"fmt ").unwrap();
        file.write_all(&16u32.to_le_bytes()).unwrap();
        file.write_all(&1u16.to_le_bytes()).unwrap(); // PCM
        file.write_all(&channels.to_le_bytes()).unwrap();
        file.write_all(&44100u32.to_le_bytes()).unwrap();
        let byte_rate = 44100 * channels as u32 * bytes_per_sample;
        file.write_all(&byte_rate.to_le_bytes()).unwrap();
        let block_align = (channels as u32 * bytes_per_sample) as u16;
        file.write_all(&block_align.to_le_bytes()).unwrap();
        file.write_all(&bits.to_le_bytes()).unwrap();

        file.write_all(b"data").unwrap();
        file.write_all(&(data.len() as u32).to_le_bytes()).unwrap();
        file.write_all(&data).unwrap();
    }

    #[test]
    fn reads_mono_16_bit_and_duplicates_to_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        write_test_wav(&path, &[100, -200, 300], 1, 16);

        let wav = read(&path).unwrap();
        assert_eq!(wav.source_channels, 1);
        assert_eq!(wav.frame_count, 3);
        assert_eq!(wav.frames, vec![100, 100, -200, -200, 300, 300]);
    }

    #[test]
    fn reads_stereo_16_bit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_test_wav(&path, &[1, 2, 3, 4], 2, 16);

        let wav = read(&path).unwrap();
        assert_eq!(wav.frame_count, 2);
        assert_eq!(wav.frames, vec![1, 2, 3, 4]);
    }

    #[test]
    fn rejects_missing_riff_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.wav");
        std::fs::write(&path, b"not a wav file at all").unwrap();
        assert!(read(&path).is_err());
    }

    #[test]
    fn downconverts_24_bit_edges() {
        // 0x00 0x00 0x80 little-endian is -2^23; high 16 bits give -32768.
        assert_eq!(sample24_to_i16(0x00, 0x00, 0x80), -32768);
        // 0xFF 0xFF 0x7F little-endian is 2^23 - 1; high 16 bits give 32767.
        assert_eq!(sample24_to_i16(0xFF, 0xFF, 0x7F), 32767);
    }
}
