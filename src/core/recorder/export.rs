//! File writers for a recorded take: WAV audio, single-track MIDI and a
//! plain-text note log.

use serde::{Serialize, Deserialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use anyhow::{bail, Context, Result};
use super::NoteEvent;

/// Ticks per quarter note written to the MIDI header
pub const MIDI_DIVISION: u16 = 480;

/// Canonical RIFF/WAVE header length for mono 16-bit PCM
pub const WAV_HEADER_LEN: u64 = 44;

const NOTE_ON: u8 = 0x90;
const NOTE_OFF: u8 = 0x80;

/// How MIDI delta times are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaEncoding {
    /// One byte per delta; gaps of 128 ticks or more collapse to 0
    #[default]
    SingleByte,
    /// Standard variable-length quantities
    VariableLength,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Wav,
    Midi,
    Text,
}

impl ExportFormat {
    /// `.wav` is audio, `.mid`/`.midi` is MIDI, anything else gets the text log
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("wav") => ExportFormat::Wav,
            Some("mid") | Some("midi") => ExportFormat::Midi,
            _ => ExportFormat::Text,
        }
    }
}

/// Write mono 16-bit PCM. Samples are clamped to [-1, 1] and scaled by 32767.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    if samples.is_empty() {
        bail!("No audio data to export");
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Could not open {} for writing", path.display()))?;
    for &sample in samples {
        writer.write_sample(pcm16(sample))
            .with_context(|| format!("Failed writing audio to {}", path.display()))?;
    }
    writer.finalize()
        .with_context(|| format!("Failed to finalize {}", path.display()))?;

    Ok(())
}

fn pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16
}

/// Encode a Type-0 file with one track at `MIDI_DIVISION` ticks per quarter note
pub fn encode_midi(events: &[NoteEvent], encoding: DeltaEncoding) -> Vec<u8> {
    let mut track = Vec::with_capacity(events.len() * 4 + 4);
    let mut last_time = 0.0;

    for event in events {
        let ticks = ((event.timestamp - last_time).max(0.0) * MIDI_DIVISION as f64) as u32;
        write_delta(&mut track, ticks, encoding);

        track.push(if event.is_note_on { NOTE_ON } else { NOTE_OFF });
        track.push(event.note.min(127));
        track.push((event.velocity.clamp(0.0, 1.0) * 127.0) as u8);

        last_time = event.timestamp;
    }

    // End of track
    track.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);

    let mut bytes = Vec::with_capacity(22 + track.len());
    bytes.extend_from_slice(b"MThd");
    bytes.extend_from_slice(&6u32.to_be_bytes());
    bytes.extend_from_slice(&0u16.to_be_bytes()); // format 0
    bytes.extend_from_slice(&1u16.to_be_bytes()); // one track
    bytes.extend_from_slice(&MIDI_DIVISION.to_be_bytes());
    bytes.extend_from_slice(b"MTrk");
    bytes.extend_from_slice(&(track.len() as u32).to_be_bytes());
    bytes.extend_from_slice(&track);
    bytes
}

fn write_delta(track: &mut Vec<u8>, ticks: u32, encoding: DeltaEncoding) {
    match encoding {
        DeltaEncoding::SingleByte => {
            track.push(if ticks < 128 { ticks as u8 } else { 0 });
        },
        DeltaEncoding::VariableLength => {
            // 7 bits per byte, most significant group first, continuation bit on all but the last
            let ticks = ticks.min(0x0FFF_FFFF);
            let mut groups = [0u8; 4];
            let mut count = 0;
            let mut value = ticks;
            loop {
                groups[count] = (value & 0x7F) as u8;
                count += 1;
                value >>= 7;
                if value == 0 {
                    break;
                }
            }
            for i in (0..count).rev() {
                let continuation = if i > 0 { 0x80 } else { 0 };
                track.push(groups[i] | continuation);
            }
        },
    }
}

pub fn write_midi(path: &Path, events: &[NoteEvent], encoding: DeltaEncoding) -> Result<()> {
    let bytes = encode_midi(events, encoding);
    std::fs::write(path, bytes)
        .with_context(|| format!("Could not write MIDI file {}", path.display()))
}

/// Render the note log: two comment lines, then `timestamp note velocity on|off`
pub fn format_note_log(events: &[NoteEvent]) -> String {
    let mut out = String::from("# voxsynth note events\n# Format: timestamp note velocity on/off\n");
    for event in events {
        out.push_str(&event.to_log_line());
        out.push('\n');
    }
    out
}

pub fn write_note_log(path: &Path, events: &[NoteEvent]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Could not open {} for writing", path.display()))?;
    let mut writer = BufWriter::new(file);
    writer.write_all(format_note_log(events).as_bytes())
        .with_context(|| format!("Failed writing note events to {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(timestamp: f64, note: u8, velocity: f32, is_note_on: bool) -> NoteEvent {
        NoteEvent { timestamp, note, velocity, is_note_on }
    }

    #[test]
    fn wav_size_is_header_plus_two_bytes_per_sample() {
        let dir = tempfile::tempdir().unwrap();
        for n in [1usize, 100, 4411] {
            let path = dir.path().join(format!("take{}.wav", n));
            let samples: Vec<f32> = (0..n).map(|i| (i as f32 * 0.01).sin()).collect();
            write_wav(&path, &samples, 44100).unwrap();
            let len = std::fs::metadata(&path).unwrap().len();
            assert_eq!(len, WAV_HEADER_LEN + 2 * n as u64);
        }
    }

    #[test]
    fn wav_samples_are_clamped_and_rounded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clamp.wav");
        write_wav(&path, &[2.0, -2.0, 0.5, 0.0], 22050).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 22050);
        assert_eq!(reader.spec().channels, 1);
        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, vec![32767, -32767, 16384, 0]);
    }

    #[test]
    fn empty_wav_export_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_wav(&dir.path().join("empty.wav"), &[], 44100).is_err());
    }

    #[test]
    fn midi_layout_and_simplified_deltas() {
        let events = [
            event(0.0, 60, 1.0, true),
            event(0.1, 60, 0.0, false), // 48 ticks
            event(1.0, 64, 0.5, true),  // 432 ticks, collapsed
        ];
        let bytes = encode_midi(&events, DeltaEncoding::SingleByte);

        assert_eq!(&bytes[0..4], b"MThd");
        assert_eq!(&bytes[4..8], &[0, 0, 0, 6]);
        assert_eq!(&bytes[8..14], &[0, 0, 0, 1, 0x01, 0xE0]);
        assert_eq!(&bytes[14..18], b"MTrk");
        let track_len = u32::from_be_bytes([bytes[18], bytes[19], bytes[20], bytes[21]]) as usize;
        let track = &bytes[22..];
        assert_eq!(track.len(), track_len);
        assert_eq!(
            track,
            &[
                0, 0x90, 60, 127,
                48, 0x80, 60, 0,
                0, 0x90, 64, 63,
                0x00, 0xFF, 0x2F, 0x00,
            ]
        );
    }

    #[test]
    fn variable_length_deltas_keep_long_gaps() {
        let events = [event(0.0, 60, 1.0, true), event(1.0, 60, 0.0, false)];
        let bytes = encode_midi(&events, DeltaEncoding::VariableLength);
        // 480 ticks = 0b11_1100000 -> 0x83 0x60
        assert_eq!(&bytes[22..30], &[0, 0x90, 60, 127, 0x83, 0x60, 0x80, 60]);
    }

    #[test]
    fn empty_midi_is_just_end_of_track() {
        let bytes = encode_midi(&[], DeltaEncoding::SingleByte);
        assert_eq!(bytes.len(), 26);
        assert_eq!(&bytes[22..], &[0x00, 0xFF, 0x2F, 0x00]);
    }

    #[test]
    fn format_dispatch_by_extension() {
        assert_eq!(ExportFormat::from_path(Path::new("a.wav")), ExportFormat::Wav);
        assert_eq!(ExportFormat::from_path(Path::new("a.WAV")), ExportFormat::Wav);
        assert_eq!(ExportFormat::from_path(Path::new("a.mid")), ExportFormat::Midi);
        assert_eq!(ExportFormat::from_path(Path::new("a.midi")), ExportFormat::Midi);
        assert_eq!(ExportFormat::from_path(Path::new("a.txt")), ExportFormat::Text);
        assert_eq!(ExportFormat::from_path(Path::new("notes")), ExportFormat::Text);
    }

    #[test]
    fn note_log_has_header_then_one_line_per_event() {
        let log = format_note_log(&[event(0.0, 69, 0.5, true), event(0.25, 69, 0.0, false)]);
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with('#') && lines[1].starts_with('#'));
        assert_eq!(lines[2], "0.000000 69 0.5 on");
        assert_eq!(lines[3], "0.250000 69 0 off");
    }
}
