//! Performance capture and replay.
//!
//! While recording, the recorder keeps every rendered sample and every note
//! event stamped against a clock that advances one sample period per
//! recorded sample. Playback walks the same event list on a separate clock.

mod export;

pub use self::export::{
    encode_midi, format_note_log, write_midi, write_note_log, write_wav, DeltaEncoding,
    ExportFormat, MIDI_DIVISION, WAV_HEADER_LEN,
};

use std::path::Path;
use anyhow::{anyhow, bail, Context, Result};

/// Seconds of playback kept running after the last event so release tails can ring out
pub const PLAYBACK_TAIL: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    /// Seconds since recording started
    pub timestamp: f64,
    pub note: u8,
    pub velocity: f32,
    pub is_note_on: bool,
}

impl NoteEvent {
    /// Timestamps are written to the microsecond
    pub fn to_log_line(&self) -> String {
        format!(
            "{:.6} {} {} {}",
            self.timestamp,
            self.note,
            self.velocity,
            if self.is_note_on { "on" } else { "off" }
        )
    }
}

/// Parse a note log in the text export format. Blank lines and `#` comments are skipped.
pub fn parse_note_log(text: &str) -> Result<Vec<NoteEvent>> {
    let mut events = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 4 {
            bail!("line {}: expected 4 fields, found {}", line_no + 1, fields.len());
        }

        let timestamp: f64 = fields[0].parse()
            .with_context(|| format!("line {}: bad timestamp '{}'", line_no + 1, fields[0]))?;
        let note: u8 = fields[1].parse()
            .with_context(|| format!("line {}: bad note '{}'", line_no + 1, fields[1]))?;
        let velocity: f32 = fields[2].parse()
            .with_context(|| format!("line {}: bad velocity '{}'", line_no + 1, fields[2]))?;
        let is_note_on = match fields[3] {
            "on" => true,
            "off" => false,
            other => return Err(anyhow!("line {}: expected on/off, found '{}'", line_no + 1, other)),
        };

        if !timestamp.is_finite() || timestamp < 0.0 {
            bail!("line {}: timestamp must be a non-negative number", line_no + 1);
        }

        events.push(NoteEvent {
            timestamp,
            note: note.min(127),
            velocity: velocity.clamp(0.0, 1.0),
            is_note_on,
        });
    }

    events.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    Ok(events)
}

/// Owned copy of a recording, detached from the live recorder for export
#[derive(Debug, Clone, Default)]
pub struct Take {
    pub sample_rate: u32,
    pub events: Vec<NoteEvent>,
    pub samples: Vec<f32>,
}

impl Take {
    /// Write the take in the format implied by the file extension
    pub fn export_to_file(&self, path: &Path, encoding: DeltaEncoding) -> Result<ExportFormat> {
        let format = ExportFormat::from_path(path);
        match format {
            ExportFormat::Wav => write_wav(path, &self.samples, self.sample_rate)?,
            ExportFormat::Midi => write_midi(path, &self.events, encoding)?,
            ExportFormat::Text => write_note_log(path, &self.events)?,
        }
        Ok(format)
    }

    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

#[derive(Debug, Clone)]
pub struct Recorder {
    sample_rate: u32,
    events: Vec<NoteEvent>,
    samples: Vec<f32>,
    recording: bool,
    recording_time: f64,

    playing: bool,
    playback_time: f64,
    playback_index: usize,
    pending: Vec<NoteEvent>,
}

impl Recorder {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            events: Vec::new(),
            samples: Vec::new(),
            recording: false,
            recording_time: 0.0,
            playing: false,
            playback_time: 0.0,
            playback_index: 0,
            pending: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Start a new take, discarding the previous one
    pub fn start_recording(&mut self) {
        self.events.clear();
        self.samples.clear();
        self.recording_time = 0.0;
        self.recording = true;
    }

    pub fn stop_recording(&mut self) {
        self.recording = false;
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn record_note_event(&mut self, note: u8, velocity: f32, is_note_on: bool) {
        if !self.recording {
            return;
        }
        self.events.push(NoteEvent {
            timestamp: self.recording_time,
            note,
            velocity,
            is_note_on,
        });
    }

    pub fn record_audio_sample(&mut self, sample: f32) {
        if !self.recording {
            return;
        }
        self.samples.push(sample);
        self.recording_time += 1.0 / self.sample_rate as f64;
    }

    /// Begin replaying the recorded events. Does nothing when there are none.
    pub fn start_playback(&mut self) {
        if self.events.is_empty() {
            return;
        }
        self.playing = true;
        self.playback_time = 0.0;
        self.playback_index = 0;
        self.pending.clear();
    }

    pub fn stop_playback(&mut self) {
        self.playing = false;
        self.pending.clear();
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Advance the playback clock and queue every event that has come due
    pub fn process_playback(&mut self, delta_time: f64) {
        if !self.playing {
            return;
        }

        self.pending.clear();
        self.playback_time += delta_time;

        while let Some(event) = self.events.get(self.playback_index) {
            if event.timestamp > self.playback_time {
                break;
            }
            self.pending.push(*event);
            self.playback_index += 1;
        }

        if self.playback_index >= self.events.len()
            && self.playback_time > self.recording_time + PLAYBACK_TAIL
        {
            self.playing = false;
        }
    }

    /// Events drained by the last `process_playback` call
    pub fn events_to_play(&self) -> &[NoteEvent] {
        &self.pending
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.samples.clear();
        self.pending.clear();
        self.recording_time = 0.0;
        self.playback_time = 0.0;
        self.playback_index = 0;
        self.recording = false;
        self.playing = false;
    }

    /// Replace the event list with an externally supplied performance, ready for playback
    pub fn load_events(&mut self, mut events: Vec<NoteEvent>) {
        self.clear();
        events.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        self.recording_time = events.last().map_or(0.0, |e| e.timestamp);
        self.events = events;
    }

    pub fn events(&self) -> &[NoteEvent] {
        &self.events
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn recording_time(&self) -> f64 {
        self.recording_time
    }

    pub fn playback_time(&self) -> f64 {
        self.playback_time
    }

    /// Snapshot the current take
    pub fn take(&self) -> Take {
        Take {
            sample_rate: self.sample_rate,
            events: self.events.clone(),
            samples: self.samples.clone(),
        }
    }
}
