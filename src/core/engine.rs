//! Real-time boundary between the audio device and the synth.
//!
//! Everything the render callback touches lives in one [`EngineState`]
//! behind a single mutex. The callback holds the lock for a whole buffer;
//! control calls take it briefly to flip a parameter or queue a note.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat, Stream};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use anyhow::{anyhow, bail, Context, Result};
use log::{debug, error, info, warn};

use crate::core::analyzer::SpectrumAnalyzer;
use crate::core::config::EngineConfig;
use crate::core::oscillator::Waveform;
use crate::core::recorder::{ExportFormat, NoteEvent, Recorder};
use crate::core::synth::preset::SynthPreset;
use crate::core::synth::{StealPolicy, Synth};

/// State shared between the render callback and control calls
pub struct EngineState {
    pub synth: Synth,
    pub recorder: Recorder,
    spectral_ring: Vec<f32>,
    ring_index: usize,
    sample_rate: u32,
}

impl EngineState {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            synth: Synth::with_config(config),
            recorder: Recorder::new(config.sample_rate),
            spectral_ring: vec![0.0; config.spectral_ring_size.max(1)],
            ring_index: 0,
            sample_rate: config.sample_rate.max(1),
        }
    }

    /// Fill `out` with the next `out.len()` samples
    pub fn render(&mut self, out: &mut [f32]) {
        if self.recorder.is_playing() {
            let delta_time = out.len() as f64 / self.sample_rate as f64;
            self.recorder.process_playback(delta_time);
            for event in self.recorder.events_to_play() {
                if event.is_note_on {
                    self.synth.note_on(event.note, event.velocity);
                } else {
                    self.synth.note_off(event.note);
                }
            }
        }

        for slot in out.iter_mut() {
            let sample = self.synth.process();
            *slot = sample;

            self.recorder.record_audio_sample(sample);

            self.spectral_ring[self.ring_index] = sample;
            self.ring_index = (self.ring_index + 1) % self.spectral_ring.len();
        }
    }

    /// Copy of the spectral ring, oldest sample first
    pub fn fft_snapshot(&self) -> Vec<f32> {
        let mut snapshot = Vec::with_capacity(self.spectral_ring.len());
        snapshot.extend_from_slice(&self.spectral_ring[self.ring_index..]);
        snapshot.extend_from_slice(&self.spectral_ring[..self.ring_index]);
        snapshot
    }

    pub fn note_on(&mut self, note: u8, velocity: f32) {
        if !velocity.is_finite() {
            return;
        }
        let velocity = velocity.clamp(0.0, 1.0);
        self.synth.note_on(note, velocity);
        self.recorder.record_note_event(note, velocity, true);
    }

    pub fn note_off(&mut self, note: u8) {
        self.synth.note_off(note);
        self.recorder.record_note_event(note, 0.0, false);
    }
}

fn lock_state(state: &Mutex<EngineState>) -> MutexGuard<'_, EngineState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the output stream and the shared engine state
pub struct AudioEngine {
    config: EngineConfig,
    state: Arc<Mutex<EngineState>>,
    stream: Option<Stream>,
    running: bool,
}

impl AudioEngine {
    /// Engine with no output device. Audio is produced only by calling [`render`](Self::render).
    pub fn headless(config: EngineConfig) -> Self {
        let config = config.sanitized();
        let state = EngineState::new(&config);
        Self {
            config,
            state: Arc::new(Mutex::new(state)),
            stream: None,
            running: false,
        }
    }

    pub fn new() -> Self {
        Self::headless(EngineConfig::default())
    }

    /// Reset the engine state and open the default output device.
    ///
    /// The stream is built paused; call [`start`](Self::start) to begin
    /// rendering. On failure no stream is left open.
    pub fn initialize(&mut self, sample_rate: u32, frames_per_buffer: u32) -> Result<()> {
        self.shutdown();

        self.config.sample_rate = sample_rate;
        self.config.frames_per_buffer = frames_per_buffer;
        self.config = self.config.clone().sanitized();

        *lock_state(&self.state) = EngineState::new(&self.config);

        let stream = open_output_stream(&self.config, Arc::clone(&self.state))?;
        self.stream = Some(stream);
        info!(
            "Audio engine initialized at {} Hz, {} frames per buffer",
            self.config.sample_rate, self.config.frames_per_buffer
        );
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| anyhow!("Audio engine is not initialized"))?;
        stream.play().context("Failed to start audio stream")?;
        self.running = true;
        info!("Audio stream started");
        Ok(())
    }

    /// Stop delivering callbacks. A callback already running completes.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        if let Some(stream) = &self.stream {
            if let Err(err) = stream.pause() {
                warn!("Failed to pause audio stream: {}", err);
            }
        }
        self.running = false;
        info!("Audio stream stopped");
    }

    /// Stop and release the output stream
    pub fn shutdown(&mut self) {
        self.stop();
        if self.stream.take().is_some() {
            debug!("Audio stream closed");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.stream.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Run `f` with the state locked
    pub fn with_state<R>(&self, f: impl FnOnce(&mut EngineState) -> R) -> R {
        let mut state = lock_state(&self.state);
        f(&mut state)
    }

    /// Render directly into `out`, the same way the device callback does
    pub fn render(&self, out: &mut [f32]) {
        self.with_state(|state| state.render(out));
    }

    pub fn note_on(&self, note: u8, velocity: f32) {
        self.with_state(|state| state.note_on(note, velocity));
    }

    pub fn note_off(&self, note: u8) {
        self.with_state(|state| state.note_off(note));
    }

    pub fn all_notes_off(&self) {
        self.with_state(|state| state.synth.all_notes_off());
    }

    pub fn set_attack(&self, attack: f32) {
        self.with_state(|state| state.synth.set_attack(attack));
    }

    pub fn set_decay(&self, decay: f32) {
        self.with_state(|state| state.synth.set_decay(decay));
    }

    pub fn set_sustain(&self, sustain: f32) {
        self.with_state(|state| state.synth.set_sustain(sustain));
    }

    pub fn set_release(&self, release: f32) {
        self.with_state(|state| state.synth.set_release(release));
    }

    pub fn set_waveform(&self, waveform: Waveform) {
        self.with_state(|state| state.synth.set_waveform(waveform));
    }

    pub fn set_oscillator_count(&self, count: usize) {
        self.with_state(|state| state.synth.set_oscillator_count(count));
    }

    pub fn set_vibrato_rate(&self, rate: f32) {
        self.with_state(|state| state.synth.set_vibrato_rate(rate));
    }

    pub fn set_vibrato_depth(&self, depth: f32) {
        self.with_state(|state| state.synth.set_vibrato_depth(depth));
    }

    pub fn set_reverb_mix(&self, mix: f32) {
        self.with_state(|state| state.synth.set_reverb_mix(mix));
    }

    pub fn set_reverb_room_size(&self, room_size: f32) {
        self.with_state(|state| state.synth.set_reverb_room_size(room_size));
    }

    pub fn set_reverb_damping(&self, damping: f32) {
        self.with_state(|state| state.synth.set_reverb_damping(damping));
    }

    pub fn set_delay_mix(&self, mix: f32) {
        self.with_state(|state| state.synth.set_delay_mix(mix));
    }

    pub fn set_delay_time(&self, time: f32) {
        self.with_state(|state| state.synth.set_delay_time(time));
    }

    pub fn set_delay_feedback(&self, feedback: f32) {
        self.with_state(|state| state.synth.set_delay_feedback(feedback));
    }

    pub fn set_steal_policy(&self, policy: StealPolicy) {
        self.with_state(|state| state.synth.set_steal_policy(policy));
    }

    pub fn active_voice_count(&self) -> usize {
        self.with_state(|state| state.synth.active_voice_count())
    }

    pub fn start_recording(&self) {
        self.with_state(|state| state.recorder.start_recording());
        info!("Recording started");
    }

    pub fn stop_recording(&self) {
        let (events, samples) = self.with_state(|state| {
            state.recorder.stop_recording();
            (state.recorder.events().len(), state.recorder.samples().len())
        });
        info!("Recording stopped: {} note events, {} samples", events, samples);
    }

    pub fn is_recording(&self) -> bool {
        self.with_state(|state| state.recorder.is_recording())
    }

    pub fn start_playback(&self) {
        let playing = self.with_state(|state| {
            state.recorder.start_playback();
            state.recorder.is_playing()
        });
        if !playing {
            warn!("Nothing to play back");
        }
    }

    pub fn stop_playback(&self) {
        self.with_state(|state| state.recorder.stop_playback());
    }

    pub fn is_playing(&self) -> bool {
        self.with_state(|state| state.recorder.is_playing())
    }

    /// Replace the recorded performance with `events`, ready for playback
    pub fn load_performance(&self, events: Vec<NoteEvent>) {
        self.with_state(|state| state.recorder.load_events(events));
    }

    pub fn clear_recording(&self) {
        self.with_state(|state| state.recorder.clear());
    }

    /// Export the current take, choosing the format from the file extension.
    ///
    /// The take is copied under the lock and written after it is released.
    pub fn export_to_file(&self, path: &Path) -> Result<ExportFormat> {
        let take = self.with_state(|state| state.recorder.take());
        let format = take
            .export_to_file(path, self.config.midi_delta_encoding)
            .with_context(|| format!("Export to {} failed", path.display()))?;
        info!("Exported {:?} to {}", format, path.display());
        Ok(format)
    }

    /// Snapshot of the most recent rendered samples, oldest first
    pub fn fft_data(&self) -> Vec<f32> {
        self.with_state(|state| state.fft_snapshot())
    }

    /// Analyze the current spectral snapshot outside the lock
    pub fn spectrum(&self, analyzer: &mut SpectrumAnalyzer) -> Result<()> {
        let snapshot = self.fft_data();
        analyzer.process_buffer(&snapshot)
    }

    pub fn apply_preset(&self, preset: &SynthPreset) {
        self.with_state(|state| state.synth.apply_preset(preset));
        info!("Applied preset '{}'", preset.name);
    }

    pub fn current_preset(&self, name: &str) -> SynthPreset {
        self.with_state(|state| state.synth.create_preset(name, "", ""))
    }
}

impl Default for AudioEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn open_output_stream(config: &EngineConfig, state: Arc<Mutex<EngineState>>) -> Result<Stream> {
    let host = cpal::default_host();
    debug!("Using audio host: {}", host.id().name());

    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("No output device available"))?;
    info!("Using output device: {}", device.name().unwrap_or_else(|_| "unknown".into()));

    let default_config = device
        .default_output_config()
        .context("Failed to query default output config")?;
    let sample_format = default_config.sample_format();

    let stream_config = cpal::StreamConfig {
        channels: default_config.channels(),
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Fixed(config.frames_per_buffer),
    };

    let stream = match build_stream(&device, &stream_config, sample_format, Arc::clone(&state), config) {
        Ok(stream) => stream,
        Err(err) => {
            warn!("Fixed buffer size rejected ({:#}), retrying with device default", err);
            let fallback = cpal::StreamConfig {
                buffer_size: cpal::BufferSize::Default,
                ..stream_config
            };
            build_stream(&device, &fallback, sample_format, state, config)?
        },
    };

    // Some hosts start streams on creation
    if let Err(err) = stream.pause() {
        debug!("Could not pause new stream: {}", err);
    }

    Ok(stream)
}

fn build_stream(
    device: &cpal::Device,
    stream_config: &cpal::StreamConfig,
    sample_format: SampleFormat,
    state: Arc<Mutex<EngineState>>,
    config: &EngineConfig,
) -> Result<Stream> {
    let frames = config.frames_per_buffer as usize;
    match sample_format {
        SampleFormat::F32 => create_stream::<f32>(device, stream_config, state, frames),
        SampleFormat::I16 => create_stream::<i16>(device, stream_config, state, frames),
        SampleFormat::U16 => create_stream::<u16>(device, stream_config, state, frames),
        other => bail!("Unsupported sample format {:?}", other),
    }
}

fn create_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    state: Arc<Mutex<EngineState>>,
    frames_per_buffer: usize,
) -> Result<Stream>
where
    T: Sample + Send + 'static + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels.max(1) as usize;
    let mut scratch = vec![0.0f32; frames_per_buffer];
    let err_fn = |err| error!("An error occurred on the audio stream: {}", err);

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels;
                if scratch.len() < frames {
                    scratch.resize(frames, 0.0);
                }
                let mono = &mut scratch[..frames];

                lock_state(&state).render(mono);

                for (frame, &value) in data.chunks_mut(channels).zip(mono.iter()) {
                    let value = T::from_sample(value);
                    for sample in frame.iter_mut() {
                        *sample = value;
                    }
                }
            },
            err_fn,
            None,
        )
        .context("Failed to build output stream")?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::oscillator::EnvelopeStage;

    fn engine() -> AudioEngine {
        AudioEngine::headless(EngineConfig::default())
    }

    #[test]
    fn headless_engine_is_not_initialized() {
        let mut engine = engine();
        assert!(!engine.is_initialized());
        assert!(engine.start().is_err());
        assert!(!engine.is_running());
    }

    #[test]
    fn empty_pool_renders_silence() {
        let engine = engine();
        let mut out = vec![1.0; 256];
        engine.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn note_on_renders_bounded_audio() {
        let engine = engine();
        engine.note_on(69, 1.0);
        let mut out = vec![0.0; 4096];
        engine.render(&mut out);
        assert!(out.iter().any(|&s| s.abs() > 0.01));
        assert!(out.iter().all(|&s| (-1.0..=1.0).contains(&s)));
    }

    #[test]
    fn spectral_ring_holds_latest_samples_in_order() {
        let engine = engine();
        engine.note_on(60, 1.0);
        let mut out = vec![0.0; 1500];
        engine.render(&mut out);

        let snapshot = engine.fft_data();
        assert_eq!(snapshot.len(), 1024);
        assert_eq!(snapshot[..], out[1500 - 1024..]);
    }

    #[test]
    fn note_events_are_recorded_with_zero_release_velocity() {
        let engine = engine();
        engine.start_recording();
        engine.note_on(69, 0.5);
        let mut out = vec![0.0; 441];
        engine.render(&mut out);
        engine.note_off(69);
        engine.stop_recording();

        let (events, samples) = engine.with_state(|s| (s.recorder.events().to_vec(), s.recorder.samples().len()));
        assert_eq!(samples, 441);
        assert_eq!(events.len(), 2);
        assert!(events[0].is_note_on);
        assert_eq!(events[1].velocity, 0.0);
        assert!((events[1].timestamp - 0.01).abs() < 1e-6);
    }

    #[test]
    fn playback_replays_events_into_the_pool() {
        let engine = engine();
        engine.load_performance(vec![
            NoteEvent { timestamp: 0.0, note: 60, velocity: 1.0, is_note_on: true },
            NoteEvent { timestamp: 0.05, note: 60, velocity: 0.0, is_note_on: false },
        ]);
        engine.start_playback();
        assert!(engine.is_playing());

        let mut out = vec![0.0; 256];
        engine.render(&mut out);
        assert_eq!(engine.active_voice_count(), 1);

        for _ in 0..10 {
            engine.render(&mut out);
        }
        let stage = engine.with_state(|s| s.synth.voices()[0].stage());
        assert_eq!(stage, EnvelopeStage::Release);

        // Playback does not feed the recorder
        assert!(engine.with_state(|s| s.recorder.events().len()) == 2);
    }

    #[test]
    fn playback_stops_after_tail() {
        let engine = engine();
        engine.load_performance(vec![NoteEvent { timestamp: 0.0, note: 60, velocity: 1.0, is_note_on: true }]);
        engine.start_playback();

        let mut out = vec![0.0; 4410];
        for _ in 0..25 {
            engine.render(&mut out);
        }
        assert!(!engine.is_playing());
    }

    #[test]
    fn export_dispatches_on_extension() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine();
        engine.start_recording();
        engine.note_on(69, 0.5);
        let mut out = vec![0.0; 100];
        engine.render(&mut out);
        engine.note_off(69);
        engine.stop_recording();

        let wav = dir.path().join("take.wav");
        assert_eq!(engine.export_to_file(&wav).unwrap(), ExportFormat::Wav);
        assert_eq!(std::fs::metadata(&wav).unwrap().len(), 44 + 200);

        let txt = dir.path().join("take.txt");
        assert_eq!(engine.export_to_file(&txt).unwrap(), ExportFormat::Text);
        let text = std::fs::read_to_string(&txt).unwrap();
        let lines: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("69 0.5 on"));
        assert!(lines[1].ends_with("69 0 off"));
    }

    #[test]
    fn export_without_audio_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(engine().export_to_file(&dir.path().join("empty.wav")).is_err());
    }

    #[test]
    fn spectrum_of_rendered_sine() {
        let engine = engine();
        engine.set_oscillator_count(1);
        engine.set_vibrato_depth(0.0);
        engine.set_reverb_mix(0.0);
        engine.set_delay_mix(0.0);
        engine.set_attack(0.001);
        engine.note_on(81, 1.0); // 880 Hz

        let mut out = vec![0.0; 4096];
        engine.render(&mut out);

        let mut analyzer = SpectrumAnalyzer::new(1024);
        engine.spectrum(&mut analyzer).unwrap();
        let peak = analyzer.bin_frequencies(engine.sample_rate())[analyzer.peak_bin()];
        assert!((peak - 880.0).abs() <= 44100.0 / 1024.0);
    }

    #[test]
    fn presets_round_trip_through_engine() {
        let engine = engine();
        engine.set_waveform(Waveform::Sawtooth);
        engine.set_attack(0.25);
        let preset = engine.current_preset("Lead");

        let other = AudioEngine::headless(EngineConfig::default());
        other.apply_preset(&preset);
        let copied = other.current_preset("Lead");
        assert_eq!(copied.waveform, Waveform::Sawtooth);
        assert_eq!(copied.attack, 0.25);
    }

    #[test]
    fn shortest_delay_config_builds_an_engine() {
        let config = EngineConfig { max_delay_time: 0.0, ..EngineConfig::default() }.sanitized();
        assert_eq!(config.max_delay_time, 0.001);

        let engine = AudioEngine::headless(config);
        engine.set_delay_mix(1.0);
        engine.note_on(69, 1.0);
        let mut out = vec![0.0; 1024];
        engine.render(&mut out);
        assert!(out.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn nan_parameters_never_reach_the_output() {
        let engine = engine();
        engine.note_on(60, f32::NAN);
        assert_eq!(engine.active_voice_count(), 0);

        engine.note_on(64, 0.8);
        engine.set_attack(f32::NAN);
        engine.set_decay(f32::INFINITY);
        engine.set_sustain(f32::NAN);
        engine.set_release(f32::NAN);
        engine.set_vibrato_rate(f32::INFINITY);
        engine.set_vibrato_depth(f32::NAN);
        engine.set_reverb_mix(f32::NAN);
        engine.set_reverb_room_size(f32::NAN);
        engine.set_reverb_damping(f32::NAN);
        engine.set_delay_mix(f32::NAN);
        engine.set_delay_time(f32::NAN);
        engine.set_delay_feedback(f32::NAN);

        let preset = engine.current_preset("x");
        assert_eq!(preset.sustain, 0.7);
        assert_eq!(preset.attack, 0.1);

        let mut out = vec![0.0; 4096];
        for _ in 0..4 {
            engine.render(&mut out);
            assert!(out.iter().all(|s| s.is_finite()));
        }
        assert!(out.iter().any(|s| s.abs() > 0.01));
    }
}
