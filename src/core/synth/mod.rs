pub mod preset;

use serde::{Serialize, Deserialize};
use preset::SynthPreset;
use crate::core::config::EngineConfig;
use crate::core::effects::EffectsChain;
use crate::core::oscillator::{Waveform, MIN_STAGE_TIME, TWO_PI};
use crate::core::voice::{Voice, MAX_OSCILLATORS};

/// Default polyphony ceiling
pub const MAX_VOICES: usize = 16;

/// Render calls between sweeps of finished voices
const CLEANUP_INTERVAL: u32 = 1000;

/// Which voice gives up its slot when the pool is full of sounding voices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StealPolicy {
    /// Evict the earliest-inserted voice, even mid-release
    #[default]
    Oldest,
    /// Evict the voice with the lowest envelope level
    Quietest,
}

/// Polyphonic voice pool with global parameters, vibrato and the effects chain
pub struct Synth {
    pub sample_rate: f32,
    voices: Vec<Voice>,
    max_voices: usize,
    steal_policy: StealPolicy,

    // Envelope applied to every voice
    attack: f32,
    decay: f32,
    sustain: f32,
    release: f32,

    waveform: Waveform,
    oscillator_count: usize,

    vibrato_rate: f32,
    vibrato_depth: f32,
    vibrato_phase: f32,

    cleanup_counter: u32,
    pub effects: EffectsChain,
}

impl Synth {
    /// Create a new synthesizer instance with the default configuration
    pub fn new(sample_rate: f32) -> Self {
        let config = EngineConfig {
            sample_rate: sample_rate as u32,
            ..EngineConfig::default()
        };
        let mut synth = Self::with_config(&config);
        synth.sample_rate = sample_rate;
        synth
    }

    pub fn with_config(config: &EngineConfig) -> Self {
        let sample_rate = config.sample_rate as f32;
        let max_voices = config.max_voices.max(1);
        Synth {
            sample_rate,
            voices: Vec::with_capacity(max_voices),
            max_voices,
            steal_policy: config.steal_policy,
            attack: 0.1,
            decay: 0.2,
            sustain: 0.7,
            release: 0.5,
            waveform: Waveform::Sine,
            oscillator_count: 2,
            vibrato_rate: 5.0,
            vibrato_depth: 0.02,
            vibrato_phase: 0.0,
            cleanup_counter: 0,
            effects: EffectsChain::new(sample_rate, config.max_delay_time),
        }
    }

    /// Handle note on event. A non-finite velocity is dropped.
    pub fn note_on(&mut self, note: u8, velocity: f32) {
        if !velocity.is_finite() {
            return;
        }

        // A retriggered note fades out on its own while the new voice starts
        for voice in self.voices.iter_mut().filter(|v| v.note == note && v.is_active()) {
            voice.release();
        }

        if self.voices.len() >= self.max_voices {
            self.cleanup_voices();
            if self.voices.len() >= self.max_voices {
                self.steal_voice();
            }
        }

        let mut voice = Voice::new(note, velocity, self.oscillator_count, self.waveform, self.sample_rate);
        voice.envelope.set_sustain(self.sustain);
        voice.envelope.set_attack(self.attack);
        voice.envelope.set_decay(self.decay);
        voice.envelope.set_release(self.release);
        voice.trigger();

        self.voices.push(voice);
    }

    /// Handle note off event
    pub fn note_off(&mut self, note: u8) {
        for voice in self.voices.iter_mut().filter(|v| v.note == note && v.is_active()) {
            voice.release();
        }
    }

    pub fn all_notes_off(&mut self) {
        for voice in self.voices.iter_mut().filter(|v| v.is_active()) {
            voice.release();
        }
    }

    /// Generate one audio sample
    pub fn process(&mut self) -> f32 {
        let vibrato = self.vibrato_phase.sin() * self.vibrato_depth;
        self.vibrato_phase += TWO_PI * self.vibrato_rate / self.sample_rate;
        if self.vibrato_phase >= TWO_PI {
            self.vibrato_phase = self.vibrato_phase.rem_euclid(TWO_PI);
        }

        let mut output = 0.0;
        for voice in self.voices.iter_mut().filter(|v| v.is_active()) {
            voice.retune(1.0 + vibrato);
            output += voice.process();
        }

        self.cleanup_counter += 1;
        if self.cleanup_counter >= CLEANUP_INTERVAL {
            self.cleanup_voices();
            self.cleanup_counter = 0;
        }

        self.effects.process(output).clamp(-1.0, 1.0)
    }

    /// Drop every voice whose envelope has finished
    pub fn cleanup_voices(&mut self) {
        self.voices.retain(|v| v.is_active());
    }

    fn steal_voice(&mut self) {
        if self.voices.is_empty() {
            return;
        }
        let index = match self.steal_policy {
            StealPolicy::Oldest => 0,
            StealPolicy::Quietest => self.voices
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.level().total_cmp(&b.1.level()))
                .map(|(i, _)| i)
                .unwrap_or(0),
        };
        self.voices.remove(index);
    }

    pub fn set_attack(&mut self, attack: f32) {
        if !attack.is_finite() {
            return;
        }
        self.attack = attack.max(MIN_STAGE_TIME);
        for voice in &mut self.voices {
            voice.envelope.set_attack(self.attack);
        }
    }

    pub fn set_decay(&mut self, decay: f32) {
        if !decay.is_finite() {
            return;
        }
        self.decay = decay.max(MIN_STAGE_TIME);
        for voice in &mut self.voices {
            voice.envelope.set_decay(self.decay);
        }
    }

    pub fn set_sustain(&mut self, sustain: f32) {
        if !sustain.is_finite() {
            return;
        }
        self.sustain = sustain.clamp(0.0, 1.0);
        for voice in &mut self.voices {
            voice.envelope.set_sustain(self.sustain);
        }
    }

    pub fn set_release(&mut self, release: f32) {
        if !release.is_finite() {
            return;
        }
        self.release = release.max(MIN_STAGE_TIME);
        for voice in &mut self.voices {
            voice.envelope.set_release(self.release);
        }
    }

    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
        for voice in &mut self.voices {
            voice.set_waveform(waveform);
        }
    }

    /// Only voices started after this call pick up the new count
    pub fn set_oscillator_count(&mut self, count: usize) {
        self.oscillator_count = count.clamp(1, MAX_OSCILLATORS);
    }

    pub fn set_vibrato_rate(&mut self, rate: f32) {
        if rate.is_finite() {
            self.vibrato_rate = rate.max(0.0);
        }
    }

    pub fn set_vibrato_depth(&mut self, depth: f32) {
        if depth.is_finite() {
            self.vibrato_depth = depth.clamp(0.0, 1.0);
        }
    }

    pub fn set_reverb_mix(&mut self, mix: f32) {
        self.effects.reverb.set_mix(mix);
    }

    pub fn set_reverb_room_size(&mut self, room_size: f32) {
        self.effects.reverb.set_room_size(room_size);
    }

    pub fn set_reverb_damping(&mut self, damping: f32) {
        self.effects.reverb.set_damping(damping);
    }

    pub fn set_delay_mix(&mut self, mix: f32) {
        self.effects.delay.set_mix(mix);
    }

    pub fn set_delay_time(&mut self, time: f32) {
        self.effects.delay.set_delay_time(time);
    }

    pub fn set_delay_feedback(&mut self, feedback: f32) {
        self.effects.delay.set_feedback(feedback);
    }

    pub fn set_steal_policy(&mut self, policy: StealPolicy) {
        self.steal_policy = policy;
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    pub fn active_voice_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    pub fn max_voices(&self) -> usize {
        self.max_voices
    }

    pub fn steal_policy(&self) -> StealPolicy {
        self.steal_policy
    }

    pub fn attack(&self) -> f32 {
        self.attack
    }

    pub fn decay(&self) -> f32 {
        self.decay
    }

    pub fn sustain(&self) -> f32 {
        self.sustain
    }

    pub fn release(&self) -> f32 {
        self.release
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn oscillator_count(&self) -> usize {
        self.oscillator_count
    }

    pub fn vibrato_rate(&self) -> f32 {
        self.vibrato_rate
    }

    pub fn vibrato_depth(&self) -> f32 {
        self.vibrato_depth
    }

    /// Apply settings from a preset
    pub fn apply_preset(&mut self, preset: &SynthPreset) {
        self.set_sustain(preset.sustain);
        self.set_attack(preset.attack);
        self.set_decay(preset.decay);
        self.set_release(preset.release);
        self.set_waveform(preset.waveform);
        self.set_oscillator_count(preset.oscillator_count);
        self.set_vibrato_rate(preset.vibrato_rate);
        self.set_vibrato_depth(preset.vibrato_depth);
        self.set_reverb_mix(preset.reverb_mix);
        self.set_reverb_room_size(preset.reverb_room_size);
        self.set_reverb_damping(preset.reverb_damping);
        self.set_delay_mix(preset.delay_mix);
        self.set_delay_time(preset.delay_time);
        self.set_delay_feedback(preset.delay_feedback);
    }

    /// Create a preset from current settings
    pub fn create_preset(&self, name: &str, author: &str, description: &str) -> SynthPreset {
        SynthPreset {
            name: name.to_string(),
            description: description.to_string(),
            author: author.to_string(),
            tags: Vec::new(),
            created_at: preset::unix_now(),

            attack: self.attack,
            decay: self.decay,
            sustain: self.sustain,
            release: self.release,

            waveform: self.waveform,
            oscillator_count: self.oscillator_count,
            vibrato_rate: self.vibrato_rate,
            vibrato_depth: self.vibrato_depth,

            reverb_mix: self.effects.reverb.mix(),
            reverb_room_size: self.effects.reverb.room_size(),
            reverb_damping: self.effects.reverb.damping(),
            delay_mix: self.effects.delay.mix(),
            delay_time: self.effects.delay.delay_time(),
            delay_feedback: self.effects.delay.feedback(),
        }
    }
}
