mod envelope;
mod waveform;

// Re-export key types so they're accessible from core::oscillator
pub use self::envelope::{Envelope, EnvelopeStage, MIN_STAGE_TIME};
pub use self::waveform::Waveform;

use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use std::f32::consts::PI;

pub const TWO_PI: f32 = 2.0 * PI;

/// Phase-accumulator oscillator producing one sample per `process` call.
///
/// Each instance owns its noise generator so voices sounding noise at the
/// same time stay uncorrelated.
#[derive(Debug, Clone)]
pub struct Oscillator {
    frequency: f32,
    amplitude: f32,
    phase: f32,
    phase_increment: f32,
    sample_rate: f32,
    waveform: Waveform,
    last_noise: f32,
    rng: StdRng,
}

impl Oscillator {
    pub fn new(frequency: f32, sample_rate: f32) -> Self {
        Self::with_rng(frequency, sample_rate, StdRng::from_rng(&mut rand::rng()))
    }

    /// Oscillator whose noise sequence is reproducible
    pub fn with_seed(frequency: f32, sample_rate: f32, seed: u64) -> Self {
        Self::with_rng(frequency, sample_rate, StdRng::seed_from_u64(seed))
    }

    fn with_rng(frequency: f32, sample_rate: f32, rng: StdRng) -> Self {
        Self {
            frequency,
            amplitude: 1.0,
            phase: 0.0,
            phase_increment: TWO_PI * frequency / sample_rate,
            sample_rate,
            waveform: Waveform::Sine,
            last_noise: 0.0,
            rng,
        }
    }

    pub fn process(&mut self) -> f32 {
        let output = match self.waveform {
            Waveform::Noise => self.next_noise(),
            periodic => periodic.sample(self.phase),
        };

        self.phase += self.phase_increment;
        if self.phase >= TWO_PI {
            self.phase = self.phase.rem_euclid(TWO_PI);
        }

        output * self.amplitude
    }

    pub fn set_frequency(&mut self, frequency: f32) {
        self.frequency = frequency;
        self.phase_increment = TWO_PI * frequency / self.sample_rate;
    }

    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }

    pub fn set_amplitude(&mut self, amplitude: f32) {
        self.amplitude = amplitude;
    }

    pub fn set_phase(&mut self, phase: f32) {
        self.phase = phase.rem_euclid(TWO_PI);
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    // One-pole low-pass over uniform white noise
    fn next_noise(&mut self) -> f32 {
        let white: f32 = self.rng.random_range(-1.0..1.0);
        self.last_noise = self.last_noise * 0.99 + white * 0.01;
        self.last_noise
    }
}
