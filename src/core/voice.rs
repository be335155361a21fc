use crate::core::oscillator::{Envelope, EnvelopeStage, Oscillator, Waveform};
use crate::utils::midi_note_to_freq;

/// Upper bound on oscillators stacked in one voice
pub const MAX_OSCILLATORS: usize = 3;

/// Frequency ratio of the oscillator at `index`; each extra oscillator sits 1% higher
pub fn detune_factor(index: usize) -> f32 {
    1.0 + index as f32 * 0.01
}

/// One sounding (or fading) note: a stack of oscillators shaped by one envelope
#[derive(Debug, Clone)]
pub struct Voice {
    pub note: u8,
    pub velocity: f32,
    base_frequency: f32,
    pub oscillators: Vec<Oscillator>,
    pub envelope: Envelope,
    active: bool,
}

impl Voice {
    /// Build an untriggered voice; call `trigger` once the envelope is configured
    pub fn new(note: u8, velocity: f32, oscillator_count: usize, waveform: Waveform, sample_rate: f32) -> Self {
        let base_freq = midi_note_to_freq(note);
        let count = oscillator_count.clamp(1, MAX_OSCILLATORS);

        let oscillators = (0..count)
            .map(|i| {
                let mut osc = Oscillator::new(base_freq * detune_factor(i), sample_rate);
                osc.set_waveform(waveform);
                osc
            })
            .collect();

        Self {
            note,
            velocity: velocity.clamp(0.0, 1.0),
            base_frequency: base_freq,
            oscillators,
            envelope: Envelope::new(sample_rate),
            active: true,
        }
    }

    pub fn trigger(&mut self) {
        self.active = true;
        self.envelope.trigger();
    }

    pub fn process(&mut self) -> f32 {
        if !self.active {
            return 0.0;
        }

        let mut output: f32 = self.oscillators.iter_mut().map(|osc| osc.process()).sum();
        if !self.oscillators.is_empty() {
            output /= self.oscillators.len() as f32;
        }

        output *= self.envelope.process() * self.velocity;

        if !self.envelope.is_active() {
            self.active = false;
        }

        output
    }

    pub fn release(&mut self) {
        self.envelope.release();
    }

    /// Retune every oscillator to `base_frequency × ratio`, keeping the per-index detune
    pub fn retune(&mut self, ratio: f32) {
        let freq = self.base_frequency * ratio;
        for (i, osc) in self.oscillators.iter_mut().enumerate() {
            osc.set_frequency(freq * detune_factor(i));
        }
    }

    /// Untransposed pitch of the note in Hz
    pub fn base_frequency(&self) -> f32 {
        self.base_frequency
    }

    pub fn set_waveform(&mut self, waveform: Waveform) {
        for osc in &mut self.oscillators {
            osc.set_waveform(waveform);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_releasing(&self) -> bool {
        self.envelope.stage() == EnvelopeStage::Release
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.envelope.stage()
    }

    pub fn level(&self) -> f32 {
        self.envelope.level()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oscillators_are_detuned_upwards() {
        let voice = Voice::new(69, 1.0, 3, Waveform::Sine, 44100.0);
        let freqs: Vec<f32> = voice.oscillators.iter().map(|o| o.frequency()).collect();
        assert_eq!(freqs.len(), 3);
        assert!((freqs[0] - 440.0).abs() < 1e-3);
        assert!((freqs[1] - 444.4).abs() < 1e-2);
        assert!((freqs[2] - 448.8).abs() < 1e-2);
    }

    #[test]
    fn oscillator_count_is_clamped() {
        assert_eq!(Voice::new(60, 1.0, 0, Waveform::Sine, 44100.0).oscillators.len(), 1);
        assert_eq!(Voice::new(60, 1.0, 9, Waveform::Sine, 44100.0).oscillators.len(), MAX_OSCILLATORS);
    }

    #[test]
    fn mix_is_averaged_and_scaled_by_velocity() {
        let mut voice = Voice::new(60, 0.5, 2, Waveform::Square, 44100.0);
        voice.envelope.set_attack(0.001);
        voice.envelope.set_decay(0.001);
        voice.envelope.set_sustain(1.0);
        voice.trigger();
        let mut last = 0.0;
        for _ in 0..200 {
            last = voice.process();
        }
        // sample 200 falls in the high half of both squares' second period
        assert!((last - 0.5).abs() < 1e-4, "got {}", last);
    }

    #[test]
    fn deactivates_after_release_tail() {
        let mut voice = Voice::new(60, 1.0, 1, Waveform::Sine, 1000.0);
        voice.envelope.set_attack(0.001);
        voice.envelope.set_release(0.01);
        voice.trigger();
        for _ in 0..10 {
            voice.process();
        }
        voice.release();
        assert!(voice.is_releasing());
        for _ in 0..1000 {
            voice.process();
        }
        assert!(!voice.is_active());
        assert_eq!(voice.process(), 0.0);
    }
}
