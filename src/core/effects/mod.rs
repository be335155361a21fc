mod delay;
mod reverb;

pub use self::delay::{DelayEffect, MAX_FEEDBACK};
pub use self::reverb::{ReverbEffect, ALLPASS_DELAYS, COMB_DELAYS};

/// Fixed-order chain applied to the mixed voice output: delay, then reverb
#[derive(Debug, Clone)]
pub struct EffectsChain {
    pub delay: DelayEffect,
    pub reverb: ReverbEffect,
}

impl EffectsChain {
    pub fn new(sample_rate: f32, max_delay_time: f32) -> Self {
        Self {
            delay: DelayEffect::new(sample_rate, max_delay_time),
            reverb: ReverbEffect::new(sample_rate),
        }
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let delayed = self.delay.process(input);
        self.reverb.process(delayed)
    }

    pub fn clear(&mut self) {
        self.delay.clear();
        self.reverb.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_runs_before_reverb() {
        let sr = 8000.0;
        let mut chain = EffectsChain::new(sr, 1.0);
        chain.delay.set_delay_time(0.01);
        chain.delay.set_feedback(0.0);
        chain.delay.set_mix(1.0);
        chain.reverb.set_mix(0.0);

        // fully wet delay, fully dry reverb: the chain is a pure 80-sample delay
        assert_eq!(chain.process(1.0), 0.0);
        let out: Vec<f32> = (0..100).map(|_| chain.process(0.0)).collect();
        assert!((out[79] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn silence_in_silence_out() {
        let mut chain = EffectsChain::new(44100.0, 1.0);
        assert!((0..10_000).all(|_| chain.process(0.0) == 0.0));
    }
}
