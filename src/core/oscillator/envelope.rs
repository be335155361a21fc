/// Shortest attack/decay/release time in seconds
pub const MIN_STAGE_TIME: f32 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Linear-segment ADSR envelope advanced one sample per `process` call.
///
/// Per-sample rates are derived from the stage times whenever attack, decay
/// or release change. Changing sustain leaves the derived rates alone, so a
/// stage already in flight keeps its slope.
#[derive(Debug, Clone)]
pub struct Envelope {
    sample_rate: f32,
    attack: f32,
    decay: f32,
    sustain: f32,
    release: f32,

    attack_rate: f32,
    decay_rate: f32,
    release_rate: f32,

    stage: EnvelopeStage,
    level: f32,
    target: f32,
    rate: f32,
}

impl Envelope {
    pub fn new(sample_rate: f32) -> Self {
        let mut envelope = Self {
            sample_rate,
            attack: 0.1,
            decay: 0.2,
            sustain: 0.7,
            release: 0.5,
            attack_rate: 0.0,
            decay_rate: 0.0,
            release_rate: 0.0,
            stage: EnvelopeStage::Idle,
            level: 0.0,
            target: 0.0,
            rate: 0.0,
        };
        envelope.calculate_rates();
        envelope
    }

    /// Start (or restart) the attack stage from the current level
    pub fn trigger(&mut self) {
        self.stage = EnvelopeStage::Attack;
        self.target = 1.0;
        self.rate = self.attack_rate;
    }

    /// Enter the release stage. Has no effect on an idle envelope.
    pub fn release(&mut self) {
        if self.stage != EnvelopeStage::Idle {
            self.stage = EnvelopeStage::Release;
            self.target = 0.0;
            self.rate = self.release_rate;
        }
    }

    /// Advance one sample and return the gain in [0, 1]
    pub fn process(&mut self) -> f32 {
        match self.stage {
            EnvelopeStage::Idle => {
                self.level = 0.0;
            },
            EnvelopeStage::Attack => {
                self.level += self.rate;
                if self.level >= self.target {
                    self.level = self.target;
                    self.stage = EnvelopeStage::Decay;
                    self.target = self.sustain;
                    self.rate = -self.decay_rate;
                }
            },
            EnvelopeStage::Decay => {
                self.level += self.rate;
                if self.level <= self.target {
                    self.level = self.target;
                    self.stage = EnvelopeStage::Sustain;
                    self.rate = 0.0;
                }
            },
            EnvelopeStage::Sustain => {
                self.level = self.sustain;
            },
            EnvelopeStage::Release => {
                self.level += self.rate;
                if self.level <= 0.0 {
                    self.level = 0.0;
                    self.stage = EnvelopeStage::Idle;
                    self.rate = 0.0;
                }
            },
        }

        self.level()
    }

    pub fn set_attack(&mut self, attack: f32) {
        if attack.is_finite() {
            self.attack = attack.max(MIN_STAGE_TIME);
            self.calculate_rates();
        }
    }

    pub fn set_decay(&mut self, decay: f32) {
        if decay.is_finite() {
            self.decay = decay.max(MIN_STAGE_TIME);
            self.calculate_rates();
        }
    }

    pub fn set_sustain(&mut self, sustain: f32) {
        if sustain.is_finite() {
            self.sustain = sustain.clamp(0.0, 1.0);
        }
    }

    pub fn set_release(&mut self, release: f32) {
        if release.is_finite() {
            self.release = release.max(MIN_STAGE_TIME);
            self.calculate_rates();
        }
    }

    pub fn is_active(&self) -> bool {
        self.stage != EnvelopeStage::Idle
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    /// Current gain, clamped to [0, 1]
    pub fn level(&self) -> f32 {
        self.level.clamp(0.0, 1.0)
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

    pub fn release_time(&self) -> f32 {
        self.release
    }

    fn calculate_rates(&mut self) {
        self.attack_rate = 1.0 / (self.attack * self.sample_rate);
        self.decay_rate = (1.0 - self.sustain) / (self.decay * self.sample_rate);
        // A zero sustain would give a flat release that never reaches Idle
        let release_span = if self.sustain > 0.0 { self.sustain } else { 1.0 };
        self.release_rate = -release_span / (self.release * self.sample_rate);
    }
}
