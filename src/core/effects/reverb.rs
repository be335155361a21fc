/// Comb delay lengths in samples at 44.1 kHz
pub const COMB_DELAYS: [usize; 4] = [1116, 1188, 1277, 1356];
/// Allpass delay lengths in samples at 44.1 kHz
pub const ALLPASS_DELAYS: [usize; 2] = [556, 441];

const COMB_FEEDBACK: f32 = 0.84;
const ALLPASS_FEEDBACK: f32 = 0.5;
const REFERENCE_RATE: f32 = 44100.0;

/// Circular buffer shared by the comb and allpass stages
#[derive(Debug, Clone)]
struct DelayLine {
    buffer: Vec<f32>,
    index: usize,
    feedback: f32,
}

impl DelayLine {
    fn new(base_delay: usize, scale: f32, feedback: f32) -> Self {
        let size = ((base_delay as f32 * scale) as usize).max(1);
        Self {
            buffer: vec![0.0; size],
            index: 0,
            feedback,
        }
    }

    // Feedback comb: returns the stored sample, writes input plus scaled feedback
    fn comb(&mut self, input: f32, room_size: f32) -> f32 {
        let cell = self.buffer[self.index];
        self.buffer[self.index] = input + cell * self.feedback * room_size;
        self.advance();
        cell
    }

    fn allpass(&mut self, input: f32) -> f32 {
        let cell = self.buffer[self.index];
        let output = -input + cell;
        self.buffer[self.index] = input + cell * self.feedback;
        self.advance();
        output
    }

    fn advance(&mut self) {
        self.index = (self.index + 1) % self.buffer.len();
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.index = 0;
    }
}

/// Schroeder reverb: four parallel combs into two serial allpasses,
/// followed by a one-pole damping low-pass.
#[derive(Debug, Clone)]
pub struct ReverbEffect {
    combs: Vec<DelayLine>,
    allpasses: Vec<DelayLine>,
    room_size: f32,
    damping: f32,
    mix: f32,
    // damping filter memory
    last_output: f32,
}

impl ReverbEffect {
    pub fn new(sample_rate: f32) -> Self {
        let scale = sample_rate / REFERENCE_RATE;
        Self {
            combs: COMB_DELAYS.iter().map(|&d| DelayLine::new(d, scale, COMB_FEEDBACK)).collect(),
            allpasses: ALLPASS_DELAYS.iter().map(|&d| DelayLine::new(d, scale, ALLPASS_FEEDBACK)).collect(),
            room_size: 0.5,
            damping: 0.5,
            mix: 0.3,
            last_output: 0.0,
        }
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let room_size = self.room_size;
        let mut wet: f32 = self.combs.iter_mut().map(|comb| comb.comb(input, room_size)).sum();
        wet *= 0.25;

        for allpass in &mut self.allpasses {
            wet = allpass.allpass(wet);
        }

        wet = wet * (1.0 - self.damping) + self.last_output * self.damping;
        self.last_output = wet;

        input * (1.0 - self.mix) + wet * self.mix
    }

    pub fn set_room_size(&mut self, room_size: f32) {
        if room_size.is_finite() {
            self.room_size = room_size.clamp(0.0, 1.0);
        }
    }

    pub fn set_damping(&mut self, damping: f32) {
        if damping.is_finite() {
            self.damping = damping.clamp(0.0, 1.0);
        }
    }

    pub fn set_mix(&mut self, mix: f32) {
        if mix.is_finite() {
            self.mix = mix.clamp(0.0, 1.0);
        }
    }

    pub fn room_size(&self) -> f32 {
        self.room_size
    }

    pub fn damping(&self) -> f32 {
        self.damping
    }

    pub fn mix(&self) -> f32 {
        self.mix
    }

    /// Buffer lengths of the comb stages, in samples
    pub fn comb_lengths(&self) -> Vec<usize> {
        self.combs.iter().map(|c| c.buffer.len()).collect()
    }

    pub fn clear(&mut self) {
        for line in self.combs.iter_mut().chain(self.allpasses.iter_mut()) {
            line.clear();
        }
        self.last_output = 0.0;
    }
}
