/// Feedback is capped below unity so the loop always decays
pub const MAX_FEEDBACK: f32 = 0.95;

/// Shortest delay time in seconds, unless the buffer itself is shorter
pub const MIN_DELAY_TIME: f32 = 0.001;

/// Feedback delay line over a fixed circular buffer
#[derive(Debug, Clone)]
pub struct DelayEffect {
    buffer: Vec<f32>,
    write_index: usize,
    sample_rate: f32,
    max_delay_time: f32,
    delay_time: f32,
    feedback: f32,
    mix: f32,
}

impl DelayEffect {
    /// `max_delay_time` (seconds) fixes the buffer length for the lifetime of the effect.
    /// Setters ignore non-finite values.
    pub fn new(sample_rate: f32, max_delay_time: f32) -> Self {
        let size = ((max_delay_time.max(0.0) * sample_rate).ceil() as usize).max(1);
        let mut delay = Self {
            buffer: vec![0.0; size],
            write_index: 0,
            sample_rate,
            max_delay_time: size as f32 / sample_rate,
            delay_time: 0.3,
            feedback: 0.3,
            mix: 0.3,
        };
        delay.set_delay_time(0.3);
        delay
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let size = self.buffer.len();
        let delay_samples = self.delay_samples();
        let read_index = (self.write_index + size - delay_samples) % size;

        let delayed = self.buffer[read_index];
        self.buffer[self.write_index] = input + delayed * self.feedback;
        self.write_index = (self.write_index + 1) % size;

        input * (1.0 - self.mix) + delayed * self.mix
    }

    /// Delay length in whole samples, always within the buffer
    pub fn delay_samples(&self) -> usize {
        ((self.delay_time * self.sample_rate).round() as usize).clamp(1, self.buffer.len())
    }

    pub fn set_delay_time(&mut self, delay_time: f32) {
        if delay_time.is_finite() {
            self.delay_time = delay_time.clamp(MIN_DELAY_TIME.min(self.max_delay_time), self.max_delay_time);
        }
    }

    pub fn set_feedback(&mut self, feedback: f32) {
        if feedback.is_finite() {
            self.feedback = feedback.clamp(0.0, MAX_FEEDBACK);
        }
    }

    pub fn set_mix(&mut self, mix: f32) {
        if mix.is_finite() {
            self.mix = mix.clamp(0.0, 1.0);
        }
    }

    pub fn delay_time(&self) -> f32 {
        self.delay_time
    }

    pub fn feedback(&self) -> f32 {
        self.feedback
    }

    pub fn mix(&self) -> f32 {
        self.mix
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_index = 0;
    }
}
