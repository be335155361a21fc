use serde::{Serialize, Deserialize};
use std::f32::consts::PI;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
    Noise, // Low-passed white noise, generated statefully by the oscillator
}

impl Waveform {
    pub const ALL: [Waveform; 5] = [
        Waveform::Sine,
        Waveform::Square,
        Waveform::Sawtooth,
        Waveform::Triangle,
        Waveform::Noise,
    ];

    /// Map a control-surface index (0-4) to a waveform.
    /// Indices past the end clamp to the last variant.
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index.min(Self::ALL.len() - 1)]
    }

    pub fn index(&self) -> usize {
        match self {
            Waveform::Sine => 0,
            Waveform::Square => 1,
            Waveform::Sawtooth => 2,
            Waveform::Triangle => 3,
            Waveform::Noise => 4,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Waveform::Sine => "sine",
            Waveform::Square => "square",
            Waveform::Sawtooth => "sawtooth",
            Waveform::Triangle => "triangle",
            Waveform::Noise => "noise",
        }
    }

    /// Evaluate a periodic waveform at `phase` in [0, 2π).
    /// Noise has no closed form and yields 0 here.
    pub fn sample(&self, phase: f32) -> f32 {
        match self {
            Waveform::Sine => phase.sin(),
            Waveform::Square => if phase < PI { 1.0 } else { -1.0 },
            Waveform::Sawtooth => 2.0 * phase / (2.0 * PI) - 1.0,
            Waveform::Triangle => {
                if phase < PI {
                    2.0 * phase / PI - 1.0
                } else {
                    3.0 - 2.0 * phase / PI
                }
            },
            Waveform::Noise => 0.0,
        }
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Waveform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(index) = s.parse::<usize>() {
            return Ok(Self::from_index(index));
        }
        match s.to_ascii_lowercase().as_str() {
            "sine" | "sin" => Ok(Waveform::Sine),
            "square" | "sqr" => Ok(Waveform::Square),
            "sawtooth" | "saw" => Ok(Waveform::Sawtooth),
            "triangle" | "tri" => Ok(Waveform::Triangle),
            "noise" => Ok(Waveform::Noise),
            other => Err(anyhow::anyhow!("unknown waveform '{}'", other)),
        }
    }
}
