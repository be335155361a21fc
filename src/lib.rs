//! Polyphonic software synthesizer core: oscillators, ADSR voices, a bounded
//! voice pool, delay and reverb, FFT analysis and take recording, driven by
//! a cpal output stream.

pub mod core;
pub mod messaging;
pub mod utils;

pub use crate::core::{AudioEngine, EngineConfig, SpectrumAnalyzer, Synth};
pub use crate::messaging::{MessageBus, SynthMessage};
