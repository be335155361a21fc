pub mod analyzer;
pub mod config;
pub mod effects;
pub mod engine;
pub mod oscillator;
pub mod recorder;
pub mod synth;
pub mod voice;

pub use analyzer::SpectrumAnalyzer;
pub use config::EngineConfig;
pub use engine::AudioEngine;
pub use recorder::Recorder;
pub use synth::Synth;
