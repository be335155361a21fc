use serde::{Serialize, Deserialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, Context};
use log::{info, warn};
use crate::core::recorder::DeltaEncoding;
use crate::core::synth::{StealPolicy, MAX_VOICES};

/// Length of the spectral snapshot ring written by the render path
pub const SPECTRAL_RING_SIZE: usize = 1024;

const CONFIG_DIR_NAME: &str = "voxsynth";
const CONFIG_FILE_NAME: &str = "config.json";

/// Engine-wide settings fixed at initialization time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub frames_per_buffer: u32,
    pub max_voices: usize,
    pub steal_policy: StealPolicy,
    /// Longest delay the delay line can hold, in seconds
    pub max_delay_time: f32,
    pub fft_size: usize,
    pub spectral_ring_size: usize,
    pub midi_delta_encoding: DeltaEncoding,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            frames_per_buffer: 256,
            max_voices: MAX_VOICES,
            steal_policy: StealPolicy::Oldest,
            max_delay_time: 1.0,
            fft_size: 1024,
            spectral_ring_size: SPECTRAL_RING_SIZE,
            midi_delta_encoding: DeltaEncoding::SingleByte,
        }
    }
}

impl EngineConfig {
    /// `<config dir>/voxsynth/config.json`, when the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Directory presets are saved to by default
    pub fn preset_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join("presets"))
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config.sanitized())
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, json).with_context(|| format!("Failed to write config {}", path.display()))
    }

    /// Load the config at `path` (or the default location), falling back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => path,
            None => return Self::default(),
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from_file(&path) {
            Ok(config) => {
                info!("Loaded engine config from {}", path.display());
                config
            },
            Err(err) => {
                warn!("Ignoring engine config: {:#}", err);
                Self::default()
            },
        }
    }

    /// Pull out-of-range values back to something the engine can run with
    pub fn sanitized(mut self) -> Self {
        self.sample_rate = self.sample_rate.max(1000);
        self.frames_per_buffer = self.frames_per_buffer.max(16);
        self.max_voices = self.max_voices.max(1);
        self.max_delay_time = self.max_delay_time.max(0.001);
        self.fft_size = self.fft_size.max(16);
        self.spectral_ring_size = self.spectral_ring_size.max(16);
        self
    }
}
