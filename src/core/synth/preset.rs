use serde::{Serialize, Deserialize};
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use anyhow::{Result, Context};
use crate::core::oscillator::Waveform;

/// Represents a complete synth preset with all settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthPreset {
    /// Unique name for the preset
    pub name: String,
    /// Description of the preset sound
    pub description: String,
    /// Author of the preset
    pub author: String,
    /// Tags for categorization
    pub tags: Vec<String>,
    /// Creation timestamp (unix seconds)
    pub created_at: u64,

    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,

    pub waveform: Waveform,
    pub oscillator_count: usize,
    pub vibrato_rate: f32,
    pub vibrato_depth: f32,

    pub reverb_mix: f32,
    pub reverb_room_size: f32,
    pub reverb_damping: f32,
    pub delay_mix: f32,
    pub delay_time: f32,
    pub delay_feedback: f32,
}

impl Default for SynthPreset {
    fn default() -> Self {
        Self::new("Init")
    }
}

pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// Filesystem-safe stem derived from a preset name
fn safe_file_stem(name: &str) -> String {
    name.replace(' ', "_")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

impl SynthPreset {
    /// Create a new preset holding the engine defaults
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            author: String::new(),
            tags: Vec::new(),
            created_at: unix_now(),

            attack: 0.1,
            decay: 0.2,
            sustain: 0.7,
            release: 0.5,

            waveform: Waveform::Sine,
            oscillator_count: 2,
            vibrato_rate: 5.0,
            vibrato_depth: 0.02,

            reverb_mix: 0.3,
            reverb_room_size: 0.5,
            reverb_damping: 0.5,
            delay_mix: 0.3,
            delay_time: 0.3,
            delay_feedback: 0.3,
        }
    }

    /// Save preset to `<directory>/<name>.json`, creating the directory if needed
    pub fn save_to_file(&self, directory: &Path) -> Result<PathBuf> {
        fs::create_dir_all(directory)
            .with_context(|| format!("Failed to create preset directory {}", directory.display()))?;

        let file_path = directory.join(format!("{}.json", safe_file_stem(&self.name)));

        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize preset")?;

        let mut file = File::create(&file_path)
            .with_context(|| format!("Failed to create preset file {}", file_path.display()))?;
        file.write_all(json.as_bytes())
            .context("Failed to write preset data")?;

        Ok(file_path)
    }

    /// Load preset from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open preset file {}", path.display()))?;

        let preset: Self = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse preset {}", path.display()))?;

        Ok(preset)
    }

    /// List the display names of all presets in a directory
    pub fn list_presets(directory: &Path) -> Result<Vec<String>> {
        if !directory.exists() {
            return Ok(Vec::new());
        }

        let mut presets = Vec::new();
        for entry in fs::read_dir(directory)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
                    presets.push(name.replace('_', " "));
                }
            }
        }
        presets.sort();

        Ok(presets)
    }

    /// Delete a preset file
    pub fn delete_preset(name: &str, directory: &Path) -> Result<()> {
        let path = directory.join(format!("{}.json", safe_file_stem(name)));
        fs::remove_file(&path)
            .with_context(|| format!("Failed to delete preset {}", path.display()))
    }
}
