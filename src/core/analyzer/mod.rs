//! FFT spectrum analysis of rendered output, for visualization.
//!
//! Runs on the control side against a snapshot of the spectral ring. Each
//! frame is normalized against its own peak, so the result shows spectral
//! shape only and carries no absolute level.

use realfft::{num_complex::Complex, RealFftPlanner, RealToComplex};
use std::sync::Arc;
use anyhow::{anyhow, Result};
use crate::utils::helpers::MIN_MAGNITUDE;

pub const DEFAULT_FFT_SIZE: usize = 1024;

/// Range shown below the frame's peak, in dB
pub const DYNAMIC_RANGE_DB: f32 = 60.0;

pub struct SpectrumAnalyzer {
    fft_size: usize,
    fft: Arc<dyn RealToComplex<f32>>,
    input_buffer: Vec<f32>,
    spectrum_buffer: Vec<Complex<f32>>,
    window: Vec<f32>,
    use_window: bool,
    /// Per-bin level in dB from the last frame
    db_spectrum: Vec<f32>,
    /// Per-bin level in [0, 1] from the last frame
    magnitudes: Vec<f32>,
}

impl std::fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("fft_size", &self.fft_size)
            .field("use_window", &self.use_window)
            .finish()
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_FFT_SIZE)
    }
}

impl SpectrumAnalyzer {
    pub fn new(fft_size: usize) -> Self {
        let fft_size = fft_size.max(2);
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let spectrum_buffer = fft.make_output_vec();
        let bins = spectrum_buffer.len();

        // Hann window, symmetric form
        let denom = (fft_size - 1) as f32;
        let window = (0..fft_size)
            .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / denom).cos()))
            .collect();

        Self {
            fft_size,
            fft,
            input_buffer: vec![0.0; fft_size],
            spectrum_buffer,
            window,
            use_window: true,
            db_spectrum: vec![20.0 * MIN_MAGNITUDE.log10(); bins],
            magnitudes: vec![0.0; bins],
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn bin_count(&self) -> usize {
        self.fft_size / 2 + 1
    }

    pub fn set_window_enabled(&mut self, enabled: bool) {
        self.use_window = enabled;
    }

    pub fn window_enabled(&self) -> bool {
        self.use_window
    }

    /// Analyze the most recent `fft_size` samples of `samples`, zero-padding a shorter buffer
    pub fn process_buffer(&mut self, samples: &[f32]) -> Result<()> {
        if samples.len() >= self.fft_size {
            self.input_buffer.copy_from_slice(&samples[samples.len() - self.fft_size..]);
        } else {
            self.input_buffer.fill(0.0);
            self.input_buffer[..samples.len()].copy_from_slice(samples);
        }

        if self.use_window {
            for (sample, w) in self.input_buffer.iter_mut().zip(&self.window) {
                *sample *= w;
            }
        }

        self.fft
            .process(&mut self.input_buffer, &mut self.spectrum_buffer)
            .map_err(|e| anyhow!("FFT failed: {}", e))?;

        for (db, bin) in self.db_spectrum.iter_mut().zip(&self.spectrum_buffer) {
            *db = 20.0 * bin.norm().max(MIN_MAGNITUDE).log10();
        }

        let peak = self.db_spectrum.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let floor = peak - DYNAMIC_RANGE_DB;
        for (mag, &db) in self.magnitudes.iter_mut().zip(&self.db_spectrum) {
            *mag = ((db - floor) / DYNAMIC_RANGE_DB).clamp(0.0, 1.0);
        }

        Ok(())
    }

    /// Normalized spectrum of the last frame, `fft_size / 2 + 1` bins
    pub fn magnitude_spectrum(&self) -> &[f32] {
        &self.magnitudes
    }

    pub fn db_spectrum(&self) -> &[f32] {
        &self.db_spectrum
    }

    /// Center frequency of every bin
    pub fn bin_frequencies(&self, sample_rate: u32) -> Vec<f32> {
        let bin_width = sample_rate as f32 / self.fft_size as f32;
        (0..self.bin_count()).map(|i| i as f32 * bin_width).collect()
    }

    /// Index of the loudest bin in the last frame
    pub fn peak_bin(&self) -> usize {
        self.db_spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map_or(0, |(i, _)| i)
    }
}
