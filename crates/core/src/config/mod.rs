use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{audio::SourceKind, Result, VisualizerError};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub analysis: AnalysisConfig,
    pub render: RenderConfig,
    pub sources: SourceConfig,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing fields fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    /// Parses and validates a JSON document.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.analysis.validate()?;
        self.render.validate()
    }
}

/// Settings of the analysis context and its frequency node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub sample_rate: u32,
    /// Samples consumed per transform. Output bins are half of this.
    pub fft_size: usize,
    /// Time constant blending each frame with the previous one.
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            fft_size: 2048,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

impl AnalysisConfig {
    pub const MIN_FFT_SIZE: usize = 32;
    pub const MAX_FFT_SIZE: usize = 32_768;

    pub fn validate(&self) -> Result<()> {
        if !self.fft_size.is_power_of_two()
            || !(Self::MIN_FFT_SIZE..=Self::MAX_FFT_SIZE).contains(&self.fft_size)
        {
            return Err(VisualizerError::InvalidConfig(format!(
                "fft_size must be a power of two between {} and {}, got {}",
                Self::MIN_FFT_SIZE,
                Self::MAX_FFT_SIZE,
                self.fft_size
            )));
        }
        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(VisualizerError::InvalidConfig(format!(
                "smoothing must lie in [0, 1], got {}",
                self.smoothing
            )));
        }
        if self.min_decibels >= self.max_decibels {
            return Err(VisualizerError::InvalidConfig(
                "min_decibels must be lower than max_decibels".to_string(),
            ));
        }
        if self.sample_rate == 0 {
            return Err(VisualizerError::InvalidConfig(
                "sample_rate must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of magnitude bins produced per frame.
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }
}

/// Geometry and pacing of the render modes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub frame_rate: u32,
    pub bar_width_scale: f32,
    pub bar_gap: f32,
    pub line_width: f32,
    pub sphere_bars: usize,
    pub sphere_bar_width: f32,
    /// Radians added to the sphere rotation every frame.
    pub rotation_step: f32,
    pub glow_alpha: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frame_rate: 60,
            bar_width_scale: 2.5,
            bar_gap: 1.0,
            line_width: 3.0,
            sphere_bars: 120,
            sphere_bar_width: 4.0,
            rotation_step: 0.005,
            glow_alpha: 64.0 / 255.0,
        }
    }
}

impl RenderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.frame_rate == 0 {
            return Err(VisualizerError::InvalidConfig(
                "frame_rate must be positive".to_string(),
            ));
        }
        if self.sphere_bars == 0 {
            return Err(VisualizerError::InvalidConfig(
                "sphere_bars must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.glow_alpha) {
            return Err(VisualizerError::InvalidConfig(format!(
                "glow_alpha must lie in [0, 1], got {}",
                self.glow_alpha
            )));
        }
        Ok(())
    }
}

/// Source switching policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Source kind reported after a system capture is ended by the user.
    pub capture_end_fallback: SourceKind,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            capture_end_fallback: SourceKind::File,
        }
    }
}
