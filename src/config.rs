//! Experiment configuration
//!
//! Defaults reproduce the reference experiment: 3 pixels per base unit, bars up
//! to 100 units long, and a correction tolerance of 5 units.

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Default pixels per base unit
pub const DEFAULT_PPU: f64 = 3.0;

/// Default maximum bar length in base units
pub const DEFAULT_X_MAX: u32 = 100;

/// Default correction tolerance in base units (exclusive)
pub const DEFAULT_TOLERANCE: f64 = 5.0;

/// Vertical layout of the drawable region, in page pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageGeometry {
    /// Page offset of the drawing surface's top edge
    pub surface_top: f64,
    /// Surface-relative y coordinate where the response bar is anchored
    pub bar_baseline: f64,
}

impl Default for StageGeometry {
    fn default() -> Self {
        Self {
            surface_top: 50.0,
            bar_baseline: 400.0,
        }
    }
}

/// Retry policy for the bootstrap pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts per stage, including the first
    pub max_attempts: u32,
    /// Pause between attempts in milliseconds
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 250,
        }
    }
}

impl RetryPolicy {
    /// A policy that tries each stage exactly once
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: 0,
        }
    }
}

/// Settings for one function-learning session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Pixels per base unit
    pub ppu: f64,
    /// Largest bar length in base units; responses clamp to `[1, x_max]`
    pub x_max: u32,
    /// A correction is accepted when `|response - y| < tolerance`
    pub tolerance: f64,
    pub geometry: StageGeometry,
    pub bootstrap: RetryPolicy,
    /// Seed for test-plan sampling; `None` draws from the thread RNG
    pub seed: Option<u64>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            ppu: DEFAULT_PPU,
            x_max: DEFAULT_X_MAX,
            tolerance: DEFAULT_TOLERANCE,
            geometry: StageGeometry::default(),
            bootstrap: RetryPolicy::default(),
            seed: None,
        }
    }
}

impl ExperimentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate a configuration from JSON; missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, SessionError> {
        serde_json::to_string_pretty(self).map_err(SessionError::JsonError)
    }

    pub fn with_x_max(mut self, x_max: u32) -> Self {
        self.x_max = x_max;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_ppu(mut self, ppu: f64) -> Self {
        self.ppu = ppu;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.bootstrap = policy;
        self
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if !(self.ppu.is_finite() && self.ppu > 0.0) {
            return Err(SessionError::InvalidConfig(format!(
                "ppu must be positive, got {}",
                self.ppu
            )));
        }
        if self.x_max == 0 {
            return Err(SessionError::InvalidConfig(
                "x_max must be at least 1".to_string(),
            ));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(SessionError::InvalidConfig(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if !self.geometry.surface_top.is_finite() || !self.geometry.bar_baseline.is_finite() {
            return Err(SessionError::InvalidConfig(
                "geometry must be finite".to_string(),
            ));
        }
        if self.bootstrap.max_attempts == 0 {
            return Err(SessionError::InvalidConfig(
                "bootstrap.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Smallest recordable response in base units
    pub fn min_response(&self) -> f64 {
        1.0
    }

    /// Largest recordable response in base units
    pub fn max_response(&self) -> f64 {
        f64::from(self.x_max)
    }

    /// Convert base units to pixels
    pub fn to_pixels(&self, units: f64) -> f64 {
        units * self.ppu
    }
}
