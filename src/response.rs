//! Pointer-to-response mapping
//!
//! The response bar grows upward from a fixed baseline. Its height follows the
//! pointer's vertical page position and is clamped so the recorded response
//! always lies in `[1, x_max]` base units.

use serde::{Deserialize, Serialize};

use crate::config::ExperimentConfig;

/// A response bar reading derived from one pointer position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResponseReading {
    /// Bar height in pixels
    pub extent_px: f64,
    /// Response in base units
    pub value: f64,
}

/// Maps pointer coordinates to clamped responses
pub struct ResponseMapper;

impl ResponseMapper {
    /// Map a vertical page coordinate to a response reading.
    ///
    /// Coordinates above the surface map to `x_max`, coordinates below the
    /// baseline map to `1`. A NaN coordinate maps to `1`.
    pub fn map(page_y: f64, config: &ExperimentConfig) -> ResponseReading {
        let geometry = &config.geometry;
        let min_px = config.to_pixels(config.min_response());
        let max_px = config.to_pixels(config.max_response());

        let surface_y = page_y - geometry.surface_top;
        let raw = geometry.bar_baseline - surface_y;
        let extent_px = if raw.is_nan() {
            min_px
        } else {
            raw.clamp(min_px, max_px)
        };

        // Dividing back by ppu can overshoot the bounds by an ulp
        let value = (extent_px / config.ppu).clamp(config.min_response(), config.max_response());
        ResponseReading { extent_px, value }
    }

    /// Reading used before the pointer has moved: the smallest response
    pub fn initial(config: &ExperimentConfig) -> ResponseReading {
        let value = config.min_response();
        ResponseReading {
            extent_px: config.to_pixels(value),
            value,
        }
    }
}
