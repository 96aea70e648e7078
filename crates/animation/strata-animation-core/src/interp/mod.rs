//! Interpolation helpers and the fade curves used by timed transitions.

pub mod functions;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Maps fade progress in `[0, 1]` to the weight given to the target state.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendCurve {
    #[default]
    Linear,
    /// Cubic smoothstep `3t^2 - 2t^3`.
    SCurve3,
    /// Quintic smootherstep `6t^5 - 15t^4 + 10t^3`.
    SCurve5,
    EaseIn,
    EaseOut,
    EaseInOut,
}

impl BlendCurve {
    /// Parse a curve name as written in configuration data (case-insensitive,
    /// `-` and `_` ignored, so "Linear", "ease-in" and "EASE_IN" all resolve).
    pub fn parse(name: &str) -> Result<Self, ConfigurationError> {
        let key: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match key.as_str() {
            "linear" => Ok(Self::Linear),
            "scurve3" => Ok(Self::SCurve3),
            "scurve5" => Ok(Self::SCurve5),
            "easein" => Ok(Self::EaseIn),
            "easeout" => Ok(Self::EaseOut),
            "easeinout" => Ok(Self::EaseInOut),
            _ => Err(ConfigurationError::UnknownCurve {
                name: name.to_string(),
            }),
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::SCurve3 => "scurve3",
            Self::SCurve5 => "scurve5",
            Self::EaseIn => "ease_in",
            Self::EaseOut => "ease_out",
            Self::EaseInOut => "ease_in_out",
        }
    }

    /// Evaluate the curve. Input is clamped, and every curve maps 0 to 0 and 1 to 1.
    pub fn apply(self, t: f32) -> f32 {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        match self {
            Self::Linear => t,
            Self::SCurve3 => t * t * (3.0 - 2.0 * t),
            Self::SCurve5 => t * t * t * (t * (t * 6.0 - 15.0) + 10.0),
            Self::EaseIn => t * t,
            Self::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            Self::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - ((-2.0 * t + 2.0).powi(2) / 2.0)
                }
            }
        }
    }
}
