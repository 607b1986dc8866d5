use std::fmt;

use serde::{Deserialize, Serialize};

use crate::frame::Frame;

/// Illumination class of an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LightCondition {
    Normal,
    LowLight,
}

impl fmt::Display for LightCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "Normal"),
            Self::LowLight => write!(f, "Low light"),
        }
    }
}

/// Classify an image by its mean luminance.
///
/// `threshold` is on the 0-255 scale; images strictly darker than it are
/// low-light.
pub fn classify(frame: &Frame, threshold: f32) -> LightCondition {
    classify_mean(frame.mean_8bit(), threshold)
}

pub fn classify_mean(mean_8bit: f32, threshold: f32) -> LightCondition {
    if mean_8bit < threshold {
        LightCondition::LowLight
    } else {
        LightCondition::Normal
    }
}
