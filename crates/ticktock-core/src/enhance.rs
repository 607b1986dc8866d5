//! Low-light enhancement applied before feature extraction.
//!
//! Fixed order: local contrast (CLAHE), gamma lift through a lookup table,
//! bilateral denoise, 3x3 sharpen. Every stage clamps to [0, 1].

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::filters::bilateral::{bilateral_filter, BilateralParams};
use crate::filters::clahe::{clahe, ClaheParams};
use crate::filters::levels::gamma_correct;
use crate::filters::sharpen::sharpen;
use crate::frame::Frame;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhanceParams {
    pub clahe: ClaheParams,
    pub gamma: f32,
    pub bilateral: BilateralParams,
}

impl Default for EnhanceParams {
    fn default() -> Self {
        Self {
            clahe: ClaheParams::default(),
            gamma: 1.5,
            bilateral: BilateralParams::default(),
        }
    }
}

pub fn enhance(frame: &Frame, params: &EnhanceParams) -> Frame {
    debug!(
        width = frame.width(),
        height = frame.height(),
        "Enhancing low-light image"
    );
    let equalized = clahe(frame, &params.clahe);
    let lifted = gamma_correct(&equalized, params.gamma);
    let smoothed = bilateral_filter(&lifted, &params.bilateral);
    sharpen(&smoothed)
}
