//! Correspondences between a reference and a target image.
//!
//! Sparse matching pairs descriptors of the same detector with a k=2
//! nearest-neighbour ratio test; dense matching converts letterboxed
//! matcher output back to original pixel coordinates. Both produce the
//! same [`Correspondence`] list consumed by the estimator.

pub mod dense;
pub mod sparse;

use nalgebra::Point2;
use serde::Serialize;

use crate::error::RegistrationIssue;

pub use dense::correspondences_from_dense;
pub use sparse::match_sparse;

/// Quality of a correspondence: lower distance or higher confidence is better.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum MatchScore {
    /// Descriptor distance (L2 for float, Hamming for binary).
    Distance(f32),
    /// Dense matcher confidence in [0, 1].
    Confidence(f32),
}

/// A reference/target point pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Correspondence {
    /// Index into the reference keypoints (dense: index of the prediction).
    pub reference_index: usize,
    /// Index into the target keypoints (dense: index of the prediction).
    pub target_index: usize,
    pub reference: Point2<f64>,
    pub target: Point2<f64>,
    pub score: MatchScore,
}

/// Output of one matching call.
#[derive(Clone, Debug, Default)]
pub struct MatchSet {
    pub correspondences: Vec<Correspondence>,
    /// Set when matching was not applicable.
    pub issue: Option<RegistrationIssue>,
}

impl MatchSet {
    pub fn rejected(issue: RegistrationIssue) -> Self {
        Self {
            correspondences: Vec::new(),
            issue: Some(issue),
        }
    }

    pub fn len(&self) -> usize {
        self.correspondences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.correspondences.is_empty()
    }
}
