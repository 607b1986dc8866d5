use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TickTockError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Empty image sequence")]
    EmptySequence,

    #[error("Reference index {index} out of range (total: {total})")]
    ReferenceIndexOutOfRange { index: usize, total: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Dense matcher weights unavailable at {}", path.display())]
    WeightsUnavailable { path: PathBuf },

    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

pub type Result<T> = std::result::Result<T, TickTockError>;

/// A condition that degraded a single registration.
///
/// These never abort a registration. The orchestrator records them in
/// [`RegistrationResult::issues`](crate::pipeline::RegistrationResult) and
/// moves on to the next weaker method.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum RegistrationIssue {
    #[error("no keypoints detected, even with the gradient-histogram detector")]
    InsufficientFeatures,

    #[error("reference and target descriptors come from different families")]
    DescriptorFamilyMismatch,

    #[error("{found} correspondences, at least {required} required")]
    InsufficientCorrespondences { found: usize, required: usize },

    #[error("homography condition number {condition:.3e} above ceiling")]
    IllConditionedModel { condition: f64 },

    #[error("no consistent homography found")]
    EstimationFailed,

    #[error("best template correlation {best:.3} below acceptance threshold")]
    TemplateCorrelationTooWeak { best: f64 },

    #[error("dense matcher unavailable: {0}")]
    DenseMatcherUnavailable(String),
}
