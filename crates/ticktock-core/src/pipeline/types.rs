use std::fmt;

use serde::Serialize;

use crate::classify::LightCondition;
use crate::error::RegistrationIssue;
use crate::estimate::Homography;
use crate::features::DetectorKind;

/// Which path produced the final transform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum MethodUsed {
    /// Gradient-histogram (SIFT) features.
    SparseGradient,
    /// One of the binary detectors.
    SparseBinary,
    Dense,
    Template,
    None,
}

impl fmt::Display for MethodUsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SparseGradient => write!(f, "Sparse (gradient)"),
            Self::SparseBinary => write!(f, "Sparse (binary)"),
            Self::Dense => write!(f, "Dense"),
            Self::Template => write!(f, "Template"),
            Self::None => write!(f, "None"),
        }
    }
}

/// States of one pairwise registration, in the order they were visited.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RegistrationState {
    Classify,
    Extract,
    Match,
    Estimate,
    Accept,
    FallbackTemplate,
    Done,
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classify => write!(f, "CLASSIFY"),
            Self::Extract => write!(f, "EXTRACT"),
            Self::Match => write!(f, "MATCH"),
            Self::Estimate => write!(f, "ESTIMATE"),
            Self::Accept => write!(f, "ACCEPT"),
            Self::FallbackTemplate => write!(f, "FALLBACK_TEMPLATE"),
            Self::Done => write!(f, "DONE"),
        }
    }
}

/// Outcome of registering one target against the reference.
///
/// Always produced, whatever failed along the way. A failed registration
/// has `homography: None` and `method_used: MethodUsed::None`; the reasons
/// are listed in `issues`.
#[derive(Clone, Debug, Serialize)]
pub struct RegistrationResult {
    /// Maps target pixels onto the reference frame.
    pub homography: Option<Homography>,
    pub inlier_count: usize,
    pub correspondence_count: usize,
    pub method_used: MethodUsed,
    pub quality_ok: bool,
    pub light_condition: LightCondition,
    /// Detector of the accepted sparse path.
    pub detector: Option<DetectorKind>,
    pub low_confidence: bool,
    /// Peak correlation of an accepted template fallback.
    pub correlation: Option<f64>,
    pub issues: Vec<RegistrationIssue>,
    pub trace: Vec<RegistrationState>,
}

impl RegistrationResult {
    pub fn is_registered(&self) -> bool {
        self.homography.is_some()
    }

    pub fn inlier_ratio(&self) -> f64 {
        if self.correspondence_count == 0 {
            0.0
        } else {
            self.inlier_count as f64 / self.correspondence_count as f64
        }
    }
}

/// Batch stage, used for progress reporting.
#[derive(Clone, Copy, Debug)]
pub enum BatchStage {
    PreparingReference,
    Registering,
}

impl fmt::Display for BatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreparingReference => write!(f, "Preparing reference"),
            Self::Registering => write!(f, "Registering images"),
        }
    }
}

/// Thread-safe progress reporting for batch registration.
///
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn begin_stage(&self, _stage: BatchStage, _total_items: Option<usize>) {}

    /// `items_done` targets of the current stage are finished.
    fn advance(&self, _items_done: usize) {}

    fn finish_stage(&self) {}
}

pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}
