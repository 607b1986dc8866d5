pub mod homography;
pub mod ransac;

use nalgebra::Point2;
use tracing::{debug, warn};

use crate::consts::{MIN_HOMOGRAPHY_CORRESPONDENCES, RELAXED_RANSAC_CONFIDENCE};
use crate::error::RegistrationIssue;
use crate::matching::Correspondence;

pub use homography::{fit_homography, homography_from_4pt, Homography};
pub use ransac::{ransac_homography, RansacOutcome, RansacParams};

/// Settings for one robust homography estimation.
#[derive(Debug, Clone)]
pub struct EstimatorParams {
    /// Below this many correspondences the fit is still attempted but
    /// flagged low-confidence.
    pub min_correspondences: usize,
    pub reprojection_threshold: f64,
    pub confidence: f64,
    pub max_iterations: usize,
    /// Normalized condition number above which the model is ill-conditioned.
    pub condition_ceiling: f64,
    pub seed: Option<u64>,
}

/// Outcome of [`estimate_homography`].
#[derive(Debug, Clone, Default)]
pub struct Estimate {
    pub homography: Option<Homography>,
    pub inlier_count: usize,
    pub correspondence_count: usize,
    /// Indices of inlier correspondences.
    pub inliers: Vec<usize>,
    pub low_confidence: bool,
    /// The relaxed retry ran because the first model was ill-conditioned.
    pub retried: bool,
    /// Normalized condition number of the returned model.
    pub condition: Option<f64>,
    pub issues: Vec<RegistrationIssue>,
}

impl Estimate {
    fn failed(correspondence_count: usize, issues: Vec<RegistrationIssue>) -> Self {
        Self {
            correspondence_count,
            issues,
            ..Default::default()
        }
    }

    pub fn inlier_ratio(&self) -> f64 {
        if self.correspondence_count == 0 {
            0.0
        } else {
            self.inlier_count as f64 / self.correspondence_count as f64
        }
    }
}

/// Robustly fit a target-to-reference homography.
///
/// Fewer than four correspondences, or no consistent minimal sample, yield
/// `homography: None` and `inlier_count: 0`. An ill-conditioned model is
/// refit once with a doubled threshold and halved iteration cap; if that
/// model is still ill-conditioned it is kept and flagged low-confidence.
pub fn estimate_homography(
    correspondences: &[Correspondence],
    params: &EstimatorParams,
) -> Estimate {
    let n = correspondences.len();
    if n < MIN_HOMOGRAPHY_CORRESPONDENCES {
        return Estimate::failed(
            n,
            vec![RegistrationIssue::InsufficientCorrespondences {
                found: n,
                required: MIN_HOMOGRAPHY_CORRESPONDENCES,
            }],
        );
    }

    let mut issues = Vec::new();
    let mut low_confidence = false;
    if n < params.min_correspondences {
        low_confidence = true;
        issues.push(RegistrationIssue::InsufficientCorrespondences {
            found: n,
            required: params.min_correspondences,
        });
    }

    let src: Vec<Point2<f64>> = correspondences.iter().map(|c| c.target).collect();
    let dst: Vec<Point2<f64>> = correspondences.iter().map(|c| c.reference).collect();

    let ransac = RansacParams {
        reprojection_threshold: params.reprojection_threshold,
        confidence: params.confidence,
        max_iterations: params.max_iterations,
        seed: params.seed,
        ..Default::default()
    };

    let Some(first) = ransac_homography(&src, &dst, &ransac) else {
        issues.push(RegistrationIssue::EstimationFailed);
        return Estimate::failed(n, issues);
    };

    let condition = inlier_condition(&first, &src, &dst);
    debug!(
        correspondences = n,
        inliers = first.inliers.len(),
        iterations = first.iterations,
        condition,
        "RANSAC fit"
    );

    if condition <= params.condition_ceiling {
        return Estimate {
            homography: Some(first.homography),
            inlier_count: first.inliers.len(),
            correspondence_count: n,
            inliers: first.inliers,
            low_confidence,
            retried: false,
            condition: Some(condition),
            issues,
        };
    }

    warn!(
        condition,
        ceiling = params.condition_ceiling,
        "Ill-conditioned homography, retrying with relaxed tolerances"
    );
    issues.push(RegistrationIssue::IllConditionedModel { condition });

    let relaxed = RansacParams {
        reprojection_threshold: params.reprojection_threshold * 2.0,
        confidence: RELAXED_RANSAC_CONFIDENCE,
        max_iterations: (params.max_iterations / 2).max(1),
        seed: params.seed.map(|s| s.wrapping_add(1)),
        ..Default::default()
    };

    let Some(second) = ransac_homography(&src, &dst, &relaxed) else {
        issues.push(RegistrationIssue::EstimationFailed);
        return Estimate::failed(n, issues);
    };

    let condition = inlier_condition(&second, &src, &dst);
    if condition > params.condition_ceiling {
        low_confidence = true;
        issues.push(RegistrationIssue::IllConditionedModel { condition });
    }

    Estimate {
        homography: Some(second.homography),
        inlier_count: second.inliers.len(),
        correspondence_count: n,
        inliers: second.inliers,
        low_confidence,
        retried: true,
        condition: Some(condition),
        issues,
    }
}

fn inlier_condition(outcome: &RansacOutcome, src: &[Point2<f64>], dst: &[Point2<f64>]) -> f64 {
    let s: Vec<Point2<f64>> = outcome.inliers.iter().map(|&i| src[i]).collect();
    let d: Vec<Point2<f64>> = outcome.inliers.iter().map(|&i| dst[i]).collect();
    outcome.homography.normalized_condition_number(&s, &d)
}
