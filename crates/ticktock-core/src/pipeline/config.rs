use std::fmt;

use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_CONDITION_CEILING, DEFAULT_DENSE_CONFIDENCE, DEFAULT_DENSE_REPROJECTION_THRESHOLD,
    DEFAULT_LOW_LIGHT_REPROJECTION_THRESHOLD, DEFAULT_LOW_LIGHT_THRESHOLD,
    DEFAULT_MIN_CORRESPONDENCES, DEFAULT_RANSAC_CONFIDENCE, DEFAULT_RANSAC_MAX_ITERATIONS,
    DEFAULT_RATIO_LOW_LIGHT, DEFAULT_RATIO_NORMAL, DEFAULT_REPROJECTION_THRESHOLD,
    DEFAULT_TEMPLATE_MARGIN, DEFAULT_TEMPLATE_MIN_CORRELATION, DEFAULT_TEMPLATE_SCALES,
    DEFAULT_TEMPLATE_WORKING_SIZE, MIN_HOMOGRAPHY_CORRESPONDENCES,
};
use crate::dense::{DevicePreference, PatchCorrelationParams};
use crate::enhance::EnhanceParams;
use crate::error::{Result, TickTockError};
use crate::estimate::EstimatorParams;
use crate::features::FeatureConfig;
use crate::template::TemplateParams;

/// Which registration paths the orchestrator may take.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// Dense when a dense matcher is installed, otherwise sparse; template
    /// correlation as the last resort.
    #[default]
    Auto,
    /// Sparse features, then template correlation.
    Sparse,
    /// Dense matcher, then template correlation.
    Dense,
    /// Template correlation only.
    TemplateOnly,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Sparse => write!(f, "sparse"),
            Self::Dense => write!(f, "dense"),
            Self::TemplateOnly => write!(f, "template"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    pub strategy: Strategy,
    /// Mean luminance (0-255) below which a target is low-light.
    pub low_light_threshold: f32,
    /// Lowe ratio for normal-light gradient-histogram matching.
    pub ratio_test_threshold: f32,
    /// Lowe ratio for low-light / binary matching.
    pub low_light_ratio_test_threshold: f32,
    /// Recommended minimum; fewer correspondences flag low confidence.
    pub min_correspondences: usize,
    pub ransac_reprojection_threshold: f64,
    pub low_light_reprojection_threshold: f64,
    pub ransac_confidence: f64,
    pub ransac_max_iterations: usize,
    /// Normalized condition number above which a homography is refit.
    pub condition_ceiling: f64,
    /// Fixed RANSAC seed for reproducible runs.
    pub seed: Option<u64>,
    pub template_scales: Vec<f64>,
    pub template_min_correlation: f64,
    pub template: TemplateSearchConfig,
    pub enhance: EnhanceParams,
    pub features: FeatureConfig,
    pub dense: DenseConfig,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Auto,
            low_light_threshold: DEFAULT_LOW_LIGHT_THRESHOLD,
            ratio_test_threshold: DEFAULT_RATIO_NORMAL,
            low_light_ratio_test_threshold: DEFAULT_RATIO_LOW_LIGHT,
            min_correspondences: DEFAULT_MIN_CORRESPONDENCES,
            ransac_reprojection_threshold: DEFAULT_REPROJECTION_THRESHOLD,
            low_light_reprojection_threshold: DEFAULT_LOW_LIGHT_REPROJECTION_THRESHOLD,
            ransac_confidence: DEFAULT_RANSAC_CONFIDENCE,
            ransac_max_iterations: DEFAULT_RANSAC_MAX_ITERATIONS,
            condition_ceiling: DEFAULT_CONDITION_CEILING,
            seed: None,
            template_scales: DEFAULT_TEMPLATE_SCALES.to_vec(),
            template_min_correlation: DEFAULT_TEMPLATE_MIN_CORRELATION,
            template: TemplateSearchConfig::default(),
            enhance: EnhanceParams::default(),
            features: FeatureConfig::default(),
            dense: DenseConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateSearchConfig {
    /// Fraction of the reference cut from each side to form the template.
    pub margin: f64,
    pub working_size: usize,
}

impl Default for TemplateSearchConfig {
    fn default() -> Self {
        Self {
            margin: DEFAULT_TEMPLATE_MARGIN,
            working_size: DEFAULT_TEMPLATE_WORKING_SIZE,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DenseConfig {
    /// Predictions below this confidence are discarded.
    pub confidence_threshold: f32,
    pub reprojection_threshold: f64,
    pub max_iterations: usize,
    pub device: DevicePreference,
    /// Settings of the built-in patch-correlation matcher.
    pub patch: PatchCorrelationParams,
}

impl Default for DenseConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_DENSE_CONFIDENCE,
            reprojection_threshold: DEFAULT_DENSE_REPROJECTION_THRESHOLD,
            max_iterations: DEFAULT_RANSAC_MAX_ITERATIONS * 2,
            device: DevicePreference::Cpu,
            patch: PatchCorrelationParams::default(),
        }
    }
}

/// Smallest template search image side that leaves room for a template.
const MIN_WORKING_SIZE: usize = 16;

impl RegistrationConfig {
    /// Reject values that would make a stage meaningless.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(TickTockError::InvalidConfig(msg));

        for (name, ratio) in [
            ("ratio_test_threshold", self.ratio_test_threshold),
            ("low_light_ratio_test_threshold", self.low_light_ratio_test_threshold),
        ] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return invalid(format!("{name} must be in (0, 1], got {ratio}"));
            }
        }
        if self.min_correspondences < MIN_HOMOGRAPHY_CORRESPONDENCES {
            return invalid(format!(
                "min_correspondences must be at least {MIN_HOMOGRAPHY_CORRESPONDENCES}, got {}",
                self.min_correspondences
            ));
        }
        for (name, t) in [
            ("ransac_reprojection_threshold", self.ransac_reprojection_threshold),
            ("low_light_reprojection_threshold", self.low_light_reprojection_threshold),
            ("dense.reprojection_threshold", self.dense.reprojection_threshold),
        ] {
            if !(t > 0.0 && t.is_finite()) {
                return invalid(format!("{name} must be positive, got {t}"));
            }
        }
        if !(self.ransac_confidence > 0.0 && self.ransac_confidence < 1.0) {
            return invalid(format!(
                "ransac_confidence must be in (0, 1), got {}",
                self.ransac_confidence
            ));
        }
        if self.ransac_max_iterations == 0 || self.dense.max_iterations == 0 {
            return invalid("RANSAC iteration caps must be positive".into());
        }
        if !(self.condition_ceiling >= 1.0) {
            return invalid(format!(
                "condition_ceiling must be at least 1, got {}",
                self.condition_ceiling
            ));
        }
        if self.template_scales.is_empty() || self.template_scales.iter().any(|&s| !(s > 0.0)) {
            return invalid("template_scales must be a non-empty list of positive factors".into());
        }
        if !(0.0..0.5).contains(&self.template.margin) {
            return invalid(format!(
                "template.margin must be in [0, 0.5), got {}",
                self.template.margin
            ));
        }
        if self.template.working_size < MIN_WORKING_SIZE {
            return invalid(format!(
                "template.working_size must be at least {MIN_WORKING_SIZE}, got {}",
                self.template.working_size
            ));
        }
        if !(self.template_min_correlation >= 0.0 && self.template_min_correlation < 1.0) {
            return invalid(format!(
                "template_min_correlation must be in [0, 1), got {}",
                self.template_min_correlation
            ));
        }
        if !(0.0..=1.0).contains(&self.dense.confidence_threshold) {
            return invalid(format!(
                "dense.confidence_threshold must be in [0, 1], got {}",
                self.dense.confidence_threshold
            ));
        }
        let patch = &self.dense.patch;
        if patch.grid_step == 0 || patch.coarse_factor == 0 {
            return invalid("dense.patch grid_step and coarse_factor must be positive".into());
        }
        if patch.canvas_size < patch.min_canvas_size() {
            return invalid(format!(
                "dense.patch.canvas_size must be at least {}, got {}",
                patch.min_canvas_size(),
                patch.canvas_size
            ));
        }
        Ok(())
    }

    /// Lowe ratio for a path.
    pub fn ratio_for(&self, low_light_or_binary: bool) -> f32 {
        if low_light_or_binary {
            self.low_light_ratio_test_threshold
        } else {
            self.ratio_test_threshold
        }
    }

    pub fn sparse_estimator(&self, low_light: bool) -> EstimatorParams {
        EstimatorParams {
            min_correspondences: self.min_correspondences,
            reprojection_threshold: if low_light {
                self.low_light_reprojection_threshold
            } else {
                self.ransac_reprojection_threshold
            },
            confidence: self.ransac_confidence,
            max_iterations: self.ransac_max_iterations,
            condition_ceiling: self.condition_ceiling,
            seed: self.seed,
        }
    }

    pub fn dense_estimator(&self) -> EstimatorParams {
        EstimatorParams {
            min_correspondences: self.min_correspondences,
            reprojection_threshold: self.dense.reprojection_threshold,
            confidence: self.ransac_confidence,
            max_iterations: self.dense.max_iterations,
            condition_ceiling: self.condition_ceiling,
            seed: self.seed,
        }
    }

    pub fn template_params(&self) -> TemplateParams {
        TemplateParams {
            scales: self.template_scales.clone(),
            min_correlation: self.template_min_correlation,
            margin: self.template.margin,
            working_size: self.template.working_size,
        }
    }
}
