use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use ndarray::Array2;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::classify::{classify_mean, LightCondition};
use crate::consts::{MIN_HOMOGRAPHY_CORRESPONDENCES, PARALLEL_FRAME_THRESHOLD};
use crate::dense::{DenseMatcher, Letterbox, SerializedMatcher};
use crate::enhance::enhance;
use crate::error::RegistrationIssue;
use crate::estimate::{estimate_homography, Estimate};
use crate::features::{DetectorKind, FeatureSet};
use crate::frame::{Frame, Image};
use crate::matching::{correspondences_from_dense, match_sparse};
use crate::template::estimate_translation;

use super::config::{RegistrationConfig, Strategy};
use super::types::{
    BatchStage, MethodUsed, ProgressReporter, RegistrationResult, RegistrationState,
};

/// Reference-side artifacts shared read-only by every registration of a batch.
///
/// Each feature set is computed at most once, whichever worker asks first.
pub struct ReferenceFeatures {
    image: Array2<f32>,
    /// Enhanced copy when the reference itself is low-light.
    detection_image: Array2<f32>,
    light_condition: LightCondition,
    mean_luminance: f32,
    sift: OnceLock<FeatureSet>,
    orb: OnceLock<FeatureSet>,
    akaze: OnceLock<FeatureSet>,
    brisk: OnceLock<FeatureSet>,
    canvas: OnceLock<Letterbox>,
}

impl ReferenceFeatures {
    pub fn light_condition(&self) -> LightCondition {
        self.light_condition
    }

    pub fn mean_luminance(&self) -> f32 {
        self.mean_luminance
    }

    pub fn width(&self) -> usize {
        self.image.ncols()
    }

    pub fn height(&self) -> usize {
        self.image.nrows()
    }

    /// Reference features for `kind`. The gradient-histogram set is always
    /// described on the plain reference, binary sets on the detection image.
    pub fn features(&self, kind: DetectorKind, config: &RegistrationConfig) -> &FeatureSet {
        let cell = match kind {
            DetectorKind::Sift => &self.sift,
            DetectorKind::Orb => &self.orb,
            DetectorKind::Akaze => &self.akaze,
            DetectorKind::Brisk => &self.brisk,
        };
        cell.get_or_init(|| {
            let source = match kind {
                DetectorKind::Sift => &self.image,
                _ => &self.detection_image,
            };
            let set = config.features.extract(source, kind);
            debug!(detector = %kind, keypoints = set.len(), "Reference features");
            set
        })
    }

    fn canvas(&self, size: usize) -> &Letterbox {
        self.canvas.get_or_init(|| Letterbox::new(&self.image, size))
    }
}

/// Per-registration bookkeeping while walking the state machine.
struct Run {
    light_condition: LightCondition,
    trace: Vec<RegistrationState>,
    issues: Vec<RegistrationIssue>,
    correspondence_count: usize,
}

impl Run {
    fn enter(&mut self, state: RegistrationState) {
        debug!(state = %state, "Registration state");
        self.trace.push(state);
    }

    fn accept(
        mut self,
        estimate: Estimate,
        method: MethodUsed,
        detector: Option<DetectorKind>,
        min: usize,
    ) -> RegistrationResult {
        self.enter(RegistrationState::Accept);
        self.enter(RegistrationState::Done);
        self.issues.extend(estimate.issues);
        let quality_ok = estimate.inlier_count >= min && !estimate.low_confidence;
        RegistrationResult {
            homography: estimate.homography,
            inlier_count: estimate.inlier_count,
            correspondence_count: estimate.correspondence_count,
            method_used: method,
            quality_ok,
            light_condition: self.light_condition,
            detector,
            low_confidence: estimate.low_confidence,
            correlation: None,
            issues: self.issues,
            trace: self.trace,
        }
    }
}

/// Registers targets against a reference with the configured strategy.
pub struct Registrar {
    config: RegistrationConfig,
    dense: Option<SerializedMatcher>,
}

impl Registrar {
    pub fn new(config: RegistrationConfig) -> Self {
        Self {
            config,
            dense: None,
        }
    }

    /// Install a dense matcher. Calls into it are serialized when it runs
    /// on an accelerator.
    pub fn with_dense_matcher(mut self, matcher: Box<dyn DenseMatcher>) -> Self {
        info!(
            matcher = matcher.name(),
            device = %matcher.context().device,
            "Dense matcher installed"
        );
        self.dense = Some(SerializedMatcher::new(matcher));
        self
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    fn uses_dense(&self) -> bool {
        match self.config.strategy {
            Strategy::Dense => true,
            Strategy::Auto => self.dense.is_some(),
            Strategy::Sparse | Strategy::TemplateOnly => false,
        }
    }

    fn uses_sparse(&self) -> bool {
        match self.config.strategy {
            Strategy::Sparse => true,
            Strategy::Auto => true,
            Strategy::Dense | Strategy::TemplateOnly => false,
        }
    }

    /// Classify the reference and compute what every registration needs
    /// from it up front.
    pub fn prepare_reference(&self, reference: &Frame) -> ReferenceFeatures {
        let mean_luminance = reference.mean_8bit();
        let light_condition = classify_mean(mean_luminance, self.config.low_light_threshold);
        let detection_image = match light_condition {
            LightCondition::LowLight => enhance(reference, &self.config.enhance).data,
            LightCondition::Normal => reference.data.clone(),
        };

        let prepared = ReferenceFeatures {
            image: reference.data.clone(),
            detection_image,
            light_condition,
            mean_luminance,
            sift: OnceLock::new(),
            orb: OnceLock::new(),
            akaze: OnceLock::new(),
            brisk: OnceLock::new(),
            canvas: OnceLock::new(),
        };

        if self.uses_sparse() && !self.uses_dense() {
            prepared.features(DetectorKind::Sift, &self.config);
        }
        if let (true, Some(matcher)) = (self.uses_dense(), &self.dense) {
            prepared.canvas(matcher.canvas_size());
        }

        info!(
            condition = %light_condition,
            mean_luminance,
            width = reference.width(),
            height = reference.height(),
            "Reference prepared"
        );
        prepared
    }

    /// Register one target against prepared reference features.
    ///
    /// Never fails: every problem degrades to a weaker method and is
    /// recorded in the result's `issues`.
    pub fn register_prepared(
        &self,
        reference: &ReferenceFeatures,
        target: &Frame,
    ) -> RegistrationResult {
        let mut run = Run {
            light_condition: LightCondition::Normal,
            trace: Vec::with_capacity(8),
            issues: Vec::new(),
            correspondence_count: 0,
        };

        run.enter(RegistrationState::Classify);
        let mean = target.mean_8bit();
        run.light_condition = classify_mean(mean, self.config.low_light_threshold);
        debug!(mean_luminance = mean, condition = %run.light_condition, "Target classified");

        if self.uses_dense() {
            match self.register_dense(reference, target, run) {
                Ok(result) => return result,
                Err(failed) => run = failed,
            }
            if self.config.strategy == Strategy::Dense {
                return self.fallback_template(reference, target, run);
            }
        }

        if self.uses_sparse() {
            match self.register_sparse(reference, target, run) {
                Ok(result) => return result,
                Err(failed) => run = failed,
            }
        }

        self.fallback_template(reference, target, run)
    }

    fn register_dense(
        &self,
        reference: &ReferenceFeatures,
        target: &Frame,
        mut run: Run,
    ) -> std::result::Result<RegistrationResult, Run> {
        run.enter(RegistrationState::Extract);
        let Some(matcher) = &self.dense else {
            run.issues.push(RegistrationIssue::DenseMatcherUnavailable(
                "no dense matcher installed".into(),
            ));
            return Err(run);
        };
        let size = matcher.canvas_size();
        let ref_box = reference.canvas(size);
        let tgt_box = Letterbox::new(&target.data, size);

        run.enter(RegistrationState::Match);
        let predictions = match matcher.match_pair(&ref_box.canvas, &tgt_box.canvas) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, matcher = matcher.name(), "Dense matcher failed");
                run.issues.push(RegistrationIssue::DenseMatcherUnavailable(e.to_string()));
                return Err(run);
            }
        };
        let correspondences = correspondences_from_dense(
            &predictions,
            ref_box,
            &tgt_box,
            self.config.dense.confidence_threshold,
        );
        run.correspondence_count = correspondences.len();
        if correspondences.is_empty() {
            run.issues.push(RegistrationIssue::InsufficientCorrespondences {
                found: 0,
                required: MIN_HOMOGRAPHY_CORRESPONDENCES,
            });
            return Err(run);
        }

        run.enter(RegistrationState::Estimate);
        let estimate = estimate_homography(&correspondences, &self.config.dense_estimator());
        if estimate.homography.is_none() {
            run.issues.extend(estimate.issues);
            return Err(run);
        }
        info!(
            inliers = estimate.inlier_count,
            correspondences = estimate.correspondence_count,
            method = %MethodUsed::Dense,
            "Registered target"
        );
        Ok(run.accept(estimate, MethodUsed::Dense, None, self.config.min_correspondences))
    }

    fn register_sparse(
        &self,
        reference: &ReferenceFeatures,
        target: &Frame,
        mut run: Run,
    ) -> std::result::Result<RegistrationResult, Run> {
        run.enter(RegistrationState::Extract);
        let low_light = run.light_condition == LightCondition::LowLight;
        let enhanced = low_light.then(|| enhance(target, &self.config.enhance));

        let mut target_set = match &enhanced {
            Some(e) => self.best_binary(&e.data),
            None => self.config.features.extract(&target.data, DetectorKind::Sift),
        };

        if target_set.is_empty() {
            // Universal detector, on the enhanced image
            let retry_source = match enhanced {
                Some(e) => e,
                None => enhance(target, &self.config.enhance),
            };
            debug!(detector = %target_set.detector, "No keypoints, retrying with SIFT");
            target_set = self
                .config
                .features
                .extract(&retry_source.data, DetectorKind::Sift);
        }
        if target_set.is_empty() {
            run.issues.push(RegistrationIssue::InsufficientFeatures);
            return Err(run);
        }

        run.enter(RegistrationState::Match);
        let kind = target_set.detector;
        let reference_set = reference.features(kind, &self.config);
        let binary = kind != DetectorKind::Sift;
        let matches = match_sparse(
            reference_set,
            &target_set,
            self.config.ratio_for(low_light || binary),
        );
        if let Some(issue) = &matches.issue {
            run.issues.push(issue.clone());
            return Err(run);
        }
        run.correspondence_count = matches.len();
        if matches.is_empty() {
            run.issues.push(RegistrationIssue::InsufficientCorrespondences {
                found: 0,
                required: MIN_HOMOGRAPHY_CORRESPONDENCES,
            });
            return Err(run);
        }

        run.enter(RegistrationState::Estimate);
        let estimate = estimate_homography(
            &matches.correspondences,
            &self.config.sparse_estimator(low_light),
        );
        if estimate.homography.is_none() {
            run.issues.extend(estimate.issues);
            return Err(run);
        }

        let method = if binary {
            MethodUsed::SparseBinary
        } else {
            MethodUsed::SparseGradient
        };
        info!(
            inliers = estimate.inlier_count,
            correspondences = estimate.correspondence_count,
            detector = %kind,
            method = %method,
            "Registered target"
        );
        Ok(run.accept(estimate, method, Some(kind), self.config.min_correspondences))
    }

    /// Run the binary detectors concurrently and keep the richest set.
    fn best_binary(&self, image: &Array2<f32>) -> FeatureSet {
        let features = &self.config.features;
        let (orb, (akaze, brisk)) = rayon::join(
            || features.extract(image, DetectorKind::Orb),
            || {
                rayon::join(
                    || features.extract(image, DetectorKind::Akaze),
                    || features.extract(image, DetectorKind::Brisk),
                )
            },
        );
        debug!(
            orb = orb.len(),
            akaze = akaze.len(),
            brisk = brisk.len(),
            "Binary detector keypoints"
        );

        // Earlier detectors win ties
        let mut best = orb;
        for candidate in [akaze, brisk] {
            if candidate.len() > best.len() {
                best = candidate;
            }
        }
        best
    }

    fn fallback_template(
        &self,
        reference: &ReferenceFeatures,
        target: &Frame,
        mut run: Run,
    ) -> RegistrationResult {
        run.enter(RegistrationState::FallbackTemplate);
        let outcome =
            estimate_translation(&reference.image, &target.data, &self.config.template_params());
        run.enter(RegistrationState::Done);

        match outcome {
            Ok(found) => {
                info!(
                    correlation = found.correlation,
                    scale = found.scale,
                    method = %MethodUsed::Template,
                    "Registered target"
                );
                RegistrationResult {
                    homography: Some(found.homography),
                    inlier_count: 0,
                    correspondence_count: run.correspondence_count,
                    method_used: MethodUsed::Template,
                    quality_ok: true,
                    light_condition: run.light_condition,
                    detector: None,
                    low_confidence: false,
                    correlation: Some(found.correlation),
                    issues: run.issues,
                    trace: run.trace,
                }
            }
            Err(issue) => {
                warn!(%issue, "Registration failed, target will pass through unregistered");
                run.issues.push(issue);
                RegistrationResult {
                    homography: None,
                    inlier_count: 0,
                    correspondence_count: run.correspondence_count,
                    method_used: MethodUsed::None,
                    quality_ok: false,
                    light_condition: run.light_condition,
                    detector: None,
                    low_confidence: false,
                    correlation: None,
                    issues: run.issues,
                    trace: run.trace,
                }
            }
        }
    }

    /// Register a single pair.
    pub fn register(&self, reference: &Frame, target: &Frame) -> RegistrationResult {
        let prepared = self.prepare_reference(reference);
        self.register_prepared(&prepared, target)
    }

    /// Register every target against one prepared reference, in parallel
    /// for larger batches. Results are in input order.
    pub fn register_batch<F>(
        &self,
        reference: &ReferenceFeatures,
        targets: &[Frame],
        on_done: F,
    ) -> Vec<RegistrationResult>
    where
        F: Fn(usize) + Send + Sync,
    {
        let counter = AtomicUsize::new(0);
        let run_one = |target: &Frame| {
            let result = self.register_prepared(reference, target);
            let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
            on_done(done);
            result
        };

        if targets.len() >= PARALLEL_FRAME_THRESHOLD {
            targets.par_iter().map(run_one).collect()
        } else {
            targets.iter().map(run_one).collect()
        }
    }

    /// [`register_batch`](Self::register_batch) with stage reporting,
    /// preparing the reference first.
    pub fn register_batch_reported(
        &self,
        reference: &Frame,
        targets: &[Frame],
        reporter: &dyn ProgressReporter,
    ) -> Vec<RegistrationResult> {
        reporter.begin_stage(BatchStage::PreparingReference, None);
        let prepared = self.prepare_reference(reference);
        reporter.finish_stage();

        reporter.begin_stage(BatchStage::Registering, Some(targets.len()));
        let results = self.register_batch(&prepared, targets, |done| reporter.advance(done));
        reporter.finish_stage();

        let registered = results.iter().filter(|r| r.is_registered()).count();
        info!(total = targets.len(), registered, "Batch registration complete");
        results
    }
}

/// Register `target` onto `reference`.
///
/// Color images are registered on their luminance. Always returns a
/// result; see [`RegistrationResult`] for how failures are reported.
pub fn register(
    reference: &Image,
    target: &Image,
    config: &RegistrationConfig,
) -> RegistrationResult {
    let registrar = Registrar::new(config.clone());
    registrar.register(&reference.to_mono(), &target.to_mono())
}

/// Register every target against `reference`. `on_done` receives the
/// number of finished targets after each one completes.
pub fn register_batch<F>(
    reference: &Frame,
    targets: &[Frame],
    config: &RegistrationConfig,
    on_done: F,
) -> Vec<RegistrationResult>
where
    F: Fn(usize) + Send + Sync,
{
    let registrar = Registrar::new(config.clone());
    let prepared = registrar.prepare_reference(reference);
    registrar.register_batch(&prepared, targets, on_done)
}
