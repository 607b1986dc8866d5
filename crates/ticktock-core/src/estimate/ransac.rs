//! RANSAC homography fitting.
//!
//! 1. Sample four distinct correspondences (Floyd's algorithm)
//! 2. Solve the exact four-point homography
//! 3. Count correspondences with reprojection error under the threshold
//! 4. Locally optimize promising hypotheses by refitting on their inliers
//! 5. Refit the best model on all of its inliers and recount

use nalgebra::Point2;
use rand::prelude::*;
use rand::rngs::StdRng;

use super::homography::{fit_homography, Homography};

/// Minimal sample size for a projective fit.
pub const SAMPLE_SIZE: usize = 4;

#[derive(Debug, Clone)]
pub struct RansacParams {
    /// Inlier reprojection error threshold in pixels.
    pub reprojection_threshold: f64,
    /// Probability of drawing at least one all-inlier sample.
    pub confidence: f64,
    pub max_iterations: usize,
    /// Random seed for reproducibility (None for OS entropy).
    pub seed: Option<u64>,
    /// Refit promising hypotheses on their inliers.
    pub use_local_optimization: bool,
    pub lo_max_iterations: usize,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            reprojection_threshold: 5.0,
            confidence: 0.995,
            max_iterations: 5000,
            seed: None,
            use_local_optimization: true,
            lo_max_iterations: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RansacOutcome {
    pub homography: Homography,
    /// Indices of inlier correspondences.
    pub inliers: Vec<usize>,
    pub iterations: usize,
}

/// Fit `dst ~ H * src` robustly.
///
/// Returns `None` when fewer than four pairs are given or when no sampled
/// subset produced a usable model.
pub fn ransac_homography(
    src: &[Point2<f64>],
    dst: &[Point2<f64>],
    params: &RansacParams,
) -> Option<RansacOutcome> {
    let n = src.len();
    if n < SAMPLE_SIZE || dst.len() != n {
        return None;
    }

    let mut rng: StdRng = match params.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let threshold = params.reprojection_threshold;
    let mut best: Option<(Homography, Vec<usize>)> = None;

    let mut sample_indices: Vec<usize> = Vec::with_capacity(SAMPLE_SIZE);
    let mut sample_src: Vec<Point2<f64>> = Vec::with_capacity(SAMPLE_SIZE);
    let mut sample_dst: Vec<Point2<f64>> = Vec::with_capacity(SAMPLE_SIZE);

    let mut iterations = 0;
    let mut max_iter = params.max_iterations.max(1);

    while iterations < max_iter {
        iterations += 1;

        random_sample_into(&mut rng, n, SAMPLE_SIZE, &mut sample_indices);

        sample_src.clear();
        sample_dst.clear();
        for &i in &sample_indices {
            sample_src.push(src[i]);
            sample_dst.push(dst[i]);
        }

        if is_degenerate_sample(&sample_src) || is_degenerate_sample(&sample_dst) {
            continue;
        }

        let Some(candidate) = fit_homography(&sample_src, &sample_dst) else {
            continue;
        };

        let mut inliers = count_inliers(src, dst, &candidate, threshold);
        let mut current = candidate;

        if params.use_local_optimization && inliers.len() > SAMPLE_SIZE {
            (current, inliers) = local_optimization(src, dst, current, inliers, params);
        }

        let improved = match &best {
            Some((_, best_inliers)) => inliers.len() > best_inliers.len(),
            None => true,
        };
        if improved && inliers.len() >= SAMPLE_SIZE {
            let ratio = inliers.len() as f64 / n as f64;
            max_iter = max_iter.min(adaptive_iterations(ratio, SAMPLE_SIZE, params.confidence));
            best = Some((current, inliers));
        }
    }

    let (model, inliers) = best?;

    // Final refinement on all inliers, keeping the sampled model if the
    // refit is worse
    let refined = refit(src, dst, &inliers).unwrap_or(model);
    let final_inliers = count_inliers(src, dst, &refined, threshold);
    let (homography, inliers) = if final_inliers.len() >= inliers.len() {
        (refined, final_inliers)
    } else {
        (model, inliers)
    };

    Some(RansacOutcome {
        homography,
        inliers,
        iterations,
    })
}

fn local_optimization(
    src: &[Point2<f64>],
    dst: &[Point2<f64>],
    initial: Homography,
    initial_inliers: Vec<usize>,
    params: &RansacParams,
) -> (Homography, Vec<usize>) {
    let mut current = initial;
    let mut current_inliers = initial_inliers;

    for _ in 0..params.lo_max_iterations {
        let Some(refined) = refit(src, dst, &current_inliers) else {
            break;
        };
        let new_inliers = count_inliers(src, dst, &refined, params.reprojection_threshold);
        if new_inliers.len() <= current_inliers.len() {
            break;
        }
        current = refined;
        current_inliers = new_inliers;
    }

    (current, current_inliers)
}

fn refit(src: &[Point2<f64>], dst: &[Point2<f64>], inliers: &[usize]) -> Option<Homography> {
    if inliers.len() < SAMPLE_SIZE {
        return None;
    }
    let s: Vec<Point2<f64>> = inliers.iter().map(|&i| src[i]).collect();
    let d: Vec<Point2<f64>> = inliers.iter().map(|&i| dst[i]).collect();
    fit_homography(&s, &d)
}

fn count_inliers(
    src: &[Point2<f64>],
    dst: &[Point2<f64>],
    model: &Homography,
    threshold: f64,
) -> Vec<usize> {
    src.iter()
        .zip(dst)
        .enumerate()
        .filter(|(_, (s, d))| model.reprojection_error(s, d) < threshold)
        .map(|(i, _)| i)
        .collect()
}

/// Floyd's algorithm for sampling `k` distinct indices from `0..n`.
fn random_sample_into<R: Rng>(rng: &mut R, n: usize, k: usize, buffer: &mut Vec<usize>) {
    debug_assert!(k <= n, "Cannot sample {} indices from {}", k, n);
    buffer.clear();
    for j in (n - k)..n {
        let t = rng.random_range(0..=j);
        if buffer.contains(&t) {
            buffer.push(j);
        } else {
            buffer.push(t);
        }
    }
}

/// A sample is degenerate if any three of its points are (nearly) collinear.
fn is_degenerate_sample(points: &[Point2<f64>]) -> bool {
    const MIN_TWICE_AREA: f64 = 1e-3;
    let n = points.len();
    for i in 0..n {
        for j in (i + 1)..n {
            for k in (j + 1)..n {
                let a = points[j] - points[i];
                let b = points[k] - points[i];
                if (a.x * b.y - a.y * b.x).abs() < MIN_TWICE_AREA {
                    return true;
                }
            }
        }
    }
    false
}

/// Iterations needed to draw an all-inlier sample with the given confidence.
pub(crate) fn adaptive_iterations(inlier_ratio: f64, sample_size: usize, confidence: f64) -> usize {
    if inlier_ratio <= 0.0 {
        return usize::MAX;
    }
    if inlier_ratio >= 1.0 {
        return 1;
    }

    // N = log(1 - confidence) / log(1 - w^n)
    let w_n = inlier_ratio.powi(sample_size as i32);
    let log_conf = (1.0 - confidence.clamp(0.0, 1.0 - 1e-12)).ln();
    let log_outlier = (1.0 - w_n).ln();

    if log_outlier >= 0.0 {
        return usize::MAX;
    }

    (log_conf / log_outlier).ceil().max(1.0) as usize
}
