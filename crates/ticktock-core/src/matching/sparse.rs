use nalgebra::Point2;
use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;
use tracing::debug;

use crate::error::RegistrationIssue;
use crate::features::{hamming_distance, BinaryDescriptor, Descriptors, FeatureSet};

use super::{Correspondence, MatchScore, MatchSet};

/// Two nearest reference descriptors of one target descriptor.
#[derive(Clone, Copy)]
struct Nearest {
    best_index: usize,
    best: f32,
    second: f32,
}

impl Nearest {
    fn new() -> Self {
        Self {
            best_index: usize::MAX,
            best: f32::INFINITY,
            second: f32::INFINITY,
        }
    }

    #[inline]
    fn offer(&mut self, index: usize, distance: f32) {
        if distance < self.best {
            self.second = self.best;
            self.best = distance;
            self.best_index = index;
        } else if distance < self.second {
            self.second = distance;
        }
    }

    /// Lowe's ratio test. Needs two candidates.
    fn passes(&self, ratio: f32) -> bool {
        self.second.is_finite() && self.best < ratio * self.second
    }
}

/// Match target descriptors against reference descriptors with a k=2
/// nearest-neighbour search and Lowe's ratio test.
///
/// Sets produced by different detectors are never compared: the result is
/// empty with [`RegistrationIssue::DescriptorFamilyMismatch`].
pub fn match_sparse(reference: &FeatureSet, target: &FeatureSet, ratio: f32) -> MatchSet {
    if reference.detector != target.detector {
        debug!(
            reference = %reference.detector,
            target = %target.detector,
            "Refusing to match descriptors of different detectors"
        );
        return MatchSet::rejected(RegistrationIssue::DescriptorFamilyMismatch);
    }

    let nearest = match (&reference.descriptors, &target.descriptors) {
        (Descriptors::Float(r), Descriptors::Float(t)) => knn_float(r, t),
        (Descriptors::Binary(r), Descriptors::Binary(t)) => knn_binary(r, t),
        _ => return MatchSet::rejected(RegistrationIssue::DescriptorFamilyMismatch),
    };

    let correspondences: Vec<Correspondence> = nearest
        .into_iter()
        .enumerate()
        .filter(|(_, n)| n.passes(ratio))
        .filter_map(|(ti, n)| {
            let rk = reference.keypoints.get(n.best_index)?;
            let tk = target.keypoints.get(ti)?;
            Some(Correspondence {
                reference_index: n.best_index,
                target_index: ti,
                reference: Point2::new(rk.x as f64, rk.y as f64),
                target: Point2::new(tk.x as f64, tk.y as f64),
                score: MatchScore::Distance(n.best),
            })
        })
        .collect();

    debug!(
        detector = %reference.detector,
        reference = reference.len(),
        target = target.len(),
        matches = correspondences.len(),
        ratio,
        "Sparse matching"
    );

    MatchSet {
        correspondences,
        issue: None,
    }
}

fn knn_float(reference: &Array2<f32>, target: &Array2<f32>) -> Vec<Nearest> {
    if reference.ncols() != target.ncols() {
        return Vec::new();
    }
    let l2 = |a: ArrayView1<f32>, b: ArrayView1<f32>| -> f32 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt()
    };

    (0..target.nrows())
        .into_par_iter()
        .map(|ti| {
            let t = target.row(ti);
            let mut nearest = Nearest::new();
            for (ri, r) in reference.rows().into_iter().enumerate() {
                nearest.offer(ri, l2(r, t));
            }
            nearest
        })
        .collect()
}

fn knn_binary(reference: &[BinaryDescriptor], target: &[BinaryDescriptor]) -> Vec<Nearest> {
    target
        .par_iter()
        .map(|t| {
            let mut nearest = Nearest::new();
            for (ri, r) in reference.iter().enumerate() {
                nearest.offer(ri, hamming_distance(r, t) as f32);
            }
            nearest
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_test_needs_a_second_neighbour() {
        let mut n = Nearest::new();
        n.offer(0, 1.0);
        assert!(!n.passes(0.7));
        n.offer(1, 10.0);
        assert!(n.passes(0.7));
        n.offer(2, 1.2);
        assert!(!n.passes(0.7));
        assert_eq!(n.best_index, 0);
    }
}
