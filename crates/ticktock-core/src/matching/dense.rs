use nalgebra::Point2;
use tracing::debug;

use crate::dense::{DenseMatch, Letterbox};

use super::{Correspondence, MatchScore};

/// Keep dense predictions at or above `min_confidence`, mapped back from
/// the letterboxed canvases to original pixel coordinates. Predictions
/// landing outside either original image are dropped.
pub fn correspondences_from_dense(
    matches: &[DenseMatch],
    reference: &Letterbox,
    target: &Letterbox,
    min_confidence: f32,
) -> Vec<Correspondence> {
    let mut low_confidence = 0usize;
    let mut out_of_bounds = 0usize;
    let mut correspondences = Vec::with_capacity(matches.len());

    for (i, m) in matches.iter().enumerate() {
        if m.confidence < min_confidence {
            low_confidence += 1;
            continue;
        }
        let r = reference.to_original(m.reference.0 as f64, m.reference.1 as f64);
        let t = target.to_original(m.target.0 as f64, m.target.1 as f64);
        let (Some((rx, ry)), Some((tx, ty))) = (r, t) else {
            out_of_bounds += 1;
            continue;
        };
        correspondences.push(Correspondence {
            reference_index: i,
            target_index: i,
            reference: Point2::new(rx, ry),
            target: Point2::new(tx, ty),
            score: MatchScore::Confidence(m.confidence),
        });
    }

    debug!(
        predicted = matches.len(),
        kept = correspondences.len(),
        low_confidence,
        out_of_bounds,
        "Dense correspondences"
    );
    correspondences
}
