//! Oriented FAST and rotated BRIEF.

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::filters::gaussian_blur::gaussian_blur_array;

use super::binary::{
    gaussian_pairs, set_bit, BinaryDescriptor, SamplePair, BINARY_DESCRIPTOR_BITS,
    BINARY_DESCRIPTOR_BYTES,
};
use super::fast;
use super::pyramid::{build_scaled_pyramid, PyramidLevel};
use super::{retain_strongest, DetectorKind, Descriptors, FeatureAlgorithm, FeatureSet, Keypoint};

const PAIR_SEED: u64 = 0x0_5eed_0b1e;
const HARRIS_BLOCK: usize = 7;
const HARRIS_K: f32 = 0.04;
/// Blur applied before sampling BRIEF pairs.
const DESCRIPTOR_BLUR_SIGMA: f32 = 2.0;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbParams {
    pub max_features: usize,
    /// Ratio between consecutive pyramid levels.
    pub scale_factor: f32,
    pub levels: usize,
    /// FAST threshold, [0, 1] intensity units.
    pub fast_threshold: f32,
    /// Border in which no keypoint is detected.
    pub edge_threshold: usize,
    pub patch_size: usize,
}

impl Default for OrbParams {
    fn default() -> Self {
        Self {
            max_features: 1500,
            scale_factor: 1.2,
            levels: 8,
            fast_threshold: 20.0 / 255.0,
            edge_threshold: 31,
            patch_size: 31,
        }
    }
}

pub struct Orb {
    params: OrbParams,
    pairs: Vec<SamplePair>,
}

impl Orb {
    pub fn new(params: OrbParams) -> Self {
        let pairs = gaussian_pairs(BINARY_DESCRIPTOR_BITS, params.patch_size, PAIR_SEED);
        Self { params, pairs }
    }

    /// Geometric split of `max_features` across levels, finer levels first.
    fn level_quotas(&self, levels: usize) -> Vec<usize> {
        let total = self.params.max_features;
        if levels == 0 {
            return Vec::new();
        }
        let factor = 1.0 / self.params.scale_factor.max(1.0 + f32::EPSILON);
        let mut per_level = total as f32 * (1.0 - factor) / (1.0 - factor.powi(levels as i32));
        let mut quotas = Vec::with_capacity(levels);
        let mut assigned = 0;
        for _ in 0..levels.saturating_sub(1) {
            let q = per_level.round() as usize;
            quotas.push(q);
            assigned += q;
            per_level *= factor;
        }
        quotas.push(total.saturating_sub(assigned));
        quotas
    }

    fn detect_level(
        &self,
        level_index: usize,
        level: &PyramidLevel,
        quota: usize,
    ) -> Vec<(Keypoint, BinaryDescriptor)> {
        if quota == 0 {
            return Vec::new();
        }
        let img = &level.data;
        let half_patch = self.params.patch_size / 2;
        let border = self
            .params
            .edge_threshold
            .max(half_patch + 1)
            .max(HARRIS_BLOCK / 2 + 2);

        let mut corners = fast::detect(img, self.params.fast_threshold, border);
        if corners.is_empty() {
            return Vec::new();
        }

        // FAST score prefilter, then Harris ranking
        corners.sort_by(|a, b| b.score.total_cmp(&a.score));
        corners.truncate(quota * 2);
        let mut ranked: Vec<(fast::FastCorner, f32)> = corners
            .into_iter()
            .map(|c| {
                let r = fast::harris_response(img, c.row, c.col, HARRIS_BLOCK, HARRIS_K);
                (c, r)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(quota);

        let blurred = gaussian_blur_array(img, DESCRIPTOR_BLUR_SIGMA);
        ranked
            .into_iter()
            .map(|(c, response)| {
                let angle = intensity_centroid_angle(img, c.row, c.col, half_patch);
                let descriptor = self.describe(&blurred, c.row, c.col, angle);
                let keypoint = Keypoint {
                    x: c.col as f32 * level.scale,
                    y: c.row as f32 * level.scale,
                    size: self.params.patch_size as f32 * level.scale,
                    angle,
                    response,
                    octave: level_index,
                };
                (keypoint, descriptor)
            })
            .collect()
    }

    fn describe(&self, img: &Array2<f32>, row: usize, col: usize, angle: f32) -> BinaryDescriptor {
        let (h, w) = img.dim();
        let (sin_a, cos_a) = angle.sin_cos();
        let sample = |x: f32, y: f32| -> f32 {
            let rx = x * cos_a - y * sin_a;
            let ry = x * sin_a + y * cos_a;
            let r = (row as f32 + ry).round().clamp(0.0, (h - 1) as f32) as usize;
            let c = (col as f32 + rx).round().clamp(0.0, (w - 1) as f32) as usize;
            img[[r, c]]
        };

        let mut desc: BinaryDescriptor = [0; BINARY_DESCRIPTOR_BYTES];
        for (bit, p) in self.pairs.iter().enumerate() {
            if sample(p[0], p[1]) < sample(p[2], p[3]) {
                set_bit(&mut desc, bit);
            }
        }
        desc
    }
}

/// Orientation of the vector from the patch center to its intensity centroid.
fn intensity_centroid_angle(img: &Array2<f32>, row: usize, col: usize, radius: usize) -> f32 {
    let (h, w) = img.dim();
    let r = radius as isize;
    let mut m01 = 0.0f32;
    let mut m10 = 0.0f32;
    for dy in -r..=r {
        let y = row as isize + dy;
        if y < 0 || y >= h as isize {
            continue;
        }
        for dx in -r..=r {
            if dx * dx + dy * dy > r * r {
                continue;
            }
            let x = col as isize + dx;
            if x < 0 || x >= w as isize {
                continue;
            }
            let v = img[[y as usize, x as usize]];
            m10 += dx as f32 * v;
            m01 += dy as f32 * v;
        }
    }
    m01.atan2(m10)
}

impl FeatureAlgorithm for Orb {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Orb
    }

    fn detect_and_describe(&self, image: &Array2<f32>) -> FeatureSet {
        let min_size = 2 * self.params.edge_threshold + 1;
        let pyramid = build_scaled_pyramid(
            image,
            self.params.levels.max(1),
            self.params.scale_factor,
            min_size,
        );
        let quotas = self.level_quotas(pyramid.len());

        let mut items: Vec<(Keypoint, BinaryDescriptor)> = pyramid
            .par_iter()
            .zip(quotas.par_iter())
            .enumerate()
            .flat_map_iter(|(i, (level, &quota))| self.detect_level(i, level, quota))
            .collect();
        retain_strongest(&mut items, self.params.max_features);

        debug!(levels = pyramid.len(), keypoints = items.len(), "ORB detection");

        let (keypoints, descriptors): (Vec<_>, Vec<_>) = items.into_iter().unzip();
        FeatureSet {
            detector: DetectorKind::Orb,
            keypoints,
            descriptors: Descriptors::Binary(descriptors),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotas_sum_to_max_features() {
        let orb = Orb::new(OrbParams::default());
        let quotas = orb.level_quotas(8);
        assert_eq!(quotas.iter().sum::<usize>(), 1500);
        assert!(quotas[0] > quotas[7]);
    }

    #[test]
    fn centroid_points_towards_bright_side() {
        let mut img = Array2::<f32>::zeros((41, 41));
        for r in 0..41 {
            for c in 21..41 {
                img[[r, c]] = 1.0;
            }
        }
        let angle = intensity_centroid_angle(&img, 20, 20, 15);
        assert!(angle.abs() < 0.05, "angle={angle}");
    }
}
