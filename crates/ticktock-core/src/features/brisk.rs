//! Binary robust invariant scalable keypoints (BRISK-like).
//!
//! FAST corners over octave and intra-octave layers, kept when they beat
//! the neighboring layers' scores. Descriptors compare smoothed intensities
//! on a concentric-ring sampling pattern; orientation comes from the local
//! gradient estimated over long-distance pattern pairs.

use std::sync::OnceLock;

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::filters::gaussian_blur::gaussian_blur_array;
use crate::filters::resize::scale_array;
use crate::warp::bilinear_sample_clamped;

use super::binary::{set_bit, BinaryDescriptor, BINARY_DESCRIPTOR_BITS, BINARY_DESCRIPTOR_BYTES};
use super::fast::{self, CIRCLE_RADIUS};
use super::{retain_strongest, DetectorKind, Descriptors, FeatureAlgorithm, FeatureSet, Keypoint};

/// Ring radii (pixels at pattern scale 1) and point counts.
const RING_RADII: [f32; 5] = [0.0, 2.9, 4.9, 7.4, 10.8];
const RING_POINTS: [usize; 5] = [1, 10, 14, 15, 20];
const RING_SCALE: f32 = 0.85;
/// Pairs at least this far apart (pattern units) estimate orientation.
const LONG_PAIR_MIN: f32 = 8.2 * RING_SCALE;
/// Diameter of a keypoint at layer scale 1.
const BASIC_SIZE: f32 = 12.0;
const INTRA_OCTAVE_RATIO: f32 = 1.5;
const SMOOTHING_SIGMA: f32 = 1.0;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BriskParams {
    pub max_features: usize,
    /// FAST threshold, [0, 1] intensity units.
    pub threshold: f32,
    pub octaves: usize,
    pub pattern_scale: f32,
}

impl Default for BriskParams {
    fn default() -> Self {
        Self {
            max_features: 2000,
            threshold: 30.0 / 255.0,
            octaves: 3,
            pattern_scale: 1.0,
        }
    }
}

pub struct Brisk {
    params: BriskParams,
}

struct Pattern {
    points: Vec<(f32, f32)>,
    short_pairs: Vec<(usize, usize)>,
    long_pairs: Vec<(usize, usize)>,
}

fn pattern() -> &'static Pattern {
    static PATTERN: OnceLock<Pattern> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let mut points = Vec::new();
        for (&radius, &count) in RING_RADII.iter().zip(RING_POINTS.iter()) {
            for j in 0..count {
                let theta = std::f32::consts::TAU * j as f32 / count as f32;
                let r = radius * RING_SCALE;
                points.push((r * theta.cos(), r * theta.sin()));
            }
        }

        let mut pairs: Vec<(f32, usize, usize)> = Vec::new();
        for i in 0..points.len() {
            for j in (i + 1)..points.len() {
                let d = ((points[j].0 - points[i].0).powi(2) + (points[j].1 - points[i].1).powi(2))
                    .sqrt();
                pairs.push((d, i, j));
            }
        }
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let short_pairs = pairs
            .iter()
            .take(BINARY_DESCRIPTOR_BITS)
            .map(|&(_, i, j)| (i, j))
            .collect();
        let long_pairs = pairs
            .iter()
            .filter(|p| p.0 > LONG_PAIR_MIN)
            .map(|&(_, i, j)| (i, j))
            .collect();

        Pattern {
            points,
            short_pairs,
            long_pairs,
        }
    })
}

/// A detection layer: octaves at 2^i, intra-octaves at 1.5 * 2^i.
struct Layer {
    data: Array2<f32>,
    smoothed: Array2<f32>,
    scale: f32,
}

impl Brisk {
    pub fn new(params: BriskParams) -> Self {
        Self { params }
    }

    fn build_layers(&self, image: &Array2<f32>) -> Vec<Layer> {
        let border = self.border();
        let mut scales = Vec::new();
        for i in 0..self.params.octaves.max(1) {
            let base = (1usize << i) as f32;
            scales.push(base);
            scales.push(base * INTRA_OCTAVE_RATIO);
        }

        let (h, w) = image.dim();
        scales
            .into_par_iter()
            .filter(|&s| {
                (h as f32 / s) as usize > 2 * border && (w as f32 / s) as usize > 2 * border
            })
            .map(|scale| {
                let data = if scale == 1.0 {
                    image.clone()
                } else {
                    scale_array(image, 1.0 / scale as f64)
                };
                let smoothed = gaussian_blur_array(&data, SMOOTHING_SIGMA);
                Layer {
                    data,
                    smoothed,
                    scale,
                }
            })
            .collect()
    }

    fn border(&self) -> usize {
        let outer = RING_RADII[RING_RADII.len() - 1] * RING_SCALE * self.params.pattern_scale;
        (outer.ceil() as usize + 1).max(CIRCLE_RADIUS + 1)
    }

    /// Best FAST score in the 3x3 neighborhood of the position mapped into `layer`.
    fn neighbor_score(layer: &Layer, x: f32, y: f32) -> f32 {
        let (h, w) = layer.data.dim();
        let col = (x / layer.scale).round() as isize;
        let row = (y / layer.scale).round() as isize;
        let lim = CIRCLE_RADIUS as isize;
        let mut best = 0.0f32;
        for r in row - 1..=row + 1 {
            for c in col - 1..=col + 1 {
                if r < lim || c < lim || r >= h as isize - lim || c >= w as isize - lim {
                    continue;
                }
                best = best.max(fast::corner_score(&layer.data, r as usize, c as usize));
            }
        }
        best
    }

    fn sample_pattern(&self, layer: &Layer, row: usize, col: usize, angle: f32) -> Vec<f32> {
        let (sin_a, cos_a) = angle.sin_cos();
        let s = self.params.pattern_scale;
        pattern()
            .points
            .iter()
            .map(|&(px, py)| {
                let x = col as f32 + s * (px * cos_a - py * sin_a);
                let y = row as f32 + s * (px * sin_a + py * cos_a);
                bilinear_sample_clamped(&layer.smoothed, y as f64, x as f64)
            })
            .collect()
    }

    fn orientation(&self, layer: &Layer, row: usize, col: usize) -> f32 {
        let values = self.sample_pattern(layer, row, col, 0.0);
        let pat = pattern();
        let (mut gx, mut gy) = (0.0f32, 0.0f32);
        for &(i, j) in &pat.long_pairs {
            let (dx, dy) = (pat.points[j].0 - pat.points[i].0, pat.points[j].1 - pat.points[i].1);
            let d2 = dx * dx + dy * dy;
            let diff = values[j] - values[i];
            gx += diff * dx / d2;
            gy += diff * dy / d2;
        }
        gy.atan2(gx)
    }

    fn describe(&self, layer: &Layer, row: usize, col: usize, angle: f32) -> BinaryDescriptor {
        let values = self.sample_pattern(layer, row, col, angle);
        let mut desc: BinaryDescriptor = [0; BINARY_DESCRIPTOR_BYTES];
        for (bit, &(i, j)) in pattern().short_pairs.iter().enumerate() {
            if values[i] < values[j] {
                set_bit(&mut desc, bit);
            }
        }
        desc
    }
}

impl FeatureAlgorithm for Brisk {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Brisk
    }

    fn detect_and_describe(&self, image: &Array2<f32>) -> FeatureSet {
        let layers = self.build_layers(image);
        if layers.is_empty() {
            return FeatureSet::empty(DetectorKind::Brisk);
        }
        let border = self.border();

        // Layers are ordered by increasing scale
        let mut order: Vec<usize> = (0..layers.len()).collect();
        order.sort_by(|&a, &b| layers[a].scale.total_cmp(&layers[b].scale));

        let mut items: Vec<(Keypoint, BinaryDescriptor)> = order
            .par_iter()
            .enumerate()
            .flat_map_iter(|(rank, &li)| {
                let layer = &layers[li];
                let below = rank.checked_sub(1).map(|r| &layers[order[r]]);
                let above = order.get(rank + 1).map(|&i| &layers[i]);
                let corners = fast::detect(&layer.data, self.params.threshold, border);

                corners
                    .into_iter()
                    .filter(|c| {
                        let x = c.col as f32 * layer.scale;
                        let y = c.row as f32 * layer.scale;
                        [below, above]
                            .iter()
                            .flatten()
                            .all(|other| Self::neighbor_score(other, x, y) <= c.score)
                    })
                    .map(|c| {
                        let angle = self.orientation(layer, c.row, c.col);
                        let descriptor = self.describe(layer, c.row, c.col, angle);
                        let keypoint = Keypoint {
                            x: c.col as f32 * layer.scale,
                            y: c.row as f32 * layer.scale,
                            size: BASIC_SIZE * layer.scale * self.params.pattern_scale,
                            angle,
                            response: c.score,
                            octave: rank / 2,
                        };
                        (keypoint, descriptor)
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        retain_strongest(&mut items, self.params.max_features);

        debug!(layers = layers.len(), keypoints = items.len(), "BRISK detection");

        let (keypoints, descriptors): (Vec<_>, Vec<_>) = items.into_iter().unzip();
        FeatureSet {
            detector: DetectorKind::Brisk,
            keypoints,
            descriptors: Descriptors::Binary(descriptors),
        }
    }
}
