//! Gradient-histogram features (SIFT).
//!
//! Difference-of-Gaussians extrema over a Gaussian scale space, refined to
//! sub-pixel/sub-scale accuracy, filtered for contrast and edge response,
//! assigned one or more dominant orientations, and described by a 4x4 grid
//! of 8-bin gradient orientation histograms (128 floats, unit length).

use std::f32::consts::TAU;

use nalgebra::{Matrix3, Vector3};
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::filters::gaussian_blur::gaussian_blur_array;

use super::pyramid::downsample_2x;
use super::{retain_strongest, DetectorKind, Descriptors, FeatureAlgorithm, FeatureSet, Keypoint};

/// Length of a SIFT descriptor.
pub const SIFT_DESCRIPTOR_LEN: usize = DESCR_WIDTH * DESCR_WIDTH * DESCR_HIST_BINS;

/// Width of the descriptor histogram grid.
const DESCR_WIDTH: usize = 4;
/// Orientation bins per descriptor histogram.
const DESCR_HIST_BINS: usize = 8;
/// Descriptor histogram cell width in units of keypoint scale.
const DESCR_SCL_FCTR: f32 = 3.0;
/// Clamp for normalized descriptor elements.
const DESCR_MAG_THR: f32 = 0.2;

const ORI_HIST_BINS: usize = 36;
const ORI_SIG_FCTR: f32 = 1.5;
const ORI_RADIUS: f32 = 3.0 * ORI_SIG_FCTR;
const ORI_PEAK_RATIO: f32 = 0.8;

/// Assumed blur of the input image.
const INIT_SIGMA: f32 = 0.5;
/// Extrema closer than this to the octave border are ignored.
const IMG_BORDER: usize = 5;
const MAX_INTERP_STEPS: usize = 5;
/// Smallest octave side length worth searching.
const MIN_OCTAVE_SIZE: usize = 24;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SiftParams {
    /// Strongest keypoints kept (0 = unlimited).
    pub max_features: usize,
    /// Scales sampled per octave.
    pub octave_layers: usize,
    /// DoG contrast threshold, [0, 1] intensity units.
    pub contrast_threshold: f32,
    /// Principal curvature ratio above which an extremum is an edge.
    pub edge_threshold: f32,
    /// Blur of the first octave layer.
    pub sigma: f32,
}

impl Default for SiftParams {
    fn default() -> Self {
        Self {
            max_features: 1000,
            octave_layers: 3,
            contrast_threshold: 0.04,
            edge_threshold: 10.0,
            sigma: 1.6,
        }
    }
}

pub struct Sift {
    params: SiftParams,
}

struct Octave {
    gaussians: Vec<Array2<f32>>,
    dogs: Vec<Array2<f32>>,
}

/// A refined extremum, in octave coordinates.
#[derive(Clone, Copy)]
struct Extremum {
    octave: usize,
    layer: usize,
    x: f32,
    y: f32,
    /// Scale relative to the octave base.
    scale: f32,
    contrast: f32,
}

/// An oriented keypoint plus what its descriptor needs.
struct Located {
    keypoint: Keypoint,
    extremum: Extremum,
}

impl Sift {
    pub fn new(params: SiftParams) -> Self {
        Self { params }
    }

    fn build_scale_space(&self, image: &Array2<f32>) -> Vec<Octave> {
        let s = self.params.octave_layers.max(1);
        let sigma = self.params.sigma;

        let base_blur = (sigma * sigma - INIT_SIGMA * INIT_SIGMA).max(0.01).sqrt();
        let base = gaussian_blur_array(image, base_blur);

        // Incremental blur between consecutive layers
        let k = 2f32.powf(1.0 / s as f32);
        let mut layer_sigmas = vec![sigma; s + 3];
        for (i, sig) in layer_sigmas.iter_mut().enumerate().skip(1) {
            let prev = k.powi(i as i32 - 1) * sigma;
            let total = prev * k;
            *sig = (total * total - prev * prev).sqrt();
        }

        let mut octaves: Vec<Octave> = Vec::new();
        let mut first = base;
        loop {
            let (h, w) = first.dim();
            if h.min(w) < MIN_OCTAVE_SIZE {
                break;
            }

            let mut gaussians = Vec::with_capacity(s + 3);
            gaussians.push(first);
            for sig in layer_sigmas.iter().skip(1) {
                let next = gaussian_blur_array(&gaussians[gaussians.len() - 1], *sig);
                gaussians.push(next);
            }

            let dogs: Vec<Array2<f32>> = gaussians
                .windows(2)
                .map(|pair| &pair[1] - &pair[0])
                .collect();

            first = downsample_2x(&gaussians[s]);
            octaves.push(Octave { gaussians, dogs });
        }

        octaves
    }

    fn find_extrema(&self, octaves: &[Octave]) -> Vec<Extremum> {
        let s = self.params.octave_layers.max(1);
        let threshold = 0.5 * self.params.contrast_threshold / s as f32;

        let mut tasks = Vec::new();
        for octave in 0..octaves.len() {
            for layer in 1..=s {
                tasks.push((octave, layer));
            }
        }

        tasks
            .par_iter()
            .flat_map_iter(|&(o, layer)| {
                let dogs = &octaves[o].dogs;
                let (h, w) = dogs[layer].dim();
                let mut found = Vec::new();
                if h <= 2 * IMG_BORDER || w <= 2 * IMG_BORDER {
                    return found;
                }
                for r in IMG_BORDER..h - IMG_BORDER {
                    for c in IMG_BORDER..w - IMG_BORDER {
                        let v = dogs[layer][[r, c]];
                        if v.abs() <= threshold || !is_extremum(dogs, layer, r, c, v) {
                            continue;
                        }
                        if let Some(e) = self.refine_extremum(dogs, o, layer, r, c) {
                            found.push(e);
                        }
                    }
                }
                found
            })
            .collect()
    }

    /// Quadratic fit in (x, y, scale), moving the sample point until the
    /// offset is below half a pixel, then contrast and edge tests.
    fn refine_extremum(
        &self,
        dogs: &[Array2<f32>],
        octave: usize,
        layer: usize,
        row: usize,
        col: usize,
    ) -> Option<Extremum> {
        let s = self.params.octave_layers.max(1);
        let (h, w) = dogs[layer].dim();
        let (mut l, mut r, mut c) = (layer, row, col);
        let mut offset = Vector3::zeros();

        let mut converged = false;
        for _ in 0..MAX_INTERP_STEPS {
            let (grad, hess) = derivatives(dogs, l, r, c);
            let step = hess.lu().solve(&grad)?;
            offset = -step;

            if offset.iter().all(|v| v.abs() < 0.5) {
                converged = true;
                break;
            }
            if offset.iter().any(|v| !v.is_finite() || v.abs() > (h.max(w)) as f32) {
                return None;
            }

            let nc = c as isize + offset[0].round() as isize;
            let nr = r as isize + offset[1].round() as isize;
            let nl = l as isize + offset[2].round() as isize;
            if nl < 1
                || nl > s as isize
                || nc < IMG_BORDER as isize
                || nc >= (w - IMG_BORDER) as isize
                || nr < IMG_BORDER as isize
                || nr >= (h - IMG_BORDER) as isize
            {
                return None;
            }
            (l, r, c) = (nl as usize, nr as usize, nc as usize);
        }
        if !converged {
            return None;
        }

        let (grad, hess) = derivatives(dogs, l, r, c);
        let contrast = dogs[l][[r, c]] + 0.5 * grad.dot(&offset);
        if contrast.abs() * (s as f32) < self.params.contrast_threshold {
            return None;
        }

        // Principal curvature ratio from the 2x2 spatial Hessian
        let (dxx, dyy, dxy) = (hess[(0, 0)], hess[(1, 1)], hess[(0, 1)]);
        let tr = dxx + dyy;
        let det = dxx * dyy - dxy * dxy;
        let edge = self.params.edge_threshold;
        if det <= 0.0 || tr * tr * edge >= (edge + 1.0) * (edge + 1.0) * det {
            return None;
        }

        Some(Extremum {
            octave,
            layer: l,
            x: c as f32 + offset[0],
            y: r as f32 + offset[1],
            scale: self.params.sigma * 2f32.powf((l as f32 + offset[2]) / s as f32),
            contrast,
        })
    }

    /// One keypoint per orientation histogram peak.
    fn orient(&self, octaves: &[Octave], e: &Extremum) -> Vec<Located> {
        let img = &octaves[e.octave].gaussians[e.layer];
        let hist = orientation_histogram(
            img,
            e.y.round() as isize,
            e.x.round() as isize,
            (ORI_RADIUS * e.scale).round() as isize,
            ORI_SIG_FCTR * e.scale,
        );
        let max = hist.iter().cloned().fold(0.0f32, f32::max);
        if max <= 0.0 {
            return Vec::new();
        }

        let factor = (1usize << e.octave) as f32;
        let n = ORI_HIST_BINS;
        let mut out = Vec::new();
        for i in 0..n {
            let left = hist[(i + n - 1) % n];
            let right = hist[(i + 1) % n];
            let v = hist[i];
            if v > left && v > right && v >= ORI_PEAK_RATIO * max {
                let denom = left - 2.0 * v + right;
                let offset = if denom.abs() > f32::EPSILON {
                    0.5 * (left - right) / denom
                } else {
                    0.0
                };
                let bin = (i as f32 + offset).rem_euclid(n as f32);
                out.push(Located {
                    keypoint: Keypoint {
                        x: e.x * factor,
                        y: e.y * factor,
                        size: e.scale * factor * 2.0,
                        angle: TAU * bin / n as f32,
                        response: e.contrast.abs(),
                        octave: e.octave,
                    },
                    extremum: *e,
                });
            }
        }
        out
    }

    fn describe(&self, octaves: &[Octave], located: &Located) -> [f32; SIFT_DESCRIPTOR_LEN] {
        let e = &located.extremum;
        describe_at(
            &octaves[e.octave].gaussians[e.layer],
            e.x,
            e.y,
            located.keypoint.angle,
            e.scale,
        )
    }
}

impl FeatureAlgorithm for Sift {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Sift
    }

    fn detect_and_describe(&self, image: &Array2<f32>) -> FeatureSet {
        let octaves = self.build_scale_space(image);
        if octaves.is_empty() {
            return FeatureSet::empty(DetectorKind::Sift);
        }

        let extrema = self.find_extrema(&octaves);
        let located: Vec<Located> = extrema
            .par_iter()
            .flat_map_iter(|e| self.orient(&octaves, e))
            .collect();

        let mut items: Vec<(Keypoint, Located)> =
            located.into_iter().map(|l| (l.keypoint, l)).collect();
        retain_strongest(&mut items, self.params.max_features);

        let descriptors: Vec<[f32; SIFT_DESCRIPTOR_LEN]> = items
            .par_iter()
            .map(|(_, l)| self.describe(&octaves, l))
            .collect();

        let keypoints: Vec<Keypoint> = items.into_iter().map(|(k, _)| k).collect();
        let flat: Vec<f32> = descriptors.iter().flat_map(|d| d.iter().copied()).collect();
        let Ok(matrix) = Array2::from_shape_vec((keypoints.len(), SIFT_DESCRIPTOR_LEN), flat) else {
            return FeatureSet::empty(DetectorKind::Sift);
        };

        debug!(
            octaves = octaves.len(),
            extrema = extrema.len(),
            keypoints = keypoints.len(),
            "SIFT detection"
        );

        FeatureSet {
            detector: DetectorKind::Sift,
            keypoints,
            descriptors: Descriptors::Float(matrix),
        }
    }
}

/// Strict 3x3x3 extremum test (ties with neighbors are allowed).
fn is_extremum(dogs: &[Array2<f32>], layer: usize, r: usize, c: usize, v: f32) -> bool {
    let positive = v > 0.0;
    for dog in &dogs[layer - 1..=layer + 1] {
        for nr in r - 1..=r + 1 {
            for nc in c - 1..=c + 1 {
                let n = dog[[nr, nc]];
                if (positive && n > v) || (!positive && n < v) {
                    return false;
                }
            }
        }
    }
    true
}

/// Gradient and Hessian of the DoG stack at (layer, r, c), ordered (x, y, s).
fn derivatives(
    dogs: &[Array2<f32>],
    l: usize,
    r: usize,
    c: usize,
) -> (Vector3<f32>, Matrix3<f32>) {
    let cur = &dogs[l];
    let prev = &dogs[l - 1];
    let next = &dogs[l + 1];

    let grad = Vector3::new(
        (cur[[r, c + 1]] - cur[[r, c - 1]]) * 0.5,
        (cur[[r + 1, c]] - cur[[r - 1, c]]) * 0.5,
        (next[[r, c]] - prev[[r, c]]) * 0.5,
    );

    let v2 = cur[[r, c]] * 2.0;
    let dxx = cur[[r, c + 1]] + cur[[r, c - 1]] - v2;
    let dyy = cur[[r + 1, c]] + cur[[r - 1, c]] - v2;
    let dss = next[[r, c]] + prev[[r, c]] - v2;
    let dxy = (cur[[r + 1, c + 1]] - cur[[r + 1, c - 1]] - cur[[r - 1, c + 1]]
        + cur[[r - 1, c - 1]])
        * 0.25;
    let dxs = (next[[r, c + 1]] - next[[r, c - 1]] - prev[[r, c + 1]] + prev[[r, c - 1]]) * 0.25;
    let dys = (next[[r + 1, c]] - next[[r - 1, c]] - prev[[r + 1, c]] + prev[[r - 1, c]]) * 0.25;

    let hess = Matrix3::new(dxx, dxy, dxs, dxy, dyy, dys, dxs, dys, dss);
    (grad, hess)
}

/// Smoothed, Gaussian-weighted histogram of gradient orientations.
fn orientation_histogram(
    img: &Array2<f32>,
    row: isize,
    col: isize,
    radius: isize,
    sigma: f32,
) -> [f32; ORI_HIST_BINS] {
    let (h, w) = img.dim();
    let n = ORI_HIST_BINS;
    let mut raw = [0.0f32; ORI_HIST_BINS];
    let expf_scale = -1.0 / (2.0 * sigma * sigma);

    for i in -radius..=radius {
        let y = row + i;
        if y <= 0 || y >= h as isize - 1 {
            continue;
        }
        for j in -radius..=radius {
            let x = col + j;
            if x <= 0 || x >= w as isize - 1 {
                continue;
            }
            let (y, x) = (y as usize, x as usize);
            let dx = img[[y, x + 1]] - img[[y, x - 1]];
            let dy = img[[y + 1, x]] - img[[y - 1, x]];
            let weight = (((i * i + j * j) as f32) * expf_scale).exp();
            let mag = (dx * dx + dy * dy).sqrt();
            let ori = dy.atan2(dx).rem_euclid(TAU);
            let bin = ((n as f32 * ori / TAU).round() as usize) % n;
            raw[bin] += weight * mag;
        }
    }

    let mut hist = [0.0f32; ORI_HIST_BINS];
    for i in 0..n {
        hist[i] = (raw[(i + n - 2) % n] + raw[(i + 2) % n]) * (1.0 / 16.0)
            + (raw[(i + n - 1) % n] + raw[(i + 1) % n]) * (4.0 / 16.0)
            + raw[i] * (6.0 / 16.0);
    }
    hist
}

/// 4x4x8 descriptor of the patch around (x, y) in octave coordinates.
fn describe_at(
    img: &Array2<f32>,
    x: f32,
    y: f32,
    angle: f32,
    scale: f32,
) -> [f32; SIFT_DESCRIPTOR_LEN] {
    let (h, w) = img.dim();
    let d = DESCR_WIDTH;
    let n = DESCR_HIST_BINS;
    let bins_per_rad = n as f32 / TAU;
    let exp_scale = -1.0 / (d as f32 * d as f32 * 0.5);
    let hist_width = DESCR_SCL_FCTR * scale;
    let radius = ((hist_width * std::f32::consts::SQRT_2 * (d as f32 + 1.0) * 0.5).round())
        .min(((h * h + w * w) as f32).sqrt()) as isize;
    let (sin_a, cos_a) = angle.sin_cos();
    let cos_t = cos_a / hist_width;
    let sin_t = sin_a / hist_width;

    let cy = y.round() as isize;
    let cx = x.round() as isize;

    let stride_o = n + 2;
    let stride_c = (d + 2) * stride_o;
    let mut hist = vec![0.0f32; (d + 2) * stride_c];

    for i in -radius..=radius {
        for j in -radius..=radius {
            // Offset expressed in the keypoint's rotated frame, in cell units
            let c_rot = j as f32 * cos_t + i as f32 * sin_t;
            let r_rot = -(j as f32) * sin_t + i as f32 * cos_t;
            let rbin = r_rot + d as f32 / 2.0 - 0.5;
            let cbin = c_rot + d as f32 / 2.0 - 0.5;
            let r = cy + i;
            let c = cx + j;

            if rbin <= -1.0
                || rbin >= d as f32
                || cbin <= -1.0
                || cbin >= d as f32
                || r <= 0
                || r >= h as isize - 1
                || c <= 0
                || c >= w as isize - 1
            {
                continue;
            }
            let (r, c) = (r as usize, c as usize);
            let dx = img[[r, c + 1]] - img[[r, c - 1]];
            let dy = img[[r + 1, c]] - img[[r - 1, c]];
            let ori = (dy.atan2(dx) - angle).rem_euclid(TAU);
            let falloff = ((c_rot * c_rot + r_rot * r_rot) * exp_scale).exp();
            let mag = (dx * dx + dy * dy).sqrt() * falloff;

            let obin = ori * bins_per_rad;
            let r0 = rbin.floor();
            let c0 = cbin.floor();
            let o0 = obin.floor();
            let (fr, fc, fo) = (rbin - r0, cbin - c0, obin - o0);
            let r0 = (r0 as isize + 1) as usize;
            let c0 = (c0 as isize + 1) as usize;
            let o0 = (o0 as usize) % n;

            // Trilinear distribution over the 8 neighboring bins
            for (dr, wr) in [(0, 1.0 - fr), (1, fr)] {
                for (dc, wc) in [(0, 1.0 - fc), (1, fc)] {
                    for (dor, wo) in [(0, 1.0 - fo), (1, fo)] {
                        let idx = (r0 + dr) * stride_c + (c0 + dc) * stride_o + o0 + dor;
                        hist[idx] += mag * wr * wc * wo;
                    }
                }
            }
        }
    }

    let mut out = [0.0f32; SIFT_DESCRIPTOR_LEN];
    for i in 0..d {
        for j in 0..d {
            let base = (i + 1) * stride_c + (j + 1) * stride_o;
            // Orientation bin n wraps around to bin 0
            hist[base] += hist[base + n];
            hist[base + 1] += hist[base + n + 1];
            for k in 0..n {
                out[(i * d + j) * n + k] = hist[base + k];
            }
        }
    }

    let norm = out.iter().map(|v| v * v).sum::<f32>().sqrt();
    let thr = norm * DESCR_MAG_THR;
    for v in out.iter_mut() {
        *v = v.min(thr);
    }
    let norm = out.iter().map(|v| v * v).sum::<f32>().sqrt().max(f32::EPSILON);
    for v in out.iter_mut() {
        *v /= norm;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_image_yields_no_keypoints() {
        let img = Array2::<f32>::from_elem((96, 96), 0.4);
        let set = Sift::new(SiftParams::default()).detect_and_describe(&img);
        assert!(set.is_empty());
        assert_eq!(set.descriptors.len(), 0);
    }

    #[test]
    fn bright_blob_is_detected_with_unit_descriptor() {
        let mut img = Array2::<f32>::from_elem((96, 96), 0.2);
        for r in 0..96 {
            for c in 0..96 {
                let d2 = ((r as f32 - 48.0).powi(2) + (c as f32 - 40.0).powi(2)) / (2.0 * 16.0);
                img[[r, c]] += 0.7 * (-d2).exp();
            }
        }
        let set = Sift::new(SiftParams::default()).detect_and_describe(&img);
        assert!(!set.is_empty(), "blob not detected");
        let near = set
            .keypoints
            .iter()
            .any(|k| (k.x - 40.0).abs() < 3.0 && (k.y - 48.0).abs() < 3.0);
        assert!(near, "keypoints: {:?}", set.keypoints);
        if let Descriptors::Float(d) = &set.descriptors {
            let norm: f32 = d.row(0).iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-3, "norm={norm}");
        } else {
            panic!("SIFT must produce float descriptors");
        }
    }
}
