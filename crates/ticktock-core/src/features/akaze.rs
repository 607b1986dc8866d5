//! Nonlinear scale-space features (AKAZE-like).
//!
//! The scale space is built by Perona-Malik diffusion instead of Gaussian
//! blurring, which keeps edges sharp across scales. Keypoints are maxima of
//! the scale-normalized Hessian determinant; descriptors compare mean
//! intensity and gradients of grid cells around the rotated keypoint.

use std::f32::consts::{FRAC_PI_3, TAU};

use ndarray::{Array2, Zip};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::filters::gaussian_blur::gaussian_blur_array;
use crate::warp::bilinear_sample_clamped;

use super::binary::{set_bit, BinaryDescriptor, BINARY_DESCRIPTOR_BITS, BINARY_DESCRIPTOR_BYTES};
use super::pyramid::downsample_2x;
use super::{retain_strongest, DetectorKind, Descriptors, FeatureAlgorithm, FeatureSet, Keypoint};

/// Blur of the first evolution level.
const BASE_SIGMA: f32 = 1.6;
/// Largest stable explicit diffusion step.
const MAX_TIME_STEP: f32 = 0.25;
const CONTRAST_HISTOGRAM_BINS: usize = 300;
/// Samples per side of the descriptor patch.
const PATCH_SAMPLES: usize = 12;
/// Descriptor patch half-width in units of the level scale.
const PATCH_RADIUS_SCALE: f32 = 6.0;
/// Cell grids compared by the descriptor.
const GRID_DIVISIONS: [usize; 3] = [2, 3, 4];
const ORIENTATION_WINDOWS: usize = 42;
const MIN_LEVEL_SIZE: usize = 16;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AkazeParams {
    pub max_features: usize,
    /// Detector response threshold.
    pub threshold: f32,
    pub octaves: usize,
    pub sublevels: usize,
    /// Percentile of the gradient histogram used as diffusion contrast.
    pub contrast_percentile: f32,
}

impl Default for AkazeParams {
    fn default() -> Self {
        Self {
            max_features: 2000,
            threshold: 0.001,
            octaves: 4,
            sublevels: 4,
            contrast_percentile: 0.7,
        }
    }
}

pub struct Akaze {
    params: AkazeParams,
}

/// One level of the nonlinear scale space.
struct Evolution {
    image: Array2<f32>,
    lx: Array2<f32>,
    ly: Array2<f32>,
    response: Array2<f32>,
    octave: usize,
    /// Scale in octave-local pixels.
    sigma: f32,
}

#[derive(Clone, Copy)]
struct Candidate {
    level: usize,
    row: usize,
    col: usize,
    response: f32,
}

impl Akaze {
    pub fn new(params: AkazeParams) -> Self {
        Self { params }
    }

    fn build_evolution(&self, image: &Array2<f32>) -> Vec<Evolution> {
        let sublevels = self.params.sublevels.max(1);
        let base = gaussian_blur_array(image, BASE_SIGMA);
        let k = contrast_factor(&base, self.params.contrast_percentile);

        let mut levels: Vec<Evolution> = Vec::new();
        let mut current = base;
        let mut prev_time = 0.5 * BASE_SIGMA * BASE_SIGMA;

        for octave in 0..self.params.octaves.max(1) {
            if octave > 0 {
                let (h, w) = current.dim();
                if h / 2 < MIN_LEVEL_SIZE || w / 2 < MIN_LEVEL_SIZE {
                    break;
                }
                current = downsample_2x(&gaussian_blur_array(&current, 1.0));
            }
            let octave_scale = (1usize << octave) as f32;

            for sub in 0..sublevels {
                let sigma = BASE_SIGMA * 2f32.powf(octave as f32 + sub as f32 / sublevels as f32);
                let time = 0.5 * sigma * sigma;
                if !(octave == 0 && sub == 0) {
                    // Diffusion time in octave-local pixel units
                    let dt = (time - prev_time).max(0.0) / (octave_scale * octave_scale);
                    current = diffuse(&current, k, dt);
                }
                prev_time = time;

                let local_sigma = sigma / octave_scale;
                let (lx, ly) = gradients(&current);
                let response = hessian_response(&current, local_sigma);
                levels.push(Evolution {
                    image: current.clone(),
                    lx,
                    ly,
                    response,
                    octave,
                    sigma: local_sigma,
                });
            }
        }
        levels
    }

    fn find_candidates(&self, levels: &[Evolution]) -> Vec<Candidate> {
        let threshold = self.params.threshold;
        (0..levels.len())
            .into_par_iter()
            .flat_map_iter(|li| {
                let level = &levels[li];
                let resp = &level.response;
                let (h, w) = resp.dim();
                let border = (PATCH_RADIUS_SCALE * level.sigma).ceil() as usize + 1;
                let mut found = Vec::new();
                if h <= 2 * border || w <= 2 * border {
                    return found;
                }
                let below = li
                    .checked_sub(1)
                    .map(|i| &levels[i])
                    .filter(|l| l.octave == level.octave);
                let above = levels.get(li + 1).filter(|l| l.octave == level.octave);

                for r in border..h - border {
                    for c in border..w - border {
                        let v = resp[[r, c]];
                        if v <= threshold || !is_local_max(resp, r, c, v) {
                            continue;
                        }
                        let beats = |other: Option<&Evolution>| match other {
                            None => true,
                            Some(o) => o.response[[r, c]] < v,
                        };
                        if beats(below) && beats(above) {
                            found.push(Candidate {
                                level: li,
                                row: r,
                                col: c,
                                response: v,
                            });
                        }
                    }
                }
                found
            })
            .collect()
    }

    fn describe(&self, level: &Evolution, row: usize, col: usize, angle: f32) -> BinaryDescriptor {
        let radius = PATCH_RADIUS_SCALE * level.sigma;
        let step = 2.0 * radius / PATCH_SAMPLES as f32;
        let (sin_a, cos_a) = angle.sin_cos();

        // (intensity, rotated dx, rotated dy) on a rotated sample grid
        let mut samples = [[0.0f32; 3]; PATCH_SAMPLES * PATCH_SAMPLES];
        for i in 0..PATCH_SAMPLES {
            for j in 0..PATCH_SAMPLES {
                let u = (j as f32 + 0.5) * step - radius;
                let v = (i as f32 + 0.5) * step - radius;
                let x = col as f32 + u * cos_a - v * sin_a;
                let y = row as f32 + u * sin_a + v * cos_a;
                let (yf, xf) = (y as f64, x as f64);
                let intensity = bilinear_sample_clamped(&level.image, yf, xf);
                let gx = bilinear_sample_clamped(&level.lx, yf, xf);
                let gy = bilinear_sample_clamped(&level.ly, yf, xf);
                samples[i * PATCH_SAMPLES + j] = [
                    intensity,
                    gx * cos_a + gy * sin_a,
                    -gx * sin_a + gy * cos_a,
                ];
            }
        }

        let mut desc: BinaryDescriptor = [0; BINARY_DESCRIPTOR_BYTES];
        let mut bit = 0;
        'grids: for &div in GRID_DIVISIONS.iter() {
            let cells = cell_means(&samples, div);
            for a in 0..cells.len() {
                for b in (a + 1)..cells.len() {
                    for ch in 0..3 {
                        if bit == BINARY_DESCRIPTOR_BITS {
                            break 'grids;
                        }
                        if cells[a][ch] > cells[b][ch] {
                            set_bit(&mut desc, bit);
                        }
                        bit += 1;
                    }
                }
            }
        }
        desc
    }
}

impl FeatureAlgorithm for Akaze {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Akaze
    }

    fn detect_and_describe(&self, image: &Array2<f32>) -> FeatureSet {
        let (h, w) = image.dim();
        if h < MIN_LEVEL_SIZE || w < MIN_LEVEL_SIZE {
            return FeatureSet::empty(DetectorKind::Akaze);
        }

        let levels = self.build_evolution(image);
        let mut candidates = self.find_candidates(&levels);
        candidates.sort_by(|a, b| b.response.total_cmp(&a.response));
        let limit = if self.params.max_features == 0 {
            candidates.len()
        } else {
            self.params.max_features
        };
        candidates.truncate(limit);

        let mut items: Vec<(Keypoint, BinaryDescriptor)> = candidates
            .par_iter()
            .map(|c| {
                let level = &levels[c.level];
                let angle = dominant_orientation(level, c.row, c.col);
                let descriptor = self.describe(level, c.row, c.col, angle);
                let factor = (1usize << level.octave) as f32;
                let keypoint = Keypoint {
                    x: c.col as f32 * factor,
                    y: c.row as f32 * factor,
                    size: 2.0 * level.sigma * factor,
                    angle,
                    response: c.response,
                    octave: level.octave,
                };
                (keypoint, descriptor)
            })
            .collect();
        retain_strongest(&mut items, self.params.max_features);

        debug!(levels = levels.len(), keypoints = items.len(), "AKAZE detection");

        let (keypoints, descriptors): (Vec<_>, Vec<_>) = items.into_iter().unzip();
        FeatureSet {
            detector: DetectorKind::Akaze,
            keypoints,
            descriptors: Descriptors::Binary(descriptors),
        }
    }
}

/// Gradient magnitude at the given percentile of a histogram over the
/// non-zero gradients of a smoothed image.
fn contrast_factor(image: &Array2<f32>, percentile: f32) -> f32 {
    let smoothed = gaussian_blur_array(image, 1.0);
    let (lx, ly) = gradients(&smoothed);
    let (h, w) = image.dim();

    let mut magnitudes = Vec::with_capacity(h * w);
    for r in 1..h.saturating_sub(1) {
        for c in 1..w.saturating_sub(1) {
            let m = (lx[[r, c]].powi(2) + ly[[r, c]].powi(2)).sqrt();
            if m > 0.0 {
                magnitudes.push(m);
            }
        }
    }
    let max = magnitudes.iter().cloned().fold(0.0f32, f32::max);
    if max <= 0.0 {
        return 0.03;
    }

    let mut hist = [0usize; CONTRAST_HISTOGRAM_BINS];
    for m in &magnitudes {
        let bin = ((m / max) * CONTRAST_HISTOGRAM_BINS as f32) as usize;
        hist[bin.min(CONTRAST_HISTOGRAM_BINS - 1)] += 1;
    }
    let target = (magnitudes.len() as f32 * percentile.clamp(0.0, 1.0)) as usize;
    let mut acc = 0;
    for (i, count) in hist.iter().enumerate() {
        acc += count;
        if acc >= target {
            return (max * (i + 1) as f32 / CONTRAST_HISTOGRAM_BINS as f32).max(f32::EPSILON);
        }
    }
    max
}

/// Explicit Perona-Malik (g2) diffusion for a total time `time`.
fn diffuse(image: &Array2<f32>, k: f32, time: f32) -> Array2<f32> {
    if time <= 0.0 {
        return image.clone();
    }
    let steps = (time / MAX_TIME_STEP).ceil().max(1.0) as usize;
    let dt = time / steps as f32;
    let inv_k2 = 1.0 / (k * k);

    let mut current = image.clone();
    for _ in 0..steps {
        let smoothed = gaussian_blur_array(&current, 1.0);
        let (gx, gy) = gradients(&smoothed);
        let mut conductance = Array2::<f32>::zeros(current.dim());
        Zip::from(&mut conductance)
            .and(&gx)
            .and(&gy)
            .for_each(|g, &x, &y| *g = 1.0 / (1.0 + (x * x + y * y) * inv_k2));

        let (h, w) = current.dim();
        let mut next = current.clone();
        let src = &current;
        let cond = &conductance;
        let update = |(r, c): (usize, usize), out: &mut f32| {
            let v = src[[r, c]];
            let g = cond[[r, c]];
            let mut flux = 0.0;
            for (nr, nc) in [
                (r.saturating_sub(1), c),
                ((r + 1).min(h - 1), c),
                (r, c.saturating_sub(1)),
                (r, (c + 1).min(w - 1)),
            ] {
                flux += 0.5 * (g + cond[[nr, nc]]) * (src[[nr, nc]] - v);
            }
            *out = v + 0.5 * dt * flux;
        };
        if h * w >= PARALLEL_PIXEL_THRESHOLD {
            Zip::indexed(&mut next).par_for_each(update);
        } else {
            Zip::indexed(&mut next).for_each(update);
        }
        current = next;
    }
    current
}

/// Central-difference gradients, clamped borders.
fn gradients(image: &Array2<f32>) -> (Array2<f32>, Array2<f32>) {
    let (h, w) = image.dim();
    let mut lx = Array2::<f32>::zeros((h, w));
    let mut ly = Array2::<f32>::zeros((h, w));
    Zip::indexed(&mut lx).and(&mut ly).for_each(|(r, c), gx, gy| {
        let l = image[[r, c.saturating_sub(1)]];
        let rr = image[[r, (c + 1).min(w - 1)]];
        let u = image[[r.saturating_sub(1), c]];
        let d = image[[(r + 1).min(h - 1), c]];
        *gx = 0.5 * (rr - l);
        *gy = 0.5 * (d - u);
    });
    (lx, ly)
}

/// Scale-normalized determinant of the Hessian, derivative step ~ sigma.
fn hessian_response(image: &Array2<f32>, sigma: f32) -> Array2<f32> {
    let (h, w) = image.dim();
    let s = (sigma.round() as usize).max(1);
    let s2 = (s * s) as f32;
    let norm = sigma.powi(4);
    let mut out = Array2::<f32>::zeros((h, w));
    if h <= 2 * s || w <= 2 * s {
        return out;
    }

    let compute = |(r, c): (usize, usize), o: &mut f32| {
        if r < s || c < s || r + s >= h || c + s >= w {
            return;
        }
        let v2 = 2.0 * image[[r, c]];
        let dxx = (image[[r, c + s]] + image[[r, c - s]] - v2) / s2;
        let dyy = (image[[r + s, c]] + image[[r - s, c]] - v2) / s2;
        let dxy = (image[[r + s, c + s]] - image[[r + s, c - s]] - image[[r - s, c + s]]
            + image[[r - s, c - s]])
            / (4.0 * s2);
        *o = norm * (dxx * dyy - dxy * dxy);
    };
    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        Zip::indexed(&mut out).par_for_each(compute);
    } else {
        Zip::indexed(&mut out).for_each(compute);
    }
    out
}

fn is_local_max(resp: &Array2<f32>, r: usize, c: usize, v: f32) -> bool {
    for nr in r - 1..=r + 1 {
        for nc in c - 1..=c + 1 {
            if (nr, nc) != (r, c) && resp[[nr, nc]] >= v {
                return false;
            }
        }
    }
    true
}

/// Direction of the largest gradient sum inside a sliding pi/3 window.
fn dominant_orientation(level: &Evolution, row: usize, col: usize) -> f32 {
    let (h, w) = level.image.dim();
    let sigma = level.sigma.max(1.0);
    let step = sigma.round().max(1.0) as isize;
    let radius = (PATCH_RADIUS_SCALE * sigma).round() as isize;
    let weight_sigma = 2.5 * sigma;

    let mut samples: Vec<(f32, f32, f32)> = Vec::new();
    let mut dy = -radius;
    while dy <= radius {
        let mut dx = -radius;
        while dx <= radius {
            let r = row as isize + dy;
            let c = col as isize + dx;
            let d2 = (dx * dx + dy * dy) as f32;
            let inside = r >= 0 && c >= 0 && (r as usize) < h && (c as usize) < w;
            if d2 <= (radius * radius) as f32 && inside {
                let wgt = (-d2 / (2.0 * weight_sigma * weight_sigma)).exp();
                let gx = level.lx[[r as usize, c as usize]] * wgt;
                let gy = level.ly[[r as usize, c as usize]] * wgt;
                if gx != 0.0 || gy != 0.0 {
                    samples.push((gy.atan2(gx).rem_euclid(TAU), gx, gy));
                }
            }
            dx += step;
        }
        dy += step;
    }

    let mut best = (0.0f32, 0.0f32, 0.0f32);
    for i in 0..ORIENTATION_WINDOWS {
        let start = TAU * i as f32 / ORIENTATION_WINDOWS as f32;
        let (mut sx, mut sy) = (0.0f32, 0.0f32);
        for &(a, gx, gy) in &samples {
            if (a - start).rem_euclid(TAU) < FRAC_PI_3 {
                sx += gx;
                sy += gy;
            }
        }
        let norm = sx * sx + sy * sy;
        if norm > best.0 {
            best = (norm, sx, sy);
        }
    }
    if best.0 <= 0.0 {
        return 0.0;
    }
    best.2.atan2(best.1)
}

/// Mean of each sample channel over a `div` x `div` cell grid.
fn cell_means(samples: &[[f32; 3]; PATCH_SAMPLES * PATCH_SAMPLES], div: usize) -> Vec<[f32; 3]> {
    let mut cells = vec![[0.0f32; 3]; div * div];
    let mut counts = vec![0usize; div * div];
    for i in 0..PATCH_SAMPLES {
        for j in 0..PATCH_SAMPLES {
            let cell = (i * div / PATCH_SAMPLES) * div + j * div / PATCH_SAMPLES;
            for ch in 0..3 {
                cells[cell][ch] += samples[i * PATCH_SAMPLES + j][ch];
            }
            counts[cell] += 1;
        }
    }
    for (cell, &n) in cells.iter_mut().zip(counts.iter()) {
        for v in cell.iter_mut() {
            *v /= n.max(1) as f32;
        }
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diffusion_preserves_constant_image() {
        let img = Array2::<f32>::from_elem((20, 20), 0.3);
        let out = diffuse(&img, 0.05, 2.0);
        assert!(out.iter().all(|v| (v - 0.3).abs() < 1e-6));
    }

    #[test]
    fn blob_produces_features() {
        let mut img = Array2::<f32>::from_elem((128, 128), 0.1);
        for (cy, cx) in [(40.0f32, 40.0f32), (80.0, 90.0)] {
            for r in 0..128 {
                for c in 0..128 {
                    let d2 = ((r as f32 - cy).powi(2) + (c as f32 - cx).powi(2)) / (2.0 * 25.0);
                    img[[r, c]] += 0.8 * (-d2).exp();
                }
            }
        }
        let set = Akaze::new(AkazeParams::default()).detect_and_describe(&img);
        assert!(!set.is_empty(), "no AKAZE keypoints on blobs");
        assert_eq!(set.keypoints.len(), set.descriptors.len());
    }
}
