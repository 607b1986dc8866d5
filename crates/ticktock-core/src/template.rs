//! Translation-only fallback by multi-scale normalized cross-correlation.
//!
//! The central part of the reference is slid over scaled copies of the
//! target. The correlation numerator comes from an FFT cross-correlation,
//! the per-window normalization from integral images.

use ndarray::{s, Array2, ArrayView1};
use num_complex::Complex;
use rayon::prelude::*;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consts::{
    DEFAULT_TEMPLATE_MARGIN, DEFAULT_TEMPLATE_MIN_CORRELATION, DEFAULT_TEMPLATE_SCALES,
    DEFAULT_TEMPLATE_WORKING_SIZE,
};
use crate::error::RegistrationIssue;
use crate::estimate::Homography;
use crate::filters::resize::scale_array;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateParams {
    /// Target scale factors tried.
    pub scales: Vec<f64>,
    /// Correlation a peak must exceed to be accepted.
    pub min_correlation: f64,
    /// Fraction of the reference cut from each side to form the template.
    pub margin: f64,
    /// Longest side of the downscaled images the search runs on.
    pub working_size: usize,
}

impl Default for TemplateParams {
    fn default() -> Self {
        Self {
            scales: DEFAULT_TEMPLATE_SCALES.to_vec(),
            min_correlation: DEFAULT_TEMPLATE_MIN_CORRELATION,
            margin: DEFAULT_TEMPLATE_MARGIN,
            working_size: DEFAULT_TEMPLATE_WORKING_SIZE,
        }
    }
}

/// An accepted translation.
#[derive(Clone, Debug)]
pub struct TemplateMatch {
    pub homography: Homography,
    pub correlation: f64,
    /// Target scale at which the peak was found.
    pub scale: f64,
}

struct Peak {
    scale: f64,
    correlation: f64,
    row: f64,
    col: f64,
}

/// Estimate a pure translation mapping target pixels onto the reference.
///
/// Fails with [`RegistrationIssue::TemplateCorrelationTooWeak`] when no
/// scale yields a peak above `params.min_correlation`.
pub fn estimate_translation(
    reference: &Array2<f32>,
    target: &Array2<f32>,
    params: &TemplateParams,
) -> std::result::Result<TemplateMatch, RegistrationIssue> {
    let weak = |best: f64| RegistrationIssue::TemplateCorrelationTooWeak { best };

    let (rh, rw) = reference.dim();
    let (th, tw) = target.dim();
    let longest = rh.max(rw).max(th).max(tw);
    if longest == 0 || params.working_size == 0 {
        return Err(weak(0.0));
    }
    let down = (params.working_size as f64 / longest as f64).min(1.0);
    let ref_work = if down < 1.0 {
        scale_array(reference, down)
    } else {
        reference.clone()
    };
    let tgt_work = if down < 1.0 {
        scale_array(target, down)
    } else {
        target.clone()
    };

    let (wh, ww) = ref_work.dim();
    let margin = params.margin.clamp(0.0, 0.45);
    let y0 = (wh as f64 * margin) as usize;
    let x0 = (ww as f64 * margin) as usize;
    let tmpl_h = wh.saturating_sub(2 * y0);
    let tmpl_w = ww.saturating_sub(2 * x0);
    if tmpl_h < 3 || tmpl_w < 3 {
        return Err(weak(0.0));
    }
    let template = ref_work.slice(s![y0..y0 + tmpl_h, x0..x0 + tmpl_w]).to_owned();

    let peaks: Vec<Peak> = params
        .scales
        .par_iter()
        .filter_map(|&scale| {
            let scaled = scale_array(&tgt_work, scale);
            let (sh, sw) = scaled.dim();
            if sh < tmpl_h || sw < tmpl_w {
                return None;
            }
            let ncc = normalized_cross_correlation(&scaled, &template)?;
            let (row, col, value) = find_peak(&ncc);
            let (dr, dc) = refine_peak_paraboloid(&ncc, row, col);
            Some(Peak {
                scale,
                correlation: value,
                row: row as f64 + dr,
                col: col as f64 + dc,
            })
        })
        .collect();

    // First scale wins ties
    let mut best: Option<&Peak> = None;
    for peak in &peaks {
        let better = match best {
            None => true,
            Some(b) => peak.correlation > b.correlation,
        };
        if better {
            best = Some(peak);
        }
    }
    let Some(best) = best else {
        return Err(weak(0.0));
    };

    debug!(
        scale = best.scale,
        correlation = best.correlation,
        scales_tried = peaks.len(),
        "Template correlation peak"
    );
    if best.correlation <= params.min_correlation {
        return Err(weak(best.correlation));
    }

    // Template center in reference vs. matched center in the target
    let cx = x0 as f64 + tmpl_w as f64 / 2.0;
    let cy = y0 as f64 + tmpl_h as f64 / 2.0;
    let tx = (cx - (best.col + tmpl_w as f64 / 2.0) / best.scale) / down;
    let ty = (cy - (best.row + tmpl_h as f64 / 2.0) / best.scale) / down;

    Ok(TemplateMatch {
        homography: Homography::translation(tx, ty),
        correlation: best.correlation,
        scale: best.scale,
    })
}

/// Zero-mean normalized cross-correlation of `template` over every valid
/// position in `image`. Output is (ih - th + 1) x (iw - tw + 1).
fn normalized_cross_correlation(
    image: &Array2<f32>,
    template: &Array2<f32>,
) -> Option<Array2<f64>> {
    let (ih, iw) = image.dim();
    let (th, tw) = template.dim();
    let n = (th * tw) as f64;

    let t_mean = template.iter().map(|&v| v as f64).sum::<f64>() / n;
    let t_norm = template
        .iter()
        .map(|&v| (v as f64 - t_mean).powi(2))
        .sum::<f64>()
        .sqrt();
    if t_norm < 1e-9 {
        return None;
    }

    let mut padded = Array2::<f32>::zeros((ih, iw));
    for ((r, c), &v) in template.indexed_iter() {
        padded[[r, c]] = (v as f64 - t_mean) as f32;
    }

    let image_fft = fft2d(image);
    let template_fft = fft2d(&padded);
    let mut cross = image_fft;
    cross
        .iter_mut()
        .zip(template_fft.iter())
        .for_each(|(a, b)| *a *= b.conj());
    let numerator = ifft2d(&cross);

    let (sum, sum_sq) = integral_images(image);
    let window = |table: &Array2<f64>, r: usize, c: usize| {
        table[[r + th, c + tw]] - table[[r, c + tw]] - table[[r + th, c]] + table[[r, c]]
    };

    let (oh, ow) = (ih - th + 1, iw - tw + 1);
    let mut out = Array2::<f64>::zeros((oh, ow));
    for r in 0..oh {
        for c in 0..ow {
            let s = window(&sum, r, c);
            let s2 = window(&sum_sq, r, c);
            let var = s2 - s * s / n;
            if var / n > 1e-8 {
                out[[r, c]] = (numerator[[r, c]] / (var.sqrt() * t_norm)).clamp(-1.0, 1.0);
            }
        }
    }
    Some(out)
}

/// Summed-area tables of values and squared values, one row/column larger
/// than the image.
fn integral_images(image: &Array2<f32>) -> (Array2<f64>, Array2<f64>) {
    let (h, w) = image.dim();
    let mut sum = Array2::<f64>::zeros((h + 1, w + 1));
    let mut sum_sq = Array2::<f64>::zeros((h + 1, w + 1));
    for r in 0..h {
        let mut row_sum = 0.0;
        let mut row_sq = 0.0;
        for c in 0..w {
            let v = image[[r, c]] as f64;
            row_sum += v;
            row_sq += v * v;
            sum[[r + 1, c + 1]] = sum[[r, c + 1]] + row_sum;
            sum_sq[[r + 1, c + 1]] = sum_sq[[r, c + 1]] + row_sq;
        }
    }
    (sum, sum_sq)
}

/// 2D FFT: row-wise FFT, then column-wise FFT.
fn fft2d(data: &Array2<f32>) -> Array2<Complex<f64>> {
    let (h, w) = data.dim();
    let mut planner = FftPlanner::new();
    let fft_row = planner.plan_fft_forward(w);
    let fft_col = planner.plan_fft_forward(h);

    let mut result = data.mapv(|v| Complex::new(v as f64, 0.0));

    for mut row in result.rows_mut() {
        let mut buf: Vec<Complex<f64>> = row.to_vec();
        fft_row.process(&mut buf);
        row.assign(&ArrayView1::from(&buf));
    }
    for mut col in result.columns_mut() {
        let mut buf: Vec<Complex<f64>> = col.to_vec();
        fft_col.process(&mut buf);
        col.assign(&ArrayView1::from(&buf));
    }

    result
}

/// Inverse 2D FFT, real part, normalized.
fn ifft2d(data: &Array2<Complex<f64>>) -> Array2<f64> {
    let (h, w) = data.dim();
    let mut planner = FftPlanner::new();
    let ifft_row = planner.plan_fft_inverse(w);
    let ifft_col = planner.plan_fft_inverse(h);

    let mut work = data.clone();
    for mut col in work.columns_mut() {
        let mut buf: Vec<Complex<f64>> = col.to_vec();
        ifft_col.process(&mut buf);
        col.assign(&ArrayView1::from(&buf));
    }
    for mut row in work.rows_mut() {
        let mut buf: Vec<Complex<f64>> = row.to_vec();
        ifft_row.process(&mut buf);
        row.assign(&ArrayView1::from(&buf));
    }

    let scale = 1.0 / (h * w) as f64;
    work.mapv(|c| c.re * scale)
}

fn find_peak(data: &Array2<f64>) -> (usize, usize, f64) {
    let mut best = (0, 0, f64::NEG_INFINITY);
    for ((r, c), &v) in data.indexed_iter() {
        if v > best.2 {
            best = (r, c, v);
        }
    }
    best
}

/// Sub-pixel peak offset from 1D parabola fits through the 3x3 neighborhood.
fn refine_peak_paraboloid(
    correlation: &Array2<f64>,
    peak_row: usize,
    peak_col: usize,
) -> (f64, f64) {
    let (h, w) = correlation.dim();
    if peak_row == 0 || peak_row + 1 >= h || peak_col == 0 || peak_col + 1 >= w {
        return (0.0, 0.0);
    }

    let vertex = |prev: f64, curr: f64, next: f64| {
        let denom = prev - 2.0 * curr + next;
        if denom.abs() > 1e-12 {
            ((prev - next) / (2.0 * denom)).clamp(-0.5, 0.5)
        } else {
            0.0
        }
    };

    let center = correlation[[peak_row, peak_col]];
    let dr = vertex(
        correlation[[peak_row - 1, peak_col]],
        center,
        correlation[[peak_row + 1, peak_col]],
    );
    let dc = vertex(
        correlation[[peak_row, peak_col - 1]],
        center,
        correlation[[peak_row, peak_col + 1]],
    );
    (dr, dc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ncc_peaks_at_embedded_template() {
        let image = Array2::from_shape_fn((40, 50), |(r, c)| {
            (((r * 31 + c * 17) % 23) as f32 / 23.0 + ((r / 3 + c / 5) % 2) as f32) / 2.0
        });
        let template = image.slice(s![12..24, 20..35]).to_owned();
        let ncc = normalized_cross_correlation(&image, &template).unwrap();
        let (r, c, v) = find_peak(&ncc);
        assert_eq!((r, c), (12, 20));
        assert!((v - 1.0).abs() < 1e-4, "peak={v}");
    }

    #[test]
    fn flat_template_is_rejected() {
        let image = Array2::from_shape_fn((20, 20), |(r, c)| (r + c) as f32 / 40.0);
        let template = Array2::<f32>::from_elem((5, 5), 0.5);
        assert!(normalized_cross_correlation(&image, &template).is_none());
    }
}
