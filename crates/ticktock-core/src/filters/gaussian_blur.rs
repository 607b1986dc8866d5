use ndarray::{Array2, Axis, Zip};

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::frame::Frame;

/// Apply Gaussian blur to a frame using separable 1D convolution.
pub fn gaussian_blur(frame: &Frame, sigma: f32) -> Frame {
    let blurred = gaussian_blur_array(&frame.data, sigma);
    Frame::new(blurred, frame.original_bit_depth)
}

/// Apply Gaussian blur to a raw array.
///
/// Borders are clamped. A non-positive sigma returns a copy.
pub fn gaussian_blur_array(data: &Array2<f32>, sigma: f32) -> Array2<f32> {
    if sigma <= 0.0 {
        return data.clone();
    }
    let kernel = make_gaussian_kernel(sigma);
    let row_pass = convolve_axis(data, &kernel, Axis(1));
    convolve_axis(&row_pass, &kernel, Axis(0))
}

/// Normalized 1D Gaussian kernel with radius ceil(3 sigma).
pub fn make_gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil().max(1.0) as usize;
    let size = 2 * radius + 1;
    let mut kernel = vec![0.0f32; size];
    let s2 = 2.0 * sigma * sigma;
    let mut sum = 0.0f32;

    for (i, k) in kernel.iter_mut().enumerate() {
        let x = i as f32 - radius as f32;
        *k = (-x * x / s2).exp();
        sum += *k;
    }

    for v in &mut kernel {
        *v /= sum;
    }

    kernel
}

/// Convolve along one axis with a symmetric kernel. `Axis(1)` runs along
/// rows, `Axis(0)` along columns.
fn convolve_axis(data: &Array2<f32>, kernel: &[f32], axis: Axis) -> Array2<f32> {
    let (h, w) = data.dim();
    let radius = kernel.len() / 2;
    let along_cols = axis == Axis(0);
    let len = if along_cols { h } else { w };

    let tap = |row: usize, col: usize| -> f32 {
        let center = if along_cols { row } else { col };
        let mut sum = 0.0f32;
        for (ki, &kv) in kernel.iter().enumerate() {
            let src = (center as isize + ki as isize - radius as isize)
                .clamp(0, len as isize - 1) as usize;
            sum += if along_cols {
                data[[src, col]]
            } else {
                data[[row, src]]
            } * kv;
        }
        sum
    };

    let mut result = Array2::<f32>::zeros((h, w));
    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        Zip::indexed(&mut result).par_for_each(|(row, col), out| *out = tap(row, col));
    } else {
        Zip::indexed(&mut result).for_each(|(row, col), out| *out = tap(row, col));
    }
    result
}
