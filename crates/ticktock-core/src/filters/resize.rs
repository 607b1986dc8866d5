use ndarray::{Array2, Zip};

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::frame::Frame;
use crate::warp::bilinear_sample_clamped;

use super::gaussian_blur::gaussian_blur_array;

/// Resize an array to (new_h, new_w) with pixel-center aligned bilinear
/// interpolation. Shrinking by more than 2x low-pass filters first.
pub fn resize_array(data: &Array2<f32>, new_h: usize, new_w: usize) -> Array2<f32> {
    let (h, w) = data.dim();
    if (h, w) == (new_h, new_w) {
        return data.clone();
    }
    if h == 0 || w == 0 || new_h == 0 || new_w == 0 {
        return Array2::zeros((new_h, new_w));
    }

    let scale_y = h as f64 / new_h as f64;
    let scale_x = w as f64 / new_w as f64;

    let shrink = scale_y.max(scale_x);
    let prefiltered;
    let source = if shrink > 2.0 {
        prefiltered = gaussian_blur_array(data, ((shrink - 1.0) / 2.0) as f32);
        &prefiltered
    } else {
        data
    };

    let mut result = Array2::<f32>::zeros((new_h, new_w));
    let sample = |row: usize, col: usize| -> f32 {
        let y = (row as f64 + 0.5) * scale_y - 0.5;
        let x = (col as f64 + 0.5) * scale_x - 0.5;
        bilinear_sample_clamped(source, y, x)
    };
    if new_h * new_w >= PARALLEL_PIXEL_THRESHOLD {
        Zip::indexed(&mut result).par_for_each(|(row, col), out| *out = sample(row, col));
    } else {
        Zip::indexed(&mut result).for_each(|(row, col), out| *out = sample(row, col));
    }
    result
}

/// Resize an array by a uniform scale factor, rounding the output size.
pub fn scale_array(data: &Array2<f32>, scale: f64) -> Array2<f32> {
    let (h, w) = data.dim();
    let new_h = ((h as f64 * scale).round() as usize).max(1);
    let new_w = ((w as f64 * scale).round() as usize).max(1);
    resize_array(data, new_h, new_w)
}

pub fn resize_frame(frame: &Frame, width: usize, height: usize) -> Frame {
    Frame::new(
        resize_array(&frame.data, height, width),
        frame.original_bit_depth,
    )
}
