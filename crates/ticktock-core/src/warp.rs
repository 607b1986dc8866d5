//! Pixel resampling of registered images.
//!
//! A [`Homography`] maps target pixels onto the reference frame, so warping
//! walks the output (reference) grid and pulls each pixel from the target
//! through the inverse map. Samples falling outside the target are black.

use ndarray::{Array2, Zip};

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::error::{Result, TickTockError};
use crate::estimate::Homography;
use crate::filters::resize::resize_frame;
use crate::frame::{Frame, Image};

/// Bilinear sample with a constant black border.
pub fn bilinear_sample(data: &Array2<f32>, y: f64, x: f64) -> f32 {
    let (h, w) = data.dim();

    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let x1 = x0 + 1;
    let y1 = y0 + 1;

    let fx = (x - x0 as f64) as f32;
    let fy = (y - y0 as f64) as f32;

    let sample = |r: i64, c: i64| -> f32 {
        if r >= 0 && r < h as i64 && c >= 0 && c < w as i64 {
            data[[r as usize, c as usize]]
        } else {
            0.0
        }
    };

    let v00 = sample(y0, x0);
    let v10 = sample(y0, x1);
    let v01 = sample(y1, x0);
    let v11 = sample(y1, x1);

    v00 * (1.0 - fx) * (1.0 - fy)
        + v10 * fx * (1.0 - fy)
        + v01 * (1.0 - fx) * fy
        + v11 * fx * fy
}

/// Bilinear sample with coordinates clamped to the image.
pub fn bilinear_sample_clamped(data: &Array2<f32>, y: f64, x: f64) -> f32 {
    let (h, w) = data.dim();
    if h == 0 || w == 0 {
        return 0.0;
    }
    let y = y.clamp(0.0, (h - 1) as f64);
    let x = x.clamp(0.0, (w - 1) as f64);

    let y0 = y.floor() as usize;
    let x0 = x.floor() as usize;
    let y1 = (y0 + 1).min(h - 1);
    let x1 = (x0 + 1).min(w - 1);
    let fy = (y - y0 as f64) as f32;
    let fx = (x - x0 as f64) as f32;

    let top = data[[y0, x0]] * (1.0 - fx) + data[[y0, x1]] * fx;
    let bottom = data[[y1, x0]] * (1.0 - fx) + data[[y1, x1]] * fx;
    top * (1.0 - fy) + bottom * fy
}

/// Warp a grayscale frame into an output of `width` x `height` pixels.
pub fn warp_perspective(
    frame: &Frame,
    homography: &Homography,
    width: usize,
    height: usize,
) -> Result<Frame> {
    let inverse = homography.inverse().ok_or_else(|| {
        TickTockError::Pipeline("homography is singular and cannot be inverted".into())
    })?;
    Ok(warp_with_inverse(frame, &inverse, width, height))
}

/// Warp every channel of an image into the reference geometry.
pub fn warp_image(
    image: &Image,
    homography: &Homography,
    width: usize,
    height: usize,
) -> Result<Image> {
    let inverse = homography.inverse().ok_or_else(|| {
        TickTockError::Pipeline("homography is singular and cannot be inverted".into())
    })?;
    Ok(image.map_channels(|f| warp_with_inverse(f, &inverse, width, height)))
}

/// Resize-only passthrough for targets that could not be registered.
pub fn passthrough(image: &Image, width: usize, height: usize) -> Image {
    image.map_channels(|f| resize_frame(f, width, height))
}

fn warp_with_inverse(frame: &Frame, inverse: &Homography, width: usize, height: usize) -> Frame {
    let mut result = Array2::<f32>::zeros((height, width));
    let pull = |row: usize, col: usize| -> f32 {
        match inverse.apply(col as f64, row as f64) {
            Some((x, y)) => bilinear_sample(&frame.data, y, x),
            None => 0.0,
        }
    };

    if width * height >= PARALLEL_PIXEL_THRESHOLD {
        Zip::indexed(&mut result).par_for_each(|(row, col), out| *out = pull(row, col));
    } else {
        Zip::indexed(&mut result).for_each(|(row, col), out| *out = pull(row, col));
    }

    Frame::new(result, frame.original_bit_depth)
}
