use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::frame::Frame;

/// Edge-preserving smoothing parameters. Sigmas are on the 0-255 scale.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BilateralParams {
    /// Neighborhood diameter in pixels.
    pub diameter: usize,
    pub sigma_color: f32,
    pub sigma_space: f32,
}

impl Default for BilateralParams {
    fn default() -> Self {
        Self {
            diameter: 9,
            sigma_color: 75.0,
            sigma_space: 75.0,
        }
    }
}

pub fn bilateral_filter(frame: &Frame, params: &BilateralParams) -> Frame {
    let data = &frame.data;
    let (h, w) = data.dim();
    let radius = (params.diameter / 2).max(1) as isize;

    // Circular window offsets with their spatial weights
    let space_coeff = -0.5 / (params.sigma_space * params.sigma_space);
    let mut window: Vec<(isize, isize, f32)> = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let r2 = (dy * dy + dx * dx) as f32;
            if r2 <= (radius * radius) as f32 {
                window.push((dy, dx, (r2 * space_coeff).exp()));
            }
        }
    }

    let color_coeff = -0.5 / (params.sigma_color * params.sigma_color);

    let filter_pixel = |row: usize, col: usize| -> f32 {
        let center = data[[row, col]];
        let mut sum = 0.0f32;
        let mut weight_sum = 0.0f32;
        for &(dy, dx, ws) in &window {
            let r = (row as isize + dy).clamp(0, h as isize - 1) as usize;
            let c = (col as isize + dx).clamp(0, w as isize - 1) as usize;
            let v = data[[r, c]];
            let diff = (v - center) * 255.0;
            let weight = ws * (diff * diff * color_coeff).exp();
            sum += v * weight;
            weight_sum += weight;
        }
        (sum / weight_sum).clamp(0.0, 1.0)
    };

    let mut result = Array2::<f32>::zeros((h, w));
    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        Zip::indexed(&mut result).par_for_each(|(row, col), out| *out = filter_pixel(row, col));
    } else {
        Zip::indexed(&mut result).for_each(|(row, col), out| *out = filter_pixel(row, col));
    }

    Frame::new(result, frame.original_bit_depth)
}
