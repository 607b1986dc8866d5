use ndarray::Array2;

use crate::filters::resize::scale_array;

/// One level of a scale pyramid.
pub(crate) struct PyramidLevel {
    pub data: Array2<f32>,
    /// Factor mapping level coordinates back to full resolution.
    pub scale: f32,
}

/// Pyramid with a constant ratio `factor` (> 1) between consecutive levels.
///
/// Index 0 is the original image. Levels smaller than `min_size` on either
/// side are not generated.
pub(crate) fn build_scaled_pyramid(
    data: &Array2<f32>,
    levels: usize,
    factor: f32,
    min_size: usize,
) -> Vec<PyramidLevel> {
    let mut pyramid = Vec::with_capacity(levels);
    pyramid.push(PyramidLevel {
        data: data.clone(),
        scale: 1.0,
    });

    for level in 1..levels {
        let scale = factor.powi(level as i32);
        let (h, w) = data.dim();
        if ((h as f32 / scale) as usize) < min_size || ((w as f32 / scale) as usize) < min_size {
            break;
        }
        pyramid.push(PyramidLevel {
            data: scale_array(data, 1.0 / scale as f64),
            scale,
        });
    }

    pyramid
}

/// Downsample an image by 2x by taking every other pixel.
pub(crate) fn downsample_2x(data: &Array2<f32>) -> Array2<f32> {
    let (h, w) = data.dim();
    let new_h = h.div_ceil(2);
    let new_w = w.div_ceil(2);
    let mut result = Array2::<f32>::zeros((new_h, new_w));

    for r in 0..new_h {
        for c in 0..new_w {
            result[[r, c]] = data[[r * 2, c * 2]];
        }
    }

    result
}
