use ndarray::{s, Array2};

use crate::filters::resize::resize_array;

/// An image resized (aspect preserved) and zero-padded onto a square canvas.
#[derive(Clone, Debug)]
pub struct Letterbox {
    pub canvas: Array2<f32>,
    /// Original-to-canvas scale factor.
    pub scale: f64,
    pub pad_x: usize,
    pub pad_y: usize,
    /// Original image width.
    pub width: usize,
    /// Original image height.
    pub height: usize,
}

impl Letterbox {
    /// A zero `size` yields an empty canvas onto which no point maps.
    pub fn new(image: &Array2<f32>, size: usize) -> Self {
        let (h, w) = image.dim();
        if size == 0 {
            return Self {
                canvas: Array2::zeros((0, 0)),
                scale: 0.0,
                pad_x: 0,
                pad_y: 0,
                width: w,
                height: h,
            };
        }
        let longest = h.max(w).max(1);
        let scale = size as f64 / longest as f64;
        let new_w = ((w as f64 * scale) as usize).clamp(1, size);
        let new_h = ((h as f64 * scale) as usize).clamp(1, size);
        let pad_x = (size - new_w) / 2;
        let pad_y = (size - new_h) / 2;

        let mut canvas = Array2::<f32>::zeros((size, size));
        if h > 0 && w > 0 {
            let resized = resize_array(image, new_h, new_w);
            canvas
                .slice_mut(s![pad_y..pad_y + new_h, pad_x..pad_x + new_w])
                .assign(&resized);
        }

        Self {
            canvas,
            scale,
            pad_x,
            pad_y,
            width: w,
            height: h,
        }
    }

    /// Undo padding and scaling. `None` when the point falls outside the
    /// original image.
    pub fn to_original(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        if self.scale <= 0.0 {
            return None;
        }
        let ox = (x - self.pad_x as f64) / self.scale;
        let oy = (y - self.pad_y as f64) / self.scale;
        let inside = ox >= 0.0 && oy >= 0.0 && ox < self.width as f64 && oy < self.height as f64;
        inside.then_some((ox, oy))
    }
}
