use ndarray::{Array2, Zip};

use crate::frame::Frame;

/// Fixed 3x3 sharpening kernel: center 9, all eight neighbors -1.
pub const SHARPEN_KERNEL: [[f32; 3]; 3] =
    [[-1.0, -1.0, -1.0], [-1.0, 9.0, -1.0], [-1.0, -1.0, -1.0]];

/// Convolve with a 3x3 kernel, clamped borders, output clamped to [0, 1].
pub fn convolve_3x3(frame: &Frame, kernel: &[[f32; 3]; 3]) -> Frame {
    let data = &frame.data;
    let (h, w) = data.dim();
    let mut result = Array2::<f32>::zeros((h, w));

    Zip::indexed(&mut result).for_each(|(row, col), out| {
        let mut sum = 0.0f32;
        for (ky, krow) in kernel.iter().enumerate() {
            let r = (row as isize + ky as isize - 1).clamp(0, h as isize - 1) as usize;
            for (kx, &kv) in krow.iter().enumerate() {
                let c = (col as isize + kx as isize - 1).clamp(0, w as isize - 1) as usize;
                sum += data[[r, c]] * kv;
            }
        }
        *out = sum.clamp(0.0, 1.0);
    });

    Frame::new(result, frame.original_bit_depth)
}

pub fn sharpen(frame: &Frame) -> Frame {
    convolve_3x3(frame, &SHARPEN_KERNEL)
}
