use crate::consts::INTENSITY_LEVELS;
use crate::frame::Frame;

/// 256-entry lookup table for output = input^(1/gamma), values in [0, 1].
///
/// gamma > 1.0 brightens shadows and midtones, gamma < 1.0 darkens them.
pub fn gamma_lut(gamma: f32) -> [f32; INTENSITY_LEVELS] {
    let inv_gamma = 1.0 / gamma;
    let mut lut = [0.0f32; INTENSITY_LEVELS];
    for (i, v) in lut.iter_mut().enumerate() {
        *v = (i as f32 / 255.0).powf(inv_gamma);
    }
    lut
}

/// Map every pixel through a 256-entry table after quantizing to 8 bits.
pub fn apply_lut(frame: &Frame, lut: &[f32; INTENSITY_LEVELS]) -> Frame {
    let data = frame.data.mapv(|v| lut[quantize(v)]);
    Frame::new(data, frame.original_bit_depth)
}

/// Apply gamma correction through a lookup table.
pub fn gamma_correct(frame: &Frame, gamma: f32) -> Frame {
    apply_lut(frame, &gamma_lut(gamma))
}

/// Quantize a [0, 1] value to an 8-bit level.
pub fn quantize(v: f32) -> usize {
    (v.clamp(0.0, 1.0) * 255.0).round() as usize
}
