#![allow(dead_code)]

use nalgebra::{Matrix3, Point2};
use ndarray::Array2;

use ticktock_core::estimate::Homography;
use ticktock_core::frame::Frame;
use ticktock_core::matching::{Correspondence, MatchScore};
use ticktock_core::warp::warp_perspective;

/// Deterministic hash of a lattice coordinate into [0, 1).
pub fn hash01(a: i64, b: i64, salt: u64) -> f32 {
    let mut x = (a as u64)
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (b as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
        ^ salt.wrapping_mul(0x1656_67B1_9E37_79F9);
    x ^= x >> 33;
    x = x.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
    x ^= x >> 33;
    (x >> 40) as f32 / (1u64 << 24) as f32
}

/// Bilinearly interpolated lattice noise with the given period in pixels.
fn value_noise(row: usize, col: usize, period: usize, salt: u64) -> f32 {
    let fy = row as f32 / period as f32;
    let fx = col as f32 / period as f32;
    let (y0, x0) = (fy.floor() as i64, fx.floor() as i64);
    let (ty, tx) = (fy - y0 as f32, fx - x0 as f32);
    let v00 = hash01(y0, x0, salt);
    let v01 = hash01(y0, x0 + 1, salt);
    let v10 = hash01(y0 + 1, x0, salt);
    let v11 = hash01(y0 + 1, x0 + 1, salt);
    let top = v00 * (1.0 - tx) + v01 * tx;
    let bottom = v10 * (1.0 - tx) + v11 * tx;
    top * (1.0 - ty) + bottom * ty
}

/// Checkerboard whose cells carry individual grey levels, overlaid with
/// smooth noise so that no two neighbourhoods look alike. Mean brightness
/// is well inside the normal-light range.
pub fn textured_checkerboard(width: usize, height: usize, cell: usize) -> Frame {
    let data = Array2::from_shape_fn((height, width), |(r, c)| {
        let (cr, cc) = ((r / cell) as i64, (c / cell) as i64);
        let parity = ((cr + cc) % 2) as f32;
        let level = 0.3 + 0.25 * parity + 0.2 * hash01(cr, cc, 1);
        let texture = 0.2 * value_noise(r, c, 9, 2) - 0.1;
        (level + texture).clamp(0.0, 1.0)
    });
    Frame::new(data, 8)
}

pub fn uniform_frame(width: usize, height: usize, value: f32) -> Frame {
    Frame::new(Array2::from_elem((height, width), value), 8)
}

/// Rotation by `degrees` about the image centre followed by a translation.
pub fn rigid_homography(degrees: f64, tx: f64, ty: f64, width: usize, height: usize) -> Homography {
    let (cx, cy) = (width as f64 / 2.0, height as f64 / 2.0);
    let (s, c) = degrees.to_radians().sin_cos();
    let m = Matrix3::new(
        c,
        -s,
        cx - c * cx + s * cy + tx,
        s,
        c,
        cy - s * cx - c * cy + ty,
        0.0,
        0.0,
        1.0,
    );
    Homography::new(m).expect("rigid transform is invertible")
}

/// Render `frame` moved by `motion` (source pixel p lands at motion(p)).
pub fn transformed(frame: &Frame, motion: &Homography) -> Frame {
    warp_perspective(frame, motion, frame.width(), frame.height()).expect("warp")
}

pub fn corners(width: usize, height: usize) -> [Point2<f64>; 4] {
    let (w, h) = (width as f64 - 1.0, height as f64 - 1.0);
    [
        Point2::new(0.0, 0.0),
        Point2::new(w, 0.0),
        Point2::new(w, h),
        Point2::new(0.0, h),
    ]
}

/// Exact correspondences `target -> reference` for the given points.
pub fn correspondences(pairs: &[(Point2<f64>, Point2<f64>)]) -> Vec<Correspondence> {
    pairs
        .iter()
        .enumerate()
        .map(|(i, &(target, reference))| Correspondence {
            reference_index: i,
            target_index: i,
            reference,
            target,
            score: MatchScore::Distance(0.0),
        })
        .collect()
}
