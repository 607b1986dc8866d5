mod common;

use nalgebra::Matrix3;
use ndarray::Array2;

use ticktock_core::estimate::Homography;
use ticktock_core::frame::{ColorFrame, Frame, Image};
use ticktock_core::warp::{bilinear_sample, passthrough, warp_image, warp_perspective};

use common::textured_checkerboard;

#[test]
fn test_bilinear_interpolation() {
    let mut data = Array2::<f32>::zeros((4, 4));
    data[[1, 1]] = 1.0;

    assert!((bilinear_sample(&data, 1.0, 1.0) - 1.0).abs() < 1e-6);
    assert!((bilinear_sample(&data, 1.0, 1.5) - 0.5).abs() < 1e-6);
    assert_eq!(bilinear_sample(&data, -3.0, 1.0), 0.0);
}

#[test]
fn test_identity_warp_is_lossless() {
    let frame = textured_checkerboard(50, 40, 5);
    let out = warp_perspective(&frame, &Homography::identity(), 50, 40).unwrap();
    for (a, b) in out.data.iter().zip(frame.data.iter()) {
        assert!((a - b).abs() < 1e-6);
    }
}

#[test]
fn test_integer_translation_moves_pixels() {
    let frame = textured_checkerboard(40, 30, 4);
    let out = warp_perspective(&frame, &Homography::translation(3.0, 2.0), 40, 30).unwrap();

    assert!((out.data[[12, 15]] - frame.data[[10, 12]]).abs() < 1e-6);
    // Uncovered border is black
    assert_eq!(out.data[[0, 0]], 0.0);
    assert_eq!(out.data[[1, 2]], 0.0);
}

#[test]
fn test_warp_uses_requested_output_size() {
    let frame = textured_checkerboard(40, 30, 4);
    let out = warp_perspective(&frame, &Homography::identity(), 64, 48).unwrap();
    assert_eq!((out.width(), out.height()), (64, 48));
}

#[test]
fn test_singular_homography_is_an_error() {
    let singular =
        Homography::new(Matrix3::new(1.0, 2.0, 0.0, 2.0, 4.0, 0.0, 0.0, 0.0, 1.0)).unwrap();
    let frame = textured_checkerboard(10, 10, 2);
    assert!(warp_perspective(&frame, &singular, 10, 10).is_err());
}

#[test]
fn test_color_warp_moves_every_channel() {
    let base = textured_checkerboard(30, 20, 3);
    let color = ColorFrame {
        red: base.clone(),
        green: Frame::new(base.data.mapv(|v| v * 0.5), 8),
        blue: Frame::new(base.data.mapv(|v| 1.0 - v), 8),
    };
    let out = warp_image(&Image::Color(color), &Homography::translation(2.0, 1.0), 30, 20).unwrap();

    let Image::Color(out) = out else {
        panic!("color in, color out");
    };
    assert!((out.red.data[[6, 7]] - base.data[[5, 5]]).abs() < 1e-6);
    assert!((out.green.data[[6, 7]] - base.data[[5, 5]] * 0.5).abs() < 1e-6);
    assert!((out.blue.data[[6, 7]] - (1.0 - base.data[[5, 5]])).abs() < 1e-6);
}

#[test]
fn test_passthrough_resizes_only() {
    let frame = Frame::new(Array2::from_elem((30, 40), 0.7), 8);
    let out = passthrough(&Image::Mono(frame), 80, 60);
    assert_eq!((out.width(), out.height()), (80, 60));
    let Image::Mono(out) = out else {
        panic!("mono in, mono out");
    };
    assert!(out.data.iter().all(|&v| (v - 0.7).abs() < 1e-6));
}
