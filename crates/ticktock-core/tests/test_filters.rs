mod common;

use ndarray::Array2;

use ticktock_core::classify::{classify, classify_mean, LightCondition};
use ticktock_core::enhance::{enhance, EnhanceParams};
use ticktock_core::filters::clahe::{clahe, ClaheParams};
use ticktock_core::filters::gaussian_blur::gaussian_blur;
use ticktock_core::filters::levels::gamma_correct;
use ticktock_core::filters::resize::{resize_array, resize_frame};
use ticktock_core::filters::sharpen::sharpen;
use ticktock_core::frame::Frame;

use common::{textured_checkerboard, uniform_frame};

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

#[test]
fn test_dark_image_is_low_light() {
    let frame = uniform_frame(16, 16, 40.0 / 255.0);
    assert_eq!(classify(&frame, 80.0), LightCondition::LowLight);
}

#[test]
fn test_bright_image_is_normal() {
    let frame = uniform_frame(16, 16, 0.6);
    assert_eq!(classify(&frame, 80.0), LightCondition::Normal);
}

#[test]
fn test_threshold_boundary_is_normal() {
    assert_eq!(classify_mean(80.0, 80.0), LightCondition::Normal);
    assert_eq!(classify_mean(79.9, 80.0), LightCondition::LowLight);
}

#[test]
fn test_light_condition_display() {
    assert_eq!(format!("{}", LightCondition::Normal), "Normal");
    assert_eq!(format!("{}", LightCondition::LowLight), "Low light");
}

// ---------------------------------------------------------------------------
// Enhancer
// ---------------------------------------------------------------------------

#[test]
fn test_enhance_keeps_shape_and_range() {
    let dim = Frame::new(textured_checkerboard(97, 61, 8).data.mapv(|v| v * 0.15), 8);
    let out = enhance(&dim, &EnhanceParams::default());

    assert_eq!(out.data.dim(), dim.data.dim());
    assert!(out.data.iter().all(|v| v.is_finite() && (0.0..=1.0).contains(v)));
}

#[test]
fn test_enhance_brightens_dark_image() {
    let dim = Frame::new(textured_checkerboard(64, 64, 8).data.mapv(|v| v * 0.15), 8);
    let out = enhance(&dim, &EnhanceParams::default());
    assert!(
        out.mean_8bit() > dim.mean_8bit(),
        "enhanced mean={} should exceed {}",
        out.mean_8bit(),
        dim.mean_8bit()
    );
}

#[test]
fn test_enhance_is_deterministic() {
    let frame = textured_checkerboard(48, 40, 6);
    let a = enhance(&frame, &EnhanceParams::default());
    let b = enhance(&frame, &EnhanceParams::default());
    assert_eq!(a.data, b.data);
}

// ---------------------------------------------------------------------------
// Individual filters
// ---------------------------------------------------------------------------

#[test]
fn test_clahe_preserves_uniform_image() {
    let frame = uniform_frame(32, 32, 0.5);
    let out = clahe(&frame, &ClaheParams::default());
    let first = out.data[[0, 0]];
    assert!(out.data.iter().all(|&v| (v - first).abs() < 1e-6));
}

#[test]
fn test_gamma_brightens_midtones() {
    let frame = uniform_frame(4, 4, 0.25);
    let out = gamma_correct(&frame, 2.0);
    assert!((out.data[[0, 0]] - 0.5).abs() < 0.01, "got {}", out.data[[0, 0]]);
}

#[test]
fn test_sharpen_leaves_flat_region_unchanged() {
    let frame = uniform_frame(8, 8, 0.4);
    let out = sharpen(&frame);
    assert!(out.data.iter().all(|&v| (v - 0.4).abs() < 1e-5));
}

#[test]
fn test_sharpen_clamps_output() {
    let mut data = Array2::<f32>::zeros((5, 5));
    data[[2, 2]] = 1.0;
    let out = sharpen(&Frame::new(data, 8));
    assert_eq!(out.data[[2, 2]], 1.0);
    assert_eq!(out.data[[1, 2]], 0.0);
}

#[test]
fn test_gaussian_blur_preserves_mean() {
    let frame = textured_checkerboard(40, 40, 5);
    let out = gaussian_blur(&frame, 1.5);
    let before = frame.data.mean().unwrap();
    let after = out.data.mean().unwrap();
    assert!((before - after).abs() < 0.01, "mean {} -> {}", before, after);
}

#[test]
fn test_resize_dimensions() {
    let frame = textured_checkerboard(40, 30, 5);
    let out = resize_frame(&frame, 20, 15);
    assert_eq!((out.width(), out.height()), (20, 15));

    let up = resize_array(&frame.data, 60, 80);
    assert_eq!(up.dim(), (60, 80));
}
