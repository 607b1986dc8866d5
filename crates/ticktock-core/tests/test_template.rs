mod common;

use ticktock_core::error::RegistrationIssue;
use ticktock_core::estimate::Homography;
use ticktock_core::template::{estimate_translation, TemplateParams};

use common::{textured_checkerboard, transformed, uniform_frame};

#[test]
fn test_recovers_integer_shift() {
    let reference = textured_checkerboard(320, 240, 16);
    let target = transformed(&reference, &Homography::translation(12.0, -7.0));

    let found =
        estimate_translation(&reference.data, &target.data, &TemplateParams::default()).unwrap();
    let (tx, ty) = found.homography.translation_part();
    assert!((tx + 12.0).abs() < 1.0, "tx={} should be ~-12", tx);
    assert!((ty - 7.0).abs() < 1.0, "ty={} should be ~7", ty);
    assert!(found.correlation > 0.9, "correlation={}", found.correlation);
    assert_eq!(found.scale, 1.0);
}

#[test]
fn test_identical_images_give_zero_shift() {
    let reference = textured_checkerboard(200, 160, 10);
    let found =
        estimate_translation(&reference.data, &reference.data, &TemplateParams::default())
            .unwrap();
    let (tx, ty) = found.homography.translation_part();
    assert!(tx.abs() < 0.5, "tx={} should be ~0", tx);
    assert!(ty.abs() < 0.5, "ty={} should be ~0", ty);
}

#[test]
fn test_downscaled_search_maps_back_to_full_resolution() {
    let reference = textured_checkerboard(480, 360, 24);
    let target = transformed(&reference, &Homography::translation(20.0, 10.0));
    let params = TemplateParams {
        working_size: 240,
        ..Default::default()
    };

    let found = estimate_translation(&reference.data, &target.data, &params).unwrap();
    let (tx, ty) = found.homography.translation_part();
    assert!((tx + 20.0).abs() < 2.0, "tx={} should be ~-20", tx);
    assert!((ty + 10.0).abs() < 2.0, "ty={} should be ~-10", ty);
}

#[test]
fn test_flat_target_is_too_weak() {
    let reference = textured_checkerboard(160, 120, 8);
    let flat = uniform_frame(160, 120, 0.5);
    match estimate_translation(&reference.data, &flat.data, &TemplateParams::default()) {
        Err(RegistrationIssue::TemplateCorrelationTooWeak { best }) => {
            assert!(best <= 0.3, "best={}", best)
        }
        other => panic!(
            "expected TemplateCorrelationTooWeak, got {:?}",
            other.map(|m| m.correlation)
        ),
    }
}

#[test]
fn test_threshold_is_respected() {
    let reference = textured_checkerboard(160, 120, 8);
    let params = TemplateParams {
        min_correlation: 1.5,
        ..Default::default()
    };
    assert!(matches!(
        estimate_translation(&reference.data, &reference.data, &params),
        Err(RegistrationIssue::TemplateCorrelationTooWeak { .. })
    ));
}

#[test]
fn test_zero_working_size_is_too_weak() {
    let reference = textured_checkerboard(160, 120, 8);
    let params = TemplateParams {
        working_size: 0,
        ..Default::default()
    };
    assert!(matches!(
        estimate_translation(&reference.data, &reference.data, &params),
        Err(RegistrationIssue::TemplateCorrelationTooWeak { .. })
    ));
}
