mod common;

use approx::assert_abs_diff_eq;
use nalgebra::{Matrix3, Point2};

use ticktock_core::error::RegistrationIssue;
use ticktock_core::estimate::{estimate_homography, fit_homography, EstimatorParams, Homography};
use ticktock_core::pipeline::RegistrationConfig;

use common::{correspondences, hash01};

fn params() -> EstimatorParams {
    EstimatorParams {
        seed: Some(11),
        ..RegistrationConfig::default().sparse_estimator(false)
    }
}

fn grid_points(n: usize) -> Vec<Point2<f64>> {
    (0..n)
        .map(|i| {
            let x = 20.0 + 360.0 * hash01(i as i64, 0, 5) as f64;
            let y = 20.0 + 260.0 * hash01(i as i64, 1, 5) as f64;
            Point2::new(x, y)
        })
        .collect()
}

#[test]
fn test_three_correspondences_yield_nothing() {
    let pts = grid_points(3);
    let pairs: Vec<_> = pts.iter().map(|&p| (p, p)).collect();

    for _ in 0..3 {
        let estimate = estimate_homography(&correspondences(&pairs), &params());
        assert!(estimate.homography.is_none());
        assert_eq!(estimate.inlier_count, 0);
        assert_eq!(
            estimate.issues,
            vec![RegistrationIssue::InsufficientCorrespondences {
                found: 3,
                required: 4
            }]
        );
    }
}

#[test]
fn test_known_perspective_is_recovered() {
    let truth = Homography::new(Matrix3::new(
        1.02, 0.03, 12.0, -0.02, 0.98, -7.0, 1e-5, -2e-5, 1.0,
    ))
    .unwrap();
    let pts = grid_points(60);
    let pairs: Vec<_> = pts
        .iter()
        .map(|&p| (p, truth.apply_point(&p).unwrap()))
        .collect();

    let estimate = estimate_homography(&correspondences(&pairs), &params());
    let h = estimate.homography.expect("homography");
    assert_eq!(estimate.inlier_count, 60);
    assert!(!estimate.low_confidence);
    assert!(!estimate.retried);
    for (a, b) in h.h.iter().zip(truth.h.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-4);
    }
}

#[test]
fn test_outliers_are_rejected() {
    let truth = Homography::translation(25.0, -14.0);
    let pts = grid_points(80);
    let pairs: Vec<_> = pts
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            let q = truth.apply_point(&p).unwrap();
            if i % 4 == 0 {
                // Gross mismatch
                (p, Point2::new(q.x + 90.0 * hash01(i as i64, 7, 9) as f64 + 30.0, q.y - 40.0))
            } else {
                (p, q)
            }
        })
        .collect();

    let estimate = estimate_homography(&correspondences(&pairs), &params());
    assert_eq!(estimate.inlier_count, 60);
    assert!(estimate.inliers.iter().all(|i| i % 4 != 0));
    let (tx, ty) = estimate.homography.unwrap().translation_part();
    assert_abs_diff_eq!(tx, 25.0, epsilon = 1e-6);
    assert_abs_diff_eq!(ty, -14.0, epsilon = 1e-6);
}

#[test]
fn test_below_recommended_minimum_is_low_confidence() {
    let truth = Homography::translation(3.0, 4.0);
    let pts = grid_points(6);
    let pairs: Vec<_> = pts
        .iter()
        .map(|&p| (p, truth.apply_point(&p).unwrap()))
        .collect();

    let estimate = estimate_homography(&correspondences(&pairs), &params());
    assert!(estimate.homography.is_some());
    assert!(estimate.low_confidence);
    assert!(estimate.issues.contains(&RegistrationIssue::InsufficientCorrespondences {
        found: 6,
        required: 8
    }));
}

#[test]
fn test_near_collinear_set_triggers_relaxed_retry() {
    // Points hug the line y = 150; the reference side is flattened further
    // so every fitted model squashes one axis.
    let pairs: Vec<_> = (0..16)
        .map(|i| {
            let x = 20.0 + 24.0 * i as f64;
            let y = 150.0 + 5.0 * (hash01(i, 3, 4) as f64 - 0.5);
            let target = Point2::new(x, y);
            let reference = Point2::new(x, 150.0 + 0.02 * (y - 150.0));
            (target, reference)
        })
        .collect();
    let params = EstimatorParams {
        condition_ceiling: 10.0,
        ..params()
    };

    let estimate = estimate_homography(&correspondences(&pairs), &params);

    assert!(estimate.retried);
    assert!(estimate.homography.is_some());
    assert!(estimate
        .issues
        .iter()
        .any(|i| matches!(i, RegistrationIssue::IllConditionedModel { .. })));
    assert!(estimate.low_confidence);
}

#[test]
fn test_fit_homography_needs_four_points() {
    let pts = grid_points(3);
    assert!(fit_homography(&pts, &pts).is_none());

    let pts = grid_points(4);
    let h = fit_homography(&pts, &pts).expect("identity fit");
    for (a, b) in h.h.iter().zip(Matrix3::<f64>::identity().iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-8);
    }
}

#[test]
fn test_fit_homography_uses_every_point() {
    let truth = Homography::new(Matrix3::new(
        0.97, -0.04, 30.0, 0.05, 1.01, -12.0, -3e-5, 4e-5, 1.0,
    ))
    .unwrap();
    let src = grid_points(25);
    let dst: Vec<_> = src.iter().map(|p| truth.apply_point(p).unwrap()).collect();

    let h = fit_homography(&src, &dst).expect("overdetermined fit");
    for (a, b) in h.h.iter().zip(truth.h.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-7);
    }
}

#[test]
fn test_homography_inverse_round_trip() {
    let h = Homography::new(Matrix3::new(0.9, 0.1, 5.0, -0.05, 1.1, 3.0, 1e-4, 0.0, 1.0)).unwrap();
    let inv = h.inverse().unwrap();
    let p = Point2::new(123.0, 45.0);
    let back = inv.apply_point(&h.apply_point(&p).unwrap()).unwrap();
    assert_abs_diff_eq!(back.x, p.x, epsilon = 1e-9);
    assert_abs_diff_eq!(back.y, p.y, epsilon = 1e-9);
}
