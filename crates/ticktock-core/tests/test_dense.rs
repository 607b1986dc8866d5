mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ndarray::Array2;

use ticktock_core::dense::{
    ComputeContext, DenseMatch, DenseMatcher, DevicePreference, Letterbox,
    PatchCorrelationMatcher, PatchCorrelationParams, SerializedMatcher, WeightsHandle,
};
use ticktock_core::error::{Result, TickTockError};
use ticktock_core::estimate::Homography;

use common::{textured_checkerboard, transformed};

// ---------------------------------------------------------------------------
// Letterbox
// ---------------------------------------------------------------------------

#[test]
fn test_letterbox_pads_short_side() {
    let image = Array2::<f32>::from_elem((300, 600), 0.8);
    let lb = Letterbox::new(&image, 640);

    assert_eq!(lb.canvas.dim(), (640, 640));
    assert!((lb.scale - 640.0 / 600.0).abs() < 1e-12);
    assert_eq!(lb.pad_x, 0);
    assert_eq!(lb.pad_y, 160);
    assert_eq!(lb.canvas[[0, 320]], 0.0);
    assert!((lb.canvas[[320, 320]] - 0.8).abs() < 1e-6);
}

#[test]
fn test_letterbox_maps_back_to_original() {
    let image = Array2::<f32>::zeros((300, 600));
    let lb = Letterbox::new(&image, 640);

    let (x, y) = lb.to_original(320.0, 320.0).unwrap();
    assert!((x - 300.0).abs() < 1e-9);
    assert!((y - 150.0).abs() < 1e-9);
    assert!(lb.to_original(320.0, 100.0).is_none());
    assert!(lb.to_original(320.0, 620.0).is_none());
}

#[test]
fn test_zero_size_letterbox_is_empty() {
    let image = Array2::<f32>::from_elem((30, 40), 0.5);
    let lb = Letterbox::new(&image, 0);
    assert_eq!(lb.canvas.dim(), (0, 0));
    assert_eq!((lb.width, lb.height), (40, 30));
    assert!(lb.to_original(0.0, 0.0).is_none());
}

#[test]
fn test_patch_matcher_rejects_undersized_canvas() {
    let params = PatchCorrelationParams {
        canvas_size: 0,
        ..Default::default()
    };
    let matcher = PatchCorrelationMatcher::new(params, ComputeContext::cpu());
    let empty = Array2::<f32>::zeros((0, 0));
    assert!(matches!(
        matcher.match_pair(&empty, &empty),
        Err(TickTockError::Pipeline(_))
    ));
}

// ---------------------------------------------------------------------------
// Weights
// ---------------------------------------------------------------------------

#[test]
fn test_missing_weights_fail_fast() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("matcher.safetensors");
    match WeightsHandle::open(&path) {
        Err(TickTockError::WeightsUnavailable { path: p }) => assert_eq!(p, path),
        other => panic!("expected WeightsUnavailable, got {:?}", other),
    }
}

#[test]
fn test_empty_weights_are_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.bin");
    std::fs::write(&path, b"").unwrap();
    assert!(matches!(
        WeightsHandle::open(&path),
        Err(TickTockError::WeightsUnavailable { .. })
    ));
}

#[test]
fn test_weights_are_readable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("w.bin");
    std::fs::write(&path, [1u8, 2, 3, 4]).unwrap();

    let handle = WeightsHandle::open(&path).unwrap();
    assert_eq!(handle.size_bytes(), 4);
    assert_eq!(handle.path(), path.as_path());
    assert_eq!(handle.read().unwrap(), vec![1, 2, 3, 4]);
}

// ---------------------------------------------------------------------------
// Matchers
// ---------------------------------------------------------------------------

#[test]
fn test_patch_matcher_follows_translation() {
    let params = PatchCorrelationParams {
        canvas_size: 256,
        ..Default::default()
    };
    let matcher = PatchCorrelationMatcher::new(params, ComputeContext::cpu());
    let reference = textured_checkerboard(256, 256, 16);
    let target = transformed(&reference, &Homography::translation(8.0, -4.0));

    let matches = matcher.match_pair(&reference.data, &target.data).unwrap();
    let confident: Vec<&DenseMatch> = matches.iter().filter(|m| m.confidence > 0.1).collect();
    assert!(
        confident.len() >= 20,
        "confident matches={} should be >= 20",
        confident.len()
    );

    let consistent = confident
        .iter()
        .filter(|m| {
            (m.target.0 - m.reference.0 - 8.0).abs() <= 1.0
                && (m.target.1 - m.reference.1 + 4.0).abs() <= 1.0
        })
        .count();
    assert!(
        consistent * 10 >= confident.len() * 8,
        "{} of {} matches follow the shift",
        consistent,
        confident.len()
    );
}

#[test]
fn test_patch_matcher_rejects_wrong_canvas() {
    let matcher =
        PatchCorrelationMatcher::new(PatchCorrelationParams::default(), ComputeContext::cpu());
    let small = Array2::<f32>::zeros((100, 100));
    assert!(matches!(
        matcher.match_pair(&small, &small),
        Err(TickTockError::Pipeline(_))
    ));
}

/// Counts how many calls overlap in time.
struct OverlapCounter {
    context: ComputeContext,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl DenseMatcher for OverlapCounter {
    fn name(&self) -> &str {
        "overlap-counter"
    }

    fn context(&self) -> &ComputeContext {
        &self.context
    }

    fn canvas_size(&self) -> usize {
        8
    }

    fn match_pair(
        &self,
        _reference: &Array2<f32>,
        _target: &Array2<f32>,
    ) -> Result<Vec<DenseMatch>> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(std::time::Duration::from_millis(5));
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

#[test]
fn test_accelerator_matcher_is_serialized() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let matcher = SerializedMatcher::new(Box::new(OverlapCounter {
        context: ComputeContext {
            device: DevicePreference::Accelerator(0),
        },
        active: active.clone(),
        peak: peak.clone(),
    }));

    let canvas = Array2::<f32>::zeros((8, 8));
    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..5 {
                    matcher.match_pair(&canvas, &canvas).unwrap();
                }
            });
        }
    });

    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert_eq!(matcher.name(), "overlap-counter");
    assert_eq!(matcher.canvas_size(), 8);
}

#[test]
fn test_device_preference() {
    assert!(!ComputeContext::cpu().is_accelerator());
    assert!(ComputeContext {
        device: DevicePreference::Accelerator(2)
    }
    .is_accelerator());
    assert_eq!(DevicePreference::default(), DevicePreference::Cpu);
    assert_eq!(format!("{}", DevicePreference::Accelerator(1)), "accelerator:1");
}
