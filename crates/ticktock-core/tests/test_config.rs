use ticktock_core::dense::DevicePreference;
use ticktock_core::error::TickTockError;
use ticktock_core::pipeline::{MethodUsed, RegistrationConfig, RegistrationState, Strategy};

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

#[test]
fn test_default_values() {
    let c = RegistrationConfig::default();
    assert_eq!(c.strategy, Strategy::Auto);
    assert_eq!(c.low_light_threshold, 80.0);
    assert_eq!(c.ratio_test_threshold, 0.7);
    assert_eq!(c.low_light_ratio_test_threshold, 0.75);
    assert_eq!(c.min_correspondences, 8);
    assert_eq!(c.ransac_reprojection_threshold, 5.0);
    assert_eq!(c.low_light_reprojection_threshold, 3.0);
    assert_eq!(c.ransac_confidence, 0.995);
    assert_eq!(c.ransac_max_iterations, 5000);
    assert_eq!(c.template_scales, vec![0.8, 0.9, 1.0, 1.1, 1.2]);
    assert_eq!(c.template_min_correlation, 0.3);
    assert_eq!(c.dense.confidence_threshold, 0.1);
    assert_eq!(c.dense.patch.canvas_size, 640);
    assert_eq!(c.dense.device, DevicePreference::Cpu);
    assert!(c.seed.is_none());
    assert!(c.validate().is_ok());
}

#[test]
fn test_ratio_per_path() {
    let c = RegistrationConfig::default();
    assert_eq!(c.ratio_for(false), 0.7);
    assert_eq!(c.ratio_for(true), 0.75);
    assert_eq!(c.sparse_estimator(true).reprojection_threshold, 3.0);
    assert_eq!(c.sparse_estimator(false).reprojection_threshold, 5.0);
    assert_eq!(c.dense_estimator().reprojection_threshold, 8.0);
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

#[test]
fn test_toml_round_trip() {
    let mut c = RegistrationConfig::default();
    c.strategy = Strategy::TemplateOnly;
    c.seed = Some(99);
    c.dense.device = DevicePreference::Accelerator(1);

    let text = toml::to_string_pretty(&c).unwrap();
    let back: RegistrationConfig = toml::from_str(&text).unwrap();
    assert_eq!(back.strategy, Strategy::TemplateOnly);
    assert_eq!(back.seed, Some(99));
    assert_eq!(back.dense.device, DevicePreference::Accelerator(1));
    assert_eq!(back.features.sift.max_features, c.features.sift.max_features);
}

#[test]
fn test_partial_toml_uses_defaults() {
    let text = r#"
strategy = "Sparse"
min_correspondences = 12

[enhance]
gamma = 2.0

[features.orb]
max_features = 500
"#;
    let c: RegistrationConfig = toml::from_str(text).unwrap();
    assert_eq!(c.strategy, Strategy::Sparse);
    assert_eq!(c.min_correspondences, 12);
    assert_eq!(c.enhance.gamma, 2.0);
    assert_eq!(c.enhance.clahe.clip_limit, 3.0);
    assert_eq!(c.features.orb.max_features, 500);
    assert_eq!(c.features.orb.levels, 8);
    assert_eq!(c.ransac_max_iterations, 5000);
}

#[test]
fn test_json_round_trip() {
    let c = RegistrationConfig::default();
    let json = serde_json::to_string(&c).unwrap();
    let back: RegistrationConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back.template_scales, c.template_scales);
    assert_eq!(back.template.working_size, c.template.working_size);
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn assert_invalid(c: &RegistrationConfig) {
    match c.validate() {
        Err(TickTockError::InvalidConfig(_)) => {}
        other => panic!("expected InvalidConfig, got {:?}", other),
    }
}

#[test]
fn test_validate_rejects_bad_ratio() {
    let mut c = RegistrationConfig::default();
    c.ratio_test_threshold = 1.5;
    assert_invalid(&c);
}

#[test]
fn test_validate_rejects_small_minimum() {
    let mut c = RegistrationConfig::default();
    c.min_correspondences = 3;
    assert_invalid(&c);
}

#[test]
fn test_validate_rejects_bad_confidence() {
    let mut c = RegistrationConfig::default();
    c.ransac_confidence = 1.0;
    assert_invalid(&c);
}

#[test]
fn test_validate_rejects_empty_scales() {
    let mut c = RegistrationConfig::default();
    c.template_scales.clear();
    assert_invalid(&c);
}

#[test]
fn test_validate_rejects_zero_dense_canvas() {
    let mut c = RegistrationConfig::default();
    c.dense.patch.canvas_size = 0;
    assert_invalid(&c);
}

#[test]
fn test_validate_rejects_zero_grid_step() {
    let mut c = RegistrationConfig::default();
    c.dense.patch.grid_step = 0;
    assert_invalid(&c);
}

#[test]
fn test_validate_rejects_zero_working_size() {
    let mut c = RegistrationConfig::default();
    c.template.working_size = 0;
    assert_invalid(&c);
}

#[test]
fn test_validate_rejects_bad_template_correlation() {
    let mut c = RegistrationConfig::default();
    c.template_min_correlation = 1.5;
    assert_invalid(&c);
    c.template_min_correlation = f64::NAN;
    assert_invalid(&c);
}

#[test]
fn test_validate_rejects_bad_dense_confidence() {
    let mut c = RegistrationConfig::default();
    c.dense.confidence_threshold = 2.0;
    assert_invalid(&c);
}

#[test]
fn test_zero_canvas_from_toml_is_rejected() {
    let c: RegistrationConfig = toml::from_str("[dense.patch]\ncanvas_size = 0\n").unwrap();
    assert_invalid(&c);
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

#[test]
fn test_strategy_display() {
    assert_eq!(format!("{}", Strategy::Auto), "auto");
    assert_eq!(format!("{}", Strategy::TemplateOnly), "template");
}

#[test]
fn test_method_display() {
    assert_eq!(format!("{}", MethodUsed::SparseGradient), "Sparse (gradient)");
    assert_eq!(format!("{}", MethodUsed::None), "None");
}

#[test]
fn test_state_display() {
    assert_eq!(format!("{}", RegistrationState::FallbackTemplate), "FALLBACK_TEMPLATE");
    assert_eq!(format!("{}", RegistrationState::Done), "DONE");
}
