mod common;

use ticktock_core::classify::LightCondition;
use ticktock_core::pipeline::{
    render_markdown, write_report, MethodUsed, RegistrationConfig, Registrar, ReportEntry, Strategy,
};

use common::uniform_frame;

fn entry(file: &str, condition: LightCondition, method: MethodUsed, success: bool) -> ReportEntry {
    ReportEntry {
        file: file.to_string(),
        condition,
        method,
        correspondences: if success { 120 } else { 0 },
        inliers: if success { 90 } else { 0 },
        seconds: 0.5,
        success,
    }
}

fn sample() -> Vec<ReportEntry> {
    vec![
        entry("a.jpg", LightCondition::Normal, MethodUsed::SparseGradient, true),
        entry("b.jpg", LightCondition::LowLight, MethodUsed::SparseBinary, true),
        entry("c.jpg", LightCondition::LowLight, MethodUsed::Template, true),
        entry("d.jpg", LightCondition::Normal, MethodUsed::None, false),
    ]
}

#[test]
fn test_summary_counts() {
    let md = render_markdown(&sample());
    assert!(md.starts_with("# Registration report"));
    assert!(md.contains("- Images: 4"), "{}", md);
    assert!(md.contains("- Registered: 3 (75.0%)"), "{}", md);
    assert!(md.contains("- Failed: 1"), "{}", md);
    assert!(md.contains("- Total time: 2.00s"), "{}", md);
}

#[test]
fn test_breakdowns() {
    let md = render_markdown(&sample());
    assert!(md.contains("## By method"));
    assert!(md.contains("| Sparse (binary) | 1 | 100.0% | 0.500 |"), "{}", md);
    assert!(md.contains("| None | 1 | 0.0% | 0.500 |"), "{}", md);
    assert!(md.contains("## By light condition"));
    assert!(md.contains("| Low light | 2 | 2 | 100.0% |"), "{}", md);
    assert!(md.contains("| Normal | 2 | 1 | 50.0% |"), "{}", md);
}

#[test]
fn test_details_rows_keep_input_order() {
    let md = render_markdown(&sample());
    let a = md.find("| a.jpg |").unwrap();
    let d = md.find("| d.jpg |").unwrap();
    assert!(a < d);
    assert!(md.contains("| d.jpg | Normal | None | 0 | 0 | 0.500 | failed |"), "{}", md);
}

#[test]
fn test_empty_batch() {
    let md = render_markdown(&[]);
    assert!(md.contains("- Images: 0"));
    assert!(md.contains("- Registered: 0 (0.0%)"));
}

#[test]
fn test_write_report_creates_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.md");
    write_report(&path, &sample()).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text, render_markdown(&sample()));
}

#[test]
fn test_entry_from_failed_result() {
    let config = RegistrationConfig {
        strategy: Strategy::TemplateOnly,
        ..Default::default()
    };
    let blank = uniform_frame(64, 48, 0.5);
    let result = Registrar::new(config).register(&blank, &blank);

    let e = ReportEntry::from_result("blank.png", &result, 0.25);
    assert_eq!(e.file, "blank.png");
    assert_eq!(e.method, MethodUsed::None);
    assert_eq!(e.condition, LightCondition::Normal);
    assert!(!e.success);
    assert_eq!(e.seconds, 0.25);
}
