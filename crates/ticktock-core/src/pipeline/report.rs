use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use serde::Serialize;

use crate::classify::LightCondition;
use crate::error::Result;

use super::types::{MethodUsed, RegistrationResult};

/// One row of a batch report.
#[derive(Clone, Debug, Serialize)]
pub struct ReportEntry {
    pub file: String,
    pub condition: LightCondition,
    pub method: MethodUsed,
    pub correspondences: usize,
    pub inliers: usize,
    pub seconds: f64,
    pub success: bool,
}

impl ReportEntry {
    pub fn from_result(file: impl Into<String>, result: &RegistrationResult, seconds: f64) -> Self {
        Self {
            file: file.into(),
            condition: result.light_condition,
            method: result.method_used,
            correspondences: result.correspondence_count,
            inliers: result.inlier_count,
            seconds,
            success: result.is_registered(),
        }
    }
}

#[derive(Default)]
struct Tally {
    total: usize,
    succeeded: usize,
    seconds: f64,
}

impl Tally {
    fn add(&mut self, entry: &ReportEntry) {
        self.total += 1;
        self.seconds += entry.seconds;
        if entry.success {
            self.succeeded += 1;
        }
    }

    fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            100.0 * self.succeeded as f64 / self.total as f64
        }
    }

    fn mean_seconds(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.seconds / self.total as f64
        }
    }
}

/// Markdown summary of a batch: totals, per-method and per-condition
/// breakdowns, then one row per file.
pub fn render_markdown(entries: &[ReportEntry]) -> String {
    let mut overall = Tally::default();
    let mut by_method: BTreeMap<String, Tally> = BTreeMap::new();
    let mut by_condition: BTreeMap<String, Tally> = BTreeMap::new();
    for entry in entries {
        overall.add(entry);
        by_method.entry(entry.method.to_string()).or_default().add(entry);
        by_condition
            .entry(entry.condition.to_string())
            .or_default()
            .add(entry);
    }

    let mut out = String::new();
    let _ = writeln!(out, "# Registration report\n");
    let _ = writeln!(out, "- Images: {}", overall.total);
    let _ = writeln!(
        out,
        "- Registered: {} ({:.1}%)",
        overall.succeeded,
        overall.success_rate()
    );
    let _ = writeln!(out, "- Failed: {}", overall.total - overall.succeeded);
    let _ = writeln!(out, "- Total time: {:.2}s\n", overall.seconds);

    let _ = writeln!(out, "## By method\n");
    let _ = writeln!(out, "| Method | Images | Success rate | Mean time (s) |");
    let _ = writeln!(out, "|---|---:|---:|---:|");
    for (method, tally) in &by_method {
        let _ = writeln!(
            out,
            "| {method} | {} | {:.1}% | {:.3} |",
            tally.total,
            tally.success_rate(),
            tally.mean_seconds()
        );
    }

    let _ = writeln!(out, "\n## By light condition\n");
    let _ = writeln!(out, "| Condition | Images | Registered | Success rate |");
    let _ = writeln!(out, "|---|---:|---:|---:|");
    for (condition, tally) in &by_condition {
        let _ = writeln!(
            out,
            "| {condition} | {} | {} | {:.1}% |",
            tally.total,
            tally.succeeded,
            tally.success_rate()
        );
    }

    let _ = writeln!(out, "\n## Details\n");
    let _ = writeln!(
        out,
        "| File | Condition | Method | Correspondences | Inliers | Time (s) | Status |"
    );
    let _ = writeln!(out, "|---|---|---|---:|---:|---:|---|");
    for e in entries {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} | {:.3} | {} |",
            e.file,
            e.condition,
            e.method,
            e.correspondences,
            e.inliers,
            e.seconds,
            if e.success { "ok" } else { "failed" }
        );
    }
    out
}

pub fn write_report(path: &Path, entries: &[ReportEntry]) -> Result<()> {
    std::fs::write(path, render_markdown(entries))?;
    Ok(())
}
