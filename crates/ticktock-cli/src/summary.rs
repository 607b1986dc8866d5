use std::path::Path;

use console::Style;
use ticktock_core::pipeline::{MethodUsed, RegistrationConfig, RegistrationResult, ReportEntry};

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
    failed: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
            failed: Style::new().red().bold(),
        }
    }
}

fn rule(s: &Styles, width: usize) {
    println!("  {}", s.title.apply_to("\u{2550}".repeat(width)));
}

pub fn print_align_summary(
    config: &RegistrationConfig,
    input: &Path,
    output: &Path,
    reference: &Path,
    targets: usize,
    dense: Option<&str>,
) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("TickTock Registration"));
    rule(&s, 21);
    println!();

    println!("  {:<14}{}", s.label.apply_to("Input"), s.path.apply_to(input.display()));
    println!("  {:<14}{}", s.label.apply_to("Output"), s.path.apply_to(output.display()));
    println!(
        "  {:<14}{}",
        s.label.apply_to("Reference"),
        s.path.apply_to(reference.display())
    );
    println!("  {:<14}{}", s.label.apply_to("Targets"), s.value.apply_to(targets));
    println!();

    println!("  {}", s.header.apply_to("Strategy"));
    println!(
        "    {:<14}{}",
        s.label.apply_to("Mode"),
        s.method.apply_to(config.strategy)
    );
    match dense {
        Some(name) => println!("    {:<14}{}", s.label.apply_to("Dense"), s.method.apply_to(name)),
        None => println!("    {:<14}{}", s.label.apply_to("Dense"), s.disabled.apply_to("none")),
    }
    println!(
        "    {:<14}{}",
        s.label.apply_to("Low light"),
        s.value.apply_to(format!("mean < {}", config.low_light_threshold))
    );
    println!(
        "    {:<14}{}",
        s.label.apply_to("Ratio test"),
        s.value.apply_to(format!(
            "{} / {}",
            config.ratio_test_threshold, config.low_light_ratio_test_threshold
        ))
    );
    println!(
        "    {:<14}{}",
        s.label.apply_to("RANSAC"),
        s.value.apply_to(format!(
            "{} px, {} iterations",
            config.ransac_reprojection_threshold, config.ransac_max_iterations
        ))
    );
    println!();
}

pub fn print_batch_results(entries: &[ReportEntry], report: Option<&Path>) {
    let s = Styles::new();
    let registered = entries.iter().filter(|e| e.success).count();
    let total_time: f64 = entries.iter().map(|e| e.seconds).sum();

    println!();
    println!("  {}", s.header.apply_to("Results"));
    println!(
        "    {:<14}{}",
        s.label.apply_to("Registered"),
        s.value.apply_to(format!("{registered} / {}", entries.len()))
    );

    for method in [
        MethodUsed::Dense,
        MethodUsed::SparseGradient,
        MethodUsed::SparseBinary,
        MethodUsed::Template,
    ] {
        let count = entries.iter().filter(|e| e.method == method).count();
        if count > 0 {
            println!(
                "    {:<14}{}",
                s.label.apply_to(method),
                s.method.apply_to(count)
            );
        }
    }
    let failed = entries.len() - registered;
    if failed > 0 {
        println!(
            "    {:<14}{}",
            s.label.apply_to("Passthrough"),
            s.failed.apply_to(failed)
        );
    }
    println!(
        "    {:<14}{}",
        s.label.apply_to("Time"),
        s.value.apply_to(format!("{total_time:.1}s"))
    );
    if let Some(path) = report {
        println!("    {:<14}{}", s.label.apply_to("Report"), s.path.apply_to(path.display()));
    }
    println!();
}

pub fn print_registration(result: &RegistrationResult) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Registration"));
    rule(&s, 12);
    println!();

    let method_style = if result.is_registered() { &s.method } else { &s.failed };
    println!(
        "  {:<16}{}",
        s.label.apply_to("Method"),
        method_style.apply_to(result.method_used)
    );
    if let Some(detector) = result.detector {
        println!("  {:<16}{}", s.label.apply_to("Detector"), s.value.apply_to(detector));
    }
    println!(
        "  {:<16}{}",
        s.label.apply_to("Light"),
        s.value.apply_to(result.light_condition)
    );
    println!(
        "  {:<16}{}",
        s.label.apply_to("Matches"),
        s.value.apply_to(result.correspondence_count)
    );
    println!(
        "  {:<16}{}",
        s.label.apply_to("Inliers"),
        s.value.apply_to(format!(
            "{} ({:.0}%)",
            result.inlier_count,
            result.inlier_ratio() * 100.0
        ))
    );
    if let Some(correlation) = result.correlation {
        println!(
            "  {:<16}{}",
            s.label.apply_to("Correlation"),
            s.value.apply_to(format!("{correlation:.3}"))
        );
    }
    let quality = if result.quality_ok {
        s.method.apply_to("ok")
    } else {
        s.disabled.apply_to("low")
    };
    println!("  {:<16}{}", s.label.apply_to("Quality"), quality);

    let trace: Vec<String> = result.trace.iter().map(|st| st.to_string()).collect();
    println!("  {:<16}{}", s.label.apply_to("Trace"), trace.join(" > "));
    println!();

    match result.homography {
        Some(h) => {
            println!("  {}", s.header.apply_to("Homography"));
            for row in h.to_array() {
                println!("    {:>12.6} {:>12.6} {:>12.6}", row[0], row[1], row[2]);
            }
        }
        None => println!("  {}", s.failed.apply_to("No transform found")),
    }

    if !result.issues.is_empty() {
        println!();
        println!("  {}", s.header.apply_to("Issues"));
        for issue in &result.issues {
            println!("    - {}", s.disabled.apply_to(issue));
        }
    }
    println!();
}
