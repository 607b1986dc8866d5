use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::warn;
use ticktock_core::dense::{ComputeContext, PatchCorrelationMatcher};
use ticktock_core::io::{collect_image_files, load_image, save_image, split_reference};
use ticktock_core::pipeline::{write_report, ReferenceFeatures, Registrar, ReportEntry};
use ticktock_core::warp::{passthrough, warp_image};

use super::{file_label, load_config, StrategyArg};
use crate::summary::{print_align_summary, print_batch_results};

#[derive(Args)]
pub struct AlignArgs {
    /// Directory of images to register
    pub input: PathBuf,

    /// Directory for the aligned images
    #[arg(short, long)]
    pub output: PathBuf,

    /// Index of the reference image in name order
    #[arg(long, default_value = "0")]
    pub reference: usize,

    /// Registration config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the configured strategy
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Use the built-in patch-correlation dense matcher
    #[arg(long)]
    pub dense: bool,

    /// Markdown report path (default: <output>/report.md)
    #[arg(long)]
    pub report: Option<PathBuf>,
}

pub fn run(args: &AlignArgs) -> Result<()> {
    let mut config = load_config(args.config.as_ref())?;
    if let Some(strategy) = args.strategy {
        config.strategy = strategy.into();
    }

    let files = collect_image_files(&args.input, Some(&args.output))
        .with_context(|| format!("Failed to scan {}", args.input.display()))?;
    let (reference_path, targets) = split_reference(&files, args.reference)
        .with_context(|| format!("No usable reference in {}", args.input.display()))?;

    let mut registrar = Registrar::new(config.clone());
    let mut dense_name = None;
    if args.dense {
        let matcher = PatchCorrelationMatcher::new(config.dense.patch.clone(), ComputeContext {
            device: config.dense.device,
        });
        dense_name = Some("patch-correlation");
        registrar = registrar.with_dense_matcher(Box::new(matcher));
    }

    print_align_summary(
        registrar.config(),
        &args.input,
        &args.output,
        reference_path,
        targets.len(),
        dense_name,
    );

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;

    let reference = load_image(reference_path)
        .with_context(|| format!("Failed to load reference {}", reference_path.display()))?;
    let (width, height) = (reference.width(), reference.height());
    let reference_out = output_path(&args.input, &args.output, reference_path);
    if let Some(parent) = reference_out.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(reference_path, &reference_out)
        .with_context(|| format!("Failed to write {}", reference_out.display()))?;
    let prepared = registrar.prepare_reference(&reference.to_mono());

    let pb = ProgressBar::new(targets.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg:20} [{bar:40}] {pos}/{len}")?
            .progress_chars("=> "),
    );
    pb.set_message("Registering");

    let outcomes: Vec<Option<ReportEntry>> = targets
        .par_iter()
        .map(|path| {
            let entry = match align_one(&registrar, &prepared, args, path, width, height) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Skipping image");
                    None
                }
            };
            pb.inc(1);
            entry
        })
        .collect();
    pb.finish_with_message("Done");

    let entries: Vec<ReportEntry> = outcomes.into_iter().flatten().collect();
    let report_path = args
        .report
        .clone()
        .unwrap_or_else(|| args.output.join("report.md"));
    write_report(&report_path, &entries)
        .with_context(|| format!("Failed to write report {}", report_path.display()))?;

    print_batch_results(&entries, Some(&report_path));
    Ok(())
}

/// Register, warp and save one target. Unregistered targets are written
/// resized to the reference so the output sequence keeps every frame.
fn align_one(
    registrar: &Registrar,
    prepared: &ReferenceFeatures,
    args: &AlignArgs,
    path: &Path,
    width: usize,
    height: usize,
) -> Result<ReportEntry> {
    let start = Instant::now();
    let image = load_image(path).with_context(|| format!("Failed to load {}", path.display()))?;
    let result = registrar.register_prepared(prepared, &image.to_mono());

    let aligned = match &result.homography {
        Some(h) => match warp_image(&image, h, width, height) {
            Ok(warped) => warped,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Warp failed, passing through");
                passthrough(&image, width, height)
            }
        },
        None => passthrough(&image, width, height),
    };

    let out = output_path(&args.input, &args.output, path);
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)?;
    }
    save_image(&aligned, &out).with_context(|| format!("Failed to write {}", out.display()))?;

    let label = path
        .strip_prefix(&args.input)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| file_label(path));
    Ok(ReportEntry::from_result(
        label,
        &result,
        start.elapsed().as_secs_f64(),
    ))
}

/// Mirror `path` from the input tree into the output tree.
fn output_path(input: &Path, output: &Path, path: &Path) -> PathBuf {
    match path.strip_prefix(input) {
        Ok(relative) => output.join(relative),
        Err(_) => output.join(file_label(path)),
    }
}
