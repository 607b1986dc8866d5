use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use ticktock_core::io::{load_image, save_image};
use ticktock_core::pipeline::register;
use ticktock_core::warp::{passthrough, warp_image};

use super::{load_config, StrategyArg};
use crate::summary::print_registration;

#[derive(Args)]
pub struct RegisterArgs {
    /// Reference image
    pub reference: PathBuf,

    /// Image to register onto the reference
    pub target: PathBuf,

    /// Write the aligned target here
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Registration config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the configured strategy
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Print the result as JSON instead of a summary
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &RegisterArgs) -> Result<()> {
    let mut config = load_config(args.config.as_ref())?;
    if let Some(strategy) = args.strategy {
        config.strategy = strategy.into();
    }

    let reference = load_image(&args.reference)
        .with_context(|| format!("Failed to load {}", args.reference.display()))?;
    let target = load_image(&args.target)
        .with_context(|| format!("Failed to load {}", args.target.display()))?;

    let result = register(&reference, &target, &config);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_registration(&result);
    }

    if let Some(ref out) = args.output {
        let (w, h) = (reference.width(), reference.height());
        let aligned = match &result.homography {
            Some(homography) => warp_image(&target, homography, w, h)?,
            None => passthrough(&target, w, h),
        };
        save_image(&aligned, out).with_context(|| format!("Failed to write {}", out.display()))?;
        println!("Aligned image saved to {}", out.display());
    }

    Ok(())
}
