use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use console::Style;
use ticktock_core::classify::{classify_mean, LightCondition};
use ticktock_core::consts::DEFAULT_LOW_LIGHT_THRESHOLD;
use ticktock_core::io::load_image;

use super::file_label;

#[derive(Args)]
pub struct ClassifyArgs {
    /// Image files to classify
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Mean luminance (0-255) below which an image is low-light
    #[arg(long, default_value_t = DEFAULT_LOW_LIGHT_THRESHOLD)]
    pub threshold: f32,
}

pub fn run(args: &ClassifyArgs) -> Result<()> {
    let normal = Style::new().green();
    let low = Style::new().yellow();

    for path in &args.files {
        let image = load_image(path).with_context(|| format!("Failed to load {}", path.display()))?;
        let mean = image.to_mono().mean_8bit();
        let condition = classify_mean(mean, args.threshold);
        let style = match condition {
            LightCondition::Normal => &normal,
            LightCondition::LowLight => &low,
        };
        println!(
            "{:<32} mean {:>6.1}  {}",
            file_label(path),
            mean,
            style.apply_to(condition)
        );
    }
    Ok(())
}
