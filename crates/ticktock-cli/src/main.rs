mod commands;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ticktock", about = "Register timelapse photographs onto a reference frame")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register every image in a directory and write aligned copies
    Align(commands::align::AlignArgs),
    /// Register a single target against a reference
    Register(commands::register::RegisterArgs),
    /// Report mean luminance and light condition of images
    Classify(commands::classify::ClassifyArgs),
    /// Print or save the default configuration
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Align(args) => commands::align::run(args),
        Commands::Register(args) => commands::register::run(args),
        Commands::Classify(args) => commands::classify::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
