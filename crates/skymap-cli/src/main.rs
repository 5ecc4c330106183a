mod commands;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "skymap", about = "Sky map reduction from telescope time streams")]
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
    /// Show scan stream metadata
    Info(commands::info::InfoArgs),
    /// Reduce scan streams into a source model
    Reduce(commands::reduce::ReduceArgs),
    /// Estimate the map size and memory a reduction would need
    Footprint(commands::footprint::FootprintArgs),
    /// Write a synthetic raster scan of a point source
    Simulate(commands::simulate::SimulateArgs),
    /// Print or save the default reduction config
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
        Commands::Info(args) => commands::info::run(args),
        Commands::Reduce(args) => commands::reduce::run(args),
        Commands::Footprint(args) => commands::footprint::run(args),
        Commands::Simulate(args) => commands::simulate::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
