use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use skymap_core::consts::{ARCSEC, DEGREE};
use skymap_core::io::write_model;
use skymap_core::pipeline::config::{ModelKind, PointingConfig, ReductionConfig, SmoothingSpec};
use skymap_core::pipeline::run_reduction_with_reporter;
use skymap_core::pipeline::types::{ProgressReporter, ReductionStage};

use super::{load_config, load_scans};
use crate::summary::print_reduction_summary;

#[derive(Clone, ValueEnum)]
pub enum ModelArg {
    Scalar,
    Pixel,
    Spectral,
}

#[derive(Args)]
pub struct ReduceArgs {
    /// Input scan streams
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Reduction config file (TOML); flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Source model type
    #[arg(long, value_enum)]
    pub model: Option<ModelArg>,

    /// Number of accumulate/sync rounds
    #[arg(long)]
    pub rounds: Option<usize>,

    /// Worker threads (default: one per core)
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,

    /// Pixel size in arcsec
    #[arg(long)]
    pub resolution: Option<f64>,

    /// Smoothing FWHM in arcsec
    #[arg(long)]
    pub smooth: Option<f64>,

    /// Locate the brightest source after the last round
    #[arg(long)]
    pub pointing: bool,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Base name of the written planes
    #[arg(long, default_value = "skymap")]
    pub name: String,
}

pub fn run(args: &ReduceArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, args);
    config.validate().context("Invalid reduction settings")?;

    let (instrument, mut scans) = load_scans(&args.files)?;
    print_reduction_summary(&config, &instrument, &args.files);

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{prefix:>9} {msg:20} [{bar:40}] {pos}/{len}")?
            .progress_chars("=> "),
    );
    let reporter = Arc::new(BarReporter { pb: pb.clone() });

    let output = run_reduction_with_reporter(&mut scans, &instrument, &config, reporter)?;
    pb.finish_with_message("Done");

    println!();
    println!(
        "Reduced {} scan(s) in {} round(s), {} samples in the last round",
        scans.len(),
        output.rounds,
        output.contributions
    );
    if let Some(peak) = &output.pointing {
        println!(
            "Source at {:.5}, {:+.5} deg (offset {:+.2}\", {:+.2}\"), S/N {:.1}",
            peak.coords.lon / DEGREE,
            peak.coords.lat / DEGREE,
            peak.offset.x / ARCSEC,
            peak.offset.y / ARCSEC,
            peak.significance
        );
    } else if config.pointing.is_some() {
        println!("No significant source found");
    }

    let written = write_model(&output.model, &args.output, &args.name)
        .with_context(|| format!("Failed to write planes to {}", args.output.display()))?;
    if written.is_empty() {
        println!("Source model is empty, nothing written");
    } else {
        println!(
            "\n{} file(s) saved to {}",
            written.len(),
            args.output.display()
        );
    }

    Ok(())
}

fn apply_overrides(config: &mut ReductionConfig, args: &ReduceArgs) {
    if let Some(ref model) = args.model {
        config.model = match model {
            ModelArg::Scalar => ModelKind::Scalar,
            ModelArg::Pixel => ModelKind::Pixel,
            ModelArg::Spectral => ModelKind::Spectral,
        };
    }
    if let Some(rounds) = args.rounds {
        config.rounds = rounds;
    }
    if args.threads.is_some() {
        config.threads = args.threads;
    }
    if let Some(resolution) = args.resolution {
        config.grid.resolution = Some(resolution);
    }
    if let Some(fwhm) = args.smooth {
        config.smoothing = Some(SmoothingSpec::Fwhm(fwhm));
    }
    if args.pointing && config.pointing.is_none() {
        config.pointing = Some(PointingConfig::default());
    }
}

/// Drives one progress bar through every stage of every round.
struct BarReporter {
    pb: ProgressBar,
}

impl ProgressReporter for BarReporter {
    fn begin_stage(&self, stage: ReductionStage, total_items: Option<usize>) {
        self.pb.set_message(stage.to_string());
        self.pb.set_length(total_items.unwrap_or(1) as u64);
        self.pb.set_position(0);
    }

    fn advance(&self, items_done: usize) {
        self.pb.inc(items_done as u64);
    }

    fn finish_stage(&self) {
        if let Some(len) = self.pb.length() {
            self.pb.set_position(len);
        }
    }

    fn begin_round(&self, round: usize, rounds: usize) {
        self.pb.set_prefix(format!("Round {round}/{rounds}"));
    }
}
