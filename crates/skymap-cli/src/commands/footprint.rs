use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use skymap_core::consts::{ARCSEC, DEFAULT_BEAM_SAMPLING, INDEX_ENTRY_BYTES};
use skymap_core::error::SkymapError;
use skymap_core::grid::{Gnomonic, Grid2D};
use skymap_core::reduce::ReductionEngine;
use skymap_core::source::sizing::search_corners;
use skymap_core::source::{MemoryBudget, PlaneLayout};

use super::{load_config, load_scans};

#[derive(Args)]
pub struct FootprintArgs {
    /// Input scan streams
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Reduction config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Pixel size in arcsec
    #[arg(long)]
    pub resolution: Option<f64>,

    /// Worker threads (default: one per core)
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,
}

/// Size the map the way a reduction would and report what it costs,
/// without allocating any planes.
pub fn run(args: &FootprintArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if args.resolution.is_some() {
        config.grid.resolution = args.resolution;
    }
    if args.threads.is_some() {
        config.threads = args.threads;
    }
    config.validate()?;

    let (instrument, mut scans) = load_scans(&args.files)?;
    let engine = ReductionEngine::new(config.thread_count())?;

    let Some(first) = scans.first() else {
        bail!("No scans to size");
    };
    let projection = Gnomonic::new(first.equatorial);
    let delta = config
        .grid
        .resolution
        .map(|arcsec| arcsec * ARCSEC)
        .unwrap_or(instrument.resolution / DEFAULT_BEAM_SAMPLING);

    let layout = PlaneLayout::plan(config.model, &instrument, &config.spectral)?;
    let bounds = search_corners(
        &mut scans,
        &instrument,
        &projection,
        layout.uses_channel_offsets(),
        config.grid.fixed_size,
        &engine,
    )?;
    let grid = Grid2D::from_bounds(projection, (delta, delta), &bounds.x, &bounds.y)?;

    let footprint = layout.footprint();
    let pixels = grid.pixels();
    let required = footprint.reduction_footprint(pixels, engine.threads());
    let samples: usize = scans.iter().map(|s| s.samples()).sum();
    let index_bytes = samples as u64 * INDEX_ENTRY_BYTES;

    println!("Model:       {} ({} plane(s))", config.model, layout.planes());
    println!(
        "Grid:        {}x{} pixels at {:.2}\"",
        grid.size_x,
        grid.size_y,
        delta / ARCSEC
    );
    println!(
        "Extent:      {:.1}\" x {:.1}\"",
        grid.size_x as f64 * delta / ARCSEC,
        grid.size_y as f64 * delta / ARCSEC
    );
    println!("Planes:      {:.1} MB", mb(footprint.plane_footprint(pixels)));
    println!("Base:        {:.1} MB", mb(footprint.base_footprint(pixels)));
    println!(
        "Reduction:   {:.1} MB with {} thread(s)",
        mb(required),
        engine.threads()
    );
    println!("Index cache: {:.1} MB for {} samples", mb(index_bytes), samples);

    let budget = MemoryBudget::from_config(&config.memory);
    match budget.check(&footprint, &grid, engine.threads(), &scans) {
        Ok(_) if config.memory.max_bytes.is_some() => {
            println!("Budget:      fits in {:.1} MB", mb(budget.available()));
        }
        Ok(_) => println!("Budget:      unlimited"),
        Err(SkymapError::InsufficientMemory(report)) => {
            println!("Budget:      {report}");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

fn mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
