pub mod config;
pub mod footprint;
pub mod info;
pub mod reduce;
pub mod simulate;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use skymap_core::instrument::Instrument;
use skymap_core::io::ScanStreamReader;
use skymap_core::pipeline::config::ReductionConfig;
use skymap_core::scan::Scan;
use tracing::debug;

/// Read a TOML reduction config, or fall back to the defaults.
pub fn load_config(path: Option<&Path>) -> Result<ReductionConfig> {
    let Some(path) = path else {
        return Ok(ReductionConfig::default());
    };
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    ReductionConfig::from_toml(&contents)
        .with_context(|| format!("Invalid reduction config {}", path.display()))
}

/// Load every stream as one scan. All streams must come from the same
/// instrument; the first file's channel table is used.
pub fn load_scans(files: &[PathBuf]) -> Result<(Instrument, Vec<Scan>)> {
    let mut instrument: Option<Instrument> = None;
    let mut scans = Vec::with_capacity(files.len());
    for file in files {
        let reader = ScanStreamReader::open(file)
            .with_context(|| format!("Failed to open {}", file.display()))?;
        match &instrument {
            None => instrument = Some(reader.instrument()),
            Some(first) if first.channel_count() != reader.channels().len() => bail!(
                "{} has {} channels, expected {}",
                file.display(),
                reader.channels().len(),
                first.channel_count()
            ),
            Some(_) => {}
        }
        let scan = reader
            .read_scan()
            .with_context(|| format!("Failed to read frames of {}", file.display()))?;
        debug!(file = %file.display(), scan = %scan.id, frames = scan.frames(), "Loaded scan");
        scans.push(scan);
    }
    let instrument = instrument.context("No input streams given")?;
    Ok((instrument, scans))
}
