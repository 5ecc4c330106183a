use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use ndarray::Array2;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::consts::{ARCSEC, DEGREE};
use crate::error::{Result, SkymapError};
use crate::plane::AccumulationPlane;
use crate::source::SourceModel;

const LAYER_SUFFIXES: [&str; 6] = [
    ".value.f64",
    ".noise.f64",
    ".significance.f64",
    ".exposure.f64",
    ".flag.u8",
    ".toml",
];

/// Sidecar describing one written plane. Raw arrays are little-endian,
/// row-major over `(size_x, size_y)`.
#[derive(Clone, Debug, Serialize)]
pub struct PlaneHeader {
    pub name: String,
    pub plane: String,
    pub size_x: usize,
    pub size_y: usize,
    pub resolution_arcsec: [f64; 2],
    pub ref_index: [f64; 2],
    pub reference_deg: [f64; 2],
    pub generation: u32,
    pub points: usize,
    pub integration_time: f64,
    pub smooth_fwhm_arcsec: f64,
    pub ext_filter_fwhm_arcsec: Option<f64>,
    pub filter_blanking: Option<f64>,
    pub filter_correction: f64,
    pub clipping_s2n: Option<f64>,
    pub layers: Vec<String>,
}

/// Write every plane of `model` into `dir` as `<name>.<plane>.<layer>`.
///
/// An empty model writes nothing and removes files left by earlier runs.
pub fn write_model(model: &SourceModel, dir: &Path, name: &str) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    if model.is_empty() {
        let removed = remove_stale(dir, name)?;
        warn!(removed, "Source model is empty, nothing written");
        return Ok(Vec::new());
    }

    let grid = model.grid();
    let reference = grid.projection.reference();
    let mut written = Vec::new();

    for (p, plane) in model.planes().iter().enumerate() {
        let label = model.plane_label(p);
        let stem = dir.join(format!("{name}.{label}"));

        let layers = [
            ("value", plane.value_map()),
            ("noise", plane.noise_map()),
            ("significance", plane.significance_map()),
            ("exposure", plane.exposure().clone()),
        ];
        let mut layer_names = Vec::new();
        for (layer, data) in &layers {
            let path = with_suffix(&stem, &format!(".{layer}.f64"));
            write_f64(&path, data)?;
            layer_names.push(layer.to_string());
            written.push(path);
        }
        let flag_path = with_suffix(&stem, ".flag.u8");
        write_flags(&flag_path, plane)?;
        layer_names.push("flag".to_string());
        written.push(flag_path);

        let header = PlaneHeader {
            name: name.to_string(),
            plane: label,
            size_x: grid.size_x,
            size_y: grid.size_y,
            resolution_arcsec: [grid.resolution.0 / ARCSEC, grid.resolution.1 / ARCSEC],
            ref_index: [grid.ref_index.0, grid.ref_index.1],
            reference_deg: [reference.lon / DEGREE, reference.lat / DEGREE],
            generation: model.generation(),
            points: plane.count_points(),
            integration_time: plane.integration_time,
            smooth_fwhm_arcsec: plane.beam.smooth_fwhm / ARCSEC,
            ext_filter_fwhm_arcsec: plane.beam.ext_filter_fwhm.map(|f| f / ARCSEC),
            filter_blanking: plane.beam.filter_blanking,
            filter_correction: plane.beam.filter_correction,
            clipping_s2n: plane.beam.clipping_s2n,
            layers: layer_names,
        };
        let text = toml::to_string_pretty(&header)
            .map_err(|e| SkymapError::Serialization(e.to_string()))?;
        let header_path = with_suffix(&stem, ".toml");
        fs::write(&header_path, text)?;
        written.push(header_path);
    }

    info!(files = written.len(), dir = %dir.display(), "Source model written");
    Ok(written)
}

fn with_suffix(stem: &Path, suffix: &str) -> PathBuf {
    let mut s = stem.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

fn write_f64(path: &Path, data: &Array2<f64>) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    for &v in data.iter() {
        w.write_all(&v.to_le_bytes())?;
    }
    w.flush()?;
    Ok(())
}

fn write_flags(path: &Path, plane: &AccumulationPlane) -> Result<()> {
    let bytes: Vec<u8> = plane.flag().iter().copied().collect();
    fs::write(path, bytes)?;
    Ok(())
}

/// Remove outputs of a previous run for `name`.
fn remove_stale(dir: &Path, name: &str) -> Result<usize> {
    let prefix = format!("{name}.");
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if file_name.starts_with(&prefix) && LAYER_SUFFIXES.iter().any(|s| file_name.ends_with(s))
        {
            fs::remove_file(entry.path())?;
            debug!(file = file_name, "Removed stale output");
            removed += 1;
        }
    }
    Ok(removed)
}
