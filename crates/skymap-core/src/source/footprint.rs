use std::fmt;

use serde::Serialize;
use tracing::{debug, error};

use crate::consts::{BASE_PIXEL_FOOTPRINT, PLANE_PIXEL_FOOTPRINT};
use crate::error::{Result, SkymapError};
use crate::grid::{Grid2D, SphericalCoordinates};
use crate::pipeline::config::MemoryConfig;
use crate::plane::stats;
use crate::scan::Scan;

/// Bytes per map pixel of a source model, known before any allocation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FootprintModel {
    /// Bytes of accumulation planes per pixel (all planes together).
    pub pixel_footprint: f64,
    /// Bytes of base images per pixel.
    pub base_bytes_per_pixel: u64,
}

impl FootprintModel {
    pub fn new(pixel_footprint: f64, base_bytes_per_pixel: u64) -> Self {
        Self {
            pixel_footprint,
            base_bytes_per_pixel,
        }
    }

    pub fn for_planes(planes: usize) -> Self {
        Self::new(
            planes as f64 * PLANE_PIXEL_FOOTPRINT,
            planes as u64 * BASE_PIXEL_FOOTPRINT,
        )
    }

    // All byte counts saturate at u64::MAX, which no budget accepts.

    pub fn base_footprint(&self, pixels: usize) -> u64 {
        self.base_bytes_per_pixel.saturating_mul(pixels as u64)
    }

    pub fn plane_footprint(&self, pixels: usize) -> u64 {
        // float-to-int casts saturate
        (self.pixel_footprint * pixels as f64).ceil() as u64
    }

    /// Peak bytes during a reduction with `threads` workers: the master and
    /// one partial copy per worker (planes plus base), plus the shared base.
    pub fn reduction_footprint(&self, pixels: usize, threads: usize) -> u64 {
        let per_copy = self
            .plane_footprint(pixels)
            .saturating_add(self.base_footprint(pixels));
        (threads as u64)
            .saturating_add(1)
            .saturating_mul(per_copy)
            .saturating_add(self.base_footprint(pixels))
    }
}

/// Memory available to a reduction job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryBudget {
    pub max_available: u64,
    pub used: u64,
}

impl MemoryBudget {
    pub fn from_config(config: &MemoryConfig) -> Self {
        Self {
            max_available: config.max_bytes.unwrap_or(u64::MAX),
            used: config.reserved_bytes,
        }
    }

    pub fn available(&self) -> u64 {
        self.max_available.saturating_sub(self.used)
    }

    /// Verify that a map of `grid`'s size fits, before allocating it.
    /// Returns the required byte count.
    pub fn check(
        &self,
        footprint: &FootprintModel,
        grid: &Grid2D,
        threads: usize,
        scans: &[Scan],
    ) -> Result<u64> {
        let required = footprint.reduction_footprint(grid.pixels(), threads);
        let available = self.available();
        debug!(
            size_x = grid.size_x,
            size_y = grid.size_y,
            required,
            available,
            "Memory footprint"
        );
        if required < u64::MAX && required <= available {
            return Ok(required);
        }

        let report = MemoryReport::diagnose(grid, required, available, scans);
        error!(required, available, "Map does not fit in memory");
        Err(SkymapError::InsufficientMemory(Box::new(report)))
    }
}

/// Why a map could not be allocated, with likely culprits.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MemoryReport {
    pub size_x: usize,
    pub size_y: usize,
    pub required: u64,
    pub available: u64,
    /// Scans whose reference lies far from the others.
    pub outliers: Vec<String>,
    /// Scans that cover an unexpectedly large area.
    pub slewing: Vec<String>,
    pub hint: Option<String>,
}

impl MemoryReport {
    pub fn diagnose(grid: &Grid2D, required: u64, available: u64, scans: &[Scan]) -> Self {
        let threshold = 0.5 * grid.diagonal();

        let mut outliers = Vec::new();
        let mut lon: Vec<f64> = scans.iter().map(|s| s.equatorial.lon).collect();
        let mut lat: Vec<f64> = scans.iter().map(|s| s.equatorial.lat).collect();
        if let (Some(lon), Some(lat)) = (stats::median(&mut lon), stats::median(&mut lat)) {
            let median = SphericalCoordinates::new(lon, lat);
            for scan in scans {
                let distance = scan.equatorial.distance_to(&median);
                if distance > threshold {
                    outliers.push(scan.id.clone());
                }
            }
        }

        let slewing = scans
            .iter()
            .filter(|s| s.x_range.span().hypot(s.y_range.span()) > threshold)
            .map(|s| s.id.clone())
            .collect::<Vec<_>>();

        let hint = (outliers.is_empty() && slewing.is_empty()).then(|| {
            "no outlier or slewing scans found; check for mis-located channels \
             or an unsuitable grid resolution"
                .to_string()
        });

        Self {
            size_x: grid.size_x,
            size_y: grid.size_y,
            required,
            available,
            outliers,
            slewing,
            hint,
        }
    }
}

impl fmt::Display for MemoryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Insufficient memory for a {}x{} map: {:.1} MB required, {:.1} MB available",
            self.size_x,
            self.size_y,
            self.required as f64 / 1e6,
            self.available as f64 / 1e6
        )?;
        if !self.outliers.is_empty() {
            write!(f, "; far from the others: {}", self.outliers.join(", "))?;
        }
        if !self.slewing.is_empty() {
            write!(f, "; slewing scans: {}", self.slewing.join(", "))?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "; {hint}")?;
        }
        Ok(())
    }
}
