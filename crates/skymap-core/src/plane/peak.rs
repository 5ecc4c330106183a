use std::fmt;

use serde::{Deserialize, Serialize};

use crate::grid::{Grid2D, Offset2D, PixelIndex, SphericalCoordinates};

use super::accumulation::AccumulationPlane;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PeakKind {
    #[default]
    Max,
    Min,
    MaxDeviation,
}

impl fmt::Display for PeakKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Max => write!(f, "Maximum"),
            Self::Min => write!(f, "Minimum"),
            Self::MaxDeviation => write!(f, "Max deviation"),
        }
    }
}

/// A located extremum of the significance image.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Peak {
    pub index: PixelIndex,
    /// Tangent-plane offset of the peak (centroided when refined).
    pub offset: Offset2D,
    pub coords: SphericalCoordinates,
    pub value: f64,
    pub noise: f64,
    pub significance: f64,
    /// Integrated flux when the peak is a point source; the peak value until
    /// a beam correction is applied.
    pub flux: f64,
}

/// Find the valid pixel with the extreme significance of `kind`.
pub fn find_peak(plane: &AccumulationPlane, grid: &Grid2D, kind: PeakKind) -> Option<Peak> {
    let (sx, sy) = plane.dim();
    let mut best: Option<(PixelIndex, f64)> = None;

    for i in 0..sx {
        for j in 0..sy {
            if !plane.is_valid(i, j) {
                continue;
            }
            let s = plane.significance(i, j);
            let score = match kind {
                PeakKind::Max => s,
                PeakKind::Min => -s,
                PeakKind::MaxDeviation => s.abs(),
            };
            if best.is_none_or(|(_, b)| score > b) {
                best = Some((PixelIndex::new(i, j), score));
            }
        }
    }

    best.map(|(index, _)| {
        let offset = grid.index_to_offset(index.i as f64, index.j as f64);
        Peak {
            index,
            offset,
            coords: grid.projection.deproject(&offset),
            value: plane.value(index.i, index.j),
            noise: plane.noise(index.i, index.j),
            significance: plane.significance(index.i, index.j),
            flux: plane.value(index.i, index.j),
        }
    })
}

/// Refine `peak` to the |S/N|-weighted centroid of valid pixels within
/// `radius` (radians) of it.
pub fn centroid(plane: &AccumulationPlane, grid: &Grid2D, peak: &Peak, radius: f64) -> Peak {
    let (sx, sy) = plane.dim();
    let ri = (radius / grid.resolution.0).ceil() as usize;
    let rj = (radius / grid.resolution.1).ceil() as usize;

    let (mut sum_i, mut sum_j, mut sum_w) = (0.0, 0.0, 0.0);
    for i in peak.index.i.saturating_sub(ri)..(peak.index.i + ri + 1).min(sx) {
        for j in peak.index.j.saturating_sub(rj)..(peak.index.j + rj + 1).min(sy) {
            if !plane.is_valid(i, j) {
                continue;
            }
            let d = grid.index_to_offset(i as f64, j as f64);
            let dx = d.x - peak.offset.x;
            let dy = d.y - peak.offset.y;
            if dx.hypot(dy) > radius {
                continue;
            }
            let w = plane.significance(i, j).abs();
            sum_i += w * i as f64;
            sum_j += w * j as f64;
            sum_w += w;
        }
    }

    if sum_w <= 0.0 {
        return peak.clone();
    }
    let offset = grid.index_to_offset(sum_i / sum_w, sum_j / sum_w);
    Peak {
        offset,
        coords: grid.projection.deproject(&offset),
        ..peak.clone()
    }
}
