use std::fmt;

use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_MIN_NEIGHBORS, PARALLEL_PIXEL_THRESHOLD};

use super::accumulation::{pixel_flags, AccumulationPlane};
use super::ops::{neighbours4, neighbours8};

/// Which side(s) of zero the significance test applies to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlankingSign {
    #[default]
    Both,
    Positive,
    Negative,
}

impl fmt::Display for BlankingSign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Both => write!(f, "Both"),
            Self::Positive => write!(f, "Positive"),
            Self::Negative => write!(f, "Negative"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    #[default]
    Four,
    Eight,
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Four => write!(f, "4-connected"),
            Self::Eight => write!(f, "8-connected"),
        }
    }
}

/// Decides which valid pixels are masked as bright source.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaskRule {
    /// Significance level; `None` or NaN disables the significance test.
    pub level: Option<f64>,
    pub sign: BlankingSign,
    pub min_neighbors: usize,
    pub connectivity: Connectivity,
}

impl Default for MaskRule {
    fn default() -> Self {
        Self {
            level: None,
            sign: BlankingSign::Both,
            min_neighbors: DEFAULT_MIN_NEIGHBORS,
            connectivity: Connectivity::Four,
        }
    }
}

impl MaskRule {
    pub fn exceeds(&self, significance: f64) -> bool {
        let Some(level) = self.level.filter(|l| !l.is_nan()) else {
            return false;
        };
        match self.sign {
            BlankingSign::Both => significance.abs() > level,
            BlankingSign::Positive => significance > level,
            BlankingSign::Negative => significance < -level,
        }
    }

    fn valid_neighbours(&self, plane: &AccumulationPlane, i: usize, j: usize) -> usize {
        let (sx, sy) = plane.dim();
        match self.connectivity {
            Connectivity::Four => neighbours4(i, j, sx, sy)
                .filter(|&(ni, nj)| plane.is_valid(ni, nj))
                .count(),
            Connectivity::Eight => neighbours8(i, j, sx, sy)
                .filter(|&(ni, nj)| plane.is_valid(ni, nj))
                .count(),
        }
    }

    /// A valid pixel is masked when it exceeds the significance level or
    /// has fewer than `min_neighbors` valid neighbours. Invalid pixels are
    /// never masked.
    pub fn is_masked(&self, plane: &AccumulationPlane, i: usize, j: usize) -> bool {
        plane.is_valid(i, j)
            && (self.exceeds(plane.significance(i, j))
                || self.valid_neighbours(plane, i, j) < self.min_neighbors)
    }

    pub fn evaluate(&self, plane: &AccumulationPlane) -> Mask {
        let mut data = Array2::from_elem(plane.dim(), false);
        if data.len() >= PARALLEL_PIXEL_THRESHOLD {
            Zip::indexed(&mut data).par_for_each(|(i, j), m| *m = self.is_masked(plane, i, j));
        } else {
            Zip::indexed(&mut data).for_each(|(i, j), m| *m = self.is_masked(plane, i, j));
        }
        Mask { data }
    }
}

/// Boolean source mask over a plane.
#[derive(Clone, Debug, PartialEq)]
pub struct Mask {
    data: Array2<bool>,
}

impl Mask {
    pub fn new(size_x: usize, size_y: usize) -> Self {
        Self {
            data: Array2::from_elem((size_x, size_y), false),
        }
    }

    #[inline]
    pub fn is_masked(&self, i: usize, j: usize) -> bool {
        self.data[[i, j]]
    }

    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&m| m).count()
    }

    pub fn clear(&mut self) {
        self.data.fill(false);
    }

    pub fn as_array(&self) -> &Array2<bool> {
        &self.data
    }

    /// Mirror the mask into the plane's `BLANKED` flag.
    pub fn apply_flags(&self, plane: &mut AccumulationPlane) {
        Zip::from(&mut plane.flag).and(&self.data).for_each(|f, &m| {
            if m {
                *f |= pixel_flags::BLANKED;
            } else {
                *f &= !pixel_flags::BLANKED;
            }
        });
    }
}
