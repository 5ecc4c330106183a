use serde::{Deserialize, Serialize};

use crate::consts::MAP_PADDING_PIXELS;
use crate::error::{Result, SkymapError};

use super::projection::{Gnomonic, Offset2D, SphericalCoordinates};

/// A closed interval that grows to include values.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Default for Range {
    fn default() -> Self {
        Self::empty()
    }
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    pub fn span(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.max - self.min
        }
    }

    pub fn midpoint(&self) -> f64 {
        0.5 * (self.min + self.max)
    }

    pub fn include(&mut self, value: f64) {
        if value.is_finite() {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
    }

    pub fn include_range(&mut self, other: &Range) {
        if !other.is_empty() {
            self.min = self.min.min(other.min);
            self.max = self.max.max(other.max);
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Integer pixel coordinates on a [`Grid2D`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelIndex {
    pub i: usize,
    pub j: usize,
}

impl PixelIndex {
    pub fn new(i: usize, j: usize) -> Self {
        Self { i, j }
    }
}

/// Packs a [`PixelIndex`] into a single `u64` as `(i << shift) | j`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexPacking {
    shift: u32,
    size_x: usize,
    size_y: usize,
}

impl IndexPacking {
    /// Sentinel for samples that fall outside the grid.
    pub const INVALID: u64 = u64::MAX;

    pub fn new(size_x: usize, size_y: usize) -> Self {
        Self {
            shift: ceil_log2(size_y),
            size_x,
            size_y,
        }
    }

    pub fn shift(&self) -> u32 {
        self.shift
    }

    pub fn pack(&self, index: Option<PixelIndex>) -> u64 {
        match index {
            Some(idx) if idx.i < self.size_x && idx.j < self.size_y => {
                ((idx.i as u64) << self.shift) | idx.j as u64
            }
            _ => Self::INVALID,
        }
    }

    pub fn unpack(&self, packed: u64) -> Option<PixelIndex> {
        if packed == Self::INVALID {
            return None;
        }
        let mask = (1u64 << self.shift) - 1;
        let idx = PixelIndex::new((packed >> self.shift) as usize, (packed & mask) as usize);
        (idx.i < self.size_x && idx.j < self.size_y).then_some(idx)
    }
}

fn ceil_log2(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        usize::BITS - (n - 1).leading_zeros()
    }
}

/// A rectangular pixel grid on the tangent plane of a [`Gnomonic`] projection.
///
/// Pixel `(i, j)` is centred on offset `((i - ref_x) * dx, (j - ref_y) * dy)`.
/// The grid is fixed once sizing completes and is only read afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid2D {
    pub projection: Gnomonic,
    pub resolution: (f64, f64),
    pub ref_index: (f64, f64),
    pub size_x: usize,
    pub size_y: usize,
}

impl Grid2D {
    /// Size a grid to cover the offsets in `x_range`, `y_range` with one
    /// pixel of padding on each side.
    pub fn from_bounds(
        projection: Gnomonic,
        resolution: (f64, f64),
        x_range: &Range,
        y_range: &Range,
    ) -> Result<Self> {
        let (dx, dy) = resolution;
        if !(dx > 0.0 && dy > 0.0 && dx.is_finite() && dy.is_finite()) {
            return Err(SkymapError::InvalidConfig(format!(
                "grid resolution must be positive, got {dx} x {dy}"
            )));
        }

        let size_x = axis_size(x_range, dx);
        let size_y = axis_size(y_range, dy);
        if size_x <= 0 || size_y <= 0 {
            return Err(SkymapError::DegenerateGeometry { size_x, size_y });
        }

        Ok(Self {
            projection,
            resolution,
            ref_index: (
                0.5 - (x_range.min / dx).round(),
                0.5 - (y_range.min / dy).round(),
            ),
            size_x: size_x as usize,
            size_y: size_y as usize,
        })
    }

    /// Pixel count, saturating at `usize::MAX` for grids no memory could hold.
    pub fn pixels(&self) -> usize {
        self.size_x.saturating_mul(self.size_y)
    }

    pub fn packing(&self) -> IndexPacking {
        IndexPacking::new(self.size_x, self.size_y)
    }

    pub fn pixel_area(&self) -> f64 {
        self.resolution.0 * self.resolution.1
    }

    /// Side of the square pixel with the same area.
    pub fn pixel_size(&self) -> f64 {
        self.pixel_area().sqrt()
    }

    /// Angular extent of the map diagonal.
    pub fn diagonal(&self) -> f64 {
        (self.size_x as f64 * self.resolution.0).hypot(self.size_y as f64 * self.resolution.1)
    }

    pub fn offset_to_index(&self, offset: &Offset2D) -> (f64, f64) {
        (
            self.ref_index.0 + offset.x / self.resolution.0,
            self.ref_index.1 + offset.y / self.resolution.1,
        )
    }

    pub fn index_to_offset(&self, i: f64, j: f64) -> Offset2D {
        Offset2D::new(
            (i - self.ref_index.0) * self.resolution.0,
            (j - self.ref_index.1) * self.resolution.1,
        )
    }

    /// Nearest pixel to `offset`, or `None` when it falls off the grid.
    pub fn to_index(&self, offset: &Offset2D) -> Option<PixelIndex> {
        let (fi, fj) = self.offset_to_index(offset);
        if !(fi.is_finite() && fj.is_finite()) {
            return None;
        }
        let (i, j) = (fi.round(), fj.round());
        if i < 0.0 || j < 0.0 || i >= self.size_x as f64 || j >= self.size_y as f64 {
            return None;
        }
        Some(PixelIndex::new(i as usize, j as usize))
    }

    pub fn project(&self, coords: &SphericalCoordinates) -> Option<PixelIndex> {
        self.to_index(&self.projection.project(coords))
    }

    pub fn index_to_coords(&self, i: f64, j: f64) -> SphericalCoordinates {
        self.projection.deproject(&self.index_to_offset(i, j))
    }
}

fn axis_size(range: &Range, resolution: f64) -> i64 {
    if range.is_empty() || !range.min.is_finite() || !range.max.is_finite() {
        return 0;
    }
    let size = (range.span() / resolution).ceil() + MAP_PADDING_PIXELS as f64;
    if size.is_finite() && size < i64::MAX as f64 {
        size as i64
    } else {
        0
    }
}
