use crate::error::{Result, SkymapError};
use crate::grid::SpectralGrid;
use crate::instrument::{Channel, Instrument};
use crate::pipeline::config::{ModelKind, SpectralConfig};
use crate::plane::AccumulationPlane;
use crate::reduce::{Accumulator, Partition};

use super::footprint::FootprintModel;

/// How samples are routed onto a set of accumulation planes.
///
/// Implementors are also the per-worker partial accumulators: `empty_copy`
/// gives a zeroed clone and `Accumulator::merge` adds one into another.
pub trait PlaneStrategy: Accumulator + Clone + Sync {
    fn kind(&self) -> ModelKind;

    fn planes(&self) -> &[AccumulationPlane];

    fn planes_mut(&mut self) -> &mut [AccumulationPlane];

    /// Destination plane of a channel, if it maps at all.
    fn route(&self, channel: &Channel) -> Option<usize>;

    /// Whether channel focal-plane offsets are applied when projecting.
    fn uses_channel_offsets(&self) -> bool {
        true
    }

    fn preferred_partition(&self) -> Partition {
        Partition::Frames
    }

    fn empty_copy(&self) -> Self;

    fn plane_label(&self, plane: usize) -> String;

    fn footprint(&self) -> FootprintModel {
        FootprintModel::for_planes(self.planes().len())
    }
}

fn merge_planes(dst: &mut [AccumulationPlane], src: &[AccumulationPlane]) {
    for (d, s) in dst.iter_mut().zip(src) {
        d.merge(s);
    }
}

/// Plane layout decided before any pixel memory is allocated.
#[derive(Clone, Debug, PartialEq)]
pub enum PlaneLayout {
    Scalar,
    Pixel { pixels: Vec<usize> },
    Spectral(SpectralGrid),
}

impl PlaneLayout {
    pub fn plan(kind: ModelKind, instrument: &Instrument, spectral: &SpectralConfig) -> Result<Self> {
        match kind {
            ModelKind::Scalar => Ok(Self::Scalar),
            ModelKind::Pixel => {
                let pixels = instrument.mapping_pixels();
                if pixels.is_empty() {
                    return Err(SkymapError::InvalidConfig(
                        "instrument has no mapping pixels".into(),
                    ));
                }
                Ok(Self::Pixel { pixels })
            }
            ModelKind::Spectral => Ok(Self::Spectral(SpectralGrid::from_frequencies(
                &instrument.frequency_range(),
                spectral,
            )?)),
        }
    }

    pub fn planes(&self) -> usize {
        match self {
            Self::Scalar => 1,
            Self::Pixel { pixels } => pixels.len(),
            Self::Spectral(grid) => grid.size,
        }
    }

    pub fn uses_channel_offsets(&self) -> bool {
        !matches!(self, Self::Pixel { .. })
    }

    pub fn footprint(&self) -> FootprintModel {
        FootprintModel::for_planes(self.planes())
    }
}

/// A single map.
#[derive(Clone, Debug)]
pub struct ScalarPlanes {
    plane: AccumulationPlane,
}

impl ScalarPlanes {
    pub fn new(size_x: usize, size_y: usize, pixel_size: f64) -> Self {
        Self {
            plane: AccumulationPlane::new(size_x, size_y, pixel_size),
        }
    }
}

impl Accumulator for ScalarPlanes {
    fn merge(&mut self, other: &Self) {
        self.plane.merge(&other.plane);
    }
}

impl PlaneStrategy for ScalarPlanes {
    fn kind(&self) -> ModelKind {
        ModelKind::Scalar
    }

    fn planes(&self) -> &[AccumulationPlane] {
        std::slice::from_ref(&self.plane)
    }

    fn planes_mut(&mut self) -> &mut [AccumulationPlane] {
        std::slice::from_mut(&mut self.plane)
    }

    fn route(&self, _channel: &Channel) -> Option<usize> {
        Some(0)
    }

    fn empty_copy(&self) -> Self {
        Self {
            plane: self.plane.empty_like(),
        }
    }

    fn plane_label(&self, _plane: usize) -> String {
        "map".to_string()
    }
}

/// One map per mapping pixel, for beam maps. Channel offsets are ignored so
/// each pixel sees the source at its own position.
#[derive(Clone, Debug)]
pub struct PixelPlanes {
    planes: Vec<AccumulationPlane>,
    pixels: Vec<usize>,
}

impl PixelPlanes {
    /// `pixels` must be sorted and distinct.
    pub fn new(size_x: usize, size_y: usize, pixel_size: f64, pixels: Vec<usize>) -> Self {
        Self {
            planes: pixels
                .iter()
                .map(|_| AccumulationPlane::new(size_x, size_y, pixel_size))
                .collect(),
            pixels,
        }
    }

    pub fn pixel_ids(&self) -> &[usize] {
        &self.pixels
    }
}

impl Accumulator for PixelPlanes {
    fn merge(&mut self, other: &Self) {
        merge_planes(&mut self.planes, &other.planes);
    }
}

impl PlaneStrategy for PixelPlanes {
    fn kind(&self) -> ModelKind {
        ModelKind::Pixel
    }

    fn planes(&self) -> &[AccumulationPlane] {
        &self.planes
    }

    fn planes_mut(&mut self) -> &mut [AccumulationPlane] {
        &mut self.planes
    }

    fn route(&self, channel: &Channel) -> Option<usize> {
        self.pixels.binary_search(&channel.pixel).ok()
    }

    fn uses_channel_offsets(&self) -> bool {
        false
    }

    fn preferred_partition(&self) -> Partition {
        Partition::Planes
    }

    fn empty_copy(&self) -> Self {
        Self {
            planes: self.planes.iter().map(AccumulationPlane::empty_like).collect(),
            pixels: self.pixels.clone(),
        }
    }

    fn plane_label(&self, plane: usize) -> String {
        format!("pixel-{}", self.pixels[plane])
    }
}

/// One map per spectral bin.
#[derive(Clone, Debug)]
pub struct SpectralPlanes {
    planes: Vec<AccumulationPlane>,
    spectral: SpectralGrid,
}

impl SpectralPlanes {
    pub fn new(size_x: usize, size_y: usize, pixel_size: f64, spectral: SpectralGrid) -> Self {
        Self {
            planes: (0..spectral.size)
                .map(|_| AccumulationPlane::new(size_x, size_y, pixel_size))
                .collect(),
            spectral,
        }
    }

    pub fn spectral_grid(&self) -> &SpectralGrid {
        &self.spectral
    }
}

impl Accumulator for SpectralPlanes {
    fn merge(&mut self, other: &Self) {
        merge_planes(&mut self.planes, &other.planes);
    }
}

impl PlaneStrategy for SpectralPlanes {
    fn kind(&self) -> ModelKind {
        ModelKind::Spectral
    }

    fn planes(&self) -> &[AccumulationPlane] {
        &self.planes
    }

    fn planes_mut(&mut self) -> &mut [AccumulationPlane] {
        &mut self.planes
    }

    fn route(&self, channel: &Channel) -> Option<usize> {
        channel.frequency.and_then(|f| self.spectral.bin_of(f))
    }

    fn empty_copy(&self) -> Self {
        Self {
            planes: self.planes.iter().map(AccumulationPlane::empty_like).collect(),
            spectral: self.spectral.clone(),
        }
    }

    fn plane_label(&self, plane: usize) -> String {
        format!("bin-{plane}")
    }
}
