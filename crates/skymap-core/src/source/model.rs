use ndarray::Array2;
use tracing::info;

use crate::consts::{ARCSEC, DEFAULT_BEAM_SAMPLING};
use crate::error::{Result, SkymapError};
use crate::grid::{Gnomonic, Grid2D};
use crate::instrument::Instrument;
use crate::pipeline::config::{CouplingConfig, ModelKind, PointingConfig, ReductionConfig};
use crate::plane::{AccumulationPlane, Mask, Peak};
use crate::reduce::ReductionEngine;
use crate::scan::{Integration, Scan};

use super::footprint::{FootprintModel, MemoryBudget};
use super::map::{MapSettings, SourceMap};
use super::sizing::search_corners;
use super::strategy::{PixelPlanes, PlaneLayout, PlaneStrategy, ScalarPlanes, SpectralPlanes};

/// A source model of any plane layout.
#[derive(Clone, Debug)]
pub enum SourceModel {
    Scalar(SourceMap<ScalarPlanes>),
    Pixel(SourceMap<PixelPlanes>),
    Spectral(SourceMap<SpectralPlanes>),
}

macro_rules! dispatch {
    ($self:expr, $map:ident => $body:expr) => {
        match $self {
            SourceModel::Scalar($map) => $body,
            SourceModel::Pixel($map) => $body,
            SourceModel::Spectral($map) => $body,
        }
    };
}

impl SourceModel {
    /// Size a map over `scans`, check it against the memory budget, then
    /// allocate it and (budget permitting) cache sample indices.
    pub fn create(
        scans: &mut [Scan],
        instrument: &Instrument,
        config: &ReductionConfig,
        engine: &ReductionEngine,
    ) -> Result<Self> {
        let first = scans.first().ok_or(SkymapError::EmptySequence)?;
        let projection = Gnomonic::new(first.equatorial);

        let delta = match config.grid.resolution {
            Some(arcsec) => arcsec * ARCSEC,
            None => instrument.resolution / DEFAULT_BEAM_SAMPLING,
        };
        if !(delta > 0.0 && delta.is_finite()) {
            return Err(SkymapError::InvalidConfig(format!(
                "cannot derive a grid resolution from beam {}",
                instrument.resolution
            )));
        }

        let layout = PlaneLayout::plan(config.model, instrument, &config.spectral)?;
        let bounds = search_corners(
            scans,
            instrument,
            &projection,
            layout.uses_channel_offsets(),
            config.grid.fixed_size,
            engine,
        )?;
        let grid = Grid2D::from_bounds(projection, (delta, delta), &bounds.x, &bounds.y)?;

        let footprint = layout.footprint();
        let budget = MemoryBudget::from_config(&config.memory);
        let required = budget.check(&footprint, &grid, engine.threads(), scans)?;

        info!(
            model = %config.model,
            planes = layout.planes(),
            size_x = grid.size_x,
            size_y = grid.size_y,
            resolution_arcsec = delta / ARCSEC,
            required_mb = required as f64 / 1e6,
            "Source model created"
        );

        let settings = MapSettings::from_config(config, instrument);
        let (sx, sy) = (grid.size_x, grid.size_y);
        let pixel_size = grid.pixel_size();
        let model = match layout {
            PlaneLayout::Scalar => Self::Scalar(SourceMap::new(
                grid,
                ScalarPlanes::new(sx, sy, pixel_size),
                settings,
                instrument,
            )),
            PlaneLayout::Pixel { pixels } => Self::Pixel(SourceMap::new(
                grid,
                PixelPlanes::new(sx, sy, pixel_size, pixels),
                settings,
                instrument,
            )),
            PlaneLayout::Spectral(spectral) => Self::Spectral(SourceMap::new(
                grid,
                SpectralPlanes::new(sx, sy, pixel_size, spectral),
                settings,
                instrument,
            )),
        };

        if config.indexing.enabled {
            model.index(
                scans,
                instrument,
                &budget,
                required,
                config.indexing.saturation,
                engine,
            );
        }
        Ok(model)
    }

    pub fn kind(&self) -> ModelKind {
        dispatch!(self, m => m.strategy().kind())
    }

    pub fn grid(&self) -> &Grid2D {
        dispatch!(self, m => m.grid())
    }

    pub fn planes(&self) -> &[AccumulationPlane] {
        dispatch!(self, m => m.planes())
    }

    pub fn base(&self) -> &[Array2<f64>] {
        dispatch!(self, m => m.base())
    }

    pub fn masks(&self) -> &[Mask] {
        dispatch!(self, m => m.masks())
    }

    pub fn plane_label(&self, plane: usize) -> String {
        dispatch!(self, m => m.plane_label(plane))
    }

    pub fn generation(&self) -> u32 {
        dispatch!(self, m => m.generation())
    }

    pub fn footprint(&self) -> FootprintModel {
        dispatch!(self, m => m.strategy().footprint())
    }

    /// Peak bytes of a reduction with this model and `threads` workers.
    pub fn reduction_footprint(&self, threads: usize) -> u64 {
        self.footprint()
            .reduction_footprint(self.grid().pixels(), threads)
    }

    pub fn is_empty(&self) -> bool {
        dispatch!(self, m => m.is_empty())
    }

    pub fn count_points(&self) -> usize {
        dispatch!(self, m => m.count_points())
    }

    pub fn empty_copy(&self) -> Self {
        match self {
            Self::Scalar(m) => Self::Scalar(m.empty_copy()),
            Self::Pixel(m) => Self::Pixel(m.empty_copy()),
            Self::Spectral(m) => Self::Spectral(m.empty_copy()),
        }
    }

    pub fn reset(&mut self) {
        dispatch!(self, m => m.reset())
    }

    pub fn accumulate(
        &mut self,
        integration: &Integration,
        instrument: &Instrument,
        engine: &ReductionEngine,
    ) -> usize {
        dispatch!(self, m => m.accumulate(integration, instrument, engine))
    }

    pub fn end_accumulation(&mut self, first_generation: bool, instrument: &Instrument) {
        dispatch!(self, m => m.end_accumulation(first_generation, instrument))
    }

    pub fn finalize(&mut self, engine: &ReductionEngine) {
        dispatch!(self, m => m.finalize(engine))
    }

    pub fn sync(
        &self,
        integration: &mut Integration,
        instrument: &Instrument,
        engine: &ReductionEngine,
    ) -> usize {
        dispatch!(self, m => m.sync(integration, instrument, engine))
    }

    pub fn estimate_coupling(
        &self,
        integration: &mut Integration,
        instrument: &Instrument,
        range: &CouplingConfig,
        engine: &ReductionEngine,
    ) {
        dispatch!(self, m => m.estimate_coupling(integration, instrument, range, engine))
    }

    pub fn set_base(&mut self) {
        dispatch!(self, m => m.set_base())
    }

    pub fn chi2(&self, robust: bool) -> f64 {
        dispatch!(self, m => m.chi2(robust))
    }

    /// Add `other`, scaled by `weight`. Both must be of the same kind.
    pub fn add_weighted(&mut self, other: &SourceModel, weight: f64) -> Result<()> {
        match (self, other) {
            (Self::Scalar(a), Self::Scalar(b)) => a.add_weighted(b, weight),
            (Self::Pixel(a), Self::Pixel(b)) => a.add_weighted(b, weight),
            (Self::Spectral(a), Self::Spectral(b)) => a.add_weighted(b, weight),
            (a, b) => {
                return Err(SkymapError::InvalidConfig(format!(
                    "cannot combine a {} model with a {} model",
                    a.kind(),
                    b.kind()
                )))
            }
        }
        Ok(())
    }

    pub fn pointing(&self, config: &PointingConfig, engine: &ReductionEngine) -> Option<Peak> {
        dispatch!(self, m => m.pointing(config, engine))
    }

    pub fn index(
        &self,
        scans: &mut [Scan],
        instrument: &Instrument,
        budget: &MemoryBudget,
        reserved: u64,
        saturation: f64,
        engine: &ReductionEngine,
    ) -> u64 {
        dispatch!(self, m => m.index(scans, instrument, budget, reserved, saturation, engine))
    }
}
