use ndarray::Array2;
use tracing::{debug, info, warn};

use crate::consts::{ARCSEC, FWHM_TO_SIZE};
use crate::grid::{Grid2D, IndexCache};
use crate::instrument::Instrument;
use crate::pipeline::config::{
    ClippingConfig, CouplingConfig, FilterMode, PointingConfig, PointingMethod, ReductionConfig,
};
use crate::plane::filter::skip_mask;
use crate::plane::peak::{centroid, find_peak};
use crate::plane::{AccumulationPlane, Mask, MaskRule, Peak};
use crate::reduce::{Partition, ReductionEngine};
use crate::scan::{Integration, Scan};

use super::accumulate::{accumulate_integration, ModelContext};
use super::footprint::MemoryBudget;
use super::strategy::PlaneStrategy;
use super::sync::{estimate_coupling, sync_integration};

/// Resolved large-scale filter settings.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterSettings {
    pub mode: FilterMode,
    /// Radians.
    pub fwhm: f64,
    pub blank: Option<f64>,
    pub correct: bool,
}

/// Per-map processing settings, resolved against the instrument.
#[derive(Clone, Debug)]
pub struct MapSettings {
    /// Instrument beam FWHM, radians.
    pub beam_fwhm: f64,
    pub smoothing: Option<f64>,
    pub filter: Option<FilterSettings>,
    pub mask_rule: MaskRule,
    pub clipping: ClippingConfig,
    pub level: bool,
    pub robust: bool,
    pub partition: Partition,
    pub filter_gain_correction: bool,
}

impl MapSettings {
    pub fn from_config(config: &ReductionConfig, instrument: &Instrument) -> Self {
        let beam = instrument.resolution;
        let smoothing = config.smoothing.map(|s| s.fwhm(beam));
        let source_size = beam.hypot(smoothing.unwrap_or(0.0));
        let filter = config.filter.as_ref().map(|f| FilterSettings {
            mode: f.mode,
            fwhm: f.fwhm.map_or(5.0 * source_size, |arcsec| arcsec * ARCSEC),
            blank: f.blank,
            correct: f.correct,
        });

        Self {
            beam_fwhm: beam,
            smoothing,
            filter,
            mask_rule: config.blanking.rule(),
            clipping: config.clipping.clone(),
            level: config.level,
            robust: config.robust,
            partition: config.partition,
            filter_gain_correction: config.filter_gain_correction,
        }
    }
}

/// A source model over one plane strategy: the accumulation planes, the
/// base images already removed from the data, and the source masks.
#[derive(Clone, Debug)]
pub struct SourceMap<S: PlaneStrategy> {
    grid: Grid2D,
    strategy: S,
    base: Vec<Array2<f64>>,
    masks: Vec<Mask>,
    mapping: Vec<usize>,
    settings: MapSettings,
    generation: u32,
}

impl<S: PlaneStrategy> SourceMap<S> {
    pub fn new(grid: Grid2D, strategy: S, settings: MapSettings, instrument: &Instrument) -> Self {
        let planes = strategy.planes().len();
        let dim = (grid.size_x, grid.size_y);
        Self {
            base: (0..planes).map(|_| Array2::zeros(dim)).collect(),
            masks: (0..planes).map(|_| Mask::new(dim.0, dim.1)).collect(),
            mapping: instrument.mapping_channels(),
            grid,
            strategy,
            settings,
            generation: 0,
        }
    }

    pub fn grid(&self) -> &Grid2D {
        &self.grid
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn planes(&self) -> &[AccumulationPlane] {
        self.strategy.planes()
    }

    pub fn planes_mut(&mut self) -> &mut [AccumulationPlane] {
        self.strategy.planes_mut()
    }

    pub fn base(&self) -> &[Array2<f64>] {
        &self.base
    }

    pub fn masks(&self) -> &[Mask] {
        &self.masks
    }

    pub fn settings(&self) -> &MapSettings {
        &self.settings
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn plane_label(&self, plane: usize) -> String {
        self.strategy.plane_label(plane)
    }

    pub fn is_empty(&self) -> bool {
        self.planes().iter().all(AccumulationPlane::is_empty)
    }

    pub fn count_points(&self) -> usize {
        self.planes().iter().map(AccumulationPlane::count_points).sum()
    }

    /// A zeroed model sharing this one's grid, base and masks.
    pub fn empty_copy(&self) -> Self {
        Self {
            grid: self.grid.clone(),
            strategy: self.strategy.empty_copy(),
            base: self.base.clone(),
            masks: self.masks.clone(),
            mapping: self.mapping.clone(),
            settings: self.settings.clone(),
            generation: self.generation,
        }
    }

    /// Clear the planes for a new accumulation pass. Base and masks stay.
    pub fn reset(&mut self) {
        for plane in self.strategy.planes_mut() {
            plane.clear();
        }
    }

    pub fn accumulate(
        &mut self,
        integration: &Integration,
        instrument: &Instrument,
        engine: &ReductionEngine,
    ) -> usize {
        let ctx = ModelContext {
            instrument,
            grid: &self.grid,
            mapping: &self.mapping,
            masks: &self.masks,
            use_offsets: self.strategy.uses_channel_offsets(),
            filtering: self.filtering(instrument),
        };
        let n = accumulate_integration(
            &mut self.strategy,
            ctx,
            integration,
            self.settings.partition,
            engine,
        );
        debug!(samples = n, frames = integration.frames.len(), "Integration accumulated");
        n
    }

    fn filtering(&self, instrument: &Instrument) -> f64 {
        if self.settings.filter_gain_correction && self.generation > 0 {
            instrument.source_filtering
        } else {
            1.0
        }
    }

    fn context<'a>(&'a self, instrument: &'a Instrument) -> ModelContext<'a> {
        ModelContext {
            instrument,
            grid: &self.grid,
            mapping: &self.mapping,
            masks: &self.masks,
            use_offsets: self.strategy.uses_channel_offsets(),
            filtering: self.filtering(instrument),
        }
    }

    /// Turn an accumulated increment into a full map: add the base back,
    /// then redundancy-clip, level (first generation only) and despike.
    pub fn end_accumulation(&mut self, first_generation: bool, instrument: &Instrument) {
        let clipping = &self.settings.clipping;
        for (plane, base) in self.strategy.planes_mut().iter_mut().zip(&self.base) {
            plane.add_image(base);

            if let Some(redundancy) = clipping.redundancy {
                plane.clip_below_exposure(redundancy * instrument.sampling_interval);
            }
            if self.settings.level && first_generation {
                let level = plane.level(self.settings.robust);
                debug!(level, "Map levelled");
            }
            if let Some(level) = clipping.despike {
                plane.despike(level);
            }
            plane.sanitize();
        }
    }

    /// Smooth, filter, clip and mask the planes, in parallel over planes.
    pub fn finalize(&mut self, engine: &ReductionEngine) {
        self.generation += 1;
        let settings = &self.settings;
        let resolution = self.grid.resolution;

        engine.for_each_mut(self.strategy.planes_mut(), |_, plane| {
            finalize_plane(plane, settings, resolution);
        });

        let rule = self.settings.mask_rule;
        let planes = self.strategy.planes_mut();
        let masks = &mut self.masks;
        engine.install(|| {
            for (plane, mask) in planes.iter_mut().zip(masks.iter_mut()) {
                *mask = rule.evaluate(plane);
                mask.apply_flags(plane);
            }
        });

        let masked: usize = self.masks.iter().map(Mask::count).sum();
        info!(
            generation = self.generation,
            points = self.count_points(),
            masked,
            "Source map finalized"
        );
    }

    pub fn sync(
        &self,
        integration: &mut Integration,
        instrument: &Instrument,
        engine: &ReductionEngine,
    ) -> usize {
        sync_integration(
            &self.strategy,
            &self.base,
            self.context(instrument),
            integration,
            engine,
        )
    }

    pub fn estimate_coupling(
        &self,
        integration: &mut Integration,
        instrument: &Instrument,
        range: &CouplingConfig,
        engine: &ReductionEngine,
    ) {
        estimate_coupling(
            &self.strategy,
            &self.base,
            self.context(instrument),
            integration,
            range,
            engine,
        );
    }

    /// Record the current values as what has been removed from the data.
    pub fn set_base(&mut self) {
        for (plane, base) in self.strategy.planes().iter().zip(self.base.iter_mut()) {
            plane.copy_values_to(base);
        }
    }

    pub fn add_weighted(&mut self, other: &Self, weight: f64) {
        for (dst, src) in self.strategy.planes_mut().iter_mut().zip(other.planes()) {
            dst.add_weighted(src, weight);
        }
    }

    /// Reduced chi-squared over all planes.
    pub fn chi2(&self, robust: bool) -> f64 {
        let planes = self.planes();
        if robust {
            let mut values: Vec<f64> = planes
                .iter()
                .map(|p| p.chi2(true))
                .filter(|c| c.is_finite())
                .collect();
            crate::plane::stats::median(&mut values).unwrap_or(f64::NAN)
        } else {
            let (mut sum, mut n) = (0.0, 0usize);
            for plane in planes {
                let points = plane.count_points();
                if points > 0 {
                    sum += plane.chi2(false) * points as f64;
                    n += points;
                }
            }
            if n > 0 {
                sum / n as f64
            } else {
                f64::NAN
            }
        }
    }

    /// Locate the brightest source after smoothing to the beam.
    pub fn pointing(&self, config: &PointingConfig, engine: &ReductionEngine) -> Option<Peak> {
        let beam = self.settings.beam_fwhm;
        let mut best: Option<Peak> = None;

        for plane in self.planes() {
            let mut work = plane.clone();
            engine.install(|| work.smooth_to(beam, self.grid.resolution));
            if let Some(fraction) = config.exposure_clip {
                work.clip_below_relative_exposure(fraction);
            }
            work.sanitize();

            let Some(mut peak) = find_peak(&work, &self.grid, config.kind) else {
                continue;
            };
            if config.method == PointingMethod::Centroid {
                peak = centroid(&work, &self.grid, &peak, 2.0 * beam);
            }

            if work.beam.correcting_fwhm.is_none() {
                peak.value *= work.beam.filter_correction;
            }
            let beam_size = FWHM_TO_SIZE * work.beam.smooth_fwhm.max(beam);
            peak.flux = peak.value * beam_size * beam_size / self.grid.pixel_area();

            if best
                .as_ref()
                .is_none_or(|b| peak.significance.abs() > b.significance.abs())
            {
                best = Some(peak);
            }
        }

        match best {
            Some(peak) if peak.significance.abs() >= config.significance => {
                info!(
                    significance = peak.significance,
                    value = peak.value,
                    "Source located"
                );
                Some(peak)
            }
            Some(peak) => {
                warn!(
                    significance = peak.significance,
                    required = config.significance,
                    "Source too faint for pointing"
                );
                None
            }
            None => None,
        }
    }

    /// Cache sample indices while they fit in the spare budget.
    pub fn index(
        &self,
        scans: &mut [Scan],
        instrument: &Instrument,
        budget: &MemoryBudget,
        reserved: u64,
        saturation: f64,
        engine: &ReductionEngine,
    ) -> u64 {
        let spare = budget.available().saturating_sub(reserved);
        let limit = (saturation * spare as f64) as u64;
        let mut used = 0u64;
        let use_offsets = self.strategy.uses_channel_offsets();

        for scan in scans.iter_mut() {
            for integration in scan.integrations.iter_mut() {
                let bytes =
                    IndexCache::bytes_for(integration.frames.len(), instrument.channel_count());
                if used.saturating_add(bytes) > limit {
                    info!(
                        cached_bytes = used,
                        limit, "Index cache saturated, projecting remaining samples on the fly"
                    );
                    return used;
                }
                integration.index_cache = Some(IndexCache::build(
                    integration,
                    instrument,
                    &self.grid,
                    &self.mapping,
                    use_offsets,
                    engine,
                ));
                used += bytes;
            }
        }
        debug!(cached_bytes = used, "Sample indices cached");
        used
    }
}

fn finalize_plane(plane: &mut AccumulationPlane, settings: &MapSettings, resolution: (f64, f64)) {
    if let Some(fwhm) = settings.smoothing {
        plane.smooth_to(fwhm, resolution);
    }

    if let Some(filter) = &settings.filter {
        let skip = skip_mask(plane, filter.blank);
        match filter.mode {
            FilterMode::Convolution => plane.filter_above(filter.fwhm, resolution, &skip),
            FilterMode::Fft => plane.fft_filter_above(filter.fwhm, resolution, &skip),
        }
        plane.beam.filter_blanking = filter.blank;
        plane.filter_correct(settings.beam_fwhm, &skip, filter.correct);
    }

    let clipping = &settings.clipping;
    if let Some(fraction) = clipping.exposure {
        plane.clip_below_relative_exposure(fraction);
    }
    if let Some(factor) = clipping.noise {
        plane.clip_above_relative_rms(factor);
    }
    if let Some(level) = clipping.s2n {
        plane.s2n_clip_below(level);
    }
    plane.sanitize();
}
