use rayon::prelude::*;
use tracing::trace;

use crate::grid::{Grid2D, IndexCache, PixelIndex};
use crate::instrument::Instrument;
use crate::plane::{AccumulationPlane, Mask};
use crate::reduce::{Partition, ReductionEngine};
use crate::scan::{sample_flags, Frame, Integration};

use super::strategy::PlaneStrategy;

/// Read-only state shared by every worker while a model touches one
/// integration.
#[derive(Clone, Copy)]
pub struct ModelContext<'a> {
    pub instrument: &'a Instrument,
    pub grid: &'a Grid2D,
    /// Channels that contribute to the source.
    pub mapping: &'a [usize],
    pub masks: &'a [Mask],
    pub use_offsets: bool,
    /// Gain correction for samples on unmasked pixels.
    pub filtering: f64,
}

impl ModelContext<'_> {
    /// Map pixel of channel `c` in frame `k`, from the cache when present.
    pub fn sample_index(
        &self,
        cache: Option<&IndexCache>,
        k: usize,
        frame: &Frame,
        c: usize,
    ) -> Option<PixelIndex> {
        if let Some(cache) = cache {
            return cache.get(k, c);
        }
        let offset = if self.use_offsets {
            frame.sky_offset(&self.instrument.channels[c].position, &self.grid.projection)
        } else {
            self.grid.projection.project(&frame.equatorial)
        };
        self.grid.to_index(&offset)
    }
}

/// Inputs for one integration's accumulation.
struct Pass<'a> {
    ctx: ModelContext<'a>,
    integration: &'a Integration,
    source_gains: &'a [f64],
}

impl Pass<'_> {
    /// Accumulate sample `c` of frame `k` into `plane` (routed to `p`).
    /// Returns whether the sample contributed.
    #[inline]
    fn add_sample(
        &self,
        plane: &mut AccumulationPlane,
        p: usize,
        k: usize,
        frame: &Frame,
        frame_gain: f64,
        c: usize,
    ) -> bool {
        if frame.sample_flag[c] & !sample_flags::SOURCE_BLANK != 0 {
            return false;
        }
        let g = frame_gain * self.source_gains[c];
        if g == 0.0 {
            return false;
        }
        let x = frame.data[c] as f64;
        if !x.is_finite() {
            trace!(frame = k, channel = c, "Non-finite sample skipped");
            return false;
        }
        let Some(idx) = self
            .ctx
            .sample_index(self.integration.index_cache.as_ref(), k, frame, c)
        else {
            trace!(frame = k, channel = c, "Sample off the map");
            return false;
        };

        let channel = &self.ctx.instrument.channels[c];
        let gate = if self.ctx.masks[p].is_masked(idx.i, idx.j) {
            1.0
        } else {
            self.ctx.filtering
        };
        let w = frame.relative_weight / channel.variance;
        plane.add_point(
            idx.i,
            idx.j,
            x,
            gate * g,
            w,
            self.ctx.instrument.sampling_interval,
        );
        true
    }

    fn frame_gain(&self, frame: &Frame) -> Option<f64> {
        if !frame.is_source_valid() {
            return None;
        }
        let g = self.integration.gain * frame.source_gain();
        (g != 0.0).then_some(g)
    }

    fn add_frame<S: PlaneStrategy>(&self, strategy: &mut S, k: usize, frame: &Frame) -> usize {
        let Some(fg) = self.frame_gain(frame) else {
            return 0;
        };
        let mut n = 0;
        for &c in self.ctx.mapping {
            let Some(p) = strategy.route(&self.ctx.instrument.channels[c]) else {
                continue;
            };
            if self.add_sample(&mut strategy.planes_mut()[p], p, k, frame, fg, c) {
                n += 1;
            }
        }
        n
    }

    fn add_plane(&self, plane: &mut AccumulationPlane, p: usize, channels: &[usize]) -> usize {
        let mut n = 0;
        for (k, frame) in self.integration.frames.iter().enumerate() {
            let Some(fg) = self.frame_gain(frame) else {
                continue;
            };
            for &c in channels {
                if self.add_sample(plane, p, k, frame, fg, c) {
                    n += 1;
                }
            }
        }
        n
    }
}

/// Accumulate one integration into `strategy`'s planes. Returns the number
/// of contributing samples.
pub fn accumulate_integration<S: PlaneStrategy>(
    strategy: &mut S,
    ctx: ModelContext<'_>,
    integration: &Integration,
    partition: Partition,
    engine: &ReductionEngine,
) -> usize {
    let source_gains = integration.source_gains(ctx.instrument);
    let pass = Pass {
        ctx,
        integration,
        source_gains: &source_gains,
    };

    let partition = match partition {
        Partition::Auto => strategy.preferred_partition(),
        other => other,
    };

    let contributions = match partition {
        Partition::Planes => {
            let mut by_plane = vec![Vec::new(); strategy.planes().len()];
            for &c in ctx.mapping {
                if let Some(p) = strategy.route(&ctx.instrument.channels[c]) {
                    by_plane[p].push(c);
                }
            }
            engine.install(|| {
                strategy
                    .planes_mut()
                    .par_iter_mut()
                    .zip(by_plane.par_iter())
                    .enumerate()
                    .map(|(p, (plane, channels))| pass.add_plane(plane, p, channels))
                    .sum()
            })
        }
        Partition::Frames | Partition::Auto => {
            let frames: Vec<(usize, &Frame)> = integration.frames.iter().enumerate().collect();
            let template = strategy.empty_copy();
            engine.reduce_into(
                strategy,
                &frames,
                || template.clone(),
                |partial, &(k, frame)| pass.add_frame(partial, k, frame),
            )
        }
    };

    let exposure = integration
        .frames
        .iter()
        .filter(|f| f.is_source_valid())
        .count() as f64
        * ctx.instrument.sampling_interval;
    for plane in strategy.planes_mut() {
        plane.integration_time += exposure;
    }

    contributions
}
