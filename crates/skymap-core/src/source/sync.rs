use ndarray::Array2;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::pipeline::config::CouplingConfig;
use crate::plane::stats;
use crate::reduce::{Accumulator, ReductionEngine};
use crate::scan::{sample_flags, Frame, Integration};

use super::accumulate::ModelContext;
use super::strategy::PlaneStrategy;

/// Significance a pixel needs to take part in coupling estimation.
const COUPLING_MIN_S2N: f64 = 5.0;

/// Remove the change in the source model since the last sync from the
/// integration's samples, and refresh their source-blank flags.
///
/// For each non-skipped sample on the map:
/// `x -= G * (g_src * value - g_sync * base)`. Afterwards the integration's
/// sync gains are the current source gains. Returns the number of samples
/// touched.
pub fn sync_integration<S: PlaneStrategy>(
    strategy: &S,
    base: &[Array2<f64>],
    ctx: ModelContext<'_>,
    integration: &mut Integration,
    engine: &ReductionEngine,
) -> usize {
    let source_gains = integration.source_gains(ctx.instrument);
    let Integration {
        frames,
        gain,
        sync_gain,
        source_generation,
        index_cache,
        ..
    } = integration;

    let gain = *gain;
    let cache = index_cache.as_ref();
    let prior: &[f64] = &sync_gain[..];

    let synced = engine.install(|| {
        frames
            .par_iter_mut()
            .enumerate()
            .map(|(k, frame)| {
                let fg = gain * frame.source_gain();
                let mut n = 0;
                for &c in ctx.mapping {
                    if frame.sample_flag[c] & sample_flags::SKIP != 0 {
                        continue;
                    }
                    let Some(p) = strategy.route(&ctx.instrument.channels[c]) else {
                        continue;
                    };
                    let Some(idx) = ctx.sample_index(cache, k, frame, c) else {
                        continue;
                    };
                    let plane = &strategy.planes()[p];
                    let value = if plane.is_valid(idx.i, idx.j) {
                        plane.value(idx.i, idx.j)
                    } else {
                        0.0
                    };
                    let delta = source_gains[c] * value - prior[c] * base[p][[idx.i, idx.j]];
                    frame.data[c] -= (fg * delta) as f32;

                    if ctx.masks[p].is_masked(idx.i, idx.j) {
                        frame.sample_flag[c] |= sample_flags::SOURCE_BLANK;
                    } else {
                        frame.sample_flag[c] &= !sample_flags::SOURCE_BLANK;
                    }
                    n += 1;
                }
                n
            })
            .sum()
    });

    *sync_gain = source_gains;
    *source_generation += 1;
    synced
}

/// Per-channel regression sums of residual against expected source signal.
struct CouplingSums(Vec<(f64, f64)>);

impl Accumulator for CouplingSums {
    fn merge(&mut self, other: &Self) {
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            a.0 += b.0;
            a.1 += b.1;
        }
    }
}

/// Re-estimate per-channel source couplings of `integration` from bright
/// pixels. Must run before [`sync_integration`] for the same model.
///
/// Couplings are normalized to a median of one; values outside the
/// configured range are reset to one.
pub fn estimate_coupling<S: PlaneStrategy>(
    strategy: &S,
    base: &[Array2<f64>],
    ctx: ModelContext<'_>,
    integration: &mut Integration,
    range: &CouplingConfig,
    engine: &ReductionEngine,
) {
    let source_gains = integration.source_gains(ctx.instrument);
    let channels = ctx.instrument.channel_count();
    let cache = integration.index_cache.as_ref();
    let gain = integration.gain;
    let prior = &integration.sync_gain;

    let frames: Vec<(usize, &Frame)> = integration.frames.iter().enumerate().collect();
    let reduced = engine.reduce(
        &frames,
        || CouplingSums(vec![(0.0, 0.0); channels]),
        |sums, &(k, frame)| {
            let fg = gain * frame.source_gain();
            let mut n = 0;
            for &c in ctx.mapping {
                if frame.sample_flag[c] & !sample_flags::SOURCE_BLANK != 0 {
                    continue;
                }
                let Some(p) = strategy.route(&ctx.instrument.channels[c]) else {
                    continue;
                };
                let Some(idx) = ctx.sample_index(cache, k, frame, c) else {
                    continue;
                };
                let plane = &strategy.planes()[p];
                if !plane.is_valid(idx.i, idx.j)
                    || plane.significance(idx.i, idx.j).abs() < COUPLING_MIN_S2N
                {
                    continue;
                }
                let value = plane.value(idx.i, idx.j);
                let previous = fg * prior[c] * base[p][[idx.i, idx.j]];
                let expected = fg * source_gains[c] * value;
                let residual = frame.data[c] as f64 + previous - expected;

                let entry = &mut sums.0[c];
                entry.0 += frame.relative_weight * residual * expected;
                entry.1 += frame.relative_weight * expected * expected;
                n += 1;
            }
            n
        },
    );

    if reduced.contributions == 0 {
        debug!("No bright pixels for coupling estimation");
        return;
    }

    for (c, &(sum, weight)) in reduced.merged.0.iter().enumerate() {
        if weight > 0.0 {
            integration.coupling[c] *= 1.0 + sum / weight;
        }
    }

    let mut couplings: Vec<f64> = ctx.mapping.iter().map(|&c| integration.coupling[c]).collect();
    match stats::median(&mut couplings) {
        Some(median) if median > 0.0 && median.is_finite() => {
            for c in integration.coupling.iter_mut() {
                *c /= median;
            }
        }
        other => warn!(median = ?other, "Cannot normalize couplings"),
    }

    let mut reset = 0;
    for &c in ctx.mapping {
        let coupling = &mut integration.coupling[c];
        if !(*coupling >= range.min && *coupling <= range.max) {
            *coupling = 1.0;
            reset += 1;
        }
    }
    debug!(
        samples = reduced.contributions,
        reset,
        "Coupling estimated"
    );
}
