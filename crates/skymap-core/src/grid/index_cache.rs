use rayon::prelude::*;

use crate::consts::INDEX_ENTRY_BYTES;
use crate::instrument::Instrument;
use crate::reduce::ReductionEngine;
use crate::scan::Integration;

use super::grid2d::{Grid2D, IndexPacking, PixelIndex};

/// Packed map pixel per (frame, channel) of one integration.
///
/// Entries for non-mapping channels and for samples off the grid hold
/// [`IndexPacking::INVALID`].
#[derive(Clone, Debug, PartialEq)]
pub struct IndexCache {
    packing: IndexPacking,
    channels: usize,
    entries: Vec<u64>,
}

impl IndexCache {
    /// Bytes needed to cache an integration with this shape.
    pub fn bytes_for(frames: usize, channels: usize) -> u64 {
        (frames as u64)
            .saturating_mul(channels as u64)
            .saturating_mul(INDEX_ENTRY_BYTES)
    }

    /// Project every mapping sample of `integration` once, in parallel over
    /// frames. With `use_offsets == false` all channels take the frame
    /// pointing itself.
    pub fn build(
        integration: &Integration,
        instrument: &Instrument,
        grid: &Grid2D,
        mapping: &[usize],
        use_offsets: bool,
        engine: &ReductionEngine,
    ) -> Self {
        let channels = instrument.channel_count();
        let packing = grid.packing();
        let mut entries = vec![IndexPacking::INVALID; integration.frames.len() * channels];

        if channels > 0 {
            engine.install(|| {
                entries
                    .par_chunks_mut(channels)
                    .zip(integration.frames.par_iter())
                    .for_each(|(row, frame)| {
                        for &c in mapping {
                            let channel = &instrument.channels[c];
                            let offset = if use_offsets {
                                frame.sky_offset(&channel.position, &grid.projection)
                            } else {
                                grid.projection.project(&frame.equatorial)
                            };
                            row[c] = packing.pack(grid.to_index(&offset));
                        }
                    })
            });
        }

        Self {
            packing,
            channels,
            entries,
        }
    }

    pub fn get(&self, frame: usize, channel: usize) -> Option<PixelIndex> {
        self.entries
            .get(frame * self.channels + channel)
            .and_then(|&packed| self.packing.unpack(packed))
    }
}
