use tracing::{debug, info, warn};

use crate::consts::ARCSEC;
use crate::error::{Result, SkymapError};
use crate::grid::{Gnomonic, Offset2D, Range};
use crate::instrument::Instrument;
use crate::reduce::{Accumulator, ReductionEngine};
use crate::scan::{frame_flags, sample_flags, Frame, Scan};

/// Bounding box of projected sample offsets.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Bounds {
    pub x: Range,
    pub y: Range,
}

impl Bounds {
    pub fn include(&mut self, offset: &Offset2D) {
        if offset.is_finite() {
            self.x.include(offset.x);
            self.y.include(offset.y);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty() || self.y.is_empty()
    }
}

impl Accumulator for Bounds {
    fn merge(&mut self, other: &Self) {
        self.x.include_range(&other.x);
        self.y.include_range(&other.y);
    }
}

/// Find the area covered by all scans, in parallel over frames, and record
/// each scan's own range. Sample flags are not consulted, so a fully flagged
/// data set still yields a (blank) map.
///
/// With `fixed_size` (`[width, height]` in arcsec) the map is centred on
/// the projection reference instead: samples outside are flagged `SKIP` and
/// frames left without any valid sample are excluded from the source.
pub fn search_corners(
    scans: &mut [Scan],
    instrument: &Instrument,
    projection: &Gnomonic,
    use_offsets: bool,
    fixed_size: Option<[f64; 2]>,
    engine: &ReductionEngine,
) -> Result<Bounds> {
    if scans.is_empty() {
        return Err(SkymapError::EmptySequence);
    }
    let mapping = instrument.mapping_channels();
    let offset_of = |frame: &Frame, c: usize| -> Offset2D {
        if use_offsets {
            frame.sky_offset(&instrument.channels[c].position, projection)
        } else {
            projection.project(&frame.equatorial)
        }
    };

    if let Some([width, height]) = fixed_size {
        let bounds = Bounds {
            x: Range::new(-0.5 * width * ARCSEC, 0.5 * width * ARCSEC),
            y: Range::new(-0.5 * height * ARCSEC, 0.5 * height * ARCSEC),
        };
        let mut excluded = 0usize;
        for scan in scans.iter_mut() {
            let mut covered = Bounds::default();
            for integration in &mut scan.integrations {
                engine.for_each_mut(&mut integration.frames, |_, frame| {
                    let mut any = false;
                    for &c in &mapping {
                        let o = offset_of(frame, c);
                        if bounds.x.contains(o.x) && bounds.y.contains(o.y) {
                            any = true;
                        } else {
                            frame.sample_flag[c] |= sample_flags::SKIP;
                        }
                    }
                    if !any {
                        frame.flag |= frame_flags::NO_EXPOSURE;
                    }
                });
                excluded += integration
                    .frames
                    .iter()
                    .filter(|f| f.flag & frame_flags::NO_EXPOSURE != 0)
                    .count();
                covered.merge(&integration_bounds(
                    &integration.frames,
                    &mapping,
                    &offset_of,
                    engine,
                ));
            }
            scan.x_range = covered.x;
            scan.y_range = covered.y;
        }
        if excluded > 0 {
            warn!(frames = excluded, "Frames outside the fixed map area");
        }
        info!(
            width_arcsec = width,
            height_arcsec = height,
            "Using fixed map size"
        );
        return Ok(bounds);
    }

    let mut total = Bounds::default();
    for scan in scans.iter_mut() {
        let mut covered = Bounds::default();
        for integration in &scan.integrations {
            covered.merge(&integration_bounds(
                &integration.frames,
                &mapping,
                &offset_of,
                engine,
            ));
        }
        debug!(
            scan = %scan.id,
            x_span_arcsec = covered.x.span() / ARCSEC,
            y_span_arcsec = covered.y.span() / ARCSEC,
            "Scan coverage"
        );
        scan.x_range = covered.x;
        scan.y_range = covered.y;
        total.merge(&covered);
    }

    if total.is_empty() {
        warn!("No valid samples found in any scan");
    }
    Ok(total)
}

fn integration_bounds(
    frames: &[Frame],
    mapping: &[usize],
    offset_of: &(impl Fn(&Frame, usize) -> Offset2D + Sync),
    engine: &ReductionEngine,
) -> Bounds {
    engine
        .reduce(frames, Bounds::default, |bounds, frame| {
            if frame.flag & frame_flags::NO_EXPOSURE != 0 {
                return 0;
            }
            for &c in mapping {
                bounds.include(&offset_of(frame, c));
            }
            mapping.len()
        })
        .merged
}
