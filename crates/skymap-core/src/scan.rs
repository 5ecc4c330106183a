use crate::grid::{Gnomonic, IndexCache, Offset2D, Range, SphericalCoordinates};
use crate::instrument::Instrument;

/// Per-sample flag bits.
pub mod sample_flags {
    /// Sample excluded from everything.
    pub const SKIP: u8 = 1 << 0;
    pub const SPIKE: u8 = 1 << 1;
    /// Sample lies on a masked (bright source) pixel.
    pub const SOURCE_BLANK: u8 = 1 << 2;
}

/// Per-frame flag bits.
pub mod frame_flags {
    pub const SKIP_SOURCE: u32 = 1 << 0;
    pub const JUMP: u32 = 1 << 1;
    pub const NO_EXPOSURE: u32 = 1 << 2;

    /// Frames flagged with any of these never contribute to the source.
    pub const SOURCE_FLAGS: u32 = SKIP_SOURCE | JUMP | NO_EXPOSURE;
}

/// One readout of all channels at a single pointing.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub equatorial: SphericalCoordinates,
    /// Focal-plane rotation on the sky, radians.
    pub rotation: f64,
    pub data: Vec<f32>,
    pub sample_flag: Vec<u8>,
    pub relative_weight: f64,
    /// Frame-level source gain (e.g. atmospheric transmission).
    pub transmission: f64,
    pub flag: u32,
}

impl Frame {
    pub fn new(equatorial: SphericalCoordinates, channels: usize) -> Self {
        Self {
            equatorial,
            rotation: 0.0,
            data: vec![0.0; channels],
            sample_flag: vec![0; channels],
            relative_weight: 1.0,
            transmission: 1.0,
            flag: 0,
        }
    }

    pub fn is_source_valid(&self) -> bool {
        self.flag & frame_flags::SOURCE_FLAGS == 0 && self.relative_weight > 0.0
    }

    pub fn source_gain(&self) -> f64 {
        self.transmission
    }

    /// Map-plane offset of a channel at focal-plane `position`.
    pub fn sky_offset(&self, position: &Offset2D, projection: &Gnomonic) -> Offset2D {
        if position.is_zero() {
            return projection.project(&self.equatorial);
        }
        let local = Gnomonic::new(self.equatorial);
        let coords = local.deproject(&position.rotated(self.rotation));
        projection.project(&coords)
    }
}

/// A contiguous block of frames sharing one calibration.
#[derive(Clone, Debug)]
pub struct Integration {
    pub frames: Vec<Frame>,
    pub gain: f64,
    /// Per-channel source coupling, relative to the channel gain.
    pub coupling: Vec<f64>,
    /// Source gains in effect at the last sync, zero before the first.
    pub sync_gain: Vec<f64>,
    pub source_generation: u32,
    pub index_cache: Option<IndexCache>,
}

impl Integration {
    pub fn new(frames: Vec<Frame>, channels: usize) -> Self {
        Self {
            frames,
            gain: 1.0,
            coupling: vec![1.0; channels],
            sync_gain: vec![0.0; channels],
            source_generation: 0,
            index_cache: None,
        }
    }

    pub fn samples(&self) -> usize {
        self.frames.iter().map(|f| f.data.len()).sum()
    }

    /// Current source gain per channel: channel gain times coupling.
    pub fn source_gains(&self, instrument: &Instrument) -> Vec<f64> {
        instrument
            .channels
            .iter()
            .map(|c| c.gain * self.coupling.get(c.index).copied().unwrap_or(1.0))
            .collect()
    }
}

#[derive(Clone, Debug)]
pub struct Scan {
    pub id: String,
    /// Nominal pointing of the scan.
    pub equatorial: SphericalCoordinates,
    pub integrations: Vec<Integration>,
    /// Relative weight in a weighted scan combination.
    pub weight: f64,
    /// Map-plane offsets covered, filled by the corner search.
    pub x_range: Range,
    pub y_range: Range,
}

impl Scan {
    pub fn new(id: impl Into<String>, equatorial: SphericalCoordinates) -> Self {
        Self {
            id: id.into(),
            equatorial,
            integrations: Vec::new(),
            weight: 1.0,
            x_range: Range::empty(),
            y_range: Range::empty(),
        }
    }

    pub fn frames(&self) -> usize {
        self.integrations.iter().map(|i| i.frames.len()).sum()
    }

    pub fn samples(&self) -> usize {
        self.integrations.iter().map(Integration::samples).sum()
    }
}
