use serde::{Deserialize, Serialize};

use crate::consts::ARCSEC;
use crate::grid::{Offset2D, Range};

/// Channel flag bits.
pub mod channel_flags {
    pub const DEAD: u32 = 1 << 0;
    pub const BLIND: u32 = 1 << 1;
    pub const DISCARD: u32 = 1 << 2;
    pub const SPIKY: u32 = 1 << 3;
}

/// One detector channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub index: usize,
    /// Mapping pixel this channel belongs to (several channels may share one).
    pub pixel: usize,
    /// Focal-plane offset from the pointing centre, radians.
    pub position: Offset2D,
    pub gain: f64,
    pub variance: f64,
    pub flag: u32,
    /// Observing frequency in Hz, for spectral maps.
    pub frequency: Option<f64>,
}

impl Channel {
    pub fn new(index: usize, pixel: usize, position: Offset2D) -> Self {
        Self {
            index,
            pixel,
            position,
            gain: 1.0,
            variance: 1.0,
            flag: 0,
            frequency: None,
        }
    }

    pub fn is_flagged(&self, pattern: u32) -> bool {
        self.flag & pattern != 0
    }
}

/// Static description of the instrument that produced a set of scans.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub name: String,
    /// Beam FWHM, radians.
    pub resolution: f64,
    /// Display unit for angular sizes, radians.
    pub size_unit: f64,
    /// Sample spacing in seconds.
    pub sampling_interval: f64,
    /// Fraction of point-source flux that survives time-stream filtering.
    pub source_filtering: f64,
    pub channels: Vec<Channel>,
    /// Channels carrying any of these flags never see the source.
    pub sourceless_flags: u32,
}

impl Instrument {
    pub fn new(name: impl Into<String>, resolution: f64, sampling_interval: f64) -> Self {
        Self {
            name: name.into(),
            resolution,
            size_unit: ARCSEC,
            sampling_interval,
            source_filtering: 1.0,
            channels: Vec::new(),
            sourceless_flags: channel_flags::DEAD | channel_flags::BLIND | channel_flags::DISCARD,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Indices of the channels that contribute to the source model.
    pub fn mapping_channels(&self) -> Vec<usize> {
        self.channels
            .iter()
            .filter(|c| !c.is_flagged(self.sourceless_flags) && c.gain != 0.0 && c.variance > 0.0)
            .map(|c| c.index)
            .collect()
    }

    /// Distinct mapping pixels, sorted.
    pub fn mapping_pixels(&self) -> Vec<usize> {
        let mut pixels: Vec<usize> = self
            .mapping_channels()
            .into_iter()
            .map(|c| self.channels[c].pixel)
            .collect();
        pixels.sort_unstable();
        pixels.dedup();
        pixels
    }

    pub fn frequency_range(&self) -> Range {
        let mut range = Range::empty();
        for c in self.mapping_channels() {
            if let Some(f) = self.channels[c].frequency {
                range.include(f);
            }
        }
        range
    }

    /// Beam area of a Gaussian beam, steradians.
    pub fn beam_area(&self) -> f64 {
        let size = crate::consts::FWHM_TO_SIZE * self.resolution;
        size * size
    }
}
