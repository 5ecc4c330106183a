use std::fmt;

use serde::{Deserialize, Serialize};

use crate::consts::{ARCSEC, DEFAULT_INDEXING_SATURATION, DEFAULT_MIN_NEIGHBORS, DEFAULT_POINTING_SIGNIFICANCE};
use crate::error::{Result, SkymapError};
use crate::plane::{BlankingSign, Connectivity, MaskRule, PeakKind};
use crate::reduce::Partition;

/// Everything a reduction job needs beyond the data. Validated once with
/// [`ReductionConfig::validate`] before any work starts.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReductionConfig {
    /// Worker threads; `None` uses one per core.
    pub threads: Option<usize>,
    /// Accumulate/finalize/sync iterations.
    pub rounds: usize,
    pub model: ModelKind,
    pub partition: Partition,
    pub grid: GridConfig,
    pub smoothing: Option<SmoothingSpec>,
    pub filter: Option<FilterConfig>,
    pub blanking: BlankingConfig,
    pub clipping: ClippingConfig,
    /// Remove the map level in the first generation.
    pub level: bool,
    /// Use median-based statistics for levelling and scan weights.
    pub robust: bool,
    /// Correct unmasked pixels for time-stream filtering after the first round.
    pub filter_gain_correction: bool,
    pub coupling: Option<CouplingConfig>,
    pub scan_weighting: Option<WeightingMethod>,
    pub indexing: IndexingConfig,
    pub memory: MemoryConfig,
    pub spectral: SpectralConfig,
    pub pointing: Option<PointingConfig>,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self {
            threads: None,
            rounds: 3,
            model: ModelKind::Scalar,
            partition: Partition::Auto,
            grid: GridConfig::default(),
            smoothing: None,
            filter: None,
            blanking: BlankingConfig::default(),
            clipping: ClippingConfig::default(),
            level: true,
            robust: false,
            filter_gain_correction: false,
            coupling: None,
            scan_weighting: None,
            indexing: IndexingConfig::default(),
            memory: MemoryConfig::default(),
            spectral: SpectralConfig::default(),
            pointing: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// A single map.
    #[default]
    Scalar,
    /// One map per mapping pixel, ignoring focal-plane offsets (beam maps).
    Pixel,
    /// One map per spectral bin.
    Spectral,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar => write!(f, "Scalar"),
            Self::Pixel => write!(f, "Per-pixel"),
            Self::Spectral => write!(f, "Spectral"),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Pixel size in arcsec; defaults to a fifth of the beam.
    pub resolution: Option<f64>,
    /// Fixed map extent `[width, height]` in arcsec, centred on the reference.
    pub fixed_size: Option<[f64; 2]>,
}

/// Smoothing applied when finalizing each generation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SmoothingSpec {
    Minimal,
    HalfBeam,
    TwoThirdsBeam,
    Beam,
    /// Matched filter for point sources (beam-sized).
    Optimal,
    /// Explicit FWHM in arcsec.
    Fwhm(f64),
}

impl SmoothingSpec {
    /// Smoothing FWHM in radians for an instrument beam of `beam` radians.
    pub fn fwhm(&self, beam: f64) -> f64 {
        match self {
            Self::Minimal => 0.3 * beam,
            Self::HalfBeam => 0.5 * beam,
            Self::TwoThirdsBeam => 2.0 / 3.0 * beam,
            Self::Beam | Self::Optimal => beam,
            Self::Fwhm(arcsec) => arcsec * ARCSEC,
        }
    }
}

impl fmt::Display for SmoothingSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minimal => write!(f, "Minimal"),
            Self::HalfBeam => write!(f, "Half beam"),
            Self::TwoThirdsBeam => write!(f, "2/3 beam"),
            Self::Beam => write!(f, "Beam"),
            Self::Optimal => write!(f, "Optimal"),
            Self::Fwhm(arcsec) => write!(f, "{arcsec}\""),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    Convolution,
    #[default]
    Fft,
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Convolution => write!(f, "Convolution"),
            Self::Fft => write!(f, "FFT"),
        }
    }
}

/// Large-scale structure filter.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub mode: FilterMode,
    /// Filter FWHM in arcsec; defaults to five times the source size.
    pub fwhm: Option<f64>,
    /// Pixels above this significance are left out of the filter estimate.
    pub blank: Option<f64>,
    /// Apply the point-source flux correction to unmasked pixels.
    pub correct: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            mode: FilterMode::Fft,
            fwhm: None,
            blank: Some(6.0),
            correct: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BlankingConfig {
    /// Significance above which pixels are masked as source.
    pub level: Option<f64>,
    pub sign: BlankingSign,
    pub min_neighbors: usize,
    pub connectivity: Connectivity,
}

impl Default for BlankingConfig {
    fn default() -> Self {
        Self {
            level: Some(10.0),
            sign: BlankingSign::Both,
            min_neighbors: DEFAULT_MIN_NEIGHBORS,
            connectivity: Connectivity::Four,
        }
    }
}

impl BlankingConfig {
    pub fn rule(&self) -> MaskRule {
        MaskRule {
            level: self.level,
            sign: self.sign,
            min_neighbors: self.min_neighbors,
            connectivity: self.connectivity,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClippingConfig {
    /// Clip pixels exposed less than this fraction of the typical exposure.
    pub exposure: Option<f64>,
    /// Clip pixels noisier than this multiple of the typical noise.
    pub noise: Option<f64>,
    /// Clip pixels below this significance.
    pub s2n: Option<f64>,
    /// Clip pixels covered by fewer than this many samples' worth of time.
    pub redundancy: Option<f64>,
    /// Flag pixels deviating from their neighbours by this many sigma.
    pub despike: Option<f64>,
}

impl Default for ClippingConfig {
    fn default() -> Self {
        Self {
            exposure: Some(0.05),
            noise: None,
            s2n: None,
            redundancy: None,
            despike: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CouplingConfig {
    /// Couplings outside `[min, max]` are reset to one.
    pub min: f64,
    pub max: f64,
}

impl Default for CouplingConfig {
    fn default() -> Self {
        Self { min: 0.3, max: 3.0 }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightingMethod {
    #[default]
    Rms,
    Robust,
}

impl WeightingMethod {
    pub fn is_robust(&self) -> bool {
        matches!(self, Self::Robust)
    }
}

impl fmt::Display for WeightingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rms => write!(f, "RMS"),
            Self::Robust => write!(f, "Robust"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    pub enabled: bool,
    /// Fraction of the free memory the index cache may take.
    pub saturation: f64,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            saturation: DEFAULT_INDEXING_SATURATION,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Memory available to the job; unlimited when unset.
    pub max_bytes: Option<u64>,
    /// Bytes already committed elsewhere (scan data, buffers).
    pub reserved_bytes: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralConfig {
    /// Bin width in axis units (Hz, m, or decades when logarithmic).
    pub resolution: Option<f64>,
    pub resolving_power: Option<f64>,
    /// Use wavelength instead of frequency.
    pub wavelength: bool,
    pub logarithmic: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointingMethod {
    Peak,
    #[default]
    Centroid,
}

impl fmt::Display for PointingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Peak => write!(f, "Peak"),
            Self::Centroid => write!(f, "Centroid"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PointingConfig {
    pub method: PointingMethod,
    pub kind: PeakKind,
    /// Minimum significance of an accepted source.
    pub significance: f64,
    /// Relative exposure clip applied before the search.
    pub exposure_clip: Option<f64>,
}

impl Default for PointingConfig {
    fn default() -> Self {
        Self {
            method: PointingMethod::Centroid,
            kind: PeakKind::Max,
            significance: DEFAULT_POINTING_SIGNIFICANCE,
            exposure_clip: Some(0.5),
        }
    }
}

impl ReductionConfig {
    /// Reject inconsistent settings before any work starts.
    pub fn validate(&self) -> Result<()> {
        if self.threads == Some(0) {
            return invalid("threads must be at least 1");
        }
        if self.rounds == 0 {
            return invalid("rounds must be at least 1");
        }
        if let Some(res) = self.grid.resolution {
            positive("grid.resolution", res)?;
        }
        if let Some([w, h]) = self.grid.fixed_size {
            positive("grid.fixed_size width", w)?;
            positive("grid.fixed_size height", h)?;
        }
        if let Some(SmoothingSpec::Fwhm(fwhm)) = self.smoothing {
            positive("smoothing fwhm", fwhm)?;
        }
        if let Some(filter) = &self.filter {
            if let Some(fwhm) = filter.fwhm {
                positive("filter.fwhm", fwhm)?;
            }
            if let Some(blank) = filter.blank {
                positive("filter.blank", blank)?;
            }
        }
        if let Some(level) = self.blanking.level {
            if level <= 0.0 {
                return invalid(format!("blanking.level must be positive, got {level}"));
            }
        }
        let max_neighbors = match self.blanking.connectivity {
            Connectivity::Four => 4,
            Connectivity::Eight => 8,
        };
        if self.blanking.min_neighbors > max_neighbors {
            return invalid(format!(
                "blanking.min_neighbors = {} exceeds the {} neighbourhood",
                self.blanking.min_neighbors, self.blanking.connectivity
            ));
        }
        let clip = &self.clipping;
        for (name, value) in [
            ("clipping.exposure", clip.exposure),
            ("clipping.noise", clip.noise),
            ("clipping.redundancy", clip.redundancy),
            ("clipping.despike", clip.despike),
        ] {
            if let Some(v) = value {
                positive(name, v)?;
            }
        }
        if let Some(coupling) = &self.coupling {
            if !(coupling.min > 0.0 && coupling.min < coupling.max) {
                return invalid(format!(
                    "coupling range [{}, {}] is empty",
                    coupling.min, coupling.max
                ));
            }
        }
        if !(self.indexing.saturation > 0.0 && self.indexing.saturation <= 1.0) {
            return invalid(format!(
                "indexing.saturation must be in (0, 1], got {}",
                self.indexing.saturation
            ));
        }
        if let Some(max) = self.memory.max_bytes {
            if max <= self.memory.reserved_bytes {
                return invalid(format!(
                    "memory.max_bytes ({max}) must exceed memory.reserved_bytes ({})",
                    self.memory.reserved_bytes
                ));
            }
        }
        if let Some(res) = self.spectral.resolution {
            positive("spectral.resolution", res)?;
        }
        if let Some(r) = self.spectral.resolving_power {
            positive("spectral.resolving_power", r)?;
        }
        if let Some(pointing) = &self.pointing {
            positive("pointing.significance", pointing.significance)?;
        }
        Ok(())
    }

    /// Worker thread count, zero meaning one per core.
    pub fn thread_count(&self) -> usize {
        self.threads.unwrap_or(0)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| SkymapError::Serialization(e.to_string()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| SkymapError::InvalidConfig(e.to_string()))
    }
}

fn invalid(message: impl Into<String>) -> Result<()> {
    Err(SkymapError::InvalidConfig(message.into()))
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        invalid(format!("{name} must be positive, got {value}"))
    }
}
