/// One arcsecond in radians.
pub const ARCSEC: f64 = std::f64::consts::PI / (180.0 * 3600.0);

/// One degree in radians.
pub const DEGREE: f64 = std::f64::consts::PI / 180.0;

/// Speed of light in m/s, for frequency/wavelength conversion.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Number of Gaussian sigmas in one FWHM: 2 sqrt(2 ln 2).
pub const SIGMAS_IN_FWHM: f64 = 2.354_820_045_030_949;

/// Side of the square with the same area as a unit-FWHM Gaussian beam.
pub const FWHM_TO_SIZE: f64 = 1.064_467_019_431_226_5;

/// Default grid resolution as a fraction of the instrument beam.
pub const DEFAULT_BEAM_SAMPLING: f64 = 5.0;

/// Pixels padded around the corner-search bounding box (one on each side).
pub const MAP_PADDING_PIXELS: usize = 2;

/// Minimum pixel count (size_x * size_y) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Bytes per plane pixel: signal, weight and exposure (f64), the flag byte
/// and one mask bit.
pub const PLANE_PIXEL_FOOTPRINT: f64 = 8.0 * 3.0 + 1.0 + 1.0 / 8.0;

/// Bytes per pixel of the full-precision base image.
pub const BASE_PIXEL_FOOTPRINT: u64 = 8;

/// Bytes per cached packed pixel index.
pub const INDEX_ENTRY_BYTES: u64 = 8;

/// Default fraction of the free budget the index cache may occupy.
pub const DEFAULT_INDEXING_SATURATION: f64 = 0.5;

/// Default minimum count of valid neighbours for an unmasked pixel.
pub const DEFAULT_MIN_NEIGHBORS: usize = 3;

/// Gaussian kernel extent, in FWHM on each side of the center.
pub const SMOOTHING_KERNEL_EXTENT: f64 = 2.0;

/// Reference percentile for relative exposure clipping.
pub const EXPOSURE_CLIP_PERCENTILE: f64 = 0.95;

/// Reference percentile for relative noise clipping.
pub const NOISE_CLIP_PERCENTILE: f64 = 0.05;

/// median(chi^2) of a unit normal variable.
pub const MEDIAN_CHI2: f64 = 0.454_937;

/// Default spectral resolving power when no spectral grid is configured.
pub const DEFAULT_RESOLVING_POWER: f64 = 1000.0;

/// Default significance required for a pointing peak.
pub const DEFAULT_POINTING_SIGNIFICANCE: f64 = 5.0;

/// Small epsilon to avoid division by zero in floating-point comparisons.
pub const EPSILON: f64 = 1e-12;
