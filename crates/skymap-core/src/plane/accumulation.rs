use ndarray::{Array2, Zip};
use serde::Serialize;

use crate::consts::FWHM_TO_SIZE;
use crate::reduce::Accumulator;

/// Pixel flag bits.
pub mod pixel_flags {
    /// Removed by a clipping step.
    pub const CLIPPED: u8 = 1 << 0;
    /// Masked as bright source (mirrors the mask for output).
    pub const BLANKED: u8 = 1 << 1;
    /// Removed by despiking.
    pub const SPIKE: u8 = 1 << 2;

    /// Flags that invalidate a pixel regardless of its weight.
    pub const CRITICAL: u8 = CLIPPED | SPIKE;
}

/// Effective beam and processing history of a plane.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BeamState {
    /// FWHM of the smoothing already applied (radians).
    pub smooth_fwhm: f64,
    /// Effective FWHM of the large-scale structure filter, if filtered.
    pub ext_filter_fwhm: Option<f64>,
    pub correcting_fwhm: Option<f64>,
    pub filter_blanking: Option<f64>,
    pub filter_correction: f64,
    pub clipping_s2n: Option<f64>,
}

impl BeamState {
    pub fn new(pixel_size: f64) -> Self {
        Self {
            smooth_fwhm: pixel_size / FWHM_TO_SIZE,
            ext_filter_fwhm: None,
            correcting_fwhm: None,
            filter_blanking: None,
            filter_correction: 1.0,
            clipping_s2n: None,
        }
    }
}

/// Noise-weighted accumulation of one map plane.
///
/// Arrays are shaped `(size_x, size_y)` and indexed `[[i, j]]`. The value of a
/// pixel is `signal / weight`; pixels with zero weight have no data.
#[derive(Clone, Debug)]
pub struct AccumulationPlane {
    pub(crate) signal: Array2<f64>,
    pub(crate) weight: Array2<f64>,
    pub(crate) exposure: Array2<f64>,
    pub(crate) flag: Array2<u8>,
    pub beam: BeamState,
    /// Total integration time added, seconds.
    pub integration_time: f64,
    pixel_size: f64,
}

impl AccumulationPlane {
    pub fn new(size_x: usize, size_y: usize, pixel_size: f64) -> Self {
        Self {
            signal: Array2::zeros((size_x, size_y)),
            weight: Array2::zeros((size_x, size_y)),
            exposure: Array2::zeros((size_x, size_y)),
            flag: Array2::zeros((size_x, size_y)),
            beam: BeamState::new(pixel_size),
            integration_time: 0.0,
            pixel_size,
        }
    }

    /// A zeroed plane of the same shape.
    pub fn empty_like(&self) -> Self {
        let (sx, sy) = self.dim();
        Self::new(sx, sy, self.pixel_size)
    }

    pub fn dim(&self) -> (usize, usize) {
        self.signal.dim()
    }

    pub fn pixels(&self) -> usize {
        self.signal.len()
    }

    pub fn pixel_size(&self) -> f64 {
        self.pixel_size
    }

    pub fn clear(&mut self) {
        self.signal.fill(0.0);
        self.weight.fill(0.0);
        self.exposure.fill(0.0);
        self.flag.fill(0);
        self.beam = BeamState::new(self.pixel_size);
        self.integration_time = 0.0;
    }

    /// Add one sample `x` with gain `g` and weight `w`, exposed for `dt`.
    #[inline]
    pub fn add_point(&mut self, i: usize, j: usize, x: f64, g: f64, w: f64, dt: f64) {
        let gw = g * w;
        self.signal[[i, j]] += gw * x;
        self.weight[[i, j]] += gw * g;
        self.exposure[[i, j]] += dt;
    }

    /// Add another plane scaled by `scale`, pixels that are valid there only.
    pub fn add_weighted(&mut self, other: &AccumulationPlane, scale: f64) {
        Zip::indexed(&mut self.signal)
            .and(&mut self.weight)
            .and(&mut self.exposure)
            .and(&mut self.flag)
            .for_each(|(i, j), s, w, e, f| {
                if other.is_valid(i, j) {
                    *s += scale * other.signal[[i, j]];
                    *w += scale * other.weight[[i, j]];
                    *e += other.exposure[[i, j]];
                    *f &= !pixel_flags::CRITICAL;
                }
            });
        self.integration_time += other.integration_time;
    }

    pub fn signal(&self) -> &Array2<f64> {
        &self.signal
    }

    pub fn weight(&self) -> &Array2<f64> {
        &self.weight
    }

    pub fn exposure(&self) -> &Array2<f64> {
        &self.exposure
    }

    pub fn flag(&self) -> &Array2<u8> {
        &self.flag
    }

    #[inline]
    pub fn is_valid(&self, i: usize, j: usize) -> bool {
        self.weight[[i, j]] > 0.0 && self.flag[[i, j]] & pixel_flags::CRITICAL == 0
    }

    #[inline]
    pub fn value(&self, i: usize, j: usize) -> f64 {
        let w = self.weight[[i, j]];
        if w > 0.0 {
            self.signal[[i, j]] / w
        } else {
            0.0
        }
    }

    #[inline]
    pub fn noise(&self, i: usize, j: usize) -> f64 {
        let w = self.weight[[i, j]];
        if w > 0.0 {
            w.recip().sqrt()
        } else {
            f64::INFINITY
        }
    }

    #[inline]
    pub fn significance(&self, i: usize, j: usize) -> f64 {
        let w = self.weight[[i, j]];
        if w > 0.0 {
            self.signal[[i, j]] / w.sqrt()
        } else {
            0.0
        }
    }

    /// Replace the value of a pixel, keeping its weight.
    pub fn set_value(&mut self, i: usize, j: usize, value: f64) {
        self.signal[[i, j]] = value * self.weight[[i, j]];
    }

    pub fn flag_pixel(&mut self, i: usize, j: usize, pattern: u8) {
        self.flag[[i, j]] |= pattern;
    }

    pub fn unflag_pixel(&mut self, i: usize, j: usize, pattern: u8) {
        self.flag[[i, j]] &= !pattern;
    }

    /// `true` when no pixel holds any weight.
    pub fn is_empty(&self) -> bool {
        !self.weight.iter().any(|&w| w > 0.0)
    }

    pub fn count_points(&self) -> usize {
        Zip::from(&self.weight)
            .and(&self.flag)
            .fold(0, |n, &w, &f| n + usize::from(w > 0.0 && f & pixel_flags::CRITICAL == 0))
    }

    /// Add a value image to every pixel with data.
    pub fn add_image(&mut self, image: &Array2<f64>) {
        Zip::from(&mut self.signal)
            .and(&self.weight)
            .and(image)
            .for_each(|s, &w, &v| {
                if w > 0.0 {
                    *s += v * w;
                }
            });
    }

    /// Remove the data of pixels carrying critical flags.
    pub fn sanitize(&mut self) {
        Zip::from(&mut self.signal)
            .and(&mut self.weight)
            .and(&self.flag)
            .for_each(|s, w, &f| {
                if f & pixel_flags::CRITICAL != 0 {
                    *s = 0.0;
                    *w = 0.0;
                }
            });
    }

    /// Value image, zero where invalid.
    pub fn value_map(&self) -> Array2<f64> {
        let mut out = Array2::zeros(self.dim());
        Zip::indexed(&mut out).for_each(|(i, j), v| {
            if self.is_valid(i, j) {
                *v = self.value(i, j);
            }
        });
        out
    }

    /// Noise image, NaN where invalid.
    pub fn noise_map(&self) -> Array2<f64> {
        let mut out = Array2::from_elem(self.dim(), f64::NAN);
        Zip::indexed(&mut out).for_each(|(i, j), v| {
            if self.is_valid(i, j) {
                *v = self.noise(i, j);
            }
        });
        out
    }

    pub fn significance_map(&self) -> Array2<f64> {
        let mut out = Array2::zeros(self.dim());
        Zip::indexed(&mut out).for_each(|(i, j), v| {
            if self.is_valid(i, j) {
                *v = self.significance(i, j);
            }
        });
        out
    }

    /// Boolean image of valid pixels.
    pub fn validity_map(&self) -> Array2<bool> {
        let mut out = Array2::from_elem(self.dim(), false);
        Zip::indexed(&mut out).for_each(|(i, j), v| *v = self.is_valid(i, j));
        out
    }

    /// Copy the value image into `base`, zero where invalid.
    pub fn copy_values_to(&self, base: &mut Array2<f64>) {
        Zip::indexed(base).for_each(|(i, j), b| {
            *b = if self.is_valid(i, j) {
                self.value(i, j)
            } else {
                0.0
            };
        });
    }
}

impl Accumulator for AccumulationPlane {
    fn merge(&mut self, other: &Self) {
        self.signal += &other.signal;
        self.weight += &other.weight;
        self.exposure += &other.exposure;
        self.integration_time += other.integration_time;
    }
}
