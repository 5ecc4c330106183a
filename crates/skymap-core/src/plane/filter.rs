use std::f64::consts::TAU;

use ndarray::{Array2, Zip};
use num_complex::Complex;
use tracing::{debug, warn};

use crate::consts::SIGMAS_IN_FWHM;

use super::accumulation::AccumulationPlane;
use super::fft::{fft2d_in_place, signed_frequency};

/// Pixels excluded from the extended-structure estimate: invalid ones, and
/// those brighter than `blank` sigma when set. Taken once, before filtering.
pub fn skip_mask(plane: &AccumulationPlane, blank: Option<f64>) -> Array2<bool> {
    let mut skip = Array2::from_elem(plane.dim(), false);
    Zip::indexed(&mut skip).for_each(|(i, j), s| {
        *s = !plane.is_valid(i, j)
            || blank.is_some_and(|level| plane.significance(i, j).abs() > level);
    });
    skip
}

impl AccumulationPlane {
    /// Remove structures larger than `fwhm` by subtracting a smoothed copy.
    pub fn filter_above(&mut self, fwhm: f64, resolution: (f64, f64), skip: &Array2<bool>) {
        let extended = self.smoothed(fwhm, resolution, Some(skip)).value;
        self.subtract_extended(&extended, 1.0);
        self.update_filtering(fwhm);
        debug!(fwhm, "Convolution filter applied");
    }

    /// Remove structures larger than `fwhm` with a Gaussian low-pass taper in
    /// the Fourier domain. The image is zero-padded to powers of two.
    pub fn fft_filter_above(&mut self, fwhm: f64, resolution: (f64, f64), skip: &Array2<bool>) {
        let (sx, sy) = self.dim();
        let (nx, ny) = (sx.next_power_of_two(), sy.next_power_of_two());

        let mut transformer = Array2::<Complex<f64>>::zeros((nx, ny));
        let mut sum_w = 0.0;
        let mut n = 0usize;
        for i in 0..sx {
            for j in 0..sy {
                if self.is_valid(i, j) && !skip[[i, j]] {
                    transformer[[i, j]] = Complex::new(self.signal[[i, j]], 0.0);
                    sum_w += self.weight[[i, j]];
                    n += 1;
                }
            }
        }
        if n == 0 {
            warn!("Nothing to filter: no unmasked pixels");
            return;
        }
        let mean_weight = sum_w / n as f64;

        fft2d_in_place(&mut transformer, false);

        let sigma_x = SIGMAS_IN_FWHM * nx as f64 * resolution.0 / (TAU * fwhm);
        let sigma_y = SIGMAS_IN_FWHM * ny as f64 * resolution.1 / (TAU * fwhm);
        let (ax, ay) = (-0.5 / (sigma_x * sigma_x), -0.5 / (sigma_y * sigma_y));

        Zip::indexed(&mut transformer).for_each(|(fi, fj), c| {
            let kx = signed_frequency(fi, nx);
            let ky = signed_frequency(fj, ny);
            *c *= (ax * kx * kx + ay * ky * ky).exp();
        });
        transformer[[0, 0]] = Complex::new(0.0, 0.0);

        fft2d_in_place(&mut transformer, true);

        let norm = 1.0 / (nx * ny) as f64;
        let extended = Array2::from_shape_fn((sx, sy), |(i, j)| transformer[[i, j]].re * norm);
        self.subtract_extended(&extended, 1.0 / mean_weight);
        self.update_filtering(fwhm);
        debug!(fwhm, nx, ny, mean_weight, "FFT filter applied");
    }

    /// Flux correction for point sources after filtering, given the
    /// instrument beam `beam_fwhm`. One when unfiltered.
    pub fn filter_correction_factor(&self, beam_fwhm: f64) -> f64 {
        let Some(e) = self.beam.ext_filter_fwhm else {
            return 1.0;
        };
        let f2 = beam_fwhm * beam_fwhm;
        let s2 = self.beam.smooth_fwhm * self.beam.smooth_fwhm;
        let factor = 1.0 / (1.0 - (f2 + s2) / (f2 + e * e));
        if factor.is_finite() && factor > 0.0 {
            factor
        } else {
            warn!(factor, filter_fwhm = e, "Filter correction out of range, using 1");
            1.0
        }
    }

    /// Record the filter correction and optionally apply it to pixels not in
    /// `skip`.
    pub fn filter_correct(&mut self, beam_fwhm: f64, skip: &Array2<bool>, apply: bool) {
        let factor = self.filter_correction_factor(beam_fwhm);
        self.beam.filter_correction = factor;
        if !apply || factor == 1.0 {
            return;
        }
        // value *= f and noise *= f, so signal /= f and weight /= f^2.
        let inv = 1.0 / factor;
        Zip::from(&mut self.signal)
            .and(&mut self.weight)
            .and(skip)
            .for_each(|s, w, &sk| {
                if !sk && *w > 0.0 {
                    *s *= inv;
                    *w *= inv * inv;
                }
            });
        self.beam.correcting_fwhm = self.beam.ext_filter_fwhm;
    }

    fn subtract_extended(&mut self, extended: &Array2<f64>, scale: f64) {
        Zip::from(&mut self.signal)
            .and(&self.weight)
            .and(extended)
            .for_each(|s, &w, &x| {
                if w > 0.0 {
                    *s -= scale * x * w;
                }
            });
    }

    fn update_filtering(&mut self, fwhm: f64) {
        self.beam.ext_filter_fwhm = Some(match self.beam.ext_filter_fwhm {
            Some(e) => 1.0 / (1.0 / (e * e) + 1.0 / (fwhm * fwhm)).sqrt(),
            None => fwhm,
        });
    }
}
