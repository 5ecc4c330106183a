use ndarray::{Array2, Zip};

use crate::consts::{PARALLEL_PIXEL_THRESHOLD, SIGMAS_IN_FWHM, SMOOTHING_KERNEL_EXTENT};

use super::accumulation::AccumulationPlane;

/// Images produced by a weighted Gaussian smoothing pass.
pub struct Smoothed {
    pub value: Array2<f64>,
    pub weight: Array2<f64>,
    pub exposure: Array2<f64>,
}

impl AccumulationPlane {
    /// Convolve with a Gaussian of `fwhm` (radians), propagating noise exactly.
    pub fn smooth(&mut self, fwhm: f64, resolution: (f64, f64)) {
        if !(fwhm > 0.0) {
            return;
        }
        let smoothed = self.smoothed(fwhm, resolution, None);

        Zip::from(&mut self.signal)
            .and(&mut self.weight)
            .and(&smoothed.value)
            .and(&smoothed.weight)
            .for_each(|s, w, &v, &sw| {
                *w = sw;
                *s = v * sw;
            });
        self.exposure = smoothed.exposure;
        self.beam.smooth_fwhm = self.beam.smooth_fwhm.hypot(fwhm);
    }

    /// Smooth just enough to reach a total smoothing of `fwhm`.
    pub fn smooth_to(&mut self, fwhm: f64, resolution: (f64, f64)) {
        let current = self.beam.smooth_fwhm;
        if fwhm <= current {
            return;
        }
        self.smooth((fwhm * fwhm - current * current).sqrt(), resolution);
        self.beam.smooth_fwhm = fwhm;
    }

    /// Weighted Gaussian smoothing over valid pixels not in `skip`.
    ///
    /// The smoothed value is `K*(w v) / K*w` and the smoothed weight
    /// `(K*w)^2 / K^2*w`, so the kernel normalization cancels.
    pub fn smoothed(
        &self,
        fwhm: f64,
        resolution: (f64, f64),
        skip: Option<&Array2<bool>>,
    ) -> Smoothed {
        let kx = gaussian_kernel(fwhm / resolution.0);
        let ky = gaussian_kernel(fwhm / resolution.1);
        let kx2: Vec<f64> = kx.iter().map(|k| k * k).collect();
        let ky2: Vec<f64> = ky.iter().map(|k| k * k).collect();

        let dim = self.dim();
        let mut used = Array2::<f64>::zeros(dim);
        let mut w = Array2::<f64>::zeros(dim);
        let mut wv = Array2::<f64>::zeros(dim);
        let mut wt = Array2::<f64>::zeros(dim);
        Zip::indexed(&mut used)
            .and(&mut w)
            .and(&mut wv)
            .and(&mut wt)
            .for_each(|(i, j), u, w, wv, wt| {
                if self.is_valid(i, j) && !skip.is_some_and(|s| s[[i, j]]) {
                    *u = 1.0;
                    *w = self.weight[[i, j]];
                    *wv = self.signal[[i, j]];
                    *wt = self.exposure[[i, j]];
                }
            });

        let cw = convolve(&w, &kx, &ky);
        let cwv = convolve(&wv, &kx, &ky);
        let cw2 = convolve(&w, &kx2, &ky2);
        let cu = convolve(&used, &kx, &ky);
        let cwt = convolve(&wt, &kx, &ky);

        let mut value = Array2::zeros(dim);
        let mut weight = Array2::zeros(dim);
        let mut exposure = Array2::zeros(dim);
        Zip::from(&mut value)
            .and(&mut weight)
            .and(&cw)
            .and(&cwv)
            .and(&cw2)
            .for_each(|v, sw, &cw, &cwv, &cw2| {
                if cw > 0.0 && cw2 > 0.0 {
                    *v = cwv / cw;
                    *sw = cw * cw / cw2;
                }
            });
        Zip::from(&mut exposure)
            .and(&cwt)
            .and(&cu)
            .for_each(|e, &t, &u| {
                if u > 0.0 {
                    *e = t / u;
                }
            });

        Smoothed {
            value,
            weight,
            exposure,
        }
    }
}

/// Unnormalized Gaussian with unit peak, truncated at the kernel extent.
pub(crate) fn gaussian_kernel(fwhm_pixels: f64) -> Vec<f64> {
    let sigma = fwhm_pixels / SIGMAS_IN_FWHM;
    if !(sigma > 0.0) {
        return vec![1.0];
    }
    let radius = (SMOOTHING_KERNEL_EXTENT * fwhm_pixels).ceil() as usize;
    let s2 = 2.0 * sigma * sigma;
    (0..=2 * radius)
        .map(|k| {
            let x = k as f64 - radius as f64;
            (-x * x / s2).exp()
        })
        .collect()
}

/// Separable zero-padded convolution: `kx` along axis 0, `ky` along axis 1.
pub(crate) fn convolve(data: &Array2<f64>, kx: &[f64], ky: &[f64]) -> Array2<f64> {
    let pass = convolve_axis(data, ky, 1);
    convolve_axis(&pass, kx, 0)
}

fn convolve_axis(data: &Array2<f64>, kernel: &[f64], axis: usize) -> Array2<f64> {
    let (sx, sy) = data.dim();
    let radius = (kernel.len() / 2) as isize;
    let len = (if axis == 0 { sx } else { sy }) as isize;

    let sample = |i: usize, j: usize| -> f64 {
        let centre = (if axis == 0 { i } else { j }) as isize;
        let mut sum = 0.0;
        for (k, &kv) in kernel.iter().enumerate() {
            let src = centre + k as isize - radius;
            if src < 0 || src >= len {
                continue;
            }
            sum += kv
                * if axis == 0 {
                    data[[src as usize, j]]
                } else {
                    data[[i, src as usize]]
                };
        }
        sum
    };

    let mut result = Array2::<f64>::zeros((sx, sy));
    if sx * sy >= PARALLEL_PIXEL_THRESHOLD {
        Zip::indexed(&mut result).par_for_each(|(i, j), v| *v = sample(i, j));
    } else {
        Zip::indexed(&mut result).for_each(|(i, j), v| *v = sample(i, j));
    }
    result
}
