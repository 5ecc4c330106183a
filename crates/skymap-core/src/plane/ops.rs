use ndarray::Zip;
use tracing::debug;

use crate::consts::{EXPOSURE_CLIP_PERCENTILE, MEDIAN_CHI2, NOISE_CLIP_PERCENTILE};

use super::accumulation::{pixel_flags, AccumulationPlane};
use super::stats;

impl AccumulationPlane {
    /// Flag pixels exposed for less than `min_time` seconds.
    pub fn clip_below_exposure(&mut self, min_time: f64) -> usize {
        let mut clipped = 0;
        Zip::from(&mut self.flag)
            .and(&self.weight)
            .and(&self.exposure)
            .for_each(|f, &w, &t| {
                if w > 0.0 && t < min_time {
                    *f |= pixel_flags::CLIPPED;
                    clipped += 1;
                }
            });
        clipped
    }

    /// Flag pixels exposed for less than `fraction` of the typical
    /// (95th percentile) exposure.
    pub fn clip_below_relative_exposure(&mut self, fraction: f64) -> usize {
        let mut times: Vec<f64> = self.valid_values(|p, i, j| p.exposure[[i, j]]);
        let Some(reference) = stats::select(&mut times, EXPOSURE_CLIP_PERCENTILE) else {
            return 0;
        };
        let clipped = self.clip_below_exposure(fraction * reference);
        debug!(fraction, reference, clipped, "Relative exposure clip");
        clipped
    }

    /// Flag pixels noisier than `max_rms`.
    pub fn clip_above_rms(&mut self, max_rms: f64) -> usize {
        // rms > max  <=>  weight < 1/max^2
        let min_weight = 1.0 / (max_rms * max_rms);
        let mut clipped = 0;
        Zip::from(&mut self.flag)
            .and(&self.weight)
            .for_each(|f, &w| {
                if w > 0.0 && w < min_weight {
                    *f |= pixel_flags::CLIPPED;
                    clipped += 1;
                }
            });
        clipped
    }

    /// Flag pixels noisier than `factor` times the typical (5th percentile)
    /// noise.
    pub fn clip_above_relative_rms(&mut self, factor: f64) -> usize {
        let mut rms: Vec<f64> = self.valid_values(|p, i, j| p.noise(i, j));
        let Some(reference) = stats::select(&mut rms, NOISE_CLIP_PERCENTILE) else {
            return 0;
        };
        let clipped = self.clip_above_rms(factor * reference);
        debug!(factor, reference, clipped, "Relative noise clip");
        clipped
    }

    /// Flag pixels whose significance is below `level`.
    pub fn s2n_clip_below(&mut self, level: f64) -> usize {
        let mut clipped = 0;
        Zip::from(&mut self.flag)
            .and(&self.signal)
            .and(&self.weight)
            .for_each(|f, &s, &w| {
                if w > 0.0 && s / w.sqrt() < level {
                    *f |= pixel_flags::CLIPPED;
                    clipped += 1;
                }
            });
        self.beam.clipping_s2n = Some(level);
        clipped
    }

    /// Flag pixels that deviate from the weighted mean of their four
    /// neighbours by more than `level` sigma.
    pub fn despike(&mut self, level: f64) -> usize {
        let (sx, sy) = self.dim();
        let mut spikes = Vec::new();

        for i in 0..sx {
            for j in 0..sy {
                if !self.is_valid(i, j) {
                    continue;
                }
                let mut sum = 0.0;
                let mut sum_w = 0.0;
                for (ni, nj) in neighbours4(i, j, sx, sy) {
                    if self.is_valid(ni, nj) {
                        sum += self.signal[[ni, nj]];
                        sum_w += self.weight[[ni, nj]];
                    }
                }
                if sum_w <= 0.0 {
                    continue;
                }
                let w = self.weight[[i, j]];
                let deviation = self.value(i, j) - sum / sum_w;
                let variance = 1.0 / w + 1.0 / sum_w;
                if (deviation / variance.sqrt()).abs() > level {
                    spikes.push((i, j));
                }
            }
        }

        for &(i, j) in &spikes {
            self.flag[[i, j]] |= pixel_flags::SPIKE;
        }
        if !spikes.is_empty() {
            debug!(level, spikes = spikes.len(), "Despiked plane");
        }
        spikes.len()
    }

    /// Weighted mean (or, when `robust`, weighted median) of valid pixels.
    pub fn weighted_level(&self, robust: bool) -> Option<f64> {
        if robust {
            let mut points = self.valid_values(|p, i, j| (p.value(i, j), p.weight[[i, j]]));
            stats::weighted_median(&mut points)
        } else {
            let (mut sum, mut sum_w) = (0.0, 0.0);
            Zip::from(&self.signal)
                .and(&self.weight)
                .and(&self.flag)
                .for_each(|&s, &w, &f| {
                    if w > 0.0 && f & pixel_flags::CRITICAL == 0 {
                        sum += s;
                        sum_w += w;
                    }
                });
            (sum_w > 0.0).then(|| sum / sum_w)
        }
    }

    /// Subtract the weighted level from every valid pixel. Returns the level.
    pub fn level(&mut self, robust: bool) -> f64 {
        let Some(level) = self.weighted_level(robust) else {
            return 0.0;
        };
        Zip::from(&mut self.signal)
            .and(&self.weight)
            .for_each(|s, &w| {
                if w > 0.0 {
                    *s -= level * w;
                }
            });
        level
    }

    /// Reduced chi-squared of the significance image. The robust estimate
    /// uses the median of s^2, scaled to match a unit normal.
    pub fn chi2(&self, robust: bool) -> f64 {
        let mut s2: Vec<f64> = self.valid_values(|p, i, j| p.significance(i, j).powi(2));
        if s2.is_empty() {
            return f64::NAN;
        }
        if robust {
            stats::median(&mut s2).map_or(f64::NAN, |m| m / MEDIAN_CHI2)
        } else {
            s2.iter().sum::<f64>() / s2.len() as f64
        }
    }

    fn valid_values<T>(&self, f: impl Fn(&Self, usize, usize) -> T) -> Vec<T> {
        let (sx, sy) = self.dim();
        let mut out = Vec::with_capacity(sx * sy);
        for i in 0..sx {
            for j in 0..sy {
                if self.is_valid(i, j) {
                    out.push(f(self, i, j));
                }
            }
        }
        out
    }
}

pub(crate) fn neighbours4(
    i: usize,
    j: usize,
    size_x: usize,
    size_y: usize,
) -> impl Iterator<Item = (usize, usize)> {
    const STEPS: [(isize, isize); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];
    neighbours(i, j, size_x, size_y, &STEPS)
}

pub(crate) fn neighbours8(
    i: usize,
    j: usize,
    size_x: usize,
    size_y: usize,
) -> impl Iterator<Item = (usize, usize)> {
    const STEPS: [(isize, isize); 8] = [
        (-1, -1),
        (-1, 0),
        (-1, 1),
        (0, -1),
        (0, 1),
        (1, -1),
        (1, 0),
        (1, 1),
    ];
    neighbours(i, j, size_x, size_y, &STEPS)
}

fn neighbours(
    i: usize,
    j: usize,
    size_x: usize,
    size_y: usize,
    steps: &'static [(isize, isize)],
) -> impl Iterator<Item = (usize, usize)> {
    steps.iter().filter_map(move |&(di, dj)| {
        let ni = i.checked_add_signed(di)?;
        let nj = j.checked_add_signed(dj)?;
        (ni < size_x && nj < size_y).then_some((ni, nj))
    })
}
