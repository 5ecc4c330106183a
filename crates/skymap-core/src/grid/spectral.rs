use serde::Serialize;

use crate::consts::{DEFAULT_RESOLVING_POWER, SPEED_OF_LIGHT};
use crate::error::{Result, SkymapError};
use crate::pipeline::config::SpectralConfig;

use super::grid2d::Range;

/// The third (spectral) axis of a frequency-resolved map.
///
/// Axis values are frequency in Hz, or wavelength in m when `wavelength` is
/// set, optionally on a log10 scale.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SpectralGrid {
    pub resolution: f64,
    pub reference_value: f64,
    pub reference_index: f64,
    pub size: usize,
    pub wavelength: bool,
    pub logarithmic: bool,
}

impl SpectralGrid {
    /// Build a grid spanning the channel frequency range `frequencies` (Hz).
    pub fn from_frequencies(frequencies: &Range, config: &SpectralConfig) -> Result<Self> {
        if frequencies.is_empty() || frequencies.min <= 0.0 {
            return Err(SkymapError::InvalidConfig(
                "spectral model requires positive channel frequencies".into(),
            ));
        }

        let mut axis = Range::empty();
        for f in [frequencies.min, frequencies.max] {
            axis.include(axis_transform(f, config.wavelength, config.logarithmic));
        }

        let reference_value = axis.midpoint();
        let resolution = match config.resolution {
            Some(delta) => delta,
            None => {
                let r = config.resolving_power.unwrap_or(DEFAULT_RESOLVING_POWER);
                if config.logarithmic {
                    0.5 * std::f64::consts::LOG10_2 / r
                } else {
                    0.5 * reference_value.abs() / r
                }
            }
        };
        if !(resolution > 0.0 && resolution.is_finite()) {
            return Err(SkymapError::InvalidConfig(format!(
                "spectral resolution must be positive, got {resolution}"
            )));
        }

        let half_bins = (reference_value - axis.min) / resolution;
        let size = 1.0 + (axis.span() / resolution).ceil();
        if !size.is_finite() || size < 1.0 {
            return Err(SkymapError::DegenerateGeometry {
                size_x: size as i64,
                size_y: 1,
            });
        }

        Ok(Self {
            resolution,
            reference_value,
            reference_index: half_bins,
            size: size as usize,
            wavelength: config.wavelength,
            logarithmic: config.logarithmic,
        })
    }

    pub fn axis_value(&self, frequency: f64) -> f64 {
        axis_transform(frequency, self.wavelength, self.logarithmic)
    }

    /// Bin holding `frequency`, if any.
    pub fn bin_of(&self, frequency: f64) -> Option<usize> {
        let z = self.axis_value(frequency);
        let bin = (self.reference_index + (z - self.reference_value) / self.resolution).round();
        (bin.is_finite() && bin >= 0.0 && bin < self.size as f64).then_some(bin as usize)
    }

    /// Axis value at the centre of `bin`.
    pub fn bin_center(&self, bin: usize) -> f64 {
        self.reference_value + (bin as f64 - self.reference_index) * self.resolution
    }

    pub fn label(&self, bin: usize) -> String {
        let unit = if self.wavelength { "m" } else { "Hz" };
        let value = self.bin_center(bin);
        if self.logarithmic {
            format!("log10({unit})={value:.6}")
        } else {
            format!("{value:.6e}{unit}")
        }
    }
}

fn axis_transform(frequency: f64, wavelength: bool, logarithmic: bool) -> f64 {
    let z = if wavelength {
        SPEED_OF_LIGHT / frequency
    } else {
        frequency
    };
    if logarithmic {
        z.log10()
    } else {
        z
    }
}
