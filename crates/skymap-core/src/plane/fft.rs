use ndarray::{Array2, ArrayViewMut1, Axis};
use num_complex::Complex;
use rayon::prelude::*;
use rustfft::{Fft, FftPlanner};

use crate::consts::PARALLEL_PIXEL_THRESHOLD;

/// 2D forward FFT of a real image.
pub fn fft2d_forward(data: &Array2<f64>) -> Array2<Complex<f64>> {
    let mut out = data.mapv(|v| Complex::new(v, 0.0));
    fft2d_in_place(&mut out, false);
    out
}

/// 2D inverse FFT, real part, normalized by 1/(h*w).
pub fn fft2d_inverse(data: &Array2<Complex<f64>>) -> Array2<f64> {
    let mut work = data.clone();
    fft2d_in_place(&mut work, true);
    let norm = 1.0 / work.len().max(1) as f64;
    work.mapv(|c| c.re * norm)
}

pub(crate) fn fft2d_in_place(data: &mut Array2<Complex<f64>>, inverse: bool) {
    let (h, w) = data.dim();
    if h == 0 || w == 0 {
        return;
    }
    let mut planner = FftPlanner::<f64>::new();
    let (row_fft, col_fft) = if inverse {
        (planner.plan_fft_inverse(w), planner.plan_fft_inverse(h))
    } else {
        (planner.plan_fft_forward(w), planner.plan_fft_forward(h))
    };

    let parallel = h * w >= PARALLEL_PIXEL_THRESHOLD;
    // Rows are lanes along axis 1, columns along axis 0.
    transform_lanes(data, Axis(0), row_fft.as_ref(), parallel);
    transform_lanes(data, Axis(1), col_fft.as_ref(), parallel);
}

fn transform_lanes(
    data: &mut Array2<Complex<f64>>,
    outer: Axis,
    fft: &dyn Fft<f64>,
    parallel: bool,
) {
    let run = |mut lane: ArrayViewMut1<Complex<f64>>| {
        let mut buf: Vec<Complex<f64>> = lane.to_vec();
        fft.process(&mut buf);
        lane.iter_mut().zip(buf).for_each(|(dst, src)| *dst = src);
    };

    if parallel {
        data.axis_iter_mut(outer).into_par_iter().for_each(run);
    } else {
        data.axis_iter_mut(outer).for_each(run);
    }
}

/// Signed frequency index of bin `k` out of `n`.
pub(crate) fn signed_frequency(k: usize, n: usize) -> f64 {
    if k <= n / 2 {
        k as f64
    } else {
        k as f64 - n as f64
    }
}
