use approx::assert_relative_eq;
use ndarray::Array2;
use skymap_core::consts::{ARCSEC, FWHM_TO_SIZE};
use skymap_core::plane::stats::{median, select};
use skymap_core::plane::{pixel_flags, AccumulationPlane};
use skymap_core::reduce::Accumulator;

/// A plane with every pixel set to `value` at weight `weight`.
fn uniform_plane(n: usize, value: f64, weight: f64) -> AccumulationPlane {
    let mut plane = AccumulationPlane::new(n, n, ARCSEC);
    for i in 0..n {
        for j in 0..n {
            plane.add_point(i, j, value, 1.0, weight, 0.1);
        }
    }
    plane
}

// ---------------------------------------------------------------------------
// Weighted accumulation
// ---------------------------------------------------------------------------

#[test]
fn test_weighted_mean_of_two_samples() {
    let mut plane = AccumulationPlane::new(3, 3, ARCSEC);
    plane.add_point(1, 1, 2.0, 1.0, 1.0, 0.1);
    plane.add_point(1, 1, 4.0, 1.0, 3.0, 0.1);

    assert_relative_eq!(plane.value(1, 1), 3.5);
    assert_relative_eq!(plane.weight()[[1, 1]], 4.0);
    assert_relative_eq!(plane.noise(1, 1), 0.5);
    assert_relative_eq!(plane.exposure()[[1, 1]], 0.2, epsilon = 1e-15);
}

#[test]
fn test_gain_scales_weight_quadratically() {
    let mut plane = AccumulationPlane::new(1, 1, ARCSEC);
    // Sample 6.0 seen through gain 2 is a source value of 3.0.
    plane.add_point(0, 0, 6.0, 2.0, 1.0, 0.1);
    assert_relative_eq!(plane.value(0, 0), 3.0);
    assert_relative_eq!(plane.weight()[[0, 0]], 4.0);
}

#[test]
fn test_zero_weight_pixel_is_invalid() {
    let plane = AccumulationPlane::new(2, 2, ARCSEC);
    assert!(!plane.is_valid(0, 0));
    assert_eq!(plane.value(0, 0), 0.0);
    assert!(plane.noise(0, 0).is_infinite());
    assert_eq!(plane.significance(0, 0), 0.0);
    assert!(plane.is_empty());
    assert_eq!(plane.count_points(), 0);
}

#[test]
fn test_critical_flags_invalidate() {
    let mut plane = uniform_plane(3, 1.0, 1.0);
    plane.flag_pixel(0, 0, pixel_flags::CLIPPED);
    plane.flag_pixel(1, 1, pixel_flags::BLANKED);
    assert!(!plane.is_valid(0, 0));
    assert!(plane.is_valid(1, 1));
    assert_eq!(plane.count_points(), 8);

    plane.unflag_pixel(0, 0, pixel_flags::CLIPPED);
    assert!(plane.is_valid(0, 0));
}

#[test]
fn test_sanitize_drops_flagged_data() {
    let mut plane = uniform_plane(3, 1.0, 1.0);
    plane.flag_pixel(2, 2, pixel_flags::SPIKE);
    plane.sanitize();
    assert_eq!(plane.weight()[[2, 2]], 0.0);
    assert_eq!(plane.signal()[[2, 2]], 0.0);
    assert_eq!(plane.weight()[[1, 1]], 1.0);
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

#[test]
fn test_merge_equals_single_accumulation() {
    let samples = [(0, 0, 1.0, 1.0), (0, 0, 3.0, 2.0), (1, 0, -2.0, 0.5), (1, 1, 5.0, 4.0)];

    let mut single = AccumulationPlane::new(2, 2, ARCSEC);
    for &(i, j, x, w) in &samples {
        single.add_point(i, j, x, 1.0, w, 0.1);
    }

    let mut a = AccumulationPlane::new(2, 2, ARCSEC);
    let mut b = AccumulationPlane::new(2, 2, ARCSEC);
    for (k, &(i, j, x, w)) in samples.iter().enumerate() {
        let target = if k % 2 == 0 { &mut a } else { &mut b };
        target.add_point(i, j, x, 1.0, w, 0.1);
    }
    a.merge(&b);

    for i in 0..2 {
        for j in 0..2 {
            assert_relative_eq!(a.value(i, j), single.value(i, j), epsilon = 1e-12);
            assert_relative_eq!(a.weight()[[i, j]], single.weight()[[i, j]]);
        }
    }
}

#[test]
fn test_merge_is_associative() {
    let parts: Vec<AccumulationPlane> = (0..3)
        .map(|k| {
            let mut p = AccumulationPlane::new(2, 2, ARCSEC);
            p.add_point(k % 2, 1, k as f64 + 0.5, 1.0, 1.0 + k as f64, 0.1);
            p
        })
        .collect();

    let mut left = parts[0].clone();
    left.merge(&parts[1]);
    left.merge(&parts[2]);

    let mut tail = parts[1].clone();
    tail.merge(&parts[2]);
    let mut right = parts[0].clone();
    right.merge(&tail);

    assert_eq!(left.signal(), right.signal());
    assert_eq!(left.weight(), right.weight());
}

#[test]
fn test_add_weighted_scales_weight_not_value() {
    let mut master = AccumulationPlane::new(2, 2, ARCSEC);
    let scan = uniform_plane(2, 3.0, 2.0);
    master.add_weighted(&scan, 0.5);
    assert_relative_eq!(master.value(0, 0), 3.0);
    assert_relative_eq!(master.weight()[[0, 0]], 1.0);
}

// ---------------------------------------------------------------------------
// Levels and clipping
// ---------------------------------------------------------------------------

#[test]
fn test_level_removes_weighted_mean() {
    let mut plane = AccumulationPlane::new(2, 1, ARCSEC);
    plane.add_point(0, 0, 1.0, 1.0, 1.0, 0.1);
    plane.add_point(1, 0, 4.0, 1.0, 2.0, 0.1);
    let level = plane.level(false);
    assert_relative_eq!(level, 3.0);
    assert_relative_eq!(plane.value(0, 0), -2.0);
    assert_relative_eq!(plane.value(1, 0), 1.0);
}

#[test]
fn test_robust_level_ignores_outlier() {
    let mut plane = uniform_plane(5, 1.0, 1.0);
    plane.set_value(2, 2, 1000.0);
    assert_relative_eq!(plane.weighted_level(true).unwrap(), 1.0);
    assert!(plane.weighted_level(false).unwrap() > 10.0);
}

#[test]
fn test_exposure_clip() {
    let mut plane = uniform_plane(4, 1.0, 1.0);
    plane.add_point(0, 0, 1.0, 1.0, 1.0, 0.1);
    let clipped = plane.clip_below_exposure(0.15);
    assert_eq!(clipped, 15);
    assert!(plane.is_valid(0, 0));
    assert!(!plane.is_valid(1, 1));
}

#[test]
fn test_s2n_clip_records_level() {
    let mut plane = uniform_plane(2, 1.0, 1.0);
    plane.set_value(0, 0, 10.0);
    assert_eq!(plane.s2n_clip_below(5.0), 3);
    assert!(plane.is_valid(0, 0));
    assert_eq!(plane.beam.clipping_s2n, Some(5.0));
}

#[test]
fn test_despike_flags_isolated_spike() {
    let mut plane = uniform_plane(5, 0.0, 100.0);
    plane.set_value(2, 2, 50.0);
    // Neighbours of the spike deviate too, by about a quarter as much.
    let spikes = plane.despike(200.0);
    assert_eq!(spikes, 1);
    assert_ne!(plane.flag()[[2, 2]] & pixel_flags::SPIKE, 0);
}

#[test]
fn test_chi2_of_unit_significance() {
    let mut plane = AccumulationPlane::new(2, 1, ARCSEC);
    plane.add_point(0, 0, 1.0, 1.0, 1.0, 0.1);
    plane.add_point(1, 0, -1.0, 1.0, 1.0, 0.1);
    assert_relative_eq!(plane.chi2(false), 1.0);
    assert!(AccumulationPlane::new(2, 2, ARCSEC).chi2(false).is_nan());
}

// ---------------------------------------------------------------------------
// Smoothing
// ---------------------------------------------------------------------------

#[test]
fn test_smoothing_preserves_flat_map() {
    let mut plane = uniform_plane(24, 2.5, 1.0);
    plane.smooth(4.0 * ARCSEC, (ARCSEC, ARCSEC));
    for i in 0..24 {
        for j in 0..24 {
            assert_relative_eq!(plane.value(i, j), 2.5, epsilon = 1e-9);
        }
    }
}

#[test]
fn test_smoothing_reduces_noise() {
    let mut plane = uniform_plane(24, 0.0, 1.0);
    plane.smooth(4.0 * ARCSEC, (ARCSEC, ARCSEC));
    // interior pixels average many independent samples
    assert!(plane.weight()[[12, 12]] > 10.0);
}

#[test]
fn test_smoothing_updates_beam() {
    let mut plane = uniform_plane(16, 0.0, 1.0);
    let initial = plane.beam.smooth_fwhm;
    assert_relative_eq!(initial, ARCSEC / FWHM_TO_SIZE);
    plane.smooth_to(3.0 * ARCSEC, (ARCSEC, ARCSEC));
    assert_relative_eq!(plane.beam.smooth_fwhm, 3.0 * ARCSEC);
}

#[test]
fn test_smoothing_spreads_point() {
    let mut plane = uniform_plane(21, 0.0, 1.0);
    plane.set_value(10, 10, 1.0);
    plane.smooth(3.0 * ARCSEC, (ARCSEC, ARCSEC));
    assert!(plane.value(10, 10) < 1.0);
    assert!(plane.value(11, 10) > 0.0);
    assert_relative_eq!(plane.value(11, 10), plane.value(9, 10), epsilon = 1e-12);
    assert_relative_eq!(plane.value(10, 11), plane.value(11, 10), epsilon = 1e-12);
}

#[test]
fn test_add_image_shifts_values() {
    let mut plane = uniform_plane(3, 1.0, 2.0);
    let image = Array2::from_elem((3, 3), 0.5);
    plane.add_image(&image);
    assert_relative_eq!(plane.value(1, 2), 1.5);
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

#[test]
fn test_median_and_select() {
    let mut odd = [5.0, 1.0, 3.0];
    assert_eq!(median(&mut odd), Some(3.0));
    let mut values: Vec<f64> = (0..101).map(f64::from).collect();
    assert_eq!(select(&mut values, 0.95), Some(95.0));
    let mut empty: [f64; 0] = [];
    assert_eq!(median(&mut empty), None);
}
