#[allow(dead_code)]
mod common;

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use skymap_core::consts::ARCSEC;
use skymap_core::error::SkymapError;
use skymap_core::grid::Offset2D;
use skymap_core::instrument::Instrument;
use skymap_core::io::write_model;
use skymap_core::pipeline::config::{
    FilterConfig, GridConfig, ModelKind, PointingConfig, ReductionConfig, SmoothingSpec, SpectralConfig,
    WeightingMethod,
};
use skymap_core::pipeline::types::{ProgressReporter, ReductionStage};
use skymap_core::pipeline::{run_reduction, run_reduction_with_reporter};
use skymap_core::plane::peak::find_peak;
use skymap_core::plane::PeakKind;
use skymap_core::scan::{sample_flags, Scan};

/// Where the synthetic point source sits, relative to the map reference.
fn source_position() -> Offset2D {
    Offset2D::new(6.0 * ARCSEC, -4.0 * ARCSEC)
}

/// A noisy raster over a point source of `amplitude`.
fn source_raster(id: &str, instrument: &Instrument, amplitude: f64, noise: f64) -> Scan {
    let source = common::gaussian_source(amplitude, common::BEAM, source_position());
    let mut scan = common::raster_scan(
        id,
        instrument,
        common::reference(),
        60.0 * ARCSEC,
        2.0 * ARCSEC,
        source,
    );
    let salt = id.len();
    for (k, frame) in scan.integrations[0].frames.iter_mut().enumerate() {
        for (c, x) in frame.data.iter_mut().enumerate() {
            *x += (noise * common::hash_noise(k, c + salt)) as f32;
        }
    }
    scan
}

fn quick_config() -> ReductionConfig {
    ReductionConfig {
        threads: Some(2),
        rounds: 2,
        ..Default::default()
    }
}

fn max_value(output: &skymap_core::pipeline::types::ReductionOutput) -> f64 {
    output.model.planes()[0]
        .value_map()
        .iter()
        .fold(f64::NEG_INFINITY, |m, &v| m.max(v))
}

// ---------------------------------------------------------------------------
// Point source
// ---------------------------------------------------------------------------

#[test]
fn test_point_source_is_recovered() {
    let instrument = common::line_instrument(3, 10.0 * ARCSEC);
    let mut scans = vec![source_raster("src", &instrument, 10.0, 0.1)];
    let config = ReductionConfig {
        pointing: Some(PointingConfig::default()),
        ..quick_config()
    };

    let output = run_reduction(&mut scans, &instrument, &config).unwrap();
    assert_eq!(output.rounds, 2);
    assert!(output.contributions > 0);
    assert_eq!(output.model.generation(), 2);

    let peak_value = max_value(&output);
    assert!(peak_value > 8.0 && peak_value < 10.5, "peak {peak_value}");

    let peak = output.pointing.expect("source should be located");
    let miss = Offset2D::new(peak.offset.x - source_position().x, peak.offset.y - source_position().y);
    assert!(miss.length() < 3.0 * ARCSEC, "missed by {}\"", miss.length() / ARCSEC);
    assert!(peak.significance > 5.0);
    assert!(peak.flux > peak.value);
}

#[test]
fn test_large_map_finalize_and_pointing_match_across_pools() {
    // more pixels than the parallel threshold of masking and smoothing
    let instrument = common::single_channel_instrument();
    let scan = common::raster_scan(
        "large",
        &instrument,
        common::reference(),
        260.0 * ARCSEC,
        2.0 * ARCSEC,
        common::gaussian_source(50.0, common::BEAM, source_position()),
    );
    let run = |threads: usize| {
        let mut scans = vec![scan.clone()];
        let config = ReductionConfig {
            threads: Some(threads),
            rounds: 1,
            grid: GridConfig {
                resolution: Some(2.0),
                fixed_size: None,
            },
            pointing: Some(PointingConfig::default()),
            ..Default::default()
        };
        run_reduction(&mut scans, &instrument, &config).unwrap()
    };

    let single = run(1);
    let pooled = run(3);
    assert!(single.model.grid().pixels() > 65_536);
    assert_eq!(single.model.masks()[0].count(), pooled.model.masks()[0].count());
    assert!(single.model.masks()[0].count() > 0);

    let a = single.pointing.expect("source located with one thread");
    let b = pooled.pointing.expect("source located with three threads");
    assert_eq!(a.index, b.index);
    assert!((a.significance - b.significance).abs() < 1e-9 * a.significance.abs());
}

#[test]
fn test_source_is_masked_after_finalize() {
    let instrument = common::line_instrument(3, 10.0 * ARCSEC);
    let mut scans = vec![source_raster("src", &instrument, 10.0, 0.1)];
    let output = run_reduction(&mut scans, &instrument, &quick_config()).unwrap();

    let plane = &output.model.planes()[0];
    let peak = find_peak(plane, output.model.grid(), PeakKind::Max).unwrap();
    assert!(output.model.masks()[0].is_masked(peak.index.i, peak.index.j));
    // samples on the source carry the blank flag
    let blanked = scans[0].integrations[0]
        .frames
        .iter()
        .flat_map(|f| f.sample_flag.iter())
        .filter(|&&f| f & sample_flags::SOURCE_BLANK != 0)
        .count();
    assert!(blanked > 0);
}

#[test]
fn test_smoothing_and_filtering() {
    let instrument = common::line_instrument(3, 10.0 * ARCSEC);
    let mut scans = vec![source_raster("src", &instrument, 10.0, 0.1)];
    let config = ReductionConfig {
        smoothing: Some(SmoothingSpec::Beam),
        filter: Some(FilterConfig::default()),
        ..quick_config()
    };
    let output = run_reduction(&mut scans, &instrument, &config).unwrap();
    let plane = &output.model.planes()[0];

    assert!((plane.beam.smooth_fwhm - common::BEAM).abs() < 1e-12);
    let filter = plane.beam.ext_filter_fwhm.expect("plane should be filtered");
    assert!(filter > common::BEAM);
    assert!(plane.beam.filter_correction >= 1.0);
    assert_eq!(plane.beam.filter_blanking, Some(6.0));

    let peak = find_peak(plane, output.model.grid(), PeakKind::Max).unwrap();
    let miss = Offset2D::new(peak.offset.x - source_position().x, peak.offset.y - source_position().y);
    assert!(miss.length() < 4.0 * ARCSEC);
}

#[test]
fn test_fixed_size_map() {
    let instrument = common::line_instrument(3, 10.0 * ARCSEC);
    let mut scans = vec![source_raster("src", &instrument, 10.0, 0.1)];
    let mut config = quick_config();
    config.grid.fixed_size = Some([40.0, 40.0]);

    let output = run_reduction(&mut scans, &instrument, &config).unwrap();
    let grid = output.model.grid();
    // 40" at the default beam / 5 sampling, plus padding
    assert_eq!(grid.size_x, 22);
    assert_eq!(grid.size_y, 22);

    let skipped = scans[0].integrations[0]
        .frames
        .iter()
        .filter(|f| f.sample_flag[0] & sample_flags::SKIP != 0)
        .count();
    assert!(skipped > 0);
}

#[test]
fn test_scan_weighting_prefers_quiet_scan() {
    let instrument = common::line_instrument(3, 10.0 * ARCSEC);
    let mut scans = vec![
        source_raster("quiet", &instrument, 0.0, 1.0),
        source_raster("loud", &instrument, 0.0, 10.0),
    ];
    let config = ReductionConfig {
        scan_weighting: Some(WeightingMethod::Rms),
        rounds: 1,
        ..quick_config()
    };
    let output = run_reduction(&mut scans, &instrument, &config).unwrap();
    assert!(!output.is_empty());
    assert!(scans[0].weight > 0.0);
    assert!(scans[1].weight > 0.0);
    assert!(scans[0].weight > 10.0 * scans[1].weight);
}

#[test]
fn test_zero_weight_scan_adds_no_contributions() {
    let instrument = common::line_instrument(3, 10.0 * ARCSEC);
    let config = ReductionConfig {
        scan_weighting: Some(WeightingMethod::Rms),
        rounds: 1,
        ..quick_config()
    };

    let mut alone = vec![source_raster("src", &instrument, 10.0, 0.5)];
    let expected = run_reduction(&mut alone, &instrument, &config).unwrap().contributions;
    assert!(expected > 0);

    // blank data has a zero chi-squared, hence zero weight
    let mut scans = vec![
        source_raster("src", &instrument, 10.0, 0.5),
        source_raster("flat", &instrument, 0.0, 0.0),
    ];
    let output = run_reduction(&mut scans, &instrument, &config).unwrap();
    assert_eq!(scans[1].weight, 0.0);
    assert!(scans[0].weight > 0.0);
    assert_eq!(output.contributions, expected);
}

// ---------------------------------------------------------------------------
// Other plane layouts
// ---------------------------------------------------------------------------

#[test]
fn test_pixel_maps_see_source_at_channel_offsets() {
    let instrument = common::line_instrument(2, 20.0 * ARCSEC);
    let mut scans = vec![source_raster("beam", &instrument, 10.0, 0.05)];
    let config = ReductionConfig {
        model: ModelKind::Pixel,
        ..quick_config()
    };
    let output = run_reduction(&mut scans, &instrument, &config).unwrap();
    assert_eq!(output.model.kind(), ModelKind::Pixel);
    assert_eq!(output.model.planes().len(), 2);
    assert_eq!(output.model.plane_label(1), "pixel-1");

    for (p, channel) in instrument.channels.iter().enumerate() {
        let peak = find_peak(&output.model.planes()[p], output.model.grid(), PeakKind::Max).unwrap();
        let expected = Offset2D::new(
            source_position().x - channel.position.x,
            source_position().y - channel.position.y,
        );
        let miss = Offset2D::new(peak.offset.x - expected.x, peak.offset.y - expected.y);
        assert!(miss.length() < 3.0 * ARCSEC, "pixel {p} missed by {}\"", miss.length() / ARCSEC);
    }
}

#[test]
fn test_spectral_model_bins_channels() {
    let mut instrument = common::line_instrument(2, 0.0);
    instrument.channels[0].frequency = Some(100e9);
    instrument.channels[1].frequency = Some(101e9);
    let mut scans = vec![source_raster("spec", &instrument, 10.0, 0.05)];
    let config = ReductionConfig {
        model: ModelKind::Spectral,
        spectral: SpectralConfig {
            resolution: Some(0.5e9),
            ..Default::default()
        },
        ..quick_config()
    };
    let output = run_reduction(&mut scans, &instrument, &config).unwrap();
    let planes = output.model.planes();
    assert_eq!(planes.len(), 3);
    assert!(!planes[0].is_empty());
    assert!(planes[1].is_empty());
    assert!(!planes[2].is_empty());
    assert_eq!(output.model.plane_label(2), "bin-2");
}

#[test]
fn test_spectral_model_needs_frequencies() {
    let instrument = common::line_instrument(2, 10.0 * ARCSEC);
    let mut scans = vec![source_raster("spec", &instrument, 1.0, 0.0)];
    let config = ReductionConfig {
        model: ModelKind::Spectral,
        ..quick_config()
    };
    let result = run_reduction(&mut scans, &instrument, &config);
    assert!(matches!(result, Err(SkymapError::InvalidConfig(_))));
}

// ---------------------------------------------------------------------------
// Degenerate inputs
// ---------------------------------------------------------------------------

#[test]
fn test_no_scans() {
    let instrument = common::line_instrument(1, 0.0);
    let result = run_reduction(&mut [], &instrument, &quick_config());
    assert!(matches!(result, Err(SkymapError::EmptySequence)));
}

#[test]
fn test_invalid_config_is_rejected_first() {
    let instrument = common::line_instrument(1, 0.0);
    let mut scans = vec![source_raster("x", &instrument, 1.0, 0.0)];
    let config = ReductionConfig {
        rounds: 0,
        ..Default::default()
    };
    let result = run_reduction(&mut scans, &instrument, &config);
    assert!(matches!(result, Err(SkymapError::InvalidConfig(_))));
    assert!(scans[0].integrations[0].index_cache.is_none());
}

#[test]
fn test_fully_flagged_data_gives_empty_map() {
    let instrument = common::line_instrument(3, 10.0 * ARCSEC);
    let mut scans = vec![source_raster("flagged", &instrument, 10.0, 0.1)];
    for frame in scans[0].integrations[0].frames.iter_mut() {
        frame.sample_flag.fill(sample_flags::SKIP);
    }
    let original = scans[0].integrations[0].frames[0].data.clone();
    let config = ReductionConfig {
        pointing: Some(PointingConfig::default()),
        ..quick_config()
    };

    let output = run_reduction(&mut scans, &instrument, &config).unwrap();
    assert!(output.is_empty());
    assert_eq!(output.rounds, 1);
    assert_eq!(output.contributions, 0);
    assert!(output.pointing.is_none());
    // nothing was removed from the data
    assert_eq!(scans[0].integrations[0].frames[0].data, original);
    assert_eq!(scans[0].integrations[0].source_generation, 0);
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[test]
fn test_write_model_files() {
    let instrument = common::line_instrument(3, 10.0 * ARCSEC);
    let mut scans = vec![source_raster("src", &instrument, 10.0, 0.1)];
    let output = run_reduction(&mut scans, &instrument, &quick_config()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let written = write_model(&output.model, dir.path(), "m82").unwrap();
    assert_eq!(written.len(), 6);

    let grid = output.model.grid();
    let value = dir.path().join("m82.map.value.f64");
    assert_eq!(
        fs::metadata(&value).unwrap().len(),
        (grid.size_x * grid.size_y * 8) as u64
    );
    let flags = dir.path().join("m82.map.flag.u8");
    assert_eq!(
        fs::metadata(&flags).unwrap().len(),
        (grid.size_x * grid.size_y) as u64
    );

    let header = fs::read_to_string(dir.path().join("m82.map.toml")).unwrap();
    let table: toml::Table = toml::from_str(&header).unwrap();
    assert_eq!(table["size_x"].as_integer(), Some(grid.size_x as i64));
    assert_eq!(table["plane"].as_str(), Some("map"));
}

#[test]
fn test_empty_model_removes_stale_output() {
    let instrument = common::line_instrument(2, 10.0 * ARCSEC);
    let mut scans = vec![source_raster("flagged", &instrument, 10.0, 0.1)];
    for frame in scans[0].integrations[0].frames.iter_mut() {
        frame.sample_flag.fill(sample_flags::SKIP);
    }
    let output = run_reduction(&mut scans, &instrument, &quick_config()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let stale = dir.path().join("m82.map.value.f64");
    let unrelated = dir.path().join("m82.notes.txt");
    fs::write(&stale, b"old").unwrap();
    fs::write(&unrelated, b"keep").unwrap();

    let written = write_model(&output.model, dir.path(), "m82").unwrap();
    assert!(written.is_empty());
    assert!(!stale.exists());
    assert!(unrelated.exists());
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CountingReporter {
    rounds: AtomicUsize,
    stages: AtomicUsize,
    finished: AtomicUsize,
    accumulated: AtomicUsize,
    current: AtomicUsize,
}

impl ProgressReporter for CountingReporter {
    fn begin_stage(&self, stage: ReductionStage, _total_items: Option<usize>) {
        self.stages.fetch_add(1, Ordering::Relaxed);
        self.current.store(stage as usize, Ordering::Relaxed);
    }

    fn advance(&self, items_done: usize) {
        if self.current.load(Ordering::Relaxed) == ReductionStage::Accumulating as usize {
            self.accumulated.fetch_add(items_done, Ordering::Relaxed);
        }
    }

    fn finish_stage(&self) {
        self.finished.fetch_add(1, Ordering::Relaxed);
    }

    fn begin_round(&self, _round: usize, _rounds: usize) {
        self.rounds.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn test_reporter_sees_every_round() {
    let instrument = common::line_instrument(2, 10.0 * ARCSEC);
    let mut scans = vec![
        source_raster("a", &instrument, 5.0, 0.1),
        source_raster("b", &instrument, 5.0, 0.1),
    ];
    let reporter = Arc::new(CountingReporter::default());
    let config = ReductionConfig {
        rounds: 3,
        ..quick_config()
    };
    run_reduction_with_reporter(&mut scans, &instrument, &config, reporter.clone()).unwrap();

    assert_eq!(reporter.rounds.load(Ordering::Relaxed), 3);
    assert_eq!(
        reporter.stages.load(Ordering::Relaxed),
        reporter.finished.load(Ordering::Relaxed)
    );
    // sizing, then accumulate, finalize and sync in each round
    assert_eq!(reporter.stages.load(Ordering::Relaxed), 1 + 3 * 3);
    // two integrations per round
    assert_eq!(reporter.accumulated.load(Ordering::Relaxed), 6);
}
