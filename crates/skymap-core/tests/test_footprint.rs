#[allow(dead_code)]
mod common;

use skymap_core::consts::{ARCSEC, DEGREE};
use skymap_core::error::SkymapError;
use skymap_core::grid::{Gnomonic, Grid2D, Range, SphericalCoordinates};
use skymap_core::pipeline::config::{GridConfig, MemoryConfig, ReductionConfig};
use skymap_core::pipeline::run_reduction;
use skymap_core::scan::Scan;
use skymap_core::source::{FootprintModel, MemoryBudget};

fn grid_60arcsec() -> Grid2D {
    let range = Range::new(-30.0 * ARCSEC, 30.0 * ARCSEC);
    Grid2D::from_bounds(
        Gnomonic::new(common::reference()),
        (2.0 * ARCSEC, 2.0 * ARCSEC),
        &range,
        &range,
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// Footprint arithmetic
// ---------------------------------------------------------------------------

#[test]
fn test_reduction_footprint_formula() {
    let footprint = FootprintModel::new(32.0, 8);
    // (threads + 1) * (32 + 8) + 8 bytes per pixel
    assert_eq!(footprint.reduction_footprint(1_000_000, 4), 208_000_000);
    assert_eq!(footprint.reduction_footprint(1_000_000, 1), 88_000_000);
}

#[test]
fn test_footprint_grows_with_planes() {
    let one = FootprintModel::for_planes(1);
    let ten = FootprintModel::for_planes(10);
    assert!(ten.reduction_footprint(1000, 2) > 9 * one.reduction_footprint(1000, 2));
}

#[test]
fn test_budget_accepts_fitting_map() {
    let budget = MemoryBudget::from_config(&MemoryConfig::default());
    let grid = grid_60arcsec();
    let required = budget
        .check(&FootprintModel::for_planes(1), &grid, 4, &[])
        .unwrap();
    assert_eq!(
        required,
        FootprintModel::for_planes(1).reduction_footprint(grid.pixels(), 4)
    );
}

#[test]
fn test_footprint_saturates_instead_of_wrapping() {
    let footprint = FootprintModel::for_planes(4);
    assert_eq!(footprint.base_footprint(usize::MAX), u64::MAX);
    assert_eq!(footprint.plane_footprint(usize::MAX), u64::MAX);
    assert_eq!(footprint.reduction_footprint(usize::MAX, 8), u64::MAX);
    assert_eq!(footprint.reduction_footprint(1 << 40, usize::MAX), u64::MAX);
}

#[test]
fn test_unlimited_budget_refuses_unrepresentable_grid() {
    // 2^32 x 2^32 pixels: the pixel count alone overflows 64 bits
    let side = Range::new(0.0, 4_294_967_294.0 * ARCSEC);
    let grid = Grid2D::from_bounds(
        Gnomonic::new(common::reference()),
        (ARCSEC, ARCSEC),
        &side,
        &side,
    )
    .unwrap();
    assert!(grid.size_x >= 1 << 32 && grid.size_y >= 1 << 32);
    assert_eq!(grid.pixels(), usize::MAX);

    let budget = MemoryBudget::from_config(&MemoryConfig::default());
    let result = budget.check(&FootprintModel::for_planes(1), &grid, 1, &[]);
    let Err(SkymapError::InsufficientMemory(report)) = result else {
        panic!("expected InsufficientMemory");
    };
    assert_eq!(report.required, u64::MAX);
}

#[test]
fn test_reduction_refuses_map_spanning_a_quarter_sphere() {
    let instrument = common::single_channel_instrument();
    let centre = SphericalCoordinates::from_degrees(10.0, 0.0);
    let mut scan = common::stare_scan("wide", &instrument, centre, &[(1.0, 1.0); 3]);
    // 89.99 deg off the reference along both axes
    scan.integrations[0].frames[1].equatorial = SphericalCoordinates::from_degrees(99.99, 0.0);
    scan.integrations[0].frames[2].equatorial = SphericalCoordinates::from_degrees(10.0, 89.99);

    for max_bytes in [Some(1_000_000_000), None] {
        let config = ReductionConfig {
            threads: Some(2),
            grid: GridConfig {
                resolution: Some(0.001),
                fixed_size: None,
            },
            memory: MemoryConfig {
                max_bytes,
                reserved_bytes: 0,
            },
            ..Default::default()
        };
        let mut scans = vec![scan.clone()];
        let result = run_reduction(&mut scans, &instrument, &config);
        let Err(SkymapError::InsufficientMemory(report)) = result else {
            panic!("expected InsufficientMemory for budget {max_bytes:?}");
        };
        assert_eq!(report.required, u64::MAX);
        assert!(report.size_x > 1_000_000_000 && report.size_y > 1_000_000_000);
    }
}

// ---------------------------------------------------------------------------
// Diagnosis
// ---------------------------------------------------------------------------

#[test]
fn test_insufficient_memory_names_outliers() {
    let grid = grid_60arcsec();
    let mut scans: Vec<Scan> = (0..4)
        .map(|k| Scan::new(format!("on-{k}"), common::reference()))
        .collect();
    let far = SphericalCoordinates::new(
        common::reference().lon,
        common::reference().lat + DEGREE,
    );
    scans.push(Scan::new("stray", far));
    let mut slew = Scan::new("slew", common::reference());
    slew.x_range = Range::new(-100.0 * ARCSEC, 100.0 * ARCSEC);
    slew.y_range = Range::new(0.0, 0.0);
    scans.push(slew);

    let budget = MemoryBudget {
        max_available: 1000,
        used: 0,
    };
    let err = budget
        .check(&FootprintModel::for_planes(1), &grid, 2, &scans)
        .unwrap_err();
    let SkymapError::InsufficientMemory(report) = &err else {
        panic!("expected InsufficientMemory, got {err:?}");
    };
    assert_eq!(report.outliers, vec!["stray".to_string()]);
    assert_eq!(report.slewing, vec!["slew".to_string()]);
    assert!(report.hint.is_none());
    assert_eq!(report.available, 1000);
    assert!(report.required > 1000);
    let text = report.to_string();
    assert!(text.contains("stray"));
}

#[test]
fn test_insufficient_memory_hint_without_culprits() {
    let grid = grid_60arcsec();
    let scans = vec![Scan::new("a", common::reference())];
    let budget = MemoryBudget {
        max_available: 10,
        used: 0,
    };
    let Err(SkymapError::InsufficientMemory(report)) =
        budget.check(&FootprintModel::for_planes(1), &grid, 1, &scans)
    else {
        panic!("expected InsufficientMemory");
    };
    assert!(report.outliers.is_empty());
    assert!(report.hint.is_some());

    let json = serde_json::to_value(&*report).unwrap();
    assert_eq!(json["size_x"], grid.size_x);
    assert_eq!(json["available"], 10);
    assert!(json["slewing"].as_array().unwrap().is_empty());
}

#[test]
fn test_reduction_refuses_oversized_map_before_work() {
    let instrument = common::line_instrument(3, 10.0 * ARCSEC);
    let mut scans = vec![common::raster_scan(
        "big",
        &instrument,
        common::reference(),
        60.0 * ARCSEC,
        4.0 * ARCSEC,
        |_| 1.0,
    )];
    let config = ReductionConfig {
        threads: Some(1),
        memory: MemoryConfig {
            max_bytes: Some(10_000),
            reserved_bytes: 0,
        },
        ..Default::default()
    };
    let result = run_reduction(&mut scans, &instrument, &config);
    assert!(matches!(result, Err(SkymapError::InsufficientMemory(_))));
    // nothing was accumulated or synced
    assert_eq!(scans[0].integrations[0].source_generation, 0);
}
