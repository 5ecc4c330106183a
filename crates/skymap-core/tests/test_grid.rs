#[allow(dead_code)]
mod common;

use approx::assert_relative_eq;
use skymap_core::consts::ARCSEC;
use skymap_core::error::SkymapError;
use skymap_core::grid::{
    Gnomonic, Grid2D, IndexPacking, Offset2D, PixelIndex, Range, SphericalCoordinates,
    SpectralGrid,
};
use skymap_core::pipeline::config::SpectralConfig;

fn square_grid(half_width: f64, resolution: f64) -> Grid2D {
    let range = Range::new(-half_width, half_width);
    Grid2D::from_bounds(
        Gnomonic::new(common::reference()),
        (resolution, resolution),
        &range,
        &range,
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

#[test]
fn test_projection_reference_maps_to_origin() {
    let projection = Gnomonic::new(common::reference());
    let offset = projection.project(&common::reference());
    assert!(offset.length() < 1e-15);
}

#[test]
fn test_projection_round_trip() {
    let projection = Gnomonic::new(common::reference());
    for (x, y) in [(0.0, 0.0), (30.0, -12.0), (-600.0, 450.0), (3600.0, 3600.0)] {
        let offset = Offset2D::new(x * ARCSEC, y * ARCSEC);
        let back = projection.project(&projection.deproject(&offset));
        assert_relative_eq!(back.x, offset.x, epsilon = 1e-12);
        assert_relative_eq!(back.y, offset.y, epsilon = 1e-12);
    }
}

#[test]
fn test_projection_far_side_is_not_finite() {
    let reference = SphericalCoordinates::from_degrees(0.0, 0.0);
    let projection = Gnomonic::new(reference);
    let antipode = SphericalCoordinates::from_degrees(180.0, 0.0);
    assert!(!projection.project(&antipode).is_finite());
}

#[test]
fn test_small_offsets_preserve_distance() {
    let projection = Gnomonic::new(common::reference());
    let offset = Offset2D::new(20.0 * ARCSEC, 0.0);
    let coords = projection.deproject(&offset);
    assert_relative_eq!(
        coords.distance_to(&common::reference()),
        20.0 * ARCSEC,
        max_relative = 1e-6
    );
}

// ---------------------------------------------------------------------------
// Index packing
// ---------------------------------------------------------------------------

#[test]
fn test_index_packing_round_trip() {
    for (sx, sy) in [(1, 1), (3, 5), (17, 64), (100, 65)] {
        let packing = IndexPacking::new(sx, sy);
        for i in 0..sx {
            for j in 0..sy {
                let idx = PixelIndex::new(i, j);
                assert_eq!(packing.unpack(packing.pack(Some(idx))), Some(idx));
            }
        }
    }
}

#[test]
fn test_index_packing_rejects_out_of_range() {
    let packing = IndexPacking::new(4, 4);
    assert_eq!(packing.pack(None), IndexPacking::INVALID);
    assert_eq!(packing.pack(Some(PixelIndex::new(4, 0))), IndexPacking::INVALID);
    assert_eq!(packing.pack(Some(PixelIndex::new(0, 4))), IndexPacking::INVALID);
    assert_eq!(packing.unpack(IndexPacking::INVALID), None);
}

#[test]
fn test_index_packing_shift_covers_rows() {
    assert_eq!(IndexPacking::new(10, 8).shift(), 3);
    assert_eq!(IndexPacking::new(10, 9).shift(), 4);
}

// ---------------------------------------------------------------------------
// Grid sizing
// ---------------------------------------------------------------------------

#[test]
fn test_grid_size_covers_bounds_with_padding() {
    let grid = square_grid(10.0 * ARCSEC, 2.0 * ARCSEC);
    // 20" / 2" = 10 pixels, plus padding
    assert_eq!(grid.size_x, 12);
    assert_eq!(grid.size_y, 12);
    assert_relative_eq!(grid.pixel_size(), 2.0 * ARCSEC, max_relative = 1e-12);
}

#[test]
fn test_grid_contains_every_bound_offset() {
    let grid = square_grid(37.0 * ARCSEC, 3.0 * ARCSEC);
    for x in [-37.0, -20.0, 0.0, 19.5, 37.0] {
        for y in [-37.0, 0.0, 37.0] {
            let offset = Offset2D::new(x * ARCSEC, y * ARCSEC);
            assert!(grid.to_index(&offset).is_some(), "({x}, {y}) off the grid");
        }
    }
}

#[test]
fn test_grid_index_offset_round_trip() {
    let grid = square_grid(30.0 * ARCSEC, 2.0 * ARCSEC);
    for i in 0..grid.size_x {
        for j in 0..grid.size_y {
            let offset = grid.index_to_offset(i as f64, j as f64);
            assert_eq!(grid.to_index(&offset), Some(PixelIndex::new(i, j)));
        }
    }
}

#[test]
fn test_grid_rejects_offsets_outside() {
    let grid = square_grid(10.0 * ARCSEC, 2.0 * ARCSEC);
    assert!(grid.to_index(&Offset2D::new(60.0 * ARCSEC, 0.0)).is_none());
    assert!(grid.to_index(&Offset2D::new(f64::NAN, 0.0)).is_none());
}

#[test]
fn test_grid_project_reference() {
    let grid = square_grid(10.0 * ARCSEC, 2.0 * ARCSEC);
    let idx = grid.project(&common::reference()).unwrap();
    let centre = grid.index_to_offset(idx.i as f64, idx.j as f64);
    assert!(centre.length() <= grid.diagonal() / grid.size_x as f64);
}

#[test]
fn test_grid_single_point_is_not_degenerate() {
    let range = Range::new(0.0, 0.0);
    let grid = Grid2D::from_bounds(
        Gnomonic::new(common::reference()),
        (ARCSEC, ARCSEC),
        &range,
        &range,
    )
    .unwrap();
    assert!(grid.to_index(&Offset2D::default()).is_some());
}

#[test]
fn test_grid_empty_bounds_is_degenerate() {
    let result = Grid2D::from_bounds(
        Gnomonic::new(common::reference()),
        (ARCSEC, ARCSEC),
        &Range::empty(),
        &Range::new(0.0, 1.0),
    );
    assert!(matches!(
        result,
        Err(SkymapError::DegenerateGeometry { size_x: 0, .. })
    ));
}

#[test]
fn test_grid_rejects_bad_resolution() {
    let range = Range::new(-1.0, 1.0);
    let result = Grid2D::from_bounds(
        Gnomonic::new(common::reference()),
        (0.0, ARCSEC),
        &range,
        &range,
    );
    assert!(matches!(result, Err(SkymapError::InvalidConfig(_))));
}

// ---------------------------------------------------------------------------
// Spectral grid
// ---------------------------------------------------------------------------

#[test]
fn test_spectral_grid_bins_cover_range() {
    let frequencies = Range::new(100e9, 101e9);
    let config = SpectralConfig {
        resolution: Some(0.25e9),
        ..Default::default()
    };
    let grid = SpectralGrid::from_frequencies(&frequencies, &config).unwrap();
    assert_eq!(grid.size, 5);
    let low = grid.bin_of(100e9).unwrap();
    let high = grid.bin_of(101e9).unwrap();
    assert!(high > low);
    assert!(grid.bin_of(120e9).is_none());
}

#[test]
fn test_spectral_grid_default_resolution_from_resolving_power() {
    let frequencies = Range::new(99e9, 101e9);
    let config = SpectralConfig {
        resolving_power: Some(100.0),
        ..Default::default()
    };
    let grid = SpectralGrid::from_frequencies(&frequencies, &config).unwrap();
    assert_relative_eq!(grid.resolution, 0.5 * 100e9 / 100.0, max_relative = 1e-12);
}

#[test]
fn test_spectral_grid_needs_frequencies() {
    let config = SpectralConfig::default();
    assert!(SpectralGrid::from_frequencies(&Range::empty(), &config).is_err());
}
