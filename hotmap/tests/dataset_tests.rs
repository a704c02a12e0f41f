//! Integration tests for opening rasters and reading windows.

mod common;

use std::fs;

use common::{CELL, HEIGHT, NODATA, ORIGIN_X, ORIGIN_Y, WIDTH};
use hotmap::{
    reproject, AxisRange, Crs, DatasetState, Envelope, GridExtent, HotmapError, RasterDataset,
    ResourceKind,
};
use tempfile::TempDir;

fn utm() -> Crs {
    Crs::from_epsg(common::EPSG as u32)
}

fn utm_envelope(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Envelope {
    Envelope::new(
        utm(),
        AxisRange::new(min_x, max_x),
        AxisRange::new(min_y, max_y),
    )
    .unwrap()
}

/// Envelope of grid cells `[col0, col1) x [row0, row1)`.
fn cells_envelope(col0: u32, row0: u32, col1: u32, row1: u32) -> Envelope {
    utm_envelope(
        ORIGIN_X + col0 as f64 * CELL,
        ORIGIN_Y - row1 as f64 * CELL,
        ORIGIN_X + col1 as f64 * CELL,
        ORIGIN_Y - row0 as f64 * CELL,
    )
}

#[test]
fn test_open_reads_geometry() {
    let tmp = TempDir::new().unwrap();
    let path = common::write_standard(tmp.path(), "dem.tif");

    let dataset = RasterDataset::open(&path).unwrap();
    assert_eq!(dataset.state(), DatasetState::Opened);
    assert_eq!(dataset.crs().unwrap(), utm());

    let grid = dataset.primary().unwrap();
    assert_eq!(grid.name(), "image-0");
    assert_eq!(grid.descriptor().bands, 1);
    assert_eq!(grid.descriptor().nodata, Some(NODATA as f64));
    assert_eq!(grid.geometry().extent, GridExtent::full(WIDTH, HEIGHT));
    assert_eq!(
        grid.envelope().bounds(),
        [
            ORIGIN_X,
            ORIGIN_Y - HEIGHT as f64 * CELL,
            ORIGIN_X + WIDTH as f64 * CELL,
            ORIGIN_Y
        ]
    );
}

#[test]
fn test_single_value_short_tags_open() {
    let tmp = TempDir::new().unwrap();
    let path = common::write_geographic_i16(tmp.path(), "ndwi.tif");

    let dataset = RasterDataset::open(&path).unwrap();
    assert_eq!(dataset.crs().unwrap(), Crs::WGS84);

    let grid = dataset.primary().unwrap();
    let descriptor = grid.descriptor();
    assert_eq!(descriptor.bits_per_sample, 16);
    assert_eq!(descriptor.bands, 1);
    assert_eq!(descriptor.nodata, None);
    assert_eq!(grid.geometry().extent, GridExtent::full(6, 4));

    let full = grid.read_full().unwrap();
    assert_eq!(full.sample(0, 0, 0), Some(-12.0));
    assert_eq!(full.sample(5, 3, 0), Some(11.0));

    let aoi = Envelope::new(
        Crs::WGS84,
        AxisRange::new(13.015, 13.035),
        AxisRange::new(51.975, 51.995),
    )
    .unwrap();
    let window = grid.read_window(&aoi).unwrap();
    assert_eq!(
        window.extent(),
        GridExtent {
            col_off: 1,
            row_off: 0,
            width: 3,
            height: 3
        }
    );
    assert_eq!(window, full.restrict(&window.extent()).unwrap());
}

#[test]
fn test_read_full_values() {
    let tmp = TempDir::new().unwrap();
    let path = common::write_standard(tmp.path(), "dem.tif");
    let dataset = RasterDataset::open(&path).unwrap();

    let full = dataset.primary().unwrap().read_full().unwrap();
    assert_eq!(full.width(), WIDTH);
    assert_eq!(full.height(), HEIGHT);
    for (row, col) in [(0, 0), (4, 7), (14, 19), (12, 0)] {
        assert_eq!(
            full.sample(col, row, 0),
            Some(common::cell_value(col, row) as f64)
        );
    }
    assert_eq!(full.sample(WIDTH, 0, 0), None);

    let stats = full.statistics(0).unwrap();
    assert_eq!(stats.count, (WIDTH * HEIGHT) as usize - 1);
    assert_eq!(stats.nodata_count, 1);
    assert_eq!(stats.min, Some(0.0));
    assert_eq!(stats.max, Some(1419.0));
}

#[test]
fn test_full_extent_window_equals_full_read() {
    let tmp = TempDir::new().unwrap();
    let path = common::write_standard(tmp.path(), "dem.tif");
    let dataset = RasterDataset::open(&path).unwrap();
    let grid = dataset.primary().unwrap();

    let window = grid.read_window(&grid.envelope()).unwrap();
    assert_eq!(window, grid.read_full().unwrap());
}

#[test]
fn test_window_equals_restricted_full_read() {
    let tmp = TempDir::new().unwrap();
    let path = common::write_standard(tmp.path(), "dem.tif");
    let dataset = RasterDataset::open(&path).unwrap();
    let grid = dataset.primary().unwrap();
    let full = grid.read_full().unwrap();

    // Crosses strip boundaries (4 rows per strip) and cuts cells partially
    let aoi = utm_envelope(
        ORIGIN_X + 25.0,
        ORIGIN_Y - 113.0,
        ORIGIN_X + 71.0,
        ORIGIN_Y - 32.0,
    );
    let window = grid.read_window(&aoi).unwrap();

    assert_eq!(
        window.extent(),
        GridExtent {
            col_off: 2,
            row_off: 3,
            width: 6,
            height: 9,
        }
    );
    assert_eq!(window.crs(), utm());
    assert_eq!(Some(window.clone()), full.restrict(&window.extent()));
    assert_eq!(window.sample(2, 3, 0), Some(302.0));
    assert_eq!(window.sample(7, 11, 0), Some(1107.0));
}

#[test]
fn test_window_geometry_matches_read() {
    let tmp = TempDir::new().unwrap();
    let path = common::write_standard(tmp.path(), "dem.tif");
    let dataset = RasterDataset::open(&path).unwrap();
    let grid = dataset.primary().unwrap();

    let aoi = cells_envelope(5, 5, 9, 7);
    let geometry = grid.window_geometry(&aoi).unwrap();
    let window = grid.read_window(&aoi).unwrap();
    assert_eq!(*window.geometry(), geometry);
    assert_eq!(geometry.extent.cell_count(), 8);
}

#[test]
fn test_aoi_larger_than_raster_is_clipped() {
    let tmp = TempDir::new().unwrap();
    let path = common::write_standard(tmp.path(), "dem.tif");
    let dataset = RasterDataset::open(&path).unwrap();
    let grid = dataset.primary().unwrap();

    let aoi = utm_envelope(
        ORIGIN_X - 1000.0,
        ORIGIN_Y - 1000.0,
        ORIGIN_X + 1000.0,
        ORIGIN_Y + 1000.0,
    );
    let window = grid.read_window(&aoi).unwrap();
    assert_eq!(window.extent(), GridExtent::full(WIDTH, HEIGHT));
}

#[test]
fn test_wgs84_aoi_on_projected_raster() {
    let tmp = TempDir::new().unwrap();
    let path = common::write_standard(tmp.path(), "dem.tif");
    let dataset = RasterDataset::open(&path).unwrap();
    let grid = dataset.primary().unwrap();
    let full = grid.read_full().unwrap();

    let native = cells_envelope(6, 4, 12, 10);
    let aoi = reproject(&native, Crs::WGS84).unwrap();
    assert_eq!(aoi.crs(), Crs::WGS84);

    let window = grid.read_window(&aoi).unwrap();
    assert_eq!(window.crs(), utm());

    // The geographic box is a superset of the projected cells it came from
    let extent = window.extent();
    assert!(extent.col_off <= 6 && extent.col_end() >= 12);
    assert!(extent.row_off <= 4 && extent.row_end() >= 10);
    assert!(extent.width <= 8 && extent.height <= 8);
    assert_eq!(Some(window.clone()), full.restrict(&extent));
}

#[test]
fn test_disjoint_aoi_is_out_of_bounds() {
    let tmp = TempDir::new().unwrap();
    let path = common::write_standard(tmp.path(), "dem.tif");
    let dataset = RasterDataset::open(&path).unwrap();
    let grid = dataset.primary().unwrap();

    let aoi = utm_envelope(0.0, 0.0, 100.0, 100.0);
    match grid.read_window(&aoi) {
        Err(HotmapError::OutOfBounds {
            requested, extent, ..
        }) => {
            assert_eq!(requested, aoi);
            assert_eq!(extent, grid.envelope());
        }
        other => panic!("expected OutOfBounds, got {other:?}"),
    }
}

#[test]
fn test_edge_touching_aoi_is_out_of_bounds() {
    let tmp = TempDir::new().unwrap();
    let path = common::write_standard(tmp.path(), "dem.tif");
    let dataset = RasterDataset::open(&path).unwrap();
    let grid = dataset.primary().unwrap();

    let east = ORIGIN_X + WIDTH as f64 * CELL;
    let aoi = utm_envelope(east, ORIGIN_Y - 50.0, east + 100.0, ORIGIN_Y);
    assert!(matches!(
        grid.read_window(&aoi),
        Err(HotmapError::OutOfBounds { .. })
    ));
}

#[test]
fn test_unknown_aoi_crs_fails_reprojection() {
    let tmp = TempDir::new().unwrap();
    let path = common::write_standard(tmp.path(), "dem.tif");
    let dataset = RasterDataset::open(&path).unwrap();
    let grid = dataset.primary().unwrap();

    let aoi = Envelope::new(
        Crs::from_epsg(999_999),
        AxisRange::new(0.0, 1.0),
        AxisRange::new(0.0, 1.0),
    )
    .unwrap();
    assert!(matches!(
        grid.read_window(&aoi),
        Err(HotmapError::Reprojection { .. })
    ));
}

#[test]
fn test_data_points_skip_nodata() {
    let tmp = TempDir::new().unwrap();
    let path = common::write_standard(tmp.path(), "dem.tif");
    let dataset = RasterDataset::open(&path).unwrap();
    let grid = dataset.primary().unwrap();

    let window = grid.read_window(&cells_envelope(2, 1, 5, 3)).unwrap();
    let points = window.data_points(0).unwrap();
    assert_eq!(points.len(), 5);
    assert!(points.iter().all(|p| p.value() != NODATA as f64));

    let first = points[0];
    assert_eq!(first.x(), ORIGIN_X + 2.5 * CELL);
    assert_eq!(first.y(), ORIGIN_Y - 1.5 * CELL);
    assert_eq!(first.value(), 102.0);
}

#[test]
fn test_missing_file_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let result = RasterDataset::open(tmp.path().join("nope.tif"));
    assert!(matches!(result, Err(HotmapError::NotFound { .. })));
}

#[test]
fn test_directory_is_unsupported() {
    let tmp = TempDir::new().unwrap();
    let result = RasterDataset::open(tmp.path());
    assert!(matches!(
        result,
        Err(HotmapError::UnsupportedFormat { .. })
    ));
}

#[test]
fn test_empty_and_text_files_are_unsupported() {
    let tmp = TempDir::new().unwrap();
    let empty = tmp.path().join("empty.tif");
    fs::write(&empty, b"").unwrap();
    let text = tmp.path().join("notes.tif");
    fs::write(&text, b"this is not a raster at all").unwrap();

    assert!(matches!(
        RasterDataset::open(&empty),
        Err(HotmapError::UnsupportedFormat { .. })
    ));
    assert!(matches!(
        RasterDataset::open(&text),
        Err(HotmapError::UnsupportedFormat { .. })
    ));
}

#[test]
fn test_truncated_file_fails() {
    let tmp = TempDir::new().unwrap();
    let path = common::write_standard(tmp.path(), "dem.tif");
    let bytes = fs::read(&path).unwrap();
    let truncated = tmp.path().join("truncated.tif");
    fs::write(&truncated, &bytes[..12]).unwrap();

    let result = RasterDataset::open(&truncated);
    assert!(matches!(
        result,
        Err(HotmapError::UnsupportedFormat { .. }) | Err(HotmapError::CorruptData { .. })
    ));
}

#[test]
fn test_plain_tiff_is_unsupported() {
    let tmp = TempDir::new().unwrap();
    let path = common::write_plain_tiff(tmp.path(), "photo.tif");
    assert!(matches!(
        RasterDataset::open(&path),
        Err(HotmapError::UnsupportedFormat { .. })
    ));
}

#[test]
fn test_no_grid_image_is_empty_dataset() {
    let tmp = TempDir::new().unwrap();
    let path = common::write_without_georeferencing(tmp.path(), "keys_only.tif");
    assert!(matches!(
        RasterDataset::open(&path),
        Err(HotmapError::EmptyDataset { .. })
    ));
}

#[test]
fn test_failed_open_leaves_dataset_unopened() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("later.tif");
    let mut dataset = RasterDataset::new(&missing);

    assert!(dataset.try_open().is_err());
    assert_eq!(dataset.state(), DatasetState::Unopened);

    // The file appears; the same dataset can now be opened
    fs::copy(common::write_standard(tmp.path(), "dem.tif"), &missing).unwrap();
    dataset.try_open().unwrap();
    assert_eq!(dataset.state(), DatasetState::Opened);
}

#[test]
fn test_state_machine() {
    let tmp = TempDir::new().unwrap();
    let path = common::write_standard(tmp.path(), "dem.tif");

    let mut dataset = RasterDataset::new(&path);
    assert!(matches!(
        dataset.resources(),
        Err(HotmapError::InvalidState {
            state: DatasetState::Unopened,
            ..
        })
    ));

    dataset.try_open().unwrap();
    assert!(matches!(
        dataset.try_open(),
        Err(HotmapError::InvalidState {
            state: DatasetState::Opened,
            ..
        })
    ));

    dataset.close();
    dataset.close();
    assert_eq!(dataset.state(), DatasetState::Closed);
    assert!(matches!(
        dataset.primary(),
        Err(HotmapError::InvalidState {
            state: DatasetState::Closed,
            ..
        })
    ));
    assert!(matches!(
        dataset.try_open(),
        Err(HotmapError::InvalidState { .. })
    ));
}

#[test]
fn test_independent_handles_read_concurrently() {
    let tmp = TempDir::new().unwrap();
    let path = common::write_standard(tmp.path(), "dem.tif");
    let expected = RasterDataset::open(&path)
        .unwrap()
        .primary()
        .unwrap()
        .read_full()
        .unwrap();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    let dataset = RasterDataset::open(&path).unwrap();
                    dataset.primary().unwrap().read_full().unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });
}

#[test]
fn test_pyramid_resources() {
    let tmp = TempDir::new().unwrap();
    let path = common::write_pyramid(tmp.path(), "cog.tif");
    let dataset = RasterDataset::open(&path).unwrap();

    let resources = dataset.resources().unwrap();
    assert_eq!(resources.len(), 3);
    let names: Vec<_> = resources.clone().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["image-0", "overview-0", "mask-0"]);

    // Restartable: a clone iterates from the start again
    let again: Vec<_> = resources.map(|r| r.index).collect();
    assert_eq!(again, [0, 1, 2]);

    let overview = dataset.select("overview-0").unwrap();
    assert!(overview.descriptor().overview);
    assert_eq!(overview.crs(), utm());
    assert_eq!(overview.descriptor().nodata, Some(NODATA as f64));
    // Inherited geo-referencing covers the same ground as the primary image
    let primary = dataset.primary().unwrap();
    let [a0, b0, a1, b1] = overview.envelope().bounds();
    let [p0, q0, p1, q1] = primary.envelope().bounds();
    for (got, want) in [(a0, p0), (b0, q0), (a1, p1), (b1, q1)] {
        assert!((got - want).abs() < 1e-6);
    }

    let cells = overview.read_full().unwrap();
    assert_eq!((cells.width(), cells.height()), (10, 8));
    assert_eq!(cells.sample(3, 1, 0), Some(13.0));
}

#[test]
fn test_select_errors() {
    let tmp = TempDir::new().unwrap();
    let path = common::write_pyramid(tmp.path(), "cog.tif");
    let dataset = RasterDataset::open(&path).unwrap();

    let mask = dataset
        .resources()
        .unwrap()
        .find(|r| r.name == "mask-0")
        .unwrap();
    assert_eq!(mask.kind, ResourceKind::Mask);

    assert!(matches!(
        dataset.select("mask-0"),
        Err(HotmapError::NotAGridResource { .. })
    ));
    assert!(matches!(
        dataset.select(7usize),
        Err(HotmapError::ResourceNotFound { .. })
    ));
    assert!(matches!(
        dataset.select("image-9"),
        Err(HotmapError::ResourceNotFound { .. })
    ));
    assert_eq!(dataset.select(0usize).unwrap().name(), "image-0");
}
