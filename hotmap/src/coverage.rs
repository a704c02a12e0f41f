//! Grid geometry and the cell data returned by raster reads.
//!
//! A [`GridCoverage`] always carries the geometry of the *full* grid it was
//! read from: its [`GridExtent`] is a sub-rectangle of the full grid's index
//! space and its [`GeoTransform`] is the full grid's transform. Cell `(col,
//! row)` therefore has the same value and the same world position whether it
//! came from a full read or a windowed one.

use crate::crs::{Crs, Envelope};
use crate::error::{HotmapError, Result};
use crate::heatmap::DataPoint;

/// Distance from an integer below which a fractional grid coordinate snaps to it.
const GRID_SNAP_EPSILON: f64 = 1e-9;

/// North-up affine mapping from grid indices to CRS coordinates.
///
/// The world position of the top-left corner of cell `(col, row)` is
/// `(origin_x + col * pixel_width, origin_y + row * pixel_height)`.
/// `pixel_height` is negative for the usual top-down row order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// World coordinates of the top-left corner of a cell.
    pub fn cell_corner(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width,
            self.origin_y + row * self.pixel_height,
        )
    }

    /// World coordinates of the centre of a cell.
    pub fn cell_center(&self, col: u32, row: u32) -> (f64, f64) {
        self.cell_corner(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Fractional grid coordinates `(col, row)` of a world position.
    pub fn world_to_grid(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (y - self.origin_y) / self.pixel_height,
        )
    }

    /// Same origin with cells `factor_x` / `factor_y` times larger.
    pub fn scaled(&self, factor_x: f64, factor_y: f64) -> GeoTransform {
        GeoTransform {
            pixel_width: self.pixel_width * factor_x,
            pixel_height: self.pixel_height * factor_y,
            ..*self
        }
    }
}

/// A rectangle of cells in grid index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridExtent {
    pub col_off: u32,
    pub row_off: u32,
    pub width: u32,
    pub height: u32,
}

impl GridExtent {
    /// Extent starting at the grid origin.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            col_off: 0,
            row_off: 0,
            width,
            height,
        }
    }

    /// One past the last column.
    pub fn col_end(&self) -> u32 {
        self.col_off + self.width
    }

    /// One past the last row.
    pub fn row_end(&self) -> u32 {
        self.row_off + self.height
    }

    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains(&self, col: u32, row: u32) -> bool {
        col >= self.col_off && col < self.col_end() && row >= self.row_off && row < self.row_end()
    }

    /// Overlapping cells, or `None` if the extents share no cell.
    pub fn intersection(&self, other: &GridExtent) -> Option<GridExtent> {
        let col_off = self.col_off.max(other.col_off);
        let row_off = self.row_off.max(other.row_off);
        let col_end = self.col_end().min(other.col_end());
        let row_end = self.row_end().min(other.row_end());
        if col_off >= col_end || row_off >= row_end {
            return None;
        }
        Some(GridExtent {
            col_off,
            row_off,
            width: col_end - col_off,
            height: row_end - row_off,
        })
    }
}

/// Extent in grid space, mapped to a CRS by a transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridGeometry {
    pub extent: GridExtent,
    pub transform: GeoTransform,
    pub crs: Crs,
}

impl GridGeometry {
    /// World-space envelope covered by the extent's cells.
    pub fn envelope(&self) -> Envelope {
        let corner_a = self
            .transform
            .cell_corner(self.extent.col_off as f64, self.extent.row_off as f64);
        let corner_b = self
            .transform
            .cell_corner(self.extent.col_end() as f64, self.extent.row_end() as f64);
        Envelope::spanning(self.crs, corner_a, corner_b)
    }

    /// Same transform and CRS, different extent.
    pub fn with_extent(&self, extent: GridExtent) -> GridGeometry {
        GridGeometry { extent, ..*self }
    }

    /// Cells of this geometry touched by `envelope`.
    ///
    /// The envelope must already be in this geometry's CRS. Returns `None`
    /// when no cell with positive overlap exists.
    pub fn cells_within(&self, envelope: &Envelope) -> Option<GridExtent> {
        let (c0, r0) = self
            .transform
            .world_to_grid(envelope.x().min, envelope.y().min);
        let (c1, r1) = self
            .transform
            .world_to_grid(envelope.x().max, envelope.y().max);

        let col_start = snap(c0.min(c1)).floor();
        let col_end = snap(c0.max(c1)).ceil();
        let row_start = snap(r0.min(r1)).floor();
        let row_end = snap(r0.max(r1)).ceil();

        let window = clamp_range(col_start, col_end, self.extent.col_off, self.extent.col_end())
            .zip(clamp_range(row_start, row_end, self.extent.row_off, self.extent.row_end()))
            .map(|((col_off, col_end), (row_off, row_end))| GridExtent {
                col_off,
                row_off,
                width: col_end - col_off,
                height: row_end - row_off,
            })?;

        (!window.is_empty()).then_some(window)
    }
}

fn snap(v: f64) -> f64 {
    let rounded = v.round();
    if (v - rounded).abs() < GRID_SNAP_EPSILON {
        rounded
    } else {
        v
    }
}

fn clamp_range(start: f64, end: f64, lo: u32, hi: u32) -> Option<(u32, u32)> {
    let start = start.max(lo as f64);
    let end = end.min(hi as f64);
    (start < end).then_some((start as u32, end as u32))
}

/// Summary statistics of one band.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CoverageStatistics {
    /// Cells holding a valid value.
    pub count: usize,
    /// Cells equal to the nodata value or NaN.
    pub nodata_count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
}

/// Cell values of a grid read, with their geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct GridCoverage {
    geometry: GridGeometry,
    bands: usize,
    nodata: Option<f64>,
    /// Row-major over the extent, bands interleaved per cell.
    values: Vec<f64>,
}

impl GridCoverage {
    pub(crate) fn new(
        geometry: GridGeometry,
        bands: usize,
        nodata: Option<f64>,
        values: Vec<f64>,
    ) -> Self {
        debug_assert_eq!(values.len(), geometry.extent.cell_count() * bands);
        Self {
            geometry,
            bands,
            nodata,
            values,
        }
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn extent(&self) -> GridExtent {
        self.geometry.extent
    }

    pub fn crs(&self) -> Crs {
        self.geometry.crs
    }

    pub fn envelope(&self) -> Envelope {
        self.geometry.envelope()
    }

    pub fn width(&self) -> u32 {
        self.geometry.extent.width
    }

    pub fn height(&self) -> u32 {
        self.geometry.extent.height
    }

    pub fn band_count(&self) -> usize {
        self.bands
    }

    /// The raster's nodata marker, if it declares one.
    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    /// Raw values: row-major over the extent, bands interleaved per cell.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Whether a value marks missing data (the nodata marker or NaN).
    pub fn is_nodata(&self, value: f64) -> bool {
        value.is_nan() || self.nodata.is_some_and(|nodata| value == nodata)
    }

    /// Value of a cell addressed by its index in the full grid.
    ///
    /// Returns `None` if the cell lies outside this coverage's extent or the
    /// band does not exist. Nodata values are returned as stored.
    pub fn sample(&self, col: u32, row: u32, band: usize) -> Option<f64> {
        let extent = self.geometry.extent;
        if band >= self.bands || !extent.contains(col, row) {
            return None;
        }
        let local_col = (col - extent.col_off) as usize;
        let local_row = (row - extent.row_off) as usize;
        let idx = (local_row * extent.width as usize + local_col) * self.bands + band;
        self.values.get(idx).copied()
    }

    /// All values of one band in row-major order.
    pub fn band_values(&self, band: usize) -> Result<impl Iterator<Item = f64> + '_> {
        self.check_band(band)?;
        Ok(self.values.iter().skip(band).step_by(self.bands).copied())
    }

    /// Statistics over the valid cells of one band.
    pub fn statistics(&self, band: usize) -> Result<CoverageStatistics> {
        let mut stats = CoverageStatistics::default();
        let mut sum = 0.0;

        for value in self.band_values(band)? {
            if self.is_nodata(value) {
                stats.nodata_count += 1;
                continue;
            }
            stats.count += 1;
            sum += value;
            stats.min = Some(stats.min.map_or(value, |m| m.min(value)));
            stats.max = Some(stats.max.map_or(value, |m| m.max(value)));
        }

        if stats.count > 0 {
            stats.mean = Some(sum / stats.count as f64);
        }
        Ok(stats)
    }

    /// Cell centres of one band as point samples in the coverage's CRS.
    ///
    /// Nodata and NaN cells are skipped.
    pub fn data_points(&self, band: usize) -> Result<Vec<DataPoint>> {
        self.check_band(band)?;
        let extent = self.geometry.extent;
        let mut points = Vec::with_capacity(extent.cell_count());

        for row in extent.row_off..extent.row_end() {
            for col in extent.col_off..extent.col_end() {
                let Some(value) = self.sample(col, row, band) else {
                    continue;
                };
                if self.is_nodata(value) {
                    continue;
                }
                let (x, y) = self.geometry.transform.cell_center(col, row);
                points.push(DataPoint::new(x, y, value));
            }
        }

        Ok(points)
    }

    /// Copy of the cells inside `extent` (clipped to this coverage).
    pub fn restrict(&self, extent: &GridExtent) -> Option<GridCoverage> {
        let target = self.geometry.extent.intersection(extent)?;
        let mut values = Vec::with_capacity(target.cell_count() * self.bands);
        let source = self.geometry.extent;

        for row in target.row_off..target.row_end() {
            let local_row = (row - source.row_off) as usize;
            let start = (local_row * source.width as usize
                + (target.col_off - source.col_off) as usize)
                * self.bands;
            let end = start + target.width as usize * self.bands;
            values.extend_from_slice(&self.values[start..end]);
        }

        Some(GridCoverage::new(
            self.geometry.with_extent(target),
            self.bands,
            self.nodata,
            values,
        ))
    }

    pub(crate) fn check_band(&self, band: usize) -> Result<()> {
        if band >= self.bands {
            return Err(HotmapError::InvalidBand {
                band,
                bands: self.bands,
            });
        }
        Ok(())
    }
}
