//! Cell-by-cell combination of coverages.
//!
//! [`composite`] stacks coverages of one grid (a time series of the same
//! scene, usually) and reduces every cell with a [`Reducer`], so a seasonal
//! mean is the same operation as a heatmap cell mean. [`normalized_difference`]
//! and [`UrbanIndex`] derive index bands from the bands of one coverage.
//!
//! Missing data never enters a result: nodata and NaN inputs are skipped, and
//! a cell without any valid input is missing in the output as well.

use crate::coverage::GridCoverage;
use crate::error::{HotmapError, Result};
use crate::heatmap::Reducer;

/// Reduce one band of several coverages to a single-band coverage.
///
/// The output keeps the geometry and nodata marker of the first coverage.
/// Cells where no input holds a valid value are set to that marker, or NaN if
/// there is none. This also holds for [`Reducer::Count`].
///
/// # Errors
///
/// - [`HotmapError::IncompatibleCoverages`] if `coverages` is empty or the
///   grids differ in extent, transform or CRS
/// - [`HotmapError::InvalidBand`] if a coverage lacks `band`
pub fn composite(coverages: &[GridCoverage], band: usize, reducer: Reducer) -> Result<GridCoverage> {
    let first = coverages
        .first()
        .ok_or_else(|| HotmapError::IncompatibleCoverages {
            reason: "no coverages to combine".to_string(),
        })?;

    for (index, coverage) in coverages.iter().enumerate() {
        if coverage.geometry() != first.geometry() {
            return Err(HotmapError::IncompatibleCoverages {
                reason: format!(
                    "coverage {} is {}x{} cells over {}, coverage 0 is {}x{} cells over {}",
                    index,
                    coverage.width(),
                    coverage.height(),
                    coverage.envelope(),
                    first.width(),
                    first.height(),
                    first.envelope()
                ),
            });
        }
        coverage.check_band(band)?;
    }

    let cells = first.extent().cell_count();
    let fill = first.nodata().unwrap_or(f64::NAN);
    let mut values = Vec::with_capacity(cells);
    let mut stack = Vec::with_capacity(coverages.len());

    for cell in 0..cells {
        stack.clear();
        stack.extend(coverages.iter().filter_map(|coverage| {
            let value = coverage.values()[cell * coverage.band_count() + band];
            (!coverage.is_nodata(value)).then_some(value)
        }));

        if stack.is_empty() {
            values.push(fill);
        } else {
            stack.sort_by(f64::total_cmp);
            values.push(reducer.reduce(&stack));
        }
    }

    tracing::debug!(
        "Composited {} coverages of {} cells with {}",
        coverages.len(),
        cells,
        reducer
    );

    Ok(GridCoverage::new(*first.geometry(), 1, first.nodata(), values))
}

/// `(a - b) / (a + b)`, or `None` when the sum is zero.
fn ratio(a: f64, b: f64) -> Option<f64> {
    let sum = a + b;
    (sum != 0.0).then(|| (a - b) / sum)
}

/// Normalised difference of two bands, `(a - b) / (a + b)` per cell.
///
/// The result has one band, no nodata marker and NaN where either input is
/// missing or both sum to zero. NDVI is `normalized_difference(c, nir, red)`,
/// NDWI is `normalized_difference(c, green, nir)`.
pub fn normalized_difference(
    coverage: &GridCoverage,
    band_a: usize,
    band_b: usize,
) -> Result<GridCoverage> {
    coverage.check_band(band_a)?;
    coverage.check_band(band_b)?;

    let values = coverage
        .values()
        .chunks_exact(coverage.band_count())
        .map(|cell| {
            let (a, b) = (cell[band_a], cell[band_b]);
            if coverage.is_nodata(a) || coverage.is_nodata(b) {
                return f64::NAN;
            }
            ratio(a, b).unwrap_or(f64::NAN)
        })
        .collect();

    Ok(GridCoverage::new(*coverage.geometry(), 1, None, values))
}

/// Urban index with water masked out, from four reflectance bands.
///
/// A cell is water when NDWI (green vs. NIR) or MNDWI (green vs. SWIR)
/// exceeds `water_threshold`; water cells get `water_value`. Every other cell
/// gets the normalised difference of red and NIR.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UrbanIndex {
    pub green: usize,
    pub red: usize,
    pub nir: usize,
    pub swir: usize,
    pub water_threshold: f64,
    pub water_value: f64,
}

impl UrbanIndex {
    pub const DEFAULT_WATER_THRESHOLD: f64 = 0.3;
    pub const DEFAULT_WATER_VALUE: f64 = -0.5;

    /// Band indices in the coverage, with the default water mask.
    pub fn new(green: usize, red: usize, nir: usize, swir: usize) -> Self {
        Self {
            green,
            red,
            nir,
            swir,
            water_threshold: Self::DEFAULT_WATER_THRESHOLD,
            water_value: Self::DEFAULT_WATER_VALUE,
        }
    }

    /// Single-band index coverage, NaN where an input band is missing.
    pub fn compute(&self, coverage: &GridCoverage) -> Result<GridCoverage> {
        for band in [self.green, self.red, self.nir, self.swir] {
            coverage.check_band(band)?;
        }

        let values = coverage
            .values()
            .chunks_exact(coverage.band_count())
            .map(|cell| self.cell_value(coverage, cell))
            .collect();

        Ok(GridCoverage::new(*coverage.geometry(), 1, None, values))
    }

    fn cell_value(&self, coverage: &GridCoverage, cell: &[f64]) -> f64 {
        let [green, red, nir, swir] = [self.green, self.red, self.nir, self.swir].map(|b| cell[b]);
        if [green, red, nir, swir].iter().any(|&v| coverage.is_nodata(v)) {
            return f64::NAN;
        }

        let is_water = [ratio(green, nir), ratio(green, swir)]
            .into_iter()
            .flatten()
            .any(|index| index > self.water_threshold);
        if is_water {
            return self.water_value;
        }
        ratio(red, nir).unwrap_or(f64::NAN)
    }
}
