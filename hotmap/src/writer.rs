//! GeoTIFF export of a grid coverage.
//!
//! Writes one band as 32-bit float with enough GeoTIFF metadata (tiepoint,
//! pixel scale, key directory and GDAL_NODATA) for map clients and GIS tools
//! to place it again.

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};

use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;
use tiff::TiffError;

use crate::coverage::GridCoverage;
use crate::error::{HotmapError, Result};
use crate::geotiff::{
    KEY_GEOGRAPHIC_TYPE, KEY_MODEL_TYPE, KEY_PROJECTED_TYPE, KEY_RASTER_TYPE,
    MODEL_TYPE_GEOGRAPHIC, MODEL_TYPE_PROJECTED, RASTER_PIXEL_IS_AREA, TAG_GDAL_NODATA,
    TAG_GEO_KEY_DIRECTORY, TAG_MODEL_PIXEL_SCALE, TAG_MODEL_TIEPOINT,
};

/// Writes a [`GridCoverage`] band as a single-image GeoTIFF.
///
/// # Example
///
/// ```ignore
/// use hotmap::{GeoTiffWriter, RasterDataset};
///
/// let dataset = RasterDataset::open("dgm1_33493_5664.tif")?;
/// let subset = dataset.primary()?.read_window(&aoi)?;
/// GeoTiffWriter::new(&subset).rows_per_strip(64).write("subset.tif")?;
/// ```
#[derive(Debug, Clone, Copy)]
pub struct GeoTiffWriter<'a> {
    coverage: &'a GridCoverage,
    band: usize,
    rows_per_strip: Option<u32>,
}

impl<'a> GeoTiffWriter<'a> {
    pub fn new(coverage: &'a GridCoverage) -> Self {
        Self {
            coverage,
            band: 0,
            rows_per_strip: None,
        }
    }

    /// Band to export (default 0).
    pub fn band(mut self, band: usize) -> Self {
        self.band = band;
        self
    }

    /// Rows per strip. Defaults to the encoder's choice.
    pub fn rows_per_strip(mut self, rows: u32) -> Self {
        self.rows_per_strip = Some(rows.max(1));
        self
    }

    /// Write to a file, replacing it if it exists.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| HotmapError::Write {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let mut writer = BufWriter::new(file);
        self.encode(&mut writer, path)?;
        writer.flush().map_err(|e| HotmapError::Write {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        tracing::debug!(
            "Wrote {}x{} GeoTIFF to {}",
            self.coverage.width(),
            self.coverage.height(),
            path.display()
        );
        Ok(())
    }

    /// Write to any seekable sink.
    pub fn write_to<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        self.encode(writer, Path::new("<stream>"))
    }

    fn encode<W: Write + Seek>(&self, writer: &mut W, path: &Path) -> Result<()> {
        let coverage = self.coverage;
        let fail = |message: String| HotmapError::Write {
            path: PathBuf::from(path),
            message,
        };
        let tiff_fail = |e: TiffError| fail(e.to_string());

        let data: Vec<f32> = coverage
            .band_values(self.band)?
            .map(|v| v as f32)
            .collect();
        if data.is_empty() {
            return Err(fail("coverage has no cells".to_string()));
        }

        let geo_keys = self.geo_keys().map_err(fail)?;
        let transform = coverage.geometry().transform;
        let extent = coverage.extent();
        let (origin_x, origin_y) =
            transform.cell_corner(extent.col_off as f64, extent.row_off as f64);
        let tiepoint = [0.0, 0.0, 0.0, origin_x, origin_y, 0.0];
        let pixel_scale = [transform.pixel_width, -transform.pixel_height, 0.0];

        let mut encoder = TiffEncoder::new(writer).map_err(tiff_fail)?;
        let mut image = encoder
            .new_image::<Gray32Float>(coverage.width(), coverage.height())
            .map_err(tiff_fail)?;
        if let Some(rows) = self.rows_per_strip {
            image.rows_per_strip(rows).map_err(tiff_fail)?;
        }

        let dir = image.encoder();
        dir.write_tag(Tag::Unknown(TAG_MODEL_PIXEL_SCALE), pixel_scale.as_slice())
            .map_err(tiff_fail)?;
        dir.write_tag(Tag::Unknown(TAG_MODEL_TIEPOINT), tiepoint.as_slice())
            .map_err(tiff_fail)?;
        dir.write_tag(Tag::Unknown(TAG_GEO_KEY_DIRECTORY), geo_keys.as_slice())
            .map_err(tiff_fail)?;
        if let Some(nodata) = coverage.nodata() {
            dir.write_tag(Tag::Unknown(TAG_GDAL_NODATA), nodata.to_string().as_str())
                .map_err(tiff_fail)?;
        }

        image.write_data(&data).map_err(tiff_fail)?;
        Ok(())
    }

    /// GeoKeyDirectory: header plus model type, raster type and CRS keys.
    fn geo_keys(&self) -> std::result::Result<Vec<u16>, String> {
        let crs = self.coverage.crs();
        let code = u16::try_from(crs.epsg())
            .map_err(|_| format!("{crs} cannot be stored as a GeoKey"))?;

        let (model_type, crs_key) = if crs.is_geographic() {
            (MODEL_TYPE_GEOGRAPHIC, KEY_GEOGRAPHIC_TYPE)
        } else {
            (MODEL_TYPE_PROJECTED, KEY_PROJECTED_TYPE)
        };

        Ok(vec![
            1, 1, 0, 3, //
            KEY_MODEL_TYPE, 0, 1, model_type, //
            KEY_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA, //
            crs_key, 0, 1, code,
        ])
    }
}
