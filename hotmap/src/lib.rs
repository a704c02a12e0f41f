//! # Hotmap - Raster Windows and Point Heatmaps
//!
//! Library for reading geo-referenced GeoTIFF rasters and turning point
//! samples into resolution-bucketed heatmaps.
//!
//! ## Features
//!
//! - **Windowed reads**: only the strips or tiles that intersect an area of
//!   interest are decoded, and the area may be given in any EPSG CRS
//! - **Exact windows**: a windowed read equals the full read restricted to the
//!   same cells, in the raster's native CRS
//! - **Sub-resources**: every image of a multi-image TIFF (overviews, masks) is
//!   listed and classified
//! - **Heatmaps**: deterministic, order-independent bucketing with mean, sum,
//!   min, max or count per cell
//! - **Catalog**: validated raster directory with a cached summary per file
//! - **Time composites**: rasters selected by the date in their file name and
//!   reduced cell by cell, plus normalised-difference band indices
//!
//! ## Quick Start
//!
//! ```ignore
//! use hotmap::{AxisRange, Crs, Envelope, Heatmap, RasterDataset};
//!
//! let dataset = RasterDataset::open("/data/rasters/ndvi.tif")?;
//! let grid = dataset.primary()?;
//!
//! // Area of interest in WGS 84, reprojected to the raster's CRS internally
//! let aoi = Envelope::new(
//!     Crs::WGS84,
//!     AxisRange::new(2.60, 2.62),
//!     AxisRange::new(48.99, 49.01),
//! )?;
//! let coverage = grid.read_window(&aoi)?;
//!
//! // Cell centres become points, bucketed into 100 m cells
//! let points = coverage.data_points(0)?;
//! let heatmap = Heatmap::build(&points, 100.0)?;
//! println!("{} cells", heatmap.len());
//! ```
//!
//! ## GeoTIFF Support
//!
//! - Strip and tile layouts, any compression the `tiff` crate decodes
//! - 8/16/32/64-bit integer and 32/64-bit float samples, interleaved bands
//! - Geo-referencing from ModelTiepoint + ModelPixelScale or a north-up
//!   ModelTransformation; PixelIsArea and PixelIsPoint
//! - CRS from the EPSG code in the GeoKeyDirectory
//! - Nodata from the GDAL_NODATA tag

pub mod catalog;
pub mod colormap;
pub mod composite;
pub mod coverage;
pub mod crs;
pub mod dataset;
pub mod dates;
pub mod error;
pub mod geotiff;
pub mod heatmap;
pub mod writer;

#[cfg(feature = "geojson")]
pub mod geojson;

// Re-export main types at crate root for convenience
pub use catalog::{
    CacheStats, CatalogEntry, DatedComposite, RasterCatalog, RasterCatalogBuilder, RasterSummary,
};
pub use chrono::NaiveDate;
pub use colormap::Colormap;
pub use composite::{composite, normalized_difference, UrbanIndex};
pub use coverage::{CoverageStatistics, GeoTransform, GridCoverage, GridExtent, GridGeometry};
pub use crs::{project_point, reproject, AxisRange, Crs, CrsTransform, Envelope};
pub use dataset::{
    DatasetState, GridResource, RasterDataset, ResourceInfo, ResourceRef, Resources,
};
pub use dates::{date_from_name, DateRange};
pub use error::{HotmapError, Result};
pub use geotiff::{GridDescriptor, ResourceKind};
pub use heatmap::{CellKey, DataPoint, Heatmap, Reducer};
pub use writer::GeoTiffWriter;
