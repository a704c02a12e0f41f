//! Error types for the Hotmap library.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

use crate::crs::{Crs, Envelope};
use crate::dataset::DatasetState;

/// Errors that can occur when reading rasters or building heatmaps.
///
/// Every variant is terminal for the operation that raised it. Nothing in the
/// library retries.
#[derive(Error, Debug)]
pub enum HotmapError {
    /// The raster file (or raster directory) does not exist.
    #[error("Raster source not found: {path}")]
    NotFound { path: PathBuf },

    /// The file exists but is not a geo-referenced raster container.
    #[error("Unsupported raster format in {path}: {reason}")]
    UnsupportedFormat { path: PathBuf, reason: String },

    /// The container was recognized but its metadata or data is malformed.
    #[error("Corrupt raster data in {path}: {reason}")]
    CorruptData { path: PathBuf, reason: String },

    /// Nothing readable was found (no grid images in a file, no matching
    /// files in a directory).
    #[error("No readable rasters in {path}")]
    EmptyDataset { path: PathBuf },

    /// The referenced sub-resource exists but is not a readable grid coverage.
    #[error("Resource {resource} in {path} is not a grid coverage (it is {kind})")]
    NotAGridResource {
        path: PathBuf,
        resource: String,
        kind: String,
    },

    /// The referenced sub-resource does not exist.
    #[error("Resource {resource} not found in {path}")]
    ResourceNotFound { path: PathBuf, resource: String },

    /// Reading cells from the underlying storage failed.
    #[error("I/O error reading {path}: {message}")]
    Io { path: PathBuf, message: String },

    /// The requested area does not intersect the raster extent.
    #[error("Area of interest {requested} does not intersect {path} (extent {extent})")]
    OutOfBounds {
        path: PathBuf,
        requested: Envelope,
        extent: Envelope,
    },

    /// No valid transform exists between two coordinate reference systems.
    #[error("Cannot reproject from {from} to {to}: {reason}")]
    Reprojection { from: Crs, to: Crs, reason: String },

    /// A coordinate reference system identifier could not be resolved.
    #[error("Unknown coordinate reference system: {code}")]
    UnknownCrs { code: String },

    /// The operation is not legal in the dataset's current state.
    #[error("Cannot {operation} {path}: dataset is {state}")]
    InvalidState {
        path: PathBuf,
        state: DatasetState,
        operation: &'static str,
    },

    /// Heatmap resolution must be a positive, finite number.
    #[error("Invalid heatmap resolution: {resolution} (must be > 0)")]
    InvalidResolution { resolution: f64 },

    /// A point lies too far from the origin for its cell index to fit in an `i64`.
    #[error("Point ({x}, {y}) has no cell index at resolution {resolution}")]
    CellOutOfRange { x: f64, y: f64, resolution: f64 },

    /// An envelope has a non-finite bound or min > max.
    #[error("Invalid envelope: {reason}")]
    InvalidEnvelope { reason: String },

    /// Band index outside the coverage's band count.
    #[error("Band {band} out of range (coverage has {bands} bands)")]
    InvalidBand { band: usize, bands: usize },

    /// A date range whose start lies after its end.
    #[error("Invalid date range: {start} is after {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    /// No catalog file carries a date inside the requested range.
    #[error("No dated rasters between {start} and {end}")]
    NoRastersInRange { start: NaiveDate, end: NaiveDate },

    /// Coverages cannot be combined cell by cell.
    #[error("Cannot combine coverages: {reason}")]
    IncompatibleCoverages { reason: String },

    /// Writing a GeoTIFF failed.
    #[error("Failed to write GeoTIFF {path}: {message}")]
    Write { path: PathBuf, message: String },
}

/// Result type alias using [`HotmapError`].
pub type Result<T> = std::result::Result<T, HotmapError>;
