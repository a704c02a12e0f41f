//! Raster source directory with a summary cache.
//!
//! A [`RasterCatalog`] is the validated list of raster files found in a
//! configured directory. Building one is the startup check of a hosting
//! application: a missing directory or one without a single matching file is
//! an error the application can act on (exit, retry, prompt).
//!
//! ```ignore
//! use hotmap::RasterCatalogBuilder;
//!
//! let catalog = RasterCatalogBuilder::new("/data/rasters")
//!     .extensions(["tif", "tiff"])
//!     .cache_size(64)
//!     .build()?;
//!
//! for entry in catalog.entries() {
//!     let summary = catalog.summary(&entry.name)?;
//!     println!("{} {} {}", entry.name, summary.crs, summary.envelope);
//! }
//! ```
//!
//! File names that embed a date (`ui_2023-06.tif`, `..._20241016T100029_B08.tif`)
//! make the catalog a time series: [`RasterCatalog::entries_between`] selects
//! a period and [`RasterCatalog::composite`] reduces it to one coverage.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use moka::sync::Cache;

use crate::composite::composite;
use crate::coverage::GridCoverage;
use crate::crs::{Crs, Envelope};
use crate::dataset::{RasterDataset, ResourceInfo};
use crate::dates::{date_from_name, DateRange};
use crate::error::{HotmapError, Result};
use crate::heatmap::Reducer;

/// Default file extensions of raster files.
pub const DEFAULT_EXTENSIONS: [&str; 2] = ["tif", "tiff"];

/// Default number of raster summaries kept in memory.
pub const DEFAULT_CACHE_SIZE: u64 = 64;

/// Statistics about cache usage.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of summaries currently in the cache.
    pub entry_count: u64,
    /// Number of cache hits (requests served from cache).
    pub hit_count: u64,
    /// Number of cache misses (summaries read from disk).
    pub miss_count: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0).
    ///
    /// Returns 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}

/// A raster file found in the catalog directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// File name, which is also the raster's name in the catalog.
    pub name: String,
    pub path: PathBuf,
    /// File size in bytes.
    pub size: u64,
    /// Acquisition date found in the file name.
    pub date: Option<NaiveDate>,
}

/// A period of rasters reduced cell by cell.
#[derive(Debug, Clone)]
pub struct DatedComposite {
    pub range: DateRange,
    pub reducer: Reducer,
    /// Rasters that went into the composite, oldest first.
    pub sources: Vec<CatalogEntry>,
    pub coverage: GridCoverage,
}

/// Metadata of a raster, read once and cached.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterSummary {
    pub name: String,
    pub crs: Crs,
    /// Envelope of the primary grid in its native CRS.
    pub envelope: Envelope,
    pub width: u32,
    pub height: u32,
    pub bands: usize,
    pub nodata: Option<f64>,
    pub resources: Vec<ResourceInfo>,
}

/// The validated set of rasters in a directory.
pub struct RasterCatalog {
    data_dir: PathBuf,
    extensions: Vec<String>,
    entries: Vec<CatalogEntry>,
    /// LRU cache of raster summaries, keyed by raster name.
    summaries: Cache<String, Arc<RasterSummary>>,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl RasterCatalog {
    /// Scan `data_dir` for `.tif`/`.tiff` files with the default cache size.
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        RasterCatalogBuilder::new(data_dir).build()
    }

    pub fn builder<P: AsRef<Path>>(data_dir: P) -> RasterCatalogBuilder {
        RasterCatalogBuilder::new(data_dir)
    }

    /// Raster files sorted by name.
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Dated rasters inside `range`, oldest first. Files without a date in
    /// their name are never selected.
    pub fn entries_between(&self, range: &DateRange) -> Vec<&CatalogEntry> {
        let mut selected: Vec<&CatalogEntry> = self
            .entries
            .iter()
            .filter(|e| e.date.is_some_and(|date| range.contains(date)))
            .collect();
        selected.sort_by_key(|e| e.date);
        selected
    }

    /// Reduce one band of every raster dated inside `range`.
    ///
    /// Each raster's primary grid is read in full, or only the cells touched
    /// by `aoi` when one is given. All rasters must share one grid.
    ///
    /// # Errors
    ///
    /// - [`HotmapError::NoRastersInRange`] if no file is dated inside `range`
    /// - [`HotmapError::IncompatibleCoverages`] if the grids differ
    /// - any error of opening or reading one of the rasters
    pub fn composite(
        &self,
        range: &DateRange,
        aoi: Option<&Envelope>,
        band: usize,
        reducer: Reducer,
    ) -> Result<DatedComposite> {
        let sources = self.entries_between(range);
        if sources.is_empty() {
            return Err(HotmapError::NoRastersInRange {
                start: range.start(),
                end: range.end(),
            });
        }

        let mut coverages = Vec::with_capacity(sources.len());
        for entry in &sources {
            let mut dataset = RasterDataset::open(&entry.path)?;
            let grid = dataset.primary()?;
            let coverage = match aoi {
                Some(aoi) => grid.read_window(aoi)?,
                None => grid.read_full()?,
            };
            dataset.close();
            coverages.push(coverage);
        }

        tracing::info!(
            "Compositing {} rasters between {} and {} with {}",
            sources.len(),
            range.start(),
            range.end(),
            reducer
        );

        Ok(DatedComposite {
            range: *range,
            reducer,
            coverage: composite(&coverages, band, reducer)?,
            sources: sources.into_iter().cloned().collect(),
        })
    }

    /// Open a raster by name. Every call returns an independent handle.
    pub fn open(&self, name: &str) -> Result<RasterDataset> {
        let entry = self.get(name).ok_or_else(|| HotmapError::NotFound {
            path: self.data_dir.join(name),
        })?;
        RasterDataset::open(&entry.path)
    }

    /// Summary of a raster, from cache or disk.
    pub fn summary(&self, name: &str) -> Result<Arc<RasterSummary>> {
        if let Some(summary) = self.summaries.get(name) {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            return Ok(summary);
        }
        self.miss_count.fetch_add(1, Ordering::Relaxed);

        let mut dataset = self.open(name)?;
        let summary = Arc::new(summarize(name, &dataset)?);
        dataset.close();

        self.summaries.insert(name.to_string(), summary.clone());
        Ok(summary)
    }

    /// Get cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.summaries.entry_count(),
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
        }
    }

    /// Get the maximum cache size.
    pub fn cache_capacity(&self) -> u64 {
        self.summaries.policy().max_capacity().unwrap_or(0)
    }

    /// Clear all summaries from the cache.
    pub fn clear_cache(&self) {
        self.summaries.invalidate_all();
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Re-read the directory and drop cached summaries.
    ///
    /// On error the previous entries are kept.
    pub fn rescan(&mut self) -> Result<usize> {
        self.entries = scan(&self.data_dir, &self.extensions)?;
        self.summaries.invalidate_all();
        Ok(self.entries.len())
    }
}

fn summarize(name: &str, dataset: &RasterDataset) -> Result<RasterSummary> {
    let primary = dataset.primary()?;
    let descriptor = primary.descriptor();
    Ok(RasterSummary {
        name: name.to_string(),
        crs: dataset.crs()?,
        envelope: primary.envelope(),
        width: descriptor.width(),
        height: descriptor.height(),
        bands: descriptor.bands,
        nodata: descriptor.nodata,
        resources: dataset.resources()?.cloned().collect(),
    })
}

/// List files in `dir` whose extension matches, case-insensitively.
fn scan(dir: &Path, extensions: &[String]) -> Result<Vec<CatalogEntry>> {
    let read_dir = fs::read_dir(dir).map_err(|e| match e.kind() {
        ErrorKind::NotFound => HotmapError::NotFound {
            path: dir.to_path_buf(),
        },
        _ => HotmapError::Io {
            path: dir.to_path_buf(),
            message: e.to_string(),
        },
    })?;

    let mut entries = Vec::new();
    for entry in read_dir {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                continue;
            }
        };

        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)));
        if !matches {
            continue;
        }

        let metadata = match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };

        let name = entry.file_name().to_string_lossy().into_owned();
        entries.push(CatalogEntry {
            date: date_from_name(&name),
            name,
            path,
            size: metadata.len(),
        });
    }

    if entries.is_empty() {
        return Err(HotmapError::EmptyDataset {
            path: dir.to_path_buf(),
        });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    tracing::debug!("Found {} rasters in {}", entries.len(), dir.display());
    Ok(entries)
}

/// Builder for creating a [`RasterCatalog`] with custom configuration.
#[derive(Debug, Clone)]
pub struct RasterCatalogBuilder {
    data_dir: PathBuf,
    extensions: Vec<String>,
    cache_size: u64,
}

impl RasterCatalogBuilder {
    /// Create a new builder with the specified data directory.
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            cache_size: DEFAULT_CACHE_SIZE,
        }
    }

    /// Create a builder configured from environment variables.
    ///
    /// # Environment Variables
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `HOTMAP_DATA_DIR` | Directory containing raster files | Required |
    /// | `HOTMAP_EXTENSIONS` | Comma-separated file extensions | `tif,tiff` |
    /// | `HOTMAP_CACHE_SIZE` | Maximum summaries in cache | 64 |
    ///
    /// # Errors
    ///
    /// Returns an error if `HOTMAP_DATA_DIR` is not set.
    pub fn from_env() -> Result<Self> {
        let data_dir = std::env::var("HOTMAP_DATA_DIR").map_err(|_| HotmapError::Io {
            path: PathBuf::from("$HOTMAP_DATA_DIR"),
            message: "HOTMAP_DATA_DIR environment variable not set".to_string(),
        })?;

        let mut builder = Self::new(data_dir);

        if let Ok(list) = std::env::var("HOTMAP_EXTENSIONS") {
            builder = builder.extensions(list.split(','));
        }

        if let Some(size) = std::env::var("HOTMAP_CACHE_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            builder = builder.cache_size(size);
        }

        Ok(builder)
    }

    /// Set the data directory.
    pub fn data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.data_dir = path.as_ref().to_path_buf();
        self
    }

    /// File extensions to accept, with or without a leading dot.
    ///
    /// Empty items are ignored; an empty list keeps the defaults.
    pub fn extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let list: Vec<String> = extensions
            .into_iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_string())
            .filter(|e| !e.is_empty())
            .collect();
        if !list.is_empty() {
            self.extensions = list;
        }
        self
    }

    /// Set the maximum number of summaries to keep in cache.
    pub fn cache_size(mut self, size: u64) -> Self {
        self.cache_size = size;
        self
    }

    /// Scan the directory and build the catalog.
    ///
    /// # Errors
    ///
    /// - [`HotmapError::NotFound`] if the directory does not exist
    /// - [`HotmapError::EmptyDataset`] if it holds no matching file
    pub fn build(self) -> Result<RasterCatalog> {
        let entries = scan(&self.data_dir, &self.extensions)?;
        Ok(RasterCatalog {
            data_dir: self.data_dir,
            extensions: self.extensions,
            entries,
            summaries: Cache::builder().max_capacity(self.cache_size).build(),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        File::create(dir.join(name)).unwrap();
    }

    #[test]
    fn test_missing_directory() {
        let result = RasterCatalog::new("/nonexistent/rasters");
        assert!(matches!(result, Err(HotmapError::NotFound { .. })));
    }

    #[test]
    fn test_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "readme.txt");
        let result = RasterCatalog::new(temp_dir.path());
        assert!(matches!(result, Err(HotmapError::EmptyDataset { .. })));
    }

    #[test]
    fn test_extension_match_is_case_insensitive_and_sorted() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "b.TIF");
        touch(temp_dir.path(), "a.tiff");
        touch(temp_dir.path(), "c.png");
        fs::create_dir(temp_dir.path().join("d.tif")).unwrap();

        let catalog = RasterCatalog::new(temp_dir.path()).unwrap();
        let names: Vec<&str> = catalog.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.tiff", "b.TIF"]);
        assert!(catalog.get("c.png").is_none());
    }

    #[test]
    fn test_custom_extensions() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "dem.gtiff");
        touch(temp_dir.path(), "dem.tif");

        let catalog = RasterCatalog::builder(temp_dir.path())
            .extensions([".GTiff"])
            .build()
            .unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.extensions(), ["GTiff".to_string()]);
    }

    #[test]
    fn test_entries_between_orders_by_date() {
        let temp_dir = TempDir::new().unwrap();
        for name in [
            "ui_2023-07.tif",
            "a_20230615T101031.tif",
            "ui_2023-06.tif",
            "ui_2023-09.tif",
            "dem.tif",
        ] {
            touch(temp_dir.path(), name);
        }
        let catalog = RasterCatalog::new(temp_dir.path()).unwrap();
        assert_eq!(catalog.get("dem.tif").unwrap().date, None);

        let summer = DateRange::new(
            NaiveDate::from_ymd_opt(2023, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 8, 31).unwrap(),
        )
        .unwrap();
        let names: Vec<&str> = catalog
            .entries_between(&summer)
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, ["ui_2023-06.tif", "a_20230615T101031.tif", "ui_2023-07.tif"]);

        let winter = DateRange::month(2023, 12).unwrap();
        assert!(catalog.entries_between(&winter).is_empty());
        assert!(matches!(
            catalog.composite(&winter, None, 0, Reducer::Mean),
            Err(HotmapError::NoRastersInRange { .. })
        ));
    }

    #[test]
    fn test_open_unknown_name() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "a.tif");
        let catalog = RasterCatalog::new(temp_dir.path()).unwrap();
        assert!(matches!(
            catalog.open("missing.tif"),
            Err(HotmapError::NotFound { .. })
        ));
    }

    #[test]
    fn test_summary_of_non_raster_is_not_cached() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("notes.tif"), "not a raster").unwrap();
        let catalog = RasterCatalog::new(temp_dir.path()).unwrap();

        assert!(catalog.summary("notes.tif").is_err());
        assert!(catalog.summary("notes.tif").is_err());
        let stats = catalog.cache_stats();
        assert_eq!(stats.miss_count, 2);
        assert_eq!(stats.hit_count, 0);
    }

    #[test]
    fn test_rescan_picks_up_new_files() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "a.tif");
        let mut catalog = RasterCatalog::new(temp_dir.path()).unwrap();
        touch(temp_dir.path(), "b.tif");
        assert_eq!(catalog.rescan().unwrap(), 2);
    }

    #[test]
    fn test_cache_stats_and_capacity() {
        let stats = CacheStats {
            entry_count: 5,
            hit_count: 80,
            miss_count: 20,
        };
        assert_eq!(stats.hit_rate(), 0.8);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);

        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "a.tif");
        let catalog = RasterCatalog::builder(temp_dir.path())
            .cache_size(7)
            .build()
            .unwrap();
        assert_eq!(catalog.cache_capacity(), 7);
    }

    #[test]
    fn test_from_env() {
        let temp_dir = TempDir::new().unwrap();

        let orig_dir = std::env::var("HOTMAP_DATA_DIR").ok();
        let orig_exts = std::env::var("HOTMAP_EXTENSIONS").ok();
        let orig_size = std::env::var("HOTMAP_CACHE_SIZE").ok();

        std::env::remove_var("HOTMAP_DATA_DIR");
        assert!(RasterCatalogBuilder::from_env().is_err());

        std::env::set_var("HOTMAP_DATA_DIR", temp_dir.path());
        std::env::remove_var("HOTMAP_EXTENSIONS");
        std::env::remove_var("HOTMAP_CACHE_SIZE");
        let builder = RasterCatalogBuilder::from_env().unwrap();
        assert_eq!(builder.data_dir, temp_dir.path());
        assert_eq!(builder.cache_size, DEFAULT_CACHE_SIZE);
        assert_eq!(builder.extensions, vec!["tif", "tiff"]);

        std::env::set_var("HOTMAP_EXTENSIONS", "asc, TIF");
        std::env::set_var("HOTMAP_CACHE_SIZE", "12");
        let builder = RasterCatalogBuilder::from_env().unwrap();
        assert_eq!(builder.extensions, vec!["asc", "TIF"]);
        assert_eq!(builder.cache_size, 12);

        for (key, value) in [
            ("HOTMAP_DATA_DIR", orig_dir),
            ("HOTMAP_EXTENSIONS", orig_exts),
            ("HOTMAP_CACHE_SIZE", orig_size),
        ] {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}
