//! Raster datasets: opening GeoTIFF files, discovering their sub-resources and
//! reading full or windowed grid coverages.
//!
//! A [`RasterDataset`] moves through three states:
//!
//! ```text
//! Unopened --try_open--> Opened --close--> Closed
//! ```
//!
//! Reads are legal only in `Opened`. The file is memory-mapped read-only and
//! every read builds its own decoder over the mapped bytes, so reads never
//! disturb one another and a failed read leaves the dataset usable.
//!
//! # Example
//!
//! ```ignore
//! use hotmap::{AxisRange, Crs, Envelope, RasterDataset};
//!
//! let dataset = RasterDataset::open("dgm1_33493_5664.tif")?;
//! for resource in dataset.resources()? {
//!     println!("{} ({})", resource.name, resource.kind);
//! }
//!
//! let grid = dataset.primary()?;
//! let aoi = Envelope::new(
//!     Crs::WGS84,
//!     AxisRange::new(14.93, 14.98),
//!     AxisRange::new(51.13, 51.16),
//! )?;
//! let coverage = grid.read_window(&aoi)?;
//! println!("{} x {} cells", coverage.width(), coverage.height());
//! ```

use std::fmt;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use memmap2::Mmap;

use crate::coverage::{GridCoverage, GridExtent, GridGeometry};
use crate::crs::{reproject, Crs, Envelope};
use crate::error::{HotmapError, Result};
use crate::geotiff::{self, GridDescriptor, ResourceKind};

/// Lifecycle state of a [`RasterDataset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetState {
    Unopened,
    Opened,
    Closed,
}

impl fmt::Display for DatasetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DatasetState::Unopened => "unopened",
            DatasetState::Opened => "opened",
            DatasetState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A sub-resource of a dataset, as listed by [`RasterDataset::resources`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceInfo {
    /// Position in the file (the image directory index).
    pub index: usize,
    /// Stable name such as `image-0` or `overview-1`.
    pub name: String,
    pub kind: ResourceKind,
    pub width: u32,
    pub height: u32,
}

/// Reference to a sub-resource by position or by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceRef {
    Index(usize),
    Name(String),
}

impl From<usize> for ResourceRef {
    fn from(index: usize) -> Self {
        ResourceRef::Index(index)
    }
}

impl From<&str> for ResourceRef {
    fn from(name: &str) -> Self {
        ResourceRef::Name(name.to_string())
    }
}

impl From<String> for ResourceRef {
    fn from(name: String) -> Self {
        ResourceRef::Name(name)
    }
}

impl FromStr for ResourceRef {
    type Err = std::convert::Infallible;

    /// All-digit strings are indices, anything else is a name.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        Ok(match s.parse::<usize>() {
            Ok(index) => ResourceRef::Index(index),
            Err(_) => ResourceRef::Name(s.to_string()),
        })
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceRef::Index(index) => write!(f, "#{index}"),
            ResourceRef::Name(name) => f.write_str(name),
        }
    }
}

/// Lazy, restartable iterator over a dataset's sub-resources.
///
/// Cloning the iterator restarts the listing from its current position
/// without touching the file again.
#[derive(Debug, Clone)]
pub struct Resources<'a> {
    inner: std::slice::Iter<'a, ResourceInfo>,
}

impl<'a> Iterator for Resources<'a> {
    type Item = &'a ResourceInfo;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Resources<'_> {}

/// Resources of an opened file.
#[derive(Debug)]
struct OpenHandle {
    /// Memory-mapped file data
    map: Mmap,
    crs: Crs,
    resources: Vec<ResourceInfo>,
}

/// A geo-referenced raster file.
///
/// The memory map is released by [`close`](Self::close) or when the dataset
/// is dropped, whichever comes first.
#[derive(Debug)]
pub struct RasterDataset {
    path: PathBuf,
    state: DatasetState,
    handle: Option<OpenHandle>,
}

impl RasterDataset {
    /// Create an unopened dataset for `path`. Nothing is touched on disk.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            state: DatasetState::Unopened,
            handle: None,
        }
    }

    /// Open a raster file.
    ///
    /// # Errors
    ///
    /// - [`HotmapError::NotFound`] if the path does not exist
    /// - [`HotmapError::UnsupportedFormat`] if the file is not a GeoTIFF
    /// - [`HotmapError::CorruptData`] if the GeoTIFF metadata cannot be parsed
    /// - [`HotmapError::EmptyDataset`] if the file holds no readable grid
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut dataset = Self::new(path);
        dataset.try_open()?;
        Ok(dataset)
    }

    /// Open an unopened dataset. A failed attempt leaves it unopened.
    pub fn try_open(&mut self) -> Result<()> {
        if self.state != DatasetState::Unopened {
            return Err(self.invalid_state("open"));
        }

        let handle = self.map_and_classify()?;
        tracing::debug!(
            "Opened {} ({}, {} resources)",
            self.path.display(),
            handle.crs,
            handle.resources.len()
        );

        self.handle = Some(handle);
        self.state = DatasetState::Opened;
        Ok(())
    }

    fn map_and_classify(&self) -> Result<OpenHandle> {
        let path = self.path.as_path();
        let file = File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => HotmapError::NotFound {
                path: path.to_path_buf(),
            },
            _ => HotmapError::Io {
                path: path.to_path_buf(),
                message: e.to_string(),
            },
        })?;

        let metadata = file.metadata().map_err(|e| HotmapError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        if !metadata.is_file() {
            return Err(HotmapError::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: "not a regular file".to_string(),
            });
        }

        // SAFETY: Memory mapping is safe as long as the file is not modified
        // while mapped. We open the file read-only and don't expose the mapping.
        let map = unsafe { Mmap::map(&file) }.map_err(|e| HotmapError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let directories = {
            let mut decoder = geotiff::open_decoder(&map, path)?;
            geotiff::read_directories(&mut decoder, path)?
        };

        let resources = name_resources(directories);
        let crs = resources
            .iter()
            .find_map(|r| match &r.kind {
                ResourceKind::Grid(grid) => Some(grid.crs()),
                _ => None,
            })
            .ok_or_else(|| HotmapError::EmptyDataset {
                path: path.to_path_buf(),
            })?;

        Ok(OpenHandle {
            map,
            crs,
            resources,
        })
    }

    /// Release the file. Idempotent; a no-op unless the dataset is opened.
    pub fn close(&mut self) {
        if self.state == DatasetState::Opened {
            self.handle = None;
            self.state = DatasetState::Closed;
            tracing::debug!("Closed {}", self.path.display());
        }
    }

    pub fn state(&self) -> DatasetState {
        self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Native CRS of the dataset (that of its first grid image).
    pub fn crs(&self) -> Result<Crs> {
        self.handle("inspect").map(|h| h.crs)
    }

    /// List the dataset's sub-resources in file order.
    pub fn resources(&self) -> Result<Resources<'_>> {
        let handle = self.handle("list resources of")?;
        if handle.resources.is_empty() {
            return Err(HotmapError::EmptyDataset {
                path: self.path.clone(),
            });
        }
        Ok(Resources {
            inner: handle.resources.iter(),
        })
    }

    /// Select a grid resource by index or name.
    ///
    /// # Errors
    ///
    /// - [`HotmapError::ResourceNotFound`] if nothing matches `reference`
    /// - [`HotmapError::NotAGridResource`] if it is a mask or unsupported image
    pub fn select(&self, reference: impl Into<ResourceRef>) -> Result<GridResource<'_>> {
        let reference = reference.into();
        let handle = self.handle("select a resource of")?;

        let info = match &reference {
            ResourceRef::Index(index) => handle.resources.get(*index),
            ResourceRef::Name(name) => handle.resources.iter().find(|r| &r.name == name),
        }
        .ok_or_else(|| HotmapError::ResourceNotFound {
            path: self.path.clone(),
            resource: reference.to_string(),
        })?;

        match &info.kind {
            ResourceKind::Grid(descriptor) => Ok(GridResource {
                dataset: self,
                info,
                descriptor,
            }),
            other => Err(HotmapError::NotAGridResource {
                path: self.path.clone(),
                resource: info.name.clone(),
                kind: other.to_string(),
            }),
        }
    }

    /// The first full-resolution grid image.
    pub fn primary(&self) -> Result<GridResource<'_>> {
        let handle = self.handle("select a resource of")?;
        let index = handle
            .resources
            .iter()
            .position(|r| matches!(&r.kind, ResourceKind::Grid(g) if !g.overview))
            .or_else(|| handle.resources.iter().position(|r| r.kind.is_grid()))
            .ok_or_else(|| HotmapError::EmptyDataset {
                path: self.path.clone(),
            })?;
        self.select(index)
    }

    fn handle(&self, operation: &'static str) -> Result<&OpenHandle> {
        match (&self.state, &self.handle) {
            (DatasetState::Opened, Some(handle)) => Ok(handle),
            _ => Err(self.invalid_state(operation)),
        }
    }

    fn invalid_state(&self, operation: &'static str) -> HotmapError {
        HotmapError::InvalidState {
            path: self.path.clone(),
            state: self.state,
            operation,
        }
    }
}

fn name_resources(directories: Vec<geotiff::ImageDirectory>) -> Vec<ResourceInfo> {
    let (mut images, mut overviews, mut masks, mut unsupported) = (0, 0, 0, 0);

    directories
        .into_iter()
        .map(|dir| {
            let counter = match &dir.kind {
                ResourceKind::Grid(g) if g.overview => &mut overviews,
                ResourceKind::Grid(_) => &mut images,
                ResourceKind::Mask => &mut masks,
                ResourceKind::Unsupported { .. } => &mut unsupported,
            };
            let prefix = match dir.kind.label() {
                "grid" => "image",
                label => label,
            };
            let name = format!("{prefix}-{counter}");
            *counter += 1;

            ResourceInfo {
                index: dir.ifd,
                name,
                kind: dir.kind,
                width: dir.width,
                height: dir.height,
            }
        })
        .collect()
}

/// A readable grid image of an opened dataset.
#[derive(Debug, Clone, Copy)]
pub struct GridResource<'a> {
    dataset: &'a RasterDataset,
    info: &'a ResourceInfo,
    descriptor: &'a GridDescriptor,
}

impl<'a> GridResource<'a> {
    pub fn info(&self) -> &'a ResourceInfo {
        self.info
    }

    pub fn name(&self) -> &'a str {
        &self.info.name
    }

    pub fn descriptor(&self) -> &'a GridDescriptor {
        self.descriptor
    }

    /// Geometry of the full grid.
    pub fn geometry(&self) -> GridGeometry {
        self.descriptor.geometry
    }

    pub fn crs(&self) -> Crs {
        self.descriptor.crs()
    }

    /// Envelope of the full grid in its native CRS.
    pub fn envelope(&self) -> Envelope {
        self.descriptor.geometry.envelope()
    }

    /// Read every cell.
    pub fn read_full(&self) -> Result<GridCoverage> {
        self.read_extent(self.descriptor.geometry.extent)
    }

    /// Grid geometry covering the part of the raster inside `aoi`.
    ///
    /// The area of interest is reprojected into the raster's CRS, intersected
    /// with the raster envelope and widened to whole cells.
    ///
    /// # Errors
    ///
    /// - [`HotmapError::Reprojection`] if `aoi` cannot be transformed
    /// - [`HotmapError::OutOfBounds`] if it shares no area with the raster
    pub fn window_geometry(&self, aoi: &Envelope) -> Result<GridGeometry> {
        let native = reproject(aoi, self.crs())?;
        let extent = self.envelope();
        let out_of_bounds = || HotmapError::OutOfBounds {
            path: self.dataset.path.clone(),
            requested: *aoi,
            extent,
        };

        let clipped = native.intersection(&extent).ok_or_else(out_of_bounds)?;
        let cells = self
            .descriptor
            .geometry
            .cells_within(&clipped)
            .ok_or_else(out_of_bounds)?;

        tracing::debug!(
            "{} {}: window {:?} for {}",
            self.dataset.path.display(),
            self.info.name,
            cells,
            aoi
        );

        Ok(self.descriptor.geometry.with_extent(cells))
    }

    /// Read only the cells inside `aoi`.
    ///
    /// The result uses the raster's native CRS and full-grid cell indices, so
    /// it equals [`read_full`](Self::read_full) restricted to the same cells.
    pub fn read_window(&self, aoi: &Envelope) -> Result<GridCoverage> {
        let geometry = self.window_geometry(aoi)?;
        self.read_extent(geometry.extent)
    }

    fn read_extent(&self, extent: GridExtent) -> Result<GridCoverage> {
        let path = self.dataset.path.as_path();
        let handle = self.dataset.handle("read")?;

        let mut decoder = geotiff::open_decoder(&handle.map, path)?;
        geotiff::seek_image(&mut decoder, self.info.index, path)?;
        let values = geotiff::read_cells(&mut decoder, self.descriptor, extent, path)?;

        Ok(GridCoverage::new(
            self.descriptor.geometry.with_extent(extent),
            self.descriptor.bands,
            self.descriptor.nodata,
            values,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(DatasetState::Unopened.to_string(), "unopened");
        assert_eq!(DatasetState::Closed.to_string(), "closed");
    }

    #[test]
    fn test_resource_ref_parsing() {
        assert_eq!("2".parse::<ResourceRef>().unwrap(), ResourceRef::Index(2));
        assert_eq!(
            "overview-0".parse::<ResourceRef>().unwrap(),
            ResourceRef::Name("overview-0".to_string())
        );
        assert_eq!(ResourceRef::from(3), ResourceRef::Index(3));
        assert_eq!(ResourceRef::from("mask-0").to_string(), "mask-0");
    }

    #[test]
    fn test_new_dataset_is_unopened() {
        let dataset = RasterDataset::new("/nonexistent/raster.tif");
        assert_eq!(dataset.state(), DatasetState::Unopened);
        assert!(matches!(
            dataset.resources(),
            Err(HotmapError::InvalidState {
                state: DatasetState::Unopened,
                ..
            })
        ));
    }

    #[test]
    fn test_open_missing_file() {
        let result = RasterDataset::open("/nonexistent/raster.tif");
        assert!(matches!(result, Err(HotmapError::NotFound { .. })));
    }

    #[test]
    fn test_failed_open_stays_unopened_and_close_is_noop() {
        let mut dataset = RasterDataset::new("/nonexistent/raster.tif");
        assert!(dataset.try_open().is_err());
        assert_eq!(dataset.state(), DatasetState::Unopened);
        dataset.close();
        dataset.close();
        assert_eq!(dataset.state(), DatasetState::Unopened);
    }

    #[test]
    fn test_resource_names() {
        let dirs = vec![
            geotiff::ImageDirectory {
                ifd: 0,
                width: 4,
                height: 4,
                kind: ResourceKind::Mask,
            },
            geotiff::ImageDirectory {
                ifd: 1,
                width: 4,
                height: 4,
                kind: ResourceKind::Unsupported {
                    reason: "palette colour image".to_string(),
                },
            },
            geotiff::ImageDirectory {
                ifd: 2,
                width: 4,
                height: 4,
                kind: ResourceKind::Mask,
            },
        ];
        let names: Vec<String> = name_resources(dirs).into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["mask-0", "unsupported-0", "mask-1"]);
    }
}
