//! GeoTIFF container parsing: image directories, geo-referencing and chunked
//! cell reads.
//!
//! Every image file directory (IFD) of a TIFF is classified once, when the
//! dataset is opened, into a [`ResourceKind`]. Reads later go straight to the
//! strips or tiles that overlap the requested window.

use std::fmt;
use std::io::{Cursor, ErrorKind, Read, Seek};
use std::path::Path;

use tiff::decoder::ifd::Value;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tiff::{TiffError, TiffFormatError};

use crate::coverage::{GeoTransform, GridExtent, GridGeometry};
use crate::crs::Crs;
use crate::error::{HotmapError, Result};

/// NewSubfileType.
pub const TAG_NEW_SUBFILE_TYPE: u16 = 254;
/// ModelPixelScaleTag.
pub const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
/// ModelTiepointTag.
pub const TAG_MODEL_TIEPOINT: u16 = 33922;
/// ModelTransformationTag.
pub const TAG_MODEL_TRANSFORMATION: u16 = 34264;
/// GeoKeyDirectoryTag.
pub const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
/// GDAL_NODATA (ASCII).
pub const TAG_GDAL_NODATA: u16 = 42113;

pub const KEY_MODEL_TYPE: u16 = 1024;
pub const KEY_RASTER_TYPE: u16 = 1025;
pub const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
pub const KEY_PROJECTED_TYPE: u16 = 3072;

pub const MODEL_TYPE_PROJECTED: u16 = 1;
pub const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
pub const RASTER_PIXEL_IS_AREA: u16 = 1;
pub const RASTER_PIXEL_IS_POINT: u16 = 2;

/// GeoKey value for "user-defined", which carries no EPSG code.
const USER_DEFINED: u16 = 32767;

const SUBFILE_REDUCED_RESOLUTION: u32 = 1;
const SUBFILE_MASK: u32 = 4;

const PHOTOMETRIC_PALETTE: u16 = 3;
const PHOTOMETRIC_MASK: u16 = 4;
const PHOTOMETRIC_CMYK: u16 = 5;
const PHOTOMETRIC_YCBCR: u16 = 6;

const PLANAR_SEPARATE: u16 = 2;

const SAMPLE_FORMAT_UINT: u16 = 1;
const SAMPLE_FORMAT_INT: u16 = 2;
const SAMPLE_FORMAT_FLOAT: u16 = 3;

/// The handful of GeoKeys needed to locate a raster on the earth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GeoKeys {
    pub model_type: Option<u16>,
    pub raster_type: Option<u16>,
    pub geographic_type: Option<u16>,
    pub projected_type: Option<u16>,
}

impl GeoKeys {
    /// Parse a GeoKeyDirectory.
    ///
    /// The directory is a header `[version, revision, minor, count]` followed
    /// by `count` entries of `[key, location, count, value]`. Only keys whose
    /// value is stored inline (location 0) are read.
    pub fn parse(directory: &[u16]) -> std::result::Result<Self, String> {
        let header = directory
            .get(..4)
            .ok_or_else(|| format!("key directory has {} values, need 4", directory.len()))?;
        let count = header[3] as usize;
        let entries = directory.get(4..4 + count * 4).ok_or_else(|| {
            format!(
                "key directory declares {count} keys but holds {} values",
                directory.len()
            )
        })?;

        let mut keys = GeoKeys::default();
        for entry in entries.chunks_exact(4) {
            let (id, location, value) = (entry[0], entry[1], entry[3]);
            if location != 0 {
                continue;
            }
            match id {
                KEY_MODEL_TYPE => keys.model_type = Some(value),
                KEY_RASTER_TYPE => keys.raster_type = Some(value),
                KEY_GEOGRAPHIC_TYPE => keys.geographic_type = Some(value),
                KEY_PROJECTED_TYPE => keys.projected_type = Some(value),
                _ => {}
            }
        }
        Ok(keys)
    }

    /// The EPSG code these keys declare, if any.
    pub fn crs(&self) -> Option<Crs> {
        let code = match self.model_type {
            Some(MODEL_TYPE_GEOGRAPHIC) => self.geographic_type,
            Some(MODEL_TYPE_PROJECTED) => self.projected_type,
            _ => self.projected_type.or(self.geographic_type),
        }?;
        (code != USER_DEFINED && code != 0).then(|| Crs::from_epsg(code as u32))
    }

    pub fn pixel_is_point(&self) -> bool {
        self.raster_type == Some(RASTER_PIXEL_IS_POINT)
    }
}

/// Everything needed to read one grid image.
#[derive(Debug, Clone, PartialEq)]
pub struct GridDescriptor {
    /// Geometry of the full image.
    pub geometry: GridGeometry,
    /// Samples per pixel.
    pub bands: usize,
    pub bits_per_sample: u16,
    pub nodata: Option<f64>,
    /// Reduced-resolution copy of another image in the same file.
    pub overview: bool,
}

impl GridDescriptor {
    pub fn width(&self) -> u32 {
        self.geometry.extent.width
    }

    pub fn height(&self) -> u32 {
        self.geometry.extent.height
    }

    pub fn crs(&self) -> Crs {
        self.geometry.crs
    }
}

/// What an image directory holds.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceKind {
    /// A readable, geo-referenced grid coverage.
    Grid(GridDescriptor),
    /// A transparency mask belonging to another image.
    Mask,
    /// Anything this library cannot read as a grid.
    Unsupported { reason: String },
}

impl ResourceKind {
    pub fn is_grid(&self) -> bool {
        matches!(self, ResourceKind::Grid(_))
    }

    /// Short label: `grid`, `overview`, `mask` or `unsupported`.
    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Grid(d) if d.overview => "overview",
            ResourceKind::Grid(_) => "grid",
            ResourceKind::Mask => "mask",
            ResourceKind::Unsupported { .. } => "unsupported",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Grid(d) if d.overview => write!(f, "a reduced-resolution overview"),
            ResourceKind::Grid(_) => write!(f, "a grid coverage"),
            ResourceKind::Mask => write!(f, "a transparency mask"),
            ResourceKind::Unsupported { reason } => write!(f, "unsupported ({reason})"),
        }
    }
}

/// One classified image file directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDirectory {
    /// Position of the IFD in the file, starting at 0.
    pub ifd: usize,
    pub width: u32,
    pub height: u32,
    pub kind: ResourceKind,
}

/// Tags of one IFD, before classification.
struct RawImage {
    width: u32,
    height: u32,
    subfile_type: u32,
    photometric: Option<u16>,
    planar: u16,
    samples: u16,
    bits: u16,
    sample_format: u16,
    tiepoint: Option<Vec<f64>>,
    scale: Option<Vec<f64>>,
    transformation: Option<Vec<f64>>,
    geo_keys: Option<Vec<u16>>,
    nodata: Option<String>,
}

impl RawImage {
    fn read<R: Read + Seek>(decoder: &mut Decoder<R>) -> std::result::Result<Self, String> {
        let (width, height) = decoder
            .dimensions()
            .map_err(|e| format!("image dimensions: {e}"))?;

        Ok(Self {
            width,
            height,
            subfile_type: unsigned(decoder, TAG_NEW_SUBFILE_TYPE)?.unwrap_or(0),
            photometric: unsigned(decoder, Tag::PhotometricInterpretation.to_u16())?,
            planar: unsigned(decoder, Tag::PlanarConfiguration.to_u16())?.unwrap_or(1),
            samples: unsigned(decoder, Tag::SamplesPerPixel.to_u16())?.unwrap_or(1),
            bits: unsigned_vec::<_, u16>(decoder, Tag::BitsPerSample.to_u16())?
                .and_then(|bits| bits.first().copied())
                .unwrap_or(1),
            sample_format: unsigned_vec::<_, u16>(decoder, Tag::SampleFormat.to_u16())?
                .and_then(|formats| formats.first().copied())
                .unwrap_or(SAMPLE_FORMAT_UINT),
            tiepoint: find_tag(decoder, TAG_MODEL_TIEPOINT, into_doubles)?,
            scale: find_tag(decoder, TAG_MODEL_PIXEL_SCALE, into_doubles)?,
            transformation: find_tag(decoder, TAG_MODEL_TRANSFORMATION, into_doubles)?,
            geo_keys: unsigned_vec(decoder, TAG_GEO_KEY_DIRECTORY)?,
            nodata: find_tag(decoder, TAG_GDAL_NODATA, Value::into_string)?,
        })
    }

    fn is_mask(&self) -> bool {
        self.subfile_type & SUBFILE_MASK != 0 || self.photometric == Some(PHOTOMETRIC_MASK)
    }

    fn is_overview(&self) -> bool {
        self.subfile_type & SUBFILE_REDUCED_RESOLUTION != 0
    }

    /// Why this image cannot be read as a grid, if it cannot.
    fn layout_problem(&self) -> Option<String> {
        match self.photometric {
            Some(PHOTOMETRIC_PALETTE) => return Some("palette colour image".to_string()),
            Some(PHOTOMETRIC_CMYK) => return Some("CMYK colour image".to_string()),
            Some(PHOTOMETRIC_YCBCR) => return Some("YCbCr colour image".to_string()),
            _ => {}
        }
        if self.planar == PLANAR_SEPARATE {
            return Some("band-separate planar layout".to_string());
        }
        let supported_bits = match self.sample_format {
            SAMPLE_FORMAT_UINT | SAMPLE_FORMAT_INT => matches!(self.bits, 8 | 16 | 32 | 64),
            SAMPLE_FORMAT_FLOAT => matches!(self.bits, 32 | 64),
            other => return Some(format!("sample format {other}")),
        };
        if !supported_bits {
            return Some(format!("{}-bit samples", self.bits));
        }
        if self.samples == 0 {
            return Some("zero samples per pixel".to_string());
        }
        None
    }

    fn has_georeferencing(&self) -> bool {
        (self.tiepoint.is_some() && self.scale.is_some()) || self.transformation.is_some()
    }

    /// North-up transform from the model tags, `Ok(None)` if there are none.
    fn transform(&self) -> std::result::Result<Option<GeoTransform>, Georeferencing> {
        if let (Some(tiepoint), Some(scale)) = (&self.tiepoint, &self.scale) {
            if tiepoint.len() < 6 || scale.len() < 2 {
                return Err(Georeferencing::Malformed(format!(
                    "tiepoint has {} values and pixel scale {}",
                    tiepoint.len(),
                    scale.len()
                )));
            }
            let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
            let (sx, sy) = (scale[0], scale[1]);
            return checked_transform(GeoTransform {
                origin_x: x - i * sx,
                origin_y: y + j * sy,
                pixel_width: sx,
                pixel_height: -sy,
            })
            .map(Some);
        }

        if let Some(m) = &self.transformation {
            if m.len() < 16 {
                return Err(Georeferencing::Malformed(format!(
                    "model transformation has {} values, need 16",
                    m.len()
                )));
            }
            if m[1] != 0.0 || m[4] != 0.0 {
                return Err(Georeferencing::Rotated);
            }
            return checked_transform(GeoTransform {
                origin_x: m[3],
                origin_y: m[7],
                pixel_width: m[0],
                pixel_height: m[5],
            })
            .map(Some);
        }

        Ok(None)
    }
}

enum Georeferencing {
    Malformed(String),
    Rotated,
}

fn checked_transform(t: GeoTransform) -> std::result::Result<GeoTransform, Georeferencing> {
    let finite = [t.origin_x, t.origin_y, t.pixel_width, t.pixel_height]
        .iter()
        .all(|v| v.is_finite());
    if !finite || t.pixel_width == 0.0 || t.pixel_height == 0.0 {
        return Err(Georeferencing::Malformed(format!(
            "degenerate transform {t:?}"
        )));
    }
    Ok(t)
}

fn find_tag<R: Read + Seek, T>(
    decoder: &mut Decoder<R>,
    code: u16,
    convert: impl FnOnce(Value) -> tiff::TiffResult<T>,
) -> std::result::Result<Option<T>, String> {
    match decoder.find_tag(Tag::from_u16_exhaustive(code)) {
        Ok(Some(value)) => convert(value)
            .map(Some)
            .map_err(|e| format!("tag {code}: {e}")),
        Ok(None) => Ok(None),
        Err(e) => Err(format!("tag {code}: {e}")),
    }
}

/// Integer tag of any TIFF integer type. Single SHORTs decode as `Unsigned`.
fn unsigned<R: Read + Seek, T: TryFrom<u64>>(
    decoder: &mut Decoder<R>,
    code: u16,
) -> std::result::Result<Option<T>, String> {
    decoder
        .find_tag_unsigned(Tag::from_u16_exhaustive(code))
        .map_err(|e| format!("tag {code}: {e}"))
}

fn unsigned_vec<R: Read + Seek, T: TryFrom<u64>>(
    decoder: &mut Decoder<R>,
    code: u16,
) -> std::result::Result<Option<Vec<T>>, String> {
    decoder
        .find_tag_unsigned_vec(Tag::from_u16_exhaustive(code))
        .map_err(|e| format!("tag {code}: {e}"))
}

/// DOUBLE or FLOAT values, single or listed.
fn into_doubles(value: Value) -> tiff::TiffResult<Vec<f64>> {
    match value {
        Value::Double(v) => Ok(vec![v]),
        Value::Float(v) => Ok(vec![f64::from(v)]),
        Value::List(values) => {
            let mut out = Vec::with_capacity(values.len());
            for v in values {
                out.extend(into_doubles(v)?);
            }
            Ok(out)
        }
        other => other.into_f64_vec(),
    }
}

fn parse_nodata(raw: &str) -> Option<f64> {
    raw.trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .parse()
        .ok()
}

/// Build a decoder over a mapped file, classifying header failures.
pub(crate) fn open_decoder<'a>(
    bytes: &'a [u8],
    path: &Path,
) -> Result<Decoder<Cursor<&'a [u8]>>> {
    if bytes.is_empty() {
        return Err(HotmapError::UnsupportedFormat {
            path: path.to_path_buf(),
            reason: "file is empty".to_string(),
        });
    }

    let mut limits = Limits::default();
    limits.ifd_value_size = 64 * 1024 * 1024;
    limits.decoding_buffer_size = 1024 * 1024 * 1024;

    Decoder::new(Cursor::new(bytes))
        .map(|decoder| decoder.with_limits(limits))
        .map_err(|e| open_error(path, e))
}

fn open_error(path: &Path, e: TiffError) -> HotmapError {
    let path = path.to_path_buf();
    match e {
        TiffError::FormatError(
            TiffFormatError::TiffSignatureNotFound | TiffFormatError::TiffSignatureInvalid,
        ) => HotmapError::UnsupportedFormat {
            path,
            reason: "not a TIFF container".to_string(),
        },
        TiffError::IoError(io) if io.kind() == ErrorKind::UnexpectedEof => {
            HotmapError::UnsupportedFormat {
                path,
                reason: "truncated TIFF header".to_string(),
            }
        }
        TiffError::UnsupportedError(e) => HotmapError::UnsupportedFormat {
            path,
            reason: e.to_string(),
        },
        other => HotmapError::CorruptData {
            path,
            reason: other.to_string(),
        },
    }
}

/// Map an error raised while decoding cells.
pub(crate) fn read_error(path: &Path, e: TiffError) -> HotmapError {
    match e {
        TiffError::IoError(io) => HotmapError::Io {
            path: path.to_path_buf(),
            message: io.to_string(),
        },
        other => HotmapError::CorruptData {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    }
}

/// Read and classify every image directory of a GeoTIFF.
///
/// The decoder must be positioned on the first image. Fails with
/// `UnsupportedFormat` when the first image carries no geo metadata at all
/// (a plain TIFF) and `CorruptData` when geo metadata exists but is malformed.
pub(crate) fn read_directories<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    path: &Path,
) -> Result<Vec<ImageDirectory>> {
    let corrupt = |reason: String| HotmapError::CorruptData {
        path: path.to_path_buf(),
        reason,
    };

    let mut directories: Vec<ImageDirectory> = Vec::new();
    let mut primary_keys: Option<GeoKeys> = None;

    for ifd in 0.. {
        let raw = RawImage::read(decoder).map_err(|reason| corrupt(format!("IFD {ifd}: {reason}")))?;

        let keys = match &raw.geo_keys {
            Some(directory) => Some(
                GeoKeys::parse(directory)
                    .map_err(|reason| corrupt(format!("IFD {ifd}: {reason}")))?,
            ),
            None => primary_keys,
        };

        if ifd == 0 {
            if keys.is_none() && !raw.has_georeferencing() {
                return Err(HotmapError::UnsupportedFormat {
                    path: path.to_path_buf(),
                    reason: "TIFF carries no GeoTIFF metadata".to_string(),
                });
            }
            primary_keys = keys;
        }

        let primary = directories.iter().find_map(|d| match &d.kind {
            ResourceKind::Grid(g) if !g.overview => Some(g),
            _ => None,
        });
        let kind = classify(&raw, keys, primary).map_err(|reason| corrupt(format!("IFD {ifd}: {reason}")))?;

        tracing::debug!(
            "{}: IFD {} is {}x{} {}",
            path.display(),
            ifd,
            raw.width,
            raw.height,
            kind
        );

        directories.push(ImageDirectory {
            ifd,
            width: raw.width,
            height: raw.height,
            kind,
        });

        if !decoder.more_images() {
            break;
        }
        decoder
            .next_image()
            .map_err(|e| corrupt(format!("IFD {}: {e}", ifd + 1)))?;
    }

    Ok(directories)
}

fn classify(
    raw: &RawImage,
    keys: Option<GeoKeys>,
    primary: Option<&GridDescriptor>,
) -> std::result::Result<ResourceKind, String> {
    if raw.is_mask() {
        return Ok(ResourceKind::Mask);
    }
    if let Some(reason) = raw.layout_problem() {
        return Ok(ResourceKind::Unsupported { reason });
    }
    if raw.width == 0 || raw.height == 0 {
        return Ok(ResourceKind::Unsupported {
            reason: "zero-sized image".to_string(),
        });
    }

    let extent = GridExtent::full(raw.width, raw.height);
    let nodata = raw.nodata.as_deref().and_then(parse_nodata);

    let own_transform = match raw.transform() {
        Ok(transform) => transform,
        Err(Georeferencing::Rotated) => {
            return Ok(ResourceKind::Unsupported {
                reason: "rotated or sheared model transformation".to_string(),
            })
        }
        Err(Georeferencing::Malformed(reason)) => return Err(reason),
    };

    let geometry = match (own_transform, primary) {
        (Some(mut transform), _) => {
            let keys = keys.unwrap_or_default();
            let crs = keys
                .crs()
                .ok_or_else(|| "GeoKeyDirectory carries no EPSG code".to_string())?;
            if keys.pixel_is_point() {
                transform.origin_x -= 0.5 * transform.pixel_width;
                transform.origin_y -= 0.5 * transform.pixel_height;
            }
            GridGeometry {
                extent,
                transform,
                crs,
            }
        }
        (None, Some(primary)) if raw.is_overview() => {
            let factor_x = primary.width() as f64 / raw.width as f64;
            let factor_y = primary.height() as f64 / raw.height as f64;
            GridGeometry {
                extent,
                transform: primary.geometry.transform.scaled(factor_x, factor_y),
                crs: primary.crs(),
            }
        }
        (None, _) => {
            return Ok(ResourceKind::Unsupported {
                reason: "no geo-referencing".to_string(),
            })
        }
    };

    Ok(ResourceKind::Grid(GridDescriptor {
        geometry,
        bands: raw.samples as usize,
        bits_per_sample: raw.bits,
        nodata: nodata.or_else(|| primary.and_then(|p| p.nodata)),
        overview: raw.is_overview(),
    }))
}

/// Move the decoder to an image directory by index.
pub(crate) fn seek_image<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    ifd: usize,
    path: &Path,
) -> Result<()> {
    for _ in 0..ifd {
        decoder.next_image().map_err(|e| read_error(path, e))?;
    }
    Ok(())
}

/// Decode the cells of `window` from the current image.
///
/// Only strips or tiles overlapping the window are decompressed. Values come
/// back row-major over the window with bands interleaved.
pub(crate) fn read_cells<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    descriptor: &GridDescriptor,
    window: GridExtent,
    path: &Path,
) -> Result<Vec<f64>> {
    let bands = descriptor.bands;
    let (image_width, image_height) = (descriptor.width(), descriptor.height());
    let (chunk_width, chunk_height) = decoder.chunk_dimensions();
    if chunk_width == 0 || chunk_height == 0 {
        return Err(HotmapError::CorruptData {
            path: path.to_path_buf(),
            reason: "zero-sized strip or tile".to_string(),
        });
    }
    let chunks_across = image_width.div_ceil(chunk_width);

    let mut values = vec![f64::NAN; window.cell_count() * bands];
    if window.is_empty() {
        return Ok(values);
    }

    let first_chunk_col = window.col_off / chunk_width;
    let last_chunk_col = (window.col_end() - 1) / chunk_width;
    let first_chunk_row = window.row_off / chunk_height;
    let last_chunk_row = (window.row_end() - 1) / chunk_height;

    for chunk_row in first_chunk_row..=last_chunk_row {
        for chunk_col in first_chunk_col..=last_chunk_col {
            let index = chunk_row * chunks_across + chunk_col;
            let chunk = to_f64(decoder.read_chunk(index).map_err(|e| read_error(path, e))?);

            let col0 = chunk_col * chunk_width;
            let row0 = chunk_row * chunk_height;
            let data_width = chunk_width.min(image_width - col0);
            let data_height = chunk_height.min(image_height - row0);

            // Edge chunks may come back padded to the full chunk size
            let padded_len = chunk_width as usize * chunk_height as usize * bands;
            let stride = if chunk.len() == padded_len {
                chunk_width
            } else {
                data_width
            } as usize;
            if chunk.len() < stride * data_height as usize * bands {
                return Err(HotmapError::CorruptData {
                    path: path.to_path_buf(),
                    reason: format!(
                        "chunk {index} holds {} samples, expected {}",
                        chunk.len(),
                        stride * data_height as usize * bands
                    ),
                });
            }

            let col_start = window.col_off.max(col0);
            let col_end = window.col_end().min(col0 + data_width);
            let row_start = window.row_off.max(row0);
            let row_end = window.row_end().min(row0 + data_height);
            if col_start >= col_end {
                continue;
            }
            let run = (col_end - col_start) as usize * bands;

            for row in row_start..row_end {
                let src = ((row - row0) as usize * stride + (col_start - col0) as usize) * bands;
                let dst = ((row - window.row_off) as usize * window.width as usize
                    + (col_start - window.col_off) as usize)
                    * bands;
                values[dst..dst + run].copy_from_slice(&chunk[src..src + run]);
            }
        }
    }

    Ok(values)
}

fn to_f64(result: DecodingResult) -> Vec<f64> {
    match result {
        DecodingResult::F64(data) => data,
        DecodingResult::F32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U8(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U16(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f64).collect(),
        DecodingResult::I8(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I16(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f64).collect(),
    }
}
