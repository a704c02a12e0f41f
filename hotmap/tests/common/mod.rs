//! GeoTIFF fixtures written with the `tiff` encoder.

#![allow(dead_code)]

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use hotmap::geotiff::{
    KEY_GEOGRAPHIC_TYPE, KEY_MODEL_TYPE, MODEL_TYPE_GEOGRAPHIC, KEY_PROJECTED_TYPE, KEY_RASTER_TYPE, MODEL_TYPE_PROJECTED,
    RASTER_PIXEL_IS_AREA, TAG_GDAL_NODATA, TAG_GEO_KEY_DIRECTORY, TAG_MODEL_PIXEL_SCALE,
    TAG_MODEL_TIEPOINT, TAG_NEW_SUBFILE_TYPE,
};
use tiff::encoder::colortype::{Gray32Float, Gray8, GrayI16, RGBA32Float};
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

/// ETRS89 / UTM zone 33N
pub const EPSG: u16 = 25833;
pub const ORIGIN_X: f64 = 400_000.0;
pub const ORIGIN_Y: f64 = 5_700_000.0;
pub const CELL: f64 = 10.0;
pub const WIDTH: u32 = 20;
pub const HEIGHT: u32 = 15;
pub const NODATA: f32 = -9999.0;

/// Cell value of the standard fixture: `row * 100 + col`, with one nodata cell.
pub fn cell_value(col: u32, row: u32) -> f32 {
    if (col, row) == (3, 2) {
        NODATA
    } else {
        (row * 100 + col) as f32
    }
}

fn projected_keys(epsg: u16) -> Vec<u16> {
    vec![
        1, 1, 0, 3, //
        KEY_MODEL_TYPE, 0, 1, MODEL_TYPE_PROJECTED, //
        KEY_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA, //
        KEY_PROJECTED_TYPE, 0, 1, epsg,
    ]
}

fn standard_values(width: u32, height: u32) -> Vec<f32> {
    (0..height)
        .flat_map(|row| (0..width).map(move |col| cell_value(col, row)))
        .collect()
}

/// Single-image UTM raster, `WIDTH` x `HEIGHT`, 4 rows per strip.
pub fn write_standard(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let file = BufWriter::new(File::create(&path).unwrap());
    let mut encoder = TiffEncoder::new(file).unwrap();
    write_grid(&mut encoder, WIDTH, HEIGHT, CELL, 0.0);
    path
}

/// The standard raster with `shift` added to every valid cell.
pub fn write_shifted(dir: &Path, name: &str, shift: f32) -> PathBuf {
    let path = dir.join(name);
    let file = BufWriter::new(File::create(&path).unwrap());
    let mut encoder = TiffEncoder::new(file).unwrap();
    write_grid(&mut encoder, WIDTH, HEIGHT, CELL, shift);
    path
}

/// Primary image, a half-resolution overview without geo tags and a mask.
pub fn write_pyramid(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let file = BufWriter::new(File::create(&path).unwrap());
    let mut encoder = TiffEncoder::new(file).unwrap();
    write_grid(&mut encoder, WIDTH, HEIGHT, CELL, 0.0);

    let (ow, oh) = (WIDTH / 2, 8);
    let mut overview = encoder.new_image::<Gray32Float>(ow, oh).unwrap();
    overview
        .encoder()
        .write_tag(Tag::Unknown(TAG_NEW_SUBFILE_TYPE), 1u32)
        .unwrap();
    let data: Vec<f32> = (0..ow * oh).map(|i| i as f32).collect();
    overview.write_data(&data).unwrap();

    let mut mask = encoder.new_image::<Gray8>(WIDTH, HEIGHT).unwrap();
    mask.encoder()
        .write_tag(Tag::Unknown(TAG_NEW_SUBFILE_TYPE), 4u32)
        .unwrap();
    mask.write_data(&vec![255u8; (WIDTH * HEIGHT) as usize])
        .unwrap();

    path
}

/// 6 x 4 signed 16-bit WGS 84 raster, 0.01 degree cells from (13.0, 52.0).
///
/// Every SHORT tag here (BitsPerSample, SampleFormat, SamplesPerPixel) holds a
/// single value, the way GDAL writes single-band images.
pub fn write_geographic_i16(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let file = BufWriter::new(File::create(&path).unwrap());
    let mut encoder = TiffEncoder::new(file).unwrap();
    let mut image = encoder.new_image::<GrayI16>(6, 4).unwrap();

    let dir = image.encoder();
    dir.write_tag(Tag::Unknown(TAG_MODEL_PIXEL_SCALE), [0.01, 0.01, 0.0].as_slice())
        .unwrap();
    dir.write_tag(
        Tag::Unknown(TAG_MODEL_TIEPOINT),
        [0.0, 0.0, 0.0, 13.0, 52.0, 0.0].as_slice(),
    )
    .unwrap();
    dir.write_tag(
        Tag::Unknown(TAG_GEO_KEY_DIRECTORY),
        [
            1, 1, 0, 2, //
            KEY_MODEL_TYPE, 0, 1, MODEL_TYPE_GEOGRAPHIC, //
            KEY_GEOGRAPHIC_TYPE, 0, 1, 4326,
        ]
        .as_slice(),
    )
    .unwrap();

    let data: Vec<i16> = (0..24).map(|i| i as i16 - 12).collect();
    image.write_data(&data).unwrap();
    path
}

/// 2 x 2 UTM raster of four reflectance bands: green, red, NIR and SWIR.
///
/// Cells in row-major order are built-up land, open water, vegetation and a
/// cell whose SWIR band holds the nodata value.
pub fn write_reflectance(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let file = BufWriter::new(File::create(&path).unwrap());
    let mut encoder = TiffEncoder::new(file).unwrap();
    let mut image = encoder.new_image::<RGBA32Float>(2, 2).unwrap();

    let dir = image.encoder();
    dir.write_tag(Tag::Unknown(TAG_MODEL_PIXEL_SCALE), [CELL, CELL, 0.0].as_slice())
        .unwrap();
    dir.write_tag(
        Tag::Unknown(TAG_MODEL_TIEPOINT),
        [0.0, 0.0, 0.0, ORIGIN_X, ORIGIN_Y, 0.0].as_slice(),
    )
    .unwrap();
    dir.write_tag(Tag::Unknown(TAG_GEO_KEY_DIRECTORY), projected_keys(EPSG).as_slice())
        .unwrap();
    dir.write_tag(Tag::Unknown(TAG_GDAL_NODATA), "-9999").unwrap();

    #[rustfmt::skip]
    let data: [f32; 16] = [
        0.10, 0.30, 0.10, 0.20,
        0.30, 0.05, 0.05, 0.02,
        0.08, 0.05, 0.45, 0.20,
        0.10, 0.10, 0.10, NODATA,
    ];
    image.write_data(&data).unwrap();
    path
}

/// A TIFF without any GeoTIFF tags.
pub fn write_plain_tiff(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let file = BufWriter::new(File::create(&path).unwrap());
    let mut encoder = TiffEncoder::new(file).unwrap();
    encoder
        .write_image::<Gray8>(4, 4, &[0u8; 16])
        .unwrap();
    path
}

/// Geo keys but no tiepoint or transformation.
pub fn write_without_georeferencing(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let file = BufWriter::new(File::create(&path).unwrap());
    let mut encoder = TiffEncoder::new(file).unwrap();
    let mut image = encoder.new_image::<Gray32Float>(4, 4).unwrap();
    image
        .encoder()
        .write_tag(
            Tag::Unknown(TAG_GEO_KEY_DIRECTORY),
            projected_keys(EPSG).as_slice(),
        )
        .unwrap();
    image.write_data(&[0f32; 16]).unwrap();
    path
}

fn write_grid<W: std::io::Write + std::io::Seek>(
    encoder: &mut TiffEncoder<W>,
    width: u32,
    height: u32,
    cell: f64,
    shift: f32,
) {
    let mut image = encoder.new_image::<Gray32Float>(width, height).unwrap();
    image.rows_per_strip(4).unwrap();

    let dir = image.encoder();
    dir.write_tag(
        Tag::Unknown(TAG_MODEL_PIXEL_SCALE),
        [cell, cell, 0.0].as_slice(),
    )
    .unwrap();
    dir.write_tag(
        Tag::Unknown(TAG_MODEL_TIEPOINT),
        [0.0, 0.0, 0.0, ORIGIN_X, ORIGIN_Y, 0.0].as_slice(),
    )
    .unwrap();
    dir.write_tag(
        Tag::Unknown(TAG_GEO_KEY_DIRECTORY),
        projected_keys(EPSG).as_slice(),
    )
    .unwrap();
    dir.write_tag(Tag::Unknown(TAG_GDAL_NODATA), "-9999").unwrap();

    let values: Vec<f32> = standard_values(width, height)
        .into_iter()
        .map(|v| if v == NODATA { v } else { v + shift })
        .collect();
    image.write_data(&values).unwrap();
}
