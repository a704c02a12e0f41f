//! Basic example: window a raster and bucket it into a heatmap.
//!
//! Run with: cargo run --example basic -- /path/to/raster.tif

use hotmap::{reproject, Crs, Heatmap, HotmapError, RasterDataset};
use std::env;

fn main() -> Result<(), HotmapError> {
    let path = env::args().nth(1).unwrap_or_else(|| {
        eprintln!("Usage: cargo run --example basic -- /path/to/raster.tif");
        std::process::exit(1);
    });

    let dataset = match RasterDataset::open(&path) {
        Ok(dataset) => dataset,
        Err(HotmapError::UnsupportedFormat { reason, .. }) => {
            eprintln!("{path} is not a GeoTIFF: {reason}");
            std::process::exit(1);
        }
        Err(e) => return Err(e),
    };

    println!("Resources in {path}:");
    println!("{:-<50}", "");
    for resource in dataset.resources()? {
        println!(
            "  {:<14} {:>6} x {:<6} {}",
            resource.name, resource.width, resource.height, resource.kind
        );
    }

    let grid = dataset.primary()?;
    let envelope = grid.envelope();
    println!("\nNative envelope: {envelope}");
    println!("As WGS 84:       {}", reproject(&envelope, Crs::WGS84)?);

    // Whole raster, bucketed into cells 10 pixels wide
    let coverage = grid.read_window(&envelope)?;
    let stats = coverage.statistics(0)?;
    println!(
        "\n{} valid cells, {} nodata, mean {:.2}",
        stats.count,
        stats.nodata_count,
        stats.mean.unwrap_or(f64::NAN)
    );

    let resolution = grid.geometry().transform.pixel_width.abs() * 10.0;
    let points = coverage.data_points(0)?;
    let heatmap = Heatmap::build(&points, resolution)?;
    println!(
        "Heatmap at {resolution} units: {} cells, range {:?}",
        heatmap.len(),
        heatmap.value_range()
    );

    Ok(())
}
