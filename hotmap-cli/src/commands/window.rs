use anyhow::{Context, Result};
use hotmap::{CoverageStatistics, GeoTiffWriter};
use serde::Serialize;
use std::path::PathBuf;

use super::{parse_bbox, parse_crs, select_grid, Source};

pub struct WindowArgs {
    pub raster: String,
    pub bbox: String,
    pub crs: Option<String>,
    pub resource: Option<String>,
    pub band: usize,
    pub json: bool,
    pub output: Option<PathBuf>,
}

#[derive(Serialize)]
struct WindowReport {
    raster: String,
    resource: String,
    crs: String,
    col_off: u32,
    row_off: u32,
    width: u32,
    height: u32,
    bounds: [f64; 4],
    band: usize,
    statistics: Statistics,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct Statistics {
    pub count: usize,
    pub nodata_count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
}

impl Statistics {
    pub(crate) fn print(&self, band: usize) {
        println!("Band {}:", band);
        println!("  Valid cells: {}", self.count);
        if self.nodata_count > 0 {
            println!("  Nodata cells: {}", self.nodata_count);
        }
        if let (Some(min), Some(max), Some(mean)) = (self.min, self.max, self.mean) {
            println!("  Min: {:.4}", min);
            println!("  Max: {:.4}", max);
            println!("  Mean: {:.4}", mean);
        }
    }
}

impl From<CoverageStatistics> for Statistics {
    fn from(stats: CoverageStatistics) -> Self {
        Self {
            count: stats.count,
            nodata_count: stats.nodata_count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean,
        }
    }
}

pub fn run(source: &Source, args: WindowArgs) -> Result<()> {
    let dataset = source.open(&args.raster)?;
    let grid = select_grid(&dataset, args.resource.as_deref())?;

    let crs = parse_crs(args.crs.as_deref(), grid.crs())?;
    let aoi = parse_bbox(&args.bbox, crs)?;
    let coverage = grid.read_window(&aoi).context("Failed to read window")?;
    let statistics = coverage.statistics(args.band)?;

    if let Some(output) = &args.output {
        GeoTiffWriter::new(&coverage)
            .band(args.band)
            .write(output)
            .context("Failed to write GeoTIFF")?;
    }

    let extent = coverage.extent();
    let report = WindowReport {
        raster: args.raster,
        resource: grid.name().to_string(),
        crs: coverage.crs().to_string(),
        col_off: extent.col_off,
        row_off: extent.row_off,
        width: extent.width,
        height: extent.height,
        bounds: coverage.envelope().bounds(),
        band: args.band,
        statistics: statistics.into(),
        output: args.output.map(|p| p.display().to_string()),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let [min_x, min_y, max_x, max_y] = report.bounds;
    println!("Raster: {} ({})", report.raster, report.resource);
    println!("CRS: {}", report.crs);
    println!(
        "Window: {}x{} cells at column {}, row {}",
        report.width, report.height, report.col_off, report.row_off
    );
    println!(
        "Bounds: {:.3}, {:.3} to {:.3}, {:.3}",
        min_x, min_y, max_x, max_y
    );
    println!();

    report.statistics.print(report.band);

    if let Some(output) = &report.output {
        println!();
        println!("Output written to: {}", output);
    }

    Ok(())
}
