use anyhow::{Context, Result};
use hotmap::{Crs, DateRange, GeoTiffWriter, NaiveDate, Reducer};
use serde::Serialize;
use std::path::PathBuf;

use super::window::Statistics;
use super::{parse_bbox, parse_crs, Source};

pub struct CompositeArgs {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub bbox: Option<String>,
    pub crs: Option<String>,
    pub band: usize,
    pub reducer: Reducer,
    pub json: bool,
    pub output: Option<PathBuf>,
}

#[derive(Serialize)]
struct SourceReport {
    name: String,
    date: Option<String>,
}

#[derive(Serialize)]
struct CompositeReport {
    start: String,
    end: String,
    reducer: String,
    sources: Vec<SourceReport>,
    crs: String,
    width: u32,
    height: u32,
    bounds: [f64; 4],
    band: usize,
    statistics: Statistics,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
}

pub fn run(source: &Source, args: CompositeArgs) -> Result<()> {
    let catalog = source.catalog()?;
    let range = DateRange::new(args.from, args.to)?;

    let aoi = match &args.bbox {
        Some(bbox) => {
            // Without --crs the box is in the CRS of the oldest raster in range.
            let native = match catalog.entries_between(&range).first() {
                Some(entry) => catalog.summary(&entry.name)?.crs,
                None => Crs::WGS84,
            };
            let crs = parse_crs(args.crs.as_deref(), native)?;
            Some(parse_bbox(bbox, crs)?)
        }
        None => None,
    };

    let result = catalog
        .composite(&range, aoi.as_ref(), args.band, args.reducer)
        .with_context(|| format!("Failed to composite rasters of {}", range))?;
    let coverage = &result.coverage;

    if let Some(output) = &args.output {
        GeoTiffWriter::new(coverage)
            .write(output)
            .context("Failed to write GeoTIFF")?;
    }

    let report = CompositeReport {
        start: range.start().to_string(),
        end: range.end().to_string(),
        reducer: result.reducer.to_string(),
        sources: result
            .sources
            .iter()
            .map(|e| SourceReport {
                name: e.name.clone(),
                date: e.date.map(|d| d.to_string()),
            })
            .collect(),
        crs: coverage.crs().to_string(),
        width: coverage.width(),
        height: coverage.height(),
        bounds: coverage.envelope().bounds(),
        band: args.band,
        statistics: coverage.statistics(0)?.into(),
        output: args.output.map(|p| p.display().to_string()),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} of band {} from {} to {}",
        report.reducer, report.band, report.start, report.end
    );
    println!();
    println!("{:<40} {:>12}", "SOURCE", "DATE");
    println!("{}", "-".repeat(53));
    for source in &report.sources {
        println!(
            "{:<40} {:>12}",
            source.name,
            source.date.as_deref().unwrap_or("")
        );
    }
    println!();

    let [min_x, min_y, max_x, max_y] = report.bounds;
    println!("CRS: {}", report.crs);
    println!("Grid: {}x{} cells", report.width, report.height);
    println!(
        "Bounds: {:.3}, {:.3} to {:.3}, {:.3}",
        min_x, min_y, max_x, max_y
    );
    println!();
    report.statistics.print(0);

    if let Some(output) = &report.output {
        println!();
        println!("Output written to: {}", output);
    }

    Ok(())
}
