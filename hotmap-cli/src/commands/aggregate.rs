use anyhow::{bail, Context, Result};
use hotmap::{Colormap, DataPoint, Heatmap, Reducer};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use super::{parse_crs, print_heatmap_summary, write_heatmap};

pub struct AggregateArgs {
    pub input: PathBuf,
    pub resolution: f64,
    pub x_col: String,
    pub y_col: String,
    pub value_col: String,
    pub reducer: Reducer,
    pub crs: Option<String>,
    pub output: Option<PathBuf>,
    pub colormap: Colormap,
}

pub fn run(args: AggregateArgs) -> Result<()> {
    let crs = args
        .crs
        .as_deref()
        .map(|crs| parse_crs(Some(crs), hotmap::Crs::WGS84))
        .transpose()?;

    // Detect file format
    let extension = args
        .input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let points = match extension.as_str() {
        "csv" => read_csv(&args.input, &args.x_col, &args.y_col, &args.value_col)?,
        "geojson" | "json" => read_geojson(&args.input, &args.value_col)?,
        _ => bail!(
            "Unsupported file format: {}. Use .csv or .geojson",
            extension
        ),
    };

    let heatmap = Heatmap::build_with(&points, args.resolution, args.reducer)
        .context("Failed to build heatmap")?;

    write_heatmap(&heatmap, args.output.as_deref(), args.colormap, crs)?;

    if args.output.is_some() {
        println!();
        print_heatmap_summary(&heatmap);
    }
    Ok(())
}

fn progress_bar(len: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn read_csv(input: &Path, x_col: &str, y_col: &str, value_col: &str) -> Result<Vec<DataPoint>> {
    let file = File::open(input).context("Failed to open input file")?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));

    // Find column indices
    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .with_context(|| format!("Column '{}' not found in CSV", name))
    };
    let x_idx = column(x_col)?;
    let y_idx = column(y_col)?;
    let value_idx = column(value_col)?;

    // Collect records for progress bar
    let records: Vec<_> = reader.records().collect::<Result<_, _>>()?;
    let pb = progress_bar(records.len() as u64)?;

    let mut points = Vec::with_capacity(records.len());
    for (line, record) in records.iter().enumerate() {
        let field = |idx: usize, name: &str| -> Result<f64> {
            record
                .get(idx)
                .with_context(|| format!("Missing {} on row {}", name, line + 1))?
                .trim()
                .parse()
                .with_context(|| format!("Invalid {} on row {}", name, line + 1))
        };
        points.push(DataPoint::new(
            field(x_idx, x_col)?,
            field(y_idx, y_col)?,
            field(value_idx, value_col)?,
        ));
        pb.inc(1);
    }

    pb.finish_with_message("done");
    Ok(points)
}

/// Point and MultiPoint features carrying a numeric `value_prop` property.
fn read_geojson(input: &Path, value_prop: &str) -> Result<Vec<DataPoint>> {
    let file = File::open(input).context("Failed to open input file")?;
    let geojson: geojson::GeoJson =
        serde_json::from_reader(BufReader::new(file)).context("Failed to parse GeoJSON")?;

    let features = match geojson {
        geojson::GeoJson::FeatureCollection(fc) => fc.features,
        geojson::GeoJson::Feature(feature) => vec![feature],
        geojson::GeoJson::Geometry(_) => {
            bail!("GeoJSON input must be a Feature or FeatureCollection with a '{}' property", value_prop)
        }
    };

    let pb = progress_bar(features.len() as u64)?;
    let mut points = Vec::new();

    for (index, feature) in features.iter().enumerate() {
        let value = feature
            .property(value_prop)
            .and_then(|v| v.as_f64())
            .with_context(|| {
                format!("Feature {} has no numeric '{}' property", index, value_prop)
            })?;

        let positions = match feature.geometry.as_ref().map(|g| &g.value) {
            Some(geojson::Value::Point(position)) => vec![position],
            Some(geojson::Value::MultiPoint(positions)) => positions.iter().collect(),
            Some(_) => bail!("Feature {} is not a Point or MultiPoint", index),
            None => bail!("Feature {} has no geometry", index),
        };

        for position in positions {
            if position.len() < 2 {
                bail!("Feature {} has a position with fewer than 2 coordinates", index);
            }
            points.push(DataPoint::new(position[0], position[1], value));
        }
        pb.inc(1);
    }

    pb.finish_with_message("done");
    Ok(points)
}
