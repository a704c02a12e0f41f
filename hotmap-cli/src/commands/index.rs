use anyhow::{bail, Context, Result};
use hotmap::{normalized_difference, GeoTiffWriter, UrbanIndex};
use std::path::PathBuf;

use super::window::Statistics;
use super::{select_grid, Source};

pub struct IndexArgs {
    pub raster: String,
    pub bands: String,
    pub water_threshold: f64,
    pub resource: Option<String>,
    pub output: PathBuf,
}

/// Band indices from a comma-separated list.
pub fn parse_bands(bands: &str) -> Result<Vec<usize>> {
    bands
        .split(',')
        .map(|b| b.trim().parse::<usize>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Invalid band list '{}'", bands))
}

pub fn run(source: &Source, args: IndexArgs) -> Result<()> {
    let dataset = source.open(&args.raster)?;
    let grid = select_grid(&dataset, args.resource.as_deref())?;
    let coverage = grid.read_full().context("Failed to read raster")?;

    let bands = parse_bands(&args.bands)?;
    let (name, index) = match bands[..] {
        [a, b] => (
            format!("Normalised difference of bands {} and {}", a, b),
            normalized_difference(&coverage, a, b)?,
        ),
        [green, red, nir, swir] => {
            let urban = UrbanIndex {
                water_threshold: args.water_threshold,
                ..UrbanIndex::new(green, red, nir, swir)
            };
            (
                "Urban index with water mask".to_string(),
                urban.compute(&coverage)?,
            )
        }
        ref other => bail!(
            "--bands takes 2 bands (a,b) or 4 bands (green,red,nir,swir), got {}",
            other.len()
        ),
    };

    GeoTiffWriter::new(&index)
        .write(&args.output)
        .context("Failed to write GeoTIFF")?;

    let statistics: Statistics = index.statistics(0)?.into();
    println!("{} of {} ({})", name, args.raster, grid.name());
    println!("Grid: {}x{} cells", index.width(), index.height());
    println!();
    statistics.print(0);
    println!();
    println!("Output written to: {}", args.output.display());

    Ok(())
}
