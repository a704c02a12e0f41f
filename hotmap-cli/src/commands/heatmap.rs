use anyhow::{Context, Result};
use hotmap::{Colormap, Heatmap, Reducer};
use std::path::PathBuf;

use super::{parse_bbox, parse_crs, print_heatmap_summary, select_grid, write_heatmap, Source};

pub struct HeatmapArgs {
    pub raster: String,
    pub bbox: String,
    pub crs: Option<String>,
    pub resolution: f64,
    pub reducer: Reducer,
    pub resource: Option<String>,
    pub band: usize,
    pub output: Option<PathBuf>,
    pub colormap: Colormap,
}

pub fn run(source: &Source, args: HeatmapArgs) -> Result<()> {
    let dataset = source.open(&args.raster)?;
    let grid = select_grid(&dataset, args.resource.as_deref())?;

    let crs = parse_crs(args.crs.as_deref(), grid.crs())?;
    let aoi = parse_bbox(&args.bbox, crs)?;
    let coverage = grid.read_window(&aoi).context("Failed to read window")?;

    let points = coverage.data_points(args.band)?;
    let heatmap = Heatmap::build_with(&points, args.resolution, args.reducer)
        .context("Failed to build heatmap")?;

    write_heatmap(
        &heatmap,
        args.output.as_deref(),
        args.colormap,
        Some(coverage.crs()),
    )?;

    if args.output.is_some() {
        println!();
        print_heatmap_summary(&heatmap);
    }
    Ok(())
}
