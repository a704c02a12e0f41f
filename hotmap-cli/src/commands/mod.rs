pub mod aggregate;
pub mod composite;
pub mod heatmap;
pub mod index;
pub mod info;
pub mod list;
pub mod window;

use anyhow::{bail, Context, Result};
use hotmap::geojson::{heatmap_to_feature_collection, heatmap_to_wgs84_feature_collection};
use hotmap::{
    AxisRange, Colormap, Crs, Envelope, GridResource, Heatmap, RasterCatalog,
    RasterCatalogBuilder, RasterDataset, ResourceRef,
};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Where rasters come from: global CLI options.
pub struct Source {
    pub data_dir: Option<PathBuf>,
    pub extensions: Option<String>,
    pub cache_size: u64,
}

impl Source {
    /// Scan the data directory.
    pub fn catalog(&self) -> Result<RasterCatalog> {
        let mut builder = match &self.data_dir {
            Some(dir) => RasterCatalogBuilder::new(dir),
            None => RasterCatalogBuilder::from_env().context(
                "HOTMAP_DATA_DIR environment variable not set. Use --data-dir or set HOTMAP_DATA_DIR",
            )?,
        };

        if let Some(extensions) = &self.extensions {
            builder = builder.extensions(extensions.split(','));
        }

        builder
            .cache_size(self.cache_size)
            .build()
            .context("Failed to scan raster directory")
    }

    /// Open a raster given as a file path or a catalog name.
    pub fn open(&self, raster: &str) -> Result<RasterDataset> {
        let path = Path::new(raster);
        if path.is_file() {
            return RasterDataset::open(path)
                .with_context(|| format!("Failed to open {}", path.display()));
        }

        self.catalog()?
            .open(raster)
            .with_context(|| format!("Failed to open raster '{}'", raster))
    }
}

/// The requested resource, or the primary image.
pub fn select_grid<'a>(
    dataset: &'a RasterDataset,
    resource: Option<&str>,
) -> Result<GridResource<'a>> {
    let grid = match resource {
        Some(resource) => dataset.select(resource.parse::<ResourceRef>()?),
        None => dataset.primary(),
    };
    grid.context("Failed to select resource")
}

/// Parse `min_x,min_y,max_x,max_y`.
pub fn parse_bbox(bbox: &str, crs: Crs) -> Result<Envelope> {
    let values = bbox
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Invalid bounding box '{}'", bbox))?;

    let [min_x, min_y, max_x, max_y] = values[..] else {
        bail!(
            "Bounding box needs 4 values (min_x,min_y,max_x,max_y), got {}",
            values.len()
        );
    };

    Envelope::new(
        crs,
        AxisRange::new(min_x, max_x),
        AxisRange::new(min_y, max_y),
    )
    .context("Invalid bounding box")
}

/// CRS given on the command line, or `default`.
pub fn parse_crs(crs: Option<&str>, default: Crs) -> Result<Crs> {
    match crs {
        Some(crs) => crs.parse().context("Invalid CRS"),
        None => Ok(default),
    }
}

/// Print a heatmap, or write it as GeoJSON or CSV depending on the extension.
///
/// With a projected `crs`, GeoJSON cells are reprojected to WGS 84.
pub fn write_heatmap(
    heatmap: &Heatmap,
    output: Option<&Path>,
    colormap: Colormap,
    crs: Option<Crs>,
) -> Result<()> {
    let Some(output) = output else {
        print_heatmap(heatmap);
        return Ok(());
    };

    let extension = output
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let file = File::create(output).context("Failed to create output file")?;
    let mut writer = BufWriter::new(file);

    match extension.as_str() {
        "geojson" | "json" => {
            let collection = match crs {
                Some(crs) if !crs.is_geographic() => {
                    heatmap_to_wgs84_feature_collection(heatmap, colormap, crs)
                        .context("Failed to reproject heatmap cells")?
                }
                _ => heatmap_to_feature_collection(heatmap, colormap),
            };
            serde_json::to_writer_pretty(&mut writer, &collection)?;
        }
        "csv" => {
            let mut csv_writer = csv::Writer::from_writer(&mut writer);
            csv_writer.write_record([
                "cell_x", "cell_y", "min_x", "min_y", "max_x", "max_y", "value",
            ])?;
            for (key, value) in heatmap.cells() {
                let [min_x, min_y, max_x, max_y] = heatmap.cell_bounds(key);
                csv_writer.write_record([
                    key.x.to_string(),
                    key.y.to_string(),
                    min_x.to_string(),
                    min_y.to_string(),
                    max_x.to_string(),
                    max_y.to_string(),
                    value.to_string(),
                ])?;
            }
            csv_writer.flush()?;
        }
        _ => bail!(
            "Unsupported output format: {}. Use .geojson, .json or .csv",
            extension
        ),
    }

    writer.flush()?;
    println!(
        "{} cells written to: {}",
        heatmap.len(),
        output.display()
    );
    Ok(())
}

fn print_heatmap(heatmap: &Heatmap) {
    println!("{:>12} {:>12} {:>14}", "CELL_X", "CELL_Y", heatmap.reducer().name().to_uppercase());
    println!("{}", "-".repeat(40));
    for (key, value) in heatmap.cells() {
        println!("{:>12} {:>12} {:>14.4}", key.x, key.y, value);
    }
    println!();
    print_heatmap_summary(heatmap);
}

pub fn print_heatmap_summary(heatmap: &Heatmap) {
    println!("Heatmap:");
    println!("  Cells: {}", heatmap.len());
    println!("  Resolution: {}", heatmap.resolution());
    println!("  Reducer: {}", heatmap.reducer());
    println!("  Points: {}", heatmap.points().len());
    if heatmap.skipped() > 0 {
        println!("  Skipped (non-finite): {}", heatmap.skipped());
    }
    if let Some((min, max)) = heatmap.value_range() {
        println!("  Value range: {:.4} to {:.4}", min, max);
    }
}

pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bbox() {
        let env = parse_bbox("10, 50,11,51", Crs::WGS84).unwrap();
        assert_eq!(env.bounds(), [10.0, 50.0, 11.0, 51.0]);
        assert_eq!(env.crs(), Crs::WGS84);
    }

    #[test]
    fn test_parse_bbox_errors() {
        assert!(parse_bbox("1,2,3", Crs::WGS84).is_err());
        assert!(parse_bbox("1,2,x,4", Crs::WGS84).is_err());
        // min greater than max
        assert!(parse_bbox("5,2,3,4", Crs::WGS84).is_err());
    }

    #[test]
    fn test_parse_crs() {
        assert_eq!(
            parse_crs(Some("EPSG:25832"), Crs::WGS84).unwrap(),
            Crs::from_epsg(25832)
        );
        assert_eq!(parse_crs(None, Crs::WGS84).unwrap(), Crs::WGS84);
        assert!(parse_crs(Some("utm"), Crs::WGS84).is_err());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }
}
