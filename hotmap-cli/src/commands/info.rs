use anyhow::Result;
use hotmap::{reproject, Crs, ResourceInfo, ResourceKind};
use serde::Serialize;

use super::{format_size, Source};

#[derive(Serialize)]
struct RasterInfo {
    path: String,
    file_size: u64,
    crs: String,
    /// Primary envelope in WGS 84, `[min_lon, min_lat, max_lon, max_lat]`
    #[serde(skip_serializing_if = "Option::is_none")]
    wgs84_bounds: Option<[f64; 4]>,
    resources: Vec<ResourceReport>,
}

#[derive(Serialize)]
struct ResourceReport {
    index: usize,
    name: String,
    kind: &'static str,
    width: u32,
    height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    bands: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bits_per_sample: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nodata: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bounds: Option<[f64; 4]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl From<&ResourceInfo> for ResourceReport {
    fn from(info: &ResourceInfo) -> Self {
        let mut report = ResourceReport {
            index: info.index,
            name: info.name.clone(),
            kind: info.kind.label(),
            width: info.width,
            height: info.height,
            bands: None,
            bits_per_sample: None,
            nodata: None,
            bounds: None,
            reason: None,
        };
        match &info.kind {
            ResourceKind::Grid(grid) => {
                report.bands = Some(grid.bands);
                report.bits_per_sample = Some(grid.bits_per_sample);
                report.nodata = grid.nodata;
                report.bounds = Some(grid.geometry.envelope().bounds());
            }
            ResourceKind::Unsupported { reason } => report.reason = Some(reason.clone()),
            ResourceKind::Mask => {}
        }
        report
    }
}

pub fn run(source: &Source, raster: &str, json: bool) -> Result<()> {
    let dataset = source.open(raster)?;
    let path = dataset.path().to_path_buf();
    let file_size = std::fs::metadata(&path)?.len();
    let crs = dataset.crs()?;

    let primary = dataset.primary()?;
    let wgs84_bounds = reproject(&primary.envelope(), Crs::WGS84)
        .map(|env| env.bounds())
        .ok();

    let info = RasterInfo {
        path: path.display().to_string(),
        file_size,
        crs: crs.to_string(),
        wgs84_bounds,
        resources: dataset.resources()?.map(ResourceReport::from).collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Raster: {}", info.path);
    println!("File size: {}", format_size(info.file_size));
    println!("CRS: {}", info.crs);
    if let Some([min_lon, min_lat, max_lon, max_lat]) = info.wgs84_bounds {
        println!(
            "WGS 84 bounds: {:.6}, {:.6} to {:.6}, {:.6}",
            min_lon, min_lat, max_lon, max_lat
        );
    }
    println!();

    println!(
        "{:<16} {:<12} {:>12} {:>6} {:>6} {:>10}",
        "RESOURCE", "KIND", "SIZE", "BANDS", "BITS", "NODATA"
    );
    println!("{}", "-".repeat(68));

    for resource in &info.resources {
        println!(
            "{:<16} {:<12} {:>12} {:>6} {:>6} {:>10}",
            resource.name,
            resource.kind,
            format!("{}x{}", resource.width, resource.height),
            resource.bands.map_or("-".to_string(), |b| b.to_string()),
            resource
                .bits_per_sample
                .map_or("-".to_string(), |b| b.to_string()),
            resource.nodata.map_or("-".to_string(), |n| n.to_string()),
        );
        if let Some([min_x, min_y, max_x, max_y]) = resource.bounds {
            println!(
                "  bounds: {:.3}, {:.3} to {:.3}, {:.3}",
                min_x, min_y, max_x, max_y
            );
        }
        if let Some(reason) = &resource.reason {
            println!("  {}", reason);
        }
    }

    Ok(())
}
