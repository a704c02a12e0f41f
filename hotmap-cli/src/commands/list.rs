use anyhow::Result;
use hotmap::ResourceKind;

use super::{format_size, Source};

pub fn run(source: &Source) -> Result<()> {
    let catalog = source.catalog()?;

    println!(
        "{:<28} {:>10} {:>12} {:>12} {:>10} {:>11}",
        "RASTER", "SIZE", "CRS", "CELLS", "RESOURCES", "DATE"
    );
    println!("{}", "-".repeat(88));

    let mut total_size: u64 = 0;
    let mut unreadable = 0;

    for entry in catalog.entries() {
        total_size += entry.size;

        match catalog.summary(&entry.name) {
            Ok(summary) => {
                let grids = summary
                    .resources
                    .iter()
                    .filter(|r| matches!(r.kind, ResourceKind::Grid(_)))
                    .count();
                println!(
                    "{:<28} {:>10} {:>12} {:>12} {:>10} {:>11}",
                    entry.name,
                    format_size(entry.size),
                    summary.crs.to_string(),
                    format!("{}x{}", summary.width, summary.height),
                    format!("{}/{}", grids, summary.resources.len()),
                    entry.date.map(|d| d.to_string()).unwrap_or_default(),
                );
            }
            Err(e) => {
                unreadable += 1;
                println!(
                    "{:<28} {:>10} {:>12}",
                    entry.name,
                    format_size(entry.size),
                    "unreadable"
                );
                tracing::warn!("{}: {}", entry.name, e);
            }
        }
    }

    // Summary
    println!();
    println!("Summary:");
    println!("  Total rasters: {}", catalog.len());
    if unreadable > 0 {
        println!("  Unreadable: {}", unreadable);
    }
    println!("  Total size: {}", format_size(total_size));
    println!("  Extensions: {}", catalog.extensions().join(", "));
    println!("  Data directory: {}", catalog.data_dir().display());

    Ok(())
}
