//! Hotmap Service - HTTP service for raster windows and heatmaps.
//!
//! Serves windowed reads and heatmaps over a directory of GeoTIFF rasters.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOTMAP_DATA_DIR` | Directory containing GeoTIFF rasters | Required |
//! | `HOTMAP_EXTENSIONS` | Comma-separated raster file extensions | `tif,tiff` |
//! | `HOTMAP_CACHE_SIZE` | Maximum raster summaries in cache | 64 |
//! | `HOTMAP_PORT` | HTTP server port | 8080 |
//! | `RUST_LOG` | Log level (e.g., "info", "debug") | "info" |
//!
//! ## Endpoints
//!
//! - `GET /rasters` - List rasters
//! - `GET /rasters/{name}` - Raster metadata and sub-resources
//! - `GET /rasters/{name}/window` - Cells inside a bounding box
//! - `GET /rasters/{name}/heatmap` - Heatmap of a raster window
//! - `POST /heatmap` - Heatmap of posted point samples
//! - `GET /health` - Health check
//! - `GET /stats` - Cache statistics
//! - `GET /docs` - OpenAPI documentation (Swagger UI)

use std::net::SocketAddr;
use std::sync::Arc;

use hotmap::RasterCatalogBuilder;
use hotmap_service::{router, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hotmap_service=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load port from environment (service-specific config)
    let port: u16 = std::env::var("HOTMAP_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    // The catalog is validated before binding: a missing or empty raster
    // directory stops the service.
    let catalog = match RasterCatalogBuilder::from_env().and_then(|builder| builder.build()) {
        Ok(catalog) => catalog,
        Err(e) => {
            tracing::error!(error = %e, "Cannot start without a raster catalog");
            std::process::exit(1);
        }
    };

    tracing::info!(
        data_dir = %catalog.data_dir().display(),
        rasters = catalog.len(),
        extensions = ?catalog.extensions(),
        cache_capacity = catalog.cache_capacity(),
        port = port,
        "Starting Hotmap service"
    );

    for entry in catalog.entries() {
        tracing::debug!(raster = %entry.name, size = entry.size, "Catalog entry");
    }

    let app = router(Arc::new(AppState { catalog }));

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
