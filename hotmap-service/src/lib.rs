//! Hotmap Service Library
//!
//! HTTP handlers, routing and OpenAPI documentation for the raster window and
//! heatmap service. Used by both the hotmap-service binary and the
//! integration tests.

pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use hotmap::RasterCatalog;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Application state shared across handlers.
pub struct AppState {
    /// Validated raster directory with cached summaries.
    pub catalog: RasterCatalog,
}

// Re-export commonly used types for convenience
pub use handlers::{
    CompositeQuery, CompositeResponse, ErrorResponse, HealthResponse, HeatmapQuery,
    HeatmapRequest, HeatmapResponse, RasterResponse, StatsResponse, WindowQuery, WindowResponse,
};

/// OpenAPI documentation for the Hotmap service.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Hotmap Raster Service",
        version = "0.1.0",
        description = "Windowed GeoTIFF reads and resolution-bucketed heatmaps over a raster directory.",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    paths(
        handlers::health_check,
        handlers::get_stats,
        handlers::list_rasters,
        handlers::get_raster,
        handlers::get_window,
        handlers::get_composite,
        handlers::get_heatmap,
        handlers::post_heatmap,
    ),
    components(
        schemas(
            handlers::ErrorResponse,
            handlers::HealthResponse,
            handlers::StatsResponse,
            handlers::RasterEntryResponse,
            handlers::RasterResponse,
            handlers::ResourceResponse,
            handlers::WindowResponse,
            handlers::StatisticsResponse,
            handlers::CompositeSource,
            handlers::CompositeResponse,
            handlers::HeatmapRequest,
            handlers::PointInput,
            handlers::HeatmapResponse,
            handlers::HeatmapCell,
        )
    ),
    tags(
        (name = "rasters", description = "Raster catalog and window endpoints"),
        (name = "heatmap", description = "Heatmap aggregation endpoints"),
        (name = "system", description = "System and health endpoints")
    )
)]
pub struct ApiDoc;

/// Build the service router with tracing and CORS layers.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(handlers::health_check))
        .route("/stats", get(handlers::get_stats))
        .route("/rasters", get(handlers::list_rasters))
        .route("/rasters/:name", get(handlers::get_raster))
        .route("/rasters/:name/window", get(handlers::get_window))
        .route("/rasters/:name/heatmap", get(handlers::get_heatmap))
        .route("/composite", get(handlers::get_composite))
        .route("/heatmap", post(handlers::post_heatmap))
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}
