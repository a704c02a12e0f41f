//! HTTP request handlers for the raster service.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hotmap::geojson::{heatmap_to_feature_collection, heatmap_to_wgs84_feature_collection};
use hotmap::{
    reproject, AxisRange, Colormap, CoverageStatistics, Crs, DataPoint, DateRange, Envelope,
    GridResource, Heatmap, HotmapError, NaiveDate, RasterDataset, Reducer, ResourceRef,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::AppState;

/// Query parameters for the window endpoint.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WindowQuery {
    /// Bounding box minimum x (longitude for geographic CRSs).
    pub min_x: f64,
    /// Bounding box minimum y (latitude for geographic CRSs).
    pub min_y: f64,
    /// Bounding box maximum x.
    pub max_x: f64,
    /// Bounding box maximum y.
    pub max_y: f64,
    /// CRS of the bounding box, e.g. `EPSG:4326`. Defaults to the raster's CRS.
    pub crs: Option<String>,
    /// Resource index or name. Defaults to the primary image.
    pub resource: Option<String>,
    /// Band index (default 0).
    #[serde(default)]
    pub band: usize,
    /// Include the cell values (row-major, nodata as null).
    #[serde(default)]
    pub values: bool,
}

/// Query parameters for the raster heatmap endpoint.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HeatmapQuery {
    /// Bounding box minimum x.
    pub min_x: f64,
    /// Bounding box minimum y.
    pub min_y: f64,
    /// Bounding box maximum x.
    pub max_x: f64,
    /// Bounding box maximum y.
    pub max_y: f64,
    /// CRS of the bounding box. Defaults to the raster's CRS.
    pub crs: Option<String>,
    /// Heatmap cell size in the raster's CRS units.
    pub resolution: f64,
    /// `mean` (default), `sum`, `min`, `max` or `count`.
    pub reducer: Option<String>,
    /// Resource index or name. Defaults to the primary image.
    pub resource: Option<String>,
    /// Band index (default 0).
    #[serde(default)]
    pub band: usize,
    /// `json` (default) or `geojson`.
    pub format: Option<String>,
    /// Colormap for GeoJSON cell colours: `jet` (default), `viridis` or `turbo`.
    pub colormap: Option<String>,
}

/// Query parameters for the composite endpoint.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CompositeQuery {
    /// First day of the period, `YYYY-MM-DD`.
    pub start: String,
    /// Last day of the period, `YYYY-MM-DD`, included.
    pub end: String,
    /// Bounding box minimum x. The box is optional, but all four bounds go together.
    pub min_x: Option<f64>,
    /// Bounding box minimum y.
    pub min_y: Option<f64>,
    /// Bounding box maximum x.
    pub max_x: Option<f64>,
    /// Bounding box maximum y.
    pub max_y: Option<f64>,
    /// CRS of the bounding box. Defaults to the oldest raster's CRS.
    pub crs: Option<String>,
    /// Band index (default 0).
    #[serde(default)]
    pub band: usize,
    /// `mean` (default), `sum`, `min`, `max` or `count`.
    pub reducer: Option<String>,
    /// Include the cell values (row-major, nodata as null).
    #[serde(default)]
    pub values: bool,
}

/// A point sample for heatmap aggregation.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PointInput {
    pub x: f64,
    pub y: f64,
    pub value: f64,
}

/// Heatmap request over arbitrary point samples.
#[derive(Debug, Deserialize, ToSchema)]
pub struct HeatmapRequest {
    /// Point samples, all in the same CRS.
    pub points: Vec<PointInput>,
    /// Cell size in the points' coordinate units.
    pub resolution: f64,
    /// `mean` (default), `sum`, `min`, `max` or `count`.
    pub reducer: Option<String>,
    /// CRS of the points. With a projected CRS, GeoJSON output is in WGS 84.
    pub crs: Option<String>,
    /// `json` (default) or `geojson`.
    pub format: Option<String>,
    /// Colormap for GeoJSON cell colours.
    pub colormap: Option<String>,
}

/// Error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message.
    pub error: String,
}

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
    /// Number of rasters in the catalog.
    pub rasters: usize,
}

/// Summary cache statistics response.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    /// Number of raster summaries in cache.
    pub cached_summaries: u64,
    /// Maximum number of cached summaries.
    pub cache_capacity: u64,
    /// Cache hit count.
    pub cache_hits: u64,
    /// Cache miss count.
    pub cache_misses: u64,
    /// Cache hit rate (0.0 to 1.0).
    pub hit_rate: f64,
}

/// A raster in the catalog.
#[derive(Debug, Serialize, ToSchema)]
pub struct RasterEntryResponse {
    pub name: String,
    /// File size in bytes.
    pub size: u64,
    /// Acquisition date from the file name, `YYYY-MM-DD`.
    pub date: Option<String>,
}

/// One image of a raster file.
#[derive(Debug, Serialize, ToSchema)]
pub struct ResourceResponse {
    pub index: usize,
    pub name: String,
    /// `grid`, `overview`, `mask` or `unsupported`.
    pub kind: String,
    pub width: u32,
    pub height: u32,
}

/// Raster metadata.
#[derive(Debug, Serialize, ToSchema)]
pub struct RasterResponse {
    pub name: String,
    /// Native CRS, e.g. `EPSG:25832`.
    pub crs: String,
    /// Primary image bounds `[min_x, min_y, max_x, max_y]` in the native CRS.
    pub bounds: Vec<f64>,
    /// Primary image bounds in WGS 84 longitude/latitude.
    pub wgs84_bounds: Option<Vec<f64>>,
    pub width: u32,
    pub height: u32,
    pub bands: usize,
    pub nodata: Option<f64>,
    pub resources: Vec<ResourceResponse>,
}

/// Statistics over the valid cells of a band.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatisticsResponse {
    pub count: usize,
    pub nodata_count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
}

impl From<CoverageStatistics> for StatisticsResponse {
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

/// Cells of a raster inside a bounding box.
#[derive(Debug, Serialize, ToSchema)]
pub struct WindowResponse {
    pub raster: String,
    pub resource: String,
    /// Native CRS of the cells.
    pub crs: String,
    /// Column of the first cell in the full grid.
    pub col_off: u32,
    /// Row of the first cell in the full grid.
    pub row_off: u32,
    pub width: u32,
    pub height: u32,
    /// Bounds of the window's cells in the native CRS.
    pub bounds: Vec<f64>,
    pub band: usize,
    pub statistics: StatisticsResponse,
    /// Row-major cell values when requested, nodata as null.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Option<f64>>>,
}

/// A raster that went into a composite.
#[derive(Debug, Serialize, ToSchema)]
pub struct CompositeSource {
    pub name: String,
    /// `YYYY-MM-DD`
    pub date: Option<String>,
}

/// One band of the rasters of a period, reduced cell by cell.
#[derive(Debug, Serialize, ToSchema)]
pub struct CompositeResponse {
    pub start: String,
    pub end: String,
    pub reducer: String,
    /// Rasters dated inside the period, oldest first.
    pub sources: Vec<CompositeSource>,
    pub crs: String,
    pub col_off: u32,
    pub row_off: u32,
    pub width: u32,
    pub height: u32,
    pub bounds: Vec<f64>,
    pub band: usize,
    pub statistics: StatisticsResponse,
    /// Row-major cell values when requested, nodata as null.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Option<f64>>>,
}

/// One heatmap cell.
#[derive(Debug, Serialize, ToSchema)]
pub struct HeatmapCell {
    /// Cell index along x (`floor(x / resolution)`).
    pub x: i64,
    /// Cell index along y (`floor(y / resolution)`).
    pub y: i64,
    pub value: f64,
    /// Cell square `[min_x, min_y, max_x, max_y]`.
    pub bounds: Vec<f64>,
}

/// Heatmap cells and how they were computed.
#[derive(Debug, Serialize, ToSchema)]
pub struct HeatmapResponse {
    pub resolution: f64,
    pub reducer: String,
    /// CRS of the cell coordinates, when known.
    pub crs: Option<String>,
    /// Number of input points.
    pub points: usize,
    /// Points ignored because of a non-finite coordinate or value.
    pub skipped: usize,
    pub cells: Vec<HeatmapCell>,
}

/// A failed request: status code plus message.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

/// HTTP status for a library error.
pub fn status_for(e: &HotmapError) -> StatusCode {
    match e {
        HotmapError::NotFound { .. }
        | HotmapError::ResourceNotFound { .. }
        | HotmapError::NoRastersInRange { .. } => StatusCode::NOT_FOUND,
        HotmapError::OutOfBounds { .. }
        | HotmapError::InvalidResolution { .. }
        | HotmapError::CellOutOfRange { .. }
        | HotmapError::InvalidEnvelope { .. }
        | HotmapError::InvalidBand { .. }
        | HotmapError::UnknownCrs { .. }
        | HotmapError::Reprojection { .. }
        | HotmapError::NotAGridResource { .. }
        | HotmapError::InvalidDateRange { .. } => StatusCode::BAD_REQUEST,
        HotmapError::UnsupportedFormat { .. }
        | HotmapError::CorruptData { .. }
        | HotmapError::IncompatibleCoverages { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<HotmapError> for ApiError {
    fn from(e: HotmapError) -> Self {
        let status = status_for(&e);
        tracing::warn!(status = status.as_u16(), error = %e, "Request failed");
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

/// Run raster I/O off the async workers.
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::internal(format!("Worker task failed: {e}")))?
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum OutputFormat {
    Json,
    GeoJson,
}

fn parse_format(format: Option<&str>) -> Result<OutputFormat, ApiError> {
    match format.map(|f| f.trim().to_ascii_lowercase()).as_deref() {
        None | Some("json") => Ok(OutputFormat::Json),
        Some("geojson") => Ok(OutputFormat::GeoJson),
        Some(other) => Err(ApiError::bad_request(format!(
            "Unknown format '{other}' (expected json or geojson)"
        ))),
    }
}

fn parse_reducer(reducer: Option<&str>) -> Result<Reducer, ApiError> {
    reducer
        .map(|r| r.parse().map_err(ApiError::bad_request))
        .transpose()
        .map(Option::unwrap_or_default)
}

fn parse_colormap(colormap: Option<&str>) -> Result<Colormap, ApiError> {
    colormap
        .map(|c| c.parse().map_err(ApiError::bad_request))
        .transpose()
        .map(Option::unwrap_or_default)
}

fn parse_crs(crs: Option<&str>, default: Crs) -> Result<Crs, ApiError> {
    match crs {
        Some(crs) => Ok(crs.parse::<Crs>()?),
        None => Ok(default),
    }
}

fn bbox(min_x: f64, min_y: f64, max_x: f64, max_y: f64, crs: Crs) -> Result<Envelope, ApiError> {
    Ok(Envelope::new(
        crs,
        AxisRange::new(min_x, max_x),
        AxisRange::new(min_y, max_y),
    )?)
}

fn parse_date(field: &str, value: &str) -> Result<NaiveDate, ApiError> {
    value
        .trim()
        .parse()
        .map_err(|e| ApiError::bad_request(format!("Invalid {field} date '{value}': {e}")))
}

/// The four bounds of an optional bounding box, all or none.
fn optional_bounds(query: &CompositeQuery) -> Result<Option<[f64; 4]>, ApiError> {
    match (query.min_x, query.min_y, query.max_x, query.max_y) {
        (Some(min_x), Some(min_y), Some(max_x), Some(max_y)) => {
            Ok(Some([min_x, min_y, max_x, max_y]))
        }
        (None, None, None, None) => Ok(None),
        _ => Err(ApiError::bad_request(
            "Bounding box needs all of min_x, min_y, max_x and max_y",
        )),
    }
}

fn select_grid<'a>(
    dataset: &'a RasterDataset,
    resource: Option<&str>,
) -> Result<GridResource<'a>, ApiError> {
    let grid = match resource {
        Some(resource) => {
            let reference = resource
                .parse::<ResourceRef>()
                .unwrap_or_else(|never| match never {});
            dataset.select(reference)?
        }
        None => dataset.primary()?,
    };
    Ok(grid)
}

fn heatmap_response(
    heatmap: &Heatmap,
    crs: Option<Crs>,
    format: OutputFormat,
    colormap: Colormap,
) -> Result<Response, ApiError> {
    if format == OutputFormat::GeoJson {
        let collection = match crs {
            Some(crs) if !crs.is_geographic() => {
                heatmap_to_wgs84_feature_collection(heatmap, colormap, crs)?
            }
            _ => heatmap_to_feature_collection(heatmap, colormap),
        };
        return Ok(Json(collection).into_response());
    }

    let cells = heatmap
        .cells()
        .map(|(key, value)| HeatmapCell {
            x: key.x,
            y: key.y,
            value,
            bounds: heatmap.cell_bounds(key).to_vec(),
        })
        .collect();

    Ok(Json(HeatmapResponse {
        resolution: heatmap.resolution(),
        reducer: heatmap.reducer().to_string(),
        crs: crs.map(|c| c.to_string()),
        points: heatmap.points().len(),
        skipped: heatmap.skipped(),
        cells,
    })
    .into_response())
}

/// Health check endpoint.
///
/// Returns service status, version and catalog size.
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses((status = 200, description = "Service is healthy", body = HealthResponse))
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        rasters: state.catalog.len(),
    })
}

/// Get summary cache statistics.
#[utoipa::path(
    get,
    path = "/stats",
    tag = "system",
    responses((status = 200, description = "Cache statistics", body = StatsResponse))
)]
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let stats = state.catalog.cache_stats();

    Json(StatsResponse {
        cached_summaries: stats.entry_count,
        cache_capacity: state.catalog.cache_capacity(),
        cache_hits: stats.hit_count,
        cache_misses: stats.miss_count,
        hit_rate: stats.hit_rate(),
    })
}

/// List the rasters in the catalog.
#[utoipa::path(
    get,
    path = "/rasters",
    tag = "rasters",
    responses((status = 200, description = "Rasters sorted by name", body = Vec<RasterEntryResponse>))
)]
pub async fn list_rasters(State(state): State<Arc<AppState>>) -> Json<Vec<RasterEntryResponse>> {
    Json(
        state
            .catalog
            .entries()
            .iter()
            .map(|entry| RasterEntryResponse {
                name: entry.name.clone(),
                size: entry.size,
                date: entry.date.map(|d| d.to_string()),
            })
            .collect(),
    )
}

/// Get the metadata of one raster.
///
/// # Returns
///
/// - `200 OK` with CRS, bounds and sub-resources
/// - `404 Not Found` if the raster is not in the catalog
/// - `422 Unprocessable Entity` if the file is not a readable GeoTIFF
#[utoipa::path(
    get,
    path = "/rasters/{name}",
    tag = "rasters",
    params(("name" = String, Path, description = "Raster file name")),
    responses(
        (status = 200, description = "Raster metadata", body = RasterResponse),
        (status = 404, description = "Unknown raster", body = ErrorResponse),
        (status = 422, description = "Unreadable raster", body = ErrorResponse)
    )
)]
pub async fn get_raster(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<RasterResponse>, ApiError> {
    tracing::debug!(raster = %name, "Raster query");

    let summary = blocking(move || Ok(state.catalog.summary(&name)?)).await?;
    let wgs84_bounds = reproject(&summary.envelope, Crs::WGS84)
        .ok()
        .map(|env| env.bounds().to_vec());

    Ok(Json(RasterResponse {
        name: summary.name.clone(),
        crs: summary.crs.to_string(),
        bounds: summary.envelope.bounds().to_vec(),
        wgs84_bounds,
        width: summary.width,
        height: summary.height,
        bands: summary.bands,
        nodata: summary.nodata,
        resources: summary
            .resources
            .iter()
            .map(|r| ResourceResponse {
                index: r.index,
                name: r.name.clone(),
                kind: r.kind.label().to_string(),
                width: r.width,
                height: r.height,
            })
            .collect(),
    }))
}

/// Read the cells of a raster inside a bounding box.
///
/// The bounding box may be in any EPSG CRS; the cells are returned in the
/// raster's native CRS.
///
/// # Returns
///
/// - `200 OK` with the window geometry and band statistics
/// - `400 Bad Request` if the box is invalid, cannot be reprojected or misses the raster
/// - `404 Not Found` if the raster or resource does not exist
#[utoipa::path(
    get,
    path = "/rasters/{name}/window",
    tag = "rasters",
    params(("name" = String, Path, description = "Raster file name"), WindowQuery),
    responses(
        (status = 200, description = "Cells inside the bounding box", body = WindowResponse),
        (status = 400, description = "Invalid or out-of-bounds request", body = ErrorResponse),
        (status = 404, description = "Unknown raster or resource", body = ErrorResponse)
    )
)]
pub async fn get_window(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<WindowResponse>, ApiError> {
    tracing::debug!(raster = %name, ?query, "Window query");

    blocking(move || {
        let dataset = state.catalog.open(&name)?;
        let grid = select_grid(&dataset, query.resource.as_deref())?;
        let crs = parse_crs(query.crs.as_deref(), grid.crs())?;
        let aoi = bbox(query.min_x, query.min_y, query.max_x, query.max_y, crs)?;

        let coverage = grid.read_window(&aoi)?;
        let statistics = coverage.statistics(query.band)?;
        let values = if query.values {
            Some(
                coverage
                    .band_values(query.band)?
                    .map(|v| (!coverage.is_nodata(v)).then_some(v))
                    .collect(),
            )
        } else {
            None
        };

        let extent = coverage.extent();
        tracing::info!(
            raster = %name,
            resource = grid.name(),
            cells = extent.cell_count(),
            "Window read"
        );

        Ok(Json(WindowResponse {
            raster: name.clone(),
            resource: grid.name().to_string(),
            crs: coverage.crs().to_string(),
            col_off: extent.col_off,
            row_off: extent.row_off,
            width: extent.width,
            height: extent.height,
            bounds: coverage.envelope().bounds().to_vec(),
            band: query.band,
            statistics: statistics.into(),
            values,
        }))
    })
    .await
}

/// Reduce one band of every raster dated inside a period.
///
/// Dates come from the file names (`YYYY-MM`, `YYYY-MM-DD` or `YYYYMMDD`).
/// Without a bounding box the full grids are combined.
///
/// # Returns
///
/// - `200 OK` with the sources, the composite geometry and band statistics
/// - `400 Bad Request` for a malformed or reversed period or bounding box
/// - `404 Not Found` if no raster is dated inside the period
/// - `422 Unprocessable Entity` if the rasters do not share one grid
#[utoipa::path(
    get,
    path = "/composite",
    tag = "rasters",
    params(CompositeQuery),
    responses(
        (status = 200, description = "Per-cell composite of the period", body = CompositeResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "No rasters in the period", body = ErrorResponse),
        (status = 422, description = "Rasters on different grids", body = ErrorResponse)
    )
)]
pub async fn get_composite(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CompositeQuery>,
) -> Result<Json<CompositeResponse>, ApiError> {
    tracing::debug!(?query, "Composite query");

    let range = DateRange::new(
        parse_date("start", &query.start)?,
        parse_date("end", &query.end)?,
    )?;
    let reducer = parse_reducer(query.reducer.as_deref())?;
    let bounds = optional_bounds(&query)?;

    blocking(move || {
        let catalog = &state.catalog;
        let aoi = match bounds {
            Some([min_x, min_y, max_x, max_y]) => {
                let native = match catalog.entries_between(&range).first() {
                    Some(entry) => catalog.summary(&entry.name)?.crs,
                    None => Crs::WGS84,
                };
                let crs = parse_crs(query.crs.as_deref(), native)?;
                Some(bbox(min_x, min_y, max_x, max_y, crs)?)
            }
            None => None,
        };

        let result = catalog.composite(&range, aoi.as_ref(), query.band, reducer)?;
        let coverage = &result.coverage;
        let values = if query.values {
            Some(
                coverage
                    .values()
                    .iter()
                    .map(|&v| (!coverage.is_nodata(v)).then_some(v))
                    .collect(),
            )
        } else {
            None
        };

        let extent = coverage.extent();
        tracing::info!(
            period = %range,
            sources = result.sources.len(),
            cells = extent.cell_count(),
            "Composite built"
        );

        Ok(Json(CompositeResponse {
            start: range.start().to_string(),
            end: range.end().to_string(),
            reducer: reducer.to_string(),
            sources: result
                .sources
                .iter()
                .map(|e| CompositeSource {
                    name: e.name.clone(),
                    date: e.date.map(|d| d.to_string()),
                })
                .collect(),
            crs: coverage.crs().to_string(),
            col_off: extent.col_off,
            row_off: extent.row_off,
            width: extent.width,
            height: extent.height,
            bounds: coverage.envelope().bounds().to_vec(),
            band: query.band,
            statistics: coverage.statistics(0)?.into(),
            values,
        }))
    })
    .await
}

/// Bucket the cells of a raster window into a heatmap.
///
/// Cell centres of the window become point samples in the raster's CRS;
/// nodata cells are skipped.
#[utoipa::path(
    get,
    path = "/rasters/{name}/heatmap",
    tag = "heatmap",
    params(("name" = String, Path, description = "Raster file name"), HeatmapQuery),
    responses(
        (status = 200, description = "Heatmap cells (JSON) or a GeoJSON FeatureCollection", body = HeatmapResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Unknown raster or resource", body = ErrorResponse)
    )
)]
pub async fn get_heatmap(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<HeatmapQuery>,
) -> Result<Response, ApiError> {
    tracing::debug!(raster = %name, ?query, "Raster heatmap query");

    let reducer = parse_reducer(query.reducer.as_deref())?;
    let format = parse_format(query.format.as_deref())?;
    let colormap = parse_colormap(query.colormap.as_deref())?;

    blocking(move || {
        let dataset = state.catalog.open(&name)?;
        let grid = select_grid(&dataset, query.resource.as_deref())?;
        let crs = parse_crs(query.crs.as_deref(), grid.crs())?;
        let aoi = bbox(query.min_x, query.min_y, query.max_x, query.max_y, crs)?;

        let coverage = grid.read_window(&aoi)?;
        let points = coverage.data_points(query.band)?;
        let heatmap = Heatmap::build_with(&points, query.resolution, reducer)?;

        tracing::info!(
            raster = %name,
            points = points.len(),
            cells = heatmap.len(),
            "Heatmap built"
        );

        heatmap_response(&heatmap, Some(coverage.crs()), format, colormap)
    })
    .await
}

/// Bucket arbitrary point samples into a heatmap.
#[utoipa::path(
    post,
    path = "/heatmap",
    tag = "heatmap",
    request_body = HeatmapRequest,
    responses(
        (status = 200, description = "Heatmap cells (JSON) or a GeoJSON FeatureCollection", body = HeatmapResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse)
    )
)]
pub async fn post_heatmap(Json(request): Json<HeatmapRequest>) -> Result<Response, ApiError> {
    tracing::debug!(
        points = request.points.len(),
        resolution = request.resolution,
        "Point heatmap query"
    );

    let reducer = parse_reducer(request.reducer.as_deref())?;
    let format = parse_format(request.format.as_deref())?;
    let colormap = parse_colormap(request.colormap.as_deref())?;
    let crs = request
        .crs
        .as_deref()
        .map(|crs| parse_crs(Some(crs), Crs::WGS84))
        .transpose()?;

    let points: Vec<DataPoint> = request
        .points
        .iter()
        .map(|p| DataPoint::new(p.x, p.y, p.value))
        .collect();

    blocking(move || {
        let heatmap = Heatmap::build_with(&points, request.resolution, reducer)?;
        heatmap_response(&heatmap, crs, format, colormap)
    })
    .await
}
