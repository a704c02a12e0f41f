use anyhow::Result;
use clap::{Parser, Subcommand};
use hotmap::{Colormap, NaiveDate, Reducer, UrbanIndex};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// GeoTIFF window and heatmap CLI tool
#[derive(Parser)]
#[command(name = "hotmap")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory containing GeoTIFF rasters
    #[arg(short, long, env = "HOTMAP_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Comma-separated raster file extensions
    #[arg(short, long, env = "HOTMAP_EXTENSIONS", global = true)]
    extensions: Option<String>,

    /// Maximum raster summaries in cache
    #[arg(
        short,
        long,
        env = "HOTMAP_CACHE_SIZE",
        default_value = "64",
        global = true
    )]
    cache_size: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List rasters in the data directory
    List,

    /// Display the sub-resources and georeferencing of a raster
    Info {
        /// Raster name in the data directory, or a path to a GeoTIFF
        raster: String,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Read the cells of a raster inside a bounding box
    Window {
        /// Raster name in the data directory, or a path to a GeoTIFF
        raster: String,

        /// Bounding box as min_x,min_y,max_x,max_y
        #[arg(long, allow_hyphen_values = true)]
        bbox: String,

        /// CRS of the bounding box (e.g. EPSG:4326); defaults to the raster's
        #[arg(long)]
        crs: Option<String>,

        /// Resource index or name (defaults to the primary image)
        #[arg(short, long)]
        resource: Option<String>,

        /// Band to summarize and export
        #[arg(short, long, default_value = "0")]
        band: usize,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,

        /// Write the window as a GeoTIFF
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Bucket the cells of a raster window into a heatmap
    Heatmap {
        /// Raster name in the data directory, or a path to a GeoTIFF
        raster: String,

        /// Bounding box as min_x,min_y,max_x,max_y
        #[arg(long, allow_hyphen_values = true)]
        bbox: String,

        /// CRS of the bounding box (e.g. EPSG:4326); defaults to the raster's
        #[arg(long)]
        crs: Option<String>,

        /// Heatmap cell size in the raster's CRS units
        #[arg(long)]
        resolution: f64,

        /// How the values of a cell are combined
        #[arg(long, default_value_t = Reducer::Mean)]
        reducer: Reducer,

        /// Resource index or name (defaults to the primary image)
        #[arg(short, long)]
        resource: Option<String>,

        /// Band to aggregate
        #[arg(short, long, default_value = "0")]
        band: usize,

        /// Output file (.geojson, .json or .csv); prints a table if omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Colormap for GeoJSON output
        #[arg(long, default_value_t = Colormap::Jet)]
        colormap: Colormap,
    },

    /// Reduce the rasters dated within a period to one GeoTIFF
    ///
    /// Dates come from the file names (YYYY-MM, YYYY-MM-DD or YYYYMMDD).
    Composite {
        /// First day of the period (YYYY-MM-DD)
        #[arg(long)]
        from: NaiveDate,

        /// Last day of the period (YYYY-MM-DD), included
        #[arg(long)]
        to: NaiveDate,

        /// Bounding box as min_x,min_y,max_x,max_y; the full grid if omitted
        #[arg(long, allow_hyphen_values = true)]
        bbox: Option<String>,

        /// CRS of the bounding box; defaults to the oldest raster's
        #[arg(long)]
        crs: Option<String>,

        /// Band to combine
        #[arg(short, long, default_value = "0")]
        band: usize,

        /// How the values of a cell are combined
        #[arg(long, default_value_t = Reducer::Mean)]
        reducer: Reducer,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,

        /// Write the composite as a GeoTIFF
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a band index of a raster as a GeoTIFF
    Index {
        /// Raster name in the data directory, or a path to a GeoTIFF
        raster: String,

        /// Two bands a,b for (a - b) / (a + b), or four bands
        /// green,red,nir,swir for the water-masked urban index
        #[arg(long)]
        bands: String,

        /// NDWI/MNDWI above which a cell counts as water
        #[arg(long, default_value_t = UrbanIndex::DEFAULT_WATER_THRESHOLD)]
        water_threshold: f64,

        /// Resource index or name (defaults to the primary image)
        #[arg(short, long)]
        resource: Option<String>,

        /// Output GeoTIFF
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Bucket point samples from a file into a heatmap
    Aggregate {
        /// Input file (CSV or GeoJSON points)
        input: PathBuf,

        /// Heatmap cell size in the input's coordinate units
        #[arg(long)]
        resolution: f64,

        /// Column name for x (CSV only)
        #[arg(long, default_value = "x")]
        x_col: String,

        /// Column name for y (CSV only)
        #[arg(long, default_value = "y")]
        y_col: String,

        /// Column (CSV) or property (GeoJSON) holding the value
        #[arg(long, default_value = "value")]
        value_col: String,

        /// How the values of a cell are combined
        #[arg(long, default_value_t = Reducer::Mean)]
        reducer: Reducer,

        /// CRS of the input coordinates; GeoJSON output is then in WGS 84
        #[arg(long)]
        crs: Option<String>,

        /// Output file (.geojson, .json or .csv); prints a table if omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Colormap for GeoJSON output
        #[arg(long, default_value_t = Colormap::Jet)]
        colormap: Colormap,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let source = commands::Source {
        data_dir: cli.data_dir,
        extensions: cli.extensions,
        cache_size: cli.cache_size,
    };

    match cli.command {
        Commands::List => commands::list::run(&source),
        Commands::Info { raster, json } => commands::info::run(&source, &raster, json),
        Commands::Window {
            raster,
            bbox,
            crs,
            resource,
            band,
            json,
            output,
        } => commands::window::run(
            &source,
            commands::window::WindowArgs {
                raster,
                bbox,
                crs,
                resource,
                band,
                json,
                output,
            },
        ),
        Commands::Heatmap {
            raster,
            bbox,
            crs,
            resolution,
            reducer,
            resource,
            band,
            output,
            colormap,
        } => commands::heatmap::run(
            &source,
            commands::heatmap::HeatmapArgs {
                raster,
                bbox,
                crs,
                resolution,
                reducer,
                resource,
                band,
                output,
                colormap,
            },
        ),
        Commands::Composite {
            from,
            to,
            bbox,
            crs,
            band,
            reducer,
            json,
            output,
        } => commands::composite::run(
            &source,
            commands::composite::CompositeArgs {
                from,
                to,
                bbox,
                crs,
                band,
                reducer,
                json,
                output,
            },
        ),
        Commands::Index {
            raster,
            bands,
            water_threshold,
            resource,
            output,
        } => commands::index::run(
            &source,
            commands::index::IndexArgs {
                raster,
                bands,
                water_threshold,
                resource,
                output,
            },
        ),
        Commands::Aggregate {
            input,
            resolution,
            x_col,
            y_col,
            value_col,
            reducer,
            crs,
            output,
            colormap,
        } => commands::aggregate::run(commands::aggregate::AggregateArgs {
            input,
            resolution,
            x_col,
            y_col,
            value_col,
            reducer,
            crs,
            output,
            colormap,
        }),
    }
}
