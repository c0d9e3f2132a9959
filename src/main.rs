use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;

use meteomap::download::{Downloader, ProviderConfig};
use meteomap::gradient::Gradient;
use meteomap::model::{load_locations, Location};
use meteomap::projection::BoundingBox;
use meteomap::render::legend::LegendLayout;
use meteomap::render::text::{TextPainter, Typeface};
use meteomap::render::{save_png, MapSpec, RenderSettings, Renderer};
use meteomap::weather::ObservationQuery;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the output directory
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Output width in pixels
    #[arg(long, default_value_t = 1200)]
    width: u32,

    /// Output height in pixels
    #[arg(long, default_value_t = 800)]
    height: u32,

    /// Zoom level of the tile mosaic fallback
    #[arg(short, long, default_value_t = 8)]
    zoom: u32,

    /// Map region as "lon_min,lat_min,lon_max,lat_max" (defaults to the Balearic Islands)
    #[arg(short, long)]
    bbox: Option<BoundingBox>,

    /// TrueType font for labels (defaults to the first system font found)
    #[arg(short, long)]
    font: Option<PathBuf>,

    /// JSON file with the locations to annotate
    #[arg(short, long)]
    locations: Option<PathBuf>,

    /// JSON file with the color stops of the temperature palette
    #[arg(short, long)]
    palette: Option<PathBuf>,

    /// User agent sent to the map and weather services
    #[arg(long)]
    user_agent: Option<String>,

    /// Static map endpoint
    #[arg(long)]
    static_url: Option<String>,

    /// Tile URL template with {z}, {x} and {y} placeholders
    #[arg(long)]
    tile_url: Option<String>,

    /// Forecast endpoint
    #[arg(long)]
    weather_url: Option<String>,

    /// Timezone for daily values
    #[arg(long)]
    timezone: Option<String>,

    /// Pause between tile downloads, in milliseconds
    #[arg(long, default_value_t = 200)]
    tile_delay_ms: u64,

    /// Fold labels to plain ASCII, for fonts without accented letters
    #[arg(long)]
    ascii_labels: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render current temperatures
    Current {
        /// Output filename
        #[arg(long, default_value = "mapa_baleares_openmeteo.png")]
        output: String,
    },

    /// Render today's minimum and maximum temperatures as two maps
    MinMax {
        /// Output filename for the minimum map
        #[arg(long, default_value = "mapa_baleares_min.png")]
        min_output: String,

        /// Output filename for the maximum map
        #[arg(long, default_value = "mapa_baleares_max.png")]
        max_output: String,
    },
}

impl Cli {
    fn provider_config(&self) -> ProviderConfig {
        let mut config = ProviderConfig::default();
        if let Some(user_agent) = &self.user_agent {
            config.user_agent = user_agent.clone();
        }
        if let Some(url) = &self.static_url {
            config.static_url = url.clone();
        }
        if let Some(url) = &self.tile_url {
            config.tile_url = url.clone();
        }
        if let Some(url) = &self.weather_url {
            config.weather_url = url.clone();
        }
        if let Some(timezone) = &self.timezone {
            config.timezone = timezone.clone();
        }
        config
    }

    fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            bbox: self.bbox.unwrap_or_else(BoundingBox::balearic_islands),
            width: self.width,
            height: self.height,
            zoom: self.zoom,
            tile_delay: Duration::from_millis(self.tile_delay_ms),
        }
    }
}

fn main() -> Result<()> {
    // Initialize logger
    env_logger::init();

    let cli = Cli::parse();

    std::fs::create_dir_all(&cli.output_dir)
        .context("Failed to create output directory")?;

    let downloader = Downloader::new(cli.provider_config())
        .context("Failed to create HTTP client")?;

    let gradient = match &cli.palette {
        Some(path) => Gradient::from_json_file(path)
            .with_context(|| format!("Failed to load palette {}", path.display()))?,
        None => Gradient::temperature(),
    };
    let legend = match &cli.palette {
        Some(_) => LegendLayout::from_gradient(&gradient),
        None => LegendLayout::temperature(),
    };

    let custom_locations: Option<Vec<Location>> = match &cli.locations {
        Some(path) => Some(load_locations(path)
            .with_context(|| format!("Failed to load locations {}", path.display()))?),
        None => None,
    };

    let typeface = Typeface::discover(cli.font.as_deref());
    if typeface.is_none() && cli.font.is_some() {
        warn!("Continuing without the requested font");
    }
    let painter = TextPainter::new(typeface, cli.ascii_labels);

    let settings = cli.render_settings();
    let renderer =
        Renderer::new(&downloader, &downloader, &painter, &gradient, settings).with_legend(legend);

    let now = chrono::Local::now();
    let mut jobs = Vec::new();
    match &cli.command {
        Commands::Current { output } => {
            jobs.push((MapSpec::current(&now), output.as_str()));
        }
        Commands::MinMax { min_output, max_output } => {
            jobs.push((MapSpec::daily(ObservationQuery::DailyMin, &now), min_output.as_str()));
            jobs.push((MapSpec::daily(ObservationQuery::DailyMax, &now), max_output.as_str()));
        }
    }

    for (spec, output) in jobs {
        let spec = match &custom_locations {
            Some(locations) => spec.with_locations(locations.clone()),
            None => spec,
        };
        render_to_file(&renderer, &spec, &cli.output_dir.join(output))?;
    }

    Ok(())
}

fn render_to_file(renderer: &Renderer<'_>, spec: &MapSpec, path: &Path) -> Result<()> {
    info!("Rendering \"{}\"", spec.title);
    let (image, report) = renderer.render(spec)
        .with_context(|| format!("Failed to render {}", spec.title))?;

    save_png(&image, path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!(
        "{}: {} badges drawn, {} skipped, {} off the map, {} without data ({:?})",
        path.display(),
        report.accepted.len(),
        report.rejected.len(),
        report.off_canvas.len(),
        report.missing,
        report.source
    );
    Ok(())
}
