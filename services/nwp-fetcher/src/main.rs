//! NWP forecast fetcher.
//!
//! Selects the latest finished icon-eu or cosmo-d2 run, retrieves every
//! regular-grid file of one feature from the DWD open-data archive with
//! reconnect-and-retry, and assembles the frames into a time stack.

mod config;
mod summary;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use forecast_stack::{CellValue, ForecastPipeline, ForecastStack, HttpArchive, Precision};
use half::f16;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use nwp_common::BoundingBox;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use config::{FetchConfig, RegionConfig};
use summary::ForecastSummary;

#[derive(Parser, Debug)]
#[command(name = "nwp-fetcher")]
#[command(about = "Fetch the latest NWP forecast run into a raster stack")]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "NWP_CONFIG")]
    config: Option<PathBuf>,

    /// Forecast model (icon-eu or cosmo-d2)
    #[arg(short, long)]
    model: Option<String>,

    /// Archive feature directory, e.g. tot_prec
    #[arg(short, long)]
    feature: Option<String>,

    /// Hours a run needs before its files are complete
    #[arg(long)]
    buffer_hours: Option<u32>,

    /// Cell precision (float16, float32, float64)
    #[arg(long)]
    precision: Option<String>,

    /// Crop region as "minlon,minlat,maxlon,maxlat"
    #[arg(long)]
    region: Option<String>,

    /// Archive root URL
    #[arg(long, env = "NWP_ARCHIVE_URL")]
    base_url: Option<String>,

    /// Write a JSON summary of the stack here
    #[arg(long)]
    summary_json: Option<PathBuf>,

    /// Write Prometheus metrics here on exit
    #[arg(long)]
    metrics_file: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn apply(&self, config: &mut FetchConfig) -> Result<()> {
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(feature) = &self.feature {
            config.feature = feature.clone();
        }
        if let Some(buffer_hours) = self.buffer_hours {
            config.buffer_hours = buffer_hours;
        }
        if let Some(precision) = &self.precision {
            config.precision = precision.clone();
        }
        if let Some(base_url) = &self.base_url {
            config.archive.base_url = base_url.clone();
        }
        if let Some(region) = &self.region {
            let bbox = BoundingBox::parse(region).context("Invalid --region")?;
            let buffer_cells = config.region.as_ref().map_or(1, |r| r.buffer_cells);
            config.region = Some(RegionConfig {
                min_lon: bbox.min_x,
                min_lat: bbox.min_y,
                max_lon: bbox.max_x,
                max_lat: bbox.max_y,
                buffer_cells,
            });
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    let mut config = match &args.config {
        Some(path) => FetchConfig::load(path)?,
        None => FetchConfig::default(),
    };
    args.apply(&mut config)?;

    // Everything is validated before the first connection
    let request = config.request()?;
    let precision = config.precision()?;
    let policy = config.retry_policy()?;
    let clipper = config.clipper()?;

    info!(
        model = %request.model,
        feature = %request.feature,
        buffer_hours = request.buffer_hours,
        precision = %precision,
        base_url = %config.archive.base_url,
        "Starting NWP fetcher"
    );

    let archive = HttpArchive::new(config.http_config())?;
    let mut pipeline = ForecastPipeline::new(archive, request).with_retry_policy(policy);
    if let Some(clipper) = clipper {
        info!(region = %clipper.region(), "Cropping frames to region");
        pipeline = pipeline.with_clipper(clipper);
    }

    let summary = match precision {
        Precision::Float16 => fetch::<f16>(&pipeline).await?,
        Precision::Float32 => fetch::<f32>(&pipeline).await?,
        Precision::Float64 => fetch::<f64>(&pipeline).await?,
    };

    if let Some(path) = &args.summary_json {
        summary.write(path)?;
        info!(path = %path.display(), "Wrote stack summary");
    }

    if let Some(path) = &args.metrics_file {
        write_metrics(&metrics, path)?;
    }

    Ok(())
}

async fn fetch<T: CellValue>(pipeline: &ForecastPipeline<HttpArchive>) -> Result<ForecastSummary> {
    let result: ForecastStack<T> = pipeline
        .run::<T>(Utc::now())
        .await
        .context("Forecast retrieval failed")?;

    metrics::gauge!("nwp_stack_depth").set(result.stack.depth() as f64);

    let timestamps = result.timestamps();
    info!(
        run = %result.run,
        depth = result.stack.depth(),
        shape = %result.stack.shape(),
        first = ?timestamps.first(),
        last = ?timestamps.last(),
        "Forecast stack ready"
    );

    Ok(ForecastSummary::from_stack(&result))
}

fn write_metrics(handle: &PrometheusHandle, path: &Path) -> Result<()> {
    std::fs::write(path, handle.render())
        .with_context(|| format!("Failed to write metrics: {}", path.display()))
}
