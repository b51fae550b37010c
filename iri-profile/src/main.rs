//! iri-profile - Ionospheric profile retrieval CLI
//!
//! Subcommands:
//! - `profile`: retrieve one altitude profile and print it as JSON
//! - `series`: aggregate a time/coordinate series sampled at each timestep's altitude
//!
//! Configuration is resolved CLI → `IRI_PROFILE_CONFIG` → platform config dir
//! → compiled defaults. Logging goes through `tracing`; `RUST_LOG` overrides
//! the configured level.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use iri_common::config::{load_config, TomlConfig};
use iri_common::time::{format_calendar, parse_calendar};
use iri_profile::{
    ClientSettings, CoordinateFrame, PrecomputedGeographic, ProfileParser, QueryParameters,
    Quantity, RemoteModelClient, SeriesAggregator, SeriesEvent,
};
use iri_profile::session::WebDriverFactory;
use ndarray::Array2;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for iri-profile
#[derive(Parser, Debug)]
#[command(name = "iri-profile")]
#[command(about = "Retrieve IRI ionospheric profiles and aggregate time series")]
#[command(version)]
struct Args {
    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// WebDriver endpoint (overrides config)
    #[arg(long, global = true, env = "IRI_PROFILE_WEBDRIVER")]
    webdriver: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Retrieve one profile
    Profile {
        /// Observation time, RFC 3339 or `YYYY-mm-dd HH:MM:SS` (UT)
        #[arg(long, value_parser = parse_time)]
        time: DateTime<Utc>,

        /// Latitude (deg)
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude (deg)
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Coordinate frame: geographic/geog or geomagnetic/geom
        #[arg(long, default_value = "geographic")]
        frame: CoordinateFrame,

        /// Lowest altitude (km)
        #[arg(long)]
        min_alt: Option<f64>,

        /// Highest altitude (km)
        #[arg(long)]
        max_alt: Option<f64>,

        /// Altitude step (km)
        #[arg(long)]
        step: Option<f64>,

        /// Keep the raw report at this path instead of printing JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Aggregate a series from a JSON file
    Series {
        /// `{ "times": [...], "coordinates": [[alt_km, lat, lon], ...] }`
        #[arg(short, long)]
        input: PathBuf,

        /// Altitude resolution of each retrieved profile (km)
        #[arg(long)]
        step: Option<f64>,
    },
}

/// Series input file
#[derive(Debug, Deserialize)]
struct SeriesInput {
    /// Unix seconds (UT)
    times: Vec<f64>,
    coordinates: Vec<[f64; 3]>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("iri_profile={0},iri_common={0}", config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting iri-profile v{}", env!("CARGO_PKG_VERSION"));

    let webdriver = args
        .webdriver
        .clone()
        .unwrap_or_else(|| config.service.webdriver_url.clone());
    debug!("WebDriver endpoint: {}", webdriver);

    let factory = WebDriverFactory::new(webdriver, config.service.browser_args.clone())
        .context("Failed to build WebDriver client")?;
    let client = RemoteModelClient::new(factory, client_settings(&config));

    match args.command {
        Command::Profile {
            time,
            lat,
            lon,
            frame,
            min_alt,
            max_alt,
            step,
            output,
        } => {
            let retrieval = &config.retrieval;
            let keep_raw = output.is_some();
            let destination = output.unwrap_or_else(|| retrieval.scratch_file.clone());
            let params = QueryParameters::new(time, lon, lat, destination.clone())
                .with_altitude_grid(
                    min_alt.unwrap_or(retrieval.min_alt_km),
                    max_alt.unwrap_or(retrieval.max_alt_km),
                    step.unwrap_or(retrieval.step_alt_km),
                )
                .with_model_version(retrieval.model_version.clone())
                .with_frame(frame);

            let raw = client
                .run(params, retrieval.max_retries)
                .await
                .context("Profile retrieval failed")?;

            if keep_raw {
                info!("Raw report kept at {}", destination.display());
                return Ok(());
            }

            let parsed = ProfileParser::new().try_parse(&raw);
            if let Err(e) = tokio::fs::remove_file(&destination).await {
                debug!(error = %e, "Scratch file not removed");
            }
            let table = parsed.context("Profile parse failed")?;

            let mut columns = Map::new();
            for quantity in Quantity::ALL {
                columns.insert(quantity.label().to_string(), json!(table.column(quantity)));
            }
            let out = json!({
                "time": format_calendar(&table.observation_time),
                "time_unix": table.observation_unix(),
                "columns": Value::Object(columns),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }

        Command::Series { input, step } => {
            let text = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let series: SeriesInput = serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse {}", input.display()))?;
            let flat: Vec<f64> = series.coordinates.iter().flatten().copied().collect();
            let coordinates = Array2::from_shape_vec((series.coordinates.len(), 3), flat)
                .context("Coordinate array shape")?;

            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
            let display = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    if let SeriesEvent::Skipped { index, altitude_km } = event {
                        info!(index, altitude_km, "Skipped: above service ceiling");
                    }
                }
            });

            let aggregator = SeriesAggregator::new(
                client,
                PrecomputedGeographic,
                config.retrieval.scratch_file.clone(),
            )
            .with_max_retries(config.retrieval.max_retries)
            .with_model_version(config.retrieval.model_version.clone())
            .with_events(tx);

            let result = aggregator
                .aggregate(
                    &series.times,
                    coordinates.view(),
                    step.unwrap_or(config.retrieval.step_alt_km),
                )
                .await;
            drop(aggregator);
            let _ = display.await;

            let table = result.context("Series aggregation failed")?;
            println!("{}", serde_json::to_string_pretty(&table)?);
        }
    }

    Ok(())
}

fn client_settings(config: &TomlConfig) -> ClientSettings {
    ClientSettings {
        base_url: config.service.base_url.clone(),
        timeout: Duration::from_secs(config.retrieval.timeout_secs),
        ..ClientSettings::default()
    }
}

fn parse_time(text: &str) -> std::result::Result<DateTime<Utc>, String> {
    text.parse::<DateTime<Utc>>()
        .or_else(|_| parse_calendar(text))
        .map_err(|e| e.to_string())
}
