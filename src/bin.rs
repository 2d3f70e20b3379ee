//! Binary entry point for `activity-feed`.
//!
//! This module provides the command-line interface for activity-feed with options
//! for configuration file paths and logging verbosity. It initializes the
//! necessary components and starts the service.

use activity_feed::base::{
    config::{Config, load_dotenv},
    types::Void,
};
use clap::Parser;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::{Protocol, WithExportConfig};
use tracing::warn;
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt};

/// Activity-feed – a GitHub webhook receiver with a polling activity API.
///
/// Configuration can come from `config.toml`, a `.env` file, or environment
/// variables prefixed with `ACTIVITY_FEED_`.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Override the config file path (optional).
    ///
    /// By default, the service will look for a config file at `.hidden/config.toml`
    /// in the current directory.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,
    /// Increase log verbosity (-v, -vv, etc.).
    ///
    /// Use multiple times to increase verbosity:
    /// - No flag: INFO level
    /// - -v: DEBUG level
    /// - -vv or more: TRACE level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Export spans over OTLP/HTTP (endpoint from `OTEL_EXPORTER_OTLP_ENDPOINT`).
    #[arg(long)]
    otlp: bool,
}

/// Main entry point for the activity-feed binary.
///
/// Sets up logging based on verbosity, loads configuration, and starts the server.
#[tokio::main]
async fn main() -> Void {
    let args = Args::parse();

    // Load `.env` first so `OTEL_*` variables reach the exporter; report failures once logging is up.
    let dotenv = load_dotenv(None);

    // Construct the level filter.

    let level = match args.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    let level_filter = tracing_subscriber::filter::LevelFilter::from_level(level);

    // Prepare the log layer.

    let stdout = tracing_subscriber::fmt::layer()
        .with_ansi(true)
        .with_level(true)
        .with_file(false)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_span_events(FmtSpan::CLOSE);

    // Prepare the otlp layer.

    let otel = if args.otlp {
        let exporter = opentelemetry_otlp::SpanExporter::builder().with_http().with_protocol(Protocol::HttpBinary).build()?;
        let tracer = opentelemetry_sdk::trace::SdkTracerProvider::builder().with_simple_exporter(exporter).build().tracer("activity-feed");
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry().with(otel).with(level_filter).with(stdout).init();

    if let Err(err) = dotenv {
        warn!("Failed to load `.env`: {:#}", err);
    }

    let config = Config::load(args.config.as_deref())?;

    activity_feed::start(config).await
}
