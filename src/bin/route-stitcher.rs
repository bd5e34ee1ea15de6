//! route-stitcher CLI - rebuild a trip's route from fragmented session logs
//!
//! Usage:
//!   route-stitcher aggregate <path> [--trip <uuid>] [--format text|json|geojson] [--audit]
//!   route-stitcher fetch <uuid>... [--format ...]        (requires the `http` feature)
//!
//! `<path>` is a log-search response exported as JSON, or a folder of them.
//! Backend credentials and link base are read from the environment or a
//! `.env` file: LOG_API_KEY, LOG_APP_KEY, LOG_API_URL, LOG_LINK_BASE.

use std::error::Error;
use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use route_stitcher::records::trips_in;
use route_stitcher::{
    AggregationConfig, AuditReport, FileLogSource, FragmentBatch, TripSummary, UnifiedRoute,
};
use serde_json::json;
use uuid::Uuid;

const DEFAULT_LINK_BASE: &str = "https://app.datadoghq.com/logs";

#[derive(Parser)]
#[command(name = "route-stitcher")]
#[command(about = "Rebuild a delivery trip's GPS route from fragmented session logs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Seconds between fragment starts above which a gap is drawn
    #[arg(long, global = true, default_value_t = 300.0)]
    gap_threshold: f64,

    /// Per-axis degrees under which seam waypoints are the same point
    #[arg(long, global = true, default_value_t = 1e-5)]
    tolerance: f64,

    /// Maximum fragments kept per trip
    #[arg(long, global = true, default_value_t = route_stitcher::MAX_FRAGMENTS)]
    max_fragments: usize,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Include the per-fragment audit
    #[arg(long, global = true)]
    audit: bool,

    /// Enable verbose debug output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate trips from exported log-search JSON
    Aggregate {
        /// JSON file or folder of JSON files
        path: PathBuf,

        /// Only aggregate this trip
        #[arg(short, long)]
        trip: Option<Uuid>,
    },

    /// Fetch trips from the log backend and aggregate them
    #[cfg(feature = "http")]
    Fetch {
        /// Trip ids
        #[arg(required = true)]
        trips: Vec<Uuid>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Geojson,
}

fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format(|buf, record| writeln!(buf, "[{:5}] {}", record.level(), record.args()))
        .init();

    let config = AggregationConfig {
        gap_threshold_secs: cli.gap_threshold,
        coordinate_tolerance_deg: cli.tolerance,
    };
    let link_base = std::env::var("LOG_LINK_BASE").unwrap_or_else(|_| DEFAULT_LINK_BASE.to_string());

    let batches: Vec<FragmentBatch> = match &cli.command {
        Commands::Aggregate { path, trip } => {
            let source = FileLogSource::new(path, link_base).with_cap(cli.max_fragments);
            let records = source.load_records()?;

            let trips = match trip {
                Some(t) => vec![*t],
                None => trips_in(&records),
            };
            info!("Aggregating {} trip(s) from {}", trips.len(), path.display());

            trips
                .into_iter()
                .map(|t| source.batch_from_records(&records, t))
                .collect()
        }
        #[cfg(feature = "http")]
        Commands::Fetch { trips } => fetch_batches(trips.clone(), link_base, cli.max_fragments)?,
    };

    #[cfg(feature = "parallel")]
    let routes = route_stitcher::aggregate_trips_parallel(&batches, &config);
    #[cfg(not(feature = "parallel"))]
    let routes = route_stitcher::aggregate_trips(&batches, &config);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut values = Vec::new();

    for (batch, result) in batches.iter().zip(routes) {
        let route = match result {
            Ok(route) => route,
            Err(e) => {
                warn!("Skipping trip with no usable fragments: {}", e);
                continue;
            }
        };
        let audit = cli.audit.then(|| AuditReport::build(&route, &batch.fragments));

        match cli.format {
            OutputFormat::Text => write!(out, "{}", render_text(&route, batch, audit.as_ref()))?,
            OutputFormat::Json => values.push(json!({
                "summary": TripSummary::from_fragments(&batch.fragments, &batch.status),
                "route": route,
                "audit": audit,
            })),
            OutputFormat::Geojson => values.push(route_stitcher::to_geojson(&route)),
        }
    }

    if cli.format != OutputFormat::Text {
        let value = if values.len() == 1 {
            values.swap_remove(0)
        } else {
            serde_json::Value::Array(values)
        };
        writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
    }

    Ok(())
}

fn render_text(route: &UnifiedRoute, batch: &FragmentBatch, audit: Option<&AuditReport>) -> String {
    let mut text = String::new();
    if let Some(summary) = TripSummary::from_fragments(&batch.fragments, &batch.status) {
        text.push_str(&format!("{}\n", summary));
    }
    text.push_str(&format!(
        "  {} segment(s), {} gap(s), {} canonical waypoint(s), {:.0}m, complete: {}\n",
        route.segments.len(),
        route.gap_count(),
        route.total_waypoint_count(),
        route.distance_meters(),
        route.is_complete
    ));
    for message in &batch.status.failure_messages {
        text.push_str(&format!("  failed: {}\n", message));
    }
    if let Some(audit) = audit {
        text.push_str(&format!("{}\n", audit));
    }
    text
}

#[cfg(feature = "http")]
fn fetch_batches(
    trips: Vec<Uuid>,
    link_base: String,
    max_fragments: usize,
) -> Result<Vec<FragmentBatch>, Box<dyn Error>> {
    use route_stitcher::{LogSearchClient, LogSearchConfig};

    let mut config = LogSearchConfig {
        api_key: std::env::var("LOG_API_KEY")?,
        app_key: std::env::var("LOG_APP_KEY")?,
        link_base,
        page_limit: max_fragments,
        ..LogSearchConfig::default()
    };
    if let Ok(url) = std::env::var("LOG_API_URL") {
        config.api_url = url;
    }

    let client = LogSearchClient::new(config)?;
    let rt = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let mut results = rt.block_on(client.fetch_trips(trips.clone(), None));

    // Completion order is arbitrary; report in the order asked for
    results.sort_by_key(|(trip, _)| trips.iter().position(|t| t == trip));

    let mut batches = Vec::with_capacity(results.len());
    for (trip, result) in results {
        match result {
            Ok(batch) => batches.push(batch),
            Err(e) => warn!("Trip {}: fetch failed: {}", trip, e),
        }
    }
    Ok(batches)
}
