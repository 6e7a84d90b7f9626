//! Station console.
//!
//! Operator tool for the dock station service: one-shot commands for scripts
//! (`login`, `health`, `stations`, `get`) and `browse`, an interactive map
//! session driven from the terminal.

mod commands;
mod config;
mod terminal;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use map_sync::{SessionEnd, StationMap, SyncMetrics};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use station_client::{HttpStationRepository, Session, StationRepository};
use station_common::{GeoPoint, StationId};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use commands::{ConsoleCommand, HELP};
use config::ConsoleConfig;
use terminal::{lock_view, SharedView, TerminalSurface};

#[derive(Parser, Debug)]
#[command(name = "station-console")]
#[command(about = "Operator console for the dock station service")]
struct Args {
    /// YAML configuration file (client and sync sections)
    #[arg(short, long, env = "STATION_CONSOLE_CONFIG")]
    config: Option<PathBuf>,

    /// Station service API root, overriding the configuration
    #[arg(long, env = "STATION_API_URL")]
    api_url: Option<String>,

    #[arg(short, long, env = "STATION_USERNAME")]
    username: Option<String>,

    #[arg(short, long, env = "STATION_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Log level, used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check the credentials and print the signed-in operator
    Login,
    /// Check that the station service is up
    Health,
    /// List stations around a position
    Stations {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Search radius in km, clamped to the service limits
        #[arg(short, long, default_value_t = 5)]
        radius: i64,
    },
    /// Show one station
    Get { id: i64 },
    /// Interactive map session
    Browse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args.log_level, args.log_format)?;

    let mut config = ConsoleConfig::load(args.config.as_deref())?;
    if let Some(url) = &args.api_url {
        config.client.base_url = url.clone();
    }
    info!(base_url = %config.client.base_url, "Loaded configuration");

    let repo = Arc::new(HttpStationRepository::new(
        config.client.clone(),
        Session::new(),
    )?);

    match args.command {
        Command::Health => {
            let health = repo.health().await.context("Health check failed")?;
            match health.message {
                Some(message) => println!("{}: {}", health.status, message),
                None => println!("{}", health.status),
            }
        }
        Command::Login => {
            let credential = sign_in(repo.as_ref(), &args.username, &args.password).await?;
            println!("Signed in as {}", credential.username);
        }
        Command::Stations { lat, lon, radius } => {
            let center = GeoPoint::new(lat, lon);
            center.validate()?;
            sign_in(repo.as_ref(), &args.username, &args.password).await?;
            let radius_km = config.client.radius_range.clamp(radius);
            let stations = repo.query_stations(center, radius_km).await?;

            println!("{} stations within {} km of {}", stations.len(), radius_km, center);
            for station in stations {
                println!(
                    "  {:>5}  {:<20} {:<32} {:>3} docks  {}",
                    station.id,
                    station.code.as_deref().unwrap_or("-"),
                    station.name,
                    station.capacity,
                    station
                        .distance_km
                        .map(|d| format!("{:.2} km", d))
                        .unwrap_or_default()
                );
            }
        }
        Command::Get { id } => {
            sign_in(repo.as_ref(), &args.username, &args.password).await?;
            let station = repo.get_station(StationId(id)).await?;
            println!("{} ({})", station.name, station.id);
            println!("  Code: {}", station.code.as_deref().unwrap_or("-"));
            println!("  Position: {}", station.position());
            println!("  Capacity: {} bikes", station.capacity);
            println!(
                "  Address: {}",
                station.address.as_deref().unwrap_or("not provided")
            );
        }
        Command::Browse => {
            let prometheus = PrometheusBuilder::new()
                .install_recorder()
                .context("Failed to install Prometheus recorder")?;
            sign_in(repo.as_ref(), &args.username, &args.password).await?;
            browse(repo, &config, &prometheus).await?;
        }
    }

    Ok(())
}

fn init_tracing(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level: {}", level))?;

    // Logs go to stderr so they do not interleave with the map on stdout
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|e| anyhow!(e))
}

async fn sign_in<R: StationRepository>(
    repo: &R,
    username: &Option<String>,
    password: &Option<String>,
) -> Result<station_client::Credential> {
    let (Some(username), Some(password)) = (username, password) else {
        bail!("Credentials required: pass --username/--password or set STATION_USERNAME/STATION_PASSWORD");
    };
    repo.login(username, password)
        .await
        .with_context(|| format!("Failed to sign in as {}", username))
}

/// Run the interactive map until logout, session expiry, `quit` or end of input.
async fn browse(
    repo: Arc<HttpStationRepository>,
    config: &ConsoleConfig,
    prometheus: &PrometheusHandle,
) -> Result<()> {
    let view = SharedView::default();
    let map = StationMap::new(
        repo,
        TerminalSurface::new(Arc::clone(&view)),
        config.sync.clone(),
    );
    let metrics = map.metrics();
    let (events, rx) = mpsc::channel(32);
    let mut map_task = tokio::spawn(map.run(rx));

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let ended = loop {
        tokio::select! {
            end = &mut map_task => break Some(end.context("Station map task failed")?),
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read from stdin")? else {
                    break None;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let command = match line.parse::<ConsoleCommand>() {
                    Ok(command) => command,
                    Err(e) => {
                        println!("{}", e);
                        continue;
                    }
                };

                match command {
                    ConsoleCommand::Quit => break None,
                    ConsoleCommand::Help => println!("{}", HELP),
                    ConsoleCommand::List => {
                        for entry in lock_view(&view).listing() {
                            println!("{}", entry);
                        }
                    }
                    ConsoleCommand::Stats => print_stats(&metrics, prometheus),
                    command => {
                        let event = command.to_event(&lock_view(&view));
                        match event {
                            Some(event) => {
                                if events.send(event).await.is_err() {
                                    warn!("Station map stopped, input ignored");
                                }
                            }
                            None => println!("Nothing on screen for '{}'", line),
                        }
                    }
                }
            }
        }
    };

    let end = match ended {
        Some(end) => end,
        None => {
            drop(events);
            map_task.await.context("Station map task failed")?
        }
    };

    match end {
        SessionEnd::LoggedOut => println!("Logged out"),
        SessionEnd::Revoked => println!("Session expired, sign in again"),
        SessionEnd::Closed => println!("Bye"),
    }
    Ok(())
}

fn print_stats(metrics: &SyncMetrics, prometheus: &PrometheusHandle) {
    match serde_yaml::to_string(&metrics.snapshot()) {
        Ok(snapshot) => print!("{}", snapshot),
        Err(e) => warn!(error = %e, "Failed to render metrics snapshot"),
    }
    println!("{}", prometheus.render());
}
