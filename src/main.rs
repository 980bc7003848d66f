mod client;
mod config;
mod tracker;

use clap::{Parser, Subcommand};
use std::fs;
use std::process::ExitCode;
use tokio::sync::oneshot;

use crate::client::{
    FileStore, GeoJsonRenderer, HeadingStore, HttpSource, LogRenderer, MemoryStore, PollingClient,
    Renderer, ViewMode,
};
use crate::config::{Config, OutputKind};
use crate::tracker::{decode_history, heading};

#[derive(Parser)]
#[command(name = "drone-o-mat")]
#[command(about = "Drone position tracking client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a config file
    Validate { config: String },
    /// Follow one drone with its path
    Follow { config: String, call_sign: String },
    /// Show every configured drone
    Fleet { config: String },
    /// Estimate the heading of a saved history response
    Heading { history: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => validate(&config),
        Commands::Follow { config, call_sign } => follow(&config, call_sign).await,
        Commands::Fleet { config } => fleet(&config).await,
        Commands::Heading { history } => estimate_heading(&history),
    }
}

fn load_config(path: &str) -> Option<Config> {
    match Config::from_file(path) {
        Ok(c) => Some(c),
        Err(e) => {
            eprintln!("Error loading config {}: {}", path, e);
            None
        }
    }
}

fn validate(path: &str) -> ExitCode {
    let Some(config) = load_config(path) else {
        return ExitCode::FAILURE;
    };

    println!("Config is valid ({} entities)", config.entities.len());
    println!("  backend: {}", config.server.base_url);
    println!(
        "  poll: every {} (fleet every {})",
        humantime::format_duration(config.poll.interval),
        humantime::format_duration(config.poll.fleet_interval)
    );
    for call_sign in &config.entities {
        println!("  - {}", call_sign);
    }
    ExitCode::SUCCESS
}

async fn follow(path: &str, call_sign: String) -> ExitCode {
    let Some(config) = load_config(path) else {
        return ExitCode::FAILURE;
    };
    if !config.tracks(&call_sign) {
        log::warn!("{} is not listed in {}", call_sign, path);
    }
    let interval = config.poll.interval;
    poll(&config, ViewMode::Follow, interval, vec![call_sign]).await
}

async fn fleet(path: &str) -> ExitCode {
    let Some(config) = load_config(path) else {
        return ExitCode::FAILURE;
    };
    let interval = config.poll.fleet_interval;
    let entities = config.entities.clone();
    poll(&config, ViewMode::Fleet, interval, entities).await
}

async fn poll(
    config: &Config,
    mode: ViewMode,
    interval: std::time::Duration,
    entities: Vec<String>,
) -> ExitCode {
    let source = match HttpSource::new(config.server.base_url.clone(), config.server.timeout) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error creating HTTP client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let store: Box<dyn HeadingStore> = match &config.headings.path {
        Some(path) => match FileStore::open(path.clone()) {
            Ok(s) => Box::new(s),
            Err(e) => {
                eprintln!("Error opening heading store {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => Box::new(MemoryStore::default()),
    };

    let renderer: Box<dyn Renderer> = match (config.output.kind, &config.output.path) {
        (OutputKind::Geojson, Some(path)) => Box::new(GeoJsonRenderer::new(path.clone())),
        _ => Box::new(LogRenderer),
    };

    let tracked = entities.clone();
    let mut client = PollingClient::new(source, renderer, store, mode, interval, entities);
    if let Some(center) = config.map.center() {
        client.set_view(center, config.map.zoom);
    }

    let (stop_tx, stop_rx) = oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupted, stopping");
        }
        let _ = stop_tx.send(());
    });

    let client = client.run(stop_rx).await;
    for call_sign in &tracked {
        if let Some(state) = client.entity(call_sign) {
            log::info!(
                "{}: last applied {:?}, last heading {:?}",
                call_sign,
                state.last_applied_ms,
                state.last_heading
            );
        }
    }
    ExitCode::SUCCESS
}

fn estimate_heading(path: &str) -> ExitCode {
    let body = match fs::read(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error reading file: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut history = match decode_history(&body) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("Parse error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    history.sort_by_key(|s| s.timestamp_ms);

    let Some(latest) = history.last() else {
        eprintln!("History is empty");
        return ExitCode::FAILURE;
    };

    let resolved = heading::resolve(&history, None);
    println!("{} samples", history.len());
    match latest.position {
        Some(p) => println!("  latest: {:.6}, {:.6} @ {}", p.lat, p.lng, latest.timestamp_ms),
        None => println!("  latest: no position @ {}", latest.timestamp_ms),
    }
    println!("  heading: {:.1}° ({:?})", resolved.degrees, resolved.source);
    ExitCode::SUCCESS
}
