//! beacon-gateway: WebSocket and console front ends for the Beacon
//! conversation engine.
//!
//! Both adapters drive the same turn loop: a message goes in, assistant
//! text streams back as it arrives, and the final reply carries the
//! results of every command the assistant invoked.

mod cli;
mod connection;
mod console;
mod engine;
mod protocol;

use std::path::Path;
use std::time::Duration;

use beacon_common::BeaconError;
use beacon_config::BeaconConfig;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::cli::{Args, Command};
use crate::connection::handle_connection;

fn load_config(args: &Args) -> Result<BeaconConfig, BeaconError> {
    let config = match &args.config {
        Some(path) => beacon_config::load_config_from(Path::new(path))?,
        None => beacon_config::load_config()?,
    };
    Ok(config)
}

/// `RUST_LOG` wins, then `--log-level`, then the config file.
fn init_logging(cli_level: Option<&str>, config: &BeaconConfig) {
    let fallback = cli_level.unwrap_or(config.logging.level.as_directive());
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    let args = cli::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("beacon-gateway: {e}");
            std::process::exit(1);
        }
    };
    init_logging(args.log_level.as_deref(), &config);

    if let Some(ref path) = args.config {
        tracing::info!("Using config override: {path}");
    }

    let command = args.command.clone().unwrap_or(Command::Serve { port: None });
    let result = match command {
        Command::Serve { port } => serve(&config, port).await,
        Command::Chat => chat(&config).await,
        Command::Config => {
            println!("{}", beacon_config::config_to_json(&config));
            Ok(())
        }
        Command::Tools => print_tools(&config),
    };

    if let Err(e) = result {
        tracing::error!("{e}");
        eprintln!("beacon-gateway: {e}");
        std::process::exit(1);
    }
}

async fn serve(config: &BeaconConfig, port: Option<u16>) -> Result<(), BeaconError> {
    let orchestrator = engine::build_orchestrator(config)?;

    let addr = format!("{}:{}", config.gateway.bind, port.unwrap_or(config.gateway.port));
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("beacon-gateway listening on {}", addr);

    let shutdown = CancellationToken::new();
    let reaper = engine::spawn_reaper(
        orchestrator.clone(),
        Duration::from_secs(config.session.reap_interval_secs),
        shutdown.clone(),
    );

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let orchestrator = orchestrator.clone();
                    tokio::spawn(async move {
                        match accept_async(stream).await {
                            Ok(ws) => handle_connection(ws, addr, orchestrator).await,
                            Err(e) => {
                                tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                            }
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "TCP accept error");
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    shutdown.cancel();
    let _ = reaper.await;
    Ok(())
}

async fn chat(config: &BeaconConfig) -> Result<(), BeaconError> {
    let orchestrator = engine::build_orchestrator(config)?;
    console::run_chat(orchestrator).await
}

fn print_tools(config: &BeaconConfig) -> Result<(), BeaconError> {
    let tools: Vec<serde_json::Value> = engine::build_registry(config)
        .definitions()
        .iter()
        .map(|def| def.to_function_tool())
        .collect();
    let json = serde_json::to_string_pretty(&tools).map_err(|e| BeaconError::Other(e.to_string()))?;
    println!("{json}");
    Ok(())
}
