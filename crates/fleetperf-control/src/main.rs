//! Fleetperf Campaign Runner
//!
//! Single binary that runs:
//! - HTTP ingestion API for agent result pushes
//! - The device registry merge over the controller inventories
//! - The iteration loop: traffic cadence, counter sampling, completion
//!   barrier, and report-table projection

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use clap::Parser;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use fleetperf_common::ids::run_id;
use fleetperf_common::inventory::{AdbEntry, PortEntry, ResourceEntry};
use fleetperf_common::registry::DeviceRegistry;

use fleetperf_control::collector::Collector;
use fleetperf_control::sampler::IdleCounters;
use fleetperf_control::traffic::LogOnlyTraffic;
use fleetperf_control::{api, campaign, config, state};

fn load_inventory<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading inventory {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing inventory {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ─────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = config::Cli::parse();

    // ── Device registry ─────────────────────────────────────────
    let ports: Vec<PortEntry> = load_inventory(&cli.ports)?;
    let adb: Vec<AdbEntry> = load_inventory(&cli.adb)?;
    let resources: Vec<ResourceEntry> = load_inventory(&cli.resources)?;

    let registry = DeviceRegistry::build(&ports, &adb, &resources)
        .context("building device registry")?;
    let roster = registry.roster();

    let run_id = run_id();
    tracing::info!(
        run_id = %run_id,
        devices = roster.len(),
        classes = %registry.class_summary(),
        "fleetperf-control starting"
    );

    // ── Shared state ────────────────────────────────────────────
    let collector = Arc::new(Collector::new(cli.audit_log.as_deref()));
    let state = state::AppState::new(collector.clone(), run_id);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Ingestion server ────────────────────────────────────────
    let app = Router::new()
        .nest("/api", api::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr: SocketAddr = cli.listen.parse()?;
    tracing::info!("ingestion API listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let mut server_shutdown = shutdown_rx.clone();
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.changed().await;
            })
            .await
    });

    // ── Campaign ────────────────────────────────────────────────
    let campaign_cfg = cli.campaign();
    let campaign_collector = collector.clone();
    let campaign_shutdown = shutdown_rx.clone();
    let mut campaign_handle = tokio::spawn(async move {
        campaign::run(
            &campaign_cfg,
            &roster,
            &campaign_collector,
            Arc::new(LogOnlyTraffic::default()),
            Arc::new(IdleCounters),
            campaign_shutdown,
        )
        .await
    });

    let outcomes = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
            let _ = shutdown_tx.send(true);
            campaign_handle.await.context("campaign task failed")?
        }
        result = &mut campaign_handle => result.context("campaign task failed")?,
    };

    // ── Results ─────────────────────────────────────────────────
    let json = serde_json::to_string_pretty(&outcomes)?;
    std::fs::write(&cli.output, json)
        .with_context(|| format!("writing results {}", cli.output.display()))?;
    tracing::info!(
        iterations = outcomes.len(),
        output = %cli.output.display(),
        "campaign finished"
    );

    let _ = shutdown_tx.send(true);
    let _ = server_handle.await;

    Ok(())
}
