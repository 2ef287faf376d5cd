use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info, warn};

use gateway_sim::adapters::{CloudClient, MySqlRepository};
use gateway_sim::config::AppConfig;
use gateway_sim::service::supervisor::Supervisor;
use gateway_sim::state::rule_cache::RuleCache;
use gateway_sim::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Configuration first so LOG_LEVEL can feed the subscriber.
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:?}");
            std::process::exit(1);
        }
    };

    telemetry::init_logging(&config.log_level);
    info!("Starting gateway simulator");

    // 2. Metrics
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    builder
        .with_http_listener(([0, 0, 0, 0], 9000))
        .idle_timeout(
            metrics_util::MetricKindMask::ALL,
            Some(std::time::Duration::from_secs(60)),
        )
        .install()
        .expect("failed to install Prometheus recorder");
    info!("Prometheus metrics listening on 0.0.0.0:9000");

    // 3. Database (created and migrated if absent)
    let store = match MySqlRepository::connect(&config).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Failed to initialize database: {e:?}");
            std::process::exit(1);
        }
    };

    // 4. Rule cache, loaded once and read-only from here on
    let rules = match RuleCache::load(store.as_ref()).await {
        Ok(rules) => Arc::new(rules),
        Err(e) => {
            error!("Failed to load object rules: {e:?}");
            std::process::exit(1);
        }
    };

    // 5. Shared HTTP client toward the cloud
    if config.insecure_tls {
        warn!("TLS peer verification is disabled");
    }
    let cloud = match CloudClient::new(&config) {
        Ok(cloud) => Arc::new(cloud),
        Err(e) => {
            error!("Failed to create cloud client: {e:?}");
            std::process::exit(1);
        }
    };

    // 6. Supervisor loop
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let supervisor = Supervisor::new(store, cloud, rules, shutdown_rx);
    let supervisor_handle = tokio::spawn(supervisor.run());

    info!("Application started successfully");

    // 7. Graceful shutdown on SIGINT / SIGTERM
    wait_for_shutdown().await;
    info!("Shutdown signal received, exiting...");

    let _ = shutdown_tx.send(true);
    // In-flight requests finish under the client's 30 s timeout.
    match tokio::time::timeout(std::time::Duration::from_secs(35), supervisor_handle).await {
        Ok(_) => info!("Shutdown complete"),
        Err(_) => warn!("Timeout waiting for report drivers to stop"),
    }

    Ok(())
}

async fn wait_for_shutdown() {
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Unable to listen for shutdown signal: {e}");
            }
        }
        _ = sigterm.recv() => {}
    }
}
