use anyhow::Context as _;
use std::sync::Arc;
use tokio::net::TcpListener;
use tunnel_health::config::Config;
use tunnel_health::health::{CertificateChecker, HealthRegistry, TunnelConnectionChecker};
use tunnel_health::logging::{init_tracing, Field, Logger};
use tunnel_health::server::{
    create_metrics, serve, wait_for_signal, ServerState, ShutdownCoordinator, TaskComponent,
};

/// Register the built-in checkers
fn register_checkers(registry: &HealthRegistry, config: &Config) {
    registry.register(Arc::new(CertificateChecker::new(config.cert_file.clone())));
    registry.register(Arc::new(TunnelConnectionChecker::new(
        config.min_connections,
    )));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    init_tracing(&config.logging);
    let logger = Logger::from_config(&config.logging);

    logger.info(
        "Starting tunnel health server",
        &[
            Field::new("address", config.metrics_addr.to_string()),
            Field::new("shutdown_timeout", config.shutdown_timeout),
        ],
    );

    let metrics = create_metrics().context("Failed to create metrics registry")?;

    // Not ready until every component is up
    let registry = Arc::new(HealthRegistry::new());
    register_checkers(&registry, &config);

    let mut coordinator = ShutdownCoordinator::new(
        Arc::clone(&registry),
        config.shutdown_timeout,
        logger.clone(),
    )
    .with_metrics(metrics.clone());

    let listener = TcpListener::bind(config.metrics_addr).await.map_err(|e| {
        logger.fatal(
            "Failed to bind health server",
            &[
                Field::new("address", config.metrics_addr.to_string()),
                Field::error(&e),
            ],
        )
    })?;
    let state = ServerState::new(Arc::clone(&registry), metrics, config.check_timeout);
    let http = TaskComponent::spawn("http", move |signal| serve(listener, state, signal));
    coordinator.register(Arc::new(http));

    registry.set_ready(true);
    logger.info(
        "Ready to receive traffic",
        &[Field::new("checkers", registry.checker_names().join(","))],
    );

    let signal = wait_for_signal().await.map_err(|e| {
        logger.fatal(
            "Failed to register signal handlers",
            &[Field::error(&e)],
        )
    })?;
    logger.info(
        "Shutdown signal received, initiating graceful shutdown",
        &[Field::new("signal", signal)],
    );

    let report = coordinator.drain().await.unwrap_or_default();
    match report.into_result() {
        Ok(()) => {
            logger.info("Graceful shutdown completed", &[]);
            Ok(())
        }
        Err(e) => {
            logger.error("Graceful shutdown incomplete", &[Field::error(&e)]);
            Err(e.into())
        }
    }
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
