mod dispatcher;
mod problem;
mod router;
mod service;
mod telemetry;
#[cfg(test)]
mod testing;

use std::{net::SocketAddr, sync::Arc};

use tracing::{info, warn};
use url::Url;

use registry_events::HttpEventPublisher;
use registry_storage::Database;
use registry_util::{load_env_file, AppConfig};

use crate::dispatcher::RetryPolicy;
use crate::service::CompanyService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let database = Database::connect(&config.database_url).await?;
    database.run_migrations().await?;
    info!(stage = "storage", url = %config.database_url, "database ready");

    let endpoint = Url::parse(&config.events_endpoint)?;
    let http = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()?;
    let publisher = HttpEventPublisher::new(endpoint, http);
    info!(stage = "events", endpoint = %publisher.endpoint(), "event publisher configured");

    let retry = RetryPolicy::new(config.notify_max_retries, config.notify_base_delay);
    let service = CompanyService::new(Arc::new(database.companies()), Arc::new(publisher), retry);
    let dispatcher = service.dispatcher().clone();
    info!(
        stage = "dispatcher",
        max_retries = dispatcher.policy().max_retries,
        base_delay_ms = dispatcher.policy().base_delay.as_millis() as u64,
        "notification dispatcher ready"
    );

    let state = router::AppState::new(metrics, service, config.request_timeout);

    let addr: SocketAddr = config.bind_addr;
    info!(stage = "app", %addr, env = %config.environment.as_str(), "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(
        stage = "app",
        pending = dispatcher.in_flight(),
        "server stopped, draining notifications"
    );
    if !dispatcher.shutdown(config.shutdown_timeout).await {
        warn!(stage = "app", "some notifications were abandoned during shutdown");
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(stage = "app", error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(stage = "app", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!(stage = "app", "shutdown signal received");
}
