use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use courier_relay::api;
use courier_relay::chat::broker::{Broker, HttpBroker};
use courier_relay::config::Config;
use courier_relay::engine::location_reaper::run_location_reaper;
use courier_relay::error::AppError;
use courier_relay::state::AppState;
use courier_relay::store::{InMemoryMessageStore, MessageStore, SqliteMessageStore};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let store: Arc<dyn MessageStore> = match &config.database_url {
        Some(url) => {
            tracing::info!("using sqlite message store");
            Arc::new(SqliteMessageStore::connect(url).await?)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; chat history and purge schedules are in-memory only");
            Arc::new(InMemoryMessageStore::new())
        }
    };

    if config.broker_api_url.is_none() {
        tracing::warn!("CENTRIFUGO_API_URL not set; chat sends will fail to relay");
    }
    if config.jwt_secret.is_none() {
        tracing::warn!("JWT_SECRET not set; authenticated routes will be rejected");
    }

    let broker: Arc<dyn Broker> = Arc::new(HttpBroker::new(
        config.broker_api_url.clone(),
        config.broker_api_key.clone(),
        config.relay_timeout,
    )?);

    let shared_state = Arc::new(AppState::new(&config, store, broker));

    match shared_state.retention.resume().await {
        Ok(count) => tracing::info!(count, "chat purge schedules restored"),
        Err(err) => tracing::error!(error = %err, "failed to restore chat purge schedules"),
    }

    tokio::spawn(run_location_reaper(
        shared_state.locations.clone(),
        config.location_sweep_interval,
        config.location_ttl,
    ));

    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
