mod bootstrap;
mod chat;
mod health;

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use flowmaster_core::config::{AppConfig, LoadOptions};
use tokio::sync::Notify;

/// `RUST_LOG` refines the configured level when set.
fn init_logging(config: &AppConfig) {
    use flowmaster_core::config::LogFormat::*;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);

    match config.logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging needs the loaded config, so it starts before anything else can log.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let router = chat::router(chat::ChatState::new(app.runtime.clone(), app.employees.clone()))
        .merge(health::router(health::HealthState::new(
            app.db_pool.clone(),
            app.runtime.has_chat_provider(),
        )));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "flowmaster-server listening"
    );

    let stop = Arc::new(Notify::new());
    let stop_signal = stop.clone();
    let mut server = tokio::spawn(
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { stop_signal.notified().await })
            .into_future(),
    );

    tokio::select! {
        finished = &mut server => {
            finished??;
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!(
                event_name = "system.server.stopping",
                correlation_id = "shutdown",
                "flowmaster-server stopping"
            );
            stop.notify_one();

            let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
            match tokio::time::timeout(grace, server).await {
                Ok(finished) => finished??,
                Err(_) => tracing::warn!(
                    event_name = "system.server.shutdown_timeout",
                    correlation_id = "shutdown",
                    grace_secs = grace.as_secs(),
                    "in-flight requests did not finish before the shutdown window closed"
                ),
            }
        }
    }

    app.db_pool.close().await;
    Ok(())
}
