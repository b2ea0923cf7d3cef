use std::sync::Arc;

use slotwatch::config::ServiceConfig;
use slotwatch::db::StudioDbManager;
use slotwatch::server::create_router;
use slotwatch::types::WaitlistState;
use slotwatch::waitlist::run_daily;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::load_from_env()?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level())
        .init();

    info!(db_path = %config.db_path, "Opening studio database");
    let db = Arc::new(StudioDbManager::new(&config.db_path)?);
    let state = Arc::new(WaitlistState::new(db, config.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = if config.schedule.enabled {
        let schedule = config.daily_schedule();
        info!(
            hour = config.schedule.hour,
            minute = config.schedule.minute,
            "Daily waiting-list reconciliation enabled"
        );
        Some(tokio::spawn(run_daily(
            state.driver.clone(),
            schedule,
            shutdown_rx,
        )))
    } else {
        None
    };

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Listening on http://{}", address);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    if let Some(handle) = scheduler {
        handle.await?;
    }

    Ok(())
}
