use std::sync::Arc;

use anyhow::Context;
use tokio::{signal, sync::mpsc};
use tracing::{error, info};

use glowcart_api as api;
use glowcart_api::handlers::AppServices;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);

    let db = api::db::connect(&cfg).await.context("database connection failed")?;
    api::db::ensure_schema(&db)
        .await
        .context("schema bootstrap failed")?;
    let db = Arc::new(db);

    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = api::events::EventSender::new(event_tx);
    tokio::spawn(api::events::process_events(event_rx));

    let settlement = Arc::new(api::services::settlement::SettlementService::new(
        db.clone(),
        event_sender.clone(),
        cfg.shipping.clone(),
        cfg.pending_payment_ttl(),
    ));
    let carts = Arc::new(api::services::carts::CartService::new(db.clone()));
    let gateway = Arc::new(api::gateway::VnpayGateway::new(cfg.vnpay.clone()));

    api::services::reclaimer::spawn(
        db.clone(),
        cfg.reclaim.interval_secs,
        cfg.reclaim_grace(),
        cfg.pending_payment_ttl(),
        event_sender.clone(),
    );

    let state = api::AppState {
        db,
        config: cfg.clone(),
        event_sender,
        services: AppServices {
            settlement,
            carts,
            gateway,
        },
    };

    let app = api::app_router(state);
    let addr = cfg.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("GlowCart API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!("Server error: {}", e);
            anyhow::anyhow!(e)
        })?;

    info!("Server shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
