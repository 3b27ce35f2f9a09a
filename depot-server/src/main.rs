use anyhow::Context;
use depot_server::{
    Config, HttpInvoiceGateway, HttpSkuResolver, LogEmitter, MemoryPoolStore, NotificationWorker,
    RedbSessionStore, SessionManager, setup_environment,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_environment();

    tracing::info!("Depot fulfillment engine starting...");

    let config = Config::from_env();
    std::fs::create_dir_all(&config.work_dir)
        .with_context(|| format!("creating work dir {}", config.work_dir))?;

    let store = Arc::new(
        RedbSessionStore::open(config.session_db_path()).context("opening session database")?,
    );
    let gateway_timeout = Duration::from_millis(config.gateway_timeout_ms);
    let invoice_gateway = Arc::new(
        HttpInvoiceGateway::new(config.order_api_url.clone(), gateway_timeout)
            .context("building invoice gateway")?,
    );
    let sku_resolver = Arc::new(
        HttpSkuResolver::new(config.sku_api_url.clone(), gateway_timeout)
            .context("building sku resolver")?,
    );
    let pool_store = Arc::new(MemoryPoolStore::new());

    let (notifier, outbound) = depot_server::notify::channel(config.notify_queue_capacity);
    tokio::spawn(NotificationWorker::new(outbound, Arc::new(LogEmitter)).run());

    let manager = SessionManager::new(
        store,
        invoice_gateway,
        sku_resolver,
        pool_store,
        notifier,
        gateway_timeout,
        Duration::from_millis(config.pool_timeout_ms),
    );

    let active = manager.active_sessions().context("reading active sessions")?;
    tracing::info!(
        work_dir = %config.work_dir,
        active_sessions = active.len(),
        "Engine ready"
    );

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("Shutting down");
    Ok(())
}
