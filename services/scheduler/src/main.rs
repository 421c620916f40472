//! corral scheduler
//!
//! Registers with the resource manager, launches queued commands on offered
//! resources and serves the admin API.
//!
//! ## Architecture
//!
//! - **Admin server**: axum router on `CORRAL_LISTEN_ADDR`
//! - **Session loop**: subscribes, dispatches events, reconnects with backoff

use std::sync::Arc;

use anyhow::{Context, Result};
use corral_scheduler::{
    api::{create_router, AppState},
    client::{CallSender, SchedulerClient},
    config::Config,
    dispatcher::Dispatcher,
    engine::Engine,
    offers::OfferPolicy,
    queue::command_queue,
    scheduler::{BackoffPolicy, Scheduler},
    state::StateStore,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        master_url = %config.master_url,
        listen_addr = %config.listen_addr,
        state_dir = %config.state_dir.display(),
        "Starting corral scheduler"
    );

    // Load persisted state before subscribing
    let store = StateStore::new(&config.state_dir);
    let engine = Arc::new(
        Engine::load(store, config.default_framework_info())
            .context("Failed to load scheduler state")?,
    );

    let (commands, pending) = command_queue(config.queue_capacity);

    let client = Arc::new(
        SchedulerClient::new(config.scheduler_endpoint(), Arc::clone(&engine))
            .context("Failed to build HTTP client")?,
    );
    let sender: Arc<dyn CallSender> = client.clone();

    let offers = OfferPolicy::new(pending, config.task_resources)
        .with_refuse_seconds(config.decline_refuse_secs);
    let dispatcher = Dispatcher::new(Arc::clone(&engine), Arc::clone(&sender), offers);
    let mut scheduler = Scheduler::new(Arc::clone(&engine), client, dispatcher);

    // Start the admin server
    let app = create_router(AppState::new(Arc::clone(&engine), commands, sender));
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "Admin API listening");
    let server_handle = tokio::spawn(async move { axum::serve(listener, app).await });

    // Session loop
    let session_loop = async move {
        let backoff = BackoffPolicy::default();
        let mut attempt: u32 = 0;
        loop {
            let ended = scheduler.run_session().await;
            if ended.was_subscribed() {
                attempt = 0;
            }
            let delay = backoff.delay(attempt);
            warn!(
                error = %ended,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Session ended, reconnecting"
            );
            attempt = attempt.saturating_add(1);
            tokio::time::sleep(delay).await;
        }
    };

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Admin server exited"),
                Ok(Err(e)) => error!(error = %e, "Admin server error"),
                Err(e) => error!(error = %e, "Admin server task panicked"),
            }
        }
        _ = session_loop => {}
    }

    info!("Scheduler shutdown complete");
    Ok(())
}
