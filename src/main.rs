mod config;
mod context;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use config::PlatformConfig;
use context::AppContext;

/// Builds the config, wires every collaborator into an `AppContext`, and
/// keeps the process alive until asked to stop. No HTTP router runs here —
/// dispatching a method and path to one of `ocasino_api`'s handler functions
/// is a collaborator this binary does not implement.
#[tokio::main]
async fn main() {
    let config = PlatformConfig::parse();
    init_tracing(&config.rust_log);

    let app = match AppContext::build(&config).await {
        Ok(app) => app,
        Err(e) => {
            tracing::error!(error = %e, "failed to build platform context");
            std::process::exit(1);
        }
    };

    tracing::info!(
        ip_enforcement = config.allowed_ip_enforcement,
        rate_limit = config.default_rate_limit,
        event_workers = config.event_worker_count,
        "ocasino platform ready"
    );

    // Keep the composed context (and its background event workers, spawned
    // inside EventBus::new) alive until the process is asked to stop. A real
    // deployment hands `app.api` to whatever implements the router instead.
    let _app = app;
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}

fn init_tracing(directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
