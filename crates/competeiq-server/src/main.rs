mod api;
mod middleware;
mod scheduler;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use competeiq_pipeline::Pipeline;
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = competeiq_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let watchlist = competeiq_core::load_watchlist(&config.watchlist_path)?;
    tracing::info!(
        env = %config.env,
        watchlist = %config.watchlist_path.display(),
        competitors = watchlist.competitors.len(),
        sources = watchlist.sources.len(),
        rules = watchlist.rules.len(),
        "watchlist loaded"
    );

    let pipeline = Arc::new(Pipeline::from_config(&config, watchlist)?);
    let _scheduler = scheduler::build_scheduler(Arc::clone(&pipeline)).await?;

    let auth = AuthState::new(&config.api_keys, config.env.is_development())?;
    let app = build_app(AppState { pipeline }, auth, default_rate_limit_state());

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "competeiq-server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
