//! Peopole server entry point.
//!
//! Startup sequence:
//! 1. Parse CLI arguments and load the config file
//! 2. Initialize tracing
//! 3. Apply environment and CLI overrides
//! 4. Open the JSON stores and assemble the chat relay
//! 5. Spawn the session sweep task
//! 6. Serve the axum API until ctrl-c

mod cli;

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use peopole_api::{start_server, AppState};
use peopole_core::config::PeopoleConfig;

use crate::cli::CliArgs;

/// Evict idle chat sessions every `every`.
async fn sweep_loop(state: AppState, every: Duration) {
    tracing::info!(interval_secs = every.as_secs(), "Session sweep started");

    let mut interval = tokio::time::interval(every);
    // The first tick completes immediately.
    interval.tick().await;
    loop {
        interval.tick().await;
        let removed = state.relay.sessions().sweep();
        let active = state.relay.sessions().len();
        if removed > 0 {
            tracing::info!(removed, active, "Expired chat sessions swept");
        } else {
            tracing::debug!(active, "Session sweep found nothing to evict");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config is read before tracing exists so its log level can be used;
    // a load failure is reported once the subscriber is installed.
    let config_path = args.resolve_config_path();
    let loaded = if config_path.exists() {
        Some(PeopoleConfig::load(&config_path))
    } else {
        None
    };
    let mut config = match &loaded {
        Some(Ok(config)) => config.clone(),
        _ => PeopoleConfig::default(),
    };
    config.apply_env_overrides();
    args.apply_to(&mut config);

    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting Peopole v{}", env!("CARGO_PKG_VERSION"));
    match loaded {
        Some(Ok(_)) => {
            tracing::info!(path = %config_path.display(), "Configuration loaded")
        }
        Some(Err(e)) => tracing::warn!(
            path = %config_path.display(),
            error = %e,
            "Failed to load config, using defaults"
        ),
        None => tracing::info!(
            path = %config_path.display(),
            "No config file, using defaults"
        ),
    }

    let state = match AppState::open(config.clone()).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize application state");
            return Err(e.into());
        }
    };
    if state.admin_token.is_none() {
        tracing::warn!("ADMIN_TOKEN not set; the admin API is disabled");
    }

    // === Background tasks ===

    let sweep_every =
        Duration::from_secs(u64::from(config.session.sweep_interval_minutes.max(1)) * 60);
    tokio::spawn(sweep_loop(state.clone(), sweep_every));

    // === API server ===

    if let Err(e) = start_server(&config, state).await {
        tracing::error!(error = %e, "Server failed");
        return Err(e.into());
    }

    Ok(())
}
