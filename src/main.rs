//! alertcast - disaster alert dispatcher
//!
//! Serves `POST /send-disaster-alert/` and fans each alert out to the devices
//! registered in the requested city.

use alertcast::{api::ALERT_PATH, app::App, cli::Cli, config::Config};
use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = Config::load(&cli).unwrap_or_else(|err| {
        // Manually initialize logging for this specific error
        tracing_subscriber::fmt().init();
        error!("Failed to load configuration: {:#}", err);
        std::process::exit(1);
    });

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("alertcast {} starting up...", env!("CARGO_PKG_VERSION"));

    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("Listen Address: {}", config.server.listen_address);
    match (&config.firebase.access_token, &config.firebase.credentials_path) {
        (Some(_), _) => info!("Firebase Credentials: static access token"),
        (None, Some(path)) => info!("Firebase Credentials: {}", path.display()),
        (None, None) => info!("Firebase Credentials: Not configured"),
    }
    if let Some(project_id) = &config.firebase.project_id {
        info!("Firebase Project: {}", project_id);
    }
    info!("Firestore: {} ({})", config.directory.base_url, config.directory.database);
    info!(
        "User Collection: {} (city field: {}, token field: {})",
        config.directory.collection, config.directory.city_field, config.directory.token_field
    );
    info!("FCM: {}", config.gateway.base_url);
    info!("Max Concurrent Sends: {}", config.gateway.max_concurrent_sends);
    info!("Batch Size: {}", config.dispatch.batch_size);
    match config.http.request_timeout_seconds {
        Some(secs) => info!("HTTP Timeout: {}s", secs),
        None => info!("HTTP Timeout: none"),
    }
    info!(
        "Metrics: {}",
        if config.metrics.enabled {
            config.metrics.listen_address.to_string()
        } else {
            "Disabled".to_string()
        }
    );
    info!("-------------------------------------------------------");

    // =========================================================================
    // Create Shutdown Channel
    // =========================================================================
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let app = match App::builder(config).build(shutdown_rx).await {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to start: {:#}", e);
            std::process::exit(1);
        }
    };
    info!(
        "alertcast initialized. Accepting alerts on http://{}{}",
        app.api_addr(),
        ALERT_PATH
    );

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
        }
        info!("Ctrl-C received, sending shutdown signal.");
        let _ = shutdown_tx.send(true);
    });

    app.run().await
}
