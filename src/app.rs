//! The main application logic, decoupled from the entry point.

use crate::{
    api::{self, ApiServer, ApiState},
    config::{Config, FirebaseConfig, HttpConfig},
    core::{PushGateway, UserDirectory},
    credentials::{
        ServiceAccountKey, ServiceAccountTokenProvider, StaticTokenProvider, TokenProvider,
    },
    directory::FirestoreDirectory,
    dispatch::AlertDispatcher,
    gateway::FcmGateway,
    internal_metrics::{Metrics, MetricsBuilder},
    task_manager::TaskManager,
};
use anyhow::{bail, Context, Result};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, instrument};

/// A handle to the running application, containing all its task handles.
pub struct App {
    task_manager: TaskManager,
    api_addr: SocketAddr,
    metrics_addr: Option<SocketAddr>,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// The address the alert endpoint is bound to.
    pub fn api_addr(&self) -> SocketAddr {
        self.api_addr
    }

    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_addr
    }

    /// Waits for the shutdown signal and then gracefully shuts down all tasks.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.task_manager.get_shutdown_rx();
        // An error means every sender is gone; treat it as a shutdown request.
        let _ = shutdown_rx.changed().await;
        info!("Shutdown signal received. Waiting for tasks to complete...");

        self.task_manager.shutdown().await;

        info!("All tasks shut down.");
        Ok(())
    }
}

/// Builder for the main application.
///
/// This pattern separates constructing the application's components from
/// running them, and lets tests replace the Firebase-backed collaborators.
pub struct AppBuilder {
    config: Config,
    directory_override: Option<Arc<dyn UserDirectory>>,
    gateway_override: Option<Arc<dyn PushGateway>>,
    token_provider_override: Option<Arc<dyn TokenProvider>>,
    metrics_override: Option<Metrics>,
}

impl AppBuilder {
    /// Creates a new `AppBuilder` with the given configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            directory_override: None,
            gateway_override: None,
            token_provider_override: None,
            metrics_override: None,
        }
    }

    /// Overrides the user directory for testing.
    pub fn directory_override(mut self, directory: Arc<dyn UserDirectory>) -> Self {
        self.directory_override = Some(directory);
        self
    }

    /// Overrides the push gateway for testing.
    pub fn gateway_override(mut self, gateway: Arc<dyn PushGateway>) -> Self {
        self.gateway_override = Some(gateway);
        self
    }

    /// Overrides the access-token source used by the Firebase clients.
    pub fn token_provider_override(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider_override = Some(provider);
        self
    }

    /// Overrides the metrics system for testing.
    pub fn metrics_override(mut self, metrics: Metrics) -> Self {
        self.metrics_override = Some(metrics);
        self
    }

    /// Builds and initializes all application components, returning a runnable `App`.
    #[instrument(skip_all)]
    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let config = self.config;
        config.validate()?;
        let task_manager = TaskManager::new(shutdown_rx.clone());

        // =========================================================================
        // 1. Initialize Metrics
        // =========================================================================
        let (metrics, metrics_server_info) = match self.metrics_override {
            Some(m) => (m, None),
            None => {
                MetricsBuilder::new(config.metrics.clone())
                    .build(shutdown_rx.clone())
                    .await
            }
        };
        let metrics = Arc::new(metrics);

        let metrics_addr = if let Some((server, addr)) = metrics_server_info {
            info!("Metrics server listening on {}", addr);
            task_manager.spawn("MetricsServer", server.run());
            Some(addr)
        } else {
            None
        };

        // =========================================================================
        // 2. Firebase Clients
        // =========================================================================
        let (directory, gateway) = match (self.directory_override, self.gateway_override) {
            (Some(directory), Some(gateway)) => (directory, gateway),
            (directory_override, gateway_override) => {
                let client = build_http_client(&config.http)?;
                let (tokens, project_id) = match self.token_provider_override {
                    Some(tokens) => (tokens, required_project_id(&config.firebase, None)?),
                    None => connect_firebase(&config.firebase, client.clone())?,
                };
                info!("Firebase project: {}", project_id);

                let directory = directory_override.unwrap_or_else(|| {
                    Arc::new(FirestoreDirectory::new(
                        &config.directory,
                        &project_id,
                        tokens.clone(),
                        client.clone(),
                    ))
                });
                let gateway = gateway_override.unwrap_or_else(|| {
                    Arc::new(FcmGateway::new(&config.gateway, &project_id, tokens, client))
                });
                (directory, gateway)
            }
        };

        let dispatcher = Arc::new(AlertDispatcher::new(
            directory,
            gateway,
            config.dispatch.batch_size,
            metrics,
        ));

        // =========================================================================
        // 3. Start the API Server
        // =========================================================================
        let listener = TcpListener::bind(config.server.listen_address)
            .await
            .with_context(|| {
                format!("failed to bind API listener to {}", config.server.listen_address)
            })?;
        let api_addr = listener.local_addr()?;
        let router = api::router(ApiState::new(dispatcher));
        task_manager.spawn("ApiServer", ApiServer::new(listener, router, shutdown_rx).run());
        info!("Alert endpoint listening on http://{}{}", api_addr, api::ALERT_PATH);

        Ok(App {
            task_manager,
            api_addr,
            metrics_addr,
        })
    }
}

/// Builds the HTTP client shared by the token provider, directory and gateway.
pub fn build_http_client(config: &HttpConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = config.request_timeout_seconds {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder.build().context("failed to build HTTP client")
}

fn required_project_id(config: &FirebaseConfig, from_key: Option<&str>) -> Result<String> {
    match config.project_id.as_deref().or(from_key) {
        Some(project_id) if !project_id.is_empty() => Ok(project_id.to_string()),
        _ => bail!("no Firebase project id: set firebase.project_id or use a key file that names one"),
    }
}

/// Creates the token provider and resolves the project id from configuration.
///
/// A configured `access_token` takes precedence over a service-account key.
fn connect_firebase(
    config: &FirebaseConfig,
    client: reqwest::Client,
) -> Result<(Arc<dyn TokenProvider>, String)> {
    if let Some(token) = &config.access_token {
        let key_project = match &config.credentials_path {
            Some(path) => ServiceAccountKey::from_file(path)?.project_id,
            None => None,
        };
        let project_id = required_project_id(config, key_project.as_deref())?;
        return Ok((Arc::new(StaticTokenProvider::new(token.clone())), project_id));
    }

    let Some(path) = &config.credentials_path else {
        bail!("no Firebase credentials: set firebase.credentials_path or firebase.access_token");
    };
    let key = ServiceAccountKey::from_file(path)
        .with_context(|| format!("failed to load service account key {}", path.display()))?;
    let project_id = required_project_id(config, key.project_id.as_deref())?;
    info!("Using service account {}", key.client_email);
    let provider = ServiceAccountTokenProvider::new(key, client)?;
    Ok((Arc::new(provider), project_id))
}
