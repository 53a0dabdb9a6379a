#![allow(dead_code)]
//! Test helpers for running the full application instance.

use alertcast::{
    app::App,
    config::Config,
    core::{PushGateway, UserDirectory},
    credentials::TokenProvider,
    internal_metrics::Metrics,
};
use anyhow::Result;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinHandle, time::timeout};

/// Represents a running instance of the application for testing purposes.
#[derive(Debug)]
pub struct TestApp {
    pub shutdown_tx: watch::Sender<bool>,
    pub app_handle: Option<JoinHandle<Result<()>>>,
    api_addr: SocketAddr,
    metrics_addr: Option<SocketAddr>,
}

impl TestApp {
    pub fn api_addr(&self) -> SocketAddr {
        self.api_addr
    }

    pub fn metrics_addr(&self) -> SocketAddr {
        self.metrics_addr
            .expect("Metrics must be enabled to get the address")
    }

    /// The full URL of `path` on the running API server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.api_addr, path)
    }

    /// Shuts down the application and waits for it to terminate.
    /// Fails if the application does not shut down within the specified timeout.
    pub async fn shutdown(self, timeout_duration: Duration) -> Result<()> {
        self.shutdown_tx
            .send(true)
            .expect("Failed to send shutdown signal");

        if let Some(handle) = self.app_handle {
            match timeout(timeout_duration, handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => Err(e.into()),
                Err(_) => Err(anyhow::anyhow!("App failed to shut down within the timeout")),
            }
        } else {
            Ok(())
        }
    }
}

/// A builder for creating `TestApp` instances with specific configurations.
pub struct TestAppBuilder {
    pub config: Config,
    directory: Option<Arc<dyn UserDirectory>>,
    gateway: Option<Arc<dyn PushGateway>>,
    token_provider: Option<Arc<dyn TokenProvider>>,
    enable_metrics: bool,
}

impl TestAppBuilder {
    pub fn new() -> Self {
        let mut config = Config::default();
        // Bind to an ephemeral port so tests can run in parallel.
        config.server.listen_address = "127.0.0.1:0".parse().unwrap();
        config.metrics.enabled = false;

        Self {
            config,
            directory: None,
            gateway: None,
            token_provider: None,
            enable_metrics: false,
        }
    }

    pub fn with_directory(mut self, directory: Arc<dyn UserDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn PushGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn with_token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    /// Installs the Prometheus recorder and serves `/metrics` on an ephemeral
    /// port. The recorder is process-global, so at most one app per test
    /// binary may enable it.
    pub fn with_metrics(mut self) -> Self {
        self.enable_metrics = true;
        self.config.metrics.enabled = true;
        self.config.metrics.listen_address = "127.0.0.1:0".parse().unwrap();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.config.dispatch.batch_size = batch_size;
        self
    }

    /// Builds and starts the application, returning a handle to it.
    pub async fn start(self) -> Result<TestApp> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut builder = App::builder(self.config);
        if !self.enable_metrics {
            builder = builder.metrics_override(Metrics::disabled());
        }
        if let Some(directory) = self.directory {
            builder = builder.directory_override(directory);
        }
        if let Some(gateway) = self.gateway {
            builder = builder.gateway_override(gateway);
        }
        if let Some(provider) = self.token_provider {
            builder = builder.token_provider_override(provider);
        }

        let app = builder.build(shutdown_rx).await?;
        let api_addr = app.api_addr();
        let metrics_addr = app.metrics_addr();
        let app_handle = tokio::spawn(app.run());

        Ok(TestApp {
            shutdown_tx,
            app_handle: Some(app_handle),
            api_addr,
            metrics_addr,
        })
    }
}
