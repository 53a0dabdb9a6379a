//! Configuration management for alertcast
//!
//! This module defines the main `Config` struct and its sub-structs,
//! responsible for holding all application settings. It uses the `figment`
//! crate to layer built-in defaults, an `alertcast.toml` file, environment
//! variables and command-line flags, in that order of precedence.

use crate::cli::Cli;
use crate::core::MAX_BATCH_SIZE;
use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// The configuration file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "alertcast.toml";

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// The logging level for the application.
    pub log_level: String,
    /// Configuration for the HTTP API listener.
    pub server: ServerConfig,
    /// Firebase project and credentials.
    pub firebase: FirebaseConfig,
    /// Configuration for the Firestore user directory.
    pub directory: DirectoryConfig,
    /// Configuration for the FCM push gateway.
    pub gateway: GatewayConfig,
    /// Configuration for alert dispatching.
    pub dispatch: DispatchConfig,
    /// Settings shared by all outbound HTTP clients.
    pub http: HttpConfig,
    /// Configuration for the Prometheus metrics endpoint.
    pub metrics: MetricsConfig,
}

/// Configuration for the HTTP API listener.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerConfig {
    /// The address the alert endpoint listens on.
    pub listen_address: SocketAddr,
}

/// Firebase project and credentials.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct FirebaseConfig {
    /// Path to a Google service-account JSON key.
    pub credentials_path: Option<PathBuf>,
    /// Project id. Defaults to the `project_id` of the service-account key.
    pub project_id: Option<String>,
    /// A fixed bearer token used instead of a service account, e.g. `owner`
    /// for the Firebase emulators.
    pub access_token: Option<String>,
}

/// Configuration for the Firestore user directory.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DirectoryConfig {
    /// Base URL of the Firestore REST API.
    pub base_url: String,
    /// The Firestore database id.
    pub database: String,
    /// The collection holding user documents.
    pub collection: String,
    /// The document field matched against the requested city.
    pub city_field: String,
    /// The document field holding the device token.
    pub token_field: String,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://firestore.googleapis.com".to_string(),
            database: "(default)".to_string(),
            collection: "users".to_string(),
            city_field: "city".to_string(),
            token_field: "fcmToken".to_string(),
        }
    }
}

/// Configuration for the FCM push gateway.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GatewayConfig {
    /// Base URL of the FCM HTTP v1 API.
    pub base_url: String,
    /// How many messages of one batch may be in flight at once.
    pub max_concurrent_sends: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://fcm.googleapis.com".to_string(),
            max_concurrent_sends: 100,
        }
    }
}

/// Configuration for alert dispatching.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DispatchConfig {
    /// Number of messages per gateway call, between 1 and 500.
    pub batch_size: usize,
}

/// Settings shared by all outbound HTTP clients.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct HttpConfig {
    /// Optional per-request timeout. No timeout is applied when unset.
    pub request_timeout_seconds: Option<u64>,
}

/// Configuration for the Prometheus metrics endpoint.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MetricsConfig {
    /// Whether to install the Prometheus recorder and serve `/metrics`.
    pub enabled: bool,
    /// The address the metrics endpoint listens on.
    pub listen_address: SocketAddr,
}

impl Config {
    /// Loads the application configuration.
    ///
    /// Sources are merged in increasing order of precedence: built-in
    /// defaults, the TOML file named by `--config` (or `alertcast.toml` if
    /// present), `ALERTCAST_`-prefixed environment variables with `__`
    /// separating nested keys (e.g. `ALERTCAST_DISPATCH__BATCH_SIZE=100`),
    /// and finally command-line flags.
    pub fn load(cli: &Cli) -> Result<Self> {
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("ALERTCAST_").split("__"))
            .merge(cli.clone())
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that would break the gateway's batch limit.
    pub fn validate(&self) -> Result<()> {
        if self.dispatch.batch_size == 0 || self.dispatch.batch_size > MAX_BATCH_SIZE {
            bail!(
                "dispatch.batch_size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE,
                self.dispatch.batch_size
            );
        }
        if self.gateway.max_concurrent_sends == 0 {
            bail!("gateway.max_concurrent_sends must be at least 1");
        }
        Ok(())
    }
}

// Provide a default implementation for tests and easy setup.
impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            server: ServerConfig {
                listen_address: SocketAddr::from(([0, 0, 0, 0], 8000)),
            },
            firebase: FirebaseConfig::default(),
            directory: DirectoryConfig::default(),
            gateway: GatewayConfig::default(),
            dispatch: DispatchConfig {
                batch_size: MAX_BATCH_SIZE,
            },
            http: HttpConfig::default(),
            metrics: MetricsConfig {
                enabled: false,
                listen_address: SocketAddr::from(([127, 0, 0, 1], 9090)),
            },
        }
    }
}
