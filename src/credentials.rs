//! Access tokens for the Firestore and FCM REST APIs.
//!
//! Google APIs accept OAuth2 bearer tokens. A service-account key is turned
//! into a short-lived token by signing a JWT assertion and exchanging it at
//! the key's `token_uri`. Tokens are cached and shared by every request until
//! shortly before they expire.

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// OAuth scopes needed to query Firestore and send through FCM.
pub const FIREBASE_SCOPES: &str =
    "https://www.googleapis.com/auth/datastore https://www.googleapis.com/auth/firebase.messaging";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error("failed to read credentials file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed service account key: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid service account private key: {0}")]
    InvalidKey(#[source] jsonwebtoken::errors::Error),

    #[error("token request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("token endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// The fields of a Google service-account JSON key that this service uses.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub project_id: Option<String>,
    pub private_key: String,
    pub client_email: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

// The private key never reaches the logs.
impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    /// Parses a key from its JSON text.
    pub fn from_json(json: &str) -> Result<Self, CredentialsError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a key file.
    pub fn from_file(path: &Path) -> Result<Self, CredentialsError> {
        let json = std::fs::read_to_string(path).map_err(|source| CredentialsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }
}

/// Supplies bearer tokens for outbound API calls.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, CredentialsError>;
}

/// Hands out a fixed token. Used against the Firebase emulators and in tests.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String, CredentialsError> {
        Ok(self.token.clone())
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Mints and caches access tokens from a service-account key.
pub struct ServiceAccountTokenProvider {
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    client: reqwest::Client,
    cache: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokenProvider {
    /// Creates a provider, rejecting keys whose PEM cannot be parsed.
    pub fn new(key: ServiceAccountKey, client: reqwest::Client) -> Result<Self, CredentialsError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(CredentialsError::InvalidKey)?;
        Ok(Self {
            key,
            encoding_key,
            client,
            cache: Mutex::new(None),
        })
    }

    pub fn key(&self) -> &ServiceAccountKey {
        &self.key
    }

    fn sign_assertion(&self) -> Result<String, CredentialsError> {
        let iat = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: FIREBASE_SCOPES,
            aud: &self.key.token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(CredentialsError::InvalidKey)
    }

    #[instrument(skip(self), fields(client_email = %self.key.client_email))]
    async fn fetch_token(&self) -> Result<CachedToken, CredentialsError> {
        let assertion = self.sign_assertion()?;
        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialsError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(3600));
        info!(expires_in_secs = lifetime.as_secs(), "Obtained access token");
        Ok(CachedToken {
            token: token.access_token,
            expires_at: Instant::now() + lifetime,
        })
    }
}

#[async_trait]
impl TokenProvider for ServiceAccountTokenProvider {
    async fn access_token(&self) -> Result<String, CredentialsError> {
        // Holding the lock across the refresh makes concurrent callers wait
        // for a single token exchange.
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.expires_at > Instant::now() + REFRESH_MARGIN {
                return Ok(cached.token.clone());
            }
            debug!("Cached access token is about to expire, refreshing");
        }

        let fresh = self.fetch_token().await?;
        let token = fresh.token.clone();
        *cache = Some(fresh);
        Ok(token)
    }
}
