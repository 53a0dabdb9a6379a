//! Core domain types and service traits for alertcast
//!
//! This module defines the fundamental data structures and the trait
//! contracts for the two external collaborators: the user directory that
//! holds device tokens, and the push gateway that delivers notifications.

use crate::directory::DirectoryError;
use crate::gateway::GatewayError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The maximum number of messages the push gateway accepts in one bulk call.
pub const MAX_BATCH_SIZE: usize = 500;

/// A disaster alert to be pushed to every device registered in a city.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AlertRequest {
    /// The city to target, matched exactly and case-sensitively.
    pub city: String,
    /// Notification title shown on the device.
    pub title: String,
    /// Notification body shown on the device.
    pub body: String,
}

impl AlertRequest {
    pub fn new(city: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            title: title.into(),
            body: body.into(),
        }
    }
}

/// The result of one dispatch, serialized as the endpoint's JSON body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status")]
pub enum DispatchOutcome {
    /// No usable device token was found for the city.
    #[serde(rename = "No users found in this city")]
    NoRecipients,
    /// All batches were handed to the gateway.
    #[serde(rename = "Notifications sent")]
    Sent {
        /// Sum of individually successful deliveries across batches.
        success_count: usize,
    },
    /// The directory or the gateway failed.
    #[serde(rename = "Error")]
    Failed { message: String },
}

impl DispatchOutcome {
    /// A short label used for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            DispatchOutcome::NoRecipients => "no_recipients",
            DispatchOutcome::Sent { .. } => "sent",
            DispatchOutcome::Failed { .. } => "error",
        }
    }
}

/// A user document as seen by this service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct UserRecord {
    /// The document identifier, when the directory exposes one.
    pub id: Option<String>,
    pub city: Option<String>,
    /// The device registration token. `None` when absent, null or not a string.
    pub fcm_token: Option<String>,
}

impl UserRecord {
    /// Returns the token only if it is present and non-empty.
    pub fn usable_token(&self) -> Option<&str> {
        self.fcm_token.as_deref().filter(|token| !token.is_empty())
    }
}

/// A single notification addressed to one device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushMessage {
    pub token: String,
    pub title: String,
    pub body: String,
}

/// The gateway's verdict for one message of a bulk call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendResponse {
    /// Accepted by the provider; carries the provider's message id.
    Delivered { message_id: String },
    /// Rejected for this token only.
    Rejected { error: String },
}

impl SendResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, SendResponse::Delivered { .. })
    }
}

/// Per-message results of one bulk call, in submission order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchResponse {
    pub responses: Vec<SendResponse>,
}

impl BatchResponse {
    pub fn new(responses: Vec<SendResponse>) -> Self {
        Self { responses }
    }

    pub fn success_count(&self) -> usize {
        self.responses.iter().filter(|r| r.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.responses.len() - self.success_count()
    }
}

// =============================================================================
// Service Traits
// =============================================================================

/// Read access to the external store of user documents.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Returns every record whose city field equals `city` exactly.
    ///
    /// # Returns
    /// * `Ok(Vec<UserRecord>)`, possibly empty
    /// * `Err` for transport, authorization or decoding failures
    async fn find_by_city(&self, city: &str) -> Result<Vec<UserRecord>, DirectoryError>;
}

/// Bulk submission of notifications to devices.
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Sends every message in one logical bulk call.
    ///
    /// # Arguments
    /// * `messages` - At most [`MAX_BATCH_SIZE`] messages
    ///
    /// # Returns
    /// * `Ok(BatchResponse)` with one result per message, in order
    /// * `Err` if the call as a whole failed (network, credentials, oversize)
    async fn send_all(&self, messages: &[PushMessage]) -> Result<BatchResponse, GatewayError>;
}
