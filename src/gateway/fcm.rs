//! A `PushGateway` for Firebase Cloud Messaging (HTTP v1 API).
//!
//! The v1 API addresses one device per request, so a bulk call fans the batch
//! out over `messages:send` with bounded concurrency and gathers the
//! per-message results back in submission order.

use super::GatewayError;
use crate::config::GatewayConfig;
use crate::core::{BatchResponse, PushGateway, PushMessage, SendResponse, MAX_BATCH_SIZE};
use crate::credentials::TokenProvider;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

const FCM_ERROR_TYPE: &str = "type.googleapis.com/google.firebase.fcm.v1.FcmError";

/// Sends notifications through FCM for one Firebase project.
pub struct FcmGateway {
    client: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
    send_url: String,
    max_concurrent_sends: usize,
}

#[derive(Deserialize)]
struct SendResult {
    #[serde(default)]
    name: String,
}

impl FcmGateway {
    /// Creates a new `FcmGateway`.
    pub fn new(
        config: &GatewayConfig,
        project_id: &str,
        tokens: Arc<dyn TokenProvider>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            client,
            tokens,
            send_url: format!(
                "{}/v1/projects/{}/messages:send",
                config.base_url.trim_end_matches('/'),
                project_id
            ),
            max_concurrent_sends: config.max_concurrent_sends.max(1),
        }
    }

    async fn send_one(
        &self,
        access_token: &str,
        message: &PushMessage,
    ) -> Result<SendResponse, GatewayError> {
        let payload = json!({
            "message": {
                "token": message.token,
                "notification": {
                    "title": message.title,
                    "body": message.body
                }
            }
        });

        let response = self
            .client
            .post(&self.send_url)
            .bearer_auth(access_token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let result: SendResult = response.json().await?;
            return Ok(SendResponse::Delivered {
                message_id: result.name,
            });
        }

        let body = response.text().await.unwrap_or_default();
        let fcm_code = fcm_error_code(&body);
        if fcm_code.is_none()
            && (status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN)
        {
            error!(status = %status, body = %body, "FCM rejected the access token");
            return Err(GatewayError::Unauthorized {
                status: status.as_u16(),
                body,
            });
        }

        let error = fcm_code
            .or_else(|| google_error_status(&body))
            .unwrap_or_else(|| status.to_string());
        debug!(status = %status, error = %error, "FCM rejected message");
        Ok(SendResponse::Rejected { error })
    }
}

fn error_object(body: &str) -> Option<Value> {
    serde_json::from_str::<Value>(body)
        .ok()?
        .get_mut("error")
        .map(Value::take)
}

/// Extracts the FCM-specific `errorCode` (e.g. `UNREGISTERED`) from an error body.
fn fcm_error_code(body: &str) -> Option<String> {
    let error = error_object(body)?;
    error
        .get("details")?
        .as_array()?
        .iter()
        .find(|detail| detail.get("@type").and_then(Value::as_str) == Some(FCM_ERROR_TYPE))
        .and_then(|detail| detail.get("errorCode"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Extracts the canonical Google error status (e.g. `INVALID_ARGUMENT`).
fn google_error_status(body: &str) -> Option<String> {
    error_object(body)?
        .get("status")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl PushGateway for FcmGateway {
    #[instrument(skip(self, messages), fields(count = messages.len()))]
    async fn send_all(&self, messages: &[PushMessage]) -> Result<BatchResponse, GatewayError> {
        if messages.len() > MAX_BATCH_SIZE {
            return Err(GatewayError::BatchTooLarge {
                size: messages.len(),
                max: MAX_BATCH_SIZE,
            });
        }
        if messages.is_empty() {
            return Ok(BatchResponse::default());
        }

        let access_token = self.tokens.access_token().await?;
        let access_token = access_token.as_str();
        let responses: Vec<SendResponse> = stream::iter(messages.iter().cloned())
            .map(|message| async move { self.send_one(access_token, &message).await })
            .buffered(self.max_concurrent_sends)
            .try_collect()
            .await?;

        let batch = BatchResponse::new(responses);
        info!(
            success = batch.success_count(),
            failure = batch.failure_count(),
            "FCM batch sent"
        );
        Ok(batch)
    }
}
