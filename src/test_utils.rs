//! In-memory collaborators for exercising the dispatcher without Firebase.

use crate::core::{BatchResponse, PushGateway, PushMessage, SendResponse, UserDirectory, UserRecord};
use crate::directory::DirectoryError;
use crate::gateway::GatewayError;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// A `UserDirectory` over a fixed list of records.
#[derive(Clone, Debug, Default)]
pub struct InMemoryDirectory {
    records: Vec<UserRecord>,
    fail_with: Option<String>,
    queries: Arc<Mutex<Vec<String>>>,
}

impl InMemoryDirectory {
    pub fn new(records: Vec<UserRecord>) -> Self {
        Self {
            records,
            ..Default::default()
        }
    }

    /// A directory whose every query fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Default::default()
        }
    }

    /// Appends a user with the given city and token.
    pub fn with_user(mut self, city: &str, token: Option<&str>) -> Self {
        let id = format!("user-{}", self.records.len());
        self.records.push(UserRecord {
            id: Some(id),
            city: Some(city.to_string()),
            fcm_token: token.map(str::to_string),
        });
        self
    }

    /// The cities queried so far, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn find_by_city(&self, city: &str) -> Result<Vec<UserRecord>, DirectoryError> {
        self.queries.lock().unwrap_or_else(PoisonError::into_inner).push(city.to_string());
        if let Some(message) = &self.fail_with {
            return Err(DirectoryError::Decode(message.clone()));
        }
        Ok(self
            .records
            .iter()
            .filter(|record| record.city.as_deref() == Some(city))
            .cloned()
            .collect())
    }
}

/// A response where every one of `count` messages succeeded.
fn all_delivered(count: usize) -> BatchResponse {
    BatchResponse::new(
        (0..count)
            .map(|i| SendResponse::Delivered {
                message_id: format!("message-{i}"),
            })
            .collect(),
    )
}

/// A `PushGateway` that records every bulk call.
///
/// Every message succeeds unless its token was marked as rejected. A call
/// can be made to fail as a whole by index.
#[derive(Clone, Debug, Default)]
pub struct RecordingGateway {
    sent_batches: Arc<Mutex<Vec<Vec<PushMessage>>>>,
    rejected_tokens: HashSet<String>,
    fail_on_call: Option<usize>,
    overreport: bool,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Default::default()
    }

    /// Messages for `token` are reported as failed deliveries.
    pub fn rejecting(mut self, token: &str) -> Self {
        self.rejected_tokens.insert(token.to_string());
        self
    }

    /// The zero-based `call` fails as a whole, as if credentials were rejected.
    pub fn failing_on_call(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    /// Reports one more result than messages submitted, all successful.
    pub fn overreporting(mut self) -> Self {
        self.overreport = true;
        self
    }

    /// The batches received so far, in call order.
    pub fn sent_batches(&self) -> Vec<Vec<PushMessage>> {
        self.sent_batches.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The tokens received so far, flattened in call order.
    pub fn sent_tokens(&self) -> Vec<String> {
        self.sent_batches()
            .into_iter()
            .flatten()
            .map(|message| message.token)
            .collect()
    }
}

#[async_trait]
impl PushGateway for RecordingGateway {
    async fn send_all(&self, messages: &[PushMessage]) -> Result<BatchResponse, GatewayError> {
        let call = {
            let mut batches = self.sent_batches.lock().unwrap_or_else(PoisonError::into_inner);
            batches.push(messages.to_vec());
            batches.len() - 1
        };
        if self.fail_on_call == Some(call) {
            return Err(GatewayError::Unauthorized {
                status: 401,
                body: format!("call {call} rejected"),
            });
        }
        if self.overreport {
            return Ok(all_delivered(messages.len() + 1));
        }

        let responses = messages
            .iter()
            .map(|message| {
                if self.rejected_tokens.contains(&message.token) {
                    SendResponse::Rejected {
                        error: "UNREGISTERED".to_string(),
                    }
                } else {
                    SendResponse::Delivered {
                        message_id: format!("projects/test/messages/{}", message.token),
                    }
                }
            })
            .collect();
        Ok(BatchResponse::new(responses))
    }
}
