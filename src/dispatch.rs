//! Alert dispatching: fetch tokens, chunk them, send, and count deliveries.

use crate::core::{
    AlertRequest, DispatchOutcome, PushGateway, PushMessage, UserDirectory, UserRecord,
    MAX_BATCH_SIZE,
};
use crate::directory::DirectoryError;
use crate::gateway::GatewayError;
use crate::internal_metrics::Metrics;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Sends one alert to every usable device token registered for a city.
///
/// The directory and gateway handles are created once at startup and shared
/// by all requests; a dispatcher holds no per-request state.
pub struct AlertDispatcher {
    directory: Arc<dyn UserDirectory>,
    gateway: Arc<dyn PushGateway>,
    batch_size: usize,
    metrics: Arc<Metrics>,
}

/// Projects the usable device tokens out of `records`, keeping their order.
pub fn collect_tokens(records: &[UserRecord]) -> Vec<&str> {
    records.iter().filter_map(UserRecord::usable_token).collect()
}

fn build_messages(tokens: &[&str], request: &AlertRequest) -> Vec<PushMessage> {
    tokens
        .iter()
        .map(|token| PushMessage {
            token: (*token).to_string(),
            title: request.title.clone(),
            body: request.body.clone(),
        })
        .collect()
}

impl AlertDispatcher {
    /// Creates a new `AlertDispatcher`.
    ///
    /// `batch_size` is clamped to `1..=MAX_BATCH_SIZE`.
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        gateway: Arc<dyn PushGateway>,
        batch_size: usize,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            directory,
            gateway,
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
            metrics,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Runs one dispatch. Collaborator failures become `DispatchOutcome::Failed`.
    #[instrument(skip(self, request), fields(city = %request.city))]
    pub async fn dispatch(&self, request: &AlertRequest) -> DispatchOutcome {
        let start = Instant::now();
        self.metrics.alert_requests_total.increment(1);

        let outcome = match self.try_dispatch(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Alert dispatch failed");
                DispatchOutcome::Failed {
                    message: e.to_string(),
                }
            }
        };

        self.metrics.record_outcome(&outcome, start.elapsed());
        info!(outcome = outcome.label(), "Alert dispatch finished");
        outcome
    }

    async fn try_dispatch(&self, request: &AlertRequest) -> Result<DispatchOutcome, DispatchError> {
        let records = self.directory.find_by_city(&request.city).await?;
        let tokens = collect_tokens(&records);
        debug!(
            records = records.len(),
            tokens = tokens.len(),
            "Collected device tokens"
        );
        if tokens.is_empty() {
            return Ok(DispatchOutcome::NoRecipients);
        }

        let mut success_count = 0;
        for (index, chunk) in tokens.chunks(self.batch_size).enumerate() {
            let messages = build_messages(chunk, request);
            let response = match self.gateway.send_all(&messages).await {
                Ok(response) => response,
                Err(e) => {
                    if success_count > 0 {
                        warn!(
                            batch = index,
                            delivered_before_failure = success_count,
                            "Gateway failed after earlier batches were delivered"
                        );
                    }
                    return Err(e.into());
                }
            };

            // A gateway reports at most one result per submitted message.
            let delivered = response.success_count().min(chunk.len());
            self.metrics.record_batch(delivered, chunk.len() - delivered);
            debug!(batch = index, size = chunk.len(), delivered, "Batch sent");
            success_count += delivered;
        }

        Ok(DispatchOutcome::Sent { success_count })
    }
}
