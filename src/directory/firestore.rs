//! A `UserDirectory` backed by the Cloud Firestore REST API.
//!
//! Users are looked up with a single `runQuery` call carrying an equality
//! filter on the city field and a projection onto the city and token fields.

use super::DirectoryError;
use crate::config::DirectoryConfig;
use crate::core::{UserDirectory, UserRecord};
use crate::credentials::TokenProvider;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, error, instrument};

/// Queries the configured Firestore collection for users in a city.
pub struct FirestoreDirectory {
    client: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
    run_query_url: String,
    collection: String,
    city_field: String,
    token_field: String,
}

#[derive(Deserialize)]
struct RunQueryItem {
    document: Option<Document>,
}

#[derive(Deserialize)]
struct Document {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl FirestoreDirectory {
    /// Creates a new `FirestoreDirectory` for the given project.
    pub fn new(
        config: &DirectoryConfig,
        project_id: &str,
        tokens: Arc<dyn TokenProvider>,
        client: reqwest::Client,
    ) -> Self {
        let run_query_url = format!(
            "{}/v1/projects/{}/databases/{}/documents:runQuery",
            config.base_url.trim_end_matches('/'),
            project_id,
            config.database
        );
        Self {
            client,
            tokens,
            run_query_url,
            collection: config.collection.clone(),
            city_field: config.city_field.clone(),
            token_field: config.token_field.clone(),
        }
    }

    fn query_body(&self, city: &str) -> Value {
        json!({
            "structuredQuery": {
                "from": [{ "collectionId": self.collection }],
                "where": {
                    "fieldFilter": {
                        "field": { "fieldPath": self.city_field },
                        "op": "EQUAL",
                        "value": { "stringValue": city }
                    }
                },
                "select": {
                    "fields": [
                        { "fieldPath": self.city_field },
                        { "fieldPath": self.token_field }
                    ]
                }
            }
        })
    }

    /// Converts one Firestore document into a `UserRecord`.
    ///
    /// Only `stringValue` fields are read; null, missing or differently typed
    /// values become `None`.
    fn to_record(&self, document: Document) -> UserRecord {
        let string_field = |name: &str| {
            document
                .fields
                .get(name)
                .and_then(|value| value.get("stringValue"))
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        UserRecord {
            id: document.name.rsplit('/').next().map(str::to_string),
            city: string_field(&self.city_field),
            fcm_token: string_field(&self.token_field),
        }
    }
}

#[async_trait]
impl UserDirectory for FirestoreDirectory {
    #[instrument(skip(self))]
    async fn find_by_city(&self, city: &str) -> Result<Vec<UserRecord>, DirectoryError> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .post(&self.run_query_url)
            .bearer_auth(token)
            .json(&self.query_body(city))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            error!(status = %status, body = %text, "Firestore query failed");
            return Err(DirectoryError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let items: Vec<RunQueryItem> =
            serde_json::from_str(&text).map_err(|e| DirectoryError::Decode(e.to_string()))?;
        let records: Vec<UserRecord> = items
            .into_iter()
            .filter_map(|item| item.document)
            .map(|document| self.to_record(document))
            .collect();

        debug!(count = records.len(), "Firestore query returned user records");
        Ok(records)
    }
}
