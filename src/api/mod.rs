//! The HTTP surface: `POST /send-disaster-alert/` and `GET /health`.
//!
//! Every dispatch outcome, including upstream failures, is returned with
//! status 200; callers distinguish them by the `status` field of the body.
//! Only a request missing one of `city`, `title` or `body` is refused, with
//! status 422.

pub mod server;

use crate::core::AlertRequest;
use crate::dispatch::AlertDispatcher;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{instrument, warn};

pub use server::ApiServer;

pub const ALERT_PATH: &str = "/send-disaster-alert/";

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct ApiState {
    pub dispatcher: Arc<AlertDispatcher>,
}

impl ApiState {
    pub fn new(dispatcher: Arc<AlertDispatcher>) -> Self {
        Self { dispatcher }
    }
}

/// Alert parameters as they arrive, before required fields are checked.
#[derive(Debug, Default, PartialEq)]
pub struct AlertParams {
    pub city: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
}

impl AlertParams {
    /// Reads the parameters from a JSON object body.
    ///
    /// Strings are taken as-is and numbers or booleans are converted to their
    /// text form. A body that is not a JSON object yields no parameters.
    pub fn from_json_body(body: &[u8]) -> Self {
        let Ok(object) = serde_json::from_slice::<Map<String, Value>>(body) else {
            return Self::default();
        };
        let field = |name: &str| match object.get(name) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(value @ (Value::Number(_) | Value::Bool(_))) => Some(value.to_string()),
            _ => None,
        };
        Self {
            city: field("city"),
            title: field("title"),
            body: field("body"),
        }
    }

    /// Reads the parameters from decoded query-string pairs.
    ///
    /// A repeated key keeps its last value; unknown keys are ignored.
    pub fn from_query_pairs(pairs: Vec<(String, String)>) -> Self {
        pairs
            .into_iter()
            .fold(Self::default(), |mut params, (key, value)| {
                match key.as_str() {
                    "city" => params.city = Some(value),
                    "title" => params.title = Some(value),
                    "body" => params.body = Some(value),
                    _ => {}
                }
                params
            })
    }

    /// Fills the fields missing from `self` with those of `fallback`.
    pub fn or(self, fallback: AlertParams) -> AlertParams {
        AlertParams {
            city: self.city.or(fallback.city),
            title: self.title.or(fallback.title),
            body: self.body.or(fallback.body),
        }
    }

    /// Converts into an `AlertRequest`, or lists the missing parameter names.
    pub fn into_request(self) -> Result<AlertRequest, Vec<&'static str>> {
        match (self.city, self.title, self.body) {
            (Some(city), Some(title), Some(body)) => Ok(AlertRequest { city, title, body }),
            (city, title, body) => Err([
                ("city", city.is_none()),
                ("title", title.is_none()),
                ("body", body.is_none()),
            ]
            .into_iter()
            .filter_map(|(name, missing)| missing.then_some(name))
            .collect()),
        }
    }
}

/// Builds the API router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route(ALERT_PATH, post(send_disaster_alert))
        .route("/send-disaster-alert", post(send_disaster_alert))
        .route("/health", get(health))
        .with_state(state)
}

#[instrument(skip_all)]
async fn send_disaster_alert(
    State(state): State<ApiState>,
    Query(pairs): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Response {
    let query = AlertParams::from_query_pairs(pairs);
    let params = if body.is_empty() {
        query
    } else {
        query.or(AlertParams::from_json_body(&body))
    };

    match params.into_request() {
        Ok(request) => Json(state.dispatcher.dispatch(&request).await).into_response(),
        Err(missing) => {
            let detail = format!("missing required parameter(s): {}", missing.join(", "));
            warn!("Rejected alert request: {}", detail);
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "detail": detail })),
            )
                .into_response()
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
