use alertcast::test_utils::{InMemoryDirectory, RecordingGateway};
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};

#[path = "../helpers/mod.rs"]
mod helpers;
use helpers::app::{TestApp, TestAppBuilder};

const ALERT: &str = "/send-disaster-alert/";

async fn start(directory: InMemoryDirectory, gateway: RecordingGateway) -> TestApp {
    TestAppBuilder::new()
        .with_directory(Arc::new(directory))
        .with_gateway(Arc::new(gateway))
        .start()
        .await
        .unwrap()
}

async fn post_query(app: &TestApp, params: &[(&str, &str)]) -> (u16, Value) {
    let response = reqwest::Client::new()
        .post(app.url(ALERT))
        .query(params)
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn test_alert_via_query_parameters_reports_success_count() {
    // Arrange
    let directory = InMemoryDirectory::default()
        .with_user("Mumbai", Some("t1"))
        .with_user("Mumbai", Some(""))
        .with_user("Mumbai", Some("t3"));
    let gateway = RecordingGateway::new();
    let app = start(directory, gateway.clone()).await;

    // Act
    let (status, body) = post_query(
        &app,
        &[("city", "Mumbai"), ("title", "Flood Warning"), ("body", "Move to higher ground")],
    )
    .await;

    // Assert
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "status": "Notifications sent", "success_count": 2 }));
    assert_eq!(gateway.sent_tokens(), vec!["t1", "t3"]);

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_unknown_city_reports_no_users() {
    let gateway = RecordingGateway::new();
    let app = start(InMemoryDirectory::default(), gateway.clone()).await;

    let (status, body) = post_query(
        &app,
        &[("city", "Atlantis"), ("title", "Flood Warning"), ("body", "Move")],
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body, json!({ "status": "No users found in this city" }));
    assert!(gateway.sent_batches().is_empty());

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_json_body_is_accepted() {
    let directory = InMemoryDirectory::default().with_user("Pune", Some("p1"));
    let gateway = RecordingGateway::new();
    let app = start(directory, gateway.clone()).await;

    let response = reqwest::Client::new()
        .post(app.url(ALERT))
        .json(&json!({ "city": "Pune", "title": "Heatwave", "body": "Stay indoors" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success_count"], 1);
    assert_eq!(gateway.sent_batches()[0][0].title, "Heatwave");

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_path_without_trailing_slash_is_served() {
    let directory = InMemoryDirectory::default().with_user("Goa", Some("g1"));
    let app = start(directory, RecordingGateway::new()).await;

    let response = reqwest::Client::new()
        .post(app.url("/send-disaster-alert"))
        .query(&[("city", "Goa"), ("title", "t"), ("body", "b")])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_repeated_query_key_uses_last_value() {
    let directory = InMemoryDirectory::default().with_user("Goa", Some("g1"));
    let gateway = RecordingGateway::new();
    let app = start(directory.clone(), gateway.clone()).await;

    let (status, body) = post_query(
        &app,
        &[("city", "Pune"), ("city", "Goa"), ("title", "t"), ("body", "b")],
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body, json!({ "status": "Notifications sent", "success_count": 1 }));
    assert_eq!(directory.queries(), vec!["Goa".to_string()]);

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_missing_parameters_are_rejected_with_422() {
    let gateway = RecordingGateway::new();
    let directory = InMemoryDirectory::default();
    let app = start(directory.clone(), gateway.clone()).await;

    let (status, body) = post_query(&app, &[("title", "Flood Warning")]).await;

    assert_eq!(status, 422);
    assert_eq!(
        body["detail"],
        "missing required parameter(s): city, body"
    );
    assert!(directory.queries().is_empty());
    assert!(gateway.sent_batches().is_empty());

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_upstream_failure_is_reported_with_status_200() {
    let app = start(
        InMemoryDirectory::failing("deadline exceeded"),
        RecordingGateway::new(),
    )
    .await;

    let (status, body) = post_query(
        &app,
        &[("city", "Mumbai"), ("title", "Flood Warning"), ("body", "Move")],
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["status"], "Error");
    assert!(body["message"].as_str().unwrap().contains("deadline exceeded"));

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_large_city_is_sent_in_batches_of_500() {
    let directory = (0..1001).fold(InMemoryDirectory::default(), |directory, i| {
        directory.with_user("Delhi", Some(format!("token-{i}").as_str()))
    });
    let gateway = RecordingGateway::new();
    let app = start(directory, gateway.clone()).await;

    let (_, body) = post_query(
        &app,
        &[("city", "Delhi"), ("title", "Earthquake"), ("body", "Drop, cover, hold on")],
    )
    .await;

    assert_eq!(body["success_count"], 1001);
    let sizes: Vec<usize> = gateway.sent_batches().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![500, 500, 1]);

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_health_reports_version() {
    let app = start(InMemoryDirectory::default(), RecordingGateway::new()).await;

    let body: Value = reqwest::get(app.url("/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_app_shuts_down_cleanly() {
    let app = start(InMemoryDirectory::default(), RecordingGateway::new()).await;

    let result = app.shutdown(Duration::from_secs(5)).await;

    assert!(result.is_ok(), "App should shut down cleanly");
}
