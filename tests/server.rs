#![cfg(feature = "server")]

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use sayr_desk::server::DeskServer;
use sayr_desk::{
    Agent, PromptPipeline, StubModel, TelemetryCollector, TelemetrySnapshot, UiConfig,
    DEFAULT_PROMPT,
};

fn desk(script: Vec<String>) -> axum::Router {
    let pipeline = PromptPipeline::new(std::sync::Arc::new(Agent::new(StubModel::new(script))));
    DeskServer::new(pipeline, UiConfig::default()).router()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn health_check() {
    let app = desk(Vec::new());
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok");
}

#[tokio::test]
async fn page_is_prefilled_with_default_prompt() {
    let app = desk(Vec::new());
    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let page = body_text(response).await;
    assert!(page.contains("<title>Sayr Desk | Ollama | Granite 4.0</title>"));
    assert!(page.contains(&DEFAULT_PROMPT.replace('\'', "&#39;")));
    assert!(page.contains("Response will appear here..."));
    assert!(page.contains(r#"<pre id="raw"></pre>"#));
}

#[tokio::test]
async fn json_submission_returns_display_text() {
    let app = desk(vec![r#"{"action":"respond","content":"$$4$$"}"#.into()]);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/prompt")
                .method("POST")
                .header("content-type", "application/json")
                .body(Body::from(json!({"prompt": "What is 2+2?"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let reply: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(reply, json!({"text": "$$4$$", "error": false}));
}

#[tokio::test]
async fn json_submission_reports_failures_as_text() {
    let app = desk(vec![r#"{"action":"fail","error":"connection refused"}"#.into()]);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/prompt")
                .method("POST")
                .header("content-type", "application/json")
                .body(Body::from(json!({"prompt": ""}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let reply: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(
        reply,
        json!({"text": "Error: model backend unreachable: connection refused", "error": true})
    );
}

#[tokio::test]
async fn form_submission_renders_escaped_result() {
    let app = desk(vec!["<b>4</b> & done".into()]);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/")
                .method("POST")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Body::from("prompt=What+is+2%2B2%3F"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let page = body_text(response).await;
    assert!(page.contains(">What is 2+2?</textarea>"));
    assert!(page.contains(r#"<pre id="raw">&lt;b&gt;4&lt;/b&gt; &amp; done</pre>"#));
}

#[tokio::test]
async fn script_in_an_answer_is_inert_without_javascript() {
    let app = desk(vec![
        r#"{"action":"respond","content":"<script>alert(1)</script><img src=x onerror=alert(2)>"}"#
            .into(),
    ]);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/")
                .method("POST")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Body::from("prompt=hi"))
                .unwrap(),
        )
        .await
        .unwrap();

    let page = body_text(response).await;
    assert!(!page.contains("<script>alert(1)</script>"));
    assert!(!page.contains("<img src=x"));
    assert!(page.contains(
        r#"<pre id="raw">&lt;script&gt;alert(1)&lt;/script&gt;&lt;img src=x onerror=alert(2)&gt;</pre>"#
    ));
    assert!(page.contains("DOMPurify.sanitize("));
}

#[tokio::test]
async fn telemetry_endpoint_reports_recent_submissions() {
    let telemetry = TelemetryCollector::with_capacity(2);
    let pipeline = PromptPipeline::new(std::sync::Arc::new(Agent::new(StubModel::new(vec![
        r#"{"action":"respond","content":"1"}"#.into(),
        r#"{"action":"respond","content":"22"}"#.into(),
        r#"{"action":"fail","error":"connection refused"}"#.into(),
    ]))))
    .with_telemetry(telemetry.clone());
    let app = DeskServer::new(pipeline.clone(), UiConfig::default()).router();

    for _ in 0..3 {
        pipeline.submit_and_extract("count").await;
    }

    let response = app
        .oneshot(Request::builder().uri("/api/telemetry").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let snapshot: TelemetrySnapshot = serde_json::from_str(&body_text(response).await).unwrap();

    assert_eq!(snapshot.events.len(), 2);
    assert_eq!(snapshot.events[0].detail["chars"], 2);
    assert_eq!(snapshot.events[1].detail["outcome"], "failed");
    assert_eq!(snapshot.failures.len(), 1);
    // Reading does not consume.
    assert_eq!(telemetry.snapshot().events.len(), 2);
}

#[tokio::test]
async fn telemetry_endpoint_is_absent_without_a_collector() {
    let response = desk(Vec::new())
        .oneshot(Request::builder().uri("/api/telemetry").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
