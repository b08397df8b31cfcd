//! HTTP relay tests
//!
//! Drive the full router with `tower::ServiceExt::oneshot` against a
//! wiremock stand-in for the upstream realtime API.

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use tower::util::ServiceExt;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use interview_relay::{
    QuestionBank, QuestionCategory, QuestionRecord, ServerConfig, routes, state::AppState,
};

fn record(id: &str, category: QuestionCategory) -> QuestionRecord {
    QuestionRecord {
        id: id.to_string(),
        category,
        question: format!("Question {id}?"),
        guidance: String::new(),
    }
}

fn mixed_pool() -> QuestionBank {
    QuestionBank::from_records(vec![
        record("pf-1", QuestionCategory::PersonalFit),
        record("bh-1", QuestionCategory::Behavioral),
    ])
}

fn test_config(base_url: &str, api_key: Option<&str>) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.host = "127.0.0.1".to_string();
    config.openai_base_url = base_url.to_string();
    config.openai_api_key = api_key.map(str::to_string);
    config
}

fn app(config: ServerConfig, questions: QuestionBank) -> Router {
    let state: Arc<AppState> = AppState::with_questions(config, questions).unwrap();
    routes::create_app(state)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

// =============================================================================
// /health
// =============================================================================

#[tokio::test]
async fn test_health() {
    let app = app(test_config("http://127.0.0.1:9", None), mixed_pool());
    let (status, body) = get(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true }));
}

// =============================================================================
// /session
// =============================================================================

#[tokio::test]
async fn test_session_passes_upstream_body_through() {
    let upstream = MockServer::start().await;
    let session_body = json!({
        "id": "sess_123",
        "object": "realtime.session",
        "client_secret": { "value": "ek_abc", "expires_at": 1712000000 }
    });
    Mock::given(method("POST"))
        .and(path("/v1/realtime/sessions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(header("openai-beta", "realtime=v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body.clone()))
        .expect(1)
        .mount(&upstream)
        .await;

    let app = app(test_config(&upstream.uri(), Some("sk-test")), mixed_pool());
    let (status, body) = get(app, "/session?mode=CASE&language=DE").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, session_body);

    let requests = upstream.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let instructions = sent["instructions"].as_str().unwrap();
    assert!(instructions.contains("You MUST interview in German."));
    assert!(instructions.contains("not a full-length case"));
    assert_eq!(sent["turn_detection"]["type"], "server_vad");
    assert_eq!(sent["tools"][0]["name"], "question_bank_get");
}

#[tokio::test]
async fn test_session_unknown_values_fall_back() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/realtime/sessions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "client_secret": { "value": "ek" } })),
        )
        .mount(&upstream)
        .await;

    let app = app(test_config(&upstream.uri(), Some("sk-test")), mixed_pool());
    let (status, _) = get(app, "/session?mode=marathon&language=fr").await;
    assert_eq!(status, StatusCode::OK);

    let requests = upstream.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let instructions = sent["instructions"].as_str().unwrap().to_lowercase();
    assert!(instructions.contains("you must interview in english."));
    assert!(instructions.contains("must be sourced via the function tool 'question_bank_get'"));
}

#[tokio::test]
async fn test_session_repeated_keys_use_first_value() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/realtime/sessions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "client_secret": { "value": "ek" } })),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let app = app(test_config(&upstream.uri(), Some("sk-test")), mixed_pool());
    let (status, body) = get(app, "/session?mode=case&mode=full&language=de&language=en").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["client_secret"]["value"], "ek");

    let requests = upstream.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let instructions = sent["instructions"].as_str().unwrap();
    assert!(instructions.contains("You MUST interview in German."));
    assert!(instructions.contains("not a full-length case"));
}

#[tokio::test]
async fn test_session_upstream_error_message() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/realtime/sessions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "message": "Incorrect API key provided", "type": "invalid_request_error" }
        })))
        .mount(&upstream)
        .await;

    let app = app(test_config(&upstream.uri(), Some("sk-bad")), mixed_pool());
    let (status, body) = get(app, "/session").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Incorrect API key provided" }));
}

#[tokio::test]
async fn test_session_upstream_non_json_success() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/realtime/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&upstream)
        .await;

    let app = app(test_config(&upstream.uri(), Some("sk-test")), mixed_pool());
    let (status, body) = get(app, "/session").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({ "error": "Invalid JSON from upstream realtime/sessions" })
    );
}

#[tokio::test]
async fn test_session_without_api_key() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;

    let app = app(test_config(&upstream.uri(), None), mixed_pool());
    let (status, body) = get(app, "/session?mode=behavioral").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "OPENAI_API_KEY not set" }));
}

// =============================================================================
// /tool/question
// =============================================================================

#[tokio::test]
async fn test_question_by_category() {
    let app = app(test_config("http://127.0.0.1:9", None), mixed_pool());
    let (status, body) = get(app, "/tool/question?qtype=behavioral").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "bh-1");
    assert_eq!(body["type"], "behavioral");
}

#[tokio::test]
async fn test_question_qtype_case_insensitive() {
    let app = app(test_config("http://127.0.0.1:9", None), mixed_pool());
    let (status, body) = get(app, "/tool/question?qtype=Personal-Fit").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "personal-fit");
}

#[tokio::test]
async fn test_question_repeated_qtype_uses_first_value() {
    let app = app(test_config("http://127.0.0.1:9", None), mixed_pool());
    let (status, body) = get(app, "/tool/question?qtype=behavioral&qtype=personal-fit").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "bh-1");

    let app = app(test_config("http://127.0.0.1:9", None), mixed_pool());
    let (status, body) = get(app, "/tool/question?qtype=case&qtype=behavioral").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({ "error": "qtype must be 'personal-fit' or 'behavioral'" })
    );
}

#[tokio::test]
async fn test_question_falls_back_to_whole_pool() {
    let pool = QuestionBank::from_records(vec![record("pf-only", QuestionCategory::PersonalFit)]);
    let app = app(test_config("http://127.0.0.1:9", None), pool);
    let (status, body) = get(app, "/tool/question?qtype=behavioral").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "personal-fit");
}

#[tokio::test]
async fn test_question_invalid_qtype() {
    for uri in ["/tool/question?qtype=case", "/tool/question"] {
        let app = app(test_config("http://127.0.0.1:9", None), mixed_pool());
        let (status, body) = get(app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({ "error": "qtype must be 'personal-fit' or 'behavioral'" })
        );
    }
}

#[tokio::test]
async fn test_question_empty_pool() {
    let app = app(
        test_config("http://127.0.0.1:9", None),
        QuestionBank::from_records(Vec::new()),
    );
    let (status, body) = get(app, "/tool/question?qtype=personal-fit").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Question bank is empty" }));
}

#[tokio::test]
async fn test_question_pool_file_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let pool_path = dir.path().join("pool.json");
    std::fs::write(
        &pool_path,
        r#"[{"id":"f-1","type":"behavioral","question":"From disk?","guidance":""}]"#,
    )
    .unwrap();

    let app = app(
        test_config("http://127.0.0.1:9", None),
        QuestionBank::from_path(&pool_path),
    );
    let (status, body) = get(app, "/tool/question?qtype=behavioral").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "f-1");
}

// =============================================================================
// Static client
// =============================================================================

#[tokio::test]
async fn test_root_serves_index() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<h1>client</h1>").unwrap();

    let mut config = test_config("http://127.0.0.1:9", None);
    config.public_dir = dir.path().to_path_buf();
    let app = app(config, mixed_pool());

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"<h1>client</h1>");
}
