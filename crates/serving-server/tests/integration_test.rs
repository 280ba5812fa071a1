use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use serving_engine::{ModelBackend, ModelSpec};
use serving_runtime::{EngineConfig, GenerationEngine, ScriptedModel, SyntheticModel};
use serving_server::{create_router, AppState, ServerConfig};
use std::sync::Arc;
use tower::ServiceExt;

fn scripted(name: &str, tokens: Vec<i32>, fail_at: Option<usize>) -> Arc<dyn ModelBackend> {
    let spec = ModelSpec::new(name, 512).with_eos_token_id(2);
    let mut model = ScriptedModel::new(spec, tokens).unwrap();
    if let Some(step) = fail_at {
        model = model.with_fail_at(step);
    }
    Arc::new(model)
}

fn test_engine(config: EngineConfig) -> Arc<GenerationEngine> {
    let engine = GenerationEngine::new(config).unwrap();
    engine.register_model(scripted("echo", vec![7], None)).unwrap();
    engine
        .register_model(scripted("flaky", vec![5, 6], Some(1)))
        .unwrap();
    let spec = ModelSpec::new("synth", 64).with_eos_token_id(0).with_max_new_tokens(8);
    engine
        .register_model(Arc::new(SyntheticModel::new(spec)))
        .unwrap();
    Arc::new(engine)
}

fn test_state() -> AppState {
    state_with(EngineConfig::default())
}

fn state_with(config: EngineConfig) -> AppState {
    AppState::new(
        test_engine(config),
        ServerConfig {
            default_model: Some("echo".to_string()),
        },
    )
}

fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

async fn body_text(resp: axum::response::Response) -> String {
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8_lossy(&body).into_owned()
}

/// `data:` payloads of an SSE body, in order.
fn sse_data(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.trim().to_string())
        .collect()
}

// -- Health and models --

#[tokio::test]
async fn health_returns_ok() {
    let app = create_router(test_state());
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["models"], 3);
    assert_eq!(json["sessions"]["available"], 64);
}

#[tokio::test]
async fn list_models() {
    let app = create_router(test_state());
    let req = Request::builder()
        .uri("/v1/models")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    let ids: Vec<_> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["echo", "flaky", "synth"]);
    assert_eq!(json["data"][0]["vocab_size"], 512);
}

// -- Blocking generation --

#[tokio::test]
async fn generate_non_streaming() {
    let app = create_router(test_state());
    let req = json_request(
        "/v1/generate",
        json!({
            "model_name": "echo",
            "input_tokens": [15, 290, 42],
            "generation_config": {"top_k": 1}
        }),
    );
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"]["code"], "RET_SUCCESS");
    assert_eq!(json["output_tokens"], json!([[7]]));
    assert_eq!(json["finish_reason"], "stop");
    assert_eq!(json["usage"]["prompt_tokens"], 3);
    assert_eq!(json["usage"]["completion_tokens"], 1);
    assert_eq!(json["usage"]["total_tokens"], 4);
}

#[tokio::test]
async fn generate_uses_default_model() {
    let app = create_router(test_state());
    let req = json_request("/v1/generate", json!({"input_tokens": [1, 3]}));
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["model"], "echo");
}

#[tokio::test]
async fn unknown_model_is_404() {
    let app = create_router(test_state());
    let req = json_request(
        "/v1/generate",
        json!({"model_name": "nonexistent", "input_tokens": [1]}),
    );
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let json = body_json(resp).await;
    assert_eq!(json["status"]["code"], "RET_NOT_FOUND");
}

#[tokio::test]
async fn invalid_sampling_is_400() {
    let app = create_router(test_state());
    for stream in [false, true] {
        let req = json_request(
            "/v1/generate",
            json!({
                "model_name": "echo",
                "input_tokens": [1, 2],
                "generation_config": {"top_p": 0.0},
                "stream": stream
            }),
        );
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["status"]["code"], "RET_INVALID_ARGUMENT");
    }
}

#[tokio::test]
async fn empty_prompt_is_400() {
    let app = create_router(test_state());
    let req = json_request(
        "/v1/generate",
        json!({"model_name": "echo", "input_tokens": []}),
    );
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn backend_failure_is_500() {
    let app = create_router(test_state());
    let req = json_request(
        "/v1/generate",
        json!({"model_name": "flaky", "input_tokens": [1]}),
    );
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(resp).await;
    assert_eq!(json["status"]["code"], "RET_INTERNAL");
}

#[tokio::test]
async fn no_free_slot_is_503() {
    let state = state_with(EngineConfig::default().with_max_concurrent_requests(1));
    let _held = state
        .engine
        .generate_streaming("echo", &[1], Default::default())
        .unwrap();
    let app = create_router(state);
    let req = json_request(
        "/v1/generate",
        json!({"model_name": "echo", "input_tokens": [1]}),
    );
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(resp).await;
    assert_eq!(json["status"]["code"], "RET_RESOURCE_EXHAUSTED");
}

#[tokio::test]
async fn beam_search_non_streaming() {
    let app = create_router(test_state());
    let req = json_request(
        "/v1/generate",
        json!({
            "model_name": "synth",
            "input_tokens": [4, 5],
            "generation_config": {"num_beams": 3}
        }),
    );
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["output_tokens"].as_array().unwrap().len(), 1);
}

// -- Streaming generation --

#[tokio::test]
async fn generate_streaming_sse_framing() {
    let state = test_state();
    let engine = Arc::clone(&state.engine);
    let app = create_router(state);
    let req = json_request(
        "/v1/generate",
        json!({
            "model_name": "echo",
            "input_tokens": [15, 290, 42],
            "stream": true
        }),
    );
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/event-stream"));
    let session_id = resp
        .headers()
        .get("x-session-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let events = sse_data(&body_text(resp).await);
    assert_eq!(events.len(), 3, "events: {events:?}");

    let token: Value = serde_json::from_str(&events[0]).unwrap();
    assert_eq!(token["token_id"], 7);
    assert_eq!(token["session_id"], session_id.as_str());

    let terminal: Value = serde_json::from_str(&events[1]).unwrap();
    assert_eq!(terminal["status"]["code"], "RET_STOP_ITERATION");
    assert_eq!(terminal["finish_reason"], "stop");
    assert_eq!(events[2], "[DONE]");

    assert_eq!(engine.available_slots(), 64);
    assert_eq!(engine.active_sessions(), 0);
}

#[tokio::test]
async fn streaming_failure_ends_with_error_status() {
    let app = create_router(test_state());
    let req = json_request(
        "/v1/generate",
        json!({"model_name": "flaky", "input_tokens": [1], "stream": true}),
    );
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let events = sse_data(&body_text(resp).await);
    assert_eq!(events.len(), 3, "events: {events:?}");
    let token: Value = serde_json::from_str(&events[0]).unwrap();
    assert_eq!(token["token_id"], 5);
    let terminal: Value = serde_json::from_str(&events[1]).unwrap();
    assert_eq!(terminal["status"]["code"], "RET_INTERNAL");
    assert!(terminal.get("finish_reason").is_none());
    assert_eq!(events[2], "[DONE]");
}

#[tokio::test]
async fn dropped_stream_cancels_session() {
    let state = test_state();
    let engine = Arc::clone(&state.engine);
    let app = create_router(state);
    let req = json_request(
        "/v1/generate",
        json!({"model_name": "synth", "input_tokens": [1], "stream": true}),
    );
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(engine.active_sessions(), 1);
    drop(resp);
    assert_eq!(engine.active_sessions(), 0);
    assert_eq!(engine.available_slots(), 64);
}

// -- Sessions --

#[tokio::test]
async fn cancel_session_endpoint() {
    let state = test_state();
    let session = state
        .engine
        .generate_streaming("synth", &[1, 2], Default::default())
        .unwrap();
    let app = create_router(state);

    let status_req = Request::builder()
        .uri(format!("/v1/sessions/{}", session.id()))
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(status_req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["state"], "running");

    let cancel = || {
        Request::builder()
            .method("DELETE")
            .uri(format!("/v1/sessions/{}", session.id()))
            .body(Body::empty())
            .unwrap()
    };
    let resp = app.clone().oneshot(cancel()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(session.pull().0.code(), serving_engine::RetCode::Cancelled);

    let resp = app.oneshot(cancel()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_session_id_is_400() {
    let app = create_router(test_state());
    let req = Request::builder()
        .method("DELETE")
        .uri("/v1/sessions/not-a-uuid")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
