use std::time::Duration;

use serde_json::{json, Value};

use deutsch_tutor_runner::llm_client::{MockLlm, ModelBackend};
use deutsch_tutor_runner::server::{spawn_test_server, spawn_test_server_with_state, AppState};
use deutsch_tutor_runner::session::BACKEND_ERROR_REPLY;

async fn start(responses: &[&str]) -> String {
    let backend = ModelBackend::Mock(MockLlm::new(
        responses.iter().map(|s| s.to_string()).collect(),
    ));
    let (addr, _handle) = spawn_test_server(backend).await.unwrap();
    format!("http://{addr}")
}

async fn new_session(client: &reqwest::Client, base: &str) -> String {
    let resp = client
        .post(format!("{base}/v1/sessions"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    body["session_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_endpoint_ok() {
    let base = start(&[]).await;
    let body: Value = reqwest::get(format!("{base}/v1/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["name"], "deutsch_tutor");
    assert_eq!(body["backend"], "mock");
}

#[tokio::test]
async fn send_returns_parsed_turn_and_history_grows() {
    let base = start(&["KORREKTUR: Ich gehe.\nERKLÄRUNG: Keine Änderung nötig.\nANTWORT: Wohin gehst du?"]).await;
    let client = reqwest::Client::new();
    let id = new_session(&client, &base).await;

    let resp = client
        .post(format!("{base}/v1/sessions/{id}/messages"))
        .json(&json!({"message": "Ich gehe."}))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let turn: Value = resp.json().await.unwrap();
    assert_eq!(turn["user"], "Ich gehe.");
    assert_eq!(turn["correction"], "Ich gehe.");
    assert_eq!(turn["explanation"], "Keine Änderung nötig.");
    assert_eq!(turn["reply"], "Wohin gehst du?");

    let view: Value = client
        .get(format!("{base}/v1/sessions/{id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(view["turns"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn empty_message_is_rejected() {
    let base = start(&["ANTWORT: unused"]).await;
    let client = reqwest::Client::new();
    let id = new_session(&client, &base).await;

    let resp = client
        .post(format!("{base}/v1/sessions/{id}/messages"))
        .json(&json!({"message": "   "}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn backend_failure_becomes_error_reply() {
    let base = start(&[]).await;
    let client = reqwest::Client::new();
    let id = new_session(&client, &base).await;

    let turn: Value = client
        .post(format!("{base}/v1/sessions/{id}/messages"))
        .json(&json!({"message": "hallo"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(turn["reply"], BACKEND_ERROR_REPLY);
    assert_eq!(turn["correction"], "");
}

#[tokio::test]
async fn reset_and_debug_endpoints() {
    let base = start(&["ANTWORT: eins", "roh"]).await;
    let client = reqwest::Client::new();
    let id = new_session(&client, &base).await;

    let resp = client
        .post(format!("{base}/v1/sessions/{id}/debug"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    client
        .post(format!("{base}/v1/sessions/{id}/messages"))
        .json(&json!({"message": "hallo"}))
        .send()
        .await
        .unwrap();

    let body: Value = client
        .post(format!("{base}/v1/sessions/{id}/debug"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["raw"], "roh");

    let view: Value = client
        .post(format!("{base}/v1/sessions/{id}/reset"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(view["turns"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let base = start(&[]).await;
    let client = reqwest::Client::new();
    for path in ["not-a-uuid", "00000000-0000-0000-0000-000000000000"] {
        let resp = client
            .get(format!("{base}/v1/sessions/{path}"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
    }

    let id = new_session(&client, &base).await;
    let resp = client
        .delete(format!("{base}/v1/sessions/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);
    let resp = client
        .get(format!("{base}/v1/sessions/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn idle_sessions_expire_on_next_create() {
    let backend = ModelBackend::Mock(MockLlm::new(Vec::new()));
    let state = AppState::with_idle_ttl(backend, Duration::from_millis(50));
    let (addr, _handle) = spawn_test_server_with_state(state.clone()).await.unwrap();
    let base = format!("http://{addr}");
    let client = reqwest::Client::new();

    let old = new_session(&client, &base).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    let fresh = new_session(&client, &base).await;

    assert_eq!(state.session_count().await, 1);
    let resp = client
        .get(format!("{base}/v1/sessions/{old}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let resp = client
        .get(format!("{base}/v1/sessions/{fresh}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn recently_used_sessions_survive_sweep() {
    let backend = ModelBackend::Mock(MockLlm::new(Vec::new()));
    let state = AppState::with_idle_ttl(backend, Duration::from_secs(60));
    let (addr, _handle) = spawn_test_server_with_state(state.clone()).await.unwrap();
    let base = format!("http://{addr}");
    let client = reqwest::Client::new();

    new_session(&client, &base).await;
    new_session(&client, &base).await;
    assert_eq!(state.session_count().await, 2);
}
