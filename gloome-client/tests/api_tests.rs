//! Integration tests for the local HTTP glue
//!
//! Tests cover:
//! - Health endpoint
//! - Page and script serving
//! - Session state, control changes and validation
//! - Job submission through to rendered panels
//! - Example prefill
//! - Resuming a known job and zooming the tree

mod helpers;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use gloome_client::surface::RenderTarget;
use gloome_client::{build_router, AppState};
use helpers::*;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt; // for `oneshot` method

struct TestApp {
    state: AppState,
    remote: Arc<ScriptedRemote>,
}

impl TestApp {
    fn new() -> Self {
        let remote = ScriptedRemote::new();
        let state = AppState::new(runner(remote.clone(), 100), "http://gloome.test");
        Self { state, remote }
    }

    fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }
}

fn test_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

async fn extract_text(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    String::from_utf8(bytes.to_vec()).expect("Should be UTF-8")
}

fn control<'a>(snapshot: &'a Value, id: &str) -> &'a Value {
    snapshot["controls"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["id"] == id)
        .unwrap_or_else(|| panic!("no control {}", id))
}

// =============================================================================
// Health and page
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = TestApp::new();
    let response = app.router().oneshot(test_request("GET", "/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "gloome-client");
    assert_eq!(body["service_url"], "http://gloome.test");
    assert_eq!(body["active_polls"], 0);
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_index_lists_controls_and_actions() {
    let app = TestApp::new();
    let response = app.router().oneshot(test_request("GET", "/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = extract_text(response.into_body()).await;
    assert!(html.contains("data-submit=\"combined\""));
    assert!(html.contains("data-toggle=\"is_optimize_alpha\""));
    assert!(html.contains("data-value=\"alpha\""));
    assert!(html.contains("id=\"tree\""));
    assert!(html.contains("/static/app.js"));
}

#[tokio::test]
async fn test_app_js_served_with_content_type() {
    let app = TestApp::new();
    let response = app
        .router()
        .oneshot(test_request("GET", "/static/app.js"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/javascript"
    );
    let script = extract_text(response.into_body()).await;
    assert!(script.contains("/api/pointer"));
    assert!(script.contains("/api/zoom"));
}

// =============================================================================
// Controls
// =============================================================================

#[tokio::test]
async fn test_toggle_updates_gating() {
    let app = TestApp::new();
    let state = extract_json(
        app.router()
            .oneshot(test_request("GET", "/api/state"))
            .await
            .unwrap()
            .into_body(),
    )
    .await;
    assert_eq!(state["state"], "idle");
    assert_eq!(control(&state, "alpha")["enabled"], false);

    let response = app
        .router()
        .oneshot(json_request("/api/toggle", json!({"id": "is_optimize_alpha", "value": false})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let snapshot = extract_json(response.into_body()).await;
    assert_eq!(control(&snapshot, "alpha")["enabled"], true);
    assert_eq!(control(&snapshot, "is_optimize_alpha")["value"], false);
}

#[tokio::test]
async fn test_value_change_on_disabled_control_is_rejected() {
    let app = TestApp::new();
    let response = app
        .router()
        .oneshot(json_request("/api/value", json!({"id": "alpha", "value": 2.0})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_unknown_control_is_not_found() {
    let app = TestApp::new();
    let response = app
        .router()
        .oneshot(json_request("/api/toggle", json!({"id": "no_such_toggle", "value": true})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_clear_empties_tree_and_alignment() {
    let app = TestApp::new();
    let response = app.router().oneshot(test_request("POST", "/api/clear")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let snapshot = extract_json(response.into_body()).await;
    assert_eq!(control(&snapshot, "newickText")["value"], "");
    assert_eq!(control(&snapshot, "patternMSA")["value"], "");
}

#[tokio::test]
async fn test_example_prefills_inputs() {
    let app = TestApp::new();
    app.router().oneshot(test_request("POST", "/api/clear")).await.unwrap();

    let response = app
        .router()
        .oneshot(test_request("POST", "/api/example/0"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let snapshot = extract_json(response.into_body()).await;
    assert_eq!(control(&snapshot, "newickText")["value"], NEWICK);
    assert_eq!(control(&snapshot, "patternMSA")["value"], FASTA.trim());
}

// =============================================================================
// Submission
// =============================================================================

#[tokio::test]
async fn test_submit_unknown_kind_is_bad_request() {
    let app = TestApp::new();
    let response = app
        .router()
        .oneshot(test_request("POST", "/api/submit/everything"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.remote.submit_calls(), 0);
}

#[tokio::test]
async fn test_submit_invalid_form_never_reaches_service() {
    let app = TestApp::new();
    app.router().oneshot(test_request("POST", "/api/clear")).await.unwrap();

    let response = app
        .router()
        .oneshot(test_request("POST", "/api/submit/tree-only"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response.into_body()).await;
    assert!(body["error"]["message"].as_str().unwrap().contains("Newick"));
    assert_eq!(app.remote.submit_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_submit_runs_job_to_rendered_tree() {
    let app = TestApp::new();
    app.remote.queue_poll("1", Ok(tree_result("1")));

    let response = app
        .router()
        .oneshot(test_request("POST", "/api/submit/tree-only"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["kind"], "tree-only");

    tokio::time::sleep(POLL_INTERVAL * 2).await;
    let snapshot = extract_json(
        app.router()
            .oneshot(test_request("GET", "/api/state"))
            .await
            .unwrap()
            .into_body(),
    )
    .await;
    assert_eq!(snapshot["state"], "succeeded");
    assert!(snapshot["panels"]["tree_canvas"].as_str().unwrap().contains("<svg"));
    assert!(snapshot["panels"]["banner"].as_str().unwrap().contains("finished"));
}

#[tokio::test(start_paused = true)]
async fn test_results_route_resumes_known_job() {
    let app = TestApp::new();
    app.remote.queue_poll("41", Ok(tree_result("41")));

    let response = app
        .router()
        .oneshot(test_request("POST", "/api/results/41?kind=tree-only"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["kind"], "tree-only");

    tokio::time::sleep(POLL_INTERVAL * 2).await;
    let snapshot = extract_json(
        app.router()
            .oneshot(test_request("GET", "/api/state"))
            .await
            .unwrap()
            .into_body(),
    )
    .await;
    assert_eq!(snapshot["state"], "succeeded");
    assert!(snapshot["panels"]["tree_canvas"].as_str().unwrap().contains("<svg"));
    assert_eq!(app.remote.submit_calls(), 0);
    assert_eq!(app.remote.poll_calls("41"), 1);
}

#[tokio::test]
async fn test_results_route_rejects_unknown_kind() {
    let app = TestApp::new();
    let response = app
        .router()
        .oneshot(test_request("POST", "/api/results/41?kind=everything"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.remote.poll_calls("41"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_pointer_click_pins_node_panel() {
    let app = TestApp::new();
    app.remote.queue_poll("1", Ok(tree_result("1")));
    app.router()
        .oneshot(test_request("POST", "/api/submit/tree-only"))
        .await
        .unwrap();
    tokio::time::sleep(POLL_INTERVAL * 2).await;

    // Frame coordinates of the root node
    let root = {
        let session = app.state.session().lock().await;
        let view = session.tree_view().expect("tree rendered");
        let scene = view.scene();
        scene.to_frame(scene.node("N1").unwrap().position)
    };

    let response = app
        .router()
        .oneshot(json_request(
            "/api/pointer",
            json!({"event": "click", "x": root.x, "y": root.y}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["target"], json!({"type": "node", "name": "N1"}));

    let session = app.state.session().lock().await;
    let panel = session.surface().get(RenderTarget::NodePanel).unwrap();
    assert!(panel.contains("N1"));
    assert!(session.surface().get(RenderTarget::Reveal).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_zoomed_click_hits_the_zoomed_node() {
    let app = TestApp::new();
    let response = app
        .router()
        .oneshot(json_request("/api/zoom", json!({"action": "zoom", "factor": 2.0, "x": 0.0, "y": 0.0})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(extract_json(response.into_body()).await["zoom"], Value::Null);

    app.remote.queue_poll("1", Ok(tree_result("1")));
    app.router()
        .oneshot(test_request("POST", "/api/submit/tree-only"))
        .await
        .unwrap();
    tokio::time::sleep(POLL_INTERVAL * 2).await;

    let response = app
        .router()
        .oneshot(json_request("/api/zoom", json!({"action": "zoom", "factor": 2.0, "x": 0.0, "y": 0.0})))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["zoom"]["scale"], 2.0);
    let response = app
        .router()
        .oneshot(json_request("/api/zoom", json!({"action": "pan", "dx": 30.0, "dy": -12.0})))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["zoom"], json!({"scale": 2.0, "x": 30.0, "y": -12.0}));

    let leaf = {
        let session = app.state.session().lock().await;
        let view = session.tree_view().expect("tree rendered");
        let scene = view.scene();
        view.zoom().apply(scene.to_frame(scene.node("E").unwrap().position))
    };
    let response = app
        .router()
        .oneshot(json_request(
            "/api/pointer",
            json!({"event": "click", "x": leaf.x, "y": leaf.y}),
        ))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["target"], json!({"type": "node", "name": "E"}));

    let session = app.state.session().lock().await;
    assert!(session
        .surface()
        .get(RenderTarget::TreeCanvas)
        .unwrap()
        .contains("translate(30,-12) scale(2)"));
}
