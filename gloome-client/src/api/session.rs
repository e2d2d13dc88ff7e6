//! Session endpoints
//!
//! Thin wrappers that translate HTTP requests into [`Session`](crate::session::Session)
//! calls and return the resulting snapshot.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use gloome_common::protocol::{JobKind, ProcessId};
use gloome_common::FieldValue;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::form::{DISTANCE_TOGGLE, RADIAL_TOGGLE};
use crate::layout::{DepthScale, Point, ZoomTransform};
use crate::session::SessionSnapshot;
use crate::view::HitTarget;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub ticket: u64,
    pub kind: JobKind,
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub id: String,
    pub value: bool,
}

#[derive(Debug, Deserialize)]
pub struct ValueRequest {
    pub id: String,
    pub value: FieldValue,
}

#[derive(Debug, Deserialize)]
pub struct DisplayRequest {
    pub radial: Option<bool>,
    pub show_distance: Option<bool>,
    pub depth_scale: Option<DepthScale>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerEvent {
    Move,
    Leave,
    Click,
}

#[derive(Debug, Deserialize)]
pub struct PointerRequest {
    pub event: PointerEvent,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

#[derive(Debug, Serialize)]
pub struct PointerResponse {
    pub target: Option<HitTarget>,
}

/// Wheel and drag gestures over the tree, in frame coordinates
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ZoomRequest {
    Zoom { factor: f64, x: f64, y: f64 },
    Pan { dx: f64, dy: f64 },
    Reset,
}

/// Current zoom; `None` while no tree is shown
#[derive(Debug, Serialize)]
pub struct ZoomResponse {
    pub zoom: Option<ZoomTransform>,
}

#[derive(Debug, Deserialize)]
pub struct ResultsQuery {
    pub kind: Option<String>,
}

/// GET /api/state
pub async fn get_state(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.session().lock().await.snapshot())
}

/// POST /api/submit/:kind
///
/// Validates the form, supersedes any live job and starts a new one.
pub async fn submit(State(state): State<AppState>, Path(kind): Path<String>) -> ApiResult<Json<SubmitResponse>> {
    let kind: JobKind = kind.parse().map_err(|e: gloome_common::Error| ApiError::BadRequest(e.to_string()))?;
    state.session().lock().await.validate()?;

    let handle = state.runner.submit_superseding(kind).await?;
    info!(session_id = %state.session_id, ticket = handle.ticket.value(), kind = %kind, "Job started");
    Ok(Json(SubmitResponse {
        ticket: handle.ticket.value(),
        kind,
    }))
}

/// POST /api/results/:process_id
///
/// Reattaches to a job the service already accepted. `?kind=` picks how the
/// result is read; defaults to combined.
pub async fn resume(
    State(state): State<AppState>,
    Path(process_id): Path<String>,
    Query(query): Query<ResultsQuery>,
) -> ApiResult<Json<SubmitResponse>> {
    let kind = match query.kind {
        Some(kind) => kind.parse().map_err(|e: gloome_common::Error| ApiError::BadRequest(e.to_string()))?,
        None => JobKind::Combined,
    };
    if process_id.trim().is_empty() {
        return Err(ApiError::BadRequest("process id is empty".to_string()));
    }

    let handle = state.runner.resume(kind, ProcessId::new(process_id.trim())).await?;
    info!(session_id = %state.session_id, ticket = handle.ticket.value(), process_id = %process_id, "Job resumed");
    Ok(Json(SubmitResponse {
        ticket: handle.ticket.value(),
        kind,
    }))
}

/// POST /api/toggle
pub async fn toggle(State(state): State<AppState>, Json(req): Json<ToggleRequest>) -> ApiResult<Json<SessionSnapshot>> {
    let mut session = state.session().lock().await;
    session.on_toggle_changed(&req.id, req.value)?;
    Ok(Json(session.snapshot()))
}

/// POST /api/value
pub async fn set_value(State(state): State<AppState>, Json(req): Json<ValueRequest>) -> ApiResult<Json<SessionSnapshot>> {
    let mut session = state.session().lock().await;
    session.on_value_changed(&req.id, req.value)?;
    Ok(Json(session.snapshot()))
}

/// POST /api/display
pub async fn display(State(state): State<AppState>, Json(req): Json<DisplayRequest>) -> ApiResult<Json<SessionSnapshot>> {
    let mut session = state.session().lock().await;
    for (id, value) in [(RADIAL_TOGGLE, req.radial), (DISTANCE_TOGGLE, req.show_distance)] {
        if let Some(value) = value {
            session.on_toggle_changed(id, value)?;
        }
    }
    if let Some(scale) = req.depth_scale {
        session.set_depth_scale(scale)?;
    }
    Ok(Json(session.snapshot()))
}

/// POST /api/pointer
pub async fn pointer(State(state): State<AppState>, Json(req): Json<PointerRequest>) -> Json<PointerResponse> {
    let point = Point::new(req.x, req.y);
    let mut session = state.session().lock().await;
    let target = match req.event {
        PointerEvent::Move => session.pointer_move(point),
        PointerEvent::Leave => {
            session.pointer_leave();
            None
        }
        PointerEvent::Click => {
            let target = session.click(point, Instant::now());
            if let Some(deadline) = session.reveal_deadline() {
                state.runner.schedule_reveal_close(deadline);
            }
            target
        }
    };
    Json(PointerResponse { target })
}

/// POST /api/zoom
pub async fn zoom(State(state): State<AppState>, Json(req): Json<ZoomRequest>) -> Json<ZoomResponse> {
    let mut session = state.session().lock().await;
    match req {
        ZoomRequest::Zoom { factor, x, y } => session.zoom(factor, Point::new(x, y)),
        ZoomRequest::Pan { dx, dy } => session.pan(dx, dy),
        ZoomRequest::Reset => session.reset_zoom(),
    };
    Json(ZoomResponse {
        zoom: session.tree_view().map(|view| *view.zoom()),
    })
}

/// POST /api/clear
pub async fn clear(State(state): State<AppState>) -> Json<SessionSnapshot> {
    let mut session = state.session().lock().await;
    session.clear_form();
    Json(session.snapshot())
}

/// POST /api/example/:mode
pub async fn load_example(State(state): State<AppState>, Path(mode): Path<u8>) -> ApiResult<Json<SessionSnapshot>> {
    let example = state.runner.remote().fetch_example(mode).await?;
    let mut session = state.session().lock().await;
    session.prefill_example(&example);
    Ok(Json(session.snapshot()))
}

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/submit/:kind", post(submit))
        .route("/api/toggle", post(toggle))
        .route("/api/value", post(set_value))
        .route("/api/display", post(display))
        .route("/api/pointer", post(pointer))
        .route("/api/zoom", post(zoom))
        .route("/api/results/:process_id", post(resume))
        .route("/api/clear", post(clear))
        .route("/api/example/:mode", post(load_example))
}
