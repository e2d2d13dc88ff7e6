//! gloome-client library
//!
//! Client core for the GLOOME gain/loss mapping service: job lifecycle,
//! form dependencies, tree layout and annotation rendering, plus the async
//! driver and the local HTTP glue used by the `serve` subcommand.

pub mod annotation;
pub mod api;
pub mod error;
pub mod form;
pub mod job;
pub mod layout;
pub mod remote;
pub mod router;
pub mod runner;
pub mod session;
pub mod surface;
pub mod view;

pub use crate::error::{ApiError, ApiResult, ClientError, RenderError};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::runner::{JobRunner, SharedSession};
use crate::surface::PageSurface;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Drives jobs for the page session
    pub runner: Arc<JobRunner<PageSurface>>,
    /// Remote service base URL, for display
    pub service_url: String,
    /// Identifies this page session in logs
    pub session_id: Uuid,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(runner: JobRunner<PageSurface>, service_url: impl Into<String>) -> Self {
        Self {
            runner: Arc::new(runner),
            service_url: service_url.into(),
            session_id: Uuid::new_v4(),
            startup_time: Utc::now(),
        }
    }

    pub fn session(&self) -> &SharedSession<PageSurface> {
        self.runner.session()
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::ui_routes())
        .merge(api::session_routes())
        .merge(api::health_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
