//! Page serving routes
//!
//! `GET /` composes the page from the current render targets and control
//! states; the script keeps it in sync through the `/api` endpoints.

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};

use crate::annotation::escape_html;
use crate::form::{ControlKind, ControlState};
use crate::session::SessionSnapshot;
use crate::surface::RenderTarget;
use crate::AppState;

const APP_JS: &str = include_str!("../ui/app.js");

const SUBMIT_BUTTONS: [(&str, &str); 4] = [
    ("combined", "Run all"),
    ("tree-only", "Draw tree"),
    ("likelihood-only", "Compute likelihood"),
    ("file-list-only", "Create files"),
];

fn control_html(control: &ControlState) -> String {
    let disabled = if control.enabled { "" } else { " disabled" };
    let id = escape_html(&control.id);
    match control.kind {
        ControlKind::Toggle => format!(
            "<label><input type=\"checkbox\" data-toggle=\"{id}\"{checked}{disabled}> {id}</label>",
            id = id,
            checked = if control.value.as_bool() { " checked" } else { "" },
            disabled = disabled,
        ),
        ControlKind::Number => format!(
            "<label>{id} <input type=\"number\" step=\"any\" data-value=\"{id}\" value=\"{value}\"{disabled}></label>",
            id = id,
            value = escape_html(&control.value.to_string()),
            disabled = disabled,
        ),
        ControlKind::Text => format!(
            "<label>{id} <textarea data-value=\"{id}\"{disabled}>{value}</textarea></label>",
            id = id,
            value = escape_html(&control.value.to_string()),
            disabled = disabled,
        ),
    }
}

fn panel_html(snapshot: &SessionSnapshot, target: RenderTarget, id: &str) -> String {
    let content = snapshot.panels.get(&target).map(String::as_str).unwrap_or("");
    format!("<div id=\"{}\">{}</div>", id, content)
}

/// Full page for a snapshot
pub fn render_page(snapshot: &SessionSnapshot, service_url: &str) -> String {
    let controls: String = snapshot.controls.iter().map(control_html).collect();
    let busy = snapshot.state.is_busy();
    let buttons: String = SUBMIT_BUTTONS
        .iter()
        .map(|(kind, label)| {
            format!(
                "<button data-submit=\"{}\"{}>{}</button>",
                kind,
                if busy { " disabled" } else { "" },
                label
            )
        })
        .collect();

    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>GLOOME</title></head><body>\
         <header><h1>GLOOME</h1><small>{service}</small></header>\
         {banner}\
         <form id=\"controls\">{controls}</form>\
         <div id=\"actions\">{buttons}<button data-clear>Clear</button>\
         <button data-example=\"0\">Load example</button></div>\
         {canvas}{tooltip}{reveal}{node}{branch}{likelihood}{files}\
         <script src=\"/static/app.js\"></script></body></html>",
        service = escape_html(service_url),
        banner = panel_html(snapshot, RenderTarget::Banner, "banner"),
        controls = controls,
        buttons = buttons,
        canvas = panel_html(snapshot, RenderTarget::TreeCanvas, "tree"),
        tooltip = panel_html(snapshot, RenderTarget::Tooltip, "tooltip"),
        reveal = panel_html(snapshot, RenderTarget::Reveal, "reveal"),
        node = panel_html(snapshot, RenderTarget::NodePanel, "nodeInfo"),
        branch = panel_html(snapshot, RenderTarget::BranchPanel, "branchInfo"),
        likelihood = panel_html(snapshot, RenderTarget::LikelihoodPanel, "logLikelihood"),
        files = panel_html(snapshot, RenderTarget::FileListPanel, "fileList"),
    )
}

/// GET /
pub async fn serve_index(State(state): State<AppState>) -> Html<String> {
    let snapshot = state.session().lock().await.snapshot();
    Html(render_page(&snapshot, &state.service_url))
}

/// GET /static/app.js
pub async fn serve_app_js() -> Response {
    (StatusCode::OK, [("content-type", "application/javascript")], APP_JS).into_response()
}

pub fn ui_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(serve_index))
        .route("/static/app.js", get(serve_app_js))
}
