//! Routes and handlers.
//!
//! | Method | Path | Operation |
//! |---|---|---|
//! | `GET` / `PUT` | `/{model}/pva` | `getPva` / `setPva` |
//! | `GET` / `PUT` | `/{model}/geom` | `getGeom` / `setGeom` |
//! | `GET` | `/{model}/{kind}/data` | `getData` |
//! | `PUT` / `POST` | `/{model}/{kind}/cmd` | `setCommand` |
//! | `GET` / `PUT` | `/{model}/{kind}/cfg` | `getConfig` / `setConfig` |
//! | `GET` | `/models` | model tree |
//!
//! Anything else is a static file under the root directory.  API handlers
//! never touch the core; they hand the request to the event-loop thread and
//! await its reply.

use std::path::Path as FsPath;
use std::sync::Arc;

use avon_core::{ModelSummary, Outcome, Request};
use avon_types::{InterfaceKind, Operation};
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use tokio::sync::{mpsc, oneshot, watch};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::response::{ApiError, outcome_response};

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

pub(crate) enum Event {
    Request {
        request: Request,
        reply: oneshot::Sender<Outcome>,
    },
    Interrupt,
}

/// State shared by every handler.
pub(crate) struct AppState {
    pub events: mpsc::Sender<Event>,
    pub models: watch::Receiver<Arc<Vec<ModelSummary>>>,
}

pub(crate) fn router(state: Arc<AppState>, root_dir: &FsPath) -> Router {
    Router::new()
        .route("/models", get(list_models))
        .route("/{model}/pva", get(get_pva).put(set_pva))
        .route("/{model}/geom", get(get_geom).put(set_geom))
        .route("/{model}/{kind}/data", get(get_data))
        .route("/{model}/{kind}/cmd", put(set_command).post(set_command))
        .route("/{model}/{kind}/cfg", get(get_config).put(set_config))
        .fallback_service(ServeDir::new(root_dir))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn list_models(State(state): State<Arc<AppState>>) -> Response {
    let models = Arc::clone(&state.models.borrow());
    Json(models.as_slice()).into_response()
}

async fn get_pva(State(state): State<Arc<AppState>>, Path(model): Path<String>) -> Response {
    forward(&state, Request::motion(model, Operation::GetPva)).await
}

async fn set_pva(
    State(state): State<Arc<AppState>>,
    Path(model): Path<String>,
    body: Bytes,
) -> Response {
    forward(&state, Request::motion(model, Operation::SetPva).with_body(body.to_vec())).await
}

async fn get_geom(State(state): State<Arc<AppState>>, Path(model): Path<String>) -> Response {
    forward(&state, Request::motion(model, Operation::GetGeom)).await
}

async fn set_geom(
    State(state): State<Arc<AppState>>,
    Path(model): Path<String>,
    body: Bytes,
) -> Response {
    forward(&state, Request::motion(model, Operation::SetGeom).with_body(body.to_vec())).await
}

async fn get_data(
    State(state): State<Arc<AppState>>,
    Path((model, kind)): Path<(String, String)>,
) -> Response {
    interface(&state, model, &kind, Operation::GetData, Bytes::new()).await
}

async fn set_command(
    State(state): State<Arc<AppState>>,
    Path((model, kind)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    interface(&state, model, &kind, Operation::SetCommand, body).await
}

async fn get_config(
    State(state): State<Arc<AppState>>,
    Path((model, kind)): Path<(String, String)>,
) -> Response {
    interface(&state, model, &kind, Operation::GetConfig, Bytes::new()).await
}

async fn set_config(
    State(state): State<Arc<AppState>>,
    Path((model, kind)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    interface(&state, model, &kind, Operation::SetConfig, body).await
}

async fn interface(
    state: &AppState,
    model: String,
    kind: &str,
    operation: Operation,
    body: Bytes,
) -> Response {
    let kind: InterfaceKind = match kind.parse() {
        Ok(kind) => kind,
        Err(e) => return ApiError(e).into_response(),
    };
    let request = Request::new(model, kind, operation);
    let request = if operation.takes_body() {
        request.with_body(body.to_vec())
    } else {
        request
    };
    forward(state, request).await
}

/// Queue `request` for the event loop and wait for its outcome.  A loop that
/// has stopped answers `503`.
async fn forward(state: &AppState, request: Request) -> Response {
    let (reply, outcome) = oneshot::channel();
    if state.events.send(Event::Request { request, reply }).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    match outcome.await {
        Ok(outcome) => outcome_response(outcome),
        Err(_) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}
