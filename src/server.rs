//! Diagnostic HTTP surface using axum.
//!
//! Everything except `/health` is forwarded to the scheduler task as a
//! [`ControlCommand`], so handlers never touch the browser directly.

use crate::core::config::HttpConfig;
use crate::errors::WatchError;
use crate::scheduler::{ControlCommand, SharedStatus, WatchStatus};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

/// Shared application state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    status: SharedStatus,
    commands: mpsc::Sender<ControlCommand>,
}

impl AppState {
    pub fn new(status: SharedStatus, commands: mpsc::Sender<ControlCommand>) -> Self {
        Self { status, commands }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    ok: bool,
    #[serde(flatten)]
    status: WatchStatus,
}

#[derive(Debug, Serialize)]
struct BaselineResponse {
    ok: bool,
    baselined: usize,
}

#[derive(Debug, Serialize)]
struct RowCountResponse {
    ok: bool,
    frame: Option<String>,
    frames_searched: usize,
    count: usize,
}

#[derive(Debug, Serialize)]
struct RowsRawResponse {
    ok: bool,
    frame: Option<String>,
    count: usize,
    rows: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    ok: bool,
    error: String,
}

/// Failure of a forwarded command.
#[derive(Debug)]
enum ApiError {
    /// The scheduler task is gone or dropped the request.
    Unavailable,
    Watch(WatchError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "watcher is not running".to_string(),
            ),
            ApiError::Watch(WatchError::NoActiveSession) => (
                StatusCode::SERVICE_UNAVAILABLE,
                WatchError::NoActiveSession.to_string(),
            ),
            ApiError::Watch(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };
        (status, Json(ErrorBody { ok: false, error })).into_response()
    }
}

/// Create the axum router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/baseline", get(baseline).post(baseline))
        .route("/rows/count", get(rows_count))
        .route("/rows/raw", get(rows_raw))
        .with_state(state)
}

async fn request<T>(
    state: &AppState,
    build: impl FnOnce(oneshot::Sender<crate::errors::Result<T>>) -> ControlCommand,
) -> Result<T, ApiError> {
    let (reply, answer) = oneshot::channel();
    state
        .commands
        .send(build(reply))
        .await
        .map_err(|_| ApiError::Unavailable)?;
    answer
        .await
        .map_err(|_| ApiError::Unavailable)?
        .map_err(ApiError::Watch)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = state.status.read().await.clone();
    Json(HealthResponse { ok: true, status })
}

async fn baseline(State(state): State<AppState>) -> Result<Json<BaselineResponse>, ApiError> {
    let baselined = request(&state, |reply| ControlCommand::Baseline { reply }).await?;
    info!(baselined, "baseline requested over http");
    Ok(Json(BaselineResponse { ok: true, baselined }))
}

async fn rows_count(State(state): State<AppState>) -> Result<Json<RowCountResponse>, ApiError> {
    let inspection = request(&state, |reply| ControlCommand::Inspect { reply }).await?;
    Ok(Json(RowCountResponse {
        ok: true,
        frame: inspection.frame,
        frames_searched: inspection.frames_searched,
        count: inspection.row_count,
    }))
}

async fn rows_raw(State(state): State<AppState>) -> Result<Json<RowsRawResponse>, ApiError> {
    let inspection = request(&state, |reply| ControlCommand::Inspect { reply }).await?;
    Ok(Json(RowsRawResponse {
        ok: true,
        frame: inspection.frame,
        count: inspection.row_count,
        rows: inspection.rows,
    }))
}

/// Bind and serve until the process exits.
pub async fn run_server(config: HttpConfig, state: AppState) -> crate::errors::Result<()> {
    let addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "diagnostic server listening");

    if let Err(e) = axum::serve(listener, create_router(state)).await {
        warn!(error = %e, "diagnostic server stopped");
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RowInspection;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use serde_json::Value;
    use std::sync::Arc;
    use tokio::sync::RwLock;
    use tower::ServiceExt;

    fn status() -> SharedStatus {
        Arc::new(RwLock::new(WatchStatus::new("https://example.com/trader/42")))
    }

    /// Answers commands the way a running scheduler would.
    fn responder(mut rx: mpsc::Receiver<ControlCommand>, session: bool) {
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    ControlCommand::Baseline { reply } => {
                        let _ = reply.send(if session {
                            Ok(2)
                        } else {
                            Err(WatchError::NoActiveSession)
                        });
                    }
                    ControlCommand::Inspect { reply } => {
                        let _ = reply.send(Ok(RowInspection {
                            frame: Some("frame[0]".to_string()),
                            frames_searched: 2,
                            row_count: 1,
                            rows: vec!["<tr></tr>".to_string()],
                        }));
                    }
                }
            }
        });
    }

    async fn call(app: Router, method: Method, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_reports_status() {
        let (tx, _rx) = mpsc::channel(1);
        let shared = status();
        shared.write().await.open_positions = 3;
        let app = create_router(AppState::new(shared, tx));

        let (code, body) = call(app, Method::GET, "/health").await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["target_url"], "https://example.com/trader/42");
        assert_eq!(body["open_positions"], 3);
        assert!(body["last_scan_at"].is_null());
    }

    #[tokio::test]
    async fn test_baseline_accepts_get_and_post() {
        let (tx, rx) = mpsc::channel(4);
        responder(rx, true);
        let app = create_router(AppState::new(status(), tx));

        for method in [Method::GET, Method::POST] {
            let (code, body) = call(app.clone(), method, "/baseline").await;
            assert_eq!(code, StatusCode::OK);
            assert_eq!(body["baselined"], 2);
        }
    }

    #[tokio::test]
    async fn test_baseline_without_session_is_unavailable() {
        let (tx, rx) = mpsc::channel(4);
        responder(rx, false);
        let app = create_router(AppState::new(status(), tx));

        let (code, body) = call(app, Method::POST, "/baseline").await;
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["ok"], false);
    }

    #[tokio::test]
    async fn test_rows_endpoints() {
        let (tx, rx) = mpsc::channel(4);
        responder(rx, true);
        let app = create_router(AppState::new(status(), tx));

        let (code, body) = call(app.clone(), Method::GET, "/rows/count").await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["frame"], "frame[0]");

        let (_, body) = call(app, Method::GET, "/rows/raw").await;
        assert_eq!(body["rows"][0], "<tr></tr>");
    }

    #[tokio::test]
    async fn test_stopped_scheduler_is_unavailable() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let app = create_router(AppState::new(status(), tx));

        let (code, body) = call(app, Method::GET, "/rows/count").await;
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "watcher is not running");
    }
}
