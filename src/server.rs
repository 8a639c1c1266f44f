//!
//! drivesim HTTP server
//! --------------------
//! Axum front end exposing the simulated Google Drive v3 API surface.
//!
//! Responsibilities:
//! - Bit-exact endpoint paths for metadata CRUD, query, OAuth2 and
//!   resumable upload, so a real client library can run against it unchanged.
//! - Bearer-token gating of every data-plane endpoint via the auth engine.
//! - Translating engine-level `DriveError`s into the protocol's exact
//!   status codes and structured bodies.
//! - The upload pause gate, entered before any other work so a suspended
//!   chunk holds no lock and every other endpoint stays servable.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_RANGE, LOCATION};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Form, Json, Router};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::info;

use crate::auth::AuthorizeOutcome;
use crate::config::Config;
use crate::error::{DriveError, DriveResult};
use crate::query::{filter_fields, parse_fields};
use crate::sim::{DriveSim, SharedSim};
use crate::upload::{ChunkProgress, ContentRange, UploadGate};

/// Shared server state injected into all handlers: the simulator behind its
/// mutex, and the upload pause gate (kept outside the mutex so a suspended
/// handler blocks nothing else).
#[derive(Clone)]
pub struct AppState {
    pub sim: SharedSim,
    pub gate: Arc<UploadGate>,
}

impl AppState {
    pub fn new(config: Config) -> AppState {
        AppState { sim: DriveSim::shared(config), gate: Arc::new(UploadGate::default()) }
    }
}

/// Mount every simulated endpoint. Paths (including trailing slashes) match
/// the live service.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/upload/drive/v3/files/progress/{id}", put(upload_progress))
        .route("/upload/drive/v3/files/", post(start_upload))
        .route("/drive/v3/files/", post(create_item).get(query_items))
        .route(
            "/drive/v3/files/{id}/",
            get(get_item).delete(delete_item).patch(update_item),
        )
        .route("/oauth2/v4/token", post(oauth2_refresh))
        .route("/o/oauth2/v2/auth", get(oauth2_authorize))
        .route("/token", post(exchange_token))
        .route("/drive/customcreds", get(custom_creds))
        .with_state(state)
}

pub async fn run_with_config(config: Config) -> anyhow::Result<()> {
    let port = config.http_port;
    let state = AppState::new(config);
    let app = router(state);
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
    info!("Starting simulated Drive on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Convenience entry point reading configuration from the environment.
pub async fn run() -> anyhow::Result<()> {
    run_with_config(Config::from_env()).await
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
}

fn check_headers(sim: &DriveSim, headers: &HeaderMap) -> DriveResult<()> {
    sim.auth.check_headers(bearer(headers))
}

/// Request body that must be a JSON object.
fn json_object(body: Value) -> DriveResult<Map<String, Value>> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(DriveError::BadRequest),
    }
}

// --- OAuth2 surface ---

async fn oauth2_authorize(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, DriveError> {
    let sim = state.sim.lock();
    match sim.auth.authorize(&params)? {
        AuthorizeOutcome::Code(code) => Ok(Json(json!({"code": code})).into_response()),
        AuthorizeOutcome::Redirect(url) => {
            Ok((StatusCode::SEE_OTHER, [(LOCATION, url)]).into_response())
        }
    }
}

async fn exchange_token(
    State(state): State<AppState>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Json<Value>, DriveError> {
    let mut sim = state.sim.lock();
    let port = sim.config.http_port;
    let body = sim.auth.exchange_code(&form, port)?;
    Ok(Json(body))
}

async fn oauth2_refresh(
    State(state): State<AppState>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Json<Value>, DriveError> {
    let mut sim = state.sim.lock();
    let body = sim.auth.refresh(&form)?;
    Ok(Json(body))
}

/// Harness helper: expose the generated custom client pair so tests can
/// exercise the second valid OAuth client.
async fn custom_creds(State(state): State<AppState>) -> Json<Value> {
    let sim = state.sim.lock();
    let (id, secret) = sim.auth.custom_client();
    Json(json!({"client_id": id, "client_secret": secret}))
}

// --- metadata CRUD and query ---

async fn create_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, DriveError> {
    let mut sim = state.sim.lock();
    check_headers(&sim, &headers)?;
    let id = sim.create_item(json_object(body)?);
    Ok(Json(json!({"id": id})))
}

async fn query_items(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, DriveError> {
    let sim = state.sim.lock();
    check_headers(&sim, &headers)?;
    let q = params.get("q").map(String::as_str).unwrap_or("");
    let fields = parse_fields(params.get("fields").map(String::as_str).unwrap_or("id"));
    let files = sim.query(q, &fields)?;
    Ok(Json(json!({"files": files})))
}

async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, DriveError> {
    let sim = state.sim.lock();
    check_headers(&sim, &headers)?;
    let item = sim.read_item(&id)?;
    if params.get("alt").map(String::as_str) == Some("media") {
        let content = item.content.clone().ok_or(DriveError::BadRequest)?;
        return Ok(Bytes::from(content).into_response());
    }
    // Plain comma split here: the single-item endpoint takes bare field
    // names, not the files(..) projection used by queries.
    let fields: Vec<String> = params
        .get("fields")
        .map(String::as_str)
        .unwrap_or("id")
        .split(',')
        .map(str::to_string)
        .collect();
    Ok(Json(Value::Object(filter_fields(&item.fields, &fields))).into_response())
}

async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, DriveError> {
    let mut sim = state.sim.lock();
    check_headers(&sim, &headers)?;
    sim.update_item(&id, json_object(body)?)?;
    Ok(StatusCode::OK.into_response())
}

async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, DriveError> {
    let mut sim = state.sim.lock();
    check_headers(&sim, &headers)?;
    sim.delete_item(&id)?;
    Ok(StatusCode::OK.into_response())
}

// --- resumable upload ---

async fn start_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Result<Response, DriveError> {
    info!("Drive start upload request");
    let mut sim = state.sim.lock();
    check_headers(&sim, &headers)?;
    let upload_type = params.get("uploadType").map(String::as_str);
    let mime = headers.get("X-Upload-Content-Type").and_then(|v| v.to_str().ok());
    let declared = headers.get("X-Upload-Content-Length").and_then(|v| v.to_str().ok());
    let id = sim.start_upload(upload_type, mime, declared, json_object(body)?)?;
    let location = sim.progress_location(&id);
    Ok((StatusCode::OK, [(LOCATION, location)]).into_response())
}

/// 308 Resume Incomplete with the received range; the Range header is
/// omitted when nothing has been received yet.
fn resume_incomplete(received: u64) -> Response {
    if received == 0 {
        StatusCode::PERMANENT_REDIRECT.into_response()
    } else {
        let range = format!("bytes=0-{}", received - 1);
        (StatusCode::PERMANENT_REDIRECT, [("Range", range)]).into_response()
    }
}

async fn upload_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, DriveError> {
    // Pause gate first: while suspended no lock is held and every other
    // endpoint stays servable.
    state.gate.checkpoint().await;

    let mut sim = state.sim.lock();
    check_headers(&sim, &headers)?;
    let content_length = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or(DriveError::BadRequest)?;
    let range = headers
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .ok_or(DriveError::BadRequest)
        .and_then(ContentRange::parse)?;
    match sim.upload_chunk(&id, range, content_length, &body)? {
        ChunkProgress::Complete { id } => Ok(Json(json!({"id": id})).into_response()),
        ChunkProgress::Incomplete { received } => Ok(resume_incomplete(received)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resume_incomplete_omits_range_at_zero() {
        let resp = resume_incomplete(0);
        assert_eq!(resp.status(), StatusCode::PERMANENT_REDIRECT);
        assert!(resp.headers().get("Range").is_none());

        let resp = resume_incomplete(1024);
        assert_eq!(resp.status(), StatusCode::PERMANENT_REDIRECT);
        assert_eq!(resp.headers().get("Range").unwrap(), "bytes=0-1023");
    }

    #[test]
    fn json_object_rejects_non_objects() {
        assert!(json_object(json!({"a": 1})).is_ok());
        assert_eq!(json_object(json!([1, 2])).unwrap_err(), DriveError::BadRequest);
        assert_eq!(json_object(json!("x")).unwrap_err(), DriveError::BadRequest);
    }
}
