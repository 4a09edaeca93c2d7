use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query,
    },
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use telemetry_shared::{LiveUpdate, TelemetryRecord};
use tokio::sync::broadcast::{self, error::RecvError};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    status::{RelayError, StatusRelay},
    store::TelemetryStore,
};

pub type LiveSender = broadcast::Sender<LiveUpdate>;
type LiveReceiver = broadcast::Receiver<LiveUpdate>;

/// Everything the handlers share. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TelemetryStore>,
    pub relay: Arc<StatusRelay>,
    pub live: LiveSender,
    /// Device queried by a bare `GET /status`.
    pub status_device: u32,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound,
    Relay(RelayError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.to_string())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.to_string())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.to_string())
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        ApiError::Relay(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "data not found!".to_owned()),
            ApiError::Relay(err) => {
                let status = match err {
                    RelayError::UnknownDevice(_) => StatusCode::NOT_FOUND,
                    RelayError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                    RelayError::Unreachable { .. } | RelayError::MalformedBody { .. } => {
                        StatusCode::BAD_GATEWAY
                    }
                };
                warn!("status relay failed: {err}");
                (status, err.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Deserialize)]
struct DeviceKey {
    #[serde(default)]
    id: String,
}

#[derive(Clone, Copy, Default)]
struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/telemetry/", get(get_by_query).put(put_by_query))
        .route("/telemetry/:key", get(get_by_path).put(put_by_path))
        .route("/status", get(default_status))
        .route("/status/:id", get(status_by_id))
        .route(
            "/live",
            get(
                |req: WebSocketUpgrade, Extension(state): Extension<AppState>| async move {
                    // subscribe now so nothing sent during the upgrade is missed
                    let live = state.live.subscribe();
                    req.on_upgrade(move |ws| live_ws(ws, live))
                },
            ),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(CorsLayer::very_permissive())
                .layer(Extension(state)),
        )
}

// Extractors are taken as `Result` so every rejection answers with the
// same `{"error": ...}` body.
type TelemetryBody = Result<Json<TelemetryRecord>, JsonRejection>;
type KeyQuery = Result<Query<DeviceKey>, QueryRejection>;
type KeyPath = Result<Path<String>, PathRejection>;

async fn get_by_query(
    query: KeyQuery,
    Extension(state): Extension<AppState>,
) -> Result<Json<TelemetryRecord>, ApiError> {
    let Query(key) = query?;
    get_telemetry(&state, &key.id)
}

async fn get_by_path(
    path: KeyPath,
    Extension(state): Extension<AppState>,
) -> Result<Json<TelemetryRecord>, ApiError> {
    let Path(key) = path?;
    get_telemetry(&state, &key)
}

async fn put_by_query(
    query: KeyQuery,
    Extension(state): Extension<AppState>,
    body: TelemetryBody,
) -> Result<Json<TelemetryRecord>, ApiError> {
    let Query(key) = query?;
    put_telemetry(&state, key.id, body)
}

async fn put_by_path(
    path: KeyPath,
    Extension(state): Extension<AppState>,
    body: TelemetryBody,
) -> Result<Json<TelemetryRecord>, ApiError> {
    let Path(key) = path?;
    put_telemetry(&state, key, body)
}

async fn default_status(Extension(state): Extension<AppState>) -> Result<Response, ApiError> {
    relay_status(&state, state.status_device).await
}

async fn status_by_id(
    path: Result<Path<u32>, PathRejection>,
    Extension(state): Extension<AppState>,
) -> Result<Response, ApiError> {
    let Path(id) = path?;
    relay_status(&state, id).await
}

fn get_telemetry(state: &AppState, key: &str) -> Result<Json<TelemetryRecord>, ApiError> {
    let record = state.store.lookup(key);
    if record.is_none() && state.store.is_empty() {
        debug!("lookup of {key:?} before any device reported");
    }
    record.map(Json).ok_or(ApiError::NotFound)
}

/// The body is validated before the store is touched, so a bad write never
/// disturbs the record already held for `key`.
fn put_telemetry(
    state: &AppState,
    key: String,
    body: TelemetryBody,
) -> Result<Json<TelemetryRecord>, ApiError> {
    let Json(record) = body.map_err(|rejection| {
        debug!("rejected telemetry for {key:?}: {rejection}");
        ApiError::from(rejection)
    })?;

    state.store.upsert(key.clone(), record.clone());
    info!("stored telemetry for {key:?}, {} devices known", state.store.len());
    // nobody listening is fine
    let _ = state.live.send(LiveUpdate {
        key,
        record: record.clone(),
    });
    Ok(Json(record))
}

async fn relay_status(state: &AppState, id: u32) -> Result<Response, ApiError> {
    let reply = state.relay.fetch_status(id).await?;
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::BAD_GATEWAY);
    Ok((status, Json(reply.body)).into_response())
}

async fn live_ws(mut stream: WebSocket, mut live: LiveReceiver) {
    debug!("live subscriber connected");
    loop {
        match live.recv().await {
            Ok(update) => {
                let text = match serde_json::to_string(&update) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!("cannot encode live update: {err}");
                        continue;
                    }
                };
                let Ok(()) = stream.send(Message::Text(text)).await else {
                    break;
                };
            }
            Err(RecvError::Closed) => break,
            Err(RecvError::Lagged(skipped)) => {
                debug!("live subscriber lagged, {skipped} updates skipped");
                continue;
            }
        }
    }
    debug!("live subscriber disconnected");
}
