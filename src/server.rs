use std::{collections::HashMap, convert::Infallible, pin::Pin, sync::Arc};

use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    http::{HeaderName, HeaderValue},
    response::{
        sse::{Event, KeepAlive},
        Sse,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::Stream;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::{
    config::ServerConfig,
    coordinator::{ScanCoordinator, ScanTuning},
    emitter,
    error::{ApiError, RequestError},
    params::{check_access_key, ScanPayload, ScanQuery},
    probe::Probe,
    types::{BatchScanResponse, ScanEvent, ScanRequest},
};

/// Events buffered between a session and its SSE response.
const EVENT_BUFFER: usize = 64;

type EventStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send + 'static>>;

#[derive(Clone)]
pub struct AppState {
    access_key: Arc<str>,
    probe: Arc<dyn Probe>,
    tuning: ScanTuning,
}

impl AppState {
    pub fn new(config: &ServerConfig, probe: Arc<dyn Probe>) -> Self {
        Self {
            access_key: Arc::from(config.access_key.as_str()),
            probe,
            tuning: config.tuning.clone(),
        }
    }

    fn coordinator(&self, request: ScanRequest) -> ScanCoordinator {
        ScanCoordinator::new(request, self.probe.clone()).with_tuning(self.tuning.clone())
    }
}

/// Build the HTTP surface: `/sse`, `/scan`, `/health` and the index page.
pub fn router(config: &ServerConfig, probe: Arc<dyn Probe>) -> Router {
    let state = AppState::new(config, probe);

    let sse = get(sse_scan).layer(SetResponseHeaderLayer::overriding(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    ));

    let app = Router::new()
        .route("/sse", sse)
        .route("/scan", post(batch_scan))
        .route("/health", get(health));

    let app = if config.has_ui() {
        app.route_service("/", ServeFile::new(config.ui_index()))
    } else {
        app.route("/", get(api_info))
    };

    app.fallback_service(ServeDir::new(&config.ui_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn spawn_server(config: ServerConfig, probe: Arc<dyn Probe>) -> Result<()> {
    let app = router(&config, probe);
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;

    tracing::info!(addr = %listener.local_addr()?, "portstream listening");
    if config.has_ui() {
        tracing::info!(path = %config.ui_index().display(), "web interface enabled");
    } else {
        tracing::info!(dir = %config.ui_dir.display(), "web interface disabled (no index.html)");
    }
    tracing::info!("endpoints: GET / | GET /sse | POST /scan | GET /health");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}

async fn sse_scan(
    State(app): State<AppState>,
    fields: Result<Query<HashMap<String, String>>, QueryRejection>,
    query: Result<Query<ScanQuery>, QueryRejection>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream: EventStream = match open_stream_session(&app, fields, query) {
        Ok(request) => {
            let cancel = CancellationToken::new();
            let (tx, rx) = mpsc::channel(EVENT_BUFFER);
            let coordinator = app.coordinator(request);
            let session_cancel = cancel.clone();
            tokio::spawn(async move {
                let outcome = coordinator.run(tx, session_cancel).await;
                tracing::debug!(state = %outcome.state(), "stream session finished");
            });
            Box::pin(emitter::event_stream(rx, cancel.drop_guard()))
        }
        Err(e) => {
            tracing::warn!(error = %e, "rejected stream scan");
            Box::pin(emitter::single_event(ScanEvent::error(e.to_string())))
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// The key is read leniently first so a bad credential is reported even when
/// the rest of the query does not decode.
fn open_stream_session(
    app: &AppState,
    fields: Result<Query<HashMap<String, String>>, QueryRejection>,
    query: Result<Query<ScanQuery>, QueryRejection>,
) -> Result<ScanRequest, RequestError> {
    let key = fields.ok().and_then(|Query(mut fields)| fields.remove("key"));
    check_access_key(&app.access_key, key.as_deref())?;
    let Query(query) = query.map_err(|_| RequestError::InvalidParameters)?;
    query.params()?.validate()
}

async fn batch_scan(
    State(app): State<AppState>,
    payload: Result<Json<ScanPayload>, JsonRejection>,
) -> Result<Json<BatchScanResponse>, ApiError> {
    let Json(payload) = payload.map_err(|e| {
        tracing::debug!(error = %e, "unreadable batch payload");
        RequestError::InvalidParameters
    })?;
    check_access_key(&app.access_key, payload.key.as_deref()).inspect_err(|e| {
        tracing::warn!(error = %e, "rejected batch scan");
    })?;
    let request = payload.params().validate()?;

    let (ip, start_port, end_port) = (request.host.clone(), request.start_port, request.end_port);
    let report = app.coordinator(request).collect(CancellationToken::new()).await?;

    Ok(Json(BatchScanResponse {
        ip,
        start_port,
        end_port,
        report,
    }))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "portstream",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn api_info() -> Json<Value> {
    Json(json!({
        "service": "portstream",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "/": "Web interface (if index.html exists in the UI directory)",
            "/sse": "Server-sent event scan stream (GET)",
            "/scan": "Batch scan returning the full result (POST)",
            "/health": "Health check",
        },
        "example": {
            "sse": "/sse?key=<access-key>&ip=127.0.0.1&start_port=1&end_port=1000&threads=20&timeout=0.5",
            "scan": "POST /scan with JSON body: {\"key\":\"<access-key>\",\"ip\":\"127.0.0.1\",\"start_port\":1,\"end_port\":1000}",
        },
        "note": "Put index.html in the UI directory to enable the web interface",
    }))
}
