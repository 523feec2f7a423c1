//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with one endpoint per query kind
//! - Wire up middleware (tracing, timeout, request ID)
//! - Run each query on a blocking worker thread
//! - Map handler status to HTTP status codes

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{DatasetMode, EngineConfig};
use crate::dataset::GenerationId;
use crate::engine::{Engine, Query, Reply, Status};
use crate::gate::GateStats;
use crate::handlers::{
    ErrorBody, HandlerError, HandlerResult, MatchRequest, NearestRequest, RouteRequest,
    TableRequest, TileRequest, TripRequest,
};
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

/// Body of `GET /status`.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub mode: DatasetMode,
    pub generation: GenerationId,
    pub dataset: String,
    pub gate: Option<GateStats>,
}

/// HTTP front end of the engine.
pub struct HttpServer {
    router: Router,
    config: EngineConfig,
}

impl HttpServer {
    pub fn new(config: EngineConfig, engine: Arc<Engine>) -> Self {
        let router = Self::build_router(&config, AppState { engine });
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &EngineConfig, state: AppState) -> Router {
        Router::new()
            .route("/route", post(route_handler))
            .route("/table", post(table_handler))
            .route("/nearest", post(nearest_handler))
            .route("/trip", post(trip_handler))
            .route("/match", post(match_handler))
            .route("/tile/{z}/{x}/{y}", get(tile_handler))
            .route("/query", post(query_handler))
            .route("/health", get(health_handler))
            .route("/status", get(status_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
                    .layer(propagate_request_id_layer()),
            )
    }

    /// Run the server until Ctrl+C or until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => tracing::info!("Shutdown signal received"),
                    _ = shutdown.recv() => tracing::info!("Shutdown triggered"),
                }
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

fn status_code(status: Status) -> StatusCode {
    match status {
        Status::Ok => StatusCode::OK,
        Status::Error => StatusCode::BAD_REQUEST,
    }
}

fn error_response(code: StatusCode, body: ErrorBody) -> Response {
    (code, Json(body)).into_response()
}

fn invalid_query(message: String) -> Response {
    error_response(StatusCode::BAD_REQUEST, HandlerError::InvalidQuery(message).body())
}

/// Run `query` on a blocking worker and turn its outcome into a response.
async fn run_query<T, F>(
    state: AppState,
    headers: &HeaderMap,
    kind: &'static str,
    query: F,
    render: fn(T) -> Response,
) -> Response
where
    T: Send + 'static,
    F: FnOnce(&Engine) -> (Status, HandlerResult<T>) + Send + 'static,
{
    let request_id = request_id(headers);
    tracing::debug!(request_id = %request_id, kind, "Query received");

    let engine = Arc::clone(&state.engine);
    match tokio::task::spawn_blocking(move || query(&engine)).await {
        Ok((status, result)) => {
            let code = status_code(status);
            match result {
                Ok(output) => {
                    let mut response = render(output);
                    *response.status_mut() = code;
                    response
                }
                Err(e) => {
                    tracing::debug!(request_id = %request_id, kind, code = e.code(), "Query rejected");
                    error_response(code, e.body())
                }
            }
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, kind, error = %e, "Query worker failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    code: "InternalError".into(),
                    message: "Query worker failed".into(),
                },
            )
        }
    }
}

fn json<T: Serialize>(output: T) -> Response {
    Json(output).into_response()
}

fn geojson(body: String) -> Response {
    ([(header::CONTENT_TYPE, "application/geo+json")], body).into_response()
}

async fn route_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<RouteRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(p) => p,
        Err(rejection) => return invalid_query(rejection.body_text()),
    };
    run_query(state, &headers, "route", move |e| e.route(&request), json).await
}

async fn table_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<TableRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(p) => p,
        Err(rejection) => return invalid_query(rejection.body_text()),
    };
    run_query(state, &headers, "table", move |e| e.table(&request), json).await
}

async fn nearest_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<NearestRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(p) => p,
        Err(rejection) => return invalid_query(rejection.body_text()),
    };
    run_query(state, &headers, "nearest", move |e| e.nearest(&request), json).await
}

async fn trip_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<TripRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(p) => p,
        Err(rejection) => return invalid_query(rejection.body_text()),
    };
    run_query(state, &headers, "trip", move |e| e.trip(&request), json).await
}

async fn match_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<MatchRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(p) => p,
        Err(rejection) => return invalid_query(rejection.body_text()),
    };
    run_query(state, &headers, "match", move |e| e.matching(&request), json).await
}

async fn tile_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    path: Result<Path<(u32, u32, u32)>, PathRejection>,
) -> Response {
    let Path((z, x, y)) = match path {
        Ok(p) => p,
        Err(rejection) => return invalid_query(rejection.body_text()),
    };
    let request = TileRequest { z, x, y };
    run_query(state, &headers, "tile", move |e| e.tile(&request), geojson).await
}

async fn query_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Query>, JsonRejection>,
) -> Response {
    let Json(query) = match payload {
        Ok(p) => p,
        Err(rejection) => return invalid_query(rejection.body_text()),
    };
    let kind = query.kind();
    let dispatch = move |e: &Engine| {
        let (status, reply) = e.dispatch(&query);
        (status, Ok::<Reply, HandlerError>(reply))
    };
    run_query(state, &headers, kind, dispatch, json).await
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "generation": state.engine.current_generation(),
    }))
}

async fn status_handler(State(state): State<AppState>) -> Json<EngineStatus> {
    let engine = &state.engine;
    Json(EngineStatus {
        mode: engine.mode(),
        generation: engine.current_generation(),
        dataset: engine.dataset().name().to_string(),
        gate: engine.gate_stats(),
    })
}
