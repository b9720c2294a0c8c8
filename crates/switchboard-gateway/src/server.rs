//! Gateway HTTP server — Axum-based routing front end
//!
//! Exposes the routing query, direct symbolic evaluation, agent
//! registration, audit inspection, and a liveness endpoint. Registration and
//! inspection are guarded by the gateway admin token; the routing query
//! authenticates the caller's own identity from out-of-band headers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use switchboard_core::{AgentDescriptor, AuditRecord, RouterService};
use switchboard_policy::AccessDecision;

use crate::auth;
use crate::protocol::{EvaluateRequest, RegisterReply, RouteReply};

/// Shared state for all request handlers
#[derive(Clone)]
pub struct GatewayState {
    pub service: Arc<RouterService>,
    pub auth_token: String,
    pub start_time: std::time::Instant,
}

/// The gateway server
pub struct GatewayServer {
    state: GatewayState,
    bind: SocketAddr,
}

impl GatewayServer {
    pub fn new(bind: SocketAddr, service: Arc<RouterService>, auth_token: String) -> Self {
        let state = GatewayState {
            service,
            auth_token,
            start_time: std::time::Instant::now(),
        };
        Self { state, bind }
    }

    /// Build the Axum router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/v1/route", get(route_handler))
            .route("/v1/symbolic/evaluate", post(evaluate_handler))
            .route(
                "/v1/agents",
                post(register_agent_handler).get(list_agents_handler),
            )
            .route("/graph-data", get(graph_data_handler))
            .route("/api/status", get(status_handler))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Start the server (blocks until shutdown)
    pub async fn run(self) -> anyhow::Result<()> {
        self.run_with_shutdown(CancellationToken::new()).await
    }

    /// Start the server, draining connections when the token is cancelled
    pub async fn run_with_shutdown(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(self.bind).await?;
        info!("Gateway listening on {}", self.bind);
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;
        Ok(())
    }

    /// Start the server in the background, returning a handle
    pub fn spawn(self, shutdown: CancellationToken) -> tokio::task::JoinHandle<anyhow::Result<()>> {
        tokio::spawn(async move { self.run_with_shutdown(shutdown).await })
    }
}

// ── Handler logic (separated from extractors for testability) ──

async fn handle_route(
    state: &GatewayState,
    query: Option<&str>,
    headers: &HeaderMap,
) -> Result<RouteReply, String> {
    let query = match query {
        Some(q) if !q.trim().is_empty() => q,
        _ => return Err("missing or empty query parameter 'q'".to_string()),
    };
    let identity = auth::identity_from_headers(headers);
    let outcome = state.service.route(query, &identity).await;
    Ok(RouteReply::from_outcome(outcome))
}

async fn handle_evaluate(
    state: &GatewayState,
    request: &EvaluateRequest,
) -> Result<AccessDecision, String> {
    if request.role.trim().is_empty() {
        return Err("'role' must not be empty".to_string());
    }
    if request.topic.trim().is_empty() {
        return Err("'topic' must not be empty".to_string());
    }
    Ok(state
        .service
        .evaluate_direct(request.role.trim(), request.topic.trim())
        .await)
}

async fn handle_register(
    state: &GatewayState,
    agent: AgentDescriptor,
) -> Result<RegisterReply, String> {
    let id = agent.id.clone();
    state
        .service
        .registry()
        .register(agent)
        .await
        .map_err(|e| e.to_string())?;
    Ok(RegisterReply {
        id,
        status: "registered".to_string(),
    })
}

fn handle_graph_data(state: &GatewayState, limit: usize) -> Vec<AuditRecord> {
    state.service.audit().recent(limit)
}

// ── HTTP Handlers ──

#[derive(Debug, Deserialize)]
struct RouteParams {
    q: Option<String>,
}

async fn route_handler(
    State(state): State<GatewayState>,
    Query(params): Query<RouteParams>,
    headers: HeaderMap,
) -> impl IntoResponse {
    match handle_route(&state, params.q.as_deref(), &headers).await {
        Ok(reply) => (StatusCode::OK, Json(serde_json::json!(reply))),
        Err(message) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": message })),
        ),
    }
}

async fn evaluate_handler(
    State(state): State<GatewayState>,
    Json(request): Json<EvaluateRequest>,
) -> impl IntoResponse {
    match handle_evaluate(&state, &request).await {
        Ok(decision) => (StatusCode::OK, Json(serde_json::json!(decision))),
        Err(message) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": message })),
        ),
    }
}

async fn register_agent_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(agent): Json<AgentDescriptor>,
) -> impl IntoResponse {
    if !auth::check_admin_auth(&state.auth_token, &headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "unauthorized" })),
        );
    }
    match handle_register(&state, agent).await {
        Ok(reply) => (StatusCode::CREATED, Json(serde_json::json!(reply))),
        Err(message) => {
            warn!("Agent registration rejected: {}", message);
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": message })),
            )
        }
    }
}

async fn list_agents_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, StatusCode> {
    if !auth::check_admin_auth(&state.auth_token, &headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let agents = state.service.registry().list().await;
    Ok(Json(serde_json::json!({ "agents": agents })))
}

#[derive(Debug, Deserialize)]
struct GraphDataParams {
    limit: Option<usize>,
}

async fn graph_data_handler(
    State(state): State<GatewayState>,
    Query(params): Query<GraphDataParams>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, StatusCode> {
    if !auth::check_admin_auth(&state.auth_token, &headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let records = handle_graph_data(&state, params.limit.unwrap_or(usize::MAX));
    Ok(Json(serde_json::json!(records)))
}

async fn status_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed().as_secs();
    let agents = state.service.registry().count().await;
    Json(serde_json::json!({
        "status": "ok",
        "agents": agents,
        "audit_records": state.service.audit().len(),
        "uptime_secs": uptime,
    }))
}
