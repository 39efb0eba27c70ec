//! Route handlers.
//!
//! - `GET  /`               — service banner
//! - `GET  /health`         — liveness
//! - `GET  /status`         — endpoint listing
//! - `POST /query`          — answer a question, summarized tool calls
//! - `POST /harbor/query`   — answer a question, detailed tool calls (guarded)
//! - `GET  /harbor/status`  — agent status (guarded)

use std::time::Instant;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use axum::response::Json;
use chrono::{DateTime, Utc};
use harbor_agent::{AssembledAnswer, DetailedToolCall, ToolCallSummary, detailed_calls, unwrap_answer};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::SharedState;
use crate::error::ApiError;

pub const API_VERSION: &str = "1.0.0";

const MAX_QUERY_CHARS: usize = 1000;

// ── DTOs ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
    pub status: String,
    pub docs: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub agent_status: String,
    pub api_version: String,
    /// `ok`, `unavailable`, or `unknown` when no store is attached.
    pub retrieval_status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EndpointInfo {
    pub path: String,
    pub method: String,
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub server: String,
    pub agent_initialized: bool,
    pub endpoints: Vec<EndpointInfo>,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub query: String,
    pub tool_calls: Vec<ToolCallSummary>,
    pub iterations: u32,
    pub success: bool,
}

#[derive(Debug, Deserialize)]
pub struct HarborQueryRequest {
    pub query: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HarborQueryResponse {
    pub success: bool,
    pub answer: String,
    pub tool_calls: Vec<DetailedToolCall>,
    pub iterations: u32,
    /// Seconds spent answering.
    pub processing_time: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HarborStatusResponse {
    pub status: String,
    pub agent_initialized: bool,
    pub timestamp: DateTime<Utc>,
}

// ── Handlers ──────────────────────────────────────────────────────────────

pub async fn root_handler() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Harbor Agent API".into(),
        status: "running".into(),
        docs: "/status".into(),
    })
}

pub async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    let retrieval_status = match &state.store {
        None => "unknown",
        Some(store) => match store.health_check().await {
            Ok(true) => "ok",
            Ok(false) => "unavailable",
            Err(e) => {
                warn!(store = store.name(), error = %e, "Store health check failed");
                "unavailable"
            }
        },
    };
    Json(HealthResponse {
        status: "healthy".into(),
        agent_status: "ready".into(),
        api_version: API_VERSION.into(),
        retrieval_status: retrieval_status.into(),
    })
}

pub async fn status_handler() -> Json<StatusResponse> {
    let endpoint = |path: &str, method: &str, description: &str| EndpointInfo {
        path: path.into(),
        method: method.into(),
        description: description.into(),
    };
    Json(StatusResponse {
        server: "running".into(),
        agent_initialized: true,
        endpoints: vec![
            endpoint("/", "GET", "Service banner"),
            endpoint("/health", "GET", "Health check"),
            endpoint("/query", "POST", "Answer a question"),
            endpoint("/status", "GET", "Server status"),
            endpoint("/harbor/query", "POST", "Answer a question with detailed tool calls"),
            endpoint("/harbor/status", "GET", "Agent status"),
        ],
    })
}

pub async fn query_handler(
    State(state): State<SharedState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let Json(payload) = payload?;
    if payload.query.trim().is_empty() {
        return Err(ApiError::BadRequest("Query must not be empty".into()));
    }

    info!(query_chars = payload.query.chars().count(), "Query received");
    let result = state.query_loop.process_query(&payload.query).await;
    let assembled = AssembledAnswer::from_result(&result);
    info!(iterations = assembled.iterations, success = assembled.success, "Query answered");

    Ok(Json(QueryResponse {
        answer: assembled.answer,
        query: payload.query,
        tool_calls: assembled.tool_calls,
        iterations: assembled.iterations,
        success: assembled.success,
    }))
}

pub async fn harbor_query_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    payload: Result<Json<HarborQueryRequest>, JsonRejection>,
) -> Result<Json<HarborQueryResponse>, ApiError> {
    let Json(payload) = payload?;
    let chars = payload.query.chars().count();
    if payload.query.trim().is_empty() || chars > MAX_QUERY_CHARS {
        return Err(ApiError::BadRequest(format!(
            "Query must be between 1 and {MAX_QUERY_CHARS} characters"
        )));
    }

    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let forwarded_user = header("X-Forwarded-User");
    if let Some(user) = forwarded_user {
        info!(user, roles = header("X-Forwarded-Roles").unwrap_or("-"), "Forwarded request");
    }
    let user_id = payload.user_id.as_deref().or(forwarded_user);

    let query = with_context(&payload.query, payload.context.as_deref());
    info!(user = user_id.unwrap_or("-"), query_chars = chars, "Harbor query received");

    let started = Instant::now();
    let result = state
        .query_loop
        .process_in_session(payload.session_id.as_deref(), &query)
        .await;
    let processing_time = started.elapsed().as_secs_f64();

    info!(iterations = result.iteration_count, processing_time, "Harbor query answered");

    Ok(Json(HarborQueryResponse {
        success: !result.is_catastrophic(),
        answer: unwrap_answer(&result.answer),
        tool_calls: detailed_calls(&result),
        iterations: result.iteration_count,
        processing_time,
        timestamp: Utc::now(),
    }))
}

pub async fn harbor_status_handler() -> Json<HarborStatusResponse> {
    Json(HarborStatusResponse {
        status: "active".into(),
        agent_initialized: true,
        timestamp: Utc::now(),
    })
}

fn with_context(query: &str, context: Option<&str>) -> String {
    match context.map(str::trim).filter(|c| !c.is_empty()) {
        Some(context) => format!("{query}\n\nAdditional context: {context}"),
        None => query.to_string(),
    }
}
