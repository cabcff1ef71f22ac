//! HTTP surface of the knowledge engine.
//!
//! Thin axum adapters over the builder, ranker, and assembler; all behavior
//! lives in the engine modules.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::context::ContextBundle;
use crate::core::errors::KnowledgeError;
use crate::indexer::{BuildReport, CancelToken};
use crate::query::QueryMatch;
use crate::sources::ScopeFilter;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/knowledge/build", post(build_index))
        .route("/api/knowledge/query", post(query))
        .route("/api/knowledge/context", post(assemble_context))
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct BuildRequest {
    #[serde(default)]
    home_id: Option<String>,
    #[serde(default)]
    room_id: Option<String>,
    #[serde(default)]
    floor_level: Option<i64>,
}

async fn build_index(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BuildRequest>,
) -> Result<Json<BuildReport>, KnowledgeError> {
    let scope = ScopeFilter {
        home_id: request.home_id,
        room_id: request.room_id,
        floor_level: request.floor_level,
    };

    let report = state
        .builder
        .build_index(&scope, &CancelToken::new())
        .await?;
    Ok(Json(report))
}

fn default_k() -> usize {
    5
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    text: String,
    #[serde(default)]
    home_id: Option<String>,
    #[serde(default)]
    room_id: Option<String>,
    #[serde(default)]
    floor_level: Option<i64>,
    #[serde(default = "default_k")]
    k: usize,
}

async fn query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<Vec<QueryMatch>>, KnowledgeError> {
    let filters = ScopeFilter {
        home_id: request.home_id,
        room_id: request.room_id,
        floor_level: request.floor_level,
    };

    let matches = state.ranker.query(&request.text, &filters, request.k).await?;
    Ok(Json(matches))
}

#[derive(Debug, Deserialize)]
struct ContextRequest {
    text: String,
    #[serde(default)]
    home_id: Option<String>,
    #[serde(default)]
    room_id: Option<String>,
    #[serde(default)]
    floor_level: Option<i64>,
    #[serde(default = "default_k")]
    k: usize,
    #[serde(default)]
    include_media: bool,
}

async fn assemble_context(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ContextRequest>,
) -> Result<Json<ContextBundle>, KnowledgeError> {
    let filters = ScopeFilter {
        home_id: request.home_id,
        room_id: request.room_id,
        floor_level: request.floor_level,
    };

    let bundle = state
        .assembler
        .assemble_context(&request.text, &filters, request.k, request.include_media)
        .await?;
    Ok(Json(bundle))
}
