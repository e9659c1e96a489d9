//! HTTP service surface
//!
//! Thin axum layer over the store, the embedder and the cleanup engine.
//! Cleanup execution demands an explicit `confirm_deletion` flag and re-runs
//! the analysis before executing, so the executor never acts on a report
//! that has gone stale since the caller reviewed it.

use anyhow::Result;
use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cleanup::{CleanupAction, CleanupAnalyzer, CleanupError, CleanupExecutor};
use crate::config::{
    ServerConfig, DEFAULT_CONSOLIDATION_THRESHOLD, DEFAULT_SIMILARITY_THRESHOLD,
    STRICT_SIMILARITY_THRESHOLD,
};
use crate::embedding::{EmbeddingProvider, FastEmbedProvider};
use crate::memory::{LocalMemoryStore, MemoryRecord, MemoryStore};

pub struct AppState {
    pub store: Arc<dyn MemoryStore>,
    pub embedder: Arc<dyn EmbeddingProvider>,
}

#[derive(Debug)]
struct ServerError(anyhow::Error);

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = if self.0.downcast_ref::<CleanupError>().is_some() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let message = format!("{}", self.0);
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl<E> From<E> for ServerError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Deserialize)]
struct StoreMemoryRequest {
    content: String,
    /// Comma-joined tag tokens
    tags: Option<String>,
    importance: Option<f64>,
    source: Option<String>,
}

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    top_k: Option<usize>,
    tag: Option<String>,
}

#[derive(Deserialize)]
struct AnalyzeCleanupRequest {
    similarity_threshold: Option<f32>,
    consolidation_threshold: Option<f32>,
    /// Only surface all-but-identical pairs as near-duplicates. Ignored
    /// when an explicit similarity_threshold is given.
    #[serde(default)]
    strict: bool,
}

#[derive(Deserialize)]
struct ExecuteCleanupRequest {
    actions_to_execute: Vec<String>,
    #[serde(default)]
    confirm_deletion: bool,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/count", get(count_handler))
        .route("/memories", post(store_handler))
        .route("/memories/{id}", get(get_handler))
        .route("/memories/{id}", delete(delete_handler))
        .route("/search", post(search_handler))
        .route("/cleanup/analyze", post(analyze_cleanup_handler))
        .route("/cleanup/execute", post(execute_cleanup_handler))
        .with_state(state)
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    let store = LocalMemoryStore::new(&config.memory_path)?;
    let state = Arc::new(AppState {
        store: Arc::new(store),
        embedder: Arc::new(FastEmbedProvider::new()),
    });

    let app = router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    info!("Memory server listening at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ServerError> {
    let count = state.store.count().await?;
    Ok(Json(json!({
        "status": "ok",
        "model": state.embedder.model_name(),
        "memories": count,
    })))
}

async fn count_handler(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ServerError> {
    let count = state.store.count().await?;
    Ok(Json(json!({ "count": count })))
}

async fn store_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<StoreMemoryRequest>,
) -> Result<Json<Value>, ServerError> {
    let embedding = state
        .embedder
        .embed(&[payload.content.clone()])
        .await?
        .into_iter()
        .next();

    let mut record = MemoryRecord::new(payload.content)
        .with_importance(payload.importance.unwrap_or(5.0))
        .with_source(payload.source.unwrap_or_else(|| "api".to_string()));
    if let Some(tags) = payload.tags {
        record.metadata.insert("tags".to_string(), Value::String(tags));
    }
    record.embedding = embedding;

    let id = state.store.insert(record).await?;
    state.store.persist().await?;
    Ok(Json(json!({ "status": "stored", "id": id })))
}

async fn get_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ServerError> {
    match state.store.get(&id).await? {
        Some(record) => Ok(Json(record).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "status": "not_found", "id": id })),
        )
            .into_response()),
    }
}

async fn delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ServerError> {
    let deleted = state.store.delete(&id).await?;
    if deleted {
        state.store.persist().await?;
        Ok(Json(json!({ "status": "deleted", "id": id })))
    } else {
        Ok(Json(json!({ "status": "not_found", "id": id })))
    }
}

async fn search_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SearchRequest>,
) -> Result<Json<Value>, ServerError> {
    let query_embedding = state
        .embedder
        .embed(&[payload.query.clone()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))?;

    let hits = state
        .store
        .search_similar(
            &query_embedding,
            payload.top_k.unwrap_or(5),
            payload.tag.as_deref(),
        )
        .await?;
    Ok(Json(json!({ "memories": hits })))
}

async fn analyze_cleanup_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AnalyzeCleanupRequest>,
) -> Result<Json<Value>, ServerError> {
    let similarity_threshold = payload.similarity_threshold.unwrap_or(if payload.strict {
        STRICT_SIMILARITY_THRESHOLD
    } else {
        DEFAULT_SIMILARITY_THRESHOLD
    });
    let consolidation_threshold = payload
        .consolidation_threshold
        .unwrap_or(DEFAULT_CONSOLIDATION_THRESHOLD);

    let analyzer = CleanupAnalyzer::new(Arc::clone(&state.store));
    let report = analyzer
        .analyze(similarity_threshold, consolidation_threshold)
        .await?;

    Ok(Json(json!({
        "status": "analysis_complete",
        "analysis": report,
        "thresholds": {
            "similarity": similarity_threshold,
            "consolidation": consolidation_threshold,
        },
        "available_actions": CleanupAction::ALL.iter().map(|a| a.as_str()).collect::<Vec<_>>(),
        "next_steps": "Review the proposed actions, then call /cleanup/execute with confirm_deletion=true.",
    })))
}

async fn execute_cleanup_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ExecuteCleanupRequest>,
) -> Result<Json<Value>, ServerError> {
    if !payload.confirm_deletion {
        warn!("Cleanup execution requested without confirmation, refusing");
        return Ok(Json(json!({
            "status": "confirmation_required",
            "error": "Cleanup not executed - set confirm_deletion=true to proceed with permanent changes",
            "warning": "This operation permanently deletes duplicates or consolidates memories",
        })));
    }

    // Reject malformed action lists before touching the store at all.
    if payload.actions_to_execute.is_empty() {
        return Err(CleanupError::NoActions.into());
    }
    for action in &payload.actions_to_execute {
        CleanupAction::parse(action)?;
    }

    info!("Executing memory cleanup: {:?}", payload.actions_to_execute);

    // Re-run the analysis so the executor acts on current state, not on a
    // report the caller may have held for a while.
    let analyzer = CleanupAnalyzer::new(Arc::clone(&state.store));
    let report = analyzer
        .analyze(DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_CONSOLIDATION_THRESHOLD)
        .await?;

    let executor = CleanupExecutor::new(Arc::clone(&state.store))
        .with_embedder(Arc::clone(&state.embedder));
    let summary = executor
        .execute(&report, &payload.actions_to_execute)
        .await?;

    state.store.persist().await?;
    let final_count = state.store.count().await?;
    info!("Memory cleanup completed, {} memories remain", final_count);

    Ok(Json(json!({
        "status": "cleanup_completed",
        "execution_results": summary,
        "final_memory_count": final_count,
    })))
}
