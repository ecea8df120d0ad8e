use anyhow::{Context, Result};
use axum::{extract::{Path, Query, State}, http::StatusCode, routing::{get, post}, Json, Router};
use docsearch_core::evaluate::evaluate_system;
use docsearch_core::persist::{load_snapshot, IndexPaths};
use docsearch_core::{DocId, Normalizer, SearchEngine, SearchHit, SearchMode, TestQuery, TfMode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

const SNIPPET_WINDOW: usize = 150;
const SNIPPET_FALLBACK: usize = 300;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { 10 }

#[derive(Deserialize)]
pub struct TopParams {
    pub k: Option<usize>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub mode: SearchMode,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<Hit>,
}

#[derive(Serialize)]
pub struct Hit {
    #[serde(flatten)]
    pub hit: SearchHit,
    pub snippet: String,
}

#[derive(Deserialize)]
pub struct EvaluateRequest {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default)]
    pub mode: Option<String>,
    pub queries: Vec<TestQuery>,
}

#[derive(Serialize)]
pub struct EvaluateResponse {
    pub k: usize,
    pub mode: SearchMode,
    pub metrics: BTreeMap<String, f64>,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SearchEngine>,
    pub normalizer: Arc<dyn Normalizer>,
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl ToString) -> ApiError {
    (status, Json(json!({ "error": message.to_string() })))
}

fn parse_mode(mode: Option<&str>) -> Result<SearchMode, ApiError> {
    match mode {
        None => Ok(SearchMode::default()),
        Some(m) => m.parse().map_err(|e| api_error(StatusCode::BAD_REQUEST, e)),
    }
}

pub fn build_app(index_dir: String) -> Result<Router> {
    // Load the snapshot once; handlers share it read-only
    let paths = IndexPaths::new(&index_dir);
    let (index, meta) = load_snapshot(&paths).with_context(|| format!("loading index from {index_dir}"))?;
    tracing::info!(stem = meta.normalizer.stem, stopwords = meta.normalizer.stopwords, "query normalizer");
    let engine = SearchEngine::new(index, TfMode::default());
    Ok(build_router(engine, Arc::new(meta.normalizer.normalizer())))
}

pub fn build_router(engine: SearchEngine, normalizer: Arc<dyn Normalizer>) -> Router {
    let app_state = AppState { engine: Arc::new(engine), normalizer };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/stats", get(stats_handler))
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/doc/:doc_id/related", get(related_handler))
        .route("/doc/:doc_id/keywords", get(keywords_handler))
        .route("/evaluate", post(evaluate_handler))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn stats_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.engine.index().stats()))
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    let mode = parse_mode(params.mode.as_deref())?;
    let k = params.k.clamp(1, 100);

    let hits = state.engine.search(&params.q, state.normalizer.as_ref(), mode, k);
    let raw_terms: Vec<String> = params.q.split_whitespace().map(|s| s.to_string()).collect();
    let results: Vec<Hit> = hits
        .into_iter()
        .map(|hit| {
            let snippet = snippet(&hit.content, &raw_terms);
            Hit { hit, snippet }
        })
        .collect();

    let elapsed = start.elapsed();
    tracing::info!(q = %params.q, %mode, hits = results.len(), took_s = elapsed.as_secs_f64(), "search");
    Ok(Json(SearchResponse { query: params.q, mode, took_s: elapsed.as_secs_f64(), total_hits: results.len(), results }))
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<DocId>) -> Result<Json<Value>, ApiError> {
    match state.engine.document(doc_id) {
        Some(doc) => Ok(Json(json!(doc))),
        None => Err(api_error(StatusCode::NOT_FOUND, format!("document {doc_id} not found"))),
    }
}

fn require_indexed(state: &AppState, doc_id: DocId) -> Result<(), ApiError> {
    if state.engine.index().doc_length(doc_id).is_none() {
        return Err(api_error(StatusCode::NOT_FOUND, format!("document {doc_id} not found")));
    }
    Ok(())
}

pub async fn related_handler(
    State(state): State<AppState>,
    Path(doc_id): Path<DocId>,
    Query(params): Query<TopParams>,
) -> Result<Json<Vec<SearchHit>>, ApiError> {
    require_indexed(&state, doc_id)?;
    let k = params.k.unwrap_or(5).clamp(1, 100);
    Ok(Json(state.engine.related_documents(doc_id, k)))
}

pub async fn keywords_handler(
    State(state): State<AppState>,
    Path(doc_id): Path<DocId>,
    Query(params): Query<TopParams>,
) -> Result<Json<Value>, ApiError> {
    require_indexed(&state, doc_id)?;
    let k = params.k.unwrap_or(10).clamp(1, 100);
    let keywords: Vec<Value> = state
        .engine
        .keywords(doc_id, k)
        .into_iter()
        .map(|(term, weight)| json!({ "term": term, "weight": weight }))
        .collect();
    Ok(Json(json!({ "doc_id": doc_id, "keywords": keywords })))
}

pub async fn evaluate_handler(
    State(state): State<AppState>,
    Json(req): Json<EvaluateRequest>,
) -> Result<Json<EvaluateResponse>, ApiError> {
    let mode = parse_mode(req.mode.as_deref())?;
    let records = state.engine.evaluation_records(state.normalizer.as_ref(), &req.queries, mode, req.k);
    let system = evaluate_system(&records, req.k).map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;
    Ok(Json(EvaluateResponse { k: req.k, mode, metrics: system.to_map() }))
}

/// Keyword-in-context excerpt around the first raw query word found in `text`,
/// or the opening of the text when none occurs.
pub fn snippet(text: &str, raw_terms: &[String]) -> String {
    if text.is_empty() {
        return String::new();
    }
    let lower = text.to_lowercase();
    // lowercasing can change byte lengths; only trust offsets when it did not
    let first_idx = if lower.len() == text.len() {
        raw_terms
            .iter()
            .filter(|t| !t.trim().is_empty())
            .find_map(|t| lower.find(&t.to_lowercase()))
    } else {
        None
    };

    let excerpt = match first_idx {
        Some(idx) => {
            let start = floor_char_boundary(text, idx.saturating_sub(SNIPPET_WINDOW));
            let end = floor_char_boundary(text, (idx + SNIPPET_WINDOW).min(text.len()));
            let mut s = String::new();
            if start > 0 {
                s.push_str("...");
            }
            s.push_str(&text[start..end]);
            if end < text.len() {
                s.push_str("...");
            }
            s
        }
        None => {
            let head: String = text.chars().take(SNIPPET_FALLBACK).collect();
            if head.len() < text.len() { format!("{head}...") } else { head }
        }
    };
    highlight_terms(&excerpt.replace('\n', " "), raw_terms)
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn highlight_terms(snippet: &str, terms: &[String]) -> String {
    let mut s = snippet.to_string();
    for t in terms {
        if t.trim().is_empty() { continue; }
        let Ok(pat) = regex::RegexBuilder::new(&regex::escape(t)).case_insensitive(true).build() else {
            continue;
        };
        s = pat.replace_all(&s, |caps: &regex::Captures| format!("<em>{}</em>", &caps[0])).to_string();
    }
    s
}
