use anyhow::Result;
use axum::{
    error_handling::HandleErrorLayer,
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    BoxError, Json, Router,
};
use clap::Args;
use crawler::{SourceConfig, WikiSource, DEFAULT_SOURCE_URL, DEFAULT_USER_AGENT};
use searchcore::persist::SledIndex;
use searchcore::{Acquire, DocumentStore, Pipeline, PostingStore, Ranker, SearchError, StoreError};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Args, Debug, Clone)]
pub struct ServiceConfig {
    /// Index database directory
    #[arg(long, env = "SEARCH_DB", default_value = "./data")]
    pub db: String,
    /// Largest `count` accepted by one ingest call
    #[arg(long, env = "MAX_BATCH", default_value_t = 200)]
    pub max_batch: usize,
    /// Per-request timeout
    #[arg(long, default_value_t = 60)]
    pub request_timeout_secs: u64,
    /// URL serving a different article on every request
    #[arg(long, env = "SOURCE_URL", default_value = DEFAULT_SOURCE_URL)]
    pub source_url: String,
    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,
    /// Timeout for a single article fetch
    #[arg(long, default_value_t = 12)]
    pub fetch_timeout_secs: u64,
    /// Token required in X-ADMIN-TOKEN for ingest calls; ingest is open when unset
    #[arg(long, env = "ADMIN_TOKEN")]
    pub admin_token: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default, alias = "q")]
    pub query: String,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct IngestParams {
    #[serde(default = "default_count")]
    pub count: usize,
}
fn default_count() -> usize { 1 }

#[derive(Clone)]
pub struct AppState {
    pub docs: Arc<dyn DocumentStore>,
    pub pipeline: Pipeline,
    pub ranker: Ranker,
    pub source: Arc<dyn Acquire>,
    pub max_batch: usize,
    pub admin_token: Option<String>,
    /// No new ingest cycle starts once this much time has passed in a request.
    pub ingest_budget: Option<Duration>,
}

impl AppState {
    pub fn new(
        docs: Arc<dyn DocumentStore>,
        postings: Arc<dyn PostingStore>,
        source: Arc<dyn Acquire>,
        max_batch: usize,
        admin_token: Option<String>,
    ) -> Self {
        Self {
            pipeline: Pipeline::new(docs.clone(), postings.clone()),
            ranker: Ranker::new(docs.clone(), postings),
            docs,
            source,
            max_batch,
            admin_token,
            ingest_budget: None,
        }
    }

    pub fn with_ingest_budget(mut self, budget: Duration) -> Self {
        self.ingest_budget = Some(budget);
        self
    }
}

/// Open the index and acquisition source described by `config`.
pub fn build_app(config: &ServiceConfig) -> Result<Router> {
    let index = SledIndex::open(&config.db)?;
    let docs: Arc<dyn DocumentStore> = Arc::new(index.documents()?);
    let postings: Arc<dyn PostingStore> = Arc::new(index.postings()?);
    let source = WikiSource::new(SourceConfig {
        url: config.source_url.clone(),
        user_agent: config.user_agent.clone(),
        timeout: Duration::from_secs(config.fetch_timeout_secs),
    })?;
    tracing::info!(db = %config.db, documents = docs.len()?, tokens = postings.token_count()?, "index ready");

    // leave room for the last fetch to finish inside the request timeout
    let request_timeout = Duration::from_secs(config.request_timeout_secs);
    let budget = request_timeout.saturating_sub(Duration::from_secs(config.fetch_timeout_secs + 1));
    let state = AppState::new(docs, postings, Arc::new(source), config.max_batch, config.admin_token.clone())
        .with_ingest_budget(budget);
    Ok(with_timeout(router(state), request_timeout))
}

/// Fail requests running longer than `timeout` with a JSON 408.
pub fn with_timeout(router: Router, timeout: Duration) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(handle_timeout))
            .timeout(timeout),
    )
}

async fn handle_timeout(err: BoxError) -> Response {
    if err.is::<tower::timeout::error::Elapsed>() {
        error_response(StatusCode::REQUEST_TIMEOUT, "request timed out")
    } else {
        error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

pub fn router(state: AppState) -> Router {
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
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/ingest", post(ingest_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

pub async fn search_handler(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Response {
    let Query(params) = match params {
        Ok(params) => params,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    let ranker = state.ranker.clone();
    let query = params.query.clone();
    let ranked = match tokio::task::spawn_blocking(move || ranker.rank(&query)).await {
        Ok(ranked) => ranked,
        Err(err) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    };
    match ranked {
        Ok(mut results) => {
            if let Some(k) = params.limit {
                results.truncate(k);
            }
            Json(results).into_response()
        }
        Err(SearchError::InvalidQuery) => error_response(StatusCode::BAD_REQUEST, "no query found"),
        Err(err @ SearchError::StorageInconsistency { .. }) => {
            tracing::error!(error = %err, query = %params.query, "index is inconsistent with the document store");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("storage inconsistency: {err}"))
        }
        Err(err) => {
            tracing::error!(error = %err, "search failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

pub async fn doc_handler(State(state): State<AppState>, doc_id: Result<Path<u64>, PathRejection>) -> Response {
    let Path(doc_id) = match doc_id {
        Ok(doc_id) => doc_id,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    let docs = state.docs.clone();
    let found = match tokio::task::spawn_blocking(move || docs.get(doc_id)).await {
        Ok(found) => found,
        Err(err) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    };
    match found {
        Ok(doc) => Json(doc).into_response(),
        Err(StoreError::NotFound(_)) => error_response(StatusCode::NOT_FOUND, "not found"),
        Err(err) => {
            tracing::error!(doc_id, error = %err, "document lookup failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

pub async fn ingest_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    params: Result<Query<IngestParams>, QueryRejection>,
) -> Response {
    if let Err((status, msg)) = authorize(&state, &headers) {
        return error_response(status, msg);
    }
    let Query(params) = match params {
        Ok(params) => params,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    if params.count == 0 || params.count > state.max_batch {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("count must be between 1 and {}", state.max_batch),
        );
    }

    let source = state.source.as_ref();
    let report = match state.ingest_budget {
        Some(budget) => state.pipeline.ingest_batch_within(source, params.count, budget).await,
        None => state.pipeline.ingest_batch(source, params.count).await,
    };
    if report.is_complete() {
        (StatusCode::OK, Json(json!({ "status": "OK", "report": report }))).into_response()
    } else if !report.ingested.is_empty() {
        (StatusCode::OK, Json(json!({ "status": "PARTIAL", "report": report }))).into_response()
    } else {
        let error = report
            .failures
            .first()
            .map(|f| f.message.clone())
            .unwrap_or_else(|| "batch deadline reached before any document was ingested".to_string());
        (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": error, "report": report }))).into_response()
    }
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), (StatusCode, String)> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Ok(()),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required.as_str() {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
