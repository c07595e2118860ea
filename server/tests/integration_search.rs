use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use searchcore::persist::SledIndex;
use searchcore::{
    AcquisitionError, Acquire, DocumentStore, MemoryDocumentStore, MemoryPostingStore, Pipeline, PostingStore,
    RawDocument,
};
use serde_json::Value;
use server::{build_app, router, with_timeout, AppState, ServiceConfig};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;
use tower::ServiceExt;

/// Hands out queued results in order, then fails.
struct Scripted(Mutex<VecDeque<Result<RawDocument, AcquisitionError>>>);

#[async_trait::async_trait]
impl Acquire for Scripted {
    async fn acquire(&self) -> Result<RawDocument, AcquisitionError> {
        self.0
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AcquisitionError::Fetch("source exhausted".into())))
    }
}

fn article(title: &str, content: &str) -> RawDocument {
    RawDocument {
        title: title.into(),
        link: format!("https://en.wikipedia.org/wiki/{title}"),
        content: content.into(),
    }
}

fn memory_app(queue: Vec<Result<RawDocument, AcquisitionError>>, admin_token: Option<&str>) -> Router {
    let docs: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    let postings: Arc<dyn PostingStore> = Arc::new(MemoryPostingStore::new());
    let source = Arc::new(Scripted(Mutex::new(queue.into())));
    router(AppState::new(docs, postings, source, 5, admin_token.map(String::from)))
}

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::post(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn ingest_then_search_ranks_by_overlap() {
    let app = memory_app(
        vec![Ok(article("Cats", "Cats are great pets")), Ok(article("Dogs", "Dogs are great pets"))],
        None,
    );

    let (status, json) = call(&app, post("/ingest?count=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "OK");
    assert_eq!(json["report"]["ingested"].as_array().unwrap().len(), 2);

    let (status, json) = call(&app, get("/search?query=cats%20pets")).await;
    assert_eq!(status, StatusCode::OK);
    let arr = json.as_array().unwrap();
    assert_eq!(arr.len(), 2);
    assert_eq!(arr[0]["article"]["title"], "Cats");
    assert_eq!(arr[0]["article"]["link"], "https://en.wikipedia.org/wiki/Cats");
    assert_eq!(arr[0]["rank"], 2);
    assert_eq!(arr[1]["article"]["title"], "Dogs");
    assert_eq!(arr[1]["rank"], 1);

    let (_, json) = call(&app, get("/search?q=pets&limit=1")).await;
    assert_eq!(json.as_array().unwrap().len(), 1);

    let (status, json) = call(&app, get("/search?query=xyzzy")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn blank_query_is_a_bad_request() {
    let app = memory_app(vec![], None);
    for uri in ["/search?query=", "/search?query=%20%20", "/search"] {
        let (status, json) = call(&app, get(uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(json["error"].is_string());
    }
}

#[tokio::test]
async fn partial_and_failed_batches_are_reported() {
    let app = memory_app(
        vec![Ok(article("Only", "single survivor")), Err(AcquisitionError::Rejected("status 503".into()))],
        None,
    );

    let (status, json) = call(&app, post("/ingest?count=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "PARTIAL");
    assert_eq!(json["report"]["failures"][0]["stage"], "acquisition");

    let (status, json) = call(&app, post("/ingest?count=1")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"].as_str().unwrap().contains("exhausted"));
}

#[tokio::test]
async fn batch_size_is_bounded() {
    let app = memory_app(vec![], None);
    let (status, _) = call(&app, post("/ingest?count=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = call(&app, post("/ingest?count=6")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ingest_requires_admin_token_when_configured() {
    let app = memory_app(vec![Ok(article("Guarded", "guarded text"))], Some("s3cret"));
    let (status, _) = call(&app, post("/ingest")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::post("/ingest").header("X-ADMIN-TOKEN", "s3cret").body(Body::empty()).unwrap();
    let (status, json) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "OK");
}

#[tokio::test]
async fn doc_endpoint_serves_stored_documents() {
    let app = memory_app(vec![Ok(article("Stored", "Some Stored Text"))], None);
    let (_, json) = call(&app, post("/ingest")).await;
    let id = json["report"]["ingested"][0].as_u64().unwrap();

    let (status, json) = call(&app, get(&format!("/doc/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["title"], "Stored");
    assert_eq!(json["content"], "some stored text");

    let (status, _) = call(&app, get("/doc/999999")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn dangling_posting_surfaces_as_inconsistency() {
    let docs: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    let postings = Arc::new(MemoryPostingStore::new());
    postings.add_posting("ghost", 77).unwrap();
    let source = Arc::new(Scripted(Mutex::new(VecDeque::new())));
    let app = router(AppState::new(docs, postings, source, 5, None));

    let (status, json) = call(&app, get("/search?query=ghost")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"].as_str().unwrap().starts_with("storage inconsistency"));
}

#[tokio::test]
async fn serves_a_sled_index_built_offline() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("index");
    {
        let index = SledIndex::open(&db).unwrap();
        let docs: Arc<dyn DocumentStore> = Arc::new(index.documents().unwrap());
        let postings: Arc<dyn PostingStore> = Arc::new(index.postings().unwrap());
        let pipeline = Pipeline::new(docs, postings);
        pipeline.ingest(article("Rust", "Rust is a systems programming language")).unwrap();
        pipeline.ingest(article("Go", "Go is a programming language")).unwrap();
        index.flush().unwrap();
    }

    let config = ServiceConfig {
        db: db.to_string_lossy().to_string(),
        max_batch: 10,
        request_timeout_secs: 5,
        source_url: crawler::DEFAULT_SOURCE_URL.to_string(),
        user_agent: crawler::DEFAULT_USER_AGENT.to_string(),
        fetch_timeout_secs: 1,
        admin_token: None,
    };
    let app = build_app(&config).unwrap();

    let (status, json) = call(&app, get("/search?query=rust%20programming")).await;
    assert_eq!(status, StatusCode::OK);
    let arr = json.as_array().unwrap();
    assert_eq!(arr.len(), 2);
    assert_eq!(arr[0]["article"]["title"], "Rust");
    assert_eq!(arr[0]["rank"], 2);
    assert_eq!(arr[1]["rank"], 1);
}

/// Takes `delay` per fetch and never runs dry.
struct SlowSource {
    delay: Duration,
}

#[async_trait::async_trait]
impl Acquire for SlowSource {
    async fn acquire(&self) -> Result<RawDocument, AcquisitionError> {
        tokio::time::sleep(self.delay).await;
        Ok(article("Slow", "slowly fetched article"))
    }
}

#[tokio::test]
async fn slow_batch_stops_early_and_reports_what_was_stored() {
    let docs: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    let postings: Arc<dyn PostingStore> = Arc::new(MemoryPostingStore::new());
    let source = Arc::new(SlowSource { delay: Duration::from_millis(40) });
    let state = AppState::new(docs.clone(), postings, source, 50, None).with_ingest_budget(Duration::from_millis(150));
    let app = with_timeout(router(state), Duration::from_secs(5));

    let (status, json) = call(&app, post("/ingest?count=20")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "PARTIAL");
    let ingested = json["report"]["ingested"].as_array().unwrap().len();
    assert!(ingested > 0);
    assert!(json["report"]["skipped"].as_u64().unwrap() > 0);
    assert_eq!(docs.len().unwrap(), ingested);
}

#[tokio::test]
async fn request_timeout_answers_with_json_error() {
    let docs: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    let postings: Arc<dyn PostingStore> = Arc::new(MemoryPostingStore::new());
    let source = Arc::new(SlowSource { delay: Duration::from_millis(40) });
    let app = with_timeout(router(AppState::new(docs, postings, source, 50, None)), Duration::from_millis(100));

    let (status, json) = call(&app, post("/ingest?count=20")).await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(json["error"], "request timed out");
}

#[tokio::test]
async fn malformed_parameters_get_json_errors() {
    let app = memory_app(vec![], None);
    for req in [get("/search?query=a&q=b"), post("/ingest?count=abc"), get("/doc/abc")] {
        let uri = req.uri().to_string();
        let (status, json) = call(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(json["error"].is_string(), "{uri}");
    }
}
