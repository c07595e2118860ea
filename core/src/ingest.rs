use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::indexer::Indexer;
use crate::store::{DocumentStore, PostingStore};
use crate::tokenizer::analyze;
use crate::{AcquisitionError, DocId, IngestError, RawDocument};

/// Supplies already-extracted plain-text documents.
#[async_trait]
pub trait Acquire: Send + Sync {
    async fn acquire(&self) -> Result<RawDocument, AcquisitionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Acquisition,
    Store,
    Index,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestFailure {
    /// Zero-based position of the attempt within the batch.
    pub attempt: usize,
    pub stage: FailureStage,
    /// Set when the document was stored before the failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<DocId>,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub requested: usize,
    pub ingested: Vec<DocId>,
    pub failures: Vec<IngestFailure>,
    /// Attempts not started because the batch deadline passed.
    pub skipped: usize,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.ingested.len() == self.requested
    }

    pub fn record(&mut self, attempt: usize, result: Result<DocId, IngestError>) {
        match result {
            Ok(id) => self.ingested.push(id),
            Err(err) => {
                let (stage, doc_id) = match &err {
                    IngestError::Acquisition(_) => (FailureStage::Acquisition, None),
                    IngestError::Store(_) => (FailureStage::Store, None),
                    IngestError::Index { doc_id, .. } => (FailureStage::Index, Some(*doc_id)),
                };
                self.failures.push(IngestFailure { attempt, stage, doc_id, message: err.to_string() });
            }
        }
    }
}

/// Persist-then-index pipeline over injected stores.
#[derive(Clone)]
pub struct Pipeline {
    docs: Arc<dyn DocumentStore>,
    indexer: Indexer,
}

impl Pipeline {
    pub fn new(docs: Arc<dyn DocumentStore>, postings: Arc<dyn PostingStore>) -> Self {
        Self { docs, indexer: Indexer::new(postings) }
    }

    /// Store one document, then index its content.
    ///
    /// A [`IngestError::Index`] means the document is retrievable by id but not fully
    /// searchable; ingesting it again is safe since postings are idempotent.
    pub fn ingest(&self, raw: RawDocument) -> Result<DocId, IngestError> {
        let content = raw.content.to_lowercase();
        let doc_id = self.docs.put(&raw.title, &raw.link, &content).map_err(IngestError::Store)?;
        let tokens = analyze(&content);
        match self.indexer.index(doc_id, &tokens) {
            Ok(stats) => {
                tracing::debug!(doc_id, title = %raw.title, tokens = tokens.len(), added = stats.added, "ingested document");
                Ok(doc_id)
            }
            Err(source) => {
                tracing::warn!(doc_id, token = %source.token, written = source.written, "document stored but not fully indexed");
                Err(IngestError::Index { doc_id, source })
            }
        }
    }

    /// Run `count` independent acquire-and-ingest cycles.
    ///
    /// A failing cycle is recorded in the report and does not stop the others.
    pub async fn ingest_batch<A: Acquire + ?Sized>(&self, source: &A, count: usize) -> BatchReport {
        self.run_batch(source, count, None).await
    }

    /// Like [`Pipeline::ingest_batch`], but no new cycle starts once `budget` has
    /// elapsed; the attempts left over are counted in [`BatchReport::skipped`].
    pub async fn ingest_batch_within<A: Acquire + ?Sized>(&self, source: &A, count: usize, budget: Duration) -> BatchReport {
        self.run_batch(source, count, Some(Instant::now() + budget)).await
    }

    async fn run_batch<A: Acquire + ?Sized>(&self, source: &A, count: usize, deadline: Option<Instant>) -> BatchReport {
        let mut report = BatchReport { requested: count, ..Default::default() };
        for attempt in 0..count {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                report.skipped = count - attempt;
                tracing::warn!(attempt, skipped = report.skipped, "batch deadline reached");
                break;
            }
            let result = match source.acquire().await {
                Ok(raw) => self.ingest_blocking(raw).await,
                Err(err) => Err(IngestError::Acquisition(err)),
            };
            if let Err(err) = &result {
                tracing::warn!(attempt, error = %err, "ingestion failed");
            }
            report.record(attempt, result);
        }
        tracing::info!(
            requested = count,
            ingested = report.ingested.len(),
            failed = report.failures.len(),
            skipped = report.skipped,
            "batch finished"
        );
        report
    }

    /// Store writes block, so they run on the blocking pool.
    async fn ingest_blocking(&self, raw: RawDocument) -> Result<DocId, IngestError> {
        let pipeline = self.clone();
        match tokio::task::spawn_blocking(move || pipeline.ingest(raw)).await {
            Ok(result) => result,
            Err(join) => std::panic::resume_unwind(join.into_panic()),
        }
    }
}
