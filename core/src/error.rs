use crate::DocId;
use thiserror::Error;

/// Failures reported by a document or posting store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document {0} not found")]
    NotFound(DocId),

    #[error("storage backend: {0}")]
    Backend(#[from] sled::Error),

    #[error("record encoding: {0}")]
    Codec(#[from] bincode::Error),

    #[error("schema: {0}")]
    Schema(String),
}

/// The acquisition source could not supply a document.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("response rejected: {0}")]
    Rejected(String),

    #[error("extraction failed: {0}")]
    Extract(String),
}

/// A posting write failed. Postings for tokens written before `token` stand.
#[derive(Debug, Error)]
#[error("posting write for token {token:?} failed after {written} tokens: {source}")]
pub struct IndexError {
    pub token: String,
    pub written: usize,
    #[source]
    pub source: StoreError,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    /// The document was not persisted and indexing was not attempted.
    #[error("document persistence failed: {0}")]
    Store(#[source] StoreError),

    /// The document is stored and retrievable by id but not fully searchable.
    #[error("document {doc_id} stored but not fully indexed: {source}")]
    Index {
        doc_id: DocId,
        #[source]
        source: IndexError,
    },
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("query is empty")]
    InvalidQuery,

    #[error("posting lookup for token {token:?} failed: {source}")]
    Lookup {
        token: String,
        #[source]
        source: StoreError,
    },

    /// A posting list references a document the document store does not hold.
    #[error("index references missing document {doc_id}")]
    StorageInconsistency { doc_id: DocId },

    #[error("document lookup failed: {0}")]
    Store(#[source] StoreError),
}
