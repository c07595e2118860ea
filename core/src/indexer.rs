use std::collections::BTreeSet;
use std::sync::Arc;

use crate::store::PostingStore;
use crate::{DocId, IndexError};

/// Outcome of indexing one document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub distinct_tokens: usize,
    /// Postings that did not exist before this call.
    pub added: usize,
}

/// Records documents in the posting store, one posting per distinct token.
#[derive(Clone)]
pub struct Indexer {
    postings: Arc<dyn PostingStore>,
}

impl Indexer {
    pub fn new(postings: Arc<dyn PostingStore>) -> Self {
        Self { postings }
    }

    /// Ensure `doc_id` is in the posting list of every distinct token.
    ///
    /// Idempotent per (token, id) pair. Writes are not transactional: on failure,
    /// postings written for earlier tokens remain and the error says how many.
    pub fn index<S: AsRef<str>>(&self, doc_id: DocId, tokens: &[S]) -> Result<IndexStats, IndexError> {
        let distinct: BTreeSet<&str> = tokens.iter().map(|t| t.as_ref()).collect();
        let mut stats = IndexStats { distinct_tokens: distinct.len(), added: 0 };
        for (written, token) in distinct.into_iter().enumerate() {
            match self.postings.add_posting(token, doc_id) {
                Ok(true) => stats.added += 1,
                Ok(false) => {}
                Err(source) => {
                    return Err(IndexError { token: token.to_string(), written, source });
                }
            }
        }
        tracing::debug!(doc_id, distinct = stats.distinct_tokens, added = stats.added, "indexed document");
        Ok(stats)
    }
}
