use std::collections::HashMap;
use std::sync::Arc;

use crate::store::{DocumentStore, PostingStore};
use crate::tokenizer::analyze;
use crate::{DocId, RankEntry, SearchError, StoreError};

/// Term-overlap ranking over injected stores. Read-only.
#[derive(Clone)]
pub struct Ranker {
    docs: Arc<dyn DocumentStore>,
    postings: Arc<dyn PostingStore>,
}

impl Ranker {
    pub fn new(docs: Arc<dyn DocumentStore>, postings: Arc<dyn PostingStore>) -> Self {
        Self { docs, postings }
    }

    /// Rank documents by how many query-token occurrences they match.
    ///
    /// A repeated query word counts once per occurrence. Ties are ordered by
    /// ascending document id. A blank query fails before any store access.
    pub fn rank(&self, query: &str) -> Result<Vec<RankEntry>, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::InvalidQuery);
        }

        let tokens = analyze(query);
        let mut matches: HashMap<DocId, u32> = HashMap::new();
        for token in &tokens {
            let ids = self
                .postings
                .postings(token)
                .map_err(|source| SearchError::Lookup { token: token.clone(), source })?;
            for id in ids {
                *matches.entry(id).or_insert(0) += 1;
            }
        }

        let mut ranked = Vec::with_capacity(matches.len());
        for (id, score) in matches {
            let doc = self.docs.get(id).map_err(|err| match err {
                StoreError::NotFound(doc_id) => {
                    tracing::error!(doc_id, "posting references a document missing from the document store");
                    SearchError::StorageInconsistency { doc_id }
                }
                other => SearchError::Store(other),
            })?;
            ranked.push(RankEntry { document: doc.summary(), score });
        }
        ranked.sort_by(|a, b| b.score.cmp(&a.score).then(a.document.id.cmp(&b.document.id)));

        tracing::debug!(query, tokens = tokens.len(), hits = ranked.len(), "ranked query");
        Ok(ranked)
    }
}
