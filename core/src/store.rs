use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

use crate::{DocId, Document, StoreError};

/// Persistent documents keyed by an id the store assigns.
pub trait DocumentStore: Send + Sync {
    /// Persist a new document and return its freshly assigned id.
    fn put(&self, title: &str, link: &str, content: &str) -> Result<DocId, StoreError>;

    /// Fails with [`StoreError::NotFound`] if no document has this id.
    fn get(&self, id: DocId) -> Result<Document, StoreError>;

    fn len(&self) -> Result<usize, StoreError>;

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

/// Token to document-id sets. Sets only grow.
pub trait PostingStore: Send + Sync {
    /// Ids recorded for `token`; empty when the token is unknown.
    fn postings(&self, token: &str) -> Result<BTreeSet<DocId>, StoreError>;

    /// Atomically add `id` to the set for `token` unless already present.
    /// Returns `true` when the id was newly added.
    fn add_posting(&self, token: &str, id: DocId) -> Result<bool, StoreError>;

    /// Number of distinct tokens with at least one posting.
    fn token_count(&self) -> Result<usize, StoreError>;
}

#[derive(Default)]
struct DocTable {
    next_id: DocId,
    docs: HashMap<DocId, Document>,
}

/// Volatile document store, ids start at 1.
#[derive(Default)]
pub struct MemoryDocumentStore {
    inner: RwLock<DocTable>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self { Self::default() }
}

impl DocumentStore for MemoryDocumentStore {
    fn put(&self, title: &str, link: &str, content: &str) -> Result<DocId, StoreError> {
        let mut table = self.inner.write();
        table.next_id += 1;
        let id = table.next_id;
        table.docs.insert(
            id,
            Document { id, title: title.to_string(), link: link.to_string(), content: content.to_string() },
        );
        Ok(id)
    }

    fn get(&self, id: DocId) -> Result<Document, StoreError> {
        self.inner.read().docs.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.inner.read().docs.len())
    }
}

#[derive(Default)]
pub struct MemoryPostingStore {
    inner: RwLock<HashMap<String, BTreeSet<DocId>>>,
}

impl MemoryPostingStore {
    pub fn new() -> Self { Self::default() }
}

impl PostingStore for MemoryPostingStore {
    fn postings(&self, token: &str) -> Result<BTreeSet<DocId>, StoreError> {
        Ok(self.inner.read().get(token).cloned().unwrap_or_default())
    }

    fn add_posting(&self, token: &str, id: DocId) -> Result<bool, StoreError> {
        // check and insert under one write guard
        let mut map = self.inner.write();
        Ok(map.entry(token.to_string()).or_default().insert(id))
    }

    fn token_count(&self) -> Result<usize, StoreError> {
        Ok(self.inner.read().len())
    }
}
