use crate::store::{DocumentStore, PostingStore};
use crate::{DocId, Document, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;

pub const SCHEMA_VERSION: u32 = 1;

const DOCUMENTS_TREE: &str = "documents";
const POSTINGS_TREE: &str = "postings";
const META_TREE: &str = "meta";
const META_KEY: &[u8] = b"meta";
const TOKEN_TERMINATOR: u8 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u32,
    pub created_at: String,
}

#[derive(Serialize, Deserialize)]
struct StoredDoc {
    title: String,
    link: String,
    content: String,
}

/// A sled database holding the document and posting trees.
///
/// Opening is non-destructive: trees are created when missing and the schema
/// record is only written on first open.
#[derive(Clone)]
pub struct SledIndex {
    root: PathBuf,
    db: sled::Db,
    meta: MetaFile,
}

impl SledIndex {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        let db = sled::open(&root)?;
        let meta = ensure_meta(&db.open_tree(META_TREE)?)?;
        // create the trees up front so a fresh database has the full layout
        db.open_tree(DOCUMENTS_TREE)?;
        db.open_tree(POSTINGS_TREE)?;
        tracing::info!(path = %root.display(), version = meta.version, created_at = %meta.created_at, "opened index");
        Ok(Self { root, db, meta })
    }

    pub fn root(&self) -> &Path { &self.root }

    pub fn meta(&self) -> &MetaFile { &self.meta }

    pub fn documents(&self) -> Result<SledDocumentStore, StoreError> {
        Ok(SledDocumentStore { db: self.db.clone(), tree: self.db.open_tree(DOCUMENTS_TREE)? })
    }

    pub fn postings(&self) -> Result<SledPostingStore, StoreError> {
        Ok(SledPostingStore { tree: self.db.open_tree(POSTINGS_TREE)? })
    }

    pub fn flush(&self) -> Result<usize, StoreError> {
        Ok(self.db.flush()?)
    }
}

fn ensure_meta(tree: &sled::Tree) -> Result<MetaFile, StoreError> {
    if let Some(bytes) = tree.get(META_KEY)? {
        let meta: MetaFile = serde_json::from_slice(&bytes).map_err(|e| StoreError::Schema(e.to_string()))?;
        if meta.version != SCHEMA_VERSION {
            return Err(StoreError::Schema(format!(
                "unsupported schema version {} (expected {SCHEMA_VERSION})",
                meta.version
            )));
        }
        return Ok(meta);
    }
    let meta = MetaFile {
        version: SCHEMA_VERSION,
        created_at: time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
    };
    let json = serde_json::to_vec_pretty(&meta).map_err(|e| StoreError::Schema(e.to_string()))?;
    tree.insert(META_KEY, json)?;
    Ok(meta)
}

#[derive(Clone)]
pub struct SledDocumentStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl DocumentStore for SledDocumentStore {
    fn put(&self, title: &str, link: &str, content: &str) -> Result<DocId, StoreError> {
        let id = self.db.generate_id()?;
        let record = StoredDoc { title: title.to_string(), link: link.to_string(), content: content.to_string() };
        self.tree.insert(id.to_be_bytes(), bincode::serialize(&record)?)?;
        Ok(id)
    }

    fn get(&self, id: DocId) -> Result<Document, StoreError> {
        let bytes = self.tree.get(id.to_be_bytes())?.ok_or(StoreError::NotFound(id))?;
        let record: StoredDoc = bincode::deserialize(&bytes)?;
        Ok(Document { id, title: record.title, link: record.link, content: record.content })
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.tree.len())
    }
}

/// Postings as one empty-valued key per (token, id) pair: `token 0x00 id_be`.
///
/// Membership is the key itself, so `insert` is the add-if-absent primitive and
/// ids never match inside other ids.
#[derive(Clone)]
pub struct SledPostingStore {
    tree: sled::Tree,
}

fn token_prefix(token: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(token.len() + 1 + 8);
    key.extend_from_slice(token.as_bytes());
    key.push(TOKEN_TERMINATOR);
    key
}

fn posting_key(token: &str, id: DocId) -> Vec<u8> {
    let mut key = token_prefix(token);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn split_posting_key(key: &[u8]) -> Result<(&[u8], DocId), StoreError> {
    if key.len() < 9 || key[key.len() - 9] != TOKEN_TERMINATOR {
        return Err(StoreError::Schema(format!("malformed posting key of {} bytes", key.len())));
    }
    let (token, rest) = key.split_at(key.len() - 9);
    let mut id = [0u8; 8];
    id.copy_from_slice(&rest[1..]);
    Ok((token, DocId::from_be_bytes(id)))
}

impl PostingStore for SledPostingStore {
    fn postings(&self, token: &str) -> Result<BTreeSet<DocId>, StoreError> {
        let prefix = token_prefix(token);
        let mut ids = BTreeSet::new();
        for entry in self.tree.scan_prefix(&prefix) {
            let (key, _) = entry?;
            let (_, id) = split_posting_key(&key)?;
            ids.insert(id);
        }
        Ok(ids)
    }

    fn add_posting(&self, token: &str, id: DocId) -> Result<bool, StoreError> {
        let empty: &[u8] = &[];
        let previous = self.tree.insert(posting_key(token, id), empty)?;
        Ok(previous.is_none())
    }

    fn token_count(&self) -> Result<usize, StoreError> {
        let mut count = 0;
        let mut last: Option<Vec<u8>> = None;
        for entry in self.tree.iter() {
            let (key, _) = entry?;
            let (token, _) = split_posting_key(&key)?;
            if last.as_deref() != Some(token) {
                count += 1;
                last = Some(token.to_vec());
            }
        }
        Ok(count)
    }
}
