use serde::{Deserialize, Serialize};

pub type DocId = u64;

/// A normalized index key produced by [`crate::tokenizer::analyze`].
pub type Token = String;

/// A stored document. The id is assigned by the document store on insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub title: String,
    pub link: String,
    pub content: String,
}

impl Document {
    pub fn summary(&self) -> DocSummary {
        DocSummary { id: self.id, title: self.title.clone(), link: self.link.clone() }
    }
}

/// Plain-text document handed over by an acquisition source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDocument {
    pub title: String,
    pub link: String,
    pub content: String,
}

/// Metadata returned with a search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocSummary {
    pub id: DocId,
    pub title: String,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankEntry {
    #[serde(rename = "article")]
    pub document: DocSummary,
    /// Number of query-token occurrences the document matched.
    #[serde(rename = "rank")]
    pub score: u32,
}
