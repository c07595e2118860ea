pub mod error;
pub mod indexer;
pub mod ingest;
pub mod persist;
pub mod search;
pub mod store;
pub mod tokenizer;

mod index;

pub use error::{AcquisitionError, IndexError, IngestError, SearchError, StoreError};
pub use index::*;
pub use indexer::Indexer;
pub use ingest::{Acquire, BatchReport, FailureStage, IngestFailure, Pipeline};
pub use search::Ranker;
pub use store::{DocumentStore, MemoryDocumentStore, MemoryPostingStore, PostingStore};
