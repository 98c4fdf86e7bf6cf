#![allow(dead_code)]

//! Vector Store: optional retrieval augmentation for the analysis stages.
//!
//! Default: `KeywordVectorStore` (pure-Rust term overlap, deterministic, no calls).
//! `EmbeddingVectorStore` ranks by cosine similarity over provider embeddings
//! and persists its index between runs. The stage context holds an
//! `Option<Arc<dyn VectorStore>>`; stages fall back to the first records
//! when no store is configured.

use async_trait::async_trait;

use crate::errors::VectorStoreError;
use crate::models::record::{self, Record};

pub mod embedding;
pub mod keyword;

pub use embedding::EmbeddingVectorStore;
pub use keyword::KeywordVectorStore;

/// A record plus the text it is indexed under.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub record: Record,
}

impl Document {
    pub fn from_record(record: Record) -> Self {
        Self {
            id: record::dedup_key(&record),
            text: record::document_text(&record),
            record,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub score: f32,
    pub record: Record,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Indexes documents. Ids already present are ignored.
    async fn add(&self, documents: Vec<Document>) -> Result<(), VectorStoreError>;

    /// Up to `top_k` records, best match first.
    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<ScoredDocument>, VectorStoreError>;

    async fn len(&self) -> usize;
}
