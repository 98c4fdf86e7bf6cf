#![allow(dead_code)]

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use super::{Document, ScoredDocument, VectorStore};
use crate::errors::{ServiceError, StoreError, VectorStoreError};
use crate::llm_client::OpenAiClient;
use crate::models::record::Record;
use crate::store::write_atomic;

const INDEX_NAME: &str = "vector_store";
/// Inputs per embeddings request.
const EMBED_BATCH: usize = 100;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ServiceError>;
}

#[async_trait]
impl Embedder for OpenAiClient {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        OpenAiClient::embed(self, inputs).await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexedDocument {
    id: String,
    record: Record,
    embedding: Vec<f32>,
}

/// Cosine-similarity retrieval over provider embeddings.
///
/// With a backing file, the index is loaded on open and rewritten atomically
/// after every `add` that indexes something new, so embeddings survive
/// between runs.
pub struct EmbeddingVectorStore {
    embedder: Arc<dyn Embedder>,
    path: Option<PathBuf>,
    entries: RwLock<Vec<IndexedDocument>>,
}

impl EmbeddingVectorStore {
    pub fn in_memory(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            path: None,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Opens the index persisted at `path`, or starts empty if there is none.
    pub fn open(embedder: Arc<dyn Embedder>, path: impl Into<PathBuf>) -> Result<Self, VectorStoreError> {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<Vec<IndexedDocument>>(&bytes).map_err(|source| {
                StoreError::Serde {
                    stage: INDEX_NAME.to_string(),
                    source,
                }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => {
                return Err(StoreError::Io {
                    stage: INDEX_NAME.to_string(),
                    source,
                }
                .into())
            }
        };

        info!("Loaded vector index with {} documents from {}", entries.len(), path.display());
        Ok(Self {
            embedder,
            path: Some(path),
            entries: RwLock::new(entries),
        })
    }

    fn persist(&self, entries: &[IndexedDocument]) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec(entries).map_err(|source| StoreError::Serde {
            stage: INDEX_NAME.to_string(),
            source,
        })?;
        let dir = path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        write_atomic(&dir, path, &bytes).map_err(|source| StoreError::Io {
            stage: INDEX_NAME.to_string(),
            source,
        })
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorStore for EmbeddingVectorStore {
    async fn add(&self, documents: Vec<Document>) -> Result<(), VectorStoreError> {
        let fresh: Vec<Document> = {
            let entries = self.entries.read().await;
            let mut seen: HashSet<String> = entries.iter().map(|e| e.id.clone()).collect();
            documents
                .into_iter()
                .filter(|d| seen.insert(d.id.clone()))
                .collect()
        };
        if fresh.is_empty() {
            return Ok(());
        }

        let mut indexed = Vec::with_capacity(fresh.len());
        for batch in fresh.chunks(EMBED_BATCH) {
            let texts: Vec<String> = batch.iter().map(|d| d.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            for (doc, embedding) in batch.iter().zip(vectors) {
                indexed.push(IndexedDocument {
                    id: doc.id.clone(),
                    record: doc.record.clone(),
                    embedding,
                });
            }
        }

        let mut entries = self.entries.write().await;
        let existing: HashSet<String> = entries.iter().map(|e| e.id.clone()).collect();
        entries.extend(indexed.into_iter().filter(|d| !existing.contains(&d.id)));
        self.persist(&entries)?;
        info!("Vector index now holds {} documents", entries.len());
        Ok(())
    }

    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<ScoredDocument>, VectorStoreError> {
        let entries = self.entries.read().await;
        if entries.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query = self
            .embedder
            .embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();

        let mut scored: Vec<(usize, f32)> = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine(&query, &e.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(i, score)| ScoredDocument {
                score,
                record: entries[i].record.clone(),
            })
            .collect())
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
