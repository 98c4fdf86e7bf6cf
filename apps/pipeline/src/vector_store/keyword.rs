use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Document, ScoredDocument, VectorStore};
use crate::errors::VectorStoreError;
use crate::models::record::Record;

const STOPWORDS: [&str; 20] = [
    "the", "and", "for", "with", "that", "this", "are", "job", "market", "in", "of", "to", "a",
    "an", "on", "by", "or", "is", "be", "as",
];

struct Entry {
    id: String,
    terms: HashSet<String>,
    record: Record,
}

/// Term-overlap retrieval. Score is the fraction of distinct query terms a
/// document contains; ties (including zero) keep insertion order.
#[derive(Default)]
pub struct KeywordVectorStore {
    entries: RwLock<Vec<Entry>>,
}

impl KeywordVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '+' && c != '#')
        .filter(|t| t.len() > 1 && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl VectorStore for KeywordVectorStore {
    async fn add(&self, documents: Vec<Document>) -> Result<(), VectorStoreError> {
        let mut entries = self.entries.write().await;
        let mut seen: HashSet<String> = entries.iter().map(|e| e.id.clone()).collect();
        for doc in documents {
            if seen.insert(doc.id.clone()) {
                entries.push(Entry {
                    id: doc.id,
                    terms: terms(&doc.text),
                    record: doc.record,
                });
            }
        }
        Ok(())
    }

    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<ScoredDocument>, VectorStoreError> {
        let query_terms = terms(text);
        let entries = self.entries.read().await;

        let mut scored: Vec<(usize, f32)> = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let hits = query_terms.iter().filter(|t| entry.terms.contains(*t)).count();
                let score = if query_terms.is_empty() {
                    0.0
                } else {
                    hits as f32 / query_terms.len() as f32
                };
                (i, score)
            })
            .collect();

        // Stable sort keeps insertion order among equal scores
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
