//! Retrieval-augmented aspect analysis shared by the market and AI impact stages.
//!
//! Each aspect is one question answered over the postings most relevant to it.
//! Aspects go through the batch processor one at a time, so a failed aspect
//! is logged and left out rather than failing the stage.

use anyhow::anyhow;
use serde_json::{json, Map, Value};
use tracing::info;

use super::prompts;
use crate::engine::chunking::truncate_str;
use crate::engine::BatchProcessor;
use crate::errors::{BatchError, StageError};
use crate::llm_client::prompts::render_json;
use crate::models::record::{text_field, truncate_chars, Record};
use crate::state::StageContext;
use crate::vector_store::Document;

/// Postings retrieved per aspect.
pub const TOP_K: usize = 10;
/// Upper bound on prior analysis embedded into a focus prompt.
const CONTEXT_BYTES: usize = 4_000;
const DESCRIPTION_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct Aspect {
    pub key: &'static str,
    pub focus: String,
}

impl Aspect {
    pub fn new(key: &'static str, focus: &str) -> Self {
        Self {
            key,
            focus: focus.to_string(),
        }
    }

    /// An aspect whose question also carries a prior stage's output.
    pub fn with_context(key: &'static str, focus: &str, context: &Value) -> Self {
        let rendered = render_json(context);
        Self {
            key,
            focus: format!(
                "{focus}\n\nConsider the following analysis:\n{}",
                truncate_str(&rendered, CONTEXT_BYTES)
            ),
        }
    }
}

/// Indexes the postings in the configured vector store, if any.
pub async fn index_records(ctx: &StageContext, records: &[Record]) -> Result<(), StageError> {
    if let Some(store) = &ctx.vectors {
        let documents = records.iter().cloned().map(Document::from_record).collect();
        store.add(documents).await?;
    }
    Ok(())
}

/// The `top_k` postings most relevant to `query`. Without a vector store,
/// the first `top_k` postings.
pub async fn retrieve(
    ctx: &StageContext,
    records: &[Record],
    query: &str,
    top_k: usize,
) -> Result<Vec<Record>, StageError> {
    match &ctx.vectors {
        Some(store) => Ok(store
            .query(query, top_k)
            .await?
            .into_iter()
            .map(|hit| hit.record)
            .collect()),
        None => Ok(records.iter().take(top_k).cloned().collect()),
    }
}

fn compact(record: &Record) -> Value {
    json!({
        "title": text_field(record, "title"),
        "company": text_field(record, "company_name"),
        "location": text_field(record, "location"),
        "type": text_field(record, "type"),
        "salary": record.get("salary").cloned().unwrap_or(Value::Null),
        "description": truncate_chars(&text_field(record, "description"), DESCRIPTION_CHARS),
    })
}

/// Answers every aspect, returning `key -> insight text` in aspect order.
/// Fails only when there were aspects and none of them could be answered.
pub async fn analyze_aspects(
    ctx: &StageContext,
    records: &[Record],
    aspects: &[Aspect],
) -> Result<Map<String, Value>, StageError> {
    index_records(ctx, records).await?;

    // Retrieval happens up front: its failures are stage-fatal, not per-aspect.
    let mut prepared = Vec::with_capacity(aspects.len());
    for aspect in aspects {
        let hits = retrieve(ctx, records, &aspect.focus, TOP_K).await?;
        let postings = Value::Array(hits.iter().map(compact).collect());
        prepared.push((aspect.key, prompts::aspect(&aspect.focus, &render_json(&postings))));
    }

    let processor = BatchProcessor::new(1).with_delay(ctx.settings.request_delay);
    let outcome = processor
        .process(&prepared, |_, batch| {
            let (key, messages) = batch[0].clone();
            let llm = ctx.llm.clone();
            async move {
                let text = llm.complete(&messages).await.map_err(BatchError::from)?;
                Ok::<_, BatchError>((key, text))
            }
        })
        .await;

    if outcome.all_failed() {
        return Err(StageError::Internal(anyhow!(
            "none of the {} aspects could be analysed",
            outcome.total_batches
        )));
    }

    let mut insights = Map::new();
    for (key, text) in outcome.results {
        insights.insert(key.to_string(), Value::String(text.trim().to_string()));
    }
    info!("Analysed {}/{} aspects", insights.len(), aspects.len());
    Ok(insights)
}
