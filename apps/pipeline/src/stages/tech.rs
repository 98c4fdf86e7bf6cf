use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use super::{job_records, prompts, JOB_DATA, TECH_ANALYSIS};
use crate::engine::{reduce, BatchProcessor, Schema};
use crate::errors::StageError;
use crate::llm_client::complete_structured;
use crate::llm_client::prompts::render_json;
use crate::models::record::{text_field, truncate_chars, Record};
use crate::pipeline::{Stage, StageInputs};
use crate::state::StageContext;

/// Characters of each description sent to the model.
const DESCRIPTION_CHARS: usize = 500;

/// Technology requirements across all postings, analysed batch by batch and
/// reduced into one frequency table per category.
pub struct TechAnalysisStage;

pub fn schema() -> Schema {
    Schema::new()
        .counter("technical_skills")
        .counter("tech_stacks")
        .set("emerging_trends")
        .counter("education_requirements")
}

fn simplify(record: &Record) -> Value {
    json!({
        "title": text_field(record, "title"),
        "company": text_field(record, "company_name"),
        "description": truncate_chars(&text_field(record, "description"), DESCRIPTION_CHARS),
    })
}

#[async_trait]
impl Stage for TechAnalysisStage {
    fn name(&self) -> &str {
        TECH_ANALYSIS
    }

    fn dependencies(&self) -> &[&str] {
        &[JOB_DATA]
    }

    async fn compute(&self, ctx: &StageContext, inputs: &StageInputs) -> Result<Value, StageError> {
        let records = job_records(inputs)?;
        let simplified: Vec<Value> = records.iter().map(simplify).collect();
        let schema = schema();

        let processor = BatchProcessor::new(ctx.settings.tech_batch_size)
            .with_delay(ctx.settings.request_delay);
        info!(
            "Analyzing technology requirements of {} postings in {} batches",
            simplified.len(),
            processor.batch_count(simplified.len())
        );

        let outcome = processor
            .process(&simplified, |_, batch| {
                let messages = prompts::tech_analysis(&render_json(&Value::Array(batch.to_vec())));
                let llm = ctx.llm.clone();
                let schema = &schema;
                async move { complete_structured(llm.as_ref(), &messages, schema).await }
            })
            .await;

        if outcome.all_failed() {
            return Err(StageError::Internal(anyhow!(
                "all {} tech analysis batches failed",
                outcome.total_batches
            )));
        }

        // Seeding with the empty shape keeps every category in the output
        let aggregate = reduce(std::iter::once(schema.empty()).chain(outcome.results))?;
        Ok(aggregate.to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ServiceError;
    use crate::testing::{context, ScriptedLlm};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn job_data(n: usize) -> Value {
        Value::Array(
            (0..n)
                .map(|i| json!({"title": format!("Engineer {i}"), "company_name": "Acme", "description": "x".repeat(800)}))
                .collect(),
        )
    }

    fn inputs(n: usize) -> StageInputs {
        StageInputs::new().with(JOB_DATA, job_data(n))
    }

    #[tokio::test]
    async fn test_batches_are_reduced_into_one_analysis() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(dir.path());
        ctx.settings.tech_batch_size = 10;
        let llm = Arc::new(ScriptedLlm::new(|prompt| {
            Ok(if prompt.contains("Engineer 0\"") {
                r#"{"technical_skills": {"python": 3, "go": 1}, "emerging_trends": ["llm", "rag"]}"#
            } else {
                r#"```json
{"technical_skills": {"python": 2, "rust": 4}, "emerging_trends": ["rag", "agents"], "tech_stacks": {"aws": 1}}
```"#
            }
            .to_string())
        }));
        ctx.llm = llm.clone();

        let output = TechAnalysisStage.compute(&ctx, &inputs(25)).await.unwrap();

        assert_eq!(llm.call_count(), 3);
        assert_eq!(
            serde_json::to_string(&output).unwrap(),
            r#"{"technical_skills":{"rust":8,"python":7,"go":1},"tech_stacks":{"aws":2},"emerging_trends":["llm","rag","agents"],"education_requirements":{}}"#
        );
    }

    #[tokio::test]
    async fn test_malformed_batch_is_dropped() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(dir.path());
        ctx.settings.tech_batch_size = 10;
        ctx.llm = Arc::new(ScriptedLlm::new(|prompt| {
            Ok(if prompt.contains("Engineer 10\"") {
                "Sorry, I can't analyze that.".to_string()
            } else {
                r#"{"technical_skills": {"python": 1}}"#.to_string()
            })
        }));

        let output = TechAnalysisStage.compute(&ctx, &inputs(25)).await.unwrap();
        assert_eq!(output["technical_skills"], json!({"python": 2}));
    }

    #[tokio::test]
    async fn test_all_batches_failing_is_stage_error() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(dir.path());
        ctx.llm = Arc::new(ScriptedLlm::new(|_| Err(ServiceError::EmptyContent)));

        let err = TechAnalysisStage.compute(&ctx, &inputs(3)).await.unwrap_err();
        assert!(err.to_string().contains("batches failed"));
    }

    #[tokio::test]
    async fn test_descriptions_are_truncated_in_prompt() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(dir.path());
        let llm = Arc::new(ScriptedLlm::always("{}"));
        ctx.llm = llm.clone();

        TechAnalysisStage.compute(&ctx, &inputs(1)).await.unwrap();

        let prompt = &llm.prompts()[0];
        assert!(prompt.contains(&format!("{}...", "x".repeat(500))));
        assert!(!prompt.contains(&"x".repeat(501)));
    }

    #[tokio::test]
    async fn test_empty_job_data_yields_empty_shape() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path());
        let output = TechAnalysisStage.compute(&ctx, &inputs(0)).await.unwrap();
        assert_eq!(
            output,
            json!({"technical_skills": {}, "tech_stacks": {}, "emerging_trends": [], "education_requirements": {}})
        );
    }
}
