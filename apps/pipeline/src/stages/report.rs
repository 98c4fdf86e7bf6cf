//! Final report: condenses the three analyses and writes the markdown report.
//!
//! Each analysis is split by the chunk planner so no single summariser call
//! exceeds the size budget. Chunk summaries are combined into one summary per
//! analysis, which then feeds one report section each. Recommendations and
//! the executive summary are written last, from the finished sections.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{job_records, prompts, AI_IMPACT, FINAL_REPORT, JOB_DATA, MARKET_REPORT, TECH_ANALYSIS};
use crate::engine::{chunking, BatchProcessor};
use crate::errors::{BatchError, StageError};
use crate::llm_client::prompts::render_json;
use crate::llm_client::ChatMessage;
use crate::models::record::{self, Record};
use crate::pipeline::{Stage, StageInputs};
use crate::state::StageContext;

pub struct FinalReportStage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportStatistics {
    pub total_jobs: usize,
    pub ai_specific_roles: usize,
    /// Share of remote postings, rounded to one decimal.
    pub remote_percentage: f64,
}

pub fn report_statistics(records: &[Record]) -> ReportStatistics {
    let total_jobs = records.len();
    let ai_specific_roles = records.iter().filter(|r| record::is_ai_role(r)).count();
    let remote = records.iter().filter(|r| record::is_remote(r)).count();
    ReportStatistics {
        total_jobs,
        ai_specific_roles,
        remote_percentage: percentage(remote, total_jobs),
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 * 1000.0 / total as f64).round() / 10.0
}

/// Summary of one analysis, built chunk by chunk.
async fn summarize(ctx: &StageContext, label: &str, data: &Value) -> Result<String, StageError> {
    let chunks = chunking::plan(data, ctx.settings.max_chunk_size);
    if chunks.is_empty() {
        return Ok(format!("No {label} data available."));
    }
    info!("Summarizing {} in {} chunks", label, chunks.len());

    let processor = BatchProcessor::new(1).with_delay(ctx.settings.request_delay);
    let outcome = processor
        .process(&chunks, |_, batch| {
            let messages = prompts::chunk_summary(label, &render_json(&batch[0].to_value()));
            let summarizer = ctx.summarizer.clone();
            async move {
                let text = summarizer.complete(&messages).await.map_err(BatchError::from)?;
                Ok::<_, BatchError>(text.trim().to_string())
            }
        })
        .await;

    if outcome.all_failed() {
        return Err(StageError::Internal(anyhow!(
            "every chunk of the {} failed to summarize",
            label
        )));
    }

    let mut summaries = outcome.results;
    if summaries.len() == 1 {
        return Ok(summaries.remove(0));
    }

    match ctx
        .summarizer
        .complete(&prompts::combine_summaries(label, &summaries))
        .await
    {
        Ok(text) => Ok(text.trim().to_string()),
        Err(e) => {
            warn!("Combining {} summaries failed, using them as-is: {}", label, e);
            Ok(summaries.join("\n\n"))
        }
    }
}

async fn write(ctx: &StageContext, messages: Vec<ChatMessage>) -> Result<String, StageError> {
    Ok(ctx.llm.complete(&messages).await?.trim().to_string())
}

struct Sections {
    tech_landscape: String,
    market_dynamics: String,
    ai_impact: String,
    recommendations: String,
    executive_summary: String,
}

fn render_markdown(sections: &Sections, stats: &ReportStatistics, generated_at: &str) -> String {
    let ai_share = percentage(stats.ai_specific_roles, stats.total_jobs);
    format!(
        "# Job Market Analysis Report\n\n\
         _Generated: {generated_at}_\n\n\
         ## Executive Summary\n\n{}\n\n\
         ## Key Statistics\n\n\
         - Total jobs analyzed: {}\n\
         - AI-specific roles: {} ({:.1}%)\n\
         - Remote positions: {:.1}%\n\n\
         ## Technical Skills Landscape\n\n{}\n\n\
         ## Market Dynamics\n\n{}\n\n\
         ## AI Impact\n\n{}\n\n\
         ## Recommendations\n\n{}\n",
        sections.executive_summary,
        stats.total_jobs,
        stats.ai_specific_roles,
        ai_share,
        stats.remote_percentage,
        sections.tech_landscape,
        sections.market_dynamics,
        sections.ai_impact,
        sections.recommendations,
    )
}

#[async_trait]
impl Stage for FinalReportStage {
    fn name(&self) -> &str {
        FINAL_REPORT
    }

    fn dependencies(&self) -> &[&str] {
        &[JOB_DATA, TECH_ANALYSIS, MARKET_REPORT, AI_IMPACT]
    }

    async fn compute(&self, ctx: &StageContext, inputs: &StageInputs) -> Result<Value, StageError> {
        let records = job_records(inputs)?;
        let statistics = report_statistics(&records);

        let tech_summary = summarize(ctx, "technical analysis", inputs.get(TECH_ANALYSIS)?).await?;
        let market_summary = summarize(ctx, "market analysis", inputs.get(MARKET_REPORT)?).await?;
        let ai_summary = summarize(ctx, "AI impact analysis", inputs.get(AI_IMPACT)?).await?;

        let tech_landscape = write(ctx, prompts::section("Technical Skills Landscape", &tech_summary)).await?;
        let market_dynamics = write(ctx, prompts::section("Market Dynamics", &market_summary)).await?;
        let ai_impact = write(ctx, prompts::section("AI Impact", &ai_summary)).await?;

        let combined = format!(
            "## Technical Skills Landscape\n{tech_landscape}\n\n\
             ## Market Dynamics\n{market_dynamics}\n\n\
             ## AI Impact\n{ai_impact}"
        );
        let recommendations = write(ctx, prompts::recommendations(&combined)).await?;
        let stats_json = serde_json::to_string(&statistics).map_err(|e| StageError::Internal(e.into()))?;
        let executive_summary = write(ctx, prompts::executive_summary(&combined, &stats_json)).await?;

        let sections = Sections {
            tech_landscape,
            market_dynamics,
            ai_impact,
            recommendations,
            executive_summary,
        };
        let generated_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let markdown = render_markdown(&sections, &statistics, &generated_at);

        info!(
            "Report generated: {} jobs, {} AI roles, {:.1}% remote",
            statistics.total_jobs, statistics.ai_specific_roles, statistics.remote_percentage
        );

        Ok(json!({
            "markdown": markdown,
            "statistics": statistics,
            "generated_at": generated_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ServiceError;
    use crate::models::record::normalize;
    use crate::testing::{context, ScriptedLlm};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn inputs(tech: Value) -> StageInputs {
        StageInputs::new()
            .with(
                JOB_DATA,
                json!([
                    {"title": "AI Engineer", "location": "Remote"},
                    {"title": "Data Scientist", "location": "Toronto"},
                    {"title": "Chef", "location": "Paris"},
                    {"title": "Backend Engineer", "detected_extensions": {"work_from_home": true}}
                ]),
            )
            .with(TECH_ANALYSIS, tech)
            .with(MARKET_REPORT, json!({"location_analysis": "Berlin leads"}))
            .with(AI_IMPACT, json!({"future_trends": "Agents"}))
    }

    #[test]
    fn test_statistics_are_derived_from_postings() {
        let records: Vec<Record> = [
            json!({"title": "ML Engineer", "location": "Remote"}),
            json!({"title": "Accountant"}),
            json!({"title": "Barista"}),
        ]
        .into_iter()
        .filter_map(normalize)
        .collect();
        let stats = report_statistics(&records);
        assert_eq!(stats.total_jobs, 3);
        assert_eq!(stats.ai_specific_roles, 1);
        assert_eq!(stats.remote_percentage, 33.3);
        assert_eq!(report_statistics(&[]).remote_percentage, 0.0);
    }

    #[tokio::test]
    async fn test_report_payload_and_markdown() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(dir.path());
        let llm = Arc::new(ScriptedLlm::always("Section body."));
        let summarizer = Arc::new(ScriptedLlm::always("Summary."));
        ctx.llm = llm.clone();
        ctx.summarizer = summarizer.clone();

        let output = FinalReportStage
            .compute(&ctx, &inputs(json!({"technical_skills": {"python": 5}})))
            .await
            .unwrap();

        assert_eq!(
            output["statistics"],
            json!({"total_jobs": 4, "ai_specific_roles": 2, "remote_percentage": 50.0})
        );
        let markdown = output["markdown"].as_str().unwrap();
        assert!(markdown.starts_with("# Job Market Analysis Report"));
        for heading in ["## Executive Summary", "## Technical Skills Landscape", "## Market Dynamics", "## AI Impact", "## Recommendations"] {
            assert!(markdown.contains(heading), "missing {heading}");
        }
        assert!(markdown.contains("- AI-specific roles: 2 (50.0%)"));
        assert!(output["generated_at"].is_string());

        // One chunk per analysis, no combine step
        assert_eq!(summarizer.call_count(), 3);
        assert_eq!(llm.call_count(), 5);
    }

    #[tokio::test]
    async fn test_oversized_analysis_is_chunked_and_combine_falls_back() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(dir.path());
        ctx.settings.max_chunk_size = 60;
        let llm = Arc::new(ScriptedLlm::always("Section body."));
        let summarizer = Arc::new(ScriptedLlm::new(|prompt| {
            if prompt.starts_with("Combine") {
                Err(ServiceError::Api {
                    status: 503,
                    message: "overloaded".to_string(),
                })
            } else {
                Ok("part".to_string())
            }
        }));
        ctx.llm = llm.clone();
        ctx.summarizer = summarizer.clone();

        let tech = json!({"a": "x".repeat(40), "b": "y".repeat(40), "c": "z".repeat(40)});
        FinalReportStage.compute(&ctx, &inputs(tech)).await.unwrap();

        // Three tech chunks + failed combine, then one chunk each for market and AI
        assert_eq!(summarizer.call_count(), 6);
        assert!(llm.prompts()[0].contains("part\n\npart\n\npart"));
    }

    #[tokio::test]
    async fn test_section_failure_is_stage_error() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(dir.path());
        ctx.llm = Arc::new(ScriptedLlm::failing());
        let err = FinalReportStage
            .compute(&ctx, &inputs(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Service(_)));
    }
}
