//! The concrete job-market stages. Each one is a thin compute function over
//! the shared engine: a prompt, a response shape and a reduction.

use std::sync::Arc;

use serde_json::Value;

use crate::errors::{PipelineError, StageError};
use crate::models::record::{self, Record};
use crate::pipeline::{Pipeline, Stage, StageInputs};

pub mod ai_impact;
pub mod collect;
pub mod market;
pub mod prompts;
pub mod report;
pub mod tech;
pub mod trends;

pub use ai_impact::AiImpactStage;
pub use collect::JobDataStage;
pub use market::MarketReportStage;
pub use report::FinalReportStage;
pub use tech::TechAnalysisStage;

pub const JOB_DATA: &str = "job_data";
pub const TECH_ANALYSIS: &str = "tech_analysis";
pub const MARKET_REPORT: &str = "market_report";
pub const AI_IMPACT: &str = "ai_impact";
pub const FINAL_REPORT: &str = "final_report";

/// job_data -> tech_analysis -> market_report -> ai_impact -> final_report
pub fn build_pipeline() -> Result<Pipeline, PipelineError> {
    let stages: Vec<Arc<dyn Stage>> = vec![
        Arc::new(JobDataStage::default()),
        Arc::new(TechAnalysisStage),
        Arc::new(MarketReportStage),
        Arc::new(AiImpactStage),
        Arc::new(FinalReportStage),
    ];
    Pipeline::new(stages)
}

/// The job postings produced by `job_data`, re-normalised.
pub(crate) fn job_records(inputs: &StageInputs) -> Result<Vec<Record>, StageError> {
    let raw: Vec<Value> = inputs.decode(JOB_DATA)?;
    Ok(raw.into_iter().filter_map(record::normalize).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pipeline_is_valid_and_ordered() {
        let pipeline = build_pipeline().unwrap();
        assert_eq!(
            pipeline.names(),
            vec![JOB_DATA, TECH_ANALYSIS, MARKET_REPORT, AI_IMPACT, FINAL_REPORT]
        );
        assert_eq!(
            pipeline.final_stage().dependencies(),
            &[JOB_DATA, TECH_ANALYSIS, MARKET_REPORT, AI_IMPACT]
        );
    }
}
