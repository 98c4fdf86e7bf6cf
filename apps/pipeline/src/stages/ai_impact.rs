use async_trait::async_trait;
use serde_json::Value;

use super::trends::{analyze_aspects, Aspect};
use super::{job_records, AI_IMPACT, JOB_DATA, TECH_ANALYSIS};
use crate::errors::StageError;
use crate::pipeline::{Stage, StageInputs};
use crate::state::StageContext;

/// How AI is reshaping the postings: skills, roles, tools, industries, outlook.
pub struct AiImpactStage;

fn aspects(tech_analysis: &Value) -> Vec<Aspect> {
    vec![
        Aspect::new(
            "ai_skill_requirements",
            "AI skill requirements: most requested AI/ML skills, required experience with \
             AI frameworks, AI-specific certifications, LLM and generative AI expertise.",
        ),
        Aspect::new(
            "ai_job_evolution",
            "Job evolution with AI: new AI-related roles, traditional roles gaining AI \
             requirements, skill transitions, AI integration across positions.",
        ),
        Aspect::with_context(
            "ai_tool_adoption",
            "AI tool adoption: most used AI tools and platforms, framework popularity, \
             cloud AI services, MLOps and deployment tooling.",
            tech_analysis,
        ),
        Aspect::new(
            "ai_industry_impact",
            "AI impact across industries: sectors with the highest AI adoption, \
             industry-specific use cases, transformation patterns, emerging opportunities.",
        ),
        Aspect::new(
            "future_trends",
            "Future AI trends: emerging technologies, expected skill demands, predicted \
             role changes, long-term market implications.",
        ),
    ]
}

#[async_trait]
impl Stage for AiImpactStage {
    fn name(&self) -> &str {
        AI_IMPACT
    }

    fn dependencies(&self) -> &[&str] {
        &[JOB_DATA, TECH_ANALYSIS]
    }

    async fn compute(&self, ctx: &StageContext, inputs: &StageInputs) -> Result<Value, StageError> {
        let records = job_records(inputs)?;
        let tech_analysis = inputs.get(TECH_ANALYSIS)?;
        let insights = analyze_aspects(ctx, &records, &aspects(tech_analysis)).await?;
        Ok(Value::Object(insights))
    }
}
