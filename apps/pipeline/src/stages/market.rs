use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::trends::{analyze_aspects, Aspect};
use super::{job_records, JOB_DATA, MARKET_REPORT, TECH_ANALYSIS};
use crate::errors::StageError;
use crate::models::record::{self, Record};
use crate::pipeline::{Stage, StageInputs};
use crate::state::StageContext;

/// Salary statistics plus retrieval-augmented market insights.
pub struct MarketReportStage;

const SALARY_TRENDS: &str = "salary_trends";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SalaryStatistics {
    pub average: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
}

/// Zeros when no posting carries a numeric salary.
pub fn salary_statistics(records: &[Record]) -> SalaryStatistics {
    let mut salaries: Vec<f64> = records.iter().filter_map(record::salary).collect();
    if salaries.is_empty() {
        return SalaryStatistics::default();
    }
    salaries.sort_by(f64::total_cmp);

    let n = salaries.len();
    let median = if n % 2 == 1 {
        salaries[n / 2]
    } else {
        (salaries[n / 2 - 1] + salaries[n / 2]) / 2.0
    };

    SalaryStatistics {
        average: salaries.iter().sum::<f64>() / n as f64,
        median,
        min: salaries[0],
        max: salaries[n - 1],
    }
}

fn aspects(tech_analysis: &Value) -> Vec<Aspect> {
    vec![
        Aspect::new(
            SALARY_TRENDS,
            "Salary trends: ranges for different experience levels, industry-specific \
             variations, location-based differences, correlation between skills and compensation.",
        ),
        Aspect::new(
            "location_analysis",
            "Location-based trends: top hiring locations, regional salary differences, \
             location-specific skill requirements, remote work policies by region.",
        ),
        Aspect::new(
            "company_insights",
            "Company trends: top hiring companies, company size distribution, industry \
             sector distribution, benefits and perks.",
        ),
        Aspect::new(
            "remote_work_trends",
            "Remote work trends: share of remote positions, hybrid vs fully remote options, \
             remote work requirements, geographic restrictions.",
        ),
        Aspect::with_context(
            "market_demands",
            "Market demands: high-demand skills and technologies, emerging role types, \
             experience level requirements, industry-specific demands.",
            tech_analysis,
        ),
        Aspect::new(
            "industry_trends",
            "Industry trends: growing sectors, declining or transforming roles, new job \
             titles, industry-specific technology adoption.",
        ),
    ]
}

#[async_trait]
impl Stage for MarketReportStage {
    fn name(&self) -> &str {
        MARKET_REPORT
    }

    fn dependencies(&self) -> &[&str] {
        &[JOB_DATA, TECH_ANALYSIS]
    }

    async fn compute(&self, ctx: &StageContext, inputs: &StageInputs) -> Result<Value, StageError> {
        let records = job_records(inputs)?;
        let tech_analysis = inputs.get(TECH_ANALYSIS)?;

        let insights = analyze_aspects(ctx, &records, &aspects(tech_analysis)).await?;

        let statistics = serde_json::to_value(salary_statistics(&records))
            .map_err(|e| StageError::Internal(e.into()))?;
        let mut salary = Map::new();
        salary.insert("statistics".to_string(), statistics);
        salary.insert(
            "insights".to_string(),
            insights.get(SALARY_TRENDS).cloned().unwrap_or(Value::Null),
        );

        // Salary first, then the remaining aspects in the order they were asked.
        let mut report = Map::new();
        report.insert(SALARY_TRENDS.to_string(), Value::Object(salary));
        for (key, value) in insights {
            if key != SALARY_TRENDS {
                report.insert(key, value);
            }
        }
        Ok(Value::Object(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::normalize;
    use crate::testing::{context, ScriptedLlm};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn records(salaries: &[Value]) -> Vec<Record> {
        salaries
            .iter()
            .enumerate()
            .map(|(i, s)| normalize(json!({"title": format!("Role {i}"), "salary": s})).unwrap())
            .collect()
    }

    #[test]
    fn test_salary_statistics_over_numeric_salaries() {
        let stats = salary_statistics(&records(&[json!(100), json!("n/a"), json!(300), json!(200), json!(400)]));
        assert_eq!(stats.average, 250.0);
        assert_eq!(stats.median, 250.0);
        assert_eq!(stats.min, 100.0);
        assert_eq!(stats.max, 400.0);
    }

    #[test]
    fn test_salary_statistics_default_to_zero() {
        assert_eq!(salary_statistics(&records(&[json!(null)])), SalaryStatistics::default());
    }

    #[tokio::test]
    async fn test_report_has_every_aspect_in_order() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(dir.path());
        let llm = Arc::new(ScriptedLlm::always("insight"));
        ctx.llm = llm.clone();

        let inputs = StageInputs::new()
            .with(JOB_DATA, json!([{"title": "SWE", "salary": 120000}]))
            .with(TECH_ANALYSIS, json!({"technical_skills": {"python": 5}}));
        let output = MarketReportStage.compute(&ctx, &inputs).await.unwrap();

        let keys: Vec<&String> = output.as_object().unwrap().keys().collect();
        assert_eq!(
            keys,
            vec![
                "salary_trends",
                "location_analysis",
                "company_insights",
                "remote_work_trends",
                "market_demands",
                "industry_trends"
            ]
        );
        assert_eq!(output["salary_trends"]["statistics"]["median"], json!(120000.0));
        assert_eq!(output["salary_trends"]["insights"], "insight");
        assert_eq!(llm.call_count(), 6);
        assert!(llm.prompts()[4].contains("\"python\":5"));
    }

    #[tokio::test]
    async fn test_failed_salary_insight_keeps_order() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(dir.path());
        ctx.llm = Arc::new(ScriptedLlm::new(|prompt| {
            if prompt.contains("Salary trends") {
                Err(crate::errors::ServiceError::EmptyContent)
            } else {
                Ok("insight".to_string())
            }
        }));

        let inputs = StageInputs::new()
            .with(JOB_DATA, json!([{"title": "SWE"}]))
            .with(TECH_ANALYSIS, json!({}));
        let output = MarketReportStage.compute(&ctx, &inputs).await.unwrap();

        let keys: Vec<&String> = output.as_object().unwrap().keys().collect();
        assert_eq!(keys.first().map(|k| k.as_str()), Some("salary_trends"));
        assert_eq!(keys.last().map(|k| k.as_str()), Some("industry_trends"));
        assert_eq!(keys.len(), 6);
        assert_eq!(output["salary_trends"]["insights"], Value::Null);
    }

    #[tokio::test]
    async fn test_missing_tech_analysis_is_missing_input() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path());
        let inputs = StageInputs::new().with(JOB_DATA, json!([]));
        let err = MarketReportStage.compute(&ctx, &inputs).await.unwrap_err();
        assert!(matches!(err, StageError::MissingInput(_)));
    }
}
