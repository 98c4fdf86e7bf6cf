use std::collections::HashSet;

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use super::JOB_DATA;
use crate::errors::StageError;
use crate::models::record;
use crate::pipeline::{Stage, StageInputs};
use crate::state::StageContext;

pub const ROLES: [&str; 12] = [
    "Software Engineer",
    "AI Engineer",
    "Machine Learning Engineer",
    "Data Scientist",
    "DevOps Engineer",
    "Cloud Engineer",
    "Full Stack Developer",
    "Backend Engineer",
    "Frontend Engineer",
    "Computer Vision Engineer",
    "UI/UX Designer",
    "AI Product Manager",
];

pub const LOCATIONS: [&str; 9] = [
    "United States",
    "Canada",
    "United Kingdom",
    "Europe",
    "Asia",
    "Australia",
    "New Zealand",
    "Middle East",
    "South America",
];

/// Collects postings for every role in every location. A failed search is
/// logged and skipped; duplicates across searches keep their first occurrence.
pub struct JobDataStage {
    roles: Vec<String>,
    locations: Vec<String>,
}

impl Default for JobDataStage {
    fn default() -> Self {
        Self::new(&ROLES, &LOCATIONS)
    }
}

impl JobDataStage {
    pub fn new(roles: &[&str], locations: &[&str]) -> Self {
        Self {
            roles: roles.iter().map(|s| s.to_string()).collect(),
            locations: locations.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Every (role, location) pair, role-major.
    fn queries(&self) -> Vec<(&str, &str)> {
        self.roles
            .iter()
            .flat_map(|role| self.locations.iter().map(move |loc| (role.as_str(), loc.as_str())))
            .collect()
    }
}

#[async_trait]
impl Stage for JobDataStage {
    fn name(&self) -> &str {
        JOB_DATA
    }

    fn dependencies(&self) -> &[&str] {
        &[]
    }

    async fn compute(&self, ctx: &StageContext, _inputs: &StageInputs) -> Result<Value, StageError> {
        let queries = self.queries();
        let total_searches = queries.len();
        let mut seen = HashSet::new();
        let mut jobs = Vec::new();
        let mut failed_searches = 0;

        for (i, &(role, location)) in queries.iter().enumerate() {
            if i > 0 && !ctx.settings.request_delay.is_zero() {
                tokio::time::sleep(ctx.settings.request_delay).await;
            }

            info!("Searching for {} in {} ({}/{})", role, location, i + 1, total_searches);
            let postings = match ctx.search.search(role, location).await {
                Ok(postings) => postings,
                Err(e) => {
                    warn!("Search for {} in {} failed: {}", role, location, e);
                    failed_searches += 1;
                    continue;
                }
            };

            let found = postings.len();
            for mut posting in postings {
                posting.insert("search_location".to_string(), Value::String(location.to_string()));
                if seen.insert(record::dedup_key(&posting)) {
                    jobs.push(Value::Object(posting));
                }
            }
            info!("Found {} jobs for {} in {}; {} unique so far", found, role, location, jobs.len());
        }

        if failed_searches > 0 {
            warn!("{} of {} searches failed", failed_searches, total_searches);
        }
        if jobs.is_empty() {
            return Err(StageError::Internal(anyhow!(
                "no job postings collected from {} searches",
                total_searches
            )));
        }

        info!("Final collection: {} unique jobs", jobs.len());
        Ok(Value::Array(jobs))
    }
}
