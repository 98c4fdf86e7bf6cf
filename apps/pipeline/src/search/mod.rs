//! Job search: the source of the first stage's input collection.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::ServiceError;
use crate::models::record::{self, Record};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[async_trait]
pub trait JobSearchProvider: Send + Sync {
    /// Postings for `query` in `location`, already normalised.
    async fn search(&self, query: &str, location: &str) -> Result<Vec<Record>, ServiceError>;
}

/// Google Jobs via SerpAPI.
#[derive(Clone)]
pub struct SerpApiProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl SerpApiProvider {
    pub fn new(api_key: String, base_url: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl JobSearchProvider for SerpApiProvider {
    async fn search(&self, query: &str, location: &str) -> Result<Vec<Record>, ServiceError> {
        let response = self
            .client
            .get(format!("{}/search.json", self.base_url))
            .query(&[
                ("engine", "google_jobs"),
                ("q", query),
                ("location", location),
                ("hl", "en"),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
                .unwrap_or(body);
            return Err(ServiceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response.json().await?;
        let Some(results) = body.get("jobs_results") else {
            let keys: Vec<&str> = body
                .as_object()
                .map(|m| m.keys().map(String::as_str).collect())
                .unwrap_or_default();
            warn!("No jobs_results in response for '{query}' in '{location}'. Keys: {keys:?}");
            return Ok(Vec::new());
        };

        let items = results.as_array().ok_or_else(|| {
            ServiceError::UnexpectedPayload("jobs_results is not a list".to_string())
        })?;

        let postings: Vec<Record> = items.iter().cloned().filter_map(record::normalize).collect();
        debug!("Found {} jobs for '{query}' in '{location}'", postings.len());
        Ok(postings)
    }
}
