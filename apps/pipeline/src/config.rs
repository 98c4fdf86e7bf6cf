use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::PipelineError;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_SERPAPI_BASE_URL: &str = "https://serpapi.com";

/// Pipeline configuration loaded from environment variables.
/// Missing credentials are a startup-time configuration error.
#[derive(Debug, Clone)]
pub struct Config {
    pub serpapi_api_key: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub serpapi_base_url: String,
    pub cache_dir: PathBuf,
    pub report_dir: PathBuf,
    pub tech_batch_size: usize,
    pub max_chunk_size: usize,
    pub request_delay: Duration,
    pub llm_max_retries: u32,
    pub enable_embeddings: bool,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self, PipelineError> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Config {
            serpapi_api_key: require(&lookup, "SERPAPI_API_KEY")?,
            openai_api_key: require(&lookup, "OPENAI_API_KEY")?,
            openai_base_url: lookup("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            serpapi_base_url: lookup("SERPAPI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_SERPAPI_BASE_URL.to_string()),
            cache_dir: lookup("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
            report_dir: lookup("REPORT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("reports")),
            tech_batch_size: parse_or(&lookup, "TECH_BATCH_SIZE", 20)?,
            max_chunk_size: parse_or(&lookup, "MAX_CHUNK_SIZE", 50_000)?,
            request_delay: Duration::from_millis(parse_or(&lookup, "REQUEST_DELAY_MS", 1000)?),
            llm_max_retries: parse_or(&lookup, "LLM_MAX_RETRIES", 3)?,
            enable_embeddings: parse_or(&lookup, "ENABLE_EMBEDDINGS", false)?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn require<F>(lookup: &F, key: &str) -> Result<String, PipelineError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(PipelineError::Configuration(format!(
            "Required environment variable '{key}' is not set"
        ))),
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, PipelineError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|_| {
            PipelineError::Configuration(format!("'{key}' has an invalid value: '{raw}'"))
        }),
    }
}
