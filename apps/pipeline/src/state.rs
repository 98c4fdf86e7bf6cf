use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::llm_client::TextGenerationService;
use crate::search::JobSearchProvider;
use crate::vector_store::VectorStore;

/// Tunables every stage may read.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub tech_batch_size: usize,
    pub max_chunk_size: usize,
    /// Pause between consecutive external calls inside a stage.
    pub request_delay: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            tech_batch_size: 20,
            max_chunk_size: 50_000,
            request_delay: Duration::from_secs(1),
        }
    }
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            tech_batch_size: config.tech_batch_size,
            max_chunk_size: config.max_chunk_size,
            request_delay: config.request_delay,
        }
    }
}

/// Explicit context handed to every stage: service clients, settings and the
/// cache root. Cheap to clone.
#[derive(Clone)]
pub struct StageContext {
    /// Analysis model.
    pub llm: Arc<dyn TextGenerationService>,
    /// Cheaper model used for chunk summaries.
    pub summarizer: Arc<dyn TextGenerationService>,
    pub search: Arc<dyn JobSearchProvider>,
    /// Pluggable retrieval. `None` falls back to the first records.
    pub vectors: Option<Arc<dyn VectorStore>>,
    pub settings: PipelineSettings,
    pub cache_root: PathBuf,
}
