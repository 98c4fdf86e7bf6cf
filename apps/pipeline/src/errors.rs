#![allow(dead_code)]

use thiserror::Error;

/// Transport, auth or quota failure from an external service
/// (text generation, job search, embeddings).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Service returned empty content")]
    EmptyContent,

    #[error("Unexpected response payload: {0}")]
    UnexpectedPayload(String),
}

impl ServiceError {
    /// Rate limits, server errors and transport failures are worth another attempt.
    /// Auth and request errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ServiceError::Api { status, .. } => *status == 429 || *status >= 500,
            ServiceError::EmptyContent | ServiceError::UnexpectedPayload(_) => false,
        }
    }
}

/// Generated content did not parse into the expected structured shape.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Expected a JSON object at '{path}', found {found}")]
    NotAnObject { path: String, found: &'static str },

    #[error("Category '{path}' expected {expected}, found {found}")]
    WrongShape {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Failure of a single batch worker. Absorbed by the batch processor.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Failure reading or writing a cache entry.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No cache entry for stage '{0}'")]
    NotFound(String),

    #[error("Cache I/O error for '{stage}': {source}")]
    Io {
        stage: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt cache entry for '{stage}': {source}")]
    Serde {
        stage: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure indexing or querying the retrieval store.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("Embedding service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Index persistence error: {0}")]
    Persist(#[from] StoreError),
}

/// Partials disagree on the kind of a category, so they cannot be merged.
#[derive(Debug, Error)]
pub enum ReduceError {
    #[error("Category '{category}' is a {existing} in one partial and a {incoming} in another")]
    KindMismatch {
        category: String,
        existing: &'static str,
        incoming: &'static str,
    },
}

/// Unrecoverable failure inside a stage's compute function.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("External service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Reduction error: {0}")]
    Reduce(#[from] ReduceError),

    #[error("Cache error: {0}")]
    Store(#[from] StoreError),

    #[error("Retrieval error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("Missing input '{0}'")]
    MissingInput(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<BatchError> for StageError {
    fn from(err: BatchError) -> Self {
        match err {
            BatchError::Service(e) => StageError::Service(e),
            BatchError::Parse(e) => StageError::Parse(e),
        }
    }
}

/// Terminal error of a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid pipeline definition: {0}")]
    InvalidPipeline(String),

    #[error("Stage '{stage}' requires '{dependency}', which has no cached output")]
    DependencyMissing { stage: String, dependency: String },

    #[error("Cache error: {0}")]
    Cache(#[from] StoreError),

    #[error("Stage '{stage}' failed: {source}")]
    StageFailed {
        stage: String,
        #[source]
        source: StageError,
    },
}

impl PipelineError {
    /// Name of the stage the error is attributed to, if any.
    pub fn stage(&self) -> Option<&str> {
        match self {
            PipelineError::DependencyMissing { stage, .. }
            | PipelineError::StageFailed { stage, .. } => Some(stage),
            _ => None,
        }
    }
}
