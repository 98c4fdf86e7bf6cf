//! In-process fakes shared by the unit tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::{ServiceError, StageError};
use crate::llm_client::{ChatMessage, Role, TextGenerationService};
use crate::models::Record;
use crate::pipeline::{Stage, StageInputs};
use crate::search::JobSearchProvider;
use crate::state::{PipelineSettings, StageContext};

type StageFn = dyn Fn(&StageInputs) -> Result<Value, StageError> + Send + Sync;

/// A stage backed by a closure, counting its compute calls.
pub struct FnStage {
    name: &'static str,
    deps: Vec<&'static str>,
    calls: Arc<AtomicUsize>,
    f: Box<StageFn>,
}

impl FnStage {
    pub fn new<F>(name: &'static str, deps: &[&'static str], f: F) -> Self
    where
        F: Fn(&StageInputs) -> Result<Value, StageError> + Send + Sync + 'static,
    {
        Self {
            name,
            deps: deps.to_vec(),
            calls: Arc::new(AtomicUsize::new(0)),
            f: Box::new(f),
        }
    }

    pub fn constant(name: &'static str, deps: &[&'static str], value: Value) -> Self {
        Self::new(name, deps, move |_| Ok(value.clone()))
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl Stage for FnStage {
    fn name(&self) -> &str {
        self.name
    }

    fn dependencies(&self) -> &[&str] {
        &self.deps
    }

    async fn compute(&self, _ctx: &StageContext, inputs: &StageInputs) -> Result<Value, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.f)(inputs)
    }
}

type LlmFn = dyn Fn(&str) -> Result<String, ServiceError> + Send + Sync;

/// Text generation fake: replies are computed from the last user message.
pub struct ScriptedLlm {
    reply: Box<LlmFn>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new<F>(reply: F) -> Self
    where
        F: Fn(&str) -> Result<String, ServiceError> + Send + Sync + 'static,
    {
        Self {
            reply: Box::new(reply),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn always(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    pub fn failing() -> Self {
        Self::new(|_| {
            Err(ServiceError::Api {
                status: 401,
                message: "invalid key".to_string(),
            })
        })
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerationService for ScriptedLlm {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ServiceError> {
        let prompt = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.prompts.lock().unwrap().push(prompt.clone());
        (self.reply)(&prompt)
    }
}

type SearchFn = dyn Fn(&str, &str) -> Result<Vec<Record>, ServiceError> + Send + Sync;

pub struct FakeSearch {
    results: Box<SearchFn>,
    calls: AtomicUsize,
}

impl FakeSearch {
    pub fn new<F>(results: F) -> Self
    where
        F: Fn(&str, &str) -> Result<Vec<Record>, ServiceError> + Send + Sync + 'static,
    {
        Self {
            results: Box::new(results),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::new(|_, _| Ok(Vec::new()))
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobSearchProvider for FakeSearch {
    async fn search(&self, query: &str, location: &str) -> Result<Vec<Record>, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.results)(query, location)
    }
}

pub fn settings() -> PipelineSettings {
    PipelineSettings {
        tech_batch_size: 20,
        max_chunk_size: 50_000,
        request_delay: Duration::ZERO,
    }
}

/// Context with no-op services and no delays.
pub fn context(cache_root: &Path) -> StageContext {
    StageContext {
        llm: Arc::new(ScriptedLlm::always("{}")),
        summarizer: Arc::new(ScriptedLlm::always("summary")),
        search: Arc::new(FakeSearch::empty()),
        vectors: None,
        settings: settings(),
        cache_root: cache_root.to_path_buf(),
    }
}
