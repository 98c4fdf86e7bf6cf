//! Pipeline definition: named stages with declared dependencies.
//!
//! The chain is linear, but each stage lists the earlier stages it reads, so
//! the model generalises to a DAG. Validation happens once, in `Pipeline::new`.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::{ParseError, PipelineError, StageError};
use crate::state::StageContext;

pub mod orchestrator;

pub use orchestrator::{PipelineOrchestrator, RunMode};

/// One step of the pipeline. `compute` is only called once every dependency
/// has completed, with their outputs in `inputs`.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    fn dependencies(&self) -> &[&str];

    async fn compute(&self, ctx: &StageContext, inputs: &StageInputs) -> Result<Value, StageError>;
}

/// Outputs of a stage's dependencies, keyed by stage name.
#[derive(Debug, Clone, Default)]
pub struct StageInputs {
    values: Vec<(String, Value)>,
}

impl StageInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, stage: impl Into<String>, value: Value) {
        self.values.push((stage.into(), value));
    }

    pub fn with(mut self, stage: impl Into<String>, value: Value) -> Self {
        self.insert(stage, value);
        self
    }

    pub fn get(&self, stage: &str) -> Result<&Value, StageError> {
        self.values
            .iter()
            .find(|(name, _)| name == stage)
            .map(|(_, value)| value)
            .ok_or_else(|| StageError::MissingInput(stage.to_string()))
    }

    /// Deserialises a dependency's output into a typed view.
    pub fn decode<T: DeserializeOwned>(&self, stage: &str) -> Result<T, StageError> {
        let value = self.get(stage)?;
        T::deserialize(value).map_err(|e| StageError::Parse(ParseError::Json(e)))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }
}

/// A validated, ordered list of stages.
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    /// Rejects empty pipelines, duplicate or non-filename-safe names, and
    /// dependencies that do not refer to an earlier stage.
    pub fn new(stages: Vec<Arc<dyn Stage>>) -> Result<Self, PipelineError> {
        if stages.is_empty() {
            return Err(PipelineError::InvalidPipeline(
                "a pipeline needs at least one stage".to_string(),
            ));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for stage in &stages {
            let name = stage.name();
            if !is_valid_name(name) {
                return Err(PipelineError::InvalidPipeline(format!(
                    "stage name '{name}' must be non-empty and use only letters, digits, '_' or '-'"
                )));
            }
            for dep in stage.dependencies() {
                if !seen.contains(dep) {
                    return Err(PipelineError::InvalidPipeline(format!(
                        "stage '{name}' depends on '{dep}', which is not declared before it"
                    )));
                }
            }
            if !seen.insert(name) {
                return Err(PipelineError::InvalidPipeline(format!(
                    "stage '{name}' is declared more than once"
                )));
            }
        }

        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[Arc<dyn Stage>] {
        &self.stages
    }

    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn final_stage(&self) -> &Arc<dyn Stage> {
        // Non-empty by construction
        &self.stages[self.stages.len() - 1]
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
