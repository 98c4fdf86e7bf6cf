#![allow(dead_code)]

//! Pipeline orchestrator: runs stages in order, short-circuiting through the
//! stage store.
//!
//! A stage whose cache entry exists is loaded instead of computed, unless the
//! run forces a refresh. A stage failure marks it `Failed`, aborts the rest of
//! the chain and is returned to the caller with the stage name. Entries saved
//! by earlier stages stay on disk for the next run.

use std::fmt;

use serde_json::Value;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::{Pipeline, Stage, StageInputs};
use crate::errors::{PipelineError, StageError};
use crate::state::StageContext;
use crate::store::StageStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Completed => "completed",
            StageStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunMode {
    /// Ignore existing cache entries and recompute every stage.
    pub force_refresh: bool,
    /// Recompute only the final stage, loading its inputs from the store.
    pub report_only: bool,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    /// Output of the final stage.
    pub output: Value,
    pub statuses: Vec<(String, StageStatus)>,
    pub computed: Vec<String>,
    pub cached: Vec<String>,
}

impl RunReport {
    pub fn status(&self, stage: &str) -> Option<StageStatus> {
        self.statuses
            .iter()
            .find(|(name, _)| name == stage)
            .map(|(_, status)| *status)
    }
}

/// Transient per-run state: statuses and the outputs wired between stages.
struct PipelineState {
    statuses: Vec<(String, StageStatus)>,
    outputs: Vec<(String, Value)>,
    computed: Vec<String>,
    cached: Vec<String>,
}

impl PipelineState {
    fn new(pipeline: &Pipeline) -> Self {
        Self {
            statuses: pipeline
                .names()
                .into_iter()
                .map(|n| (n.to_string(), StageStatus::Pending))
                .collect(),
            outputs: Vec::new(),
            computed: Vec::new(),
            cached: Vec::new(),
        }
    }

    fn status(&self, stage: &str) -> StageStatus {
        self.statuses
            .iter()
            .find(|(name, _)| name == stage)
            .map(|(_, s)| *s)
            .unwrap_or(StageStatus::Pending)
    }

    fn set(&mut self, stage: &str, status: StageStatus) {
        if let Some(slot) = self.statuses.iter_mut().find(|(name, _)| name == stage) {
            slot.1 = status;
        }
    }

    fn complete(&mut self, stage: &str, output: Value, computed: bool) {
        self.set(stage, StageStatus::Completed);
        if computed {
            self.computed.push(stage.to_string());
        } else {
            self.cached.push(stage.to_string());
        }
        self.outputs.push((stage.to_string(), output));
    }

    fn inputs_for(&self, stage: &dyn Stage) -> Result<StageInputs, PipelineError> {
        let mut inputs = StageInputs::new();
        for dep in stage.dependencies() {
            let output = self
                .outputs
                .iter()
                .find(|(name, _)| name == dep)
                .filter(|_| self.status(dep) == StageStatus::Completed)
                .ok_or_else(|| PipelineError::DependencyMissing {
                    stage: stage.name().to_string(),
                    dependency: dep.to_string(),
                })?;
            inputs.insert(*dep, output.1.clone());
        }
        Ok(inputs)
    }
}

pub struct PipelineOrchestrator {
    pipeline: Pipeline,
    store: StageStore,
    ctx: StageContext,
}

impl PipelineOrchestrator {
    pub fn new(pipeline: Pipeline, store: StageStore, ctx: StageContext) -> Self {
        Self {
            pipeline,
            store,
            ctx,
        }
    }

    pub fn store(&self) -> &StageStore {
        &self.store
    }

    pub async fn run(&self, mode: RunMode) -> Result<RunReport, PipelineError> {
        let run_id = Uuid::new_v4();
        let mut state = PipelineState::new(&self.pipeline);

        let names = self.pipeline.names();
        let resumable: Vec<String> = match self.store.entries() {
            Ok(entries) => entries
                .into_iter()
                .filter(|e| names.contains(&e.as_str()))
                .collect(),
            Err(e) => {
                warn!("Could not list cached stages: {}", e);
                Vec::new()
            }
        };
        info!(
            "Pipeline run {} starting (force_refresh={}, report_only={}); cached stages: {:?}",
            run_id, mode.force_refresh, mode.report_only, resumable
        );

        if mode.report_only {
            self.run_final_only(&mut state).await?;
        } else {
            for stage in self.pipeline.stages() {
                self.run_stage(stage.as_ref(), mode.force_refresh, &mut state)
                    .await?;
            }
        }

        let final_name = self.pipeline.final_stage().name();
        let output = state
            .outputs
            .iter()
            .find(|(name, _)| name == final_name)
            .map(|(_, v)| v.clone())
            .unwrap_or(Value::Null);

        info!(
            "Pipeline run {} completed: computed {:?}, loaded from cache {:?}",
            run_id, state.computed, state.cached
        );

        Ok(RunReport {
            run_id,
            output,
            statuses: state.statuses,
            computed: state.computed,
            cached: state.cached,
        })
    }

    /// Loads each dependency of the final stage from the store, then
    /// recomputes the final stage.
    async fn run_final_only(&self, state: &mut PipelineState) -> Result<(), PipelineError> {
        let last = self.pipeline.final_stage();
        for dep in last.dependencies() {
            if !self.store.exists(dep) {
                return Err(PipelineError::DependencyMissing {
                    stage: last.name().to_string(),
                    dependency: dep.to_string(),
                });
            }
            let output = self.load(dep)?;
            info!("Loaded '{}' from cache", dep);
            state.complete(dep, output, false);
        }
        self.compute(last.as_ref(), state).await
    }

    async fn run_stage(
        &self,
        stage: &dyn Stage,
        force_refresh: bool,
        state: &mut PipelineState,
    ) -> Result<(), PipelineError> {
        let name = stage.name();

        if !force_refresh && self.store.exists(name) {
            let output = self.load(name)?;
            info!("Stage '{}' already completed, loaded from cache", name);
            state.complete(name, output, false);
            return Ok(());
        }

        self.compute(stage, state).await
    }

    async fn compute(&self, stage: &dyn Stage, state: &mut PipelineState) -> Result<(), PipelineError> {
        let name = stage.name();
        let inputs = state.inputs_for(stage)?;

        state.set(name, StageStatus::Running);
        info!("Running stage '{}'", name);

        let span = info_span!("stage", name = %name);
        let result = stage.compute(&self.ctx, &inputs).instrument(span).await;

        let output = match result {
            Ok(output) => output,
            Err(source) => return Err(fail(state, name, source)),
        };

        if let Err(e) = self.store.save(name, &output) {
            return Err(fail(state, name, StageError::Store(e)));
        }

        info!("Stage '{}' completed and cached", name);
        state.complete(name, output, true);
        Ok(())
    }

    fn load(&self, stage: &str) -> Result<Value, PipelineError> {
        self.store
            .load(stage)
            .map_err(|e| PipelineError::StageFailed {
                stage: stage.to_string(),
                source: StageError::Store(e),
            })
    }
}

fn fail(state: &mut PipelineState, stage: &str, source: StageError) -> PipelineError {
    state.set(stage, StageStatus::Failed);
    error!("Stage '{}' failed: {}", stage, source);
    PipelineError::StageFailed {
        stage: stage.to_string(),
        source,
    }
}
