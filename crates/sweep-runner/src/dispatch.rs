use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use sweep_core::{resolve_array_index, resolve_indices, Grid};
use tracing::{info, warn};

use crate::config::SweepSettings;
use crate::env::{
    override_value, CheckpointMode, EnvironmentConfig, Overrides, ARRAY_JOB_ID_VAR,
    ARRAY_TASK_ID_VAR, JOB_ID_VAR,
};
use crate::task::{Console, TaskIdentity, TaskResult, TaskRunner, TaskStatus};

/// Inputs shared by both backends.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub settings: SweepSettings,
    pub overrides: Overrides,
    pub project_root: PathBuf,
    pub checkpoint: CheckpointMode,
    pub console: Console,
}

impl DispatchContext {
    pub fn new(settings: SweepSettings, overrides: Overrides, project_root: &Path) -> Self {
        Self {
            settings,
            overrides,
            project_root: project_root.to_path_buf(),
            checkpoint: CheckpointMode::default(),
            console: Console::default(),
        }
    }

    pub fn with_checkpoint(mut self, checkpoint: CheckpointMode) -> Self {
        self.checkpoint = checkpoint;
        self
    }

    pub fn with_console(mut self, console: Console) -> Self {
        self.console = console;
        self
    }

    /// Resolves the environment once and reports its non-fatal warnings.
    fn resolve_environment(&self) -> EnvironmentConfig {
        let resolved = EnvironmentConfig::resolve(
            &self.overrides,
            &self.project_root,
            self.settings.family,
            self.checkpoint,
        );
        for warning in &resolved.warnings {
            warn!("{}", warning);
        }
        resolved.value
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LocalSummary {
    pub results: Vec<TaskResult>,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Tasks stopped by a dispatcher-side I/O error.
    pub aborted: usize,
}

impl LocalSummary {
    fn record(&mut self, result: TaskResult) {
        match result.status {
            TaskStatus::Skipped => self.skipped += 1,
            TaskStatus::Aborted => self.aborted += 1,
            status if status.succeeded() => self.succeeded += 1,
            _ => self.failed += 1,
        }
        self.results.push(result);
    }

    pub fn executed(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Local backend: every requested index, in order, one after another. A
/// failing task never stops the loop.
pub fn run_local(ctx: &DispatchContext, requested: &[i64]) -> Result<LocalSummary> {
    let grid = Grid::build(&ctx.settings.grid)?;
    let indices = resolve_indices(requested, grid.len());
    let env = ctx.resolve_environment();
    info!(
        model = %ctx.settings.family,
        tasks = indices.len(),
        grid_len = grid.len(),
        save_models = env.model_output.is_enabled(),
        "starting local sweep"
    );

    let runner = TaskRunner::new(&grid, &env, &ctx.settings).with_console(ctx.console.clone());
    let mut summary = LocalSummary::default();
    for index in indices {
        summary.record(runner.run(&TaskIdentity::local(index, Utc::now())));
    }
    info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        skipped = summary.skipped,
        aborted = summary.aborted,
        "local sweep finished"
    );
    Ok(summary)
}

/// Cluster backend: exactly one task, addressed by the scheduler's array
/// task id. An invalid id fails before anything is launched.
pub fn run_array(ctx: &DispatchContext) -> Result<TaskResult> {
    let grid = Grid::build(&ctx.settings.grid)?;
    let raw = override_value(&ctx.overrides, ARRAY_TASK_ID_VAR);
    let index = resolve_array_index(raw, grid.len())?;
    let env = ctx.resolve_environment();
    let job_id = array_job_id(&ctx.overrides, index);
    info!(index, job_id = %job_id, model = %ctx.settings.family, "starting array task");

    let runner = TaskRunner::new(&grid, &env, &ctx.settings).with_console(ctx.console.clone());
    Ok(runner.run(&TaskIdentity::array(index as i64, job_id)))
}

/// Scheduler job id in `%A_%a` form when available.
pub fn array_job_id(overrides: &Overrides, index: usize) -> String {
    if let Some(array_job) = override_value(overrides, ARRAY_JOB_ID_VAR) {
        let task = override_value(overrides, ARRAY_TASK_ID_VAR)
            .map(str::to_string)
            .unwrap_or_else(|| index.to_string());
        return format!("{}_{}", array_job, task);
    }
    override_value(overrides, JOB_ID_VAR)
        .map(str::to_string)
        .unwrap_or_else(|| "array".to_string())
}
