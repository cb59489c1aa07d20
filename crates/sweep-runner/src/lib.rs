mod config;
mod dispatch;
mod env;
mod task;

pub use config::{GridConfig, ModelFamily, SweepConfig, SweepSettings, RESERVED_ARGS};
pub use dispatch::{array_job_id, run_array, run_local, DispatchContext, LocalSummary};
pub use env::{
    find_project_root, override_value, overrides_from_env, resolve_project_root, Activation,
    CheckpointMode, EnvironmentConfig, ModelOutput, Overrides, Resolved, ARRAY_JOB_ID_VAR,
    ARRAY_TASK_ID_VAR, DATA_ROOT_VAR, DEFAULT_INTERPRETER, DIS_ROOT_VAR, JOB_ID_VAR,
    LOG_ROOT_VAR, MODEL_OUTPUT_ROOT_VAR, PROJECT_ROOT_VAR, PYTHON_BIN_VAR, RESULTS_ROOT_VAR,
    SOURCE_LIST_ROOT_VAR, TARGET_LIST_ROOT_VAR, VENV_ACTIVATE_VAR,
};
pub use task::{
    build_invocation, training_args, Console, Invocation, TaskIdentity, TaskPaths, TaskResult,
    TaskRunner, TaskStatus, SPAWN_FAILED_EXIT_CODE,
};
