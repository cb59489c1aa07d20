use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::ModelFamily;

pub const PROJECT_ROOT_VAR: &str = "SWEEP_PROJECT_ROOT";
pub const DATA_ROOT_VAR: &str = "DATA_ROOT";
pub const DIS_ROOT_VAR: &str = "DIS_ROOT";
pub const TARGET_LIST_ROOT_VAR: &str = "TARGET_LIST_ROOT";
pub const SOURCE_LIST_ROOT_VAR: &str = "SOURCE_LIST_ROOT";
pub const RESULTS_ROOT_VAR: &str = "RESULTS_ROOT";
pub const MODEL_OUTPUT_ROOT_VAR: &str = "MODEL_OUTPUT_ROOT";
pub const VENV_ACTIVATE_VAR: &str = "VENV_ACTIVATE";
pub const PYTHON_BIN_VAR: &str = "PYTHON_BIN";
pub const LOG_ROOT_VAR: &str = "LOG_ROOT";
pub const ARRAY_TASK_ID_VAR: &str = "SLURM_ARRAY_TASK_ID";
pub const ARRAY_JOB_ID_VAR: &str = "SLURM_ARRAY_JOB_ID";
pub const JOB_ID_VAR: &str = "SLURM_JOB_ID";

pub const DEFAULT_INTERPRETER: &str = "python3";

const PROJECT_MARKERS: &[&str] = &["sweep.yaml", ".sweep"];
const WORKSPACE_MARKERS: &[&str] = &["Cargo.toml", ".git"];
const BUILD_DIR: &str = "target";

const OVERRIDE_VARS: &[&str] = &[
    PROJECT_ROOT_VAR,
    DATA_ROOT_VAR,
    DIS_ROOT_VAR,
    TARGET_LIST_ROOT_VAR,
    SOURCE_LIST_ROOT_VAR,
    RESULTS_ROOT_VAR,
    MODEL_OUTPUT_ROOT_VAR,
    VENV_ACTIVATE_VAR,
    PYTHON_BIN_VAR,
    LOG_ROOT_VAR,
    ARRAY_TASK_ID_VAR,
    ARRAY_JOB_ID_VAR,
    JOB_ID_VAR,
];

pub type Overrides = BTreeMap<String, String>;

/// Snapshot of the override variables present in the process environment.
pub fn overrides_from_env() -> Overrides {
    OVERRIDE_VARS
        .iter()
        .filter_map(|name| std::env::var(name).ok().map(|v| (name.to_string(), v)))
        .collect()
}

/// Present-and-non-empty lookup; blank values count as unset.
pub fn override_value<'a>(overrides: &'a Overrides, name: &str) -> Option<&'a str> {
    overrides
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointMode {
    Enabled,
    #[default]
    Disabled,
}

impl CheckpointMode {
    pub fn from_flags(save_models: bool, no_save_models: bool) -> Self {
        if save_models && !no_save_models {
            CheckpointMode::Enabled
        } else {
            CheckpointMode::Disabled
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelOutput {
    Enabled(PathBuf),
    Disabled,
}

impl ModelOutput {
    pub fn is_enabled(&self) -> bool {
        matches!(self, ModelOutput::Enabled(_))
    }

    /// Value handed to the training process; empty means "do not persist".
    pub fn as_arg(&self) -> String {
        match self {
            ModelOutput::Enabled(path) => path.to_string_lossy().to_string(),
            ModelOutput::Disabled => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Script(PathBuf),
    Ambient,
}

/// A resolved value plus the non-fatal problems found along the way.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub value: T,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentConfig {
    pub project_root: PathBuf,
    pub data_root: PathBuf,
    pub dis_root: PathBuf,
    pub target_list_root: PathBuf,
    pub source_list_root: PathBuf,
    pub results_root: PathBuf,
    pub model_output: ModelOutput,
    pub interpreter: String,
    pub activation: Activation,
    pub logs_root: PathBuf,
}

impl EnvironmentConfig {
    pub fn resolve(
        overrides: &Overrides,
        project_root: &Path,
        family: ModelFamily,
        checkpoint: CheckpointMode,
    ) -> Resolved<Self> {
        let root = project_root.to_path_buf();
        let path_or = |name: &str, default: PathBuf| -> PathBuf {
            match override_value(overrides, name) {
                Some(v) => absolutize(&root, Path::new(v)),
                None => default,
            }
        };

        let data_root = path_or(DATA_ROOT_VAR, root.join("data"));
        let dis_root = path_or(DIS_ROOT_VAR, root.join("data").join("distance"));
        let target_list_root = path_or(
            TARGET_LIST_ROOT_VAR,
            root.join("data").join("splits").join("targets"),
        );
        let source_list_root = path_or(
            SOURCE_LIST_ROOT_VAR,
            root.join("data").join("splits").join("sources"),
        );
        let results_root = path_or(
            RESULTS_ROOT_VAR,
            root.join("results").join(family.as_str()).join("raw"),
        );
        let model_output = match checkpoint {
            CheckpointMode::Enabled => ModelOutput::Enabled(path_or(
                MODEL_OUTPUT_ROOT_VAR,
                root.join("models").join(family.as_str()),
            )),
            CheckpointMode::Disabled => ModelOutput::Disabled,
        };
        let logs_root = path_or(LOG_ROOT_VAR, root.join("logs"));

        let interpreter = match override_value(overrides, PYTHON_BIN_VAR) {
            Some(bin) if bin.contains(std::path::MAIN_SEPARATOR) => {
                absolutize(&root, Path::new(bin)).to_string_lossy().to_string()
            }
            Some(bin) => bin.to_string(),
            None => DEFAULT_INTERPRETER.to_string(),
        };

        let mut warnings = Vec::new();
        let activate = path_or(
            VENV_ACTIVATE_VAR,
            root.join(".venv").join("bin").join("activate"),
        );
        let activation = if activate.is_file() {
            Activation::Script(activate)
        } else {
            warnings.push(format!(
                "virtual environment activation script not found at {}; using ambient '{}'",
                activate.display(),
                interpreter
            ));
            Activation::Ambient
        };

        Resolved {
            value: Self {
                project_root: root,
                data_root,
                dis_root,
                target_list_root,
                source_list_root,
                results_root,
                model_output,
                interpreter,
                activation,
                logs_root,
            },
            warnings,
        }
    }

    pub fn target_list(&self, seed: u32) -> PathBuf {
        self.target_list_root
            .join(format!("target_seed{}.txt", seed))
    }

    pub fn source_list(&self, seed: u32) -> PathBuf {
        self.source_list_root
            .join(format!("source_seed{}.txt", seed))
    }

    pub fn resolve_in_project(&self, path: &Path) -> PathBuf {
        absolutize(&self.project_root, path)
    }
}

fn absolutize(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Project root seen from the dispatcher's directory `start`, in order:
/// nearest `sweep.yaml`/`.sweep`, nearest `Cargo.toml`/`.git`, the parent of
/// an enclosing cargo `target/` dir, and finally the parent of `start`.
pub fn find_project_root(start: &Path) -> PathBuf {
    if let Some(root) = nearest_with_marker(start, PROJECT_MARKERS) {
        return root;
    }
    if let Some(root) = nearest_with_marker(start, WORKSPACE_MARKERS) {
        return root;
    }
    let build_root = start
        .ancestors()
        .find(|p| p.file_name().is_some_and(|n| n == BUILD_DIR))
        .and_then(Path::parent);
    match build_root {
        Some(root) => root.to_path_buf(),
        None => start.parent().unwrap_or(start).to_path_buf(),
    }
}

fn nearest_with_marker(start: &Path, markers: &[&str]) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|p| markers.iter().any(|m| p.join(m).exists()))
        .map(Path::to_path_buf)
}

/// Project root for this process, never derived from the working directory
/// unless an explicit relative override asks for it.
pub fn resolve_project_root(overrides: &Overrides) -> Result<PathBuf> {
    if let Some(root) = override_value(overrides, PROJECT_ROOT_VAR) {
        let root = PathBuf::from(root);
        return Ok(root.canonicalize().unwrap_or(root));
    }
    let exe = std::env::current_exe()
        .map_err(|e| anyhow!("cannot locate the dispatcher executable: {}", e))?;
    let exe = exe.canonicalize().unwrap_or(exe);
    let exe_dir = exe
        .parent()
        .ok_or_else(|| anyhow!("executable path has no parent: {}", exe.display()))?;
    Ok(find_project_root(exe_dir))
}
