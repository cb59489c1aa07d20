use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use sweep_core::{ensure_dir, Grid, ParameterTuple};
use tracing::{debug, warn};

use crate::config::{ModelFamily, SweepSettings};
use crate::env::{Activation, EnvironmentConfig};

/// Exit code reported when the training process could not be started.
pub const SPAWN_FAILED_EXIT_CODE: i32 = 127;

const RULE: &str = "====================";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskIdentity {
    pub index: i64,
    pub job_id: String,
    /// Filename suffix; only local runs carry one.
    pub timestamp: Option<String>,
}

impl TaskIdentity {
    pub fn local(index: i64, at: DateTime<Utc>) -> Self {
        Self {
            index,
            job_id: format!("local{:04}", index),
            timestamp: Some(at.format("%Y%m%d_%H%M%S_%6f").to_string()),
        }
    }

    pub fn array(index: i64, job_id: impl Into<String>) -> Self {
        Self {
            index,
            job_id: job_id.into(),
            timestamp: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskStatus {
    Exited { code: i32 },
    Terminated { signal: Option<i32> },
    SpawnFailed,
    Skipped,
    /// The dispatcher could not prepare or record the task.
    Aborted,
}

impl TaskStatus {
    fn from_exit_status(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => TaskStatus::Exited { code },
            None => TaskStatus::Terminated {
                signal: exit_signal(&status),
            },
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            TaskStatus::Exited { code } => Some(*code),
            TaskStatus::SpawnFailed => Some(SPAWN_FAILED_EXIT_CODE),
            TaskStatus::Terminated { .. } | TaskStatus::Skipped | TaskStatus::Aborted => None,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, TaskStatus::Exited { code: 0 })
    }

    /// Exit code to hand back to a scheduler, shell-style for signals.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            TaskStatus::Exited { code } => *code,
            TaskStatus::Terminated { signal: Some(sig) } => 128 + sig,
            TaskStatus::SpawnFailed => SPAWN_FAILED_EXIT_CODE,
            TaskStatus::Terminated { signal: None }
            | TaskStatus::Skipped
            | TaskStatus::Aborted => 1,
        }
    }

    pub fn label(&self) -> String {
        match self {
            TaskStatus::Exited { code } => format!("exited({})", code),
            TaskStatus::Terminated { signal: Some(sig) } => format!("terminated(signal {})", sig),
            TaskStatus::Terminated { signal: None } => "terminated".to_string(),
            TaskStatus::SpawnFailed => "spawn_failed".to_string(),
            TaskStatus::Skipped => "skipped".to_string(),
            TaskStatus::Aborted => "aborted".to_string(),
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskResult {
    pub index: i64,
    pub job_id: String,
    pub parameters: Option<ParameterTuple>,
    pub status: TaskStatus,
    pub exit_code: Option<i32>,
    pub stdout_path: Option<PathBuf>,
    pub stderr_path: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskResult {
    fn skipped(identity: &TaskIdentity, at: DateTime<Utc>) -> Self {
        Self {
            index: identity.index,
            job_id: identity.job_id.clone(),
            parameters: None,
            status: TaskStatus::Skipped,
            exit_code: None,
            stdout_path: None,
            stderr_path: None,
            started_at: at,
            finished_at: at,
            error: None,
        }
    }

    fn aborted(
        identity: &TaskIdentity,
        params: ParameterTuple,
        paths: &TaskPaths,
        started_at: DateTime<Utc>,
        error: String,
    ) -> Self {
        let existing = |p: &Path| p.exists().then(|| p.to_path_buf());
        Self {
            index: identity.index,
            job_id: identity.job_id.clone(),
            parameters: Some(params),
            status: TaskStatus::Aborted,
            exit_code: None,
            stdout_path: existing(&paths.stdout),
            stderr_path: existing(&paths.stderr),
            started_at,
            finished_at: Utc::now(),
            error: Some(error),
        }
    }

    /// One-line operator summary printed after every executed task.
    pub fn summary_line(&self) -> String {
        let params = self
            .parameters
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        let log = self
            .stdout_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        let mut line = format!(
            "[task {}] {} status={} log={}",
            self.index,
            params,
            self.status.label(),
            log
        );
        if let Some(error) = &self.error {
            line.push_str(&format!(" error={}", error));
        }
        line
    }
}

/// Where per-task lines go on the dispatcher's own console.
#[derive(Debug, Clone, Default)]
pub enum Console {
    #[default]
    Stdout,
    Stderr,
    /// Keeps lines in memory, for callers that render them later.
    Buffer(Arc<Mutex<Vec<String>>>),
}

impl Console {
    pub fn buffer() -> Self {
        Console::Buffer(Arc::new(Mutex::new(Vec::new())))
    }

    /// Lines collected so far; empty for the terminal consoles.
    pub fn lines(&self) -> Vec<String> {
        match self {
            Console::Buffer(lines) => lines.lock().map(|l| l.clone()).unwrap_or_default(),
            Console::Stdout | Console::Stderr => Vec::new(),
        }
    }

    fn emit(&self, line: &str) {
        let written = match self {
            Console::Stdout => writeln!(io::stdout().lock(), "{}", line),
            Console::Stderr => writeln!(io::stderr().lock(), "{}", line),
            Console::Buffer(lines) => {
                if let Ok(mut lines) = lines.lock() {
                    lines.push(line.to_string());
                }
                Ok(())
            }
        };
        match written {
            Err(e) if e.kind() != io::ErrorKind::BrokenPipe => {
                warn!(error = %e, "failed to write task summary");
            }
            _ => {}
        }
    }
}

/// `logs/<family>/<condition>/alpha<alpha>/<job_id>_seed<seed>[_<ts>].{out,err}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPaths {
    pub log_dir: PathBuf,
    pub stdout: PathBuf,
    pub stderr: PathBuf,
}

impl TaskPaths {
    pub fn new(
        logs_root: &Path,
        family: ModelFamily,
        params: &ParameterTuple,
        identity: &TaskIdentity,
    ) -> Self {
        let log_dir = logs_root
            .join(family.as_str())
            .join(params.condition.as_str())
            .join(format!("alpha{}", params.alpha));
        let mut stem = format!("{}_seed{}", identity.job_id, params.seed);
        if let Some(ts) = &identity.timestamp {
            stem.push('_');
            stem.push_str(ts);
        }
        Self {
            stdout: log_dir.join(format!("{}.out", stem)),
            stderr: log_dir.join(format!("{}.err", stem)),
            log_dir,
        }
    }

    pub fn prepare(&self) -> Result<()> {
        ensure_dir(&self.log_dir)?;
        Ok(())
    }
}

/// Program plus arguments for one training run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        shell_join(&parts)
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

/// Named-argument contract of the training entry points.
pub fn training_args(
    env: &EnvironmentConfig,
    settings: &SweepSettings,
    params: &ParameterTuple,
) -> Vec<String> {
    let path = |p: &Path| p.to_string_lossy().to_string();
    let mut args = vec![
        "--data_root".to_string(),
        path(&env.data_root),
        "--dis_root".to_string(),
        path(&env.dis_root),
        "--target_list".to_string(),
        path(&env.target_list(params.seed)),
        "--source_list".to_string(),
        path(&env.source_list(params.seed)),
        "--results_root".to_string(),
        path(&env.results_root),
        "--model_output_root".to_string(),
        env.model_output.as_arg(),
        "--condition".to_string(),
        params.condition.as_str().to_string(),
        "--alpha".to_string(),
        params.alpha.to_string(),
        "--seed".to_string(),
        params.seed.to_string(),
    ];
    for (key, value) in &settings.tuning {
        args.push(format!("--{}", key));
        args.push(value.clone());
    }
    args
}

pub fn build_invocation(
    env: &EnvironmentConfig,
    settings: &SweepSettings,
    params: &ParameterTuple,
) -> Invocation {
    let script = env.resolve_in_project(&settings.script);
    let mut direct = vec![script.to_string_lossy().to_string()];
    direct.extend(training_args(env, settings, params));

    match &env.activation {
        Activation::Ambient => Invocation {
            program: env.interpreter.clone(),
            args: direct,
        },
        Activation::Script(activate) => {
            let mut parts = vec![env.interpreter.clone()];
            parts.extend(direct);
            let script = format!(
                ". {} && exec {}",
                shell_quote(&activate.to_string_lossy()),
                shell_join(&parts)
            );
            Invocation {
                program: "sh".to_string(),
                args: vec!["-c".to_string(), script],
            }
        }
    }
}

fn shell_join(parts: &[String]) -> String {
    parts
        .iter()
        .map(|p| shell_quote(p))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        "''".to_string()
    } else if s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./:".contains(c))
    {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\"'\"'"))
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn write_header(
    out: &mut File,
    identity: &TaskIdentity,
    settings: &SweepSettings,
    env: &EnvironmentConfig,
    params: &ParameterTuple,
    invocation: &Invocation,
    started_at: DateTime<Utc>,
) -> io::Result<()> {
    let title = format!("{} sweep task {}", RULE, RULE);
    writeln!(out, "{}", title)?;
    writeln!(out, "job_id      : {}", identity.job_id)?;
    writeln!(out, "task_index  : {}", identity.index)?;
    writeln!(out, "started_at  : {}", started_at.to_rfc3339())?;
    writeln!(out, "model       : {}", settings.family)?;
    writeln!(out, "condition   : {}", params.condition)?;
    writeln!(out, "alpha       : {}", params.alpha)?;
    writeln!(out, "seed        : {}", params.seed)?;
    writeln!(out, "save_models : {}", env.model_output.is_enabled())?;
    writeln!(out, "command     : {}", invocation.display())?;
    writeln!(out, "{}", "=".repeat(title.len()))?;
    out.flush()
}

fn write_footer(out: &mut File, finished_at: DateTime<Utc>, status: &str) -> io::Result<()> {
    writeln!(out, "{} task finished {}", RULE, RULE)?;
    writeln!(out, "finished_at : {}", finished_at.to_rfc3339())?;
    writeln!(out, "status      : {}", status)?;
    out.flush()
}

/// Appends the footer when dropped without `finish`, so an aborted task
/// still leaves a terminated log.
struct FooterGuard {
    out: File,
    done: bool,
}

impl FooterGuard {
    fn new(out: File) -> Self {
        Self { out, done: false }
    }

    fn finish(&mut self, status: &TaskStatus, at: DateTime<Utc>) -> io::Result<()> {
        self.done = true;
        write_footer(&mut self.out, at, &status.label())
    }
}

impl Drop for FooterGuard {
    fn drop(&mut self) {
        if !self.done {
            let _ = write_footer(&mut self.out, Utc::now(), "aborted");
        }
    }
}

/// Runs single grid entries against a fixed environment.
pub struct TaskRunner<'a> {
    grid: &'a Grid,
    env: &'a EnvironmentConfig,
    settings: &'a SweepSettings,
    console: Console,
}

impl<'a> TaskRunner<'a> {
    pub fn new(grid: &'a Grid, env: &'a EnvironmentConfig, settings: &'a SweepSettings) -> Self {
        Self {
            grid,
            env,
            settings,
            console: Console::default(),
        }
    }

    pub fn with_console(mut self, console: Console) -> Self {
        self.console = console;
        self
    }

    /// Runs one task. Out-of-range indices are skipped and dispatcher-side
    /// I/O failures become `Aborted`; neither stops the caller.
    pub fn run(&self, identity: &TaskIdentity) -> TaskResult {
        let started_at = Utc::now();
        let Some(params) = self.grid.get(identity.index).copied() else {
            warn!(
                index = identity.index,
                valid = %self.grid.valid_range(),
                "task index out of range, skipping"
            );
            return TaskResult::skipped(identity, started_at);
        };

        let paths = TaskPaths::new(&self.env.logs_root, self.settings.family, &params, identity);
        let result = match self.execute(identity, params, &paths, started_at) {
            Ok(result) => result,
            Err(e) => {
                warn!(index = identity.index, error = %e, "task aborted before completion");
                TaskResult::aborted(identity, params, &paths, started_at, format!("{:#}", e))
            }
        };
        self.console.emit(&result.summary_line());
        result
    }

    fn execute(
        &self,
        identity: &TaskIdentity,
        params: ParameterTuple,
        paths: &TaskPaths,
        started_at: DateTime<Utc>,
    ) -> Result<TaskResult> {
        paths.prepare()?;
        let invocation = build_invocation(self.env, self.settings, &params);

        let mut out = open_append(&paths.stdout)?;
        let mut err = open_append(&paths.stderr)?;
        write_header(
            &mut out,
            identity,
            self.settings,
            self.env,
            &params,
            &invocation,
            started_at,
        )?;
        let mut footer = FooterGuard::new(out.try_clone()?);

        debug!(index = identity.index, command = %invocation.display(), "launching training process");
        let status = run_process_with_task_io(&invocation, &self.env.project_root, out, &mut err)?;
        let finished_at = Utc::now();
        footer.finish(&status, finished_at)?;

        Ok(TaskResult {
            index: identity.index,
            job_id: identity.job_id.clone(),
            parameters: Some(params),
            status,
            exit_code: status.exit_code(),
            stdout_path: Some(paths.stdout.clone()),
            stderr_path: Some(paths.stderr.clone()),
            started_at,
            finished_at,
            error: None,
        })
    }
}

/// Blocks until the child exits. Its stdout/stderr go straight to the task's
/// files; the handles are dropped with the child.
fn run_process_with_task_io(
    invocation: &Invocation,
    workdir: &Path,
    out: File,
    err: &mut File,
) -> Result<TaskStatus> {
    let mut cmd = invocation.command();
    cmd.current_dir(workdir);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::from(out));
    cmd.stderr(Stdio::from(err.try_clone()?));

    match cmd.status() {
        Ok(status) => Ok(TaskStatus::from_exit_status(status)),
        Err(e) => {
            warn!(program = %invocation.program, error = %e, "failed to launch training process");
            writeln!(err, "failed to launch '{}': {}", invocation.program, e)?;
            Ok(TaskStatus::SpawnFailed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{CheckpointMode, ModelOutput, Overrides};
    use std::fs;
    use sweep_core::{Condition, GridSpec};

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "sweep_task_{}_{}_{}",
            tag,
            std::process::id(),
            Utc::now().timestamp_micros()
        ));
        fs::create_dir_all(&dir).expect("scratch dir");
        dir
    }

    fn sample_env(root: &Path) -> EnvironmentConfig {
        EnvironmentConfig::resolve(
            &Overrides::new(),
            root,
            ModelFamily::Dgm,
            CheckpointMode::Disabled,
        )
        .value
    }

    #[test]
    fn local_identity_is_zero_padded_and_timestamped() {
        let at = DateTime::parse_from_rfc3339("2026-10-19T08:30:05.123456Z")
            .expect("ts")
            .with_timezone(&Utc);
        let id = TaskIdentity::local(6, at);
        assert_eq!(id.job_id, "local0006");
        assert_eq!(id.timestamp.as_deref(), Some("20261019_083005_123456"));
    }

    #[test]
    fn log_paths_follow_layout() {
        let params = ParameterTuple::new(Condition::TopK, 50, 3);
        let local = TaskIdentity {
            index: 8,
            job_id: "local0008".into(),
            timestamp: Some("20261019_083005_000001".into()),
        };
        let paths = TaskPaths::new(Path::new("/p/logs"), ModelFamily::Dgm, &params, &local);
        assert_eq!(paths.log_dir, PathBuf::from("/p/logs/dgm/topk/alpha50"));
        assert_eq!(
            paths.stdout,
            PathBuf::from("/p/logs/dgm/topk/alpha50/local0008_seed3_20261019_083005_000001.out")
        );

        let array = TaskIdentity::array(8, "4411_8");
        let paths = TaskPaths::new(Path::new("/p/logs"), ModelFamily::Rf, &params, &array);
        assert_eq!(paths.stdout, PathBuf::from("/p/logs/rf/topk/alpha50/4411_8_seed3.out"));
        assert_eq!(paths.stderr, PathBuf::from("/p/logs/rf/topk/alpha50/4411_8_seed3.err"));
    }

    #[test]
    fn disabled_checkpointing_passes_empty_model_output() {
        let env = sample_env(Path::new("/srv/transfer"));
        let settings = SweepSettings::new(ModelFamily::Dgm);
        let params = ParameterTuple::new(Condition::BottomK, 100, 2);
        let args = training_args(&env, &settings, &params);
        let pos = args
            .iter()
            .position(|a| a == "--model_output_root")
            .expect("model output flag");
        assert_eq!(args[pos + 1], "");
        let seed_pos = args.iter().position(|a| a == "--seed").expect("seed flag");
        assert_eq!(args[seed_pos + 1], "2");
        assert!(args.contains(&"/srv/transfer/data/splits/targets/target_seed2.txt".to_string()));
        assert!(args.ends_with(&[
            "--batch_size".to_string(),
            "512".to_string(),
            "--epochs".to_string(),
            "100".to_string(),
            "--lr".to_string(),
            "0.001".to_string(),
        ]));
    }

    #[test]
    fn enabled_checkpointing_passes_model_path() {
        let mut env = sample_env(Path::new("/srv/transfer"));
        env.model_output = ModelOutput::Enabled(PathBuf::from("/srv/transfer/models/dgm"));
        let settings = SweepSettings::new(ModelFamily::Dgm);
        let args = training_args(&env, &settings, &ParameterTuple::new(Condition::All, 0, 0));
        let pos = args
            .iter()
            .position(|a| a == "--model_output_root")
            .expect("model output flag");
        assert_eq!(args[pos + 1], "/srv/transfer/models/dgm");
    }

    #[test]
    fn activation_wraps_invocation_in_shell() {
        let mut env = sample_env(Path::new("/srv/transfer"));
        env.activation = Activation::Script(PathBuf::from("/srv/transfer/.venv/bin/activate"));
        let settings = SweepSettings::new(ModelFamily::Dgm);
        let inv = build_invocation(&env, &settings, &ParameterTuple::new(Condition::TopK, 0, 0));
        assert_eq!(inv.program, "sh");
        assert_eq!(inv.args[0], "-c");
        assert!(inv.args[1].starts_with(". /srv/transfer/.venv/bin/activate && exec python3 "));
        assert!(inv.args[1].contains("--model_output_root '' --condition topk"));

        env.activation = Activation::Ambient;
        let inv = build_invocation(&env, &settings, &ParameterTuple::new(Condition::TopK, 0, 0));
        assert_eq!(inv.program, "python3");
        assert_eq!(inv.args[0], "/srv/transfer/src/train_dgm.py");
    }

    #[test]
    fn shell_quote_escapes_unsafe_values() {
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("/a/b-c_d.py"), "/a/b-c_d.py");
        assert_eq!(shell_quote("it's"), "'it'\"'\"'s'");
    }

    #[test]
    fn status_exit_codes() {
        assert_eq!(TaskStatus::Exited { code: 3 }.process_exit_code(), 3);
        assert_eq!(TaskStatus::SpawnFailed.exit_code(), Some(SPAWN_FAILED_EXIT_CODE));
        assert_eq!(TaskStatus::Terminated { signal: Some(9) }.process_exit_code(), 137);
        assert!(TaskStatus::Exited { code: 0 }.succeeded());
        assert!(!TaskStatus::Skipped.succeeded());
    }

    #[test]
    fn out_of_range_index_is_skipped_without_side_effects() {
        let root = scratch_dir("skip");
        let grid = Grid::build(&GridSpec::unified()).expect("grid");
        let env = sample_env(&root);
        let settings = SweepSettings::new(ModelFamily::Dgm);
        let runner = TaskRunner::new(&grid, &env, &settings);
        for index in [-1, 80] {
            let result = runner.run(&TaskIdentity::local(index, Utc::now()));
            assert_eq!(result.status, TaskStatus::Skipped);
            assert!(result.parameters.is_none());
        }
        assert!(!env.logs_root.exists());
        let _ = fs::remove_dir_all(root);
    }

    #[cfg(unix)]
    #[test]
    fn runner_captures_output_and_exit_code() {
        let root = scratch_dir("run");
        let script = root.join("train.sh");
        fs::write(
            &script,
            "echo \"training $*\"\necho 'boom' 1>&2\nexit 3\n",
        )
        .expect("script");
        let vars: Overrides = [(crate::env::PYTHON_BIN_VAR.to_string(), "sh".to_string())]
            .into_iter()
            .collect();
        let env = EnvironmentConfig::resolve(&vars, &root, ModelFamily::Dgm, CheckpointMode::Disabled)
            .value;
        let mut settings = SweepSettings::new(ModelFamily::Dgm);
        settings.script = script;
        settings.tuning.clear();
        let grid = Grid::build(&GridSpec::unified()).expect("grid");
        let runner = TaskRunner::new(&grid, &env, &settings);

        let result = runner.run(&TaskIdentity::array(6, "99_6"));
        assert_eq!(result.status, TaskStatus::Exited { code: 3 });
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.parameters, Some(ParameterTuple::new(Condition::TopK, 0, 1)));

        let out_path = result.stdout_path.expect("stdout path");
        assert_eq!(out_path, root.join("logs/dgm/topk/alpha0/99_6_seed1.out"));
        let out = fs::read_to_string(&out_path).expect("stdout log");
        let header = out.find("job_id      : 99_6").expect("header");
        let body = out.find("training --data_root").expect("child output");
        let footer = out.find("status      : exited(3)").expect("footer");
        assert!(header < body && body < footer, "{}", out);
        assert!(out.contains("save_models : false"));
        assert!(out.contains("--model_output_root  --condition topk --alpha 0 --seed 1"));

        let err = fs::read_to_string(result.stderr_path.expect("stderr path")).expect("stderr log");
        assert_eq!(err.trim(), "boom");
        let _ = fs::remove_dir_all(root);
    }

    #[cfg(unix)]
    #[test]
    fn missing_interpreter_is_reported_not_raised() {
        let root = scratch_dir("spawn");
        let vars: Overrides = [(
            crate::env::PYTHON_BIN_VAR.to_string(),
            "sweep-no-such-interpreter".to_string(),
        )]
        .into_iter()
        .collect();
        let env = EnvironmentConfig::resolve(&vars, &root, ModelFamily::Rf, CheckpointMode::Disabled)
            .value;
        let settings = SweepSettings::new(ModelFamily::Rf);
        let grid = Grid::build(&GridSpec::unified()).expect("grid");
        let result = TaskRunner::new(&grid, &env, &settings)
            .run(&TaskIdentity::array(60, "7_60"));
        assert_eq!(result.status, TaskStatus::SpawnFailed);
        let err = fs::read_to_string(result.stderr_path.expect("stderr")).expect("stderr log");
        assert!(err.contains("failed to launch 'sweep-no-such-interpreter'"), "{}", err);
        let out = fs::read_to_string(result.stdout_path.expect("stdout")).expect("stdout log");
        assert!(out.contains("status      : spawn_failed"), "{}", out);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn io_failure_before_launch_is_reported_as_aborted() {
        let root = scratch_dir("abort");
        let blocker = root.join("logs");
        fs::write(&blocker, "").expect("blocker file");
        let env = sample_env(&root);
        let settings = SweepSettings::new(ModelFamily::Dgm);
        let grid = Grid::build(&GridSpec::unified()).expect("grid");
        let console = Console::buffer();
        let runner = TaskRunner::new(&grid, &env, &settings).with_console(console.clone());

        let result = runner.run(&TaskIdentity::array(61, "5_61"));
        assert_eq!(result.status, TaskStatus::Aborted);
        assert_eq!(result.status.process_exit_code(), 1);
        assert_eq!(result.parameters, Some(ParameterTuple::new(Condition::Random, 0, 0)));
        assert!(result.stdout_path.is_none());
        assert!(result.error.is_some());

        let lines = console.lines();
        assert_eq!(lines.len(), 1);
        assert!(
            lines[0].starts_with("[task 61] condition=random alpha=0 seed=0 status=aborted log=- error="),
            "{}",
            lines[0]
        );
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn terminal_consoles_collect_nothing() {
        let console = Console::Stderr;
        console.emit("[task 0] written to stderr");
        assert!(console.lines().is_empty());
        let buffer = Console::buffer();
        buffer.emit("one");
        buffer.clone().emit("two");
        assert_eq!(buffer.lines(), vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn footer_guard_marks_aborted_tasks() {
        let root = scratch_dir("guard");
        let path = root.join("task.out");
        {
            let out = open_append(&path).expect("open");
            let _guard = FooterGuard::new(out);
        }
        let text = fs::read_to_string(&path).expect("read");
        assert!(text.contains("status      : aborted"), "{}", text);
        let _ = fs::remove_dir_all(root);
    }
}
