use anyhow::Result;
use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use sweep_core::{Grid, SweepError};
use sweep_runner::{
    overrides_from_env, resolve_project_root, run_array, run_local, CheckpointMode, Console,
    DispatchContext, ModelFamily, SweepConfig, SweepSettings,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_FILE: &str = "sweep.yaml";

#[derive(Parser, Debug)]
#[command(name = "sweep", version, about = "Parameter-sweep job dispatcher")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ModelArg {
    #[value(name = "dgm")]
    Dgm,
    #[value(name = "rf")]
    Rf,
    #[value(name = "svr")]
    Svr,
}

impl From<ModelArg> for ModelFamily {
    fn from(value: ModelArg) -> Self {
        match value {
            ModelArg::Dgm => ModelFamily::Dgm,
            ModelArg::Rf => ModelFamily::Rf,
            ModelArg::Svr => ModelFamily::Svr,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum GridArg {
    #[value(name = "unified")]
    Unified,
    #[value(name = "classic")]
    Classic,
}

impl GridArg {
    fn as_str(self) -> &'static str {
        match self {
            GridArg::Unified => "unified",
            GridArg::Classic => "classic",
        }
    }
}

/// Which sweep to address.
#[derive(Args, Debug, Clone)]
struct SelectionArgs {
    #[arg(long, value_enum)]
    model: Option<ModelArg>,
    #[arg(long, value_enum)]
    grid: Option<GridArg>,
    /// Sweep description; defaults to `sweep.yaml` under the project root.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct CheckpointArgs {
    /// Persist trained models under the model output root.
    #[arg(long, overrides_with = "no_save_models")]
    save_models: bool,
    #[arg(long, overrides_with = "save_models")]
    no_save_models: bool,
}

impl CheckpointArgs {
    fn mode(&self) -> CheckpointMode {
        CheckpointMode::from_flags(self.save_models, self.no_save_models)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run grid entries one after another on this machine.
    Run {
        #[command(flatten)]
        selection: SelectionArgs,
        #[command(flatten)]
        checkpoint: CheckpointArgs,
        #[arg(long)]
        json: bool,
        /// Grid indices to run, in order; none means the whole grid.
        #[arg(allow_negative_numbers = true)]
        indices: Vec<i64>,
    },
    /// Run the single entry named by SLURM_ARRAY_TASK_ID.
    Array {
        #[command(flatten)]
        selection: SelectionArgs,
        #[command(flatten)]
        checkpoint: CheckpointArgs,
        #[arg(long)]
        json: bool,
    },
    /// Print the grid, its array bounds and fingerprint.
    Describe {
        #[command(flatten)]
        selection: SelectionArgs,
        #[arg(long, allow_negative_numbers = true)]
        index: Option<i64>,
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    fn json_mode(&self) -> bool {
        match self {
            Commands::Run { json, .. }
            | Commands::Array { json, .. }
            | Commands::Describe { json, .. } => *json,
        }
    }
}

struct Outcome {
    payload: Option<Value>,
    exit_code: i32,
}

impl Outcome {
    fn done(payload: Option<Value>) -> Self {
        Self {
            payload,
            exit_code: 0,
        }
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };
    init_tracing();

    let json_mode = cli.command.json_mode();
    match run_command(cli.command) {
        Ok(outcome) => {
            if let Some(payload) = outcome.payload {
                emit_json(&payload);
            }
            std::process::exit(outcome.exit_code);
        }
        Err(err) => {
            if json_mode {
                emit_json(&json_error(error_code(&err), format!("{:#}", err), json!({})));
            } else {
                eprintln!("error: {:#}", err);
            }
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run_command(command: Commands) -> Result<Outcome> {
    let overrides = overrides_from_env();
    let project_root = resolve_project_root(&overrides)?;
    debug!(project_root = %project_root.display(), "resolved project root");
    match command {
        Commands::Run {
            selection,
            checkpoint,
            json,
            indices,
        } => {
            let settings = load_settings(&selection, &project_root)?;
            let ctx = DispatchContext::new(settings, overrides, &project_root)
                .with_checkpoint(checkpoint.mode())
                .with_console(console_for(json));
            let summary = run_local(&ctx, &indices)?;
            if json {
                return Ok(Outcome::done(Some(json!({
                    "ok": true,
                    "command": "run",
                    "model": ctx.settings.family.as_str(),
                    "project_root": project_root,
                    "succeeded": summary.succeeded,
                    "failed": summary.failed,
                    "skipped": summary.skipped,
                    "aborted": summary.aborted,
                    "tasks": serde_json::to_value(&summary.results)?,
                }))));
            }
            println!(
                "sweep finished: {} succeeded, {} failed, {} skipped",
                summary.succeeded, summary.failed, summary.skipped
            );
            if summary.aborted > 0 {
                println!("aborted: {}", summary.aborted);
            }
            Ok(Outcome::done(None))
        }
        Commands::Array {
            selection,
            checkpoint,
            json,
        } => {
            let settings = load_settings(&selection, &project_root)?;
            let ctx = DispatchContext::new(settings, overrides, &project_root)
                .with_checkpoint(checkpoint.mode())
                .with_console(console_for(json));
            let result = run_array(&ctx)?;
            let exit_code = result.status.process_exit_code();
            let payload = if json {
                Some(json!({
                    "ok": result.status.succeeded(),
                    "command": "array",
                    "model": ctx.settings.family.as_str(),
                    "task": serde_json::to_value(&result)?,
                }))
            } else {
                None
            };
            Ok(Outcome { payload, exit_code })
        }
        Commands::Describe {
            selection,
            index,
            json,
        } => {
            let settings = load_settings(&selection, &project_root)?;
            let grid = Grid::build(&settings.grid)?;
            describe(&settings, &grid, index, json).map(Outcome::done)
        }
    }
}

fn console_for(json: bool) -> Console {
    if json {
        Console::Stderr
    } else {
        Console::Stdout
    }
}

fn load_settings(selection: &SelectionArgs, project_root: &Path) -> Result<SweepSettings> {
    let path = match &selection.config {
        Some(path) => Some(path.clone()),
        None => {
            let default = project_root.join(DEFAULT_CONFIG_FILE);
            default.is_file().then_some(default)
        }
    };
    let config = match &path {
        Some(path) => SweepConfig::load(path)?,
        None => SweepConfig::default(),
    };
    SweepSettings::from_config(
        &config,
        selection.model.map(Into::into),
        selection.grid.map(GridArg::as_str),
    )
}

fn describe(
    settings: &SweepSettings,
    grid: &Grid,
    index: Option<i64>,
    json: bool,
) -> Result<Option<Value>> {
    let selected = match index {
        Some(i) => Some(grid.check_index(i)?),
        None => None,
    };
    if json {
        let tasks = grid.to_json();
        let mut payload = json!({
            "ok": true,
            "command": "describe",
            "model": settings.family.as_str(),
            "script": settings.script,
            "tuning": settings.tuning,
            "len": grid.len(),
            "array_range": grid.array_range(),
            "fingerprint": grid.fingerprint(),
        });
        match selected {
            Some(i) => payload["task"] = tasks[i].clone(),
            None => payload["tasks"] = tasks,
        }
        return Ok(Some(payload));
    }

    if let Some(i) = selected {
        println!("{}", grid.entries()[i]);
        return Ok(None);
    }
    println!("model: {}", settings.family);
    println!("script: {}", settings.script.display());
    println!("tasks: {}", grid.len());
    if let Some(range) = grid.array_range() {
        println!("array: {}", range);
    }
    println!("fingerprint: {}", grid.fingerprint());
    for (i, entry) in grid.entries().iter().enumerate() {
        println!("{:>4}  {}", i, entry);
    }
    Ok(None)
}

fn error_code(err: &anyhow::Error) -> &'static str {
    match err.downcast_ref::<SweepError>() {
        Some(SweepError::OutOfRangeIndex { .. }) => "out_of_range_index",
        Some(SweepError::InvalidTaskId(_)) => "invalid_task_id",
        Some(SweepError::InvalidGrid(_)) => "invalid_grid",
        Some(SweepError::InvalidConfig(_)) => "invalid_config",
        Some(SweepError::Io(_)) => "io_error",
        None => "command_failed",
    }
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}
