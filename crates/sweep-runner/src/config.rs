use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use sweep_core::{GridSpec, SweepError};

/// Argument names owned by the dispatcher; tuning keys may not shadow them.
pub const RESERVED_ARGS: &[&str] = &[
    "data_root",
    "dis_root",
    "target_list",
    "source_list",
    "results_root",
    "model_output_root",
    "condition",
    "alpha",
    "seed",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    Dgm,
    Rf,
    Svr,
}

impl ModelFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelFamily::Dgm => "dgm",
            ModelFamily::Rf => "rf",
            ModelFamily::Svr => "svr",
        }
    }

    pub fn default_script(self) -> PathBuf {
        PathBuf::from("src").join(format!("train_{}.py", self.as_str()))
    }

    pub fn default_tuning(self) -> BTreeMap<String, String> {
        let pairs: &[(&str, &str)] = match self {
            ModelFamily::Dgm => &[("epochs", "100"), ("batch_size", "512"), ("lr", "0.001")],
            ModelFamily::Rf | ModelFamily::Svr => &[
                ("top_k", "100"),
                ("bottom_k", "100"),
                ("max_samples", "5000"),
            ],
        };
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelFamily {
    type Err = SweepError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dgm" => Ok(ModelFamily::Dgm),
            "rf" => Ok(ModelFamily::Rf),
            "svr" => Ok(ModelFamily::Svr),
            other => Err(SweepError::invalid_config(format!(
                "unknown model family '{}' (expected dgm, rf or svr)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum GridConfig {
    Preset(String),
    Axes(GridSpec),
}

/// On-disk sweep description (`sweep.yaml`). Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweepConfig {
    #[serde(default)]
    pub model: Option<ModelFamily>,
    #[serde(default)]
    pub grid: Option<GridConfig>,
    #[serde(default)]
    pub script: Option<PathBuf>,
    #[serde(default)]
    pub tuning: BTreeMap<String, serde_yaml::Value>,
}

impl SweepConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read sweep config {}: {}", path.display(), e))?;
        Self::parse(&raw).map_err(|e| anyhow!("{} ({})", e, path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: SweepConfig = serde_yaml::from_str(raw)
            .map_err(|e| SweepError::invalid_config(e.to_string()))?;
        Ok(config)
    }
}

/// Everything about a sweep that is fixed before the environment is known.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepSettings {
    pub family: ModelFamily,
    pub grid: GridSpec,
    /// Training entry point; relative paths are taken from the project root.
    pub script: PathBuf,
    /// Opaque `--key value` pairs appended after the fixed arguments.
    pub tuning: BTreeMap<String, String>,
}

impl SweepSettings {
    pub fn new(family: ModelFamily) -> Self {
        Self {
            family,
            grid: GridSpec::unified(),
            script: family.default_script(),
            tuning: family.default_tuning(),
        }
    }

    /// Layers CLI choices over the config file over family defaults.
    pub fn from_config(
        config: &SweepConfig,
        family: Option<ModelFamily>,
        grid_preset: Option<&str>,
    ) -> Result<Self> {
        let family = family.or(config.model).unwrap_or(ModelFamily::Dgm);
        let mut settings = Self::new(family);

        settings.grid = match (grid_preset, &config.grid) {
            (Some(name), _) => GridSpec::preset(name)?,
            (None, Some(GridConfig::Preset(name))) => GridSpec::preset(name)?,
            (None, Some(GridConfig::Axes(spec))) => spec.clone(),
            (None, None) => GridSpec::unified(),
        };
        settings.grid.validate()?;

        if let Some(script) = &config.script {
            settings.script = script.clone();
        }
        for (key, value) in &config.tuning {
            settings
                .tuning
                .insert(key.clone(), tuning_value_to_arg(key, value)?);
        }
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        for key in self.tuning.keys() {
            if RESERVED_ARGS.contains(&key.as_str()) {
                return Err(SweepError::invalid_config(format!(
                    "tuning key '{}' collides with a dispatcher argument",
                    key
                ))
                .into());
            }
            let well_formed = !key.is_empty()
                && key
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !well_formed {
                return Err(
                    SweepError::invalid_config(format!("invalid tuning key '{}'", key)).into(),
                );
            }
        }
        if self.script.as_os_str().is_empty() {
            return Err(SweepError::invalid_config("training script path is empty").into());
        }
        Ok(())
    }
}

fn tuning_value_to_arg(key: &str, value: &serde_yaml::Value) -> Result<String> {
    match value {
        serde_yaml::Value::String(s) => Ok(s.clone()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        _ => Err(SweepError::invalid_config(format!(
            "tuning value for '{}' must be a string, number or bool",
            key
        ))
        .into()),
    }
}
