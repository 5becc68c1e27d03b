//! Orchestrator configuration stored as TOML.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::branch::{DEFAULT_FEATURE_BRANCH_PREFIX, validate_branch_name};

/// Orchestrator configuration (TOML).
///
/// Missing fields take defaults. A copy is stored on every run at start, and
/// the merge policy and failure policy read that copy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Prefix for derived feature branches. Empty means the bare random suffix.
    pub feature_branch: String,

    pub merge: MergeConfig,

    pub failure: FailureConfig,

    pub validator: ValidatorConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MergeConfig {
    /// Merge automatically when validation reports no fatal findings.
    pub auto: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FailureConfig {
    pub on_step_failure: StepFailurePolicy,
}

/// What a collaborator failure does to the owning run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepFailurePolicy {
    /// Only the step is marked failed.
    #[default]
    LeaveRunning,
    PauseRun,
    FailRun,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ValidatorConfig {
    pub size_guards: bool,
    pub max_changed_lines: usize,
    pub max_new_files: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            size_guards: true,
            max_changed_lines: 5000,
            max_new_files: 50,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            feature_branch: DEFAULT_FEATURE_BRANCH_PREFIX.to_string(),
            merge: MergeConfig::default(),
            failure: FailureConfig::default(),
            validator: ValidatorConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.feature_branch.is_empty() {
            validate_branch_name(&self.feature_branch).context("feature_branch")?;
        }
        if self.validator.max_changed_lines == 0 {
            return Err(anyhow!("validator.max_changed_lines must be > 0"));
        }
        if self.validator.max_new_files == 0 {
            return Err(anyhow!("validator.max_new_files must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `OrchestratorConfig::default()`.
pub fn load_config(path: &Path) -> Result<OrchestratorConfig> {
    if !path.exists() {
        let cfg = OrchestratorConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: OrchestratorConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &OrchestratorConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
