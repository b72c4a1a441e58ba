//! Agent configuration stored as TOML.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::budget::{MAX_TURNS, RunBudget, TOTAL_TIMEOUT_MULTIPLIER, TURN_TIMEOUT};
use crate::core::plan::FallbackPlan;
use crate::core::schema::ValidationMode;

/// Agent configuration (TOML).
///
/// Missing fields take the defaults below, so an empty file is a valid
/// configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Hard cap on model turns per conversation.
    pub max_turns: u32,

    /// Per model call budget in seconds.
    pub turn_timeout_secs: u64,

    /// Whole-conversation budget as a multiple of `turn_timeout_secs`.
    pub total_timeout_multiplier: u32,

    /// Directory that tool-supplied project paths are resolved under.
    pub workspace_root: PathBuf,

    /// Pause before the execution-plan event, in milliseconds.
    pub plan_delay_ms: u64,

    pub validation: ValidationMode,

    pub fallback_plan: FallbackPlan,

    pub model: ModelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModelConfig {
    /// Argv of the model command. The transcript is written to its stdin.
    pub command: Vec<String>,

    /// Truncate model stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            command: vec!["codex".to_string(), "exec".to_string(), "-".to_string()],
            output_limit_bytes: 200_000,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: MAX_TURNS,
            turn_timeout_secs: TURN_TIMEOUT.as_secs(),
            total_timeout_multiplier: TOTAL_TIMEOUT_MULTIPLIER,
            workspace_root: PathBuf::from("./workspace"),
            plan_delay_ms: 0,
            validation: ValidationMode::default(),
            fallback_plan: FallbackPlan::default(),
            model: ModelConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_turns == 0 {
            return Err(anyhow!("max_turns must be > 0"));
        }
        if self.turn_timeout_secs == 0 {
            return Err(anyhow!("turn_timeout_secs must be > 0"));
        }
        if self.total_timeout_multiplier == 0 {
            return Err(anyhow!("total_timeout_multiplier must be > 0"));
        }
        if self.model.output_limit_bytes == 0 {
            return Err(anyhow!("model.output_limit_bytes must be > 0"));
        }
        if self.model.command.first().is_none_or(|p| p.trim().is_empty()) {
            return Err(anyhow!("model.command must be a non-empty array"));
        }
        Ok(())
    }

    pub fn budget(&self) -> RunBudget {
        RunBudget::new(
            self.max_turns,
            Duration::from_secs(self.turn_timeout_secs),
            self.total_timeout_multiplier,
        )
    }

    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs)
    }

    pub fn plan_delay(&self) -> Duration {
        Duration::from_millis(self.plan_delay_ms)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        return Ok(AgentConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AgentConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf).with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
