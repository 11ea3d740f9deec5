//! Configuration stored under `.lifecycle/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::run::validate_id;

/// Lifecycle configuration (TOML).
///
/// Edited by humans; missing fields fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Identifier of the persistent agent entity.
    pub agent_id: String,

    /// Directory holding one JSON record per session.
    pub state_dir: PathBuf,

    pub checkpoint: CheckpointConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Maximum time to wait for a reviewer before treating the checkpoint as rejected.
    pub timeout_secs: u64,

    /// Checkpoint names approved without waiting for a reviewer.
    pub auto_approve: Vec<String>,

    /// How often a waiting checkpoint re-checks its deadline.
    pub poll_interval_ms: u64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60 * 60,
            auto_approve: Vec::new(),
            poll_interval_ms: 200,
        }
    }
}

impl CheckpointConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            agent_id: "agent".to_string(),
            state_dir: PathBuf::from(".lifecycle/sessions"),
            checkpoint: CheckpointConfig::default(),
        }
    }
}

impl LifecycleConfig {
    pub fn validate(&self) -> Result<()> {
        validate_id(&self.agent_id).context("agent_id")?;
        if self.state_dir.as_os_str().is_empty() {
            return Err(anyhow!("state_dir must not be empty"));
        }
        if self.checkpoint.timeout_secs == 0 {
            return Err(anyhow!("checkpoint.timeout_secs must be > 0"));
        }
        if self.checkpoint.poll_interval_ms == 0 {
            return Err(anyhow!("checkpoint.poll_interval_ms must be > 0"));
        }
        if self
            .checkpoint
            .auto_approve
            .iter()
            .any(|name| name.trim().is_empty())
        {
            return Err(anyhow!("checkpoint.auto_approve entries must be non-empty"));
        }
        Ok(())
    }

    /// Resolve `state_dir` against `root` when it is relative.
    pub fn state_dir_in(&self, root: &Path) -> PathBuf {
        if self.state_dir.is_absolute() {
            self.state_dir.clone()
        } else {
            root.join(&self.state_dir)
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `LifecycleConfig::default()`.
pub fn load_config(path: &Path) -> Result<LifecycleConfig> {
    if !path.exists() {
        let cfg = LifecycleConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: LifecycleConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &LifecycleConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, LifecycleConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let cfg = LifecycleConfig {
            agent_id: "research-agent".to_string(),
            checkpoint: CheckpointConfig {
                auto_approve: vec!["metadata_update".to_string()],
                ..CheckpointConfig::default()
            },
            ..LifecycleConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "agent_id = \"ops\"\n[checkpoint]\ntimeout_secs = 5\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.agent_id, "ops");
        assert_eq!(cfg.checkpoint.timeout(), Duration::from_secs(5));
        assert_eq!(cfg.checkpoint.poll_interval_ms, 200);
        assert_eq!(cfg.state_dir, PathBuf::from(".lifecycle/sessions"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[checkpoint]\ntimeout_secs = 0\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("timeout_secs must be > 0"));
    }

    #[test]
    fn relative_state_dir_resolves_against_root() {
        let cfg = LifecycleConfig::default();
        assert_eq!(
            cfg.state_dir_in(Path::new("/work")),
            PathBuf::from("/work/.lifecycle/sessions")
        );
    }
}
