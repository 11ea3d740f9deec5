//! Side-effecting helpers: configuration, session persistence, and the hook
//! providers built on them.
//!
//! Nothing in [`crate::core`] or the run controller depends on this module;
//! its types only plug into a run through [`Hooks`](crate::core::hooks::Hooks).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

pub mod approval;
pub mod config;
pub mod metrics;
pub mod session_store;

/// Atomically replace `path` with `contents` (temp file + rename).
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, contents).with_context(|| format!("write temp {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
