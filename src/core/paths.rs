//! Workspace layout: controller credential, output directory, settings, journal.

use crate::constants;
use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    /// `credentials.json` in the root.
    pub controller_file: PathBuf,
    /// Directory searched for `*.json` when `controller_file` is absent.
    pub controller_dir: PathBuf,
    pub output: PathBuf,
    pub settings: PathBuf,
    pub audit_log: PathBuf,
    pub audit_lock: PathBuf,
    pub run_lock: PathBuf,
}

impl WorkspacePaths {
    /// Resolve the workspace root from the CLI arg, `KEYFLEET_ROOT`, or the current directory.
    pub fn resolve(root_arg: Option<PathBuf>) -> Result<Self> {
        if let Some(root) = root_arg {
            return Ok(Self::from_root(root));
        }
        if let Ok(root) = env::var("KEYFLEET_ROOT") {
            if !root.is_empty() {
                return Ok(Self::from_root(PathBuf::from(root)));
            }
        }
        let cwd = env::current_dir().context("resolve current directory")?;
        Ok(Self::from_root(cwd))
    }

    pub fn from_root(root: PathBuf) -> Self {
        Self {
            controller_file: root.join(constants::CONTROLLER_FILE),
            controller_dir: root.join(constants::CONTROLLER_DIR),
            output: root.join(constants::OUTPUT_DIR),
            settings: root.join(constants::SETTINGS_FILE),
            audit_log: root.join("audit.log"),
            audit_lock: root.join("audit.lock"),
            run_lock: root.join("run.lock"),
            root,
        }
    }
}

impl std::fmt::Display for WorkspacePaths {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "workspace@{}", self.root.display())
    }
}
