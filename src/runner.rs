//! Boundary to the external `git` executable.
//!
//! Everything that writes to a repository or needs the full history graph (commit,
//! stage, clone, init, diff, `rev-list`) is delegated to a [`GitRunner`]. Output is
//! handed back as opaque text; callers only split it into lines.

use std::{fmt::Debug, path::Path, process::Command};

use tracing::debug;

use crate::{config::OdbConfig, errors::GitError};

pub trait GitRunner: Send + Sync + Debug {
    /// Run git with `args` inside `dir` and return its standard output.
    fn run(&self, dir: &Path, args: &[&str]) -> Result<String, GitError>;
}

/// Spawns a git process per call.
#[derive(Debug, Clone)]
pub struct ProcessGitRunner {
    executable: String,
}

impl Default for ProcessGitRunner {
    fn default() -> Self {
        ProcessGitRunner::new("git")
    }
}

impl ProcessGitRunner {
    pub fn new(executable: impl Into<String>) -> Self {
        ProcessGitRunner {
            executable: executable.into(),
        }
    }

    pub fn from_config(config: &OdbConfig) -> Self {
        ProcessGitRunner::new(config.git_executable.clone())
    }
}

impl GitRunner for ProcessGitRunner {
    fn run(&self, dir: &Path, args: &[&str]) -> Result<String, GitError> {
        debug!("running {} {} in {}", self.executable, args.join(" "), dir.display());
        let output = Command::new(&self.executable)
            .current_dir(dir)
            .args(args)
            .output()
            .map_err(|e| GitError::CommandFailed(format!("cannot run {}: {e}", self.executable)))?;
        if !output.status.success() {
            return Err(GitError::CommandFailed(format!(
                "{} {} exited with {}: {}",
                self.executable,
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
