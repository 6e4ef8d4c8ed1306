// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 statpipe contributors

//! External computation-engine session
//!
//! Steps hand textual commands to an opaque statistical engine through
//! the [`ComputeSession`] trait. Each pipeline owns its own session
//! with a randomly generated handle; sessions are never shared between
//! concurrently running pipelines.

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::errors::{StatpipeError, StatpipeResult};

/// Trait for computation-engine sessions
#[async_trait]
pub trait ComputeSession: Send + Sync {
    /// Submit a textual command
    ///
    /// `label` and `step` identify the originating module for logging;
    /// failures carry both back to the caller.
    async fn run(&self, command: &str, label: &str, step: u32) -> StatpipeResult<()>;

    /// The per-pipeline session handle
    fn handle(&self) -> &str;
}

/// Generate a random session handle
///
/// One handle per Engine instance keeps concurrently running pipelines
/// out of each other's workspaces.
pub fn session_handle() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("sp_{}", suffix)
}

/// Generate a random temporary table name with the given prefix
pub fn temporary_table_name(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("{}{}", prefix, suffix)
}

/// Session backed by the external `Rscript` interpreter
///
/// Every command runs in a fresh interpreter process; state persists
/// between commands through a per-session workspace image in the work
/// directory. The image file is keyed by the session handle, so two
/// engines sharing a work directory never collide.
pub struct RscriptSession {
    engine_path: PathBuf,
    workspace: PathBuf,
    handle: String,
}

impl RscriptSession {
    /// Locate `Rscript` on the PATH and create a session in `work_dir`
    pub fn new(work_dir: &Path) -> StatpipeResult<Self> {
        let engine_path =
            which::which("Rscript").map_err(|_| StatpipeError::engine_not_found("Rscript"))?;
        Ok(Self::with_engine_path(engine_path, work_dir))
    }

    /// Create a session around an explicit interpreter binary
    pub fn with_engine_path(engine_path: PathBuf, work_dir: &Path) -> Self {
        let handle = session_handle();
        let workspace = work_dir.join(format!(".{}.RData", handle));
        Self { engine_path, workspace, handle }
    }

    /// Path of the session's workspace image
    pub fn workspace_path(&self) -> &Path {
        &self.workspace
    }

    fn script_for(&self, command: &str) -> String {
        // R wants forward slashes on every platform.
        let image = self.workspace.to_string_lossy().replace('\\', "/");
        if self.workspace.exists() {
            format!("load('{image}')\n{command}\nsave.image('{image}')\n")
        } else {
            format!("{command}\nsave.image('{image}')\n")
        }
    }
}

#[async_trait]
impl ComputeSession for RscriptSession {
    async fn run(&self, command: &str, label: &str, step: u32) -> StatpipeResult<()> {
        let script = self.script_for(command);

        tracing::debug!(module = label, step, "submitting command to compute engine");

        let output = Command::new(&self.engine_path)
            .arg("--vanilla")
            .arg("-e")
            .arg(&script)
            .output()
            .await
            .map_err(|e| StatpipeError::step_failed(label, step, e.to_string()))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = stderr.trim().lines().last().unwrap_or("engine call failed");
            tracing::error!(module = label, step, %stderr, "compute engine command failed");
            Err(StatpipeError::step_failed(label, step, message))
        }
    }

    fn handle(&self) -> &str {
        &self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_handles_are_prefixed_and_distinct() {
        let a = session_handle();
        let b = session_handle();
        assert!(a.starts_with("sp_"));
        assert_eq!(a.len(), 11);
        assert_ne!(a, b);
    }

    #[test]
    fn test_temporary_table_names_carry_prefix() {
        let name = temporary_table_name("tmpTable_");
        assert!(name.starts_with("tmpTable_"));
        assert_eq!(name.len(), "tmpTable_".len() + 8);
    }

    #[test]
    fn test_workspace_keyed_by_handle() {
        let dir = tempfile::tempdir().unwrap();
        let a = RscriptSession::with_engine_path(PathBuf::from("Rscript"), dir.path());
        let b = RscriptSession::with_engine_path(PathBuf::from("Rscript"), dir.path());
        assert_ne!(a.workspace_path(), b.workspace_path());
    }

    #[test]
    fn test_first_command_skips_workspace_load() {
        let dir = tempfile::tempdir().unwrap();
        let session = RscriptSession::with_engine_path(PathBuf::from("Rscript"), dir.path());

        let script = session.script_for("x <- 1");
        assert!(!script.contains("load("));
        assert!(script.contains("save.image("));

        std::fs::write(session.workspace_path(), b"").unwrap();
        let script = session.script_for("x <- 2");
        assert!(script.starts_with("load("));
    }
}
