// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 statpipe contributors

//! Error types for workflow loading, editing and execution
//!
//! Every public entry point surfaces failures as a [`StatpipeError`];
//! nothing escapes as a panic. Load-time errors carry enough context
//! (source path, expected vs. found step number) to diagnose without
//! re-running.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for statpipe operations
pub type StatpipeResult<T> = Result<T, StatpipeError>;

/// Main error type for statpipe
#[derive(Error, Debug, Diagnostic)]
pub enum StatpipeError {
    // ─────────────────────────────────────────────────────────────────────────
    // Workflow Source Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Workflow file not found: {path}")]
    #[diagnostic(
        code(statpipe::workflow_not_found),
        help("Check the path; run 'statpipe modules' to see the available step modules")
    )]
    WorkflowNotFound { path: PathBuf },

    #[error("Cannot determine workflow format for: {path}")]
    #[diagnostic(
        code(statpipe::unknown_format),
        help("Supported extensions: .xml for the markup form, .db/.db3/.sqlite for the table form")
    )]
    UnknownFormat { path: PathBuf },

    #[error("Failed to read file '{path}': {error}")]
    #[diagnostic(code(statpipe::file_read_error))]
    FileReadError { path: PathBuf, error: String },

    #[error("Failed to write file '{path}': {error}")]
    #[diagnostic(code(statpipe::file_write_error))]
    FileWriteError { path: PathBuf, error: String },

    #[error("Malformed workflow markup in '{path}': {message}")]
    #[diagnostic(code(statpipe::xml_error))]
    Xml { path: PathBuf, message: String },

    #[error("SQLite error: {message}")]
    #[diagnostic(code(statpipe::sqlite_error))]
    Sqlite { message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Validation Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Step {step} is missing from workflow '{workflow}'")]
    #[diagnostic(
        code(statpipe::missing_step),
        help("Step numbers must be contiguous from 1; renumber the workflow so no step is skipped")
    )]
    MissingStep { step: u32, workflow: String },

    #[error("Step {step} appears more than once in workflow '{workflow}'")]
    #[diagnostic(
        code(statpipe::duplicate_step),
        help("Each step number may be used only once; renumber the duplicated steps")
    )]
    DuplicateStep { step: u32, workflow: String },

    #[error("Invalid workflow: {reason}")]
    #[diagnostic(code(statpipe::invalid_workflow))]
    InvalidWorkflow {
        reason: String,
        #[help]
        help: Option<String>,
    },

    #[error("Unknown module '{module}' at step {step}")]
    #[diagnostic(
        code(statpipe::unknown_module),
        help("Run 'statpipe modules' to list the registered module names")
    )]
    UnknownModule { module: String, step: u32 },

    #[error("Step {step} declares kind {declared} but module '{module}' is registered as {registered}")]
    #[diagnostic(code(statpipe::kind_mismatch))]
    KindMismatch {
        module: String,
        step: u32,
        declared: String,
        registered: String,
    },

    #[error("Step {step} ('{module}') is a {kind} attachment with no preceding Data step")]
    #[diagnostic(
        code(statpipe::orphan_attachment),
        help("Visualization and Export steps attach to the nearest preceding Data step; move a Data step in front of it")
    )]
    OrphanAttachment {
        module: String,
        step: u32,
        kind: String,
    },

    #[error("Module '{module}' at step {step} is missing required parameter '{key}'")]
    #[diagnostic(code(statpipe::missing_parameter))]
    MissingParameter {
        module: String,
        step: u32,
        key: String,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Structural Edit Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("No step numbered {step} exists in the workflow")]
    #[diagnostic(code(statpipe::step_not_found))]
    StepNotFound { step: u32 },

    #[error("Workflow has no steps to write out")]
    #[diagnostic(
        code(statpipe::empty_workflow),
        help("Load a workflow or insert steps before saving")
    )]
    EmptyWorkflow,

    // ─────────────────────────────────────────────────────────────────────────
    // Execution Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Step {step} ('{module}') failed: {message}")]
    #[diagnostic(code(statpipe::step_failed))]
    StepFailed {
        module: String,
        step: u32,
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("Compute engine '{engine}' is not available")]
    #[diagnostic(code(statpipe::engine_not_found), help("{suggestion}"))]
    EngineNotFound { engine: String, suggestion: String },

    #[error("Workflow run cancelled before step {step}")]
    #[diagnostic(code(statpipe::cancelled))]
    Cancelled { step: u32 },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("IO error: {message}")]
    #[diagnostic(code(statpipe::io_error))]
    Io { message: String },

    #[error("JSON error: {message}")]
    #[diagnostic(code(statpipe::json_error))]
    Json { message: String },
}

impl From<std::io::Error> for StatpipeError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<rusqlite::Error> for StatpipeError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sqlite { message: e.to_string() }
    }
}

impl From<serde_json::Error> for StatpipeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl StatpipeError {
    /// Create an engine-not-found error with an installation suggestion
    pub fn engine_not_found(engine: &str) -> Self {
        let suggestion = match engine {
            "Rscript" => {
                "Install R: https://www.r-project.org/ and ensure Rscript is in your PATH"
                    .to_string()
            }
            _ => format!("Install {} and ensure it's in your PATH", engine),
        };

        Self::EngineNotFound {
            engine: engine.to_string(),
            suggestion,
        }
    }

    /// Create a step failure carrying the originating module and step number
    pub fn step_failed(module: &str, step: u32, message: impl Into<String>) -> Self {
        Self::StepFailed {
            module: module.to_string(),
            step,
            message: message.into(),
            help: None,
        }
    }

    /// Create an invalid-workflow error without a help hint
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidWorkflow {
            reason: reason.into(),
            help: None,
        }
    }
}
