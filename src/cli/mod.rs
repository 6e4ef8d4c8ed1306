// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 statpipe contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for statpipe.

pub mod convert;
pub mod modules;
pub mod run;
pub mod validate;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::workflow::WorkflowFormat;

/// Statistical pipeline runner
///
/// Load, validate, edit and run declarative analysis workflows.
#[derive(Parser, Debug)]
#[clap(
    name = "statpipe",
    version,
    about = "Declarative statistical workflow runner",
    long_about = None,
    after_help = "Examples:\n\
        statpipe run workflow.xml           Run a workflow\n\
        statpipe validate workflow.xml      Check a workflow without running it\n\
        statpipe convert wf.xml wf.db       Convert between the persisted forms\n\
        statpipe modules                    List the registered step modules\n\n\
        See 'statpipe <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a workflow
    Run {
        /// Workflow file (.xml, .db, .db3 or .sqlite)
        workflow: PathBuf,

        /// Working directory for artifacts (defaults to the workflow's directory)
        #[clap(short, long, value_name = "DIR")]
        work_dir: Option<PathBuf>,

        /// Pipeline-wide default parameter (key=value, repeatable)
        #[clap(short, long, value_name = "KEY=VALUE")]
        param: Vec<String>,

        /// Path to the compute engine binary (defaults to Rscript on PATH)
        #[clap(long, value_name = "PATH")]
        engine: Option<PathBuf>,

        /// Workflow table name for the table form
        #[clap(long, default_value = crate::workflow::DEFAULT_WORKFLOW_TABLE)]
        table: String,

        /// Assemble and show the steps without running anything
        #[clap(long)]
        dry_run: bool,
    },

    /// Validate a workflow without running it
    Validate {
        /// Workflow file to validate
        workflow: PathBuf,

        /// Workflow table name for the table form
        #[clap(long, default_value = crate::workflow::DEFAULT_WORKFLOW_TABLE)]
        table: String,
    },

    /// Convert a workflow between the persisted forms
    Convert {
        /// Source workflow file
        input: PathBuf,

        /// Destination workflow file
        output: PathBuf,

        /// Override the destination format instead of using the extension
        #[clap(short, long)]
        format: Option<WorkflowFormat>,

        /// Workflow table name for the table form
        #[clap(long, default_value = crate::workflow::DEFAULT_WORKFLOW_TABLE)]
        table: String,
    },

    /// List the registered step modules
    Modules {
        /// Output format (text or json)
        #[clap(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Output format for the modules command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}
