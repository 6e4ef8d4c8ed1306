// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 statpipe contributors

//! statpipe - Declarative Statistical Workflow Runner
//!
//! Load, validate, edit and run declarative analysis workflows.

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use statpipe::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "statpipe=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    // Change to specified directory if provided
    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    // Dispatch to command handlers
    match cli.command {
        Commands::Run {
            workflow,
            work_dir,
            param,
            engine,
            table,
            dry_run,
        } => {
            statpipe::cli::run::run(workflow, work_dir, param, engine, table, dry_run, cli.verbose)
                .await
        }
        Commands::Validate { workflow, table } => {
            statpipe::cli::validate::run(workflow, table, cli.verbose).await
        }
        Commands::Convert {
            input,
            output,
            format,
            table,
        } => statpipe::cli::convert::run(input, output, format, table, cli.verbose).await,
        Commands::Modules { format } => statpipe::cli::modules::run(format, cli.verbose).await,
    }
}
