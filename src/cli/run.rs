// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 statpipe contributors

//! Run command - execute a workflow

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use crate::engine::session::{ComputeSession, RscriptSession};
use crate::engine::Engine;
use crate::params::ParameterBag;

/// Run a workflow
pub async fn run(
    workflow: PathBuf,
    work_dir: Option<PathBuf>,
    params: Vec<String>,
    engine_path: Option<PathBuf>,
    table: String,
    dry_run: bool,
    verbose: bool,
) -> Result<()> {
    if !workflow.exists() {
        return Err(miette::miette!(
            "Workflow file not found: {}",
            workflow.display()
        ));
    }

    // Artifacts land next to the workflow unless told otherwise.
    let work_dir = match work_dir {
        Some(dir) => dir,
        None => workflow
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".")),
    };

    let globals = parse_params(&params)?;

    let mut engine = Engine::new().with_table_name(table);
    for (key, value) in globals.iter() {
        engine.set_global(key, value.clone());
    }

    println!("{}", "Loading workflow...".bold());
    engine.load(&workflow, None)?;
    println!(
        "  {} {} ({} steps)",
        "✓".green(),
        workflow.display(),
        engine.count()
    );

    if verbose || dry_run {
        println!();
        println!("{}:", "Steps".bold());
        for (number, name, kind) in engine.tree().summary() {
            println!("  {}. {} ({})", number, name, kind.to_string().dimmed());
        }
    }

    if dry_run {
        println!();
        println!("{}", "Dry run; nothing was executed.".yellow());
        return Ok(());
    }

    let session = match engine_path {
        Some(path) => RscriptSession::with_engine_path(path, &work_dir),
        None => RscriptSession::new(&work_dir)?,
    };

    if verbose {
        println!();
        println!("  Session: {}", session.handle().dimmed());
        println!("  Work directory: {}", work_dir.display());
    }

    println!();
    println!("{}", "Running workflow...".bold());
    engine.run(&session, &work_dir).await?;

    println!();
    println!("{}", "Workflow completed.".green().bold());
    Ok(())
}

/// Parse repeated `key=value` arguments into a parameter bag
fn parse_params(params: &[String]) -> Result<ParameterBag> {
    let mut bag = ParameterBag::new();
    for raw in params {
        let Some((key, value)) = raw.split_once('=') else {
            return Err(miette::miette!(
                "Invalid parameter '{}': expected key=value",
                raw
            ));
        };
        if key.trim().is_empty() {
            return Err(miette::miette!("Invalid parameter '{}': empty key", raw));
        }
        bag.append(key.trim(), value);
    }
    Ok(bag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_params_key_value() {
        let bag = parse_params(&["tableName=t_data".into(), "width=800".into()]).unwrap();
        assert_eq!(bag.get_single("tableName"), Some("t_data"));
        assert_eq!(bag.get_single("width"), Some("800"));
    }

    #[test]
    fn test_parse_params_repeated_key_accumulates() {
        let bag = parse_params(&["groupBy=batch".into(), "groupBy=dose".into()]).unwrap();
        assert_eq!(bag.get("groupBy").unwrap().as_slice().len(), 2);
    }

    #[test]
    fn test_parse_params_rejects_missing_separator() {
        assert!(parse_params(&["tableName".into()]).is_err());
        assert!(parse_params(&["=value".into()]).is_err());
    }

    #[test]
    fn test_parse_params_keeps_equals_in_value() {
        let bag = parse_params(&["filter=a == b".into()]).unwrap();
        assert_eq!(bag.get_single("filter"), Some("a == b"));
    }
}
