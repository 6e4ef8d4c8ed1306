// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 statpipe contributors

//! Validate command - check a workflow without running it

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use crate::modules::ModuleRegistry;
use crate::workflow::{StepKind, WorkflowStore};

/// Run the validate command
pub async fn run(workflow: PathBuf, table: String, verbose: bool) -> Result<()> {
    println!("{}", "Validating workflow...".bold());
    println!();

    if !workflow.exists() {
        return Err(miette::miette!(
            "Workflow file not found: {}",
            workflow.display()
        ));
    }

    let store = WorkflowStore::new().with_table_name(table);
    let definition = match store.load(&workflow, None) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("  {} Failed to parse workflow", "✗".red());
            eprintln!();
            return Err(e.into());
        }
    };

    println!("  {} Workflow file parsed", "✓".green());

    let source = workflow.display().to_string();
    definition.validate_contiguous(&source)?;
    println!(
        "  {} Step numbers are contiguous (1..{})",
        "✓".green(),
        definition.max_step()
    );

    // Check every module resolves and its declared kind agrees with
    // the registry, without assembling a runnable tree.
    let registry = ModuleRegistry::with_builtins();
    let mut errors = Vec::new();
    let mut seen_data = false;

    for record in definition.clone().sorted_by_number().steps {
        let Some(kind) = registry.kind_of(&record.module) else {
            errors.push(format!(
                "step {}: unknown module '{}'",
                record.number, record.module
            ));
            continue;
        };

        if let Some(declared) = record.declared_kind {
            if declared != kind {
                errors.push(format!(
                    "step {}: '{}' declared as {} but registered as {}",
                    record.number, record.module, declared, kind
                ));
            }
        }

        match kind {
            StepKind::Data => seen_data = true,
            StepKind::Visualization | StepKind::Export => {
                if !seen_data {
                    errors.push(format!(
                        "step {}: {} attachment '{}' has no preceding Data step",
                        record.number, kind, record.module
                    ));
                }
            }
        }
    }

    if errors.is_empty() {
        println!("  {} All modules resolve", "✓".green());
    } else {
        println!();
        println!("{}:", "Errors".red().bold());
        for error in &errors {
            println!("  {} {}", "✗".red(), error);
        }
    }

    if verbose {
        println!();
        println!("{}:", "Workflow summary".bold());
        println!("  Steps: {}", definition.len());
        for record in &definition.sorted_by_number().steps {
            let kind = record
                .declared_kind
                .or_else(|| registry.kind_of(&record.module))
                .map(|k| k.to_string())
                .unwrap_or_else(|| "?".to_string());
            println!(
                "    {}. {} ({}){}",
                record.number,
                record.module,
                kind,
                format!(" [{} parameters]", record.params.len()).dimmed()
            );
        }
    }

    println!();

    if errors.is_empty() {
        println!("{}", "Workflow is valid!".green().bold());
        Ok(())
    } else {
        Err(miette::miette!("Workflow validation failed"))
    }
}
