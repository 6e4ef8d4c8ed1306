// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 statpipe contributors

//! Convert command - rewrite a workflow in the other persisted form

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use crate::modules::ModuleRegistry;
use crate::workflow::{WorkflowFormat, WorkflowStore};

/// Run the convert command
pub async fn run(
    input: PathBuf,
    output: PathBuf,
    format: Option<WorkflowFormat>,
    table: String,
    verbose: bool,
) -> Result<()> {
    if !input.exists() {
        return Err(miette::miette!(
            "Workflow file not found: {}",
            input.display()
        ));
    }

    let store = WorkflowStore::new().with_table_name(table);
    let mut definition = store.load(&input, None)?.sorted_by_number();
    definition.validate_contiguous(&input.display().to_string())?;

    if definition.is_empty() {
        return Err(miette::miette!(
            "Workflow '{}' has no steps; nothing to convert",
            input.display()
        ));
    }

    // The table form drops kinds, so fill them back in from the
    // registry before writing markup.
    let registry = ModuleRegistry::with_builtins();
    for record in &mut definition.steps {
        if record.declared_kind.is_none() {
            record.declared_kind = registry.kind_of(&record.module);
        }
    }

    store.save(&definition, &output, format)?;

    println!(
        "{} Converted {} ({} steps) to {}",
        "✓".green(),
        input.display(),
        definition.len(),
        output.display()
    );

    if verbose {
        println!();
        for record in &definition.steps {
            let kind = record
                .declared_kind
                .map(|k| k.to_string())
                .unwrap_or_else(|| "?".to_string());
            println!("  {}. {} ({})", record.number, record.module, kind.dimmed());
        }
    }

    Ok(())
}
