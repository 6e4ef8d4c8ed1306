// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 statpipe contributors

//! Modules command - list the registered step modules

use colored::Colorize;
use miette::Result;
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::modules::ModuleRegistry;
use crate::workflow::StepKind;

#[derive(Serialize)]
struct ModuleInfo {
    name: &'static str,
    kind: StepKind,
}

/// Run the modules command
pub async fn run(format: OutputFormat, _verbose: bool) -> Result<()> {
    let registry = ModuleRegistry::with_builtins();

    match format {
        OutputFormat::Json => {
            let list: Vec<ModuleInfo> = registry
                .modules()
                .into_iter()
                .map(|(name, kind)| ModuleInfo { name, kind })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&list)
                    .map_err(|e| miette::miette!("Failed to serialize module list: {}", e))?
            );
        }
        OutputFormat::Text => {
            println!("{}:", "Registered step modules".bold());
            println!();
            for kind in [StepKind::Data, StepKind::Visualization, StepKind::Export] {
                println!("  {}:", kind.to_string().bold());
                for (name, module_kind) in registry.modules() {
                    if module_kind == kind {
                        println!("    - {}", name);
                    }
                }
                println!();
            }
        }
    }

    Ok(())
}
