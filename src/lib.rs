// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 statpipe contributors

//! # statpipe - Declarative Statistical Workflow Runner
//!
//! `statpipe` loads declarative analysis workflows, assembles them into
//! an executable step tree and runs them against an external compute
//! engine.
//!
//! ## Features
//!
//! - **Two persisted forms** - Hierarchical XML markup or a flat SQLite table
//! - **Strict validation** - Contiguous 1-based step numbers, known modules only
//! - **Structural editing** - Insert, remove and reorder steps with stable renumbering
//! - **Fail-fast execution** - The first failing step stops the pipeline
//! - **Extensible registry** - New step modules register a constructor, nothing more
//!
//! ## Quick Start
//!
//! ```bash
//! # Run a workflow
//! statpipe run workflow.xml
//!
//! # Check a workflow without running it
//! statpipe validate workflow.xml
//!
//! # Convert between the persisted forms
//! statpipe convert workflow.xml workflow.db
//!
//! # List the registered step modules
//! statpipe modules
//! ```

pub mod cli;
pub mod engine;
pub mod errors;
pub mod modules;
pub mod params;
pub mod storage;
pub mod workflow;

// Re-export commonly used types
pub use engine::{Engine, EngineState};
pub use errors::{StatpipeError, StatpipeResult};
pub use modules::{ModuleRegistry, StepModule};
pub use params::{ParamValue, ParameterBag};
pub use workflow::{ModuleTree, StepKind, WorkflowDefinition, WorkflowFormat, WorkflowStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
