// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 statpipe contributors

//! Workflow definition, persistence and the executable tree

mod definition;
mod store;
mod tree;

pub use definition::{ParameterRow, StepKind, StepRecord, WorkflowDefinition};
pub use store::{WorkflowFormat, WorkflowStore, DEFAULT_WORKFLOW_TABLE};
pub use tree::{ModuleTree, StepNode, TreeStep};
