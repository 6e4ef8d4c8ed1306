// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 statpipe contributors

//! Pipeline engine
//!
//! The [`Engine`] owns one workflow end to end: load a persisted
//! definition, assemble it into the executable tree, apply structural
//! edits, run it against a compute session, and write it back out.
//! Engines are independent; nothing is shared between two instances,
//! so several pipelines can run concurrently in one process.

pub mod session;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errors::{StatpipeError, StatpipeResult};
use crate::modules::{ModuleRegistry, RunContext};
use crate::params::{ParamValue, ParameterBag};
use crate::workflow::{
    ModuleTree, StepNode, TreeStep, WorkflowFormat, WorkflowStore,
};

use session::ComputeSession;

/// Lifecycle of an engine instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No workflow loaded yet
    Unloaded,
    /// A load is in progress
    Loading,
    /// A workflow is assembled and ready
    Loaded,
    /// The last load failed; the tree is empty
    LoadFailed,
    /// A run is in progress
    Running,
    /// The last run finished with every step succeeding
    Completed,
    /// The last run stopped at a failing step
    Failed,
}

/// Owns one workflow: definition, tree, globals and run state
pub struct Engine {
    registry: ModuleRegistry,
    store: WorkflowStore,
    globals: ParameterBag,
    tree: ModuleTree,
    state: EngineState,
    cancel: Arc<AtomicBool>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_registry(ModuleRegistry::with_builtins())
    }

    /// An engine over a custom module registry
    pub fn with_registry(registry: ModuleRegistry) -> Self {
        Self {
            registry,
            store: WorkflowStore::new(),
            globals: ParameterBag::new(),
            tree: ModuleTree::new(),
            state: EngineState::Unloaded,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Override the table name used by the table-form persisted format
    pub fn with_table_name(mut self, name: impl Into<String>) -> Self {
        self.store = WorkflowStore::new().with_table_name(name);
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Set a pipeline-wide default parameter
    ///
    /// Globals fill in missing keys at assembly time; a step's own
    /// parameter with the same key always wins.
    pub fn set_global(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.globals.set(key, value);
    }

    /// Flag consulted between steps during a run
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Request that the current run stop before its next step
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Loading
    // ─────────────────────────────────────────────────────────────────────────

    /// Load and assemble a workflow from a persisted source
    ///
    /// On any failure the engine holds zero steps and reports
    /// [`EngineState::LoadFailed`]; a partially assembled tree is never
    /// left behind.
    pub fn load(&mut self, source: &Path, format: Option<WorkflowFormat>) -> StatpipeResult<()> {
        self.state = EngineState::Loading;
        self.tree = ModuleTree::new();

        match self.load_inner(source, format) {
            Ok(()) => {
                self.state = EngineState::Loaded;
                tracing::info!(source = %source.display(), steps = self.count(),
                    "workflow loaded");
                Ok(())
            }
            Err(e) => {
                self.tree = ModuleTree::new();
                self.state = EngineState::LoadFailed;
                tracing::error!(source = %source.display(), error = %e, "workflow load failed");
                Err(e)
            }
        }
    }

    fn load_inner(&mut self, source: &Path, format: Option<WorkflowFormat>) -> StatpipeResult<()> {
        let definition = self.store.load(source, format)?;
        let source_name = source.display().to_string();
        definition.validate_contiguous(&source_name)?;

        for record in definition.sorted_by_number().steps {
            let module = self.registry.create(&record.module, record.number)?;

            // The markup form declares kinds; they must agree with the
            // registry, which is authoritative.
            if let Some(declared) = record.declared_kind {
                if declared != module.kind() {
                    return Err(StatpipeError::KindMismatch {
                        module: record.module,
                        step: record.number,
                        declared: declared.to_string(),
                        registered: module.kind().to_string(),
                    });
                }
            }

            let mut params = record.params;
            for (key, value) in self.globals.iter() {
                params.set_if_absent(key, value.clone());
            }

            self.tree.push(TreeStep {
                module_name: record.module,
                kind: module.kind(),
                params,
                module,
            })?;
        }

        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inspection
    // ─────────────────────────────────────────────────────────────────────────

    pub fn count(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn max_step(&self) -> u32 {
        self.tree.max_step()
    }

    pub fn has_step(&self, number: u32) -> bool {
        self.tree.has_step(number)
    }

    pub fn get_step(&self, number: u32) -> Option<&StepNode> {
        self.tree.get(number)
    }

    pub fn tree(&self) -> &ModuleTree {
        &self.tree
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Structural edits
    // ─────────────────────────────────────────────────────────────────────────

    /// Append a step with the next available number
    pub fn push_step(&mut self, module_name: &str, params: ParameterBag) -> StatpipeResult<()> {
        let position = self.max_step() + 1;
        self.insert_step(module_name, params, position)
    }

    /// Place a step at `position`; later steps shift up by one
    pub fn insert_step(
        &mut self,
        module_name: &str,
        params: ParameterBag,
        position: u32,
    ) -> StatpipeResult<()> {
        let module = self.registry.create(module_name, position)?;

        let mut params = params;
        for (key, value) in self.globals.iter() {
            params.set_if_absent(key, value.clone());
        }

        self.tree.insert_at(
            TreeStep {
                module_name: module.name().to_string(),
                kind: module.kind(),
                params,
                module,
            },
            position,
        )
    }

    /// Delete the step at `number`; later steps shift down by one
    pub fn remove_step(&mut self, number: u32) -> StatpipeResult<()> {
        self.tree.remove(number)
    }

    /// Swap a step with its predecessor; a no-op on the first step
    pub fn move_step_up(&mut self, number: u32) -> StatpipeResult<()> {
        self.tree.move_up(number)
    }

    /// Swap a step with its successor; a no-op on the last step
    pub fn move_step_down(&mut self, number: u32) -> StatpipeResult<()> {
        self.tree.move_down(number)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Running and saving
    // ─────────────────────────────────────────────────────────────────────────

    /// Run every step against `session`, stopping at the first failure
    ///
    /// An empty workflow succeeds with a warning.
    pub async fn run(
        &mut self,
        session: &dyn ComputeSession,
        work_dir: &Path,
    ) -> StatpipeResult<()> {
        if self.tree.is_empty() {
            tracing::warn!("workflow has no steps; nothing to run");
            self.state = EngineState::Completed;
            return Ok(());
        }

        self.state = EngineState::Running;
        let ctx = RunContext { session, work_dir };

        match self.tree.run_all(&ctx, &self.cancel).await {
            Ok(()) => {
                self.state = EngineState::Completed;
                Ok(())
            }
            Err(e) => {
                self.state = EngineState::Failed;
                Err(e)
            }
        }
    }

    /// Write the current tree back out in either persisted form
    ///
    /// Saving an empty workflow is an error, not a silent empty file.
    pub fn save(&self, destination: &Path, format: Option<WorkflowFormat>) -> StatpipeResult<()> {
        if self.tree.is_empty() {
            return Err(StatpipeError::EmptyWorkflow);
        }

        let definition = self.tree.to_definition();
        self.store.save(&definition, destination, format)?;
        tracing::info!(destination = %destination.display(), steps = definition.len(),
            "workflow saved");
        Ok(())
    }
}
