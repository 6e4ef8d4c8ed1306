// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 statpipe contributors

//! Step modules
//!
//! This module provides the step trait and the name→constructor
//! registry, plus the built-in Data, Visualization and Export modules.
//! New modules register a constructor; nothing dispatches on literal
//! names.

mod data;
mod export;
mod visualization;

pub use data::{Aggregate, FilterTable, ImportData, Merge, Transform};
pub use export::{ExportTable, SaveWorkspace};
pub use visualization::{BoxPlot, Heatmap, Histogram};

use async_trait::async_trait;
use std::path::Path;

use crate::engine::session::ComputeSession;
use crate::errors::{StatpipeError, StatpipeResult};
use crate::params::ParameterBag;
use crate::workflow::StepKind;

/// Everything a running step may touch
pub struct RunContext<'a> {
    /// The external computation-engine session
    pub session: &'a dyn ComputeSession,
    /// Primary working directory for artifacts
    pub work_dir: &'a Path,
}

/// Trait for step modules
///
/// A module is stateless behavior; the tree pairs it with the step's
/// own [`ParameterBag`] and number. `run` must validate parameters
/// before submitting anything to the session.
#[async_trait]
pub trait StepModule: Send + Sync {
    /// Canonical module name
    fn name(&self) -> &'static str;

    /// Kind of step this module produces
    fn kind(&self) -> StepKind;

    /// Check that all required parameter keys are present
    fn check_parameters(&self, params: &ParameterBag, step: u32) -> StatpipeResult<()>;

    /// Perform the step's operation
    async fn run(
        &self,
        params: &ParameterBag,
        step: u32,
        ctx: &RunContext<'_>,
    ) -> StatpipeResult<()>;
}

impl std::fmt::Debug for dyn StepModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepModule").field("name", &self.name()).finish()
    }
}

/// Fetch a required single-valued parameter, or fail naming the key
pub(crate) fn require<'a>(
    params: &'a ParameterBag,
    key: &str,
    module: &str,
    step: u32,
) -> StatpipeResult<&'a str> {
    params
        .get(key)
        .map(crate::params::ParamValue::first)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| StatpipeError::MissingParameter {
            module: module.to_string(),
            step,
            key: key.to_string(),
        })
}

type Constructor = fn() -> Box<dyn StepModule>;

struct RegistryEntry {
    name: &'static str,
    kind: StepKind,
    ctor: Constructor,
}

/// Name→constructor registry for step modules
///
/// Lookup is case-insensitive; the registered spelling is canonical.
pub struct ModuleRegistry {
    entries: Vec<RegistryEntry>,
}

impl ModuleRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// A registry with every built-in module registered
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.register("ImportData", StepKind::Data, || Box::new(ImportData));
        registry.register("Transform", StepKind::Data, || Box::new(Transform));
        registry.register("FilterTable", StepKind::Data, || Box::new(FilterTable));
        registry.register("Merge", StepKind::Data, || Box::new(Merge));
        registry.register("Aggregate", StepKind::Data, || Box::new(Aggregate));

        registry.register("Histogram", StepKind::Visualization, || Box::new(Histogram));
        registry.register("BoxPlot", StepKind::Visualization, || Box::new(BoxPlot));
        registry.register("Heatmap", StepKind::Visualization, || Box::new(Heatmap));

        registry.register("ExportTable", StepKind::Export, || Box::new(ExportTable));
        registry.register("SaveWorkspace", StepKind::Export, || Box::new(SaveWorkspace));

        registry
    }

    /// Register a constructor for a module name
    ///
    /// Re-registering a name replaces the previous constructor.
    pub fn register(&mut self, name: &'static str, kind: StepKind, ctor: Constructor) {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.name.eq_ignore_ascii_case(name))
        {
            *existing = RegistryEntry { name, kind, ctor };
        } else {
            self.entries.push(RegistryEntry { name, kind, ctor });
        }
    }

    fn entry(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.iter().find(|e| e.name.eq_ignore_ascii_case(name))
    }

    /// Construct the module registered under `name`
    ///
    /// `step` only feeds the error context; an unregistered name is a
    /// distinct, non-silent failure.
    pub fn create(&self, name: &str, step: u32) -> StatpipeResult<Box<dyn StepModule>> {
        self.entry(name)
            .map(|e| (e.ctor)())
            .ok_or_else(|| StatpipeError::UnknownModule {
                module: name.to_string(),
                step,
            })
    }

    /// The registered kind for a module name
    pub fn kind_of(&self, name: &str) -> Option<StepKind> {
        self.entry(name).map(|e| e.kind)
    }

    /// Whether a module name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    /// Registered `(name, kind)` pairs, sorted by name
    pub fn modules(&self) -> Vec<(&'static str, StepKind)> {
        let mut list: Vec<_> = self.entries.iter().map(|e| (e.name, e.kind)).collect();
        list.sort_by_key(|(name, _)| name.to_ascii_lowercase());
        list
    }

    /// Registered module names, sorted
    pub fn module_names(&self) -> Vec<&'static str> {
        self.modules().into_iter().map(|(name, _)| name).collect()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_builtin_constructs() {
        let registry = ModuleRegistry::with_builtins();
        for name in registry.module_names() {
            let module = registry.create(name, 1).unwrap();
            assert_eq!(module.name(), name);
            assert_eq!(Some(module.kind()), registry.kind_of(name));
        }
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = ModuleRegistry::with_builtins();
        assert!(registry.create("importdata", 1).is_ok());
        assert!(registry.create("EXPORTTABLE", 1).is_ok());
        assert_eq!(registry.kind_of("histogram"), Some(StepKind::Visualization));
    }

    #[test]
    fn test_unknown_name_is_distinct_error() {
        let registry = ModuleRegistry::with_builtins();
        match registry.create("NoSuchModule", 4) {
            Err(StatpipeError::UnknownModule { module, step }) => {
                assert_eq!(module, "NoSuchModule");
                assert_eq!(step, 4);
            }
            other => panic!("Expected UnknownModule, got {:?}", other),
        }
    }

    #[test]
    fn test_register_extends_without_touching_dispatch() {
        let mut registry = ModuleRegistry::with_builtins();
        let before = registry.module_names().len();

        registry.register("Transform2", StepKind::Data, || Box::new(Transform));
        assert_eq!(registry.module_names().len(), before + 1);
        assert!(registry.create("transform2", 1).is_ok());
    }

    #[test]
    fn test_module_names_sorted() {
        let names = ModuleRegistry::with_builtins().module_names();
        let mut sorted = names.clone();
        sorted.sort_by_key(|n| n.to_ascii_lowercase());
        assert_eq!(names, sorted);
    }
}
