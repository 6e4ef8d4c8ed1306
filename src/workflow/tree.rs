// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 statpipe contributors

//! Executable module tree
//!
//! Steps live in an arena addressed by stable ids; execution order and
//! step numbers come from a separate order vector. Structural edits
//! splice the order vector and then run one `reindex` pass, so nothing
//! ever relinks chain pointers by hand. Parent references are rebuilt
//! on every reindex and are lookup-only.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use colored::Colorize;

use crate::errors::{StatpipeError, StatpipeResult};
use crate::modules::{RunContext, StepModule};
use crate::params::ParameterBag;
use crate::workflow::{StepKind, StepRecord, WorkflowDefinition};

/// Stable arena id of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StepId(usize);

/// One assembled step
pub struct StepNode {
    /// 1-based step number; rewritten by every reindex
    pub number: u32,
    /// Canonical module name
    pub module_name: String,
    pub kind: StepKind,
    pub params: ParameterBag,
    module: Box<dyn StepModule>,
    parent: Option<StepId>,
    viz: Vec<StepId>,
    exports: Vec<StepId>,
}

/// An unassembled step handed to the tree by the engine
pub struct TreeStep {
    pub module_name: String,
    pub kind: StepKind,
    pub params: ParameterBag,
    pub module: Box<dyn StepModule>,
}

impl TreeStep {
    fn into_node(self) -> StepNode {
        StepNode {
            number: 0,
            module_name: self.module_name,
            kind: self.kind,
            params: self.params,
            module: self.module,
            parent: None,
            viz: Vec::new(),
            exports: Vec::new(),
        }
    }
}

/// The executable structure: a Data chain with leaf attachments
#[derive(Default)]
pub struct ModuleTree {
    slots: Vec<Option<StepNode>>,
    order: Vec<StepId>,
}

impl ModuleTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Highest step number; equals `len` by the contiguity invariant
    pub fn max_step(&self) -> u32 {
        self.order.len() as u32
    }

    fn node(&self, id: StepId) -> &StepNode {
        self.slots[id.0].as_ref().expect("order references a live slot")
    }

    fn node_mut(&mut self, id: StepId) -> &mut StepNode {
        self.slots[id.0].as_mut().expect("order references a live slot")
    }

    fn id_at(&self, number: u32) -> Option<StepId> {
        if number == 0 {
            return None;
        }
        self.order.get(number as usize - 1).copied()
    }

    /// The step at a 1-based number
    pub fn get(&self, number: u32) -> Option<&StepNode> {
        self.id_at(number).map(|id| self.node(id))
    }

    pub fn has_step(&self, number: u32) -> bool {
        self.id_at(number).is_some()
    }

    /// Step number of the node enclosing `number`, if any
    ///
    /// For an attachment that is its owning Data step; for a Data step
    /// its chain predecessor.
    pub fn parent_of(&self, number: u32) -> Option<u32> {
        let id = self.id_at(number)?;
        self.node(id).parent.map(|p| self.node(p).number)
    }

    /// Step numbers of the Visualization attachments of Data step `number`
    pub fn viz_of(&self, number: u32) -> Vec<u32> {
        self.id_at(number)
            .map(|id| self.node(id).viz.iter().map(|v| self.node(*v).number).collect())
            .unwrap_or_default()
    }

    /// Step numbers of the Export attachments of Data step `number`
    pub fn exports_of(&self, number: u32) -> Vec<u32> {
        self.id_at(number)
            .map(|id| self.node(id).exports.iter().map(|e| self.node(*e).number).collect())
            .unwrap_or_default()
    }

    /// Renumber in order and rebuild attachment lists and parent edges
    ///
    /// Fails when an attachment has no preceding Data step; callers
    /// revert their splice before surfacing that.
    fn reindex(&mut self) -> StatpipeResult<()> {
        // Validate first so a failed reindex never half-applies.
        let mut seen_data = false;
        for (index, id) in self.order.iter().enumerate() {
            let node = self.node(*id);
            match node.kind {
                StepKind::Data => seen_data = true,
                StepKind::Visualization | StepKind::Export => {
                    if !seen_data {
                        return Err(StatpipeError::OrphanAttachment {
                            module: node.module_name.clone(),
                            step: index as u32 + 1,
                            kind: node.kind.to_string(),
                        });
                    }
                }
            }
        }

        for slot in self.slots.iter_mut().flatten() {
            slot.parent = None;
            slot.viz.clear();
            slot.exports.clear();
        }

        let mut previous_data: Option<StepId> = None;
        for (index, id) in self.order.clone().into_iter().enumerate() {
            self.node_mut(id).number = index as u32 + 1;

            match self.node(id).kind {
                StepKind::Data => {
                    self.node_mut(id).parent = previous_data;
                    previous_data = Some(id);
                }
                StepKind::Visualization => {
                    let owner = previous_data.expect("validated above");
                    self.node_mut(id).parent = Some(owner);
                    self.node_mut(owner).viz.push(id);
                }
                StepKind::Export => {
                    let owner = previous_data.expect("validated above");
                    self.node_mut(id).parent = Some(owner);
                    self.node_mut(owner).exports.push(id);
                }
            }
        }

        Ok(())
    }

    fn splice(&mut self, step: TreeStep, index: usize) -> StatpipeResult<()> {
        let id = StepId(self.slots.len());
        self.slots.push(Some(step.into_node()));
        self.order.insert(index, id);

        if let Err(e) = self.reindex() {
            self.order.remove(index);
            self.slots.pop();
            self.reindex().expect("tree was valid before the edit");
            return Err(e);
        }
        Ok(())
    }

    /// Append a step with the next available number
    pub fn push(&mut self, step: TreeStep) -> StatpipeResult<()> {
        let index = self.order.len();
        self.splice(step, index)
    }

    /// Place a step at position `number`; steps numbered >= `number`
    /// shift up by one. A position past the end appends.
    pub fn insert_at(&mut self, step: TreeStep, number: u32) -> StatpipeResult<()> {
        let index = if number == 0 || number as usize > self.order.len() {
            self.order.len()
        } else {
            number as usize - 1
        };
        self.splice(step, index)
    }

    /// Delete the step at `number`; steps after it shift down by one
    pub fn remove(&mut self, number: u32) -> StatpipeResult<()> {
        let Some(id) = self.id_at(number) else {
            return Err(StatpipeError::StepNotFound { step: number });
        };

        let index = number as usize - 1;
        self.order.remove(index);

        if let Err(e) = self.reindex() {
            self.order.insert(index, id);
            self.reindex().expect("tree was valid before the edit");
            return Err(e);
        }

        self.slots[id.0] = None;
        Ok(())
    }

    /// Swap step `number` with its predecessor; a no-op on the first step
    pub fn move_up(&mut self, number: u32) -> StatpipeResult<()> {
        if !self.has_step(number) {
            return Err(StatpipeError::StepNotFound { step: number });
        }
        if number == 1 {
            return Ok(());
        }
        self.swap(number as usize - 2, number as usize - 1)
    }

    /// Swap step `number` with its successor; a no-op on the last step
    pub fn move_down(&mut self, number: u32) -> StatpipeResult<()> {
        if !self.has_step(number) {
            return Err(StatpipeError::StepNotFound { step: number });
        }
        if number as usize == self.order.len() {
            return Ok(());
        }
        self.swap(number as usize - 1, number as usize)
    }

    fn swap(&mut self, a: usize, b: usize) -> StatpipeResult<()> {
        self.order.swap(a, b);
        if let Err(e) = self.reindex() {
            self.order.swap(a, b);
            self.reindex().expect("tree was valid before the edit");
            return Err(e);
        }
        Ok(())
    }

    /// Rebuild the serialization-neutral definition in execution order
    pub fn to_definition(&self) -> WorkflowDefinition {
        let mut definition = WorkflowDefinition::new();
        for id in &self.order {
            let node = self.node(*id);
            definition.steps.push(
                StepRecord::new(node.number, node.module_name.clone(), node.params.clone())
                    .with_kind(node.kind),
            );
        }
        definition
    }

    /// Walk the Data chain and run every step
    ///
    /// Per Data step: its own operation, then its Visualization
    /// attachments in insertion order, then its Export attachments in
    /// insertion order. The first failure aborts the remaining walk;
    /// side effects already produced stay produced. `cancel` is
    /// consulted between steps only.
    pub async fn run_all(
        &self,
        ctx: &RunContext<'_>,
        cancel: &AtomicBool,
    ) -> StatpipeResult<()> {
        let data_ids: Vec<StepId> = self
            .order
            .iter()
            .copied()
            .filter(|id| self.node(*id).kind == StepKind::Data)
            .collect();

        for data_id in data_ids {
            self.run_step(self.node(data_id), ctx, cancel, false).await?;

            for viz_id in &self.node(data_id).viz {
                self.run_step(self.node(*viz_id), ctx, cancel, true).await?;
            }
            for export_id in &self.node(data_id).exports {
                self.run_step(self.node(*export_id), ctx, cancel, true).await?;
            }
        }

        Ok(())
    }

    async fn run_step(
        &self,
        node: &StepNode,
        ctx: &RunContext<'_>,
        cancel: &AtomicBool,
        attachment: bool,
    ) -> StatpipeResult<()> {
        if cancel.load(Ordering::SeqCst) {
            tracing::warn!(step = node.number, "run cancelled");
            return Err(StatpipeError::Cancelled { step: node.number });
        }

        let indent = if attachment { "    " } else { "  " };
        print!("{indent}{} {}...", "→".blue(), node.module_name);

        let start = Instant::now();
        tracing::info!(module = %node.module_name, step = node.number, "running step");

        match node.module.run(&node.params, node.number, ctx).await {
            Ok(()) => {
                println!(
                    "\r{indent}{} {} ({:.2}s)",
                    "✓".green(),
                    node.module_name.bold(),
                    start.elapsed().as_secs_f64()
                );
                Ok(())
            }
            Err(e) => {
                println!("\r{indent}{} {} failed", "✗".red(), node.module_name.bold());
                tracing::error!(module = %node.module_name, step = node.number, error = %e,
                    "step failed; aborting remaining walk");
                Err(e)
            }
        }
    }

    /// `(number, module name, kind)` triples in execution order
    pub fn summary(&self) -> Vec<(u32, String, StepKind)> {
        self.order
            .iter()
            .map(|id| {
                let node = self.node(*id);
                (node.number, node.module_name.clone(), node.kind)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::session::ComputeSession;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Minimal module that just reports to the session
    struct Probe {
        name: &'static str,
        kind: StepKind,
    }

    #[async_trait]
    impl StepModule for Probe {
        fn name(&self) -> &'static str {
            self.name
        }

        fn kind(&self) -> StepKind {
            self.kind
        }

        fn check_parameters(&self, _params: &ParameterBag, _step: u32) -> StatpipeResult<()> {
            Ok(())
        }

        async fn run(
            &self,
            _params: &ParameterBag,
            step: u32,
            ctx: &RunContext<'_>,
        ) -> StatpipeResult<()> {
            ctx.session.run(self.name, self.name, step).await
        }
    }

    /// Session that records the walk and can fail at one step
    struct ScriptedSession {
        log: Mutex<Vec<(String, u32)>>,
        fail_at: Option<u32>,
    }

    impl ScriptedSession {
        fn new() -> Self {
            Self { log: Mutex::new(Vec::new()), fail_at: None }
        }

        fn failing_at(step: u32) -> Self {
            Self { log: Mutex::new(Vec::new()), fail_at: Some(step) }
        }

        fn log(&self) -> Vec<(String, u32)> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ComputeSession for ScriptedSession {
        async fn run(&self, _command: &str, label: &str, step: u32) -> StatpipeResult<()> {
            self.log.lock().unwrap().push((label.to_string(), step));
            if self.fail_at == Some(step) {
                return Err(StatpipeError::step_failed(label, step, "scripted failure"));
            }
            Ok(())
        }

        fn handle(&self) -> &str {
            "sp_test"
        }
    }

    fn step(name: &'static str, kind: StepKind) -> TreeStep {
        TreeStep {
            module_name: name.to_string(),
            kind,
            params: ParameterBag::new(),
            module: Box::new(Probe { name, kind }),
        }
    }

    fn data(name: &'static str) -> TreeStep {
        step(name, StepKind::Data)
    }

    /// Import → Transform(+Histogram, +ExportTable) → Aggregate
    fn five_step_tree() -> ModuleTree {
        let mut tree = ModuleTree::new();
        tree.push(data("Import")).unwrap();
        tree.push(data("Transform")).unwrap();
        tree.push(step("Histogram", StepKind::Visualization)).unwrap();
        tree.push(step("ExportTable", StepKind::Export)).unwrap();
        tree.push(data("Aggregate")).unwrap();
        tree
    }

    fn numbers(tree: &ModuleTree) -> Vec<(u32, String)> {
        tree.summary().into_iter().map(|(n, name, _)| (n, name)).collect()
    }

    #[test]
    fn test_assembly_numbers_and_attachments() {
        let tree = five_step_tree();

        assert_eq!(tree.len(), 5);
        assert_eq!(tree.viz_of(2), vec![3]);
        assert_eq!(tree.exports_of(2), vec![4]);
        assert_eq!(tree.parent_of(3), Some(2));
        assert_eq!(tree.parent_of(4), Some(2));
        // Data chain back edges
        assert_eq!(tree.parent_of(1), None);
        assert_eq!(tree.parent_of(2), Some(1));
        assert_eq!(tree.parent_of(5), Some(2));
    }

    #[test]
    fn test_attachment_first_is_rejected() {
        let mut tree = ModuleTree::new();
        let err = tree.push(step("Histogram", StepKind::Visualization)).unwrap_err();
        assert!(matches!(err, StatpipeError::OrphanAttachment { .. }));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_insert_shifts_numbers_up() {
        let mut tree = five_step_tree();
        tree.insert_at(data("FilterTable"), 2).unwrap();

        assert_eq!(
            numbers(&tree),
            vec![
                (1, "Import".to_string()),
                (2, "FilterTable".to_string()),
                (3, "Transform".to_string()),
                (4, "Histogram".to_string()),
                (5, "ExportTable".to_string()),
                (6, "Aggregate".to_string()),
            ]
        );
    }

    #[test]
    fn test_insert_past_end_appends() {
        let mut tree = five_step_tree();
        tree.insert_at(data("Merge"), 99).unwrap();

        assert_eq!(tree.len(), 6);
        assert_eq!(tree.get(6).unwrap().module_name, "Merge");
    }

    #[test]
    fn test_remove_shifts_numbers_down() {
        let mut tree = five_step_tree();
        tree.remove(3).unwrap();

        assert_eq!(
            numbers(&tree),
            vec![
                (1, "Import".to_string()),
                (2, "Transform".to_string()),
                (3, "ExportTable".to_string()),
                (4, "Aggregate".to_string()),
            ]
        );
        // Remaining attachment still owned by Transform
        assert_eq!(tree.exports_of(2), vec![3]);
    }

    #[test]
    fn test_remove_missing_step_is_explicit_error() {
        let mut tree = five_step_tree();
        assert!(matches!(
            tree.remove(9),
            Err(StatpipeError::StepNotFound { step: 9 })
        ));
        assert_eq!(tree.len(), 5);
    }

    #[test]
    fn test_remove_only_data_step_reverts_on_orphan() {
        let mut tree = ModuleTree::new();
        tree.push(data("Import")).unwrap();
        tree.push(step("Histogram", StepKind::Visualization)).unwrap();

        let err = tree.remove(1).unwrap_err();
        assert!(matches!(err, StatpipeError::OrphanAttachment { .. }));
        // Edit reverted wholesale
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.get(1).unwrap().module_name, "Import");
    }

    #[test]
    fn test_move_up_swaps_numbers() {
        let mut tree = five_step_tree();
        tree.move_up(5).unwrap();

        assert_eq!(tree.get(4).unwrap().module_name, "Aggregate");
        assert_eq!(tree.get(5).unwrap().module_name, "ExportTable");
        // ExportTable now attaches to Aggregate
        assert_eq!(tree.parent_of(5), Some(4));
    }

    #[test]
    fn test_move_boundaries_are_no_ops() {
        let mut tree = five_step_tree();
        let before = numbers(&tree);

        tree.move_up(1).unwrap();
        tree.move_down(5).unwrap();
        assert_eq!(numbers(&tree), before);
    }

    #[test]
    fn test_move_missing_step_is_explicit_error() {
        let mut tree = five_step_tree();
        assert!(matches!(tree.move_up(7), Err(StatpipeError::StepNotFound { step: 7 })));
        assert!(matches!(tree.move_down(0), Err(StatpipeError::StepNotFound { step: 0 })));
    }

    #[test]
    fn test_move_attachment_past_first_data_reverts() {
        let mut tree = ModuleTree::new();
        tree.push(data("Import")).unwrap();
        tree.push(step("Histogram", StepKind::Visualization)).unwrap();

        let err = tree.move_up(2).unwrap_err();
        assert!(matches!(err, StatpipeError::OrphanAttachment { .. }));
        assert_eq!(tree.get(1).unwrap().module_name, "Import");
    }

    #[test]
    fn test_numbering_stays_contiguous_under_edit_sequences() {
        let mut tree = five_step_tree();
        tree.insert_at(data("Merge"), 1).unwrap();
        tree.remove(4).unwrap();
        tree.move_down(2).unwrap();
        tree.insert_at(data("FilterTable"), 3).unwrap();

        let nums: Vec<u32> = tree.summary().iter().map(|(n, _, _)| *n).collect();
        assert_eq!(nums, (1..=tree.max_step()).collect::<Vec<_>>());
        tree.to_definition().validate_contiguous("in-memory").unwrap();
    }

    #[tokio::test]
    async fn test_walk_runs_viz_before_exports_then_next_data() {
        let tree = {
            let mut tree = ModuleTree::new();
            tree.push(data("Import")).unwrap();
            tree.push(data("Transform")).unwrap();
            // Export recorded before the viz in document order
            tree.push(step("ExportTable", StepKind::Export)).unwrap();
            tree.push(step("Histogram", StepKind::Visualization)).unwrap();
            tree.push(data("Aggregate")).unwrap();
            tree
        };

        let session = ScriptedSession::new();
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext { session: &session, work_dir: dir.path() };
        let cancel = AtomicBool::new(false);

        tree.run_all(&ctx, &cancel).await.unwrap();

        let order: Vec<String> = session.log().into_iter().map(|(name, _)| name).collect();
        // Visualization attachments run before Export attachments
        assert_eq!(order, vec!["Import", "Transform", "Histogram", "ExportTable", "Aggregate"]);
    }

    #[tokio::test]
    async fn test_failure_stops_walk() {
        let tree = five_step_tree();
        let session = ScriptedSession::failing_at(2);
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext { session: &session, work_dir: dir.path() };
        let cancel = AtomicBool::new(false);

        let err = tree.run_all(&ctx, &cancel).await.unwrap_err();
        assert!(matches!(err, StatpipeError::StepFailed { step: 2, .. }));

        // Steps after the failure point never ran
        let steps: Vec<u32> = session.log().into_iter().map(|(_, n)| n).collect();
        assert_eq!(steps, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_attachment_failure_stops_chain() {
        let tree = five_step_tree();
        let session = ScriptedSession::failing_at(3);
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext { session: &session, work_dir: dir.path() };
        let cancel = AtomicBool::new(false);

        assert!(tree.run_all(&ctx, &cancel).await.is_err());
        let steps: Vec<u32> = session.log().into_iter().map(|(_, n)| n).collect();
        assert_eq!(steps, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_cancel_checked_between_steps() {
        let tree = five_step_tree();
        let session = ScriptedSession::new();
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext { session: &session, work_dir: dir.path() };

        let cancel = AtomicBool::new(true);
        let err = tree.run_all(&ctx, &cancel).await.unwrap_err();
        assert!(matches!(err, StatpipeError::Cancelled { step: 1 }));
        assert!(session.log().is_empty());
    }

    #[test]
    fn test_to_definition_round_trip() {
        let tree = five_step_tree();
        let definition = tree.to_definition();

        assert_eq!(definition.len(), 5);
        assert_eq!(definition.steps[2].module, "Histogram");
        assert_eq!(definition.steps[2].declared_kind, Some(StepKind::Visualization));
        definition.validate_contiguous("in-memory").unwrap();
    }
}
