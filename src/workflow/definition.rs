// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 statpipe contributors

//! Workflow definition structures
//!
//! The serialization-neutral intermediate form: an ordered list of step
//! records produced by parsing either persisted format, and consumed by
//! the engine when assembling the executable tree. A definition is
//! created fresh on every load and never reused across loads.

use serde::Serialize;

use crate::errors::{StatpipeError, StatpipeResult};
use crate::params::ParameterBag;

/// The three kinds of workflow step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StepKind {
    /// Chained step that produces or transforms tabular data
    Data,
    /// Leaf attachment that renders a plot after its parent Data step
    Visualization,
    /// Leaf attachment that writes an artifact after its parent Data step
    Export,
}

impl StepKind {
    /// Parse the markup form's `Type` attribute (case-insensitive)
    pub fn from_attribute(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "DATA" => Some(Self::Data),
            "VISUALIZATION" => Some(Self::Visualization),
            "EXPORT" => Some(Self::Export),
            _ => None,
        }
    }

    /// The value written to the markup form's `Type` attribute
    pub fn attribute_value(&self) -> &'static str {
        match self {
            Self::Data => "DATA",
            Self::Visualization => "VISUALIZATION",
            Self::Export => "EXPORT",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Data => write!(f, "Data"),
            Self::Visualization => write!(f, "Visualization"),
            Self::Export => write!(f, "Export"),
        }
    }
}

/// One parsed step record: `(stepNumber, moduleName, parameters)`
///
/// `declared_kind` is present when the source carries a kind (the
/// markup form); the table form leaves it `None` and the kind is
/// recovered from the module registry at assembly time.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    /// 1-based step number
    pub number: u32,
    /// Canonical module name
    pub module: String,
    /// Kind declared by the source, if any
    pub declared_kind: Option<StepKind>,
    /// Step-local parameters
    pub params: ParameterBag,
}

impl StepRecord {
    pub fn new(number: u32, module: impl Into<String>, params: ParameterBag) -> Self {
        Self {
            number,
            module: module.into(),
            declared_kind: None,
            params,
        }
    }

    pub fn with_kind(mut self, kind: StepKind) -> Self {
        self.declared_kind = Some(kind);
        self
    }
}

/// The flattened row shape used by the table-based persisted form
///
/// Multiple rows share a `(step, module)` pair, one row per parameter
/// element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterRow {
    pub step: u32,
    pub module: String,
    pub key: String,
    pub value: String,
}

/// Ordered collection of step records
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkflowDefinition {
    pub steps: Vec<StepRecord>,
}

impl WorkflowDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Highest step number, or 0 when empty
    pub fn max_step(&self) -> u32 {
        self.steps.iter().map(|s| s.number).max().unwrap_or(0)
    }

    /// Check that step numbers are unique and contiguous from 1
    ///
    /// `source` names the workflow origin in the returned diagnostic.
    pub fn validate_contiguous(&self, source: &str) -> StatpipeResult<()> {
        let mut seen = std::collections::HashSet::new();
        for record in &self.steps {
            if record.number == 0 {
                return Err(StatpipeError::invalid(format!(
                    "step numbers are 1-based, but '{}' in '{}' is numbered 0",
                    record.module, source
                )));
            }
            if !seen.insert(record.number) {
                return Err(StatpipeError::DuplicateStep {
                    step: record.number,
                    workflow: source.to_string(),
                });
            }
        }

        let max = self.max_step();
        for step in 1..=max {
            if !seen.contains(&step) {
                return Err(StatpipeError::MissingStep {
                    step,
                    workflow: source.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Steps sorted by number (the table form stores rows grouped, not
    /// necessarily ordered)
    pub fn sorted_by_number(mut self) -> Self {
        self.steps.sort_by_key(|s| s.number);
        self
    }

    /// Flatten every step to `ParameterRow`s, one per parameter element
    ///
    /// A step with no parameters still yields one row with empty key and
    /// value so it survives the table form.
    pub fn to_rows(&self) -> Vec<ParameterRow> {
        let mut rows = Vec::new();
        for record in &self.steps {
            let pairs = record.params.flat_pairs();
            if pairs.is_empty() {
                rows.push(ParameterRow {
                    step: record.number,
                    module: record.module.clone(),
                    key: String::new(),
                    value: String::new(),
                });
                continue;
            }
            for (key, value) in pairs {
                rows.push(ParameterRow {
                    step: record.number,
                    module: record.module.clone(),
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(number: u32, module: &str) -> StepRecord {
        StepRecord::new(number, module, ParameterBag::new())
    }

    #[test]
    fn test_contiguous_numbering_is_valid() {
        let definition = WorkflowDefinition {
            steps: vec![record(1, "ImportData"), record(2, "Transform"), record(3, "ExportTable")],
        };

        assert!(definition.validate_contiguous("test.xml").is_ok());
    }

    #[test]
    fn test_gap_names_missing_step_and_source() {
        let definition = WorkflowDefinition {
            steps: vec![record(1, "ImportData"), record(3, "ExportTable")],
        };

        match definition.validate_contiguous("broken.xml") {
            Err(StatpipeError::MissingStep { step, workflow: source }) => {
                assert_eq!(step, 2);
                assert_eq!(source, "broken.xml");
            }
            other => panic!("Expected MissingStep, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_step_rejected() {
        let definition = WorkflowDefinition {
            steps: vec![record(1, "ImportData"), record(1, "Transform")],
        };

        assert!(matches!(
            definition.validate_contiguous("dup.xml"),
            Err(StatpipeError::DuplicateStep { step: 1, .. })
        ));
    }

    #[test]
    fn test_zero_step_number_rejected() {
        let definition = WorkflowDefinition { steps: vec![record(0, "ImportData")] };

        assert!(definition.validate_contiguous("zero.xml").is_err());
    }

    #[test]
    fn test_empty_definition_is_contiguous() {
        assert!(WorkflowDefinition::new().validate_contiguous("empty.xml").is_ok());
    }

    #[test]
    fn test_to_rows_one_per_parameter() {
        let mut params = ParameterBag::new();
        params.set("source", "csv");
        params.append("column", "a");
        params.append("column", "b");

        let definition = WorkflowDefinition {
            steps: vec![StepRecord::new(1, "ImportData", params), record(2, "Transform")],
        };

        let rows = definition.to_rows();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].key, "source");
        assert_eq!(rows[1].value, "a");
        assert_eq!(rows[2].value, "b");
        // Parameterless step keeps a placeholder row
        assert_eq!(rows[3].step, 2);
        assert_eq!(rows[3].key, "");
    }

    #[test]
    fn test_kind_attribute_parsing() {
        assert_eq!(StepKind::from_attribute("data"), Some(StepKind::Data));
        assert_eq!(StepKind::from_attribute("VISUALIZATION"), Some(StepKind::Visualization));
        assert_eq!(StepKind::from_attribute("Export"), Some(StepKind::Export));
        assert_eq!(StepKind::from_attribute("OPERATION"), None);
    }
}
