// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 statpipe contributors

//! Workflow persistence
//!
//! Reads and writes a [`WorkflowDefinition`] in two forms: the
//! hierarchical markup form (an XML document of `<Module>` elements
//! with nested `<Parameter>` entries) and the flat table form (a
//! four-column SQLite table, one row per step/parameter pair). All I/O
//! faults come back as error values.

use std::path::Path;

use crate::errors::{StatpipeError, StatpipeResult};
use crate::params::ParameterBag;
use crate::storage::{SqliteStore, TableColumn, TableData, TableStore};
use crate::workflow::{ParameterRow, StepKind, StepRecord, WorkflowDefinition};

/// Default name of the workflow table in the table form
pub const DEFAULT_WORKFLOW_TABLE: &str = "t_workflow";

/// The two persisted workflow forms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowFormat {
    /// Hierarchical markup (.xml)
    Xml,
    /// Flat relational table (.db, .db3, .sqlite)
    Sqlite,
}

impl WorkflowFormat {
    /// Resolve a format from a file extension
    pub fn from_path(path: &Path) -> StatpipeResult<Self> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "xml" => Ok(Self::Xml),
            "db" | "db3" | "sqlite" => Ok(Self::Sqlite),
            _ => Err(StatpipeError::UnknownFormat { path: path.to_path_buf() }),
        }
    }
}

impl std::str::FromStr for WorkflowFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "xml" => Ok(Self::Xml),
            "sqlite" | "db" => Ok(Self::Sqlite),
            _ => Err(format!("Unknown workflow format: {}", s)),
        }
    }
}

/// Reads and writes workflow definitions
pub struct WorkflowStore {
    table_name: String,
}

impl Default for WorkflowStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowStore {
    pub fn new() -> Self {
        Self { table_name: DEFAULT_WORKFLOW_TABLE.to_string() }
    }

    /// Override the workflow table name used by the table form
    pub fn with_table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Load a definition, resolving the format from the extension when
    /// not given explicitly
    pub fn load(
        &self,
        source: &Path,
        format: Option<WorkflowFormat>,
    ) -> StatpipeResult<WorkflowDefinition> {
        let format = match format {
            Some(f) => f,
            None => WorkflowFormat::from_path(source)?,
        };

        match format {
            WorkflowFormat::Xml => self.load_xml(source),
            WorkflowFormat::Sqlite => self.load_sqlite(source),
        }
    }

    /// Save a definition, resolving the format from the extension when
    /// not given explicitly
    pub fn save(
        &self,
        definition: &WorkflowDefinition,
        destination: &Path,
        format: Option<WorkflowFormat>,
    ) -> StatpipeResult<()> {
        let format = match format {
            Some(f) => f,
            None => WorkflowFormat::from_path(destination)?,
        };

        match format {
            WorkflowFormat::Xml => self.save_xml(definition, destination),
            WorkflowFormat::Sqlite => self.save_sqlite(definition, destination),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Markup form
    // ─────────────────────────────────────────────────────────────────────────

    fn load_xml(&self, source: &Path) -> StatpipeResult<WorkflowDefinition> {
        if !source.exists() {
            return Err(StatpipeError::WorkflowNotFound { path: source.to_path_buf() });
        }

        let text = std::fs::read_to_string(source).map_err(|e| StatpipeError::FileReadError {
            path: source.to_path_buf(),
            error: e.to_string(),
        })?;

        let doc = roxmltree::Document::parse(&text).map_err(|e| StatpipeError::Xml {
            path: source.to_path_buf(),
            message: e.to_string(),
        })?;

        let xml_err = |message: String| StatpipeError::Xml {
            path: source.to_path_buf(),
            message,
        };

        let mut definition = WorkflowDefinition::new();

        for node in doc
            .root_element()
            .children()
            .filter(|n| n.is_element() && n.has_tag_name("Module"))
        {
            let type_attr = node
                .attribute("Type")
                .ok_or_else(|| xml_err("<Module> element is missing the Type attribute".into()))?;
            let kind = StepKind::from_attribute(type_attr)
                .ok_or_else(|| xml_err(format!("unknown module Type '{}'", type_attr)))?;

            let name = node
                .attribute("Name")
                .ok_or_else(|| xml_err("<Module> element is missing the Name attribute".into()))?;

            let step_attr = node
                .attribute("Step")
                .ok_or_else(|| xml_err(format!("module '{}' is missing the Step attribute", name)))?;
            let number: u32 = step_attr.trim().parse().map_err(|_| {
                xml_err(format!("module '{}' has non-numeric Step '{}'", name, step_attr))
            })?;

            // A repeated key accumulates as an ordered list, never
            // overwrites.
            let mut params = ParameterBag::new();
            for entry in node
                .children()
                .filter(|n| n.is_element() && n.has_tag_name("Parameter"))
            {
                let key = entry.attribute("key").ok_or_else(|| {
                    xml_err(format!("parameter of step {} is missing the key attribute", number))
                })?;
                let value = entry.attribute("value").ok_or_else(|| {
                    xml_err(format!("parameter '{}' of step {} has no value attribute", key, number))
                })?;
                params.append(key, value);
            }

            definition
                .steps
                .push(StepRecord::new(number, name, params).with_kind(kind));
        }

        Ok(definition)
    }

    fn save_xml(&self, definition: &WorkflowDefinition, destination: &Path) -> StatpipeResult<()> {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<Workflow>\n");

        for record in &definition.steps {
            let kind = record.declared_kind.unwrap_or_else(|| {
                tracing::debug!(module = %record.module, step = record.number,
                    "step record has no declared kind; writing as DATA");
                StepKind::Data
            });

            out.push_str(&format!(
                "   <Module Type=\"{}\" Name=\"{}\" Step=\"{}\">\n",
                kind.attribute_value(),
                escape_xml(&record.module),
                record.number
            ));

            for (key, value) in record.params.flat_pairs() {
                out.push_str(&format!(
                    "      <Parameter key=\"{}\" value=\"{}\" />\n",
                    escape_xml(key),
                    escape_xml(value)
                ));
            }

            out.push_str("   </Module>\n");
        }

        out.push_str("</Workflow>\n");

        std::fs::write(destination, out).map_err(|e| StatpipeError::FileWriteError {
            path: destination.to_path_buf(),
            error: e.to_string(),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Table form
    // ─────────────────────────────────────────────────────────────────────────

    fn load_sqlite(&self, source: &Path) -> StatpipeResult<WorkflowDefinition> {
        let store = SqliteStore::open(source)?;

        if !store.has_table(&self.table_name)? {
            return Err(StatpipeError::invalid(format!(
                "workflow table '{}' not found in '{}'",
                self.table_name,
                source.display()
            )));
        }

        let table = store.read_table(&self.table_name)?;
        let rows = Self::parameter_rows(&table, source)?;
        self.assemble_from_rows(&rows, &source.display().to_string())
    }

    fn parameter_rows(table: &TableData, source: &Path) -> StatpipeResult<Vec<ParameterRow>> {
        let step_idx = table.column_index("Step");
        let module_idx = table.column_index("Module");
        let key_idx = table.column_index("Parameter");
        let value_idx = table.column_index("Value");

        let (Some(step_idx), Some(module_idx), Some(key_idx), Some(value_idx)) =
            (step_idx, module_idx, key_idx, value_idx)
        else {
            return Err(StatpipeError::invalid(format!(
                "workflow table in '{}' must have Step, Module, Parameter and Value columns",
                source.display()
            )));
        };

        let mut rows = Vec::with_capacity(table.rows.len());
        for cells in &table.rows {
            let raw_step = cells[step_idx].trim();
            // Rows with a blank step are ignored, matching the lenient
            // reader in the original tool.
            if raw_step.is_empty() {
                continue;
            }
            let step: u32 = raw_step.parse().map_err(|_| {
                StatpipeError::invalid(format!(
                    "non-numeric Step value '{}' in workflow table of '{}'",
                    raw_step,
                    source.display()
                ))
            })?;

            rows.push(ParameterRow {
                step,
                module: cells[module_idx].clone(),
                key: cells[key_idx].clone(),
                value: cells[value_idx].clone(),
            });
        }

        Ok(rows)
    }

    /// Group flat rows into step records and enforce contiguity
    ///
    /// All rows of one step must name one module; a mismatch is logged
    /// as a warning and the first row wins.
    fn assemble_from_rows(
        &self,
        rows: &[ParameterRow],
        source: &str,
    ) -> StatpipeResult<WorkflowDefinition> {
        let max_step = rows.iter().map(|r| r.step).max().unwrap_or(0);

        let mut definition = WorkflowDefinition::new();
        for number in 1..=max_step {
            let group: Vec<&ParameterRow> = rows.iter().filter(|r| r.step == number).collect();
            let Some(first) = group.first() else {
                return Err(StatpipeError::MissingStep { step: number, workflow: source.to_string() });
            };

            let module = first.module.clone();
            for row in &group {
                if !row.module.eq_ignore_ascii_case(&module) {
                    tracing::warn!(
                        step = number,
                        expected = %module,
                        found = %row.module,
                        source,
                        "step maps to multiple modules; keeping the first"
                    );
                }
            }

            let mut params = ParameterBag::new();
            for row in &group {
                if row.key.is_empty() {
                    continue;
                }
                params.append(row.key.clone(), row.value.clone());
            }

            definition.steps.push(StepRecord::new(number, module, params));
        }

        Ok(definition)
    }

    fn save_sqlite(&self, definition: &WorkflowDefinition, destination: &Path) -> StatpipeResult<()> {
        let store = SqliteStore::create(destination)?;

        let mut table = TableData::new(
            &self.table_name,
            vec![
                TableColumn::integer("Step"),
                TableColumn::text("Module"),
                TableColumn::text("Parameter"),
                TableColumn::text("Value"),
            ],
        );

        for row in definition.to_rows() {
            table
                .rows
                .push(vec![row.step.to_string(), row.module, row.key, row.value]);
        }

        store.write_table(&table)
    }
}

/// Escape a string for use in an XML attribute value
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
