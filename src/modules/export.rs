// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 statpipe contributors

//! Export-kind modules
//!
//! Leaf attachments that persist an artifact after their parent Data
//! step. What they write stays written even if a later step fails.

use async_trait::async_trait;

use crate::errors::{StatpipeError, StatpipeResult};
use crate::params::ParameterBag;
use crate::workflow::StepKind;

use super::data::r_quote;
use super::{require, RunContext, StepModule};

/// Write a table out to a delimited file or a SQLite database
///
/// Parameters: `tableName`, `target` (csv|tsv|sqlite), `file`;
/// optional `newTableName` (sqlite destination table, defaults to
/// `tableName`).
pub struct ExportTable;

#[async_trait]
impl StepModule for ExportTable {
    fn name(&self) -> &'static str {
        "ExportTable"
    }

    fn kind(&self) -> StepKind {
        StepKind::Export
    }

    fn check_parameters(&self, params: &ParameterBag, step: u32) -> StatpipeResult<()> {
        require(params, "tableName", self.name(), step)?;
        require(params, "file", self.name(), step)?;
        let target = require(params, "target", self.name(), step)?;

        match target.to_ascii_lowercase().as_str() {
            "csv" | "tsv" | "sqlite" => Ok(()),
            other => Err(StatpipeError::step_failed(
                self.name(),
                step,
                format!("unsupported target '{}', expected csv, tsv or sqlite", other),
            )),
        }
    }

    async fn run(
        &self,
        params: &ParameterBag,
        step: u32,
        ctx: &RunContext<'_>,
    ) -> StatpipeResult<()> {
        self.check_parameters(params, step)?;

        let table = require(params, "tableName", self.name(), step)?;
        let target = require(params, "target", self.name(), step)?;
        let file = ctx
            .work_dir
            .join(require(params, "file", self.name(), step)?)
            .to_string_lossy()
            .replace('\\', "/");
        let file = r_quote(&file);

        let command = match target.to_ascii_lowercase().as_str() {
            "csv" => format!("write.csv({table}, file='{file}', row.names=FALSE)"),
            "tsv" => format!(
                "write.table({table}, file='{file}', sep='\\t', row.names=FALSE, quote=FALSE)"
            ),
            _ => {
                let destination = r_quote(params.get_single("newTableName").unwrap_or(table));
                format!(
                    "conn <- DBI::dbConnect(RSQLite::SQLite(), '{file}')\n\
                     DBI::dbWriteTable(conn, '{destination}', {table}, overwrite=TRUE)\n\
                     DBI::dbDisconnect(conn)"
                )
            }
        };

        ctx.session.run(&command, self.name(), step).await
    }
}

/// Persist the whole session image for later inspection
///
/// Parameters: optional `file` (default `Results.RData`).
pub struct SaveWorkspace;

#[async_trait]
impl StepModule for SaveWorkspace {
    fn name(&self) -> &'static str {
        "SaveWorkspace"
    }

    fn kind(&self) -> StepKind {
        StepKind::Export
    }

    fn check_parameters(&self, _params: &ParameterBag, _step: u32) -> StatpipeResult<()> {
        Ok(())
    }

    async fn run(
        &self,
        params: &ParameterBag,
        step: u32,
        ctx: &RunContext<'_>,
    ) -> StatpipeResult<()> {
        let file = ctx
            .work_dir
            .join(params.get_single("file").unwrap_or("Results.RData"))
            .to_string_lossy()
            .replace('\\', "/");

        let command = format!("save.image('{}')", r_quote(&file));
        ctx.session.run(&command, self.name(), step).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::data::tests::RecordingSession;
    use super::*;

    fn bag(pairs: &[(&str, &str)]) -> ParameterBag {
        let mut bag = ParameterBag::new();
        for (k, v) in pairs {
            bag.append(*k, *v);
        }
        bag
    }

    #[tokio::test]
    async fn test_export_csv_resolves_against_work_dir() {
        let session = RecordingSession::new();
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext { session: &session, work_dir: dir.path() };

        let params = bag(&[("tableName", "t_data"), ("target", "csv"), ("file", "out.csv")]);
        ExportTable.run(&params, 3, &ctx).await.unwrap();

        let commands = session.recorded();
        assert!(commands[0].starts_with("write.csv(t_data"));
        assert!(commands[0].contains("out.csv"));
    }

    #[test]
    fn test_export_rejects_unknown_target() {
        let params = bag(&[("tableName", "t_data"), ("target", "parquet"), ("file", "o")]);
        assert!(ExportTable.check_parameters(&params, 3).is_err());
    }

    #[tokio::test]
    async fn test_save_workspace_default_file() {
        let session = RecordingSession::new();
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext { session: &session, work_dir: dir.path() };

        SaveWorkspace.run(&ParameterBag::new(), 4, &ctx).await.unwrap();

        let commands = session.recorded();
        assert!(commands[0].starts_with("save.image("));
        assert!(commands[0].contains("Results.RData"));
    }
}
