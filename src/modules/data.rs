// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 statpipe contributors

//! Data-kind modules
//!
//! Chained steps that import or reshape tabular data inside the
//! compute session. Each builds a textual command and submits it; the
//! session owns all numeric work.

use async_trait::async_trait;

use crate::errors::{StatpipeError, StatpipeResult};
use crate::params::ParameterBag;
use crate::workflow::StepKind;

use super::{require, RunContext, StepModule};

/// Quote a string for interpolation into an R single-quoted literal
pub(crate) fn r_quote(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Import a table from a delimited file or a SQLite database
///
/// Parameters: `source` (csv|tsv|sqlite), `path`, `tableName` (source
/// table, sqlite only), `newTableName` (default `t_data`).
pub struct ImportData;

#[async_trait]
impl StepModule for ImportData {
    fn name(&self) -> &'static str {
        "ImportData"
    }

    fn kind(&self) -> StepKind {
        StepKind::Data
    }

    fn check_parameters(&self, params: &ParameterBag, step: u32) -> StatpipeResult<()> {
        let source = require(params, "source", self.name(), step)?;
        require(params, "path", self.name(), step)?;

        match source.to_ascii_lowercase().as_str() {
            "csv" | "tsv" => Ok(()),
            "sqlite" => {
                require(params, "tableName", self.name(), step)?;
                Ok(())
            }
            other => Err(StatpipeError::step_failed(
                self.name(),
                step,
                format!("unsupported source '{}', expected csv, tsv or sqlite", other),
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

        let source = require(params, "source", self.name(), step)?;
        let path = r_quote(require(params, "path", self.name(), step)?);
        let target = params.get_single("newTableName").unwrap_or("t_data");

        let command = match source.to_ascii_lowercase().as_str() {
            "csv" => format!(
                "{target} <- read.csv('{path}', header=TRUE, stringsAsFactors=FALSE)"
            ),
            "tsv" => format!(
                "{target} <- read.delim('{path}', header=TRUE, stringsAsFactors=FALSE)"
            ),
            _ => {
                let table = r_quote(require(params, "tableName", self.name(), step)?);
                format!(
                    "conn <- DBI::dbConnect(RSQLite::SQLite(), '{path}')\n\
                     {target} <- DBI::dbReadTable(conn, '{table}')\n\
                     DBI::dbDisconnect(conn)"
                )
            }
        };

        ctx.session.run(&command, self.name(), step).await
    }
}

/// Apply a column-wise transformation to a table
///
/// Parameters: `tableName`, `method` (log2|ln|log10|medianCenter),
/// `newTableName` (default: in place).
pub struct Transform;

#[async_trait]
impl StepModule for Transform {
    fn name(&self) -> &'static str {
        "Transform"
    }

    fn kind(&self) -> StepKind {
        StepKind::Data
    }

    fn check_parameters(&self, params: &ParameterBag, step: u32) -> StatpipeResult<()> {
        require(params, "tableName", self.name(), step)?;
        let method = require(params, "method", self.name(), step)?;

        match method {
            "log2" | "ln" | "log10" | "medianCenter" => Ok(()),
            other => Err(StatpipeError::step_failed(
                self.name(),
                step,
                format!("unknown method '{}', expected log2, ln, log10 or medianCenter", other),
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
        let method = require(params, "method", self.name(), step)?;
        let target = params.get_single("newTableName").unwrap_or(table);

        let command = match method {
            "log2" => format!("{target} <- log2({table})"),
            "ln" => format!("{target} <- log({table})"),
            "log10" => format!("{target} <- log10({table})"),
            _ => format!(
                "{target} <- sweep({table}, 2, apply({table}, 2, median, na.rm=TRUE))"
            ),
        };

        ctx.session.run(&command, self.name(), step).await
    }
}

/// Keep only the rows of a table that satisfy a filter expression
///
/// Parameters: `tableName`, `filter`, `newTableName` (default: in
/// place). The filter is passed through verbatim.
pub struct FilterTable;

#[async_trait]
impl StepModule for FilterTable {
    fn name(&self) -> &'static str {
        "FilterTable"
    }

    fn kind(&self) -> StepKind {
        StepKind::Data
    }

    fn check_parameters(&self, params: &ParameterBag, step: u32) -> StatpipeResult<()> {
        require(params, "tableName", self.name(), step)?;
        require(params, "filter", self.name(), step)?;
        Ok(())
    }

    async fn run(
        &self,
        params: &ParameterBag,
        step: u32,
        ctx: &RunContext<'_>,
    ) -> StatpipeResult<()> {
        self.check_parameters(params, step)?;

        let table = require(params, "tableName", self.name(), step)?;
        let filter = require(params, "filter", self.name(), step)?;
        let target = params.get_single("newTableName").unwrap_or(table);

        let command = format!("{target} <- subset({table}, {filter})");
        ctx.session.run(&command, self.name(), step).await
    }
}

/// Join two tables on a shared column
///
/// Parameters: `xTable`, `yTable`, `byColumn`, `newTableName`
/// (default `t_merged`), `allX`/`allY` (default TRUE/FALSE).
pub struct Merge;

#[async_trait]
impl StepModule for Merge {
    fn name(&self) -> &'static str {
        "Merge"
    }

    fn kind(&self) -> StepKind {
        StepKind::Data
    }

    fn check_parameters(&self, params: &ParameterBag, step: u32) -> StatpipeResult<()> {
        require(params, "xTable", self.name(), step)?;
        require(params, "yTable", self.name(), step)?;
        require(params, "byColumn", self.name(), step)?;
        Ok(())
    }

    async fn run(
        &self,
        params: &ParameterBag,
        step: u32,
        ctx: &RunContext<'_>,
    ) -> StatpipeResult<()> {
        self.check_parameters(params, step)?;

        let x = require(params, "xTable", self.name(), step)?;
        let y = require(params, "yTable", self.name(), step)?;
        let by = r_quote(require(params, "byColumn", self.name(), step)?);
        let target = params.get_single("newTableName").unwrap_or("t_merged");
        let all_x = params.get_single("allX").unwrap_or("TRUE");
        let all_y = params.get_single("allY").unwrap_or("FALSE");

        let command = format!(
            "{target} <- merge(x={x}, y={y}, by='{by}', all.x={all_x}, all.y={all_y})"
        );
        ctx.session.run(&command, self.name(), step).await
    }
}

/// Group a table and summarize each group
///
/// Parameters: `tableName`, `groupBy` (repeatable for multi-column
/// grouping), `function` (mean|median|sum), `newTableName` (default
/// `t_aggregate`).
pub struct Aggregate;

#[async_trait]
impl StepModule for Aggregate {
    fn name(&self) -> &'static str {
        "Aggregate"
    }

    fn kind(&self) -> StepKind {
        StepKind::Data
    }

    fn check_parameters(&self, params: &ParameterBag, step: u32) -> StatpipeResult<()> {
        require(params, "tableName", self.name(), step)?;
        require(params, "groupBy", self.name(), step)?;
        let function = require(params, "function", self.name(), step)?;

        match function {
            "mean" | "median" | "sum" => Ok(()),
            other => Err(StatpipeError::step_failed(
                self.name(),
                step,
                format!("unknown function '{}', expected mean, median or sum", other),
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
        let function = require(params, "function", self.name(), step)?;
        let target = params.get_single("newTableName").unwrap_or("t_aggregate");

        // A repeated groupBy key groups by several columns.
        let group_by = params
            .get("groupBy")
            .map(|v| v.as_slice().join(" + "))
            .unwrap_or_default();

        let command = format!(
            "{target} <- aggregate(. ~ {group_by}, data={table}, FUN={function})"
        );
        ctx.session.run(&command, self.name(), step).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::engine::session::ComputeSession;
    use std::sync::Mutex;

    pub(crate) struct RecordingSession {
        pub commands: Mutex<Vec<String>>,
    }

    impl RecordingSession {
        pub(crate) fn new() -> Self {
            Self { commands: Mutex::new(Vec::new()) }
        }

        pub(crate) fn recorded(&self) -> Vec<String> {
            self.commands.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ComputeSession for RecordingSession {
        async fn run(&self, command: &str, _label: &str, _step: u32) -> StatpipeResult<()> {
            self.commands.lock().unwrap().push(command.to_string());
            Ok(())
        }

        fn handle(&self) -> &str {
            "sp_test"
        }
    }

    fn bag(pairs: &[(&str, &str)]) -> ParameterBag {
        let mut bag = ParameterBag::new();
        for (k, v) in pairs {
            bag.append(*k, *v);
        }
        bag
    }

    #[tokio::test]
    async fn test_import_csv_command() {
        let session = RecordingSession::new();
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext { session: &session, work_dir: dir.path() };

        let params = bag(&[("source", "csv"), ("path", "a.csv")]);
        ImportData.run(&params, 1, &ctx).await.unwrap();

        let commands = session.recorded();
        assert_eq!(commands.len(), 1);
        assert!(commands[0].starts_with("t_data <- read.csv('a.csv'"));
    }

    #[tokio::test]
    async fn test_import_sqlite_requires_table_name() {
        let session = RecordingSession::new();
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext { session: &session, work_dir: dir.path() };

        let params = bag(&[("source", "sqlite"), ("path", "d.db")]);
        let err = ImportData.run(&params, 2, &ctx).await.unwrap_err();
        assert!(matches!(
            err,
            StatpipeError::MissingParameter { step: 2, .. }
        ));
        assert!(session.recorded().is_empty());
    }

    #[test]
    fn test_transform_rejects_unknown_method() {
        let params = bag(&[("tableName", "t_data"), ("method", "sqrt")]);
        assert!(Transform.check_parameters(&params, 2).is_err());
    }

    #[tokio::test]
    async fn test_transform_in_place_by_default() {
        let session = RecordingSession::new();
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext { session: &session, work_dir: dir.path() };

        let params = bag(&[("tableName", "t_data"), ("method", "log2")]);
        Transform.run(&params, 2, &ctx).await.unwrap();

        assert_eq!(session.recorded(), vec!["t_data <- log2(t_data)".to_string()]);
    }

    #[tokio::test]
    async fn test_aggregate_multi_group_columns() {
        let session = RecordingSession::new();
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext { session: &session, work_dir: dir.path() };

        let params = bag(&[
            ("tableName", "t_data"),
            ("groupBy", "batch"),
            ("groupBy", "dose"),
            ("function", "mean"),
        ]);
        Aggregate.run(&params, 3, &ctx).await.unwrap();

        let commands = session.recorded();
        assert!(commands[0].contains("~ batch + dose"));
        assert!(commands[0].contains("FUN=mean"));
    }

    #[test]
    fn test_r_quote_escapes() {
        assert_eq!(r_quote("it's"), "it\\'s");
        assert_eq!(r_quote("a\\b"), "a\\\\b");
    }
}
