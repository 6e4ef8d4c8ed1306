// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 statpipe contributors

//! Visualization-kind modules
//!
//! Leaf attachments that render a plot of their parent Data step's
//! table. Plots land under `Plots/` in the work directory.

use async_trait::async_trait;
use std::path::Path;

use crate::errors::{StatpipeError, StatpipeResult};
use crate::params::ParameterBag;
use crate::workflow::StepKind;

use super::data::r_quote;
use super::{require, RunContext, StepModule};

/// Shared plot device settings with the engine's historical defaults
struct PlotDevice {
    file: String,
    width: String,
    height: String,
    resolution: String,
    background: String,
    font_size: String,
}

impl PlotDevice {
    fn from_params(params: &ParameterBag, module: &str, step: u32) -> Self {
        let file = params
            .get_single("plotFileName")
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_{}.png", module, step));

        Self {
            file,
            width: params.get_single("width").unwrap_or("1200").to_string(),
            height: params.get_single("height").unwrap_or("1200").to_string(),
            resolution: params.get_single("resolution").unwrap_or("600").to_string(),
            background: params.get_single("backgroundColor").unwrap_or("white").to_string(),
            font_size: params.get_single("fontSize").unwrap_or("12").to_string(),
        }
    }

    /// The `png(...)` device call opening this plot
    fn open_command(&self, work_dir: &Path) -> String {
        let path = work_dir
            .join("Plots")
            .join(&self.file)
            .to_string_lossy()
            .replace('\\', "/");

        format!(
            "png(filename='{}', width={}, height={}, res={}, bg='{}', pointsize={})",
            r_quote(&path),
            self.width,
            self.height,
            self.resolution,
            self.background,
            self.font_size
        )
    }
}

/// Create the `Plots/` directory if it does not exist yet
fn ensure_plots_directory(work_dir: &Path, module: &str, step: u32) -> StatpipeResult<()> {
    std::fs::create_dir_all(work_dir.join("Plots"))
        .map_err(|e| StatpipeError::step_failed(module, step, e.to_string()))
}

/// Render a plot: open the device, draw, close
async fn render(
    ctx: &RunContext<'_>,
    device: &PlotDevice,
    draw: &str,
    module: &str,
    step: u32,
) -> StatpipeResult<()> {
    ensure_plots_directory(ctx.work_dir, module, step)?;

    let command = format!("{}\n{}\ndev.off()", device.open_command(ctx.work_dir), draw);
    ctx.session.run(&command, module, step).await
}

/// Histogram of one column
///
/// Parameters: `tableName`, `column`; optional plot device settings and
/// `main`/`xLabel` captions.
pub struct Histogram;

#[async_trait]
impl StepModule for Histogram {
    fn name(&self) -> &'static str {
        "Histogram"
    }

    fn kind(&self) -> StepKind {
        StepKind::Visualization
    }

    fn check_parameters(&self, params: &ParameterBag, step: u32) -> StatpipeResult<()> {
        require(params, "tableName", self.name(), step)?;
        require(params, "column", self.name(), step)?;
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
        let column = require(params, "column", self.name(), step)?;
        let main = params.get_single("main").unwrap_or(column);
        let x_label = params.get_single("xLabel").unwrap_or(column);

        let draw = format!(
            "hist({table}${column}, main='{}', xlab='{}')",
            r_quote(main),
            r_quote(x_label)
        );

        let device = PlotDevice::from_params(params, self.name(), step);
        render(ctx, &device, &draw, self.name(), step).await
    }
}

/// Box plot of a whole table or one column
///
/// Parameters: `tableName`; optional `column` and plot device settings.
pub struct BoxPlot;

#[async_trait]
impl StepModule for BoxPlot {
    fn name(&self) -> &'static str {
        "BoxPlot"
    }

    fn kind(&self) -> StepKind {
        StepKind::Visualization
    }

    fn check_parameters(&self, params: &ParameterBag, step: u32) -> StatpipeResult<()> {
        require(params, "tableName", self.name(), step)?;
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
        let target = match params.get_single("column") {
            Some(column) => format!("{table}${column}"),
            None => table.to_string(),
        };

        let main = params.get_single("main").unwrap_or(table);
        let draw = format!("boxplot({target}, main='{}')", r_quote(main));

        let device = PlotDevice::from_params(params, self.name(), step);
        render(ctx, &device, &draw, self.name(), step).await
    }
}

/// Heatmap of a numeric table
///
/// Parameters: `tableName`; optional plot device settings.
pub struct Heatmap;

#[async_trait]
impl StepModule for Heatmap {
    fn name(&self) -> &'static str {
        "Heatmap"
    }

    fn kind(&self) -> StepKind {
        StepKind::Visualization
    }

    fn check_parameters(&self, params: &ParameterBag, step: u32) -> StatpipeResult<()> {
        require(params, "tableName", self.name(), step)?;
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
        let draw = format!("heatmap(as.matrix({table}))");

        let device = PlotDevice::from_params(params, self.name(), step);
        render(ctx, &device, &draw, self.name(), step).await
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
    async fn test_histogram_uses_device_defaults() {
        let session = RecordingSession::new();
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext { session: &session, work_dir: dir.path() };

        let params = bag(&[("tableName", "t_data"), ("column", "intensity")]);
        Histogram.run(&params, 2, &ctx).await.unwrap();

        let commands = session.recorded();
        assert!(commands[0].contains("width=1200"));
        assert!(commands[0].contains("res=600"));
        assert!(commands[0].contains("bg='white'"));
        assert!(commands[0].contains("hist(t_data$intensity"));
        assert!(commands[0].ends_with("dev.off()"));
        assert!(dir.path().join("Plots").is_dir());
    }

    #[tokio::test]
    async fn test_histogram_requires_column() {
        let session = RecordingSession::new();
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext { session: &session, work_dir: dir.path() };

        let params = bag(&[("tableName", "t_data")]);
        assert!(Histogram.run(&params, 2, &ctx).await.is_err());
        assert!(session.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_boxplot_whole_table_without_column() {
        let session = RecordingSession::new();
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext { session: &session, work_dir: dir.path() };

        let params = bag(&[("tableName", "t_data")]);
        BoxPlot.run(&params, 3, &ctx).await.unwrap();

        assert!(session.recorded()[0].contains("boxplot(t_data,"));
    }

    #[test]
    fn test_default_plot_file_name() {
        let params = bag(&[("tableName", "t_data")]);
        let device = PlotDevice::from_params(&params, "Heatmap", 4);
        assert_eq!(device.file, "Heatmap_4.png");
    }
}
