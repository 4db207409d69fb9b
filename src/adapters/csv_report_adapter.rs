//! CSV report adapter implementing ReportPort.
//!
//! Writes one file per table into an output directory:
//! `trades.csv`, `equity.csv` and `summary.csv` for a single run,
//! `trials.csv` and `distribution.csv` for Monte Carlo, `sweep.csv` for sweeps.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::domain::batch::{Distribution, MonteCarloReport, SweepPoint};
use crate::domain::engine::SimulationResult;
use crate::domain::error::SimError;
use crate::domain::metrics::Summary;
use crate::ports::report_port::ReportPort;

pub struct CsvReportAdapter {
    dir: PathBuf,
}

#[derive(Serialize)]
struct SummaryRow<'a> {
    key: &'a str,
    value: f64,
}

#[derive(Serialize)]
struct TrialRow {
    trial: usize,
    seed: u64,
    final_balance: f64,
    max_drawdown: f64,
    total_trades: usize,
    ambiguous: usize,
    sharpe_ratio: f64,
}

#[derive(Serialize)]
struct DistributionRow<'a> {
    metric: &'a str,
    min: f64,
    max: f64,
    mean: f64,
    median: f64,
    p05: f64,
    p95: f64,
}

impl<'a> DistributionRow<'a> {
    fn new(metric: &'a str, d: Distribution) -> Self {
        DistributionRow {
            metric,
            min: d.min,
            max: d.max,
            mean: d.mean,
            median: d.median,
            p05: d.p05,
            p95: d.p95,
        }
    }
}

#[derive(Serialize)]
struct SweepRow<'a> {
    param: &'a str,
    value: f64,
    final_balance: f64,
    total_return: f64,
    max_drawdown: f64,
    total_trades: usize,
    win_rate: f64,
    ambiguous: usize,
    sharpe_ratio: f64,
}

impl CsvReportAdapter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_rows<T: Serialize>(
        &self,
        file: &str,
        rows: impl IntoIterator<Item = T>,
    ) -> Result<(), SimError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(file);
        let mut writer = csv::Writer::from_path(&path)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        tracing::debug!(path = %path.display(), "wrote report");
        Ok(())
    }
}

impl ReportPort for CsvReportAdapter {
    fn write_run(&self, result: &SimulationResult, summary: &Summary) -> Result<(), SimError> {
        self.write_rows("trades.csv", result.trades())?;
        self.write_rows("equity.csv", result.equity_curve())?;

        let mut values = summary.to_map();
        values.insert("open_position", f64::from(u8::from(result.open_position.is_some())));
        values.insert("pending_entry", f64::from(u8::from(result.pending_entry.is_some())));
        values.insert("diagnostics", result.diagnostics.len() as f64);
        self.write_rows(
            "summary.csv",
            values.into_iter().map(|(key, value)| SummaryRow { key, value }),
        )
    }

    fn write_monte_carlo(&self, report: &MonteCarloReport) -> Result<(), SimError> {
        self.write_rows(
            "trials.csv",
            report.trials.iter().map(|t| TrialRow {
                trial: t.trial,
                seed: t.seed,
                final_balance: t.summary.final_balance,
                max_drawdown: t.summary.max_drawdown,
                total_trades: t.summary.total_trades,
                ambiguous: t.summary.ambiguous,
                sharpe_ratio: t.summary.sharpe_ratio,
            }),
        )?;
        self.write_rows(
            "distribution.csv",
            [
                ("final_balance", report.final_balance),
                ("max_drawdown", report.max_drawdown),
                ("ambiguous", report.ambiguous),
                ("sharpe_ratio", report.sharpe),
            ]
            .into_iter()
            .map(|(metric, distribution)| DistributionRow::new(metric, distribution)),
        )
    }

    fn write_sweep(&self, param: &str, points: &[SweepPoint]) -> Result<(), SimError> {
        self.write_rows(
            "sweep.csv",
            points.iter().map(|p| SweepRow {
                param,
                value: p.value,
                final_balance: p.summary.final_balance,
                total_return: p.summary.total_return,
                max_drawdown: p.summary.max_drawdown,
                total_trades: p.summary.total_trades,
                win_rate: p.summary.win_rate,
                ambiguous: p.summary.ambiguous,
                sharpe_ratio: p.summary.sharpe_ratio,
            }),
        )
    }
}
