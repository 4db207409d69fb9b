//! Run report port trait.

use crate::domain::batch::{MonteCarloReport, SweepPoint};
use crate::domain::engine::SimulationResult;
use crate::domain::error::SimError;
use crate::domain::metrics::Summary;

/// Port for persisting the outputs of a run.
pub trait ReportPort {
    fn write_run(&self, result: &SimulationResult, summary: &Summary) -> Result<(), SimError>;

    fn write_monte_carlo(&self, report: &MonteCarloReport) -> Result<(), SimError>;

    fn write_sweep(&self, param: &str, points: &[SweepPoint]) -> Result<(), SimError>;
}
