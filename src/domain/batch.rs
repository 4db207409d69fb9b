//! Independent runs fanned out across threads.
//!
//! Each run owns its simulator, ledger and random source. Results come back
//! in trial (or value) order whatever the thread count.

use std::str::FromStr;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;

use super::bar::BarSeries;
use super::config::SimulationConfig;
use super::engine::run_simulation;
use super::error::SimError;
use super::metrics::Summary;

/// Seed for trial `trial` of a batch started from `master_seed`.
pub fn trial_seed(master_seed: u64, trial: usize) -> u64 {
    master_seed.wrapping_add(trial as u64)
}

/// Order statistics of one metric across trials.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Distribution {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub p05: f64,
    pub p95: f64,
}

impl Distribution {
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Distribution {
                min: 0.0,
                max: 0.0,
                mean: 0.0,
                median: 0.0,
                p05: 0.0,
                p95: 0.0,
            };
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        Distribution {
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            mean: sorted.iter().sum::<f64>() / sorted.len() as f64,
            median: percentile_sorted(&sorted, 50.0),
            p05: percentile_sorted(&sorted, 5.0),
            p95: percentile_sorted(&sorted, 95.0),
        }
    }
}

/// Linear interpolation between closest ranks.
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n == 1 {
        return sorted[0];
    }
    let rank = (p / 100.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = rank - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrialOutcome {
    pub trial: usize,
    pub seed: u64,
    pub summary: Summary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonteCarloReport {
    pub trials: Vec<TrialOutcome>,
    pub final_balance: Distribution,
    pub max_drawdown: Distribution,
    pub ambiguous: Distribution,
    pub sharpe: Distribution,
}

/// Re-run the same series `trials` times with independently seeded coin flips.
pub fn monte_carlo(
    series: &BarSeries,
    config: &SimulationConfig,
    trials: usize,
    master_seed: u64,
) -> Result<MonteCarloReport, SimError> {
    if trials == 0 {
        return Err(SimError::invalid(
            "simulation",
            "trials",
            "trials must be at least 1",
        ));
    }
    config.validate()?;
    tracing::info!(trials, master_seed, "monte carlo started");

    let outcomes = (0..trials)
        .into_par_iter()
        .map(|trial| -> Result<TrialOutcome, SimError> {
            let seed = trial_seed(master_seed, trial);
            let result = run_simulation(series, config, StdRng::seed_from_u64(seed))?;
            Ok(TrialOutcome {
                trial,
                seed,
                summary: Summary::compute(&result.ledger, config),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let column = |f: fn(&Summary) -> f64| -> Distribution {
        let values: Vec<f64> = outcomes.iter().map(|o| f(&o.summary)).collect();
        Distribution::from_values(&values)
    };
    let report = MonteCarloReport {
        final_balance: column(|s| s.final_balance),
        max_drawdown: column(|s| s.max_drawdown),
        ambiguous: column(|s| s.ambiguous as f64),
        sharpe: column(|s| s.sharpe_ratio),
        trials: outcomes,
    };
    tracing::info!(
        median_balance = report.final_balance.median,
        p05 = report.final_balance.p05,
        p95 = report.final_balance.p95,
        "monte carlo finished"
    );
    Ok(report)
}

/// A numeric parameter that a sweep can vary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepParam {
    Leverage,
    MaxRisk,
    FeeRate,
    TriggerMultiplier,
    StopAtrMultiplier,
    TargetAtrMultiplier,
    MaxWaitBars,
    TargetReturn,
}

impl SweepParam {
    pub const NAMES: [&'static str; 8] = [
        "leverage",
        "max_risk",
        "fee_rate",
        "trigger_multiplier",
        "stop_atr_multiplier",
        "target_atr_multiplier",
        "max_wait_bars",
        "target_return",
    ];

    pub fn name(self) -> &'static str {
        match self {
            SweepParam::Leverage => "leverage",
            SweepParam::MaxRisk => "max_risk",
            SweepParam::FeeRate => "fee_rate",
            SweepParam::TriggerMultiplier => "trigger_multiplier",
            SweepParam::StopAtrMultiplier => "stop_atr_multiplier",
            SweepParam::TargetAtrMultiplier => "target_atr_multiplier",
            SweepParam::MaxWaitBars => "max_wait_bars",
            SweepParam::TargetReturn => "target_return",
        }
    }

    /// Copy of `base` with this parameter set to `value`.
    pub fn apply(self, base: &SimulationConfig, value: f64) -> Result<SimulationConfig, SimError> {
        let mut config = base.clone();
        match self {
            SweepParam::Leverage => config.leverage = value,
            SweepParam::MaxRisk => config.max_risk = value,
            SweepParam::FeeRate => config.fee_rate = value,
            SweepParam::TriggerMultiplier => config.trigger_multiplier = value,
            SweepParam::StopAtrMultiplier => config.stop_atr_multiplier = value,
            SweepParam::TargetAtrMultiplier => config.target_atr_multiplier = value,
            SweepParam::TargetReturn => config.target_return = value,
            SweepParam::MaxWaitBars => {
                if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
                    return Err(SimError::invalid(
                        "entry",
                        "max_wait_bars",
                        format!("max_wait_bars must be a whole number, got {value}"),
                    ));
                }
                config.max_wait_bars = value as usize;
            }
        }
        Ok(config)
    }
}

impl std::fmt::Display for SweepParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SweepParam {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        [
            SweepParam::Leverage,
            SweepParam::MaxRisk,
            SweepParam::FeeRate,
            SweepParam::TriggerMultiplier,
            SweepParam::StopAtrMultiplier,
            SweepParam::TargetAtrMultiplier,
            SweepParam::MaxWaitBars,
            SweepParam::TargetReturn,
        ]
        .into_iter()
        .find(|p| p.name() == wanted)
        .ok_or_else(|| {
            format!(
                "unknown sweep parameter '{s}', expected one of {}",
                Self::NAMES.join(", ")
            )
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepPoint {
    pub value: f64,
    pub summary: Summary,
}

/// One run per value of `param`, all sharing `seed`.
pub fn sweep(
    series: &BarSeries,
    base: &SimulationConfig,
    param: SweepParam,
    values: &[f64],
    seed: u64,
) -> Result<Vec<SweepPoint>, SimError> {
    tracing::info!(%param, points = values.len(), "sweep started");
    values
        .par_iter()
        .map(|&value| -> Result<SweepPoint, SimError> {
            let config = param.apply(base, value)?;
            let result = run_simulation(series, &config, StdRng::seed_from_u64(seed))?;
            Ok(SweepPoint {
                value,
                summary: Summary::compute(&result.ledger, &config),
            })
        })
        .collect()
}
