//! Simulation parameters.
//!
//! Every run owns its own `SimulationConfig`; nothing is read from globals.

use super::ambiguity::AmbiguityPolicy;
use super::error::SimError;
use super::position::LevelPolicy;

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SimulationConfig {
    pub initial_balance: f64,
    pub leverage: f64,
    /// Loss per trade, as a fraction of capital, for fixed-fraction stops.
    pub max_risk: f64,
    /// Charged on the whole balance at entry and on the leveraged notional at exit.
    pub fee_rate: f64,
    /// Volatility multiple for limit entries; 0 enters at the signal bar's close.
    pub trigger_multiplier: f64,
    pub stop_atr_multiplier: f64,
    pub target_atr_multiplier: f64,
    pub max_wait_bars: usize,
    /// Gain per trade, as a fraction of capital, for fixed-fraction targets.
    pub target_return: f64,
    pub ambiguity: AmbiguityPolicy,
    pub risk_free_rate: f64,
    /// Trades per year used to annualize the per-trade Sharpe ratio.
    pub periods_per_year: Option<f64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            initial_balance: 100.0,
            leverage: 5.0,
            max_risk: 0.05,
            fee_rate: 0.001,
            trigger_multiplier: 2.0,
            stop_atr_multiplier: 0.0,
            target_atr_multiplier: 0.0,
            max_wait_bars: 5,
            target_return: 0.1,
            ambiguity: AmbiguityPolicy::CoinFlip,
            risk_free_rate: 0.0,
            periods_per_year: None,
        }
    }
}

impl SimulationConfig {
    /// ATR-based levels when both multipliers are set, fixed-fraction otherwise.
    pub fn level_policy(&self) -> LevelPolicy {
        if self.stop_atr_multiplier != 0.0 && self.target_atr_multiplier != 0.0 {
            LevelPolicy::Atr {
                stop_multiplier: self.stop_atr_multiplier,
                target_multiplier: self.target_atr_multiplier,
            }
        } else {
            LevelPolicy::FixedFraction {
                max_risk: self.max_risk,
                target_return: self.target_return,
                leverage: self.leverage,
            }
        }
    }

    pub fn uses_limit_entries(&self) -> bool {
        self.trigger_multiplier != 0.0
    }

    pub fn validate(&self) -> Result<(), SimError> {
        let finite = [
            ("account", "initial_balance", self.initial_balance),
            ("account", "leverage", self.leverage),
            ("account", "fee_rate", self.fee_rate),
            ("exits", "max_risk", self.max_risk),
            ("exits", "target_return", self.target_return),
            ("entry", "trigger_multiplier", self.trigger_multiplier),
            ("exits", "stop_atr_multiplier", self.stop_atr_multiplier),
            ("exits", "target_atr_multiplier", self.target_atr_multiplier),
            ("report", "risk_free_rate", self.risk_free_rate),
        ];
        for (section, key, value) in finite {
            if !value.is_finite() {
                return Err(SimError::invalid(section, key, format!("{key} must be finite")));
            }
        }

        if self.initial_balance <= 0.0 {
            return Err(SimError::invalid(
                "account",
                "initial_balance",
                "initial_balance must be positive",
            ));
        }
        if self.leverage <= 0.0 {
            return Err(SimError::invalid(
                "account",
                "leverage",
                "leverage must be positive",
            ));
        }
        if !(0.0..1.0).contains(&self.fee_rate) {
            return Err(SimError::invalid(
                "account",
                "fee_rate",
                "fee_rate must be in [0, 1)",
            ));
        }

        for (section, key, value) in [
            ("exits", "max_risk", self.max_risk),
            ("exits", "target_return", self.target_return),
            ("entry", "trigger_multiplier", self.trigger_multiplier),
            ("exits", "stop_atr_multiplier", self.stop_atr_multiplier),
            ("exits", "target_atr_multiplier", self.target_atr_multiplier),
        ] {
            if value < 0.0 {
                return Err(SimError::invalid(
                    section,
                    key,
                    format!("{key} must be non-negative"),
                ));
            }
        }

        if self.max_risk >= self.leverage {
            return Err(SimError::invalid(
                "exits",
                "max_risk",
                "max_risk must be below leverage or long stops fall to zero",
            ));
        }
        if self.target_return >= self.leverage {
            return Err(SimError::invalid(
                "exits",
                "target_return",
                "target_return must be below leverage or short targets fall to zero",
            ));
        }
        if self.uses_limit_entries() && self.max_wait_bars == 0 {
            return Err(SimError::invalid(
                "entry",
                "max_wait_bars",
                "max_wait_bars must be at least 1 when trigger_multiplier is set",
            ));
        }
        if let Some(periods) = self.periods_per_year {
            if !periods.is_finite() || periods <= 0.0 {
                return Err(SimError::invalid(
                    "report",
                    "periods_per_year",
                    "periods_per_year must be positive",
                ));
            }
        }

        if (self.stop_atr_multiplier == 0.0) != (self.target_atr_multiplier == 0.0) {
            tracing::warn!(
                stop = self.stop_atr_multiplier,
                target = self.target_atr_multiplier,
                "only one ATR multiplier set; using fixed-fraction stop and target"
            );
        }
        Ok(())
    }
}
