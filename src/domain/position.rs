//! Open positions, stop/target levels and closed trades.

use chrono::NaiveDateTime;

use super::ambiguity::{AmbiguityPolicy, RandomSource};
use super::bar::{Bar, Direction};

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    /// Ambiguous bar closed at a price between the two levels.
    Blended,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "stop_loss"),
            ExitReason::TakeProfit => write!(f, "take_profit"),
            ExitReason::Blended => write!(f, "blended"),
        }
    }
}

/// Parameters that place the stop and target around an entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LevelPolicy {
    /// `entry ∓ atr * multiplier`.
    Atr {
        stop_multiplier: f64,
        target_multiplier: f64,
    },
    /// Risk and target expressed as fractions of capital, scaled by leverage.
    FixedFraction {
        max_risk: f64,
        target_return: f64,
        leverage: f64,
    },
}

impl LevelPolicy {
    pub fn needs_atr(&self) -> bool {
        matches!(self, LevelPolicy::Atr { .. })
    }

    /// Stop and target for an entry, or `None` when the ATR policy has no ATR.
    pub fn levels(&self, direction: Direction, entry: f64, atr: Option<f64>) -> Option<(f64, f64)> {
        let dir = direction.sign();
        match *self {
            LevelPolicy::Atr {
                stop_multiplier,
                target_multiplier,
            } => {
                let atr = atr?;
                Some((
                    entry - dir * atr * stop_multiplier,
                    entry + dir * atr * target_multiplier,
                ))
            }
            LevelPolicy::FixedFraction {
                max_risk,
                target_return,
                leverage,
            } => Some((
                entry * (1.0 - dir * max_risk / leverage),
                entry * (1.0 + dir * target_return / leverage),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenPosition {
    pub direction: Direction,
    pub entry_price: f64,
    pub entry_index: usize,
    pub entry_timestamp: Option<NaiveDateTime>,
    /// Capital base after the entry fee was debited.
    pub entry_balance: f64,
    pub entry_fee: f64,
    pub stop_price: f64,
    pub target_price: f64,
}

/// Result of checking one bar against an open position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BarOutcome {
    Hold,
    Exit {
        price: f64,
        reason: ExitReason,
        ambiguous: bool,
    },
}

impl OpenPosition {
    pub fn should_stop_loss(&self, bar_low: f64, bar_high: f64) -> bool {
        match self.direction {
            Direction::Long => bar_low <= self.stop_price,
            Direction::Short => bar_high >= self.stop_price,
        }
    }

    pub fn should_take_profit(&self, bar_low: f64, bar_high: f64) -> bool {
        match self.direction {
            Direction::Long => bar_high >= self.target_price,
            Direction::Short => bar_low <= self.target_price,
        }
    }

    /// Check the bar's range against stop and target.
    ///
    /// The random source is only consulted when both levels are touched.
    pub fn resolve_bar(
        &self,
        bar: &Bar,
        policy: AmbiguityPolicy,
        source: &mut dyn RandomSource,
    ) -> BarOutcome {
        let stop_hit = self.should_stop_loss(bar.low, bar.high);
        let target_hit = self.should_take_profit(bar.low, bar.high);
        match (stop_hit, target_hit) {
            (true, true) => {
                let (price, reason) = policy.resolve(self.stop_price, self.target_price, source);
                BarOutcome::Exit {
                    price,
                    reason,
                    ambiguous: true,
                }
            }
            (true, false) => BarOutcome::Exit {
                price: self.stop_price,
                reason: ExitReason::StopLoss,
                ambiguous: false,
            },
            (false, true) => BarOutcome::Exit {
                price: self.target_price,
                reason: ExitReason::TakeProfit,
                ambiguous: false,
            },
            (false, false) => BarOutcome::Hold,
        }
    }

    /// Signed return on the entry price for an exit at `price`.
    pub fn price_return(&self, price: f64) -> f64 {
        (price - self.entry_price) / self.entry_price * self.direction.sign()
    }
}

/// A closed round trip. Never mutated once recorded.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Trade {
    pub entry_index: usize,
    pub exit_index: usize,
    pub entry_timestamp: Option<NaiveDateTime>,
    pub exit_timestamp: Option<NaiveDateTime>,
    pub direction: Direction,
    pub entry_price: f64,
    pub exit_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    pub entry_balance: f64,
    pub entry_fee: f64,
    pub exit_fee: f64,
    /// Net of both fees: `balance_after - balance before entry`.
    pub pnl: f64,
    pub balance_after: f64,
    pub exit_reason: ExitReason,
    pub ambiguous: bool,
}

impl Trade {
    /// Return on the capital committed at entry.
    pub fn return_on_capital(&self) -> Option<f64> {
        (self.entry_balance > 0.0).then(|| self.pnl / self.entry_balance)
    }

    pub fn bars_held(&self) -> usize {
        self.exit_index - self.entry_index
    }

    pub fn is_win(&self) -> bool {
        !self.ambiguous && self.exit_reason == ExitReason::TakeProfit
    }

    pub fn is_loss(&self) -> bool {
        !self.ambiguous && self.exit_reason == ExitReason::StopLoss
    }
}
