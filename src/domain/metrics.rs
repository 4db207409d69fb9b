//! End-of-run summary statistics.

use std::collections::BTreeMap;

use super::config::SimulationConfig;
use super::ledger::Ledger;

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Summary {
    pub initial_balance: f64,
    pub final_balance: f64,
    pub total_return: f64,
    pub peak_balance: f64,
    pub max_drawdown: f64,
    pub total_trades: usize,
    /// Take-profit exits on unambiguous bars.
    pub wins: usize,
    /// Stop-loss exits on unambiguous bars.
    pub losses: usize,
    pub ambiguous: usize,
    pub win_rate: f64,
    pub ambiguity_rate: f64,
    /// Mean of `pnl / entry_balance`, where `pnl` is net of both the entry
    /// and the exit fee.
    pub mean_return: f64,
    pub std_return: f64,
    pub sharpe_ratio: f64,
    pub annualized_sharpe: f64,
    /// Gross profit over gross loss; infinite when there are profitable
    /// trades but no losing ones, 0 when there are neither.
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub avg_bars_held: f64,
}

impl Summary {
    pub const KEYS: [&'static str; 21] = [
        "initial_balance",
        "final_balance",
        "total_return",
        "peak_balance",
        "max_drawdown",
        "total_trades",
        "wins",
        "losses",
        "ambiguous",
        "win_rate",
        "ambiguity_rate",
        "mean_return",
        "std_return",
        "sharpe_ratio",
        "annualized_sharpe",
        "profit_factor",
        "avg_win",
        "avg_loss",
        "largest_win",
        "largest_loss",
        "avg_bars_held",
    ];

    pub fn compute(ledger: &Ledger, config: &SimulationConfig) -> Self {
        let account = ledger.account();
        let trades = ledger.trades();

        let total_return = ratio(account.balance - account.initial_balance, account.initial_balance);

        let wins = trades.iter().filter(|t| t.is_win()).count();
        let losses = trades.iter().filter(|t| t.is_loss()).count();
        let ambiguous = trades.iter().filter(|t| t.ambiguous).count();
        let decided = (wins + losses) as f64;

        let returns: Vec<f64> = trades.iter().filter_map(|t| t.return_on_capital()).collect();
        let (mean_return, std_return) = mean_and_std(&returns);
        let sharpe_ratio = ratio(mean_return - config.risk_free_rate, std_return);
        let annualized_sharpe = match config.periods_per_year {
            Some(periods) => sharpe_ratio * periods.sqrt(),
            None => sharpe_ratio,
        };

        let mut gross_profit = 0.0_f64;
        let mut gross_loss = 0.0_f64;
        let mut profitable = 0usize;
        let mut unprofitable = 0usize;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        for trade in trades {
            if trade.pnl > 0.0 {
                profitable += 1;
                gross_profit += trade.pnl;
                largest_win = largest_win.max(trade.pnl);
            } else if trade.pnl < 0.0 {
                unprofitable += 1;
                gross_loss += trade.pnl.abs();
                largest_loss = largest_loss.max(trade.pnl.abs());
            }
        }
        let total_bars: usize = trades.iter().map(|t| t.bars_held()).sum();

        Summary {
            initial_balance: account.initial_balance,
            final_balance: account.balance,
            total_return,
            peak_balance: account.peak_balance,
            max_drawdown: account.max_drawdown,
            total_trades: trades.len(),
            wins,
            losses,
            ambiguous,
            win_rate: ratio(wins as f64, decided),
            ambiguity_rate: ratio(ambiguous as f64, decided),
            mean_return,
            std_return,
            sharpe_ratio,
            annualized_sharpe,
            profit_factor: profit_factor(gross_profit, gross_loss),
            avg_win: ratio(gross_profit, profitable as f64),
            avg_loss: ratio(gross_loss, unprofitable as f64),
            largest_win,
            largest_loss,
            avg_bars_held: ratio(total_bars as f64, trades.len() as f64),
        }
    }

    /// Every field keyed by name, counts widened to `f64`.
    pub fn to_map(&self) -> BTreeMap<&'static str, f64> {
        let values = [
            self.initial_balance,
            self.final_balance,
            self.total_return,
            self.peak_balance,
            self.max_drawdown,
            self.total_trades as f64,
            self.wins as f64,
            self.losses as f64,
            self.ambiguous as f64,
            self.win_rate,
            self.ambiguity_rate,
            self.mean_return,
            self.std_return,
            self.sharpe_ratio,
            self.annualized_sharpe,
            self.profit_factor,
            self.avg_win,
            self.avg_loss,
            self.largest_win,
            self.largest_loss,
            self.avg_bars_held,
        ];
        Self::KEYS.into_iter().zip(values).collect()
    }
}

/// `numerator / denominator`, or 0 when the denominator is zero.
fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator != 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

fn profit_factor(gross_profit: f64, gross_loss: f64) -> f64 {
    if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else if gross_profit > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}

/// Mean and population standard deviation.
fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}
