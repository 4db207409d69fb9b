//! Closed-trade ledger, account balance and equity tracking.

use chrono::NaiveDateTime;

use super::position::{ExitReason, OpenPosition, Trade};

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct EquityPoint {
    pub index: usize,
    pub balance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccountState {
    pub initial_balance: f64,
    pub balance: f64,
    pub peak_balance: f64,
    pub max_drawdown: f64,
}

impl AccountState {
    pub fn new(initial_balance: f64) -> Self {
        AccountState {
            initial_balance,
            balance: initial_balance,
            peak_balance: initial_balance,
            max_drawdown: 0.0,
        }
    }

    /// Fraction below the peak, 0 when the peak is not positive.
    pub fn current_drawdown(&self) -> f64 {
        drawdown(self.peak_balance, self.balance)
    }

    fn settle(&mut self, balance: f64) {
        self.balance = balance;
        self.peak_balance = self.peak_balance.max(balance);
        self.max_drawdown = self.max_drawdown.max(self.current_drawdown());
    }
}

fn drawdown(peak: f64, balance: f64) -> f64 {
    if peak > 0.0 {
        (peak - balance) / peak
    } else {
        0.0
    }
}

/// Exit details handed to [`Ledger::close`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitFill {
    pub index: usize,
    pub timestamp: Option<NaiveDateTime>,
    pub price: f64,
    pub reason: ExitReason,
    pub ambiguous: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    account: AccountState,
    trades: Vec<Trade>,
    equity_curve: Vec<EquityPoint>,
}

impl Ledger {
    pub fn new(initial_balance: f64) -> Self {
        Ledger {
            account: AccountState::new(initial_balance),
            trades: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    pub fn account(&self) -> &AccountState {
        &self.account
    }

    pub fn balance(&self) -> f64 {
        self.account.balance
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    /// Charge the entry fee on the whole balance.
    ///
    /// Returns the post-fee capital base and the fee charged.
    pub fn debit_entry_fee(&mut self, fee_rate: f64) -> (f64, f64) {
        let before = self.account.balance;
        let entry_balance = before * (1.0 - fee_rate);
        self.account.balance = entry_balance;
        (entry_balance, before - entry_balance)
    }

    /// Close `position` at `exit` and append the resulting trade.
    pub fn close(
        &mut self,
        position: &OpenPosition,
        exit: ExitFill,
        leverage: f64,
        fee_rate: f64,
    ) -> &Trade {
        let notional = position.entry_balance * leverage;
        let raw_pnl = position.price_return(exit.price) * notional;
        let exit_fee = notional * fee_rate;
        let balance_after = self.account.balance + raw_pnl - exit_fee;

        let trade = Trade {
            entry_index: position.entry_index,
            exit_index: exit.index,
            entry_timestamp: position.entry_timestamp,
            exit_timestamp: exit.timestamp,
            direction: position.direction,
            entry_price: position.entry_price,
            exit_price: exit.price,
            stop_price: position.stop_price,
            target_price: position.target_price,
            entry_balance: position.entry_balance,
            entry_fee: position.entry_fee,
            exit_fee,
            pnl: raw_pnl - exit_fee - position.entry_fee,
            balance_after,
            exit_reason: exit.reason,
            ambiguous: exit.ambiguous,
        };
        self.record(trade)
    }

    /// Append a trade and settle the account at its `balance_after`.
    pub fn record(&mut self, trade: Trade) -> &Trade {
        self.account.settle(trade.balance_after);
        self.trades.push(trade);
        &self.trades[self.trades.len() - 1]
    }

    pub fn record_equity(&mut self, index: usize, balance: f64) {
        self.equity_curve.push(EquityPoint { index, balance });
    }

    /// Balance at `index`, carried forward across gaps between bars.
    ///
    /// `None` before the first or after the last recorded point.
    pub fn equity_at(&self, index: usize) -> Option<f64> {
        let last = self.equity_curve.last()?;
        if index > last.index {
            return None;
        }
        let pos = self.equity_curve.partition_point(|p| p.index <= index);
        pos.checked_sub(1).map(|i| self.equity_curve[i].balance)
    }
}
