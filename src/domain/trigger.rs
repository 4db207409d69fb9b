//! Volatility-offset limit entries.
//!
//! A long signal waits for a dip of `multiplier * volatility` (as a fraction
//! of the signal bar's close); a short signal waits for a rally of the same
//! size. The fill is always the trigger price itself.

use super::bar::{Bar, Direction};

/// Limit price for a signal observed at `reference` (usually the close).
pub fn trigger_price(direction: Direction, reference: f64, volatility: f64, multiplier: f64) -> f64 {
    reference - direction.sign() * multiplier * volatility * reference
}

/// True when a bar with the given range reaches `trigger`.
pub fn is_triggered(direction: Direction, trigger: f64, bar_low: f64, bar_high: f64) -> bool {
    match direction {
        Direction::Long => bar_low <= trigger,
        Direction::Short => bar_high >= trigger,
    }
}

/// Result of asking whether a signal can be acted on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntryDecision {
    /// Fill now at the given price.
    Immediate { fill_price: f64 },
    /// Wait for the price to reach `trigger_price`.
    Deferred { trigger_price: f64 },
    /// No volatility on the signal bar; the signal is skipped.
    Unavailable,
}

/// Decide how a signal on `bar` enters the market.
///
/// A zero multiplier fills at the bar's close. Otherwise the bar must carry a
/// volatility value to derive a trigger.
pub fn decide_entry(direction: Direction, bar: &Bar, multiplier: f64) -> EntryDecision {
    if multiplier == 0.0 {
        return EntryDecision::Immediate {
            fill_price: bar.close,
        };
    }
    match bar.volatility {
        Some(vol) => EntryDecision::Deferred {
            trigger_price: trigger_price(direction, bar.close, vol, multiplier),
        },
        None => EntryDecision::Unavailable,
    }
}

/// An entry signal waiting for its limit price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingEntry {
    pub direction: Direction,
    pub trigger_price: f64,
    pub signal_index: usize,
    pub bars_waited: usize,
    pub max_wait_bars: usize,
}

/// What happened to a pending entry on one bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WaitOutcome {
    Filled { fill_price: f64 },
    Waiting,
    Expired,
}

impl PendingEntry {
    pub fn new(
        direction: Direction,
        trigger_price: f64,
        signal_index: usize,
        max_wait_bars: usize,
    ) -> Self {
        PendingEntry {
            direction,
            trigger_price,
            signal_index,
            bars_waited: 0,
            max_wait_bars,
        }
    }

    /// Fill price if this bar's range reaches the trigger.
    pub fn evaluate(&self, bar_low: f64, bar_high: f64) -> Option<f64> {
        is_triggered(self.direction, self.trigger_price, bar_low, bar_high)
            .then_some(self.trigger_price)
    }

    /// Evaluate the bar and advance the wait counter when nothing fills.
    pub fn advance(&mut self, bar_low: f64, bar_high: f64) -> WaitOutcome {
        if let Some(fill_price) = self.evaluate(bar_low, bar_high) {
            return WaitOutcome::Filled { fill_price };
        }
        self.bars_waited += 1;
        if self.bars_waited >= self.max_wait_bars {
            WaitOutcome::Expired
        } else {
            WaitOutcome::Waiting
        }
    }
}
