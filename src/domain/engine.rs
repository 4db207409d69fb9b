//! Bar-by-bar position state machine.
//!
//! The machine is `Idle`, `WaitingForEntry` or `InPosition`. Each bar after
//! the first is handled in a fixed order:
//!
//! 1. a pending entry is filled, kept waiting, or expired, and the bar ends;
//! 2. an open position is checked against its stop and target;
//! 3. an idle machine acts on the bar's signal.
//!
//! The first bar of a run is a warm-up bar: it records an equity point and
//! produces no transition.
//! A position or pending entry still alive when the bars run out is reported
//! in the result but never force-closed.

use super::ambiguity::RandomSource;
use super::bar::{Bar, BarSeries, Direction};
use super::config::SimulationConfig;
use super::error::SimError;
use super::ledger::{AccountState, EquityPoint, ExitFill, Ledger};
use super::position::{BarOutcome, LevelPolicy, OpenPosition, Trade};
use super::trigger::{EntryDecision, PendingEntry, WaitOutcome, decide_entry};

#[derive(Debug, Clone, PartialEq, Default)]
pub enum State {
    #[default]
    Idle,
    WaitingForEntry(PendingEntry),
    InPosition(OpenPosition),
}

impl State {
    pub fn is_idle(&self) -> bool {
        matches!(self, State::Idle)
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self, State::WaitingForEntry(_))
    }

    pub fn is_in_position(&self) -> bool {
        matches!(self, State::InPosition(_))
    }
}

/// A data gap that made the engine skip a signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DiagnosticKind {
    /// Limit entries need volatility on the signal bar.
    MissingVolatility { direction: Direction },
    /// ATR-based levels need ATR on the entry bar.
    MissingAtr { direction: Direction },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Diagnostic {
    pub bar_index: usize,
    pub kind: DiagnosticKind,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            DiagnosticKind::MissingVolatility { direction } => write!(
                f,
                "bar {}: {} signal skipped, volatility undefined",
                self.bar_index, direction
            ),
            DiagnosticKind::MissingAtr { direction } => write!(
                f,
                "bar {}: {} entry skipped, ATR undefined for volatility-based stop/target",
                self.bar_index, direction
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    pub ledger: Ledger,
    pub ambiguous_count: usize,
    pub diagnostics: Vec<Diagnostic>,
    pub open_position: Option<OpenPosition>,
    pub pending_entry: Option<PendingEntry>,
    /// Bars fed to the machine, warm-up bar included.
    pub bars_processed: usize,
}

impl SimulationResult {
    pub fn trades(&self) -> &[Trade] {
        self.ledger.trades()
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        self.ledger.equity_curve()
    }

    pub fn account(&self) -> &AccountState {
        self.ledger.account()
    }

    pub fn final_balance(&self) -> f64 {
        self.ledger.balance()
    }

    pub fn equity_at(&self, index: usize) -> Option<f64> {
        self.ledger.equity_at(index)
    }
}

pub struct Simulator<R> {
    config: SimulationConfig,
    levels: LevelPolicy,
    source: R,
    ledger: Ledger,
    state: State,
    ambiguous_count: usize,
    diagnostics: Vec<Diagnostic>,
    bars_seen: usize,
    last_index: Option<usize>,
}

impl<R: RandomSource> Simulator<R> {
    /// Validates `config` and starts idle with the initial balance.
    pub fn new(config: SimulationConfig, source: R) -> Result<Self, SimError> {
        config.validate()?;
        Ok(Simulator {
            levels: config.level_policy(),
            ledger: Ledger::new(config.initial_balance),
            config,
            source,
            state: State::Idle,
            ambiguous_count: 0,
            diagnostics: Vec::new(),
            bars_seen: 0,
            last_index: None,
        })
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Feed the next bar. Bars must arrive with strictly increasing indices
    /// and pass the same checks as a [`BarSeries`].
    pub fn step(&mut self, bar: &Bar) -> Result<(), SimError> {
        bar.check(self.bars_seen)?;
        if let Some(last) = self.last_index {
            if bar.index <= last {
                return Err(SimError::Data {
                    reason: format!("bar index {} does not follow {}", bar.index, last),
                });
            }
        }
        self.last_index = Some(bar.index);
        self.bars_seen += 1;
        if self.bars_seen == 1 {
            self.ledger.record_equity(bar.index, self.ledger.balance());
            return Ok(());
        }

        match std::mem::take(&mut self.state) {
            State::WaitingForEntry(pending) => {
                self.state = self.advance_pending(pending, bar);
                self.ledger.record_equity(bar.index, self.ledger.balance());
                return Ok(());
            }
            State::InPosition(position) => self.state = self.check_exit(position, bar),
            State::Idle => {}
        }

        if self.state.is_idle() {
            if let Some(direction) = bar.signal.direction() {
                self.state = self.on_signal(direction, bar);
            }
        }

        self.ledger.record_equity(bar.index, self.ledger.balance());
        Ok(())
    }

    /// Feed every bar of `series` and finish.
    pub fn run(mut self, series: &BarSeries) -> Result<SimulationResult, SimError> {
        tracing::info!(bars = series.len(), ambiguity = %self.config.ambiguity, "simulation started");
        for bar in series {
            self.step(bar)?;
        }
        Ok(self.finish())
    }

    pub fn finish(self) -> SimulationResult {
        let (open_position, pending_entry) = match self.state {
            State::Idle => (None, None),
            State::WaitingForEntry(pending) => (None, Some(pending)),
            State::InPosition(position) => (Some(position), None),
        };
        tracing::info!(
            bars = self.bars_seen,
            trades = self.ledger.trades().len(),
            ambiguous = self.ambiguous_count,
            balance = self.ledger.balance(),
            "simulation finished"
        );
        SimulationResult {
            ledger: self.ledger,
            ambiguous_count: self.ambiguous_count,
            diagnostics: self.diagnostics,
            open_position,
            pending_entry,
            bars_processed: self.bars_seen,
        }
    }

    fn advance_pending(&mut self, mut pending: PendingEntry, bar: &Bar) -> State {
        match pending.advance(bar.low, bar.high) {
            WaitOutcome::Filled { fill_price } => self.open(pending.direction, fill_price, bar),
            WaitOutcome::Waiting => State::WaitingForEntry(pending),
            WaitOutcome::Expired => {
                tracing::debug!(
                    bar = bar.index,
                    signal_bar = pending.signal_index,
                    trigger = pending.trigger_price,
                    "pending entry expired"
                );
                State::Idle
            }
        }
    }

    fn on_signal(&mut self, direction: Direction, bar: &Bar) -> State {
        match decide_entry(direction, bar, self.config.trigger_multiplier) {
            EntryDecision::Immediate { fill_price } => self.open(direction, fill_price, bar),
            EntryDecision::Deferred { trigger_price } => {
                tracing::debug!(bar = bar.index, %direction, trigger_price, "waiting for entry");
                State::WaitingForEntry(PendingEntry::new(
                    direction,
                    trigger_price,
                    bar.index,
                    self.config.max_wait_bars,
                ))
            }
            EntryDecision::Unavailable => {
                self.diagnose(bar.index, DiagnosticKind::MissingVolatility { direction });
                State::Idle
            }
        }
    }

    fn open(&mut self, direction: Direction, entry_price: f64, bar: &Bar) -> State {
        let Some((stop_price, target_price)) = self.levels.levels(direction, entry_price, bar.atr)
        else {
            self.diagnose(bar.index, DiagnosticKind::MissingAtr { direction });
            return State::Idle;
        };

        let (entry_balance, entry_fee) = self.ledger.debit_entry_fee(self.config.fee_rate);
        tracing::debug!(
            bar = bar.index,
            %direction,
            entry_price,
            stop_price,
            target_price,
            entry_balance,
            "position opened"
        );
        State::InPosition(OpenPosition {
            direction,
            entry_price,
            entry_index: bar.index,
            entry_timestamp: bar.timestamp,
            entry_balance,
            entry_fee,
            stop_price,
            target_price,
        })
    }

    fn check_exit(&mut self, position: OpenPosition, bar: &Bar) -> State {
        match position.resolve_bar(bar, self.config.ambiguity, &mut self.source) {
            BarOutcome::Hold => State::InPosition(position),
            BarOutcome::Exit {
                price,
                reason,
                ambiguous,
            } => {
                if ambiguous {
                    self.ambiguous_count += 1;
                }
                let trade = self.ledger.close(
                    &position,
                    ExitFill {
                        index: bar.index,
                        timestamp: bar.timestamp,
                        price,
                        reason,
                        ambiguous,
                    },
                    self.config.leverage,
                    self.config.fee_rate,
                );
                tracing::debug!(
                    bar = bar.index,
                    exit_price = price,
                    %reason,
                    ambiguous,
                    pnl = trade.pnl,
                    balance = trade.balance_after,
                    "position closed"
                );
                State::Idle
            }
        }
    }

    fn diagnose(&mut self, bar_index: usize, kind: DiagnosticKind) {
        let diagnostic = Diagnostic { bar_index, kind };
        tracing::warn!("{diagnostic}");
        self.diagnostics.push(diagnostic);
    }
}

/// Run a whole series with a fresh simulator.
pub fn run_simulation<R: RandomSource>(
    series: &BarSeries,
    config: &SimulationConfig,
    source: R,
) -> Result<SimulationResult, SimError> {
    Simulator::new(config.clone(), source)?.run(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ambiguity::{AmbiguityPolicy, ScriptedSource};
    use crate::domain::bar::Signal;
    use crate::domain::position::ExitReason;
    use approx::assert_relative_eq;

    fn immediate_config() -> SimulationConfig {
        SimulationConfig {
            initial_balance: 100.0,
            leverage: 1.0,
            fee_rate: 0.0,
            trigger_multiplier: 0.0,
            max_risk: 0.05,
            target_return: 0.1,
            ..Default::default()
        }
    }

    fn simulator(config: SimulationConfig) -> Simulator<ScriptedSource> {
        Simulator::new(config, ScriptedSource::always_target()).unwrap()
    }

    fn flat(index: usize, close: f64) -> Bar {
        Bar::new(index, close + 0.5, close - 0.5, close)
    }

    #[test]
    fn first_bar_is_warm_up() {
        let mut sim = simulator(immediate_config());
        sim.step(&flat(0, 100.0).with_signal(Signal::Long)).unwrap();
        assert!(sim.state().is_idle());
        assert_eq!(
            sim.ledger().equity_curve(),
            &[EquityPoint {
                index: 0,
                balance: 100.0
            }]
        );
    }

    #[test]
    fn immediate_entry_at_close() {
        let mut sim = simulator(immediate_config());
        sim.step(&flat(0, 100.0)).unwrap();
        sim.step(&flat(1, 100.0).with_signal(Signal::Long)).unwrap();
        match sim.state() {
            State::InPosition(pos) => {
                assert_eq!(pos.entry_price, 100.0);
                assert_eq!(pos.entry_index, 1);
                assert_relative_eq!(pos.stop_price, 95.0, epsilon = 1e-9);
                assert_relative_eq!(pos.target_price, 110.0, epsilon = 1e-9);
            }
            other => panic!("expected position, got {other:?}"),
        }
    }

    #[test]
    fn entry_bar_does_not_check_exit() {
        let mut sim = simulator(immediate_config());
        sim.step(&flat(0, 100.0)).unwrap();
        // range covers both levels, but it is the entry bar
        sim.step(&Bar::new(1, 120.0, 80.0, 100.0).with_signal(Signal::Long))
            .unwrap();
        assert!(sim.state().is_in_position());
        assert!(sim.ledger().trades().is_empty());
    }

    #[test]
    fn target_exit_records_win() {
        let mut sim = simulator(immediate_config());
        sim.step(&flat(0, 100.0)).unwrap();
        sim.step(&flat(1, 100.0).with_signal(Signal::Long)).unwrap();
        sim.step(&Bar::new(2, 111.0, 101.0, 110.5)).unwrap();
        let result = sim.finish();
        assert_eq!(result.trades().len(), 1);
        let trade = &result.trades()[0];
        assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
        assert!(!trade.ambiguous);
        assert_relative_eq!(trade.exit_price, 110.0, epsilon = 1e-9);
        assert_relative_eq!(trade.pnl, 10.0, epsilon = 1e-9);
        assert_relative_eq!(result.final_balance(), 110.0, epsilon = 1e-9);
    }

    #[test]
    fn short_stop_exit() {
        let mut sim = simulator(immediate_config());
        sim.step(&flat(0, 100.0)).unwrap();
        sim.step(&flat(1, 100.0).with_signal(Signal::Short)).unwrap();
        sim.step(&Bar::new(2, 106.0, 99.0, 105.0)).unwrap();
        let result = sim.finish();
        let trade = &result.trades()[0];
        assert_eq!(trade.direction, Direction::Short);
        assert_eq!(trade.exit_reason, ExitReason::StopLoss);
        assert_relative_eq!(trade.exit_price, 105.0, epsilon = 1e-9);
        assert_relative_eq!(trade.pnl, -5.0, epsilon = 1e-9);
    }

    #[test]
    fn exit_and_new_signal_on_same_bar() {
        let mut sim = simulator(immediate_config());
        sim.step(&flat(0, 100.0)).unwrap();
        sim.step(&flat(1, 100.0).with_signal(Signal::Long)).unwrap();
        sim.step(&Bar::new(2, 111.0, 101.0, 110.0).with_signal(Signal::Short))
            .unwrap();
        assert_eq!(sim.ledger().trades().len(), 1);
        match sim.state() {
            State::InPosition(pos) => {
                assert_eq!(pos.direction, Direction::Short);
                assert_eq!(pos.entry_index, 2);
            }
            other => panic!("expected new short, got {other:?}"),
        }
    }

    #[test]
    fn pending_entry_fills_at_trigger_and_skips_rest_of_bar() {
        let config = SimulationConfig {
            trigger_multiplier: 1.0,
            max_wait_bars: 3,
            ..immediate_config()
        };
        let mut sim = simulator(config);
        sim.step(&flat(0, 100.0)).unwrap();
        sim.step(&flat(1, 100.0).with_signal(Signal::Long).with_volatility(0.02))
            .unwrap();
        assert!(sim.state().is_waiting());

        // dips to 90: fills at 98; the 93.1 stop is not checked until the next bar
        sim.step(&Bar::new(2, 99.0, 90.0, 95.0)).unwrap();
        match sim.state() {
            State::InPosition(pos) => {
                assert_relative_eq!(pos.entry_price, 98.0, epsilon = 1e-9);
                assert_eq!(pos.entry_index, 2);
            }
            other => panic!("expected position, got {other:?}"),
        }
        assert!(sim.ledger().trades().is_empty());
    }

    #[test]
    fn pending_entry_expires() {
        let config = SimulationConfig {
            trigger_multiplier: 1.0,
            max_wait_bars: 2,
            ..immediate_config()
        };
        let mut sim = simulator(config);
        sim.step(&flat(0, 100.0)).unwrap();
        sim.step(&flat(1, 100.0).with_signal(Signal::Long).with_volatility(0.02))
            .unwrap();
        sim.step(&flat(2, 100.0)).unwrap();
        assert!(sim.state().is_waiting());
        // a signal while waiting is ignored
        sim.step(&flat(3, 100.0).with_signal(Signal::Short)).unwrap();
        assert!(sim.state().is_idle());
        let result = sim.finish();
        assert!(result.trades().is_empty());
        assert_eq!(result.equity_curve().len(), 4);
    }

    #[test]
    fn missing_volatility_skips_signal() {
        let config = SimulationConfig {
            trigger_multiplier: 1.0,
            ..immediate_config()
        };
        let mut sim = simulator(config);
        sim.step(&flat(0, 100.0)).unwrap();
        sim.step(&flat(1, 100.0).with_signal(Signal::Long)).unwrap();
        assert!(sim.state().is_idle());
        assert_eq!(sim.ledger().equity_at(1), Some(100.0));
        assert_eq!(
            sim.finish().diagnostics,
            vec![Diagnostic {
                bar_index: 1,
                kind: DiagnosticKind::MissingVolatility {
                    direction: Direction::Long
                }
            }]
        );
    }

    #[test]
    fn missing_atr_skips_entry_without_fee() {
        let config = SimulationConfig {
            stop_atr_multiplier: 1.0,
            target_atr_multiplier: 2.0,
            fee_rate: 0.01,
            ..immediate_config()
        };
        let mut sim = simulator(config);
        sim.step(&flat(0, 100.0)).unwrap();
        sim.step(&flat(1, 100.0).with_signal(Signal::Long)).unwrap();
        assert!(sim.state().is_idle());
        assert_eq!(sim.ledger().balance(), 100.0);
        assert!(matches!(
            sim.finish().diagnostics[0].kind,
            DiagnosticKind::MissingAtr { .. }
        ));
    }

    #[test]
    fn atr_levels_from_entry_bar() {
        let config = SimulationConfig {
            stop_atr_multiplier: 1.0,
            target_atr_multiplier: 2.0,
            ..immediate_config()
        };
        let mut sim = simulator(config);
        sim.step(&flat(0, 100.0)).unwrap();
        sim.step(&flat(1, 100.0).with_signal(Signal::Long).with_atr(3.0))
            .unwrap();
        match sim.state() {
            State::InPosition(pos) => {
                assert_relative_eq!(pos.stop_price, 97.0, epsilon = 1e-9);
                assert_relative_eq!(pos.target_price, 106.0, epsilon = 1e-9);
            }
            other => panic!("expected position, got {other:?}"),
        }
    }

    #[test]
    fn ambiguous_bar_counts_and_flags() {
        let mut sim = Simulator::new(immediate_config(), ScriptedSource::always_stop()).unwrap();
        sim.step(&flat(0, 100.0)).unwrap();
        sim.step(&flat(1, 100.0).with_signal(Signal::Long)).unwrap();
        sim.step(&Bar::new(2, 115.0, 90.0, 100.0)).unwrap();
        let result = sim.finish();
        assert_eq!(result.ambiguous_count, 1);
        let trade = &result.trades()[0];
        assert!(trade.ambiguous);
        assert_relative_eq!(trade.exit_price, 95.0, epsilon = 1e-9);
    }

    #[test]
    fn midpoint_policy_blends_exit() {
        let config = SimulationConfig {
            ambiguity: AmbiguityPolicy::Midpoint,
            ..immediate_config()
        };
        let mut sim = simulator(config);
        sim.step(&flat(0, 100.0)).unwrap();
        sim.step(&flat(1, 100.0).with_signal(Signal::Long)).unwrap();
        sim.step(&Bar::new(2, 115.0, 90.0, 100.0)).unwrap();
        let trade = &sim.ledger().trades()[0];
        assert_eq!(trade.exit_reason, ExitReason::Blended);
        assert_relative_eq!(trade.exit_price, 102.5, epsilon = 1e-9);
    }

    #[test]
    fn open_position_left_unresolved() {
        let config = SimulationConfig {
            fee_rate: 0.01,
            ..immediate_config()
        };
        let mut sim = simulator(config);
        sim.step(&flat(0, 100.0)).unwrap();
        sim.step(&flat(1, 100.0).with_signal(Signal::Long)).unwrap();
        sim.step(&flat(2, 100.0)).unwrap();
        let result = sim.finish();
        assert!(result.trades().is_empty());
        let open = result.open_position.as_ref().expect("position still open");
        assert_relative_eq!(open.entry_fee, 1.0, epsilon = 1e-9);
        assert_relative_eq!(result.final_balance(), 99.0, epsilon = 1e-9);
        assert!(result.pending_entry.is_none());
    }

    #[test]
    fn out_of_order_bar_rejected() {
        let mut sim = simulator(immediate_config());
        sim.step(&flat(5, 100.0)).unwrap();
        assert!(matches!(
            sim.step(&flat(5, 100.0)),
            Err(SimError::Data { .. })
        ));
    }

    #[test]
    fn malformed_bar_rejected() {
        let mut sim = simulator(immediate_config());
        sim.step(&flat(0, 100.0)).unwrap();
        sim.step(&flat(1, 100.0).with_signal(Signal::Long)).unwrap();

        let nan_low = Bar::new(2, 101.0, f64::NAN, 100.0);
        assert!(matches!(
            sim.step(&nan_low),
            Err(SimError::InvalidBar { row: 2, .. })
        ));
        let inverted = Bar::new(2, 99.0, 101.0, 100.0);
        assert!(matches!(
            sim.step(&inverted),
            Err(SimError::InvalidBar { row: 2, .. })
        ));

        // rejected bars leave the machine untouched
        assert!(sim.state().is_in_position());
        sim.step(&Bar::new(2, 111.0, 100.0, 110.0)).unwrap();
        assert_eq!(sim.ledger().trades().len(), 1);
    }

    #[test]
    fn invalid_config_rejected_at_construction() {
        let config = SimulationConfig {
            leverage: 0.0,
            ..Default::default()
        };
        assert!(Simulator::new(config, ScriptedSource::always_target()).is_err());
    }

    #[test]
    fn run_simulation_over_series() {
        let series = BarSeries::new(vec![
            flat(0, 100.0),
            flat(1, 100.0).with_signal(Signal::Long),
            Bar::new(2, 111.0, 100.0, 110.0),
            flat(3, 110.0),
        ])
        .unwrap();
        let result =
            run_simulation(&series, &immediate_config(), ScriptedSource::always_target()).unwrap();
        assert_eq!(result.trades().len(), 1);
        assert_eq!(result.bars_processed, 4);
        assert_eq!(result.equity_curve().len(), 4);
        assert_eq!(result.equity_at(0), Some(100.0));
        assert_eq!(result.equity_at(1), Some(100.0));
        assert_relative_eq!(result.equity_at(3).unwrap(), 110.0, epsilon = 1e-9);
    }
}
