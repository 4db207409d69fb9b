#![allow(dead_code)]

use execsim::domain::bar::{Bar, BarSeries, Signal};
use execsim::domain::config::SimulationConfig;
use proptest::prelude::*;
use std::io::Write;

/// Bar with open == close.
pub fn make_bar(index: usize, high: f64, low: f64, close: f64) -> Bar {
    Bar::new(index, high, low, close)
}

/// Narrow bar around `close` that touches no nearby level.
pub fn quiet_bar(index: usize, close: f64) -> Bar {
    Bar::new(index, close * 1.001, close * 0.999, close)
}

pub fn make_series(bars: Vec<Bar>) -> BarSeries {
    BarSeries::new(bars).unwrap()
}

/// Market-at-close entries, no leverage, no fees.
pub fn immediate_config() -> SimulationConfig {
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

pub fn limit_config(trigger_multiplier: f64, max_wait_bars: usize) -> SimulationConfig {
    SimulationConfig {
        trigger_multiplier,
        max_wait_bars,
        ..immediate_config()
    }
}

pub fn write_temp_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

/// Render bars in the CSV layout the bar adapter reads.
pub fn bars_csv(bars: &[Bar]) -> String {
    let mut out = String::from("index,open,high,low,close,signal,volatility,atr\n");
    for b in bars {
        let opt = |v: Option<f64>| v.map(|x| x.to_string()).unwrap_or_default();
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{}\n",
            b.index,
            b.open,
            b.high,
            b.low,
            b.close,
            i64::from(b.signal),
            opt(b.volatility),
            opt(b.atr)
        ));
    }
    out
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_signal() -> impl Strategy<Value = Signal> {
    prop_oneof![Just(Signal::Short), Just(Signal::Flat), Just(Signal::Long)]
}

/// One step of a bar path: index gap, close move, range below/above close,
/// signal, volatility, ATR.
type BarStep = (usize, f64, f64, f64, Signal, Option<f64>, Option<f64>);

fn arb_step() -> impl Strategy<Value = BarStep> {
    (
        1usize..3,
        -0.05..0.05_f64,
        0.0..0.08_f64,
        0.0..0.08_f64,
        arb_signal(),
        proptest::option::weighted(0.8, 0.0..0.03_f64),
        proptest::option::weighted(0.8, 0.0..4.0_f64),
    )
}

/// Random-walk bar series with gaps in the index and occasional missing
/// volatility or ATR.
pub fn arb_series(max_len: usize) -> impl Strategy<Value = BarSeries> {
    proptest::collection::vec(arb_step(), 2..max_len).prop_map(|steps| {
        let mut close = 100.0_f64;
        let mut index = 0usize;
        let bars = steps
            .into_iter()
            .map(|(gap, change, down, up, signal, volatility, atr)| {
                index += gap;
                close = (close * (1.0 + change)).max(1.0);
                Bar {
                    index,
                    timestamp: None,
                    open: close,
                    high: close * (1.0 + up),
                    low: close * (1.0 - down),
                    close,
                    signal,
                    volatility,
                    atr,
                }
            })
            .collect();
        BarSeries::new(bars).unwrap()
    })
}

pub fn arb_config() -> impl Strategy<Value = SimulationConfig> {
    (
        1.0..5.0_f64,
        0.0..0.005_f64,
        prop_oneof![Just(0.0), 0.5..2.0_f64],
        1usize..6,
        prop_oneof![Just((0.0, 0.0)), (0.5..2.0_f64, 0.5..3.0_f64)],
        0.01..0.2_f64,
        0.02..0.3_f64,
    )
        .prop_map(
            |(leverage, fee_rate, trigger_multiplier, max_wait_bars, (stop_atr, target_atr), max_risk, target_return)| {
                SimulationConfig {
                    initial_balance: 100.0,
                    leverage,
                    fee_rate,
                    trigger_multiplier,
                    max_wait_bars,
                    stop_atr_multiplier: stop_atr,
                    target_atr_multiplier: target_atr,
                    max_risk,
                    target_return,
                    ..Default::default()
                }
            },
        )
}
