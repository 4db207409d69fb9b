//! Price bars, signals and the validated bar series.

use chrono::NaiveDateTime;

use super::error::SimError;

/// Side of a pending entry or open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1.0 for long, -1.0 for short.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

/// Discrete position signal produced upstream for each bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Signal {
    Short,
    #[default]
    Flat,
    Long,
}

impl Signal {
    /// The direction to trade, or `None` when flat.
    pub fn direction(self) -> Option<Direction> {
        match self {
            Signal::Long => Some(Direction::Long),
            Signal::Short => Some(Direction::Short),
            Signal::Flat => None,
        }
    }
}

impl TryFrom<i64> for Signal {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Signal::Short),
            0 => Ok(Signal::Flat),
            1 => Ok(Signal::Long),
            other => Err(other),
        }
    }
}

impl From<Signal> for i64 {
    fn from(signal: Signal) -> Self {
        match signal {
            Signal::Short => -1,
            Signal::Flat => 0,
            Signal::Long => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub index: usize,
    pub timestamp: Option<NaiveDateTime>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub signal: Signal,
    /// Fractional volatility used to offset limit entries.
    pub volatility: Option<f64>,
    /// Average true range in price units, used for volatility-based exits.
    pub atr: Option<f64>,
}

impl Bar {
    /// Bar with open == close and no timestamp, volatility or ATR.
    pub fn new(index: usize, high: f64, low: f64, close: f64) -> Self {
        Bar {
            index,
            timestamp: None,
            open: close,
            high,
            low,
            close,
            signal: Signal::Flat,
            volatility: None,
            atr: None,
        }
    }

    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signal = signal;
        self
    }

    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.volatility = Some(volatility);
        self
    }

    pub fn with_atr(mut self, atr: f64) -> Self {
        self.atr = Some(atr);
        self
    }

    pub(crate) fn check(&self, row: usize) -> Result<(), SimError> {
        let invalid = |reason: String| SimError::InvalidBar { row, reason };
        for (name, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(invalid(format!("{name} must be a positive finite price, got {value}")));
            }
        }
        if self.high < self.low {
            return Err(invalid(format!(
                "high {} is below low {}",
                self.high, self.low
            )));
        }
        for (name, value) in [("volatility", self.volatility), ("atr", self.atr)] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(invalid(format!("{name} must be non-negative, got {v}")));
                }
            }
        }
        Ok(())
    }
}

/// An ordered, validated sequence of bars.
///
/// Indices are strictly increasing, prices are positive and finite,
/// `low <= high`, and defined volatility/ATR values are non-negative.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BarSeries {
    bars: Vec<Bar>,
}

impl BarSeries {
    pub fn new(bars: Vec<Bar>) -> Result<Self, SimError> {
        for (row, bar) in bars.iter().enumerate() {
            bar.check(row)?;
            if row > 0 && bar.index <= bars[row - 1].index {
                return Err(SimError::InvalidBar {
                    row,
                    reason: format!(
                        "index {} does not follow {}",
                        bar.index,
                        bars[row - 1].index
                    ),
                });
            }
        }
        Ok(BarSeries { bars })
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bar> {
        self.bars.iter()
    }
}

impl<'a> IntoIterator for &'a BarSeries {
    type Item = &'a Bar;
    type IntoIter = std::slice::Iter<'a, Bar>;

    fn into_iter(self) -> Self::IntoIter {
        self.bars.iter()
    }
}
