//! CSV bar file adapter.
//!
//! Columns are located by header name. `open`, `high`, `low`, `close` and
//! `signal` are required; `index`, `timestamp`, `volatility` and `atr` are
//! optional. Empty, `NaN` or `nan` cells in the optional numeric columns mean
//! the value is undefined for that bar.

use crate::domain::bar::{Bar, BarSeries, Signal};
use crate::domain::error::SimError;
use crate::ports::data_port::BarSource;
use chrono::{NaiveDate, NaiveDateTime};
use std::fs;
use std::io::Read;
use std::path::PathBuf;

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

pub struct CsvAdapter {
    path: PathBuf,
}

impl CsvAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl BarSource for CsvAdapter {
    fn load_bars(&self) -> Result<BarSeries, SimError> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!("failed to read {}: {}", self.path.display(), e),
            )
        })?;
        let series = parse_bars(content.as_bytes())?;
        tracing::info!(path = %self.path.display(), bars = series.len(), "loaded bars");
        Ok(series)
    }
}

struct Columns {
    index: Option<usize>,
    timestamp: Option<usize>,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    signal: usize,
    volatility: Option<usize>,
    atr: Option<usize>,
}

impl Columns {
    fn locate(headers: &csv::StringRecord) -> Result<Self, SimError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let require = |name: &str| {
            find(name).ok_or_else(|| SimError::Data {
                reason: format!("missing {name} column"),
            })
        };
        Ok(Columns {
            index: find("index"),
            timestamp: find("timestamp"),
            open: require("open")?,
            high: require("high")?,
            low: require("low")?,
            close: require("close")?,
            signal: require("signal")?,
            volatility: find("volatility"),
            atr: find("atr"),
        })
    }
}

/// Parse a bar CSV with a header row into a validated series.
pub fn parse_bars<R: Read>(reader: R) -> Result<BarSeries, SimError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let columns = Columns::locate(rdr.headers()?)?;
    let mut bars = Vec::new();

    for (row, result) in rdr.records().enumerate() {
        let record = result?;
        let cell = |col: usize| record.get(col).unwrap_or("");
        let invalid = |reason: String| SimError::InvalidBar { row, reason };

        let price = |col: usize, name: &str| -> Result<f64, SimError> {
            cell(col)
                .parse::<f64>()
                .map_err(|e| invalid(format!("invalid {name} value '{}': {e}", cell(col))))
        };
        let optional = |col: Option<usize>, name: &str| -> Result<Option<f64>, SimError> {
            match col.map(cell) {
                None => Ok(None),
                Some(text) if is_undefined(text) => Ok(None),
                Some(text) => text
                    .parse::<f64>()
                    .map(Some)
                    .map_err(|e| invalid(format!("invalid {name} value '{text}': {e}"))),
            }
        };

        let index = match columns.index {
            Some(col) => cell(col)
                .parse::<usize>()
                .map_err(|e| invalid(format!("invalid index '{}': {e}", cell(col))))?,
            None => row,
        };
        let timestamp = match columns.timestamp.map(cell) {
            None => None,
            Some(text) if text.is_empty() => None,
            Some(text) => Some(parse_timestamp(text).ok_or_else(|| {
                invalid(format!("invalid timestamp '{text}'"))
            })?),
        };

        bars.push(Bar {
            index,
            timestamp,
            open: price(columns.open, "open")?,
            high: price(columns.high, "high")?,
            low: price(columns.low, "low")?,
            close: price(columns.close, "close")?,
            signal: parse_signal(cell(columns.signal)).map_err(invalid)?,
            volatility: optional(columns.volatility, "volatility")?,
            atr: optional(columns.atr, "atr")?,
        });
    }

    BarSeries::new(bars)
}

fn is_undefined(text: &str) -> bool {
    text.is_empty() || text.eq_ignore_ascii_case("nan")
}

fn parse_signal(text: &str) -> Result<Signal, String> {
    let value = match text.parse::<i64>() {
        Ok(v) => v,
        Err(_) => match text.parse::<f64>() {
            Ok(v) if v.fract() == 0.0 && v.abs() <= 1.0 => v as i64,
            _ => return Err(format!("invalid signal '{text}'")),
        },
    };
    Signal::try_from(value).map_err(|v| format!("signal must be -1, 0 or 1, got {v}"))
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = "timestamp,open,high,low,close,signal,volatility,atr\n\
        2024-01-15,100.0,110.0,90.0,105.0,0,,\n\
        2024-01-16,105.0,115.0,100.0,110.0,1,0.02,3.5\n\
        2024-01-17 09:30:00,110.0,120.0,105.0,115.0,-1,NaN,nan\n";

    #[test]
    fn parses_all_columns() {
        let series = parse_bars(SAMPLE.as_bytes()).unwrap();
        assert_eq!(series.len(), 3);
        let bars = series.bars();
        assert_eq!(bars[0].index, 0);
        assert_eq!(bars[0].volatility, None);
        assert_eq!(bars[1].signal, Signal::Long);
        assert_eq!(bars[1].volatility, Some(0.02));
        assert_eq!(bars[1].atr, Some(3.5));
        assert_eq!(bars[2].signal, Signal::Short);
        assert_eq!(bars[2].atr, None);
        assert_eq!(
            bars[2].timestamp,
            NaiveDate::from_ymd_opt(2024, 1, 17)
                .unwrap()
                .and_hms_opt(9, 30, 0)
        );
    }

    #[test]
    fn explicit_index_column() {
        let csv = "index,open,high,low,close,signal\n3,1,2,1,1.5,0\n7,1,2,1,1.5,1\n";
        let series = parse_bars(csv.as_bytes()).unwrap();
        assert_eq!(series.bars()[1].index, 7);
    }

    #[test]
    fn columns_found_by_name_in_any_order() {
        let csv = "signal,close,low,high,open\n1,100,95,105,99\n";
        let parsed = parse_bars(csv.as_bytes()).unwrap();
        let bar = &parsed.bars()[0];
        assert_eq!(bar.open, 99.0);
        assert_eq!(bar.high, 105.0);
        assert_eq!(bar.signal, Signal::Long);
    }

    #[test]
    fn missing_required_column() {
        let csv = "open,high,low,close\n1,2,1,1.5\n";
        let err = parse_bars(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("missing signal column"));
    }

    #[test]
    fn signal_out_of_range() {
        let csv = "open,high,low,close,signal\n1,2,1,1.5,2\n";
        let err = parse_bars(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, SimError::InvalidBar { row: 0, .. }));
    }

    #[test]
    fn float_signal_accepted() {
        assert_eq!(parse_signal("-1.0"), Ok(Signal::Short));
        assert!(parse_signal("0.5").is_err());
    }

    #[test]
    fn bad_price_reports_row() {
        let csv = "open,high,low,close,signal\n1,2,1,1.5,0\n1,x,1,1.5,0\n";
        let err = parse_bars(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, SimError::InvalidBar { row: 1, .. }));
    }

    #[test]
    fn series_validation_applies() {
        let csv = "index,open,high,low,close,signal\n2,1,2,1,1.5,0\n1,1,2,1,1.5,0\n";
        assert!(matches!(
            parse_bars(csv.as_bytes()),
            Err(SimError::InvalidBar { row: 1, .. })
        ));
    }

    #[test]
    fn load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bars.csv");
        fs::write(&path, SAMPLE).unwrap();
        let series = CsvAdapter::new(path).load_bars().unwrap();
        assert_eq!(series.len(), 3);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result = CsvAdapter::new(dir.path().join("none.csv")).load_bars();
        assert!(matches!(result, Err(SimError::Io(_))));
    }
}
