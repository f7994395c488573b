use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One raw OHLCV row as delivered by a price source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    pub fn validate(&self) -> anyhow::Result<()> {
        let fields = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ];
        for (name, value) in fields {
            anyhow::ensure!(
                value.is_finite() && value >= 0.0,
                "{name} must be a finite non-negative number on {} (got {value})",
                self.date
            );
        }
        Ok(())
    }
}

/// Chronologically ordered bars for one symbol, tagged with the source that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    pub symbol: String,
    pub source: &'static str,
    pub bars: Vec<PriceBar>,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>, source: &'static str, mut bars: Vec<PriceBar>) -> Self {
        // Stable sort keeps intraday rows that share a date in delivery order.
        bars.sort_by_key(|b| b.date);
        Self {
            symbol: symbol.into(),
            source,
            bars,
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub sma20: Option<f64>,
    pub sma50: Option<f64>,
    pub rsi14: Option<f64>,
}

/// Aggregates over the exact fetched window. The `_52w` names are kept for API
/// compatibility; they only cover 52 weeks when the caller asked for a one-year period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub high_52w: f64,
    pub low_52w: f64,
    pub avg_volume: f64,
}
