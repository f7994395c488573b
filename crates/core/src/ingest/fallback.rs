use crate::config::Settings;
use crate::domain::market::{PriceBar, PriceSeries};
use crate::ingest::provider::{PriceQuery, PriceSource};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const SOURCE_NAME: &str = "csv_fallback";

/// Static per-symbol CSV files (`{dir}/{SYMBOL}.csv`). Symbols without their own file are
/// served from the default symbol's file, so unknown tickers still render a demo chart.
#[derive(Debug, Clone)]
pub struct CsvFallbackSource {
    data_dir: PathBuf,
    default_symbol: Option<String>,
}

impl CsvFallbackSource {
    pub fn new(data_dir: impl Into<PathBuf>, default_symbol: Option<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            default_symbol,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.fallback_data_dir(),
            settings.fallback_default_symbol().map(str::to_string),
        )
    }

    /// File that would hold `symbol`'s series, or `None` if the symbol cannot name a file.
    pub fn path_for(&self, symbol: &str) -> Option<PathBuf> {
        symbol_file_name(symbol).map(|name| self.data_dir.join(name))
    }

    /// Exact-symbol file first, then the default symbol's file; only files that exist.
    fn resolve(&self, symbol: &str) -> Option<(String, PathBuf)> {
        let mut candidates = vec![symbol.to_string()];
        if let Some(default) = &self.default_symbol {
            if default != symbol {
                candidates.push(default.clone());
            }
        }

        candidates
            .into_iter()
            .filter_map(|s| self.path_for(&s).map(|p| (s, p)))
            .find(|(_, path)| path.is_file())
    }
}

#[async_trait::async_trait]
impl PriceSource for CsvFallbackSource {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    async fn fetch(&self, query: &PriceQuery) -> Result<Option<PriceSeries>> {
        let Some((resolved, path)) = self.resolve(&query.symbol) else {
            return Ok(None);
        };

        if resolved != query.symbol {
            tracing::info!(
                symbol = %query.symbol,
                fallback_symbol = %resolved,
                "no fallback file for symbol; serving default dataset"
            );
        }

        let bars = tokio::task::spawn_blocking(move || read_series_csv(&path))
            .await
            .context("fallback read task failed")??;

        Ok(Some(PriceSeries::new(resolved, SOURCE_NAME, bars)))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FallbackRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Open")]
    open: f64,
    #[serde(rename = "High")]
    high: f64,
    #[serde(rename = "Low")]
    low: f64,
    #[serde(rename = "Close")]
    close: f64,
    #[serde(rename = "Volume")]
    volume: f64,
}

/// Reads a fallback file. Any unparseable or out-of-range row fails the whole read.
pub fn read_series_csv(path: &Path) -> Result<Vec<PriceBar>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open fallback file {}", path.display()))?;

    let mut bars = Vec::new();
    for (idx, row) in reader.deserialize::<FallbackRow>().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        let row = row.with_context(|| format!("{}: malformed row at line {line}", path.display()))?;
        let bar = PriceBar {
            date: parse_date(&row.date)
                .with_context(|| format!("{}: bad Date at line {line}", path.display()))?,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        };
        bar.validate()
            .with_context(|| format!("{}: invalid values at line {line}", path.display()))?;
        bars.push(bar);
    }

    bars.sort_by_key(|b| b.date);
    Ok(bars)
}

/// Writes bars in the fallback format, replacing `path` atomically.
pub fn write_series_csv(path: &Path, bars: &[PriceBar]) -> Result<()> {
    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp)
            .with_context(|| format!("failed to create {}", tmp.display()))?;
        for bar in bars {
            writer.serialize(FallbackRow {
                date: bar.date.format("%Y-%m-%d").to_string(),
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
            })?;
        }
        writer
            .flush()
            .with_context(|| format!("failed to flush {}", tmp.display()))?;
    }
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to move {} into place", path.display()))?;
    Ok(())
}

/// Accepts `YYYY-MM-DD` with an optional trailing time part (`2024-01-02 00:00:00-05:00`).
fn parse_date(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    let day = raw.get(..10).unwrap_or(raw);
    let rest = &raw[day.len()..];
    anyhow::ensure!(
        rest.is_empty() || rest.starts_with(' ') || rest.starts_with('T'),
        "unexpected date format: {raw}"
    );
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .with_context(|| format!("unexpected date format: {raw}"))
}

/// File name for `symbol` inside a fallback directory; `None` for names that could escape it.
pub fn symbol_file_name(symbol: &str) -> Option<String> {
    let symbol = symbol.trim();
    if symbol.is_empty()
        || symbol.starts_with('.')
        || symbol.contains("..")
        || symbol.contains(['/', '\\', '\0'])
    {
        return None;
    }
    Some(format!("{symbol}.csv"))
}
