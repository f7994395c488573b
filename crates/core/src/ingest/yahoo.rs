use crate::config::Settings;
use crate::domain::market::{PriceBar, PriceSeries};
use crate::error::SourceError;
use crate::ingest::provider::{PriceQuery, PriceSource};
use anyhow::{Context, Result};
use chrono::DateTime;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use std::time::Duration;

const SOURCE_NAME: &str = "yahoo_chart";
const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; stockdash/0.1)";

/// Live daily candles from the Yahoo Finance v8 chart endpoint.
#[derive(Debug, Clone)]
pub struct YahooChartSource {
    http: reqwest::Client,
    base_url: String,
}

impl YahooChartSource {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings
            .live_provider_base_url
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Self::new(base_url, settings.live_timeout())
    }

    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build live provider http client")?;

        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    fn url(&self, symbol: &str) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .with_context(|| format!("invalid live provider base url: {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("live provider base url cannot carry a path"))?
            .pop_if_empty()
            .extend(["v8", "finance", "chart", symbol]);
        Ok(url)
    }

    async fn fetch_once(&self, query: &PriceQuery) -> Result<ChartResponse> {
        let url = self.url(&query.symbol)?;

        let res = self
            .http
            .get(url)
            .query(&[
                ("range", query.period.as_str()),
                ("interval", query.interval.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SourceError::new(SOURCE_NAME, "request", e.to_string()))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| SourceError::new(SOURCE_NAME, "read", e.to_string()))?;

        if !status.is_success() {
            let detail = format!("HTTP {status}: {text}");
            return Err(SourceError::new(SOURCE_NAME, "status", detail).into());
        }

        let parsed = serde_json::from_str::<ChartResponse>(&text)
            .map_err(|e| SourceError::new(SOURCE_NAME, "parse", e.to_string()))?;
        Ok(parsed)
    }
}

#[async_trait::async_trait]
impl PriceSource for YahooChartSource {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    async fn fetch(&self, query: &PriceQuery) -> Result<Option<PriceSeries>> {
        let response = self.fetch_once(query).await?;
        let bars = parse_chart(response)
            .map_err(|e| SourceError::new(SOURCE_NAME, "validate", format!("{e:#}")))?;
        Ok(bars.map(|bars| PriceSeries::new(query.symbol.clone(), SOURCE_NAME, bars)))
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: Option<ChartMeta>,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

/// Converts a chart payload into bars. `Ok(None)` when the provider returned no rows.
fn parse_chart(response: ChartResponse) -> Result<Option<Vec<PriceBar>>> {
    if let Some(err) = response.chart.error {
        anyhow::bail!(
            "provider error {}: {}",
            err.code.as_deref().unwrap_or("unknown"),
            err.description.as_deref().unwrap_or("no description")
        );
    }

    let Some(result) = response.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(None);
    };
    if result.timestamp.is_empty() {
        return Ok(None);
    }

    let quote = result
        .indicators
        .quote
        .into_iter()
        .next()
        .context("chart result has timestamps but no quote block")?;

    let rows = result.timestamp.len();
    for (column, len) in [
        ("open", quote.open.len()),
        ("high", quote.high.len()),
        ("low", quote.low.len()),
        ("close", quote.close.len()),
        ("volume", quote.volume.len()),
    ] {
        anyhow::ensure!(
            len == rows,
            "{column} column has {len} values for {rows} timestamps"
        );
    }

    let offset = result.meta.map(|m| m.gmtoffset).unwrap_or(0);
    let mut bars = Vec::with_capacity(rows);
    for (i, ts) in result.timestamp.iter().enumerate() {
        let fields = [
            quote.open[i],
            quote.high[i],
            quote.low[i],
            quote.close[i],
            quote.volume[i],
        ];
        // Placeholder rows for slots without trades come back entirely null.
        if fields.iter().all(Option::is_none) {
            continue;
        }
        let [Some(open), Some(high), Some(low), Some(close), Some(volume)] = fields else {
            anyhow::bail!("partial OHLCV row at timestamp {ts}");
        };

        let date = DateTime::from_timestamp(ts + offset, 0)
            .with_context(|| format!("timestamp out of range: {ts}"))?
            .date_naive();

        let bar = PriceBar {
            date,
            open,
            high,
            low,
            close,
            volume,
        };
        bar.validate()?;
        bars.push(bar);
    }

    Ok(Some(bars))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::{json, Value};

    fn parse(v: Value) -> Result<Option<Vec<PriceBar>>> {
        parse_chart(serde_json::from_value::<ChartResponse>(v).unwrap())
    }

    fn chart(timestamps: Value, quote: Value, gmtoffset: i64) -> Value {
        json!({
            "chart": {
                "result": [{
                    "meta": {"symbol": "AAPL", "gmtoffset": gmtoffset},
                    "timestamp": timestamps,
                    "indicators": {"quote": [quote]}
                }],
                "error": null
            }
        })
    }

    #[test]
    fn parses_rows_in_exchange_local_dates() {
        // 2025-01-02 14:30 UTC and 2025-01-03 14:30 UTC; New York offset keeps the same day.
        // 2025-01-03 02:00 UTC shifts back to 2025-01-02 in New York.
        let v = chart(
            json!([1735828200, 1735914600]),
            json!({
                "open": [10.0, 11.0],
                "high": [12.0, 13.0],
                "low": [9.0, 10.5],
                "close": [11.0, 12.5],
                "volume": [1000.0, 2000.0]
            }),
            -18000,
        );
        let bars = parse(v).unwrap().unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());
        assert_eq!(bars[1].date, NaiveDate::from_ymd_opt(2025, 1, 3).unwrap());
        assert_eq!(bars[1].close, 12.5);

        let late = chart(
            json!([1735869600]),
            json!({"open": [1.0], "high": [1.0], "low": [1.0], "close": [1.0], "volume": [1.0]}),
            -18000,
        );
        let bars = parse(late).unwrap().unwrap();
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());
    }

    #[test]
    fn skips_all_null_rows() {
        let v = chart(
            json!([1735828200, 1735914600]),
            json!({
                "open": [10.0, null],
                "high": [12.0, null],
                "low": [9.0, null],
                "close": [11.0, null],
                "volume": [1000.0, null]
            }),
            0,
        );
        assert_eq!(parse(v).unwrap().unwrap().len(), 1);
    }

    #[test]
    fn rejects_partial_rows() {
        let v = chart(
            json!([1735828200]),
            json!({"open": [10.0], "high": [12.0], "low": [9.0], "close": [null], "volume": [5.0]}),
            0,
        );
        let err = parse(v).unwrap_err();
        assert!(err.to_string().contains("partial"));
    }

    #[test]
    fn rejects_mismatched_columns() {
        let v = chart(
            json!([1735828200, 1735914600]),
            json!({
                "open": [10.0],
                "high": [12.0, 1.0],
                "low": [9.0, 1.0],
                "close": [1.0, 1.0],
                "volume": [5.0, 1.0]
            }),
            0,
        );
        assert!(parse(v).is_err());
    }

    #[test]
    fn provider_error_is_an_error() {
        let v = json!({
            "chart": {
                "result": null,
                "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}
            }
        });
        let err = parse(v).unwrap_err();
        assert!(err.to_string().contains("delisted"));
    }

    #[test]
    fn empty_result_is_no_data() {
        let v = json!({"chart": {"result": [], "error": null}});
        assert!(parse(v).unwrap().is_none());

        let v = json!({
            "chart": {
                "result": [{"meta": {"gmtoffset": 0}, "indicators": {"quote": [{}]}}],
                "error": null
            }
        });
        assert!(parse(v).unwrap().is_none());
    }

    #[test]
    fn builds_chart_url_with_encoded_symbol() {
        let source = YahooChartSource::new("http://127.0.0.1:9/", Duration::from_secs(1)).unwrap();
        let url = source.url("BRK B").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9/v8/finance/chart/BRK%20B");
    }

    #[tokio::test]
    async fn unreachable_provider_is_a_request_error() {
        let source = YahooChartSource::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        let err = source
            .fetch(&PriceQuery::new("AAPL", "1y", "1d"))
            .await
            .unwrap_err();
        let diag = err.downcast_ref::<SourceError>().unwrap();
        assert_eq!(diag.stage, "request");
    }
}
