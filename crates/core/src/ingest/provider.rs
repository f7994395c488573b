use crate::domain::market::PriceSeries;
use crate::error::StockDataError;
use anyhow::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceQuery {
    pub symbol: String,
    pub period: String,
    pub interval: String,
}

impl PriceQuery {
    pub fn new(
        symbol: impl Into<String>,
        period: impl Into<String>,
        interval: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            period: period.into(),
            interval: interval.into(),
        }
    }
}

#[async_trait::async_trait]
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` means this source has nothing for the symbol; `Err` means it failed.
    async fn fetch(&self, query: &PriceQuery) -> Result<Option<PriceSeries>>;
}

/// Price sources tried in order until one yields a non-empty series.
///
/// Errors from every source but the last are logged and skipped. An error from the last
/// source is returned as is, and a chain where no source had data yields
/// [`StockDataError::NotFound`].
pub struct SourceChain {
    sources: Vec<Box<dyn PriceSource>>,
}

impl SourceChain {
    pub fn new(sources: Vec<Box<dyn PriceSource>>) -> Self {
        Self { sources }
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub async fn fetch(&self, query: &PriceQuery) -> Result<PriceSeries> {
        let last = self.sources.len().saturating_sub(1);

        for (idx, source) in self.sources.iter().enumerate() {
            match source.fetch(query).await {
                Ok(Some(series)) if !series.is_empty() => {
                    tracing::debug!(
                        symbol = %query.symbol,
                        source = source.name(),
                        resolved_symbol = %series.symbol,
                        bars = series.len(),
                        "price series resolved"
                    );
                    return Ok(series);
                }
                Ok(_) => {
                    tracing::debug!(
                        symbol = %query.symbol,
                        source = source.name(),
                        "no data from source"
                    );
                }
                Err(err) if idx < last => {
                    tracing::warn!(
                        symbol = %query.symbol,
                        source = source.name(),
                        error = %format!("{err:#}"),
                        "price source failed; falling back"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        Err(StockDataError::NotFound {
            symbol: query.symbol.clone(),
        }
        .into())
    }
}
