pub mod fallback;
pub mod provider;
pub mod yahoo;

use crate::config::Settings;
use provider::{PriceSource, SourceChain};

/// Live source first (when enabled), then the CSV fallback store.
pub fn build_source_chain(settings: &Settings) -> anyhow::Result<SourceChain> {
    let mut sources: Vec<Box<dyn PriceSource>> = Vec::new();
    if settings.live_fetch_enabled {
        sources.push(Box::new(yahoo::YahooChartSource::from_settings(settings)?));
    }
    sources.push(Box::new(fallback::CsvFallbackSource::from_settings(settings)));
    Ok(SourceChain::new(sources))
}
