use anyhow::Context;
use std::path::{Path, PathBuf};
use stockdash_core::ingest::fallback::{symbol_file_name, write_series_csv};
use stockdash_core::ingest::provider::{PriceQuery, PriceSource};

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Written { path: PathBuf, bars: usize },
    DryRun { bars: usize },
    NoData,
}

impl RefreshOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::NoData)
    }
}

/// Pulls one symbol from `source` and stores it as that symbol's fallback file.
/// An empty live result leaves any existing file untouched.
pub async fn refresh_symbol(
    source: &dyn PriceSource,
    query: &PriceQuery,
    out_dir: &Path,
    dry_run: bool,
) -> anyhow::Result<RefreshOutcome> {
    let file_name = symbol_file_name(&query.symbol)
        .with_context(|| format!("symbol cannot name a fallback file: {:?}", query.symbol))?;

    let Some(series) = source.fetch(query).await? else {
        return Ok(RefreshOutcome::NoData);
    };
    if series.is_empty() {
        return Ok(RefreshOutcome::NoData);
    }

    if dry_run {
        return Ok(RefreshOutcome::DryRun { bars: series.len() });
    }

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let path = out_dir.join(file_name);
    write_series_csv(&path, &series.bars)?;

    Ok(RefreshOutcome::Written {
        path,
        bars: series.len(),
    })
}
