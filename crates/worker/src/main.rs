use clap::Parser;
use std::path::PathBuf;
use stockdash_core::catalog::CompanyCatalog;
use stockdash_core::ingest::provider::PriceQuery;
use stockdash_core::ingest::yahoo::YahooChartSource;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod refresh;

#[derive(Debug, Parser)]
#[command(name = "stockdash_worker")]
struct Args {
    /// Symbol to refresh (repeatable). Defaults to every symbol in the company catalog.
    #[arg(long = "symbol")]
    symbols: Vec<String>,

    /// Live lookback range, e.g. 6mo, 1y, 5y.
    #[arg(long, default_value = "1y")]
    period: String,

    /// Bar interval, e.g. 1d, 1wk.
    #[arg(long, default_value = "1d")]
    interval: String,

    /// Output directory. Defaults to FALLBACK_DATA_DIR.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Fetch and report, but do not write any files.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = stockdash_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let symbols = if args.symbols.is_empty() {
        let path = settings.companies_path();
        let catalog = CompanyCatalog::load(&path)?;
        anyhow::ensure!(
            !catalog.is_empty(),
            "company catalog {} lists no symbols; pass --symbol",
            path.display()
        );
        catalog.symbols().map(str::to_string).collect()
    } else {
        args.symbols.clone()
    };
    anyhow::ensure!(!symbols.is_empty(), "no symbols to refresh");

    let out_dir = args
        .out_dir
        .clone()
        .unwrap_or_else(|| settings.fallback_data_dir());
    let live = YahooChartSource::from_settings(&settings)?;

    let total = symbols.len();
    let mut refreshed = 0usize;
    for symbol in symbols {
        let query = PriceQuery::new(symbol.as_str(), args.period.as_str(), args.interval.as_str());
        match refresh::refresh_symbol(&live, &query, &out_dir, args.dry_run).await {
            Ok(outcome) => {
                if outcome.is_success() {
                    refreshed += 1;
                }
                tracing::info!(%symbol, ?outcome, "fallback refresh finished");
            }
            Err(err) => {
                sentry_anyhow::capture_anyhow(&err);
                tracing::warn!(
                    %symbol,
                    error = %format!("{err:#}"),
                    "fallback refresh failed; skipping symbol"
                );
            }
        }
    }

    tracing::info!(
        refreshed,
        total,
        dry_run = args.dry_run,
        out_dir = %out_dir.display(),
        "fallback refresh run complete"
    );
    anyhow::ensure!(refreshed > 0, "no symbol could be refreshed ({total} attempted)");
    Ok(())
}

fn init_sentry(settings: &stockdash_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
