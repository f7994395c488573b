use axum::{
    extract::{Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stockdash_core::catalog::CompanyCatalog;
use stockdash_core::domain::company::Company;
use stockdash_core::domain::market::{Candle, Metrics};
use stockdash_core::error::StockDataError;
use stockdash_core::indicators;
use stockdash_core::ingest::provider::{PriceQuery, SourceChain};
use stockdash_core::predict;

const DEFAULT_INTERVAL: &str = "1d";
const DEFAULT_HISTORY_PERIOD: &str = "1y";
const DEFAULT_PREDICT_PERIOD: &str = "6mo";

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

    let catalog = CompanyCatalog::load(&settings.companies_path())?;
    let sources = stockdash_core::ingest::build_source_chain(&settings)?;
    tracing::info!(
        companies = catalog.len(),
        sources = ?sources.source_names(),
        "loaded company catalog and price sources"
    );

    let state = AppState {
        catalog: Arc::new(catalog),
        sources: Arc::new(sources),
    };

    let app = router(state)
        .layer(cors_layer(settings.cors_allow_origins.as_deref())?)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/companies", get(get_companies))
        .route("/api/history", get(get_history))
        .route("/api/predict/next", get(get_prediction))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    catalog: Arc<CompanyCatalog>,
    sources: Arc<SourceChain>,
}

#[derive(Debug, Deserialize)]
struct SeriesParams {
    symbol: Option<String>,
    period: Option<String>,
    interval: Option<String>,
}

impl SeriesParams {
    fn into_query(self, default_period: &str) -> Result<PriceQuery, ApiError> {
        let symbol = non_blank(self.symbol)
            .ok_or_else(|| ApiError::BadRequest("symbol query parameter is required".to_string()))?;
        let period = non_blank(self.period).unwrap_or_else(|| default_period.to_string());
        let interval = non_blank(self.interval).unwrap_or_else(|| DEFAULT_INTERVAL.to_string());
        Ok(PriceQuery::new(symbol, period, interval))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[derive(Debug, Serialize, Deserialize)]
struct HistoryResponse {
    symbol: String,
    candles: Vec<Candle>,
    metrics: Metrics,
}

#[derive(Debug, Serialize, Deserialize)]
struct PredictionResponse {
    symbol: String,
    next_close_prediction: f64,
}

async fn get_companies(State(state): State<AppState>) -> Json<Vec<Company>> {
    Json(state.catalog.companies().to_vec())
}

async fn get_history(
    State(state): State<AppState>,
    Query(params): Query<SeriesParams>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let query = params.into_query(DEFAULT_HISTORY_PERIOD)?;
    let series = state.sources.fetch(&query).await?;

    let metrics = indicators::compute_metrics(&series.bars)?;
    let candles = indicators::build_candles(&series);

    Ok(Json(HistoryResponse {
        symbol: query.symbol,
        candles,
        metrics,
    }))
}

async fn get_prediction(
    State(state): State<AppState>,
    Query(params): Query<SeriesParams>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let query = params.into_query(DEFAULT_PREDICT_PERIOD)?;
    let series = state.sources.fetch(&query).await?;

    let next_close_prediction = predict::predict_next(&series.closes())?;

    Ok(Json(PredictionResponse {
        symbol: query.symbol,
        next_close_prediction,
    }))
}

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<StockDataError>() {
            Some(StockDataError::NotFound { .. }) => Self::NotFound(err.to_string()),
            Some(StockDataError::InsufficientData { .. }) => Self::BadRequest(err.to_string()),
            None => Self::Internal(err),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            // Internal detail is surfaced to the caller; this service is a demo backend.
            Self::Internal(err) => {
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %format!("{err:#}"), "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
            }
        };
        (status, Json(ErrorBody { detail })).into_response()
    }
}

fn cors_layer(allow_origins: Option<&str>) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers(Any);

    let origins = allow_origins
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "*");
    let Some(origins) = origins else {
        return Ok(layer.allow_origin(Any));
    };

    let origins = origins
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|o| {
            HeaderValue::from_str(o).with_context(|| format!("invalid CORS origin: {o}"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(layer.allow_origin(AllowOrigin::list(origins)))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use stockdash_core::ingest::fallback::CsvFallbackSource;
    use stockdash_core::ingest::provider::PriceSource;
    use stockdash_core::ingest::yahoo::YahooChartSource;
    use std::path::Path;
    use std::time::Duration;

    fn write_fallback(dir: &Path, symbol: &str, closes: &[f64]) {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let mut body = String::from("Date,Open,High,Low,Close,Volume\n");
        for (i, close) in closes.iter().enumerate() {
            let date = start + chrono::Duration::days(i as i64);
            body.push_str(&format!(
                "{date},{close},{},{},{close},{}\n",
                close + 1.0,
                close - 1.0,
                1000 + i
            ));
        }
        std::fs::write(dir.join(format!("{symbol}.csv")), body).unwrap();
    }

    fn catalog() -> CompanyCatalog {
        CompanyCatalog::new(vec![
            Company {
                symbol: "AAPL".to_string(),
                name: "Apple Inc.".to_string(),
            },
            Company {
                symbol: "MSFT".to_string(),
                name: "Microsoft Corporation".to_string(),
            },
        ])
        .unwrap()
    }

    async fn spawn(sources: Vec<Box<dyn PriceSource>>) -> String {
        let state = AppState {
            catalog: Arc::new(catalog()),
            sources: Arc::new(SourceChain::new(sources)),
        };
        let app = router(state).layer(cors_layer(None).unwrap());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn fallback_only(dir: &Path) -> Vec<Box<dyn PriceSource>> {
        vec![Box::new(CsvFallbackSource::new(dir, Some("AAPL".to_string())))]
    }

    #[tokio::test]
    async fn companies_lists_the_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn(fallback_only(dir.path())).await;

        let res = reqwest::get(format!("{base}/api/companies")).await.unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::OK);
        let body: Vec<Company> = res.json().await.unwrap();
        assert_eq!(body, catalog().companies().to_vec());
    }

    #[tokio::test]
    async fn history_for_unknown_symbol_serves_default_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + (i % 5) as f64).collect();
        write_fallback(dir.path(), "AAPL", &closes);
        let base = spawn(fallback_only(dir.path())).await;

        let res = reqwest::get(format!("{base}/api/history?symbol=ZZZZ")).await.unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::OK);
        let body: HistoryResponse = res.json().await.unwrap();
        assert_eq!(body.symbol, "ZZZZ");
        assert_eq!(body.candles.len(), 30);
        assert_eq!(body.candles[0].sma20, Some(100.0));
        assert_eq!(body.candles[0].rsi14, None);
        assert!(body.candles[13].rsi14.is_some());
        assert_eq!(body.metrics.high_52w, 105.0);
        assert_eq!(body.metrics.low_52w, 99.0);
    }

    #[tokio::test]
    async fn history_without_any_data_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn(fallback_only(dir.path())).await;

        let res = reqwest::get(format!("{base}/api/history?symbol=ZZZZ")).await.unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::NOT_FOUND);
        let body: ErrorBody = res.json().await.unwrap();
        assert!(body.detail.contains("ZZZZ"));
    }

    #[tokio::test]
    async fn unreachable_live_provider_falls_back_to_csv() {
        let dir = tempfile::tempdir().unwrap();
        write_fallback(dir.path(), "MSFT", &[10.0, 11.0, 12.0]);
        let live = YahooChartSource::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        let mut sources: Vec<Box<dyn PriceSource>> = vec![Box::new(live)];
        sources.extend(fallback_only(dir.path()));
        let base = spawn(sources).await;

        let res = reqwest::get(format!("{base}/api/history?symbol=MSFT&period=1mo&interval=1d"))
            .await
            .unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::OK);
        let body: HistoryResponse = res.json().await.unwrap();
        assert_eq!(body.candles.len(), 3);
        assert_eq!(body.candles[2].close, 12.0);
    }

    #[tokio::test]
    async fn malformed_fallback_is_500_with_message() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("AAPL.csv"),
            "Date,Open,High,Low,Close,Volume\n2025-01-01,1,2,0.5,oops,10\n",
        )
        .unwrap();
        let base = spawn(fallback_only(dir.path())).await;

        let res = reqwest::get(format!("{base}/api/history?symbol=AAPL")).await.unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        let body: ErrorBody = res.json().await.unwrap();
        assert!(body.detail.contains("line 2"), "{}", body.detail);
    }

    #[tokio::test]
    async fn missing_symbol_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn(fallback_only(dir.path())).await;

        let res = reqwest::get(format!("{base}/api/history?symbol=%20")).await.unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn prediction_extrapolates_linear_trend() {
        let dir = tempfile::tempdir().unwrap();
        let closes: Vec<f64> = (1..=10).map(f64::from).collect();
        write_fallback(dir.path(), "AAPL", &closes);
        let base = spawn(fallback_only(dir.path())).await;

        let res = reqwest::get(format!("{base}/api/predict/next?symbol=AAPL")).await.unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::OK);
        let body: PredictionResponse = res.json().await.unwrap();
        assert_eq!(body.symbol, "AAPL");
        assert!((body.next_close_prediction - 11.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn prediction_with_nine_rows_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let closes: Vec<f64> = (1..=9).map(f64::from).collect();
        write_fallback(dir.path(), "AAPL", &closes);
        let base = spawn(fallback_only(dir.path())).await;

        let res = reqwest::get(format!("{base}/api/predict/next?symbol=AAPL")).await.unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: ErrorBody = res.json().await.unwrap();
        assert!(body.detail.contains("Not enough data"));
    }

    #[tokio::test]
    async fn prediction_without_any_data_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn(fallback_only(dir.path())).await;

        let res = reqwest::get(format!("{base}/api/predict/next?symbol=ZZZZ"))
            .await
            .unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::NOT_FOUND);
        let body: ErrorBody = res.json().await.unwrap();
        assert!(body.detail.contains("ZZZZ"), "{}", body.detail);
    }

    #[test]
    fn params_apply_defaults() {
        let params = SeriesParams {
            symbol: Some(" AAPL ".to_string()),
            period: None,
            interval: Some("".to_string()),
        };
        let query = params.into_query(DEFAULT_PREDICT_PERIOD).unwrap();
        assert_eq!(query, PriceQuery::new("AAPL", "6mo", "1d"));
    }

    #[test]
    fn cors_rejects_invalid_origin() {
        assert!(cors_layer(Some("https://ok.example, bad\norigin")).is_err());
        assert!(cors_layer(Some("https://a.example,https://b.example")).is_ok());
        assert!(cors_layer(Some("*")).is_ok());
    }
}
