pub mod catalog;
pub mod domain;
pub mod error;
pub mod indicators;
pub mod ingest;
pub mod predict;

pub mod config {
    use anyhow::Context;
    use std::path::PathBuf;
    use std::time::Duration;

    const DEFAULT_COMPANIES_PATH: &str = "companies.json";
    const DEFAULT_FALLBACK_DATA_DIR: &str = "data";
    const DEFAULT_FALLBACK_SYMBOL: &str = "AAPL";
    const DEFAULT_LIVE_TIMEOUT_SECS: u64 = 10;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub sentry_dsn: Option<String>,
        pub companies_path: Option<String>,
        pub fallback_data_dir: Option<String>,
        pub fallback_default_symbol: Option<String>,
        pub live_fetch_enabled: bool,
        pub live_provider_base_url: Option<String>,
        pub live_timeout_secs: Option<u64>,
        pub cors_allow_origins: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let live_fetch_enabled = match std::env::var("LIVE_FETCH_ENABLED").ok() {
                Some(raw) => parse_bool(&raw).with_context(|| {
                    format!("LIVE_FETCH_ENABLED must be true/false (got {raw:?})")
                })?,
                None => true,
            };

            let live_timeout_secs = match std::env::var("LIVE_TIMEOUT_SECS").ok() {
                Some(raw) => Some(parse_timeout_secs(&raw).with_context(|| {
                    format!("LIVE_TIMEOUT_SECS must be a positive integer (got {raw:?})")
                })?),
                None => None,
            };

            Ok(Self {
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                companies_path: std::env::var("COMPANIES_PATH").ok(),
                fallback_data_dir: std::env::var("FALLBACK_DATA_DIR").ok(),
                fallback_default_symbol: std::env::var("FALLBACK_DEFAULT_SYMBOL").ok(),
                live_fetch_enabled,
                live_provider_base_url: std::env::var("LIVE_PROVIDER_BASE_URL").ok(),
                live_timeout_secs,
                cors_allow_origins: std::env::var("CORS_ALLOW_ORIGINS").ok(),
            })
        }

        pub fn companies_path(&self) -> PathBuf {
            non_blank(self.companies_path.as_deref())
                .unwrap_or(DEFAULT_COMPANIES_PATH)
                .into()
        }

        pub fn fallback_data_dir(&self) -> PathBuf {
            non_blank(self.fallback_data_dir.as_deref())
                .unwrap_or(DEFAULT_FALLBACK_DATA_DIR)
                .into()
        }

        /// Live request timeout; unset or zero uses the default.
        pub fn live_timeout(&self) -> Duration {
            Duration::from_secs(
                self.live_timeout_secs
                    .filter(|s| *s > 0)
                    .unwrap_or(DEFAULT_LIVE_TIMEOUT_SECS),
            )
        }

        /// Symbol whose fallback file serves unknown symbols. An explicitly blank value
        /// disables the demo dataset.
        pub fn fallback_default_symbol(&self) -> Option<&str> {
            match self.fallback_default_symbol.as_deref() {
                None => Some(DEFAULT_FALLBACK_SYMBOL),
                Some(raw) => non_blank(Some(raw)),
            }
        }
    }

    fn non_blank(value: Option<&str>) -> Option<&str> {
        value.map(str::trim).filter(|s| !s.is_empty())
    }

    fn parse_timeout_secs(raw: &str) -> Option<u64> {
        raw.trim().parse::<u64>().ok().filter(|s| *s > 0)
    }

    fn parse_bool(raw: &str) -> Option<bool> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        }
    }

}
