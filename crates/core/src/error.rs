use std::fmt;

/// Failures the HTTP layer maps to client-facing status codes.
#[derive(Debug, Clone, PartialEq)]
pub enum StockDataError {
    NotFound { symbol: String },
    InsufficientData { required: usize, available: usize },
}

impl fmt::Display for StockDataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { symbol } => write!(f, "No data for symbol {symbol}"),
            Self::InsufficientData {
                required,
                available,
            } => write!(
                f,
                "Not enough data to predict: need at least {required} observations, got {available}"
            ),
        }
    }
}

impl std::error::Error for StockDataError {}

/// Diagnostic attached to a failed price source call.
#[derive(Debug, Clone)]
pub struct SourceError {
    pub source_name: &'static str,
    pub stage: &'static str,
    pub detail: String,
}

impl SourceError {
    pub fn new(source_name: &'static str, stage: &'static str, detail: impl Into<String>) -> Self {
        Self {
            source_name,
            stage,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "price source error (source={}, stage={}): {}",
            self.source_name, self.stage, self.detail
        )
    }
}

impl std::error::Error for SourceError {}
