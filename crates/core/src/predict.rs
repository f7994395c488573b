use crate::error::StockDataError;

pub const MIN_OBSERVATIONS: usize = 10;

/// Fits an ordinary least-squares line through `(i, closes[i])` and extrapolates it to
/// `i = closes.len()`. Refit from scratch on every call.
pub fn predict_next(closes: &[f64]) -> anyhow::Result<f64> {
    let n = closes.len();
    if n < MIN_OBSERVATIONS {
        return Err(StockDataError::InsufficientData {
            required: MIN_OBSERVATIONS,
            available: n,
        }
        .into());
    }

    let n_f = n as f64;
    let x_mean = (n_f - 1.0) / 2.0;
    let y_mean = closes.iter().sum::<f64>() / n_f;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (i, y) in closes.iter().enumerate() {
        let dx = i as f64 - x_mean;
        sxx += dx * dx;
        sxy += dx * (y - y_mean);
    }

    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;
    let estimate = intercept + slope * n_f;

    anyhow::ensure!(
        estimate.is_finite(),
        "regression produced a non-finite estimate"
    );
    Ok(estimate)
}
