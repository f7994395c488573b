use crate::domain::market::{Candle, Metrics, PriceBar, PriceSeries};

pub const SMA_SHORT_WINDOW: usize = 20;
pub const SMA_LONG_WINDOW: usize = 50;
pub const RSI_WINDOW: usize = 14;

/// Trailing simple moving average with a minimum of one period: positions with fewer
/// than `window` predecessors average whatever history exists. A zero window is treated as 1.
pub fn sma(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;

    for (i, value) in values.iter().enumerate() {
        sum += value;
        if i >= window {
            sum -= values[i - window];
        }
        let count = (i + 1).min(window);
        out.push(sum / count as f64);
    }

    out
}

/// Relative strength index using simple rolling means of gains and losses.
///
/// The change at position 0 counts as flat, so the first value appears at `window - 1`.
/// Windows without a single losing change have no defined RS and yield `None`.
pub fn rsi(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window == 0 {
        return out;
    }

    let changes: Vec<f64> = values
        .iter()
        .enumerate()
        .map(|(i, v)| if i == 0 { 0.0 } else { v - values[i - 1] })
        .collect();

    let mut gain_sum = 0.0;
    let mut loss_sum = 0.0;
    // Exact count of losing changes in the window; float sums can drift off zero.
    let mut losing = 0usize;

    for (i, &change) in changes.iter().enumerate() {
        gain_sum += change.max(0.0);
        loss_sum += (-change).max(0.0);
        if change < 0.0 {
            losing += 1;
        }

        if i >= window {
            let old = changes[i - window];
            gain_sum -= old.max(0.0);
            loss_sum -= (-old).max(0.0);
            if old < 0.0 {
                losing -= 1;
            }
        }

        if i + 1 < window || losing == 0 {
            continue;
        }

        let gain_mean = (gain_sum / window as f64).max(0.0);
        let loss_mean = loss_sum / window as f64;
        if loss_mean <= 0.0 {
            continue;
        }

        let rs = gain_mean / loss_mean;
        out[i] = Some((100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0));
    }

    out
}

pub fn compute_metrics(bars: &[PriceBar]) -> anyhow::Result<Metrics> {
    anyhow::ensure!(!bars.is_empty(), "cannot compute metrics over an empty series");

    let mut high = f64::NEG_INFINITY;
    let mut low = f64::INFINITY;
    let mut volume_sum = 0.0;
    for bar in bars {
        high = high.max(bar.high);
        low = low.min(bar.low);
        volume_sum += bar.volume;
    }

    Ok(Metrics {
        high_52w: high,
        low_52w: low,
        avg_volume: volume_sum / bars.len() as f64,
    })
}

pub fn build_candles(series: &PriceSeries) -> Vec<Candle> {
    let closes = series.closes();
    let sma_short = sma(&closes, SMA_SHORT_WINDOW);
    let sma_long = sma(&closes, SMA_LONG_WINDOW);
    let rsi = rsi(&closes, RSI_WINDOW);

    series
        .bars
        .iter()
        .enumerate()
        .map(|(i, bar)| Candle {
            date: bar.date,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            sma20: finite(Some(sma_short[i])),
            sma50: finite(Some(sma_long[i])),
            rsi14: finite(rsi[i]),
        })
        .collect()
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}
