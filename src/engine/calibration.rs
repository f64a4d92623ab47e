//! Calibration of win-probability predictions against realized outcomes.
//!
//! Samples are `(predicted, outcome)` pairs with outcome 1.0 for a chase won
//! and 0.0 otherwise. One match broadcasts a single outcome to every row, so
//! its curve is degenerate (every populated bin observes 0 or 1). Pool the
//! samples of many matches to get a meaningful curve.

use crate::db::models::{CalibrationRow, CalibrationSummary};

pub const DEFAULT_BINS: usize = 10;

const EPS: f64 = 1e-6;

fn clamp_prob(p: f64) -> f64 {
    p.clamp(EPS, 1.0 - EPS)
}

fn logloss(p: f64, y: f64) -> f64 {
    let p = clamp_prob(p);
    -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
}

/// Bin of a prediction: `floor(p * n)` clamped to `[0, n - 1]`, so 1.0 lands
/// in the last bin.
pub fn bin_index(p: f64, n_bins: usize) -> usize {
    let last = n_bins.saturating_sub(1);
    let idx = (p * n_bins as f64).floor();
    if idx <= 0.0 {
        0
    } else {
        (idx as usize).min(last)
    }
}

/// Equal-width calibration curve over [0, 1].
///
/// Always returns exactly `n_bins` rows; empty bins carry `None` means and a
/// zero count. Non-finite predictions are ignored.
pub fn calibration_curve(samples: &[(f64, f64)], n_bins: usize) -> Vec<CalibrationRow> {
    let mut pred_sum = vec![0.0f64; n_bins];
    let mut obs_sum = vec![0.0f64; n_bins];
    let mut counts = vec![0usize; n_bins];

    for &(p, y) in samples {
        if !p.is_finite() || n_bins == 0 {
            continue;
        }
        let b = bin_index(p, n_bins);
        pred_sum[b] += p;
        obs_sum[b] += y;
        counts[b] += 1;
    }

    (0..n_bins)
        .map(|b| {
            let count = counts[b];
            let mean = |sum: f64| (count > 0).then(|| sum / count as f64);
            CalibrationRow {
                bin_mid: (b as f64 + 0.5) / n_bins as f64,
                pred_mean: mean(pred_sum[b]),
                obs_rate: mean(obs_sum[b]),
                count,
            }
        })
        .collect()
}

/// Brier score and log loss over the finite samples; `None` when there are
/// none.
pub fn summarize(samples: &[(f64, f64)]) -> Option<CalibrationSummary> {
    let mut n = 0usize;
    let mut brier = 0.0;
    let mut ll = 0.0;
    for &(p, y) in samples {
        if !p.is_finite() {
            continue;
        }
        n += 1;
        brier += (p - y).powi(2);
        ll += logloss(p, y);
    }
    if n == 0 {
        return None;
    }
    Some(CalibrationSummary {
        samples: n,
        brier: brier / n as f64,
        log_loss: ll / n as f64,
    })
}
