//! Toy "optimized" win probability.
//!
//! A post-hoc illustration, not a competing model: when the chase is behind
//! the required pace in the middle or death overs, the prediction is nudged
//! up a little. The delta series feeds the ΔWP histogram.

use crate::db::models::{AnnotatedDelivery, HistogramBin};

const MIDDLE_OVERS_NUDGE: f64 = 0.03;
const DEATH_OVERS_NUDGE: f64 = 0.02;

pub const DEFAULT_HIST_BINS: usize = 20;

/// Adjusted probability for one row. Depends only on that row's fields.
pub fn optimized_win_prob(row: &AnnotatedDelivery, wp_pred: f64) -> f64 {
    let behind_pace = matches!((row.rrr, row.crr), (Some(rrr), Some(crr)) if rrr > crr);
    if !behind_pace {
        return wp_pred;
    }
    let nudge = match row.delivery.over {
        7..=15 => MIDDLE_OVERS_NUDGE,
        o if o >= 16 => DEATH_OVERS_NUDGE,
        _ => return wp_pred,
    };
    (wp_pred + nudge).clamp(0.0, 1.0)
}

/// Equal-width histogram over the finite values.
///
/// The range is `[min, max]`; when every value is the same it widens to
/// `[v - 0.5, v + 0.5]`. The last bin is closed on the right. Empty input
/// gives no bins.
pub fn delta_histogram(values: &[f64], n_bins: usize) -> Vec<HistogramBin> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() || n_bins == 0 {
        return Vec::new();
    }

    let mut lo = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let mut hi = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / n_bins as f64;

    let mut counts = vec![0usize; n_bins];
    for v in finite {
        let idx = ((v - lo) / width).floor();
        let idx = if idx <= 0.0 { 0 } else { (idx as usize).min(n_bins - 1) };
        counts[idx] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            lower: lo + i as f64 * width,
            upper: lo + (i + 1) as f64 * width,
            count,
        })
        .collect()
}
