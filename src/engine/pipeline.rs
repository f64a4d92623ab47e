use rayon::prelude::*;
use tracing::{info, warn};

use super::calibration::{calibration_curve, summarize, DEFAULT_BINS};
use super::features::{annotate_match, annotate_with_total, first_innings_total, target_for, CHASE_INNINGS};
use super::optimizer::{delta_histogram, optimized_win_prob, DEFAULT_HIST_BINS};
use super::win_probability::WinProbabilityModel;
use crate::db::models::{AnnotatedDelivery, Delivery, MatchReport, WpRow, WpSeries};
use crate::ingest::DeliverySource;

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// Calibration bins over [0, 1]
    pub bins: usize,
    /// Bins of the ΔWP histogram
    pub hist_bins: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            bins: DEFAULT_BINS,
            hist_bins: DEFAULT_HIST_BINS,
        }
    }
}

/// Score every chase row of an annotated match.
///
/// The chase counts as won if runs remaining hit exactly 0 on any row.
pub fn wp_series(annotated: &[AnnotatedDelivery], model: &dyn WinProbabilityModel) -> WpSeries {
    let mut rows = Vec::new();
    let mut chase_won = false;
    for row in annotated.iter().filter(|r| r.delivery.innings == CHASE_INNINGS) {
        chase_won |= row.runs_remaining == Some(0);
        let Some(wp_pred) = model.predict(row) else {
            continue;
        };
        let wp_opt = optimized_win_prob(row, wp_pred);
        rows.push(WpRow {
            row: row.clone(),
            wp_pred,
            wp_opt,
            wp_delta: wp_opt - wp_pred,
        });
    }
    WpSeries { rows, chase_won }
}

/// Run features → estimator → calibration (and the optimizer branch) for
/// one finished match.
pub fn analyze_match(
    key: &str,
    deliveries: &[Delivery],
    model: &dyn WinProbabilityModel,
    opts: &PipelineOptions,
) -> MatchReport {
    let first_total = first_innings_total(deliveries);
    let target_runs = target_for(first_total);
    let annotated = annotate_with_total(deliveries, first_total);
    let series = wp_series(&annotated, model);

    if series.rows.is_empty() {
        warn!("{}: no second-innings deliveries, WP series is empty", key);
    }

    let samples = series.samples();
    let calibration = calibration_curve(&samples, opts.bins);
    let summary = summarize(&samples);
    let deltas: Vec<f64> = series.rows.iter().map(|r| r.wp_delta).collect();
    let delta_histogram = delta_histogram(&deltas, opts.hist_bins);

    info!(
        "{}: {} deliveries, target {}, chase {} ({} WP rows, model={})",
        key,
        annotated.len(),
        target_runs,
        if series.chase_won { "won" } else { "lost" },
        series.rows.len(),
        model.name()
    );

    MatchReport {
        key: key.to_string(),
        annotated,
        first_innings_total: first_total,
        target_runs,
        series,
        calibration,
        summary,
        delta_histogram,
    }
}

/// Load every source and hand its deliveries to `run`. Sources that fail to
/// load are logged and skipped. With `parallel` the sources fan out over
/// rayon's pool; each one is still processed start to finish on one thread.
/// Output order follows input order either way.
fn for_each_source<T, F>(sources: &[Box<dyn DeliverySource>], parallel: bool, run: F) -> Vec<T>
where
    T: Send,
    F: Fn(&str, Vec<Delivery>) -> T + Sync,
{
    let run_one = |source: &Box<dyn DeliverySource>| match source.load() {
        Ok(deliveries) => Some(run(source.name(), deliveries)),
        Err(e) => {
            warn!("Skipping '{}': {:#}", source.name(), e);
            None
        }
    };

    if parallel {
        sources.par_iter().filter_map(run_one).collect()
    } else {
        sources.iter().filter_map(run_one).collect()
    }
}

/// Load and analyze every source.
pub fn analyze_sources(
    sources: &[Box<dyn DeliverySource>],
    model: &dyn WinProbabilityModel,
    opts: &PipelineOptions,
    parallel: bool,
) -> Vec<MatchReport> {
    for_each_source(sources, parallel, |name, deliveries| {
        analyze_match(name, &deliveries, model, opts)
    })
}

/// Load and annotate every source, keyed by source name.
pub fn annotate_sources(
    sources: &[Box<dyn DeliverySource>],
    parallel: bool,
) -> Vec<(String, Vec<AnnotatedDelivery>)> {
    for_each_source(sources, parallel, |name, deliveries| {
        (name.to_string(), annotate_match(&deliveries))
    })
}

/// Pool the (prediction, outcome) pairs of several matches.
pub fn pooled_samples(reports: &[MatchReport]) -> Vec<(f64, f64)> {
    reports.iter().flat_map(|r| r.series.samples()).collect()
}
