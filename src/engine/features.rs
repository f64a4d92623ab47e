//! Match-state feature engine.
//!
//! Turns the delivery table of one finished match into per-ball running
//! totals, phase tags, run rates and chase metrics. Everything here is a pure
//! function of the delivery sequence; the only match-level aggregate (the
//! first-innings total) is computed once and passed down explicitly.

use crate::db::models::{AnnotatedDelivery, Delivery, Phase};

/// Legal balls in a 20-over innings.
pub const INNINGS_BALLS: i64 = 120;

/// The innings being chased.
pub const CHASE_INNINGS: i64 = 2;

/// Annotate a match, deriving the first-innings total from the rows.
pub fn annotate_match(deliveries: &[Delivery]) -> Vec<AnnotatedDelivery> {
    annotate_with_total(deliveries, first_innings_total(deliveries))
}

/// Annotate a match against a known first-innings total. Rows are stably
/// sorted by (innings, over, ball) before any running total is taken, and
/// are returned in that order.
pub fn annotate_with_total(deliveries: &[Delivery], first_total: i64) -> Vec<AnnotatedDelivery> {
    let mut sorted = deliveries.to_vec();
    sorted.sort_by_key(|d| (d.innings, d.over, d.ball_in_over));

    let mut out = Vec::with_capacity(sorted.len());
    for innings in sorted.chunk_by(|a, b| a.innings == b.innings) {
        annotate_innings(innings, first_total, &mut out);
    }
    out
}

/// Sum of total runs over all first-innings rows. Saturates instead of
/// overflowing on absurd coerced values.
pub fn first_innings_total(deliveries: &[Delivery]) -> i64 {
    deliveries
        .iter()
        .filter(|d| d.innings == 1)
        .map(|d| d.runs_total)
        .fold(0i64, i64::saturating_add)
}

/// Runs needed to win a chase of `first_total`.
pub fn target_for(first_total: i64) -> i64 {
    first_total.saturating_add(1)
}

/// Wides do not count toward the ball limit; no-balls do.
pub fn is_legal_ball(extras_type: Option<&str>) -> bool {
    !extras_type.is_some_and(|e| e.trim().eq_ignore_ascii_case("wides"))
}

/// Runs per six balls. `None` on a zero denominator or a non-finite result.
pub fn per_six(runs: i64, balls: i64) -> Option<f64> {
    if balls == 0 {
        return None;
    }
    let rate = runs as f64 * 6.0 / balls as f64;
    rate.is_finite().then_some(rate)
}

/// Running totals for one innings; `rows` must all share an innings number.
fn annotate_innings(rows: &[Delivery], first_total: i64, out: &mut Vec<AnnotatedDelivery>) {
    let mut runs = 0i64;
    let mut wkts = 0i64;
    let mut legal = 0i64;

    for d in rows {
        let legal_ball = is_legal_ball(d.extras_type.as_deref());
        runs = runs.saturating_add(d.runs_total);
        wkts += i64::from(d.wicket_event);
        legal += i64::from(legal_ball);
        let balls_remaining = INNINGS_BALLS - legal;

        let (target_runs, runs_remaining, crr, rrr) = if d.innings == CHASE_INNINGS {
            let target = target_for(first_total);
            let remaining = target.saturating_sub(runs).max(0);
            let rrr = if balls_remaining > 0 {
                per_six(remaining, balls_remaining)
            } else {
                None
            };
            (Some(target), Some(remaining), per_six(runs, legal), rrr)
        } else {
            (None, None, None, None)
        };

        out.push(AnnotatedDelivery {
            delivery: d.clone(),
            phase: Phase::from_over(d.over),
            legal_ball,
            innings_runs: runs,
            innings_wkts: wkts,
            balls_bowled_legal: legal,
            balls_remaining,
            target_runs,
            runs_remaining,
            crr,
            rrr,
        });
    }
}
