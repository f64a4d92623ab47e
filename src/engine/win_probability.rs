//! In-play win probability for the chasing side.
//!
//! The heuristic is hand-specified, not fitted: a logistic over the run-rate
//! gap, wickets in hand and match phase, with a small boost once the chase is
//! within a couple of blows of the target. Its coefficients are fixed; the
//! calibration engine only measures how well it does.
//!
//! Callers go through [`WinProbabilityModel`] so that a learned model can
//! replace the heuristic without touching feature derivation or calibration.

use crate::db::models::AnnotatedDelivery;

use super::features::CHASE_INNINGS;

/// Weight of the CRR − RRR margin.
const MARGIN_K: f64 = 0.8;
/// Weight of the centred wickets-in-hand term.
const WICKETS_K: f64 = 0.6;
/// Wickets-in-hand multiplier once six or more are down.
const TAIL_PENALTY: f64 = 0.8;
const TAIL_WICKETS: f64 = 6.0;
const MIDDLE_OVERS_BONUS: f64 = 0.05;
const DEATH_OVERS_BONUS: f64 = -0.03;
/// Added once when within 6 runs, again when within 3.
const CLOSE_FINISH_NUDGE: f64 = 0.06;

/// A row → probability estimator.
pub trait WinProbabilityModel: Send + Sync {
    /// Probability that the chasing side wins, or `None` for rows outside
    /// the chase.
    fn predict(&self, row: &AnnotatedDelivery) -> Option<f64>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

/// The fixed run-rate / wickets / phase heuristic.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicModel;

impl WinProbabilityModel for HeuristicModel {
    fn predict(&self, row: &AnnotatedDelivery) -> Option<f64> {
        if row.delivery.innings != CHASE_INNINGS {
            return None;
        }
        Some(heuristic_win_prob(
            row.delivery.over,
            row.crr,
            row.rrr,
            Some(row.innings_wkts),
            row.runs_remaining,
            row.balls_remaining,
        ))
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}

/// Win probability from raw chase state. Missing rates and wickets count as
/// 0 here only. Always returns a value in [0, 1].
pub fn heuristic_win_prob(
    over: i64,
    crr: Option<f64>,
    rrr: Option<f64>,
    wickets: Option<i64>,
    runs_remaining: Option<i64>,
    balls_remaining: i64,
) -> f64 {
    // Chase complete / chase failed
    if runs_remaining == Some(0) {
        return 1.0;
    }
    if balls_remaining == 0 && runs_remaining.is_some_and(|r| r > 0) {
        return 0.0;
    }

    let crr = crr.filter(|v| v.is_finite()).unwrap_or(0.0);
    let rrr = rrr.filter(|v| v.is_finite()).unwrap_or(0.0);
    let wickets = wickets.unwrap_or(0) as f64;

    let margin = crr - rrr;
    let mut wickets_term = (10.0 - wickets).max(0.0) / 10.0;
    if wickets >= TAIL_WICKETS {
        wickets_term *= TAIL_PENALTY;
    }

    let z = MARGIN_K * margin + WICKETS_K * (wickets_term - 0.5) + phase_bonus(over);
    let mut p = sigmoid(z);

    if let Some(rr) = runs_remaining {
        if balls_remaining > 0 {
            if rr <= 6 {
                p = (p + CLOSE_FINISH_NUDGE).min(1.0);
            }
            if rr <= 3 {
                p = (p + CLOSE_FINISH_NUDGE).min(1.0);
            }
        }
    }

    p.clamp(0.0, 1.0)
}

/// Additive logit bonus keyed directly on the over number.
fn phase_bonus(over: i64) -> f64 {
    if over <= 6 {
        0.0
    } else if over <= 15 {
        MIDDLE_OVERS_BONUS
    } else {
        DEATH_OVERS_BONUS
    }
}

/// Standard logistic sigmoid function.
fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

// ── Tests ────────────────────────────────────────────────────────────────────
