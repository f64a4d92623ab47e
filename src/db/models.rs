use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ingest::coerce;

/// One ball event as flattened from a match record.
///
/// Numeric fields are already integers: anything unparseable in the source
/// was coerced to 0 on the way in.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Delivery {
    #[serde(default, deserialize_with = "coerce::lenient_date")]
    pub match_date: Option<NaiveDate>,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    /// Tournament / series name
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub toss_winner: Option<String>,
    /// "bat" | "field"
    #[serde(default)]
    pub toss_decision: Option<String>,
    /// 1 = first innings, 2 = chase. Super overs continue at 3, 4, …
    #[serde(default, deserialize_with = "coerce::lenient_int")]
    pub innings: i64,
    #[serde(default)]
    pub batting_team: Option<String>,
    /// 1-indexed over number
    #[serde(default, deserialize_with = "coerce::lenient_int")]
    pub over: i64,
    #[serde(default, deserialize_with = "coerce::lenient_int")]
    pub ball_in_over: i64,
    #[serde(default)]
    pub striker: Option<String>,
    #[serde(default)]
    pub non_striker: Option<String>,
    #[serde(default)]
    pub bowler: Option<String>,
    #[serde(default, deserialize_with = "coerce::lenient_int")]
    pub runs_batter: i64,
    #[serde(default, deserialize_with = "coerce::lenient_int")]
    pub runs_extras: i64,
    #[serde(default, deserialize_with = "coerce::lenient_int")]
    pub runs_total: i64,
    /// e.g. "wides", "noballs", "byes", "legbyes"
    #[serde(default)]
    pub extras_type: Option<String>,
    #[serde(default, deserialize_with = "coerce::lenient_bool")]
    pub wicket_event: bool,
    #[serde(default)]
    pub dismissal_kind: Option<String>,
    #[serde(default)]
    pub player_out: Option<String>,
}

/// Coarse over-range bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Powerplay,
    Middle,
    Death,
}

impl Phase {
    /// Overs 1–6 powerplay, 7–15 middle, everything else death.
    pub fn from_over(over: i64) -> Self {
        match over {
            1..=6 => Phase::Powerplay,
            7..=15 => Phase::Middle,
            _ => Phase::Death,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Powerplay => "powerplay",
            Phase::Middle => "middle",
            Phase::Death => "death",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A delivery enriched with match-state features.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedDelivery {
    pub delivery: Delivery,
    pub phase: Phase,
    /// False only for wides
    pub legal_ball: bool,
    pub innings_runs: i64,
    pub innings_wkts: i64,
    pub balls_bowled_legal: i64,
    /// 120 minus legal balls bowled. Negative values are kept as-is.
    pub balls_remaining: i64,
    // Chase-only fields; `None` on every other innings.
    pub target_runs: Option<i64>,
    pub runs_remaining: Option<i64>,
    pub crr: Option<f64>,
    pub rrr: Option<f64>,
}

/// One row of the chase with its predicted and adjusted win probability.
#[derive(Debug, Clone, PartialEq)]
pub struct WpRow {
    pub row: AnnotatedDelivery,
    pub wp_pred: f64,
    pub wp_opt: f64,
    pub wp_delta: f64,
}

/// The second innings of one match plus its realized outcome.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WpSeries {
    pub rows: Vec<WpRow>,
    /// Whether the chasing side reached the target
    pub chase_won: bool,
}

impl WpSeries {
    pub fn won_eventual(&self) -> f64 {
        if self.chase_won {
            1.0
        } else {
            0.0
        }
    }

    /// (prediction, outcome) pairs for calibration.
    pub fn samples(&self) -> Vec<(f64, f64)> {
        let y = self.won_eventual();
        self.rows.iter().map(|r| (r.wp_pred, y)).collect()
    }
}

/// One fixed-width probability bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRow {
    pub bin_mid: f64,
    pub pred_mean: Option<f64>,
    pub obs_rate: Option<f64>,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSummary {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

/// Everything the pipeline derives from one finished match.
#[derive(Debug, Clone)]
pub struct MatchReport {
    /// Source file stem, used to name outputs
    pub key: String,
    pub annotated: Vec<AnnotatedDelivery>,
    pub first_innings_total: i64,
    pub target_runs: i64,
    pub series: WpSeries,
    pub calibration: Vec<CalibrationRow>,
    pub summary: Option<CalibrationSummary>,
    pub delta_histogram: Vec<HistogramBin>,
}

/// Per-match summary row stored in the output database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMatch {
    pub key: String,
    pub match_date: Option<NaiveDate>,
    pub venue: Option<String>,
    pub event: Option<String>,
    pub first_innings_total: i64,
    pub target_runs: i64,
    pub chase_won: bool,
    pub deliveries: i64,
    pub brier: Option<f64>,
    pub processed_at: DateTime<Utc>,
}
