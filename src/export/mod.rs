//! Delimited-file output for every table the pipeline produces.
//!
//! Nulls are written as empty cells. Column names follow the ball-by-ball
//! table so downstream plotting scripts can read any of the files.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Display;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::db::models::{AnnotatedDelivery, Delivery, MatchReport, WpSeries};

const DELIVERY_COLUMNS: [&str; 20] = [
    "match_date",
    "venue",
    "city",
    "event",
    "toss_winner",
    "toss_decision",
    "innings",
    "batting_team",
    "over",
    "ball_in_over",
    "striker",
    "non_striker",
    "bowler",
    "runs_batter",
    "runs_extras",
    "runs_total",
    "extras_type",
    "wicket_event",
    "dismissal_kind",
    "player_out",
];

const FEATURE_COLUMNS: [&str; 10] = [
    "phase",
    "legal_ball",
    "innings_runs",
    "innings_wkts",
    "balls_bowled_legal",
    "balls_remaining",
    "target_runs",
    "runs_remaining",
    "CRR",
    "RRR",
];

const WP_COLUMNS: [&str; 4] = ["wp_pred", "wp_opt", "wp_delta", "won_eventual"];

fn cell<T: Display>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

fn text(v: &Option<String>) -> String {
    v.clone().unwrap_or_default()
}

fn annotated_fields(r: &AnnotatedDelivery) -> Vec<String> {
    let d = &r.delivery;
    vec![
        cell(d.match_date),
        text(&d.venue),
        text(&d.city),
        text(&d.event),
        text(&d.toss_winner),
        text(&d.toss_decision),
        d.innings.to_string(),
        text(&d.batting_team),
        d.over.to_string(),
        d.ball_in_over.to_string(),
        text(&d.striker),
        text(&d.non_striker),
        text(&d.bowler),
        d.runs_batter.to_string(),
        d.runs_extras.to_string(),
        d.runs_total.to_string(),
        text(&d.extras_type),
        d.wicket_event.to_string(),
        text(&d.dismissal_kind),
        text(&d.player_out),
        r.phase.to_string(),
        r.legal_ball.to_string(),
        r.innings_runs.to_string(),
        r.innings_wkts.to_string(),
        r.balls_bowled_legal.to_string(),
        r.balls_remaining.to_string(),
        cell(r.target_runs),
        cell(r.runs_remaining),
        cell(r.crr),
        cell(r.rrr),
    ]
}

/// Ball-by-ball table as produced by the flattener.
pub fn deliveries_to<W: Write>(out: W, rows: &[Delivery]) -> Result<()> {
    serialize_all(out, rows)
}

/// Annotated table: delivery columns followed by the match-state features.
pub fn annotated_to<W: Write>(out: W, rows: &[AnnotatedDelivery]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(DELIVERY_COLUMNS.iter().chain(FEATURE_COLUMNS.iter()))?;
    for r in rows {
        wtr.write_record(annotated_fields(r))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Chase rows with predicted, optimized and delta probability.
pub fn wp_series_to<W: Write>(out: W, series: &WpSeries) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(
        DELIVERY_COLUMNS
            .iter()
            .chain(FEATURE_COLUMNS.iter())
            .chain(WP_COLUMNS.iter()),
    )?;
    let won = series.won_eventual();
    for r in &series.rows {
        let mut fields = annotated_fields(&r.row);
        fields.extend([
            r.wp_pred.to_string(),
            r.wp_opt.to_string(),
            r.wp_delta.to_string(),
            won.to_string(),
        ]);
        wtr.write_record(fields)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Any flat serializable rows (calibration rows, histogram bins, …).
pub fn serialize_all<W: Write, T: Serialize>(out: W, rows: &[T]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Create `path` (and its parent directory) and hand it to `write`.
pub fn to_file<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(std::fs::File) -> Result<()>,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write(file).with_context(|| format!("Failed to write {}", path.display()))
}

/// Write the per-match outputs under `outdir`; returns the paths written.
pub fn write_report(outdir: &Path, report: &MatchReport) -> Result<Vec<PathBuf>> {
    let key = &report.key;
    let features = outdir.join(format!("{key}_features.csv"));
    let enriched = outdir.join(format!("{key}_wp_enriched.csv"));
    let calibration = outdir.join(format!("{key}_calibration.csv"));
    let hist = outdir.join(format!("{key}_delta_hist.csv"));

    to_file(&features, |f| annotated_to(f, &report.annotated))?;
    to_file(&enriched, |f| wp_series_to(f, &report.series))?;
    to_file(&calibration, |f| serialize_all(f, &report.calibration))?;
    to_file(&hist, |f| serialize_all(f, &report.delta_histogram))?;

    info!("Wrote {} outputs to {}", key, outdir.display());
    Ok(vec![features, enriched, calibration, hist])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::CalibrationRow;
    use crate::engine::features::tests::{ball, innings_of, wide};
    use crate::engine::pipeline::{analyze_match, PipelineOptions};
    use crate::engine::HeuristicModel;
    use crate::ingest::table::read_deliveries;

    fn sample_report() -> MatchReport {
        let mut deliveries = innings_of(1, 6, 2);
        deliveries.push(wide(2, 1, 1));
        deliveries.extend(innings_of(2, 6, 3));
        analyze_match("sample", &deliveries, &HeuristicModel, &PipelineOptions::default())
    }

    fn lines(bytes: Vec<u8>) -> Vec<String> {
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn annotated_header_and_nulls() {
        let report = sample_report();
        let mut buf = Vec::new();
        annotated_to(&mut buf, &report.annotated).unwrap();
        let lines = lines(buf);

        assert_eq!(lines.len(), 1 + 13);
        assert!(lines[0].starts_with("match_date,venue,city"));
        assert!(lines[0].ends_with("target_runs,runs_remaining,CRR,RRR"));
        // First-innings rows leave every chase column empty
        assert!(lines[1].ends_with(",,,,"));
        // The opening wide: no legal ball yet, so CRR is empty but RRR is not
        let wide_row: Vec<&str> = lines[7].split(',').collect();
        assert_eq!(wide_row[20], "powerplay");
        assert_eq!(wide_row[21], "false");
        assert_eq!(wide_row[26], "13");
        assert_eq!(wide_row[28], "");
        assert!(!wide_row[29].is_empty());
    }

    #[test]
    fn wp_series_columns() {
        let report = sample_report();
        let mut buf = Vec::new();
        wp_series_to(&mut buf, &report.series).unwrap();
        let lines = lines(buf);

        assert_eq!(lines.len(), 1 + 7);
        assert!(lines[0].ends_with("wp_pred,wp_opt,wp_delta,won_eventual"));
        // 13 needed, 1 + 18 scored: the chase is won
        assert!(lines[1..].iter().all(|l| l.ends_with(",1")));
    }

    #[test]
    fn calibration_rows_keep_empty_bins() {
        let rows = vec![
            CalibrationRow {
                bin_mid: 0.05,
                pred_mean: None,
                obs_rate: None,
                count: 0,
            },
            CalibrationRow {
                bin_mid: 0.15,
                pred_mean: Some(0.12),
                obs_rate: Some(1.0),
                count: 3,
            },
        ];
        let mut buf = Vec::new();
        serialize_all(&mut buf, &rows).unwrap();
        assert_eq!(
            lines(buf),
            vec!["bin_mid,pred_mean,obs_rate,count", "0.05,,,0", "0.15,0.12,1.0,3"]
        );
    }

    #[test]
    fn deliveries_round_trip_through_table_reader() {
        let mut rows = vec![ball(1, 1, 1, 4), wide(2, 1, 1)];
        rows[0].venue = Some("Eden Gardens, Kolkata".into());
        rows[0].match_date = chrono::NaiveDate::from_ymd_opt(2016, 4, 3);
        let mut buf = Vec::new();
        deliveries_to(&mut buf, &rows).unwrap();
        let back = read_deliveries(buf.as_slice());
        assert_eq!(back, rows);
    }

    #[test]
    fn writes_all_report_files() {
        let dir = tempfile::tempdir().unwrap();
        let outdir = dir.path().join("wp_outputs");
        let written = write_report(&outdir, &sample_report()).unwrap();
        assert_eq!(written.len(), 4);
        for p in &written {
            assert!(p.exists(), "{} missing", p.display());
        }
        assert!(outdir.join("sample_calibration.csv").exists());
    }
}
