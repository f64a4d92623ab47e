use anyhow::{anyhow, Result};
use chrono::Utc;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex, MutexGuard};

pub mod models;
use models::*;

/// Thread-safe SQLite output store (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn, "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, "PRAGMA foreign_keys=ON;")
    }

    fn init(conn: Connection, pragmas: &str) -> Result<Self> {
        conn.execute_batch(pragmas)?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection mutex poisoned"))
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // ── Reports ──────────────────────────────────────────────────────────────

    /// Store one match report, replacing any earlier run for the same key.
    pub fn save_report(&self, report: &MatchReport) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM wp_rows WHERE match_key=?1", params![report.key])?;
        tx.execute(
            "DELETE FROM calibration_bins WHERE match_key=?1",
            params![report.key],
        )?;

        let first = report.annotated.first().map(|r| &r.delivery);
        tx.execute(
            "INSERT INTO matches (
                key, match_date, venue, event, first_innings_total,
                target_runs, chase_won, deliveries, brier, processed_at
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)
             ON CONFLICT(key) DO UPDATE SET
                match_date=excluded.match_date,
                venue=excluded.venue,
                event=excluded.event,
                first_innings_total=excluded.first_innings_total,
                target_runs=excluded.target_runs,
                chase_won=excluded.chase_won,
                deliveries=excluded.deliveries,
                brier=excluded.brier,
                processed_at=excluded.processed_at",
            params![
                report.key,
                first.and_then(|d| d.match_date),
                first.and_then(|d| d.venue.clone()),
                first.and_then(|d| d.event.clone()),
                report.first_innings_total,
                report.target_runs,
                report.series.chase_won,
                report.annotated.len() as i64,
                report.summary.map(|s| s.brier),
                Utc::now(),
            ],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO wp_rows (
                    match_key, idx, over_no, ball_in_over, innings_runs, innings_wkts,
                    balls_remaining, runs_remaining, crr, rrr,
                    wp_pred, wp_opt, wp_delta, won_eventual
                 ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
            )?;
            let won = report.series.won_eventual();
            for (idx, r) in report.series.rows.iter().enumerate() {
                stmt.execute(params![
                    report.key,
                    idx as i64,
                    r.row.delivery.over,
                    r.row.delivery.ball_in_over,
                    r.row.innings_runs,
                    r.row.innings_wkts,
                    r.row.balls_remaining,
                    r.row.runs_remaining,
                    r.row.crr,
                    r.row.rrr,
                    r.wp_pred,
                    r.wp_opt,
                    r.wp_delta,
                    won,
                ])?;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO calibration_bins (
                    match_key, bin_index, bin_mid, pred_mean, obs_rate, count
                 ) VALUES (?1,?2,?3,?4,?5,?6)",
            )?;
            for (idx, c) in report.calibration.iter().enumerate() {
                stmt.execute(params![
                    report.key,
                    idx as i64,
                    c.bin_mid,
                    c.pred_mean,
                    c.obs_rate,
                    c.count as i64,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// List stored match summaries, newest first
    pub fn list_matches(&self) -> Result<Vec<StoredMatch>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT key, match_date, venue, event, first_innings_total,
                    target_runs, chase_won, deliveries, brier, processed_at
             FROM matches ORDER BY processed_at DESC, key",
        )?;
        let matches = stmt
            .query_map([], map_match)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(matches)
    }

    /// Every stored (wp_pred, won_eventual) pair across all matches
    pub fn load_predictions(&self) -> Result<Vec<(f64, f64)>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT wp_pred, won_eventual FROM wp_rows ORDER BY match_key, idx")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Stored calibration rows of one match, in bin order
    pub fn load_calibration(&self, key: &str) -> Result<Vec<CalibrationRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT bin_mid, pred_mean, obs_rate, count
             FROM calibration_bins WHERE match_key=?1 ORDER BY bin_index",
        )?;
        let rows = stmt
            .query_map(params![key], |row| {
                let count: i64 = row.get(3)?;
                Ok(CalibrationRow {
                    bin_mid: row.get(0)?,
                    pred_mean: row.get(1)?,
                    obs_rate: row.get(2)?,
                    count: count.max(0) as usize,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

fn map_match(row: &rusqlite::Row) -> rusqlite::Result<StoredMatch> {
    Ok(StoredMatch {
        key: row.get(0)?,
        match_date: row.get(1)?,
        venue: row.get(2)?,
        event: row.get(3)?,
        first_innings_total: row.get(4)?,
        target_runs: row.get(5)?,
        chase_won: row.get(6)?,
        deliveries: row.get(7)?,
        brier: row.get(8)?,
        processed_at: row.get(9)?,
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS matches (
    key                 TEXT    PRIMARY KEY,
    match_date          TEXT,
    venue               TEXT,
    event               TEXT,
    first_innings_total INTEGER NOT NULL,
    target_runs         INTEGER NOT NULL,
    chase_won           INTEGER NOT NULL,
    deliveries          INTEGER NOT NULL,
    brier               REAL,
    processed_at        TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS wp_rows (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    match_key       TEXT    NOT NULL,
    idx             INTEGER NOT NULL,
    over_no         INTEGER NOT NULL,
    ball_in_over    INTEGER NOT NULL,
    innings_runs    INTEGER NOT NULL,
    innings_wkts    INTEGER NOT NULL,
    balls_remaining INTEGER NOT NULL,
    runs_remaining  INTEGER,
    crr             REAL,
    rrr             REAL,
    wp_pred         REAL    NOT NULL,
    wp_opt          REAL    NOT NULL,
    wp_delta        REAL    NOT NULL,
    won_eventual    REAL    NOT NULL,
    FOREIGN KEY (match_key) REFERENCES matches(key)
);

CREATE TABLE IF NOT EXISTS calibration_bins (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    match_key  TEXT    NOT NULL,
    bin_index  INTEGER NOT NULL,
    bin_mid    REAL    NOT NULL,
    pred_mean  REAL,
    obs_rate   REAL,
    count      INTEGER NOT NULL,
    FOREIGN KEY (match_key) REFERENCES matches(key)
);

CREATE INDEX IF NOT EXISTS idx_wp_rows_match ON wp_rows(match_key);
CREATE INDEX IF NOT EXISTS idx_calibration_bins_match ON calibration_bins(match_key);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::features::tests::{ball, innings_of};
    use crate::engine::pipeline::{analyze_match, PipelineOptions};
    use crate::engine::HeuristicModel;

    fn report(key: &str, first_innings: i64) -> MatchReport {
        let mut deliveries = vec![ball(1, 1, 1, first_innings)];
        deliveries.extend(innings_of(2, 24, 2));
        analyze_match(key, &deliveries, &HeuristicModel, &PipelineOptions::default())
    }

    #[test]
    fn round_trips_predictions_and_calibration() {
        let db = Database::open_in_memory().unwrap();
        let won = report("won", 30); // 31 needed, 48 scored
        let lost = report("lost", 150);
        db.save_report(&won).unwrap();
        db.save_report(&lost).unwrap();

        let preds = db.load_predictions().unwrap();
        assert_eq!(preds.len(), 48);
        assert_eq!(preds.iter().filter(|&&(_, y)| y == 1.0).count(), 24);

        let cal = db.load_calibration("won").unwrap();
        assert_eq!(cal, won.calibration);

        let matches = db.list_matches().unwrap();
        assert_eq!(matches.len(), 2);
        let stored = matches.iter().find(|m| m.key == "won").unwrap();
        assert!(stored.chase_won);
        assert_eq!(stored.target_runs, 31);
        assert_eq!(stored.deliveries, 25);
    }

    #[test]
    fn saving_again_replaces_rows() {
        let db = Database::open_in_memory().unwrap();
        let r = report("again", 30);
        db.save_report(&r).unwrap();
        db.save_report(&r).unwrap();

        assert_eq!(db.load_predictions().unwrap().len(), 24);
        assert_eq!(db.load_calibration("again").unwrap().len(), 10);
        assert_eq!(db.list_matches().unwrap().len(), 1);
    }

    #[test]
    fn file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wp.db");
        let path = path.to_str().unwrap();
        {
            let db = Database::open(path).unwrap();
            db.save_report(&report("kept", 30)).unwrap();
        }
        let db = Database::open(path).unwrap();
        assert_eq!(db.load_predictions().unwrap().len(), 24);
    }
}
