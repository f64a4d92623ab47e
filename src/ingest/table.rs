use anyhow::Result;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{provider::DeliverySource, IngestError};
use crate::db::models::Delivery;

/// File suffix of flattened ball-by-ball tables.
pub const TABLE_SUFFIX: &str = "_ball_by_ball.csv";

/// Delivery source backed by a ball-by-ball CSV table.
pub struct DeliveryTable {
    path: PathBuf,
    name: String,
}

impl DeliveryTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = file_name
            .strip_suffix(TABLE_SUFFIX)
            .or_else(|| file_name.strip_suffix(".csv"))
            .unwrap_or(&file_name)
            .to_string();
        DeliveryTable { path, name }
    }
}

impl DeliverySource for DeliveryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Vec<Delivery>> {
        let file = std::fs::File::open(&self.path).map_err(|source| IngestError::Read {
            path: self.path.clone(),
            source,
        })?;
        let rows = read_deliveries(file);
        debug!("Read {} deliveries from {}", rows.len(), self.path.display());
        Ok(rows)
    }
}

/// Deserialize a delivery table. Cells are coerced leniently; records that
/// cannot be read at all are skipped with a warning.
pub fn read_deliveries<R: Read>(reader: R) -> Vec<Delivery> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for (line, result) in rdr.deserialize::<Delivery>().enumerate() {
        match result {
            Ok(d) => rows.push(d),
            Err(e) => {
                skipped += 1;
                warn!("Skipping unreadable delivery record {}: {}", line + 2, e);
            }
        }
    }
    if skipped > 0 {
        warn!("{} delivery record(s) skipped", skipped);
    }
    rows
}

/// List the `*_ball_by_ball.csv` tables in `dir`, sorted by path.
pub fn discover_tables(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(TABLE_SUFFIX))
        })
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "match_date,venue,city,event,toss_winner,toss_decision,innings,batting_team,over,ball_in_over,striker,non_striker,bowler,runs_batter,runs_extras,runs_total,extras_type,wicket_event,dismissal_kind,player_out";

    #[test]
    fn reads_clean_rows() {
        let data = format!(
            "{HEADER}\n2022-10-23,MCG,Melbourne,T20 WC,India,field,1,Pakistan,1,1,A,B,X,4,0,4,,False,,\n\
             2022-10-23,MCG,Melbourne,T20 WC,India,field,2,India,1,1,C,D,Y,0,0,0,,True,caught,C\n"
        );
        let rows = read_deliveries(data.as_bytes());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].runs_total, 4);
        assert_eq!(rows[0].extras_type, None);
        assert!(!rows[0].wicket_event);
        assert!(rows[1].wicket_event);
        assert_eq!(rows[1].dismissal_kind.as_deref(), Some("caught"));
        assert_eq!(rows[1].match_date, chrono::NaiveDate::from_ymd_opt(2022, 10, 23));
    }

    #[test]
    fn coerces_garbage_numbers_to_zero() {
        let data = format!(
            "{HEADER}\nsometime,MCG,,,,,2,India,seven,1.0,C,D,Y,four,,6.0,wides,1,,\n"
        );
        let rows = read_deliveries(data.as_bytes());
        assert_eq!(rows.len(), 1);
        let d = &rows[0];
        assert_eq!(d.match_date, None);
        assert_eq!(d.innings, 2);
        assert_eq!(d.over, 0);
        assert_eq!(d.ball_in_over, 1);
        assert_eq!(d.runs_batter, 0);
        assert_eq!(d.runs_extras, 0);
        assert_eq!(d.runs_total, 6);
        assert_eq!(d.extras_type.as_deref(), Some("wides"));
        assert!(d.wicket_event);
    }

    #[test]
    fn tolerates_missing_and_extra_columns() {
        let data = "innings,over,ball_in_over,runs_total,phase\n2,3,4,1,middle\n";
        let rows = read_deliveries(data.as_bytes());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].over, 3);
        assert_eq!(rows[0].runs_total, 1);
        assert_eq!(rows[0].striker, None);
    }

    #[test]
    fn table_name_strips_suffix() {
        let t = DeliveryTable::new("outputs/IND_PAK_2022_T20WC_ball_by_ball.csv");
        assert_eq!(t.name(), "IND_PAK_2022_T20WC");
        let t = DeliveryTable::new("outputs/other.csv");
        assert_eq!(t.name(), "other");
    }

    #[test]
    fn discovers_only_ball_by_ball_tables() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b_ball_by_ball.csv"), HEADER).unwrap();
        std::fs::write(dir.path().join("a_ball_by_ball.csv"), HEADER).unwrap();
        std::fs::write(dir.path().join("a_features.csv"), HEADER).unwrap();

        let found = discover_tables(dir.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a_ball_by_ball.csv", "b_ball_by_ball.csv"]);
    }
}
