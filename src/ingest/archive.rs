use anyhow::Result;
use serde_json::Value;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, warn};

use super::cricsheet::{discover_match_files, CricsheetMatch};
use super::{provider::DeliverySource, IngestError};

/// A parsed Cricsheet match document and the name its outputs are keyed by.
#[derive(Debug, Clone)]
pub struct MatchDocument {
    pub name: String,
    pub raw: Value,
}

fn is_zip(input: &Path) -> bool {
    input.is_file()
        && input
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

fn stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}

/// Feed every match document under `input` to `visit`, in sorted name order.
///
/// `input` may be a Cricsheet `.zip` archive, a single JSON file or a
/// directory of them. Documents that cannot be read or parsed are logged and
/// skipped. Returns the number of documents visited.
pub fn visit_documents<F>(input: &Path, mut visit: F) -> Result<usize>
where
    F: FnMut(MatchDocument) -> Result<()>,
{
    if is_zip(input) {
        return visit_archive(input, visit);
    }

    let mut visited = 0usize;
    for path in discover_match_files(input).map_err(|source| IngestError::Read {
        path: input.to_path_buf(),
        source,
    })? {
        let source = CricsheetMatch::new(path);
        match source.read_document() {
            Ok(raw) => {
                visit(MatchDocument {
                    name: source.name().to_string(),
                    raw,
                })?;
                visited += 1;
            }
            Err(e) => warn!("Skipping {}: {}", source.path().display(), e),
        }
    }
    Ok(visited)
}

fn visit_archive<F>(path: &Path, mut visit: F) -> Result<usize>
where
    F: FnMut(MatchDocument) -> Result<()>,
{
    let archive_err = |source| IngestError::Archive {
        path: path.to_path_buf(),
        source,
    };
    let file = std::fs::File::open(path).map_err(|source| IngestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file)).map_err(archive_err)?;

    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.to_ascii_lowercase().ends_with(".json"))
        .map(str::to_string)
        .collect();
    names.sort();
    debug!("{} JSON entries in {}", names.len(), path.display());

    let mut visited = 0usize;
    for name in names {
        let mut text = String::new();
        let read = archive
            .by_name(&name)
            .map_err(|e| e.to_string())
            .and_then(|mut entry| entry.read_to_string(&mut text).map_err(|e| e.to_string()));
        if let Err(e) = read {
            warn!("Skipping {}:{}: {}", path.display(), name, e);
            continue;
        }
        let raw: Value = match serde_json::from_str(&text) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Skipping {}:{}: invalid JSON: {}", path.display(), name, e);
                continue;
            }
        };
        visit(MatchDocument {
            name: stem(&name),
            raw,
        })?;
        visited += 1;
    }
    Ok(visited)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_archive(path: &Path, entries: &[(&str, String)]) {
        let mut zip = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, body) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    fn collect(input: &Path) -> (usize, Vec<MatchDocument>) {
        let mut docs = Vec::new();
        let n = visit_documents(input, |d| {
            docs.push(d);
            Ok(())
        })
        .unwrap();
        (n, docs)
    }

    #[test]
    fn reads_json_entries_from_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t20s_json.ZIP");
        write_archive(
            &path,
            &[
                ("t20s/1001.json", json!({ "info": { "venue": "B" } }).to_string()),
                ("README.txt", "not a match".to_string()),
                ("t20s/0999.json", json!({ "info": { "venue": "A" } }).to_string()),
                ("t20s/broken.json", "{ nope".to_string()),
            ],
        );

        let (n, docs) = collect(&path);
        assert_eq!(n, 2);
        let names: Vec<_> = docs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["0999", "1001"]);
        assert_eq!(docs[0].raw["info"]["venue"], "A");
    }

    #[test]
    fn reads_directory_and_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.json"), "{}").unwrap();
        std::fs::write(dir.path().join("a.json"), "[1, 2").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "{}").unwrap();

        let (n, docs) = collect(dir.path());
        assert_eq!(n, 1);
        assert_eq!(docs[0].name, "b");
    }

    #[test]
    fn selects_one_match_from_archive() {
        use crate::ingest::{flatten_match, BestMatch, MatchFilter};

        let game = |date: &str, teams: [&str; 2], event: &str| {
            json!({
                "info": { "dates": [date], "teams": teams, "event": { "name": event } },
                "innings": [ { "team": teams[0], "overs": [ { "over": 0, "deliveries": [
                    { "batter": "A", "non_striker": "B", "bowler": "X",
                      "runs": { "batter": 1, "extras": 0, "total": 1 } }
                ]}]}]
            })
            .to_string()
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t20s_json.zip");
        write_archive(
            &path,
            &[
                ("1.json", game("2016-04-03", ["India", "Pakistan"], "Asia Cup")),
                ("2.json", game("2016-04-03", ["England", "Windies"], "ICC World Twenty20")),
                ("3.json", game("2016-04-04", ["England", "West Indies"], "ICC World Twenty20")),
            ],
        );

        let filter = MatchFilter::new(
            chrono::NaiveDate::from_ymd_opt(2016, 4, 3),
            &["England".to_string(), "West Indies".to_string()],
            &["world twenty20".to_string()],
        );
        let mut best = BestMatch::new(filter);
        let visited = visit_documents(&path, |d| {
            best.offer(d);
            Ok(())
        })
        .unwrap();
        assert_eq!(visited, 3);
        assert!(best.is_complete());

        let (_, doc) = best.into_best().unwrap();
        assert_eq!(doc.name, "2");
        let rows = flatten_match(&doc.raw).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].batting_team.as_deref(), Some("England"));
    }

    #[test]
    fn corrupt_archive_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.zip");
        std::fs::write(&path, "definitely not a zip").unwrap();
        let err = visit_documents(&path, |_| Ok(())).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IngestError>(),
            Some(IngestError::Archive { .. })
        ));
    }
}
