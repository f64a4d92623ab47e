use anyhow::Result;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{coerce, provider::DeliverySource, IngestError};
use crate::db::models::Delivery;

/// Delivery source backed by a single Cricsheet JSON match file.
/// Format docs: <https://cricsheet.org/format/json/>
pub struct CricsheetMatch {
    path: PathBuf,
    name: String,
}

impl CricsheetMatch {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "match".to_string());
        CricsheetMatch { path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the match document without flattening it.
    pub fn read_document(&self) -> Result<Value, IngestError> {
        let text = std::fs::read_to_string(&self.path).map_err(|source| IngestError::Read {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| IngestError::Json {
            path: self.path.clone(),
            source,
        })
    }
}

impl DeliverySource for CricsheetMatch {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Vec<Delivery>> {
        let rows = flatten_match(&self.read_document()?)?;
        debug!("Flattened {} deliveries from {}", rows.len(), self.path.display());
        Ok(rows)
    }
}

/// Match-level fields repeated on every delivery row.
#[derive(Debug, Clone, Default)]
struct MatchInfo {
    match_date: Option<chrono::NaiveDate>,
    venue: Option<String>,
    city: Option<String>,
    event: Option<String>,
    toss_winner: Option<String>,
    toss_decision: Option<String>,
}

impl MatchInfo {
    fn from_json(info: &Value) -> Self {
        let event = match &info["event"] {
            Value::Object(_) => text(&info["event"]["name"]),
            other => text(other),
        };
        MatchInfo {
            match_date: info["dates"]
                .as_array()
                .and_then(|d| d.first())
                .and_then(|d| d.as_str())
                .and_then(coerce::date),
            venue: text(&info["venue"]),
            city: text(&info["city"]),
            event,
            toss_winner: text(&info["toss"]["winner"]),
            toss_decision: text(&info["toss"]["decision"]),
        }
    }
}

/// Flatten a Cricsheet match document into one row per delivery.
///
/// Handles both the current layout (`innings[].overs[].deliveries[]`) and
/// the legacy one (`innings[]."1st innings".deliveries[]."0.1"`). Overs are
/// 0-based in both and are stored 1-based.
pub fn flatten_match(raw: &Value) -> Result<Vec<Delivery>, IngestError> {
    let info = MatchInfo::from_json(&raw["info"]);
    let innings = raw["innings"]
        .as_array()
        .ok_or(IngestError::MissingInnings)?;

    let mut rows = Vec::new();
    for (idx, block) in innings.iter().enumerate() {
        if block.get("overs").is_some() {
            rows.extend(current_innings(block, &info, idx as i64 + 1));
        } else {
            rows.extend(legacy_innings(block, &info)?);
        }
    }
    Ok(rows)
}

fn current_innings(block: &Value, info: &MatchInfo, innings: i64) -> Vec<Delivery> {
    let batting_team = text(&block["team"]);
    let mut rows = Vec::new();
    for over_obj in block["overs"].as_array().into_iter().flatten() {
        let over = int(&over_obj["over"]) + 1;
        let balls = over_obj["deliveries"].as_array().into_iter().flatten();
        for (i, ball) in balls.enumerate() {
            let ball_in_over = match &ball["ball"] {
                Value::Null => i as i64 + 1,
                v => int(v),
            };
            rows.push(delivery_row(
                ball,
                info,
                innings,
                batting_team.clone(),
                over,
                ball_in_over,
            ));
        }
    }
    rows
}

fn legacy_innings(block: &Value, info: &MatchInfo) -> Result<Vec<Delivery>, IngestError> {
    let Some((innings_name, body)) = block.as_object().and_then(|m| m.iter().next()) else {
        return Ok(Vec::new());
    };
    let innings = if innings_name.contains("1st") { 1 } else { 2 };
    let batting_team = text(&body["team"]);

    let mut rows = Vec::new();
    for entry in body["deliveries"].as_array().into_iter().flatten() {
        let Some((label, ball)) = entry.as_object().and_then(|m| m.iter().next()) else {
            continue;
        };
        let (over, ball_in_over) = parse_ball_label(label)?;
        rows.push(delivery_row(
            ball,
            info,
            innings,
            batting_team.clone(),
            over + 1,
            ball_in_over,
        ));
    }
    Ok(rows)
}

/// Split a legacy `"<over>.<ball>"` label.
fn parse_ball_label(label: &str) -> Result<(i64, i64), IngestError> {
    let (over, ball) = label
        .split_once('.')
        .ok_or_else(|| IngestError::BallLabel(label.to_string()))?;
    let over = over
        .trim()
        .parse::<i64>()
        .map_err(|_| IngestError::BallLabel(label.to_string()))?;
    let ball = ball
        .trim()
        .parse::<i64>()
        .map_err(|_| IngestError::BallLabel(label.to_string()))?;
    Ok((over, ball))
}

fn delivery_row(
    ball: &Value,
    info: &MatchInfo,
    innings: i64,
    batting_team: Option<String>,
    over: i64,
    ball_in_over: i64,
) -> Delivery {
    let runs = &ball["runs"];

    let wicket = match &ball["wicket"] {
        Value::Null => ball["wickets"].as_array().and_then(|w| w.first()),
        w => Some(w),
    };
    let wicket_event = wicket.is_some_and(|w| !w.is_null());

    Delivery {
        match_date: info.match_date,
        venue: info.venue.clone(),
        city: info.city.clone(),
        event: info.event.clone(),
        toss_winner: info.toss_winner.clone(),
        toss_decision: info.toss_decision.clone(),
        innings,
        batting_team,
        over,
        ball_in_over,
        striker: text(&ball["batter"]).or_else(|| text(&ball["batsman"])),
        non_striker: text(&ball["non_striker"]),
        bowler: text(&ball["bowler"]),
        runs_batter: match &runs["batter"] {
            Value::Null => int(&runs["batsman"]),
            v => int(v),
        },
        runs_extras: int(&runs["extras"]),
        runs_total: int(&runs["total"]),
        extras_type: extras_category(&ball["extras"]),
        wicket_event,
        dismissal_kind: wicket.and_then(|w| text(&w["kind"])),
        player_out: wicket.and_then(|w| text(&w["player_out"])),
    }
}

/// The extras category of a delivery. A wide wins over any other key it is
/// combined with (e.g. wides + penalty), since it decides ball legality.
fn extras_category(extras: &Value) -> Option<String> {
    let map = extras.as_object()?;
    if map.contains_key("wides") {
        return Some("wides".to_string());
    }
    map.keys().next().cloned()
}

fn text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn int(v: &Value) -> i64 {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => coerce::int_or_zero(s),
        _ => 0,
    }
}

/// Collect the `.json` files under `input` (or `input` itself if it is a file),
/// sorted by path.
pub fn discover_match_files(input: &Path) -> std::io::Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(input)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}
