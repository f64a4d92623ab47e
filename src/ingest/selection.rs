//! Picking one match out of a Cricsheet dump by date, teams and event.
//!
//! Criteria are checked in the order date → teams → event, and a match
//! scores one point per leading criterion it satisfies; unspecified criteria
//! are skipped. So with all three given, a match on the right date between
//! the wrong teams scores 1 however well its event name matches.

use chrono::NaiveDate;
use serde_json::Value;
use std::collections::BTreeSet;

use super::archive::MatchDocument;
use super::coerce;

/// Team names as they appear across Cricsheet releases → canonical name.
const TEAM_SYNONYMS: [(&str, &str); 5] = [
    ("west indies men", "west indies"),
    ("windies", "west indies"),
    ("england men", "england"),
    ("india men", "india"),
    ("pakistan men", "pakistan"),
];

/// Lowercase, trim and map known aliases.
pub fn normalize_team(name: &str) -> String {
    let name = name.trim().to_lowercase();
    TEAM_SYNONYMS
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(name)
}

/// Event name (or match number when the name is missing), lowercased.
fn event_name(info: &Value) -> String {
    let event = &info["event"];
    let raw = match event {
        Value::Object(_) => match (&event["name"], &event["match_number"]) {
            (Value::String(s), _) if !s.trim().is_empty() => s.clone(),
            (_, Value::Null) => String::new(),
            (_, n) => n.to_string(),
        },
        Value::String(s) => s.clone(),
        _ => String::new(),
    };
    raw.trim().to_lowercase()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchFilter {
    date: Option<NaiveDate>,
    teams: Option<BTreeSet<String>>,
    event_contains_any: Vec<String>,
}

impl MatchFilter {
    pub fn new(date: Option<NaiveDate>, teams: &[String], event_contains_any: &[String]) -> Self {
        let teams: BTreeSet<String> = teams
            .iter()
            .map(|t| normalize_team(t))
            .filter(|t| !t.is_empty())
            .collect();
        MatchFilter {
            date,
            teams: (!teams.is_empty()).then_some(teams),
            event_contains_any: event_contains_any
                .iter()
                .map(|e| e.trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    /// No criteria: every match is wanted.
    pub fn is_empty(&self) -> bool {
        self.criteria() == 0
    }

    /// Number of criteria given, i.e. the score of a full match.
    pub fn criteria(&self) -> usize {
        usize::from(self.date.is_some())
            + usize::from(self.teams.is_some())
            + usize::from(!self.event_contains_any.is_empty())
    }

    /// Score a match by its `info` block.
    pub fn strength(&self, info: &Value) -> usize {
        let mut score = 0;
        if let Some(want) = self.date {
            let on_date = info["dates"]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|d| d.as_str())
                .any(|d| coerce::date(d) == Some(want));
            if !on_date {
                return score;
            }
            score += 1;
        }
        if let Some(want) = &self.teams {
            let teams: BTreeSet<String> = info["teams"]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|t| t.as_str())
                .map(normalize_team)
                .collect();
            if &teams != want {
                return score;
            }
            score += 1;
        }
        if !self.event_contains_any.is_empty() {
            let event = event_name(info);
            if !self.event_contains_any.iter().any(|e| event.contains(e.as_str())) {
                return score;
            }
            score += 1;
        }
        score
    }
}

/// Streaming arg-max over match documents.
///
/// Keeps the first document with the highest non-zero score, so with inputs
/// visited in sorted order ties go to the earliest name.
pub struct BestMatch {
    filter: MatchFilter,
    best: Option<(usize, MatchDocument)>,
}

impl BestMatch {
    pub fn new(filter: MatchFilter) -> Self {
        BestMatch { filter, best: None }
    }

    pub fn offer(&mut self, doc: MatchDocument) {
        let score = self.filter.strength(&doc.raw["info"]);
        let current = self.best.as_ref().map_or(0, |(s, _)| *s);
        if score > current {
            self.best = Some((score, doc));
        }
    }

    /// Whether the kept document satisfies every criterion.
    pub fn is_complete(&self) -> bool {
        self.best
            .as_ref()
            .is_some_and(|(s, _)| *s == self.filter.criteria())
    }

    pub fn into_best(self) -> Option<(usize, MatchDocument)> {
        self.best
    }
}
