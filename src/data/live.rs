// Live-contest stream (entry rows with locked/open cells) and the abstract
// live-scores feed (per-player actuals, per-team minutes remaining).

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use super::projections::ProjectionError;
use crate::catalog::normalize_name;
use crate::rules::RosterRules;

// ---------------------------------------------------------------------------
// Cell contents
// ---------------------------------------------------------------------------

/// One roster cell of a live contest row. "LOCKED" marks a slot the swap
/// planner may still fill; a named cell pins its player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellContent {
    Locked,
    Named { name: String, site_id: Option<String> },
    Empty,
}

/// Parse a roster cell: "", "LOCKED", "Name", or "Name (id)".
pub fn parse_cell(raw: &str) -> CellContent {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return CellContent::Empty;
    }
    if trimmed.eq_ignore_ascii_case("locked") {
        return CellContent::Locked;
    }
    if let Some(open) = trimmed.rfind('(') {
        if let Some(close) = trimmed.rfind(')') {
            if close > open {
                let name = normalize_name(&trimmed[..open]);
                let id = trimmed[open + 1..close].trim().to_string();
                if !name.is_empty() && !id.is_empty() {
                    return CellContent::Named {
                        name,
                        site_id: Some(id),
                    };
                }
            }
        }
    }
    CellContent::Named {
        name: normalize_name(trimmed),
        site_id: None,
    }
}

/// Format the inverse of `parse_cell` for named cells.
pub fn format_cell(name: &str, site_id: Option<&str>) -> String {
    match site_id {
        Some(id) => format!("{name} ({id})"),
        None => name.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Live contest file
// ---------------------------------------------------------------------------

/// One entry row, with the original record preserved so the upload rewrite
/// keeps unknown columns untouched.
#[derive(Debug, Clone)]
pub struct LiveEntryRow {
    pub entry_id: String,
    pub user: String,
    /// Per-roster-slot cells, in rules slot order.
    pub cells: Vec<CellContent>,
    /// The full original record.
    pub record: Vec<String>,
}

/// The parsed live-contest stream.
#[derive(Debug, Clone)]
pub struct LiveContestFile {
    pub headers: Vec<String>,
    /// Column indices of the roster slots, in rules slot order.
    pub slot_columns: Vec<usize>,
    pub rows: Vec<LiveEntryRow>,
}

#[derive(Debug, thiserror::Error)]
pub enum LiveContestError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("live contest file is missing column `{0}`")]
    MissingColumn(String),

    #[error("live contest file has {found} roster columns, rules require {required}")]
    SlotColumnMismatch { found: usize, required: usize },
}

fn find_column(headers: &[String], names: &[&str]) -> Option<usize> {
    headers.iter().position(|h| {
        names
            .iter()
            .any(|n| h.trim().eq_ignore_ascii_case(n))
    })
}

fn load_live_contest_from_reader<R: Read>(
    rdr: R,
    rules: &RosterRules,
) -> Result<LiveContestFile, LiveContestError> {
    let mut reader = csv::Reader::from_reader(rdr);
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| LiveContestError::Csv {
            path: "<reader>".into(),
            source: e,
        })?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let entry_col = find_column(&headers, &["Entry ID", "EntryId"])
        .ok_or_else(|| LiveContestError::MissingColumn("Entry ID".into()))?;
    let user_col = find_column(&headers, &["Entry Name", "User", "EntryName"])
        .ok_or_else(|| LiveContestError::MissingColumn("Entry Name".into()))?;

    // Roster columns carry the slot labels; for sites with repeated slots
    // the labels repeat, so match them in rules order.
    let mut slot_columns = Vec::with_capacity(rules.roster_size());
    let mut cursor = 0usize;
    for slot in &rules.slots {
        let label = slot.display_str();
        let found = headers
            .iter()
            .enumerate()
            .skip(cursor)
            .find(|(_, h)| h.trim().eq_ignore_ascii_case(label))
            .map(|(i, _)| i);
        match found {
            Some(i) => {
                slot_columns.push(i);
                cursor = i + 1;
            }
            None => {
                return Err(LiveContestError::SlotColumnMismatch {
                    found: slot_columns.len(),
                    required: rules.roster_size(),
                })
            }
        }
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warn!("skipping malformed live contest row: {}", e);
                continue;
            }
        };
        let fields: Vec<String> = record.iter().map(|f| f.to_string()).collect();
        let entry_id = fields.get(entry_col).cloned().unwrap_or_default();
        if entry_id.trim().is_empty() {
            continue;
        }
        let user = fields.get(user_col).cloned().unwrap_or_default();
        let cells = slot_columns
            .iter()
            .map(|&i| parse_cell(fields.get(i).map(String::as_str).unwrap_or("")))
            .collect();
        rows.push(LiveEntryRow {
            entry_id: entry_id.trim().to_string(),
            user: user.trim().to_string(),
            cells,
            record: fields,
        });
    }

    Ok(LiveContestFile {
        headers,
        slot_columns,
        rows,
    })
}

/// Load the live-contest stream from a CSV file.
pub fn load_live_contest(
    path: &Path,
    rules: &RosterRules,
) -> Result<LiveContestFile, LiveContestError> {
    let file = std::fs::File::open(path).map_err(|e| LiveContestError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    load_live_contest_from_reader(file, rules)
}

// ---------------------------------------------------------------------------
// Live scores feed
// ---------------------------------------------------------------------------

/// The abstract live-scores feed: actual fantasy points per player and
/// minutes remaining per team (48 for untouched games).
#[derive(Debug, Clone, Default)]
pub struct LiveScores {
    pub actual_points: HashMap<String, f64>,
    pub team_minutes_remaining: HashMap<String, f64>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code, non_snake_case)]
struct RawLiveScore {
    Name: String,
    Team: String,
    #[serde(alias = "Actual")]
    ActualFpts: f64,
    #[serde(rename = "Minutes Remaining", alias = "MinutesRemaining")]
    MinutesRemaining: f64,
}

fn load_live_scores_from_reader<R: Read>(rdr: R) -> Result<LiveScores, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut scores = LiveScores::default();
    for result in reader.deserialize::<RawLiveScore>() {
        match result {
            Ok(raw) => {
                if !raw.ActualFpts.is_finite() || !raw.MinutesRemaining.is_finite() {
                    warn!("skipping live score for '{}': non-finite value", raw.Name.trim());
                    continue;
                }
                scores
                    .actual_points
                    .insert(normalize_name(&raw.Name), raw.ActualFpts);
                scores
                    .team_minutes_remaining
                    .insert(raw.Team.trim().to_string(), raw.MinutesRemaining.max(0.0));
            }
            Err(e) => {
                warn!("skipping malformed live score row: {}", e);
            }
        }
    }
    Ok(scores)
}

/// Load the live-scores feed from a CSV file.
pub fn load_live_scores(path: &Path) -> Result<LiveScores, ProjectionError> {
    let file = std::fs::File::open(path).map_err(|e| ProjectionError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    load_live_scores_from_reader(file).map_err(|e| ProjectionError::Csv {
        path: path.display().to_string(),
        source: e,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
