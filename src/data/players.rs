// Player-ID stream loading: site upload ids, matchups, and game start times.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::warn;

use super::projections::ProjectionError;
use crate::catalog::normalize_name;
use crate::rules::Slot;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// One row of the player-ID stream.
#[derive(Debug, Clone)]
pub struct PlayerIdRow {
    pub name: String,
    pub site_id: String,
    pub team: String,
    /// Canonical matchup key, e.g. "PHO@DAL".
    pub matchup: String,
    pub opponent: String,
    pub game_start: Option<DateTime<Utc>>,
    /// Showdown roster slot label ("CPT", "UTIL", ...), when present.
    pub roster_position: Option<String>,
}

// ---------------------------------------------------------------------------
// Raw CSV serde struct (private)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[allow(dead_code, non_snake_case)]
struct RawPlayerId {
    #[serde(alias = "Nickname")]
    Name: String,
    #[serde(alias = "Id")]
    ID: String,
    #[serde(rename = "Game Info", alias = "Game")]
    GameInfo: String,
    #[serde(rename = "TeamAbbrev", alias = "Team")]
    Team: String,
    #[serde(default, rename = "Roster Position")]
    RosterPosition: Option<String>,
    #[serde(flatten)]
    _extra: HashMap<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Game-info parsing
// ---------------------------------------------------------------------------

/// Parse a game-info cell of the form "PHO@DAL 03/24/2024 07:10PM ET" into
/// (matchup, start time). The time portion is optional; a bare "PHO@DAL"
/// yields no start time.
pub fn parse_game_info(raw: &str) -> Option<(String, Option<DateTime<Utc>>)> {
    let trimmed = raw.trim();
    let mut parts = trimmed.splitn(2, ' ');
    let matchup = parts.next()?.trim();
    if !matchup.contains('@') {
        return None;
    }

    let start = parts.next().and_then(|rest| {
        let rest = rest.trim().trim_end_matches(" ET").trim();
        NaiveDateTime::parse_from_str(rest, "%m/%d/%Y %I:%M%p")
            .ok()
            .map(|naive| naive.and_utc())
    });

    Some((matchup.to_string(), start))
}

/// Derive the opponent from a matchup key and the player's own team.
pub fn opponent_of(matchup: &str, team: &str) -> Option<String> {
    let (away, home) = matchup.split_once('@')?;
    if away == team {
        Some(home.to_string())
    } else if home == team {
        Some(away.to_string())
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Loaders
// ---------------------------------------------------------------------------

fn load_player_ids_from_reader<R: Read>(rdr: R) -> Result<Vec<PlayerIdRow>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut rows = Vec::new();
    for result in reader.deserialize::<RawPlayerId>() {
        match result {
            Ok(raw) => {
                let team = raw.Team.trim().to_string();
                let Some((matchup, game_start)) = parse_game_info(&raw.GameInfo) else {
                    warn!(
                        "skipping player id '{}': unparseable game info '{}'",
                        raw.Name.trim(),
                        raw.GameInfo
                    );
                    continue;
                };
                let Some(opponent) = opponent_of(&matchup, &team) else {
                    warn!(
                        "skipping player id '{}': team {} not in matchup {}",
                        raw.Name.trim(),
                        team,
                        matchup
                    );
                    continue;
                };
                rows.push(PlayerIdRow {
                    name: normalize_name(&raw.Name),
                    site_id: raw.ID.trim().to_string(),
                    team,
                    matchup,
                    opponent,
                    game_start,
                    roster_position: raw
                        .RosterPosition
                        .as_deref()
                        .and_then(Slot::from_str_slot)
                        .map(|s| s.display_str().to_string()),
                });
            }
            Err(e) => {
                warn!("skipping malformed player id row: {}", e);
            }
        }
    }
    Ok(rows)
}

/// Load the player-ID stream from a CSV file.
pub fn load_player_ids(path: &Path) -> Result<Vec<PlayerIdRow>, ProjectionError> {
    let file = std::fs::File::open(path).map_err(|e| ProjectionError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let rows = load_player_ids_from_reader(file).map_err(|e| ProjectionError::Csv {
        path: path.display().to_string(),
        source: e,
    })?;
    if rows.is_empty() {
        return Err(ProjectionError::Validation(
            "player-ID CSV produced zero valid rows".into(),
        ));
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
