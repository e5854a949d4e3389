// In-memory player catalog keyed by (name, roster-slot, team).
//
// Players are created once at load time and never replaced; the only
// mutation after construction is the Bayesian projection update, which runs
// on the coordinator before any parallel phase starts.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::rules::{Position, Slot};
use crate::sim::correlation::CorrelationTable;

/// Dense index into the catalog. Stable for the lifetime of a run.
pub type PlayerId = usize;

/// Sentinel replacing hyphen-minus in display names so that feed variants of
/// hyphenated names key identically.
pub const NAME_SENTINEL: char = '#';

/// Normalize a display name at an ingestion boundary: trim and replace
/// hyphen-minus with the sentinel.
pub fn normalize_name(raw: &str) -> String {
    raw.trim().replace('-', &NAME_SENTINEL.to_string())
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// A single catalog entry. Showdown contests materialize one entry per
/// multiplier slot for each real person, with scaled salary and projection;
/// `variant` carries the slot binding and `util_twin` links back to the
/// underlying UTIL entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub team: String,
    pub opponent: String,
    /// Canonical matchup key, e.g. "PHO@DAL".
    pub matchup: String,
    /// Eligible position tags in feed order.
    pub positions: Vec<Position>,
    /// Showdown slot binding; None for classic entries.
    pub variant: Option<Slot>,
    pub salary: u32,
    pub projection: f64,
    /// Projection used by the field generator; falls back to `projection`.
    pub field_projection: f64,
    pub stddev: f64,
    pub ceiling: f64,
    /// Ownership percent in (0, 100].
    pub ownership: f64,
    pub game_start: Option<DateTime<Utc>>,
    /// Default correlations by peer slot label ("SG", "Opp C", ...), seeded
    /// from the calibration table for the primary position.
    pub correlations: HashMap<String, f64>,
    /// Per-peer overrides keyed by normalized peer name.
    pub player_correlations: HashMap<String, f64>,
    pub bayes_projection: f64,
    pub bayes_variance: f64,
    pub actual_points: Option<f64>,
    pub minutes_remaining: Option<f64>,
    /// For showdown multiplier variants, the catalog id of the UTIL twin.
    pub util_twin: Option<PlayerId>,
    /// Site upload id, from the player-id stream.
    pub site_id: Option<String>,
}

impl Player {
    pub fn primary_position(&self) -> Option<Position> {
        self.positions.first().copied()
    }

    /// Whether this entry may fill the given roster slot. Showdown variants
    /// bind to exactly their multiplier slot; classic entries go through the
    /// slot's position eligibility.
    pub fn eligible(&self, slot: Slot) -> bool {
        match self.variant {
            Some(bound) => bound == slot,
            None => slot.accepts(&self.positions),
        }
    }

    /// The scoring multiplier carried by this entry's slot binding.
    pub fn multiplier(&self) -> f64 {
        self.variant.map_or(1.0, |s| s.multiplier())
    }

    /// Identity of the underlying real person, independent of slot variant.
    pub fn person_key(&self) -> (String, String) {
        (self.name.clone(), self.team.clone())
    }

    /// The roster-slot component of the composite catalog key: the variant
    /// label for showdown entries, the joined position list for classic.
    pub fn slot_key(&self) -> String {
        match self.variant {
            Some(slot) => slot.display_str().to_string(),
            None => self
                .positions
                .iter()
                .map(|p| p.display_str())
                .collect::<Vec<_>>()
                .join("/"),
        }
    }

    /// Display cell in the site upload format: "Name (id)". Falls back to
    /// the bare name when no site id is known.
    pub fn cell(&self) -> String {
        match &self.site_id {
            Some(id) => format!("{} ({})", self.name, id),
            None => self.name.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Read-only (after load) store of players with O(1) composite-key and id
/// lookup, plus a per-team index for the correlation builder.
#[derive(Debug, Clone)]
pub struct Catalog {
    projection_minimum: f64,
    default_variance: f64,
    players: Vec<Player>,
    by_key: HashMap<(String, String, String), PlayerId>,
    by_team: HashMap<String, Vec<PlayerId>>,
}

impl Catalog {
    pub fn new(projection_minimum: f64, default_variance: f64) -> Self {
        Catalog {
            projection_minimum,
            default_variance,
            players: Vec::new(),
            by_key: HashMap::new(),
            by_team: HashMap::new(),
        }
    }

    /// Insert a player, applying defaulting rules first:
    /// - projections below the configured minimum are rejected (skipped);
    /// - zero/missing stddev derives as projection x default-variance;
    /// - zero ownership becomes 0.1; zero ceiling becomes projection + stddev;
    /// - field projection falls back to projection;
    /// - bayesian state initializes to (projection, stddev^2).
    ///
    /// Returns None when the player is skipped (below minimum, no eligible
    /// positions, zero salary, or duplicate key); the skip is logged.
    pub fn insert(&mut self, mut player: Player, table: &CorrelationTable) -> Option<PlayerId> {
        if player.projection < self.projection_minimum {
            return None;
        }
        if player.positions.is_empty() {
            warn!("skipping player '{}': no eligible positions", player.name);
            return None;
        }
        if player.salary == 0 {
            warn!("skipping player '{}': zero salary", player.name);
            return None;
        }

        if player.stddev <= 0.0 {
            player.stddev = player.projection * self.default_variance;
        }
        if player.ownership <= 0.0 {
            player.ownership = 0.1;
        }
        if player.ceiling <= 0.0 {
            player.ceiling = player.projection + player.stddev;
        }
        if player.field_projection <= 0.0 || player.field_projection > player.projection {
            player.field_projection = player.projection;
        }
        player.bayes_projection = player.projection;
        player.bayes_variance = player.stddev * player.stddev;

        if let Some(pos) = player.primary_position() {
            player.correlations = table.row(pos).clone();
        }
        if let Some(overrides) = table.override_for(&player.name) {
            player.player_correlations = overrides.clone();
        }

        let key = (player.name.clone(), player.slot_key(), player.team.clone());
        if self.by_key.contains_key(&key) {
            warn!(
                "skipping duplicate catalog entry ({}, {}, {})",
                key.0, key.1, key.2
            );
            return None;
        }

        let id = self.players.len();
        self.by_key.insert(key, id);
        self.by_team
            .entry(player.team.clone())
            .or_default()
            .push(id);
        self.players.push(player);
        Some(id)
    }

    pub fn get(&self, name: &str, slot: &str, team: &str) -> Option<&Player> {
        let key = (normalize_name(name), slot.to_string(), team.to_string());
        self.by_key.get(&key).map(|&id| &self.players[id])
    }

    pub fn get_id(&self, name: &str, slot: &str, team: &str) -> Option<PlayerId> {
        let key = (normalize_name(name), slot.to_string(), team.to_string());
        self.by_key.get(&key).copied()
    }

    pub fn by_id(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    /// Mutable access for the coordinator-side Bayesian update.
    pub fn by_id_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    pub fn by_team(&self, team: &str) -> &[PlayerId] {
        self.by_team.get(team).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Find a player by site upload id.
    pub fn by_site_id(&self, site_id: &str) -> Option<PlayerId> {
        self.players
            .iter()
            .position(|p| p.site_id.as_deref() == Some(site_id))
    }

    /// All distinct matchup keys present in the catalog, sorted.
    pub fn matchups(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for p in &self.players {
            if !keys.contains(&p.matchup) {
                keys.push(p.matchup.clone());
            }
        }
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = PlayerId> {
        0..self.players.len()
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    /// Link each showdown multiplier variant to its UTIL twin so lineup
    /// construction can exclude the same physical person twice. Classic
    /// catalogs are untouched.
    pub fn link_util_twins(&mut self) {
        let mut util_by_person: HashMap<(String, String), PlayerId> = HashMap::new();
        for (id, p) in self.players.iter().enumerate() {
            if p.variant == Some(Slot::Util) {
                util_by_person.insert(p.person_key(), id);
            }
        }
        for p in &mut self.players {
            if p.variant.is_some() && p.variant != Some(Slot::Util) {
                p.util_twin = util_by_person.get(&p.person_key()).copied();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Build a bare classic player for tests and internal fixtures. Defaulting
/// (stddev, ownership, ceiling, bayes state) happens at insert.
pub fn basic_player(
    name: &str,
    team: &str,
    opponent: &str,
    positions: Vec<Position>,
    salary: u32,
    projection: f64,
) -> Player {
    let matchup = if team < opponent {
        format!("{team}@{opponent}")
    } else {
        format!("{opponent}@{team}")
    };
    Player {
        name: normalize_name(name),
        team: team.to_string(),
        opponent: opponent.to_string(),
        matchup,
        positions,
        variant: None,
        salary,
        projection,
        field_projection: 0.0,
        stddev: 0.0,
        ceiling: 0.0,
        ownership: 0.0,
        game_start: None,
        correlations: HashMap::new(),
        player_correlations: HashMap::new(),
        bayes_projection: 0.0,
        bayes_variance: 0.0,
        actual_points: None,
        minutes_remaining: None,
        util_twin: None,
        site_id: None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
