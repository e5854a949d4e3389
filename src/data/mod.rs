// Input stream loading and slate assembly.

pub mod contest;
pub mod live;
pub mod players;
pub mod projections;

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;
use tracing::warn;

use crate::catalog::{Catalog, Player};
use crate::config::Config;
use crate::rules::{ContestStyle, RosterRules, Slot};

pub use self::contest::Tournament;
pub use self::live::{LiveContestFile, LiveScores};
pub use self::projections::{BoomBustRow, ProjectionRow};

#[derive(Debug, Error)]
pub enum SlateError {
    #[error(transparent)]
    Projection(#[from] projections::ProjectionError),

    #[error("slate assembly produced an empty catalog")]
    EmptyCatalog,
}

/// Assemble the catalog from the projection and player-ID streams plus the
/// optional ownership and boom/bust overlays. Showdown contests materialize
/// one entry per multiplier slot with scaled salary and projection.
pub fn load_slate(config: &Config, rules: &RosterRules) -> Result<Catalog, SlateError> {
    let rows = projections::load_projections(Path::new(&config.paths.projections))?;
    let id_rows = players::load_player_ids(Path::new(&config.paths.player_ids))?;

    let ownership = match &config.paths.ownership {
        Some(path) => projections::load_ownership(Path::new(path))?,
        None => HashMap::new(),
    };
    let boom_bust = match &config.paths.boom_bust {
        Some(path) => projections::load_boom_bust(Path::new(path))?,
        None => HashMap::new(),
    };

    // Index id rows by (name, showdown roster position).
    let mut ids: HashMap<(String, Option<String>), &players::PlayerIdRow> = HashMap::new();
    for row in &id_rows {
        ids.insert((row.name.clone(), row.roster_position.clone()), row);
    }

    let mut catalog = Catalog::new(
        config.engine.projection_minimum,
        config.engine.default_variance,
    );

    for row in &rows {
        let mut row = row.clone();
        if let Some(own) = ownership.get(&row.name) {
            row.ownership = *own;
        }
        if let Some(bb) = boom_bust.get(&row.name) {
            row.stddev = Some(bb.stddev);
            if bb.ceiling > 0.0 {
                row.ceiling = Some(bb.ceiling);
            }
        }

        match rules.style {
            ContestStyle::Classic => {
                insert_entry(&mut catalog, config, &row, None, &ids);
            }
            ContestStyle::Showdown => {
                for slot in rules.variant_slots() {
                    insert_entry(&mut catalog, config, &row, Some(slot), &ids);
                }
            }
        }
    }

    catalog.link_util_twins();

    if catalog.is_empty() {
        return Err(SlateError::EmptyCatalog);
    }
    Ok(catalog)
}

fn insert_entry(
    catalog: &mut Catalog,
    config: &Config,
    row: &ProjectionRow,
    variant: Option<Slot>,
    ids: &HashMap<(String, Option<String>), &players::PlayerIdRow>,
) {
    let slot_label = variant.map(|s| s.display_str().to_string());
    let id_row = ids
        .get(&(row.name.clone(), slot_label.clone()))
        .or_else(|| ids.get(&(row.name.clone(), None)))
        .copied();
    if id_row.is_none() {
        warn!("no player-ID row for '{}'; entry will lack a site id", row.name);
    }

    let mult = variant.map_or(1.0, |s| s.multiplier());
    let salary_mult = variant.map_or(1.0, |s| s.salary_multiplier());
    let ownership = variant
        .and_then(|s| row.slot_ownership.get(s.display_str()).copied())
        .unwrap_or(row.ownership);

    let (matchup, opponent, game_start) = match id_row {
        Some(idr) => (
            idr.matchup.clone(),
            idr.opponent.clone(),
            idr.game_start,
        ),
        // Without a game-info row the matchup degrades to a team-local key;
        // such entries still optimize but cannot correlate across the game.
        None => (row.team.clone(), String::new(), None),
    };

    let player = Player {
        name: row.name.clone(),
        team: row.team.clone(),
        opponent,
        matchup,
        positions: row.positions.clone(),
        variant,
        salary: (row.salary as f64 * salary_mult).round() as u32,
        projection: row.projection * mult,
        field_projection: row.field_projection.unwrap_or(0.0) * mult,
        stddev: row.stddev.unwrap_or(0.0) * mult,
        ceiling: row.ceiling.unwrap_or(0.0) * mult,
        ownership,
        game_start,
        correlations: HashMap::new(),
        player_correlations: HashMap::new(),
        bayes_projection: 0.0,
        bayes_variance: 0.0,
        actual_points: None,
        minutes_remaining: None,
        util_twin: None,
        site_id: id_row.map(|idr| idr.site_id.clone()),
    };

    catalog.insert(player, &config.correlations);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
