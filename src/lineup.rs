// Lineup construction and structural validation.
//
// A lineup is an ordered assignment of catalog players to the required
// roster slots, immutable after construction. Field entries wrap a lineup
// with per-slot lock state for live contests.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{Catalog, PlayerId};
use crate::rules::RosterRules;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineupKind {
    User,
    Generated,
    Input,
}

impl LineupKind {
    pub fn display_str(&self) -> &'static str {
        match self {
            LineupKind::User => "user",
            LineupKind::Generated => "generated",
            LineupKind::Input => "input",
        }
    }
}

/// A validated assignment of players to roster slots, parallel to
/// `RosterRules::slots`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lineup {
    pub slots: Vec<PlayerId>,
    pub salary: u32,
    pub projection: f64,
    pub field_projection: f64,
    pub ceiling: f64,
    pub kind: LineupKind,
}

#[derive(Debug, Error)]
pub enum LineupError {
    #[error("lineup has {got} players, roster requires {required}")]
    WrongSize { got: usize, required: usize },

    #[error("unknown player id {0}")]
    UnknownPlayer(PlayerId),

    #[error("player '{name}' is not eligible for slot {slot}")]
    SlotIneligible { name: String, slot: String },

    #[error("player '{0}' appears more than once")]
    DuplicatePlayer(String),

    #[error("person '{0}' appears via multiple multiplier variants")]
    DuplicatePerson(String),

    #[error("salary {salary} exceeds cap {cap}")]
    SalaryCapExceeded { salary: u32, cap: u32 },

    #[error("team {team} has {count} players, cap is {cap}")]
    TeamCapExceeded {
        team: String,
        count: usize,
        cap: usize,
    },

    #[error("lineup covers {found} matchups, minimum is {required}")]
    TooFewMatchups { found: usize, required: usize },
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

impl Lineup {
    /// Build and validate a lineup from per-slot player ids. Checks slot
    /// eligibility, player and person uniqueness (multiplier twins count as
    /// the same person), salary cap, team cap, and the matchup minimum.
    /// The realism salary floor is a generator concern, not checked here.
    pub fn build(
        ids: &[PlayerId],
        catalog: &Catalog,
        rules: &RosterRules,
        kind: LineupKind,
    ) -> Result<Lineup, LineupError> {
        if ids.len() != rules.roster_size() {
            return Err(LineupError::WrongSize {
                got: ids.len(),
                required: rules.roster_size(),
            });
        }

        let mut salary: u32 = 0;
        let mut projection = 0.0;
        let mut field_projection = 0.0;
        let mut ceiling = 0.0;
        let mut team_counts: HashMap<&str, usize> = HashMap::new();
        let mut matchups: Vec<&str> = Vec::new();
        let mut persons: Vec<(String, String)> = Vec::new();

        for (&id, &slot) in ids.iter().zip(rules.slots.iter()) {
            let player = catalog.by_id(id).ok_or(LineupError::UnknownPlayer(id))?;
            if !player.eligible(slot) {
                return Err(LineupError::SlotIneligible {
                    name: player.name.clone(),
                    slot: slot.display_str().to_string(),
                });
            }

            let person = player.person_key();
            if persons.contains(&person) {
                // Same id twice is a duplicate player; distinct catalog
                // entries for one person are multiplier twins.
                if ids.iter().filter(|&&other| other == id).count() > 1 {
                    return Err(LineupError::DuplicatePlayer(player.name.clone()));
                }
                return Err(LineupError::DuplicatePerson(player.name.clone()));
            }
            persons.push(person);

            salary += player.salary;
            projection += player.projection;
            field_projection += player.field_projection;
            ceiling += player.ceiling;
            *team_counts.entry(player.team.as_str()).or_insert(0) += 1;
            if !matchups.contains(&player.matchup.as_str()) {
                matchups.push(player.matchup.as_str());
            }
        }

        if salary > rules.salary_cap {
            return Err(LineupError::SalaryCapExceeded {
                salary,
                cap: rules.salary_cap,
            });
        }
        for (team, count) in &team_counts {
            if *count > rules.team_cap {
                return Err(LineupError::TeamCapExceeded {
                    team: team.to_string(),
                    count: *count,
                    cap: rules.team_cap,
                });
            }
        }
        if matchups.len() < rules.min_matchups {
            return Err(LineupError::TooFewMatchups {
                found: matchups.len(),
                required: rules.min_matchups,
            });
        }

        Ok(Lineup {
            slots: ids.to_vec(),
            salary,
            projection,
            field_projection,
            ceiling,
            kind,
        })
    }

    /// Order-independent identity, used for deduplication.
    pub fn key(&self) -> Vec<PlayerId> {
        let mut k = self.slots.clone();
        k.sort_unstable();
        k
    }

    /// Primary and secondary team-stack descriptors, e.g. ("BOS 3", "LAL 2").
    /// Teams are ranked by multiplicity, ties broken alphabetically.
    pub fn stack_descriptors(&self, catalog: &Catalog) -> (String, String) {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for &id in &self.slots {
            if let Some(p) = catalog.by_id(id) {
                *counts.entry(p.team.as_str()).or_insert(0) += 1;
            }
        }
        let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        let fmt = |idx: usize| {
            ranked
                .get(idx)
                .map(|(team, n)| format!("{team} {n}"))
                .unwrap_or_default()
        };
        (fmt(0), fmt(1))
    }

    /// Product of per-player ownership fractions.
    pub fn ownership_product(&self, catalog: &Catalog) -> f64 {
        self.slots
            .iter()
            .filter_map(|&id| catalog.by_id(id))
            .map(|p| p.ownership / 100.0)
            .product()
    }

    /// Sum of per-player ownership percents.
    pub fn ownership_sum(&self, catalog: &Catalog) -> f64 {
        self.slots
            .iter()
            .filter_map(|&id| catalog.by_id(id))
            .map(|p| p.ownership)
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Field entries (live contests)
// ---------------------------------------------------------------------------

/// Lock-state view of a live contest entry before swap planning. `None`
/// slots are open for the swap planner to fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryState {
    Empty,
    AllLocked,
    Partial,
}

#[derive(Debug, Clone)]
pub struct FieldEntry {
    pub entry_id: String,
    pub user: String,
    /// Per-slot assignment; None marks an unlocked slot awaiting a fill.
    pub slots: Vec<Option<PlayerId>>,
    pub locked_salary: u32,
    pub locked_projection: f64,
    /// Total minutes remaining across the entry's locked players.
    pub minutes_remaining: f64,
    /// Set when backoff exhausted and the entry carries a best partial.
    pub flagged: bool,
}

impl FieldEntry {
    pub fn state(&self) -> EntryState {
        let filled = self.slots.iter().filter(|s| s.is_some()).count();
        if filled == 0 {
            EntryState::Empty
        } else if filled == self.slots.len() {
            EntryState::AllLocked
        } else {
            EntryState::Partial
        }
    }

    pub fn unlocked_slots(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.is_none().then_some(i))
            .collect()
    }

    /// The completed lineup, if every slot is assigned.
    pub fn lineup(
        &self,
        catalog: &Catalog,
        rules: &RosterRules,
        kind: LineupKind,
    ) -> Result<Lineup, LineupError> {
        let ids: Vec<PlayerId> = self.slots.iter().flatten().copied().collect();
        if ids.len() != self.slots.len() {
            return Err(LineupError::WrongSize {
                got: ids.len(),
                required: rules.roster_size(),
            });
        }
        Lineup::build(&ids, catalog, rules, kind)
    }
}

/// Collapse identical lineups, counting duplicates. The resulting set and
/// counts are independent of input order.
pub fn dedupe_lineups(lineups: Vec<Lineup>) -> Vec<(Lineup, usize)> {
    let mut by_key: HashMap<Vec<PlayerId>, (Lineup, usize)> = HashMap::new();
    for lineup in lineups {
        by_key
            .entry(lineup.key())
            .and_modify(|(_, n)| *n += 1)
            .or_insert((lineup, 1));
    }
    let mut out: Vec<(Lineup, usize)> = by_key.into_values().collect();
    out.sort_by(|a, b| a.0.key().cmp(&b.0.key()));
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::basic_player;
    use crate::rules::{ContestStyle, Position as P, Site, Slot};
    use crate::sim::correlation::CorrelationTable;

    /// Two-matchup classic catalog with one player per SiteA slot.
    fn classic_fixture() -> (Catalog, RosterRules, Vec<PlayerId>) {
        let table = CorrelationTable::builtin();
        let rules = RosterRules::for_contest(Site::SiteA, ContestStyle::Classic);
        let mut catalog = Catalog::new(0.0, 0.25);
        let specs = [
            ("PG One", "BOS", "LAL", vec![P::PointGuard], 7000, 38.0),
            ("SG One", "BOS", "LAL", vec![P::ShootingGuard], 6500, 34.0),
            ("SF One", "LAL", "BOS", vec![P::SmallForward], 6000, 32.0),
            ("PF One", "LAL", "BOS", vec![P::PowerForward], 5500, 30.0),
            ("C One", "PHO", "DAL", vec![P::Center], 6200, 33.0),
            ("G Flex", "PHO", "DAL", vec![P::ShootingGuard], 5400, 28.0),
            ("F Flex", "DAL", "PHO", vec![P::PowerForward], 5600, 29.0),
            ("Util One", "DAL", "PHO", vec![P::Center], 5000, 26.0),
        ];
        let mut ids = Vec::new();
        for (name, team, opp, pos, sal, proj) in specs {
            ids.push(
                catalog
                    .insert(basic_player(name, team, opp, pos, sal, proj), &table)
                    .unwrap(),
            );
        }
        (catalog, rules, ids)
    }

    // -- Construction --

    #[test]
    fn valid_lineup_builds_with_totals() {
        let (catalog, rules, ids) = classic_fixture();
        let lineup = Lineup::build(&ids, &catalog, &rules, LineupKind::User).unwrap();
        assert_eq!(lineup.salary, 47_200);
        assert!((lineup.projection - 250.0).abs() < 1e-9);
        assert_eq!(lineup.slots.len(), 8);
    }

    #[test]
    fn wrong_size_rejected() {
        let (catalog, rules, ids) = classic_fixture();
        let err = Lineup::build(&ids[..7], &catalog, &rules, LineupKind::User).unwrap_err();
        assert!(matches!(err, LineupError::WrongSize { got: 7, required: 8 }));
    }

    #[test]
    fn ineligible_slot_rejected() {
        let (catalog, rules, mut ids) = classic_fixture();
        // Put the center into the PG slot.
        ids.swap(0, 4);
        let err = Lineup::build(&ids, &catalog, &rules, LineupKind::User).unwrap_err();
        assert!(matches!(err, LineupError::SlotIneligible { .. }));
    }

    #[test]
    fn duplicate_player_rejected() {
        let (catalog, rules, mut ids) = classic_fixture();
        // SG One also fits the G slot; using the same id twice must fail.
        ids[5] = ids[1];
        let err = Lineup::build(&ids, &catalog, &rules, LineupKind::User).unwrap_err();
        assert!(matches!(err, LineupError::DuplicatePlayer(_)));
    }

    #[test]
    fn salary_cap_enforced() {
        let (catalog, mut rules, ids) = classic_fixture();
        rules.salary_cap = 40_000;
        let err = Lineup::build(&ids, &catalog, &rules, LineupKind::User).unwrap_err();
        assert!(matches!(err, LineupError::SalaryCapExceeded { .. }));
    }

    #[test]
    fn team_cap_enforced() {
        let (catalog, mut rules, ids) = classic_fixture();
        rules.team_cap = 1;
        let err = Lineup::build(&ids, &catalog, &rules, LineupKind::User).unwrap_err();
        assert!(matches!(err, LineupError::TeamCapExceeded { .. }));
    }

    #[test]
    fn matchup_minimum_enforced() {
        let table = CorrelationTable::builtin();
        let mut rules = RosterRules::for_contest(Site::SiteA, ContestStyle::Classic);
        rules.min_matchups = 3;
        rules.team_cap = 8;
        let mut catalog = Catalog::new(0.0, 0.25);
        // All eight players from one matchup.
        let specs = [
            ("PG", vec![P::PointGuard]),
            ("SG", vec![P::ShootingGuard]),
            ("SF", vec![P::SmallForward]),
            ("PF", vec![P::PowerForward]),
            ("C", vec![P::Center]),
            ("G", vec![P::PointGuard]),
            ("F", vec![P::SmallForward]),
            ("U", vec![P::Center]),
        ];
        let mut ids = Vec::new();
        for (name, pos) in specs {
            ids.push(
                catalog
                    .insert(basic_player(name, "BOS", "LAL", pos, 5000, 25.0), &table)
                    .unwrap(),
            );
        }
        let err = Lineup::build(&ids, &catalog, &rules, LineupKind::User).unwrap_err();
        assert!(matches!(
            err,
            LineupError::TooFewMatchups { found: 1, required: 3 }
        ));
    }

    #[test]
    fn multiplier_twins_rejected_as_same_person() {
        let table = CorrelationTable::builtin();
        let rules = RosterRules::for_contest(Site::SiteA, ContestStyle::Showdown);
        let mut catalog = Catalog::new(0.0, 0.25);
        let names = ["Star", "B", "C", "D", "E", "F"];
        let mut util_ids = Vec::new();
        for (i, name) in names.iter().enumerate() {
            let mut p = basic_player(name, "BOS", "LAL", vec![P::Center], 4000 + i as u32 * 100, 20.0);
            p.variant = Some(Slot::Util);
            util_ids.push(catalog.insert(p, &table).unwrap());
        }
        let mut cpt = basic_player("Star", "BOS", "LAL", vec![P::Center], 6000, 30.0);
        cpt.variant = Some(Slot::Captain);
        let cpt_id = catalog.insert(cpt, &table).unwrap();
        catalog.link_util_twins();

        // CPT Star + UTIL Star in the same lineup is the same person twice.
        let ids = vec![cpt_id, util_ids[0], util_ids[1], util_ids[2], util_ids[3], util_ids[4]];
        let mut relaxed = rules.clone();
        relaxed.team_cap = 6;
        let err = Lineup::build(&ids, &catalog, &relaxed, LineupKind::User).unwrap_err();
        assert!(matches!(err, LineupError::DuplicatePerson(_)));

        // Replacing the UTIL twin with another player is fine.
        let ids = vec![cpt_id, util_ids[1], util_ids[2], util_ids[3], util_ids[4], util_ids[5]];
        assert!(Lineup::build(&ids, &catalog, &relaxed, LineupKind::User).is_ok());
    }

    // -- Derived descriptors --

    #[test]
    fn stack_descriptors_ranked_by_count() {
        let (catalog, rules, ids) = classic_fixture();
        let lineup = Lineup::build(&ids, &catalog, &rules, LineupKind::User).unwrap();
        let (primary, secondary) = lineup.stack_descriptors(&catalog);
        // BOS, LAL, PHO, DAL each have 2; alphabetical tie-break.
        assert_eq!(primary, "BOS 2");
        assert_eq!(secondary, "DAL 2");
    }

    #[test]
    fn ownership_aggregates() {
        let (catalog, rules, ids) = classic_fixture();
        let lineup = Lineup::build(&ids, &catalog, &rules, LineupKind::User).unwrap();
        // All fixture players defaulted to 0.1% ownership.
        assert!((lineup.ownership_sum(&catalog) - 0.8).abs() < 1e-9);
        assert!((lineup.ownership_product(&catalog) - 0.001_f64.powi(8)).abs() < 1e-30);
    }

    // -- Dedup --

    #[test]
    fn dedupe_counts_duplicates() {
        let (catalog, rules, ids) = classic_fixture();
        let a = Lineup::build(&ids, &catalog, &rules, LineupKind::Generated).unwrap();
        let b = a.clone();
        let deduped = dedupe_lineups(vec![a, b]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].1, 2);
    }

    #[test]
    fn dedupe_is_order_independent() {
        let (catalog, rules, ids) = classic_fixture();
        let a = Lineup::build(&ids, &catalog, &rules, LineupKind::Generated).unwrap();
        // A second lineup with G and SG swapped is the same set of players.
        let mut swapped = ids.clone();
        swapped.swap(1, 5);
        // SG One is eligible for G and G Flex (a SG) for the SG slot.
        let b = Lineup::build(&swapped, &catalog, &rules, LineupKind::Generated).unwrap();
        let fwd = dedupe_lineups(vec![a.clone(), b.clone()]);
        let rev = dedupe_lineups(vec![b, a]);
        assert_eq!(fwd.len(), rev.len());
        assert_eq!(fwd[0].1, rev[0].1);
        assert_eq!(fwd.len(), 1);
    }

    // -- Entry state --

    #[test]
    fn entry_states() {
        let empty = FieldEntry {
            entry_id: "1".into(),
            user: "u".into(),
            slots: vec![None, None],
            locked_salary: 0,
            locked_projection: 0.0,
            minutes_remaining: 0.0,
            flagged: false,
        };
        assert_eq!(empty.state(), EntryState::Empty);

        let partial = FieldEntry {
            slots: vec![Some(0), None],
            ..empty.clone()
        };
        assert_eq!(partial.state(), EntryState::Partial);
        assert_eq!(partial.unlocked_slots(), vec![1]);

        let locked = FieldEntry {
            slots: vec![Some(0), Some(1)],
            ..empty
        };
        assert_eq!(locked.state(), EntryState::AllLocked);
    }
}
