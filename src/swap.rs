// Late-swap planning for live contest entries.
//
// Each entry's named cells pin players; cells reading "LOCKED" are open
// slots to regenerate. Fills come from the field generator's sampling
// strategy restricted to the open slots, with a two-floor backoff (salary,
// projection) when the realism band proves unreachable. A post-fill
// validator re-checks slot eligibility and rotates newly filled players so
// the latest-starting ones occupy flex slots.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::warn;

use crate::catalog::{Catalog, PlayerId};
use crate::data::live::{CellContent, LiveContestFile};
use crate::field::FieldGenerator;
use crate::lineup::{EntryState, FieldEntry, Lineup, LineupKind};
use crate::optimizer::{Optimizer, OptimizerSettings};
use crate::rules::RosterRules;
use crate::sim::bayes::REGULATION_MINUTES;
use crate::sim::split_seed;

/// Floor decay per backoff stage.
const BACKOFF_FACTOR: f64 = 0.95;
/// Salary floor never drops below this fraction of the cap.
const MIN_SALARY_FLOOR_FRAC: f64 = 0.8;
/// Projection floor never drops below this fraction of the optimal.
const MIN_PROJECTION_FRAC: f64 = 0.5;
/// Sampling attempts per backoff stage.
const ATTEMPTS_PER_STAGE: usize = 500;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A planned entry plus enough provenance to rewrite its upload row.
#[derive(Debug, Clone)]
pub struct PlannedEntry {
    pub entry: FieldEntry,
    /// Slot indices that were open before planning.
    pub open_slots: Vec<usize>,
    /// Index of the originating row in the live contest file.
    pub row_index: usize,
}

#[derive(Debug, Default)]
pub struct SwapOutcome {
    pub planned: Vec<PlannedEntry>,
    /// Entries dropped because they reference unknown players or are empty.
    pub skipped: usize,
    /// Entries that exhausted backoff and carry a partial lineup.
    pub flagged: usize,
}

#[derive(Debug, Clone)]
pub struct SwapSettings {
    pub seed: u64,
    /// Rebuild open slots with the optimizer instead of field sampling.
    pub user_optimized: bool,
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

pub struct SwapPlanner<'a> {
    catalog: &'a Catalog,
    rules: &'a RosterRules,
    field_gen: &'a FieldGenerator<'a>,
    settings: SwapSettings,
}

impl<'a> SwapPlanner<'a> {
    pub fn new(
        catalog: &'a Catalog,
        rules: &'a RosterRules,
        field_gen: &'a FieldGenerator<'a>,
        settings: SwapSettings,
    ) -> Self {
        SwapPlanner {
            catalog,
            rules,
            field_gen,
            settings,
        }
    }

    /// Plan every entry in the live contest file.
    pub fn plan(&self, file: &LiveContestFile) -> SwapOutcome {
        let mut outcome = SwapOutcome::default();

        for (row_index, row) in file.rows.iter().enumerate() {
            // An entry with no cell content at all has nothing to plan.
            if row.cells.iter().all(|c| *c == CellContent::Empty) {
                warn!("entry {} has no cells; skipping", row.entry_id);
                outcome.skipped += 1;
                continue;
            }

            let Some(slots) = self.resolve_cells(&row.cells, &row.entry_id) else {
                outcome.skipped += 1;
                continue;
            };

            let mut entry = self.entry_from_slots(&row.entry_id, &row.user, slots);
            let open_slots = entry.unlocked_slots();

            match entry.state() {
                EntryState::Empty | EntryState::Partial => {
                    let locked: Vec<(usize, PlayerId)> = entry
                        .slots
                        .iter()
                        .enumerate()
                        .filter_map(|(i, s)| s.map(|p| (i, p)))
                        .collect();

                    let filled = if self.settings.user_optimized {
                        self.optimize_fill(&locked)
                    } else {
                        self.sample_fill(&locked, row_index as u64)
                    };

                    match filled {
                        Some(mut ids) => {
                            self.rotate_for_flexibility(&mut ids, &open_slots);
                            entry.slots = ids.into_iter().map(Some).collect();
                        }
                        None => {
                            warn!(
                                "entry {}: no valid fill after backoff; emitting partial",
                                row.entry_id
                            );
                            entry.flagged = true;
                            outcome.flagged += 1;
                        }
                    }
                    outcome.planned.push(PlannedEntry {
                        entry,
                        open_slots,
                        row_index,
                    });
                }
                EntryState::AllLocked => {
                    outcome.planned.push(PlannedEntry {
                        entry,
                        open_slots,
                        row_index,
                    });
                }
            }
        }

        outcome
    }

    /// Resolve parsed cells to catalog players. Unknown references exclude
    /// the whole entry (with a warning), per the data-error policy.
    fn resolve_cells(
        &self,
        cells: &[CellContent],
        entry_id: &str,
    ) -> Option<Vec<Option<PlayerId>>> {
        let mut out = Vec::with_capacity(cells.len());
        for (slot_idx, cell) in cells.iter().enumerate() {
            match cell {
                CellContent::Locked => out.push(None),
                CellContent::Empty => out.push(None),
                CellContent::Named { name, site_id } => {
                    let resolved = site_id
                        .as_deref()
                        .and_then(|id| self.catalog.by_site_id(id))
                        .or_else(|| self.find_by_name(name, slot_idx));
                    match resolved {
                        Some(id) => out.push(Some(id)),
                        None => {
                            warn!(
                                "entry {entry_id} references unknown player '{name}'; excluding entry"
                            );
                            return None;
                        }
                    }
                }
            }
        }
        Some(out)
    }

    /// Name-based fallback lookup: the first catalog entry with this name
    /// that is eligible for the slot.
    fn find_by_name(&self, name: &str, slot_idx: usize) -> Option<PlayerId> {
        let slot = self.rules.slots[slot_idx];
        self.catalog
            .ids()
            .find(|&id| {
                let p = &self.catalog.players()[id];
                p.name == name && p.eligible(slot)
            })
    }

    fn entry_from_slots(
        &self,
        entry_id: &str,
        user: &str,
        slots: Vec<Option<PlayerId>>,
    ) -> FieldEntry {
        let mut locked_salary = 0u32;
        let mut locked_projection = 0.0;
        let mut minutes = 0.0;
        for p in slots.iter().flatten().map(|&id| &self.catalog.players()[id]) {
            locked_salary += p.salary;
            locked_projection += p.projection;
            minutes += p.minutes_remaining.unwrap_or(REGULATION_MINUTES);
        }
        FieldEntry {
            entry_id: entry_id.to_string(),
            user: user.to_string(),
            slots,
            locked_salary,
            locked_projection,
            minutes_remaining: minutes,
            flagged: false,
        }
    }

    /// Field-sampler fill with the two-floor backoff: after each exhausted
    /// stage both floors decay by `BACKOFF_FACTOR` until their minima.
    fn sample_fill(&self, locked: &[(usize, PlayerId)], entry_index: u64) -> Option<Vec<PlayerId>> {
        let mut rng = StdRng::seed_from_u64(split_seed(self.settings.seed, entry_index));
        let cap = self.rules.salary_cap;
        let mut salary_floor = self.field_gen.salary_floor();
        let mut projection_floor = self.field_gen.projection_floor();
        let min_salary_floor = (cap as f64 * MIN_SALARY_FLOOR_FRAC) as u32;
        let min_projection_floor = MIN_PROJECTION_FRAC * self.field_gen.optimal();

        loop {
            for _ in 0..ATTEMPTS_PER_STAGE {
                if let Some(lineup) = self
                    .field_gen
                    .attempt(&mut rng, locked, salary_floor, projection_floor)
                {
                    return Some(lineup.slots);
                }
            }
            let at_minima =
                salary_floor <= min_salary_floor && projection_floor <= min_projection_floor;
            if at_minima {
                return None;
            }
            salary_floor =
                (((salary_floor as f64) * BACKOFF_FACTOR) as u32).max(min_salary_floor);
            projection_floor = (projection_floor * BACKOFF_FACTOR).max(min_projection_floor);
        }
    }

    /// Optimizer rebuild of the open slots with every named player pinned.
    fn optimize_fill(&self, locked: &[(usize, PlayerId)]) -> Option<Vec<PlayerId>> {
        let settings = OptimizerSettings {
            num_lineups: 1,
            num_uniques: 1,
            randomness: 0.0,
            deterministic: true,
            seed: self.settings.seed,
            min_salary: None,
            team_limit: self.rules.team_cap,
            matchup_max: Default::default(),
            matchup_min: Default::default(),
            at_least: Vec::new(),
            at_most: Vec::new(),
            locks: locked.to_vec(),
        };
        let lineups = Optimizer::new(self.catalog, self.rules, settings).run();
        lineups.into_iter().next().map(|l| l.slots)
    }

    /// Post-fill rotation: among the newly filled slots, move the
    /// latest-starting players into flex positions so the entry keeps
    /// maximum late-swap flexibility. Locked players stay in their slots.
    fn rotate_for_flexibility(&self, slots: &mut [PlayerId], open_slots: &[usize]) {
        let start = |id: PlayerId| -> DateTime<Utc> {
            self.catalog.players()[id]
                .game_start
                .unwrap_or(DateTime::<Utc>::MIN_UTC)
        };

        let mut changed = true;
        while changed {
            changed = false;
            for &i in open_slots {
                if self.rules.slots[i].is_flex() {
                    continue;
                }
                for &j in open_slots {
                    if !self.rules.slots[j].is_flex() {
                        continue;
                    }
                    let (a, b) = (slots[i], slots[j]);
                    if start(a) <= start(b) {
                        continue;
                    }
                    let a_fits_flex = self.catalog.players()[a].eligible(self.rules.slots[j]);
                    let b_fits_dedicated = self.catalog.players()[b].eligible(self.rules.slots[i]);
                    if a_fits_flex && b_fits_dedicated {
                        slots.swap(i, j);
                        changed = true;
                    }
                }
            }
        }
    }

    /// The completed lineups of planned entries, for simulation.
    pub fn lineups(&self, outcome: &SwapOutcome) -> Vec<(Lineup, String, String)> {
        let mut out = Vec::new();
        for planned in &outcome.planned {
            if planned.entry.flagged {
                continue;
            }
            match planned.entry.lineup(self.catalog, self.rules, LineupKind::Input) {
                Ok(lineup) => out.push((
                    lineup,
                    planned.entry.user.clone(),
                    planned.entry.entry_id.clone(),
                )),
                Err(e) => {
                    warn!("entry {}: invalid after planning: {e}", planned.entry.entry_id);
                }
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::basic_player;
    use crate::data::live::LiveEntryRow;
    use crate::field::FieldSettings;
    use crate::optimizer::OptimizerSettings;
    use crate::rules::{ContestStyle, Position as P, Site};
    use crate::sim::correlation::CorrelationTable;
    use chrono::TimeZone;

    fn pool() -> (Catalog, RosterRules) {
        let table = CorrelationTable::builtin();
        let mut catalog = Catalog::new(0.0, 0.25);
        let specs: [(&str, &str, &str, Vec<P>, u32, f64); 16] = [
            ("A1", "AAA", "BBB", vec![P::PointGuard], 6000, 32.0),
            ("A2", "AAA", "BBB", vec![P::ShootingGuard], 6100, 33.0),
            ("A3", "AAA", "BBB", vec![P::SmallForward], 6200, 34.0),
            ("A4", "AAA", "BBB", vec![P::Center], 6300, 35.0),
            ("B1", "BBB", "AAA", vec![P::PointGuard], 6050, 32.0),
            ("B2", "BBB", "AAA", vec![P::ShootingGuard], 6150, 33.0),
            ("B3", "BBB", "AAA", vec![P::PowerForward], 6250, 34.0),
            ("B4", "BBB", "AAA", vec![P::Center], 6350, 35.0),
            ("C1", "CCC", "DDD", vec![P::PointGuard], 6020, 31.0),
            ("C2", "CCC", "DDD", vec![P::ShootingGuard], 6120, 32.0),
            ("C3", "CCC", "DDD", vec![P::SmallForward], 6220, 33.0),
            ("C4", "CCC", "DDD", vec![P::PowerForward], 6320, 34.0),
            ("D1", "DDD", "CCC", vec![P::PointGuard], 6080, 31.0),
            ("D2", "DDD", "CCC", vec![P::SmallForward], 6180, 32.0),
            ("D3", "DDD", "CCC", vec![P::PowerForward], 6280, 33.0),
            ("D4", "DDD", "CCC", vec![P::Center], 6380, 34.0),
        ];
        for (i, (name, team, opp, pos, sal, proj)) in specs.into_iter().enumerate() {
            let mut p = basic_player(name, team, opp, pos, sal, proj);
            p.ownership = 10.0;
            p.site_id = Some(format!("{}", 100 + i));
            // Stagger start times: the DDD/CCC game tips later.
            let hour = if team == "CCC" || team == "DDD" { 22 } else { 19 };
            p.game_start = Some(chrono::Utc.with_ymd_and_hms(2024, 3, 24, hour, 0, 0).unwrap());
            catalog.insert(p, &table);
        }
        let rules = RosterRules::for_contest(Site::SiteA, ContestStyle::Classic);
        (catalog, rules)
    }

    fn field_gen<'a>(catalog: &'a Catalog, rules: &'a RosterRules) -> FieldGenerator<'a> {
        let opt_settings = OptimizerSettings {
            num_lineups: 1,
            num_uniques: 1,
            randomness: 0.0,
            deterministic: true,
            seed: 0,
            min_salary: None,
            team_limit: 4,
            matchup_max: Default::default(),
            matchup_min: Default::default(),
            at_least: Vec::new(),
            at_most: Vec::new(),
            locks: Vec::new(),
        };
        let optimal = Optimizer::new(catalog, rules, opt_settings)
            .optimal_field_score()
            .unwrap();
        let settings = FieldSettings {
            field_size: 0,
            seed: 9,
            max_pct_off_optimal: 0.25,
            team_limit: 4,
            overlap_limit: 4,
            max_attempts: 500,
        };
        FieldGenerator::new(catalog, rules, settings, optimal)
    }

    fn row(entry_id: &str, cells: Vec<&str>) -> LiveEntryRow {
        LiveEntryRow {
            entry_id: entry_id.to_string(),
            user: format!("user_{entry_id}"),
            cells: cells.iter().map(|c| crate::data::live::parse_cell(c)).collect(),
            record: cells.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn file(rows: Vec<LiveEntryRow>) -> LiveContestFile {
        LiveContestFile {
            headers: vec![],
            slot_columns: vec![],
            rows,
        }
    }

    fn planner_settings() -> SwapSettings {
        SwapSettings {
            seed: 5,
            user_optimized: false,
        }
    }

    // -- State machine --

    #[test]
    fn all_locked_entry_passes_through() {
        let (catalog, rules) = pool();
        let gen = field_gen(&catalog, &rules);
        let planner = SwapPlanner::new(&catalog, &rules, &gen, planner_settings());

        // A full named lineup: PG A1, SG A2, SF A3, PF B3, C B4, G B1, F C3, UTIL C4.
        let cells = vec![
            "A1 (100)", "A2 (101)", "A3 (102)", "B3 (106)", "B4 (107)", "B1 (104)",
            "C3 (110)", "C4 (111)",
        ];
        let outcome = planner.plan(&file(vec![row("1", cells)]));
        assert_eq!(outcome.planned.len(), 1);
        assert_eq!(outcome.skipped, 0);
        let entry = &outcome.planned[0].entry;
        assert!(entry.unlocked_slots().is_empty());
        assert!(!entry.flagged);
    }

    #[test]
    fn empty_entry_skipped() {
        let (catalog, rules) = pool();
        let gen = field_gen(&catalog, &rules);
        let planner = SwapPlanner::new(&catalog, &rules, &gen, planner_settings());
        let outcome = planner.plan(&file(vec![row("2", vec!["", "", "", "", "", "", "", ""])]));
        assert!(outcome.planned.is_empty());
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn unknown_player_excludes_entry() {
        let (catalog, rules) = pool();
        let gen = field_gen(&catalog, &rules);
        let planner = SwapPlanner::new(&catalog, &rules, &gen, planner_settings());
        let cells = vec![
            "Nobody Known (999)", "A2 (101)", "A3 (102)", "B3 (106)", "B4 (107)",
            "B1 (104)", "C3 (110)", "C4 (111)",
        ];
        let outcome = planner.plan(&file(vec![row("3", cells)]));
        assert!(outcome.planned.is_empty());
        assert_eq!(outcome.skipped, 1);
    }

    // -- Fill generation --

    #[test]
    fn partial_entry_fill_preserves_locks_and_caps() {
        let (catalog, rules) = pool();
        let gen = field_gen(&catalog, &rules);
        let planner = SwapPlanner::new(&catalog, &rules, &gen, planner_settings());

        // PG and UTIL are open; six players pinned.
        let cells = vec![
            "LOCKED", "A2 (101)", "A3 (102)", "B3 (106)", "B4 (107)", "B1 (104)",
            "C3 (110)", "LOCKED",
        ];
        let outcome = planner.plan(&file(vec![row("4", cells)]));
        assert_eq!(outcome.planned.len(), 1);
        assert_eq!(outcome.flagged, 0);

        let entry = &outcome.planned[0].entry;
        let slots: Vec<PlayerId> = entry.slots.iter().flatten().copied().collect();
        assert_eq!(slots.len(), 8);

        // Locked players kept in their slots.
        let a2 = catalog.get_id("A2", "SG", "AAA").unwrap();
        let b1 = catalog.get_id("B1", "PG", "BBB").unwrap();
        assert_eq!(entry.slots[1], Some(a2));
        assert_eq!(entry.slots[5], Some(b1));

        // New players are distinct and the lineup is structurally valid.
        let lineup = entry
            .lineup(&catalog, &rules, LineupKind::Input)
            .expect("filled entry must validate");
        assert!(lineup.salary <= rules.salary_cap);
    }

    #[test]
    fn fill_is_seed_deterministic() {
        let (catalog, rules) = pool();
        let gen = field_gen(&catalog, &rules);
        let cells = vec![
            "LOCKED", "A2 (101)", "A3 (102)", "B3 (106)", "B4 (107)", "B1 (104)",
            "C3 (110)", "LOCKED",
        ];
        let planner = SwapPlanner::new(&catalog, &rules, &gen, planner_settings());
        let a = planner.plan(&file(vec![row("5", cells.clone())]));
        let b = planner.plan(&file(vec![row("5", cells)]));
        assert_eq!(a.planned[0].entry.slots, b.planned[0].entry.slots);
    }

    #[test]
    fn user_optimized_fill_maximizes_projection() {
        let (catalog, rules) = pool();
        let gen = field_gen(&catalog, &rules);
        let mut settings = planner_settings();
        settings.user_optimized = true;
        let planner = SwapPlanner::new(&catalog, &rules, &gen, settings);

        let cells = vec![
            "LOCKED", "A2 (101)", "A3 (102)", "B3 (106)", "B4 (107)", "B1 (104)",
            "C3 (110)", "LOCKED",
        ];
        let outcome = planner.plan(&file(vec![row("6", cells)]));
        let entry = &outcome.planned[0].entry;
        let lineup = entry.lineup(&catalog, &rules, LineupKind::Input).unwrap();

        // The optimizer must pick the best PG and best remaining UTIL for
        // the open slots: A1 (32.0) at PG and A4 (35.0) at UTIL.
        let a1 = catalog.get_id("A1", "PG", "AAA").unwrap();
        let a4 = catalog.get_id("A4", "C", "AAA").unwrap();
        assert_eq!(entry.slots[0], Some(a1));
        assert_eq!(entry.slots[7], Some(a4));
        assert!(lineup.salary <= rules.salary_cap);
    }

    // -- Flex rotation --

    #[test]
    fn later_starters_rotate_into_flex() {
        let (catalog, rules) = pool();
        let gen = field_gen(&catalog, &rules);
        let planner = SwapPlanner::new(&catalog, &rules, &gen, planner_settings());

        // D1 (late game) in the dedicated PG slot, A1 (early game) in the
        // open G flex; rotation should put the later starter into flex.
        let d1 = catalog.get_id("D1", "PG", "DDD").unwrap();
        let a1 = catalog.get_id("A1", "PG", "AAA").unwrap();
        let a2 = catalog.get_id("A2", "SG", "AAA").unwrap();
        let a3 = catalog.get_id("A3", "SF", "AAA").unwrap();
        let b3 = catalog.get_id("B3", "PF", "BBB").unwrap();
        let b4 = catalog.get_id("B4", "C", "BBB").unwrap();
        let c3 = catalog.get_id("C3", "SF", "CCC").unwrap();
        let c4 = catalog.get_id("C4", "PF", "CCC").unwrap();

        let mut slots = vec![d1, a2, a3, b3, b4, a1, c3, c4];
        // PG (slot 0) and G (slot 5) were both open fills.
        planner.rotate_for_flexibility(&mut slots, &[0, 5]);
        assert_eq!(slots[0], a1, "early starter should hold the dedicated slot");
        assert_eq!(slots[5], d1, "late starter should hold the flex slot");
    }
}
