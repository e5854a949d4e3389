// Stochastic opponent-field generation.
//
// Each target lineup is sampled slot by slot with probability proportional
// to ownership, then accepted only inside the realism band (salary near the
// cap, projection near the optimal, more than one team represented).
// Ownership weighting and the realism band are the only sources of
// opponent-lineup bias.

use std::collections::HashMap;

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::warn;

use crate::catalog::{Catalog, PlayerId};
use crate::config::Config;
use crate::lineup::{Lineup, LineupKind};
use crate::rules::{ContestStyle, RosterRules};
use crate::sim::split_seed;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FieldSettings {
    pub field_size: usize,
    pub seed: u64,
    /// Generated projection must stay within this fraction of the optimal.
    pub max_pct_off_optimal: f64,
    pub team_limit: usize,
    /// Showdown: maximum players from the captain's opponent.
    pub overlap_limit: usize,
    /// Sampling attempts per target lineup before giving up on it.
    pub max_attempts: usize,
}

impl FieldSettings {
    pub fn from_config(config: &Config) -> Self {
        FieldSettings {
            field_size: config.engine.field_size,
            seed: config.engine.seed,
            max_pct_off_optimal: config.engine.max_pct_off_optimal,
            team_limit: config.engine.global_team_limit,
            overlap_limit: config.engine.overlap_limit,
            max_attempts: 1000,
        }
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

pub struct FieldGenerator<'a> {
    catalog: &'a Catalog,
    rules: &'a RosterRules,
    settings: FieldSettings,
    /// Anchor for the projection floor: the unconstrained optimal over field
    /// projections.
    optimal: f64,
    /// Per-slot eligible candidates, precomputed once.
    slot_candidates: Vec<Vec<PlayerId>>,
    /// Minimum candidate salary per slot, for budget feasibility bounds.
    slot_min_salary: Vec<u32>,
    /// Entries of the same physical person, per player.
    person_mates: Vec<Vec<PlayerId>>,
}

impl<'a> FieldGenerator<'a> {
    pub fn new(
        catalog: &'a Catalog,
        rules: &'a RosterRules,
        settings: FieldSettings,
        optimal: f64,
    ) -> Self {
        let slot_candidates: Vec<Vec<PlayerId>> = rules
            .slots
            .iter()
            .map(|&slot| {
                catalog
                    .ids()
                    .filter(|&id| catalog.players()[id].eligible(slot))
                    .collect()
            })
            .collect();

        let slot_min_salary: Vec<u32> = slot_candidates
            .iter()
            .map(|list| {
                list.iter()
                    .map(|&id| catalog.players()[id].salary)
                    .min()
                    .unwrap_or(0)
            })
            .collect();

        let mut by_person: HashMap<(String, String), Vec<PlayerId>> = HashMap::new();
        for id in catalog.ids() {
            by_person
                .entry(catalog.players()[id].person_key())
                .or_default()
                .push(id);
        }
        let mut person_mates = vec![Vec::new(); catalog.len()];
        for ids in by_person.values() {
            for &id in ids {
                person_mates[id] = ids.clone();
            }
        }

        FieldGenerator {
            catalog,
            rules,
            settings,
            optimal,
            slot_candidates,
            slot_min_salary,
            person_mates,
        }
    }

    /// The realism anchor: optimal score over field projections.
    pub fn optimal(&self) -> f64 {
        self.optimal
    }

    /// The projection floor implied by the realism band.
    pub fn projection_floor(&self) -> f64 {
        (1.0 - self.settings.max_pct_off_optimal) * self.optimal
    }

    /// The salary floor implied by the realism band.
    pub fn salary_floor(&self) -> u32 {
        self.rules
            .salary_cap
            .saturating_sub(self.rules.salary_tolerance)
    }

    /// Generate the opponent field in parallel. Each target lineup owns a
    /// private RNG seeded from the master seed; results join in index order,
    /// so a fixed seed reproduces the same field. Targets that exhaust their
    /// attempts are dropped with a warning.
    pub fn generate(&self) -> Vec<Lineup> {
        let drawn: Vec<Option<Lineup>> = (0..self.settings.field_size)
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(split_seed(self.settings.seed, i as u64));
                self.generate_one(&mut rng)
            })
            .collect();

        let missed = drawn.iter().filter(|l| l.is_none()).count();
        if missed > 0 {
            warn!(
                "field generator dropped {missed} of {} lineups after {} attempts each",
                self.settings.field_size, self.settings.max_attempts
            );
        }
        drawn.into_iter().flatten().collect()
    }

    fn generate_one(&self, rng: &mut StdRng) -> Option<Lineup> {
        let salary_floor = self.salary_floor();
        let projection_floor = self.projection_floor();
        for _ in 0..self.settings.max_attempts {
            if let Some(lineup) = self.attempt(rng, &[], salary_floor, projection_floor) {
                return Some(lineup);
            }
        }
        None
    }

    /// One sampling attempt. `locked` pre-assigns slots (used by the swap
    /// planner); `salary_floor` and `projection_floor` are the realism
    /// thresholds, lowered by the swap planner's backoff.
    pub fn attempt(
        &self,
        rng: &mut StdRng,
        locked: &[(usize, PlayerId)],
        salary_floor: u32,
        projection_floor: f64,
    ) -> Option<Lineup> {
        let n = self.rules.roster_size();
        let cap = self.rules.salary_cap;

        let mut assignment: Vec<Option<PlayerId>> = vec![None; n];
        let mut in_lineup = vec![false; self.catalog.len()];
        let mut team_counts: HashMap<&str, usize> = HashMap::new();
        let mut salary: u32 = 0;
        let mut projection = 0.0;

        for &(slot_idx, player) in locked {
            let p = &self.catalog.players()[player];
            assignment[slot_idx] = Some(player);
            for &mate in &self.person_mates[player] {
                in_lineup[mate] = true;
            }
            *team_counts.entry(p.team.as_str()).or_insert(0) += 1;
            salary += p.salary;
            projection += p.field_projection;
        }

        let open: Vec<usize> = (0..n).filter(|&i| assignment[i].is_none()).collect();
        if open.is_empty() {
            return None;
        }

        // Minimum salary needed to finish the remaining OPEN slots.
        let mut open_suffix_min = vec![0u32; open.len() + 1];
        for (k, &slot_idx) in open.iter().enumerate().rev() {
            open_suffix_min[k] = open_suffix_min[k + 1] + self.slot_min_salary[slot_idx];
        }

        for (k, &slot_idx) in open.iter().enumerate() {
            let is_last = k == open.len() - 1;
            let mut choices: Vec<PlayerId> = Vec::new();
            let mut weights: Vec<f64> = Vec::new();

            for &id in &self.slot_candidates[slot_idx] {
                if in_lineup[id] {
                    continue;
                }
                let p = &self.catalog.players()[id];
                if team_counts.get(p.team.as_str()).copied().unwrap_or(0) + 1
                    > self.settings.team_limit.min(self.rules.team_cap)
                {
                    continue;
                }
                let next_salary = salary + p.salary;
                if next_salary + open_suffix_min[k + 1] > cap {
                    continue;
                }
                if is_last && (next_salary < salary_floor || next_salary > cap) {
                    continue;
                }
                let mut weight = p.ownership;
                if is_last {
                    // Bias the final pick toward spending the remaining cap.
                    weight *= (p.salary as f64 / cap as f64).powi(2);
                }
                choices.push(id);
                weights.push(weight);
            }

            if choices.is_empty() {
                return None;
            }
            let dist = WeightedIndex::new(&weights).ok()?;
            let pick = choices[dist.sample(rng)];
            let p = &self.catalog.players()[pick];

            assignment[slot_idx] = Some(pick);
            for &mate in &self.person_mates[pick] {
                in_lineup[mate] = true;
            }
            *team_counts.entry(p.team.as_str()).or_insert(0) += 1;
            salary += p.salary;
            projection += p.field_projection;
        }

        // Realism band and structural rejection.
        if salary < salary_floor || salary > cap {
            return None;
        }
        if projection < projection_floor {
            return None;
        }
        if team_counts.len() < 2 {
            return None;
        }
        if self.rules.style == ContestStyle::Showdown {
            let captain = assignment[0]?;
            let captain_opponent = self.catalog.players()[captain].opponent.clone();
            let from_opponent = assignment
                .iter()
                .flatten()
                .filter(|&&id| self.catalog.players()[id].team == captain_opponent)
                .count();
            if from_opponent > self.settings.overlap_limit {
                return None;
            }
        }

        let ids: Vec<PlayerId> = assignment.into_iter().flatten().collect();
        Lineup::build(&ids, self.catalog, self.rules, LineupKind::Generated).ok()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::basic_player;
    use crate::rules::{Position as P, Site, Slot};
    use crate::sim::correlation::CorrelationTable;

    /// Sixteen players across four teams (two matchups) with salaries tuned
    /// so random rosters frequently land inside [cap - 1000, cap].
    fn pool() -> (Catalog, RosterRules) {
        let table = CorrelationTable::builtin();
        let mut catalog = Catalog::new(0.0, 0.25);
        let specs: [(&str, &str, &str, Vec<P>, u32, f64, f64); 16] = [
            ("A1", "AAA", "BBB", vec![P::PointGuard], 6000, 32.0, 50.0),
            ("A2", "AAA", "BBB", vec![P::ShootingGuard], 6100, 33.0, 10.0),
            ("A3", "AAA", "BBB", vec![P::SmallForward], 6200, 34.0, 10.0),
            ("A4", "AAA", "BBB", vec![P::Center], 6300, 35.0, 10.0),
            ("B1", "BBB", "AAA", vec![P::PointGuard], 6050, 32.0, 1.0),
            ("B2", "BBB", "AAA", vec![P::ShootingGuard], 6150, 33.0, 10.0),
            ("B3", "BBB", "AAA", vec![P::PowerForward], 6250, 34.0, 10.0),
            ("B4", "BBB", "AAA", vec![P::Center], 6350, 35.0, 10.0),
            ("C1", "CCC", "DDD", vec![P::PointGuard], 6020, 31.0, 10.0),
            ("C2", "CCC", "DDD", vec![P::ShootingGuard], 6120, 32.0, 10.0),
            ("C3", "CCC", "DDD", vec![P::SmallForward], 6220, 33.0, 10.0),
            ("C4", "CCC", "DDD", vec![P::PowerForward], 6320, 34.0, 10.0),
            ("D1", "DDD", "CCC", vec![P::PointGuard], 6080, 31.0, 10.0),
            ("D2", "DDD", "CCC", vec![P::SmallForward], 6180, 32.0, 10.0),
            ("D3", "DDD", "CCC", vec![P::PowerForward], 6280, 33.0, 10.0),
            ("D4", "DDD", "CCC", vec![P::Center], 6380, 34.0, 10.0),
        ];
        for (name, team, opp, pos, sal, proj, own) in specs {
            let mut p = basic_player(name, team, opp, pos, sal, proj);
            p.ownership = own;
            catalog.insert(p, &table);
        }
        let rules = RosterRules::for_contest(Site::SiteA, ContestStyle::Classic);
        (catalog, rules)
    }

    fn settings(field_size: usize) -> FieldSettings {
        FieldSettings {
            field_size,
            seed: 42,
            max_pct_off_optimal: 0.25,
            team_limit: 4,
            overlap_limit: 4,
            max_attempts: 500,
        }
    }

    fn optimal_for(catalog: &Catalog, rules: &RosterRules) -> f64 {
        use crate::optimizer::{Optimizer, OptimizerSettings};
        use std::collections::HashMap;
        let s = OptimizerSettings {
            num_lineups: 1,
            num_uniques: 1,
            randomness: 0.0,
            deterministic: true,
            seed: 0,
            min_salary: None,
            team_limit: 4,
            matchup_max: HashMap::new(),
            matchup_min: HashMap::new(),
            at_least: Vec::new(),
            at_most: Vec::new(),
            locks: Vec::new(),
        };
        Optimizer::new(catalog, rules, s)
            .optimal_field_score()
            .expect("pool should be feasible")
    }

    // -- Realism band --

    #[test]
    fn generated_field_respects_realism_band() {
        let (catalog, rules) = pool();
        let optimal = optimal_for(&catalog, &rules);
        let gen = FieldGenerator::new(&catalog, &rules, settings(200), optimal);
        let field = gen.generate();

        assert!(field.len() >= 190, "only {} of 200 generated", field.len());
        let floor = rules.salary_cap - rules.salary_tolerance;
        for lineup in &field {
            assert!(lineup.salary >= floor && lineup.salary <= rules.salary_cap);
            assert!(lineup.field_projection >= 0.75 * optimal - 1e-9);
            let teams: std::collections::HashSet<&str> = lineup
                .slots
                .iter()
                .map(|&id| catalog.players()[id].team.as_str())
                .collect();
            assert!(teams.len() >= 2);
        }
    }

    #[test]
    fn generated_lineups_are_structurally_valid() {
        let (catalog, rules) = pool();
        let optimal = optimal_for(&catalog, &rules);
        let gen = FieldGenerator::new(&catalog, &rules, settings(100), optimal);
        for lineup in gen.generate() {
            // Rebuilding through the validator must succeed unchanged.
            let rebuilt =
                Lineup::build(&lineup.slots, &catalog, &rules, LineupKind::Generated).unwrap();
            assert_eq!(rebuilt.slots, lineup.slots);
        }
    }

    // -- Determinism --

    #[test]
    fn same_seed_reproduces_field() {
        let (catalog, rules) = pool();
        let optimal = optimal_for(&catalog, &rules);
        let a = FieldGenerator::new(&catalog, &rules, settings(50), optimal).generate();
        let b = FieldGenerator::new(&catalog, &rules, settings(50), optimal).generate();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.slots, y.slots);
        }
    }

    // -- Ownership bias --

    #[test]
    fn high_ownership_players_appear_more_often() {
        let (catalog, rules) = pool();
        let optimal = optimal_for(&catalog, &rules);
        let gen = FieldGenerator::new(&catalog, &rules, settings(300), optimal);
        let field = gen.generate();

        let a1 = catalog.get_id("A1", "PG", "AAA").unwrap(); // 50% owned
        let b1 = catalog.get_id("B1", "PG", "BBB").unwrap(); // 1% owned
        let count = |id: PlayerId| {
            field
                .iter()
                .filter(|l| l.slots.contains(&id))
                .count()
        };
        assert!(
            count(a1) > count(b1) * 2,
            "A1 appeared {} times, B1 {} times",
            count(a1),
            count(b1)
        );
    }

    // -- Showdown --

    #[test]
    fn showdown_field_never_duplicates_a_person() {
        let table = CorrelationTable::builtin();
        let rules = RosterRules::for_contest(Site::SiteA, ContestStyle::Showdown);
        let mut catalog = Catalog::new(0.0, 0.25);
        // Ten people across the two showdown teams, each with CPT and UTIL
        // variants; salaries spread so the band is reachable.
        for i in 0..10 {
            let (team, opp) = if i % 2 == 0 { ("HOM", "AWY") } else { ("AWY", "HOM") };
            let name = format!("S{i}");
            let salary = 7000 + (i as u32) * 150;
            let proj = 22.0 + i as f64;
            let mut util = basic_player(&name, team, opp, vec![P::Center], salary, proj);
            util.variant = Some(Slot::Util);
            util.ownership = 10.0;
            catalog.insert(util, &table);
            let mut cpt = basic_player(&name, team, opp, vec![P::Center], salary, proj);
            cpt.variant = Some(Slot::Captain);
            cpt.salary = (salary as f64 * 1.5).round() as u32;
            cpt.projection = proj * 1.5;
            cpt.ownership = 5.0;
            catalog.insert(cpt, &table);
        }
        catalog.link_util_twins();

        let optimal = optimal_for(&catalog, &rules);
        let mut s = settings(100);
        s.overlap_limit = 3;
        let gen = FieldGenerator::new(&catalog, &rules, s, optimal);
        let field = gen.generate();
        assert!(!field.is_empty());

        for lineup in &field {
            let mut names: Vec<&str> = lineup
                .slots
                .iter()
                .map(|&id| catalog.players()[id].name.as_str())
                .collect();
            names.sort_unstable();
            names.dedup();
            assert_eq!(names.len(), 6, "a person appears twice in {:?}", lineup.slots);

            // Captain-opponent overlap limit holds.
            let captain = &catalog.players()[lineup.slots[0]];
            let from_opp = lineup
                .slots
                .iter()
                .filter(|&&id| catalog.players()[id].team == captain.opponent)
                .count();
            assert!(from_opp <= 3);
        }
    }
}
