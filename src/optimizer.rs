// Iterative lineup optimization.
//
// One binary decision per (player, eligible slot), solved exactly by
// depth-first branch and bound over the roster slots with admissible score
// and salary bounds. The solver runs once per requested lineup; between
// iterations a diversity cut is installed (deterministic objective ceiling
// or a stochastic objective perturbation) along with uniqueness cuts
// against every previously emitted lineup.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use tracing::{info, warn};

use crate::catalog::{normalize_name, Catalog, PlayerId};
use crate::config::{Config, GroupRule};
use crate::lineup::{Lineup, LineupKind};
use crate::rules::RosterRules;
use crate::sim::split_seed;

/// Gap forced between consecutive deterministic optima. Must stay below the
/// projection quantization (feeds carry two decimals).
pub const DIVERSITY_EPSILON: f64 = 1e-2;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OptimizerSettings {
    pub num_lineups: usize,
    /// Minimum player differences between emitted lineups.
    pub num_uniques: usize,
    /// Stochastic-cut spread as a percent of stddev; ignored when
    /// `deterministic` is set.
    pub randomness: f64,
    pub deterministic: bool,
    pub seed: u64,
    /// Optimizer-side salary floor (distinct from the field realism floor).
    pub min_salary: Option<u32>,
    pub team_limit: usize,
    pub matchup_max: HashMap<String, usize>,
    pub matchup_min: HashMap<String, usize>,
    /// (required count, group member ids).
    pub at_least: Vec<(usize, Vec<PlayerId>)>,
    pub at_most: Vec<(usize, Vec<PlayerId>)>,
    /// Late-swap pins: (slot index, player). The variable is fixed to 1.
    pub locks: Vec<(usize, PlayerId)>,
}

impl OptimizerSettings {
    pub fn from_config(config: &Config, catalog: &Catalog) -> Self {
        OptimizerSettings {
            num_lineups: config.engine.num_lineups,
            num_uniques: config.engine.num_uniques.max(1),
            randomness: config.engine.randomness,
            deterministic: config.engine.deterministic,
            seed: config.engine.seed,
            min_salary: Some(config.engine.min_lineup_salary),
            team_limit: config.engine.global_team_limit,
            matchup_max: config.matchup_max.clone(),
            matchup_min: config.matchup_min.clone(),
            at_least: config
                .at_least
                .iter()
                .map(|g| resolve_group(catalog, g))
                .collect(),
            at_most: config
                .at_most
                .iter()
                .map(|g| resolve_group(catalog, g))
                .collect(),
            locks: Vec::new(),
        }
    }
}

/// Resolve a configured name group to catalog ids. Unknown names are warned
/// about and dropped; a fully unresolvable group becomes a no-op.
fn resolve_group(catalog: &Catalog, rule: &GroupRule) -> (usize, Vec<PlayerId>) {
    let mut ids = Vec::new();
    for raw in &rule.players {
        let name = normalize_name(raw);
        let mut found = false;
        for id in catalog.ids() {
            if catalog.players()[id].name == name {
                ids.push(id);
                found = true;
            }
        }
        if !found {
            warn!("group rule references unknown player '{raw}'");
        }
    }
    (rule.count, ids)
}

// ---------------------------------------------------------------------------
// Optimizer
// ---------------------------------------------------------------------------

pub struct Optimizer<'a> {
    catalog: &'a Catalog,
    rules: &'a RosterRules,
    settings: OptimizerSettings,
}

impl<'a> Optimizer<'a> {
    pub fn new(catalog: &'a Catalog, rules: &'a RosterRules, settings: OptimizerSettings) -> Self {
        Optimizer {
            catalog,
            rules,
            settings,
        }
    }

    /// Emit up to `num_lineups` lineups. Infeasibility is non-fatal: the
    /// lineups gathered so far are returned and the shortfall is logged.
    pub fn run(&self) -> Vec<Lineup> {
        let base: Vec<f64> = self.catalog.players().iter().map(|p| p.projection).collect();
        let mut lineups: Vec<Lineup> = Vec::new();
        let mut cuts: Vec<Vec<PlayerId>> = Vec::new();
        let mut ceiling: Option<f64> = None;

        for iteration in 0..self.settings.num_lineups {
            let scores = if self.settings.deterministic {
                base.clone()
            } else {
                self.perturbed_scores(iteration as u64)
            };

            let Some(ids) = self.solve(&scores, ceiling, &cuts) else {
                info!(
                    "optimizer infeasible after {} of {} lineups",
                    lineups.len(),
                    self.settings.num_lineups
                );
                break;
            };

            // The ceiling tracks the unperturbed objective so deterministic
            // mode enumerates the top-N in projection order.
            let objective: f64 = ids.iter().map(|&id| base[id]).sum();
            if self.settings.deterministic {
                ceiling = Some(objective - DIVERSITY_EPSILON);
            }

            match Lineup::build(&ids, self.catalog, self.rules, LineupKind::User) {
                Ok(lineup) => {
                    let mut key = ids.clone();
                    key.sort_unstable();
                    cuts.push(key);
                    lineups.push(lineup);
                }
                Err(e) => {
                    warn!("optimizer produced an invalid lineup: {e}");
                    break;
                }
            }
        }

        lineups
    }

    /// Objective value of the unconstrained-by-diversity solve against field
    /// projections: the anchor for the field generator's realism band.
    pub fn optimal_field_score(&self) -> Option<f64> {
        let scores: Vec<f64> = self
            .catalog
            .players()
            .iter()
            .map(|p| p.field_projection)
            .collect();
        let ids = self.solve(&scores, None, &[])?;
        Some(ids.iter().map(|&id| scores[id]).sum())
    }

    /// Best objective against raw projections, without diversity cuts.
    pub fn optimal_score(&self) -> Option<f64> {
        let scores: Vec<f64> = self.catalog.players().iter().map(|p| p.projection).collect();
        let ids = self.solve(&scores, None, &[])?;
        Some(ids.iter().map(|&id| scores[id]).sum())
    }

    fn perturbed_scores(&self, iteration: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(split_seed(self.settings.seed, iteration));
        let spread = self.settings.randomness / 100.0;
        self.catalog
            .players()
            .iter()
            .map(|p| {
                let sigma = p.stddev * spread;
                if sigma > 0.0 {
                    Normal::new(p.projection, sigma)
                        .map(|n| n.sample(&mut rng))
                        .unwrap_or(p.projection)
                } else {
                    p.projection
                }
            })
            .collect()
    }

    // -- Single solve ------------------------------------------------------

    /// Solve one lineup maximizing `scores`, optionally under an objective
    /// ceiling (deterministic cut) and the uniqueness cuts. Returns per-slot
    /// player ids, or None when infeasible.
    fn solve(
        &self,
        scores: &[f64],
        ceiling: Option<f64>,
        cuts: &[Vec<PlayerId>],
    ) -> Option<Vec<PlayerId>> {
        let n_slots = self.rules.roster_size();
        let roster_team_cap = self.settings.team_limit.min(self.rules.team_cap);

        // Lock application happens before the search; locked slots are not
        // explored.
        let mut assignment: Vec<Option<PlayerId>> = vec![None; n_slots];
        for &(slot_idx, player) in &self.settings.locks {
            if slot_idx >= n_slots {
                return None;
            }
            assignment[slot_idx] = Some(player);
        }
        let open_slots: Vec<usize> = (0..n_slots).filter(|i| assignment[*i].is_none()).collect();

        // Candidate lists per open slot, sorted by score desc then id asc
        // for deterministic tie-breaking.
        let mut candidates: Vec<Vec<PlayerId>> = Vec::with_capacity(open_slots.len());
        for &slot_idx in &open_slots {
            let slot = self.rules.slots[slot_idx];
            let mut list: Vec<PlayerId> = self
                .catalog
                .ids()
                .filter(|&id| self.catalog.players()[id].eligible(slot))
                .collect();
            if list.is_empty() {
                return None;
            }
            list.sort_by(|&a, &b| {
                scores[b]
                    .partial_cmp(&scores[a])
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.cmp(&b))
            });
            candidates.push(list);
        }

        // Admissible suffix bounds over the open-slot sequence.
        let depth = open_slots.len();
        let mut suffix_max_score = vec![0.0; depth + 1];
        let mut suffix_min_score = vec![0.0; depth + 1];
        let mut suffix_min_salary = vec![0u32; depth + 1];
        let mut suffix_max_salary = vec![0u32; depth + 1];
        for k in (0..depth).rev() {
            let list = &candidates[k];
            let max_score = list
                .iter()
                .map(|&id| scores[id])
                .fold(f64::NEG_INFINITY, f64::max);
            let min_score = list.iter().map(|&id| scores[id]).fold(f64::INFINITY, f64::min);
            let min_salary = list
                .iter()
                .map(|&id| self.catalog.players()[id].salary)
                .min()
                .unwrap_or(0);
            let max_salary = list
                .iter()
                .map(|&id| self.catalog.players()[id].salary)
                .max()
                .unwrap_or(0);
            suffix_max_score[k] = suffix_max_score[k + 1] + max_score;
            suffix_min_score[k] = suffix_min_score[k + 1] + min_score;
            suffix_min_salary[k] = suffix_min_salary[k + 1] + min_salary;
            suffix_max_salary[k] = suffix_max_salary[k + 1] + max_salary;
        }

        // Person groups: choosing one entry excludes every entry of the same
        // physical person (multiplier twins, multi-slot bindings).
        let person_mates = self.person_mates();

        // Player -> cut memberships for incremental overlap tracking.
        let allowed_overlap = n_slots.saturating_sub(self.settings.num_uniques);
        let mut player_cuts: Vec<Vec<usize>> = vec![Vec::new(); self.catalog.len()];
        for (cut_idx, cut) in cuts.iter().enumerate() {
            for &id in cut {
                player_cuts[id].push(cut_idx);
            }
        }

        let mut at_most_membership: Vec<Vec<usize>> = vec![Vec::new(); self.catalog.len()];
        for (g, (_, ids)) in self.settings.at_most.iter().enumerate() {
            for &id in ids {
                at_most_membership[id].push(g);
            }
        }
        let mut at_least_membership: Vec<Vec<usize>> = vec![Vec::new(); self.catalog.len()];
        for (g, (_, ids)) in self.settings.at_least.iter().enumerate() {
            for &id in ids {
                at_least_membership[id].push(g);
            }
        }

        let ctx = SearchContext {
            catalog: self.catalog,
            rules: self.rules,
            settings: &self.settings,
            scores,
            open_slots: &open_slots,
            candidates: &candidates,
            suffix_max_score: &suffix_max_score,
            suffix_min_score: &suffix_min_score,
            suffix_min_salary: &suffix_min_salary,
            suffix_max_salary: &suffix_max_salary,
            ceiling,
            cuts,
            allowed_overlap,
            person_mates: &person_mates,
            player_cuts: &player_cuts,
            at_most_membership: &at_most_membership,
            at_least_membership: &at_least_membership,
            team_cap: roster_team_cap,
        };

        let mut state = SearchState::new(self.catalog.len(), cuts.len(), &self.settings);

        // Seed state with locked players before exploring open slots.
        for &(_, player) in &self.settings.locks {
            if !state.apply(&ctx, player) {
                return None;
            }
        }

        state.dfs(&ctx, 0);

        let best = state.best?;
        let mut out = assignment;
        for (k, &slot_idx) in open_slots.iter().enumerate() {
            out[slot_idx] = Some(best.1[k]);
        }
        out.into_iter().collect()
    }

    fn person_mates(&self) -> Vec<Vec<PlayerId>> {
        let mut by_person: HashMap<(String, String), Vec<PlayerId>> = HashMap::new();
        for id in self.catalog.ids() {
            by_person
                .entry(self.catalog.players()[id].person_key())
                .or_default()
                .push(id);
        }
        let mut mates = vec![Vec::new(); self.catalog.len()];
        for ids in by_person.values() {
            for &id in ids {
                mates[id] = ids.clone();
            }
        }
        mates
    }
}

// ---------------------------------------------------------------------------
// Search internals
// ---------------------------------------------------------------------------

struct SearchContext<'a> {
    catalog: &'a Catalog,
    rules: &'a RosterRules,
    settings: &'a OptimizerSettings,
    scores: &'a [f64],
    open_slots: &'a [usize],
    candidates: &'a [Vec<PlayerId>],
    suffix_max_score: &'a [f64],
    suffix_min_score: &'a [f64],
    suffix_min_salary: &'a [u32],
    suffix_max_salary: &'a [u32],
    ceiling: Option<f64>,
    cuts: &'a [Vec<PlayerId>],
    allowed_overlap: usize,
    person_mates: &'a [Vec<PlayerId>],
    player_cuts: &'a [Vec<usize>],
    at_most_membership: &'a [Vec<usize>],
    at_least_membership: &'a [Vec<usize>],
    team_cap: usize,
}

struct SearchState {
    chosen: Vec<PlayerId>,
    used_person: Vec<bool>,
    salary: u32,
    score: f64,
    team_counts: HashMap<String, usize>,
    matchup_counts: HashMap<String, usize>,
    cut_overlap: Vec<usize>,
    at_most_counts: Vec<usize>,
    at_least_counts: Vec<usize>,
    best: Option<(f64, Vec<PlayerId>)>,
}

impl SearchState {
    fn new(n_players: usize, n_cuts: usize, settings: &OptimizerSettings) -> Self {
        SearchState {
            chosen: Vec::new(),
            used_person: vec![false; n_players],
            salary: 0,
            score: 0.0,
            team_counts: HashMap::new(),
            matchup_counts: HashMap::new(),
            cut_overlap: vec![0; n_cuts],
            at_most_counts: vec![0; settings.at_most.len()],
            at_least_counts: vec![0; settings.at_least.len()],
            best: None,
        }
    }

    /// Whether `player` can join the partial lineup at open-slot depth `k`.
    fn admissible(&self, ctx: &SearchContext, k: usize, player: PlayerId) -> bool {
        if self.used_person[player] {
            return false;
        }
        let p = &ctx.catalog.players()[player];

        if self.salary + p.salary + ctx.suffix_min_salary[k + 1] > ctx.rules.salary_cap {
            return false;
        }
        if let Some(floor) = ctx.settings.min_salary {
            if self.salary + p.salary + ctx.suffix_max_salary[k + 1] < floor {
                return false;
            }
        }
        if self.team_counts.get(&p.team).copied().unwrap_or(0) + 1 > ctx.team_cap {
            return false;
        }
        if let Some(&cap) = ctx.settings.matchup_max.get(&p.matchup) {
            if self.matchup_counts.get(&p.matchup).copied().unwrap_or(0) + 1 > cap {
                return false;
            }
        }
        for &g in &ctx.at_most_membership[player] {
            if self.at_most_counts[g] + 1 > ctx.settings.at_most[g].0 {
                return false;
            }
        }
        for &cut in &ctx.player_cuts[player] {
            if self.cut_overlap[cut] + 1 > ctx.allowed_overlap {
                return false;
            }
        }
        true
    }

    fn apply(&mut self, ctx: &SearchContext, player: PlayerId) -> bool {
        let p = &ctx.catalog.players()[player];
        // Reject double-application of the same person (twin-locked entries).
        if self.used_person[player] {
            return false;
        }
        for &mate in &ctx.person_mates[player] {
            self.used_person[mate] = true;
        }
        self.chosen.push(player);
        self.salary += p.salary;
        self.score += ctx.scores[player];
        *self.team_counts.entry(p.team.clone()).or_insert(0) += 1;
        *self.matchup_counts.entry(p.matchup.clone()).or_insert(0) += 1;
        for &cut in &ctx.player_cuts[player] {
            self.cut_overlap[cut] += 1;
        }
        for &g in &ctx.at_most_membership[player] {
            self.at_most_counts[g] += 1;
        }
        for &g in &ctx.at_least_membership[player] {
            self.at_least_counts[g] += 1;
        }
        true
    }

    fn unapply(&mut self, ctx: &SearchContext, player: PlayerId) {
        let p = &ctx.catalog.players()[player];
        for &mate in &ctx.person_mates[player] {
            self.used_person[mate] = false;
        }
        self.chosen.pop();
        self.salary -= p.salary;
        self.score -= ctx.scores[player];
        if let Some(c) = self.team_counts.get_mut(&p.team) {
            *c -= 1;
        }
        if let Some(c) = self.matchup_counts.get_mut(&p.matchup) {
            *c -= 1;
        }
        for &cut in &ctx.player_cuts[player] {
            self.cut_overlap[cut] -= 1;
        }
        for &g in &ctx.at_most_membership[player] {
            self.at_most_counts[g] -= 1;
        }
        for &g in &ctx.at_least_membership[player] {
            self.at_least_counts[g] -= 1;
        }
    }

    fn dfs(&mut self, ctx: &SearchContext, k: usize) {
        let depth = ctx.open_slots.len();
        if k == depth {
            self.try_record(ctx);
            return;
        }

        // Score bound: even the optimistic completion cannot beat the best.
        if let Some((best_score, _)) = &self.best {
            if self.score + ctx.suffix_max_score[k] <= *best_score {
                return;
            }
        }
        // Ceiling bound: even the cheapest completion overshoots the cut.
        if let Some(ceiling) = ctx.ceiling {
            if self.score + ctx.suffix_min_score[k] > ceiling + 1e-9 {
                return;
            }
        }
        // At-least feasibility: remaining slots must be able to cover the
        // outstanding group requirements.
        for (g, (need, _)) in ctx.settings.at_least.iter().enumerate() {
            if need.saturating_sub(self.at_least_counts[g]) > depth - k {
                return;
            }
        }

        for &player in &ctx.candidates[k] {
            if !self.admissible(ctx, k, player) {
                continue;
            }
            if !self.apply(ctx, player) {
                continue;
            }
            self.dfs(ctx, k + 1);
            self.unapply(ctx, player);
        }
    }

    fn try_record(&mut self, ctx: &SearchContext) {
        if let Some(floor) = ctx.settings.min_salary {
            if self.salary < floor {
                return;
            }
        }
        if self.matchup_counts.len() < ctx.rules.min_matchups {
            return;
        }
        for (matchup, &min) in &ctx.settings.matchup_min {
            if self.matchup_counts.get(matchup).copied().unwrap_or(0) < min {
                return;
            }
        }
        for (g, (need, _)) in ctx.settings.at_least.iter().enumerate() {
            if self.at_least_counts[g] < *need {
                return;
            }
        }
        if let Some(ceiling) = ctx.ceiling {
            if self.score > ceiling + 1e-9 {
                return;
            }
        }
        for (cut_idx, _) in ctx.cuts.iter().enumerate() {
            if self.cut_overlap[cut_idx] > ctx.allowed_overlap {
                return;
            }
        }

        let beat = match &self.best {
            Some((best_score, _)) => self.score > *best_score,
            None => true,
        };
        if beat {
            // `chosen` holds locked players first, then open slots in order.
            let locked = ctx.settings.locks.len();
            self.best = Some((self.score, self.chosen[locked..].to_vec()));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
