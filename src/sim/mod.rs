// Simulation coordinator.
//
// All mutation (slate load, Bayesian update, swap planning) happens here on
// a single thread; the three embarrassingly-parallel phases (field
// generation, per-matchup sampling, scoring chunks) consume the catalog
// read-only and join in deterministic order.

pub mod bayes;
pub mod correlation;
pub mod sampler;
pub mod tournament;

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;
use tracing::info;

use crate::catalog::PlayerId;
use crate::config::Config;
use crate::data::{self, contest::Tournament, live};
use crate::field::{FieldGenerator, FieldSettings};
use crate::lineup::{Lineup, LineupKind};
use crate::optimizer::{Optimizer, OptimizerSettings};
use crate::output;
use crate::rules::RosterRules;
use crate::swap::{SwapPlanner, SwapSettings};
use self::tournament::{EntryResult, ScoredEntry};

/// Derive a per-task RNG seed from the master seed via splitmix64, so
/// parallel tasks get independent, reproducible streams.
pub fn split_seed(master: u64, index: u64) -> u64 {
    let mut z = master.wrapping_add(index.wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

// ---------------------------------------------------------------------------
// Errors and reporting
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Slate(#[from] data::SlateError),

    #[error(transparent)]
    Stream(#[from] data::projections::ProjectionError),

    #[error(transparent)]
    LiveContest(#[from] live::LiveContestError),

    #[error(transparent)]
    Output(#[from] crate::output::OutputError),

    #[error("no feasible lineup exists for the optimal-score anchor")]
    NoOptimal,
}

/// Counters surfaced in the end-of-run summary line.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunSummary {
    pub skipped_entries: usize,
    pub infeasible_solves: usize,
    pub degenerate_matchups: usize,
    pub flagged_entries: usize,
}

/// Everything the output writers need, returned to the caller for
/// inspection and tests.
pub struct SimulationReport {
    pub entries: Vec<ScoredEntry>,
    pub results: Vec<EntryResult>,
    pub tournament: Tournament,
    pub iterations: usize,
    pub summary: RunSummary,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Run the full contest pipeline: load the slate, update projections from
/// live scores, build user lineups (path A) and the synthetic field (path
/// B), plan swaps for live entries, sample, score, and write the output
/// files.
pub fn run(config: &Config) -> Result<SimulationReport, EngineError> {
    let mut summary = RunSummary::default();

    // Structural rules, with the config floor taking precedence.
    let mut rules = RosterRules::for_contest(config.site, config.style);
    rules.salary_floor = Some(config.engine.min_lineup_salary);

    let mut catalog = data::load_slate(config, &rules)?;
    info!("catalog loaded: {} entries", catalog.len());

    let tournament = data::contest::load_contest(Path::new(&config.paths.contest_structure))?;
    info!(
        "contest: {} paid places, ${} entry, field {}",
        tournament.cash_line(),
        tournament.entry_fee,
        tournament.field_size
    );

    // Bayesian update runs before any parallel phase.
    if let Some(path) = &config.paths.live_scores {
        let scores = live::load_live_scores(Path::new(path))?;
        bayes::apply_live_scores(&mut catalog, &scores);
    }
    let catalog = catalog; // read-only from here on

    // Path A: user lineups from the optimizer.
    let opt_settings = OptimizerSettings::from_config(config, &catalog);
    let optimizer = Optimizer::new(&catalog, &rules, opt_settings);
    let user_lineups = optimizer.run();
    summary.infeasible_solves = config.engine.num_lineups.saturating_sub(user_lineups.len());
    info!("optimizer emitted {} lineups", user_lineups.len());

    let optimal = optimizer.optimal_field_score().ok_or(EngineError::NoOptimal)?;

    // Path B: the synthetic opponent field.
    let field_gen = FieldGenerator::new(&catalog, &rules, FieldSettings::from_config(config), optimal);
    let field = field_gen.generate();
    info!("field generator produced {} lineups", field.len());

    // Swap planning for live contest entries.
    let mut input_lineups: Vec<(Lineup, String, String)> = Vec::new();
    let mut live_file = None;
    let mut planned = Vec::new();
    if let Some(path) = &config.paths.live_contest {
        let file = live::load_live_contest(Path::new(path), &rules)?;
        let planner = SwapPlanner::new(
            &catalog,
            &rules,
            &field_gen,
            SwapSettings {
                seed: config.engine.seed,
                user_optimized: config.engine.swap_optimize,
            },
        );
        let outcome = planner.plan(&file);
        summary.skipped_entries = outcome.skipped;
        summary.flagged_entries = outcome.flagged;
        input_lineups = planner.lineups(&outcome);
        planned = outcome.planned;
        live_file = Some(file);
    }

    // Collapse identical lineups so each is scored once and payouts split
    // across its duplicate count. User and live entries keep attribution;
    // field duplicates fold into whichever entry came first.
    let entries = collapse(user_lineups, input_lineups, field);
    info!("scoring {} unique lineups", entries.len());

    let sample_outcome = sampler::draw_scores(&catalog, config.engine.iterations, config.engine.seed);
    summary.degenerate_matchups = sample_outcome.degenerate_matchups;

    let chunk = (config.engine.iterations / (rayon::current_num_threads() * 4)).max(64);
    let results = tournament::simulate(
        &entries,
        &sample_outcome.scores,
        &tournament,
        config.engine.top_pct,
        chunk,
    );

    // Output files are always written.
    let out_dir = Path::new(&config.paths.output_dir);
    output::write_lineups(
        &out_dir.join("lineups.csv"),
        &catalog,
        &rules,
        &entries,
        &results,
        &tournament,
        config.engine.iterations,
    )?;
    output::write_exposure(
        &out_dir.join("exposure.csv"),
        &catalog,
        &entries,
        &results,
        &tournament,
        config.engine.iterations,
    )?;
    if let Some(file) = &live_file {
        output::write_user_equity(&out_dir.join("user_equity.csv"), &entries, &results)?;
        output::write_upload(&out_dir.join("upload.csv"), &catalog, file, &planned)?;
    }

    info!(
        "run complete: {} skipped entries, {} infeasible solves, {} degenerate matchups, {} flagged entries",
        summary.skipped_entries,
        summary.infeasible_solves,
        summary.degenerate_matchups,
        summary.flagged_entries
    );

    Ok(SimulationReport {
        entries,
        results,
        tournament,
        iterations: config.engine.iterations,
        summary,
    })
}

/// Merge user, live-input, and generated lineups into unique scored entries.
/// Attribution prefers non-generated entries; duplicate counts accumulate
/// across all sources.
fn collapse(
    user: Vec<Lineup>,
    input: Vec<(Lineup, String, String)>,
    field: Vec<Lineup>,
) -> Vec<ScoredEntry> {
    let mut order: Vec<Vec<PlayerId>> = Vec::new();
    let mut by_key: HashMap<Vec<PlayerId>, ScoredEntry> = HashMap::new();

    let mut push = |lineup: Lineup, user: String, entry_id: String| {
        let key = lineup.key();
        match by_key.get_mut(&key) {
            Some(existing) => {
                existing.dupes += 1;
                // Non-generated identity wins over a field placeholder.
                if existing.lineup.kind == LineupKind::Generated
                    && lineup.kind != LineupKind::Generated
                {
                    existing.lineup = lineup;
                    existing.user = user;
                    existing.entry_id = entry_id;
                }
            }
            None => {
                order.push(key.clone());
                by_key.insert(
                    key,
                    ScoredEntry {
                        lineup,
                        dupes: 1,
                        user,
                        entry_id,
                    },
                );
            }
        }
    };

    for lineup in user {
        push(lineup, String::new(), String::new());
    }
    for (lineup, user, entry_id) in input {
        push(lineup, user, entry_id);
    }
    for lineup in field {
        push(lineup, String::new(), String::new());
    }

    order
        .into_iter()
        .filter_map(|key| by_key.remove(&key))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
