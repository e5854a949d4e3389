// End-to-end scenarios for the tournament simulation engine.
//
// These tests exercise the library crate's public API: catalog assembly,
// the lineup optimizer's diversity cuts, field-generation realism, payout
// conservation in the scorer, the bayesian updater, and late-swap planning.

use std::collections::{HashMap, HashSet};

use slatesim::catalog::{basic_player, Catalog, PlayerId};
use slatesim::data::contest::Tournament;
use slatesim::data::live::{format_cell, load_live_contest, parse_cell, CellContent};
use slatesim::field::{FieldGenerator, FieldSettings};
use slatesim::lineup::{dedupe_lineups, Lineup, LineupKind};
use slatesim::optimizer::{Optimizer, OptimizerSettings, DIVERSITY_EPSILON};
use slatesim::rules::{ContestStyle, Position as P, RosterRules, Site};
use slatesim::sim::bayes;
use slatesim::sim::correlation::CorrelationTable;
use slatesim::sim::sampler::ScoreMatrix;
use slatesim::sim::tournament::{simulate, ScoredEntry};
use slatesim::swap::{SwapPlanner, SwapSettings};

// ===========================================================================
// Fixtures
// ===========================================================================

/// Twenty-player classic SiteA slate. The projection-optimal legal roster is
/// the eight "S" players, totaling exactly 294.7 points at salary 49,800.
fn slate() -> (Catalog, RosterRules) {
    let table = CorrelationTable::builtin();
    let mut catalog = Catalog::new(0.0, 0.25);
    let specs: [(&str, &str, &str, Vec<P>, u32, f64, f64); 20] = [
        // The intended optimum.
        ("S1", "AAA", "BBB", vec![P::PointGuard], 6500, 42.0, 35.0),
        ("S2", "AAA", "BBB", vec![P::ShootingGuard], 6400, 40.2, 30.0),
        ("S3", "BBB", "AAA", vec![P::SmallForward], 6300, 38.5, 28.0),
        ("S4", "BBB", "AAA", vec![P::PowerForward], 6200, 37.0, 25.0),
        ("S5", "CCC", "DDD", vec![P::Center], 6100, 36.0, 22.0),
        ("S6", "CCC", "DDD", vec![P::ShootingGuard], 6000, 35.0, 20.0),
        ("S7", "DDD", "CCC", vec![P::PowerForward], 6200, 34.0, 18.0),
        ("S8", "DDD", "CCC", vec![P::Center], 6100, 32.0, 15.0),
        // Strictly worse alternatives at every slot.
        ("F1", "BBB", "AAA", vec![P::PointGuard], 6100, 31.5, 8.0),
        ("F2", "CCC", "DDD", vec![P::PointGuard], 5900, 30.0, 8.0),
        ("F3", "DDD", "CCC", vec![P::ShootingGuard], 6000, 31.0, 9.0),
        ("F4", "BBB", "AAA", vec![P::ShootingGuard], 5950, 29.5, 7.0),
        ("F5", "AAA", "BBB", vec![P::SmallForward], 6050, 30.5, 10.0),
        ("F6", "DDD", "CCC", vec![P::SmallForward], 5900, 28.5, 6.0),
        ("F7", "CCC", "DDD", vec![P::PowerForward], 6000, 29.0, 8.0),
        ("F8", "AAA", "BBB", vec![P::PowerForward], 5950, 28.0, 6.0),
        ("F9", "BBB", "AAA", vec![P::Center], 6050, 30.8, 12.0),
        ("F10", "AAA", "BBB", vec![P::Center], 5900, 27.5, 5.0),
        ("F11", "DDD", "CCC", vec![P::PointGuard], 5950, 29.8, 7.0),
        ("F12", "CCC", "DDD", vec![P::SmallForward], 6000, 28.8, 6.0),
    ];
    for (i, (name, team, opp, pos, sal, proj, own)) in specs.into_iter().enumerate() {
        let mut p = basic_player(name, team, opp, pos, sal, proj);
        p.ownership = own;
        p.site_id = Some(format!("{}", 900 + i));
        catalog.insert(p, &table).unwrap();
    }
    let rules = RosterRules::for_contest(Site::SiteA, ContestStyle::Classic);
    (catalog, rules)
}

fn opt_settings(num_lineups: usize, deterministic: bool) -> OptimizerSettings {
    OptimizerSettings {
        num_lineups,
        num_uniques: 1,
        randomness: 100.0,
        deterministic,
        seed: 42,
        min_salary: None,
        team_limit: 4,
        matchup_max: HashMap::new(),
        matchup_min: HashMap::new(),
        at_least: Vec::new(),
        at_most: Vec::new(),
        locks: Vec::new(),
    }
}

const OPTIMUM: f64 = 294.7;

// ===========================================================================
// Scenario 1: deterministic optimal, classic SiteA
// ===========================================================================

#[test]
fn deterministic_optimal_enumeration() {
    let (catalog, rules) = slate();
    let optimizer = Optimizer::new(&catalog, &rules, opt_settings(3, true));
    let lineups = optimizer.run();

    assert_eq!(lineups.len(), 3);
    // The first lineup is the closed-form optimum.
    assert!((lineups[0].projection - OPTIMUM).abs() < 1e-9);
    assert_eq!(lineups[0].salary, 49_800);

    // Strictly decreasing projections, separated by at least epsilon.
    for pair in lineups.windows(2) {
        assert!(pair[0].projection - pair[1].projection >= DIVERSITY_EPSILON - 1e-12);
    }

    // Every lineup respects slot and team caps (revalidation must succeed).
    for lineup in &lineups {
        Lineup::build(&lineup.slots, &catalog, &rules, LineupKind::User).unwrap();
    }
}

// ===========================================================================
// Scenario 2: stochastic diversity
// ===========================================================================

#[test]
fn stochastic_diversity_with_fixed_seed() {
    let (catalog, rules) = slate();
    let optimizer = Optimizer::new(&catalog, &rules, opt_settings(50, false));
    let lineups = optimizer.run();

    assert_eq!(lineups.len(), 50);

    let distinct: HashSet<Vec<PlayerId>> = lineups.iter().map(|l| l.key()).collect();
    assert!(distinct.len() >= 30, "only {} distinct lineups", distinct.len());

    for lineup in &lineups {
        Lineup::build(&lineup.slots, &catalog, &rules, LineupKind::User).unwrap();
    }

    let mean: f64 = lineups.iter().map(|l| l.projection).sum::<f64>() / lineups.len() as f64;
    assert!(
        (mean - OPTIMUM).abs() / OPTIMUM <= 0.10,
        "mean projection {mean} strays more than 10% from the optimum"
    );
}

// ===========================================================================
// Scenario 3: field realism
// ===========================================================================

#[test]
fn field_realism_at_scale() {
    let (catalog, rules) = slate();
    let optimizer = Optimizer::new(&catalog, &rules, opt_settings(1, true));
    let optimal = optimizer.optimal_field_score().unwrap();

    let settings = FieldSettings {
        field_size: 10_000,
        seed: 42,
        max_pct_off_optimal: 0.15,
        team_limit: 4,
        overlap_limit: 4,
        max_attempts: 1000,
    };
    let field = FieldGenerator::new(&catalog, &rules, settings, optimal).generate();

    assert!(field.len() >= 9_500, "only {} of 10000 generated", field.len());

    let mut multi_matchup = 0usize;
    for lineup in &field {
        // Salary band.
        assert!(lineup.salary >= rules.salary_cap - 1000 && lineup.salary <= rules.salary_cap);
        // Projection band.
        assert!(lineup.field_projection >= 0.85 * optimal - 1e-9);
        // Team exposure cap.
        let mut teams: HashMap<&str, usize> = HashMap::new();
        let mut matchups: HashSet<&str> = HashSet::new();
        for &id in &lineup.slots {
            let p = &catalog.players()[id];
            *teams.entry(p.team.as_str()).or_insert(0) += 1;
            matchups.insert(p.matchup.as_str());
        }
        assert!(teams.values().all(|&c| c <= 4));
        if matchups.len() >= 2 {
            multi_matchup += 1;
        }
    }
    assert!(multi_matchup as f64 >= 0.99 * field.len() as f64);
}

// ===========================================================================
// Scenario 4: tournament payout totals
// ===========================================================================

#[test]
fn tournament_payout_conservation() {
    // 100 entries with fixed, distinct scores; $100/$50/$25 schedule.
    let entries: Vec<ScoredEntry> = (0..100)
        .map(|i| ScoredEntry {
            lineup: Lineup {
                slots: vec![i],
                salary: 50_000,
                projection: 0.0,
                field_projection: 0.0,
                ceiling: 0.0,
                kind: LineupKind::Generated,
            },
            dupes: 1,
            user: String::new(),
            entry_id: String::new(),
        })
        .collect();

    let rows: Vec<Vec<f64>> = (0..100)
        .map(|i| vec![300.0 - i as f64; 1000])
        .collect();
    let scores = ScoreMatrix::from_rows(rows, 1000);

    let entry_fee = 2.0;
    let tournament = Tournament {
        payouts: vec![100.0, 50.0, 25.0],
        entry_fee,
        field_size: 100,
    };

    let results = simulate(&entries, &scores, &tournament, 0.03, 128);

    let total_roi: f64 = results.iter().map(|r| r.roi).sum();
    let expected = 1000.0 * (175.0 - 100.0 * entry_fee);
    assert!((total_roi - expected).abs() < 1e-6);

    // Per-entry prize bound: total prize cannot exceed what its finish
    // counts could have earned.
    for r in &results {
        let prize = r.roi + 1000.0 * entry_fee;
        let bound = r.wins as f64 * 100.0 + r.cashes as f64 * 75.0;
        assert!(prize <= bound + 1e-9);
    }
}

// ===========================================================================
// Scenario 5: bayesian partial game
// ===========================================================================

#[test]
fn bayesian_partial_game_pins_formula() {
    // Projection 30, stddev 6, halftime (R = 24), 18 actual points:
    // weighted ppm 0.6875, remaining 16.5, posterior 34.5.
    let (mean, variance) = bayes::posterior(30.0, 6.0, 18.0, 24.0);
    assert!((mean - 34.5).abs() < 1e-12);
    assert!(variance > 0.0 && variance <= 36.0);

    // Finished game collapses exactly to the actual.
    let (mean, variance) = bayes::posterior(30.0, 6.0, 18.0, 0.0);
    assert!((mean - 18.0).abs() < 1e-12);
    assert_eq!(variance, 0.0);
}

// ===========================================================================
// Scenario 6: late-swap locks
// ===========================================================================

#[test]
fn late_swap_preserves_locks_and_caps() {
    let (catalog, rules) = slate();
    let optimizer = Optimizer::new(&catalog, &rules, opt_settings(1, true));
    let optimal = optimizer.optimal_field_score().unwrap();
    let field_settings = FieldSettings {
        field_size: 0,
        seed: 42,
        max_pct_off_optimal: 0.25,
        team_limit: 4,
        overlap_limit: 4,
        max_attempts: 1000,
    };
    let field_gen = FieldGenerator::new(&catalog, &rules, field_settings, optimal);
    let planner = SwapPlanner::new(
        &catalog,
        &rules,
        &field_gen,
        SwapSettings {
            seed: 7,
            user_optimized: false,
        },
    );

    // Five entries share six pinned players; PG and UTIL are open.
    let locked_cells = "S2 (901),S3 (902),S4 (903),S5 (904),S6 (905),S7 (906)";
    let mut csv = String::from("Entry ID,Entry Name,PG,SG,SF,PF,C,G,F,UTIL\n");
    for e in 0..5 {
        csv.push_str(&format!("{e},user{e},LOCKED,{locked_cells},LOCKED\n"));
    }
    let tmp = std::env::temp_dir().join("slatesim_swap_scenario");
    let _ = std::fs::remove_dir_all(&tmp);
    std::fs::create_dir_all(&tmp).unwrap();
    let path = tmp.join("live.csv");
    std::fs::write(&path, &csv).unwrap();
    let file = load_live_contest(&path, &rules).unwrap();

    let outcome = planner.plan(&file);
    assert_eq!(outcome.planned.len(), 5);
    assert_eq!(outcome.skipped, 0);
    assert_eq!(outcome.flagged, 0);

    let locked_salary = 6400 + 6300 + 6200 + 6100 + 6000 + 6200;
    let locked_ids: Vec<PlayerId> = (901..=906)
        .map(|id| catalog.by_site_id(&id.to_string()).unwrap())
        .collect();

    for planned in &outcome.planned {
        let entry = &planned.entry;
        let lineup = entry
            .lineup(&catalog, &rules, LineupKind::Input)
            .expect("planned entry must validate");

        // Locked players preserved in their slots.
        for (k, &id) in locked_ids.iter().enumerate() {
            assert_eq!(entry.slots[k + 1], Some(id));
        }
        assert_eq!(entry.locked_salary, locked_salary);

        // The two fills are distinct new players covering PG and UTIL.
        let pg = entry.slots[0].unwrap();
        let util = entry.slots[7].unwrap();
        assert_ne!(pg, util);
        assert!(!locked_ids.contains(&pg));
        assert!(!locked_ids.contains(&util));
        assert!(catalog.players()[pg].eligible(rules.slots[0]));
        assert!(catalog.players()[util].eligible(rules.slots[7]));

        // Budget: fills fit within cap minus locked salary; team caps hold
        // including locked players (revalidated by Lineup::build above).
        let fill_salary = catalog.players()[pg].salary + catalog.players()[util].salary;
        assert!(fill_salary <= rules.salary_cap - locked_salary);
        assert!(lineup.salary <= rules.salary_cap);
    }

    let _ = std::fs::remove_dir_all(&tmp);
}

// ===========================================================================
// Round-trip and dedup laws
// ===========================================================================

#[test]
fn lineup_cell_serialization_round_trips() {
    let (catalog, rules) = slate();
    let optimizer = Optimizer::new(&catalog, &rules, opt_settings(1, true));
    let lineup = optimizer.run().into_iter().next().unwrap();

    // Serialize each slot to "Name (id)" and parse back through the site id.
    let reparsed: Vec<PlayerId> = lineup
        .slots
        .iter()
        .map(|&id| {
            let p = &catalog.players()[id];
            let cell = format_cell(&p.name, p.site_id.as_deref());
            match parse_cell(&cell) {
                CellContent::Named {
                    site_id: Some(sid), ..
                } => catalog.by_site_id(&sid).unwrap(),
                other => panic!("unexpected cell {other:?}"),
            }
        })
        .collect();
    assert_eq!(reparsed, lineup.slots);
}

#[test]
fn dedup_commutes_with_order() {
    let (catalog, rules) = slate();
    let optimizer = Optimizer::new(&catalog, &rules, opt_settings(5, false));
    let lineups = optimizer.run();

    let forward = dedupe_lineups(lineups.clone());
    let mut reversed_input = lineups;
    reversed_input.reverse();
    let reversed = dedupe_lineups(reversed_input);

    let fwd_keys: Vec<_> = forward.iter().map(|(l, n)| (l.key(), *n)).collect();
    let rev_keys: Vec<_> = reversed.iter().map(|(l, n)| (l.key(), *n)).collect();
    assert_eq!(fwd_keys, rev_keys);
}
