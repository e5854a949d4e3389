// Result file writers: lineup table, player exposure, user equity, and the
// late-swap upload rewrite. Output files are always written, even when the
// run degraded somewhere upstream.

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

use crate::catalog::Catalog;
use crate::data::contest::Tournament;
use crate::data::live::{format_cell, LiveContestFile};
use crate::rules::RosterRules;
use crate::sim::tournament::{EntryResult, ScoredEntry};
use crate::swap::PlannedEntry;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to create {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV write error in {path}: {source}")]
    Csv { path: String, source: csv::Error },
}

fn csv_writer(path: &Path) -> Result<csv::Writer<std::fs::File>, OutputError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| OutputError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
    }
    let file = std::fs::File::create(path).map_err(|e| OutputError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(csv::Writer::from_writer(file))
}

fn pct(count: u64, iterations: usize) -> f64 {
    if iterations == 0 {
        return 0.0;
    }
    count as f64 / iterations as f64 * 100.0
}

// ---------------------------------------------------------------------------
// Lineup file
// ---------------------------------------------------------------------------

/// One row per unique lineup: player cells, aggregates, and simulation
/// statistics.
pub fn write_lineups(
    path: &Path,
    catalog: &Catalog,
    rules: &RosterRules,
    entries: &[ScoredEntry],
    results: &[EntryResult],
    tournament: &Tournament,
    iterations: usize,
) -> Result<(), OutputError> {
    let mut w = csv_writer(path)?;
    let wrap = |e: csv::Error| OutputError::Csv {
        path: path.display().to_string(),
        source: e,
    };

    let mut header: Vec<String> = rules
        .slots
        .iter()
        .map(|s| s.display_str().to_string())
        .collect();
    header.extend(
        [
            "Salary",
            "Fpts Proj",
            "Field Fpts Proj",
            "Ceiling",
            "Stack1",
            "Stack2",
            "Win%",
            "Top%",
            "Cash%",
            "Own Product",
            "Own Sum",
            "ROI%",
            "Avg Return",
            "Dupes",
            "Type",
            "User",
            "Lineup Index",
            "Entry ID",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    w.write_record(&header).map_err(wrap)?;

    for (index, (entry, result)) in entries.iter().zip(results).enumerate() {
        let lineup = &entry.lineup;
        let (stack1, stack2) = lineup.stack_descriptors(catalog);
        let roi_pct = if tournament.entry_fee > 0.0 && iterations > 0 {
            result.roi / (tournament.entry_fee * iterations as f64) * 100.0
        } else {
            0.0
        };
        let avg_return = if iterations > 0 {
            result.roi / iterations as f64 + tournament.entry_fee
        } else {
            0.0
        };

        let mut record: Vec<String> = lineup
            .slots
            .iter()
            .map(|&id| {
                catalog
                    .by_id(id)
                    .map(|p| p.cell())
                    .unwrap_or_default()
            })
            .collect();
        record.push(lineup.salary.to_string());
        record.push(format!("{:.2}", lineup.projection));
        record.push(format!("{:.2}", lineup.field_projection));
        record.push(format!("{:.2}", lineup.ceiling));
        record.push(stack1);
        record.push(stack2);
        record.push(format!("{:.2}", pct(result.wins, iterations)));
        record.push(format!("{:.2}", pct(result.top_k, iterations)));
        record.push(format!("{:.2}", pct(result.cashes, iterations)));
        record.push(format!("{:.3e}", lineup.ownership_product(catalog)));
        record.push(format!("{:.2}", lineup.ownership_sum(catalog)));
        record.push(format!("{:.2}", roi_pct));
        record.push(format!("{:.2}", avg_return));
        record.push(entry.dupes.to_string());
        record.push(lineup.kind.display_str().to_string());
        record.push(entry.user.clone());
        record.push(index.to_string());
        record.push(entry.entry_id.clone());
        w.write_record(&record).map_err(wrap)?;
    }

    w.flush().map_err(|e| OutputError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

// ---------------------------------------------------------------------------
// Player exposure file
// ---------------------------------------------------------------------------

/// Per-player exposure across the simulated field: how often the player won
/// or hit the elite threshold, and the field ownership realized by the
/// generator versus the projected ownership.
pub fn write_exposure(
    path: &Path,
    catalog: &Catalog,
    entries: &[ScoredEntry],
    results: &[EntryResult],
    tournament: &Tournament,
    iterations: usize,
) -> Result<(), OutputError> {
    let mut w = csv_writer(path)?;
    let wrap = |e: csv::Error| OutputError::Csv {
        path: path.display().to_string(),
        source: e,
    };

    w.write_record([
        "Player",
        "Position",
        "Team",
        "Win%",
        "Top%",
        "Sim Own%",
        "Proj Own%",
        "Avg Return",
    ])
    .map_err(wrap)?;

    let total_copies: usize = entries.iter().map(|e| e.dupes).sum();

    #[derive(Default)]
    struct Agg {
        wins: u64,
        top_k: u64,
        copies: usize,
        roi: f64,
        lineups: usize,
    }
    let mut aggs: HashMap<usize, Agg> = HashMap::new();
    for (entry, result) in entries.iter().zip(results) {
        for &id in &entry.lineup.slots {
            let agg = aggs.entry(id).or_default();
            agg.wins += result.wins;
            agg.top_k += result.top_k;
            agg.copies += entry.dupes;
            agg.roi += result.roi;
            agg.lineups += 1;
        }
    }

    let mut ids: Vec<usize> = aggs.keys().copied().collect();
    ids.sort_unstable();
    for id in ids {
        let Some(p) = catalog.by_id(id) else { continue };
        let agg = &aggs[&id];
        let sim_own = if total_copies > 0 {
            agg.copies as f64 / total_copies as f64 * 100.0
        } else {
            0.0
        };
        let avg_return = if agg.lineups > 0 && iterations > 0 {
            agg.roi / (agg.lineups as f64 * iterations as f64) + tournament.entry_fee
        } else {
            0.0
        };
        let record: Vec<String> = vec![
            p.name.clone(),
            p.slot_key(),
            p.team.clone(),
            format!("{:.2}", pct(agg.wins, iterations)),
            format!("{:.2}", pct(agg.top_k, iterations)),
            format!("{:.2}", sim_own),
            format!("{:.2}", p.ownership),
            format!("{:.2}", avg_return),
        ];
        w.write_record(&record).map_err(wrap)?;
    }

    w.flush().map_err(|e| OutputError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

// ---------------------------------------------------------------------------
// User equity file (swap mode)
// ---------------------------------------------------------------------------

/// Aggregate ROI, wins, top-k, and cashes across each user's entries.
pub fn write_user_equity(
    path: &Path,
    entries: &[ScoredEntry],
    results: &[EntryResult],
) -> Result<(), OutputError> {
    let mut w = csv_writer(path)?;
    let wrap = |e: csv::Error| OutputError::Csv {
        path: path.display().to_string(),
        source: e,
    };

    w.write_record(["User", "Entries", "ROI", "Wins", "Top", "Cashes"])
        .map_err(wrap)?;

    #[derive(Default)]
    struct Agg {
        entries: usize,
        roi: f64,
        wins: u64,
        top_k: u64,
        cashes: u64,
    }
    let mut by_user: HashMap<&str, Agg> = HashMap::new();
    for (entry, result) in entries.iter().zip(results) {
        // Generated field lineups carry no user handle.
        if entry.user.is_empty() {
            continue;
        }
        let agg = by_user.entry(entry.user.as_str()).or_default();
        agg.entries += entry.dupes;
        agg.roi += result.roi * entry.dupes as f64;
        agg.wins += result.wins;
        agg.top_k += result.top_k;
        agg.cashes += result.cashes;
    }

    let mut users: Vec<&str> = by_user.keys().copied().collect();
    users.sort_unstable();
    for user in users {
        let agg = &by_user[user];
        let record: Vec<String> = vec![
            user.to_string(),
            agg.entries.to_string(),
            format!("{:.2}", agg.roi),
            agg.wins.to_string(),
            agg.top_k.to_string(),
            agg.cashes.to_string(),
        ];
        w.write_record(&record).map_err(wrap)?;
    }

    w.flush().map_err(|e| OutputError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

// ---------------------------------------------------------------------------
// Late-swap upload file
// ---------------------------------------------------------------------------

/// Rewrite the original live-contest rows with planned fills. Roster cells
/// take the planned assignment; every other column passes through untouched.
/// Rows that were skipped by the planner are emitted unchanged.
pub fn write_upload(
    path: &Path,
    catalog: &Catalog,
    file: &LiveContestFile,
    planned: &[PlannedEntry],
) -> Result<(), OutputError> {
    let mut w = csv_writer(path)?;
    let wrap = |e: csv::Error| OutputError::Csv {
        path: path.display().to_string(),
        source: e,
    };

    w.write_record(&file.headers).map_err(wrap)?;

    let by_row: HashMap<usize, &PlannedEntry> =
        planned.iter().map(|p| (p.row_index, p)).collect();

    for (row_index, row) in file.rows.iter().enumerate() {
        let mut record = row.record.clone();
        if let Some(planned) = by_row.get(&row_index) {
            for (slot_idx, &col) in file.slot_columns.iter().enumerate() {
                if let Some(Some(id)) = planned.entry.slots.get(slot_idx) {
                    if let Some(p) = catalog.by_id(*id) {
                        record[col] = format_cell(&p.name, p.site_id.as_deref());
                    }
                }
            }
        }
        w.write_record(&record).map_err(wrap)?;
    }

    w.flush().map_err(|e| OutputError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
