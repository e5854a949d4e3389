// Tournament scoring: rank every lineup per iteration, allocate payouts,
// and accumulate win / top-k / cash / ROI statistics.
//
// Identical lineups are collapsed before scoring; a duplicate group occupies
// a contiguous slice of finishing ranks and divides that slice's payout
// evenly across its copies. Iterations are scored in parallel chunks whose
// partial accumulators add up to the same totals regardless of chunking.

use rayon::prelude::*;

use crate::data::contest::Tournament;
use crate::lineup::Lineup;
use crate::sim::sampler::ScoreMatrix;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One unique lineup entering the simulation, with its duplicate count and
/// provenance.
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub lineup: Lineup,
    pub dupes: usize,
    pub user: String,
    pub entry_id: String,
}

/// Accumulated per-lineup statistics across all iterations. ROI is the sum
/// of per-iteration (payout share - entry fee) for one copy of the lineup.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EntryResult {
    pub wins: u64,
    pub top_k: u64,
    pub cashes: u64,
    pub roi: f64,
}

impl EntryResult {
    fn add(&mut self, other: &EntryResult) {
        self.wins += other.wins;
        self.top_k += other.top_k;
        self.cashes += other.cashes;
        self.roi += other.roi;
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// Score `iterations` columns of the sample matrix. `top_pct` sets the
/// elite-rank threshold as a fraction of the configured field size.
pub fn simulate(
    entries: &[ScoredEntry],
    scores: &ScoreMatrix,
    tournament: &Tournament,
    top_pct: f64,
    chunk_size: usize,
) -> Vec<EntryResult> {
    if entries.is_empty() {
        return Vec::new();
    }
    let iterations = scores.iterations;
    let chunk_size = chunk_size.max(1);
    let starts: Vec<usize> = (0..iterations).step_by(chunk_size).collect();

    let partials: Vec<Vec<EntryResult>> = starts
        .par_iter()
        .map(|&start| {
            let end = (start + chunk_size).min(iterations);
            score_chunk(entries, scores, tournament, top_pct, start, end)
        })
        .collect();

    // Deterministic join: partial accumulators add in chunk order.
    let mut totals = vec![EntryResult::default(); entries.len()];
    for partial in partials {
        for (total, p) in totals.iter_mut().zip(&partial) {
            total.add(p);
        }
    }
    totals
}

/// Accumulate one contiguous block of iterations.
fn score_chunk(
    entries: &[ScoredEntry],
    scores: &ScoreMatrix,
    tournament: &Tournament,
    top_pct: f64,
    start: usize,
    end: usize,
) -> Vec<EntryResult> {
    let top_threshold = ((top_pct * tournament.field_size as f64).ceil() as usize).max(1);
    let cash_line = tournament.cash_line();
    let mut results = vec![EntryResult::default(); entries.len()];
    let mut order: Vec<usize> = (0..entries.len()).collect();
    let mut totals = vec![0.0f64; entries.len()];

    for m in start..end {
        for (i, entry) in entries.iter().enumerate() {
            totals[i] = entry
                .lineup
                .slots
                .iter()
                .map(|&id| scores.row(id)[m])
                .sum();
        }

        // Descending by score, ties broken by entry index for determinism.
        order.sort_by(|&a, &b| {
            totals[b]
                .partial_cmp(&totals[a])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });

        let mut rank = 0usize;
        for &i in &order {
            let entry = &entries[i];
            let group = entry.dupes.max(1);

            // The duplicate group occupies ranks [rank, rank + group) and
            // splits that slice's payout evenly.
            let slice_end = (rank + group).min(cash_line);
            let collective: f64 = if rank < cash_line {
                tournament.payouts[rank..slice_end].iter().sum()
            } else {
                0.0
            };
            let share = collective / group as f64;
            results[i].roi += share - tournament.entry_fee;

            if rank == 0 {
                results[i].wins += 1;
            }
            if rank < top_threshold {
                results[i].top_k += 1;
            }
            if rank < cash_line {
                results[i].cashes += 1;
            }

            rank += group;
        }
    }

    results
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
