// Joint score sampling: M correlated draws per matchup.
//
// Each matchup is an independent task producing an N x M sample block from
// MultivariateNormal(bayesian projections, projected covariance). Showdown
// multiplier rows are scalar multiples of their UTIL twin's row, which
// preserves correlations exactly. Matchups whose covariance cannot be
// repaired fall back to degenerate samples at the mean.

use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;
use tracing::warn;

use crate::catalog::{Catalog, PlayerId};
use crate::sim::correlation::{build_covariance, matchup_util_players, psd_factor};
use crate::sim::split_seed;

// ---------------------------------------------------------------------------
// Score matrix
// ---------------------------------------------------------------------------

/// Per-player sampled score vectors, all of length `iterations`.
#[derive(Debug, Clone)]
pub struct ScoreMatrix {
    rows: Vec<Vec<f64>>,
    pub iterations: usize,
}

impl ScoreMatrix {
    pub fn from_rows(rows: Vec<Vec<f64>>, iterations: usize) -> Self {
        ScoreMatrix { rows, iterations }
    }

    pub fn row(&self, id: PlayerId) -> &[f64] {
        &self.rows[id]
    }
}

/// Outcome of the sampling phase, including how many matchups degraded to
/// degenerate (mean-only) samples.
#[derive(Debug)]
pub struct SampleOutcome {
    pub scores: ScoreMatrix,
    pub degenerate_matchups: usize,
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

/// Draw `iterations` joint samples for every catalog player. One task per
/// matchup; per-task RNGs derive from the master seed, and blocks join in
/// matchup order, so the result is reproducible for a fixed seed.
pub fn draw_scores(catalog: &Catalog, iterations: usize, seed: u64) -> SampleOutcome {
    let matchups = catalog.matchups();

    let blocks: Vec<(Vec<PlayerId>, Vec<Vec<f64>>, bool)> = matchups
        .par_iter()
        .enumerate()
        .map(|(index, matchup)| {
            let ids = matchup_util_players(catalog, matchup);
            if ids.is_empty() {
                return (ids, Vec::new(), false);
            }
            let cov = build_covariance(catalog, &ids);
            let mu: Vec<f64> = ids
                .iter()
                .map(|&id| catalog.players()[id].bayes_projection)
                .collect();

            match psd_factor(cov, matchup) {
                Ok(factor) => {
                    let mut rng = StdRng::seed_from_u64(split_seed(seed, index as u64));
                    let n = ids.len();
                    let mut rows = vec![Vec::with_capacity(iterations); n];
                    for _ in 0..iterations {
                        let z = DVector::from_iterator(
                            n,
                            (0..n).map(|_| StandardNormal.sample(&mut rng)),
                        );
                        let draw = &factor * z;
                        for i in 0..n {
                            rows[i].push(mu[i] + draw[i]);
                        }
                    }
                    (ids, rows, false)
                }
                Err(e) => {
                    warn!("degenerate sampling for matchup {matchup}: {e}");
                    let rows = mu.iter().map(|&m| vec![m; iterations]).collect();
                    (ids, rows, true)
                }
            }
        })
        .collect();

    // Assemble the dense matrix. Players outside every matchup block (zero
    // remaining projection) get constant rows at their mean.
    let mut rows: Vec<Vec<f64>> = catalog
        .players()
        .iter()
        .map(|p| vec![p.bayes_projection; iterations])
        .collect();
    let mut degenerate_matchups = 0;
    for (ids, block, degenerate) in blocks {
        if degenerate {
            degenerate_matchups += 1;
        }
        for (i, id) in ids.into_iter().enumerate() {
            rows[id] = block[i].clone();
        }
    }

    // Showdown multiplier variants mirror their UTIL twin scaled by the
    // slot multiplier; the same realization, not an independent draw.
    for id in catalog.ids() {
        let p = &catalog.players()[id];
        if let Some(twin) = p.util_twin {
            let mult = p.multiplier();
            rows[id] = rows[twin].iter().map(|v| v * mult).collect();
        }
    }

    SampleOutcome {
        scores: ScoreMatrix { rows, iterations },
        degenerate_matchups,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
