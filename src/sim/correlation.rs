// Correlation calibration and per-matchup covariance assembly.
//
// The numeric calibration is data-level: defaults ship in
// defaults/correlations.toml and merge over the compiled-in table, with
// per-player overrides. The covariance for a matchup is projected to the
// nearest positive-semidefinite matrix before sampling.

use std::collections::HashMap;

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use thiserror::Error;

use crate::catalog::{Catalog, Player, PlayerId};
use crate::rules::{Position, Slot};

// ---------------------------------------------------------------------------
// Calibration table
// ---------------------------------------------------------------------------

/// Correlation lookup: one row per position, keyed by peer slot label
/// ("PG".."C" for teammates, "Opp PG".."Opp C" for opponents), plus
/// per-player override pairs keyed by normalized names.
#[derive(Debug, Clone)]
pub struct CorrelationTable {
    rows: HashMap<Position, HashMap<String, f64>>,
    overrides: HashMap<String, HashMap<String, f64>>,
}

/// Intra-team and opponent defaults per position row. The intra-team values
/// are negative (teammates share one ball); opponent values are small
/// positives from shared game pace, fading to near zero for centers.
const BUILTIN_ROWS: [(Position, [f64; 10]); 5] = [
    //                 PG       SG       SF       PF       C      OppPG   OppSG   OppSF   OppPF   OppC
    (Position::PointGuard,    [-0.1324, -0.1324, -0.0812, -0.0812, -0.1231, 0.0822, 0.0822, 0.0355, 0.0355, 0.0079]),
    (Position::ShootingGuard, [-0.1324, -0.1324, -0.0812, -0.0812, -0.1231, 0.0822, 0.0822, 0.0355, 0.0355, 0.0079]),
    (Position::SmallForward,  [-0.0812, -0.0812, -0.0812, -0.0812, -0.1231, 0.0355, 0.0355, 0.0273, 0.0273, 0.0079]),
    (Position::PowerForward,  [-0.0812, -0.0812, -0.0812, -0.0812, -0.1231, 0.0355, 0.0355, 0.0273, 0.0273, 0.0079]),
    (Position::Center,        [-0.1231, -0.1231, -0.1231, -0.1231, -0.1231, 0.0079, 0.0079, 0.0079, 0.0079, -0.0004]),
];

impl CorrelationTable {
    /// The compiled-in calibration, used when no correlations.toml is found.
    pub fn builtin() -> Self {
        let mut rows = HashMap::new();
        for (pos, values) in BUILTIN_ROWS {
            let mut row = HashMap::new();
            for (i, peer) in Position::ALL.iter().enumerate() {
                row.insert(peer.display_str().to_string(), values[i]);
                row.insert(format!("Opp {}", peer.display_str()), values[i + 5]);
            }
            rows.insert(pos, row);
        }
        CorrelationTable {
            rows,
            overrides: HashMap::new(),
        }
    }

    /// Merge configured rows and overrides over the builtin table. Row keys
    /// are position tags; unknown tags are ignored by the config validator
    /// before this point.
    pub fn with_config(
        mut self,
        rows: &HashMap<String, HashMap<String, f64>>,
        overrides: &HashMap<String, HashMap<String, f64>>,
    ) -> Self {
        for (tag, configured) in rows {
            if let Some(pos) = Position::from_str_pos(tag) {
                let row = self.rows.entry(pos).or_default();
                for (label, value) in configured {
                    row.insert(label.clone(), *value);
                }
            }
        }
        for (name, pairs) in overrides {
            self.overrides
                .insert(crate::catalog::normalize_name(name), pairs.clone());
        }
        self
    }

    pub fn row(&self, pos: Position) -> &HashMap<String, f64> {
        &self.rows[&pos]
    }

    pub fn override_for(&self, name: &str) -> Option<&HashMap<String, f64>> {
        self.overrides.get(name)
    }
}

/// Correlation between two distinct players in one matchup. Player-specific
/// overrides win; otherwise the row of `a`'s primary position is consulted
/// under the peer's (possibly "Opp "-prefixed) primary position label.
pub fn pairwise_correlation(a: &Player, b: &Player) -> f64 {
    if let Some(rho) = a.player_correlations.get(&b.name) {
        return *rho;
    }
    let Some(peer_pos) = b.primary_position() else {
        return 0.0;
    };
    let label = if a.team == b.team {
        peer_pos.display_str().to_string()
    } else {
        format!("Opp {}", peer_pos.display_str())
    };
    a.correlations.get(&label).copied().unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Covariance assembly
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CovarianceError {
    #[error("covariance for matchup {matchup} not PSD after jitter (min eigenvalue {min_eig})")]
    NotPsd { matchup: String, min_eig: f64 },
}

/// The UTIL-level players of one matchup with positive remaining projection.
/// Showdown multiplier variants are excluded here; their samples are scalar
/// multiples of the UTIL rows. A matchup key without '@' is the degraded
/// team-local form, covering players whose game info never resolved.
pub fn matchup_util_players(catalog: &Catalog, matchup: &str) -> Vec<PlayerId> {
    let mut ids: Vec<PlayerId> = match matchup.split_once('@') {
        Some((away, home)) => catalog
            .by_team(away)
            .iter()
            .chain(catalog.by_team(home))
            .copied()
            .collect(),
        None => catalog.by_team(matchup).to_vec(),
    };
    ids.retain(|&id| {
        let p = &catalog.players()[id];
        p.matchup == matchup
            && p.bayes_projection > 0.0
            && (p.variant.is_none() || p.variant == Some(Slot::Util))
    });
    ids.sort_unstable();
    ids
}

/// Build the covariance matrix over the given players: off-diagonals are
/// pairwise correlation x stddev products, diagonals are bayesian variance.
/// The raw correlation lookups need not be symmetric; the matrix is
/// symmetrized before the PSD projection.
pub fn build_covariance(catalog: &Catalog, ids: &[PlayerId]) -> DMatrix<f64> {
    let n = ids.len();
    let mut cov = DMatrix::<f64>::zeros(n, n);
    for i in 0..n {
        let a = &catalog.players()[ids[i]];
        for j in 0..n {
            if i == j {
                cov[(i, j)] = a.bayes_variance;
            } else {
                let b = &catalog.players()[ids[j]];
                cov[(i, j)] = pairwise_correlation(a, b) * a.stddev * b.stddev;
            }
        }
    }
    symmetrize(cov)
}

fn symmetrize(m: DMatrix<f64>) -> DMatrix<f64> {
    0.5 * (&m + m.transpose())
}

/// Project a covariance matrix to the nearest PSD matrix and return a factor
/// A with A * A^T = Sigma, suitable for sampling.
///
/// Eigendecompose, clip negative eigenvalues to zero (with a tolerance
/// relative to the largest eigenvalue magnitude), and reconstruct. If a
/// meaningfully negative eigenvalue survives, add a diagonal jitter of
/// |min_eig| + 1e-6 and clip once more; a failure after that is structural.
pub fn psd_factor(cov: DMatrix<f64>, matchup: &str) -> Result<DMatrix<f64>, CovarianceError> {
    let factored = try_factor(symmetrize(cov.clone()));
    match factored {
        Ok(f) => Ok(f),
        Err(min_eig) => {
            let n = cov.nrows();
            let jitter = min_eig.abs() + 1e-6;
            let jittered = cov + DMatrix::<f64>::identity(n, n) * jitter;
            try_factor(symmetrize(jittered)).map_err(|min_eig| CovarianceError::NotPsd {
                matchup: matchup.to_string(),
                min_eig,
            })
        }
    }
}

/// One clip-and-factor pass. Err carries the offending minimum eigenvalue.
fn try_factor(cov: DMatrix<f64>) -> Result<DMatrix<f64>, f64> {
    let se = SymmetricEigen::new(cov);
    let mut d = se.eigenvalues;
    let max_abs = d.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let tol = 1e-10 * max_abs.max(1.0);

    let min_eig = d.iter().cloned().fold(f64::INFINITY, f64::min);
    if min_eig < -tol {
        return Err(min_eig);
    }
    for v in d.iter_mut() {
        if *v < 0.0 {
            *v = 0.0;
        }
    }
    let sqrt_d = DVector::from_iterator(d.len(), d.iter().map(|v| v.sqrt()));
    Ok(&se.eigenvectors * DMatrix::from_diagonal(&sqrt_d))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
