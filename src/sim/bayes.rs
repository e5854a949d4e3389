// Minutes-remaining Bayesian projection update for in-progress games.
//
// The posterior blends the pre-game points-per-minute prior with the
// observed in-game rate, weighted by elapsed share of the game, then
// re-extends over the remaining minutes. It runs once on the coordinator
// before the simulator starts, for every player whose team has partial
// game progress.

use tracing::info;

use crate::catalog::Catalog;
use crate::data::live::LiveScores;

/// Regulation per-player game minutes.
pub const REGULATION_MINUTES: f64 = 48.0;

/// Posterior (mean, variance) for a player with prior (projection, stddev),
/// observed points `actual`, and `minutes_remaining` left in the game.
///
/// With T regulation minutes, R remaining, E = T - R elapsed:
///   weighted_ppm = (actual/E) * (E/T) + (projection/T) * (1 - E/T)
///   mean = actual + weighted_ppm * R
/// The remaining-segment variance attenuates by R/T, the actual segment by
/// E/T, and the posterior combines them by inverse-variance weighting.
/// A finished game (R = 0) collapses to (actual, 0).
pub fn posterior(projection: f64, stddev: f64, actual: f64, minutes_remaining: f64) -> (f64, f64) {
    let t = REGULATION_MINUTES;
    let r = minutes_remaining.clamp(0.0, t);
    if r <= 0.0 {
        return (actual, 0.0);
    }
    let e = t - r;
    if e <= 0.0 {
        // Untouched game: the prior stands.
        return (projection, stddev * stddev);
    }

    let ppm = projection / t;
    let actual_ppm = actual / e;
    let s = e / t;
    let weighted_ppm = actual_ppm * s + ppm * (1.0 - s);
    let mean = actual + weighted_ppm * r;

    let prior_var = stddev * stddev;
    let var_remaining = prior_var * (r / t);
    let var_actual = prior_var * (e / t);
    let variance = if var_remaining > 0.0 && var_actual > 0.0 {
        1.0 / (1.0 / var_remaining + 1.0 / var_actual)
    } else {
        0.0
    };

    (mean, variance)
}

/// Rewrite the bayesian projection/variance of every player whose team has
/// partial game progress. Returns how many players were updated.
pub fn apply_live_scores(catalog: &mut Catalog, scores: &LiveScores) -> usize {
    let mut updated = 0;
    for id in 0..catalog.len() {
        let Some(p) = catalog.by_id(id) else { continue };
        let Some(&remaining) = scores.team_minutes_remaining.get(&p.team) else {
            continue;
        };
        if remaining >= REGULATION_MINUTES {
            continue;
        }
        let actual = scores.actual_points.get(&p.name).copied().unwrap_or(0.0);
        let (mean, variance) = posterior(p.projection, p.stddev, actual, remaining);
        let Some(p) = catalog.by_id_mut(id) else { continue };
        p.actual_points = Some(actual);
        p.minutes_remaining = Some(remaining);
        p.bayes_projection = mean;
        p.bayes_variance = variance;
        updated += 1;
    }
    if updated > 0 {
        info!("bayesian update applied to {updated} players");
    }
    updated
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
