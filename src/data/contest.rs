// Contest-structure stream: payout schedule, entry fee, field size.
//
// The stream is a two-column CSV. "Entry Fee" and "Field Size" appear as
// header rows; every other row is a finishing place (single "1" or a range
// "3-5") with its payout value.

use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use tracing::warn;

use super::projections::ProjectionError;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A tournament's economic structure. `payouts[r]` is the prize for
/// finishing rank r (0-based); ranks beyond the table earn nothing.
#[derive(Debug, Clone)]
pub struct Tournament {
    pub payouts: Vec<f64>,
    pub entry_fee: f64,
    pub field_size: usize,
}

impl Tournament {
    /// Number of paid places (the cash line).
    pub fn cash_line(&self) -> usize {
        self.payouts.len()
    }

    pub fn total_payout(&self) -> f64 {
        self.payouts.iter().sum()
    }
}

// ---------------------------------------------------------------------------
// Raw CSV serde struct (private)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[allow(dead_code, non_snake_case)]
struct RawStructureRow {
    Place: String,
    Payout: String,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a money cell ("$5,000.00" or "1000") into f64.
fn parse_money(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}

/// Parse a place cell into an inclusive 1-based (start, end) range.
fn parse_place(raw: &str) -> Option<(usize, usize)> {
    let trimmed = raw.trim();
    if let Some((a, b)) = trimmed.split_once('-') {
        let start = a.trim().parse().ok()?;
        let end = b.trim().parse().ok()?;
        (start >= 1 && end >= start).then_some((start, end))
    } else {
        let place: usize = trimmed.parse().ok()?;
        (place >= 1).then_some((place, place))
    }
}

// ---------------------------------------------------------------------------
// Loaders
// ---------------------------------------------------------------------------

fn load_contest_from_reader<R: Read>(rdr: R) -> Result<Tournament, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut entry_fee = 0.0;
    let mut field_size = 0usize;
    let mut by_place: Vec<(usize, usize, f64)> = Vec::new();

    for result in reader.deserialize::<RawStructureRow>() {
        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                warn!("skipping malformed contest structure row: {}", e);
                continue;
            }
        };
        let place = raw.Place.trim();
        match place.to_lowercase().as_str() {
            "entry fee" => {
                entry_fee = parse_money(&raw.Payout).unwrap_or(0.0);
            }
            "field size" => {
                field_size = raw
                    .Payout
                    .trim()
                    .chars()
                    .filter(|c| c.is_ascii_digit())
                    .collect::<String>()
                    .parse()
                    .unwrap_or(0);
            }
            _ => {
                let Some(range) = parse_place(place) else {
                    warn!("skipping contest structure row with place '{}'", place);
                    continue;
                };
                let Some(value) = parse_money(&raw.Payout) else {
                    warn!("skipping contest structure row with payout '{}'", raw.Payout);
                    continue;
                };
                by_place.push((range.0, range.1, value));
            }
        }
    }

    let max_place = by_place.iter().map(|(_, end, _)| *end).max().unwrap_or(0);
    let mut payouts = vec![0.0; max_place];
    for (start, end, value) in by_place {
        for place in start..=end {
            payouts[place - 1] = value;
        }
    }

    Ok(Tournament {
        payouts,
        entry_fee,
        field_size,
    })
}

/// Load the contest structure stream from a CSV file.
pub fn load_contest(path: &Path) -> Result<Tournament, ProjectionError> {
    let file = std::fs::File::open(path).map_err(|e| ProjectionError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let tournament = load_contest_from_reader(file).map_err(|e| ProjectionError::Csv {
        path: path.display().to_string(),
        source: e,
    })?;
    if tournament.payouts.is_empty() {
        return Err(ProjectionError::Validation(
            "contest structure produced an empty payout table".into(),
        ));
    }
    if tournament.field_size == 0 {
        return Err(ProjectionError::Validation(
            "contest structure is missing a field size".into(),
        ));
    }
    Ok(tournament)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
