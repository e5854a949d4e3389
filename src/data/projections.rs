// Projection, ownership, and boom/bust stream loading.
//
// Reads the projection CSV (one row per player with slash-separated
// positions and comma-allowed salaries) plus the optional classic ownership
// and boom/bust overlay streams.

use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::warn;

use crate::catalog::normalize_name;
use crate::rules::{parse_position_list, Position};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// One parsed projection row, before catalog assembly.
#[derive(Debug, Clone)]
pub struct ProjectionRow {
    pub name: String,
    pub team: String,
    pub positions: Vec<Position>,
    pub salary: u32,
    pub projection: f64,
    pub field_projection: Option<f64>,
    pub stddev: Option<f64>,
    pub ceiling: Option<f64>,
    pub minutes: Option<f64>,
    pub ownership: f64,
    /// Showdown per-slot ownerships, keyed by slot label ("CPT", "MVP", ...).
    pub slot_ownership: HashMap<String, f64>,
}

/// Boom/bust overlay values for one player.
#[derive(Debug, Clone)]
pub struct BoomBustRow {
    pub name: String,
    pub stddev: f64,
    pub boom_pct: f64,
    pub bust_pct: f64,
    pub ceiling: f64,
    pub optimal_pct: f64,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("validation error: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Raw CSV serde structs (private)
// ---------------------------------------------------------------------------

/// Projection CSV row. Salary is a string because feeds include thousands
/// separators ("7,300"). Extra columns are absorbed via `#[serde(flatten)]`.
#[derive(Debug, Deserialize)]
#[allow(dead_code, non_snake_case)]
struct RawProjection {
    Name: String,
    Team: String,
    Position: String,
    Salary: String,
    #[serde(alias = "FPTS")]
    Fpts: f64,
    #[serde(default, alias = "Field FPTS")]
    FieldFpts: Option<f64>,
    #[serde(default, alias = "StdDev")]
    StdDev: Option<f64>,
    #[serde(default)]
    Ceiling: Option<f64>,
    #[serde(default)]
    Minutes: Option<f64>,
    #[serde(default, rename = "Own%", alias = "Ownership")]
    Own: f64,
    #[serde(default, rename = "CPT Own%")]
    CptOwn: Option<f64>,
    #[serde(default, rename = "MVP Own%")]
    MvpOwn: Option<f64>,
    #[serde(default, rename = "STAR Own%")]
    StarOwn: Option<f64>,
    #[serde(default, rename = "PRO Own%")]
    ProOwn: Option<f64>,
    #[serde(default, rename = "UTIL Own%")]
    UtilOwn: Option<f64>,
    /// Absorb any extra feed columns.
    #[serde(flatten)]
    _extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code, non_snake_case)]
struct RawOwnership {
    Name: String,
    #[serde(rename = "Own%", alias = "Ownership")]
    Own: f64,
    #[serde(flatten)]
    _extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code, non_snake_case)]
struct RawBoomBust {
    Name: String,
    #[serde(alias = "StdDev")]
    StdDev: f64,
    #[serde(default, rename = "Boom%")]
    Boom: f64,
    #[serde(default, rename = "Bust%")]
    Bust: f64,
    #[serde(default)]
    Ceiling: f64,
    #[serde(default, rename = "Optimal%")]
    Optimal: f64,
    #[serde(flatten)]
    _extra: HashMap<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a salary cell that may contain thousands separators or a leading
/// currency symbol.
pub(crate) fn parse_salary(raw: &str) -> Option<u32> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    cleaned.parse().ok()
}

// ---------------------------------------------------------------------------
// Reader-based loaders (private, enable testing without temp files)
// ---------------------------------------------------------------------------

fn load_projections_from_reader<R: Read>(rdr: R) -> Result<Vec<ProjectionRow>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut rows = Vec::new();
    for result in reader.deserialize::<RawProjection>() {
        match result {
            Ok(raw) => {
                if !raw.Fpts.is_finite() {
                    warn!("skipping projection '{}': non-finite FPTS", raw.Name.trim());
                    continue;
                }
                let Some(salary) = parse_salary(&raw.Salary) else {
                    warn!(
                        "skipping projection '{}': unparseable salary '{}'",
                        raw.Name.trim(),
                        raw.Salary
                    );
                    continue;
                };
                let positions = parse_position_list(&raw.Position);
                if positions.is_empty() {
                    warn!(
                        "skipping projection '{}': no recognizable positions in '{}'",
                        raw.Name.trim(),
                        raw.Position
                    );
                    continue;
                }

                let mut slot_ownership = HashMap::new();
                for (label, value) in [
                    ("CPT", raw.CptOwn),
                    ("MVP", raw.MvpOwn),
                    ("STAR", raw.StarOwn),
                    ("PRO", raw.ProOwn),
                    ("UTIL", raw.UtilOwn),
                ] {
                    if let Some(v) = value {
                        slot_ownership.insert(label.to_string(), v);
                    }
                }

                rows.push(ProjectionRow {
                    name: normalize_name(&raw.Name),
                    team: raw.Team.trim().to_string(),
                    positions,
                    salary,
                    projection: raw.Fpts,
                    field_projection: raw.FieldFpts.filter(|v| v.is_finite()),
                    stddev: raw.StdDev.filter(|v| v.is_finite()),
                    ceiling: raw.Ceiling.filter(|v| v.is_finite()),
                    minutes: raw.Minutes.filter(|v| v.is_finite()),
                    ownership: raw.Own,
                    slot_ownership,
                });
            }
            Err(e) => {
                warn!("skipping malformed projection row: {}", e);
            }
        }
    }
    Ok(rows)
}

fn load_ownership_from_reader<R: Read>(rdr: R) -> Result<HashMap<String, f64>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut map = HashMap::new();
    for result in reader.deserialize::<RawOwnership>() {
        match result {
            Ok(raw) => {
                if !raw.Own.is_finite() {
                    warn!("skipping ownership for '{}': non-finite value", raw.Name.trim());
                    continue;
                }
                map.insert(normalize_name(&raw.Name), raw.Own);
            }
            Err(e) => {
                warn!("skipping malformed ownership row: {}", e);
            }
        }
    }
    Ok(map)
}

fn load_boom_bust_from_reader<R: Read>(rdr: R) -> Result<HashMap<String, BoomBustRow>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut map = HashMap::new();
    for result in reader.deserialize::<RawBoomBust>() {
        match result {
            Ok(raw) => {
                if !raw.StdDev.is_finite() {
                    warn!("skipping boom/bust for '{}': non-finite stddev", raw.Name.trim());
                    continue;
                }
                let name = normalize_name(&raw.Name);
                map.insert(
                    name.clone(),
                    BoomBustRow {
                        name,
                        stddev: raw.StdDev,
                        boom_pct: raw.Boom,
                        bust_pct: raw.Bust,
                        ceiling: raw.Ceiling,
                        optimal_pct: raw.Optimal,
                    },
                );
            }
            Err(e) => {
                warn!("skipping malformed boom/bust row: {}", e);
            }
        }
    }
    Ok(map)
}

// ---------------------------------------------------------------------------
// Public path-based loaders
// ---------------------------------------------------------------------------

/// Load the projection stream from a CSV file.
pub fn load_projections(path: &Path) -> Result<Vec<ProjectionRow>, ProjectionError> {
    let file = std::fs::File::open(path).map_err(|e| ProjectionError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let rows = load_projections_from_reader(file).map_err(|e| ProjectionError::Csv {
        path: path.display().to_string(),
        source: e,
    })?;
    if rows.is_empty() {
        return Err(ProjectionError::Validation(
            "projection CSV produced zero valid rows".into(),
        ));
    }
    Ok(rows)
}

/// Load the classic ownership overlay. Returns name -> ownership percent.
pub fn load_ownership(path: &Path) -> Result<HashMap<String, f64>, ProjectionError> {
    let file = std::fs::File::open(path).map_err(|e| ProjectionError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    load_ownership_from_reader(file).map_err(|e| ProjectionError::Csv {
        path: path.display().to_string(),
        source: e,
    })
}

/// Load the classic boom/bust overlay. Returns name -> row.
pub fn load_boom_bust(path: &Path) -> Result<HashMap<String, BoomBustRow>, ProjectionError> {
    let file = std::fs::File::open(path).map_err(|e| ProjectionError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    load_boom_bust_from_reader(file).map_err(|e| ProjectionError::Csv {
        path: path.display().to_string(),
        source: e,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
