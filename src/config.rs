// Configuration loading and parsing (sim.toml, correlations.toml).

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::rules::{ContestStyle, Site};
use crate::sim::correlation::CorrelationTable;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub site: Site,
    pub style: ContestStyle,
    pub paths: PathsConfig,
    pub engine: EngineConfig,
    /// Per-matchup maximum player counts, keyed by matchup ("PHO@DAL").
    pub matchup_max: HashMap<String, usize>,
    /// Per-matchup minimum player counts.
    pub matchup_min: HashMap<String, usize>,
    pub at_least: Vec<GroupRule>,
    pub at_most: Vec<GroupRule>,
    pub correlations: CorrelationTable,
}

// ---------------------------------------------------------------------------
// sim.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire sim.toml file.
#[derive(Debug, Clone, Deserialize)]
struct SimFile {
    contest: ContestSection,
    paths: PathsConfig,
    engine: EngineConfig,
    #[serde(default)]
    limits: LimitsSection,
    #[serde(default)]
    groups: GroupsSection,
}

#[derive(Debug, Clone, Deserialize)]
struct ContestSection {
    site: String,
    style: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    pub projections: String,
    pub player_ids: String,
    #[serde(default)]
    pub ownership: Option<String>,
    #[serde(default)]
    pub boom_bust: Option<String>,
    pub contest_structure: String,
    #[serde(default)]
    pub live_contest: Option<String>,
    #[serde(default)]
    pub live_scores: Option<String>,
    pub output_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub num_lineups: usize,
    pub field_size: usize,
    pub iterations: usize,
    pub seed: u64,
    pub projection_minimum: f64,
    /// Stddev fallback factor: stddev = projection x this, when missing.
    pub default_variance: f64,
    /// Stochastic-cut spread as a percent of stddev (100 = full stddev).
    pub randomness: f64,
    /// Minimum player differences between emitted optimizer lineups.
    pub num_uniques: usize,
    pub min_lineup_salary: u32,
    /// Field realism: projection must stay within this fraction of optimal.
    pub max_pct_off_optimal: f64,
    pub global_team_limit: usize,
    /// Showdown: maximum lineup players from the captain's opponent.
    pub overlap_limit: usize,
    /// Elite-rank threshold as a fraction of the field (0.01 = top 1%).
    pub top_pct: f64,
    /// true selects the deterministic diversity cut; false the stochastic.
    #[serde(default)]
    pub deterministic: bool,
    /// Late swap: rebuild unlocked slots with the optimizer instead of
    /// field-style sampling.
    #[serde(default)]
    pub swap_optimize: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LimitsSection {
    #[serde(default)]
    matchup_max: HashMap<String, usize>,
    #[serde(default)]
    matchup_min: HashMap<String, usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct GroupsSection {
    #[serde(default)]
    at_least: Vec<GroupRule>,
    #[serde(default)]
    at_most: Vec<GroupRule>,
}

/// An at-least / at-most rule over a named group of players.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupRule {
    pub count: usize,
    pub players: Vec<String>,
}

// ---------------------------------------------------------------------------
// correlations.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
struct CorrelationsFile {
    #[serde(default)]
    positions: HashMap<String, HashMap<String, f64>>,
    #[serde(default)]
    overrides: HashMap<String, HashMap<String, f64>>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/sim.toml` and (optionally)
/// `config/correlations.toml`, relative to the given `base_dir`.
///
/// This is the lower-level loading primitive that does not auto-copy
/// defaults. Prefer `load_config()` which handles default initialization.
pub(crate) fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- sim.toml (required) ---
    let sim_path = config_dir.join("sim.toml");
    let sim_text = read_file(&sim_path)?;
    let sim_file: SimFile = toml::from_str(&sim_text).map_err(|e| ConfigError::ParseError {
        path: sim_path.clone(),
        source: e,
    })?;

    let site = Site::from_str_site(&sim_file.contest.site).ok_or_else(|| {
        ConfigError::ValidationError {
            field: "contest.site".into(),
            message: format!("unknown site `{}`", sim_file.contest.site),
        }
    })?;
    let style = ContestStyle::from_str_style(&sim_file.contest.style).ok_or_else(|| {
        ConfigError::ValidationError {
            field: "contest.style".into(),
            message: format!("unknown style `{}`", sim_file.contest.style),
        }
    })?;

    // --- correlations.toml (optional) ---
    let corr_path = config_dir.join("correlations.toml");
    let correlations = if corr_path.exists() {
        let corr_text = read_file(&corr_path)?;
        let corr_file: CorrelationsFile =
            toml::from_str(&corr_text).map_err(|e| ConfigError::ParseError {
                path: corr_path.clone(),
                source: e,
            })?;
        CorrelationTable::builtin().with_config(&corr_file.positions, &corr_file.overrides)
    } else {
        CorrelationTable::builtin()
    };

    let config = Config {
        site,
        style,
        paths: sim_file.paths,
        engine: sim_file.engine,
        matchup_max: sim_file.limits.matchup_max,
        matchup_min: sim_file.limits.matchup_min,
        at_least: sim_file.groups.at_least,
        at_most: sim_file.groups.at_most,
        correlations,
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                // Already customized in config/, leave it alone.
            }
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Convenience wrapper: loads config relative to the current working
/// directory, copying defaults first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let e = &config.engine;

    let positive_counts: &[(&str, usize)] = &[
        ("engine.num_lineups", e.num_lineups),
        ("engine.field_size", e.field_size),
        ("engine.iterations", e.iterations),
        ("engine.global_team_limit", e.global_team_limit),
    ];
    for (name, val) in positive_counts {
        if *val == 0 {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must be > 0".into(),
            });
        }
    }

    if e.projection_minimum < 0.0 {
        return Err(ConfigError::ValidationError {
            field: "engine.projection_minimum".into(),
            message: format!("must be >= 0, got {}", e.projection_minimum),
        });
    }
    if e.default_variance <= 0.0 {
        return Err(ConfigError::ValidationError {
            field: "engine.default_variance".into(),
            message: format!("must be > 0, got {}", e.default_variance),
        });
    }
    if e.randomness < 0.0 {
        return Err(ConfigError::ValidationError {
            field: "engine.randomness".into(),
            message: format!("must be >= 0, got {}", e.randomness),
        });
    }
    if !(0.0..=1.0).contains(&e.max_pct_off_optimal) {
        return Err(ConfigError::ValidationError {
            field: "engine.max_pct_off_optimal".into(),
            message: format!("must be between 0.0 and 1.0 inclusive, got {}", e.max_pct_off_optimal),
        });
    }
    if !(0.0..=1.0).contains(&e.top_pct) || e.top_pct == 0.0 {
        return Err(ConfigError::ValidationError {
            field: "engine.top_pct".into(),
            message: format!("must be in (0.0, 1.0], got {}", e.top_pct),
        });
    }

    for (idx, group) in config.at_least.iter().enumerate() {
        if group.players.is_empty() || group.count == 0 {
            return Err(ConfigError::ValidationError {
                field: format!("groups.at_least[{idx}]"),
                message: "requires a non-zero count and at least one player".into(),
            });
        }
    }
    for (idx, group) in config.at_most.iter().enumerate() {
        if group.players.is_empty() {
            return Err(ConfigError::ValidationError {
                field: format!("groups.at_most[{idx}]"),
                message: "requires at least one player".into(),
            });
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
