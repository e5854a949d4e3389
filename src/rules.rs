// Site-parameterized roster structure: slots, eligibility, caps.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Sites and contest styles
// ---------------------------------------------------------------------------

/// The two hosting sites. Slot topology, salary cap, and showdown multiplier
/// structure differ between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Site {
    SiteA,
    SiteB,
}

impl Site {
    pub fn from_str_site(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sitea" | "a" => Some(Site::SiteA),
            "siteb" | "b" => Some(Site::SiteB),
            _ => None,
        }
    }

    pub fn display_str(&self) -> &'static str {
        match self {
            Site::SiteA => "siteA",
            Site::SiteB => "siteB",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContestStyle {
    Classic,
    Showdown,
}

impl ContestStyle {
    pub fn from_str_style(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "classic" => Some(ContestStyle::Classic),
            "showdown" => Some(ContestStyle::Showdown),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

/// Basketball position tags as they appear in projection feeds ("PG/SG").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    PointGuard,
    ShootingGuard,
    SmallForward,
    PowerForward,
    Center,
}

impl Position {
    /// Parse a single position tag. Slash-separated lists are handled by
    /// `parse_position_list`.
    pub fn from_str_pos(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "PG" => Some(Position::PointGuard),
            "SG" => Some(Position::ShootingGuard),
            "SF" => Some(Position::SmallForward),
            "PF" => Some(Position::PowerForward),
            "C" => Some(Position::Center),
            _ => None,
        }
    }

    pub fn display_str(&self) -> &'static str {
        match self {
            Position::PointGuard => "PG",
            Position::ShootingGuard => "SG",
            Position::SmallForward => "SF",
            Position::PowerForward => "PF",
            Position::Center => "C",
        }
    }

    pub const ALL: [Position; 5] = [
        Position::PointGuard,
        Position::ShootingGuard,
        Position::SmallForward,
        Position::PowerForward,
        Position::Center,
    ];
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_str())
    }
}

/// Parse a slash-separated position list ("PG/SG"), preserving order and
/// dropping unknown tags.
pub fn parse_position_list(s: &str) -> Vec<Position> {
    s.split('/').filter_map(Position::from_str_pos).collect()
}

// ---------------------------------------------------------------------------
// Roster slots
// ---------------------------------------------------------------------------

/// A labeled seat in a lineup. Classic slots carry an eligibility set over
/// positions; showdown slots carry a scoring/salary multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    PG,
    SG,
    SF,
    PF,
    C,
    Guard,
    Forward,
    Util,
    Captain,
    Mvp,
    Star,
    Pro,
}

impl Slot {
    pub fn from_str_slot(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "PG" => Some(Slot::PG),
            "SG" => Some(Slot::SG),
            "SF" => Some(Slot::SF),
            "PF" => Some(Slot::PF),
            "C" => Some(Slot::C),
            "G" => Some(Slot::Guard),
            "F" => Some(Slot::Forward),
            "UTIL" | "FLEX" => Some(Slot::Util),
            "CPT" => Some(Slot::Captain),
            "MVP" => Some(Slot::Mvp),
            "STAR" => Some(Slot::Star),
            "PRO" => Some(Slot::Pro),
            _ => None,
        }
    }

    pub fn display_str(&self) -> &'static str {
        match self {
            Slot::PG => "PG",
            Slot::SG => "SG",
            Slot::SF => "SF",
            Slot::PF => "PF",
            Slot::C => "C",
            Slot::Guard => "G",
            Slot::Forward => "F",
            Slot::Util => "UTIL",
            Slot::Captain => "CPT",
            Slot::Mvp => "MVP",
            Slot::Star => "STAR",
            Slot::Pro => "PRO",
        }
    }

    /// Whether a player with the given position tags may fill this slot.
    /// Single-position slots accept only that position; G accepts PG/SG;
    /// F accepts SF/PF; UTIL and the showdown multiplier slots accept any.
    pub fn accepts(&self, positions: &[Position]) -> bool {
        match self {
            Slot::PG => positions.contains(&Position::PointGuard),
            Slot::SG => positions.contains(&Position::ShootingGuard),
            Slot::SF => positions.contains(&Position::SmallForward),
            Slot::PF => positions.contains(&Position::PowerForward),
            Slot::C => positions.contains(&Position::Center),
            Slot::Guard => positions
                .iter()
                .any(|p| matches!(p, Position::PointGuard | Position::ShootingGuard)),
            Slot::Forward => positions
                .iter()
                .any(|p| matches!(p, Position::SmallForward | Position::PowerForward)),
            Slot::Util | Slot::Captain | Slot::Mvp | Slot::Star | Slot::Pro => {
                !positions.is_empty()
            }
        }
    }

    /// Scoring multiplier for showdown slots; 1.0 everywhere else.
    pub fn multiplier(&self) -> f64 {
        match self {
            Slot::Captain | Slot::Star => 1.5,
            Slot::Mvp => 2.0,
            Slot::Pro => 1.2,
            _ => 1.0,
        }
    }

    /// Salary multiplier: only SiteA's captain costs extra; SiteB multiplier
    /// slots scale points but not price.
    pub fn salary_multiplier(&self) -> f64 {
        match self {
            Slot::Captain => 1.5,
            _ => 1.0,
        }
    }

    /// Flex slots can host multiple positions, so late-swap keeps the
    /// latest-starting players in them.
    pub fn is_flex(&self) -> bool {
        matches!(self, Slot::Guard | Slot::Forward | Slot::Util)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_str())
    }
}

// ---------------------------------------------------------------------------
// Roster rules
// ---------------------------------------------------------------------------

/// Structural constraints for one site + contest style: the ordered slot
/// sequence, salary bounds, and exposure caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterRules {
    pub site: Site,
    pub style: ContestStyle,
    pub slots: Vec<Slot>,
    pub salary_cap: u32,
    /// Realistic salary floor for generated lineups. None disables the floor.
    pub salary_floor: Option<u32>,
    /// Field-generation tolerance below the cap: generated lineups must land
    /// in [cap - tolerance, cap].
    pub salary_tolerance: u32,
    /// Maximum players from a single team.
    pub team_cap: usize,
    /// Minimum distinct matchups a lineup must cover.
    pub min_matchups: usize,
}

impl RosterRules {
    /// The standard rules for a site + style. Numeric knobs (floor,
    /// tolerance, team cap) can be overridden from config afterwards.
    pub fn for_contest(site: Site, style: ContestStyle) -> Self {
        match (site, style) {
            (Site::SiteA, ContestStyle::Classic) => RosterRules {
                site,
                style,
                slots: vec![
                    Slot::PG,
                    Slot::SG,
                    Slot::SF,
                    Slot::PF,
                    Slot::C,
                    Slot::Guard,
                    Slot::Forward,
                    Slot::Util,
                ],
                salary_cap: 50_000,
                salary_floor: Some(49_000),
                salary_tolerance: 1_000,
                team_cap: 4,
                min_matchups: 2,
            },
            (Site::SiteB, ContestStyle::Classic) => RosterRules {
                site,
                style,
                slots: vec![
                    Slot::PG,
                    Slot::PG,
                    Slot::SG,
                    Slot::SG,
                    Slot::SF,
                    Slot::SF,
                    Slot::PF,
                    Slot::PF,
                    Slot::C,
                ],
                salary_cap: 60_000,
                salary_floor: Some(59_000),
                salary_tolerance: 2_000,
                team_cap: 4,
                min_matchups: 2,
            },
            (Site::SiteA, ContestStyle::Showdown) => RosterRules {
                site,
                style,
                slots: vec![
                    Slot::Captain,
                    Slot::Util,
                    Slot::Util,
                    Slot::Util,
                    Slot::Util,
                    Slot::Util,
                ],
                salary_cap: 50_000,
                salary_floor: Some(49_000),
                salary_tolerance: 1_000,
                team_cap: 5,
                min_matchups: 1,
            },
            (Site::SiteB, ContestStyle::Showdown) => RosterRules {
                site,
                style,
                slots: vec![Slot::Mvp, Slot::Star, Slot::Pro, Slot::Util, Slot::Util],
                salary_cap: 60_000,
                salary_floor: Some(59_000),
                salary_tolerance: 2_000,
                team_cap: 4,
                min_matchups: 1,
            },
        }
    }

    pub fn roster_size(&self) -> usize {
        self.slots.len()
    }

    /// The ordered set of distinct multiplier slots for this contest, used to
    /// materialize showdown catalog variants. Empty for classic.
    pub fn variant_slots(&self) -> Vec<Slot> {
        if self.style == ContestStyle::Classic {
            return vec![];
        }
        let mut seen = Vec::new();
        for &slot in &self.slots {
            if !seen.contains(&slot) {
                seen.push(slot);
            }
        }
        seen
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
