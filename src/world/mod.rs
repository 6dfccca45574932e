//! Static world geometry shared read-only by the tick loop and every connection

pub mod geometry;
pub mod layout;

pub use geometry::{Aabb, Obstacle, Position, Vec3, WorldGeometry};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Which generator builds the obstacle set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorldKind {
    /// Figure-eight circuit lined with wall blocks
    Track,
    /// Grid of buildings separated by roads
    City,
    /// Empty plane
    Open,
}

impl FromStr for WorldKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "track" => Ok(Self::Track),
            "city" => Ok(Self::City),
            "open" => Ok(Self::Open),
            other => Err(format!("unknown world kind {other:?}")),
        }
    }
}

impl fmt::Display for WorldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Track => "track",
            Self::City => "city",
            Self::Open => "open",
        };
        f.write_str(name)
    }
}

/// Parameters the world is generated from
#[derive(Debug, Clone)]
pub struct WorldConfig {
    pub kind: WorldKind,
    /// Seed for every randomized choice (layout and spawns)
    pub seed: u64,
    /// Lemniscate scale `a` for the track
    pub track_scale: f32,
    /// Number of centreline samples; each sample places two walls
    pub track_steps: u32,
    pub city_cols: u32,
    pub city_rows: u32,
    /// Side length of one city cell in world units
    pub city_block: f32,
    /// Open worlds spawn within `±open_half_extent` on both axes
    pub open_half_extent: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            kind: WorldKind::Track,
            seed: 0,
            track_scale: 80.0,
            track_steps: 100,
            city_cols: 8,
            city_rows: 8,
            city_block: 30.0,
            open_half_extent: 250.0,
        }
    }
}

impl WorldConfig {
    /// Degenerate parameters are fatal at startup, never at runtime
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.kind {
            WorldKind::Track => {
                if !(self.track_scale.is_finite() && self.track_scale > 0.0) {
                    return Err(ConfigError::Degenerate("TRACK_SCALE must be positive"));
                }
                if self.track_steps < 8 {
                    return Err(ConfigError::Degenerate("TRACK_STEPS must be at least 8"));
                }
            }
            WorldKind::City => {
                if self.city_cols == 0 || self.city_rows == 0 {
                    return Err(ConfigError::Degenerate("city grid must have at least one cell"));
                }
                // Roads must stay wider than a vehicle
                if !(self.city_block.is_finite() && self.city_block >= 16.0) {
                    return Err(ConfigError::Degenerate("CITY_BLOCK must be at least 16"));
                }
            }
            WorldKind::Open => {
                if !(self.open_half_extent.is_finite() && self.open_half_extent > 0.0) {
                    return Err(ConfigError::Degenerate("OPEN_HALF_EXTENT must be positive"));
                }
            }
        }
        Ok(())
    }
}
