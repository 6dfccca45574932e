//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::game::physics::{CollisionPolicy, VehicleParams};
use crate::world::{WorldConfig, WorldKind};

/// Above this the tick period drops below a millisecond
const MAX_TICK_RATE: u32 = 1000;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS (comma-separated, `None` = any)
    pub client_origin: Option<String>,

    /// Simulation ticks per second
    pub tick_rate: u32,
    /// Static world layout parameters
    pub world: WorldConfig,
    /// Vehicle tuning (per-tick constants)
    pub vehicle: VehicleParams,
    /// What happens when a move would end inside an obstacle
    pub collision: CollisionPolicy,

    /// Close connections that send nothing for this long (`None` = rely on transport)
    pub idle_timeout: Option<Duration>,
    /// Max inbound messages per second per connection
    pub input_rate_limit: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string())
        };

        let kind: WorldKind = parse_var("WORLD_KIND", WorldKind::Track)?;
        let seed = match env::var("WORLD_SEED") {
            Ok(raw) => parse_value("WORLD_SEED", raw)?,
            Err(_) => rand::random(),
        };

        let defaults = WorldConfig::default();
        let world = WorldConfig {
            kind,
            seed,
            track_scale: parse_var("TRACK_SCALE", defaults.track_scale)?,
            track_steps: parse_var("TRACK_STEPS", defaults.track_steps)?,
            city_cols: parse_var("CITY_COLS", defaults.city_cols)?,
            city_rows: parse_var("CITY_ROWS", defaults.city_rows)?,
            city_block: parse_var("CITY_BLOCK", defaults.city_block)?,
            open_half_extent: parse_var("OPEN_HALF_EXTENT", defaults.open_half_extent)?,
        };

        let collision = collision_policy(
            &parse_var("COLLISION_POLICY", "hold".to_string())?,
            parse_var("BOUNCE_FACTOR", 0.5)?,
        )?;

        let idle_secs: u64 = parse_var("IDLE_TIMEOUT_SECS", 30)?;

        let config = Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").ok().filter(|s| !s.trim().is_empty()),
            tick_rate: parse_var("TICK_RATE", 60)?,
            world,
            vehicle: VehicleParams::default(),
            collision,
            idle_timeout: (idle_secs > 0).then(|| Duration::from_secs(idle_secs)),
            input_rate_limit: parse_var("INPUT_RATE_LIMIT", 120)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject parameters that would produce a degenerate world or loop
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 || self.tick_rate > MAX_TICK_RATE {
            return Err(ConfigError::Degenerate("TICK_RATE must be within [1, 1000]"));
        }
        if self.input_rate_limit == 0 {
            return Err(ConfigError::Degenerate("INPUT_RATE_LIMIT must be at least 1"));
        }
        if let CollisionPolicy::Bounce { factor } = self.collision {
            if !(0.0..=1.0).contains(&factor) {
                return Err(ConfigError::Degenerate("BOUNCE_FACTOR must be within [0, 1]"));
            }
        }
        self.world.validate()
    }

    /// Fixed period between simulation ticks
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate))
    }
}

/// Read `key` from the environment, falling back to `default` when unset
fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => parse_value(key, raw),
        Err(_) => Ok(default),
    }
}

/// Parse a raw value, ignoring surrounding whitespace
fn parse_value<T: FromStr>(key: &'static str, raw: String) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value: raw })
}

/// `hold` or `bounce`, case-insensitive. `factor` only applies to `bounce`.
fn collision_policy(name: &str, factor: f32) -> Result<CollisionPolicy, ConfigError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "hold" => Ok(CollisionPolicy::Hold),
        "bounce" => Ok(CollisionPolicy::Bounce { factor }),
        _ => Err(ConfigError::Invalid {
            key: "COLLISION_POLICY",
            value: name.to_string(),
        }),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Degenerate configuration: {0}")]
    Degenerate(&'static str),
}
