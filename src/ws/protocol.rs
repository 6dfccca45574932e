//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::Command;
use crate::world::{Obstacle, Position, WorldKind};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Analog controls
    Input {
        /// Throttle input (-1.0 = full reverse, 1.0 = full forward)
        #[serde(default)]
        throttle: f32,
        /// Turn input (-1.0 = full right, 1.0 = full left)
        #[serde(default)]
        turn: f32,
    },

    /// Digital controls, one flag per arrow/WASD key
    Keys {
        #[serde(default)]
        up: bool,
        #[serde(default)]
        down: bool,
        #[serde(default)]
        left: bool,
        #[serde(default)]
        right: bool,
    },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

impl ClientMsg {
    /// The command this message carries, if it is an input message
    pub fn command(&self) -> Option<Command> {
        match *self {
            Self::Input { throttle, turn } => Some(Command::new(throttle, turn).sanitized()),
            Self::Keys {
                up,
                down,
                left,
                right,
            } => Some(Command::from_keys(up, down, left, right)),
            Self::Ping { .. } => None,
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Static obstacle set, sent once per connection before `Join`
    WorldGeometry {
        kind: WorldKind,
        seed: u64,
        obstacles: Vec<Obstacle>,
    },

    /// Sent to a new connection only: its own id and everyone present
    Join {
        self_id: Uuid,
        roster: BTreeMap<Uuid, PlayerInfo>,
    },

    /// Another player connected
    PlayerJoined {
        id: Uuid,
        position: Position,
        heading: f32,
        color: String,
    },

    /// Authoritative state, once per tick
    StateUpdate {
        /// Server tick number
        tick: u64,
        players: BTreeMap<Uuid, PlayerSnapshot>,
    },

    /// A player disconnected
    PlayerLeft {
        id: Uuid,
    },

    /// Error message
    Error {
        code: String,
        message: String,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Public fields of a player, as shown on join
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub position: Position,
    /// Heading in radians
    pub heading: f32,
    /// Display colour, `#rrggbb`
    pub color: String,
}

/// Player state in a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub position: Position,
    pub heading: f32,
    /// Signed speed along the heading
    pub velocity: f32,
}
