//! Per-tick snapshots of authoritative state

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::ws::protocol::{PlayerSnapshot, ServerMsg};

/// Every active player's observable state at one tick boundary. Built fresh
/// each tick and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub tick: u64,
    pub players: BTreeMap<Uuid, PlayerSnapshot>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.players.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, id: &Uuid) -> Option<&PlayerSnapshot> {
        self.players.get(id)
    }

    /// Build the broadcast message for this snapshot
    pub fn to_message(&self) -> ServerMsg {
        ServerMsg::StateUpdate {
            tick: self.tick,
            players: self.players.clone(),
        }
    }
}
