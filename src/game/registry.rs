//! Player table: identities, colours, spawn poses and latest commands

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

use crate::world::WorldGeometry;
use crate::ws::protocol::{PlayerInfo, PlayerSnapshot};

use super::physics::VehicleState;
use super::{Command, Snapshot};

/// Authoritative state of one connected player
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub id: Uuid,
    pub vehicle: VehicleState,
    /// Assigned at spawn, never changes
    pub color: String,
    /// Reapplied every tick until replaced
    pub command: Command,
}

impl PlayerState {
    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            position: self.vehicle.position,
            heading: self.vehicle.heading,
            color: self.color.clone(),
        }
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            position: self.vehicle.position,
            heading: self.vehicle.heading,
            velocity: self.vehicle.velocity,
        }
    }
}

/// Unsynchronized player table. `SessionRegistry` wraps it in a lock; this
/// type is the only place entries are inserted or removed.
pub struct PlayerRegistry {
    players: BTreeMap<Uuid, PlayerState>,
    world: Arc<WorldGeometry>,
    rng: ChaCha8Rng,
}

impl PlayerRegistry {
    pub fn new(world: Arc<WorldGeometry>) -> Self {
        // Offset from the layout seed so spawns don't replay layout draws
        let rng = ChaCha8Rng::seed_from_u64(world.config().seed ^ 0x5eed_5eed);
        Self {
            players: BTreeMap::new(),
            world,
            rng,
        }
    }

    /// Add a player with a fresh id, random colour and a clear spawn pose
    pub fn register(&mut self) -> PlayerState {
        let pose = self.world.spawn_pose(&mut self.rng);
        let color = format!("#{:06x}", self.rng.gen_range(0..=0xff_ffffu32));

        let mut id = Uuid::new_v4();
        while self.players.contains_key(&id) {
            id = Uuid::new_v4();
        }

        let player = PlayerState {
            id,
            vehicle: VehicleState {
                position: pose.position,
                heading: pose.heading,
                velocity: 0.0,
            },
            color,
            command: Command::default(),
        };
        self.players.insert(id, player.clone());
        player
    }

    /// Remove a player. Unknown ids are a no-op returning `None`.
    pub fn unregister(&mut self, id: &Uuid) -> Option<PlayerState> {
        self.players.remove(id)
    }

    /// Overwrite the player's command. Unknown ids are dropped.
    pub fn set_command(&mut self, id: &Uuid, command: Command) -> bool {
        match self.players.get_mut(id) {
            Some(player) => {
                player.command = command.sanitized();
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub fn get(&self, id: &Uuid) -> Option<&PlayerState> {
        self.players.get(id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Public fields of everyone present
    pub fn roster(&self) -> BTreeMap<Uuid, PlayerInfo> {
        self.players.iter().map(|(id, p)| (*id, p.info())).collect()
    }

    pub fn snapshot(&self, tick: u64) -> Snapshot {
        Snapshot {
            tick,
            players: self
                .players
                .iter()
                .map(|(id, p)| (*id, p.snapshot()))
                .collect(),
        }
    }

    /// Replace every vehicle with `next(vehicle, command)`.
    ///
    /// All results are computed from the pre-tick table before any is
    /// written, so no player sees another's update from the same tick.
    pub fn advance<F>(&mut self, mut next: F)
    where
        F: FnMut(VehicleState, Command) -> VehicleState,
    {
        let updated: Vec<(Uuid, VehicleState)> = self
            .players
            .values()
            .map(|p| (p.id, next(p.vehicle, p.command)))
            .collect();

        for (id, vehicle) in updated {
            if let Some(player) = self.players.get_mut(&id) {
                player.vehicle = vehicle;
            }
        }
    }
}
