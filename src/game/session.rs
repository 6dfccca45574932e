//! Serialized session registry and event fan-out
//!
//! All registry operations take the same lock, and every broadcast is sent
//! while it is held. The order of messages on the event channel is therefore
//! the order in which the registry changed: a new connection subscribes at
//! exactly the point its roster was taken, and no snapshot ever contains a
//! half-registered or half-removed player.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::world::WorldGeometry;
use crate::ws::protocol::{PlayerInfo, ServerMsg};

use super::physics::VehicleState;
use super::{Command, PlayerRegistry, PlayerState, Snapshot};

/// Messages buffered per subscriber before it starts lagging
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// What a new connection needs to start talking to its client
pub struct Session {
    pub player: PlayerState,
    /// Everyone present at join time, including `player`
    pub roster: BTreeMap<Uuid, PlayerInfo>,
    /// Every event broadcast after the roster was taken
    pub events: broadcast::Receiver<ServerMsg>,
}

pub struct SessionRegistry {
    inner: Mutex<PlayerRegistry>,
    events_tx: broadcast::Sender<ServerMsg>,
    world: Arc<WorldGeometry>,
    player_count: AtomicUsize,
    last_tick: AtomicU64,
}

impl SessionRegistry {
    pub fn new(world: Arc<WorldGeometry>) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(PlayerRegistry::new(world.clone())),
            events_tx,
            world,
            player_count: AtomicUsize::new(0),
            last_tick: AtomicU64::new(0),
        }
    }

    pub fn world(&self) -> &Arc<WorldGeometry> {
        &self.world
    }

    /// Register a player, announce it to everyone already connected and
    /// subscribe the new connection to subsequent events.
    pub fn connect(&self) -> Session {
        let mut registry = self.inner.lock();
        let player = registry.register();

        let _ = self.events_tx.send(ServerMsg::PlayerJoined {
            id: player.id,
            position: player.vehicle.position,
            heading: player.vehicle.heading,
            color: player.color.clone(),
        });

        // Subscribed after the announcement, so the newcomer only gets it via
        // its roster
        let events = self.events_tx.subscribe();
        let roster = registry.roster();
        self.player_count.store(registry.len(), Ordering::Relaxed);

        info!(
            player_id = %player.id,
            color = %player.color,
            x = player.vehicle.position.x,
            z = player.vehicle.position.z,
            players = registry.len(),
            "Player joined"
        );

        Session {
            player,
            roster,
            events,
        }
    }

    /// Remove a player. Returns `false` and sends nothing if it was already
    /// gone, so `PlayerLeft` goes out at most once per player.
    pub fn disconnect(&self, id: Uuid) -> bool {
        let mut registry = self.inner.lock();
        if registry.unregister(&id).is_none() {
            debug!(player_id = %id, "Disconnect for unknown player ignored");
            return false;
        }

        let _ = self.events_tx.send(ServerMsg::PlayerLeft { id });
        self.player_count.store(registry.len(), Ordering::Relaxed);

        info!(player_id = %id, players = registry.len(), "Player left");
        true
    }

    /// Replace the player's buffered command. Dropped if the player is gone.
    pub fn set_command(&self, id: Uuid, command: Command) -> bool {
        self.inner.lock().set_command(&id, command)
    }

    /// Consistent copy of every player, tagged with the last completed tick
    #[cfg(test)]
    pub fn snapshot(&self) -> Snapshot {
        self.inner
            .lock()
            .snapshot(self.last_tick.load(Ordering::Relaxed))
    }

    /// Run one tick: integrate every player from the pre-tick state, write
    /// the results back and broadcast the resulting snapshot.
    pub fn advance<F>(&self, tick: u64, integrate: F) -> Snapshot
    where
        F: FnMut(VehicleState, Command) -> VehicleState,
    {
        let mut registry = self.inner.lock();
        registry.advance(integrate);

        let snapshot = registry.snapshot(tick);
        self.last_tick.store(tick, Ordering::Relaxed);
        let _ = self.events_tx.send(snapshot.to_message());
        snapshot
    }

    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    pub fn last_tick(&self) -> u64 {
        self.last_tick.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{layout, WorldConfig, WorldKind};
    use tokio::sync::broadcast::error::TryRecvError;

    fn sessions() -> SessionRegistry {
        let world = layout::generate(&WorldConfig {
            kind: WorldKind::Track,
            seed: 4,
            ..WorldConfig::default()
        });
        SessionRegistry::new(Arc::new(world))
    }

    fn drain(rx: &mut broadcast::Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(msg) => out.push(msg),
                Err(TryRecvError::Empty) => return out,
                Err(e) => panic!("unexpected receive error: {e}"),
            }
        }
    }

    #[test]
    fn join_and_leave_are_announced_exactly_once() {
        let sessions = sessions();

        let mut a = sessions.connect();
        assert_eq!(a.roster.len(), 1);
        assert!(a.roster.contains_key(&a.player.id));

        let mut b = sessions.connect();
        assert_eq!(b.roster.len(), 2);
        assert!(b.roster.contains_key(&a.player.id));
        assert!(b.roster.contains_key(&b.player.id));

        // A hears about B; B does not hear about itself
        let to_a = drain(&mut a.events);
        assert_eq!(to_a.len(), 1);
        match &to_a[0] {
            ServerMsg::PlayerJoined { id, color, .. } => {
                assert_eq!(*id, b.player.id);
                assert_eq!(*color, b.player.color);
            }
            other => panic!("expected PlayerJoined, got {other:?}"),
        }
        assert!(drain(&mut b.events).is_empty());

        assert!(sessions.disconnect(a.player.id));
        assert!(!sessions.disconnect(a.player.id));

        let to_b = drain(&mut b.events);
        let left: Vec<_> = to_b
            .iter()
            .filter(|m| matches!(m, ServerMsg::PlayerLeft { id } if *id == a.player.id))
            .collect();
        assert_eq!(left.len(), 1);
        assert_eq!(to_b.len(), 1);

        let to_a = drain(&mut a.events);
        assert_eq!(to_a.len(), 1);
        assert!(matches!(to_a[0], ServerMsg::PlayerLeft { id } if id == a.player.id));
        assert_eq!(sessions.player_count(), 1);
    }

    #[test]
    fn commands_after_disconnect_are_dropped() {
        let sessions = sessions();
        let a = sessions.connect();
        assert!(sessions.set_command(a.player.id, Command::new(1.0, 0.0)));
        sessions.disconnect(a.player.id);
        assert!(!sessions.set_command(a.player.id, Command::new(1.0, 0.0)));
        assert!(sessions.snapshot().is_empty());
    }

    #[test]
    fn advance_broadcasts_the_snapshot_it_returns() {
        let sessions = sessions();
        let mut a = sessions.connect();
        let _b = sessions.connect();
        drain(&mut a.events);

        let snapshot = sessions.advance(1, |vehicle, _| vehicle);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(sessions.last_tick(), 1);

        let received = drain(&mut a.events);
        assert_eq!(received.len(), 1);
        match &received[0] {
            ServerMsg::StateUpdate { tick, players } => {
                assert_eq!(*tick, 1);
                assert_eq!(players, &snapshot.players);
            }
            other => panic!("expected StateUpdate, got {other:?}"),
        }
    }

    #[test]
    fn concurrent_joins_and_leaves_never_tear_a_snapshot() {
        let sessions = Arc::new(sessions());
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let sessions = sessions.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let s = sessions.connect();
                        sessions.set_command(s.player.id, Command::new(1.0, 0.5));
                        sessions.disconnect(s.player.id);
                    }
                })
            })
            .collect();

        for tick in 1..=200 {
            let after = sessions.advance(tick, |vehicle, _| vehicle);
            assert!(after.players.values().all(|p| p.position.x.is_finite()));
        }

        for worker in workers {
            worker.join().unwrap();
        }
        assert!(sessions.snapshot().is_empty());
    }
}
