//! Authoritative fixed-rate tick loop

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::util::time::Timer;
use crate::world::WorldGeometry;

use super::physics::{self, CollisionPolicy, VehicleParams};
use super::{SessionRegistry, Snapshot};

/// Loop lifecycle. `Idle` only exists between construction and `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
}

pub struct SimulationLoop {
    sessions: Arc<SessionRegistry>,
    world: Arc<WorldGeometry>,
    params: VehicleParams,
    policy: CollisionPolicy,
    period: Duration,
    tick: u64,
    state: LoopState,
}

impl SimulationLoop {
    pub fn new(
        sessions: Arc<SessionRegistry>,
        params: VehicleParams,
        policy: CollisionPolicy,
        period: Duration,
    ) -> Self {
        let world = sessions.world().clone();
        Self {
            sessions,
            world,
            params,
            policy,
            period,
            tick: 0,
            state: LoopState::Idle,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> LoopState {
        self.state
    }

    #[cfg(test)]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Run one tick: integrate every player with its buffered command and
    /// broadcast the result. Commands are not consumed.
    pub fn step(&mut self) -> Snapshot {
        self.tick += 1;
        let world = &self.world;
        let params = &self.params;
        let policy = self.policy;
        self.sessions.advance(self.tick, |vehicle, command| {
            physics::step(vehicle, command, world, params, policy)
        })
    }

    /// Move to `Running` and drive ticks on a background task for the rest
    /// of the process lifetime.
    pub fn start(mut self) -> JoinHandle<()> {
        self.state = LoopState::Running;
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        info!(
            period_micros = self.period.as_micros() as u64,
            policy = ?self.policy,
            state = ?self.state,
            "Simulation loop started"
        );

        let mut tick_interval = interval(self.period);
        // An overrun delays the next tick instead of bursting to catch up
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let overrun_log_every = (1.0 / self.period.as_secs_f64()).ceil().max(1.0) as u64;
        let mut last_overrun_log: Option<u64> = None;

        loop {
            tick_interval.tick().await;

            let timer = Timer::new();
            let snapshot = self.step();
            let elapsed = timer.elapsed();

            if elapsed > self.period {
                let due = last_overrun_log.map_or(true, |t| self.tick - t >= overrun_log_every);
                if due {
                    warn!(
                        tick = self.tick,
                        elapsed_micros = elapsed.as_micros() as u64,
                        budget_micros = self.period.as_micros() as u64,
                        players = snapshot.len(),
                        "Tick overran its period"
                    );
                    last_overrun_log = Some(self.tick);
                }
            }

            if self.tick % (overrun_log_every * 60) == 0 {
                debug!(tick = self.tick, players = snapshot.len(), "Simulation heartbeat");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Command;
    use crate::world::{layout, WorldConfig, WorldKind};
    use crate::ws::protocol::ServerMsg;

    fn open_loop() -> (Arc<SessionRegistry>, SimulationLoop) {
        let world = layout::generate(&WorldConfig {
            kind: WorldKind::Open,
            seed: 2,
            ..WorldConfig::default()
        });
        let sessions = Arc::new(SessionRegistry::new(Arc::new(world)));
        let sim = SimulationLoop::new(
            sessions.clone(),
            VehicleParams::default(),
            CollisionPolicy::Hold,
            Duration::from_millis(16),
        );
        (sessions, sim)
    }

    fn distance(a: crate::world::Position, b: crate::world::Position) -> f32 {
        ((a.x - b.x).powi(2) + (a.z - b.z).powi(2)).sqrt()
    }

    #[test]
    fn ticks_neither_drop_nor_duplicate_players() {
        let (sessions, mut sim) = open_loop();
        let ids: Vec<_> = (0..5).map(|_| sessions.connect().player.id).collect();

        for _ in 0..10 {
            let before = sessions.snapshot();
            let after = sim.step();
            assert_eq!(before.len(), after.len());
            assert!(ids.iter().all(|id| after.get(id).is_some()));
        }
        assert_eq!(sim.tick(), 10);
        assert_eq!(sessions.last_tick(), 10);
    }

    #[test]
    fn last_command_keeps_applying_until_replaced() {
        let (sessions, mut sim) = open_loop();
        let session = sessions.connect();
        let id = session.player.id;
        sessions.set_command(id, Command::from_keys(true, false, false, false));

        let mut previous = sessions.snapshot().get(&id).map(|p| p.position).unwrap();
        for _ in 0..100 {
            let snapshot = sim.step();
            let current = snapshot.get(&id).unwrap().position;
            assert!(distance(previous, current) > 0.0);
            previous = current;
        }
        assert!(sessions.snapshot().get(&id).unwrap().velocity > 0.0);
    }

    #[test]
    fn released_throttle_coasts_down_under_friction() {
        let (sessions, mut sim) = open_loop();
        let id = sessions.connect().player.id;
        sessions.set_command(id, Command::new(1.0, 0.0));
        for _ in 0..20 {
            sim.step();
        }
        sessions.set_command(id, Command::default());

        let mut speed = sessions.snapshot().get(&id).unwrap().velocity;
        for _ in 0..100 {
            let next = sim.step().get(&id).unwrap().velocity;
            assert!(next < speed);
            assert!(next > 0.0);
            speed = next;
        }
    }

    #[test]
    fn each_step_broadcasts_one_state_update() {
        let (sessions, mut sim) = open_loop();
        let mut session = sessions.connect();
        sim.step();
        sim.step();

        let mut ticks = Vec::new();
        while let Ok(msg) = session.events.try_recv() {
            if let ServerMsg::StateUpdate { tick, players } = msg {
                assert!(players.contains_key(&session.player.id));
                ticks.push(tick);
            }
        }
        assert_eq!(ticks, vec![1, 2]);
    }

    #[tokio::test]
    async fn started_loop_advances_on_its_own() {
        let (sessions, sim) = open_loop();
        assert_eq!(sim.state(), LoopState::Idle);
        let handle = sim.start();

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(sessions.last_tick() >= 2);
        handle.abort();
    }
}
