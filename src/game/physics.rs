//! Vehicle integration and obstacle response

use crate::world::{Aabb, Position, WorldGeometry};

use super::Command;

/// Vehicle tuning. Every value is per tick: the integrator never looks at
/// wall-clock time, so a tick always advances the same amount.
#[derive(Debug, Clone, Copy)]
pub struct VehicleParams {
    /// Radians of heading change per tick at full turn input
    pub turn_rate: f32,
    /// Speed gained per tick at full throttle
    pub acceleration: f32,
    /// Speed cap in world units per tick, both directions
    pub max_speed: f32,
    /// Multiplier applied to speed every tick
    pub friction: f32,
}

impl Default for VehicleParams {
    fn default() -> Self {
        Self {
            turn_rate: 0.05,
            acceleration: 0.05,
            max_speed: 0.5,
            friction: 0.95,
        }
    }
}

/// Response when the next position would overlap an obstacle
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum CollisionPolicy {
    /// Stay at the previous position; speed is kept as computed
    #[default]
    Hold,
    /// Push back by `factor` of the rejected displacement. The corrected
    /// position is not re-tested, so a vehicle may end a tick overlapping a
    /// corner; the next tick's motion moves it out.
    Bounce { factor: f32 },
}

/// The part of a player the integrator reads and writes
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VehicleState {
    pub position: Position,
    /// Radians; forward is `(sin heading, cos heading)` in the x/z plane
    pub heading: f32,
    /// Signed speed along the heading
    pub velocity: f32,
}

/// Advance one vehicle by one tick.
///
/// Rotation is applied before translation, so the move uses the updated
/// heading. Total for any input: commands are sanitized and non-finite state
/// is reset before use.
pub fn step(
    state: VehicleState,
    command: Command,
    world: &WorldGeometry,
    params: &VehicleParams,
    policy: CollisionPolicy,
) -> VehicleState {
    let command = command.sanitized();
    let state = state.sanitized();

    let heading = state.heading + command.turn * params.turn_rate;

    let velocity = (state.velocity + command.throttle * params.acceleration)
        .clamp(-params.max_speed, params.max_speed)
        * params.friction;

    let candidate = Position::new(
        state.position.x + heading.sin() * velocity,
        state.position.z + heading.cos() * velocity,
    );

    let position = if world.intersects(&Aabb::vehicle_at(candidate)) {
        resolve_collision(state.position, candidate, policy)
    } else {
        candidate
    };

    VehicleState {
        position,
        heading,
        velocity,
    }
}

fn resolve_collision(previous: Position, candidate: Position, policy: CollisionPolicy) -> Position {
    match policy {
        CollisionPolicy::Hold => previous,
        CollisionPolicy::Bounce { factor } => Position::new(
            previous.x - (candidate.x - previous.x) * factor,
            previous.z - (candidate.z - previous.z) * factor,
        ),
    }
}

impl VehicleState {
    fn sanitized(self) -> Self {
        let finite = |v: f32| if v.is_finite() { v } else { 0.0 };
        Self {
            position: Position::new(finite(self.position.x), finite(self.position.z)),
            heading: finite(self.heading),
            velocity: finite(self.velocity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{Obstacle, Vec3, WorldConfig};

    fn open_world() -> WorldGeometry {
        WorldGeometry::new(WorldConfig::default(), Vec::new())
    }

    /// One 2x2x2 block centred at z = 10 on the x = 0 line
    fn wall_ahead() -> WorldGeometry {
        WorldGeometry::new(
            WorldConfig::default(),
            vec![Obstacle {
                position: Vec3::new(0.0, 1.0, 10.0),
                width: 2.0,
                depth: 2.0,
                height: 2.0,
                color: "#888888".to_string(),
            }],
        )
    }

    /// Constant speed, no friction: makes positions exact
    fn coasting() -> VehicleParams {
        VehicleParams {
            turn_rate: 0.05,
            acceleration: 0.0,
            max_speed: 10.0,
            friction: 1.0,
        }
    }

    fn at(z: f32, velocity: f32) -> VehicleState {
        VehicleState {
            position: Position::new(0.0, z),
            heading: 0.0,
            velocity,
        }
    }

    #[test]
    fn throttle_moves_forward_along_heading() {
        let params = VehicleParams::default();
        let next = step(
            VehicleState::default(),
            Command::new(1.0, 0.0),
            &open_world(),
            &params,
            CollisionPolicy::Hold,
        );
        let expected_speed = 0.05 * 0.95;
        assert_eq!(next.velocity, expected_speed);
        assert_eq!(next.position.x, 0.0);
        assert_eq!(next.position.z, expected_speed);
    }

    #[test]
    fn rotation_is_applied_before_translation() {
        let params = coasting();
        let next = step(
            at(0.0, 1.0),
            Command::new(0.0, 1.0),
            &open_world(),
            &params,
            CollisionPolicy::Hold,
        );
        assert_eq!(next.heading, 0.05);
        assert_eq!(next.position.x, 0.05f32.sin());
        assert_eq!(next.position.z, 0.05f32.cos());
    }

    #[test]
    fn speed_never_exceeds_max() {
        let params = VehicleParams::default();
        let world = open_world();
        let mut forward = VehicleState::default();
        let mut backward = VehicleState::default();
        for _ in 0..1_000 {
            let policy = CollisionPolicy::Hold;
            forward = step(forward, Command::new(1.0, 0.0), &world, &params, policy);
            backward = step(backward, Command::new(-1.0, 0.3), &world, &params, policy);
            assert!(forward.velocity.abs() <= params.max_speed);
            assert!(backward.velocity.abs() <= params.max_speed);
        }
        assert!(forward.velocity > 0.0);
        assert!(backward.velocity < 0.0);
    }

    #[test]
    fn friction_decays_speed_without_input() {
        let params = VehicleParams::default();
        let policy = CollisionPolicy::Hold;
        let next = step(at(0.0, 0.4), Command::default(), &open_world(), &params, policy);
        assert_eq!(next.velocity, 0.4 * 0.95);
    }

    #[test]
    fn hold_keeps_prior_position_on_contact() {
        let world = wall_ahead();
        // Candidate z = 7.5 puts the vehicle front at 9.5, inside the wall
        let policy = CollisionPolicy::Hold;
        let next = step(at(6.5, 1.0), Command::default(), &world, &coasting(), policy);
        assert_eq!(next.position, Position::new(0.0, 6.5));
        assert_ne!(next.position, Position::new(0.0, 7.5));
        assert_eq!(next.velocity, 1.0);
    }

    #[test]
    fn bounce_pushes_back_by_factor() {
        let world = wall_ahead();
        let next = step(
            at(6.5, 1.0),
            Command::default(),
            &world,
            &coasting(),
            CollisionPolicy::Bounce { factor: 0.5 },
        );
        assert_eq!(next.position, Position::new(0.0, 6.0));
    }

    #[test]
    fn clear_path_is_not_affected_by_policy() {
        let world = wall_ahead();
        // Candidate z = 5.5 leaves the front at 7.5, short of the wall at 9
        let policy = CollisionPolicy::Hold;
        let next = step(at(4.5, 1.0), Command::default(), &world, &coasting(), policy);
        assert_eq!(next.position, Position::new(0.0, 5.5));
    }

    #[test]
    fn same_inputs_give_identical_results() {
        let params = VehicleParams::default();
        let world = wall_ahead();
        let commands = [
            Command::new(1.0, 0.0),
            Command::new(1.0, 1.0),
            Command::new(-0.5, -1.0),
            Command::new(0.2, 0.7),
        ];
        let run = || {
            let mut state = at(-20.0, 0.0);
            for i in 0..500 {
                let command = commands[i % commands.len()];
                state = step(state, command, &world, &params, CollisionPolicy::Hold);
            }
            state
        };
        let a = run();
        let b = run();
        assert_eq!(a.position.x.to_bits(), b.position.x.to_bits());
        assert_eq!(a.position.z.to_bits(), b.position.z.to_bits());
        assert_eq!(a.heading.to_bits(), b.heading.to_bits());
        assert_eq!(a.velocity.to_bits(), b.velocity.to_bits());
    }

    #[test]
    fn non_finite_inputs_are_neutralized() {
        let params = VehicleParams::default();
        let state = VehicleState {
            position: Position::new(f32::NAN, 1.0),
            heading: f32::INFINITY,
            velocity: f32::NAN,
        };
        let command = Command::new(f32::NAN, f32::INFINITY);
        let next = step(state, command, &open_world(), &params, CollisionPolicy::Hold);
        assert!(next.position.x.is_finite());
        assert!(next.position.z.is_finite());
        assert!(next.heading.is_finite());
        assert!(next.velocity.is_finite());
    }
}
