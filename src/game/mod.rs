//! Game simulation modules

pub mod physics;
pub mod registry;
pub mod session;
pub mod snapshot;
pub mod tick;

pub use registry::{PlayerRegistry, PlayerState};
pub use session::{Session, SessionRegistry};
pub use snapshot::Snapshot;
pub use tick::SimulationLoop;

/// Latest input intent for one player. Held until a newer one arrives; the
/// tick loop reads it without clearing it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Command {
    /// -1.0 = full reverse, 1.0 = full forward
    pub throttle: f32,
    /// -1.0 = full right, 1.0 = full left
    pub turn: f32,
}

impl Command {
    pub fn new(throttle: f32, turn: f32) -> Self {
        Self { throttle, turn }
    }

    /// Digital controls. When both keys of a pair are held, `down` and
    /// `right` win.
    pub fn from_keys(up: bool, down: bool, left: bool, right: bool) -> Self {
        let throttle = if down {
            -1.0
        } else if up {
            1.0
        } else {
            0.0
        };
        let turn = if right {
            -1.0
        } else if left {
            1.0
        } else {
            0.0
        };
        Self { throttle, turn }
    }

    /// Clamp to `[-1, 1]`; non-finite values become 0
    pub fn sanitized(self) -> Self {
        let clamp = |v: f32| if v.is_finite() { v.clamp(-1.0, 1.0) } else { 0.0 };
        Self {
            throttle: clamp(self.throttle),
            turn: clamp(self.turn),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_map_to_unit_inputs() {
        assert_eq!(Command::from_keys(true, false, false, false), Command::new(1.0, 0.0));
        assert_eq!(Command::from_keys(false, true, true, false), Command::new(-1.0, 1.0));
        assert_eq!(Command::from_keys(false, false, false, true), Command::new(0.0, -1.0));
        assert_eq!(Command::from_keys(false, false, false, false), Command::default());
    }

    #[test]
    fn opposing_keys_resolve_to_down_and_right() {
        assert_eq!(Command::from_keys(true, true, true, true), Command::new(-1.0, -1.0));
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        assert_eq!(Command::new(5.0, -3.0).sanitized(), Command::new(1.0, -1.0));
        assert_eq!(Command::new(f32::NAN, f32::NEG_INFINITY).sanitized(), Command::default());
        assert_eq!(Command::new(0.25, -0.5).sanitized(), Command::new(0.25, -0.5));
    }
}
