//! Obstacles, bounding boxes and intersection tests

use serde::{Deserialize, Serialize};

use super::WorldConfig;

/// Vehicle collision box dimensions (x, y, z). The box stays axis-aligned
/// whatever the heading.
pub const VEHICLE_WIDTH: f32 = 2.0;
pub const VEHICLE_HEIGHT: f32 = 2.0;
pub const VEHICLE_LENGTH: f32 = 4.0;

/// Point on the ground plane
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub z: f32,
}

impl Position {
    pub const ORIGIN: Self = Self { x: 0.0, z: 0.0 };

    pub fn new(x: f32, z: f32) -> Self {
        Self { x, z }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn from_center_size(center: Vec3, size: Vec3) -> Self {
        Self {
            min: Vec3::new(
                center.x - size.x / 2.0,
                center.y - size.y / 2.0,
                center.z - size.z / 2.0,
            ),
            max: Vec3::new(
                center.x + size.x / 2.0,
                center.y + size.y / 2.0,
                center.z + size.z / 2.0,
            ),
        }
    }

    /// Collision box of a vehicle standing at `position`
    pub fn vehicle_at(position: Position) -> Self {
        Self::from_center_size(
            Vec3::new(position.x, VEHICLE_HEIGHT / 2.0, position.z),
            Vec3::new(VEHICLE_WIDTH, VEHICLE_HEIGHT, VEHICLE_LENGTH),
        )
    }

    /// Inclusive test: boxes sharing a face intersect
    pub fn intersects(&self, other: &Aabb) -> bool {
        !(self.max.x < other.min.x
            || self.min.x > other.max.x
            || self.max.y < other.min.y
            || self.min.y > other.max.y
            || self.max.z < other.min.z
            || self.min.z > other.max.z)
    }
}

/// A static solid volume; `position` is its centre
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub position: Vec3,
    pub width: f32,
    pub depth: f32,
    pub height: f32,
    pub color: String,
}

impl Obstacle {
    pub fn bounds(&self) -> Aabb {
        Aabb::from_center_size(self.position, Vec3::new(self.width, self.height, self.depth))
    }
}

/// Where and facing which way a new vehicle appears
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnPose {
    pub position: Position,
    pub heading: f32,
}

/// Immutable obstacle set, built once at startup
#[derive(Debug)]
pub struct WorldGeometry {
    config: WorldConfig,
    obstacles: Vec<Obstacle>,
    bounds: Vec<Aabb>,
}

impl WorldGeometry {
    pub fn new(config: WorldConfig, obstacles: Vec<Obstacle>) -> Self {
        let bounds = obstacles.iter().map(Obstacle::bounds).collect();
        Self {
            config,
            obstacles,
            bounds,
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    pub fn intersects(&self, candidate: &Aabb) -> bool {
        self.bounds.iter().any(|b| b.intersects(candidate))
    }

    /// Whether a vehicle standing at `position` would overlap anything
    pub fn blocked(&self, position: Position) -> bool {
        self.intersects(&Aabb::vehicle_at(position))
    }
}
