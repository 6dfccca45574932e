//! Seeded world generators and spawn sampling

use std::f32::consts::TAU;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use super::geometry::{Obstacle, Position, SpawnPose, Vec3, WorldGeometry};
use super::{WorldConfig, WorldKind};

/// Wall cubes are 2 units on every side
const WALL_SIZE: f32 = 2.0;
const WALL_COLOR: &str = "#888888";
const INNER_WALL_SCALE: f32 = 0.85;
const OUTER_WALL_SCALE: f32 = 1.15;

const SPAWN_ATTEMPTS: usize = 64;

/// Build the world described by `config`. Same config, same obstacles.
pub fn generate(config: &WorldConfig) -> WorldGeometry {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

    let obstacles = match config.kind {
        WorldKind::Track => track_walls(config.track_scale, config.track_steps),
        WorldKind::City => city_buildings(config, &mut rng),
        WorldKind::Open => Vec::new(),
    };

    info!(
        kind = %config.kind,
        seed = config.seed,
        obstacles = obstacles.len(),
        "World generated"
    );

    WorldGeometry::new(config.clone(), obstacles)
}

/// Point on the figure-eight centreline at parameter `t`
pub fn lemniscate(scale: f32, t: f32) -> Position {
    let denom = 1.0 + t.sin() * t.sin();
    Position::new(scale * t.cos() / denom, scale * t.sin() * t.cos() / denom)
}

fn track_walls(scale: f32, steps: u32) -> Vec<Obstacle> {
    let mut walls = Vec::with_capacity(steps as usize * 2);
    for i in 0..steps {
        let t = i as f32 / steps as f32 * TAU;
        let center = lemniscate(scale, t);
        for factor in [INNER_WALL_SCALE, OUTER_WALL_SCALE] {
            walls.push(Obstacle {
                position: Vec3::new(center.x * factor, WALL_SIZE / 2.0, center.z * factor),
                width: WALL_SIZE,
                depth: WALL_SIZE,
                height: WALL_SIZE,
                color: WALL_COLOR.to_string(),
            });
        }
    }
    walls
}

/// Centre of grid cell `(col, row)`, grid centred on the origin
fn cell_center(config: &WorldConfig, col: u32, row: u32) -> Position {
    let x = (col as f32 - (config.city_cols as f32 - 1.0) / 2.0) * config.city_block;
    let z = (row as f32 - (config.city_rows as f32 - 1.0) / 2.0) * config.city_block;
    Position::new(x, z)
}

fn city_buildings(config: &WorldConfig, rng: &mut ChaCha8Rng) -> Vec<Obstacle> {
    let mut buildings = Vec::with_capacity((config.city_cols * config.city_rows) as usize);
    for row in 0..config.city_rows {
        for col in 0..config.city_cols {
            let center = cell_center(config, col, row);
            let width = config.city_block * rng.gen_range(0.4..0.7);
            let depth = config.city_block * rng.gen_range(0.4..0.7);
            let height: f32 = rng.gen_range(8.0..40.0);
            let shade: u8 = rng.gen_range(0x60..0xc0);
            buildings.push(Obstacle {
                position: Vec3::new(center.x, height / 2.0, center.z),
                width,
                depth,
                height,
                color: format!("#{shade:02x}{shade:02x}{shade:02x}"),
            });
        }
    }
    buildings
}

/// Coordinate of the `i`-th road line along an axis with `cells` cells
fn road_line(cells: u32, block: f32, i: u32) -> f32 {
    (i as f32 - cells as f32 / 2.0) * block
}

impl WorldGeometry {
    /// Pick a pose whose vehicle box is clear of every obstacle
    pub fn spawn_pose<R: Rng>(&self, rng: &mut R) -> SpawnPose {
        let mut last = None;
        for _ in 0..SPAWN_ATTEMPTS {
            let pose = self.spawn_candidate(rng);
            if !self.blocked(pose.position) {
                return pose;
            }
            last = Some(pose);
        }

        if let Some(pose) = self.scan_for_clear_pose() {
            return pose;
        }

        let pose = last.unwrap_or(SpawnPose {
            position: Position::ORIGIN,
            heading: 0.0,
        });
        warn!(
            x = pose.position.x,
            z = pose.position.z,
            "No clear spawn point found, spawning inside geometry"
        );
        pose
    }

    fn spawn_candidate<R: Rng>(&self, rng: &mut R) -> SpawnPose {
        let config = self.config();
        match config.kind {
            WorldKind::Track => {
                let t = rng.gen_range(0.0..TAU);
                track_pose(config.track_scale, t)
            }
            WorldKind::City => {
                let along_x = rng.gen_bool(0.5);
                let width = config.city_cols as f32 * config.city_block;
                let depth = config.city_rows as f32 * config.city_block;
                if along_x {
                    // Horizontal road: fixed z, drive along x
                    let row = rng.gen_range(0..=config.city_rows);
                    let line = road_line(config.city_rows, config.city_block, row);
                    let x = rng.gen_range(-width / 2.0..=width / 2.0);
                    let heading = if rng.gen_bool(0.5) { TAU / 4.0 } else { -TAU / 4.0 };
                    SpawnPose {
                        position: Position::new(x, line),
                        heading,
                    }
                } else {
                    let col = rng.gen_range(0..=config.city_cols);
                    let line = road_line(config.city_cols, config.city_block, col);
                    let z = rng.gen_range(-depth / 2.0..=depth / 2.0);
                    let heading = if rng.gen_bool(0.5) { 0.0 } else { TAU / 2.0 };
                    SpawnPose {
                        position: Position::new(line, z),
                        heading,
                    }
                }
            }
            WorldKind::Open => {
                let half = config.open_half_extent;
                SpawnPose {
                    position: Position::new(
                        rng.gen_range(-half..=half),
                        rng.gen_range(-half..=half),
                    ),
                    heading: rng.gen_range(0.0..TAU),
                }
            }
        }
    }

    /// Deterministic fallback when random sampling keeps hitting geometry
    fn scan_for_clear_pose(&self) -> Option<SpawnPose> {
        let config = self.config();
        match config.kind {
            WorldKind::Track => {
                let steps = config.track_steps * 2;
                (0..steps)
                    .map(|i| track_pose(config.track_scale, (i as f32 + 0.5) / steps as f32 * TAU))
                    .find(|pose| !self.blocked(pose.position))
            }
            WorldKind::City => (0..=config.city_rows)
                .flat_map(|row| (0..=config.city_cols).map(move |col| (col, row)))
                .map(|(col, row)| SpawnPose {
                    position: Position::new(
                        road_line(config.city_cols, config.city_block, col),
                        road_line(config.city_rows, config.city_block, row),
                    ),
                    heading: 0.0,
                })
                .find(|pose| !self.blocked(pose.position)),
            WorldKind::Open => Some(SpawnPose {
                position: Position::ORIGIN,
                heading: 0.0,
            }),
        }
    }
}

/// Pose on the centreline at `t`, facing along the track
fn track_pose(scale: f32, t: f32) -> SpawnPose {
    let position = lemniscate(scale, t);
    let ahead = lemniscate(scale, t + 1e-3);
    // Forward is (sin h, cos h)
    let heading = (ahead.x - position.x).atan2(ahead.z - position.z);
    SpawnPose { position, heading }
}
