//! Grid pathfinding: A* over a walkability oracle, line-of-sight smoothing and a
//! short-lived result cache.

mod astar;
mod cache;
mod grid;
mod service;
mod smoothing;

pub use cache::{Clock, SystemClock};
pub use grid::{GridCell, Tilemap, TilemapError, WalkabilityOracle, Waypoint, BLOCKED_TILE_ID};
pub use service::{
    PathfindingConfig, PathfindingError, PathfindingService, DEFAULT_DIAGONAL_COST,
    DEFAULT_MAX_ITERATIONS, DEFAULT_MAX_PATH_CACHE_SIZE, DEFAULT_NEAREST_WALKABLE_RADIUS,
    DEFAULT_PATH_CACHE_TIMEOUT_MS, MAX_WORLD_COORDINATE,
};
