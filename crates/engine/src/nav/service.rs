use std::f32::consts::PI;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::astar::{find_cell_path, SearchLimits, SearchOutcome};
use super::cache::{Clock, PathCache, PathKey, SystemClock};
use super::grid::{GridCell, WalkabilityOracle, Waypoint};
use super::smoothing::smooth_path;

pub const DEFAULT_MAX_ITERATIONS: usize = 2000;
pub const DEFAULT_PATH_CACHE_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_MAX_PATH_CACHE_SIZE: usize = 100;
pub const DEFAULT_DIAGONAL_COST: f32 = 1.414;
pub const DEFAULT_NEAREST_WALKABLE_RADIUS: i32 = 10;
/// Largest accepted endpoint magnitude, in world units.
pub const MAX_WORLD_COORDINATE: f32 = 1.0e6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathfindingConfig {
    pub max_iterations: usize,
    pub cache_timeout_ms: u64,
    pub max_cache_size: usize,
    pub diagonal_cost: f32,
    pub nearest_walkable_radius: i32,
}

impl Default for PathfindingConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            cache_timeout_ms: DEFAULT_PATH_CACHE_TIMEOUT_MS,
            max_cache_size: DEFAULT_MAX_PATH_CACHE_SIZE,
            diagonal_cost: DEFAULT_DIAGONAL_COST,
            nearest_walkable_radius: DEFAULT_NEAREST_WALKABLE_RADIUS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PathfindingError {
    #[error("no map provider registered; call set_map_provider before find_path")]
    MapProviderMissing,
    #[error("path endpoint ({x}, {y}) is not a finite coordinate")]
    NonFiniteCoordinate { x: f32, y: f32 },
    #[error("path endpoint ({x}, {y}) is outside the supported range of +/-{limit}")]
    CoordinateOutOfRange { x: f32, y: f32, limit: f32 },
}

/// Grid A* over a caller-supplied walkability oracle, with a short-lived result cache.
///
/// The service cannot observe map edits; owners call [`PathfindingService::clear_cache`]
/// whenever walkability changes.
pub struct PathfindingService {
    config: PathfindingConfig,
    oracle: Option<Box<dyn WalkabilityOracle>>,
    cache: PathCache,
    clock: Box<dyn Clock>,
}

impl Default for PathfindingService {
    fn default() -> Self {
        Self::new(PathfindingConfig::default())
    }
}

impl PathfindingService {
    pub fn new(config: PathfindingConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }

    pub fn with_clock(config: PathfindingConfig, clock: impl Clock + 'static) -> Self {
        let cache = PathCache::new(
            Duration::from_millis(config.cache_timeout_ms),
            config.max_cache_size,
        );
        Self {
            config,
            oracle: None,
            cache,
            clock: Box::new(clock),
        }
    }

    pub fn config(&self) -> &PathfindingConfig {
        &self.config
    }

    /// Replaces the oracle and drops every cached path computed against the old one.
    pub fn set_map_provider(&mut self, oracle: impl WalkabilityOracle + 'static) {
        self.oracle = Some(Box::new(oracle));
        self.cache.clear();
    }

    pub fn has_map_provider(&self) -> bool {
        self.oracle.is_some()
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn cached_path_count(&self) -> usize {
        self.cache.len()
    }

    /// `Ok(None)` means the target is unreachable (or the search budget ran out);
    /// callers stop or retry on a later tick.
    pub fn find_path(
        &mut self,
        start_x: f32,
        start_y: f32,
        end_x: f32,
        end_y: f32,
        smooth: bool,
    ) -> Result<Option<Vec<Waypoint>>, PathfindingError> {
        let Some(oracle) = self.oracle.as_deref() else {
            return Err(PathfindingError::MapProviderMissing);
        };
        for (x, y) in [(start_x, start_y), (end_x, end_y)] {
            if !x.is_finite() || !y.is_finite() {
                return Err(PathfindingError::NonFiniteCoordinate { x, y });
            }
            if x.abs() > MAX_WORLD_COORDINATE || y.abs() > MAX_WORLD_COORDINATE {
                return Err(PathfindingError::CoordinateOutOfRange {
                    x,
                    y,
                    limit: MAX_WORLD_COORDINATE,
                });
            }
        }

        let start = GridCell::from_world(start_x, start_y);
        let requested_end = GridCell::from_world(end_x, end_y);
        let key = PathKey {
            start,
            end: requested_end,
            smoothed: smooth,
        };
        let now = self.clock.now();
        if let Some(path) = self.cache.get(&key, now) {
            debug!(key = %key, waypoints = path.len(), "path_cache_hit");
            return Ok(Some(path));
        }

        let end = if oracle.is_cell_walkable(requested_end) {
            requested_end
        } else {
            match nearest_walkable_cell(oracle, requested_end, self.config.nearest_walkable_radius)
            {
                Some(substitute) => {
                    debug!(requested = %requested_end, substitute = %substitute, "path_goal_substituted");
                    substitute
                }
                None => {
                    debug!(requested = %requested_end, "path_goal_unwalkable");
                    return Ok(None);
                }
            }
        };

        let limits = SearchLimits {
            max_iterations: self.config.max_iterations,
            diagonal_cost: self.config.diagonal_cost,
        };
        let raw = match find_cell_path(oracle, start, end, limits) {
            SearchOutcome::Found(path) => path,
            SearchOutcome::Unreachable => {
                debug!(start = %start, end = %end, "path_unreachable");
                return Ok(None);
            }
            SearchOutcome::Exhausted { iterations } => {
                warn!(start = %start, end = %end, iterations, "path_search_exhausted");
                return Ok(None);
            }
        };

        let path = if smooth {
            smooth_path(oracle, &raw)
        } else {
            raw
        };
        self.cache.insert(key, &path, now);
        debug!(key = %key, waypoints = path.len(), "path_computed");
        Ok(Some(path))
    }
}

/// Expanding-ring search around `target`; radius `r` is sampled every `π / (4r)` radians.
fn nearest_walkable_cell(
    oracle: &dyn WalkabilityOracle,
    target: GridCell,
    max_radius: i32,
) -> Option<GridCell> {
    for radius in 1..=max_radius {
        let samples = 8 * radius;
        let step = PI / (4.0 * radius as f32);
        for sample in 0..samples {
            let angle = sample as f32 * step;
            let candidate = GridCell::new(
                (target.x as f32 + angle.cos() * radius as f32).round() as i32,
                (target.y as f32 + angle.sin() * radius as f32).round() as i32,
            );
            if oracle.is_cell_walkable(candidate) {
                return Some(candidate);
            }
        }
    }
    None
}
