use cyberops_engine::{GridCell, PathfindingError, PathfindingService, Tilemap, TilemapError};
use serde::Serialize;
use tracing::{debug, info};

use super::enemies::{step_along, EnemyId, EnemyService, WorldPos};

const MISSION_MAP_ROWS: [&str; 8] = [
    "................",
    "..####....###...",
    "..#..#....#.....",
    "..#..#....#.##..",
    ".....#......#...",
    "..####..###.#...",
    "............#...",
    "................",
];
const INSERTION: WorldPos = WorldPos::new(0.5, 0.5);
const EXTRACTION: WorldPos = WorldPos::new(15.5, 7.5);
const ENEMY_POSTS: [(f32, f32); 4] = [(7.5, 3.5), (14.5, 1.5), (9.5, 6.5), (3.5, 3.5)];
const ENEMY_HEALTH: i32 = 40;
const ENEMY_SPEED: f32 = 1.5;
const SQUAD_SPEED: f32 = 3.0;
const STEP_SECONDS: f32 = 0.25;
const MAX_STEPS: u32 = 400;
const INTERCEPT_RADIUS: f32 = 1.5;
const DAMAGE_PER_AGENT: i32 = 5;
const BASE_REWARD: i64 = 500;
const REWARD_PER_AGENT: i64 = 100;
const PENALTY_PER_INTERCEPT: i64 = 150;
const MIN_REWARD: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Difficulty {
    Easy,
    Normal,
    Hard,
}

impl Difficulty {
    pub(crate) fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "easy" => Some(Self::Easy),
            "normal" => Some(Self::Normal),
            "hard" => Some(Self::Hard),
            _ => None,
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Normal => "normal",
            Self::Hard => "hard",
        }
    }

    fn enemy_count(self) -> usize {
        match self {
            Self::Easy => 2,
            Self::Normal => 3,
            Self::Hard => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct MissionOutcome {
    pub(crate) enemies: usize,
    pub(crate) routed: usize,
    pub(crate) intercepts: usize,
    pub(crate) neutralized: usize,
    pub(crate) squad_waypoints: usize,
    pub(crate) extracted: bool,
    pub(crate) reward: i64,
}

pub(crate) fn mission_map() -> Result<Tilemap, TilemapError> {
    Tilemap::from_ascii_rows(&MISSION_MAP_ROWS)
}

/// Plays one mission to completion in fixed steps.
///
/// The squad walks a smoothed route from insertion to extraction while every enemy
/// converges on the extraction point.
pub(crate) fn run_mission(
    squad_size: usize,
    difficulty: Difficulty,
    pathfinder: &mut PathfindingService,
    enemies: &mut EnemyService,
) -> Result<MissionOutcome, String> {
    let map = mission_map().map_err(|error| format!("build mission map: {error}"))?;
    pathfinder.set_map_provider(map);
    enemies.clear();

    let squad_route = pathfinder
        .find_path(INSERTION.x, INSERTION.y, EXTRACTION.x, EXTRACTION.y, true)
        .map_err(path_error)?
        .ok_or_else(|| "no route from insertion to extraction".to_string())?;
    let squad_waypoints = squad_route.len();

    let mut routed = 0;
    for &(x, y) in ENEMY_POSTS.iter().take(difficulty.enemy_count()) {
        let id = enemies.spawn("sentry", WorldPos::new(x, y), ENEMY_HEALTH, ENEMY_SPEED);
        if enemies
            .plan_route(id, EXTRACTION, pathfinder)
            .map_err(path_error)?
        {
            routed += 1;
        }
    }

    let mut squad = INSERTION;
    let mut remaining = squad_route;
    if remaining.first().copied() == Some(GridCell::from_world(INSERTION.x, INSERTION.y)) {
        remaining.remove(0);
    }
    let spawned = enemies.len();
    let mut intercepted = Vec::new();
    let mut neutralized = Vec::new();
    let mut steps = 0;
    while !remaining.is_empty() && steps < MAX_STEPS {
        step_along(&mut squad, &mut remaining, SQUAD_SPEED * STEP_SECONDS);
        enemies.advance(STEP_SECONDS);
        for id in enemies.within_radius(squad, INTERCEPT_RADIUS) {
            if !intercepted.contains(&id) {
                debug!(enemy = %id, x = squad.x, y = squad.y, "squad_intercepted");
                intercepted.push(id);
            }
        }
        if let Some(target) = enemies
            .nearest_to(squad)
            .filter(|id| intercepted.contains(id))
        {
            if engage(enemies, target, squad_size) {
                neutralized.push(target);
            }
        }
        steps += 1;
    }
    for &id in &neutralized {
        enemies.despawn(id);
    }

    let extracted = remaining.is_empty();
    let intercepts = intercepted.len();
    let reward = if extracted {
        (BASE_REWARD + REWARD_PER_AGENT * squad_size as i64
            - PENALTY_PER_INTERCEPT * intercepts as i64)
            .max(MIN_REWARD)
    } else {
        0
    };
    info!(
        difficulty = difficulty.as_str(),
        enemies = spawned,
        routed,
        intercepts,
        neutralized = neutralized.len(),
        steps,
        extracted,
        reward,
        "mission_resolved"
    );
    Ok(MissionOutcome {
        enemies: spawned,
        routed,
        intercepts,
        neutralized: neutralized.len(),
        squad_waypoints,
        extracted,
        reward,
    })
}

/// Squad fire on one enemy. Returns true when it goes down.
fn engage(enemies: &mut EnemyService, target: EnemyId, squad_size: usize) -> bool {
    let Some(enemy) = enemies.get(target) else {
        return false;
    };
    let health = enemy.health - DAMAGE_PER_AGENT * squad_size as i32;
    enemies.set_health(target, health);
    if health > 0 {
        return false;
    }
    debug!(enemy = %target, "enemy_neutralized");
    true
}

fn path_error(error: PathfindingError) -> String {
    format!("mission pathfinding: {error}")
}

#[cfg(test)]
mod tests {
    use cyberops_engine::{PathfindingConfig, WalkabilityOracle};

    use super::*;

    #[test]
    fn mission_map_has_open_insertion_and_extraction() {
        let map = mission_map().expect("map");
        assert_eq!((map.width(), map.height()), (16, 8));
        assert!(map.is_walkable(0, 0));
        assert!(map.is_walkable(15, 7));
        assert!(!map.is_walkable(2, 1));
    }

    #[test]
    fn difficulty_parses_case_insensitively() {
        assert_eq!(Difficulty::parse(" Hard "), Some(Difficulty::Hard));
        assert_eq!(Difficulty::parse("nightmare"), None);
        assert_eq!(Difficulty::Easy.as_str(), "easy");
    }

    #[test]
    fn mission_extracts_and_spawns_per_difficulty() {
        let mut pathfinder = PathfindingService::new(PathfindingConfig::default());
        let mut enemies = EnemyService::default();

        let outcome =
            run_mission(2, Difficulty::Hard, &mut pathfinder, &mut enemies).expect("mission");
        assert!(outcome.extracted);
        assert_eq!(outcome.enemies, 4);
        assert_eq!(outcome.routed, 4);
        assert!(outcome.squad_waypoints >= 2);
        assert!(outcome.reward >= MIN_REWARD);

        let easy =
            run_mission(2, Difficulty::Easy, &mut pathfinder, &mut enemies).expect("mission");
        assert_eq!(easy.enemies, 2);
        assert!(easy.neutralized <= easy.intercepts);
        assert_eq!(enemies.len(), easy.enemies - easy.neutralized);
    }
}
