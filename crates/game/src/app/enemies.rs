use std::collections::BTreeMap;
use std::fmt;

use cyberops_engine::{PathfindingError, PathfindingService, Waypoint};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub(crate) struct EnemyId(pub(crate) u64);

impl fmt::Display for EnemyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "enemy#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub(crate) struct WorldPos {
    pub(crate) x: f32,
    pub(crate) y: f32,
}

impl WorldPos {
    pub(crate) const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub(crate) fn distance_to(self, other: WorldPos) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Centre of a grid cell.
    pub(crate) fn of_cell(cell: Waypoint) -> Self {
        Self {
            x: cell.x as f32 + 0.5,
            y: cell.y as f32 + 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Enemy {
    pub(crate) id: EnemyId,
    pub(crate) kind: String,
    pub(crate) position: WorldPos,
    pub(crate) health: i32,
    pub(crate) speed: f32,
    route: Vec<Waypoint>,
}

impl Enemy {
    pub(crate) fn is_alive(&self) -> bool {
        self.health > 0
    }

    pub(crate) fn route(&self) -> &[Waypoint] {
        &self.route
    }
}

/// Enemy lifecycle plus the spatial queries mission code needs.
#[derive(Debug, Default)]
pub(crate) struct EnemyService {
    enemies: BTreeMap<EnemyId, Enemy>,
    next_id: u64,
}

impl EnemyService {
    pub(crate) fn spawn(&mut self, kind: &str, position: WorldPos, health: i32, speed: f32) -> EnemyId {
        self.next_id += 1;
        let id = EnemyId(self.next_id);
        self.enemies.insert(
            id,
            Enemy {
                id,
                kind: kind.to_string(),
                position,
                health,
                speed: speed.max(0.0),
                route: Vec::new(),
            },
        );
        debug!(enemy = %id, kind, x = position.x, y = position.y, "enemy_spawned");
        id
    }

    pub(crate) fn get(&self, id: EnemyId) -> Option<&Enemy> {
        self.enemies.get(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.enemies.len()
    }

    pub(crate) fn set_health(&mut self, id: EnemyId, health: i32) -> bool {
        match self.enemies.get_mut(&id) {
            Some(enemy) => {
                enemy.health = health;
                true
            }
            None => false,
        }
    }

    pub(crate) fn despawn(&mut self, id: EnemyId) -> bool {
        let removed = self.enemies.remove(&id).is_some();
        if removed {
            debug!(enemy = %id, "enemy_despawned");
        }
        removed
    }

    pub(crate) fn clear(&mut self) {
        self.enemies.clear();
    }

    pub(crate) fn alive(&self) -> impl Iterator<Item = &Enemy> {
        self.enemies.values().filter(|enemy| enemy.is_alive())
    }

    /// Living enemies within `radius` of `center`, nearest first.
    pub(crate) fn within_radius(&self, center: WorldPos, radius: f32) -> Vec<EnemyId> {
        let mut hits = self
            .alive()
            .map(|enemy| (enemy.position.distance_to(center), enemy.id))
            .filter(|(distance, _)| *distance <= radius)
            .collect::<Vec<_>>();
        hits.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        hits.into_iter().map(|(_, id)| id).collect()
    }

    pub(crate) fn nearest_to(&self, center: WorldPos) -> Option<EnemyId> {
        self.alive()
            .map(|enemy| (enemy.position.distance_to(center), enemy.id))
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
            .map(|(_, id)| id)
    }

    /// Stores a smoothed route toward `target`. `Ok(false)` when no route exists.
    pub(crate) fn plan_route(
        &mut self,
        id: EnemyId,
        target: WorldPos,
        pathfinder: &mut PathfindingService,
    ) -> Result<bool, PathfindingError> {
        let Some(enemy) = self.enemies.get_mut(&id) else {
            return Ok(false);
        };
        let path = pathfinder.find_path(
            enemy.position.x,
            enemy.position.y,
            target.x,
            target.y,
            true,
        )?;
        match path {
            Some(mut route) => {
                if !route.is_empty() {
                    route.remove(0);
                }
                debug!(enemy = %id, waypoints = route.len(), "enemy_route_planned");
                enemy.route = route;
                Ok(true)
            }
            None => {
                enemy.route.clear();
                Ok(false)
            }
        }
    }

    /// Moves every living enemy along its route for `dt_seconds`.
    pub(crate) fn advance(&mut self, dt_seconds: f32) {
        for enemy in self.enemies.values_mut().filter(|enemy| enemy.is_alive()) {
            let budget = enemy.speed * dt_seconds.max(0.0);
            step_along(&mut enemy.position, &mut enemy.route, budget);
        }
    }
}

/// Walks `position` toward successive cell centres of `route`, consuming reached cells.
pub(crate) fn step_along(position: &mut WorldPos, route: &mut Vec<Waypoint>, mut budget: f32) {
    while budget > 0.0 {
        let Some(next) = route.first().copied() else {
            break;
        };
        let goal = WorldPos::of_cell(next);
        let distance = position.distance_to(goal);
        if distance <= budget {
            *position = goal;
            route.remove(0);
            budget -= distance;
        } else {
            let t = budget / distance;
            *position = WorldPos::new(
                position.x + (goal.x - position.x) * t,
                position.y + (goal.y - position.y) * t,
            );
            budget = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use cyberops_engine::{PathfindingConfig, Tilemap};

    use super::*;

    fn open_pathfinder() -> PathfindingService {
        let mut pathfinder = PathfindingService::new(PathfindingConfig::default());
        pathfinder.set_map_provider(Tilemap::open(12, 12));
        pathfinder
    }

    #[test]
    fn spawn_assigns_increasing_ids_and_despawn_removes() {
        let mut enemies = EnemyService::default();
        let a = enemies.spawn("drone", WorldPos::new(1.0, 1.0), 10, 2.0);
        let b = enemies.spawn("guard", WorldPos::new(2.0, 1.0), 10, 2.0);
        assert!(a < b);
        assert!(enemies.despawn(a));
        assert!(!enemies.despawn(a));
        assert_eq!(enemies.len(), 1);
        assert_eq!(enemies.get(b).map(|enemy| enemy.kind.as_str()), Some("guard"));
    }

    #[test]
    fn spatial_queries_skip_the_dead() {
        let mut enemies = EnemyService::default();
        let near = enemies.spawn("drone", WorldPos::new(1.0, 0.0), 10, 1.0);
        let far = enemies.spawn("drone", WorldPos::new(5.0, 0.0), 10, 1.0);
        let dead = enemies.spawn("drone", WorldPos::new(0.5, 0.0), 10, 1.0);
        enemies.set_health(dead, 0);

        let origin = WorldPos::new(0.0, 0.0);
        assert_eq!(enemies.within_radius(origin, 6.0), vec![near, far]);
        assert_eq!(enemies.within_radius(origin, 2.0), vec![near]);
        assert_eq!(enemies.nearest_to(origin), Some(near));
        assert_eq!(enemies.alive().count(), 2);
    }

    #[test]
    fn planned_route_is_followed_to_the_target_cell() {
        let mut pathfinder = open_pathfinder();
        let mut enemies = EnemyService::default();
        let id = enemies.spawn("guard", WorldPos::new(0.5, 0.5), 10, 2.0);
        assert!(enemies
            .plan_route(id, WorldPos::new(6.5, 0.5), &mut pathfinder)
            .expect("route"));
        assert_eq!(enemies.get(id).map(|enemy| enemy.route().len()), Some(1));

        enemies.advance(1.0);
        let midway = enemies.get(id).map(|enemy| enemy.position).expect("enemy");
        assert!((midway.x - 2.5).abs() < 1e-4);

        enemies.advance(10.0);
        let arrived = enemies.get(id).expect("enemy");
        assert_eq!(arrived.position, WorldPos::new(6.5, 0.5));
        assert!(arrived.route().is_empty());
    }

    #[test]
    fn route_to_sealed_target_is_reported_missing() {
        let mut pathfinder = PathfindingService::new(PathfindingConfig::default());
        pathfinder.set_map_provider(|x: i32, y: i32| x < 3 && (0..3).contains(&y) && x >= 0);
        let mut enemies = EnemyService::default();
        let id = enemies.spawn("guard", WorldPos::new(0.5, 0.5), 10, 2.0);
        assert!(!enemies
            .plan_route(id, WorldPos::new(30.5, 30.5), &mut pathfinder)
            .expect("plan"));
        assert!(enemies.get(id).map_or(false, |enemy| enemy.route().is_empty()));
    }
}
