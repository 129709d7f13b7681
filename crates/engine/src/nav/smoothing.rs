use super::grid::{GridCell, WalkabilityOracle};

/// Greedy farthest-visible reduction: from each kept waypoint jump to the
/// farthest later waypoint reachable along a walkable straight corridor.
pub(crate) fn smooth_path(oracle: &dyn WalkabilityOracle, path: &[GridCell]) -> Vec<GridCell> {
    if path.len() <= 2 {
        return path.to_vec();
    }

    let last = path.len() - 1;
    let mut smoothed = vec![path[0]];
    let mut current = 0usize;
    while current < last {
        let mut next = current + 1;
        for candidate in (current + 2..=last).rev() {
            if has_line_of_sight(oracle, path[current], path[candidate]) {
                next = candidate;
                break;
            }
        }
        smoothed.push(path[next]);
        current = next;
    }
    smoothed
}

/// Samples the segment between cell centres at unit steps.
pub(crate) fn has_line_of_sight(oracle: &dyn WalkabilityOracle, from: GridCell, to: GridCell) -> bool {
    let dx = (i64::from(to.x) - i64::from(from.x)) as f32;
    let dy = (i64::from(to.y) - i64::from(from.y)) as f32;
    let distance = (dx * dx + dy * dy).sqrt();
    let steps = distance.ceil() as i32;
    if steps == 0 {
        return oracle.is_cell_walkable(from);
    }

    for step in 1..=steps {
        let t = step as f32 / steps as f32;
        let sample = GridCell::from_world(
            from.x as f32 + 0.5 + dx * t,
            from.y as f32 + 0.5 + dy * t,
        );
        if !oracle.is_cell_walkable(sample) {
            return false;
        }
    }
    true
}
