use std::collections::{HashMap, HashSet};

use super::grid::{GridCell, WalkabilityOracle};

const ORTHOGONAL_MOVE_COST: f32 = 1.0;

/// Neighbour order is part of the search contract: together with the
/// first-minimum open-set scan it fixes which of several equal-cost paths wins.
const NEIGHBOR_OFFSETS: [(i32, i32); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

#[derive(Debug, Clone, Copy)]
pub(crate) struct SearchLimits {
    pub max_iterations: usize,
    pub diagonal_cost: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SearchOutcome {
    Found(Vec<GridCell>),
    /// The open set drained without reaching the goal.
    Unreachable,
    /// The iteration budget ran out first.
    Exhausted { iterations: usize },
}

#[derive(Debug, Clone, Copy)]
struct OpenNode {
    cell: GridCell,
    g_cost: f32,
    f_cost: f32,
}

pub(crate) fn find_cell_path(
    oracle: &dyn WalkabilityOracle,
    start: GridCell,
    goal: GridCell,
    limits: SearchLimits,
) -> SearchOutcome {
    if start == goal {
        return SearchOutcome::Found(vec![start]);
    }

    let mut open = vec![OpenNode {
        cell: start,
        g_cost: 0.0,
        f_cost: start.euclidean_distance(goal),
    }];
    let mut open_cells = HashSet::from([start]);
    let mut closed = HashSet::<GridCell>::new();
    let mut parent = HashMap::<GridCell, GridCell>::new();
    let mut iterations = 0usize;

    while !open.is_empty() {
        if iterations >= limits.max_iterations {
            return SearchOutcome::Exhausted { iterations };
        }
        iterations += 1;

        // `remove` (not `swap_remove`) keeps the remaining nodes in insertion order.
        let current = open.remove(pick_lowest_f_index(&open));
        open_cells.remove(&current.cell);

        if current.cell == goal {
            return SearchOutcome::Found(reconstruct_path(&parent, start, goal));
        }
        closed.insert(current.cell);

        for (dx, dy) in NEIGHBOR_OFFSETS {
            let neighbor = current.cell.offset(dx, dy);
            if closed.contains(&neighbor) || !oracle.is_cell_walkable(neighbor) {
                continue;
            }

            let diagonal = dx != 0 && dy != 0;
            if diagonal && cuts_corner(oracle, current.cell, dx, dy) {
                continue;
            }

            let step_cost = if diagonal {
                limits.diagonal_cost
            } else {
                ORTHOGONAL_MOVE_COST
            };
            let tentative_g = current.g_cost + step_cost;

            if open_cells.contains(&neighbor) {
                let Some(existing) = open.iter_mut().find(|node| node.cell == neighbor) else {
                    continue;
                };
                if tentative_g >= existing.g_cost {
                    continue;
                }
                existing.g_cost = tentative_g;
                existing.f_cost = tentative_g + neighbor.euclidean_distance(goal);
                parent.insert(neighbor, current.cell);
                continue;
            }

            parent.insert(neighbor, current.cell);
            open.push(OpenNode {
                cell: neighbor,
                g_cost: tentative_g,
                f_cost: tentative_g + neighbor.euclidean_distance(goal),
            });
            open_cells.insert(neighbor);
        }
    }

    SearchOutcome::Unreachable
}

/// A diagonal step is only legal when both orthogonal cells it slips between are open.
fn cuts_corner(oracle: &dyn WalkabilityOracle, from: GridCell, dx: i32, dy: i32) -> bool {
    !oracle.is_cell_walkable(from.offset(dx, 0)) || !oracle.is_cell_walkable(from.offset(0, dy))
}

fn pick_lowest_f_index(open: &[OpenNode]) -> usize {
    let mut best_index = 0usize;
    for index in 1..open.len() {
        if open[index].f_cost < open[best_index].f_cost {
            best_index = index;
        }
    }
    best_index
}

fn reconstruct_path(
    parent: &HashMap<GridCell, GridCell>,
    start: GridCell,
    goal: GridCell,
) -> Vec<GridCell> {
    let mut cursor = goal;
    let mut cells = vec![cursor];
    while cursor != start {
        match parent.get(&cursor) {
            Some(previous) => {
                cursor = *previous;
                cells.push(cursor);
            }
            None => break,
        }
    }
    cells.reverse();
    cells
}
