//! Grid pathfinding using A*.
//!
//! Four-connected moves with unit cost and a Manhattan heuristic. The search
//! is bounded by an expansion budget so that a hopeless query on a large map
//! costs a fixed amount of work and reports "no path" instead of stalling the
//! tick.
//!
//! When the requested goal sits inside a building or other blocked cell, a
//! bounded breadth-first search first moves the goal to the nearest walkable
//! cell. Units therefore walk up to structures instead of failing to path
//! into them.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use crate::config::SimConfig;
use crate::grid::CollisionGrid;
use crate::math::Cell;

/// Search limits for one path query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathBudget {
    /// Maximum A* node expansions.
    pub expansions: usize,
    /// Maximum cells visited while relocating a blocked goal.
    pub nearest_walkable: usize,
}

impl PathBudget {
    /// Budget taken from the simulation config.
    #[must_use]
    pub const fn from_config(config: &SimConfig) -> Self {
        Self {
            expansions: config.path_iteration_budget,
            nearest_walkable: config.nearest_walkable_budget,
        }
    }
}

impl Default for PathBudget {
    fn default() -> Self {
        Self {
            expansions: 3_000,
            nearest_walkable: 2_500,
        }
    }
}

/// A node in the A* open set priority queue.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct AStarNode {
    cell: Cell,
    /// g + h.
    f_score: u32,
    /// Remaining estimate; breaks f ties towards the goal.
    h_score: u32,
    /// Lower coordinates win remaining ties so searches expand identically.
    tie_breaker: u64,
}

impl Ord for AStarNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse for min-heap behavior.
        other
            .f_score
            .cmp(&self.f_score)
            .then_with(|| other.h_score.cmp(&self.h_score))
            .then_with(|| other.tie_breaker.cmp(&self.tie_breaker))
    }
}

impl PartialOrd for AStarNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[inline]
fn tie_breaker(cell: Cell) -> u64 {
    ((cell.y as u32 as u64) << 32) | (cell.x as u32 as u64)
}

/// Find a path from `start` to `goal`.
///
/// Returns the cells from `start` to the resolved goal inclusive, or `None`
/// when the goal (or its walkable replacement) cannot be reached within the
/// budget. The start cell itself may be blocked - a unit standing in a
/// footprint can still walk out of it.
#[must_use]
pub fn find_path(grid: &CollisionGrid, start: Cell, goal: Cell, budget: PathBudget) -> Option<Vec<Cell>> {
    if !grid.in_bounds(start) {
        return None;
    }

    let clamped = Cell::new(
        goal.x.clamp(0, grid.width() - 1),
        goal.y.clamp(0, grid.height() - 1),
    );
    let goal = if grid.is_walkable(clamped) {
        clamped
    } else {
        nearest_walkable(grid, clamped, budget.nearest_walkable)?
    };

    if start == goal {
        return Some(vec![start]);
    }

    astar(grid, start, goal, budget.expansions)
}

/// Bounded breadth-first search for the walkable cell closest to `origin`.
///
/// Neighbours are visited in a fixed order, so ties resolve identically on
/// every run.
#[must_use]
pub fn nearest_walkable(grid: &CollisionGrid, origin: Cell, max_visits: usize) -> Option<Cell> {
    if !grid.in_bounds(origin) {
        return None;
    }

    let mut queue = VecDeque::from([origin]);
    let mut visited = HashSet::from([origin]);

    while let Some(cell) = queue.pop_front() {
        if grid.is_walkable(cell) {
            return Some(cell);
        }
        if visited.len() >= max_visits {
            continue;
        }
        for next in cell.neighbours() {
            if grid.in_bounds(next) && visited.insert(next) {
                queue.push_back(next);
            }
        }
    }

    None
}

fn astar(grid: &CollisionGrid, start: Cell, goal: Cell, max_expansions: usize) -> Option<Vec<Cell>> {
    let mut open_set = BinaryHeap::new();
    let mut came_from: HashMap<Cell, Cell> = HashMap::new();
    let mut g_score: HashMap<Cell, u32> = HashMap::from([(start, 0)]);
    let mut closed: HashSet<Cell> = HashSet::new();
    let mut expansions = 0usize;

    open_set.push(AStarNode {
        cell: start,
        f_score: start.manhattan(goal),
        h_score: start.manhattan(goal),
        tie_breaker: tie_breaker(start),
    });

    while let Some(current) = open_set.pop() {
        if !closed.insert(current.cell) {
            continue;
        }

        if current.cell == goal {
            return Some(reconstruct_path(&came_from, goal));
        }

        expansions += 1;
        if expansions > max_expansions {
            tracing::trace!(
                start = ?start,
                goal = ?goal,
                expansions,
                "Path search budget exhausted"
            );
            return None;
        }

        let current_g = g_score.get(&current.cell).copied().unwrap_or(u32::MAX);

        for neighbour in current.cell.neighbours() {
            if closed.contains(&neighbour) || !grid.is_walkable(neighbour) {
                continue;
            }

            let tentative_g = current_g.saturating_add(1);
            let known_g = g_score.get(&neighbour).copied().unwrap_or(u32::MAX);
            if tentative_g < known_g {
                came_from.insert(neighbour, current.cell);
                g_score.insert(neighbour, tentative_g);
                let h = neighbour.manhattan(goal);
                open_set.push(AStarNode {
                    cell: neighbour,
                    f_score: tentative_g + h,
                    h_score: h,
                    tie_breaker: tie_breaker(neighbour),
                });
            }
        }
    }

    None
}

fn reconstruct_path(came_from: &HashMap<Cell, Cell>, goal: Cell) -> Vec<Cell> {
    let mut path = vec![goal];
    let mut current = goal;
    while let Some(&prev) = came_from.get(&current) {
        path.push(prev);
        current = prev;
    }
    path.reverse();
    path
}
