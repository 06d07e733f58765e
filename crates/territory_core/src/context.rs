//! Tick-scoped context.
//!
//! Everything a tick derives from the state before the per-entity passes
//! run (walkability, power, the spatial index) plus the tick's random
//! stream and its report. One [`TickContext`] is built per tick and passed
//! by reference to each pipeline stage.

use std::collections::HashMap;

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::components::{BuildingId, EntityId, GamePhase, PlayerId};
use crate::config::{DurationRange, SimConfig};
use crate::grid::CollisionGrid;
use crate::math::{fraction_from_bits, Cell, Fixed};
use crate::pathfinding::{find_path, PathBudget};
use crate::power::PowerGrid;
use crate::spatial::SpatialIndex;

/// A building changed hands through capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureEvent {
    /// Captured building.
    pub building_id: BuildingId,
    /// Previous owner.
    pub from: PlayerId,
    /// New owner.
    pub to: PlayerId,
}

/// A player lost their base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EliminationEvent {
    /// Eliminated player.
    pub player_id: PlayerId,
    /// Conqueror, if one could be named.
    pub by: Option<PlayerId>,
}

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tick number that was processed.
    pub tick: u64,
    /// Shots fired.
    pub shots: u32,
    /// Shots that hit.
    pub hits: u32,
    /// Units killed.
    pub kills: Vec<EntityId>,
    /// Whether any building took damage.
    pub buildings_damaged: bool,
    /// Buildings removed by the destruction sweep.
    pub destroyed_buildings: Vec<BuildingId>,
    /// Completed captures.
    pub captures: Vec<CaptureEvent>,
    /// Eliminated players.
    pub eliminations: Vec<EliminationEvent>,
    /// Units created.
    pub spawned: Vec<EntityId>,
    /// Credits paid out this tick.
    pub income: i64,
    /// Phase entered this tick.
    pub phase_change: Option<GamePhase>,
    /// Whether the game ended this tick.
    pub game_ended: bool,
}

/// Shared per-tick state handed to every stage.
#[derive(Debug)]
pub struct TickContext<'a> {
    /// Tick timestamp (ms).
    pub now: u64,
    /// Rules.
    pub config: &'a SimConfig,
    /// Walkability for this tick.
    pub grid: &'a CollisionGrid,
    /// Energized buildings for this tick.
    pub power: PowerGrid,
    /// Units and building centres at the start of the tick.
    pub spatial: SpatialIndex,
    /// Pathfinder limits.
    pub budget: PathBudget,
    /// Last player to damage each building this tick.
    pub last_hit: HashMap<BuildingId, PlayerId>,
    /// Report under construction.
    pub report: TickReport,
    rng: ChaCha8Rng,
}

impl<'a> TickContext<'a> {
    /// Context for a tick of a game seeded with `seed`.
    #[must_use]
    pub fn new(
        now: u64,
        tick: u64,
        seed: u64,
        config: &'a SimConfig,
        grid: &'a CollisionGrid,
        power: PowerGrid,
        spatial: SpatialIndex,
    ) -> Self {
        Self {
            now,
            config,
            grid,
            power,
            spatial,
            budget: PathBudget::from_config(config),
            last_hit: HashMap::new(),
            report: TickReport {
                tick,
                ..TickReport::default()
            },
            rng: ChaCha8Rng::seed_from_u64(tick_seed(seed, tick)),
        }
    }

    /// One uniform draw in `[0, 1)`.
    pub fn roll(&mut self) -> Fixed {
        fraction_from_bits(self.rng.next_u32())
    }

    /// True with probability `chance`.
    pub fn chance(&mut self, chance: Fixed) -> bool {
        self.roll() < chance
    }

    /// A duration drawn from the range, added to `now`.
    pub fn deadline(&mut self, range: DurationRange) -> u64 {
        let span = if range.max_ms <= range.min_ms {
            range.min_ms
        } else {
            self.rng.gen_range(range.min_ms..=range.max_ms)
        };
        self.now + span
    }

    /// A uniformly chosen offset in `[-radius, radius]`.
    pub fn offset(&mut self, radius: i32) -> i32 {
        if radius <= 0 {
            0
        } else {
            self.rng.gen_range(-radius..=radius)
        }
    }

    /// Path between two cells under this tick's grid and budget.
    #[must_use]
    pub fn path(&self, start: Cell, goal: Cell) -> Option<Vec<Cell>> {
        find_path(self.grid, start, goal, self.budget)
    }

    /// Whether the building is energized this tick.
    #[must_use]
    pub fn is_powered(&self, id: BuildingId) -> bool {
        self.power.is_powered(id)
    }
}

/// Seed of a tick's random stream.
///
/// A pure function of the game seed and tick number, so nothing about the
/// generator needs persisting between ticks.
#[must_use]
pub const fn tick_seed(seed: u64, tick: u64) -> u64 {
    seed ^ tick.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::MapDocument;

    fn context<'a>(config: &'a SimConfig, grid: &'a CollisionGrid, seed: u64) -> TickContext<'a> {
        TickContext::new(1_000, 3, seed, config, grid, PowerGrid::default(), SpatialIndex::new(8))
    }

    #[test]
    fn test_same_seed_same_stream() {
        let config = SimConfig::default();
        let grid = CollisionGrid::new(&MapDocument::open("t", 4, 4));
        let mut a = context(&config, &grid, 42);
        let mut b = context(&config, &grid, 42);
        let rolls_a: Vec<Fixed> = (0..16).map(|_| a.roll()).collect();
        let rolls_b: Vec<Fixed> = (0..16).map(|_| b.roll()).collect();
        assert_eq!(rolls_a, rolls_b);
    }

    #[test]
    fn test_roll_is_a_fraction() {
        let config = SimConfig::default();
        let grid = CollisionGrid::new(&MapDocument::open("t", 4, 4));
        let mut ctx = context(&config, &grid, 5);
        for _ in 0..1_000 {
            let roll = ctx.roll();
            assert!(roll >= Fixed::ZERO && roll < Fixed::ONE);
        }
    }

    #[test]
    fn test_deadline_within_range() {
        let config = SimConfig::default();
        let grid = CollisionGrid::new(&MapDocument::open("t", 4, 4));
        let mut ctx = context(&config, &grid, 9);
        for _ in 0..200 {
            let end = ctx.deadline(DurationRange::new(15_000, 25_000));
            assert!((16_000..=26_000).contains(&end));
        }
        assert_eq!(ctx.deadline(DurationRange::new(500, 500)), 1_500);
    }

    #[test]
    fn test_tick_seeds_differ() {
        assert_ne!(tick_seed(1, 1), tick_seed(1, 2));
        assert_ne!(tick_seed(1, 1), tick_seed(2, 1));
    }
}
