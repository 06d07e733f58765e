//! Simulation tunables.
//!
//! Every constant the tick pipeline uses lives in [`SimConfig`]. The defaults
//! are the canonical game rules; a RON document may override any subset.
//!
//! Quantities that are fractional in the rules (accuracy, chance, decay) are
//! stored as integer percentages so config files stay free of floats, and are
//! converted to [`Fixed`] at the point of use.
//!
//! # Example RON
//!
//! ```ron
//! SimConfig(
//!     ticks_per_tile: 4,
//!     soldier: CombatProfile(range_tiles: 12, damage: 2, accuracy_percent: 75),
//! )
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::components::{BuildingKind, EntityKind};
use crate::error::{GameError, Result};
use crate::math::{ratio, Fixed};

/// Inclusive range of milliseconds from which a duration is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationRange {
    /// Shortest duration.
    pub min_ms: u64,
    /// Longest duration.
    pub max_ms: u64,
}

impl DurationRange {
    /// Create a range.
    #[must_use]
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }
}

/// Weapon numbers for a combatant kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatProfile {
    /// Targeting radius in tiles.
    pub range_tiles: i32,
    /// Damage per hit.
    pub damage: i32,
    /// Hit chance in percent.
    pub accuracy_percent: u32,
}

impl CombatProfile {
    /// Range as a fixed-point radius.
    #[must_use]
    pub fn range(&self) -> Fixed {
        Fixed::from_num(self.range_tiles)
    }

    /// Accuracy as a fraction in `[0, 1]`.
    #[must_use]
    pub fn accuracy(&self) -> Fixed {
        ratio(self.accuracy_percent as i32, 100)
    }
}

/// Static numbers for one building kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingSpec {
    /// Footprint width in tiles.
    pub width: i32,
    /// Footprint height in tiles.
    pub height: i32,
    /// Base credit cost before inflation.
    pub cost: i64,
    /// Starting health.
    pub health: i32,
    /// Construction time in milliseconds.
    pub build_time_ms: u64,
}

impl BuildingSpec {
    const fn new(width: i32, height: i32, cost: i64, health: i32, build_time_ms: u64) -> Self {
        Self {
            width,
            height,
            cost,
            health,
            build_time_ms,
        }
    }
}

/// Per-kind building table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildingTable {
    /// Central base.
    pub base_central: BuildingSpec,
    /// House.
    pub house: BuildingSpec,
    /// Workshop.
    pub workshop: BuildingSpec,
    /// Barracks.
    pub barracks: BuildingSpec,
    /// Wall segment.
    pub wall: BuildingSpec,
    /// Turret.
    pub turret: BuildingSpec,
}

impl BuildingTable {
    /// Numbers for a kind.
    #[must_use]
    pub const fn get(&self, kind: BuildingKind) -> &BuildingSpec {
        match kind {
            BuildingKind::BaseCentral => &self.base_central,
            BuildingKind::House => &self.house,
            BuildingKind::Workshop => &self.workshop,
            BuildingKind::Barracks => &self.barracks,
            BuildingKind::Wall => &self.wall,
            BuildingKind::Turret => &self.turret,
        }
    }
}

impl Default for BuildingTable {
    fn default() -> Self {
        Self {
            base_central: BuildingSpec::new(5, 5, 0, 2000, 0),
            house: BuildingSpec::new(3, 3, 500, 300, 5_000),
            workshop: BuildingSpec::new(4, 4, 1000, 400, 8_000),
            barracks: BuildingSpec::new(4, 4, 1500, 500, 10_000),
            wall: BuildingSpec::new(1, 1, 100, 200, 2_000),
            turret: BuildingSpec::new(2, 2, 2000, 400, 12_000),
        }
    }
}

/// Starting health per unit kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitHealth {
    /// Family member.
    pub member: i32,
    /// Troop commander.
    pub commander: i32,
    /// Troop soldier.
    pub soldier: i32,
    /// Turret gun.
    pub turret_gun: i32,
}

impl UnitHealth {
    /// Health for a kind.
    #[must_use]
    pub const fn get(&self, kind: EntityKind) -> i32 {
        match kind {
            EntityKind::Member => self.member,
            EntityKind::Commander => self.commander,
            EntityKind::Soldier => self.soldier,
            EntityKind::TurretGun => self.turret_gun,
        }
    }
}

impl Default for UnitHealth {
    fn default() -> Self {
        Self {
            member: 5,
            commander: 15,
            soldier: 10,
            turret_gun: 50,
        }
    }
}

/// All tunables of the tick engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Length of one tick.
    pub tick_ms: u64,
    /// Ticks needed to cross one tile.
    pub ticks_per_tile: u32,
    /// Ticks per economy round.
    pub round_ticks: u64,

    /// Shift length inside a workshop.
    pub work_duration: DurationRange,
    /// Sleep length inside a house.
    pub sleep_duration: DurationRange,
    /// Wait between idle decisions.
    pub idle_cooldown: DurationRange,
    /// Short wait after a walk that ends nowhere in particular.
    pub arrival_cooldown: DurationRange,
    /// Backoff after the pathfinder fails.
    pub path_retry_ms: u64,
    /// Chance of a patrol walk per idle decision, in percent.
    pub patrol_chance_percent: u32,
    /// Patrol radius around a unit's own position.
    pub patrol_radius: i32,
    /// Patrol radius around a troop's order target.
    pub troop_patrol_radius: i32,
    /// Distance at which a troop member counts as arrived at its order.
    pub order_arrival_radius: i32,
    /// Maximum reservations per workshop.
    pub workshop_capacity: usize,

    /// Minimum time between shots.
    pub attack_cooldown_ms: u64,
    /// Laser visual duration.
    pub laser_duration_ms: u64,
    /// Soldier weapon.
    pub soldier: CombatProfile,
    /// Turret gun weapon.
    pub turret: CombatProfile,
    /// Accuracy of confused shooters, in percent.
    pub confused_accuracy_percent: u32,

    /// Tiles around a footprint that count as "at" the building.
    pub capture_buffer_tiles: i32,
    /// Capture time of a central base.
    pub base_capture_ms: u64,
    /// Capture time of any other building.
    pub building_capture_ms: u64,

    /// Time between spawns of a family or troop.
    pub spawn_interval_ms: u64,
    /// Member cap of a family or troop.
    pub group_capacity: usize,
    /// Starting health per unit kind.
    pub unit_health: UnitHealth,

    /// Credits per working unit per round.
    pub income_per_worker: i64,
    /// Inflation decay per round, in percent points.
    pub inflation_decay_percent: u32,
    /// Credits a new player starts with.
    pub starting_credits: i64,
    /// Building numbers.
    pub buildings: BuildingTable,

    /// Free gap between footprints in the energy-field rule.
    pub energy_field_gap: i32,

    /// A* expansion budget.
    pub path_iteration_budget: usize,
    /// Cells the nearest-walkable search may visit.
    pub nearest_walkable_budget: usize,
    /// Side of a spatial hash cell, in tiles.
    pub spatial_cell_size: i32,

    /// Length of the placement phase.
    pub placement_duration_ms: u64,
    /// Length of the simulation phase.
    pub simulation_duration_ms: u64,

    /// Lifetime of an alliance.
    pub alliance_duration_ms: u64,
    /// Final stretch of an alliance in which it can be renewed.
    pub alliance_renew_window_ms: u64,
    /// Penalty window after breaking an alliance.
    pub betrayal_confusion_ms: u64,

    /// Vision radius around owned or allied units and buildings.
    pub vision_radius: i32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            ticks_per_tile: 5,
            round_ticks: 50,

            work_duration: DurationRange::new(15_000, 25_000),
            sleep_duration: DurationRange::new(20_000, 30_000),
            idle_cooldown: DurationRange::new(3_000, 8_000),
            arrival_cooldown: DurationRange::new(500, 1_500),
            path_retry_ms: 2_000,
            patrol_chance_percent: 40,
            patrol_radius: 3,
            troop_patrol_radius: 6,
            order_arrival_radius: 2,
            workshop_capacity: 16,

            attack_cooldown_ms: 1_000,
            laser_duration_ms: 200,
            soldier: CombatProfile {
                range_tiles: 10,
                damage: 1,
                accuracy_percent: 80,
            },
            turret: CombatProfile {
                range_tiles: 15,
                damage: 100,
                accuracy_percent: 80,
            },
            confused_accuracy_percent: 20,

            capture_buffer_tiles: 1,
            base_capture_ms: 30_000,
            building_capture_ms: 5_000,

            spawn_interval_ms: 30_000,
            group_capacity: 4,
            unit_health: UnitHealth::default(),

            income_per_worker: 1_000,
            inflation_decay_percent: 10,
            starting_credits: 5_000,
            buildings: BuildingTable::default(),

            energy_field_gap: 4,

            path_iteration_budget: 3_000,
            nearest_walkable_budget: 2_500,
            spatial_cell_size: 8,

            placement_duration_ms: 60_000,
            simulation_duration_ms: 30 * 60_000,

            alliance_duration_ms: 5 * 60_000,
            alliance_renew_window_ms: 30_000,
            betrayal_confusion_ms: 60_000,

            vision_radius: 12,
        }
    }
}

impl SimConfig {
    /// Parse a RON document; missing fields keep their defaults.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        ron::from_str(source).map_err(|e| GameError::Config(e.to_string()))
    }

    /// Read and parse a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| GameError::Config(format!("{}: {e}", path.display())))?;
        Self::from_ron_str(&source)
    }

    /// Path progress gained per tick, rounded up so that exactly
    /// `ticks_per_tile` steps cross one tile.
    #[must_use]
    pub fn progress_per_tick(&self) -> Fixed {
        let steps = i64::from(self.ticks_per_tile.max(1));
        let one = Fixed::ONE.to_bits();
        Fixed::from_bits((one + steps - 1) / steps)
    }

    /// Per-round inflation decay as a fraction.
    #[must_use]
    pub fn inflation_decay(&self) -> Fixed {
        ratio(self.inflation_decay_percent as i32, 100)
    }

    /// Patrol chance as a fraction.
    #[must_use]
    pub fn patrol_chance(&self) -> Fixed {
        ratio(self.patrol_chance_percent as i32, 100)
    }

    /// Accuracy of confused shooters as a fraction.
    #[must_use]
    pub fn confused_accuracy(&self) -> Fixed {
        ratio(self.confused_accuracy_percent as i32, 100)
    }

    /// Required capture time for a building kind.
    #[must_use]
    pub const fn capture_duration(&self, kind: BuildingKind) -> u64 {
        match kind {
            BuildingKind::BaseCentral => self.base_capture_ms,
            BuildingKind::House
            | BuildingKind::Workshop
            | BuildingKind::Barracks
            | BuildingKind::Wall
            | BuildingKind::Turret => self.building_capture_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_rules() {
        let config = SimConfig::default();
        assert_eq!(config.tick_ms, 100);
        assert_eq!(config.round_ticks, 50);
        assert_eq!(config.soldier.range(), Fixed::from_num(10));
        assert_eq!(config.soldier.accuracy(), ratio(4, 5));
        assert_eq!(config.capture_duration(BuildingKind::BaseCentral), 30_000);
        assert_eq!(config.capture_duration(BuildingKind::Wall), 5_000);
        assert_eq!(config.buildings.get(BuildingKind::BaseCentral).width, 5);
    }

    #[test]
    fn test_partial_ron_override() {
        let config = SimConfig::from_ron_str(
            "(ticks_per_tile: 4, soldier: (range_tiles: 12, damage: 2, accuracy_percent: 75))",
        )
        .unwrap();
        assert_eq!(config.ticks_per_tile, 4);
        assert_eq!(config.soldier.damage, 2);
        // Untouched fields keep defaults
        assert_eq!(config.turret.damage, 100);
        assert_eq!(config.progress_per_tick(), ratio(1, 4));
    }

    #[test]
    fn test_progress_steps_cross_exactly_one_tile() {
        let config = SimConfig::default();
        let step = config.progress_per_tick();
        let four = step * Fixed::from_num(4);
        let five = step * Fixed::from_num(5);
        assert!(four < Fixed::ONE);
        assert!(five >= Fixed::ONE);
    }

    #[test]
    fn test_invalid_ron_is_config_error() {
        let err = SimConfig::from_ron_str("(ticks_per_tile: \"fast\")").unwrap_err();
        assert!(matches!(err, GameError::Config(_)));
    }
}
