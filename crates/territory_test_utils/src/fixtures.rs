//! Test fixtures and helpers.
//!
//! Pre-built game states and scenarios for consistent testing.

use fixed::types::I32F32;
use territory_core::components::{
    Alliance, AllianceStatus, Building, BuildingId, BuildingKind, Entity, EntityId, EntityKind,
    Game, GameId, GamePhase, GameStatus, Player, PlayerId, PlayerPair, Rect,
};
use territory_core::config::SimConfig;
use territory_core::context::TickReport;
use territory_core::map::MapDocument;
use territory_core::math::Vec2Fixed;
use territory_core::simulation::Simulation;
use territory_core::state::GameState;
use territory_core::store::NullSink;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Builder for a game in the simulation phase.
///
/// Buildings are finished on creation and take their footprint and health
/// from the config table.
#[derive(Debug, Clone)]
pub struct GameBuilder {
    state: GameState,
    map: MapDocument,
    config: SimConfig,
}

impl GameBuilder {
    /// Active game with id 1 on an open 64×64 map.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        let state = GameState::new(Game {
            id: GameId(1),
            map_id: "arena".into(),
            seed,
            status: GameStatus::Active,
            phase: GamePhase::Simulation,
            phase_start: 0,
            phase_end: None,
            tick_count: 0,
            winner: None,
        });
        Self {
            state,
            map: MapDocument::open("arena", 64, 64),
            config: SimConfig::default(),
        }
    }

    /// Replace the map; the game follows its id.
    #[must_use]
    pub fn with_map(mut self, map: MapDocument) -> Self {
        self.state.game_mut().map_id = map.id.clone();
        self.map = map;
        self
    }

    /// Replace the rules.
    #[must_use]
    pub fn with_config(mut self, config: SimConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the phase and its end.
    #[must_use]
    pub fn with_phase(mut self, phase: GamePhase, phase_end: Option<u64>) -> Self {
        let game = self.state.game_mut();
        game.phase = phase;
        game.phase_end = phase_end;
        self
    }

    /// Add an active player.
    #[must_use]
    pub fn with_player(mut self, id: u64, credits: i64) -> Self {
        self.state.players.insert(Player::new(PlayerId(id), credits));
        self
    }

    /// Rules in use.
    #[must_use]
    pub const fn config(&self) -> &SimConfig {
        &self.config
    }

    /// State under construction.
    pub fn state_mut(&mut self) -> &mut GameState {
        &mut self.state
    }

    /// Place a finished building with its origin at `(x, y)`.
    pub fn building(&mut self, owner: u64, kind: BuildingKind, x: i32, y: i32) -> BuildingId {
        let spec = self.config.buildings.get(kind);
        let id = self.state.allocate_building_id();
        self.state.buildings.insert(Building {
            id,
            owner_id: PlayerId(owner),
            kind,
            rect: Rect::new(x, y, spec.width, spec.height),
            health: spec.health,
            construction_end: None,
            capture_start: None,
            capturing_owner_id: None,
        });
        id
    }

    /// Put an idle unit at `(x, y)`.
    pub fn unit(&mut self, owner: u64, kind: EntityKind, x: i32, y: i32) -> EntityId {
        let id = self.state.allocate_entity_id();
        let health = self.config.unit_health.get(kind);
        self.state.entities.insert(Entity::new(
            id,
            PlayerId(owner),
            kind,
            Vec2Fixed::from_ints(x, y),
            health,
        ));
        id
    }

    /// Ally two players until `expires_at`.
    pub fn alliance(&mut self, a: u64, b: u64, expires_at: u64) {
        self.state.alliances.insert(Alliance {
            pair: PlayerPair::new(PlayerId(a), PlayerId(b)),
            status: AllianceStatus::Allied,
            requested_by: PlayerId(a),
            expires_at: Some(expires_at),
        });
    }

    /// Finish into the raw parts.
    #[must_use]
    pub fn into_parts(mut self) -> (GameState, MapDocument, SimConfig) {
        self.state.clear_changes();
        (self.state, self.map, self.config)
    }

    /// Finish into a simulation.
    #[must_use]
    pub fn build(self) -> Simulation {
        let (state, map, config) = self.into_parts();
        Simulation::new(state, map, config)
    }
}

/// Two mirrored players, each with a base, a house, a workshop, a barracks
/// and a turret, all powered.
#[must_use]
pub fn skirmish(seed: u64) -> Simulation {
    let mut builder = GameBuilder::new(seed).with_player(1, 5_000).with_player(2, 5_000);
    let layout = [
        (BuildingKind::BaseCentral, 4, 4),
        (BuildingKind::House, 11, 4),
        (BuildingKind::Workshop, 4, 11),
        (BuildingKind::Barracks, 11, 10),
        (BuildingKind::Turret, 16, 6),
    ];
    let side = builder.map.width;
    for (kind, x, y) in layout {
        let spec = *builder.config.buildings.get(kind);
        builder.building(1, kind, x, y);
        builder.building(2, kind, side - x - spec.width, side - y - spec.height);
    }
    builder.build()
}

/// Time of the simulation's next tick.
#[must_use]
pub fn next_tick_time(sim: &Simulation) -> u64 {
    (sim.state().game().tick_count + 1) * sim.config().tick_ms
}

/// Run one tick at its natural time without persistence.
///
/// # Panics
///
/// Panics if the tick fails, which only a sink can cause.
pub fn step(sim: &mut Simulation) -> TickReport {
    let now = next_tick_time(sim);
    sim.tick(now, &mut NullSink).expect("tick with a null sink never fails")
}

/// Run `ticks` ticks and collect their reports.
pub fn run(sim: &mut Simulation, ticks: u64) -> Vec<TickReport> {
    (0..ticks).map(|_| step(sim)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use territory_core::power::PowerGrid;

    #[test]
    fn test_skirmish_is_fully_powered() {
        let sim = skirmish(1);
        let state = sim.state();
        assert_eq!(state.buildings.len(), 10);
        let power = PowerGrid::compute(state.buildings.values(), sim.config().energy_field_gap);
        assert_eq!(power.len(), 10);
    }

    #[test]
    fn test_builder_uses_config_footprints() {
        let mut builder = GameBuilder::new(0).with_player(1, 0);
        let id = builder.building(1, BuildingKind::Workshop, 3, 3);
        let sim = builder.build();
        let workshop = sim.state().buildings.get(id).unwrap();
        assert_eq!(workshop.rect, Rect::new(3, 3, 4, 4));
        assert_eq!(workshop.health, sim.config().buildings.workshop.health);
    }
}
