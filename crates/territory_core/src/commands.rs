//! Player intents.
//!
//! Commands arrive from the command layer between ticks. [`apply`] runs
//! every check before the first write, so a rejected command leaves the
//! state exactly as it found it.

use serde::{Deserialize, Serialize};

use crate::behavior::reset_troop_paths;
use crate::components::{
    Building, BuildingId, BuildingKind, GamePhase, PlayerId, Rect, Troop, TroopId,
};
use crate::config::SimConfig;
use crate::diplomacy;
use crate::economy::{charge, quote};
use crate::error::{GameError, Result};
use crate::grid::CollisionGrid;
use crate::map::MapDocument;
use crate::math::Vec2Fixed;
use crate::power::in_energy_field;
use crate::state::GameState;

/// A player intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Place the central base during the placement phase.
    PlaceBase {
        /// Issuing player.
        player: PlayerId,
        /// Footprint left column.
        x: i32,
        /// Footprint top row.
        y: i32,
    },
    /// Place any other building during the simulation phase.
    PlaceBuilding {
        /// Issuing player.
        player: PlayerId,
        /// Kind to build.
        kind: BuildingKind,
        /// Footprint left column.
        x: i32,
        /// Footprint top row.
        y: i32,
    },
    /// Send a troop to a point.
    MoveTroop {
        /// Issuing player.
        player: PlayerId,
        /// Troop to move.
        troop: TroopId,
        /// Destination.
        target: Vec2Fixed,
    },
    /// Send a troop against a building.
    AttackBuilding {
        /// Issuing player.
        player: PlayerId,
        /// Troop to send.
        troop: TroopId,
        /// Building to attack.
        building: BuildingId,
    },
    /// Ask another player for an alliance.
    RequestAlliance {
        /// Issuing player.
        player: PlayerId,
        /// Other side.
        other: PlayerId,
    },
    /// Accept a pending request.
    AcceptAlliance {
        /// Issuing player.
        player: PlayerId,
        /// Requester.
        other: PlayerId,
    },
    /// Turn down a pending request.
    RejectAlliance {
        /// Issuing player.
        player: PlayerId,
        /// Requester.
        other: PlayerId,
    },
    /// Break an alliance in force.
    BreakAlliance {
        /// Issuing player.
        player: PlayerId,
        /// Ally.
        other: PlayerId,
    },
    /// Extend an alliance during its final window.
    RenewAlliance {
        /// Issuing player.
        player: PlayerId,
        /// Ally.
        other: PlayerId,
    },
}

impl Command {
    /// Player who issued the command.
    #[must_use]
    pub const fn player(&self) -> PlayerId {
        match self {
            Self::PlaceBase { player, .. }
            | Self::PlaceBuilding { player, .. }
            | Self::MoveTroop { player, .. }
            | Self::AttackBuilding { player, .. }
            | Self::RequestAlliance { player, .. }
            | Self::AcceptAlliance { player, .. }
            | Self::RejectAlliance { player, .. }
            | Self::BreakAlliance { player, .. }
            | Self::RenewAlliance { player, .. } => *player,
        }
    }
}

/// Result of an accepted command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// A building was placed.
    Placed {
        /// New building.
        building: BuildingId,
        /// Credits charged.
        cost: i64,
    },
    /// A troop received a new order.
    Ordered {
        /// Troop that was ordered.
        troop: TroopId,
    },
    /// A diplomacy transition took place.
    Diplomacy,
}

/// Validate and apply one command.
///
/// # Errors
///
/// Any rejection listed on [`GameError`]; the state is unchanged when an
/// error is returned.
pub fn apply(
    state: &mut GameState,
    map: &MapDocument,
    config: &SimConfig,
    now: u64,
    command: &Command,
) -> Result<CommandOutcome> {
    match *command {
        Command::PlaceBase { player, x, y } => place_base(state, map, config, player, x, y),
        Command::PlaceBuilding { player, kind, x, y } => {
            place_building(state, map, config, now, player, kind, x, y)
        }
        Command::MoveTroop {
            player,
            troop,
            target,
        } => move_troop(state, map, config, now, player, troop, target),
        Command::AttackBuilding {
            player,
            troop,
            building,
        } => attack_building(state, config, now, player, troop, building),
        Command::RequestAlliance { player, other } => {
            diplomacy::request(state, player, other).map(|()| CommandOutcome::Diplomacy)
        }
        Command::AcceptAlliance { player, other } => {
            diplomacy::accept(state, config, now, player, other).map(|()| CommandOutcome::Diplomacy)
        }
        Command::RejectAlliance { player, other } => {
            diplomacy::reject(state, player, other).map(|()| CommandOutcome::Diplomacy)
        }
        Command::BreakAlliance { player, other } => {
            diplomacy::break_alliance(state, now, player, other).map(|()| CommandOutcome::Diplomacy)
        }
        Command::RenewAlliance { player, other } => {
            diplomacy::renew(state, config, now, player, other).map(|()| CommandOutcome::Diplomacy)
        }
    }
}

fn require_phase(state: &GameState, expected: GamePhase) -> Result<()> {
    let actual = state.game().phase;
    if actual == expected {
        Ok(())
    } else {
        Err(GameError::WrongPhase { expected, actual })
    }
}

fn require_active(state: &GameState, player: PlayerId) -> Result<()> {
    let record = state
        .players
        .get(player)
        .ok_or(GameError::UnknownPlayer(player))?;
    if record.is_active() {
        Ok(())
    } else {
        Err(GameError::PlayerInactive(player))
    }
}

fn footprint(config: &SimConfig, kind: BuildingKind, x: i32, y: i32) -> Rect {
    let spec = config.buildings.get(kind);
    Rect::new(x, y, spec.width, spec.height)
}

fn check_site(state: &GameState, map: &MapDocument, rect: &Rect) -> Result<()> {
    if !map.contains_rect(rect) {
        return Err(GameError::OutOfBounds);
    }
    CollisionGrid::build(map, state.buildings.values()).check_placement(rect)
}

fn place_base(
    state: &mut GameState,
    map: &MapDocument,
    config: &SimConfig,
    player: PlayerId,
    x: i32,
    y: i32,
) -> Result<CommandOutcome> {
    require_phase(state, GamePhase::Placement)?;
    require_active(state, player)?;
    if state.base_of(player).is_some() {
        return Err(GameError::AlreadyHasBase);
    }
    let rect = footprint(config, BuildingKind::BaseCentral, x, y);
    check_site(state, map, &rect)?;

    let building = insert_building(state, config, 0, player, BuildingKind::BaseCentral, rect);
    tracing::info!(%player, %building, x, y, "Base placed");
    Ok(CommandOutcome::Placed { building, cost: 0 })
}

fn place_building(
    state: &mut GameState,
    map: &MapDocument,
    config: &SimConfig,
    now: u64,
    player: PlayerId,
    kind: BuildingKind,
    x: i32,
    y: i32,
) -> Result<CommandOutcome> {
    require_phase(state, GamePhase::Simulation)?;
    if kind == BuildingKind::BaseCentral {
        return Err(GameError::InvalidBuildingKind(kind.name().to_owned()));
    }
    require_active(state, player)?;
    let rect = footprint(config, kind, x, y);
    check_site(state, map, &rect)?;

    let owned = state.buildings.values().filter(|b| b.owner_id == player);
    if !in_energy_field(&rect, owned, config.energy_field_gap) {
        return Err(GameError::OutsideEnergyField);
    }

    let Some(record) = state.players.get(player) else {
        return Err(GameError::UnknownPlayer(player));
    };
    let price = quote(state, config, record, kind);
    if record.credits < price.cost {
        return Err(GameError::InsufficientCredits {
            required: price.cost,
            available: record.credits,
        });
    }

    if let Some(record) = state.players.get_mut(player) {
        charge(record, price);
    }
    let building = insert_building(state, config, now, player, kind, rect);
    tracing::info!(%player, %building, %kind, cost = price.cost, "Building placed");
    Ok(CommandOutcome::Placed {
        building,
        cost: price.cost,
    })
}

fn insert_building(
    state: &mut GameState,
    config: &SimConfig,
    now: u64,
    owner: PlayerId,
    kind: BuildingKind,
    rect: Rect,
) -> BuildingId {
    let spec = config.buildings.get(kind);
    let id = state.allocate_building_id();
    state.buildings.insert(Building {
        id,
        owner_id: owner,
        kind,
        rect,
        health: spec.health,
        construction_end: (spec.build_time_ms > 0).then(|| now + spec.build_time_ms),
        capture_start: None,
        capturing_owner_id: None,
    });
    id
}

fn owned_troop(state: &GameState, player: PlayerId, troop: TroopId) -> Result<&Troop> {
    let record = state.troops.get(troop).ok_or(GameError::UnknownTroop(troop))?;
    if record.owner_id != player {
        return Err(GameError::NotYourTroop(troop));
    }
    Ok(record)
}

fn move_troop(
    state: &mut GameState,
    map: &MapDocument,
    config: &SimConfig,
    now: u64,
    player: PlayerId,
    troop: TroopId,
    target: Vec2Fixed,
) -> Result<CommandOutcome> {
    require_phase(state, GamePhase::Simulation)?;
    require_active(state, player)?;
    owned_troop(state, player, troop)?;
    if !map.in_bounds(target.nearest_cell()) {
        return Err(GameError::OutOfBounds);
    }

    if let Some(record) = state.troops.get_mut(troop) {
        record.target_pos = Some(target);
        record.target_building_id = None;
    }
    let members = state.troop_members(troop);
    reset_troop_paths(state, &members, now, config.betrayal_confusion_ms);
    tracing::debug!(%player, %troop, "Troop moving");
    Ok(CommandOutcome::Ordered { troop })
}

fn attack_building(
    state: &mut GameState,
    config: &SimConfig,
    now: u64,
    player: PlayerId,
    troop: TroopId,
    building: BuildingId,
) -> Result<CommandOutcome> {
    require_phase(state, GamePhase::Simulation)?;
    require_active(state, player)?;
    owned_troop(state, player, troop)?;
    let target = state
        .buildings
        .get(building)
        .ok_or(GameError::UnknownBuilding(building))?;
    if target.owner_id == player {
        return Err(GameError::CannotTargetSelf);
    }
    let center = target.rect.center();

    if let Some(record) = state.troops.get_mut(troop) {
        record.target_building_id = Some(building);
        record.target_pos = Some(center);
    }
    let members = state.troop_members(troop);
    reset_troop_paths(state, &members, now, config.betrayal_confusion_ms);
    tracing::debug!(%player, %troop, %building, "Troop attacking");
    Ok(CommandOutcome::Ordered { troop })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Entity, EntityKind, Game, GameId, GameStatus, Player};
    use crate::map::{Structure, StructureKind};
    use crate::math::{Cell, Fixed};

    const P1: PlayerId = PlayerId(1);
    const P2: PlayerId = PlayerId(2);

    fn state(phase: GamePhase) -> GameState {
        let mut state = GameState::new(Game {
            id: GameId(1),
            map_id: "t".into(),
            seed: 0,
            status: GameStatus::Active,
            phase,
            phase_start: 0,
            phase_end: None,
            tick_count: 0,
            winner: None,
        });
        state.players.insert(Player::new(P1, 5_000));
        state.players.insert(Player::new(P2, 5_000));
        state
    }

    fn place(state: &mut GameState, map: &MapDocument, config: &SimConfig, kind: BuildingKind, x: i32, y: i32) -> Result<CommandOutcome> {
        let command = Command::PlaceBuilding {
            player: P1,
            kind,
            x,
            y,
        };
        apply(state, map, config, 1_000, &command)
    }

    fn with_base() -> (GameState, MapDocument, SimConfig) {
        let mut state = state(GamePhase::Placement);
        let map = MapDocument::open("t", 64, 64);
        let config = SimConfig::default();
        apply(&mut state, &map, &config, 0, &Command::PlaceBase { player: P1, x: 10, y: 10 }).unwrap();
        state.game_mut().phase = GamePhase::Simulation;
        (state, map, config)
    }

    #[test]
    fn test_place_base_rules() {
        let mut state = state(GamePhase::Simulation);
        let map = MapDocument::open("t", 64, 64);
        let config = SimConfig::default();
        let command = Command::PlaceBase { player: P1, x: 0, y: 0 };
        assert!(matches!(
            apply(&mut state, &map, &config, 0, &command),
            Err(GameError::WrongPhase { expected: GamePhase::Placement, .. })
        ));

        state.game_mut().phase = GamePhase::Placement;
        apply(&mut state, &map, &config, 0, &command).unwrap();
        let base = state.base_of(P1).unwrap();
        assert_eq!(base.rect, Rect::new(0, 0, 5, 5));
        assert!(base.construction_end.is_none());

        assert!(matches!(
            apply(&mut state, &map, &config, 0, &command),
            Err(GameError::AlreadyHasBase)
        ));
        assert!(matches!(
            apply(&mut state, &map, &config, 0, &Command::PlaceBase { player: P2, x: 2, y: 2 }),
            Err(GameError::Collision)
        ));
        assert!(matches!(
            apply(&mut state, &map, &config, 0, &Command::PlaceBase { player: P2, x: 62, y: 0 }),
            Err(GameError::OutOfBounds)
        ));
    }

    #[test]
    fn test_base_on_structure_is_out_of_bounds() {
        let mut state = state(GamePhase::Placement);
        let mut map = MapDocument::open("t", 64, 64);
        map.structures.push(Structure {
            kind: StructureKind::Boulder,
            rect: Rect::new(20, 20, 1, 1),
        });
        let config = SimConfig::default();
        let command = Command::PlaceBase { player: P1, x: 18, y: 18 };
        assert!(matches!(
            apply(&mut state, &map, &config, 0, &command),
            Err(GameError::OutOfBounds)
        ));
        assert!(state.buildings.is_empty());
    }

    #[test]
    fn test_first_building_free_then_inflated() {
        let (mut state, map, config) = with_base();

        let outcome = place(&mut state, &map, &config, BuildingKind::House, 17, 10).unwrap();
        assert!(matches!(outcome, CommandOutcome::Placed { cost: 0, .. }));
        let player = state.players.get(P1).unwrap();
        assert_eq!(player.credits, 5_000);
        assert_eq!(player.inflation, Fixed::ONE);

        let outcome = place(&mut state, &map, &config, BuildingKind::House, 17, 14).unwrap();
        assert!(matches!(outcome, CommandOutcome::Placed { cost: 500, .. }));
        let player = state.players.get(P1).unwrap();
        assert_eq!(player.credits, 4_500);
        assert_eq!(player.inflation, Fixed::from_num(2));

        let outcome = place(&mut state, &map, &config, BuildingKind::House, 10, 17).unwrap();
        assert!(matches!(outcome, CommandOutcome::Placed { cost: 1_000, .. }));
    }

    #[test]
    fn test_new_building_is_under_construction() {
        let (mut state, map, config) = with_base();
        let CommandOutcome::Placed { building, .. } =
            place(&mut state, &map, &config, BuildingKind::Turret, 17, 10).unwrap()
        else {
            panic!("expected placement");
        };
        let turret = state.buildings.get(building).unwrap();
        assert_eq!(turret.construction_end, Some(1_000 + config.buildings.turret.build_time_ms));
        assert_eq!(turret.health, config.buildings.turret.health);
    }

    #[test]
    fn test_building_rejections_leave_state_untouched() {
        let (mut state, map, config) = with_base();
        let before = state.state_hash();

        assert!(matches!(
            place(&mut state, &map, &config, BuildingKind::BaseCentral, 30, 30),
            Err(GameError::InvalidBuildingKind(_))
        ));
        assert!(matches!(
            place(&mut state, &map, &config, BuildingKind::House, 40, 40),
            Err(GameError::OutsideEnergyField)
        ));
        assert!(matches!(
            place(&mut state, &map, &config, BuildingKind::House, 12, 12),
            Err(GameError::Collision)
        ));

        // Second workshop costs more than the player holds
        place(&mut state, &map, &config, BuildingKind::Workshop, 17, 10).unwrap();
        if let Some(p) = state.players.get_mut(P1) {
            p.credits = 999;
        }
        let before_costly = state.state_hash();
        assert!(matches!(
            place(&mut state, &map, &config, BuildingKind::Workshop, 10, 17),
            Err(GameError::InsufficientCredits { required: 1_000, available: 999 })
        ));
        assert_eq!(state.state_hash(), before_costly);
        assert_ne!(before, before_costly);
    }

    fn troop_state() -> (GameState, MapDocument, TroopId, Vec<crate::components::EntityId>) {
        let (mut state, map, _) = with_base();
        let barracks = state.base_of(P1).unwrap().id;
        let troop = state.allocate_troop_id();
        state.troops.insert(Troop {
            id: troop,
            owner_id: P1,
            barracks_id: barracks,
            target_pos: None,
            target_building_id: None,
            last_spawn_time: 0,
        });
        let mut members = Vec::new();
        for x in [30, 31] {
            let id = state.allocate_entity_id();
            let mut unit = Entity::new(id, P1, EntityKind::Soldier, Vec2Fixed::from_ints(x, 30), 10);
            unit.troop_id = Some(troop);
            unit.path = vec![Cell::new(x, 30), Cell::new(x, 31)];
            unit.state = crate::components::EntityState::Moving;
            state.entities.insert(unit);
            members.push(id);
        }
        (state, map, troop, members)
    }

    #[test]
    fn test_move_troop_sets_target_and_clears_paths() {
        let (mut state, map, troop, members) = troop_state();
        let config = SimConfig::default();
        let target = Vec2Fixed::from_ints(50, 50);
        apply(&mut state, &map, &config, 0, &Command::MoveTroop { player: P1, troop, target }).unwrap();

        let record = state.troops.get(troop).unwrap();
        assert_eq!(record.target_pos, Some(target));
        for id in members {
            assert!(state.entities.get(id).unwrap().path.is_empty());
        }
    }

    #[test]
    fn test_move_troop_rejections() {
        let (mut state, map, troop, _) = troop_state();
        let config = SimConfig::default();
        let target = Vec2Fixed::from_ints(5, 5);
        assert!(matches!(
            apply(&mut state, &map, &config, 0, &Command::MoveTroop { player: P2, troop, target }),
            Err(GameError::NotYourTroop(_))
        ));
        assert!(matches!(
            apply(&mut state, &map, &config, 0, &Command::MoveTroop { player: P1, troop: TroopId(999), target }),
            Err(GameError::UnknownTroop(_))
        ));
        let off_map = Vec2Fixed::from_ints(100, 5);
        assert!(matches!(
            apply(&mut state, &map, &config, 0, &Command::MoveTroop { player: P1, troop, target: off_map }),
            Err(GameError::OutOfBounds)
        ));
    }

    #[test]
    fn test_attack_order_targets_building_centre() {
        let (mut state, map, troop, _) = troop_state();
        let config = SimConfig::default();
        let enemy = state.allocate_building_id();
        state.buildings.insert(Building {
            id: enemy,
            owner_id: P2,
            kind: BuildingKind::House,
            rect: Rect::new(40, 40, 3, 3),
            health: 300,
            construction_end: None,
            capture_start: None,
            capturing_owner_id: None,
        });
        apply(&mut state, &map, &config, 0, &Command::AttackBuilding { player: P1, troop, building: enemy }).unwrap();
        let record = state.troops.get(troop).unwrap();
        assert_eq!(record.target_building_id, Some(enemy));
        assert_eq!(record.target_pos, Some(Rect::new(40, 40, 3, 3).center()));

        let own = state.base_of(P1).unwrap().id;
        assert!(matches!(
            apply(&mut state, &map, &config, 0, &Command::AttackBuilding { player: P1, troop, building: own }),
            Err(GameError::CannotTargetSelf)
        ));
    }

    #[test]
    fn test_diplomacy_commands_dispatch() {
        let mut state = state(GamePhase::Simulation);
        let map = MapDocument::open("t", 8, 8);
        let config = SimConfig::default();
        apply(&mut state, &map, &config, 0, &Command::RequestAlliance { player: P1, other: P2 }).unwrap();
        apply(&mut state, &map, &config, 0, &Command::AcceptAlliance { player: P2, other: P1 }).unwrap();
        assert!(state.are_allied(P1, P2));
        assert_eq!(Command::BreakAlliance { player: P2, other: P1 }.player(), P2);
    }
}
