//! Capture and ownership transfer.
//!
//! A building is contested by the soldiers and commanders standing within
//! the capture buffer of its footprint. Any unit of the owner defends it and
//! resets progress. Units of allies and team-mates are ignored. When exactly
//! one hostile owner is present a timer runs; if that owner holds the
//! building for the full capture time it changes hands. Losing a central
//! base eliminates the player.

use std::collections::BTreeSet;

use crate::behavior::exit_point;
use crate::components::{BuildingId, BuildingKind, EntityState, PlayerId, PlayerStatus, TravelGoal};
use crate::context::{CaptureEvent, EliminationEvent, TickContext};
use crate::math::Fixed;
use crate::spatial::SpatialRef;
use crate::state::GameState;

/// Who is standing at a building.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Presence {
    Defended,
    Contested(BTreeSet<PlayerId>),
}

/// Run capture resolution over every building.
pub fn resolve_captures(state: &mut GameState, ctx: &mut TickContext<'_>) {
    for building_id in state.buildings.sorted_ids() {
        resolve_building(state, ctx, building_id);
    }
}

fn resolve_building(state: &mut GameState, ctx: &mut TickContext<'_>, building_id: BuildingId) {
    let Some(building) = state.buildings.get(building_id) else {
        return;
    };
    if building.health <= 0 {
        return;
    }
    let owner = building.owner_id;
    let kind = building.kind;
    let now = ctx.now;

    let attacker = match presence(state, ctx, building_id) {
        Presence::Contested(hostile) if hostile.len() == 1 => hostile.into_iter().next(),
        Presence::Defended | Presence::Contested(_) => None,
    };

    let Some(attacker) = attacker else {
        if building.is_under_capture() {
            if let Some(building) = state.buildings.get_mut(building_id) {
                building.clear_capture();
            }
        }
        return;
    };

    let running = building
        .capture_start
        .filter(|_| building.capturing_owner_id == Some(attacker));
    match running {
        Some(start) if now.saturating_sub(start) >= ctx.config.capture_duration(kind) => {
            if kind == BuildingKind::BaseCentral {
                tracing::info!(building = %building_id, victim = %owner, by = %attacker, "Base captured");
                remove_building(state, building_id);
                ctx.report.destroyed_buildings.push(building_id);
                eliminate_player(state, ctx, owner, Some(attacker));
            } else {
                transfer_building(state, building_id, attacker);
            }
            ctx.report.captures.push(CaptureEvent {
                building_id,
                from: owner,
                to: attacker,
            });
        }
        Some(_) => {}
        None => {
            if let Some(building) = state.buildings.get_mut(building_id) {
                building.capture_start = Some(now);
                building.capturing_owner_id = Some(attacker);
            }
        }
    }
}

fn presence(state: &GameState, ctx: &TickContext<'_>, building_id: BuildingId) -> Presence {
    let Some(building) = state.buildings.get(building_id) else {
        return Presence::Contested(BTreeSet::new());
    };
    let buffer = ctx.config.capture_buffer_tiles;
    let reach = Fixed::from_num(building.rect.width.max(building.rect.height) + 2 * buffer);

    let mut hostile = BTreeSet::new();
    for entry in ctx.spatial.query(building.rect.center(), reach) {
        let SpatialRef::Unit { id, .. } = entry.item else {
            continue;
        };
        let Some(unit) = state.entities.get(id) else {
            continue;
        };
        if unit.is_inside || !unit.kind.can_capture() {
            continue;
        }
        if !building.rect.contains_point_with_buffer(unit.position, buffer) {
            continue;
        }
        if unit.owner_id == building.owner_id {
            return Presence::Defended;
        }
        if !state.are_friendly(unit.owner_id, building.owner_id) {
            hostile.insert(unit.owner_id);
        }
    }
    Presence::Contested(hostile)
}

/// Hand a building and everything linked to it to a new owner.
///
/// The house's family or the barracks' troop change sides with all their
/// members, and a turret's gun follows its mount. Links that would point
/// across owners afterwards are cut.
pub fn transfer_building(state: &mut GameState, building_id: BuildingId, new_owner: PlayerId) {
    let Some(building) = state.buildings.get_mut(building_id) else {
        return;
    };
    let previous = building.owner_id;
    building.owner_id = new_owner;
    building.clear_capture();
    let kind = building.kind;
    tracing::info!(building = %building_id, %kind, from = %previous, to = %new_owner, "Building captured");

    let mut moved = Vec::new();
    if let Some(family) = state.family_of_house(building_id).map(|f| f.id) {
        if let Some(family) = state.families.get_mut(family) {
            family.owner_id = new_owner;
        }
        moved.extend(state.family_members(family));
    }
    if let Some(troop) = state.troop_of_barracks(building_id).map(|t| t.id) {
        if let Some(troop) = state.troops.get_mut(troop) {
            troop.owner_id = new_owner;
            troop.target_pos = None;
            troop.target_building_id = None;
        }
        moved.extend(state.troop_members(troop));
    }
    if let Some(gun) = state.gun_of(building_id).map(|g| g.id) {
        moved.push(gun);
    }

    for id in moved {
        if let Some(entity) = state.entities.get_mut(id) {
            entity.owner_id = new_owner;
            entity.reserved_factory_id = None;
            if entity.state == EntityState::Working {
                entity.become_idle(None);
            }
        }
    }

    // Workers of other owners lose their place in a captured workshop
    if kind == BuildingKind::Workshop {
        let exit = state.buildings.get(building_id).map(exit_point);
        for id in state.entities.sorted_ids() {
            let Some(entity) = state.entities.get(id) else {
                continue;
            };
            if entity.owner_id == new_owner
                || (entity.reserved_factory_id != Some(building_id)
                    && entity.workplace_id != Some(building_id))
            {
                continue;
            }
            if let Some(entity) = state.entities.get_mut(id) {
                entity.reserved_factory_id = None;
                if entity.workplace_id == Some(building_id) {
                    entity.become_idle(None);
                    if let Some(exit) = exit {
                        entity.position = exit;
                    }
                }
            }
        }
    }
}

/// Eliminate a player and hand all their assets to the conqueror.
///
/// Credits are looted, every remaining building, unit, family and troop is
/// reassigned, and the player's alliances are dissolved. Without a
/// conqueror the assets stay where they are.
pub fn eliminate_player(
    state: &mut GameState,
    ctx: &mut TickContext<'_>,
    victim: PlayerId,
    conqueror: Option<PlayerId>,
) {
    let Some(player) = state.players.get_mut(victim) else {
        return;
    };
    if !player.is_active() {
        return;
    }
    let loot = player.credits;
    player.status = PlayerStatus::Eliminated;
    player.eliminated_by = conqueror;
    tracing::info!(player = %victim, by = ?conqueror, loot, "Player eliminated");

    if let Some(conqueror) = conqueror.filter(|&c| c != victim) {
        if let Some(player) = state.players.get_mut(victim) {
            player.credits = 0;
        }
        if let Some(winner) = state.players.get_mut(conqueror) {
            winner.credits = winner.credits.saturating_add(loot);
        }

        for id in state.buildings.sorted_ids() {
            if state.buildings.get(id).is_some_and(|b| b.owner_id == victim) {
                if let Some(building) = state.buildings.get_mut(id) {
                    building.owner_id = conqueror;
                    building.clear_capture();
                }
            }
        }
        for id in state.entities.sorted_ids() {
            if state.entities.get(id).is_some_and(|e| e.owner_id == victim) {
                if let Some(entity) = state.entities.get_mut(id) {
                    entity.owner_id = conqueror;
                }
            }
        }
        for id in state.families.sorted_ids() {
            if state.families.get(id).is_some_and(|f| f.owner_id == victim) {
                if let Some(family) = state.families.get_mut(id) {
                    family.owner_id = conqueror;
                }
            }
        }
        for id in state.troops.sorted_ids() {
            if state.troops.get(id).is_some_and(|t| t.owner_id == victim) {
                if let Some(troop) = state.troops.get_mut(id) {
                    troop.owner_id = conqueror;
                    troop.target_pos = None;
                    troop.target_building_id = None;
                }
            }
        }
    }

    for pair in state.alliances.sorted_ids() {
        if pair.contains(victim) {
            state.alliances.remove(pair);
        }
    }

    ctx.report.eliminations.push(EliminationEvent {
        player_id: victim,
        by: conqueror,
    });
}

/// Remove a building and cut every link to it.
///
/// Occupants are put outside at the footprint origin, reservations and
/// homes pointing at it are cleared, its family or troop is dissolved
/// (members live on unlinked) and its turret gun is deleted.
pub fn remove_building(state: &mut GameState, building_id: BuildingId) {
    let Some(building) = state.buildings.remove(building_id) else {
        return;
    };
    let exit = exit_point(&building);

    if let Some(family) = state.family_of_house(building_id).map(|f| f.id) {
        state.families.remove(family);
        for member in state.family_members(family) {
            if let Some(entity) = state.entities.get_mut(member) {
                entity.family_id = None;
            }
        }
    }
    if let Some(troop) = state.troop_of_barracks(building_id).map(|t| t.id) {
        state.troops.remove(troop);
        for member in state.troop_members(troop) {
            if let Some(entity) = state.entities.get_mut(member) {
                entity.troop_id = None;
            }
        }
    }
    for troop in state.troops.sorted_ids() {
        if state
            .troops
            .get(troop)
            .is_some_and(|t| t.target_building_id == Some(building_id))
        {
            if let Some(troop) = state.troops.get_mut(troop) {
                troop.target_building_id = None;
            }
        }
    }

    for id in state.entities.sorted_ids() {
        let Some(entity) = state.entities.get(id) else {
            continue;
        };
        if entity.building_id == Some(building_id) {
            state.entities.remove(id);
            continue;
        }
        let linked = entity.home_id == Some(building_id)
            || entity.workplace_id == Some(building_id)
            || entity.reserved_factory_id == Some(building_id);
        if !linked {
            continue;
        }
        let Some(entity) = state.entities.get_mut(id) else {
            continue;
        };
        let occupant = entity.is_inside
            && (entity.workplace_id == Some(building_id)
                || (entity.state == EntityState::Sleeping && entity.home_id == Some(building_id)));
        let heading_here = matches!(
            entity.travel,
            Some(TravelGoal::Workshop(b) | TravelGoal::Home(b))
                if b == building_id
        );
        if entity.home_id == Some(building_id) {
            entity.home_id = None;
        }
        if entity.reserved_factory_id == Some(building_id) {
            entity.reserved_factory_id = None;
        }
        if occupant {
            entity.become_idle(None);
            entity.position = exit;
        } else if heading_here {
            entity.become_idle(None);
        }
        if entity.workplace_id == Some(building_id) {
            entity.workplace_id = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{
        Building, Entity, EntityId, EntityKind, Family, Game, GameId, GamePhase, GameStatus, Player,
        Rect, Troop,
    };
    use crate::config::SimConfig;
    use crate::grid::CollisionGrid;
    use crate::map::MapDocument;
    use crate::math::Vec2Fixed;
    use crate::power::PowerGrid;
    use crate::spatial::SpatialIndex;

    const P1: PlayerId = PlayerId(1);
    const P2: PlayerId = PlayerId(2);
    const P3: PlayerId = PlayerId(3);

    fn state() -> GameState {
        let mut state = GameState::new(Game {
            id: GameId(1),
            map_id: "t".into(),
            seed: 1,
            status: GameStatus::Active,
            phase: GamePhase::Simulation,
            phase_start: 0,
            phase_end: None,
            tick_count: 1,
            winner: None,
        });
        for p in [P1, P2, P3] {
            state.players.insert(Player::new(p, 1_000));
        }
        state
    }

    fn add_building(state: &mut GameState, owner: PlayerId, kind: BuildingKind, rect: Rect) -> BuildingId {
        let id = state.allocate_building_id();
        state.buildings.insert(Building {
            id,
            owner_id: owner,
            kind,
            rect,
            health: 100,
            construction_end: None,
            capture_start: None,
            capturing_owner_id: None,
        });
        id
    }

    fn add_unit(state: &mut GameState, owner: PlayerId, kind: EntityKind, x: i32, y: i32) -> EntityId {
        let id = state.allocate_entity_id();
        state
            .entities
            .insert(Entity::new(id, owner, kind, Vec2Fixed::from_ints(x, y), 10));
        id
    }

    fn tick(state: &mut GameState, config: &SimConfig, now: u64) -> crate::context::TickReport {
        let map = MapDocument::open("t", 64, 64);
        let grid = CollisionGrid::build(&map, state.buildings.values());
        let spatial = SpatialIndex::build(8, state.entities.values(), state.buildings.values());
        let mut ctx = TickContext::new(now, 0, 1, config, &grid, PowerGrid::default(), spatial);
        resolve_captures(state, &mut ctx);
        ctx.report
    }

    #[test]
    fn test_single_attacker_starts_and_completes_capture() {
        let mut state = state();
        let house = add_building(&mut state, P1, BuildingKind::House, Rect::new(10, 10, 3, 3));
        add_unit(&mut state, P2, EntityKind::Soldier, 9, 9);
        let config = SimConfig::default();

        tick(&mut state, &config, 1_000);
        let b = state.buildings.get(house).unwrap();
        assert_eq!(b.capture_start, Some(1_000));
        assert_eq!(b.capturing_owner_id, Some(P2));

        tick(&mut state, &config, 5_999);
        assert_eq!(state.buildings.get(house).unwrap().owner_id, P1);

        let report = tick(&mut state, &config, 6_000);
        let b = state.buildings.get(house).unwrap();
        assert_eq!(b.owner_id, P2);
        assert!(b.capture_start.is_none());
        assert_eq!(report.captures.len(), 1);
    }

    #[test]
    fn test_defender_resets_capture() {
        let mut state = state();
        let house = add_building(&mut state, P1, BuildingKind::House, Rect::new(10, 10, 3, 3));
        add_unit(&mut state, P2, EntityKind::Soldier, 9, 9);
        let config = SimConfig::default();
        tick(&mut state, &config, 1_000);
        assert!(state.buildings.get(house).unwrap().is_under_capture());

        add_unit(&mut state, P1, EntityKind::Commander, 13, 13);
        tick(&mut state, &config, 1_100);
        assert!(!state.buildings.get(house).unwrap().is_under_capture());
    }

    #[test]
    fn test_two_attackers_reset_capture() {
        let mut state = state();
        let house = add_building(&mut state, P1, BuildingKind::House, Rect::new(10, 10, 3, 3));
        add_unit(&mut state, P2, EntityKind::Soldier, 9, 10);
        let config = SimConfig::default();
        tick(&mut state, &config, 1_000);
        assert!(state.buildings.get(house).unwrap().is_under_capture());

        add_unit(&mut state, P3, EntityKind::Soldier, 12, 13);
        tick(&mut state, &config, 1_100);
        assert!(!state.buildings.get(house).unwrap().is_under_capture());
    }

    #[test]
    fn test_members_and_outsiders_do_not_capture() {
        let mut state = state();
        let house = add_building(&mut state, P1, BuildingKind::House, Rect::new(10, 10, 3, 3));
        add_unit(&mut state, P2, EntityKind::Member, 9, 9);
        // Just outside the one-tile buffer
        add_unit(&mut state, P2, EntityKind::Soldier, 15, 15);
        let config = SimConfig::default();
        tick(&mut state, &config, 1_000);
        assert!(!state.buildings.get(house).unwrap().is_under_capture());
    }

    #[test]
    fn test_allied_units_are_ignored() {
        let mut state = state();
        let house = add_building(&mut state, P1, BuildingKind::House, Rect::new(10, 10, 3, 3));
        state.alliances.insert(crate::components::Alliance {
            pair: crate::components::PlayerPair::new(P1, P2),
            status: crate::components::AllianceStatus::Allied,
            requested_by: P1,
            expires_at: Some(1_000_000),
        });
        add_unit(&mut state, P2, EntityKind::Soldier, 9, 9);
        add_unit(&mut state, P3, EntityKind::Soldier, 13, 13);
        let config = SimConfig::default();
        tick(&mut state, &config, 1_000);

        // The ally neither defends nor contests; P3 is the single attacker
        assert_eq!(state.buildings.get(house).unwrap().capturing_owner_id, Some(P3));
    }

    #[test]
    fn test_transfer_moves_family_and_members() {
        let mut state = state();
        let house = add_building(&mut state, P1, BuildingKind::House, Rect::new(10, 10, 3, 3));
        let family = state.allocate_family_id();
        state.families.insert(Family {
            id: family,
            owner_id: P1,
            house_id: house,
            last_spawn_time: 0,
        });
        let member = add_unit(&mut state, P1, EntityKind::Member, 30, 30);
        if let Some(e) = state.entities.get_mut(member) {
            e.family_id = Some(family);
            e.home_id = Some(house);
        }

        transfer_building(&mut state, house, P2);

        assert_eq!(state.buildings.get(house).unwrap().owner_id, P2);
        assert_eq!(state.families.get(family).unwrap().owner_id, P2);
        assert_eq!(state.entities.get(member).unwrap().owner_id, P2);
    }

    #[test]
    fn test_transfer_moves_troop_and_turret_gun() {
        let mut state = state();
        let barracks = add_building(&mut state, P1, BuildingKind::Barracks, Rect::new(0, 0, 4, 4));
        let troop = state.allocate_troop_id();
        state.troops.insert(Troop {
            id: troop,
            owner_id: P1,
            barracks_id: barracks,
            target_pos: Some(Vec2Fixed::from_ints(50, 50)),
            target_building_id: None,
            last_spawn_time: 0,
        });
        let soldier = add_unit(&mut state, P1, EntityKind::Soldier, 40, 40);
        if let Some(e) = state.entities.get_mut(soldier) {
            e.troop_id = Some(troop);
        }
        let turret = add_building(&mut state, P1, BuildingKind::Turret, Rect::new(20, 0, 2, 2));
        let gun = add_unit(&mut state, P1, EntityKind::TurretGun, 21, 1);
        if let Some(e) = state.entities.get_mut(gun) {
            e.building_id = Some(turret);
        }

        transfer_building(&mut state, barracks, P2);
        transfer_building(&mut state, turret, P2);

        let t = state.troops.get(troop).unwrap();
        assert_eq!(t.owner_id, P2);
        assert!(t.target_pos.is_none());
        assert_eq!(state.entities.get(soldier).unwrap().owner_id, P2);
        assert_eq!(state.entities.get(gun).unwrap().owner_id, P2);
    }

    #[test]
    fn test_base_capture_eliminates_and_reassigns_everything() {
        let mut state = state();
        let base = add_building(&mut state, P1, BuildingKind::BaseCentral, Rect::new(10, 10, 5, 5));
        let house = add_building(&mut state, P1, BuildingKind::House, Rect::new(30, 30, 3, 3));
        let worker = add_unit(&mut state, P1, EntityKind::Member, 40, 40);
        add_unit(&mut state, P2, EntityKind::Soldier, 9, 9);
        let config = SimConfig::default();

        tick(&mut state, &config, 0);
        let report = tick(&mut state, &config, 30_000);

        assert!(!state.buildings.contains(base));
        assert_eq!(state.buildings.get(house).unwrap().owner_id, P2);
        assert_eq!(state.entities.get(worker).unwrap().owner_id, P2);
        let victim = state.players.get(P1).unwrap();
        assert_eq!(victim.status, PlayerStatus::Eliminated);
        assert_eq!(victim.eliminated_by, Some(P2));
        assert_eq!(victim.credits, 0);
        assert_eq!(state.players.get(P2).unwrap().credits, 2_000);
        assert_eq!(report.eliminations.len(), 1);
    }

    #[test]
    fn test_remove_building_ejects_occupants_and_dissolves_family() {
        let mut state = state();
        let house = add_building(&mut state, P1, BuildingKind::House, Rect::new(10, 10, 3, 3));
        let family = state.allocate_family_id();
        state.families.insert(Family {
            id: family,
            owner_id: P1,
            house_id: house,
            last_spawn_time: 0,
        });
        let sleeper = add_unit(&mut state, P1, EntityKind::Member, 11, 11);
        if let Some(e) = state.entities.get_mut(sleeper) {
            e.family_id = Some(family);
            e.home_id = Some(house);
            e.state = EntityState::Sleeping;
            e.is_inside = true;
        }

        remove_building(&mut state, house);

        assert!(!state.families.contains(family));
        let e = state.entities.get(sleeper).unwrap();
        assert!(!e.is_inside);
        assert_eq!(e.state, EntityState::Idle);
        assert_eq!(e.home_id, None);
        assert_eq!(e.family_id, None);
        assert_eq!(e.position, Vec2Fixed::from_ints(10, 10));
    }
}
