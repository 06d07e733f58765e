//! Population and troop growth.
//!
//! Finished, powered houses and barracks get their group on the first pass
//! and then grow it by one unit per spawn interval until the group cap,
//! except while the building is being captured. A group's very first unit
//! comes straight away; a wiped-out group waits out the interval like any
//! other. Finished turrets get their gun.

use crate::components::{
    BuildingId, BuildingKind, Entity, EntityKind, Family, PlayerId, Troop,
};
use crate::context::TickContext;
use crate::math::Vec2Fixed;
use crate::state::GameState;

/// Run the spawning pass over every building.
pub fn run_spawning(state: &mut GameState, ctx: &mut TickContext<'_>) {
    for building_id in state.buildings.sorted_ids() {
        let Some(building) = state.buildings.get(building_id) else {
            continue;
        };
        if !building.is_constructed(ctx.now) || building.health <= 0 {
            continue;
        }
        match building.kind {
            BuildingKind::House if ctx.is_powered(building_id) => grow_family(state, ctx, building_id),
            BuildingKind::Barracks if ctx.is_powered(building_id) => grow_troop(state, ctx, building_id),
            BuildingKind::Turret => mount_gun(state, ctx, building_id),
            BuildingKind::House
            | BuildingKind::Barracks
            | BuildingKind::BaseCentral
            | BuildingKind::Workshop
            | BuildingKind::Wall => {}
        }
    }
}

fn grow_family(state: &mut GameState, ctx: &mut TickContext<'_>, house_id: BuildingId) {
    let Some((owner, origin, capturing)) = building_facts(state, house_id) else {
        return;
    };

    let family_id = match state.family_of_house(house_id) {
        Some(family) => family.id,
        None => {
            let id = state.allocate_family_id();
            state.families.insert(Family {
                id,
                owner_id: owner,
                house_id,
                last_spawn_time: 0,
            });
            tracing::debug!(house = %house_id, family = %id, "Family founded");
            id
        }
    };

    if capturing {
        return;
    }
    let members = state.family_members(family_id).len();
    let last = state.families.get(family_id).map_or(0, |f| f.last_spawn_time);
    if !due(members, last, ctx) {
        return;
    }

    let id = state.allocate_entity_id();
    let mut member = Entity::new(
        id,
        owner,
        EntityKind::Member,
        origin,
        ctx.config.unit_health.get(EntityKind::Member),
    );
    member.home_id = Some(house_id);
    member.family_id = Some(family_id);
    state.entities.insert(member);
    if let Some(family) = state.families.get_mut(family_id) {
        family.last_spawn_time = ctx.now;
    }
    ctx.report.spawned.push(id);
}

fn grow_troop(state: &mut GameState, ctx: &mut TickContext<'_>, barracks_id: BuildingId) {
    let Some((owner, origin, capturing)) = building_facts(state, barracks_id) else {
        return;
    };

    let troop_id = match state.troop_of_barracks(barracks_id) {
        Some(troop) => troop.id,
        None => {
            let id = state.allocate_troop_id();
            state.troops.insert(Troop {
                id,
                owner_id: owner,
                barracks_id,
                target_pos: None,
                target_building_id: None,
                last_spawn_time: 0,
            });
            tracing::debug!(barracks = %barracks_id, troop = %id, "Troop raised");
            id
        }
    };

    if capturing {
        return;
    }
    let members = state.troop_members(troop_id);
    let last = state.troops.get(troop_id).map_or(0, |t| t.last_spawn_time);
    if !due(members.len(), last, ctx) {
        return;
    }

    let has_commander = members.iter().any(|&m| {
        state
            .entities
            .get(m)
            .is_some_and(|e| e.kind == EntityKind::Commander)
    });
    let kind = if has_commander {
        EntityKind::Soldier
    } else {
        EntityKind::Commander
    };

    let id = state.allocate_entity_id();
    let mut unit = Entity::new(id, owner, kind, origin, ctx.config.unit_health.get(kind));
    unit.troop_id = Some(troop_id);
    state.entities.insert(unit);
    if let Some(troop) = state.troops.get_mut(troop_id) {
        troop.last_spawn_time = ctx.now;
    }
    ctx.report.spawned.push(id);
}

fn mount_gun(state: &mut GameState, ctx: &mut TickContext<'_>, turret_id: BuildingId) {
    if state.gun_of(turret_id).is_some() {
        return;
    }
    let Some(turret) = state.buildings.get(turret_id) else {
        return;
    };
    let owner = turret.owner_id;
    let center = turret.rect.center();

    let id = state.allocate_entity_id();
    let mut gun = Entity::new(
        id,
        owner,
        EntityKind::TurretGun,
        center,
        ctx.config.unit_health.get(EntityKind::TurretGun),
    );
    gun.building_id = Some(turret_id);
    state.entities.insert(gun);
    ctx.report.spawned.push(id);
}

/// Owner, spawn point and capture flag of a building.
fn building_facts(state: &GameState, id: BuildingId) -> Option<(PlayerId, Vec2Fixed, bool)> {
    state
        .buildings
        .get(id)
        .map(|b| (b.owner_id, b.rect.origin().to_point(), b.is_under_capture()))
}

/// A `last_spawn` of zero marks a group that never spawned.
fn due(members: usize, last_spawn: u64, ctx: &TickContext<'_>) -> bool {
    if members >= ctx.config.group_capacity {
        return false;
    }
    let fresh = members == 0 && last_spawn == 0;
    fresh || ctx.now.saturating_sub(last_spawn) >= ctx.config.spawn_interval_ms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{
        Building, EntityState, Game, GameId, GamePhase, GameStatus, Player, Rect,
    };
    use crate::config::SimConfig;
    use crate::grid::CollisionGrid;
    use crate::map::MapDocument;
    use crate::power::PowerGrid;
    use crate::spatial::SpatialIndex;

    const P1: PlayerId = PlayerId(1);

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
        state.players.insert(Player::new(P1, 0));
        state
    }

    fn add_building(state: &mut GameState, kind: BuildingKind, rect: Rect) -> BuildingId {
        let id = state.allocate_building_id();
        state.buildings.insert(Building {
            id,
            owner_id: P1,
            kind,
            rect,
            health: 100,
            construction_end: None,
            capture_start: None,
            capturing_owner_id: None,
        });
        id
    }

    fn spawn_pass(state: &mut GameState, config: &SimConfig, now: u64) -> Vec<crate::components::EntityId> {
        let map = MapDocument::open("t", 64, 64);
        let grid = CollisionGrid::build(&map, state.buildings.values());
        let power = PowerGrid::compute(state.buildings.values(), config.energy_field_gap);
        let spatial = SpatialIndex::build(8, state.entities.values(), state.buildings.values());
        let mut ctx = TickContext::new(now, 0, 1, config, &grid, power, spatial);
        run_spawning(state, &mut ctx);
        ctx.report.spawned
    }

    fn powered_village(state: &mut GameState) -> (BuildingId, BuildingId) {
        add_building(state, BuildingKind::BaseCentral, Rect::new(0, 0, 5, 5));
        let house = add_building(state, BuildingKind::House, Rect::new(9, 1, 3, 3));
        let barracks = add_building(state, BuildingKind::Barracks, Rect::new(1, 8, 4, 4));
        (house, barracks)
    }

    #[test]
    fn test_house_spawns_first_member_at_its_position() {
        let mut state = state();
        let (house, _) = powered_village(&mut state);
        let config = SimConfig::default();

        spawn_pass(&mut state, &config, 1_000);

        let members: Vec<_> = state
            .entities
            .values()
            .filter(|e| e.kind == EntityKind::Member)
            .collect();
        assert_eq!(members.len(), 1);
        let member = members[0];
        assert_eq!(member.position, Vec2Fixed::from_ints(9, 1));
        assert_eq!(member.state, EntityState::Idle);
        assert_eq!(member.home_id, Some(house));
        assert!(state.family_of_house(house).is_some());
    }

    #[test]
    fn test_barracks_raises_commander_then_soldiers_on_interval() {
        let mut state = state();
        let (_, barracks) = powered_village(&mut state);
        let config = SimConfig::default();

        spawn_pass(&mut state, &config, 1_000);
        let troop = state.troop_of_barracks(barracks).unwrap().id;
        let members = state.troop_members(troop);
        assert_eq!(members.len(), 1);
        assert_eq!(state.entities.get(members[0]).unwrap().kind, EntityKind::Commander);

        // Not yet due
        spawn_pass(&mut state, &config, 30_999);
        assert_eq!(state.troop_members(troop).len(), 1);

        spawn_pass(&mut state, &config, 31_000);
        let members = state.troop_members(troop);
        assert_eq!(members.len(), 2);
        assert_eq!(state.entities.get(members[1]).unwrap().kind, EntityKind::Soldier);
    }

    #[test]
    fn test_wiped_out_troop_waits_for_interval() {
        let mut state = state();
        let (_, barracks) = powered_village(&mut state);
        let config = SimConfig::default();

        spawn_pass(&mut state, &config, 1_000);
        let troop = state.troop_of_barracks(barracks).unwrap().id;
        let commander = state.troop_members(troop)[0];
        state.entities.remove(commander);

        assert!(spawn_pass(&mut state, &config, 1_100).is_empty());
        assert!(spawn_pass(&mut state, &config, 30_999).is_empty());

        let spawned = spawn_pass(&mut state, &config, 31_000);
        assert_eq!(spawned.len(), 1);
        assert_eq!(state.entities.get(spawned[0]).unwrap().kind, EntityKind::Commander);
    }

    #[test]
    fn test_groups_stop_at_capacity() {
        let mut state = state();
        let (house, _) = powered_village(&mut state);
        let config = SimConfig::default();

        for round in 0..10u64 {
            spawn_pass(&mut state, &config, round * config.spawn_interval_ms);
        }
        let family = state.family_of_house(house).unwrap().id;
        assert_eq!(state.family_members(family).len(), config.group_capacity);
    }

    #[test]
    fn test_unpowered_and_unfinished_buildings_do_not_spawn() {
        let mut state = state();
        // No base: nothing is powered
        add_building(&mut state, BuildingKind::House, Rect::new(9, 1, 3, 3));
        let config = SimConfig::default();
        assert!(spawn_pass(&mut state, &config, 1_000).is_empty());
        assert!(state.families.is_empty());

        let mut state = self::state();
        add_building(&mut state, BuildingKind::BaseCentral, Rect::new(0, 0, 5, 5));
        let house = add_building(&mut state, BuildingKind::House, Rect::new(9, 1, 3, 3));
        if let Some(b) = state.buildings.get_mut(house) {
            b.construction_end = Some(5_000);
        }
        assert!(spawn_pass(&mut state, &config, 1_000).is_empty());
        assert_eq!(spawn_pass(&mut state, &config, 5_000).len(), 1);
    }

    #[test]
    fn test_building_under_capture_does_not_grow() {
        let mut state = state();
        let (house, _) = powered_village(&mut state);
        if let Some(b) = state.buildings.get_mut(house) {
            b.capture_start = Some(0);
            b.capturing_owner_id = Some(PlayerId(2));
        }
        let config = SimConfig::default();
        spawn_pass(&mut state, &config, 1_000);

        let family = state.family_of_house(house).unwrap().id;
        assert!(state.family_members(family).is_empty());
    }

    #[test]
    fn test_turret_gets_one_gun() {
        let mut state = state();
        let turret = add_building(&mut state, BuildingKind::Turret, Rect::new(30, 30, 2, 2));
        let config = SimConfig::default();

        spawn_pass(&mut state, &config, 0);
        spawn_pass(&mut state, &config, 100);

        let gun = state.gun_of(turret).unwrap();
        assert_eq!(gun.position, Vec2Fixed::from_ints(31, 31));
        let guns = state
            .entities
            .values()
            .filter(|e| e.kind == EntityKind::TurretGun)
            .count();
        assert_eq!(guns, 1);
    }
}
