//! Combat resolution.
//!
//! Soldiers and turret guns pick a target once per tick when their cooldown
//! allows:
//!
//! 1. the nearest hostile unit in range,
//! 2. otherwise, for a soldier, its troop's ordered building if in range,
//! 3. otherwise the nearest hostile building in range.
//!
//! A shot always records the laser visual; whether it hits is decided by a
//! single uniform draw against the shooter's accuracy. Damaged buildings are
//! left standing until [`sweep_destroyed`] runs after the combat pass.

use crate::capture::{eliminate_player, remove_building};
use crate::components::{BuildingId, BuildingKind, EntityId, EntityKind, PlayerId, Target};
use crate::config::CombatProfile;
use crate::context::TickContext;
use crate::math::{Fixed, Vec2Fixed};
use crate::spatial::SpatialRef;
use crate::state::GameState;

/// Weapon numbers in effect for one shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Weapon {
    /// Targeting radius.
    pub range: Fixed,
    /// Damage per hit.
    pub damage: i32,
    /// Hit chance in `[0, 1]`.
    pub accuracy: Fixed,
}

impl Weapon {
    /// Weapon for a profile, degraded while the owner is confused.
    ///
    /// Confused shooters always fire at half range with the confused
    /// accuracy, whether soldier or turret.
    #[must_use]
    pub fn new(profile: &CombatProfile, confused: bool, confused_accuracy: Fixed) -> Self {
        if confused {
            Self {
                range: profile.range() / Fixed::from_num(2),
                damage: profile.damage,
                accuracy: confused_accuracy,
            }
        } else {
            Self {
                range: profile.range(),
                damage: profile.damage,
                accuracy: profile.accuracy(),
            }
        }
    }
}

/// Drop an expired laser visual.
pub fn clear_stale_attack(state: &mut GameState, now: u64, id: EntityId) {
    let expired = state
        .entities
        .get(id)
        .and_then(|e| e.attack_end_time)
        .is_some_and(|end| now >= end);
    if expired {
        if let Some(entity) = state.entities.get_mut(id) {
            entity.attack_target_id = None;
            entity.attack_end_time = None;
        }
    }
}

/// Let one combatant fire if it can.
pub fn resolve_attack(state: &mut GameState, ctx: &mut TickContext<'_>, id: EntityId) {
    let Some(attacker) = state.entities.get(id) else {
        return;
    };
    if !attacker.kind.is_combatant() || attacker.is_inside {
        return;
    }
    let now = ctx.now;
    if attacker
        .last_attack_time
        .is_some_and(|t| now.saturating_sub(t) < ctx.config.attack_cooldown_ms)
    {
        return;
    }

    let owner = attacker.owner_id;
    let kind = attacker.kind;
    let mut origin = attacker.position;

    let profile = match kind {
        EntityKind::TurretGun => {
            // Guns fire only from a finished, energized mount
            let mount = attacker.building_id.and_then(|b| state.buildings.get(b));
            let Some(mount) = mount else {
                return;
            };
            if !mount.is_constructed(now) || !ctx.is_powered(mount.id) || mount.health <= 0 {
                return;
            }
            origin = mount.rect.center();
            ctx.config.turret
        }
        _ => ctx.config.soldier,
    };
    let confused = state.is_confused(owner, now, ctx.config.betrayal_confusion_ms);
    let weapon = Weapon::new(&profile, confused, ctx.config.confused_accuracy());

    let ordered = (kind == EntityKind::Soldier)
        .then(|| attacker.troop_id)
        .flatten()
        .and_then(|troop| state.troops.get(troop))
        .and_then(|troop| troop.target_building_id);

    let Some(target) = acquire_target(state, ctx, owner, origin, weapon.range, ordered) else {
        return;
    };

    fire(state, ctx, id, owner, target, weapon);
}

fn acquire_target(
    state: &GameState,
    ctx: &TickContext<'_>,
    owner: PlayerId,
    origin: Vec2Fixed,
    range: Fixed,
    ordered: Option<BuildingId>,
) -> Option<Target> {
    let mut nearest_unit: Option<(Fixed, EntityId)> = None;
    let mut nearest_building: Option<(Fixed, BuildingId)> = None;
    let mut ordered_in_range = false;

    for entry in ctx.spatial.query(origin, range) {
        match entry.item {
            SpatialRef::Unit { id, .. } => {
                let Some(unit) = state.entities.get(id) else {
                    continue;
                };
                if unit.is_inside || unit.health <= 0 || state.are_friendly(owner, unit.owner_id) {
                    continue;
                }
                let d = origin.distance_squared(entry.position);
                if nearest_unit.map_or(true, |best| (d, id) < best) {
                    nearest_unit = Some((d, id));
                }
            }
            SpatialRef::Building { id, .. } => {
                let Some(building) = state.buildings.get(id) else {
                    continue;
                };
                if building.health <= 0 || state.are_friendly(owner, building.owner_id) {
                    continue;
                }
                if ordered == Some(id) {
                    ordered_in_range = true;
                }
                let d = origin.distance_squared(entry.position);
                if nearest_building.map_or(true, |best| (d, id) < best) {
                    nearest_building = Some((d, id));
                }
            }
        }
    }

    if let Some((_, id)) = nearest_unit {
        return Some(Target::Entity(id));
    }
    if ordered_in_range {
        return ordered.map(Target::Building);
    }
    nearest_building.map(|(_, id)| Target::Building(id))
}

fn fire(
    state: &mut GameState,
    ctx: &mut TickContext<'_>,
    id: EntityId,
    owner: PlayerId,
    target: Target,
    weapon: Weapon,
) {
    let now = ctx.now;
    if let Some(attacker) = state.entities.get_mut(id) {
        attacker.last_attack_time = Some(now);
        attacker.attack_target_id = Some(target);
        attacker.attack_end_time = Some(now + ctx.config.laser_duration_ms);
    }
    ctx.report.shots += 1;

    if ctx.roll() >= weapon.accuracy {
        return;
    }
    ctx.report.hits += 1;

    match target {
        Target::Building(building_id) => {
            if let Some(building) = state.buildings.get_mut(building_id) {
                building.health = building.health.saturating_sub(weapon.damage);
                ctx.report.buildings_damaged = true;
                ctx.last_hit.insert(building_id, owner);
            }
        }
        Target::Entity(target_id) => {
            let dead = match state.entities.get_mut(target_id) {
                Some(victim) => {
                    victim.health = victim.health.saturating_sub(weapon.damage);
                    victim.health <= 0
                }
                None => false,
            };
            if dead {
                kill(state, ctx, target_id);
            }
        }
    }
}

/// Remove a dead unit, promoting a successor if it led a troop.
pub fn kill(state: &mut GameState, ctx: &mut TickContext<'_>, id: EntityId) {
    let Some(dead) = state.entities.remove(id) else {
        return;
    };
    ctx.report.kills.push(id);
    tracing::debug!(entity = %id, kind = ?dead.kind, owner = %dead.owner_id, "Unit killed");

    if dead.kind != EntityKind::Commander {
        return;
    }
    let Some(troop) = dead.troop_id else {
        return;
    };
    let successor = state.troop_members(troop).into_iter().find(|&member| {
        state
            .entities
            .get(member)
            .is_some_and(|e| e.kind == EntityKind::Soldier)
    });
    if let Some(successor) = successor {
        if let Some(entity) = state.entities.get_mut(successor) {
            entity.kind = EntityKind::Commander;
        }
        tracing::debug!(troop = %troop, commander = %successor, "Commander succession");
    }
}

/// Remove every building whose health reached zero.
///
/// A central base destroyed this way eliminates its owner in favour of the
/// player who dealt the last hit.
pub fn sweep_destroyed(state: &mut GameState, ctx: &mut TickContext<'_>) {
    let destroyed: Vec<(BuildingId, PlayerId, BuildingKind)> = state
        .buildings
        .values()
        .filter(|b| b.health <= 0)
        .map(|b| (b.id, b.owner_id, b.kind))
        .collect();

    for (building_id, owner, kind) in destroyed {
        // An earlier elimination in this sweep may have re-owned it
        let owner = state.buildings.get(building_id).map_or(owner, |b| b.owner_id);
        remove_building(state, building_id);
        ctx.report.destroyed_buildings.push(building_id);
        tracing::info!(building = %building_id, %kind, %owner, "Building destroyed");

        if kind == BuildingKind::BaseCentral {
            let conqueror = ctx.last_hit.get(&building_id).copied();
            eliminate_player(state, ctx, owner, conqueror);
        }
    }
}
