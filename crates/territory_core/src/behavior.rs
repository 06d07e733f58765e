//! Unit behavior state machine.
//!
//! Each tick a unit makes at most one transition, checked in priority
//! order:
//!
//! 1. **Walking** - advance along the path; on the last cell resolve the
//!    arrival (workshop → working, home → sleeping, anything else → idle).
//! 2. **Working** - when the shift ends, walk home.
//! 3. **Sleeping** - when rested, leave the house idle.
//! 4. **Idle** - follow troop orders, take a job, patrol, or wait.
//!
//! Faults never stop the tick: a unit whose path or linked building has
//! gone away drops back to idle.

use std::collections::HashMap;

use crate::components::{
    Building, BuildingId, BuildingKind, Entity, EntityId, EntityKind, EntityState, PlayerId,
    TravelGoal,
};
use crate::context::TickContext;
use crate::math::{Cell, Fixed, Vec2Fixed};
use crate::state::GameState;

/// Reservation counts per workshop, kept current through the behavior pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkshopLedger {
    counts: HashMap<BuildingId, usize>,
}

impl WorkshopLedger {
    /// Count the reservations currently held by units.
    #[must_use]
    pub fn from_state(state: &GameState) -> Self {
        let mut counts = HashMap::new();
        for entity in state.entities.values() {
            if let Some(workshop) = entity.reserved_factory_id {
                *counts.entry(workshop).or_insert(0) += 1;
            }
        }
        Self { counts }
    }

    /// Reservations held on a workshop.
    #[must_use]
    pub fn count(&self, workshop: BuildingId) -> usize {
        self.counts.get(&workshop).copied().unwrap_or(0)
    }

    fn release(&mut self, workshop: BuildingId) {
        if let Some(count) = self.counts.get_mut(&workshop) {
            *count = count.saturating_sub(1);
        }
    }

    fn reserve(&mut self, workshop: BuildingId) {
        *self.counts.entry(workshop).or_insert(0) += 1;
    }
}

/// Advance one unit by at most one transition.
pub fn step(state: &mut GameState, ctx: &mut TickContext<'_>, ledger: &mut WorkshopLedger, id: EntityId) {
    let Some(entity) = state.entities.get(id) else {
        return;
    };
    if entity.kind.is_static() {
        return;
    }

    let current = entity.state;
    match current {
        EntityState::Moving | EntityState::Patrol => advance_walk(state, ctx, id),
        EntityState::Working => finish_work(state, ctx, id),
        EntityState::Sleeping => finish_sleep(state, ctx, id),
        EntityState::Idle => idle(state, ctx, ledger, id),
    }
}

// ============================================================================
// Walking
// ============================================================================

fn advance_walk(state: &mut GameState, ctx: &mut TickContext<'_>, id: EntityId) {
    let step = ctx.config.progress_per_tick();
    let Some(entity) = state.entities.get_mut(id) else {
        return;
    };

    if entity.path.len() < 2 || entity.path_index + 1 >= entity.path.len() {
        let goal = entity.travel;
        if let Some(last) = entity.path.last() {
            entity.position = last.to_point();
        }
        arrive(state, ctx, id, goal);
        return;
    }

    entity.path_progress += step;
    if entity.path_progress >= Fixed::ONE {
        entity.path_progress = Fixed::ZERO;
        entity.path_index += 1;
    }

    let from = entity.path[entity.path_index];
    if entity.path_index + 1 >= entity.path.len() {
        entity.position = from.to_point();
        let goal = entity.travel;
        arrive(state, ctx, id, goal);
        return;
    }
    let to = entity.path[entity.path_index + 1];
    entity.position = from.to_point().lerp(to.to_point(), entity.path_progress);
}

fn arrive(state: &mut GameState, ctx: &mut TickContext<'_>, id: EntityId, goal: Option<TravelGoal>) {
    let Some(owner) = state.entities.get(id).map(|e| e.owner_id) else {
        return;
    };
    let now = ctx.now;

    match goal {
        Some(TravelGoal::Workshop(workshop))
            if owned_kind(state, workshop, owner, BuildingKind::Workshop)
                .is_some_and(|b| b.is_constructed(now)) =>
        {
            let until = ctx.deadline(ctx.config.work_duration);
            if let Some(entity) = state.entities.get_mut(id) {
                entity.clear_path();
                entity.state = EntityState::Working;
                entity.is_inside = true;
                entity.workplace_id = Some(workshop);
                entity.state_until = Some(until);
            }
        }
        Some(TravelGoal::Home(house))
            if owned_kind(state, house, owner, BuildingKind::House).is_some() =>
        {
            let until = ctx.deadline(ctx.config.sleep_duration);
            if let Some(entity) = state.entities.get_mut(id) {
                entity.clear_path();
                entity.state = EntityState::Sleeping;
                entity.is_inside = true;
                entity.state_until = Some(until);
            }
        }
        _ => {
            let until = ctx.deadline(ctx.config.arrival_cooldown);
            if let Some(entity) = state.entities.get_mut(id) {
                entity.become_idle(Some(until));
            }
        }
    }
}

// ============================================================================
// Timed states
// ============================================================================

fn finish_work(state: &mut GameState, ctx: &mut TickContext<'_>, id: EntityId) {
    let Some(entity) = state.entities.get(id) else {
        return;
    };
    if entity.state_until.is_some_and(|until| ctx.now < until) {
        return;
    }

    let owner = entity.owner_id;
    let start = entity.position.nearest_cell();
    let home = entity
        .home_id
        .and_then(|house| owned_kind(state, house, owner, BuildingKind::House))
        .map(|house| (house.id, house.rect.center().nearest_cell()));

    let path = home.and_then(|(house, goal)| ctx.path(start, goal).map(|path| (house, path)));
    match path {
        Some((house, path)) => {
            if let Some(entity) = state.entities.get_mut(id) {
                entity.become_idle(None);
                start_walk(entity, path, EntityState::Moving, TravelGoal::Home(house));
            }
        }
        None => {
            let until = ctx.deadline(ctx.config.idle_cooldown);
            if let Some(entity) = state.entities.get_mut(id) {
                entity.become_idle(Some(until));
            }
        }
    }
}

fn finish_sleep(state: &mut GameState, ctx: &mut TickContext<'_>, id: EntityId) {
    let now = ctx.now;
    let Some(entity) = state.entities.get(id) else {
        return;
    };
    if entity.state_until.is_some_and(|until| now < until) {
        return;
    }
    if let Some(entity) = state.entities.get_mut(id) {
        entity.become_idle(None);
    }
}

// ============================================================================
// Idle decisions
// ============================================================================

fn idle(state: &mut GameState, ctx: &mut TickContext<'_>, ledger: &mut WorkshopLedger, id: EntityId) {
    let now = ctx.now;
    let Some(entity) = state.entities.get(id) else {
        return;
    };
    if entity.state_until.is_some_and(|until| now < until) {
        return;
    }

    let owner = entity.owner_id;
    let kind = entity.kind;
    let position = entity.position;
    let may_path = entity.next_path_attempt.map_or(true, |t| now >= t);
    let confused = state.is_confused(owner, now, ctx.config.betrayal_confusion_ms);
    let order = entity
        .troop_id
        .and_then(|troop| state.troops.get(troop))
        .and_then(|troop| troop.target_pos);

    if !confused {
        if let Some(target) = order {
            let arrived = position.within(target, Fixed::from_num(ctx.config.order_arrival_radius));
            if !arrived && may_path {
                if walk_to(state, ctx, id, target.nearest_cell(), TravelGoal::Order) {
                    return;
                }
            }
        }

        if kind == EntityKind::Member {
            let round = state.game().is_round_tick(ctx.config.round_ticks);
            if let Some(workshop) = assign_job(state, ctx, ledger, id, round) {
                if may_path {
                    let goal = state
                        .buildings
                        .get(workshop)
                        .map(|b| b.rect.center().nearest_cell());
                    if let Some(goal) = goal {
                        if walk_to(state, ctx, id, goal, TravelGoal::Workshop(workshop)) {
                            return;
                        }
                    }
                }
            }
        }
    }

    if may_path && ctx.chance(ctx.config.patrol_chance()) {
        let (anchor, radius) = match order {
            Some(target) => (target, ctx.config.troop_patrol_radius),
            None => (position, ctx.config.patrol_radius),
        };
        let anchor = anchor.nearest_cell();
        let goal = Cell::new(anchor.x + ctx.offset(radius), anchor.y + ctx.offset(radius));
        let path = ctx.path(position.nearest_cell(), goal);
        if let Some(entity) = state.entities.get_mut(id) {
            match path {
                Some(path) if path.len() > 1 => {
                    entity.next_path_attempt = None;
                    start_walk(entity, path, EntityState::Patrol, TravelGoal::Wander);
                    return;
                }
                Some(_) => {}
                None => entity.next_path_attempt = Some(now + ctx.config.path_retry_ms),
            }
        }
    }

    let until = ctx.deadline(ctx.config.idle_cooldown);
    if let Some(entity) = state.entities.get_mut(id) {
        entity.state_until = Some(until);
    }
}

/// Request a path and start walking it. On failure the unit backs off from
/// the pathfinder for the retry window.
fn walk_to(state: &mut GameState, ctx: &TickContext<'_>, id: EntityId, goal: Cell, travel: TravelGoal) -> bool {
    let Some(start) = state.entities.get(id).map(|e| e.position.nearest_cell()) else {
        return false;
    };
    let path = ctx.path(start, goal);
    let Some(entity) = state.entities.get_mut(id) else {
        return false;
    };

    match path {
        // A single-cell path arrives on the next tick
        Some(path) => {
            entity.next_path_attempt = None;
            start_walk(entity, path, EntityState::Moving, travel);
            true
        }
        None => {
            tracing::trace!(entity = %id, ?goal, "No path; backing off");
            entity.next_path_attempt = Some(ctx.now + ctx.config.path_retry_ms);
            false
        }
    }
}

fn start_walk(entity: &mut Entity, path: Vec<Cell>, state: EntityState, travel: TravelGoal) {
    entity.path = path;
    entity.path_index = 0;
    entity.path_progress = Fixed::ZERO;
    entity.travel = Some(travel);
    entity.state = state;
    entity.state_until = None;
}

/// Keep or pick the member's workshop reservation.
///
/// A held reservation survives unless its workshop stopped being a valid
/// workplace, or this is a round tick and a nearer workshop has room.
fn assign_job(
    state: &mut GameState,
    ctx: &TickContext<'_>,
    ledger: &mut WorkshopLedger,
    id: EntityId,
    round: bool,
) -> Option<BuildingId> {
    let entity = state.entities.get(id)?;
    let owner = entity.owner_id;
    let position = entity.position;
    let current = entity
        .reserved_factory_id
        .filter(|&w| is_workplace(state, w, owner, ctx.now));

    if current.is_some() && !round {
        return current;
    }

    let capacity = ctx.config.workshop_capacity;
    let best = state
        .buildings
        .values()
        .filter(|b| is_workplace(state, b.id, owner, ctx.now))
        .filter(|b| Some(b.id) == current || ledger.count(b.id) < capacity)
        .min_by_key(|b| (position.distance_squared(b.rect.center()), b.id))
        .map(|b| b.id);

    let previous = state.entities.get(id).and_then(|e| e.reserved_factory_id);
    if previous != best {
        if let Some(old) = previous {
            ledger.release(old);
        }
        if let Some(new) = best {
            ledger.reserve(new);
        }
        if let Some(entity) = state.entities.get_mut(id) {
            entity.reserved_factory_id = best;
        }
    }
    best
}

fn is_workplace(state: &GameState, workshop: BuildingId, owner: PlayerId, now: u64) -> bool {
    owned_kind(state, workshop, owner, BuildingKind::Workshop)
        .is_some_and(|b| b.is_constructed(now) && b.health > 0)
}

fn owned_kind(state: &GameState, id: BuildingId, owner: PlayerId, kind: BuildingKind) -> Option<&Building> {
    state
        .buildings
        .get(id)
        .filter(|b| b.owner_id == owner && b.kind == kind)
}

/// Send every member of a troop back to idle so the next decision re-paths
/// towards the troop's current order.
///
/// Members of a confused owner keep walking; they ignore orders until the
/// confusion window ends.
pub fn reset_troop_paths(state: &mut GameState, members: &[EntityId], now: u64, confusion_ms: u64) {
    for &member in members {
        let Some(owner) = state.entities.get(member).map(|e| e.owner_id) else {
            continue;
        };
        if state.is_confused(owner, now, confusion_ms) {
            continue;
        }
        if let Some(entity) = state.entities.get_mut(member) {
            if entity.is_inside {
                continue;
            }
            entity.become_idle(None);
            entity.next_path_attempt = None;
        }
    }
}

/// Position a unit takes when it leaves a building.
#[must_use]
pub fn exit_point(building: &Building) -> Vec2Fixed {
    building.rect.origin().to_point()
}
