//! Credits and inflation.
//!
//! Every round (a fixed number of ticks) each player's inflation decays
//! towards 1, and every unit working inside a powered workshop earns its
//! owner a fixed income. The first building of each kind a player owns is
//! free; every other build costs `base × inflation` and doubles inflation.
//!
//! Inflation is fixed-point and never drops below one.

use crate::components::{BuildingKind, EntityState, Player, PlayerId};
use crate::config::SimConfig;
use crate::context::TickContext;
use crate::math::Fixed;
use crate::state::GameState;

/// Price of a build for one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildQuote {
    /// Credits to pay.
    pub cost: i64,
    /// Whether the build counts as paid and doubles inflation.
    pub paid: bool,
}

/// Inflation after one round of decay, floored at one.
#[must_use]
pub fn decay_inflation(inflation: Fixed, decay: Fixed) -> Fixed {
    inflation.saturating_sub(decay).max(Fixed::ONE)
}

/// Inflation after a paid build.
#[must_use]
pub fn double_inflation(inflation: Fixed) -> Fixed {
    inflation.max(Fixed::ONE).saturating_mul_int(2)
}

/// Price a build of `kind` for `player`.
#[must_use]
pub fn quote(state: &GameState, config: &SimConfig, player: &Player, kind: BuildingKind) -> BuildQuote {
    if state.owned_count(player.id, kind) == 0 {
        return BuildQuote { cost: 0, paid: false };
    }
    let base = config.buildings.get(kind).cost;
    let cost = Fixed::saturating_from_num(base)
        .saturating_mul(player.inflation)
        .to_num::<i64>();
    BuildQuote { cost, paid: true }
}

/// Take the quoted credits and apply the inflation rule.
pub fn charge(player: &mut Player, quote: BuildQuote) {
    player.credits = player.credits.saturating_sub(quote.cost);
    if quote.paid {
        player.inflation = double_inflation(player.inflation);
    }
}

/// Round-tick economy: inflation decay and workshop income.
pub fn run_round(state: &mut GameState, ctx: &mut TickContext<'_>) {
    let decay = ctx.config.inflation_decay();
    for id in state.players.sorted_ids() {
        let above_floor = state.players.get(id).is_some_and(|p| p.inflation > Fixed::ONE);
        if above_floor {
            if let Some(player) = state.players.get_mut(id) {
                player.inflation = decay_inflation(player.inflation, decay);
            }
        }
    }

    let mut earnings: Vec<PlayerId> = Vec::new();
    for worker in state.entities.values() {
        if worker.state != EntityState::Working || !worker.is_inside {
            continue;
        }
        let Some(workshop) = worker.workplace_id.and_then(|w| state.buildings.get(w)) else {
            continue;
        };
        if workshop.kind == BuildingKind::Workshop
            && workshop.owner_id == worker.owner_id
            && workshop.is_constructed(ctx.now)
            && ctx.is_powered(workshop.id)
        {
            earnings.push(worker.owner_id);
        }
    }

    let income = ctx.config.income_per_worker;
    for owner in earnings {
        let Some(player) = state.players.get_mut(owner) else {
            continue;
        };
        if !player.is_active() {
            continue;
        }
        player.credits = player.credits.saturating_add(income);
        ctx.report.income += income;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::ratio;

    #[test]
    fn test_decay_floors_at_one() {
        let decay = ratio(1, 10);
        assert_eq!(decay_inflation(Fixed::ONE, decay), Fixed::ONE);
        assert_eq!(decay_inflation(ratio(21, 20), decay), Fixed::ONE);
        assert_eq!(decay_inflation(Fixed::from_num(2), decay), Fixed::from_num(2) - decay);
    }

    #[test]
    fn test_double_is_exact() {
        assert_eq!(double_inflation(Fixed::ONE), Fixed::from_num(2));
        assert_eq!(double_inflation(ratio(3, 2)), Fixed::from_num(3));
    }

    #[test]
    fn test_double_saturates() {
        let huge = Fixed::MAX / Fixed::from_num(2) + Fixed::ONE;
        assert_eq!(double_inflation(huge), Fixed::MAX);
    }

    #[test]
    fn test_charge_applies_inflation_only_when_paid() {
        let mut player = Player::new(PlayerId(1), 1_000);
        charge(&mut player, BuildQuote { cost: 0, paid: false });
        assert_eq!(player.inflation, Fixed::ONE);
        assert_eq!(player.credits, 1_000);

        charge(&mut player, BuildQuote { cost: 500, paid: true });
        assert_eq!(player.inflation, Fixed::from_num(2));
        assert_eq!(player.credits, 500);
    }
}
