//! Proptest strategies.
//!
//! These generate random but reproducible inputs for property-based
//! testing of the engine's invariants.

use proptest::prelude::*;
use territory_core::components::{BuildingKind, Rect};
use territory_core::math::{Cell, Fixed, Vec2Fixed};

/// A cell on a `width × height` grid.
pub fn arb_cell(width: i32, height: i32) -> impl Strategy<Value = Cell> {
    (0..width, 0..height).prop_map(|(x, y)| Cell::new(x, y))
}

/// A point with whole and fractional parts on a `width × height` grid.
pub fn arb_position(width: i32, height: i32) -> impl Strategy<Value = Vec2Fixed> {
    (0..width, 0..height, 0u32..4, 0u32..4).prop_map(|(x, y, fx, fy)| {
        let quarter = Fixed::from_num(1) / Fixed::from_num(4);
        Vec2Fixed::new(
            Fixed::from_num(x) + quarter * Fixed::from_num(fx),
            Fixed::from_num(y) + quarter * Fixed::from_num(fy),
        )
    })
}

/// Any building kind.
pub fn arb_building_kind() -> impl Strategy<Value = BuildingKind> {
    proptest::sample::select(BuildingKind::ALL.to_vec())
}

/// A small footprint fully inside a `width × height` grid.
pub fn arb_rect(width: i32, height: i32) -> impl Strategy<Value = Rect> {
    (1..=5i32, 1..=5i32).prop_flat_map(move |(w, h)| {
        (0..=(width - w).max(0), 0..=(height - h).max(0))
            .prop_map(move |(x, y)| Rect::new(x, y, w, h))
    })
}

/// Up to `max` blocked cells on a `width × height` grid.
pub fn arb_walls(width: i32, height: i32, max: usize) -> impl Strategy<Value = Vec<Cell>> {
    proptest::collection::vec(arb_cell(width, height), 0..max)
}

/// Something that can happen to a player's inflation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InflationEvent {
    /// A paid build.
    PaidBuild,
    /// A free build.
    FreeBuild,
    /// A round of decay.
    Round,
}

/// A sequence of inflation events.
pub fn arb_inflation_events(max_len: usize) -> impl Strategy<Value = Vec<InflationEvent>> {
    proptest::collection::vec(
        prop_oneof![
            1 => Just(InflationEvent::PaidBuild),
            1 => Just(InflationEvent::FreeBuild),
            3 => Just(InflationEvent::Round),
        ],
        0..max_len,
    )
}
