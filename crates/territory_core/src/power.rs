//! Power propagation.
//!
//! A player's buildings form a graph: two buildings are linked when their
//! centres are no further apart than `gap + radius_a + radius_b`. Everything
//! reachable from one of the player's central bases is powered. The same
//! link rule decides where new buildings may be placed (the energy field).

use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::components::{Building, BuildingId, BuildingKind, PlayerId, Rect};
use crate::math::Fixed;

/// Whether two footprints are within each other's energy field.
#[must_use]
pub fn energy_link(a: &Rect, b: &Rect, gap: i32) -> bool {
    let reach = Fixed::from_num(gap) + a.radius() + b.radius();
    a.center().within(b.center(), reach)
}

/// Whether a new footprint would sit in the energy field of any of the
/// given buildings.
#[must_use]
pub fn in_energy_field<'a>(
    rect: &Rect,
    owned: impl IntoIterator<Item = &'a Building>,
    gap: i32,
) -> bool {
    owned
        .into_iter()
        .any(|building| energy_link(rect, &building.rect, gap))
}

/// Set of energized buildings for one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PowerGrid {
    powered: HashSet<BuildingId>,
}

impl PowerGrid {
    /// Run the per-owner BFS over all buildings.
    #[must_use]
    pub fn compute<'a>(buildings: impl IntoIterator<Item = &'a Building>, gap: i32) -> Self {
        let mut by_owner: BTreeMap<PlayerId, Vec<&Building>> = BTreeMap::new();
        for building in buildings {
            by_owner.entry(building.owner_id).or_default().push(building);
        }

        let mut powered = HashSet::new();
        for owned in by_owner.values() {
            let mut visited = vec![false; owned.len()];
            let mut queue = VecDeque::new();
            for (i, building) in owned.iter().enumerate() {
                if building.kind == BuildingKind::BaseCentral {
                    visited[i] = true;
                    queue.push_back(i);
                }
            }

            while let Some(current) = queue.pop_front() {
                powered.insert(owned[current].id);
                for (next, building) in owned.iter().enumerate() {
                    if !visited[next] && energy_link(&owned[current].rect, &building.rect, gap) {
                        visited[next] = true;
                        queue.push_back(next);
                    }
                }
            }
        }

        Self { powered }
    }

    /// Whether the building is energized this tick.
    #[must_use]
    pub fn is_powered(&self, id: BuildingId) -> bool {
        self.powered.contains(&id)
    }

    /// Number of energized buildings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.powered.len()
    }

    /// Check if nothing is energized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.powered.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn building(id: u64, owner: u64, kind: BuildingKind, rect: Rect) -> Building {
        Building {
            id: BuildingId(id),
            owner_id: PlayerId(owner),
            kind,
            rect,
            health: 100,
            construction_end: None,
            capture_start: None,
            capturing_owner_id: None,
        }
    }

    fn base(id: u64, owner: u64, x: i32, y: i32) -> Building {
        building(id, owner, BuildingKind::BaseCentral, Rect::new(x, y, 5, 5))
    }

    fn house(id: u64, owner: u64, x: i32, y: i32) -> Building {
        building(id, owner, BuildingKind::House, Rect::new(x, y, 3, 3))
    }

    #[test]
    fn test_link_boundary_is_inclusive() {
        // Base centre x = 2.5, r = 2.5; house r = 1.5; reach = 4 + 4 = 8
        let base = Rect::new(0, 0, 5, 5);
        let at_limit = Rect::new(9, 1, 3, 3); // centre x = 10.5
        let past_limit = Rect::new(10, 1, 3, 3);
        assert!(energy_link(&base, &at_limit, 4));
        assert!(!energy_link(&base, &past_limit, 4));
    }

    #[test]
    fn test_chain_propagates_from_base() {
        let buildings = [
            base(1, 1, 0, 0),
            house(2, 1, 9, 1),
            // Linked to the house only: house centre 10.5, this centre 17.5
            house(3, 1, 16, 1),
            // Isolated
            house(4, 1, 60, 60),
        ];
        let grid = PowerGrid::compute(&buildings, 4);

        assert!(grid.is_powered(BuildingId(1)));
        assert!(grid.is_powered(BuildingId(2)));
        assert!(grid.is_powered(BuildingId(3)));
        assert!(!grid.is_powered(BuildingId(4)));
        assert_eq!(grid.len(), 3);
    }

    #[test]
    fn test_power_does_not_cross_owners() {
        let buildings = [base(1, 1, 0, 0), house(2, 2, 9, 1)];
        let grid = PowerGrid::compute(&buildings, 4);
        assert!(grid.is_powered(BuildingId(1)));
        assert!(!grid.is_powered(BuildingId(2)));
    }

    #[test]
    fn test_no_base_no_power() {
        let buildings = [house(1, 1, 0, 0), house(2, 1, 3, 0)];
        assert!(PowerGrid::compute(&buildings, 4).is_empty());
    }

    #[test]
    fn test_energy_field_placement() {
        let owned = [base(1, 1, 0, 0)];
        assert!(in_energy_field(&Rect::new(9, 1, 3, 3), &owned, 4));
        assert!(!in_energy_field(&Rect::new(20, 20, 3, 3), &owned, 4));
    }
}
