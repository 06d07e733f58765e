//! Uniform hash grid for radius queries.
//!
//! Rebuilt from scratch every tick. Holds every unit that is outside a
//! building and can move, plus one point per building at its footprint
//! centre. Turret guns are not indexed; their mount building stands in for
//! them.

use std::collections::HashMap;

use crate::components::{Building, BuildingId, BuildingKind, Entity, EntityId, EntityKind, PlayerId};
use crate::math::{Fixed, Vec2Fixed};

/// What an index entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialRef {
    /// A unit.
    Unit {
        /// Entity id.
        id: EntityId,
        /// Unit kind.
        kind: EntityKind,
    },
    /// A building centre.
    Building {
        /// Building id.
        id: BuildingId,
        /// Building kind.
        kind: BuildingKind,
    },
}

/// One point in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpatialEntry {
    /// Referenced record.
    pub item: SpatialRef,
    /// Position at rebuild time.
    pub position: Vec2Fixed,
    /// Owner at rebuild time.
    pub owner_id: PlayerId,
}

/// Spatial hash keyed by integer cell.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    cell_size: Fixed,
    cells: HashMap<(i32, i32), Vec<SpatialEntry>>,
    len: usize,
}

impl SpatialIndex {
    /// Empty index with square cells of `cell_size` tiles.
    #[must_use]
    pub fn new(cell_size: i32) -> Self {
        Self {
            cell_size: Fixed::from_num(cell_size.max(1)),
            cells: HashMap::new(),
            len: 0,
        }
    }

    /// Index built from the given records.
    #[must_use]
    pub fn build<'a>(
        cell_size: i32,
        entities: impl IntoIterator<Item = &'a Entity>,
        buildings: impl IntoIterator<Item = &'a Building>,
    ) -> Self {
        let mut index = Self::new(cell_size);
        index.rebuild(entities, buildings);
        index
    }

    /// Replace the contents.
    ///
    /// Units inside buildings and static guns are skipped.
    pub fn rebuild<'a>(
        &mut self,
        entities: impl IntoIterator<Item = &'a Entity>,
        buildings: impl IntoIterator<Item = &'a Building>,
    ) {
        self.cells.clear();
        self.len = 0;

        for entity in entities {
            if entity.is_inside || entity.kind.is_static() {
                continue;
            }
            self.insert(SpatialEntry {
                item: SpatialRef::Unit {
                    id: entity.id,
                    kind: entity.kind,
                },
                position: entity.position,
                owner_id: entity.owner_id,
            });
        }
        for building in buildings {
            self.insert(SpatialEntry {
                item: SpatialRef::Building {
                    id: building.id,
                    kind: building.kind,
                },
                position: building.rect.center(),
                owner_id: building.owner_id,
            });
        }
    }

    /// Add one entry.
    pub fn insert(&mut self, entry: SpatialEntry) {
        let key = self.key(entry.position);
        self.cells.entry(key).or_default().push(entry);
        self.len += 1;
    }

    /// Number of indexed points.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Check if the index is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Entries within `radius` of `center` (Euclidean, inclusive).
    ///
    /// Results come in a fixed order for a given index: cells row by row,
    /// entries in insertion order within a cell.
    #[must_use]
    pub fn query(&self, center: Vec2Fixed, radius: Fixed) -> Vec<SpatialEntry> {
        let mut out = Vec::new();
        self.query_into(center, radius, &mut out);
        out
    }

    /// Like [`query`](Self::query), appending to a reusable buffer.
    pub fn query_into(&self, center: Vec2Fixed, radius: Fixed, out: &mut Vec<SpatialEntry>) {
        if radius < Fixed::ZERO {
            return;
        }
        let (min_x, min_y) = self.key(Vec2Fixed::new(center.x - radius, center.y - radius));
        let (max_x, max_y) = self.key(Vec2Fixed::new(center.x + radius, center.y + radius));

        for cy in min_y..=max_y {
            for cx in min_x..=max_x {
                let Some(bucket) = self.cells.get(&(cx, cy)) else {
                    continue;
                };
                out.extend(
                    bucket
                        .iter()
                        .filter(|entry| center.within(entry.position, radius)),
                );
            }
        }
    }

    fn key(&self, position: Vec2Fixed) -> (i32, i32) {
        (
            (position.x / self.cell_size).floor().to_num::<i32>(),
            (position.y / self.cell_size).floor().to_num::<i32>(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Rect;
    use proptest::prelude::*;

    fn unit(id: u64, x: i32, y: i32) -> Entity {
        Entity::new(
            EntityId(id),
            PlayerId(1),
            EntityKind::Soldier,
            Vec2Fixed::from_ints(x, y),
            10,
        )
    }

    fn ids(entries: &[SpatialEntry]) -> Vec<u64> {
        let mut ids: Vec<u64> = entries
            .iter()
            .map(|e| match e.item {
                SpatialRef::Unit { id, .. } => id.0,
                SpatialRef::Building { id, .. } => id.0 + 1_000,
            })
            .collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn test_inside_and_static_units_are_skipped() {
        let mut inside = unit(2, 0, 0);
        inside.is_inside = true;
        let mut gun = unit(3, 0, 0);
        gun.kind = EntityKind::TurretGun;
        let entities = [unit(1, 0, 0), inside, gun];

        let index = SpatialIndex::build(8, &entities, &[]);
        assert_eq!(index.len(), 1);
        assert_eq!(ids(&index.query(Vec2Fixed::ZERO, Fixed::from_num(5))), vec![1]);
    }

    #[test]
    fn test_buildings_indexed_at_centre() {
        let building = Building {
            id: BuildingId(1),
            owner_id: PlayerId(2),
            kind: BuildingKind::House,
            rect: Rect::new(10, 10, 3, 3),
            health: 300,
            construction_end: None,
            capture_start: None,
            capturing_owner_id: None,
        };
        let index = SpatialIndex::build(8, &[], &[building]);

        // Centre is (11.5, 11.5)
        let near = index.query(Vec2Fixed::from_ints(11, 11), Fixed::ONE);
        assert_eq!(near.len(), 1);
        assert!(index.query(Vec2Fixed::from_ints(10, 10), Fixed::ONE).is_empty());
    }

    #[test]
    fn test_query_crosses_cell_boundaries_and_negative_coords() {
        let entities = [unit(1, 7, 7), unit(2, 8, 8), unit(3, -1, -1), unit(4, 30, 30)];
        let index = SpatialIndex::build(8, &entities, &[]);

        let found = index.query(Vec2Fixed::from_ints(7, 8), Fixed::from_num(2));
        assert_eq!(ids(&found), vec![1, 2]);

        let found = index.query(Vec2Fixed::ZERO, Fixed::from_num(2));
        assert_eq!(ids(&found), vec![3]);
    }

    #[test]
    fn test_radius_is_inclusive() {
        let entities = [unit(1, 3, 4)];
        let index = SpatialIndex::build(8, &entities, &[]);
        assert_eq!(index.query(Vec2Fixed::ZERO, Fixed::from_num(5)).len(), 1);
        assert!(index
            .query(Vec2Fixed::ZERO, Fixed::from_num(5) - Fixed::DELTA)
            .is_empty());
    }

    proptest! {
        #[test]
        fn prop_query_matches_brute_force(
            points in proptest::collection::vec((-40i32..40, -40i32..40), 0..60),
            cx in -40i32..40,
            cy in -40i32..40,
            radius in 0i32..20,
            cell_size in 1i32..12,
        ) {
            let entities: Vec<Entity> = points
                .iter()
                .enumerate()
                .map(|(i, &(x, y))| unit(i as u64 + 1, x, y))
                .collect();
            let index = SpatialIndex::build(cell_size, &entities, &[]);
            let center = Vec2Fixed::from_ints(cx, cy);
            let radius = Fixed::from_num(radius);

            let expected: Vec<u64> = entities
                .iter()
                .filter(|e| center.within(e.position, radius))
                .map(|e| e.id.0)
                .collect();
            prop_assert_eq!(ids(&index.query(center, radius)), expected);
        }
    }
}
