//! Grid collision layer.
//!
//! Combines the map's static impassability with the set of cells covered by
//! building footprints. The building layer is a pure function of the current
//! buildings and is rebuilt once per tick.

use std::collections::HashSet;

use crate::components::{Building, Rect};
use crate::error::{GameError, Result};
use crate::map::MapDocument;
use crate::math::Cell;

/// Walkability grid used by pathfinding and placement validation.
#[derive(Debug, Clone)]
pub struct CollisionGrid {
    /// Grid width in cells.
    width: i32,
    /// Grid height in cells.
    height: i32,
    /// Terrain and structure blockers, row-major.
    static_blocked: Vec<bool>,
    /// Cells covered by any building footprint.
    occupied: HashSet<Cell>,
}

impl CollisionGrid {
    /// Grid with the map's static layer and no buildings.
    #[must_use]
    pub fn new(map: &MapDocument) -> Self {
        Self {
            width: map.width,
            height: map.height,
            static_blocked: map.static_blocked(),
            occupied: HashSet::new(),
        }
    }

    /// Grid with the map's static layer and the given buildings.
    #[must_use]
    pub fn build<'a>(map: &MapDocument, buildings: impl IntoIterator<Item = &'a Building>) -> Self {
        let mut grid = Self::new(map);
        grid.rebuild_buildings(buildings);
        grid
    }

    /// Replace the building layer.
    pub fn rebuild_buildings<'a>(&mut self, buildings: impl IntoIterator<Item = &'a Building>) {
        self.occupied.clear();
        for building in buildings {
            self.occupied.extend(building.rect.cells());
        }
    }

    /// Grid width in cells.
    #[must_use]
    pub const fn width(&self) -> i32 {
        self.width
    }

    /// Grid height in cells.
    #[must_use]
    pub const fn height(&self) -> i32 {
        self.height
    }

    /// Check if a cell is on the grid.
    #[must_use]
    pub const fn in_bounds(&self, cell: Cell) -> bool {
        cell.x >= 0 && cell.y >= 0 && cell.x < self.width && cell.y < self.height
    }

    /// Whether a building footprint covers the cell.
    #[must_use]
    pub fn is_occupied(&self, cell: Cell) -> bool {
        self.occupied.contains(&cell)
    }

    /// Whether terrain or a structure blocks the cell.
    #[must_use]
    pub fn is_statically_blocked(&self, cell: Cell) -> bool {
        if !self.in_bounds(cell) {
            return true;
        }
        self.static_blocked
            .get(cell.y as usize * self.width as usize + cell.x as usize)
            .copied()
            .unwrap_or(true)
    }

    /// Whether a unit may stand on the cell.
    #[must_use]
    pub fn is_walkable(&self, cell: Cell) -> bool {
        self.in_bounds(cell) && !self.is_statically_blocked(cell) && !self.is_occupied(cell)
    }

    /// Number of cells covered by buildings.
    #[must_use]
    pub fn occupied_count(&self) -> usize {
        self.occupied.len()
    }

    /// Validate a footprint for placement.
    ///
    /// # Errors
    ///
    /// `OutOfBounds` when any cell leaves the map or sits on impassable
    /// terrain, `Collision` when any cell is covered by a building.
    pub fn check_placement(&self, rect: &Rect) -> Result<()> {
        if rect.width <= 0 || rect.height <= 0 {
            return Err(GameError::OutOfBounds);
        }
        for cell in rect.cells() {
            if self.is_statically_blocked(cell) {
                return Err(GameError::OutOfBounds);
            }
        }
        if rect.cells().any(|cell| self.is_occupied(cell)) {
            return Err(GameError::Collision);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{BuildingId, BuildingKind, PlayerId};
    use crate::map::{Structure, StructureKind};

    fn building(id: u64, rect: Rect) -> Building {
        Building {
            id: BuildingId(id),
            owner_id: PlayerId(1),
            kind: BuildingKind::House,
            rect,
            health: 100,
            construction_end: None,
            capture_start: None,
            capturing_owner_id: None,
        }
    }

    #[test]
    fn test_occupied_cells_from_footprints() {
        let map = MapDocument::open("test", 20, 20);
        let buildings = [building(1, Rect::new(2, 2, 3, 3)), building(2, Rect::new(10, 10, 1, 1))];
        let grid = CollisionGrid::build(&map, &buildings);

        assert_eq!(grid.occupied_count(), 10);
        assert!(!grid.is_walkable(Cell::new(4, 4)));
        assert!(grid.is_walkable(Cell::new(5, 4)));
        assert!(!grid.is_walkable(Cell::new(10, 10)));
    }

    #[test]
    fn test_rebuild_drops_removed_buildings() {
        let map = MapDocument::open("test", 20, 20);
        let mut grid = CollisionGrid::build(&map, &[building(1, Rect::new(0, 0, 2, 2))]);
        assert!(grid.is_occupied(Cell::new(1, 1)));

        grid.rebuild_buildings(&[]);
        assert!(!grid.is_occupied(Cell::new(1, 1)));
    }

    #[test]
    fn test_placement_checks() {
        let mut map = MapDocument::open("test", 20, 20);
        map.structures.push(Structure {
            kind: StructureKind::Boulder,
            rect: Rect::new(15, 15, 1, 1),
        });
        let grid = CollisionGrid::build(&map, &[building(1, Rect::new(5, 5, 3, 3))]);

        assert!(grid.check_placement(&Rect::new(0, 0, 5, 5)).is_ok());
        assert!(matches!(
            grid.check_placement(&Rect::new(6, 6, 3, 3)),
            Err(GameError::Collision)
        ));
        assert!(matches!(
            grid.check_placement(&Rect::new(18, 18, 3, 3)),
            Err(GameError::OutOfBounds)
        ));
        assert!(matches!(
            grid.check_placement(&Rect::new(14, 14, 2, 2)),
            Err(GameError::OutOfBounds)
        ));
    }
}
