//! Static map document: terrain chunks and fixed structures.
//!
//! The map never changes during a game. Terrain is stored in square chunks;
//! cells not covered by any chunk are open grass.

use serde::{Deserialize, Serialize};

use crate::components::Rect;
use crate::math::Cell;

/// Terrain of a single tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Terrain {
    /// Open ground.
    #[default]
    Grass,
    /// Open ground.
    Sand,
    /// Open ground.
    Forest,
    /// Impassable.
    Water,
    /// Impassable.
    Rock,
}

impl Terrain {
    /// Whether units can stand on this terrain.
    #[must_use]
    pub const fn is_passable(self) -> bool {
        !matches!(self, Self::Water | Self::Rock)
    }
}

/// A square block of terrain tiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrainChunk {
    /// Chunk column.
    pub cx: i32,
    /// Chunk row.
    pub cy: i32,
    /// Row-major tiles, `chunk_size * chunk_size` long.
    pub tiles: Vec<Terrain>,
}

/// Kind of static obstacle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StructureKind {
    /// Boulder.
    Boulder,
    /// Ruined building.
    Ruin,
    /// Tree cluster.
    Grove,
}

/// A static obstacle placed with the map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Structure {
    /// Kind of obstacle.
    pub kind: StructureKind,
    /// Footprint.
    pub rect: Rect,
}

/// The static part of a game world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapDocument {
    /// Map identifier.
    pub id: String,
    /// Width in tiles.
    pub width: i32,
    /// Height in tiles.
    pub height: i32,
    /// Side length of a terrain chunk.
    pub chunk_size: i32,
    /// Terrain chunks.
    pub chunks: Vec<TerrainChunk>,
    /// Static obstacles.
    pub structures: Vec<Structure>,
}

impl MapDocument {
    /// An empty open map.
    #[must_use]
    pub fn open(id: impl Into<String>, width: i32, height: i32) -> Self {
        Self {
            id: id.into(),
            width,
            height,
            chunk_size: 16,
            chunks: Vec::new(),
            structures: Vec::new(),
        }
    }

    /// Whether the cell lies on the map.
    #[must_use]
    pub const fn in_bounds(&self, cell: Cell) -> bool {
        cell.x >= 0 && cell.y >= 0 && cell.x < self.width && cell.y < self.height
    }

    /// Whether the footprint lies fully on the map.
    #[must_use]
    pub const fn contains_rect(&self, rect: &Rect) -> bool {
        rect.x >= 0
            && rect.y >= 0
            && rect.width > 0
            && rect.height > 0
            && rect.x + rect.width <= self.width
            && rect.y + rect.height <= self.height
    }

    /// Terrain at a cell; off-map cells read as rock.
    #[must_use]
    pub fn terrain_at(&self, cell: Cell) -> Terrain {
        if !self.in_bounds(cell) {
            return Terrain::Rock;
        }
        let size = self.chunk_size.max(1);
        let (cx, cy) = (cell.x.div_euclid(size), cell.y.div_euclid(size));
        self.chunks
            .iter()
            .find(|chunk| chunk.cx == cx && chunk.cy == cy)
            .and_then(|chunk| {
                let local = cell.y.rem_euclid(size) * size + cell.x.rem_euclid(size);
                chunk.tiles.get(local as usize).copied()
            })
            .unwrap_or_default()
    }

    /// Row-major impassability layer for the whole map.
    #[must_use]
    pub fn static_blocked(&self) -> Vec<bool> {
        let width = self.width.max(0) as usize;
        let height = self.height.max(0) as usize;
        let mut blocked = vec![false; width * height];
        let size = self.chunk_size.max(1);

        for chunk in &self.chunks {
            for (i, tile) in chunk.tiles.iter().enumerate() {
                if tile.is_passable() {
                    continue;
                }
                let i = i as i32;
                let cell = Cell::new(chunk.cx * size + i % size, chunk.cy * size + i / size);
                if self.in_bounds(cell) {
                    blocked[cell.y as usize * width + cell.x as usize] = true;
                }
            }
        }
        for structure in &self.structures {
            for cell in structure.rect.cells() {
                if self.in_bounds(cell) {
                    blocked[cell.y as usize * width + cell.x as usize] = true;
                }
            }
        }
        blocked
    }
}
