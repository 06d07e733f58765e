//! Fixed-point math and grid coordinates.
//!
//! Positions, inflation, accuracy and distances are all fixed-point so that
//! two runtimes fed the same inputs reach bit-identical states.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// 32 integer bits and 32 fractional bits. The fractional half is exactly
/// the width of a `u32`, which is what [`fraction_from_bits`] relies on.
pub type Fixed = I32F32;

/// Integer grid cell (tile) coordinate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Cell {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl Cell {
    /// Create a cell.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance between two cells.
    #[must_use]
    pub const fn manhattan(self, other: Self) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// The four orthogonal neighbours, in a fixed order (E, S, W, N).
    #[must_use]
    pub const fn neighbours(self) -> [Self; 4] {
        [
            Self::new(self.x + 1, self.y),
            Self::new(self.x, self.y + 1),
            Self::new(self.x - 1, self.y),
            Self::new(self.x, self.y - 1),
        ]
    }

    /// World-space point at this cell's origin.
    #[must_use]
    pub fn to_point(self) -> Vec2Fixed {
        Vec2Fixed::from_ints(self.x, self.y)
    }
}

/// Fixed-point 2D vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Create a vector from integer coordinates.
    #[must_use]
    pub fn from_ints(x: i32, y: i32) -> Self {
        Self::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Calculate squared distance (avoids sqrt for comparisons).
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Whether `other` lies within `radius` (inclusive, Euclidean).
    #[must_use]
    pub fn within(self, other: Self, radius: Fixed) -> bool {
        self.distance_squared(other) <= radius * radius
    }

    /// Linearly interpolate between two vectors.
    #[must_use]
    pub fn lerp(self, other: Self, t: Fixed) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    /// The grid cell nearest to this point.
    #[must_use]
    pub fn nearest_cell(self) -> Cell {
        Cell::new(self.x.round().to_num::<i32>(), self.y.round().to_num::<i32>())
    }
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

/// Interpret 32 random bits as a uniform fraction in `[0, 1)`.
#[must_use]
pub fn fraction_from_bits(bits: u32) -> Fixed {
    Fixed::from_bits(i64::from(bits))
}

/// Fixed-point literal from a ratio of integers, for config defaults.
#[must_use]
pub fn ratio(numerator: i32, denominator: i32) -> Fixed {
    Fixed::from_num(numerator) / Fixed::from_num(denominator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec2_distance_squared() {
        let a = Vec2Fixed::from_ints(3, 0);
        let b = Vec2Fixed::from_ints(0, 4);
        // 3² + 4² = 25
        assert_eq!(a.distance_squared(b), Fixed::from_num(25));
        assert!(a.within(b, Fixed::from_num(5)));
        assert!(!a.within(b, Fixed::from_num(5) - Fixed::DELTA));
    }

    #[test]
    fn test_vec2_lerp() {
        let a = Vec2Fixed::from_ints(0, 0);
        let b = Vec2Fixed::from_ints(10, 20);
        let mid = a.lerp(b, ratio(1, 2));
        assert_eq!(mid, Vec2Fixed::from_ints(5, 10));
    }

    #[test]
    fn test_nearest_cell_rounds() {
        let p = Vec2Fixed::new(ratio(26, 10), ratio(14, 10));
        assert_eq!(p.nearest_cell(), Cell::new(3, 1));
    }

    #[test]
    fn test_fraction_from_bits_bounds() {
        assert_eq!(fraction_from_bits(0), Fixed::ZERO);
        assert!(fraction_from_bits(u32::MAX) < Fixed::ONE);
        assert_eq!(fraction_from_bits(1 << 31), ratio(1, 2));
    }

    #[test]
    fn test_cell_manhattan_and_neighbours() {
        let c = Cell::new(2, 2);
        assert_eq!(c.manhattan(Cell::new(5, 0)), 5);
        for n in c.neighbours() {
            assert_eq!(c.manhattan(n), 1);
        }
    }
}
