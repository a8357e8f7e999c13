//! Physical locators and exit directions.
//!
//! A router lives at a [`Locator`] on the 3D hexagonal mesh (axial `q`, `r`
//! plus layer `z`). The locator is only used to resolve the router back to
//! its topology representation; routing itself is keyed by [`crate::NodeId`].
//!
//! Each cell has 20 exits:
//! - 6 planar (hexagonal grid)
//! - 2 vertical (layer above/below)
//! - 12 extended (one hex step plus one layer)

use std::fmt;
use std::ops::{Add, Sub};

/// Number of exits per cell.
pub const EXIT_COUNT: usize = 20;

/// Position of a router in the hexagonal mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Locator {
    /// First axial coordinate
    pub q: i64,
    /// Second axial coordinate
    pub r: i64,
    /// Layer
    pub z: i64,
}

impl Locator {
    /// Origin of the mesh.
    pub const ORIGIN: Self = Self { q: 0, r: 0, z: 0 };

    /// Create a new locator.
    pub const fn new(q: i64, r: i64, z: i64) -> Self {
        Self { q, r, z }
    }

    /// Create a locator on layer 0.
    pub const fn planar(q: i64, r: i64) -> Self {
        Self { q, r, z: 0 }
    }

    /// Hex distance within a layer: max(|dq|, |dr|, |dq + dr|).
    pub fn hex_distance(&self, other: &Self) -> u64 {
        let dq = self.q - other.q;
        let dr = self.r - other.r;
        dq.unsigned_abs()
            .max(dr.unsigned_abs())
            .max((dq + dr).unsigned_abs())
    }

    /// The cell reached by leaving through `direction`.
    pub fn step(&self, direction: Direction) -> Self {
        *self + direction.offset()
    }

    /// Direction that leads from `self` to an adjacent `other`, if they are
    /// adjacent at all.
    pub fn direction_to(&self, other: &Self) -> Option<Direction> {
        Direction::from_offset(*other - *self)
    }
}

impl Add for Locator {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self::new(self.q + other.q, self.r + other.r, self.z + other.z)
    }
}

impl Sub for Locator {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Self::new(self.q - other.q, self.r - other.r, self.z - other.z)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.q, self.r, self.z)
    }
}

/// One of the 20 exits of a cell.
///
/// Indices 0-5 are planar, 6-7 vertical, 8-19 extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Direction(u8);

const OFFSETS: [Locator; EXIT_COUNT] = [
    // Planar: E, NE, NW, W, SW, SE
    Locator::new(1, 0, 0),
    Locator::new(1, -1, 0),
    Locator::new(0, -1, 0),
    Locator::new(-1, 0, 0),
    Locator::new(-1, 1, 0),
    Locator::new(0, 1, 0),
    // Vertical: up, down
    Locator::new(0, 0, 1),
    Locator::new(0, 0, -1),
    // Extended, layer above
    Locator::new(1, 0, 1),
    Locator::new(1, -1, 1),
    Locator::new(0, -1, 1),
    Locator::new(-1, 0, 1),
    Locator::new(-1, 1, 1),
    Locator::new(0, 1, 1),
    // Extended, layer below
    Locator::new(1, 0, -1),
    Locator::new(1, -1, -1),
    Locator::new(0, -1, -1),
    Locator::new(-1, 0, -1),
    Locator::new(-1, 1, -1),
    Locator::new(0, 1, -1),
];

const NAMES: [&str; EXIT_COUNT] = [
    "east", "northeast", "northwest", "west", "southwest", "southeast",
    "up", "down",
    "up-east", "up-northeast", "up-northwest", "up-west", "up-southwest", "up-southeast",
    "down-east", "down-northeast", "down-northwest", "down-west", "down-southwest", "down-southeast",
];

impl Direction {
    pub const EAST: Self = Self(0);
    pub const NORTHEAST: Self = Self(1);
    pub const NORTHWEST: Self = Self(2);
    pub const WEST: Self = Self(3);
    pub const SOUTHWEST: Self = Self(4);
    pub const SOUTHEAST: Self = Self(5);
    pub const UP: Self = Self(6);
    pub const DOWN: Self = Self(7);

    /// Every exit, in index order.
    pub const ALL: [Self; EXIT_COUNT] = {
        let mut all = [Self(0); EXIT_COUNT];
        let mut i = 0;
        while i < EXIT_COUNT {
            all[i] = Self(i as u8);
            i += 1;
        }
        all
    };

    /// The planar and vertical exits (the ones a pipe-like link can use
    /// without crossing a diagonal).
    pub const ORTHOGONAL: [Self; 8] = [
        Self::EAST,
        Self::NORTHEAST,
        Self::NORTHWEST,
        Self::WEST,
        Self::SOUTHWEST,
        Self::SOUTHEAST,
        Self::UP,
        Self::DOWN,
    ];

    /// Direction whose offset is exactly `offset`.
    pub fn from_offset(offset: Locator) -> Option<Self> {
        OFFSETS
            .iter()
            .position(|o| *o == offset)
            .map(|i| Self(i as u8))
    }

    /// Coordinate offset of this exit.
    pub const fn offset(&self) -> Locator {
        OFFSETS[self.0 as usize]
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(NAMES[self.0 as usize])
    }
}

/// Route-table value: how a packet leaves the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Exit {
    /// The destination is the source itself; no exit is taken.
    Local,
    /// Leave through this direction.
    Toward(Direction),
}

impl Exit {
    /// The direction, or `None` for [`Exit::Local`].
    pub fn direction(&self) -> Option<Direction> {
        match self {
            Exit::Local => None,
            Exit::Toward(d) => Some(*d),
        }
    }
}

impl fmt::Display for Exit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exit::Local => f.write_str("local"),
            Exit::Toward(d) => write!(f, "{}", d),
        }
    }
}
