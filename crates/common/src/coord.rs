use serde::{Deserialize, Serialize};
use std::fmt;

/// A coordinate on the exterior cell grid.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct CellCoord {
    pub x: i32,
    pub z: i32,
}

impl CellCoord {
    /// Slot interior cells are tracked under. Never inside any streaming window
    /// that a real viewpoint can produce.
    pub const INTERIOR: CellCoord = CellCoord {
        x: i32::MIN,
        z: i32::MIN,
    };

    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Chebyshev (chessboard) distance in cells.
    pub fn chebyshev(self, other: CellCoord) -> u32 {
        self.x.abs_diff(other.x).max(self.z.abs_diff(other.z))
    }

    pub fn is_interior_sentinel(self) -> bool {
        self == Self::INTERIOR
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_interior_sentinel() {
            write!(f, "(interior)")
        } else {
            write!(f, "({}, {})", self.x, self.z)
        }
    }
}
