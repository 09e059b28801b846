use cellworld_common::CellCoord;
use glam::Vec3;

/// Largest cell coordinate magnitude a viewpoint maps to. Leaves room for any
/// window offset without overflow or reaching [`CellCoord::INTERIOR`].
pub const MAX_CELL_COORD: i32 = 1 << 24;

/// Fixed-size exterior cell grid.
///
/// World positions map to cells by flooring X and Z by the side length; the
/// vertical axis is ignored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellGrid {
    cell_side_length: f32,
}

impl CellGrid {
    /// Create a grid with the given cell side length.
    pub fn new(cell_side_length: f32) -> Self {
        assert!(cell_side_length > 0.0, "cell_side_length must be positive");
        Self { cell_side_length }
    }

    pub fn cell_side_length(&self) -> f32 {
        self.cell_side_length
    }

    /// Convert a world position to a cell coordinate, clamped to
    /// `±MAX_CELL_COORD`. NaN maps to zero.
    pub fn position_to_cell(&self, pos: Vec3) -> CellCoord {
        CellCoord {
            x: self.axis_to_cell(pos.x),
            z: self.axis_to_cell(pos.z),
        }
    }

    fn axis_to_cell(&self, v: f32) -> i32 {
        let limit = MAX_CELL_COORD as f32;
        (v / self.cell_side_length).floor().clamp(-limit, limit) as i32
    }

    /// World position of a cell's minimum corner at height zero.
    pub fn cell_origin(&self, coord: CellCoord) -> Vec3 {
        Vec3::new(
            coord.x as f32 * self.cell_side_length,
            0.0,
            coord.z as f32 * self.cell_side_length,
        )
    }

    /// World position of a cell's centre at height zero.
    pub fn cell_center(&self, coord: CellCoord) -> Vec3 {
        let half = self.cell_side_length * 0.5;
        self.cell_origin(coord) + Vec3::new(half, 0.0, half)
    }
}

/// Whether `coord` lies in the square window of `radius` cells around
/// `center`.
pub fn in_window(center: CellCoord, radius: u32, coord: CellCoord) -> bool {
    center.chebyshev(coord) <= radius
}

/// Cells at Chebyshev distance exactly `r` from `center`, row-major by z
/// then x. Offsets past the `i32` range and the interior slot are left out.
pub fn ring(center: CellCoord, r: u32) -> Vec<CellCoord> {
    if r == 0 {
        return vec![center];
    }
    let Ok(r) = i32::try_from(r) else {
        return Vec::new();
    };
    let mut cells = Vec::with_capacity((r as usize).saturating_mul(8).min(1 << 12));
    let mut push = |dx: i32, dz: i32| {
        let (Some(x), Some(z)) = (center.x.checked_add(dx), center.z.checked_add(dz)) else {
            return;
        };
        let coord = CellCoord::new(x, z);
        if !coord.is_interior_sentinel() {
            cells.push(coord);
        }
    };
    for dz in -r..=r {
        if dz.abs() == r {
            for dx in -r..=r {
                push(dx, dz);
            }
        } else {
            push(-r, dz);
            push(r, dz);
        }
    }
    cells
}

/// Every cell of the window, nearest ring first.
pub fn rings(center: CellCoord, radius: u32) -> impl Iterator<Item = CellCoord> {
    (0..=radius).flat_map(move |r| ring(center, r))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_to_cell_basic() {
        let grid = CellGrid::new(16.0);
        let coord = grid.position_to_cell(Vec3::new(10.0, 0.0, 10.0));
        assert_eq!(coord, CellCoord::new(0, 0));

        let coord = grid.position_to_cell(Vec3::new(20.0, 500.0, -5.0));
        assert_eq!(coord, CellCoord::new(1, -1));
    }

    #[test]
    fn cell_boundaries_floor() {
        let grid = CellGrid::new(8192.0);
        assert_eq!(
            grid.position_to_cell(Vec3::new(8192.0, 0.0, -0.001)),
            CellCoord::new(1, -1)
        );
        assert_eq!(
            grid.cell_origin(CellCoord::new(-2, 3)),
            Vec3::new(-16384.0, 0.0, 24576.0)
        );
        assert_eq!(
            grid.cell_center(CellCoord::new(0, 0)),
            Vec3::new(4096.0, 0.0, 4096.0)
        );
    }

    #[test]
    fn ring_sizes() {
        let center = CellCoord::new(3, -7);
        assert_eq!(ring(center, 0), vec![center]);
        for r in 1..5u32 {
            let cells = ring(center, r);
            assert_eq!(cells.len(), 8 * r as usize);
            assert!(cells.iter().all(|c| c.chebyshev(center) == r));
        }
    }

    #[test]
    fn ring_is_row_major() {
        let cells = ring(CellCoord::new(0, 0), 1);
        let expected = [
            (-1, -1),
            (0, -1),
            (1, -1),
            (-1, 0),
            (1, 0),
            (-1, 1),
            (0, 1),
            (1, 1),
        ];
        let expected: Vec<CellCoord> = expected
            .iter()
            .map(|&(x, z)| CellCoord::new(x, z))
            .collect();
        assert_eq!(cells, expected);
    }

    #[test]
    fn rings_cover_window_once() {
        let center = CellCoord::new(-1, 2);
        let cells: Vec<CellCoord> = rings(center, 3).collect();
        assert_eq!(cells.len(), 49);
        let unique: std::collections::BTreeSet<_> = cells.iter().copied().collect();
        assert_eq!(unique.len(), 49);
        assert!(cells.iter().all(|c| in_window(center, 3, *c)));
        // Nearest first.
        let distances: Vec<u32> = cells.iter().map(|c| c.chebyshev(center)).collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn far_positions_clamp() {
        let grid = CellGrid::new(16.0);
        assert_eq!(
            grid.position_to_cell(Vec3::new(1.0e30, 0.0, -1.0e30)),
            CellCoord::new(MAX_CELL_COORD, -MAX_CELL_COORD)
        );
        assert_eq!(
            grid.position_to_cell(Vec3::new(f32::NEG_INFINITY, 0.0, f32::NEG_INFINITY)),
            CellCoord::new(-MAX_CELL_COORD, -MAX_CELL_COORD)
        );
        assert_eq!(
            grid.position_to_cell(Vec3::new(f32::NAN, 0.0, 0.0)),
            CellCoord::new(0, 0)
        );
    }

    #[test]
    fn ring_at_i32_edge_skips_overflow() {
        let cells = ring(CellCoord::new(i32::MAX, 0), 1);
        assert_eq!(cells.len(), 5);
        assert!(cells.iter().all(|c| c.x >= i32::MAX - 1));
    }

    #[test]
    fn ring_never_yields_interior_slot() {
        let center = CellCoord::new(i32::MIN + 1, i32::MIN + 1);
        let cells = ring(center, 1);
        assert_eq!(cells.len(), 7);
        assert!(!cells.contains(&CellCoord::INTERIOR));
    }

    #[test]
    fn interior_sentinel_is_never_in_window() {
        assert!(!in_window(CellCoord::new(0, 0), 1000, CellCoord::INTERIOR));
    }
}
