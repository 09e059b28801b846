use cellworld_common::{HEIGHT_DELTA_SCALE, LAND_GRID_SIZE};
use cellworld_records::HeightField;
use ndarray::Array2;

use crate::TerrainError;

/// Decoded heightmap, normalized to `[0, 1]`.
///
/// World height of a sample is `normalized * range + min`.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightMap {
    /// `LAND_GRID_SIZE × LAND_GRID_SIZE`, indexed `[[row, column]]`.
    pub normalized: Array2<f32>,
    pub min: f32,
    /// `max - min`. Zero for perfectly flat land.
    pub range: f32,
}

impl HeightMap {
    pub fn max(&self) -> f32 {
        self.min + self.range
    }

    pub fn world_height(&self, row: usize, column: usize) -> f32 {
        self.normalized[[row, column]] * self.range + self.min
    }

    pub fn to_world(&self) -> Array2<f32> {
        self.normalized.mapv(|h| h * self.range + self.min)
    }
}

/// Decode cumulative height deltas into world heights.
///
/// The first column accumulates down the rows starting from the reference
/// height; every row then accumulates left to right from its first sample.
pub fn decode_world_heights(field: &HeightField) -> Result<Array2<f32>, TerrainError> {
    let n = LAND_GRID_SIZE;
    if field.deltas.len() != n * n {
        return Err(TerrainError::HeightGridSize {
            expected: n * n,
            actual: field.deltas.len(),
        });
    }

    let mut heights = Array2::<f32>::zeros((n, n));
    let mut row_offset = field.reference_height;
    for (y, row) in field.deltas.chunks_exact(n).enumerate() {
        row_offset += f32::from(row[0]);
        heights[[y, 0]] = row_offset * HEIGHT_DELTA_SCALE;

        let mut column_offset = row_offset;
        for (x, delta) in row.iter().enumerate().skip(1) {
            column_offset += f32::from(*delta);
            heights[[y, x]] = column_offset * HEIGHT_DELTA_SCALE;
        }
    }
    Ok(heights)
}

/// Decode and normalize in place.
pub fn decode_heights(field: &HeightField) -> Result<HeightMap, TerrainError> {
    let mut heights = decode_world_heights(field)?;

    let (min, max) = heights
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &h| {
            (lo.min(h), hi.max(h))
        });
    let range = max - min;

    if range > 0.0 {
        heights.mapv_inplace(|h| (h - min) / range);
    } else {
        heights.fill(0.0);
    }

    Ok(HeightMap {
        normalized: heights,
        min,
        range,
    })
}
