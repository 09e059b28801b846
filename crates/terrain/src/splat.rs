use std::collections::HashMap;

use cellworld_common::TEXTURE_INDEX_COUNT;
use ndarray::Array3;

use crate::TerrainError;

/// Texels per side of a cell's splat map.
pub const SPLAT_SIZE: usize = 16;

const BLOCK: usize = 4;

/// Per-cell texture layering decoded from the raw index grid.
#[derive(Debug, Clone, PartialEq)]
pub struct SplatMap {
    /// Distinct stored texture indices in first-seen order. `-1` is the
    /// default texture. Layer `i` of `weights` belongs to `layers[i]`.
    pub layers: Vec<i32>,
    /// Shape `(16, 16, layers.len())`, indexed `[[row, column, layer]]`.
    pub weights: Array3<f32>,
}

impl SplatMap {
    /// Layer carrying the weight at a texel.
    pub fn layer_at(&self, row: usize, column: usize) -> Option<usize> {
        (0..self.layers.len()).find(|&l| self.weights[[row, column, l]] > 0.0)
    }
}

/// Offset into the 256-entry index grid for splat texel `(row, column)`.
///
/// The grid is stored as 4×4 blocks of 4×4 texels, blocks row-major and
/// texels row-major inside each block.
pub fn source_index(row: usize, column: usize) -> usize {
    let (block_row, sub_row) = (row / BLOCK, row % BLOCK);
    let (block_column, sub_column) = (column / BLOCK, column % BLOCK);
    block_row * 64 + block_column * 16 + sub_row * BLOCK + sub_column
}

/// Stored index for a raw value: 0 is reserved for the default texture.
pub fn stored_index(raw: u16) -> i32 {
    i32::from(raw) - 1
}

/// Build the layer list and one-hot weight volume for a cell.
///
/// A missing grid behaves like a grid of zeros (default texture only).
/// Texels using the default texture always write to layer 0.
pub fn decode_splat(raw: Option<&[u16]>) -> Result<SplatMap, TerrainError> {
    let stored: Vec<i32> = match raw {
        Some(raw) if raw.len() != TEXTURE_INDEX_COUNT => {
            return Err(TerrainError::TextureGridSize {
                expected: TEXTURE_INDEX_COUNT,
                actual: raw.len(),
            });
        }
        Some(raw) => raw.iter().map(|&r| stored_index(r)).collect(),
        None => vec![-1; TEXTURE_INDEX_COUNT],
    };

    let mut layers = Vec::new();
    let mut layer_of: HashMap<i32, usize> = HashMap::new();
    for &index in &stored {
        layer_of.entry(index).or_insert_with(|| {
            layers.push(index);
            layers.len() - 1
        });
    }

    let mut weights = Array3::<f32>::zeros((SPLAT_SIZE, SPLAT_SIZE, layers.len()));
    for row in 0..SPLAT_SIZE {
        for column in 0..SPLAT_SIZE {
            let index = stored[source_index(row, column)];
            let layer = if index < 0 {
                0
            } else {
                layer_of.get(&index).copied().unwrap_or(0)
            };
            weights[[row, column, layer]] = 1.0;
        }
    }

    Ok(SplatMap { layers, weights })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_index_walks_blocks() {
        assert_eq!(source_index(0, 0), 0);
        assert_eq!(source_index(0, 3), 3);
        assert_eq!(source_index(1, 0), 4);
        assert_eq!(source_index(0, 4), 16);
        assert_eq!(source_index(4, 0), 64);
        assert_eq!(source_index(15, 15), 255);
        assert_eq!(source_index(5, 9), 64 + 32 + 4 + 1);
    }

    #[test]
    fn source_index_is_a_permutation() {
        let mut seen = [false; TEXTURE_INDEX_COUNT];
        for row in 0..SPLAT_SIZE {
            for column in 0..SPLAT_SIZE {
                let i = source_index(row, column);
                assert!(!seen[i], "index {i} visited twice");
                seen[i] = true;
            }
        }
    }

    #[test]
    fn raw_zero_is_default_texture() {
        assert_eq!(stored_index(0), -1);
        assert_eq!(stored_index(1), 0);

        let splat = decode_splat(Some(&[0u16; TEXTURE_INDEX_COUNT][..])).unwrap();
        assert_eq!(splat.layers, vec![-1]);
        assert_eq!(splat.weights.dim(), (16, 16, 1));
        assert!(splat.weights.iter().all(|&w| w == 1.0));
    }

    #[test]
    fn missing_grid_is_default_texture() {
        let splat = decode_splat(None).unwrap();
        assert_eq!(splat.layers, vec![-1]);
    }

    #[test]
    fn default_texels_route_to_layer_zero() {
        // First entry introduces texture 4 as layer 0; the default texture
        // shows up later as its own layer, but its texels still weight layer 0.
        let mut raw = [0u16; TEXTURE_INDEX_COUNT];
        raw[0] = 5;
        let splat = decode_splat(Some(&raw[..])).unwrap();

        assert_eq!(splat.layers, vec![4, -1]);
        assert_eq!(splat.layer_at(0, 0), Some(0));
        assert_eq!(splat.layer_at(15, 15), Some(0));
        let default_layer_weight: f32 = splat.weights.index_axis(ndarray::Axis(2), 1).sum();
        assert_eq!(default_layer_weight, 0.0);
    }

    #[test]
    fn block_mapping_has_no_bleed() {
        // One distinct texture per 4×4 block: block b (row-major) uses raw b + 1.
        let mut raw = [0u16; TEXTURE_INDEX_COUNT];
        for (i, value) in raw.iter_mut().enumerate() {
            *value = (i / 16) as u16 + 1;
        }
        let splat = decode_splat(Some(&raw[..])).unwrap();
        assert_eq!(splat.layers, (0..16).collect::<Vec<i32>>());
        assert_eq!(splat.weights.dim(), (16, 16, 16));

        for row in 0..SPLAT_SIZE {
            for column in 0..SPLAT_SIZE {
                let expected_layer = (row / 4) * 4 + column / 4;
                for layer in 0..16 {
                    let expected = if layer == expected_layer { 1.0 } else { 0.0 };
                    assert_eq!(
                        splat.weights[[row, column, layer]],
                        expected,
                        "texel ({row}, {column}) layer {layer}"
                    );
                }
            }
        }
    }

    #[test]
    fn sub_texel_order_within_block() {
        // Distinct texture per entry of the first block only.
        let mut raw = [1u16; TEXTURE_INDEX_COUNT];
        for (i, value) in raw.iter_mut().take(16).enumerate() {
            *value = 100 + i as u16;
        }
        let splat = decode_splat(Some(&raw[..])).unwrap();
        // Texel (1, 2) is the 7th entry of block 0.
        let layer = splat.layer_at(1, 2).unwrap();
        assert_eq!(splat.layers[layer], stored_index(100 + 6));
        // Texel (0, 4) is in block 1, which is uniformly raw 1.
        let layer = splat.layer_at(0, 4).unwrap();
        assert_eq!(splat.layers[layer], 0);
    }

    #[test]
    fn wrong_size_is_an_error() {
        assert!(matches!(
            decode_splat(Some(&[0u16; 10][..])),
            Err(TerrainError::TextureGridSize { actual: 10, .. })
        ));
    }
}
