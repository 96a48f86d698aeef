use tracing::trace;

use crate::error::SourceError;
use crate::grid::sample_grid_for;
use crate::model::{OutputTile, TileCoord};
use crate::sampler::HeightSampler;

/// Builds the height grid of a tile from its sample lattice.
#[derive(Clone, Copy)]
pub struct TileAssembler<'a> {
    sampler: HeightSampler<'a>,
    quad_size: usize,
}

impl<'a> TileAssembler<'a> {
    pub fn new(sampler: HeightSampler<'a>, quad_size: usize) -> Self {
        Self { sampler, quad_size }
    }

    /// Returns `None` when no sample is above sea level; such tiles are not
    /// written.
    pub fn build_tile(&self, coord: TileCoord) -> Result<Option<OutputTile>, SourceError> {
        let grid = sample_grid_for(coord, self.quad_size);
        let mut heights = Vec::with_capacity(grid.points.len());
        let mut is_zero_height = true;

        for &point in &grid.points {
            let h = self.sampler.sample_height(point)? as f32;
            if h > 0.0 {
                is_zero_height = false;
            }
            heights.push(h);
        }

        if is_zero_height {
            trace!("Tile {} has no land, skipping", coord);
            return Ok(None);
        }

        Ok(Some(OutputTile {
            coord,
            quad_size: self.quad_size,
            heights,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DemFileCache;
    use crate::model::{CellKey, DemCell};
    use crate::sampler::NoDataPolicy;
    use crate::source::ConstantSource;
    use std::sync::Arc;

    #[test]
    fn test_flat_land_tile() {
        let cache = DemFileCache::new(Arc::new(ConstantSource::new(100.0)), 8);
        let assembler = TileAssembler::new(HeightSampler::new(&cache, NoDataPolicy::Ocean), 3);

        let tile = assembler.build_tile(TileCoord::new(0, 0, 0)).unwrap().unwrap();
        assert_eq!(tile.quad_size, 3);
        assert_eq!(tile.heights, vec![100.0; 9]);
    }

    #[test]
    fn test_ocean_tile_is_skipped() {
        let cache = DemFileCache::new(Arc::new(ConstantSource::new(-20.0)), 8);
        let assembler = TileAssembler::new(HeightSampler::new(&cache, NoDataPolicy::Ocean), 5);
        assert!(assembler.build_tile(TileCoord::new(1, 0, 1)).unwrap().is_none());

        let missing = |key: CellKey| -> Result<DemCell, SourceError> { Err(SourceError::NotFound(key)) };
        let cache = DemFileCache::new(Arc::new(missing), 8);
        let assembler = TileAssembler::new(HeightSampler::new(&cache, NoDataPolicy::Ocean), 5);
        assert!(assembler.build_tile(TileCoord::new(1, 0, 1)).unwrap().is_none());
    }

    #[test]
    fn test_single_land_sample_keeps_tile() {
        // 北東の象限のセルだけが陸地
        let island = |key: CellKey| -> Result<DemCell, SourceError> {
            let height = if key.south_lat() >= 0 && key.west_lon() >= 0 { 5.0 } else { 0.0 };
            Ok(DemCell::filled(key, 2, height))
        };
        let cache = DemFileCache::new(Arc::new(island), 16);
        let assembler = TileAssembler::new(HeightSampler::new(&cache, NoDataPolicy::Ocean), 3);

        let tile = assembler.build_tile(TileCoord::new(0, 0, 0)).unwrap().unwrap();
        // 中心 (0, 0) は北東のセルに属する
        assert_eq!(tile.heights[4], 5.0);
        assert_eq!(tile.heights[0], 0.0);
    }

    #[test]
    fn test_strict_policy_fails_tile() {
        let missing = |key: CellKey| -> Result<DemCell, SourceError> { Err(SourceError::NotFound(key)) };
        let cache = DemFileCache::new(Arc::new(missing), 8);
        let assembler = TileAssembler::new(HeightSampler::new(&cache, NoDataPolicy::Strict), 3);
        assert!(assembler.build_tile(TileCoord::new(0, 0, 0)).is_err());
    }
}
