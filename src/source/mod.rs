//! Elevation sources the tile cache loads 1°×1° cells from.

mod hgt;
#[cfg(feature = "gdal")]
mod raster;

pub use hgt::{parse_hgt, HgtDirectory, SRTM1_SIZE, SRTM3_SIZE};
#[cfg(feature = "gdal")]
pub use raster::{GdalCellDirectory, GdalGlobalRaster};

use crate::error::SourceError;
use crate::model::{CellKey, DemCell};

/// Loads the decoded grid of one source cell.
///
/// A cell without backing data must fail with [`SourceError::NotFound`].
pub trait ElevationSource: Send + Sync {
    fn load(&self, key: CellKey) -> Result<DemCell, SourceError>;
}

impl<F> ElevationSource for F
where
    F: Fn(CellKey) -> Result<DemCell, SourceError> + Send + Sync,
{
    fn load(&self, key: CellKey) -> Result<DemCell, SourceError> {
        self(key)
    }
}

/// Returns the same height for every cell on the globe.
#[derive(Debug, Clone, Copy)]
pub struct ConstantSource {
    pub height: f32,
    pub size: usize,
}

impl ConstantSource {
    pub fn new(height: f32) -> Self {
        Self { height, size: 3 }
    }
}

impl ElevationSource for ConstantSource {
    fn load(&self, key: CellKey) -> Result<DemCell, SourceError> {
        Ok(DemCell::filled(key, self.size, self.height))
    }
}
