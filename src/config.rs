use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::error::{Result, TilerError};
use crate::model::{BoundingBox, GeoPoint};
use crate::sampler::NoDataPolicy;
use crate::source::{ElevationSource, HgtDirectory};

/// Highest supported zoom level.
pub const MAX_ZOOM: u8 = 30;

pub const DEFAULT_ZOOM: u8 = 11;
pub const DEFAULT_QUAD_SIZE: usize = 33;

/// Where the source elevation cells come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// SRTM `.hgt` files in a directory.
    Hgt(PathBuf),
    /// One GDAL raster per cell, `<row>_<col>.tif`, in a directory.
    GdalCells(PathBuf),
    /// A single global raster read in 1° windows.
    GdalRaster(PathBuf),
}

#[derive(Debug, Clone)]
pub struct TilerConfig {
    pub zoom: u8,
    pub quad_size: usize,
    pub bbox: BoundingBox,
    pub source: SourceKind,
    pub output_dir: PathBuf,
    pub cache_capacity: usize,
    pub read_timeout: Option<Duration>,
    pub nodata: NoDataPolicy,
}

impl Default for TilerConfig {
    fn default() -> Self {
        Self {
            zoom: DEFAULT_ZOOM,
            quad_size: DEFAULT_QUAD_SIZE,
            bbox: BoundingBox::new(GeoPoint::new(-180.0, 85.0), GeoPoint::new(180.0, 0.0)),
            source: SourceKind::Hgt(PathBuf::from(".")),
            output_dir: PathBuf::from("."),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            read_timeout: None,
            nodata: NoDataPolicy::default(),
        }
    }
}

impl TilerConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(TilerError::InvalidConfiguration(msg));

        if self.zoom > MAX_ZOOM {
            return invalid(format!("zoom {} exceeds {}", self.zoom, MAX_ZOOM));
        }
        if self.quad_size < 2 {
            return invalid(format!("quad size must be at least 2, got {}", self.quad_size));
        }
        if self.cache_capacity == 0 {
            return invalid("cache size must be at least 1".to_string());
        }

        let BoundingBox { start, end } = self.bbox;
        for p in [start, end] {
            if !(-180.0..=180.0).contains(&p.lon) || !(-90.0..=90.0).contains(&p.lat) {
                return invalid(format!("coordinate ({}, {}) is out of range", p.lon, p.lat));
            }
        }
        if self.bbox.is_degenerate() {
            return invalid(format!(
                "start ({}, {}) must be north-west of end ({}, {})",
                start.lon, start.lat, end.lon, end.lat
            ));
        }

        if self.read_timeout == Some(Duration::ZERO) {
            return invalid("read timeout must be positive".to_string());
        }

        Ok(())
    }

    /// Opens the configured elevation source.
    pub fn open_source(&self) -> anyhow::Result<Arc<dyn ElevationSource>> {
        match &self.source {
            SourceKind::Hgt(dir) => {
                info!("Reading .hgt cells from {:?}", dir);
                Ok(Arc::new(HgtDirectory::new(dir)))
            }
            #[cfg(feature = "gdal")]
            SourceKind::GdalCells(dir) => {
                info!("Reading GDAL cells from {:?}", dir);
                Ok(Arc::new(crate::source::GdalCellDirectory::new(dir)))
            }
            #[cfg(feature = "gdal")]
            SourceKind::GdalRaster(path) => {
                info!("Reading global raster {:?}", path);
                let raster = crate::source::GdalGlobalRaster::open(path)?;
                raster.describe()?;
                Ok(Arc::new(raster))
            }
            #[cfg(not(feature = "gdal"))]
            SourceKind::GdalCells(_) | SourceKind::GdalRaster(_) => {
                anyhow::bail!("GDAL sources require the `gdal` feature")
            }
        }
    }
}
