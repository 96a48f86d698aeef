use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use gdal::raster::RasterBand;
use gdal::Dataset;
use tracing::{debug, info};

use super::ElevationSource;
use crate::error::SourceError;
use crate::model::{CellKey, DemCell};

/// Directory holding one GDAL-readable raster per cell, named `<row>_<col>.tif`.
#[derive(Debug, Clone)]
pub struct GdalCellDirectory {
    dir: PathBuf,
}

impl GdalCellDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: CellKey) -> PathBuf {
        self.dir.join(key.raster_file_name())
    }
}

impl ElevationSource for GdalCellDirectory {
    fn load(&self, key: CellKey) -> Result<DemCell, SourceError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Err(SourceError::NotFound(key));
        }

        let read_err = |e: gdal::errors::GdalError| SourceError::Read {
            key,
            reason: format!("{}: {}", path.display(), e),
        };

        let dataset = Dataset::open(&path).map_err(read_err)?;
        let (cols, rows) = dataset.raster_size();
        let band = dataset.rasterband(1).map_err(read_err)?;
        let heights = read_window(&band, (0, 0), (cols, rows)).map_err(read_err)?;

        debug!("Loaded {:?} ({}x{})", path, cols, rows);
        DemCell::new(key, rows, cols, heights)
    }
}

/// A single global geographic raster. Each cell is read as a window covering
/// the 1° cell including its shared east and south edges.
///
/// Sample `k` is placed at `origin + k * resolution`; the half-pixel offset of
/// area rasters is not applied.
#[derive(Debug, Clone)]
pub struct GdalGlobalRaster {
    path: PathBuf,
    transform: [f64; 6],
    size: (usize, usize),
}

impl GdalGlobalRaster {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let dataset = Dataset::open(&path)
            .with_context(|| format!("Failed to open raster {:?}", path))?;
        let transform = dataset
            .geo_transform()
            .context("Failed to read geo transform")?;

        if transform[2] != 0.0 || transform[4] != 0.0 {
            bail!("Rotated rasters are not supported: {:?}", transform);
        }
        if transform[1] <= 0.0 || transform[5] >= 0.0 {
            bail!("Raster must be north-up with positive pixel size: {:?}", transform);
        }

        let size = dataset.raster_size();
        Ok(Self {
            path,
            transform,
            size,
        })
    }

    /// Logs driver, size, projection and band information of the raster.
    pub fn describe(&self) -> Result<()> {
        let dataset = Dataset::open(&self.path)
            .with_context(|| format!("Failed to open raster {:?}", self.path))?;
        let driver = dataset.driver();
        info!(
            "Driver: {}/{}",
            driver.short_name(),
            driver.long_name()
        );
        info!(
            "Size is {} x {} x {}",
            self.size.0,
            self.size.1,
            dataset.raster_count()
        );
        info!("Projection is {}", dataset.projection());
        info!(
            "Origin = ({}, {}), Pixel Size = ({}, {})",
            self.transform[0], self.transform[3], self.transform[1], self.transform[5]
        );

        let band = dataset.rasterband(1).context("Failed to get raster band")?;
        info!(
            "Band Type={:?}, NoData={:?}",
            band.band_type(),
            band.no_data_value()
        );
        Ok(())
    }

    /// Pixel window of a cell: offset and samples per side, unclipped.
    fn window_for(&self, key: CellKey) -> ((i64, i64), (usize, usize)) {
        let [x0, res_x, _, y0, _, dy] = self.transform;
        let res_y = -dy;

        let cols = (1.0 / res_x).round() as usize + 1;
        let rows = (1.0 / res_y).round() as usize + 1;
        let x_off = ((key.west_lon() as f64 - x0) / res_x).round() as i64;
        let y_off = ((y0 - (key.south_lat() + 1) as f64) / res_y).round() as i64;

        ((x_off, y_off), (cols, rows))
    }
}

impl ElevationSource for GdalGlobalRaster {
    fn load(&self, key: CellKey) -> Result<DemCell, SourceError> {
        let ((x_off, y_off), (cols, rows)) = self.window_for(key);
        let (width, height) = (self.size.0 as i64, self.size.1 as i64);

        // ラスタ範囲との交差部分だけを読み込む
        let cx0 = x_off.max(0);
        let cx1 = (x_off + cols as i64).min(width);
        let cy0 = y_off.max(0);
        let cy1 = (y_off + rows as i64).min(height);
        if cx0 >= cx1 || cy0 >= cy1 {
            return Err(SourceError::NotFound(key));
        }

        let read_err = |e: gdal::errors::GdalError| SourceError::Read {
            key,
            reason: format!("{}: {}", self.path.display(), e),
        };

        let dataset = Dataset::open(&self.path).map_err(read_err)?;
        let band = dataset.rasterband(1).map_err(read_err)?;
        let window_cols = (cx1 - cx0) as usize;
        let window_rows = (cy1 - cy0) as usize;
        let window = read_window(
            &band,
            (cx0 as isize, cy0 as isize),
            (window_cols, window_rows),
        )
        .map_err(read_err)?;

        // 範囲外はエッジの値で埋める
        let mut heights = Vec::with_capacity(rows * cols);
        for r in 0..rows as i64 {
            let wr = ((y_off + r).clamp(cy0, cy1 - 1) - cy0) as usize;
            for c in 0..cols as i64 {
                let wc = ((x_off + c).clamp(cx0, cx1 - 1) - cx0) as usize;
                heights.push(window[wr * window_cols + wc]);
            }
        }

        debug!(
            "Read cell {} from window ({}, {}) {}x{}",
            key, cx0, cy0, window_cols, window_rows
        );
        DemCell::new(key, rows, cols, heights)
    }
}

/// Reads band values as f32, mapping the band's no-data value to 0.
fn read_window(
    band: &RasterBand,
    offset: (isize, isize),
    size: (usize, usize),
) -> gdal::errors::Result<Vec<f32>> {
    let buffer = band.read_as::<f32>(offset, size, size, None)?;
    let (_, mut values) = buffer.into_shape_and_vec();

    if let Some(nodata) = band.no_data_value() {
        let nodata = nodata as f32;
        for v in values.iter_mut() {
            if *v == nodata || v.is_nan() {
                *v = 0.0;
            }
        }
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gdal::raster::Buffer;
    use gdal::DriverManager;
    use std::path::Path;
    use tempfile::TempDir;

    fn gtiff_available() -> bool {
        DriverManager::get_driver_by_name("GTiff").is_ok()
    }

    fn write_raster(path: &Path, cols: usize, rows: usize, transform: [f64; 6], values: Vec<f32>) {
        let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
        let mut dataset = driver
            .create_with_band_type::<f32, _>(path, cols, rows, 1)
            .unwrap();
        dataset.set_geo_transform(&transform).unwrap();
        let mut band = dataset.rasterband(1).unwrap();
        band.set_no_data_value(Some(-9999.0)).unwrap();
        let mut buffer = Buffer::new((cols, rows), values);
        band.write((0, 0), (cols, rows), &mut buffer).unwrap();
    }

    #[test]
    fn test_cell_directory_reads_band() {
        if !gtiff_available() {
            eprintln!("Skipping test: GTiff driver not available");
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let source = GdalCellDirectory::new(temp_dir.path());
        let key = CellKey::new(45, 186);

        write_raster(
            &source.path_for(key),
            3,
            3,
            [6.0, 0.5, 0.0, 46.0, 0.0, -0.5],
            vec![1.0, 2.0, 3.0, 4.0, -9999.0, 6.0, 7.0, 8.0, 9.0],
        );

        let cell = source.load(key).unwrap();
        assert_eq!((cell.nrows, cell.ncols), (3, 3));
        assert_eq!(cell.height(0, 2), 3.0);
        assert_eq!(cell.height(1, 1), 0.0);

        assert!(matches!(
            source.load(CellKey::new(1, 1)),
            Err(SourceError::NotFound(_))
        ));
    }

    #[test]
    fn test_global_raster_windows() {
        if !gtiff_available() {
            eprintln!("Skipping test: GTiff driver not available");
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("global.tif");

        // 経度0〜2度、緯度8〜10度を0.5度刻みで覆う4x4ラスタ
        let values = (0..16).map(|i| ((i / 4) * 10 + i % 4) as f32).collect();
        write_raster(&path, 4, 4, [0.0, 0.5, 0.0, 10.0, 0.0, -0.5], values);

        let source = GdalGlobalRaster::open(&path).unwrap();
        source.describe().unwrap();

        // 緯度9〜10度、経度0〜1度のセル
        let cell = source.load(CellKey::new(81, 180)).unwrap();
        assert_eq!((cell.nrows, cell.ncols), (3, 3));
        assert_eq!((cell.cellsize_lat, cell.cellsize_lon), (0.5, 0.5));
        assert_eq!(cell.height(0, 0), 0.0);
        assert_eq!(cell.height(2, 2), 22.0);

        // 緯度8〜9度、経度1〜2度のセルは南端・東端が切れるので複製される
        let cell = source.load(CellKey::new(82, 181)).unwrap();
        assert_eq!(cell.height(0, 0), 22.0);
        assert_eq!(cell.height(1, 1), 33.0);
        assert_eq!(cell.height(2, 2), 33.0);
        assert_eq!(cell.height(0, 2), cell.height(0, 1));

        assert!(matches!(
            source.load(CellKey::new(10, 10)),
            Err(SourceError::NotFound(_))
        ));
    }
}
