use ddm_tiler::grid::{dst_field_size, sample_grid_for};
use ddm_tiler::model::{BoundingBox, GeoPoint, MercPoint, TileCoord};
use ddm_tiler::projection;
use ddm_tiler::{NoDataPolicy, RunReport, SourceKind, TilePipeline, TilerConfig};
use pyo3::prelude::*;
use std::path::{Path, PathBuf};

#[pymodule]
fn ddm_tiler_py(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyRunReport>()?;
    m.add_function(wrap_pyfunction!(lon_lat_to_merc, m)?)?;
    m.add_function(wrap_pyfunction!(merc_to_lon_lat, m)?)?;
    m.add_function(wrap_pyfunction!(fractional_degree, m)?)?;
    m.add_function(wrap_pyfunction!(field_size, m)?)?;
    m.add_function(wrap_pyfunction!(sample_grid, m)?)?;
    m.add_function(wrap_pyfunction!(read_ddm, m)?)?;
    m.add_function(wrap_pyfunction!(convert, m)?)?;
    Ok(())
}

#[pyclass(name = "RunReport")]
#[derive(Clone)]
pub struct PyRunReport {
    #[pyo3(get)]
    pub written: u64,
    #[pyo3(get)]
    pub skipped: u64,
    #[pyo3(get)]
    pub cancelled: u64,
    /// (zoom, qm, qn, message)
    #[pyo3(get)]
    pub failures: Vec<(u8, u32, u32, String)>,
}

impl From<RunReport> for PyRunReport {
    fn from(report: RunReport) -> Self {
        PyRunReport {
            written: report.written,
            skipped: report.skipped,
            cancelled: report.cancelled,
            failures: report
                .failures
                .into_iter()
                .map(|(c, msg)| (c.zoom, c.qm, c.qn, msg))
                .collect(),
        }
    }
}

#[pymethods]
impl PyRunReport {
    #[getter]
    fn ok(&self) -> bool {
        self.failures.is_empty() && self.cancelled == 0
    }

    fn __repr__(&self) -> String {
        format!(
            "RunReport(written={}, skipped={}, failed={}, cancelled={})",
            self.written,
            self.skipped,
            self.failures.len(),
            self.cancelled
        )
    }
}

#[pyfunction]
pub fn lon_lat_to_merc(lon: f64, lat: f64) -> (f64, f64) {
    let m = projection::to_merc(GeoPoint::new(lon, lat));
    (m.x, m.y)
}

#[pyfunction]
pub fn merc_to_lon_lat(x: f64, y: f64) -> (f64, f64) {
    let p = projection::to_geo(MercPoint::new(x, y));
    (p.lon, p.lat)
}

/// Offset of a coordinate from the lower edge of its 1° cell.
#[pyfunction]
pub fn fractional_degree(deg: f64) -> f64 {
    projection::fractional_degree(deg)
}

#[pyfunction]
pub fn field_size(zoom: u8, quad_size: usize) -> PyResult<u64> {
    check_tile_shape(zoom, quad_size)?;
    Ok(dst_field_size(zoom, quad_size))
}

/// Row-major (lon, lat) sample positions of one tile.
#[pyfunction]
pub fn sample_grid(zoom: u8, qm: u32, qn: u32, quad_size: usize) -> PyResult<Vec<(f64, f64)>> {
    check_tile_shape(zoom, quad_size)?;
    let coord = TileCoord::new(zoom, qm, qn);
    if qm >= coord.quad_count() || qn >= coord.quad_count() {
        return Err(PyErr::new::<pyo3::exceptions::PyValueError, _>(format!(
            "tile {} is outside zoom {}",
            coord, zoom
        )));
    }

    let grid = sample_grid_for(coord, quad_size);
    Ok(grid.points.iter().map(|p| (p.lon, p.lat)).collect())
}

#[pyfunction]
pub fn read_ddm(path: &str) -> PyResult<Vec<f32>> {
    ddm_tiler::read_ddm(Path::new(path)).map_err(|e| {
        PyErr::new::<pyo3::exceptions::PyIOError, _>(format!("Failed to read tile: {}", e))
    })
}

#[pyfunction]
#[pyo3(signature = (
    input_dir,
    output_dir,
    zoom=11,
    quad_size=33,
    start=(-180.0, 85.0),
    end=(180.0, 0.0),
    format="hgt",
    raster=None,
    cache_size=64,
    strict_nodata=false
))]
#[allow(clippy::too_many_arguments)]
pub fn convert(
    py: Python<'_>,
    input_dir: &str,
    output_dir: &str,
    zoom: u8,
    quad_size: usize,
    start: (f64, f64),
    end: (f64, f64),
    format: &str,
    raster: Option<&str>,
    cache_size: usize,
    strict_nodata: bool,
) -> PyResult<PyRunReport> {
    let source = match (raster, format) {
        (Some(path), _) => SourceKind::GdalRaster(PathBuf::from(path)),
        (None, "hgt") => SourceKind::Hgt(PathBuf::from(input_dir)),
        (None, "gdal") => SourceKind::GdalCells(PathBuf::from(input_dir)),
        (None, other) => {
            return Err(PyErr::new::<pyo3::exceptions::PyValueError, _>(format!(
                "Unknown input format: {}",
                other
            )))
        }
    };

    let config = TilerConfig {
        zoom,
        quad_size,
        bbox: BoundingBox::new(GeoPoint::new(start.0, start.1), GeoPoint::new(end.0, end.1)),
        source,
        output_dir: PathBuf::from(output_dir),
        cache_capacity: cache_size,
        read_timeout: None,
        nodata: if strict_nodata {
            NoDataPolicy::Strict
        } else {
            NoDataPolicy::Ocean
        },
    };

    let pipeline = TilePipeline::from_config(config).map_err(|e| {
        PyErr::new::<pyo3::exceptions::PyValueError, _>(format!("Invalid settings: {:#}", e))
    })?;

    // 変換中はGILを解放する
    let report = py.allow_threads(|| pipeline.run()).map_err(|e| {
        PyErr::new::<pyo3::exceptions::PyIOError, _>(format!("Failed to convert: {}", e))
    })?;

    Ok(report.into())
}

fn check_tile_shape(zoom: u8, quad_size: usize) -> PyResult<()> {
    let config = TilerConfig {
        zoom,
        quad_size,
        ..TilerConfig::default()
    };
    config.validate().map_err(|e| {
        PyErr::new::<pyo3::exceptions::PyValueError, _>(e.to_string())
    })
}
