use std::fmt;

use crate::error::SourceError;

/// Geographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub const fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

/// Position in spherical-Mercator meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MercPoint {
    pub x: f64,
    pub y: f64,
}

impl MercPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// One quadtree tile. `qm` counts latitude bands from the top, `qn` longitude
/// bands from the left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    pub zoom: u8,
    pub qm: u32,
    pub qn: u32,
}

impl TileCoord {
    pub const fn new(zoom: u8, qm: u32, qn: u32) -> Self {
        Self { zoom, qm, qn }
    }

    /// Number of tiles along one side at this zoom.
    pub fn quad_count(&self) -> u32 {
        1u32 << self.zoom
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.qm, self.qn)
    }
}

/// Index of a 1°×1° source cell. Rows count down from the north pole, columns
/// east from the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub row: i32,
    pub col: i32,
}

impl CellKey {
    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    /// Cell covering a geographic point. Longitude 180 wraps onto column 0.
    pub fn covering(p: GeoPoint) -> Self {
        let row = (90.0 - p.lat).ceil() as i32;
        let col = ((180.0 + p.lon).floor() as i32).rem_euclid(360);
        Self { row, col }
    }

    /// Offset of `p` from the cell's south-west corner as (lon, lat) degrees,
    /// clamped to [0, 1]. Longitudes are taken across the antimeridian.
    pub fn offset_of(&self, p: GeoPoint) -> (f64, f64) {
        let mut dlon = p.lon - self.west_lon() as f64;
        if dlon >= 180.0 {
            dlon -= 360.0;
        } else if dlon < -180.0 {
            dlon += 360.0;
        }
        let dlat = p.lat - self.south_lat() as f64;
        (dlon.clamp(0.0, 1.0), dlat.clamp(0.0, 1.0))
    }

    /// Latitude of the cell's southern edge.
    pub fn south_lat(&self) -> i32 {
        90 - self.row
    }

    /// Longitude of the cell's western edge.
    pub fn west_lon(&self) -> i32 {
        self.col - 180
    }

    /// SRTM style file name of the cell, e.g. `N45E006.hgt`.
    pub fn hgt_file_name(&self) -> String {
        let lat = self.south_lat();
        let lon = self.west_lon();
        let ns = if lat >= 0 { 'N' } else { 'S' };
        let ew = if lon >= 0 { 'E' } else { 'W' };
        format!("{}{:02}{}{:03}.hgt", ns, lat.abs(), ew, lon.abs())
    }

    /// Per-cell raster file name, `<row>_<col>.tif`.
    pub fn raster_file_name(&self) -> String {
        format!("{}_{}.tif", self.row, self.col)
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Requested area, given by its top-left and bottom-right corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub start: GeoPoint,
    pub end: GeoPoint,
}

impl BoundingBox {
    pub const fn new(start: GeoPoint, end: GeoPoint) -> Self {
        Self { start, end }
    }

    pub const fn whole_globe() -> Self {
        Self {
            start: GeoPoint::new(-180.0, 90.0),
            end: GeoPoint::new(180.0, -90.0),
        }
    }

    pub fn is_degenerate(&self) -> bool {
        !(self.start.lon < self.end.lon && self.start.lat > self.end.lat)
    }
}

/// Decoded elevation grid of one source cell. Row 0 is the northern edge.
#[derive(Debug, Clone)]
pub struct DemCell {
    pub key: CellKey,
    pub nrows: usize,
    pub ncols: usize,
    /// Degrees between neighbouring rows.
    pub cellsize_lat: f64,
    /// Degrees between neighbouring columns.
    pub cellsize_lon: f64,
    pub heights: Vec<f32>,
}

impl DemCell {
    /// Builds a cell whose grid spans exactly one degree in both directions.
    /// Rows and columns may differ in count.
    pub fn new(
        key: CellKey,
        nrows: usize,
        ncols: usize,
        heights: Vec<f32>,
    ) -> Result<Self, SourceError> {
        if nrows < 2 || ncols < 2 {
            return Err(SourceError::Read {
                key,
                reason: format!("grid {}x{} is smaller than 2x2", nrows, ncols),
            });
        }
        if heights.len() != nrows * ncols {
            return Err(SourceError::Read {
                key,
                reason: format!(
                    "expected {} samples for a {}x{} grid, got {}",
                    nrows * ncols,
                    nrows,
                    ncols,
                    heights.len()
                ),
            });
        }

        Ok(Self {
            key,
            nrows,
            ncols,
            cellsize_lat: 1.0 / (nrows - 1) as f64,
            cellsize_lon: 1.0 / (ncols - 1) as f64,
            heights,
        })
    }

    /// A cell with every sample set to `value`.
    pub fn filled(key: CellKey, size: usize, value: f32) -> Self {
        let size = size.max(2);
        Self {
            key,
            nrows: size,
            ncols: size,
            cellsize_lat: 1.0 / (size - 1) as f64,
            cellsize_lon: 1.0 / (size - 1) as f64,
            heights: vec![value; size * size],
        }
    }

    /// Height at (row, col). Indices outside the grid are clamped to the
    /// nearest edge row/column.
    pub fn height(&self, row: i64, col: i64) -> f32 {
        let row = row.clamp(0, self.nrows as i64 - 1) as usize;
        let col = col.clamp(0, self.ncols as i64 - 1) as usize;
        self.heights[row * self.ncols + col]
    }
}

/// Height grid of one tile, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTile {
    pub coord: TileCoord,
    pub quad_size: usize,
    pub heights: Vec<f32>,
}
