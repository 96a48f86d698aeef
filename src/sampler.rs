//! Height reconstruction from the source grid.
//!
//! Every source grid square is split along its 10→01 diagonal into two
//! triangles, the same way the renderer triangulates the terrain mesh. The
//! height of a query point is read off the plane of the triangle containing it.

use crate::cache::DemFileCache;
use crate::error::SourceError;
use crate::model::{CellKey, DemCell, GeoPoint};

/// What to do when the cell covering a sample has no data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NoDataPolicy {
    /// Treat the cell as ocean, height 0.
    #[default]
    Ocean,
    /// Fail the sample, and with it the tile.
    Strict,
}

/// Point in (lon, height, lat) space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    fn sub(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    fn cross(self, other: Vec3) -> Vec3 {
        Vec3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub a: Vec3,
    pub b: Vec3,
    pub c: Vec3,
}

impl Triangle {
    pub const fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self { a, b, c }
    }

    /// Height where the vertical line through (x, z) meets the triangle's
    /// supporting plane.
    pub fn height_at(&self, x: f64, z: f64) -> f64 {
        let n = self.c.sub(self.a).cross(self.b.sub(self.a));
        if n.y == 0.0 {
            // 垂直な三角形（面積ゼロ）
            return self.a.y;
        }
        self.a.y - (n.x * (x - self.a.x) + n.z * (z - self.a.z)) / n.y
    }
}

/// Triangle-plane interpolation of `p` inside `cell`.
///
/// `p` must lie in the cell, i.e. `CellKey::covering(p) == cell.key`.
pub fn interpolate(cell: &DemCell, p: GeoPoint) -> f64 {
    let cs_lat = cell.cellsize_lat;
    let cs_lon = cell.cellsize_lon;
    let (frac_lon, frac_lat) = cell.key.offset_of(p);

    let ind_lat = (frac_lat / cs_lat).floor() as i64;
    let i00 = cell.nrows as i64 - 2 - ind_lat;
    let j00 = (frac_lon / cs_lon).floor() as i64;

    let h00 = cell.height(i00, j00) as f64;
    let h01 = cell.height(i00, j00 + 1) as f64;
    let h10 = cell.height(i00 + 1, j00) as f64;
    let h11 = cell.height(i00 + 1, j00 + 1) as f64;

    if h00 == 0.0 && h01 == 0.0 && h10 == 0.0 && h11 == 0.0 {
        return 0.0;
    }

    // セルの南西角からの相対位置で計算する（経度180度の折り返し対策）
    let corner_lon = cell.key.west_lon() as f64;
    let corner_lat = cell.key.south_lat() as f64;
    let qx = corner_lon + frac_lon;
    let qz = corner_lat + frac_lat;

    let west = corner_lon + j00 as f64 * cs_lon;
    let east = corner_lon + (j00 + 1) as f64 * cs_lon;
    let north = corner_lat + (ind_lat + 1) as f64 * cs_lat;
    let south = corner_lat + ind_lat as f64 * cs_lat;

    let v00 = Vec3::new(west, h00, north);
    let v01 = Vec3::new(east, h01, north);
    let v10 = Vec3::new(west, h10, south);
    let v11 = Vec3::new(east, h11, south);

    let edge = (qx - v01.x) * (v10.z - v01.z) - (qz - v01.z) * (v10.x - v01.x);
    let triangle = if edge < 0.0 {
        Triangle::new(v11, v10, v01)
    } else {
        Triangle::new(v00, v10, v01)
    };

    triangle.height_at(qx, qz)
}

/// Resolves sample heights through the shared cell cache.
#[derive(Clone, Copy)]
pub struct HeightSampler<'a> {
    cache: &'a DemFileCache,
    policy: NoDataPolicy,
}

impl<'a> HeightSampler<'a> {
    pub fn new(cache: &'a DemFileCache, policy: NoDataPolicy) -> Self {
        Self { cache, policy }
    }

    pub fn sample_height(&self, p: GeoPoint) -> Result<f64, SourceError> {
        let key = CellKey::covering(p);
        match self.cache.get(key) {
            Ok(cell) => Ok(interpolate(&cell, p)),
            Err(e) => match self.policy {
                NoDataPolicy::Ocean => Ok(0.0),
                NoDataPolicy::Strict => Err(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ConstantSource;
    use std::sync::Arc;

    /// 3x3 cell (0.5° spacing) south-west corner at lon 6, lat 45.
    fn test_cell() -> DemCell {
        DemCell::new(
            CellKey::new(45, 186),
            3,
            3,
            vec![
                10.0, 20.0, 30.0, //
                40.0, 50.0, 60.0, //
                70.0, 80.0, 90.0,
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_grid_corners_are_exact() {
        let cell = test_cell();

        // 北端（緯度46度）と東端（経度7度）は隣のセルに属する
        assert_eq!(interpolate(&cell, GeoPoint::new(6.0, 45.5)), 40.0);
        assert_eq!(interpolate(&cell, GeoPoint::new(6.0, 45.0)), 70.0);
        assert_eq!(interpolate(&cell, GeoPoint::new(6.5, 45.0)), 80.0);
        assert_eq!(interpolate(&cell, GeoPoint::new(6.5, 45.5)), 50.0);
    }

    #[test]
    fn test_flat_plane_inside_triangles() {
        // 平面 h = 100 + 20*col - 30*row はどちらの三角形でも再現される
        let mut heights = Vec::new();
        for row in 0..3 {
            for col in 0..3 {
                heights.push((100 + 20 * col - 30 * row) as f32);
            }
        }
        let cell = DemCell::new(CellKey::new(45, 186), 3, 3, heights).unwrap();

        for &(lon, lat) in &[(6.1, 45.1), (6.4, 45.4), (6.3, 45.2), (6.9, 45.9)] {
            let col = (lon - 6.0) / 0.5;
            let row = (46.0 - lat) / 0.5;
            let expected = 100.0 + 20.0 * col - 30.0 * row;
            let h = interpolate(&cell, GeoPoint::new(lon, lat));
            assert!((h - expected).abs() < 1e-9, "({}, {}): {} vs {}", lon, lat, h, expected);
        }
    }

    #[test]
    fn test_saddle_follows_diagonal_not_bilinear() {
        // h00=0, h01=10, h10=10, h11=0: 対角線10→01上は常に10
        let cell = DemCell::new(CellKey::new(45, 186), 2, 2, vec![0.0, 10.0, 10.0, 0.0]).unwrap();

        let center = interpolate(&cell, GeoPoint::new(6.5, 45.5));
        assert!((center - 10.0).abs() < 1e-9, "center = {}", center);

        // 北西側の三角形では北西角に近づくほど0に近づく
        let nw = interpolate(&cell, GeoPoint::new(6.1, 45.9));
        assert!((nw - 2.0).abs() < 1e-9, "nw = {}", nw);
        let se = interpolate(&cell, GeoPoint::new(6.9, 45.1));
        assert!((se - 2.0).abs() < 1e-9, "se = {}", se);
    }

    #[test]
    fn test_continuous_across_diagonal() {
        let cell = DemCell::new(CellKey::new(45, 186), 2, 2, vec![5.0, 40.0, -3.0, 17.0]).unwrap();
        let eps = 1e-9;
        // 対角線10→01上の点は (lon - 6) == (lat - 45)
        let above = interpolate(&cell, GeoPoint::new(6.3 - eps, 45.3 + eps));
        let below = interpolate(&cell, GeoPoint::new(6.3 + eps, 45.3 - eps));
        assert!((above - below).abs() < 1e-6, "{} vs {}", above, below);
    }

    #[test]
    fn test_non_square_grid_uses_column_spacing() {
        // 2行3列: 経度方向は0.5度、緯度方向は1度間隔
        let cell = DemCell::new(
            CellKey::new(45, 186),
            2,
            3,
            vec![0.0, 100.0, 200.0, 0.0, 100.0, 200.0],
        )
        .unwrap();

        assert_eq!(interpolate(&cell, GeoPoint::new(6.5, 45.5)), 100.0);
        assert_eq!(interpolate(&cell, GeoPoint::new(6.5, 45.0)), 100.0);
        let h = interpolate(&cell, GeoPoint::new(6.75, 45.2));
        assert!((h - 150.0).abs() < 1e-9, "h = {}", h);
    }

    #[test]
    fn test_tiny_negative_longitude_reads_west_edge() {
        let cell = DemCell::new(CellKey::new(45, 180), 2, 2, vec![10.0, 20.0, 10.0, 20.0]).unwrap();
        let p = GeoPoint::new(-1e-17, 45.5);
        assert_eq!(CellKey::covering(p), cell.key);
        assert_eq!(interpolate(&cell, p), 10.0);
    }

    #[test]
    fn test_all_zero_corners_are_ocean() {
        let cell = DemCell::filled(CellKey::new(45, 186), 3, 0.0);
        assert_eq!(interpolate(&cell, GeoPoint::new(6.2, 45.3)), 0.0);
    }

    #[test]
    fn test_western_hemisphere_point() {
        let p = GeoPoint::new(-77.25, -12.75);
        let key = CellKey::covering(p);
        let mut heights = vec![0.0; 9];
        // 南西角 (-78, -13) から 0.75/0.25 の位置は行1〜2・列1〜2の格子
        heights[4] = 100.0;
        heights[5] = 100.0;
        heights[7] = 100.0;
        heights[8] = 100.0;
        let cell = DemCell::new(key, 3, 3, heights).unwrap();

        assert_eq!(interpolate(&cell, p), 100.0);
    }

    #[test]
    fn test_antimeridian_wraps() {
        let cell = DemCell::new(CellKey::new(45, 0), 2, 2, vec![10.0, 20.0, 30.0, 40.0]).unwrap();
        // 経度180度は列0（経度-180度）の西端と同じ子午線
        let h = interpolate(&cell, GeoPoint::new(180.0, 45.0));
        assert_eq!(h, 30.0);
    }

    #[test]
    fn test_sampler_policies() {
        let missing = |key: CellKey| -> Result<DemCell, SourceError> { Err(SourceError::NotFound(key)) };
        let cache = DemFileCache::new(Arc::new(missing), 4);

        let ocean = HeightSampler::new(&cache, NoDataPolicy::Ocean);
        assert_eq!(ocean.sample_height(GeoPoint::new(1.5, 1.5)).unwrap(), 0.0);

        let strict = HeightSampler::new(&cache, NoDataPolicy::Strict);
        assert!(strict.sample_height(GeoPoint::new(1.5, 1.5)).is_err());

        let flat = DemFileCache::new(Arc::new(ConstantSource::new(100.0)), 4);
        let sampler = HeightSampler::new(&flat, NoDataPolicy::Strict);
        assert_eq!(sampler.sample_height(GeoPoint::new(-33.3, 12.7)).unwrap(), 100.0);
    }
}
