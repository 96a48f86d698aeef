//! Quadtree tile enumeration and per-tile sample lattices.

use crate::model::{BoundingBox, GeoPoint, MercPoint, TileCoord};
use crate::projection::{clamp_latitude, lat_to_merc_y, lon_to_merc_x, to_geo, POLE};

/// Samples along one side of the whole zoom level.
pub fn dst_field_size(zoom: u8, quad_size: usize) -> u64 {
    (1u64 << zoom) * (quad_size as u64 - 1) + 1
}

/// Mercator distance between neighbouring samples.
pub fn merc_increment(zoom: u8, quad_size: usize) -> f64 {
    2.0 * POLE / (dst_field_size(zoom, quad_size) - 1) as f64
}

/// Mercator extent of one tile side.
pub fn tile_pitch(zoom: u8) -> f64 {
    2.0 * POLE / (1u64 << zoom) as f64
}

/// `quad_size × quad_size` sample positions of one tile, row-major from the
/// north-west corner.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleGrid {
    pub quad_size: usize,
    pub points: Vec<GeoPoint>,
}

impl SampleGrid {
    pub fn point(&self, i: usize, j: usize) -> GeoPoint {
        self.points[i * self.quad_size + j]
    }

    pub fn row(&self, i: usize) -> &[GeoPoint] {
        &self.points[i * self.quad_size..(i + 1) * self.quad_size]
    }

    pub fn column(&self, j: usize) -> Vec<GeoPoint> {
        (0..self.quad_size).map(|i| self.point(i, j)).collect()
    }
}

pub fn sample_grid_for(tile: TileCoord, quad_size: usize) -> SampleGrid {
    let inc = merc_increment(tile.zoom, quad_size);
    let step = quad_size as u64 - 1;
    let mut points = Vec::with_capacity(quad_size * quad_size);

    for i in 0..quad_size as u64 {
        // 隣接タイルと同じ整数インデックスから計算するので境界の点は完全に一致する
        let y = POLE - (step * tile.qm as u64 + i) as f64 * inc;
        for j in 0..quad_size as u64 {
            let x = -POLE + (step * tile.qn as u64 + j) as f64 * inc;
            points.push(to_geo(MercPoint::new(x, y)));
        }
    }

    SampleGrid { quad_size, points }
}

/// Rectangular block of tiles at one zoom level, iterated row by row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub zoom: u8,
    pub qm_start: u32,
    pub qm_end: u32,
    pub qn_start: u32,
    pub qn_end: u32,
}

impl TileRange {
    pub fn rows(&self) -> std::ops::Range<u32> {
        self.qm_start..self.qm_end
    }

    pub fn columns(&self) -> std::ops::Range<u32> {
        self.qn_start..self.qn_end
    }

    /// Tiles of one row, left to right.
    pub fn row(&self, qm: u32) -> impl Iterator<Item = TileCoord> {
        let zoom = self.zoom;
        self.columns().map(move |qn| TileCoord::new(zoom, qm, qn))
    }

    pub fn iter(&self) -> impl Iterator<Item = TileCoord> + '_ {
        self.rows().flat_map(move |qm| self.row(qm))
    }

    pub fn len(&self) -> u64 {
        (self.qm_end - self.qm_start) as u64 * (self.qn_end - self.qn_start) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, tile: TileCoord) -> bool {
        tile.zoom == self.zoom && self.rows().contains(&tile.qm) && self.columns().contains(&tile.qn)
    }
}

/// Tiles whose Mercator extent intersects `bbox`.
pub fn enumerate_tiles(zoom: u8, bbox: &BoundingBox) -> TileRange {
    let count = 1u64 << zoom;
    let pitch = tile_pitch(zoom);

    let top = (POLE - lat_to_merc_y(clamp_latitude(bbox.start.lat))) / pitch;
    let bottom = (POLE - lat_to_merc_y(clamp_latitude(bbox.end.lat))) / pitch;
    let left = (lon_to_merc_x(bbox.start.lon) + POLE) / pitch;
    let right = (lon_to_merc_x(bbox.end.lon) + POLE) / pitch;

    let clamp = |v: f64| v.clamp(0.0, count as f64) as u32;
    let qm_start = clamp(top.floor());
    let qn_start = clamp(left.floor());

    TileRange {
        zoom,
        qm_start,
        qm_end: clamp(bottom.ceil()).max(qm_start),
        qn_start,
        qn_end: clamp(right.ceil()).max(qn_start),
    }
}
