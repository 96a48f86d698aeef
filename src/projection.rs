//! Conversions between geographic degrees and spherical-Mercator meters.

use std::f64::consts::PI;

use crate::model::{GeoPoint, MercPoint};

/// Half the extent of the Mercator square in meters.
pub const POLE: f64 = 20037508.34;

/// Latitude at which the Mercator square closes (y == POLE).
pub const MAX_MERC_LAT: f64 = 85.051_128_779_806_59;

pub fn lon_to_merc_x(lon: f64) -> f64 {
    lon * POLE / 180.0
}

/// Diverges towards ±90; clamp with [`clamp_latitude`] first.
pub fn lat_to_merc_y(lat: f64) -> f64 {
    ((90.0 + lat) * PI / 360.0).tan().ln() / PI * POLE
}

pub fn merc_x_to_lon(x: f64) -> f64 {
    180.0 * x / POLE
}

pub fn merc_y_to_lat(y: f64) -> f64 {
    180.0 / PI * (2.0 * (y / POLE * PI).exp().atan() - PI / 2.0)
}

pub fn clamp_latitude(lat: f64) -> f64 {
    lat.clamp(-MAX_MERC_LAT, MAX_MERC_LAT)
}

pub fn to_merc(p: GeoPoint) -> MercPoint {
    MercPoint::new(lon_to_merc_x(p.lon), lat_to_merc_y(clamp_latitude(p.lat)))
}

pub fn to_geo(m: MercPoint) -> GeoPoint {
    GeoPoint::new(merc_x_to_lon(m.x), merc_y_to_lat(m.y))
}

/// Offset of `deg` from the lower edge of its 1° cell, in [0, 1).
pub fn fractional_degree(deg: f64) -> f64 {
    if deg >= 0.0 {
        deg - deg.floor()
    } else {
        -deg.floor() + deg
    }
}
