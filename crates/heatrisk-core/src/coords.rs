//! Coordinate reference systems and bounding boxes.
//! All coordinate math uses f64 for precision.

use std::fmt;

use serde::{Deserialize, Serialize};

/// WGS84 semi-major axis used by spherical mercator.
const EARTH_RADIUS_M: f64 = 6_378_137.0;
/// Latitude at which spherical mercator maps to a square world.
const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

/// Reference system of a raster grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Crs {
    /// EPSG:4326. x = longitude, y = latitude, both in degrees.
    Wgs84,
    /// EPSG:3857 spherical mercator, metres.
    WebMercator,
}

impl Crs {
    pub fn epsg(self) -> u32 {
        match self {
            Crs::Wgs84 => 4326,
            Crs::WebMercator => 3857,
        }
    }

    pub fn from_epsg(code: u32) -> Option<Self> {
        match code {
            4326 => Some(Crs::Wgs84),
            3857 | 900913 => Some(Crs::WebMercator),
            _ => None,
        }
    }

    /// True when grid units are degrees.
    pub fn is_geographic(self) -> bool {
        matches!(self, Crs::Wgs84)
    }

    /// Convert a point in this reference system to (lon, lat) degrees.
    pub fn to_lonlat(self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Crs::Wgs84 => (x, y),
            Crs::WebMercator => {
                let lon = (x / EARTH_RADIUS_M).to_degrees();
                let lat = (2.0 * (y / EARTH_RADIUS_M).exp().atan() - std::f64::consts::FRAC_PI_2)
                    .to_degrees();
                (lon, lat)
            }
        }
    }

    /// Convert (lon, lat) degrees into this reference system.
    pub fn from_lonlat(self, lon: f64, lat: f64) -> (f64, f64) {
        match self {
            Crs::Wgs84 => (lon, lat),
            Crs::WebMercator => {
                let lat = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
                let x = EARTH_RADIUS_M * lon.to_radians();
                let y = EARTH_RADIUS_M
                    * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
                (x, y)
            }
        }
    }

    /// Transform a point from this reference system into `to`.
    pub fn transform(self, to: Crs, x: f64, y: f64) -> (f64, f64) {
        if self == to {
            return (x, y);
        }
        let (lon, lat) = self.to_lonlat(x, y);
        to.from_lonlat(lon, lat)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

/// Axis-aligned box in the units of some reference system.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Bounding box of this box after transforming it from `from` into `to`.
    /// Samples corners and edge midpoints; exact for the supported systems,
    /// which map axis-aligned boxes to axis-aligned boxes.
    pub fn transform(&self, from: Crs, to: Crs) -> Bounds {
        if from == to {
            return *self;
        }
        let mid_x = (self.min_x + self.max_x) / 2.0;
        let mid_y = (self.min_y + self.max_y) / 2.0;
        let probes = [
            (self.min_x, self.min_y),
            (self.min_x, self.max_y),
            (self.max_x, self.min_y),
            (self.max_x, self.max_y),
            (mid_x, self.min_y),
            (mid_x, self.max_y),
            (self.min_x, mid_y),
            (self.max_x, mid_y),
        ];
        let mut out = Bounds::new(f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for (x, y) in probes {
            let (tx, ty) = from.transform(to, x, y);
            out.min_x = out.min_x.min(tx);
            out.min_y = out.min_y.min(ty);
            out.max_x = out.max_x.max(tx);
            out.max_y = out.max_y.max(ty);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mercator_roundtrip_within_tolerance() {
        let mut rng_state: u64 = 42;
        for _ in 0..1000 {
            // LCG for deterministic pseudo-random
            rng_state = rng_state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let lat = (rng_state as f64 / u64::MAX as f64) * 170.0 - 85.0;
            rng_state = rng_state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let lon = (rng_state as f64 / u64::MAX as f64) * 360.0 - 180.0;

            let (x, y) = Crs::WebMercator.from_lonlat(lon, lat);
            let (lon2, lat2) = Crs::WebMercator.to_lonlat(x, y);
            assert!((lon - lon2).abs() < 1e-9, "lon {lon} -> {lon2}");
            assert!((lat - lat2).abs() < 1e-9, "lat {lat} -> {lat2}");
        }
    }

    #[test]
    fn mercator_origin_and_antimeridian() {
        let (x, y) = Crs::WebMercator.from_lonlat(0.0, 0.0);
        assert!(x.abs() < 1e-9 && y.abs() < 1e-9);
        let (x, _) = Crs::WebMercator.from_lonlat(180.0, 0.0);
        assert!((x - 20_037_508.342789244).abs() < 1e-3, "x={x}");
    }

    #[test]
    fn epsg_codes_roundtrip() {
        for crs in [Crs::Wgs84, Crs::WebMercator] {
            assert_eq!(Crs::from_epsg(crs.epsg()), Some(crs));
        }
        assert_eq!(Crs::from_epsg(32644), None);
        assert_eq!(Crs::WebMercator.to_string(), "EPSG:3857");
    }

    #[test]
    fn bounds_transform_is_monotone() {
        let b = Bounds::new(81.0, 17.0, 87.5, 22.5);
        let m = b.transform(Crs::Wgs84, Crs::WebMercator);
        assert!(m.min_x < m.max_x && m.min_y < m.max_y);
        let back = m.transform(Crs::WebMercator, Crs::Wgs84);
        assert!((back.min_x - b.min_x).abs() < 1e-9);
        assert!((back.max_y - b.max_y).abs() < 1e-9);
    }

    #[test]
    fn bounds_intersection_and_union() {
        let a = Bounds::new(0.0, 0.0, 2.0, 2.0);
        let b = Bounds::new(1.0, 1.0, 3.0, 3.0);
        let c = Bounds::new(5.0, 5.0, 6.0, 6.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert_eq!(a.union(&c), Bounds::new(0.0, 0.0, 6.0, 6.0));
    }
}
