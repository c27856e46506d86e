//! Administrative regions and their raster masks.
//!
//! Region outlines are stored in lon/lat degrees. Polygons may carry holes and a
//! region may consist of several polygons; membership is decided by the
//! even-odd rule over every ring of a polygon, so holes are excluded.

use std::ops::Range;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::coords::{Bounds, Crs};
use crate::error::{Result, RiskError};
use crate::raster::GridSpec;

/// One polygon: an outer ring plus optional holes, (lon, lat) vertices.
/// Rings may be open or closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub exterior: Vec<(f64, f64)>,
    #[serde(default)]
    pub holes: Vec<Vec<(f64, f64)>>,
}

impl Polygon {
    pub fn new(exterior: Vec<(f64, f64)>) -> Self {
        Self { exterior, holes: Vec::new() }
    }

    pub fn with_hole(mut self, hole: Vec<(f64, f64)>) -> Self {
        self.holes.push(hole);
        self
    }

    /// Even-odd test over the exterior and every hole.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        std::iter::once(&self.exterior)
            .chain(&self.holes)
            .fold(false, |inside, ring| inside ^ ring_crossings_odd(ring, lon, lat))
    }

    pub fn bounds(&self) -> Bounds {
        let mut b = Bounds::new(f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for &(x, y) in &self.exterior {
            b.min_x = b.min_x.min(x);
            b.min_y = b.min_y.min(y);
            b.max_x = b.max_x.max(x);
            b.max_y = b.max_y.max(y);
        }
        b
    }
}

/// True when a ray from (px, py) towards +x crosses the ring an odd number of times.
fn ring_crossings_odd(ring: &[(f64, f64)], px: f64, py: f64) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = ring[i];
        let (xj, yj) = ring[j];
        if (yi > py) != (yj > py) {
            let intersect_x = (xj - xi) * (py - yi) / (yj - yi) + xi;
            if px < intersect_x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// A named administrative unit (state or district).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    pub polygons: Vec<Polygon>,
}

impl Region {
    /// Reject regions without a usable outer ring.
    pub fn new(name: impl Into<String>, polygons: Vec<Polygon>) -> Result<Self> {
        let region = Self { name: name.into(), polygons };
        region.validate()?;
        Ok(region)
    }

    pub fn validate(&self) -> Result<()> {
        if self.polygons.is_empty() {
            return Err(RiskError::Config(format!("region {} has no polygons", self.name)));
        }
        for p in &self.polygons {
            if p.exterior.len() < 3 {
                return Err(RiskError::Config(format!(
                    "region {} has a ring with {} vertices",
                    self.name,
                    p.exterior.len()
                )));
            }
        }
        Ok(())
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        self.polygons.iter().any(|p| p.contains(lon, lat))
    }

    /// Bounding box in lon/lat degrees.
    pub fn bounds(&self) -> Bounds {
        self.polygons
            .iter()
            .map(Polygon::bounds)
            .reduce(|a, b| a.union(&b))
            .unwrap_or_else(|| Bounds::new(0.0, 0.0, 0.0, 0.0))
    }

    /// Bounding box in the given reference system.
    pub fn bounds_in(&self, crs: Crs) -> Bounds {
        self.bounds().transform(Crs::Wgs84, crs)
    }

    /// Row and column ranges of `spec` that can hold cells of this region.
    pub fn cell_window(&self, spec: &GridSpec) -> Option<(Range<usize>, Range<usize>)> {
        let b = self.bounds_in(spec.crs);
        if !b.intersects(&spec.bounds()) {
            return None;
        }
        let col0 = ((b.min_x - spec.origin_x) / spec.cell_width).floor().max(0.0) as usize;
        let col1 = (((b.max_x - spec.origin_x) / spec.cell_width).ceil().max(0.0) as usize).min(spec.width);
        let row0 = ((spec.origin_y - b.max_y) / spec.cell_height).floor().max(0.0) as usize;
        let row1 = (((spec.origin_y - b.min_y) / spec.cell_height).ceil().max(0.0) as usize).min(spec.height);
        Some((row0..row1, col0..col1))
    }

    /// Row-major indices of the cells of `spec` whose centre lies inside the region.
    pub fn cells(&self, spec: &GridSpec) -> Vec<usize> {
        let Some((rows, cols)) = self.cell_window(spec) else {
            return Vec::new();
        };
        rows.into_par_iter()
            .flat_map_iter(|row| {
                cols.clone().filter_map(move |col| {
                    let (x, y) = spec.cell_center(row, col);
                    let (lon, lat) = spec.crs.to_lonlat(x, y);
                    self.contains(lon, lat).then_some(row * spec.width + col)
                })
            })
            .collect()
    }

    /// Membership mask of this region on `spec`, by cell centre.
    pub fn mask(&self, spec: &GridSpec) -> RegionMask {
        let mut inside = vec![false; spec.len()];
        for i in self.cells(spec) {
            inside[i] = true;
        }
        RegionMask { spec: *spec, inside }
    }
}

/// Find a region by name, ignoring ASCII case.
pub fn find_region<'a>(regions: &'a [Region], name: &str) -> Result<&'a Region> {
    regions
        .iter()
        .find(|r| r.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| RiskError::RegionNotFound(name.to_string()))
}

/// Per-cell membership of a region on one grid.
#[derive(Debug, Clone)]
pub struct RegionMask {
    pub spec: GridSpec,
    pub inside: Vec<bool>,
}

impl RegionMask {
    /// Number of cells inside.
    pub fn count(&self) -> usize {
        self.inside.iter().filter(|&&v| v).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.inside.iter().any(|&v| v)
    }
}
