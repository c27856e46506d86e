//! Georeferenced raster grids.
//!
//! Cells are f32, row-major, row 0 = northern edge. `NaN` marks a missing cell.
//! Grid geometry (size, transform, reference system) travels with every raster,
//! and operations that combine two rasters refuse to run unless the grids match.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::coords::{Bounds, Crs};
use crate::error::{Result, RiskError};
use crate::region::RegionMask;

/// Metres per degree of latitude, used to express geographic cell sizes in metres.
const METRES_PER_DEGREE: f64 = 111_320.0;

/// Relative tolerance when comparing grid transforms.
const GRID_EPS: f64 = 1e-9;

/// Size, north-up affine transform and reference system of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub width: usize,
    pub height: usize,
    /// x of the western edge of column 0.
    pub origin_x: f64,
    /// y of the northern edge of row 0.
    pub origin_y: f64,
    /// Cell size along x, in CRS units.
    pub cell_width: f64,
    /// Cell size along y, in CRS units. Positive; rows run north to south.
    pub cell_height: f64,
    pub crs: Crs,
}

impl GridSpec {
    pub fn new(
        width: usize,
        height: usize,
        origin_x: f64,
        origin_y: f64,
        cell_width: f64,
        cell_height: f64,
        crs: Crs,
    ) -> Self {
        Self { width, height, origin_x, origin_y, cell_width, cell_height, crs }
    }

    /// Smallest grid of the given cell size covering `bounds`, anchored at its north-west corner.
    pub fn covering(bounds: &Bounds, cell_width: f64, cell_height: f64, crs: Crs) -> Result<Self> {
        if !(cell_width > 0.0 && cell_height > 0.0) {
            return Err(RiskError::Config(format!(
                "cell size must be positive, got {cell_width}x{cell_height}"
            )));
        }
        let width = (bounds.width() / cell_width - GRID_EPS).ceil().max(1.0) as usize;
        let height = (bounds.height() / cell_height - GRID_EPS).ceil().max(1.0) as usize;
        Ok(Self::new(width, height, bounds.min_x, bounds.max_y, cell_width, cell_height, crs))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::new(
            self.origin_x,
            self.origin_y - self.height as f64 * self.cell_height,
            self.origin_x + self.width as f64 * self.cell_width,
            self.origin_y,
        )
    }

    /// Centre of cell (row, col) in CRS units.
    #[inline]
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.cell_width,
            self.origin_y - (row as f64 + 0.5) * self.cell_height,
        )
    }

    /// Continuous pixel coordinates (col, row) of a point; integers fall on cell centres.
    #[inline]
    pub fn to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.cell_width - 0.5,
            (self.origin_y - y) / self.cell_height - 0.5,
        )
    }

    /// Cell (row, col) containing the point, if inside the grid.
    pub fn locate(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let col = ((x - self.origin_x) / self.cell_width).floor();
        let row = ((self.origin_y - y) / self.cell_height).floor();
        if col < 0.0 || row < 0.0 || col >= self.width as f64 || row >= self.height as f64 {
            return None;
        }
        Some((row as usize, col as usize))
    }

    /// Nominal resolution in metres (mean of both axes).
    pub fn nominal_resolution_m(&self) -> f64 {
        let mean = (self.cell_width + self.cell_height) / 2.0;
        if self.crs.is_geographic() {
            mean * METRES_PER_DEGREE
        } else {
            mean
        }
    }

    /// True when both grids share size, transform and reference system.
    pub fn same_grid(&self, other: &GridSpec) -> bool {
        fn close(a: f64, b: f64) -> bool {
            (a - b).abs() <= GRID_EPS * a.abs().max(b.abs()).max(1.0)
        }
        self.width == other.width
            && self.height == other.height
            && self.crs == other.crs
            && close(self.origin_x, other.origin_x)
            && close(self.origin_y, other.origin_y)
            && close(self.cell_width, other.cell_width)
            && close(self.cell_height, other.cell_height)
    }

    pub fn ensure_same(&self, other: &GridSpec, context: &'static str) -> Result<()> {
        if self.same_grid(other) {
            Ok(())
        } else {
            Err(RiskError::GridMismatch {
                context,
                left: self.to_string(),
                right: other.to_string(),
            })
        }
    }
}

impl fmt::Display for GridSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} cells of {}x{} {} at ({}, {})",
            self.width, self.height, self.cell_width, self.cell_height, self.crs, self.origin_x, self.origin_y
        )
    }
}

/// A single-band raster: grid geometry plus row-major f32 cells.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterGrid {
    pub spec: GridSpec,
    /// Row-major cell values; `NaN` = missing.
    pub data: Vec<f32>,
}

impl RasterGrid {
    /// Create a raster filled with the given value.
    pub fn new(spec: GridSpec, fill: f32) -> Self {
        Self { data: vec![fill; spec.len()], spec }
    }

    pub fn from_data(spec: GridSpec, data: Vec<f32>) -> Result<Self> {
        if data.len() != spec.len() {
            return Err(RiskError::InvalidRaster(format!(
                "{} cells supplied for a {}x{} grid",
                data.len(),
                spec.width,
                spec.height
            )));
        }
        Ok(Self { spec, data })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.spec.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.spec.height
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.spec.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f32) {
        self.data[row * self.spec.width + col] = val;
    }

    /// Apply a per-cell transform, keeping the grid.
    pub fn map(&self, f: impl Fn(f32) -> f32) -> RasterGrid {
        RasterGrid {
            spec: self.spec,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Combine two rasters cell by cell. Fails unless both share one grid.
    pub fn zip_with(
        &self,
        other: &RasterGrid,
        context: &'static str,
        f: impl Fn(f32, f32) -> f32,
    ) -> Result<RasterGrid> {
        self.spec.ensure_same(&other.spec, context)?;
        Ok(RasterGrid {
            spec: self.spec,
            data: self.data.iter().zip(&other.data).map(|(&a, &b)| f(a, b)).collect(),
        })
    }

    /// Number of non-missing cells.
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }

    /// Min and max over non-missing cells; `None` when every cell is missing.
    pub fn valid_min_max(&self) -> Option<(f32, f32)> {
        min_max(self.data.iter().copied())
    }

    /// Min and max over non-missing cells inside the mask.
    pub fn valid_min_max_within(&self, mask: &RegionMask) -> Result<Option<(f32, f32)>> {
        self.spec.ensure_same(&mask.spec, "masked min/max")?;
        Ok(min_max(
            self.data
                .iter()
                .zip(&mask.inside)
                .filter(|(_, &inside)| inside)
                .map(|(&v, _)| v),
        ))
    }

    /// Replace missing cells with `value`.
    pub fn fill_missing(&self, value: f32) -> RasterGrid {
        self.map(|v| if v.is_nan() { value } else { v })
    }

    /// Set every cell outside the mask to missing.
    pub fn mask_with(&self, mask: &RegionMask) -> Result<RasterGrid> {
        self.spec.ensure_same(&mask.spec, "mask")?;
        Ok(RasterGrid {
            spec: self.spec,
            data: self
                .data
                .iter()
                .zip(&mask.inside)
                .map(|(&v, &inside)| if inside { v } else { f32::NAN })
                .collect(),
        })
    }

    /// Sub-raster of whole cells intersecting `bounds` (in this raster's CRS).
    pub fn crop(&self, bounds: &Bounds) -> Result<RasterGrid> {
        let own = self.spec.bounds();
        if !own.intersects(bounds) {
            return Err(RiskError::InvalidRaster(format!(
                "crop window {bounds:?} does not intersect raster {}",
                self.spec
            )));
        }
        let s = &self.spec;
        let col0 = ((bounds.min_x - s.origin_x) / s.cell_width).floor().max(0.0) as usize;
        let col1 = (((bounds.max_x - s.origin_x) / s.cell_width).ceil() as usize).min(s.width);
        let row0 = ((s.origin_y - bounds.max_y) / s.cell_height).floor().max(0.0) as usize;
        let row1 = (((s.origin_y - bounds.min_y) / s.cell_height).ceil() as usize).min(s.height);

        let spec = GridSpec::new(
            col1 - col0,
            row1 - row0,
            s.origin_x + col0 as f64 * s.cell_width,
            s.origin_y - row0 as f64 * s.cell_height,
            s.cell_width,
            s.cell_height,
            s.crs,
        );
        let mut data = Vec::with_capacity(spec.len());
        for r in row0..row1 {
            data.extend_from_slice(&self.data[r * s.width + col0..r * s.width + col1]);
        }
        RasterGrid::from_data(spec, data)
    }
}

fn min_max(values: impl Iterator<Item = f32>) -> Option<(f32, f32)> {
    values
        .filter(|v| !v.is_nan())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}
