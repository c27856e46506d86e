//! Explicit resampling between grids.
//!
//! Nothing in the pipeline combines rasters on different grids implicitly;
//! every change of grid goes through [`warp`] with a declared [`Kernel`].
//!
//! Interpolating kernels (nearest, bilinear, bicubic) sample the source at each
//! target cell centre. Aggregating kernels (mean, sum) collect every source cell
//! whose centre falls inside the target cell's footprint, so a coarsened density
//! is an average and a coarsened count keeps its total.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::coords::Bounds;
use crate::error::{Result, RiskError};
use crate::raster::{GridSpec, RasterGrid};

/// Resampling kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kernel {
    Nearest,
    Bilinear,
    /// Catmull-Rom over the 4x4 neighbourhood.
    Bicubic,
    /// NaN-ignoring average of covered source cells.
    Mean,
    /// NaN-ignoring total of covered source cells.
    Sum,
}

impl Kernel {
    fn is_aggregating(self) -> bool {
        matches!(self, Kernel::Mean | Kernel::Sum)
    }
}

/// What a raster's cells measure, which decides how it may be aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Per-area quantity, e.g. population density.
    Density,
    /// Per-cell total, e.g. people per cell.
    Count,
    /// Dimensionless index or physical state, e.g. Heat Index, NDVI, a risk score.
    Index,
}

impl FieldKind {
    /// Kernel used when moving to a coarser grid.
    pub fn coarsen_kernel(self) -> Kernel {
        match self {
            FieldKind::Count => Kernel::Sum,
            FieldKind::Density | FieldKind::Index => Kernel::Mean,
        }
    }

    /// Kernel used when moving to a finer grid.
    pub fn refine_kernel(self) -> Kernel {
        Kernel::Nearest
    }
}

/// Resample `src` onto `target` with the given kernel.
pub fn warp(src: &RasterGrid, target: &GridSpec, kernel: Kernel) -> Result<RasterGrid> {
    if target.is_empty() {
        return Err(RiskError::InvalidRaster(format!("cannot warp onto empty grid {target}")));
    }
    if src.spec.same_grid(target) {
        return Ok(src.clone());
    }
    let src_bounds = src.spec.bounds().transform(src.spec.crs, target.crs);
    if !src_bounds.intersects(&target.bounds()) {
        return Err(RiskError::InvalidRaster(format!(
            "source {} does not overlap target {target}",
            src.spec
        )));
    }

    let width = target.width;
    let mut data = vec![f32::NAN; target.len()];
    data.par_chunks_mut(width).enumerate().for_each(|(row, out)| {
        for (col, cell) in out.iter_mut().enumerate() {
            *cell = if kernel.is_aggregating() {
                aggregate_cell(src, target, row, col, kernel)
            } else {
                sample_cell(src, target, row, col, kernel)
            };
        }
    });
    debug!(from = %src.spec, to = %target, ?kernel, "warped raster");
    RasterGrid::from_data(*target, data)
}

/// Bring `src` onto `target`, choosing the kernel from the field kind and
/// whether the target is coarser or finer than the source.
pub fn align(src: &RasterGrid, target: &GridSpec, kind: FieldKind) -> Result<RasterGrid> {
    if src.spec.same_grid(target) {
        return Ok(src.clone());
    }
    let kernel = if target.nominal_resolution_m() > src.spec.nominal_resolution_m() {
        kind.coarsen_kernel()
    } else {
        kind.refine_kernel()
    };
    warp(src, target, kernel)
}

// ── Interpolating kernels ─────────────────────────────────────────────────────

fn sample_cell(src: &RasterGrid, target: &GridSpec, row: usize, col: usize, kernel: Kernel) -> f32 {
    let (x, y) = target.cell_center(row, col);
    let (sx, sy) = target.crs.transform(src.spec.crs, x, y);
    let (px, py) = src.spec.to_pixel(sx, sy);
    let (w, h) = (src.width(), src.height());
    if px < -0.5 || py < -0.5 || px >= w as f64 - 0.5 || py >= h as f64 - 0.5 {
        return f32::NAN;
    }
    let px = px.clamp(0.0, (w - 1) as f64);
    let py = py.clamp(0.0, (h - 1) as f64);
    match kernel {
        Kernel::Nearest => nearest_interpolate(&src.data, w, h, px, py),
        Kernel::Bilinear => bilinear_interpolate(&src.data, w, h, px, py),
        _ => cubic_interpolate(&src.data, w, h, px, py),
    }
}

/// Value of the grid point nearest to pixel position (x, y).
pub fn nearest_interpolate(data: &[f32], width: usize, height: usize, x: f64, y: f64) -> f32 {
    let col = x.round() as usize;
    let row = y.round() as usize;
    if col >= width || row >= height {
        return f32::NAN;
    }
    data[row * width + col]
}

/// Bilinear blend of the four surrounding grid points. Missing if any is missing.
pub fn bilinear_interpolate(data: &[f32], width: usize, height: usize, x: f64, y: f64) -> f32 {
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    if x0 >= width || y0 >= height {
        return f32::NAN;
    }
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let xf = (x - x0 as f64) as f32;
    let yf = (y - y0 as f64) as f32;

    let v00 = data[y0 * width + x0];
    let v10 = data[y0 * width + x1];
    let v01 = data[y1 * width + x0];
    let v11 = data[y1 * width + x1];
    if v00.is_nan() || v10.is_nan() || v01.is_nan() || v11.is_nan() {
        return f32::NAN;
    }
    let top = v00 * (1.0 - xf) + v10 * xf;
    let bottom = v01 * (1.0 - xf) + v11 * xf;
    top * (1.0 - yf) + bottom * yf
}

/// Catmull-Rom bicubic over the 4x4 neighbourhood, edges clamped. Falls back to
/// bilinear when the neighbourhood has a missing cell.
pub fn cubic_interpolate(data: &[f32], width: usize, height: usize, x: f64, y: f64) -> f32 {
    let xi = x.floor() as i64;
    let yi = y.floor() as i64;
    let xf = (x - xi as f64) as f32;
    let yf = (y - yi as f64) as f32;

    let mut values = [[0.0f32; 4]; 4];
    for (j, row) in values.iter_mut().enumerate() {
        for (i, v) in row.iter_mut().enumerate() {
            let px = (xi + i as i64 - 1).clamp(0, width as i64 - 1) as usize;
            let py = (yi + j as i64 - 1).clamp(0, height as i64 - 1) as usize;
            *v = data[py * width + px];
            if v.is_nan() {
                return bilinear_interpolate(data, width, height, x, y);
            }
        }
    }

    let mut cols = [0.0f32; 4];
    for (c, row) in cols.iter_mut().zip(&values) {
        *c = catmull_rom(row[0], row[1], row[2], row[3], xf);
    }
    catmull_rom(cols[0], cols[1], cols[2], cols[3], yf)
}

fn catmull_rom(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
    let t2 = t * t;
    let t3 = t2 * t;
    let a = -0.5 * p0 + 1.5 * p1 - 1.5 * p2 + 0.5 * p3;
    let b = p0 - 2.5 * p1 + 2.0 * p2 - 0.5 * p3;
    let c = -0.5 * p0 + 0.5 * p2;
    a * t3 + b * t2 + c * t + p1
}

// ── Aggregating kernels ───────────────────────────────────────────────────────

fn aggregate_cell(src: &RasterGrid, target: &GridSpec, row: usize, col: usize, kernel: Kernel) -> f32 {
    let footprint = cell_bounds(target, row, col).transform(target.crs, src.spec.crs);
    let s = &src.spec;

    // Source cells whose centre lies in [min_x, max_x) × (min_y, max_y].
    let col_lo = first_index((footprint.min_x - s.origin_x) / s.cell_width - 0.5, s.width);
    let col_hi = first_index((footprint.max_x - s.origin_x) / s.cell_width - 0.5, s.width);
    let row_lo = first_index((s.origin_y - footprint.max_y) / s.cell_height - 0.5, s.height);
    let row_hi = first_index((s.origin_y - footprint.min_y) / s.cell_height - 0.5, s.height);

    if col_lo >= col_hi || row_lo >= row_hi {
        // Target cell smaller than a source cell: take the share of the cell it sits in.
        let (x, y) = footprint_center(&footprint);
        return match s.locate(x, y) {
            Some((r, c)) => {
                let v = src.get(r, c);
                match kernel {
                    Kernel::Sum => v * ((footprint.width() * footprint.height()) / (s.cell_width * s.cell_height)) as f32,
                    _ => v,
                }
            }
            None => f32::NAN,
        };
    }

    let mut sum = 0.0f64;
    let mut count = 0usize;
    for r in row_lo..row_hi {
        for &v in &src.data[r * s.width + col_lo..r * s.width + col_hi] {
            if !v.is_nan() {
                sum += v as f64;
                count += 1;
            }
        }
    }
    if count == 0 {
        return f32::NAN;
    }
    match kernel {
        Kernel::Sum => sum as f32,
        _ => (sum / count as f64) as f32,
    }
}

/// Smallest index whose centre offset is at least `offset`, clamped to `0..=len`.
fn first_index(offset: f64, len: usize) -> usize {
    offset.ceil().clamp(0.0, len as f64) as usize
}

fn cell_bounds(spec: &GridSpec, row: usize, col: usize) -> Bounds {
    let min_x = spec.origin_x + col as f64 * spec.cell_width;
    let max_y = spec.origin_y - row as f64 * spec.cell_height;
    Bounds::new(min_x, max_y - spec.cell_height, min_x + spec.cell_width, max_y)
}

fn footprint_center(b: &Bounds) -> (f64, f64) {
    ((b.min_x + b.max_x) / 2.0, (b.min_y + b.max_y) / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Crs;
    use approx::assert_relative_eq;

    fn grid(w: usize, h: usize, cell: f64) -> GridSpec {
        GridSpec::new(w, h, 0.0, h as f64 * cell, cell, cell, Crs::Wgs84)
    }

    fn ramp(spec: GridSpec) -> RasterGrid {
        let data = (0..spec.len()).map(|i| (i + 1) as f32).collect();
        RasterGrid::from_data(spec, data).unwrap()
    }

    #[test]
    fn mean_coarsening_averages_instead_of_summing() {
        // 1, 2 / 3, 4 → mean 2.5, sum 10.
        let src = ramp(grid(2, 2, 1.0));
        let target = grid(1, 1, 2.0);
        let mean = warp(&src, &target, Kernel::Mean).unwrap();
        assert_relative_eq!(mean.data[0], 2.5);
        let sum = warp(&src, &target, Kernel::Sum).unwrap();
        assert_relative_eq!(sum.data[0], 10.0);
    }

    #[test]
    fn sum_coarsening_preserves_total() {
        let src = ramp(grid(8, 6, 0.5));
        let target = grid(4, 3, 1.0);
        let out = warp(&src, &target, Kernel::Sum).unwrap();
        let before: f32 = src.data.iter().sum();
        let after: f32 = out.data.iter().sum();
        assert_relative_eq!(before, after, epsilon = 1e-3);
    }

    #[test]
    fn mean_ignores_missing_cells() {
        let src = RasterGrid::from_data(grid(2, 2, 1.0), vec![f32::NAN, 2.0, 4.0, f32::NAN]).unwrap();
        let out = warp(&src, &grid(1, 1, 2.0), Kernel::Mean).unwrap();
        assert_relative_eq!(out.data[0], 3.0);
        let empty = RasterGrid::new(grid(2, 2, 1.0), f32::NAN);
        assert!(warp(&empty, &grid(1, 1, 2.0), Kernel::Mean).unwrap().data[0].is_nan());
    }

    #[test]
    fn nearest_refinement_replicates_cells() {
        let src = ramp(grid(2, 2, 2.0));
        let out = warp(&src, &grid(4, 4, 1.0), Kernel::Nearest).unwrap();
        assert_eq!(out.get(0, 0), 1.0);
        assert_eq!(out.get(0, 1), 1.0);
        assert_eq!(out.get(1, 2), 2.0);
        assert_eq!(out.get(3, 3), 4.0);
    }

    #[test]
    fn bicubic_reproduces_linear_field() {
        // Catmull-Rom is exact on linear data away from the clamped border.
        let spec = grid(8, 8, 1.0);
        let mut src = RasterGrid::new(spec, 0.0);
        for r in 0..8 {
            for c in 0..8 {
                src.set(r, c, (2 * c + 3 * r) as f32);
            }
        }
        let fine = GridSpec::new(8, 8, 2.0, 6.0, 0.5, 0.5, Crs::Wgs84);
        let out = warp(&src, &fine, Kernel::Bicubic).unwrap();
        for r in 0..8 {
            for c in 0..8 {
                let (x, y) = fine.cell_center(r, c);
                let (px, py) = spec.to_pixel(x, y);
                let expected = 2.0 * px + 3.0 * py;
                assert_relative_eq!(out.get(r, c) as f64, expected, epsilon = 1e-3);
            }
        }
    }

    #[test]
    fn bicubic_falls_back_near_missing() {
        let mut src = ramp(grid(4, 4, 1.0));
        src.set(0, 0, f32::NAN);
        let v = cubic_interpolate(&src.data, 4, 4, 1.5, 1.5);
        assert_relative_eq!(v, bilinear_interpolate(&src.data, 4, 4, 1.5, 1.5));
    }

    #[test]
    fn cells_outside_source_are_missing() {
        let src = ramp(grid(2, 2, 1.0));
        let target = GridSpec::new(4, 2, 0.0, 2.0, 1.0, 1.0, Crs::Wgs84);
        let out = warp(&src, &target, Kernel::Nearest).unwrap();
        assert_eq!(out.get(0, 1), 2.0);
        assert!(out.get(0, 2).is_nan());
        assert!(out.get(1, 3).is_nan());
    }

    #[test]
    fn disjoint_grids_are_rejected() {
        let src = ramp(grid(2, 2, 1.0));
        let far = GridSpec::new(2, 2, 100.0, 50.0, 1.0, 1.0, Crs::Wgs84);
        assert!(warp(&src, &far, Kernel::Mean).is_err());
    }

    #[test]
    fn align_picks_kernel_by_direction() {
        let fine = ramp(grid(4, 4, 1.0));
        let coarse_spec = grid(2, 2, 2.0);
        // Counts are summed when coarsened.
        let counts = align(&fine, &coarse_spec, FieldKind::Count).unwrap();
        assert_relative_eq!(counts.get(0, 0), 1.0 + 2.0 + 5.0 + 6.0);
        // Densities are averaged.
        let density = align(&fine, &coarse_spec, FieldKind::Density).unwrap();
        assert_relative_eq!(density.get(0, 0), 3.5);
        // Refinement is nearest.
        let back = align(&density, &fine.spec, FieldKind::Index).unwrap();
        assert_eq!(back.get(1, 1), 3.5);
    }

    #[test]
    fn warp_across_reference_systems() {
        let src = RasterGrid::new(GridSpec::new(4, 4, 80.0, 22.0, 0.5, 0.5, Crs::Wgs84), 7.0);
        let b = src.spec.bounds().transform(Crs::Wgs84, Crs::WebMercator);
        let target = GridSpec::covering(&b, b.width() / 3.0, b.height() / 3.0, Crs::WebMercator).unwrap();
        let out = warp(&src, &target, Kernel::Nearest).unwrap();
        assert_eq!(out.valid_count(), target.len());
        assert!(out.data.iter().all(|&v| v == 7.0));
    }
}
