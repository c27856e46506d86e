//! Min–max rescaling of layers to [0, 1].

use serde::{Deserialize, Serialize};

use crate::error::{Result, RiskError};
use crate::raster::RasterGrid;
use crate::region::RegionMask;

/// Observed range of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMax {
    pub min: f32,
    pub max: f32,
}

impl MinMax {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Range over the valid cells of `raster`, restricted to `mask` when given.
    pub fn observe(raster: &RasterGrid, mask: Option<&RegionMask>) -> Result<Self> {
        let range = match mask {
            Some(m) => raster.valid_min_max_within(m)?,
            None => raster.valid_min_max(),
        };
        range
            .map(|(min, max)| Self { min, max })
            .ok_or_else(|| RiskError::InvalidRaster("no valid cells to normalise".into()))
    }

    #[inline]
    pub fn range(&self) -> f32 {
        self.max - self.min
    }

    /// `(v − min) / (max − min)`; 0 for a constant layer. Missing stays missing.
    #[inline]
    pub fn normalize(&self, v: f32) -> f32 {
        if v.is_nan() {
            return v;
        }
        let range = self.range();
        if range <= 0.0 {
            0.0
        } else {
            (v - self.min) / range
        }
    }

    #[inline]
    pub fn unnormalize(&self, n: f32) -> f32 {
        self.min + n * self.range()
    }
}

/// Rescale a layer by the range observed inside `mask` (or everywhere).
/// Cells outside the mask may fall outside [0, 1].
pub fn normalize_raster(raster: &RasterGrid, mask: Option<&RegionMask>) -> Result<(RasterGrid, MinMax)> {
    let mm = MinMax::observe(raster, mask)?;
    Ok((raster.map(|v| mm.normalize(v)), mm))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Crs;
    use crate::raster::GridSpec;
    use approx::assert_relative_eq;

    fn spec() -> GridSpec {
        GridSpec::new(4, 1, 0.0, 1.0, 1.0, 1.0, Crs::Wgs84)
    }

    #[test]
    fn endpoints_map_to_zero_and_one() {
        let mm = MinMax::new(12.0, 52.0);
        assert_eq!(mm.normalize(12.0), 0.0);
        assert_eq!(mm.normalize(52.0), 1.0);
        assert_relative_eq!(mm.normalize(22.0), 0.25);
    }

    #[test]
    fn unnormalize_inverts_normalize() {
        let mm = MinMax::new(-3.5, 41.0);
        for v in [-3.5f32, 0.0, 7.25, 41.0] {
            assert_relative_eq!(mm.unnormalize(mm.normalize(v)), v, epsilon = 1e-4);
        }
    }

    #[test]
    fn constant_layer_is_zero() {
        let r = RasterGrid::new(spec(), 5.0);
        let (n, mm) = normalize_raster(&r, None).unwrap();
        assert_eq!(mm.range(), 0.0);
        assert!(n.data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn missing_stays_missing() {
        let r = RasterGrid::from_data(spec(), vec![f32::NAN, 1.0, 3.0, 5.0]).unwrap();
        let (n, _) = normalize_raster(&r, None).unwrap();
        assert!(n.data[0].is_nan());
        assert_eq!(&n.data[1..], &[0.0, 0.5, 1.0]);
    }

    #[test]
    fn range_follows_the_mask() {
        let r = RasterGrid::from_data(spec(), vec![100.0, 1.0, 3.0, 5.0]).unwrap();
        let mask = RegionMask { spec: spec(), inside: vec![false, true, true, true] };
        let (n, mm) = normalize_raster(&r, Some(&mask)).unwrap();
        assert_eq!(mm, MinMax::new(1.0, 5.0));
        assert_eq!(n.data[3], 1.0);
        assert!(n.data[0] > 1.0);
    }

    #[test]
    fn all_missing_layer_is_an_error() {
        let r = RasterGrid::new(spec(), f32::NAN);
        assert!(normalize_raster(&r, None).is_err());
    }
}
