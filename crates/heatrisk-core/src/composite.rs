//! Risk = normalised hazard × normalised exposure × normalised vulnerability.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::normalize::MinMax;
use crate::raster::RasterGrid;
use crate::region::RegionMask;

/// Observed range of each input layer over the region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerRanges {
    pub hazard: MinMax,
    pub exposure: MinMax,
    pub vulnerability: MinMax,
}

/// Composite risk raster on the analysis grid, masked to the region.
#[derive(Debug, Clone)]
pub struct Composite {
    pub risk: RasterGrid,
    pub ranges: LayerRanges,
}

/// Rescale one layer to [0, 1] by its own range inside the region.
fn normalized_layer(name: &str, layer: &RasterGrid, region: &RegionMask) -> Result<(RasterGrid, MinMax)> {
    let range = MinMax::observe(layer, Some(region))?;
    if range.range() <= 0.0 {
        warn!(layer = name, value = range.min, "layer is constant over the region; normalised to 0");
    }
    let scaled = layer.map(|v| if v.is_nan() { v } else { range.normalize(v).clamp(0.0, 1.0) });
    Ok((scaled, range))
}

/// Normalise each layer independently and multiply cell-wise. Cells outside
/// the region are missing in the result.
pub fn compose_risk(
    hazard: &RasterGrid,
    exposure: &RasterGrid,
    vulnerability: &RasterGrid,
    region: &RegionMask,
) -> Result<Composite> {
    let (nh, hazard_range) = normalized_layer("hazard", hazard, region)?;
    let (ne, exposure_range) = normalized_layer("exposure", exposure, region)?;
    let (nv, vulnerability_range) = normalized_layer("vulnerability", vulnerability, region)?;

    let risk = nh
        .zip_with(&ne, "risk: hazard × exposure", |h, e| h * e)?
        .zip_with(&nv, "risk: × vulnerability", |he, v| he * v)?
        .mask_with(region)?;

    info!(
        cells = risk.valid_count(),
        range = ?risk.valid_min_max(),
        "risk composed"
    );
    Ok(Composite {
        risk,
        ranges: LayerRanges {
            hazard: hazard_range,
            exposure: exposure_range,
            vulnerability: vulnerability_range,
        },
    })
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

    fn layer(v: [f32; 4]) -> RasterGrid {
        RasterGrid::from_data(spec(), v.to_vec()).unwrap()
    }

    fn everywhere() -> RegionMask {
        RegionMask { spec: spec(), inside: vec![true; 4] }
    }

    #[test]
    fn zero_in_any_layer_zeroes_risk() {
        // Each layer's minimum sits in a different cell.
        let h = layer([0.0, 5.0, 10.0, 10.0]);
        let e = layer([100.0, 0.0, 100.0, 100.0]);
        let v = layer([1.0, 1.0, 0.2, 1.0]);
        let c = compose_risk(&h, &e, &v, &everywhere()).unwrap();
        assert_eq!(&c.risk.data[..3], &[0.0, 0.0, 0.0]);
        assert_relative_eq!(c.risk.data[3], 1.0);
    }

    #[test]
    fn risk_is_product_of_normalised_layers() {
        let h = layer([0.0, 2.0, 4.0, 8.0]);
        let e = layer([0.0, 50.0, 100.0, 100.0]);
        let v = layer([0.0, 0.5, 0.5, 1.0]);
        let c = compose_risk(&h, &e, &v, &everywhere()).unwrap();
        assert_relative_eq!(c.risk.data[1], 0.25 * 0.5 * 0.5);
        assert_relative_eq!(c.risk.data[2], 0.5 * 1.0 * 0.5);
        assert_eq!(c.ranges.hazard, MinMax::new(0.0, 8.0));
    }

    #[test]
    fn risk_is_monotone_in_each_layer() {
        let e = layer([10.0, 20.0, 30.0, 40.0]);
        let v = layer([0.1, 0.4, 0.7, 0.9]);
        let base = layer([1.0, 3.0, 5.0, 7.0]);
        let bumped = layer([1.0, 3.0, 6.0, 7.0]);
        let a = compose_risk(&base, &e, &v, &everywhere()).unwrap();
        let b = compose_risk(&bumped, &e, &v, &everywhere()).unwrap();
        assert!(b.risk.data[2] >= a.risk.data[2]);
        // Untouched cells keep their value: the range did not move.
        assert_eq!(a.risk.data[1], b.risk.data[1]);
    }

    #[test]
    fn outside_region_is_missing() {
        let l = layer([1.0, 2.0, 3.0, 4.0]);
        let region = RegionMask { spec: spec(), inside: vec![true, true, true, false] };
        let c = compose_risk(&l, &l, &l, &region).unwrap();
        assert!(c.risk.data[3].is_nan());
        assert_relative_eq!(c.risk.data[2], 1.0);
    }

    #[test]
    fn constant_layer_zeroes_everything() {
        let h = layer([3.0; 4]);
        let l = layer([1.0, 2.0, 3.0, 4.0]);
        let c = compose_risk(&h, &l, &l, &everywhere()).unwrap();
        assert!(c.risk.data.iter().all(|&r| r == 0.0));
    }

    #[test]
    fn mismatched_layers_are_rejected() {
        let h = layer([1.0, 2.0, 3.0, 4.0]);
        let other = RasterGrid::new(GridSpec::new(2, 2, 0.0, 2.0, 1.0, 1.0, Crs::Wgs84), 1.0);
        assert!(compose_risk(&h, &other, &h, &everywhere()).is_err());
    }
}
