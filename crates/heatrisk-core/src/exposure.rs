//! Exposure layer: population clipped to the study region.

use tracing::info;

use crate::error::{Result, RiskError};
use crate::raster::RasterGrid;
use crate::region::RegionMask;

/// Population with missing cells set to zero and everything outside the
/// region masked out.
pub fn build_exposure(population: &RasterGrid, region: &RegionMask) -> Result<RasterGrid> {
    if region.is_empty() {
        return Err(RiskError::InvalidRaster("region mask covers no population cells".into()));
    }
    let missing = population.data.len() - population.valid_count();
    let exposure = population.fill_missing(0.0).mask_with(region)?;
    info!(
        cells = region.count(),
        missing_filled = missing,
        range = ?exposure.valid_min_max(),
        "exposure built"
    );
    Ok(exposure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Crs;
    use crate::raster::GridSpec;

    #[test]
    fn missing_population_is_zero_inside_region() {
        let spec = GridSpec::new(3, 1, 0.0, 1.0, 1.0, 1.0, Crs::Wgs84);
        let pop = RasterGrid::from_data(spec, vec![f32::NAN, 120.0, 80.0]).unwrap();
        let mask = RegionMask { spec, inside: vec![true, true, false] };
        let e = build_exposure(&pop, &mask).unwrap();
        assert_eq!(e.data[0], 0.0);
        assert_eq!(e.data[1], 120.0);
        assert!(e.data[2].is_nan());
    }

    #[test]
    fn mask_must_share_the_grid() {
        let spec = GridSpec::new(3, 1, 0.0, 1.0, 1.0, 1.0, Crs::Wgs84);
        let other = GridSpec::new(2, 1, 0.0, 1.0, 1.0, 1.0, Crs::Wgs84);
        let pop = RasterGrid::new(spec, 1.0);
        let mask = RegionMask { spec: other, inside: vec![true, true] };
        assert!(build_exposure(&pop, &mask).is_err());
    }
}
