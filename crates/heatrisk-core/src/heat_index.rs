//! Heat Index from 2 m temperature and dewpoint.
//!
//! Per cell:
//!   1. Kelvin → Celsius.
//!   2. Magnus vapour pressure for temperature (saturation) and dewpoint (actual).
//!   3. Relative humidity = 100 · e / es, clamped to [0, 100].
//!   4. Steadman/Rothfusz polynomial for T ≥ 26.7 °C, the simple formula below it.
//!
//! Missing inputs (NaN) yield a missing output cell.

use tracing::info;

use crate::error::Result;
use crate::raster::RasterGrid;
use crate::series::RasterSeries;

pub const KELVIN_OFFSET: f64 = 273.15;

/// Below this temperature (°C, strict) the simple formula applies.
pub const POLYNOMIAL_MIN_TEMP_C: f64 = 26.7;

const C1: f64 = -8.78469475556;
const C2: f64 = 1.61139411;
const C3: f64 = 2.33854883889;
const C4: f64 = -0.14611605;
const C5: f64 = -0.012308094;
const C6: f64 = -0.0164248277778;
const C7: f64 = 0.002211732;
const C8: f64 = 0.00072546;
const C9: f64 = -0.000003582;

#[inline]
pub fn kelvin_to_celsius(k: f64) -> f64 {
    k - KELVIN_OFFSET
}

/// Magnus vapour pressure in hPa: `6.11 · 10^(7.5 t / (237.3 + t))`.
#[inline]
pub fn vapor_pressure(t_c: f64) -> f64 {
    6.11 * 10f64.powf(7.5 * t_c / (237.3 + t_c))
}

/// Relative humidity (%) from temperature and dewpoint in °C, clamped to [0, 100].
/// A dewpoint above the temperature (supersaturation) clamps to 100.
#[inline]
pub fn relative_humidity(t_c: f64, td_c: f64) -> f64 {
    (100.0 * vapor_pressure(td_c) / vapor_pressure(t_c)).clamp(0.0, 100.0)
}

/// Full nine-term polynomial in T (°C) and RH (%).
#[inline]
pub fn heat_index_full(t: f64, rh: f64) -> f64 {
    C1 + C2 * t
        + C3 * rh
        + C4 * t * rh
        + C5 * t * t
        + C6 * rh * rh
        + C7 * t * t * rh
        + C8 * t * rh * rh
        + C9 * t * t * rh * rh
}

/// `0.5 · (T + 16.92 + |T − 16.92| + 0.18 · RH)`.
#[inline]
pub fn heat_index_simple(t: f64, rh: f64) -> f64 {
    0.5 * (t + 16.92 + (t - 16.92).abs() + 0.18 * rh)
}

/// Heat Index (°C-like units) from temperature and relative humidity.
#[inline]
pub fn heat_index(t_c: f64, rh: f64) -> f64 {
    if t_c < POLYNOMIAL_MIN_TEMP_C {
        heat_index_simple(t_c, rh)
    } else {
        heat_index_full(t_c, rh)
    }
}

/// Heat Index for one cell from Kelvin inputs; NaN if either input is missing.
#[inline]
pub fn heat_index_kelvin(t_k: f32, td_k: f32) -> f32 {
    if t_k.is_nan() || td_k.is_nan() {
        return f32::NAN;
    }
    let t = kelvin_to_celsius(t_k as f64);
    let td = kelvin_to_celsius(td_k as f64);
    heat_index(t, relative_humidity(t, td)) as f32
}

/// Heat Index raster from one day's temperature and dewpoint rasters (Kelvin).
pub fn heat_index_raster(temperature: &RasterGrid, dewpoint: &RasterGrid) -> Result<RasterGrid> {
    temperature.zip_with(dewpoint, "heat index", heat_index_kelvin)
}

/// Daily Heat Index series. Days missing from either input are absent.
pub fn heat_index_series(temperature: &RasterSeries, dewpoint: &RasterSeries) -> Result<RasterSeries> {
    let hi = temperature.zip_with(dewpoint, "heat_index", heat_index_raster)?;
    info!(days = hi.len(), "heat index series built");
    Ok(hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Crs;
    use crate::raster::GridSpec;
    use approx::assert_relative_eq;

    #[test]
    fn simple_branch_below_threshold() {
        let rh = 60.0;
        for t in [-10.0, 0.0, 15.0, 26.69] {
            assert_eq!(heat_index(t, rh), heat_index_simple(t, rh), "t={t}");
        }
    }

    #[test]
    fn polynomial_branch_at_and_above_threshold() {
        let rh = 60.0;
        for t in [26.7, 30.0, 45.0] {
            assert_eq!(heat_index(t, rh), heat_index_full(t, rh), "t={t}");
        }
        // The two formulas differ at the boundary, so the branch choice is observable.
        assert!((heat_index_full(26.7, rh) - heat_index_simple(26.7, rh)).abs() > 1e-3);
    }

    #[test]
    fn simple_formula_known_values() {
        // T above 16.92: 0.5 * (2T + 0.18 RH) = T + 0.09 RH
        assert_relative_eq!(heat_index_simple(20.0, 50.0), 24.5, epsilon = 1e-12);
        // T below 16.92: 0.5 * (33.84 + 0.18 RH)
        assert_relative_eq!(heat_index_simple(10.0, 50.0), 21.42, epsilon = 1e-12);
    }

    #[test]
    fn polynomial_matches_hand_evaluation() {
        let (t, rh) = (35.0f64, 50.0f64);
        let expected = -8.78469475556
            + 1.61139411 * 35.0
            + 2.33854883889 * 50.0
            - 0.14611605 * 35.0 * 50.0
            - 0.012308094 * 35.0 * 35.0
            - 0.0164248277778 * 50.0 * 50.0
            + 0.002211732 * 35.0 * 35.0 * 50.0
            + 0.00072546 * 35.0 * 50.0 * 50.0
            - 0.000003582 * 35.0 * 35.0 * 50.0 * 50.0;
        assert_relative_eq!(heat_index_full(t, rh), expected, epsilon = 1e-12);
        // Roughly 45 °C apparent temperature at 35 °C / 50 %.
        assert!(expected > 40.0 && expected < 50.0, "HI={expected}");
    }

    #[test]
    fn relative_humidity_stays_in_range() {
        let mut state: u64 = 7;
        for _ in 0..2000 {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let t = (state >> 11) as f64 / (1u64 << 53) as f64 * 80.0 - 30.0;
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let td = (state >> 11) as f64 / (1u64 << 53) as f64 * 80.0 - 30.0;
            let rh = relative_humidity(t, td);
            assert!((0.0..=100.0).contains(&rh), "t={t} td={td} rh={rh}");
        }
    }

    #[test]
    fn supersaturated_dewpoint_clamps_to_100() {
        assert_eq!(relative_humidity(20.0, 25.0), 100.0);
        assert_relative_eq!(relative_humidity(20.0, 20.0), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn raster_uses_kelvin_and_propagates_missing() {
        let spec = GridSpec::new(2, 1, 0.0, 1.0, 1.0, 1.0, Crs::Wgs84);
        let t = RasterGrid::from_data(spec, vec![308.15, f32::NAN]).unwrap();
        let td = RasterGrid::from_data(spec, vec![296.15, 290.0]).unwrap();
        let hi = heat_index_raster(&t, &td).unwrap();
        let expected = heat_index(35.0, relative_humidity(35.0, 23.0));
        assert_relative_eq!(hi.data[0] as f64, expected, epsilon = 1e-3);
        assert!(hi.data[1].is_nan());
    }
}
