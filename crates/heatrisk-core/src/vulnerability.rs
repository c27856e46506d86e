//! Vulnerability layer: vegetation deficit blended with the night-time heat island.
//!
//! `v_env` rises as NDVI falls; `v_uhi` is night land-surface temperature rescaled
//! over the region's own observed range. Both are in [0, 1] and the composite is
//! their fixed-weight sum. Composite cells that cannot be computed become 0.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::normalize::{normalize_raster, MinMax};
use crate::raster::RasterGrid;
use crate::region::RegionMask;

/// Weights and sensor scaling for the vulnerability composite.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VulnerabilityConfig {
    /// Weight of the vegetation-deficit term. Default 0.4.
    pub env_weight: f32,
    /// Weight of the urban-heat-island term. Default 0.6.
    pub uhi_weight: f32,
    /// Raw NDVI value that corresponds to 1.0. Default 10000.
    pub ndvi_scale: f32,
    /// Multiplier from raw LST counts to Kelvin. Default 0.02.
    pub lst_scale: f32,
    /// Kelvin → Celsius offset applied after scaling. Default 273.15.
    pub lst_offset: f32,
}

impl Default for VulnerabilityConfig {
    fn default() -> Self {
        Self {
            env_weight: 0.4,
            uhi_weight: 0.6,
            ndvi_scale: 10_000.0,
            lst_scale: 0.02,
            lst_offset: 273.15,
        }
    }
}

/// `clamp(1 − ndvi / scale, 0, 1)`.
#[inline]
pub fn env_score(ndvi_raw: f32, cfg: &VulnerabilityConfig) -> f32 {
    if ndvi_raw.is_nan() {
        return f32::NAN;
    }
    (1.0 - ndvi_raw / cfg.ndvi_scale).clamp(0.0, 1.0)
}

/// Raw LST counts to °C.
#[inline]
pub fn lst_celsius(raw: f32, cfg: &VulnerabilityConfig) -> f32 {
    raw * cfg.lst_scale - cfg.lst_offset
}

/// Night LST (°C) rescaled by its observed range inside the region, clamped to [0, 1].
pub fn uhi_score(lst_c: &RasterGrid, region: &RegionMask) -> Result<(RasterGrid, MinMax)> {
    let (scaled, range) = normalize_raster(lst_c, Some(region))?;
    if range.range() <= 0.0 {
        warn!(value = range.min, "night LST is constant over the region; heat-island term is 0");
    }
    Ok((scaled.map(|v| if v.is_nan() { v } else { v.clamp(0.0, 1.0) }), range))
}

/// Vulnerability raster plus the LST range it was scaled by.
#[derive(Debug, Clone)]
pub struct Vulnerability {
    pub score: RasterGrid,
    pub env: RasterGrid,
    pub uhi: RasterGrid,
    /// Observed night LST range in °C.
    pub lst_range: MinMax,
}

/// Build the composite from an NDVI composite and a raw night LST composite,
/// both already on the analysis grid.
pub fn build_vulnerability(
    ndvi_raw: &RasterGrid,
    lst_raw: &RasterGrid,
    region: &RegionMask,
    cfg: &VulnerabilityConfig,
) -> Result<Vulnerability> {
    let env = ndvi_raw.map(|v| env_score(v, cfg));
    let lst_c = lst_raw.map(|v| lst_celsius(v, cfg));
    let (uhi, lst_range) = uhi_score(&lst_c, region)?;

    let (we, wu) = (cfg.env_weight, cfg.uhi_weight);
    let score = env.zip_with(&uhi, "vulnerability", |e, u| {
        let v = we * e + wu * u;
        if v.is_nan() {
            0.0
        } else {
            v
        }
    })?;
    info!(
        lst_min_c = lst_range.min,
        lst_max_c = lst_range.max,
        range = ?score.valid_min_max_within(region)?,
        "vulnerability built"
    );
    Ok(Vulnerability { score, env, uhi, lst_range })
}
