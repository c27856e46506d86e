//! Colour ramps for rendering single-band rasters as RGBA.

use serde::{Deserialize, Serialize};

use crate::normalize::MinMax;
use crate::raster::RasterGrid;

/// A colour stop: position in [0, 1] mapped to an RGB colour.
#[derive(Debug, Clone, Copy)]
struct ColorStop {
    t: f64,
    rgb: [u8; 3],
}

impl ColorStop {
    const fn new(t: f64, r: u8, g: u8, b: u8) -> Self {
        Self { t, rgb: [r, g, b] }
    }
}

// ── Stop definitions ──────────────────────────────────────────────────────────

/// white → yellow → orange → red → dark red
const HEAT_STOPS: &[ColorStop] = &[
    ColorStop::new(0.00, 255, 255, 255),
    ColorStop::new(0.25, 255, 255, 0),
    ColorStop::new(0.50, 255, 165, 0),
    ColorStop::new(0.75, 255, 0, 0),
    ColorStop::new(1.00, 139, 0, 0),
];

/// Available ramps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorRamp {
    #[default]
    Heat,
    Grayscale,
}

impl ColorRamp {
    /// Colour at normalised position `t`, clamped to [0, 1].
    pub fn evaluate(self, t: f64) -> [u8; 3] {
        match self {
            ColorRamp::Heat => multi_stop(HEAT_STOPS, t),
            ColorRamp::Grayscale => {
                let v = (t.clamp(0.0, 1.0) * 255.0).round() as u8;
                [v, v, v]
            }
        }
    }
}

fn lerp(a: u8, b: u8, t: f64) -> u8 {
    (a as f64 + (b as f64 - a as f64) * t).round() as u8
}

fn multi_stop(stops: &[ColorStop], t: f64) -> [u8; 3] {
    let last = stops[stops.len() - 1].rgb;
    if t.is_nan() || t <= 0.0 {
        return stops[0].rgb;
    }
    if t >= 1.0 {
        return last;
    }
    for pair in stops.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if t <= b.t {
            let ratio = (t - a.t) / (b.t - a.t);
            return [
                lerp(a.rgb[0], b.rgb[0], ratio),
                lerp(a.rgb[1], b.rgb[1], ratio),
                lerp(a.rgb[2], b.rgb[2], ratio),
            ];
        }
    }
    last
}

/// Row-major RGBA bytes for `raster`, stretching `range` (default: the raster's
/// own valid range) over the ramp. Missing cells are fully transparent.
pub fn colorize(raster: &RasterGrid, ramp: ColorRamp, range: Option<MinMax>) -> Vec<u8> {
    let range = range
        .or_else(|| raster.valid_min_max().map(|(lo, hi)| MinMax::new(lo, hi)))
        .unwrap_or(MinMax::new(0.0, 1.0));
    let mut rgba = Vec::with_capacity(raster.data.len() * 4);
    for &v in &raster.data {
        if v.is_nan() {
            rgba.extend_from_slice(&[0, 0, 0, 0]);
        } else {
            let [r, g, b] = ramp.evaluate(range.normalize(v) as f64);
            rgba.extend_from_slice(&[r, g, b, 255]);
        }
    }
    rgba
}
