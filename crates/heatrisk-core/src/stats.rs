//! Selection and moment statistics over plain value slices.

/// Percentile `p` (0–100) of the non-missing values, by linear interpolation
/// between closest ranks (rank = p/100 · (n − 1)). `None` when no value is present.
///
/// Reorders `values` in place.
pub fn percentile(values: &mut Vec<f32>, p: f64) -> Option<f32> {
    values.retain(|v| !v.is_nan());
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (values.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    let v = values[lo] as f64 + (values[hi] as f64 - values[lo] as f64) * frac;
    Some(v as f32)
}

/// Count, mean and population standard deviation of the non-missing values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Moments {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub max: f64,
}

pub fn moments(values: impl IntoIterator<Item = f32>) -> Option<Moments> {
    // Welford, so long districts do not lose precision.
    let mut count = 0usize;
    let mut mean = 0.0f64;
    let mut m2 = 0.0f64;
    let mut max = f64::NEG_INFINITY;
    for v in values.into_iter().filter(|v| !v.is_nan()) {
        let v = v as f64;
        count += 1;
        let delta = v - mean;
        mean += delta / count as f64;
        m2 += delta * (v - mean);
        max = max.max(v);
    }
    if count == 0 {
        return None;
    }
    Some(Moments {
        count,
        mean,
        std_dev: (m2 / count as f64).sqrt(),
        max,
    })
}
