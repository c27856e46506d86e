//! Heat hazard: how often the study window exceeds the monthly baseline.
//!
//! Each study day is compared cell-wise against the threshold of its calendar
//! month. The default hazard is the number of exceedance days per cell, a proxy
//! for heatwave frequency that does not require consecutive days. The run-length
//! metric counts only days that belong to runs of at least `min_run` consecutive
//! exceedance days.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::baseline::MonthlyThresholds;
use crate::error::{Result, RiskError};
use crate::raster::RasterGrid;
use crate::series::{DateRange, RasterSeries};

/// How exceedance days are turned into a hazard value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum HazardMetric {
    /// Total days with HI above the month's threshold.
    #[default]
    ExceedanceDays,
    /// Days belonging to runs of at least `min_run` consecutive exceedance days.
    HeatwaveDays { min_run: u32 },
}

/// 1 where HI strictly exceeds the threshold, else 0. Missing cells in either
/// input resolve to 0.
pub fn exceedance(hi: &RasterGrid, threshold: &RasterGrid) -> Result<RasterGrid> {
    hi.zip_with(threshold, "exceedance", |h, t| if h > t { 1.0 } else { 0.0 })
}

/// Sum of daily exceedance flags over every day in the series.
pub fn count_exceedances(hi: &RasterSeries, thresholds: &MonthlyThresholds) -> Result<RasterGrid> {
    let spec = hi
        .spec()
        .ok_or_else(|| RiskError::EmptySeries("no heat index days in study window".into()))?;
    let mut count = RasterGrid::new(spec, 0.0);
    for day in hi {
        let flags = exceedance(&day.raster, thresholds.for_date(day.date)?)?;
        for (c, f) in count.data.iter_mut().zip(&flags.data) {
            *c += f;
        }
    }
    Ok(count)
}

/// Days that belong to runs of at least `min_run` consecutive exceedance days.
/// A gap in the dates ends every open run.
pub fn count_heatwave_days(
    hi: &RasterSeries,
    thresholds: &MonthlyThresholds,
    min_run: u32,
) -> Result<RasterGrid> {
    let spec = hi
        .spec()
        .ok_or_else(|| RiskError::EmptySeries("no heat index days in study window".into()))?;
    let min_run = min_run.max(1);
    let mut count = RasterGrid::new(spec, 0.0);
    let mut run = vec![0u32; spec.len()];

    let flush = |run: &mut u32, total: &mut f32| {
        if *run >= min_run {
            *total += *run as f32;
        }
        *run = 0;
    };

    let mut previous: Option<NaiveDate> = None;
    for day in hi {
        if let Some(prev) = previous {
            if (day.date - prev).num_days() != 1 {
                for (r, c) in run.iter_mut().zip(count.data.iter_mut()) {
                    flush(r, c);
                }
            }
        }
        previous = Some(day.date);

        let flags = exceedance(&day.raster, thresholds.for_date(day.date)?)?;
        for ((r, c), &f) in run.iter_mut().zip(count.data.iter_mut()).zip(&flags.data) {
            if f > 0.0 {
                *r += 1;
            } else {
                flush(r, c);
            }
        }
    }
    for (r, c) in run.iter_mut().zip(count.data.iter_mut()) {
        flush(r, c);
    }
    Ok(count)
}

/// Hazard raster for the study window at the Heat Index grid's native resolution.
pub fn build_hazard(
    hi: &RasterSeries,
    thresholds: &MonthlyThresholds,
    study: &DateRange,
    metric: HazardMetric,
) -> Result<RasterGrid> {
    let study_hi = hi.within(study);
    if study_hi.is_empty() {
        return Err(RiskError::EmptySeries(format!(
            "no heat index days between {} and {}",
            study.start, study.end
        )));
    }
    let hazard = match metric {
        HazardMetric::ExceedanceDays => count_exceedances(&study_hi, thresholds)?,
        HazardMetric::HeatwaveDays { min_run } => count_heatwave_days(&study_hi, thresholds, min_run)?,
    };
    info!(
        days = study_hi.len(),
        expected_days = study.num_days(),
        ?metric,
        max = ?hazard.valid_min_max().map(|(_, hi)| hi),
        "hazard built"
    );
    Ok(hazard)
}
