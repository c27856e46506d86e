//! Monthly Heat Index thresholds from a multi-decade baseline.
//!
//! The baseline window is split into equal sub-periods (three decades for
//! 1991–2020). For each sub-period and calendar month the per-cell percentile is
//! taken across every day of that month in the sub-period; the month's threshold
//! is then the cell-wise mean of the sub-period percentiles.
//!
//! Thresholds are keyed by calendar month only. A month for which any sub-period
//! has no observations is missing, and looking it up is an error.

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, RiskError};
use crate::raster::{GridSpec, RasterGrid};
use crate::series::{DateRange, RasterSeries};
use crate::stats::percentile;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    /// First year of the baseline window.
    pub first_year: i32,
    /// Last year of the baseline window (inclusive).
    pub last_year: i32,
    /// Length of each sub-period in years; must divide the window.
    pub period_years: i32,
    /// Percentile level, 0–100.
    pub percentile: f64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            first_year: 1991,
            last_year: 2020,
            period_years: 10,
            percentile: 90.0,
        }
    }
}

impl BaselineConfig {
    pub fn window(&self) -> Result<DateRange> {
        DateRange::years(self.first_year, self.last_year)
    }

    /// Consecutive sub-periods covering the window.
    pub fn periods(&self) -> Result<Vec<DateRange>> {
        let span = self.last_year - self.first_year + 1;
        if self.period_years <= 0 || span <= 0 || span % self.period_years != 0 {
            return Err(RiskError::Config(format!(
                "baseline {}–{} cannot be split into {}-year periods",
                self.first_year, self.last_year, self.period_years
            )));
        }
        if !(0.0..=100.0).contains(&self.percentile) {
            return Err(RiskError::Config(format!("percentile {} outside 0–100", self.percentile)));
        }
        (0..span / self.period_years)
            .map(|k| {
                let first = self.first_year + k * self.period_years;
                DateRange::years(first, first + self.period_years - 1)
            })
            .collect()
    }
}

/// Per-cell percentile across a set of same-grid rasters. Cells with no value in
/// any member are missing. `None` when there are no members at all.
pub fn cellwise_percentile(members: &[&RasterGrid], p: f64) -> Result<Option<RasterGrid>> {
    let Some(first) = members.first() else {
        return Ok(None);
    };
    let spec = first.spec;
    for m in &members[1..] {
        spec.ensure_same(&m.spec, "baseline percentile")?;
    }
    let data: Vec<f32> = (0..spec.len())
        .into_par_iter()
        .map_init(
            || Vec::with_capacity(members.len()),
            |buf: &mut Vec<f32>, i| {
                buf.clear();
                buf.extend(members.iter().map(|m| m.data[i]));
                percentile(buf, p).unwrap_or(f32::NAN)
            },
        )
        .collect();
    RasterGrid::from_data(spec, data).map(Some)
}

/// Per-cell mean of the non-missing values across same-grid rasters.
fn cellwise_mean(members: &[&RasterGrid]) -> Result<RasterGrid> {
    let first = members
        .first()
        .ok_or_else(|| RiskError::EmptySeries("no rasters to average".into()))?;
    let spec = first.spec;
    for m in &members[1..] {
        spec.ensure_same(&m.spec, "baseline mean")?;
    }
    let data = (0..spec.len())
        .map(|i| {
            let (sum, n) = members
                .iter()
                .map(|m| m.data[i])
                .filter(|v| !v.is_nan())
                .fold((0.0f64, 0u32), |(s, n), v| (s + v as f64, n + 1));
            if n == 0 { f32::NAN } else { (sum / n as f64) as f32 }
        })
        .collect();
    RasterGrid::from_data(spec, data)
}

/// Percentile rasters indexed `[period][month - 1]`; `None` where the period has
/// no observations for that month.
pub fn period_percentiles(hi: &RasterSeries, cfg: &BaselineConfig) -> Result<Vec<Vec<Option<RasterGrid>>>> {
    let periods = cfg.periods()?;
    let mut out = Vec::with_capacity(periods.len());
    for period in &periods {
        let subset = hi.within(period);
        let mut months = Vec::with_capacity(12);
        for month in 1..=12u32 {
            let members: Vec<&RasterGrid> = subset.in_month(month).map(|d| &d.raster).collect();
            debug!(
                period_start = %period.start,
                month,
                days = members.len(),
                "baseline percentile"
            );
            months.push(cellwise_percentile(&members, cfg.percentile)?);
        }
        out.push(months);
    }
    Ok(out)
}

/// Twelve monthly threshold rasters.
#[derive(Debug, Clone)]
pub struct MonthlyThresholds {
    spec: GridSpec,
    months: Vec<Option<RasterGrid>>,
}

impl MonthlyThresholds {
    /// Build thresholds from a Heat Index series covering the baseline window.
    pub fn build(hi: &RasterSeries, cfg: &BaselineConfig) -> Result<Self> {
        let window = cfg.window()?;
        let in_window = hi.within(&window);
        if in_window.is_empty() {
            return Err(RiskError::EmptySeries(format!(
                "no heat index days inside baseline {}–{}",
                cfg.first_year, cfg.last_year
            )));
        }

        let per_period = period_percentiles(&in_window, cfg)?;
        let mut months = Vec::with_capacity(12);
        for m in 0..12 {
            let decade_rasters: Option<Vec<&RasterGrid>> =
                per_period.iter().map(|p| p[m].as_ref()).collect();
            match decade_rasters {
                Some(rasters) => months.push(Some(cellwise_mean(&rasters)?)),
                None => {
                    warn!(month = m + 1, "baseline sub-period without observations; threshold missing");
                    months.push(None);
                }
            }
        }

        let thresholds = Self::from_months(months)?;
        info!(
            periods = per_period.len(),
            missing = ?thresholds.missing_months(),
            "monthly thresholds built"
        );
        Ok(thresholds)
    }

    /// Wrap precomputed thresholds, index 0 = January.
    pub fn from_months(months: Vec<Option<RasterGrid>>) -> Result<Self> {
        if months.len() != 12 {
            return Err(RiskError::InvalidRaster(format!("{} monthly thresholds, expected 12", months.len())));
        }
        let spec = months
            .iter()
            .flatten()
            .map(|r| r.spec)
            .next()
            .ok_or_else(|| RiskError::EmptySeries("every monthly threshold is missing".into()))?;
        for r in months.iter().flatten() {
            spec.ensure_same(&r.spec, "monthly thresholds")?;
        }
        Ok(Self { spec, months })
    }

    pub fn spec(&self) -> GridSpec {
        self.spec
    }

    /// Threshold raster for a calendar month (1–12).
    pub fn get(&self, month: u32) -> Result<&RasterGrid> {
        if !(1..=12).contains(&month) {
            return Err(RiskError::MissingThreshold(month));
        }
        self.months[month as usize - 1]
            .as_ref()
            .ok_or(RiskError::MissingThreshold(month))
    }

    /// Threshold raster matching a date's calendar month.
    pub fn for_date(&self, date: NaiveDate) -> Result<&RasterGrid> {
        use chrono::Datelike;
        self.get(date.month())
    }

    pub fn is_complete(&self) -> bool {
        self.months.iter().all(Option::is_some)
    }

    pub fn missing_months(&self) -> Vec<u32> {
        self.months
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_none())
            .map(|(i, _)| i as u32 + 1)
            .collect()
    }
}
