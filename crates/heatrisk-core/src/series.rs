//! Dated raster series.
//!
//! A series is an explicit, date-ordered sequence of single-day rasters for one
//! variable, all on one grid. Series are built once and never mutated; every
//! transform returns a new series.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, RiskError};
use crate::raster::{GridSpec, RasterGrid};

/// Inclusive date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(RiskError::Config(format!("date range ends ({end}) before it starts ({start})")));
        }
        Ok(Self { start, end })
    }

    /// Whole calendar years `first..=last`.
    pub fn years(first: i32, last: i32) -> Result<Self> {
        let start = NaiveDate::from_ymd_opt(first, 1, 1)
            .ok_or_else(|| RiskError::Config(format!("invalid year {first}")))?;
        let end = NaiveDate::from_ymd_opt(last, 12, 31)
            .ok_or_else(|| RiskError::Config(format!("invalid year {last}")))?;
        Self::new(start, end)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Number of calendar days in the window.
    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Every date in the window, in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        self.start.iter_days().take(self.num_days() as usize)
    }

    /// Calendar years touched by the window.
    pub fn year_span(&self) -> std::ops::RangeInclusive<i32> {
        self.start.year()..=self.end.year()
    }
}

/// One raster tagged with its observation date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatedRaster {
    pub date: NaiveDate,
    pub raster: RasterGrid,
}

impl DatedRaster {
    pub fn new(date: NaiveDate, raster: RasterGrid) -> Self {
        Self { date, raster }
    }

    /// Calendar month, 1–12.
    pub fn month(&self) -> u32 {
        self.date.month()
    }
}

/// Date-ordered rasters of one variable on one grid.
#[derive(Debug, Clone)]
pub struct RasterSeries {
    name: String,
    items: Vec<DatedRaster>,
}

impl RasterSeries {
    /// Sort by date and check that dates are unique and grids agree.
    pub fn new(name: impl Into<String>, mut items: Vec<DatedRaster>) -> Result<Self> {
        let name = name.into();
        items.sort_by_key(|d| d.date);
        for pair in items.windows(2) {
            if pair[0].date == pair[1].date {
                return Err(RiskError::InvalidRaster(format!(
                    "{name}: duplicate raster for {}",
                    pair[0].date
                )));
            }
        }
        if let Some(first) = items.first() {
            for item in &items[1..] {
                first.raster.spec.ensure_same(&item.raster.spec, "series member")?;
            }
        }
        Ok(Self { name, items })
    }

    pub fn empty(name: impl Into<String>) -> Self {
        Self { name: name.into(), items: Vec::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DatedRaster> {
        self.items.iter()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.items.iter().map(|d| d.date)
    }

    /// Grid shared by every member, `None` for an empty series.
    pub fn spec(&self) -> Option<GridSpec> {
        self.items.first().map(|d| d.raster.spec)
    }

    pub fn get(&self, date: NaiveDate) -> Option<&RasterGrid> {
        self.items
            .binary_search_by_key(&date, |d| d.date)
            .ok()
            .map(|i| &self.items[i].raster)
    }

    /// Apply a per-image transform to every member.
    pub fn map(&self, name: impl Into<String>, f: impl Fn(&RasterGrid) -> RasterGrid) -> RasterSeries {
        RasterSeries {
            name: name.into(),
            items: self
                .items
                .iter()
                .map(|d| DatedRaster::new(d.date, f(&d.raster)))
                .collect(),
        }
    }

    /// Pair members by date and combine them. A date present in only one
    /// series is absent from the output; no value is imputed for it.
    pub fn zip_with(
        &self,
        other: &RasterSeries,
        name: impl Into<String>,
        f: impl Fn(&RasterGrid, &RasterGrid) -> Result<RasterGrid>,
    ) -> Result<RasterSeries> {
        let name = name.into();
        let mut items = Vec::with_capacity(self.len().min(other.len()));
        let mut unmatched = 0usize;
        let (mut i, mut j) = (0usize, 0usize);
        while i < self.items.len() && j < other.items.len() {
            let (a, b) = (&self.items[i], &other.items[j]);
            match a.date.cmp(&b.date) {
                std::cmp::Ordering::Less => {
                    unmatched += 1;
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    unmatched += 1;
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    items.push(DatedRaster::new(a.date, f(&a.raster, &b.raster)?));
                    i += 1;
                    j += 1;
                }
            }
        }
        unmatched += (self.items.len() - i) + (other.items.len() - j);
        if unmatched > 0 {
            warn!(
                series = %name,
                unmatched,
                "{} / {} dates lack a partner and are skipped",
                self.name, other.name
            );
        }
        RasterSeries::new(name, items)
    }

    /// Members whose date falls inside the window.
    pub fn within(&self, range: &DateRange) -> RasterSeries {
        RasterSeries {
            name: self.name.clone(),
            items: self.items.iter().filter(|d| range.contains(d.date)).cloned().collect(),
        }
    }

    /// Members observed in the given calendar month (any year).
    pub fn in_month(&self, month: u32) -> impl Iterator<Item = &DatedRaster> + '_ {
        self.items.iter().filter(move |d| d.month() == month)
    }

    /// Per-cell mean over members, ignoring missing cells. A cell missing in every
    /// member stays missing.
    pub fn mean_composite(&self) -> Result<RasterGrid> {
        let spec = self
            .spec()
            .ok_or_else(|| RiskError::EmptySeries(format!("{}: nothing to composite", self.name)))?;
        let n = spec.len();
        let mut sum = vec![0.0f64; n];
        let mut count = vec![0u32; n];
        for d in &self.items {
            for (i, &v) in d.raster.data.iter().enumerate() {
                if !v.is_nan() {
                    sum[i] += v as f64;
                    count[i] += 1;
                }
            }
        }
        let data = sum
            .iter()
            .zip(&count)
            .map(|(&s, &c)| if c == 0 { f32::NAN } else { (s / c as f64) as f32 })
            .collect();
        RasterGrid::from_data(spec, data)
    }
}

impl<'a> IntoIterator for &'a RasterSeries {
    type Item = &'a DatedRaster;
    type IntoIter = std::slice::Iter<'a, DatedRaster>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Crs;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn grid(v: f32) -> RasterGrid {
        RasterGrid::new(GridSpec::new(2, 2, 0.0, 2.0, 1.0, 1.0, Crs::Wgs84), v)
    }

    #[test]
    fn new_sorts_by_date() {
        let s = RasterSeries::new(
            "t",
            vec![
                DatedRaster::new(day(2020, 5, 3), grid(3.0)),
                DatedRaster::new(day(2020, 5, 1), grid(1.0)),
            ],
        )
        .unwrap();
        let dates: Vec<_> = s.dates().collect();
        assert_eq!(dates, vec![day(2020, 5, 1), day(2020, 5, 3)]);
        assert_eq!(s.get(day(2020, 5, 3)).unwrap().data[0], 3.0);
        assert!(s.get(day(2020, 5, 2)).is_none());
    }

    #[test]
    fn new_rejects_duplicate_dates() {
        let r = RasterSeries::new(
            "t",
            vec![
                DatedRaster::new(day(2020, 5, 1), grid(1.0)),
                DatedRaster::new(day(2020, 5, 1), grid(2.0)),
            ],
        );
        assert!(r.is_err());
    }

    #[test]
    fn zip_with_drops_unpaired_days() {
        let a = RasterSeries::new(
            "a",
            vec![
                DatedRaster::new(day(2020, 5, 1), grid(1.0)),
                DatedRaster::new(day(2020, 5, 2), grid(2.0)),
                DatedRaster::new(day(2020, 5, 3), grid(3.0)),
            ],
        )
        .unwrap();
        let b = RasterSeries::new(
            "b",
            vec![
                DatedRaster::new(day(2020, 5, 1), grid(10.0)),
                DatedRaster::new(day(2020, 5, 3), grid(30.0)),
            ],
        )
        .unwrap();
        let sum = a.zip_with(&b, "sum", |x, y| x.zip_with(y, "sum", |p, q| p + q)).unwrap();
        assert_eq!(sum.len(), 2);
        assert_eq!(sum.get(day(2020, 5, 3)).unwrap().data[0], 33.0);
        assert!(sum.get(day(2020, 5, 2)).is_none());
    }

    #[test]
    fn within_and_in_month_filter() {
        let items = DateRange::new(day(2020, 4, 28), day(2020, 5, 4))
            .unwrap()
            .days()
            .map(|d| DatedRaster::new(d, grid(0.0)))
            .collect();
        let s = RasterSeries::new("t", items).unwrap();
        assert_eq!(s.len(), 7);
        assert_eq!(s.in_month(4).count(), 3);
        let may = DateRange::new(day(2020, 5, 1), day(2020, 5, 31)).unwrap();
        assert_eq!(s.within(&may).len(), 4);
    }

    #[test]
    fn mean_composite_ignores_missing() {
        let mut a = grid(2.0);
        a.data[0] = f32::NAN;
        let mut b = grid(4.0);
        b.data[0] = f32::NAN;
        b.data[1] = f32::NAN;
        let s = RasterSeries::new(
            "t",
            vec![DatedRaster::new(day(2020, 1, 1), a), DatedRaster::new(day(2020, 1, 2), b)],
        )
        .unwrap();
        let m = s.mean_composite().unwrap();
        assert!(m.data[0].is_nan());
        assert_eq!(m.data[1], 2.0);
        assert_eq!(m.data[2], 3.0);
    }

    #[test]
    fn mean_composite_of_empty_series_fails() {
        assert!(RasterSeries::empty("x").mean_composite().is_err());
    }

    #[test]
    fn date_range_counts_days() {
        let r = DateRange::new(day(2024, 3, 1), day(2024, 5, 31)).unwrap();
        assert_eq!(r.num_days(), 92);
        assert_eq!(r.days().count(), 92);
        assert!(DateRange::new(day(2024, 3, 2), day(2024, 3, 1)).is_err());
        assert_eq!(DateRange::years(1991, 2020).unwrap().year_span(), 1991..=2020);
    }
}
