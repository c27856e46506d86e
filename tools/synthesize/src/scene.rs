//! Seeded synthetic landscape: a state outline with districts, cities, and
//! smooth daily weather with a few heatwaves in the study year.
//!
//! All fields are deterministic in the seed. Coordinates are lon/lat degrees.

use std::f64::consts::TAU;

use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use heatrisk_core::coords::{Bounds, Crs};
use heatrisk_core::region::{Polygon, Region};
use heatrisk_core::source::StateBoundaries;
use heatrisk_core::{GridSpec, RasterGrid};
use noise::{NoiseFn, Perlin};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Used when the state is Odisha; other states get numbered districts.
const ODISHA_DISTRICTS: [&str; 30] = [
    "Angul", "Balangir", "Balasore", "Bargarh", "Bhadrak", "Boudh", "Cuttack", "Deogarh",
    "Dhenkanal", "Gajapati", "Ganjam", "Jagatsinghpur", "Jajpur", "Jharsuguda", "Kalahandi",
    "Kandhamal", "Kendrapara", "Kendujhar", "Khordha", "Koraput", "Malkangiri", "Mayurbhanj",
    "Nabarangpur", "Nayagarh", "Nuapada", "Puri", "Rayagada", "Sambalpur", "Subarnapur",
    "Sundargarh",
];

const OUTLINE_VERTICES: usize = 48;

#[derive(Debug, Clone, Copy)]
struct City {
    lon: f64,
    lat: f64,
    /// People per km² at the centre.
    peak: f64,
    radius: f64,
}

/// A localised warm anomaly lasting `days` from `start`.
#[derive(Debug, Clone, Copy)]
pub struct HeatEvent {
    pub start: NaiveDate,
    pub days: i64,
    pub lon: f64,
    pub lat: f64,
    pub radius: f64,
    /// Peak warming, K.
    pub amplitude: f64,
}

impl HeatEvent {
    fn warming(&self, date: NaiveDate, lon: f64, lat: f64) -> f64 {
        let offset = (date - self.start).num_days();
        if !(0..self.days).contains(&offset) {
            return 0.0;
        }
        let d2 = (lon - self.lon).powi(2) + (lat - self.lat).powi(2);
        self.amplitude * (-d2 / (2.0 * self.radius * self.radius)).exp()
    }
}

pub struct SceneParams {
    pub seed: u64,
    pub bounds: Bounds,
    pub reanalysis_res: f64,
    pub fine_res: f64,
    pub heatwave_year: i32,
    pub months: Vec<u32>,
}

pub struct Scene {
    bounds: Bounds,
    pub reanalysis_grid: GridSpec,
    pub population_grid: GridSpec,
    pub vegetation_grid: GridSpec,
    cities: Vec<City>,
    pub events: Vec<HeatEvent>,
    terrain: Perlin,
    weather: Perlin,
    moisture: Perlin,
    outline: Perlin,
}

impl Scene {
    pub fn new(params: &SceneParams) -> Result<Self> {
        let b = params.bounds;
        let mut rng = StdRng::seed_from_u64(params.seed ^ 0x9E37_79B9_7F4A_7C15);
        let seed32 = params.seed as u32;

        let cities = (0..rng.gen_range(4..=7))
            .map(|_| City {
                lon: rng.gen_range(b.min_x + 0.15 * b.width()..b.max_x - 0.15 * b.width()),
                lat: rng.gen_range(b.min_y + 0.15 * b.height()..b.max_y - 0.15 * b.height()),
                peak: rng.gen_range(2_000.0..12_000.0),
                radius: rng.gen_range(0.05..0.2),
            })
            .collect();

        let mut events = Vec::new();
        if let (Some(&first), Some(&last)) = (params.months.iter().min(), params.months.iter().max()) {
            let start = NaiveDate::from_ymd_opt(params.heatwave_year, first, 1);
            let end = NaiveDate::from_ymd_opt(params.heatwave_year, last, 28);
            if let (Some(start), Some(end)) = (start, end) {
                let span = (end - start).num_days().max(1);
                for _ in 0..rng.gen_range(3..=5) {
                    events.push(HeatEvent {
                        start: start + chrono::Duration::days(rng.gen_range(0..span)),
                        days: rng.gen_range(3..=7),
                        lon: rng.gen_range(b.min_x..b.max_x),
                        lat: rng.gen_range(b.min_y..b.max_y),
                        radius: rng.gen_range(0.6..1.8),
                        amplitude: rng.gen_range(3.0..5.5),
                    });
                }
            }
        }

        Ok(Self {
            bounds: b,
            reanalysis_grid: GridSpec::covering(&b, params.reanalysis_res, params.reanalysis_res, Crs::Wgs84)?,
            population_grid: GridSpec::covering(&b, params.fine_res, params.fine_res, Crs::Wgs84)?,
            vegetation_grid: GridSpec::covering(&b, params.fine_res * 2.0, params.fine_res * 2.0, Crs::Wgs84)?,
            cities,
            events,
            terrain: Perlin::new(seed32 ^ 0x0101),
            weather: Perlin::new(seed32 ^ 0x0202),
            moisture: Perlin::new(seed32 ^ 0x0303),
            outline: Perlin::new(seed32 ^ 0x0404),
        })
    }

    /// 0 at the west edge, 1 at the east (coastal) edge.
    fn eastness(&self, lon: f64) -> f64 {
        ((lon - self.bounds.min_x) / self.bounds.width()).clamp(0.0, 1.0)
    }

    /// Urban intensity in [0, 1]: strongest city footprint at the point.
    fn urban(&self, lon: f64, lat: f64) -> f64 {
        self.cities
            .iter()
            .map(|c| {
                let d2 = (lon - c.lon).powi(2) + (lat - c.lat).powi(2);
                (-d2 / (2.0 * c.radius * c.radius)).exp()
            })
            .fold(0.0, f64::max)
    }

    fn fill(spec: GridSpec, f: impl Fn(f64, f64) -> f64) -> RasterGrid {
        let mut r = RasterGrid::new(spec, 0.0);
        for row in 0..spec.height {
            for col in 0..spec.width {
                let (lon, lat) = spec.cell_center(row, col);
                r.set(row, col, f(lon, lat) as f32);
            }
        }
        r
    }

    /// Seasonal cycle peaking mid-May, warming trend, west-inland gradient,
    /// smooth daily weather, and heat events. Kelvin.
    fn air_temperature(&self, date: NaiveDate, lon: f64, lat: f64) -> f64 {
        let doy = date.ordinal() as f64;
        let seasonal = 300.5 + 5.5 * (TAU * (doy - 135.0) / 365.25).cos();
        let trend = 0.025 * (date.year() - 1991) as f64;
        let inland = 2.0 * (1.0 - self.eastness(lon));
        let relief = self.terrain.get([lon * 0.7, lat * 0.7]);
        let t = date.num_days_from_ce() as f64 * 0.31;
        let daily = 1.6 * self.weather.get([lon * 0.8, lat * 0.8, t]);
        let events: f64 = self.events.iter().map(|e| e.warming(date, lon, lat)).sum();
        seasonal + trend + inland + relief + daily + events
    }

    pub fn temperature(&self, date: NaiveDate) -> RasterGrid {
        Self::fill(self.reanalysis_grid, |lon, lat| self.air_temperature(date, lon, lat))
    }

    /// Dewpoint below `temperature` by a depression that shrinks towards the coast.
    pub fn dewpoint(&self, temperature: &RasterGrid) -> RasterGrid {
        let spec = temperature.spec;
        let mut r = temperature.clone();
        for row in 0..spec.height {
            for col in 0..spec.width {
                let (lon, lat) = spec.cell_center(row, col);
                let depression = 5.0 + 6.0 * (1.0 - self.eastness(lon)) + self.moisture.get([lon, lat]);
                r.set(row, col, temperature.get(row, col) - depression.max(1.0) as f32);
            }
        }
        r
    }

    /// People per km².
    pub fn population(&self) -> RasterGrid {
        Self::fill(self.population_grid, |lon, lat| {
            let rural = (150.0 + 120.0 * self.terrain.get([lon * 3.0, lat * 3.0])).max(5.0);
            let urban: f64 = self
                .cities
                .iter()
                .map(|c| {
                    let d2 = (lon - c.lon).powi(2) + (lat - c.lat).powi(2);
                    c.peak * (-d2 / (2.0 * c.radius * c.radius)).exp()
                })
                .sum();
            rural + urban
        })
    }

    /// Raw NDVI (×10000): greener inland and in moist areas, bare in cities.
    pub fn ndvi(&self, date: NaiveDate) -> RasterGrid {
        let dry_season = -0.05 * (TAU * (date.ordinal() as f64 - 135.0) / 365.25).cos();
        Self::fill(self.vegetation_grid, |lon, lat| {
            let v = 0.55 + 0.2 * self.moisture.get([lon * 2.0, lat * 2.0]) - 0.4 * self.urban(lon, lat) + dry_season;
            (v.clamp(0.05, 0.9) * 10_000.0).round()
        })
    }

    /// Raw night-time LST (0.02 K counts) with an urban heat island.
    pub fn night_lst(&self, date: NaiveDate) -> RasterGrid {
        Self::fill(self.population_grid, |lon, lat| {
            let kelvin = self.air_temperature(date, lon, lat) - 7.0
                + 4.0 * self.urban(lon, lat)
                + 0.7 * self.terrain.get([lon * 4.0, lat * 4.0]);
            (kelvin / 0.02).round()
        })
    }

    /// A wobbly state outline inside the scene bounds, tiled into `n` rectangular districts.
    pub fn boundaries(&self, state: &str, n: usize) -> Result<StateBoundaries> {
        let b = self.bounds;
        let (cx, cy) = ((b.min_x + b.max_x) / 2.0, (b.min_y + b.max_y) / 2.0);
        let ring = (0..OUTLINE_VERTICES)
            .map(|i| {
                let theta = TAU * i as f64 / OUTLINE_VERTICES as f64;
                let wobble = 1.0 + 0.12 * self.outline.get([theta.cos() * 1.7 + 0.5, theta.sin() * 1.7 + 0.5]);
                (
                    cx + 0.45 * b.width() * wobble * theta.cos(),
                    cy + 0.45 * b.height() * wobble * theta.sin(),
                )
            })
            .collect();
        let state_region = Region::new(state, vec![Polygon::new(ring)])?;

        let outline = state_region.bounds();
        let cols = (n as f64).sqrt().ceil().max(1.0) as usize;
        let rows = n.div_ceil(cols).max(1);
        let (dx, dy) = (outline.width() / cols as f64, outline.height() / rows as f64);
        let mut districts = Vec::with_capacity(n);
        for k in 0..n {
            let (row, col) = (k / cols, k % cols);
            let x0 = outline.min_x + col as f64 * dx;
            let y1 = outline.max_y - row as f64 * dy;
            let name = if state.eq_ignore_ascii_case("odisha") && k < ODISHA_DISTRICTS.len() {
                ODISHA_DISTRICTS[k].to_string()
            } else {
                format!("{state} {:02}", k + 1)
            };
            let tile = Polygon::new(vec![(x0, y1 - dy), (x0 + dx, y1 - dy), (x0 + dx, y1), (x0, y1)]);
            districts.push(Region::new(name, vec![tile])?);
        }
        Ok(StateBoundaries { state: state_region, districts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn params(seed: u64) -> SceneParams {
        SceneParams {
            seed,
            bounds: Bounds::new(84.0, 19.0, 87.0, 22.0),
            reanalysis_res: 0.25,
            fine_res: 0.05,
            heatwave_year: 2024,
            months: vec![3, 4, 5],
        }
    }

    #[test]
    fn same_seed_same_fields() {
        let a = Scene::new(&params(7)).unwrap();
        let b = Scene::new(&params(7)).unwrap();
        let d = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        assert_eq!(a.temperature(d).data, b.temperature(d).data);
        assert_eq!(a.population().data, b.population().data);
    }

    #[test]
    fn grids_cover_the_bounds() {
        let s = Scene::new(&params(1)).unwrap();
        assert_eq!((s.reanalysis_grid.width, s.reanalysis_grid.height), (12, 12));
        assert_eq!((s.population_grid.width, s.population_grid.height), (60, 60));
        assert_eq!(s.vegetation_grid.width, 30);
    }

    #[test]
    fn fields_are_physically_plausible() {
        let s = Scene::new(&params(3)).unwrap();
        let d = NaiveDate::from_ymd_opt(2010, 4, 15).unwrap();
        let t = s.temperature(d);
        let (lo, hi) = t.valid_min_max().unwrap();
        assert!(lo > 290.0 && hi < 320.0, "{lo}..{hi}");
        let td = s.dewpoint(&t);
        assert!(td.data.iter().zip(&t.data).all(|(dp, air)| dp < air));
        let ndvi = s.ndvi(d);
        assert!(ndvi.data.iter().all(|&v| (500.0..=9_000.0).contains(&v)));
        assert!(s.population().data.iter().all(|&p| p >= 5.0));
    }

    #[test]
    fn heat_events_only_warm_their_window() {
        let e = HeatEvent {
            start: NaiveDate::from_ymd_opt(2024, 4, 10).unwrap(),
            days: 3,
            lon: 85.0,
            lat: 20.0,
            radius: 1.0,
            amplitude: 4.0,
        };
        assert_relative_eq!(e.warming(NaiveDate::from_ymd_opt(2024, 4, 12).unwrap(), 85.0, 20.0), 4.0);
        assert_eq!(e.warming(NaiveDate::from_ymd_opt(2024, 4, 13).unwrap(), 85.0, 20.0), 0.0);
        assert_eq!(e.warming(NaiveDate::from_ymd_opt(2024, 4, 9).unwrap(), 85.0, 20.0), 0.0);
    }

    #[test]
    fn districts_tile_the_state() {
        let s = Scene::new(&params(5)).unwrap();
        let sets = s.boundaries("Odisha", 30).unwrap();
        assert_eq!(sets.districts.len(), 30);
        assert_eq!(sets.districts[0].name, "Angul");
        let other = s.boundaries("Goa", 4).unwrap();
        assert_eq!(other.districts[3].name, "Goa 04");
        let sb = sets.state.bounds();
        let db = sets.districts.iter().map(|d| d.bounds()).reduce(|a, b| a.union(&b)).unwrap();
        assert_relative_eq!(db.min_x, sb.min_x, epsilon = 1e-9);
        assert_relative_eq!(db.max_y, sb.max_y, epsilon = 1e-9);
    }
}
