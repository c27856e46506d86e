//! Read-only data sources.
//!
//! Every upstream dataset is reached through a blocking fetch-or-fail trait.
//! Bounds are always given in lon/lat degrees; sources return whole cells
//! covering them on the dataset's native grid.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::coords::{Bounds, Crs};
use crate::error::{Result, RiskError};
use crate::raster::RasterGrid;
use crate::region::Region;
use crate::series::{DateRange, DatedRaster, RasterSeries};

/// A state outline together with its districts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateBoundaries {
    pub state: Region,
    pub districts: Vec<Region>,
}

pub trait BoundarySource {
    /// Outline of the named state.
    fn state(&self, name: &str) -> Result<Region>;
    /// Districts of the named state, in the source's own order.
    fn districts(&self, state: &str) -> Result<Vec<Region>>;
}

/// Daily reanalysis fields, Kelvin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReanalysisVariable {
    Temperature2m,
    Dewpoint2m,
}

impl ReanalysisVariable {
    pub fn name(self) -> &'static str {
        match self {
            ReanalysisVariable::Temperature2m => "temperature_2m",
            ReanalysisVariable::Dewpoint2m => "dewpoint_temperature_2m",
        }
    }
}

impl fmt::Display for ReanalysisVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub trait ReanalysisSource {
    fn daily(&self, variable: ReanalysisVariable, range: &DateRange, bounds: &Bounds) -> Result<RasterSeries>;
}

pub trait PopulationSource {
    /// Population for one year.
    fn population(&self, year: i32, bounds: &Bounds) -> Result<RasterGrid>;
}

pub trait VegetationSource {
    /// Raw NDVI composites (scaled by 10000) observed inside the range.
    fn ndvi(&self, range: &DateRange, bounds: &Bounds) -> Result<RasterSeries>;
}

pub trait NightLstSource {
    /// Raw night-time land-surface temperature (0.02 K counts).
    fn night_lst(&self, range: &DateRange, bounds: &Bounds) -> Result<RasterSeries>;
}

/// The five collaborators a pipeline run reads from.
#[derive(Clone, Copy)]
pub struct Sources<'a> {
    pub boundaries: &'a dyn BoundarySource,
    pub reanalysis: &'a dyn ReanalysisSource,
    pub population: &'a dyn PopulationSource,
    pub vegetation: &'a dyn VegetationSource,
    pub night_lst: &'a dyn NightLstSource,
}

impl<'a> Sources<'a> {
    /// Use one catalog for every dataset.
    pub fn from_catalog<C>(catalog: &'a C) -> Self
    where
        C: BoundarySource + ReanalysisSource + PopulationSource + VegetationSource + NightLstSource,
    {
        Self {
            boundaries: catalog,
            reanalysis: catalog,
            population: catalog,
            vegetation: catalog,
            night_lst: catalog,
        }
    }
}

/// Look up a state and its districts in a boundary list.
pub fn lookup_state<'a>(sets: &'a [StateBoundaries], name: &str) -> Result<&'a StateBoundaries> {
    sets.iter()
        .find(|s| s.state.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| RiskError::RegionNotFound(name.to_string()))
}

/// Crop a raster to lon/lat bounds on its own grid.
pub fn crop_to_lonlat(raster: &RasterGrid, bounds: &Bounds) -> Result<RasterGrid> {
    raster.crop(&bounds.transform(Crs::Wgs84, raster.spec.crs))
}

/// Members of `items` dated inside `range`, each cropped to `bounds`.
pub fn select_series(name: &str, items: &[DatedRaster], range: &DateRange, bounds: &Bounds) -> Result<RasterSeries> {
    let selected = items
        .iter()
        .filter(|d| range.contains(d.date))
        .map(|d| Ok(DatedRaster::new(d.date, crop_to_lonlat(&d.raster, bounds)?)))
        .collect::<Result<Vec<_>>>()?;
    RasterSeries::new(name, selected)
}

/// Every dataset held in memory. Serves tests and callers that already hold arrays.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    pub boundaries: Vec<StateBoundaries>,
    pub reanalysis: BTreeMap<ReanalysisVariable, Vec<DatedRaster>>,
    pub population: BTreeMap<i32, RasterGrid>,
    pub ndvi: Vec<DatedRaster>,
    pub night_lst: Vec<DatedRaster>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(mut self, state: Region, districts: Vec<Region>) -> Self {
        self.boundaries.push(StateBoundaries { state, districts });
        self
    }

    pub fn with_daily(mut self, variable: ReanalysisVariable, items: Vec<DatedRaster>) -> Self {
        self.reanalysis.entry(variable).or_default().extend(items);
        self
    }

    pub fn with_population(mut self, year: i32, raster: RasterGrid) -> Self {
        self.population.insert(year, raster);
        self
    }

    pub fn with_ndvi(mut self, items: Vec<DatedRaster>) -> Self {
        self.ndvi.extend(items);
        self
    }

    pub fn with_night_lst(mut self, items: Vec<DatedRaster>) -> Self {
        self.night_lst.extend(items);
        self
    }
}

impl BoundarySource for MemoryCatalog {
    fn state(&self, name: &str) -> Result<Region> {
        Ok(lookup_state(&self.boundaries, name)?.state.clone())
    }

    fn districts(&self, state: &str) -> Result<Vec<Region>> {
        Ok(lookup_state(&self.boundaries, state)?.districts.clone())
    }
}

impl ReanalysisSource for MemoryCatalog {
    fn daily(&self, variable: ReanalysisVariable, range: &DateRange, bounds: &Bounds) -> Result<RasterSeries> {
        let items = self
            .reanalysis
            .get(&variable)
            .ok_or_else(|| RiskError::Source(format!("no {variable} rasters in catalog")))?;
        select_series(variable.name(), items, range, bounds)
    }
}

impl PopulationSource for MemoryCatalog {
    fn population(&self, year: i32, bounds: &Bounds) -> Result<RasterGrid> {
        let raster = self
            .population
            .get(&year)
            .ok_or_else(|| RiskError::Source(format!("no population raster for {year}")))?;
        crop_to_lonlat(raster, bounds)
    }
}

impl VegetationSource for MemoryCatalog {
    fn ndvi(&self, range: &DateRange, bounds: &Bounds) -> Result<RasterSeries> {
        select_series("ndvi", &self.ndvi, range, bounds)
    }
}

impl NightLstSource for MemoryCatalog {
    fn night_lst(&self, range: &DateRange, bounds: &Bounds) -> Result<RasterSeries> {
        select_series("night_lst", &self.night_lst, range, bounds)
    }
}
