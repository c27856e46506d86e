//! On-disk data directory.
//!
//! ```text
//! <root>/regions.json                          [StateBoundaries, ...]
//! <root>/reanalysis/temperature_2m_2024.tar.gz  one YYYY-MM-DD.tif per day
//! <root>/reanalysis/dewpoint_temperature_2m_2024.tar.gz
//! <root>/population/population_2020.tif
//! <root>/ndvi/ndvi_2024.tar.gz                  raw NDVI composites (x10000)
//! <root>/lst/night_lst_2024.tar.gz              raw night LST (0.02 K counts)
//! ```

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use heatrisk_core::coords::Bounds;
use heatrisk_core::series::{DateRange, DatedRaster, RasterSeries};
use heatrisk_core::source::{
    crop_to_lonlat, lookup_state, BoundarySource, NightLstSource, PopulationSource, ReanalysisSource,
    ReanalysisVariable, StateBoundaries, VegetationSource,
};
use heatrisk_core::region::Region;
use heatrisk_core::{RasterGrid, RiskError};
use tracing::{debug, warn};

use crate::geotiff::{geotiff_bytes, read_geotiff, read_geotiff_bytes};

pub const NDVI: &str = "ndvi";
pub const NIGHT_LST: &str = "night_lst";

/// Paths inside a data directory.
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn regions(&self) -> PathBuf {
        self.root.join("regions.json")
    }

    pub fn reanalysis(&self, variable: ReanalysisVariable, year: i32) -> PathBuf {
        self.root.join("reanalysis").join(format!("{}_{year}.tar.gz", variable.name()))
    }

    pub fn population(&self, year: i32) -> PathBuf {
        self.root.join("population").join(format!("population_{year}.tif"))
    }

    pub fn ndvi(&self, year: i32) -> PathBuf {
        self.root.join("ndvi").join(format!("{NDVI}_{year}.tar.gz"))
    }

    pub fn night_lst(&self, year: i32) -> PathBuf {
        self.root.join("lst").join(format!("{NIGHT_LST}_{year}.tar.gz"))
    }
}

/// Write dated rasters as a gzipped tar of `YYYY-MM-DD.tif` entries.
pub fn write_archive(path: &Path, items: &[DatedRaster]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path).with_context(|| format!("Cannot create {}", path.display()))?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    for item in items {
        let bytes = geotiff_bytes(&item.raster)?;
        let mut header = tar::Header::new_gnu();
        header.set_size(bytes.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, format!("{}.tif", item.date.format("%Y-%m-%d")), bytes.as_slice())?;
    }
    builder.into_inner()?.finish()?;
    Ok(())
}

/// Entries of one archive dated inside `range`, cropped to `bounds`.
/// Entries that are not dated GeoTIFFs are skipped with a warning.
pub fn read_archive(path: &Path, range: &DateRange, bounds: &Bounds) -> Result<Vec<DatedRaster>> {
    let file = fs::File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    let mut out = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.into_owned();
        let Some(stem) = name.file_name().and_then(|n| n.to_str()).and_then(|n| n.strip_suffix(".tif")) else {
            continue;
        };
        let Ok(date) = NaiveDate::parse_from_str(stem, "%Y-%m-%d") else {
            warn!(entry = %name.display(), archive = %path.display(), "undated entry skipped");
            continue;
        };
        if !range.contains(date) {
            continue;
        }

        let mut buf = Vec::new();
        entry
            .read_to_end(&mut buf)
            .with_context(|| format!("Read failed: {}", name.display()))?;
        match read_geotiff_bytes(buf) {
            Ok(raster) => out.push(DatedRaster::new(date, crop_to_lonlat(&raster, bounds)?)),
            Err(e) => warn!(entry = %name.display(), error = %e, "unreadable raster skipped"),
        }
    }
    debug!(archive = %path.display(), rasters = out.len(), "archive read");
    Ok(out)
}

/// Catalog backed by a data directory in the layout above.
#[derive(Debug, Clone)]
pub struct DiskCatalog {
    layout: DataLayout,
    boundaries: Vec<StateBoundaries>,
}

fn source_error(e: anyhow::Error) -> RiskError {
    RiskError::Source(format!("{e:#}"))
}

impl DiskCatalog {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let layout = DataLayout::new(root);
        let path = layout.regions();
        let text = fs::read_to_string(&path).with_context(|| format!("Cannot read {}", path.display()))?;
        let boundaries = serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Self { layout, boundaries })
    }

    /// Read every yearly archive touching `range`. Missing years are logged
    /// and left as missing days.
    fn series(
        &self,
        name: &str,
        archive: impl Fn(i32) -> PathBuf,
        range: &DateRange,
        bounds: &Bounds,
    ) -> Result<RasterSeries> {
        let mut items = Vec::new();
        for year in range.year_span() {
            let path = archive(year);
            if !path.exists() {
                warn!(dataset = name, year, path = %path.display(), "archive missing");
                continue;
            }
            items.extend(read_archive(&path, range, bounds)?);
        }
        Ok(RasterSeries::new(name, items)?)
    }
}

impl BoundarySource for DiskCatalog {
    fn state(&self, name: &str) -> heatrisk_core::Result<Region> {
        Ok(lookup_state(&self.boundaries, name)?.state.clone())
    }

    fn districts(&self, state: &str) -> heatrisk_core::Result<Vec<Region>> {
        Ok(lookup_state(&self.boundaries, state)?.districts.clone())
    }
}

impl ReanalysisSource for DiskCatalog {
    fn daily(
        &self,
        variable: ReanalysisVariable,
        range: &DateRange,
        bounds: &Bounds,
    ) -> heatrisk_core::Result<RasterSeries> {
        self.series(variable.name(), |y| self.layout.reanalysis(variable, y), range, bounds)
            .map_err(source_error)
    }
}

impl PopulationSource for DiskCatalog {
    fn population(&self, year: i32, bounds: &Bounds) -> heatrisk_core::Result<RasterGrid> {
        let raster = read_geotiff(&self.layout.population(year)).map_err(source_error)?;
        crop_to_lonlat(&raster, bounds)
    }
}

impl VegetationSource for DiskCatalog {
    fn ndvi(&self, range: &DateRange, bounds: &Bounds) -> heatrisk_core::Result<RasterSeries> {
        self.series(NDVI, |y| self.layout.ndvi(y), range, bounds).map_err(source_error)
    }
}

impl NightLstSource for DiskCatalog {
    fn night_lst(&self, range: &DateRange, bounds: &Bounds) -> heatrisk_core::Result<RasterSeries> {
        self.series(NIGHT_LST, |y| self.layout.night_lst(y), range, bounds).map_err(source_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heatrisk_core::coords::Crs;
    use heatrisk_core::region::Polygon;
    use heatrisk_core::GridSpec;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn spec() -> GridSpec {
        GridSpec::new(4, 4, 84.0, 22.0, 0.5, 0.5, Crs::Wgs84)
    }

    fn write_fixture(root: &Path) {
        let square = |name: &str| {
            Region::new(name, vec![Polygon::new(vec![(84.0, 20.0), (86.0, 20.0), (86.0, 22.0), (84.0, 22.0)])])
                .unwrap()
        };
        let sets = vec![StateBoundaries { state: square("Odisha"), districts: vec![square("Puri")] }];
        fs::write(root.join("regions.json"), serde_json::to_string(&sets).unwrap()).unwrap();

        let layout = DataLayout::new(root);
        let items: Vec<_> = (1..=3)
            .map(|d| DatedRaster::new(day(2024, 4, d), RasterGrid::new(spec(), 300.0 + d as f32)))
            .collect();
        write_archive(&layout.reanalysis(ReanalysisVariable::Temperature2m, 2024), &items).unwrap();
    }

    #[test]
    fn reads_daily_rasters_from_yearly_archives() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        let catalog = DiskCatalog::open(dir.path()).unwrap();

        let range = DateRange::new(day(2024, 4, 2), day(2024, 4, 30)).unwrap();
        let bounds = Bounds::new(84.0, 21.0, 85.0, 22.0);
        let s = catalog.daily(ReanalysisVariable::Temperature2m, &range, &bounds).unwrap();
        assert_eq!(s.dates().collect::<Vec<_>>(), vec![day(2024, 4, 2), day(2024, 4, 3)]);
        let grid = s.spec().unwrap();
        assert_eq!((grid.width, grid.height), (2, 2));
        assert_eq!(s.get(day(2024, 4, 3)).unwrap().data[0], 303.0);
    }

    #[test]
    fn missing_years_leave_gaps() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        let catalog = DiskCatalog::open(dir.path()).unwrap();
        let range = DateRange::new(day(2023, 12, 30), day(2024, 4, 1)).unwrap();
        let s = catalog.daily(ReanalysisVariable::Temperature2m, &range, &spec().bounds()).unwrap();
        assert_eq!(s.len(), 1);
        assert!(catalog.ndvi(&range, &spec().bounds()).unwrap().is_empty());
    }

    #[test]
    fn boundaries_and_missing_population() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        let catalog = DiskCatalog::open(dir.path()).unwrap();
        assert_eq!(catalog.districts("odisha").unwrap()[0].name, "Puri");
        assert!(matches!(catalog.state("Goa"), Err(RiskError::RegionNotFound(_))));
        assert!(matches!(catalog.population(2020, &spec().bounds()), Err(RiskError::Source(_))));
    }
}
