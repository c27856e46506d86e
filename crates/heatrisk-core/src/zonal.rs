//! District statistics over the risk raster and their ranking.

use std::cmp::Ordering;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::raster::RasterGrid;
use crate::region::Region;
use crate::stats::moments;

/// Risk summary for one district.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistrictRiskRecord {
    pub district: String,
    /// `None` when no valid risk cell falls inside the district.
    pub mean: Option<f64>,
    /// Population standard deviation.
    pub std_dev: Option<f64>,
    /// Only reported when requested (upsample policy).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Valid risk cells whose centre lies inside the district.
    pub cells: usize,
}

/// One record per district, in input order. Districts are independent, so they
/// are reduced in parallel.
pub fn zonal_risk(risk: &RasterGrid, districts: &[Region], include_max: bool) -> Vec<DistrictRiskRecord> {
    districts
        .par_iter()
        .map(|district| {
            let cells = district.cells(&risk.spec);
            let m = moments(cells.iter().map(|&i| risk.data[i]));
            if m.is_none() {
                warn!(district = %district.name, "no risk cells inside district");
            }
            let record = DistrictRiskRecord {
                district: district.name.clone(),
                mean: m.map(|m| m.mean),
                std_dev: m.map(|m| m.std_dev),
                max: if include_max { m.map(|m| m.max) } else { None },
                cells: m.map_or(0, |m| m.count),
            };
            debug!(district = %record.district, mean = ?record.mean, cells = record.cells, "district reduced");
            record
        })
        .collect()
}

/// Descending by mean risk. Stable: equal means keep input order; districts
/// without a mean go last.
pub fn rank_districts(records: &mut [DistrictRiskRecord]) {
    records.sort_by(|a, b| match (a.mean, b.mean) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Crs;
    use crate::raster::GridSpec;
    use crate::region::Polygon;
    use approx::assert_relative_eq;

    fn record(name: &str, mean: Option<f64>) -> DistrictRiskRecord {
        DistrictRiskRecord { district: name.into(), mean, std_dev: mean.map(|_| 0.0), max: None, cells: 1 }
    }

    fn names(records: &[DistrictRiskRecord]) -> Vec<&str> {
        records.iter().map(|r| r.district.as_str()).collect()
    }

    fn rect(name: &str, x0: f64, x1: f64) -> Region {
        Region::new(name, vec![Polygon::new(vec![(x0, 0.0), (x1, 0.0), (x1, 2.0), (x0, 2.0)])]).unwrap()
    }

    #[test]
    fn higher_mean_ranks_first() {
        let mut r = vec![record("Puri", Some(0.05)), record("Khordha", Some(0.08))];
        rank_districts(&mut r);
        assert_eq!(names(&r), vec!["Khordha", "Puri"]);
    }

    #[test]
    fn ties_keep_input_order() {
        let mut r = vec![
            record("A", Some(0.02)),
            record("B", Some(0.05)),
            record("C", Some(0.05)),
            record("D", None),
            record("E", Some(0.05)),
        ];
        rank_districts(&mut r);
        assert_eq!(names(&r), vec!["B", "C", "E", "A", "D"]);
    }

    #[test]
    fn district_statistics() {
        // 4x2 grid; left district covers columns 0-1, right covers 2-3.
        let spec = GridSpec::new(4, 2, 0.0, 2.0, 1.0, 1.0, Crs::Wgs84);
        let risk = RasterGrid::from_data(spec, vec![0.1, 0.3, 0.5, f32::NAN, 0.1, 0.3, 0.9, 0.7]).unwrap();
        let districts = vec![rect("left", 0.0, 2.0), rect("right", 2.0, 4.0)];

        let out = zonal_risk(&risk, &districts, true);
        assert_eq!(names(&out), vec!["left", "right"]);
        assert_eq!(out[0].cells, 4);
        assert_relative_eq!(out[0].mean.unwrap(), 0.2, epsilon = 1e-6);
        assert_relative_eq!(out[0].std_dev.unwrap(), 0.1, epsilon = 1e-6);
        assert_eq!(out[1].cells, 3);
        assert_relative_eq!(out[1].max.unwrap(), 0.9, epsilon = 1e-6);

        let no_max = zonal_risk(&risk, &districts, false);
        assert!(no_max.iter().all(|r| r.max.is_none()));
    }

    #[test]
    fn district_off_the_grid_has_no_mean() {
        let spec = GridSpec::new(2, 2, 0.0, 2.0, 1.0, 1.0, Crs::Wgs84);
        let risk = RasterGrid::new(spec, 0.5);
        let out = zonal_risk(&risk, &[rect("far", 50.0, 51.0)], false);
        assert_eq!(out[0].mean, None);
        assert_eq!(out[0].cells, 0);
    }

    #[test]
    fn max_is_omitted_from_json_when_absent() {
        let json = serde_json::to_string(&record("A", Some(0.1))).unwrap();
        assert!(!json.contains("max"));
    }
}
