//! Report artefacts written after a pipeline run.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use heatrisk_core::colormap::{colorize, ColorRamp};
use heatrisk_core::normalize::MinMax;
use heatrisk_core::pipeline::GridSummary;
use heatrisk_core::zonal::DistrictRiskRecord;
use heatrisk_core::{RasterGrid, RiskResult};
use serde::Serialize;
use tracing::info;

use crate::geotiff::write_geotiff;

/// Sidecar describing how the PNG maps values to colours.
#[derive(Debug, Serialize)]
struct RenderMetadata<'a> {
    source: &'a str,
    ramp: ColorRamp,
    range: MinMax,
    grid: GridSummary,
    missing: &'a str,
}

fn opt(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.6}")).unwrap_or_default()
}

/// Ranked district table. The `max` column appears only when any record carries it.
pub fn district_csv(records: &[DistrictRiskRecord]) -> Result<String> {
    let with_max = records.iter().any(|r| r.max.is_some());
    let mut wtr = csv::WriterBuilder::new().from_writer(Vec::new());

    let mut header = vec!["rank", "district", "mean_risk", "std_risk"];
    if with_max {
        header.push("max_risk");
    }
    header.push("cells");
    wtr.write_record(&header)?;

    for (i, r) in records.iter().enumerate() {
        let mut row = vec![(i + 1).to_string(), r.district.clone(), opt(r.mean), opt(r.std_dev)];
        if with_max {
            row.push(opt(r.max));
        }
        row.push(r.cells.to_string());
        wtr.write_record(&row)?;
    }
    let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

/// Colour-mapped PNG of `raster`, stretched over its valid range.
pub fn write_png(raster: &RasterGrid, ramp: ColorRamp, path: &Path) -> Result<MinMax> {
    let range = raster
        .valid_min_max()
        .map(|(lo, hi)| MinMax::new(lo, hi))
        .unwrap_or(MinMax::new(0.0, 1.0));
    let rgba = colorize(raster, ramp, Some(range));
    let img = image::RgbaImage::from_raw(raster.width() as u32, raster.height() as u32, rgba)
        .context("RGBA buffer does not match raster size")?;
    img.save(path).with_context(|| format!("Cannot write {}", path.display()))?;
    Ok(range)
}

fn write_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(value)?).with_context(|| format!("Cannot write {}", path.display()))
}

/// Write every artefact of `result` into `out_dir`. Returns the paths written.
pub fn write_report(result: &RiskResult, ramp: ColorRamp, out_dir: &Path, with_layers: bool) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir).with_context(|| format!("Cannot create {}", out_dir.display()))?;
    let mut written = Vec::new();

    let csv = out_dir.join("district_risk.csv");
    fs::write(&csv, district_csv(&result.records)?).with_context(|| format!("Cannot write {}", csv.display()))?;
    written.push(csv);

    let json = out_dir.join("district_risk.json");
    write_json(&result.records, &json)?;
    written.push(json);

    let tif = out_dir.join("risk.tif");
    write_geotiff(&result.risk, &tif)?;
    written.push(tif);

    let png = out_dir.join("risk.png");
    let range = write_png(&result.risk, ramp, &png)?;
    written.push(png);

    let meta = RenderMetadata {
        source: "risk.tif",
        ramp,
        range,
        grid: GridSummary::from(&result.risk.spec),
        missing: "transparent",
    };
    let meta_path = out_dir.join("risk.png.json");
    write_json(&meta, &meta_path)?;
    written.push(meta_path);

    if with_layers {
        for (name, layer) in [
            ("hazard_native.tif", &result.hazard_native),
            ("hazard.tif", &result.hazard),
            ("exposure.tif", &result.exposure),
            ("vulnerability.tif", &result.vulnerability),
        ] {
            let path = out_dir.join(name);
            write_geotiff(layer, &path)?;
            written.push(path);
        }
        let thresholds = out_dir.join("thresholds");
        fs::create_dir_all(&thresholds)?;
        for month in 1..=12u32 {
            if let Ok(t) = result.thresholds.get(month) {
                let path = thresholds.join(format!("threshold_{month:02}.tif"));
                write_geotiff(t, &path)?;
                written.push(path);
            }
        }
    }

    let summary = out_dir.join("summary.json");
    write_json(&result.summary, &summary)?;
    written.push(summary);

    info!(dir = %out_dir.display(), files = written.len(), "report written");
    Ok(written)
}
