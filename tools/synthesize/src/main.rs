//! Synthetic dataset generator: writes boundaries, daily reanalysis archives,
//! population, NDVI and night LST in the layout `risk_report` reads, plus a
//! matching run configuration.

mod scene;

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{Datelike, NaiveDate};
use clap::Parser;
use heatrisk_core::baseline::BaselineConfig;
use heatrisk_core::coords::Bounds;
use heatrisk_core::series::{DateRange, DatedRaster};
use heatrisk_core::source::ReanalysisVariable;
use heatrisk_core::PipelineConfig;
use rayon::prelude::*;
use risk_report::catalog::write_archive;
use risk_report::geotiff::write_geotiff;
use risk_report::DataLayout;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::scene::{Scene, SceneParams};

#[derive(Parser, Debug)]
#[command(name = "synthesize", about = "Write a seeded synthetic heat-risk dataset")]
struct Args {
    /// Output data directory
    #[arg(short, long, default_value = "data")]
    output: PathBuf,

    #[arg(long, default_value = "42")]
    seed: u64,

    #[arg(long, default_value = "Odisha")]
    state: String,

    #[arg(long, default_value = "30")]
    districts: usize,

    /// Scene extent as min_lon,min_lat,max_lon,max_lat
    #[arg(long, default_value = "81.3,17.8,87.5,22.6", value_delimiter = ',')]
    bounds: Vec<f64>,

    /// Reanalysis cell size, degrees
    #[arg(long, default_value = "0.25")]
    reanalysis_res: f64,

    /// Population / LST cell size, degrees
    #[arg(long, default_value = "0.05")]
    fine_res: f64,

    #[arg(long, default_value = "1991")]
    baseline_first: i32,

    #[arg(long, default_value = "2020")]
    baseline_last: i32,

    #[arg(long, default_value = "10")]
    period_years: i32,

    #[arg(long, default_value = "2024")]
    study_year: i32,

    /// Months with data, e.g. 3,4,5
    #[arg(long, default_value = "3,4,5", value_delimiter = ',')]
    months: Vec<u32>,

    #[arg(long, default_value = "2020")]
    population_year: i32,

    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,
}

fn month_range(year: i32, month: u32) -> Result<DateRange> {
    let first = NaiveDate::from_ymd_opt(year, month, 1).with_context(|| format!("invalid month {month}"))?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .with_context(|| format!("invalid month {month}"))?;
    Ok(DateRange::new(first, next.pred_opt().unwrap_or(first))?)
}

/// Every day of `year` falling in `months`.
fn days_in(year: i32, months: &[u32]) -> Result<Vec<NaiveDate>> {
    let mut days = Vec::new();
    for &m in months {
        days.extend(month_range(year, m)?.days());
    }
    Ok(days)
}

/// Composite dates: every `step` days from 1 January, kept when in `months`.
fn composite_dates(year: i32, months: &[u32], step: u32) -> Vec<NaiveDate> {
    (0..366)
        .step_by(step as usize)
        .filter_map(|k| NaiveDate::from_ymd_opt(year, 1, 1).map(|d| d + chrono::Duration::days(k)))
        .filter(|d| d.year() == year && months.contains(&d.month()))
        .collect()
}

fn write_reanalysis(scene: &Scene, layout: &DataLayout, year: i32, months: &[u32]) -> Result<()> {
    let mut temperature = Vec::new();
    let mut dewpoint = Vec::new();
    for date in days_in(year, months)? {
        let t = scene.temperature(date);
        dewpoint.push(DatedRaster::new(date, scene.dewpoint(&t)));
        temperature.push(DatedRaster::new(date, t));
    }
    write_archive(&layout.reanalysis(ReanalysisVariable::Temperature2m, year), &temperature)?;
    write_archive(&layout.reanalysis(ReanalysisVariable::Dewpoint2m, year), &dewpoint)?;
    info!(year, days = temperature.len(), "reanalysis written");
    Ok(())
}

fn run(args: &Args) -> Result<()> {
    if args.months.is_empty() || args.months.iter().any(|m| !(1..=12).contains(m)) {
        bail!("months must be in 1..=12, got {:?}", args.months);
    }
    let [min_x, min_y, max_x, max_y] = args.bounds[..] else {
        bail!("bounds need four values");
    };
    let baseline = BaselineConfig {
        first_year: args.baseline_first,
        last_year: args.baseline_last,
        period_years: args.period_years,
        ..BaselineConfig::default()
    };
    baseline.periods()?;

    let scene = Scene::new(&SceneParams {
        seed: args.seed,
        bounds: Bounds::new(min_x, min_y, max_x, max_y),
        reanalysis_res: args.reanalysis_res,
        fine_res: args.fine_res,
        heatwave_year: args.study_year,
        months: args.months.clone(),
    })?;
    for e in &scene.events {
        info!(start = %e.start, days = e.days, lon = e.lon, lat = e.lat, amplitude = e.amplitude, "heat event");
    }

    let layout = DataLayout::new(&args.output);
    fs::create_dir_all(layout.root()).with_context(|| format!("Cannot create {}", args.output.display()))?;

    let boundaries = scene.boundaries(&args.state, args.districts)?;
    fs::write(layout.regions(), serde_json::to_string_pretty(&[boundaries])?)?;

    let mut years: Vec<i32> = (args.baseline_first..=args.baseline_last).collect();
    if !years.contains(&args.study_year) {
        years.push(args.study_year);
    }
    years
        .par_iter()
        .try_for_each(|&year| write_reanalysis(&scene, &layout, year, &args.months))?;

    let population = layout.population(args.population_year);
    if let Some(dir) = population.parent() {
        fs::create_dir_all(dir)?;
    }
    write_geotiff(&scene.population(), &population)?;

    let ndvi: Vec<_> = composite_dates(args.study_year, &args.months, 16)
        .into_iter()
        .map(|d| DatedRaster::new(d, scene.ndvi(d)))
        .collect();
    write_archive(&layout.ndvi(args.study_year), &ndvi)?;
    let lst: Vec<_> = composite_dates(args.study_year, &args.months, 8)
        .into_iter()
        .map(|d| DatedRaster::new(d, scene.night_lst(d)))
        .collect();
    write_archive(&layout.night_lst(args.study_year), &lst)?;
    info!(ndvi = ndvi.len(), lst = lst.len(), "satellite composites written");

    let first_month = args.months.iter().min().copied().unwrap_or(1);
    let last_month = args.months.iter().max().copied().unwrap_or(12);
    let config = PipelineConfig {
        state: args.state.clone(),
        baseline,
        study: DateRange::new(
            month_range(args.study_year, first_month)?.start,
            month_range(args.study_year, last_month)?.end,
        )?,
        population_year: args.population_year,
        ..PipelineConfig::default()
    };
    let config_path = layout.root().join("config.json");
    fs::write(&config_path, serde_json::to_string_pretty(&config)?)?;
    info!(dir = %args.output.display(), config = %config_path.display(), "dataset complete");
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
    run(&args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_ranges() {
        let feb = month_range(2024, 2).unwrap();
        assert_eq!(feb.num_days(), 29);
        let dec = month_range(2023, 12).unwrap();
        assert_eq!(dec.end, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
        assert!(month_range(2024, 13).is_err());
    }

    #[test]
    fn composites_fall_in_requested_months() {
        let dates = composite_dates(2024, &[3, 4, 5], 16);
        assert!(!dates.is_empty());
        assert!(dates.iter().all(|d| (3..=5).contains(&d.month())));
        assert!(dates.windows(2).all(|w| (w[1] - w[0]).num_days() == 16));
    }

    #[test]
    fn small_dataset_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().to_str().unwrap();
        let args = Args::parse_from([
            "synthesize", "-o", out, "--bounds", "84,20,85,21", "--reanalysis-res", "0.5", "--fine-res", "0.25",
            "--baseline-first", "2019", "--baseline-last", "2020", "--period-years", "1", "--months", "4",
            "--districts", "2",
        ]);
        run(&args).unwrap();

        let layout = DataLayout::new(dir.path());
        assert!(layout.regions().exists());
        assert!(layout.reanalysis(ReanalysisVariable::Dewpoint2m, 2019).exists());
        assert!(layout.reanalysis(ReanalysisVariable::Temperature2m, 2024).exists());
        assert!(layout.population(2020).exists());
        assert!(layout.ndvi(2024).exists());
        assert!(layout.night_lst(2024).exists());

        let config: PipelineConfig =
            serde_json::from_str(&fs::read_to_string(dir.path().join("config.json")).unwrap()).unwrap();
        assert_eq!(config.state, PipelineConfig::default().state);
        assert_eq!(config.baseline.period_years, 1);
        assert_eq!(config.study.num_days(), 30);
    }
}
