//! Heat-risk report: runs the pipeline over a data directory and writes the
//! ranked district table, the risk raster, a PNG rendering and a run summary.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use heatrisk_core::series::DateRange;
use heatrisk_core::source::Sources;
use heatrisk_core::{PipelineConfig, ResolutionPolicy, RiskPipeline};
use tracing::info;
use tracing_subscriber::EnvFilter;

use risk_report::report::write_report;
use risk_report::DiskCatalog;

#[derive(Parser, Debug)]
#[command(name = "risk_report", about = "Rank districts by heat risk = hazard × exposure × vulnerability")]
struct Args {
    /// Data directory (regions.json, reanalysis/, population/, ndvi/, lst/)
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Pipeline configuration JSON; omitted fields take their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory (created if absent)
    #[arg(short, long, default_value = "data/report")]
    output: PathBuf,

    /// State to analyse
    #[arg(long)]
    state: Option<String>,

    /// Resolution policy: upsample (smooth) or downsample (blocky)
    #[arg(long)]
    policy: Option<ResolutionPolicy>,

    /// First day of the study window (YYYY-MM-DD)
    #[arg(long)]
    study_start: Option<NaiveDate>,

    /// Last day of the study window (YYYY-MM-DD)
    #[arg(long)]
    study_end: Option<NaiveDate>,

    /// Also write hazard, exposure, vulnerability and threshold rasters
    #[arg(long)]
    layers: bool,

    /// Log level
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,
}

fn load_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))?
        }
        None => PipelineConfig::default(),
    };
    if let Some(state) = &args.state {
        config.state = state.clone();
    }
    if let Some(policy) = args.policy {
        config.policy = policy;
    }
    if args.study_start.is_some() || args.study_end.is_some() {
        let start = args.study_start.unwrap_or(config.study.start);
        let end = args.study_end.unwrap_or(config.study.end);
        config.study = DateRange::new(start, end)?;
    }
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let config = load_config(&args)?;
    let ramp = config.ramp;
    info!(state = %config.state, policy = %config.policy, study = ?config.study, "starting run");

    let catalog = DiskCatalog::open(&args.data_dir)?;
    let pipeline = RiskPipeline::new(config)?;
    let result = pipeline
        .run(&Sources::from_catalog(&catalog))
        .with_context(|| format!("Pipeline failed for {}", pipeline.config().state))?;

    for (rank, r) in result.records.iter().enumerate() {
        info!(
            rank = rank + 1,
            district = %r.district,
            mean = ?r.mean,
            max = ?r.max,
            "district"
        );
    }
    write_report(&result, ramp, &args.output, args.layers)?;
    for note in &result.summary.notes {
        info!("note: {note}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        Args::parse_from(["risk_report"].iter().chain(extra))
    }

    #[test]
    fn cli_overrides_defaults() {
        let args = parse(&["--policy", "blocky", "--state", "Goa", "--study-end", "2024-04-30"]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.policy, ResolutionPolicy::Downsample);
        assert_eq!(config.state, "Goa");
        assert_eq!(config.study.end, NaiveDate::from_ymd_opt(2024, 4, 30).unwrap());
        assert_eq!(config.study.start, PipelineConfig::default().study.start);
    }

    #[test]
    fn config_file_is_merged_under_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        fs::write(&path, r#"{ "state": "Kerala", "policy": "downsample", "population_year": 2015 }"#).unwrap();
        let args = parse(&["--config", path.to_str().unwrap(), "--policy", "upsample"]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.state, "Kerala");
        assert_eq!(config.population_year, 2015);
        assert_eq!(config.policy, ResolutionPolicy::Upsample);
    }

    #[test]
    fn inverted_study_window_is_rejected() {
        let args = parse(&["--study-start", "2024-05-01", "--study-end", "2024-04-01"]);
        assert!(load_config(&args).is_err());
    }
}
