//! Pipeline orchestrator: runs the five stages in order.
//!
//! Heat Index → monthly thresholds → hazard → exposure and vulnerability →
//! composite risk and district table. Every stage consumes the complete output
//! of the one before it; any failure aborts the run.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::baseline::{BaselineConfig, MonthlyThresholds};
use crate::colormap::ColorRamp;
use crate::composite::{compose_risk, LayerRanges};
use crate::coords::Bounds;
use crate::error::{Result, RiskError};
use crate::exposure::build_exposure;
use crate::hazard::{build_hazard, HazardMetric};
use crate::heat_index::heat_index_series;
use crate::normalize::MinMax;
use crate::raster::{GridSpec, RasterGrid};
use crate::resample::{align, warp, FieldKind, Kernel};
use crate::series::{DateRange, RasterSeries};
use crate::source::{ReanalysisVariable, Sources};
use crate::vulnerability::{build_vulnerability, VulnerabilityConfig};
use crate::zonal::{rank_districts, zonal_risk, DistrictRiskRecord};

/// Attached to every upsampled report.
pub const UPSAMPLE_NOTE: &str =
    "hazard was bicubic-resampled from its native grid; this smooths the map but adds no information";

// ── Configuration ─────────────────────────────────────────────────────────────

/// Which grid the three layers are combined on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionPolicy {
    /// Hazard is resampled (bicubic) onto the fine grid.
    #[default]
    Upsample,
    /// Fine layers are aggregated onto the native hazard grid.
    Downsample,
}

impl fmt::Display for ResolutionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResolutionPolicy::Upsample => "upsample",
            ResolutionPolicy::Downsample => "downsample",
        })
    }
}

impl FromStr for ResolutionPolicy {
    type Err = RiskError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "upsample" | "smooth" => Ok(ResolutionPolicy::Upsample),
            "downsample" | "blocky" => Ok(ResolutionPolicy::Downsample),
            other => Err(RiskError::Config(format!("unknown resolution policy '{other}'"))),
        }
    }
}

/// User-facing run parameters. The default state and windows match the
/// dataset `synthesize` writes with its own defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// State whose districts are ranked. Default "Odisha".
    pub state: String,
    pub baseline: BaselineConfig,
    /// Study window. Default 2024-03-01 – 2024-05-31.
    pub study: DateRange,
    /// Population year. Default 2020.
    pub population_year: i32,
    /// How population cells aggregate when coarsened. Default density (mean).
    pub population_kind: FieldKind,
    pub vulnerability: VulnerabilityConfig,
    pub policy: ResolutionPolicy,
    pub hazard_metric: HazardMetric,
    /// Cell size of the fine grid in the population CRS; the population grid when unset.
    pub fine_resolution: Option<f64>,
    pub ramp: ColorRamp,
}

fn default_study() -> DateRange {
    let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap_or(NaiveDate::MIN);
    let end = NaiveDate::from_ymd_opt(2024, 5, 31).unwrap_or(NaiveDate::MIN);
    DateRange { start, end }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            state: "Odisha".into(),
            baseline: BaselineConfig::default(),
            study: default_study(),
            population_year: 2020,
            population_kind: FieldKind::Density,
            vulnerability: VulnerabilityConfig::default(),
            policy: ResolutionPolicy::default(),
            hazard_metric: HazardMetric::default(),
            fine_resolution: None,
            ramp: ColorRamp::default(),
        }
    }
}

impl PipelineConfig {
    /// Reject configurations no run could satisfy.
    pub fn validate(&self) -> Result<()> {
        self.baseline.periods()?;
        if self.study.end < self.study.start {
            return Err(RiskError::Config(format!(
                "study window ends ({}) before it starts ({})",
                self.study.end, self.study.start
            )));
        }
        if let Some(res) = self.fine_resolution {
            if !(res > 0.0) {
                return Err(RiskError::Config(format!("fine resolution must be positive, got {res}")));
            }
        }
        let v = &self.vulnerability;
        if v.env_weight < 0.0 || v.uhi_weight < 0.0 || v.ndvi_scale <= 0.0 {
            return Err(RiskError::Config("vulnerability weights and NDVI scale must be non-negative".into()));
        }
        if let HazardMetric::HeatwaveDays { min_run: 0 } = self.hazard_metric {
            return Err(RiskError::Config("heatwave runs need min_run ≥ 1".into()));
        }
        Ok(())
    }
}

// ── Results ───────────────────────────────────────────────────────────────────

/// Geometry of an output layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSummary {
    pub grid: GridSpec,
    pub crs: String,
    pub resolution_m: f64,
    pub bounds: Bounds,
}

impl From<&GridSpec> for GridSummary {
    fn from(spec: &GridSpec) -> Self {
        Self {
            grid: *spec,
            crs: spec.crs.to_string(),
            resolution_m: spec.nominal_resolution_m(),
            bounds: spec.bounds(),
        }
    }
}

/// Diagnostics of one run, written next to the outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub state: String,
    pub policy: ResolutionPolicy,
    pub hazard_metric: HazardMetric,
    pub baseline: BaselineConfig,
    pub study: DateRange,
    pub study_days_expected: i64,
    pub study_days_available: usize,
    pub baseline_days: usize,
    pub missing_threshold_months: Vec<u32>,
    /// Grid the hazard was counted on.
    pub hazard_grid: GridSummary,
    /// Grid the layers were combined on.
    pub analysis_grid: GridSummary,
    pub region_cells: usize,
    pub layer_ranges: LayerRanges,
    /// Night LST range over the region, °C.
    pub lst_range_c: MinMax,
    pub districts: usize,
    pub notes: Vec<String>,
}

/// Full output of a pipeline run.
pub struct RiskResult {
    /// Exceedance counts on the native reanalysis grid.
    pub hazard_native: RasterGrid,
    pub thresholds: MonthlyThresholds,
    /// The three layers on the analysis grid.
    pub hazard: RasterGrid,
    pub exposure: RasterGrid,
    pub vulnerability: RasterGrid,
    /// Composite risk, missing outside the state.
    pub risk: RasterGrid,
    /// Ranked descending by mean risk.
    pub records: Vec<DistrictRiskRecord>,
    pub summary: RunSummary,
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

pub struct RiskPipeline {
    config: PipelineConfig,
}

impl RiskPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self, sources: &Sources<'_>) -> Result<RiskResult> {
        let cfg = &self.config;

        // ── 0. Boundaries ─────────────────────────────────────────────────────
        let state = sources.boundaries.state(&cfg.state)?;
        let districts = sources.boundaries.districts(&cfg.state)?;
        let bounds = state.bounds();
        info!(state = %state.name, districts = districts.len(), ?bounds, "boundaries loaded");

        // ── 1. Heat Index ─────────────────────────────────────────────────────
        let baseline_window = cfg.baseline.window()?;
        let fetch = |range: &DateRange| -> Result<RasterSeries> {
            let t = sources.reanalysis.daily(ReanalysisVariable::Temperature2m, range, &bounds)?;
            let td = sources.reanalysis.daily(ReanalysisVariable::Dewpoint2m, range, &bounds)?;
            heat_index_series(&t, &td)
        };
        let hi_baseline = fetch(&baseline_window)?;
        let hi_study = fetch(&cfg.study)?;

        // ── 2. Baseline thresholds ────────────────────────────────────────────
        let thresholds = MonthlyThresholds::build(&hi_baseline, &cfg.baseline)?;

        // ── 3. Hazard ─────────────────────────────────────────────────────────
        let hazard_native = build_hazard(&hi_study, &thresholds, &cfg.study, cfg.hazard_metric)?;
        if (hi_study.len() as i64) < cfg.study.num_days() {
            warn!(
                available = hi_study.len(),
                expected = cfg.study.num_days(),
                "study window has days without reanalysis data"
            );
        }

        // ── 4. Exposure & vulnerability inputs on the analysis grid ───────────
        let population = sources.population.population(cfg.population_year, &bounds)?;
        let fine_grid = match cfg.fine_resolution {
            Some(res) => GridSpec::covering(&state.bounds_in(population.spec.crs), res, res, population.spec.crs)?,
            None => population.spec,
        };
        let analysis_grid = match cfg.policy {
            ResolutionPolicy::Upsample => fine_grid,
            ResolutionPolicy::Downsample => hazard_native.spec,
        };
        info!(policy = %cfg.policy, grid = %analysis_grid, "analysis grid chosen");

        let hazard = match cfg.policy {
            ResolutionPolicy::Upsample => warp(&hazard_native, &analysis_grid, Kernel::Bicubic)?,
            ResolutionPolicy::Downsample => hazard_native.clone(),
        };
        let population = align(&population, &analysis_grid, cfg.population_kind)?;

        let ndvi = sources.vegetation.ndvi(&cfg.study, &bounds)?;
        let ndvi = align(&ndvi.mean_composite()?, &analysis_grid, FieldKind::Index)?;
        let lst = sources.night_lst.night_lst(&cfg.study, &bounds)?;
        let lst = align(&lst.mean_composite()?, &analysis_grid, FieldKind::Index)?;

        let mask = state.mask(&analysis_grid);
        if mask.is_empty() {
            return Err(RiskError::InvalidRaster(format!(
                "state {} covers no cell of the analysis grid {analysis_grid}",
                state.name
            )));
        }

        let exposure = build_exposure(&population, &mask)?;
        let vulnerability = build_vulnerability(&ndvi, &lst, &mask, &cfg.vulnerability)?;

        // ── 5. Risk and district table ────────────────────────────────────────
        let composite = compose_risk(&hazard, &exposure, &vulnerability.score, &mask)?;
        let include_max = cfg.policy == ResolutionPolicy::Upsample;
        let mut records = zonal_risk(&composite.risk, &districts, include_max);
        rank_districts(&mut records);
        info!(
            top = records.first().map(|r| r.district.as_str()).unwrap_or("-"),
            "districts ranked"
        );

        let mut notes = Vec::new();
        if include_max {
            notes.push(UPSAMPLE_NOTE.to_string());
        }
        if let HazardMetric::ExceedanceDays = cfg.hazard_metric {
            notes.push("hazard counts exceedance days and does not require consecutive runs".to_string());
        }

        let summary = RunSummary {
            state: state.name.clone(),
            policy: cfg.policy,
            hazard_metric: cfg.hazard_metric,
            baseline: cfg.baseline,
            study: cfg.study,
            study_days_expected: cfg.study.num_days(),
            study_days_available: hi_study.within(&cfg.study).len(),
            baseline_days: hi_baseline.len(),
            missing_threshold_months: thresholds.missing_months(),
            hazard_grid: GridSummary::from(&hazard_native.spec),
            analysis_grid: GridSummary::from(&analysis_grid),
            region_cells: mask.count(),
            layer_ranges: composite.ranges,
            lst_range_c: vulnerability.lst_range,
            districts: records.len(),
            notes,
        };

        Ok(RiskResult {
            hazard_native,
            thresholds,
            hazard,
            exposure,
            vulnerability: vulnerability.score,
            risk: composite.risk,
            records,
            summary,
        })
    }
}
