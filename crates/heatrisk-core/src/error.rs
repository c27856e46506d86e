use thiserror::Error;

/// Every way a pipeline run can fail. A failure at any stage aborts the run.
#[derive(Debug, Error)]
pub enum RiskError {
    /// Two rasters were combined without an explicit resample.
    #[error("grid mismatch in {context}: {left} vs {right}")]
    GridMismatch {
        context: &'static str,
        left: String,
        right: String,
    },

    /// The baseline for this calendar month had no observations in at least one sub-period.
    #[error("missing threshold for month {0}")]
    MissingThreshold(u32),

    #[error("empty series: {0}")]
    EmptySeries(String),

    #[error("invalid raster: {0}")]
    InvalidRaster(String),

    #[error("region not found: {0}")]
    RegionNotFound(String),

    /// A data source could not deliver the requested rasters.
    #[error("source failure: {0}")]
    Source(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RiskError>;
