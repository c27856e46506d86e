//! District heat-risk index from reanalysis, population and satellite rasters.
//!
//! Risk = Hazard × Exposure × Vulnerability, computed as an eager local raster
//! pipeline (see [`pipeline::RiskPipeline`]).

pub mod baseline;
pub mod colormap;
pub mod composite;
pub mod coords;
pub mod error;
pub mod exposure;
pub mod hazard;
pub mod heat_index;
pub mod normalize;
pub mod pipeline;
pub mod raster;
pub mod region;
pub mod resample;
pub mod series;
pub mod source;
pub mod stats;
pub mod vulnerability;
pub mod zonal;

pub use error::{Result, RiskError};
pub use pipeline::{PipelineConfig, ResolutionPolicy, RiskPipeline, RiskResult, RunSummary};
pub use raster::{GridSpec, RasterGrid};
