//! File-backed runner for the heat-risk pipeline: GeoTIFF and archive I/O,
//! the on-disk catalog, and report artefacts.

pub mod catalog;
pub mod geotiff;
pub mod report;

pub use catalog::{DataLayout, DiskCatalog};
