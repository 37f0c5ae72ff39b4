//! climate-etl: netCDF climate-model output to ML-ready datasets
//!
//! A pipeline for turning per-year climate-model variable files into
//! train/val/test dataset splits. Derived variables are built from source
//! netCDF files through a configurable chain of transforms (domain
//! selection, coarsening, regridding, resampling, derived arithmetic), then
//! combined across ensemble members and partitioned over time by one of
//! several splitting schemes.
//!
//! ## Module Organization
//!
//! - [`calendar`]: the 360-day model calendar and time arithmetic
//! - [`config`]: YAML configuration for variables and datasets
//! - [`cube`]: the in-memory dataset model
//! - [`ncio`]: netCDF reading and writing for [`cube::Dataset`]
//! - [`actions`]: the transform chain applied by variable pipelines
//! - [`variable`]: single-variable ETL (create and validate)
//! - [`dataset`]: dataset assembly, splitting and maintenance
//! - [`statistics`]: parallel summary statistics for split files
//! - [`metadata`]: on-disk layout of variable files and datasets
//! - [`parallel`]: Rayon thread pool configuration
//! - [`errors`]: centralized error handling

pub mod actions;
pub mod calendar;
pub mod cli;
pub mod config;
pub mod cube;
pub mod dataset;
pub mod errors;
pub mod metadata;
pub mod ncio;
pub mod parallel;
pub mod sample;
pub mod statistics;
pub mod variable;

pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::calendar::{CDateTime, Season};
    pub use crate::config::{DatasetConfig, SplitConfig, SplitScheme, VariableConfig};
    pub use crate::cube::{Coord, DataVar, Dataset};
    pub use crate::errors::{EtlError, Result};
    pub use crate::metadata::{DatasetMeta, VariableMeta};
}
