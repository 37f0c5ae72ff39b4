//! Centralized error handling for the climate ETL pipeline
//!
//! This module provides structured error types so that every stage of the
//! pipeline (config parsing, netCDF I/O, transforms, splitting) reports
//! errors with context instead of a generic `Box<dyn Error>`.

use std::fmt;
use std::path::PathBuf;

/// Main error type for ETL operations
#[derive(Debug)]
pub enum EtlError {
    /// NetCDF file operation errors
    NetCDF(netcdf::Error),

    /// I/O operation errors
    Io(std::io::Error),

    /// Array shape or dimension error
    Shape(ndarray::ShapeError),

    /// Configuration file could not be deserialized
    ConfigParse(serde_yaml::Error),

    /// Configuration value is out of bounds or inconsistent
    ConfigBounds(String),

    /// Variable not found in a dataset
    VariableNotFound { var: String },

    /// Dimension not found in a variable
    DimensionNotFound { var: String, dim: String },

    /// Coordinate not found in a dataset
    CoordNotFound { coord: String },

    /// Malformed 360-day calendar date
    BadDate(String),

    /// An action in a pipeline spec failed
    Action { action: String, message: String },

    /// A produced file failed validation
    Validation { path: PathBuf, failures: Vec<String> },

    /// Thread pool configuration error
    ThreadPool(String),

    /// Generic error
    Generic(String),
}

impl fmt::Display for EtlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EtlError::NetCDF(e) => write!(f, "NetCDF error: {}", e),
            EtlError::Io(e) => write!(f, "I/O error: {}", e),
            EtlError::Shape(e) => write!(f, "Array error: {}", e),
            EtlError::ConfigParse(e) => write!(f, "Cannot deserialize config: {}", e),
            EtlError::ConfigBounds(msg) => write!(f, "Config value out of bounds: {}", msg),
            EtlError::VariableNotFound { var } => {
                write!(f, "Variable '{}' not found in dataset", var)
            }
            EtlError::DimensionNotFound { var, dim } => {
                write!(f, "Dimension '{}' not found in variable '{}'", dim, var)
            }
            EtlError::CoordNotFound { coord } => {
                write!(f, "Coordinate '{}' not found in dataset", coord)
            }
            EtlError::BadDate(msg) => write!(f, "Invalid 360-day date: {}", msg),
            EtlError::Action { action, message } => {
                write!(f, "Action '{}' failed: {}", action, message)
            }
            EtlError::Validation { path, failures } => write!(
                f,
                "Validation of {} failed: {}",
                path.display(),
                failures.join(", ")
            ),
            EtlError::ThreadPool(msg) => write!(f, "Thread pool error: {}", msg),
            EtlError::Generic(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for EtlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EtlError::NetCDF(e) => Some(e),
            EtlError::Io(e) => Some(e),
            EtlError::Shape(e) => Some(e),
            EtlError::ConfigParse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<netcdf::Error> for EtlError {
    fn from(error: netcdf::Error) -> Self {
        EtlError::NetCDF(error)
    }
}

impl From<std::io::Error> for EtlError {
    fn from(error: std::io::Error) -> Self {
        EtlError::Io(error)
    }
}

impl From<ndarray::ShapeError> for EtlError {
    fn from(error: ndarray::ShapeError) -> Self {
        EtlError::Shape(error)
    }
}

impl From<serde_yaml::Error> for EtlError {
    fn from(error: serde_yaml::Error) -> Self {
        EtlError::ConfigParse(error)
    }
}

impl From<String> for EtlError {
    fn from(error: String) -> Self {
        EtlError::Generic(error)
    }
}

impl From<&str> for EtlError {
    fn from(error: &str) -> Self {
        EtlError::Generic(error.to_string())
    }
}

/// Result type alias for ETL operations
pub type Result<T> = std::result::Result<T, EtlError>;
