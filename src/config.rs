//! Parsing and checking of YAML configuration files.
//!
//! Two kinds of configuration drive the pipeline: a [`VariableConfig`]
//! describes how one derived variable is built from source data via a chain
//! of actions, and a [`DatasetConfig`] describes how derived variables are
//! combined and split into an ML-ready dataset. Both use `serde` for strong
//! typing and are bounds-checked after deserialization so that bad configs
//! fail early with a useful message.

use crate::calendar::CDateTime;
use crate::errors::{EtlError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// An inclusive time period, configured as a `[start, end]` pair of
/// `YYYY-MM-DD` dates.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(from = "(CDateTime, CDateTime)", into = "(CDateTime, CDateTime)")]
pub struct TimePeriod {
    pub start: CDateTime,
    pub end: CDateTime,
}

impl TimePeriod {
    pub fn new(start: CDateTime, end: CDateTime) -> Self {
        TimePeriod { start, end }
    }

    /// Whether an instant falls inside the period. The end date is
    /// inclusive of the whole day.
    pub fn contains(&self, t: CDateTime) -> bool {
        t >= self.start && t.floor_day() <= self.end
    }

    pub fn check_bounds(&self) -> Result<()> {
        if self.start > self.end {
            return Err(EtlError::ConfigBounds(format!(
                "time period starts after it ends: {} > {}",
                self.start, self.end
            )));
        }
        Ok(())
    }
}

impl From<(CDateTime, CDateTime)> for TimePeriod {
    fn from((start, end): (CDateTime, CDateTime)) -> Self {
        TimePeriod { start, end }
    }
}

impl From<TimePeriod> for (CDateTime, CDateTime) {
    fn from(p: TimePeriod) -> Self {
        (p.start, p.end)
    }
}

/// Dataset splitting scheme.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SplitScheme {
    Random,
    RandomSeason,
    /// Season-stratified intensity split (legacy).
    Ssi,
}

/// Fields describing how a dataset's timestamps are partitioned.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct SplitConfig {
    pub scheme: SplitScheme,

    /// Proportion per split name. `train` is implied as the remainder and
    /// must not be listed.
    pub props: BTreeMap<String, f64>,

    #[serde(default = "SplitConfig::default_seed")]
    pub seed: u64,

    pub time_periods: Vec<TimePeriod>,
}

impl SplitConfig {
    fn default_seed() -> u64 {
        42
    }

    pub fn check_bounds(&self) -> Result<()> {
        if self.props.contains_key("train") {
            return Err(EtlError::ConfigBounds(
                "'train' receives the remainder and must not appear in props".to_string(),
            ));
        }
        let mut total = 0.0;
        for (name, prop) in &self.props {
            if !(0.0..1.0).contains(prop) || *prop == 0.0 {
                return Err(EtlError::ConfigBounds(format!(
                    "split proportion for '{}' must be in (0, 1), got {}",
                    name, prop
                )));
            }
            total += prop;
        }
        if total >= 1.0 {
            return Err(EtlError::ConfigBounds(format!(
                "split proportions sum to {}, leaving nothing for 'train'",
                total
            )));
        }
        if self.time_periods.is_empty() {
            return Err(EtlError::ConfigBounds(
                "at least one time period is required".to_string(),
            ));
        }
        for period in &self.time_periods {
            period.check_bounds()?;
        }
        Ok(())
    }
}

/// One group of variables (predictors or predictands) in a dataset config.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct VarGroupConfig {
    pub variables: Vec<String>,
    pub frequency: String,
    pub resolution: String,
    pub collection: String,
}

impl VarGroupConfig {
    pub fn check_bounds(&self) -> Result<()> {
        if self.variables.is_empty() {
            return Err(EtlError::ConfigBounds(
                "variable group lists no variables".to_string(),
            ));
        }
        Ok(())
    }
}

/// A post-hoc filter recorded in a dataset config by `dataset filter`.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct FilterConfig {
    pub time_period: String,
}

/// Main dataset configuration, one YAML file per dataset.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct DatasetConfig {
    pub domain: String,
    pub scenario: String,
    pub frequency: String,
    pub ensemble_members: Vec<String>,
    pub predictors: VarGroupConfig,
    pub predictands: VarGroupConfig,
    pub split: SplitConfig,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterConfig>,
}

impl DatasetConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        let config: DatasetConfig = serde_yaml::from_slice(&data)?;
        config.check_bounds()?;
        Ok(config)
    }

    pub fn check_bounds(&self) -> Result<()> {
        if self.ensemble_members.is_empty() {
            return Err(EtlError::ConfigBounds(
                "at least one ensemble member is required".to_string(),
            ));
        }
        self.predictors.check_bounds()?;
        self.predictands.check_bounds()?;
        self.split.check_bounds()?;
        Ok(())
    }
}

/// Regridding scheme. Only nearest-neighbour is supported; higher-order
/// schemes are left to external tooling.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegridScheme {
    #[default]
    Nn,
}

/// One step in a variable pipeline spec.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(tag = "action", content = "parameters", rename_all = "kebab-case")]
pub enum ActionSpec {
    Rename {
        mapping: BTreeMap<String, String>,
    },
    DropVariables {
        variables: Vec<String>,
    },
    SelectSubdomain {
        domain: String,
        #[serde(default = "ActionSpec::default_size")]
        size: usize,
    },
    Coarsen {
        factor: usize,
    },
    RegridToTarget {
        target_grid: PathBuf,
        #[serde(default)]
        scheme: RegridScheme,
    },
    Resample {
        frequency: String,
    },
    Sum {
        variables: Vec<String>,
        name: String,
    },
    Diff {
        left: String,
        right: String,
        name: String,
    },
    ShiftLonBreak,
}

impl ActionSpec {
    fn default_size() -> usize {
        64
    }

    /// The action name as written in config files.
    pub fn name(&self) -> &'static str {
        match self {
            ActionSpec::Rename { .. } => "rename",
            ActionSpec::DropVariables { .. } => "drop-variables",
            ActionSpec::SelectSubdomain { .. } => "select-subdomain",
            ActionSpec::Coarsen { .. } => "coarsen",
            ActionSpec::RegridToTarget { .. } => "regrid-to-target",
            ActionSpec::Resample { .. } => "resample",
            ActionSpec::Sum { .. } => "sum",
            ActionSpec::Diff { .. } => "diff",
            ActionSpec::ShiftLonBreak => "shift-lon-break",
        }
    }
}

/// Source data type for a variable pipeline. Only pre-converted local
/// netCDF files are supported; archive extraction happens upstream.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    Local,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct SourceVariable {
    pub name: String,
}

/// Where a variable pipeline reads its inputs from.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct SourcesConfig {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub collection: String,
    pub frequency: String,
    pub resolution: String,
    pub domain: String,
    pub variables: Vec<SourceVariable>,
}

/// Configuration for building one derived variable.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct VariableConfig {
    pub variable: String,
    pub sources: SourcesConfig,
    pub spec: Vec<ActionSpec>,

    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
}

impl VariableConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        let config: VariableConfig = serde_yaml::from_slice(&data)?;
        config.check_bounds()?;
        Ok(config)
    }

    pub fn check_bounds(&self) -> Result<()> {
        if self.sources.variables.is_empty() {
            return Err(EtlError::ConfigBounds(
                "variable config lists no source variables".to_string(),
            ));
        }
        for step in &self.spec {
            match step {
                ActionSpec::Coarsen { factor } if *factor < 2 => {
                    return Err(EtlError::ConfigBounds(format!(
                        "coarsen factor must be at least 2, got {}",
                        factor
                    )));
                }
                ActionSpec::SelectSubdomain { size, .. } if *size == 0 => {
                    return Err(EtlError::ConfigBounds(
                        "subdomain size cannot be zero".to_string(),
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }
}
