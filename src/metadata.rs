//! On-disk layout of variable files and dataset directories.
//!
//! Variable files are stored one-per-year under a directory tree keyed by
//! collection, domain, resolution, scenario, ensemble member and frequency.
//! A dataset is a directory holding one netCDF file per split plus the
//! config it was built from.

use crate::calendar::CDateTime;
use crate::config::TimePeriod;
use crate::errors::{EtlError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Named time periods used by `dataset filter` and the `sample` command.
pub const TIME_PERIOD_NAMES: [&str; 3] = ["historic", "present", "future"];

/// Resolve a named time period to its date range.
pub fn named_time_period(name: &str) -> Result<TimePeriod> {
    let (start, end) = match name {
        "historic" => ("1980-12-01", "2000-11-30"),
        "present" => ("2020-12-01", "2040-11-30"),
        "future" => ("2060-12-01", "2080-11-30"),
        _ => {
            return Err(EtlError::Generic(format!(
                "unknown time period '{}' (expected one of {})",
                name,
                TIME_PERIOD_NAMES.join(", ")
            )))
        }
    };
    Ok(TimePeriod::new(
        CDateTime::parse_date(start)?,
        CDateTime::parse_date(end)?,
    ))
}

/// Path scheme for per-year variable files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableMeta {
    pub base_dir: PathBuf,
    pub variable: String,
    pub frequency: String,
    pub domain: String,
    pub resolution: String,
    pub ensemble_member: String,
    pub scenario: String,
    pub collection: String,
}

impl VariableMeta {
    /// Directory holding every yearly file of this variable.
    pub fn dirpath(&self) -> PathBuf {
        self.base_dir
            .join(&self.collection)
            .join(&self.domain)
            .join(&self.resolution)
            .join(&self.scenario)
            .join(&self.ensemble_member)
            .join(&self.frequency)
            .join(&self.variable)
    }

    /// File for one meteorological year: December of `year - 1` through
    /// November of `year`.
    pub fn filepath(&self, year: i64) -> PathBuf {
        self.dirpath().join(format!(
            "{}_{}_{}_{}_{}1201-{}1130.nc",
            self.variable,
            self.scenario,
            self.ensemble_member,
            self.frequency,
            year - 1,
            year
        ))
    }

    /// All yearly files currently on disk, sorted by name (and therefore by
    /// year, given the fixed filename layout).
    pub fn existing_filepaths(&self) -> Result<Vec<PathBuf>> {
        let dir = self.dirpath();
        if !dir.is_dir() {
            return Err(EtlError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no variable directory at {}", dir.display()),
            )));
        }
        let mut paths: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().map(|ext| ext == "nc").unwrap_or(false))
            .collect();
        paths.sort();
        Ok(paths)
    }
}

/// Path scheme for a dataset directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetMeta {
    pub base_dir: PathBuf,
    pub name: String,
}

impl DatasetMeta {
    pub fn new(base_dir: &Path, name: &str) -> Self {
        DatasetMeta {
            base_dir: base_dir.to_path_buf(),
            name: name.to_string(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.base_dir.join(&self.name)
    }

    pub fn config_path(&self) -> PathBuf {
        self.path().join("ds-config.yml")
    }

    pub fn split_path(&self, split: &str) -> PathBuf {
        self.path().join(format!("{}.nc", split))
    }

    pub fn stats_path(&self, split: &str) -> PathBuf {
        self.path().join(format!("stats-{}.nc", split))
    }

    /// Names of the splits present on disk, derived from `*.nc` files that
    /// are not stats sidecars.
    pub fn existing_splits(&self) -> Result<Vec<String>> {
        let mut splits: Vec<String> = fs::read_dir(self.path())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().map(|ext| ext == "nc").unwrap_or(false))
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .filter(|stem| !stem.starts_with("stats-"))
            .collect();
        splits.sort();
        Ok(splits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> VariableMeta {
        VariableMeta {
            base_dir: PathBuf::from("/data/derived"),
            variable: "pr".to_string(),
            frequency: "day".to_string(),
            domain: "birmingham-64".to_string(),
            resolution: "2.2km-coarsened-4x".to_string(),
            ensemble_member: "01".to_string(),
            scenario: "rcp85".to_string(),
            collection: "land-cpm".to_string(),
        }
    }

    #[test]
    fn variable_paths() {
        let m = meta();
        assert_eq!(
            m.dirpath(),
            PathBuf::from(
                "/data/derived/land-cpm/birmingham-64/2.2km-coarsened-4x/rcp85/01/day/pr"
            )
        );
        assert_eq!(
            m.filepath(1981),
            m.dirpath().join("pr_rcp85_01_day_19801201-19811130.nc")
        );
    }

    #[test]
    fn dataset_paths() {
        let d = DatasetMeta::new(Path::new("/data/datasets"), "bham64-pr");
        assert_eq!(d.path(), PathBuf::from("/data/datasets/bham64-pr"));
        assert_eq!(d.split_path("train"), d.path().join("train.nc"));
        assert_eq!(d.stats_path("val"), d.path().join("stats-val.nc"));
        assert_eq!(d.config_path(), d.path().join("ds-config.yml"));
    }

    #[test]
    fn named_periods() {
        let p = named_time_period("historic").unwrap();
        assert_eq!(p.start, CDateTime::parse_date("1980-12-01").unwrap());
        assert_eq!(p.end, CDateTime::parse_date("2000-11-30").unwrap());
        assert!(named_time_period("jurassic").is_err());
    }
}
