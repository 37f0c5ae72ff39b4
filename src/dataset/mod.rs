//! Dataset assembly and maintenance
//!
//! A dataset is built from per-year variable files: for every ensemble
//! member the configured predictor and predictand variables are opened,
//! concatenated over time and merged, predictands gaining a `target_`
//! prefix. Members are stacked along a new ensemble axis, the time axis is
//! partitioned by the configured splitting scheme and each split is saved
//! as one netCDF file with a summary-statistics sidecar.

pub mod intensity_split;
pub mod random_season_split;
pub mod random_split;
pub mod split;

use crate::calendar::{CALENDAR, TIME_UNITS};
use crate::config::{DatasetConfig, FilterConfig, VarGroupConfig};
use crate::cube::{Dataset, ENSEMBLE_DIM, TIME_DIM};
use crate::errors::{EtlError, Result};
use crate::metadata::{named_time_period, DatasetMeta, VariableMeta};
use crate::ncio;
use crate::statistics;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// The split-ready target variable name of the first predictand, used to
/// rank days for the intensity scheme.
fn target_variable(config: &DatasetConfig) -> Result<String> {
    config
        .predictands
        .variables
        .first()
        .map(|v| format!("target_{}", v))
        .ok_or_else(|| EtlError::ConfigBounds("no predictand variables".to_string()))
}

fn open_variable(
    em: &str,
    variable: &str,
    group: &VarGroupConfig,
    config: &DatasetConfig,
    input_base_dir: &Path,
) -> Result<Dataset> {
    let meta = VariableMeta {
        base_dir: input_base_dir.to_path_buf(),
        variable: variable.to_string(),
        frequency: config.frequency.clone(),
        domain: config.domain.clone(),
        resolution: group.resolution.clone(),
        ensemble_member: em.to_string(),
        scenario: config.scenario.clone(),
        collection: group.collection.clone(),
    };
    let paths = meta.existing_filepaths()?;
    if paths.is_empty() {
        return Err(EtlError::Generic(format!(
            "no files for variable '{}' under {}",
            variable,
            meta.dirpath().display()
        )));
    }
    let mut parts = Vec::with_capacity(paths.len());
    for path in &paths {
        debug!("Opening {}", path.display());
        parts.push(ncio::read_dataset(path)?);
    }
    Dataset::concat_time(&parts)
}

/// Merge every configured variable of one ensemble member into a single
/// dataset, renaming predictands to `target_<name>`.
fn combine_variables(
    em: &str,
    config: &DatasetConfig,
    input_base_dir: &Path,
) -> Result<Dataset> {
    let mut combined: Option<Dataset> = None;
    let groups = [
        (&config.predictors, false),
        (&config.predictands, true),
    ];
    for (group, is_predictand) in groups {
        for variable in &group.variables {
            let mut ds = open_variable(em, variable, group, config, input_base_dir)?;
            if is_predictand {
                ds.rename(variable, &format!("target_{}", variable));
            }
            combined = Some(match combined {
                Some(acc) => acc.merge(ds)?,
                None => ds,
            });
        }
    }
    combined.ok_or_else(|| EtlError::ConfigBounds("no variables configured".to_string()))
}

/// Build the split datasets in memory.
pub fn build(
    config: &DatasetConfig,
    input_base_dir: &Path,
) -> Result<BTreeMap<String, Dataset>> {
    let mut members = Vec::with_capacity(config.ensemble_members.len());
    for em in &config.ensemble_members {
        let ds = combine_variables(em, config, input_base_dir)?;
        debug!("Gathered data for member {}", em);
        members.push((em.clone(), ds));
    }
    let mut multi_em = Dataset::stack_members(members)?;
    multi_em.add_season_coord();

    info!("Splitting data");
    let partition = split::run(&config.split, &multi_em, &target_variable(config)?)?;

    let mut splits = BTreeMap::new();
    for (name, days) in partition {
        let day_set = days.iter().copied().collect();
        splits.insert(name, multi_em.select_days(&day_set));
    }
    Ok(splits)
}

/// Create a dataset directory from a config file. The directory must not
/// already exist.
pub fn create(
    config_path: &Path,
    input_base_dir: &Path,
    output_base_dir: &Path,
) -> Result<()> {
    let name = config_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| EtlError::Generic("config path has no file stem".to_string()))?;
    let config = DatasetConfig::from_file(config_path)?;

    let splits = build(&config, input_base_dir)?;

    let meta = DatasetMeta::new(output_base_dir, &name);
    if meta.path().exists() {
        return Err(EtlError::Generic(format!(
            "dataset directory {} already exists",
            meta.path().display()
        )));
    }
    fs::create_dir_all(meta.path())?;
    save_config(&meta, &config)?;

    for (split_name, split_ds) in &splits {
        info!("Saving split {}", split_name);
        ncio::write_dataset(split_ds, &meta.split_path(split_name))?;
        statistics::write_stats_sidecar(split_ds, &meta.stats_path(split_name))?;
    }
    Ok(())
}

fn save_config(meta: &DatasetMeta, config: &DatasetConfig) -> Result<()> {
    let yaml = serde_yaml::to_string(config)?;
    fs::write(meta.config_path(), yaml)?;
    Ok(())
}

/// Check every split file of a dataset. Returns split name to failure
/// descriptions; an empty map means the dataset is valid.
pub fn validate(name: &str, base_dir: &Path) -> Result<BTreeMap<String, Vec<String>>> {
    let meta = DatasetMeta::new(base_dir, name);
    let config = DatasetConfig::from_file(&meta.config_path())?;
    let example_var = target_variable(&config)?;

    let mut failures = BTreeMap::new();
    for split in ["train", "val", "test"] {
        let path = meta.split_path(split);
        let mut split_failures = Vec::new();
        if !path.is_file() {
            failures.insert(split.to_string(), vec!["no file".to_string()]);
            continue;
        }
        check_split_file(&path, &example_var, &config, &mut split_failures)?;
        if !split_failures.is_empty() {
            failures.insert(split.to_string(), split_failures);
        }
    }
    Ok(failures)
}

/// Variables stripped during variable creation that must never reach a
/// dataset.
const FORBIDDEN_VARS: [&str; 5] = [
    "forecast_period",
    "forecast_reference_time",
    "forecast_period_bnds",
    "realization",
    "pressure",
];

fn check_split_file(
    path: &Path,
    example_var: &str,
    config: &DatasetConfig,
    failures: &mut Vec<String>,
) -> Result<()> {
    let file = netcdf::open(path)?;

    match file.variable(TIME_DIM) {
        Some(time_var) => {
            let units = time_var
                .attribute("units")
                .and_then(|a| match a.value().ok()? {
                    netcdf::AttributeValue::Str(s) => Some(s),
                    _ => None,
                });
            let calendar = time_var
                .attribute("calendar")
                .and_then(|a| match a.value().ok()? {
                    netcdf::AttributeValue::Str(s) => Some(s),
                    _ => None,
                });
            if units.as_deref() != Some(TIME_UNITS) || calendar.as_deref() != Some(CALENDAR) {
                failures.push("bad time encoding".to_string());
            }
        }
        None => failures.push("no time axis".to_string()),
    }

    match file.variable("time_bnds") {
        Some(bnds) => {
            if bnds.dimensions().iter().any(|d| d.name() == ENSEMBLE_DIM) {
                failures.push("time_bnds carries the ensemble dimension".to_string());
            }
        }
        None => failures.push("no time_bnds".to_string()),
    }

    match file.variable(example_var) {
        Some(var) => {
            let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
            let grid_mapping = var.attribute("grid_mapping").and_then(|a| {
                match a.value().ok()? {
                    netcdf::AttributeValue::Str(s) => Some(s),
                    _ => None,
                }
            });
            let expected = match grid_mapping.as_deref() {
                Some("rotated_latitude_longitude") => {
                    vec![ENSEMBLE_DIM, TIME_DIM, "grid_latitude", "grid_longitude"]
                }
                Some("latitude_longitude") => {
                    vec![ENSEMBLE_DIM, TIME_DIM, "latitude", "longitude"]
                }
                Some("transverse_mercator") => vec![
                    ENSEMBLE_DIM,
                    TIME_DIM,
                    "projection_y_coordinate",
                    "projection_x_coordinate",
                ],
                _ => {
                    failures.push("unknown or missing grid_mapping".to_string());
                    Vec::new()
                }
            };
            if !expected.is_empty() && dims.iter().map(String::as_str).ne(expected.iter().copied())
            {
                failures.push(format!("bad dimensions [{}]", dims.join(", ")));
            }
            if let Some(em_dim) = var.dimensions().iter().find(|d| d.name() == ENSEMBLE_DIM)
            {
                if em_dim.len() != config.ensemble_members.len() {
                    failures.push("ensemble dimension does not match config".to_string());
                }
            }
            if let Some(mapping) = grid_mapping.as_deref() {
                for grid_var_name in
                    [mapping.to_string()].into_iter().chain(expected.iter().skip(2).map(
                        |d| format!("{}_bnds", d),
                    ))
                {
                    if let Some(grid_var) = file.variable(&grid_var_name) {
                        if grid_var
                            .dimensions()
                            .iter()
                            .any(|d| d.name() == ENSEMBLE_DIM || d.name() == TIME_DIM)
                        {
                            failures.push(format!(
                                "grid variable {} carries data dimensions",
                                grid_var_name
                            ));
                        }
                    }
                }
            }
        }
        None => failures.push(format!("missing variable {}", example_var)),
    }

    for forbidden in FORBIDDEN_VARS {
        if file.variable(forbidden).is_some() {
            failures.push(format!("leftover variable {}", forbidden));
        }
    }

    for var in file.variables() {
        if var.attribute("grid_mapping").is_none() {
            continue;
        }
        let values: Vec<f32> = var.get_values::<f32, _>(..)?;
        let nan_count = values.iter().filter(|v| v.is_nan()).count();
        if nan_count > 0 {
            failures.push(format!("{} NaNs in {}", nan_count, var.name()));
        }
    }

    Ok(())
}

/// Draw a seeded random subset of a split's timesteps into a new split file
/// in the same dataset. Returns the new split's path.
pub fn random_subset_split(
    name: &str,
    base_dir: &Path,
    split: &str,
    pc: u32,
    new_split: Option<&str>,
    seed: u64,
) -> Result<PathBuf> {
    if pc == 0 || pc > 100 {
        return Err(EtlError::ConfigBounds(format!(
            "subset percentage must be in 1..=100, got {}",
            pc
        )));
    }
    let meta = DatasetMeta::new(base_dir, name);
    let derived_name = match new_split {
        Some(n) => n.to_string(),
        None => format!("{}-{}pc", split, pc),
    };

    let source_path = meta.split_path(split);
    info!("Subsetting {}", source_path.display());
    let ds = ncio::read_dataset(&source_path)?;

    let new_size = ds.time.len() * pc as usize / 100;
    let mut indices: Vec<usize> = (0..ds.time.len()).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    indices.truncate(new_size);
    indices.sort_unstable();

    let subset = ds.select_time_indices(&indices);
    let new_path = meta.split_path(&derived_name);
    ncio::write_dataset(&subset, &new_path)?;
    statistics::write_stats_sidecar(&subset, &meta.stats_path(&derived_name))?;
    Ok(new_path)
}

/// Filter every split of a dataset to a named time period, producing a new
/// dataset `<name>-<period>`. Returns the new dataset's name.
pub fn filter(name: &str, base_dir: &Path, time_period: &str) -> Result<String> {
    let period = named_time_period(time_period)?;
    let meta = DatasetMeta::new(base_dir, name);
    let mut config = DatasetConfig::from_file(&meta.config_path())?;
    config.filters.push(FilterConfig {
        time_period: time_period.to_string(),
    });

    let new_name = format!("{}-{}", name, time_period);
    let new_meta = DatasetMeta::new(base_dir, &new_name);
    if new_meta.path().exists() {
        return Err(EtlError::Generic(format!(
            "dataset directory {} already exists",
            new_meta.path().display()
        )));
    }
    fs::create_dir_all(new_meta.path())?;
    save_config(&new_meta, &config)?;

    for split in meta.existing_splits()? {
        info!("Filtering {} to {}", split, new_meta.path().display());
        let ds = ncio::read_dataset(&meta.split_path(&split))?;
        let indices: Vec<usize> = ds
            .time
            .iter()
            .enumerate()
            .filter(|(_, t)| period.contains(**t))
            .map(|(i, _)| i)
            .collect();
        let filtered = ds.select_time_indices(&indices);
        ncio::write_dataset(&filtered, &new_meta.split_path(&split))?;
        statistics::write_stats_sidecar(&filtered, &new_meta.stats_path(&split))?;
    }
    Ok(new_name)
}

/// The `p`-quantile of a variable in one split, linearly interpolated over
/// the finite values.
pub fn quantile(
    name: &str,
    base_dir: &Path,
    split: &str,
    variable: &str,
    p: f64,
) -> Result<f64> {
    if !(0.0..=1.0).contains(&p) {
        return Err(EtlError::ConfigBounds(format!(
            "quantile must be in [0, 1], got {}",
            p
        )));
    }
    let meta = DatasetMeta::new(base_dir, name);
    let ds = ncio::read_dataset(&meta.split_path(split))?;
    let var = ds.var(variable)?;

    let values: Vec<f32> = var.data.iter().copied().filter(|v| v.is_finite()).collect();
    interpolated_quantile(values, p).ok_or_else(|| {
        EtlError::Generic(format!("variable '{}' has no finite values", variable))
    })
}

/// Linearly interpolated quantile of a set of finite values.
fn interpolated_quantile(mut values: Vec<f32>, p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by(f32::total_cmp);
    let h = (values.len() - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    let frac = h - lo as f64;
    Some(f64::from(values[lo]) * (1.0 - frac) + f64::from(values[hi]) * frac)
}
