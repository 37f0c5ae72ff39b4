//! Single-variable ETL
//!
//! Builds one derived variable for one meteorological year and ensemble
//! member: open the configured source variables, strip source-model
//! leftovers, run the action chain, assign configured attributes, validate
//! and save the yearly netCDF file alongside a copy of the config that
//! produced it.

use crate::calendar::{CALENDAR, DAYS_PER_YEAR, TIME_UNITS};
use crate::config::VariableConfig;
use crate::cube::{Dataset, TIME_DIM};
use crate::errors::{EtlError, Result};
use crate::metadata::VariableMeta;
use crate::{actions, ncio};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

/// Coordinates attached by the source model's forecast machinery, dropped
/// on open.
const FORECAST_VARS: [&str; 4] = [
    "forecast_period",
    "forecast_reference_time",
    "forecast_period_bnds",
    "realization",
];

fn remove_forecast(ds: &mut Dataset) {
    ds.drop_vars(&FORECAST_VARS.map(String::from));
}

/// Pressure-level source files carry the level as a scalar coordinate that
/// must not leak into the derived variable.
fn remove_pressure(ds: &mut Dataset) {
    ds.drop_vars(&["pressure".to_string()]);
}

fn open_source(
    config: &VariableConfig,
    src_variable: &str,
    year: i64,
    scenario: &str,
    ensemble_member: &str,
    input_base_dir: &Path,
) -> Result<Dataset> {
    let meta = VariableMeta {
        base_dir: input_base_dir.to_path_buf(),
        variable: src_variable.to_string(),
        frequency: config.sources.frequency.clone(),
        domain: config.sources.domain.clone(),
        resolution: config.sources.resolution.clone(),
        ensemble_member: ensemble_member.to_string(),
        scenario: scenario.to_string(),
        collection: config.sources.collection.clone(),
    };
    let path = meta.filepath(year);
    info!("Opening {}", path.display());
    let mut ds = ncio::read_dataset(&path)?;
    remove_forecast(&mut ds);
    remove_pressure(&mut ds);
    Ok(ds)
}

fn process(mut ds: Dataset, config: &VariableConfig, base_dir: &Path) -> Result<Dataset> {
    for step in &config.spec {
        ds = actions::apply(ds, step, base_dir)?;
    }
    let var = ds.var_mut(&config.variable)?;
    for (name, value) in &config.attrs {
        var.attrs.insert(name.clone(), value.as_str().into());
    }
    Ok(ds)
}

fn check_created(ds: &Dataset, config: &VariableConfig, path: &Path) -> Result<()> {
    let mut failures = Vec::new();
    if ds.attr_text("frequency") == Some("day") && ds.time.len() != DAYS_PER_YEAR as usize {
        failures.push(format!(
            "expected {} daily timesteps, found {}",
            DAYS_PER_YEAR,
            ds.time.len()
        ));
    }
    let nan_count = ds.var(&config.variable)?.nan_count();
    if nan_count > 0 {
        failures.push(format!("{} NaNs in {}", nan_count, config.variable));
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(EtlError::Validation {
            path: path.to_path_buf(),
            failures,
        })
    }
}

/// Build and save one derived variable file. Returns the output path.
#[allow(clippy::too_many_arguments)]
pub fn create(
    config: &VariableConfig,
    year: i64,
    scenario: &str,
    ensemble_member: &str,
    input_base_dir: &Path,
    output_base_dir: &Path,
    validate: bool,
) -> Result<PathBuf> {
    let mut combined: Option<Dataset> = None;
    for source in &config.sources.variables {
        let ds = open_source(
            config,
            &source.name,
            year,
            scenario,
            ensemble_member,
            input_base_dir,
        )?;
        combined = Some(match combined {
            Some(acc) => acc.merge(ds)?,
            None => ds,
        });
    }
    let mut ds = combined.ok_or_else(|| {
        EtlError::ConfigBounds("variable config lists no source variables".to_string())
    })?;

    ds.set_attr("domain", config.sources.domain.as_str());
    ds.set_attr("resolution", config.sources.resolution.as_str());
    ds.set_attr("frequency", config.sources.frequency.as_str());

    let ds = process(ds, config, input_base_dir)?;

    let out_meta = VariableMeta {
        base_dir: output_base_dir.to_path_buf(),
        variable: config.variable.clone(),
        frequency: ds
            .attr_text("frequency")
            .unwrap_or(&config.sources.frequency)
            .to_string(),
        domain: ds
            .attr_text("domain")
            .unwrap_or(&config.sources.domain)
            .to_string(),
        resolution: ds
            .attr_text("resolution")
            .unwrap_or(&config.sources.resolution)
            .to_string(),
        ensemble_member: ensemble_member.to_string(),
        scenario: scenario.to_string(),
        collection: config.sources.collection.clone(),
    };
    let out_path = out_meta.filepath(year);

    if validate {
        check_created(&ds, config, &out_path)?;
    }

    info!("Saving data to {}", out_path.display());
    ncio::write_dataset(&ds, &out_path)?;

    let sidecar = out_meta
        .dirpath()
        .join(format!("{}-{}.yml", config.variable, year));
    fs::write(sidecar, serde_yaml::to_string(config)?)?;
    Ok(out_path)
}

/// Check the yearly files of a derived variable on disk. Returns file stem
/// to failure descriptions; an empty map means everything checks out.
pub fn validate(
    meta: &VariableMeta,
    years: impl Iterator<Item = i64>,
) -> Result<std::collections::BTreeMap<i64, Vec<String>>> {
    let mut failures = std::collections::BTreeMap::new();
    for year in years {
        let path = meta.filepath(year);
        let mut file_failures = Vec::new();
        if !path.is_file() {
            failures.insert(year, vec!["no file".to_string()]);
            continue;
        }
        check_variable_file(&path, &meta.variable, &meta.frequency, &mut file_failures)?;
        if !file_failures.is_empty() {
            failures.insert(year, file_failures);
        }
    }
    Ok(failures)
}

fn str_attr(var: &netcdf::Variable, name: &str) -> Option<String> {
    var.attribute(name).and_then(|a| match a.value().ok()? {
        netcdf::AttributeValue::Str(s) => Some(s),
        _ => None,
    })
}

fn check_variable_file(
    path: &Path,
    variable: &str,
    frequency: &str,
    failures: &mut Vec<String>,
) -> Result<()> {
    let file = netcdf::open(path)?;

    match file.variable(TIME_DIM) {
        Some(time_var) => {
            if frequency == "day" && time_var.len() != DAYS_PER_YEAR as usize {
                failures.push(format!(
                    "expected {} daily timesteps, found {}",
                    DAYS_PER_YEAR,
                    time_var.len()
                ));
            }
            if str_attr(&time_var, "units").as_deref() != Some(TIME_UNITS)
                || str_attr(&time_var, "calendar").as_deref() != Some(CALENDAR)
            {
                failures.push("bad time encoding".to_string());
            }
        }
        None => failures.push("no time axis".to_string()),
    }

    if file.variable("time_bnds").is_none() {
        failures.push("no time_bnds".to_string());
    }

    match file.variable(variable) {
        Some(var) => {
            let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
            let expected: &[&str] = match str_attr(&var, "grid_mapping").as_deref() {
                Some("rotated_latitude_longitude") => {
                    &[TIME_DIM, "grid_latitude", "grid_longitude"]
                }
                Some("latitude_longitude") => &[TIME_DIM, "latitude", "longitude"],
                Some("transverse_mercator") => {
                    &[TIME_DIM, "projection_y_coordinate", "projection_x_coordinate"]
                }
                _ => {
                    failures.push("unknown or missing grid_mapping".to_string());
                    &[]
                }
            };
            if !expected.is_empty() && dims.iter().map(String::as_str).ne(expected.iter().copied())
            {
                failures.push(format!("bad dimensions [{}]", dims.join(", ")));
            }
            let values: Vec<f32> = var.get_values::<f32, _>(..)?;
            let nan_count = values.iter().filter(|v| v.is_nan()).count();
            if nan_count > 0 {
                failures.push(format!("{} NaNs in {}", nan_count, variable));
            }
        }
        None => failures.push(format!("missing variable {}", variable)),
    }

    for forbidden in FORECAST_VARS.iter().chain(std::iter::once(&"pressure")) {
        if file.variable(forbidden).is_some() {
            failures.push(format!("leftover variable {}", forbidden));
        }
    }

    Ok(())
}
