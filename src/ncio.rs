//! NetCDF I/O for the in-memory dataset model
//!
//! Reading classifies file variables by CF convention: the `time` axis and
//! optional `time_bnds` become the dataset's time fields, variables carrying
//! a `grid_mapping` attribute become data variables, and everything else
//! (grid coordinates, bounds, grid-mapping dummies, the `season` index) is
//! kept as a coordinate. Writing reverses the mapping and stamps the
//! 360-day calendar encoding onto the time axis.

use crate::calendar::{CALENDAR, CDateTime, TIME_UNITS};
use crate::cube::{AttrValue, Attrs, Coord, DataVar, Dataset, ENSEMBLE_ATTR, ENSEMBLE_DIM, TIME_DIM};
use crate::errors::{EtlError, Result};
use chrono::Utc;
use ndarray::{ArrayD, IxDyn};
use netcdf::AttributeValue;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const BNDS_DIM: &str = "bnds";
const TIME_BNDS_VAR: &str = "time_bnds";

fn convert_attr(value: AttributeValue) -> Option<AttrValue> {
    match value {
        AttributeValue::Str(s) => Some(AttrValue::Text(s)),
        AttributeValue::Float(v) => Some(AttrValue::Float(v)),
        AttributeValue::Double(v) => Some(AttrValue::Float(v as f32)),
        AttributeValue::Int(v) => Some(AttrValue::Float(v as f32)),
        AttributeValue::Short(v) => Some(AttrValue::Float(f32::from(v))),
        _ => None,
    }
}

fn read_attrs<'a>(attrs: impl Iterator<Item = netcdf::Attribute<'a>>) -> Result<Attrs> {
    let mut out = Attrs::new();
    for attr in attrs {
        if let Some(value) = convert_attr(attr.value()?) {
            out.insert(attr.name().to_string(), value);
        }
    }
    Ok(out)
}

fn put_attrs(var: &mut netcdf::VariableMut, attrs: &Attrs) -> Result<()> {
    for (name, value) in attrs {
        match value {
            AttrValue::Text(s) => var.put_attribute(name, s.as_str())?,
            AttrValue::Float(v) => var.put_attribute(name, *v)?,
        };
    }
    Ok(())
}

/// Read a dataset from a netCDF file.
pub fn read_dataset(path: &Path) -> Result<Dataset> {
    let file = netcdf::open(path)?;

    let time_var = file.variable(TIME_DIM).ok_or_else(|| EtlError::VariableNotFound {
        var: TIME_DIM.to_string(),
    })?;
    let time: Vec<CDateTime> = time_var
        .get_values::<f64, _>(..)?
        .into_iter()
        .map(CDateTime::from_f64_hours)
        .collect();

    let time_bnds = match file.variable(TIME_BNDS_VAR) {
        Some(var) => {
            let raw: Vec<f64> = var.get_values::<f64, _>(..)?;
            if raw.len() != time.len() * 2 {
                return Err(EtlError::Generic(format!(
                    "time_bnds in {} has {} values for {} timesteps",
                    path.display(),
                    raw.len(),
                    time.len()
                )));
            }
            Some(
                raw.chunks_exact(2)
                    .map(|pair| {
                        (
                            CDateTime::from_f64_hours(pair[0]),
                            CDateTime::from_f64_hours(pair[1]),
                        )
                    })
                    .collect(),
            )
        }
        None => None,
    };

    let mut coords = BTreeMap::new();
    let mut vars = BTreeMap::new();
    for var in file.variables() {
        let name = var.name().to_string();
        if name == TIME_DIM || name == TIME_BNDS_VAR {
            continue;
        }
        let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
        let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
        let attrs = read_attrs(var.attributes())?;

        let is_data_var = attrs.contains_key("grid_mapping");
        if is_data_var {
            let raw: Vec<f32> = var.get_values::<f32, _>(..)?;
            let data = ArrayD::from_shape_vec(IxDyn(&shape), raw)?;
            vars.insert(name, DataVar { dims, data, attrs });
        } else {
            let raw: Vec<f64> = var.get_values::<f64, _>(..)?;
            let values = ArrayD::from_shape_vec(IxDyn(&shape), raw)?;
            coords.insert(name, Coord { dims, values, attrs });
        }
    }

    let attrs = read_attrs(file.attributes())?;
    let ensemble_members = attrs
        .get(ENSEMBLE_ATTR)
        .and_then(AttrValue::as_text)
        .map(|s| s.split(',').map(str::to_string).collect())
        .unwrap_or_default();

    Ok(Dataset {
        time,
        time_bnds,
        ensemble_members,
        coords,
        vars,
        attrs,
    })
}

fn collect_dims(ds: &Dataset) -> Result<BTreeMap<String, usize>> {
    let mut dims = BTreeMap::new();
    dims.insert(TIME_DIM.to_string(), ds.time.len());
    if ds.time_bnds.is_some() {
        dims.insert(BNDS_DIM.to_string(), 2);
    }
    if !ds.ensemble_members.is_empty() {
        dims.insert(ENSEMBLE_DIM.to_string(), ds.ensemble_members.len());
    }
    let entries = ds
        .coords
        .iter()
        .map(|(n, c)| (n, &c.dims, c.values.shape()))
        .chain(ds.vars.iter().map(|(n, v)| (n, &v.dims, v.data.shape())));
    for (name, var_dims, shape) in entries {
        if var_dims.len() != shape.len() {
            return Err(EtlError::Generic(format!(
                "variable '{}' names {} dimensions but has rank {}",
                name,
                var_dims.len(),
                shape.len()
            )));
        }
        for (dim, &len) in var_dims.iter().zip(shape) {
            match dims.get(dim) {
                Some(&existing) if existing != len => {
                    return Err(EtlError::Generic(format!(
                        "dimension '{}' has conflicting lengths {} and {}",
                        dim, existing, len
                    )));
                }
                _ => {
                    dims.insert(dim.clone(), len);
                }
            }
        }
    }
    Ok(dims)
}

/// Write a dataset to a netCDF file, replacing any existing file.
pub fn write_dataset(ds: &Dataset, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    if path.exists() {
        fs::remove_file(path)?;
    }

    let mut file = netcdf::create(path)?;
    for (name, len) in collect_dims(ds)? {
        file.add_dimension(&name, len)?;
    }

    let mut time_var = file.add_variable::<f64>(TIME_DIM, &[TIME_DIM])?;
    let time_values: Vec<f64> = ds.time.iter().map(|t| t.as_f64_hours()).collect();
    time_var.put_values(&time_values, ..)?;
    time_var.put_attribute("units", TIME_UNITS)?;
    time_var.put_attribute("calendar", CALENDAR)?;
    time_var.put_attribute("standard_name", "time")?;
    if ds.time_bnds.is_some() {
        time_var.put_attribute("bounds", TIME_BNDS_VAR)?;
    }

    if let Some(bnds) = &ds.time_bnds {
        let mut bnds_var = file.add_variable::<f64>(TIME_BNDS_VAR, &[TIME_DIM, BNDS_DIM])?;
        let values: Vec<f64> = bnds
            .iter()
            .flat_map(|(lo, hi)| [lo.as_f64_hours(), hi.as_f64_hours()])
            .collect();
        bnds_var.put_values(&values, ..)?;
    }

    for (name, coord) in &ds.coords {
        let dim_refs: Vec<&str> = coord.dims.iter().map(String::as_str).collect();
        let mut var = if coord.is_scalar() {
            // grid-mapping dummy, written as an attribute-only int
            file.add_variable::<i32>(name, &[])?
        } else {
            let mut var = file.add_variable::<f64>(name, &dim_refs)?;
            var.put(coord.values.view(), ..)?;
            var
        };
        put_attrs(&mut var, &coord.attrs)?;
    }

    for (name, data_var) in &ds.vars {
        let dim_refs: Vec<&str> = data_var.dims.iter().map(String::as_str).collect();
        let mut var = file.add_variable::<f32>(name, &dim_refs)?;
        var.put(data_var.data.as_standard_layout().view(), ..)?;
        put_attrs(&mut var, &data_var.attrs)?;
        if !data_var.attrs.contains_key("grid_mapping") {
            var.put_attribute("grid_mapping", ds.grid_mapping_name()?)?;
        }
    }

    for (name, value) in &ds.attrs {
        match value {
            AttrValue::Text(s) => file.add_attribute(name, s.as_str())?,
            AttrValue::Float(v) => file.add_attribute(name, *v)?,
        };
    }
    if !ds.attrs.contains_key("history") {
        file.add_attribute(
            "history",
            format!("Created by climate-etl on {}", Utc::now().to_rfc3339()),
        )?;
    }

    Ok(())
}
