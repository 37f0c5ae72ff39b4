//! In-memory dataset model.
//!
//! A [`Dataset`] is the unit every pipeline stage consumes and returns: a
//! shared time axis in the 360-day calendar, named coordinate arrays, f32
//! data variables and typed attributes. It is deliberately much smaller
//! than a general array database: variables are laid out as
//! `(ensemble_member, time, y, x)` (the leading ensemble axis only after
//! member stacking) and coordinates are f64.

use crate::calendar::CDateTime;
use crate::errors::{EtlError, Result};
use ndarray::{concatenate, ArrayD, Axis, IxDyn};
use std::collections::{BTreeMap, BTreeSet};

/// Dimension name of the time axis.
pub const TIME_DIM: &str = "time";

/// Dimension name of the ensemble axis added by member stacking.
pub const ENSEMBLE_DIM: &str = "ensemble_member";

/// Global attribute carrying the stacked member ids.
pub const ENSEMBLE_ATTR: &str = "ensemble_members";

/// A typed netCDF-style attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Text(String),
    Float(f32),
}

impl AttrValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            AttrValue::Float(_) => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            AttrValue::Float(v) => Some(*v),
            AttrValue::Text(_) => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

impl From<f32> for AttrValue {
    fn from(v: f32) -> Self {
        AttrValue::Float(v)
    }
}

pub type Attrs = BTreeMap<String, AttrValue>;

/// A coordinate array: grid coordinates, their bounds, grid-mapping dummy
/// variables (scalar, empty dims) and the derived `season` coordinate.
#[derive(Debug, Clone)]
pub struct Coord {
    pub dims: Vec<String>,
    pub values: ArrayD<f64>,
    pub attrs: Attrs,
}

impl Coord {
    pub fn new_1d(dim: &str, values: Vec<f64>) -> Self {
        Coord {
            dims: vec![dim.to_string()],
            values: ndarray::Array1::from_vec(values).into_dyn(),
            attrs: Attrs::new(),
        }
    }

    /// A dimensionless dummy variable carrying grid-mapping attributes.
    pub fn new_scalar() -> Self {
        Coord {
            dims: Vec::new(),
            values: ArrayD::zeros(IxDyn(&[])),
            attrs: Attrs::new(),
        }
    }

    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }
}

/// A data variable.
#[derive(Debug, Clone)]
pub struct DataVar {
    pub dims: Vec<String>,
    pub data: ArrayD<f32>,
    pub attrs: Attrs,
}

impl DataVar {
    pub fn new(dims: Vec<String>, data: ArrayD<f32>) -> Self {
        DataVar {
            dims,
            data,
            attrs: Attrs::new(),
        }
    }

    pub fn time_axis(&self) -> Option<usize> {
        self.dims.iter().position(|d| d == TIME_DIM)
    }

    pub fn nan_count(&self) -> usize {
        self.data.iter().filter(|v| v.is_nan()).count()
    }
}

/// The in-memory dataset.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub time: Vec<CDateTime>,
    pub time_bnds: Option<Vec<(CDateTime, CDateTime)>>,
    /// Member ids once stacked along [`ENSEMBLE_DIM`]; empty otherwise.
    pub ensemble_members: Vec<String>,
    pub coords: BTreeMap<String, Coord>,
    pub vars: BTreeMap<String, DataVar>,
    pub attrs: Attrs,
}

impl Dataset {
    pub fn attr_text(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).and_then(AttrValue::as_text)
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<AttrValue>) {
        self.attrs.insert(name.to_string(), value.into());
    }

    pub fn var(&self, name: &str) -> Result<&DataVar> {
        self.vars.get(name).ok_or_else(|| EtlError::VariableNotFound {
            var: name.to_string(),
        })
    }

    pub fn var_mut(&mut self, name: &str) -> Result<&mut DataVar> {
        self.vars.get_mut(name).ok_or_else(|| EtlError::VariableNotFound {
            var: name.to_string(),
        })
    }

    /// The CF grid-mapping name, detected from the scalar coordinate
    /// variables present in the dataset.
    pub fn grid_mapping_name(&self) -> Result<&str> {
        for candidate in [
            "rotated_latitude_longitude",
            "latitude_longitude",
            "transverse_mercator",
        ] {
            if self.coords.contains_key(candidate) {
                return Ok(candidate);
            }
        }
        Err(EtlError::CoordNotFound {
            coord: "grid mapping".to_string(),
        })
    }

    /// Names of the (y, x) grid dimensions for the dataset's grid mapping.
    pub fn grid_dim_names(&self) -> Result<(&'static str, &'static str)> {
        match self.grid_mapping_name()? {
            "rotated_latitude_longitude" => Ok(("grid_latitude", "grid_longitude")),
            "latitude_longitude" => Ok(("latitude", "longitude")),
            "transverse_mercator" => {
                Ok(("projection_y_coordinate", "projection_x_coordinate"))
            }
            other => Err(EtlError::Generic(format!("unknown grid mapping {}", other))),
        }
    }

    /// 1-D values of a named coordinate.
    pub fn coord_values(&self, name: &str) -> Result<Vec<f64>> {
        let coord = self.coords.get(name).ok_or_else(|| EtlError::CoordNotFound {
            coord: name.to_string(),
        })?;
        Ok(coord.values.iter().copied().collect())
    }

    /// Subset along the time axis by position, preserving order of `indices`.
    pub fn select_time_indices(&self, indices: &[usize]) -> Dataset {
        let time = indices.iter().map(|&i| self.time[i]).collect();
        let time_bnds = self
            .time_bnds
            .as_ref()
            .map(|bnds| indices.iter().map(|&i| bnds[i]).collect());

        let mut vars = BTreeMap::new();
        for (name, var) in &self.vars {
            let data = match var.time_axis() {
                Some(axis) => var.data.select(Axis(axis), indices),
                None => var.data.clone(),
            };
            vars.insert(
                name.clone(),
                DataVar {
                    dims: var.dims.clone(),
                    data,
                    attrs: var.attrs.clone(),
                },
            );
        }

        let mut coords = BTreeMap::new();
        for (name, coord) in &self.coords {
            let values = match coord.dims.iter().position(|d| d == TIME_DIM) {
                Some(axis) => coord.values.select(Axis(axis), indices),
                None => coord.values.clone(),
            };
            coords.insert(
                name.clone(),
                Coord {
                    dims: coord.dims.clone(),
                    values,
                    attrs: coord.attrs.clone(),
                },
            );
        }

        Dataset {
            time,
            time_bnds,
            ensemble_members: self.ensemble_members.clone(),
            coords,
            vars,
            attrs: self.attrs.clone(),
        }
    }

    /// Subset along an arbitrary dimension by position. Variables and
    /// coordinates without that dimension pass through unchanged; indices
    /// may repeat, which nearest-neighbour regridding relies on.
    pub fn select_dim_indices(&self, dim: &str, indices: &[usize]) -> Dataset {
        if dim == TIME_DIM {
            return self.select_time_indices(indices);
        }
        let mut out = self.clone();
        for var in out.vars.values_mut() {
            if let Some(axis) = var.dims.iter().position(|d| d == dim) {
                var.data = var.data.select(Axis(axis), indices);
            }
        }
        for coord in out.coords.values_mut() {
            if let Some(axis) = coord.dims.iter().position(|d| d == dim) {
                coord.values = coord.values.select(Axis(axis), indices);
            }
        }
        out
    }

    /// Subset to the timestamps whose day matches one of `days`
    /// (day-granularity membership, so sub-daily steps of a selected day
    /// are all kept).
    pub fn select_days(&self, days: &BTreeSet<CDateTime>) -> Dataset {
        let indices: Vec<usize> = self
            .time
            .iter()
            .enumerate()
            .filter(|(_, t)| days.contains(&t.floor_day()))
            .map(|(i, _)| i)
            .collect();
        self.select_time_indices(&indices)
    }

    /// Concatenate datasets along time. Variables, coordinate layout and
    /// member stacking must agree; global attributes come from the first
    /// part, dropping any key whose value conflicts later.
    pub fn concat_time(parts: &[Dataset]) -> Result<Dataset> {
        let first = parts
            .first()
            .ok_or_else(|| EtlError::Generic("cannot concatenate zero datasets".to_string()))?;

        let mut time = Vec::new();
        let mut time_bnds = first.time_bnds.as_ref().map(|_| Vec::new());
        for part in parts {
            if part.ensemble_members != first.ensemble_members {
                return Err(EtlError::Generic(
                    "cannot concatenate datasets with different ensemble members".to_string(),
                ));
            }
            time.extend_from_slice(&part.time);
            if let (Some(all), Some(bnds)) = (time_bnds.as_mut(), part.time_bnds.as_ref()) {
                all.extend_from_slice(bnds);
            } else if time_bnds.is_some() {
                time_bnds = None;
            }
        }

        let mut vars = BTreeMap::new();
        for (name, var) in &first.vars {
            let data = match var.time_axis() {
                Some(axis) => {
                    let mut views = Vec::with_capacity(parts.len());
                    for part in parts {
                        views.push(part.var(name)?.data.view());
                    }
                    concatenate(Axis(axis), &views)?
                }
                None => var.data.clone(),
            };
            vars.insert(
                name.clone(),
                DataVar {
                    dims: var.dims.clone(),
                    data,
                    attrs: var.attrs.clone(),
                },
            );
        }

        let mut coords = BTreeMap::new();
        for (name, coord) in &first.coords {
            let values = match coord.dims.iter().position(|d| d == TIME_DIM) {
                Some(axis) => {
                    let mut views = Vec::with_capacity(parts.len());
                    for part in parts {
                        let c = part.coords.get(name).ok_or_else(|| EtlError::CoordNotFound {
                            coord: name.clone(),
                        })?;
                        views.push(c.values.view());
                    }
                    concatenate(Axis(axis), &views)?
                }
                None => coord.values.clone(),
            };
            coords.insert(
                name.clone(),
                Coord {
                    dims: coord.dims.clone(),
                    values,
                    attrs: coord.attrs.clone(),
                },
            );
        }

        let mut attrs = first.attrs.clone();
        for part in &parts[1..] {
            attrs.retain(|key, value| part.attrs.get(key) == Some(value));
        }

        Ok(Dataset {
            time,
            time_bnds,
            ensemble_members: first.ensemble_members.clone(),
            coords,
            vars,
            attrs,
        })
    }

    /// Merge the variables of `other` into `self`. Time axes must match
    /// exactly; clashing variable names are an error.
    pub fn merge(mut self, other: Dataset) -> Result<Dataset> {
        if self.time != other.time {
            return Err(EtlError::Generic(
                "cannot merge datasets with different time axes".to_string(),
            ));
        }
        for (name, var) in other.vars {
            if self.vars.contains_key(&name) {
                return Err(EtlError::Generic(format!(
                    "variable '{}' exists in both datasets being merged",
                    name
                )));
            }
            self.vars.insert(name, var);
        }
        for (name, coord) in other.coords {
            self.coords.entry(name).or_insert(coord);
        }
        if self.time_bnds.is_none() {
            self.time_bnds = other.time_bnds;
        }
        self.attrs
            .retain(|key, value| other.attrs.get(key).map(|v| v == value).unwrap_or(true));
        Ok(self)
    }

    /// Stack single-member datasets along a new leading ensemble axis.
    /// Time axes must match exactly.
    pub fn stack_members(members: Vec<(String, Dataset)>) -> Result<Dataset> {
        let (_, first) = members
            .first()
            .ok_or_else(|| EtlError::Generic("cannot stack zero members".to_string()))?;
        if !first.ensemble_members.is_empty() {
            return Err(EtlError::Generic(
                "datasets being stacked already carry an ensemble axis".to_string(),
            ));
        }
        for (id, ds) in &members {
            if ds.time != first.time {
                return Err(EtlError::Generic(format!(
                    "ensemble member '{}' has a mismatched time axis",
                    id
                )));
            }
        }

        let mut vars = BTreeMap::new();
        for (name, var) in &first.vars {
            if var.time_axis().is_none() {
                vars.insert(name.clone(), var.clone());
                continue;
            }
            let expanded: Vec<ArrayD<f32>> = members
                .iter()
                .map(|(_, ds)| Ok(ds.var(name)?.data.clone().insert_axis(Axis(0))))
                .collect::<Result<_>>()?;
            let views: Vec<_> = expanded.iter().map(|a| a.view()).collect();
            let data = concatenate(Axis(0), &views)?;
            let mut dims = vec![ENSEMBLE_DIM.to_string()];
            dims.extend(var.dims.iter().cloned());
            vars.insert(
                name.clone(),
                DataVar {
                    dims,
                    data,
                    attrs: var.attrs.clone(),
                },
            );
        }

        let ids: Vec<String> = members.iter().map(|(id, _)| id.clone()).collect();
        let mut attrs = first.attrs.clone();
        attrs.insert(ENSEMBLE_ATTR.to_string(), AttrValue::Text(ids.join(",")));

        Ok(Dataset {
            time: first.time.clone(),
            time_bnds: first.time_bnds.clone(),
            ensemble_members: ids,
            coords: first.coords.clone(),
            vars,
            attrs,
        })
    }

    /// Rename a variable, coordinate or dimension throughout the dataset.
    pub fn rename(&mut self, from: &str, to: &str) {
        if let Some(var) = self.vars.remove(from) {
            self.vars.insert(to.to_string(), var);
        }
        if let Some(coord) = self.coords.remove(from) {
            self.coords.insert(to.to_string(), coord);
        }
        for var in self.vars.values_mut() {
            for dim in &mut var.dims {
                if dim == from {
                    *dim = to.to_string();
                }
            }
        }
        for coord in self.coords.values_mut() {
            for dim in &mut coord.dims {
                if dim == from {
                    *dim = to.to_string();
                }
            }
        }
    }

    /// Drop variables or coordinates by name. Unknown names are ignored.
    pub fn drop_vars(&mut self, names: &[String]) {
        for name in names {
            self.vars.remove(name);
            self.coords.remove(name);
        }
    }

    /// Per-timestep spatial sum of a variable, used for intensity ranking.
    /// With stacked members only the first member is consulted.
    pub fn spatial_sum_series(&self, var_name: &str) -> Result<Vec<f32>> {
        let var = self.var(var_name)?;
        let mut view = var.data.view();
        let mut dims: Vec<&str> = var.dims.iter().map(String::as_str).collect();
        if let Some(em_axis) = dims.iter().position(|d| *d == ENSEMBLE_DIM) {
            view = view.index_axis_move(Axis(em_axis), 0);
            dims.remove(em_axis);
        }
        let time_axis = dims
            .iter()
            .position(|d| *d == TIME_DIM)
            .ok_or_else(|| EtlError::DimensionNotFound {
                var: var_name.to_string(),
                dim: TIME_DIM.to_string(),
            })?;
        let series = (0..self.time.len())
            .map(|i| {
                view.index_axis(Axis(time_axis), i)
                    .iter()
                    .filter(|v| v.is_finite())
                    .sum()
            })
            .collect();
        Ok(series)
    }

    /// Attach the derived `season` coordinate (DJF=0 .. SON=3) over time.
    pub fn add_season_coord(&mut self) {
        let values: Vec<f64> = self
            .time
            .iter()
            .map(|t| f64::from(t.season().index()))
            .collect();
        let mut coord = Coord::new_1d(TIME_DIM, values);
        coord.attrs.insert(
            "long_name".to_string(),
            AttrValue::Text("meteorological season index (DJF=0)".to_string()),
        );
        self.coords.insert("season".to_string(), coord);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn daily_dataset(start_year: i64, ndays: usize, fill: f32) -> Dataset {
        let start = CDateTime::from_ymdh(start_year, 12, 1, 12).unwrap();
        let time: Vec<CDateTime> = (0..ndays as i64).map(|d| start.add_days(d)).collect();
        let data = ArrayD::from_elem(IxDyn(&[ndays, 2, 2]), fill);
        let mut ds = Dataset {
            time,
            ..Dataset::default()
        };
        ds.coords.insert(
            "grid_latitude".to_string(),
            Coord::new_1d("grid_latitude", vec![0.0, 1.0]),
        );
        ds.coords.insert(
            "grid_longitude".to_string(),
            Coord::new_1d("grid_longitude", vec![0.0, 1.0]),
        );
        ds.coords
            .insert("rotated_latitude_longitude".to_string(), Coord::new_scalar());
        ds.vars.insert(
            "pr".to_string(),
            DataVar::new(
                vec![
                    TIME_DIM.to_string(),
                    "grid_latitude".to_string(),
                    "grid_longitude".to_string(),
                ],
                data,
            ),
        );
        ds
    }

    #[test]
    fn select_days_keeps_subdaily_steps() {
        let mut ds = daily_dataset(1980, 4, 1.0);
        // add an extra 00:00 step on the second day
        ds.time.insert(2, ds.time[1].floor_day());
        let n = ds.time.len();
        ds.vars.get_mut("pr").unwrap().data = ArrayD::from_elem(IxDyn(&[n, 2, 2]), 1.0);

        let mut days = BTreeSet::new();
        days.insert(ds.time[1].floor_day());
        let subset = ds.select_days(&days);
        assert_eq!(subset.time.len(), 2);
        assert_eq!(subset.var("pr").unwrap().data.shape(), &[2, 2, 2]);
    }

    #[test]
    fn concat_and_stack() {
        let a = daily_dataset(1980, 3, 1.0);
        let b = daily_dataset(1981, 3, 2.0);
        let joined = Dataset::concat_time(&[a.clone(), b]).unwrap();
        assert_eq!(joined.time.len(), 6);
        assert_eq!(joined.var("pr").unwrap().data.shape(), &[6, 2, 2]);

        let stacked =
            Dataset::stack_members(vec![("01".to_string(), a.clone()), ("04".to_string(), a)])
                .unwrap();
        assert_eq!(stacked.ensemble_members, vec!["01", "04"]);
        let var = stacked.var("pr").unwrap();
        assert_eq!(var.dims[0], ENSEMBLE_DIM);
        assert_eq!(var.data.shape(), &[2, 3, 2, 2]);
        assert_eq!(stacked.attr_text(ENSEMBLE_ATTR), Some("01,04"));
    }

    #[test]
    fn stack_rejects_mismatched_time() {
        let a = daily_dataset(1980, 3, 1.0);
        let b = daily_dataset(1981, 3, 1.0);
        assert!(
            Dataset::stack_members(vec![("01".to_string(), a), ("04".to_string(), b)]).is_err()
        );
    }

    #[test]
    fn rename_updates_dims() {
        let mut ds = daily_dataset(1980, 2, 0.0);
        ds.rename("pr", "target_pr");
        assert!(ds.vars.contains_key("target_pr"));
        ds.rename("grid_latitude", "lat");
        assert!(ds.coords.contains_key("lat"));
        assert!(ds.var("target_pr").unwrap().dims.contains(&"lat".to_string()));
    }

    #[test]
    fn spatial_sum_uses_first_member() {
        let a = daily_dataset(1980, 2, 1.0);
        let b = daily_dataset(1980, 2, 3.0);
        let stacked =
            Dataset::stack_members(vec![("01".to_string(), a), ("04".to_string(), b)]).unwrap();
        let series = stacked.spatial_sum_series("pr").unwrap();
        assert_eq!(series, vec![4.0, 4.0]);
    }

    #[test]
    fn merge_rejects_clashes() {
        let a = daily_dataset(1980, 2, 1.0);
        let b = daily_dataset(1980, 2, 2.0);
        assert!(a.clone().merge(b).is_err());

        let mut c = daily_dataset(1980, 2, 2.0);
        let var = c.vars.remove("pr").unwrap();
        c.vars.insert("psl".to_string(), var);
        let merged = a.merge(c).unwrap();
        assert_eq!(merged.vars.len(), 2);
    }
}
