//! Elementwise derivation of new variables.

use crate::cube::{DataVar, Dataset};
use crate::errors::{EtlError, Result};
use log::info;

fn check_same_dims(action: &str, ds: &Dataset, names: &[&str]) -> Result<()> {
    let first = ds.var(names[0])?;
    for name in &names[1..] {
        let var = ds.var(name)?;
        if var.dims != first.dims || var.data.shape() != first.data.shape() {
            return Err(EtlError::Action {
                action: action.to_string(),
                message: format!(
                    "'{}' and '{}' have different shapes",
                    names[0], name
                ),
            });
        }
    }
    Ok(())
}

/// Add a variable holding the elementwise sum of the named sources.
pub fn sum(mut ds: Dataset, variables: &[String], name: &str) -> Result<Dataset> {
    info!("Summing {:?} into {}", variables, name);
    if variables.is_empty() {
        return Err(EtlError::Action {
            action: "sum".to_string(),
            message: "no source variables given".to_string(),
        });
    }
    let refs: Vec<&str> = variables.iter().map(String::as_str).collect();
    check_same_dims("sum", &ds, &refs)?;

    let first = ds.var(&variables[0])?;
    let mut data = first.data.clone();
    let dims = first.dims.clone();
    let attrs = first.attrs.clone();
    for source in &variables[1..] {
        data += &ds.var(source)?.data;
    }
    let mut var = DataVar::new(dims, data);
    var.attrs = attrs;
    ds.vars.insert(name.to_string(), var);
    Ok(ds)
}

/// Add a variable holding the elementwise difference `left - right`.
pub fn diff(mut ds: Dataset, left: &str, right: &str, name: &str) -> Result<Dataset> {
    info!("Differencing {} - {} into {}", left, right, name);
    check_same_dims("diff", &ds, &[left, right])?;

    let lhs = ds.var(left)?;
    let dims = lhs.dims.clone();
    let attrs = lhs.attrs.clone();
    let data = &lhs.data - &ds.var(right)?.data;
    let mut var = DataVar::new(dims, data);
    var.attrs = attrs;
    ds.vars.insert(name.to_string(), var);
    Ok(ds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::tests::grid_dataset;

    fn with_second_var(mut ds: Dataset, name: &str, offset: f32) -> Dataset {
        let mut var = ds.var("pr").unwrap().clone();
        var.data += offset;
        ds.vars.insert(name.to_string(), var);
        ds
    }

    #[test]
    fn sum_and_diff() {
        let ds = with_second_var(grid_dataset(2, 2), "snow", 1.0);
        let ds = sum(ds, &["pr".to_string(), "snow".to_string()], "precip").unwrap();
        assert_eq!(ds.var("precip").unwrap().data[[0, 0, 0]], 1.0);

        let ds = diff(ds, "snow", "pr", "delta").unwrap();
        assert!(ds
            .var("delta")
            .unwrap()
            .data
            .iter()
            .all(|&v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn missing_source_is_rejected() {
        let ds = grid_dataset(2, 2);
        assert!(sum(ds.clone(), &["pr".to_string(), "nope".to_string()], "x").is_err());
        assert!(diff(ds, "pr", "nope", "x").is_err());
    }
}
