//! Nearest-neighbour regridding onto a target grid file
//!
//! The target grid is an ordinary netCDF file carrying only coordinates and
//! a grid mapping. Regridding replaces the source grid axes with the
//! target's and picks, for every target point, the value at the nearest
//! source point along each axis independently (the grids are rectilinear in
//! their own coordinate systems).

use crate::config::RegridScheme;
use crate::cube::Dataset;
use crate::errors::{EtlError, Result};
use crate::ncio;
use log::info;
use std::path::Path;

fn nearest_indices(source: &[f64], targets: &[f64]) -> Result<Vec<usize>> {
    if source.is_empty() {
        return Err(EtlError::Action {
            action: "regrid-to-target".to_string(),
            message: "source grid axis is empty".to_string(),
        });
    }
    Ok(targets
        .iter()
        .map(|&t| {
            source
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| (*a - t).abs().total_cmp(&(*b - t).abs()))
                .map(|(i, _)| i)
                .unwrap_or(0)
        })
        .collect())
}

/// Regrid onto the grid of `target_grid_path`. A dataset already at the
/// target's `resolution` attribute passes through untouched.
pub fn regrid_to_target(
    ds: Dataset,
    target_grid_path: &Path,
    scheme: RegridScheme,
) -> Result<Dataset> {
    let RegridScheme::Nn = scheme;
    let target = ncio::read_dataset(target_grid_path)?;

    let target_resolution = target.attr_text("resolution").map(str::to_string);
    if let (Some(target_res), Some(src_res)) = (&target_resolution, ds.attr_text("resolution")) {
        if src_res == target_res {
            info!("Already on the target grid resolution, nothing to do");
            return Ok(ds);
        }
    }
    info!("Regridding to target grid {}", target_grid_path.display());

    let (src_y, src_x) = ds.grid_dim_names()?;
    let (src_y, src_x) = (src_y.to_string(), src_x.to_string());
    let (tgt_y, tgt_x) = target.grid_dim_names()?;

    let y_indices = nearest_indices(&ds.coord_values(&src_y)?, &target.coord_values(tgt_y)?)?;
    let x_indices = nearest_indices(&ds.coord_values(&src_x)?, &target.coord_values(tgt_x)?)?;

    let mut out = ds
        .select_dim_indices(&src_y, &y_indices)
        .select_dim_indices(&src_x, &x_indices);

    // grid coordinates and mapping come from the target, the rest of the
    // dataset from the source
    for name in [
        "latitude",
        "longitude",
        "grid_latitude",
        "grid_longitude",
        "projection_y_coordinate",
        "projection_x_coordinate",
    ] {
        out.coords.remove(name);
        out.coords.remove(&format!("{}_bnds", name));
    }
    out.coords.remove(ds.grid_mapping_name()?);
    for (name, coord) in &target.coords {
        out.coords.insert(name.clone(), coord.clone());
    }
    if src_y != tgt_y {
        for var in out.vars.values_mut() {
            for dim in &mut var.dims {
                if *dim == src_y {
                    *dim = tgt_y.to_string();
                } else if *dim == src_x {
                    *dim = tgt_x.to_string();
                }
            }
        }
    }
    for var in out.vars.values_mut() {
        var.attrs.insert(
            "grid_mapping".to_string(),
            target.grid_mapping_name()?.into(),
        );
    }

    if let Some(domain) = target.attr_text("domain") {
        let domain = domain.to_string();
        out.set_attr("domain", domain);
    }
    if let Some(target_res) = target_resolution {
        let resolution = match out.attr_text("resolution") {
            Some(src_res) if !src_res.is_empty() => format!("{}-{}", src_res, target_res),
            _ => target_res,
        };
        out.set_attr("resolution", resolution);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_index_lookup() {
        let source = vec![0.0, 1.0, 2.0, 3.0];
        let targets = vec![-0.4, 1.1, 2.6];
        assert_eq!(nearest_indices(&source, &targets).unwrap(), vec![0, 1, 3]);
        assert!(nearest_indices(&[], &targets).is_err());
    }
}
