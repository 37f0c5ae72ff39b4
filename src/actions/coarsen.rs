//! Block-mean coarsening over the grid dimensions.

use crate::cube::Dataset;
use crate::errors::{EtlError, Result};
use log::info;
use ndarray::{ArrayD, IxDyn, Slice};

fn check_divisible(dim: &str, len: usize, factor: usize) -> Result<()> {
    if len % factor != 0 {
        return Err(EtlError::Action {
            action: "coarsen".to_string(),
            message: format!(
                "{} length {} is not divisible by factor {}",
                dim, len, factor
            ),
        });
    }
    Ok(())
}

/// Mean over `factor` x `factor` blocks of an array along the given axes,
/// skipping NaN cells. A block with no finite cell stays NaN.
fn block_mean_f32(data: &ArrayD<f32>, axes: &[usize], factor: usize) -> ArrayD<f32> {
    let mut shape: Vec<usize> = data.shape().to_vec();
    for &axis in axes {
        shape[axis] /= factor;
    }
    let mut sum = ArrayD::<f64>::zeros(IxDyn(&shape));
    let mut count = ArrayD::<f64>::zeros(IxDyn(&shape));

    let mut offsets: Vec<Vec<usize>> = vec![Vec::new()];
    for _ in axes {
        offsets = offsets
            .iter()
            .flat_map(|prefix| {
                (0..factor).map(move |o| {
                    let mut next = prefix.clone();
                    next.push(o);
                    next
                })
            })
            .collect();
    }

    for offset in &offsets {
        let mut view = data.view();
        for (&axis, &o) in axes.iter().zip(offset) {
            view.slice_axis_inplace(
                ndarray::Axis(axis),
                Slice::new(o as isize, None, factor as isize),
            );
        }
        ndarray::Zip::from(&mut sum)
            .and(&mut count)
            .and(&view)
            .for_each(|s, c, &v| {
                if v.is_finite() {
                    *s += f64::from(v);
                    *c += 1.0;
                }
            });
    }

    ndarray::Zip::from(&sum)
        .and(&count)
        .map_collect(|&s, &c| if c > 0.0 { (s / c) as f32 } else { f32::NAN })
}

fn block_mean_f64(values: &ArrayD<f64>, axes: &[usize], factor: usize) -> ArrayD<f64> {
    let mut shape: Vec<usize> = values.shape().to_vec();
    for &axis in axes {
        shape[axis] /= factor;
    }
    let mut sum = ArrayD::<f64>::zeros(IxDyn(&shape));
    let mut offsets: Vec<Vec<usize>> = vec![Vec::new()];
    for _ in axes {
        offsets = offsets
            .iter()
            .flat_map(|prefix| {
                (0..factor).map(move |o| {
                    let mut next = prefix.clone();
                    next.push(o);
                    next
                })
            })
            .collect();
    }
    for offset in &offsets {
        let mut view = values.view();
        for (&axis, &o) in axes.iter().zip(offset) {
            view.slice_axis_inplace(
                ndarray::Axis(axis),
                Slice::new(o as isize, None, factor as isize),
            );
        }
        sum += &view;
    }
    sum / offsets.len() as f64
}

/// Downsample every gridded variable and coordinate by an integer factor.
pub fn coarsen(ds: Dataset, factor: usize) -> Result<Dataset> {
    info!("Coarsening by {}x", factor);
    let (y_dim, x_dim) = ds.grid_dim_names()?;
    let (y_dim, x_dim) = (y_dim.to_string(), x_dim.to_string());
    let mut ds = ds;

    for (name, var) in &mut ds.vars {
        let axes: Vec<usize> = var
            .dims
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == y_dim || **d == x_dim)
            .map(|(i, _)| i)
            .collect();
        if axes.is_empty() {
            continue;
        }
        for &axis in &axes {
            check_divisible(&var.dims[axis], var.data.shape()[axis], factor)?;
        }
        info!("Coarsening variable {}", name);
        var.data = block_mean_f32(&var.data, &axes, factor);
    }

    for coord in ds.coords.values_mut() {
        let axes: Vec<usize> = coord
            .dims
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == y_dim || **d == x_dim)
            .map(|(i, _)| i)
            .collect();
        if axes.is_empty() {
            continue;
        }
        for &axis in &axes {
            check_divisible(&coord.dims[axis], coord.values.shape()[axis], factor)?;
        }
        coord.values = block_mean_f64(&coord.values, &axes, factor);
    }

    let resolution = ds
        .attr_text("resolution")
        .map(|r| format!("{}-coarsened-{}x", r, factor))
        .unwrap_or_else(|| format!("coarsened-{}x", factor));
    ds.set_attr("resolution", resolution);
    Ok(ds)
}
