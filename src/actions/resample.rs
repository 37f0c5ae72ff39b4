//! Temporal resampling to daily frequency.

use crate::cube::Dataset;
use crate::errors::{EtlError, Result};
use log::info;
use ndarray::{ArrayD, Axis, IxDyn};

/// Resample sub-daily data to daily means. Timestamps become day starts and
/// `time_bnds` span each whole day; cells with no finite sample stay NaN.
pub fn resample(ds: Dataset, frequency: &str) -> Result<Dataset> {
    if frequency != "day" {
        return Err(EtlError::Action {
            action: "resample".to_string(),
            message: format!("unknown target frequency '{}'", frequency),
        });
    }
    info!("Resampling to {}", frequency);

    // group timestep indices by day, in axis order
    let mut groups: Vec<(crate::calendar::CDateTime, Vec<usize>)> = Vec::new();
    for (i, t) in ds.time.iter().enumerate() {
        let day = t.floor_day();
        match groups.last_mut() {
            Some((last_day, indices)) if *last_day == day => indices.push(i),
            _ => groups.push((day, vec![i])),
        }
    }

    let mut out = ds.select_time_indices(
        &groups.iter().map(|(_, indices)| indices[0]).collect::<Vec<_>>(),
    );
    out.time = groups.iter().map(|(day, _)| *day).collect();
    out.time_bnds = Some(groups.iter().map(|(day, _)| (*day, day.add_days(1))).collect());

    for (name, var) in &mut out.vars {
        let source = ds.var(name)?;
        let axis = match source.time_axis() {
            Some(axis) => axis,
            None => continue,
        };
        let mut shape: Vec<usize> = source.data.shape().to_vec();
        shape[axis] = groups.len();
        let mut mean = ArrayD::<f32>::zeros(IxDyn(&shape));
        for (out_idx, (_, indices)) in groups.iter().enumerate() {
            let mut sum = ArrayD::<f64>::zeros(
                source.data.index_axis(Axis(axis), indices[0]).raw_dim(),
            );
            let mut count = ArrayD::<f64>::zeros(sum.raw_dim());
            for &i in indices {
                let step = source.data.index_axis(Axis(axis), i);
                ndarray::Zip::from(&mut sum)
                    .and(&mut count)
                    .and(&step)
                    .for_each(|s, c, &v| {
                        if v.is_finite() {
                            *s += f64::from(v);
                            *c += 1.0;
                        }
                    });
            }
            let day_mean = ndarray::Zip::from(&sum)
                .and(&count)
                .map_collect(|&s, &c| if c > 0.0 { (s / c) as f32 } else { f32::NAN });
            mean.index_axis_mut(Axis(axis), out_idx).assign(&day_mean);
        }
        var.data = mean;
    }

    out.set_attr("frequency", "day");
    Ok(out)
}
