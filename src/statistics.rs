//! Summary statistics for split files
//!
//! Each saved split gets a `stats-<split>.nc` sidecar holding mean,
//! standard deviation, min, max and finite-cell count per data variable.
//! Training pipelines read these for normalisation without touching the
//! full split file. Reductions run in parallel over the flattened data.

use crate::cube::Dataset;
use crate::errors::Result;
use log::info;
use ndarray::ArrayD;
use rayon::prelude::*;
use std::fs;
use std::path::Path;

const STAT_DIM: &str = "stat";
const STAT_NAMES: &str = "mean,std,min,max,count";

/// Summary of the finite values of one variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub count: u64,
}

#[derive(Debug, Clone, Copy)]
struct Accumulator {
    sum: f64,
    sum_sq: f64,
    min: f64,
    max: f64,
    count: u64,
}

impl Accumulator {
    fn identity() -> Self {
        Accumulator {
            sum: 0.0,
            sum_sq: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            count: 0,
        }
    }

    fn push(mut self, v: f32) -> Self {
        if v.is_finite() {
            let v = f64::from(v);
            self.sum += v;
            self.sum_sq += v * v;
            self.min = self.min.min(v);
            self.max = self.max.max(v);
            self.count += 1;
        }
        self
    }

    fn combine(mut self, other: Self) -> Self {
        self.sum += other.sum;
        self.sum_sq += other.sum_sq;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.count += other.count;
        self
    }
}

/// Summarize an array, skipping NaN and infinite cells. Statistics of an
/// all-invalid array are NaN with a count of zero.
pub fn summarize(data: &ArrayD<f32>) -> SummaryStats {
    let acc = match data.as_slice() {
        Some(slice) => slice
            .par_iter()
            .fold(Accumulator::identity, |acc, &v| acc.push(v))
            .reduce(Accumulator::identity, Accumulator::combine),
        None => data
            .iter()
            .fold(Accumulator::identity(), |acc, &v| acc.push(v)),
    };

    if acc.count == 0 {
        return SummaryStats {
            mean: f64::NAN,
            std: f64::NAN,
            min: f64::NAN,
            max: f64::NAN,
            count: 0,
        };
    }
    let n = acc.count as f64;
    let mean = acc.sum / n;
    let variance = (acc.sum_sq / n - mean * mean).max(0.0);
    SummaryStats {
        mean,
        std: variance.sqrt(),
        min: acc.min,
        max: acc.max,
        count: acc.count,
    }
}

/// Write the statistics sidecar for a split dataset.
pub fn write_stats_sidecar(ds: &Dataset, path: &Path) -> Result<()> {
    info!("Writing statistics to {}", path.display());
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    if path.exists() {
        fs::remove_file(path)?;
    }

    let mut file = netcdf::create(path)?;
    file.add_dimension(STAT_DIM, 5)?;
    file.add_attribute("stat_names", STAT_NAMES)?;

    for (name, var) in &ds.vars {
        let stats = summarize(&var.data);
        let mut stats_var = file.add_variable::<f64>(name, &[STAT_DIM])?;
        stats_var.put_values(
            &[stats.mean, stats.std, stats.min, stats.max, stats.count as f64],
            ..,
        )?;
        if let Some(units) = var.attrs.get("units").and_then(|a| a.as_text()) {
            stats_var.put_attribute("units", units)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn summarize_skips_invalid_cells() {
        let mut data = ArrayD::from_shape_vec(
            IxDyn(&[2, 3]),
            vec![1.0f32, 2.0, 3.0, 4.0, f32::NAN, f32::INFINITY],
        )
        .unwrap();
        let stats = summarize(&data);
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean, 2.5);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 4.0);
        assert!((stats.std - 1.118033988749895).abs() < 1e-12);

        data.fill(f32::NAN);
        let stats = summarize(&data);
        assert_eq!(stats.count, 0);
        assert!(stats.mean.is_nan());
    }
}
