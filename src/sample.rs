//! Thinning of netCDF files into small test fixtures.

use crate::cube::{AttrValue, ENSEMBLE_ATTR, ENSEMBLE_DIM};
use crate::errors::Result;
use crate::ncio;
use log::info;
use std::path::Path;

/// Meteorological years kept when the input spans the standard periods.
const SAMPLE_MET_YEARS: [i64; 6] = [1981, 2000, 2021, 2040, 2061, 2080];

/// Members kept when an ensemble axis is present.
const SAMPLE_MEMBERS: usize = 3;

/// Thin a file down to one day per month, the boundary years of each
/// standard period and the first few ensemble members.
pub fn sample(input: &Path, output: &Path) -> Result<()> {
    let ds = ncio::read_dataset(input)?;

    let year_filter_applies = ds
        .time
        .iter()
        .any(|t| SAMPLE_MET_YEARS.contains(&t.met_year()));
    let indices: Vec<usize> = ds
        .time
        .iter()
        .enumerate()
        .filter(|(_, t)| {
            let day_of_year = i64::from(t.month() - 1) * 30 + i64::from(t.day());
            day_of_year % 30 == 0
                && (!year_filter_applies || SAMPLE_MET_YEARS.contains(&t.met_year()))
        })
        .map(|(i, _)| i)
        .collect();
    let mut sampled = ds.select_time_indices(&indices);

    if sampled.ensemble_members.len() >= SAMPLE_MEMBERS {
        let keep: Vec<usize> = (0..SAMPLE_MEMBERS).collect();
        sampled = sampled.select_dim_indices(ENSEMBLE_DIM, &keep);
        sampled.ensemble_members.truncate(SAMPLE_MEMBERS);
        let ids = sampled.ensemble_members.join(",");
        sampled
            .attrs
            .insert(ENSEMBLE_ATTR.to_string(), AttrValue::Text(ids));
    }

    info!("Saving {}", output.display());
    ncio::write_dataset(&sampled, output)
}
