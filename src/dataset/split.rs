//! Shared machinery for dataset splitting
//!
//! A splitter partitions the day-floored, deduplicated, in-period timestamps
//! of a dataset into named splits. All schemes guarantee the same
//! invariants: splits are pairwise disjoint, their union is exactly the
//! in-period day set, each split is sorted ascending, and the outcome is a
//! pure function of the inputs and the seed.

use crate::calendar::CDateTime;
use crate::config::{SplitConfig, SplitScheme, TimePeriod};
use crate::cube::Dataset;
use crate::errors::{EtlError, Result};
use std::collections::BTreeMap;

use super::intensity_split::season_stratified_intensity_split;
use super::random_season_split::random_season_split;
use super::random_split::random_split;

/// The name of the implied remainder split.
pub const TRAIN_SPLIT: &str = "train";

/// Split name to sorted day-floored timestamps.
pub type TimePartition = BTreeMap<String, Vec<CDateTime>>;

/// Named split proportions. `train` is the implied remainder and never
/// appears here.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitProps {
    props: BTreeMap<String, f64>,
}

impl SplitProps {
    pub fn new(props: &BTreeMap<String, f64>) -> Self {
        SplitProps {
            props: props.clone(),
        }
    }

    /// Split names in assignment order, remainder split last.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.props
            .keys()
            .map(String::as_str)
            .chain(std::iter::once(TRAIN_SPLIT))
    }

    /// Number of items each split takes from a pool of `n`, truncating
    /// towards zero, with `train` receiving the remainder.
    pub fn sizes(&self, n: usize) -> Vec<(&str, usize)> {
        let mut sizes: Vec<(&str, usize)> = self
            .props
            .iter()
            .map(|(name, prop)| (name.as_str(), (n as f64 * prop) as usize))
            .collect();
        let assigned: usize = sizes.iter().map(|(_, size)| size).sum();
        sizes.push((TRAIN_SPLIT, n - assigned));
        sizes
    }
}

/// The sorted unique days of `time` that fall inside `period`.
pub fn unique_days_in_period(time: &[CDateTime], period: &TimePeriod) -> Vec<CDateTime> {
    let mut days: Vec<CDateTime> = time
        .iter()
        .filter(|t| period.contains(**t))
        .map(|t| t.floor_day())
        .collect();
    days.sort_unstable();
    days.dedup();
    days
}

/// The sorted unique in-period days of `time` across all periods.
pub fn unique_days_in_periods(time: &[CDateTime], periods: &[TimePeriod]) -> Vec<CDateTime> {
    let mut days: Vec<CDateTime> = periods
        .iter()
        .flat_map(|period| unique_days_in_period(time, period))
        .collect();
    days.sort_unstable();
    days.dedup();
    days
}

/// Run the configured splitting scheme over a dataset's time axis.
///
/// `target_var` names the variable whose spatial-sum intensity ranks days
/// for the intensity-stratified scheme; the other schemes ignore it.
pub fn run(config: &SplitConfig, ds: &Dataset, target_var: &str) -> Result<TimePartition> {
    let props = SplitProps::new(&config.props);
    let partition = match config.scheme {
        SplitScheme::Random => random_split(
            &ds.time,
            &props,
            config.seed,
            &config.time_periods,
        ),
        SplitScheme::RandomSeason => random_season_split(
            &ds.time,
            &props,
            config.seed,
            &config.time_periods,
        ),
        SplitScheme::Ssi => season_stratified_intensity_split(
            ds,
            target_var,
            &props,
            config.seed,
            &config.time_periods,
        )?,
    };
    check_partition(&partition, &unique_days_in_periods(&ds.time, &config.time_periods))?;
    Ok(partition)
}

/// Assert the partition invariants: disjoint, sorted, covering `expected`
/// exactly.
pub fn check_partition(partition: &TimePartition, expected: &[CDateTime]) -> Result<()> {
    let mut all: Vec<CDateTime> = Vec::with_capacity(expected.len());
    for (name, days) in partition {
        if days.windows(2).any(|w| w[0] >= w[1]) {
            return Err(EtlError::Generic(format!(
                "split '{}' is not sorted and duplicate-free",
                name
            )));
        }
        all.extend_from_slice(days);
    }
    all.sort_unstable();
    let before = all.len();
    all.dedup();
    if all.len() != before {
        return Err(EtlError::Generic(
            "splits overlap: some days were assigned twice".to_string(),
        ));
    }
    if all != expected {
        return Err(EtlError::Generic(format!(
            "splits cover {} days but the input has {}",
            all.len(),
            expected.len()
        )));
    }
    Ok(())
}
