//! Seeded random day assignment within each time period.

use crate::calendar::CDateTime;
use crate::config::TimePeriod;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::split::{unique_days_in_period, SplitProps, TimePartition};

/// Shuffle the unique days of each time period and deal them out by the
/// configured proportions, with `train` taking the remainder. Results from
/// all periods are concatenated and each split sorted.
pub fn random_split(
    time: &[CDateTime],
    props: &SplitProps,
    seed: u64,
    periods: &[TimePeriod],
) -> TimePartition {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut partition = TimePartition::new();

    for period in periods {
        let mut days = unique_days_in_period(time, period);
        days.shuffle(&mut rng);

        let mut remaining = days.as_slice();
        for (name, size) in props.sizes(remaining.len()) {
            let (taken, rest) = remaining.split_at(size);
            partition
                .entry(name.to_string())
                .or_default()
                .extend_from_slice(taken);
            remaining = rest;
        }
        debug_assert!(remaining.is_empty());
    }

    for days in partition.values_mut() {
        days.sort_unstable();
    }
    partition
}
