//! Season-balanced random splitting
//!
//! Instead of dealing out individual days, this scheme deals out whole
//! season-years: for every period and season, the period's meteorological
//! years are shuffled and assigned to splits by the configured proportions.
//! A December day counts towards the following meteorological year so a
//! DJF winter moves between splits as one unit.

use crate::calendar::CDateTime;
use crate::config::TimePeriod;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeSet;

use super::split::{unique_days_in_period, SplitProps, TimePartition};

/// Meteorological years covered by a period, derived from its endpoints.
fn met_years(period: &TimePeriod) -> Vec<i64> {
    (period.start.met_year()..=period.end.met_year()).collect()
}

pub fn random_season_split(
    time: &[CDateTime],
    props: &SplitProps,
    seed: u64,
    periods: &[TimePeriod],
) -> TimePartition {
    let mut partition = TimePartition::new();
    for name in props.names() {
        partition.insert(name.to_string(), Vec::new());
    }

    for period in periods {
        let days = unique_days_in_period(time, period);
        let mut rng = StdRng::seed_from_u64(seed);

        for season in crate::calendar::Season::ALL {
            let mut years = met_years(period);
            years.shuffle(&mut rng);

            let mut remaining = years.as_slice();
            for (name, size) in props.sizes(remaining.len()) {
                let (taken, rest) = remaining.split_at(size);
                let taken: BTreeSet<i64> = taken.iter().copied().collect();
                remaining = rest;

                if let Some(split_days) = partition.get_mut(name) {
                    split_days.extend(
                        days.iter()
                            .filter(|d| d.season() == season && taken.contains(&d.met_year())),
                    );
                }
            }
        }
    }

    for days in partition.values_mut() {
        days.sort_unstable();
    }
    partition
}
