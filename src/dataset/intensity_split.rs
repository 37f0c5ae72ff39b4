//! Season-stratified intensity splitting
//!
//! Biases extreme days towards the evaluation splits: within each season,
//! days are ranked by the spatial sum of the target variable and the most
//! intense ones, together with a ±5 day lag window around each, are
//! claimed for `extreme_<split>` sets until the per-season size targets are
//! met. The unclaimed remainder is then split randomly as usual.

use crate::calendar::{CDateTime, Season};
use crate::config::TimePeriod;
use crate::cube::Dataset;
use crate::errors::{EtlError, Result};
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

use super::random_split::random_split;
use super::split::{unique_days_in_periods, SplitProps, TimePartition, TRAIN_SPLIT};

/// Days either side of an intense day that are claimed along with it.
const LAG_DAYS: i64 = 5;

/// Per-day intensity: the spatial sum of the target variable, accumulated
/// over the day's timesteps (first ensemble member only).
fn day_intensities(
    ds: &Dataset,
    target_var: &str,
    days: &[CDateTime],
) -> Result<BTreeMap<CDateTime, f64>> {
    let series = ds.spatial_sum_series(target_var)?;
    let day_set: BTreeSet<CDateTime> = days.iter().copied().collect();
    let mut intensities = BTreeMap::new();
    for (t, value) in ds.time.iter().zip(series) {
        let day = t.floor_day();
        if day_set.contains(&day) {
            *intensities.entry(day).or_insert(0.0) += f64::from(value);
        }
    }
    Ok(intensities)
}

/// Days of one season, most intense first. Ties break towards the earlier
/// day so the ordering is stable.
fn season_days_by_intensity(
    days: &[CDateTime],
    intensities: &BTreeMap<CDateTime, f64>,
    season: Season,
) -> Vec<CDateTime> {
    let mut season_days: Vec<CDateTime> = days
        .iter()
        .copied()
        .filter(|d| d.season() == season)
        .collect();
    season_days.sort_by(|a, b| {
        let ia = intensities.get(a).copied().unwrap_or(0.0);
        let ib = intensities.get(b).copied().unwrap_or(0.0);
        ib.total_cmp(&ia).then(a.cmp(b))
    });
    season_days
}

pub fn season_stratified_intensity_split(
    ds: &Dataset,
    target_var: &str,
    props: &SplitProps,
    seed: u64,
    periods: &[TimePeriod],
) -> Result<TimePartition> {
    let days = unique_days_in_periods(&ds.time, periods);
    if days.is_empty() {
        return Err(EtlError::Generic(
            "no in-period days to split".to_string(),
        ));
    }
    let intensities = day_intensities(ds, target_var, &days)?;

    let extreme_names: Vec<&str> = props.names().filter(|n| *n != TRAIN_SPLIT).collect();
    // with no named splits there is nothing to claim extremes for
    if extreme_names.is_empty() {
        return Ok(random_split(&days, props, seed, periods));
    }
    let mut extreme: BTreeMap<&str, BTreeSet<CDateTime>> = extreme_names
        .iter()
        .map(|name| (*name, BTreeSet::new()))
        .collect();

    for season in Season::ALL {
        let season_sorted = season_days_by_intensity(&days, &intensities, season);
        let season_set: BTreeSet<CDateTime> = season_sorted.iter().copied().collect();
        debug!(
            "Claiming extreme days for {} from {} candidates",
            season,
            season_sorted.len()
        );

        let targets: BTreeMap<&str, usize> = props
            .sizes(season_sorted.len())
            .into_iter()
            .filter(|(name, _)| *name != TRAIN_SPLIT)
            .collect();
        let mut season_claimed: BTreeMap<&str, usize> =
            extreme_names.iter().map(|name| (*name, 0)).collect();

        let mut working = 0usize;
        'days: for day in &season_sorted {
            // the day plus its lag window, restricted to this season
            for offset in -LAG_DAYS..=LAG_DAYS {
                let event_day = day.add_days(offset);
                if !season_set.contains(&event_day) {
                    continue;
                }
                if extreme.values().any(|set| set.contains(&event_day)) {
                    continue;
                }
                let name = extreme_names[working];
                if extreme.get_mut(name).map(|set| set.insert(event_day)) == Some(true) {
                    *season_claimed.entry(name).or_insert(0) += 1;
                }
            }
            while working < extreme_names.len()
                && season_claimed[extreme_names[working]] >= targets[extreme_names[working]]
            {
                working += 1;
                if working == extreme_names.len() {
                    break 'days;
                }
            }
        }
    }

    let claimed: BTreeSet<CDateTime> = extreme.values().flatten().copied().collect();
    let remainder: Vec<CDateTime> = days
        .iter()
        .copied()
        .filter(|d| !claimed.contains(d))
        .collect();

    let mut partition = random_split(&remainder, props, seed, periods);
    for (name, set) in extreme {
        partition.insert(format!("extreme_{}", name), set.into_iter().collect());
    }
    Ok(partition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cube::{Coord, DataVar, TIME_DIM};
    use ndarray::{ArrayD, IxDyn};

    fn props() -> SplitProps {
        SplitProps::new(&std::collections::BTreeMap::from([
            ("val".to_string(), 0.2),
            ("test".to_string(), 0.1),
        ]))
    }

    /// Two model years of daily data with a handful of standout days.
    fn intensity_dataset(spikes: &[(i64, f32)]) -> (Dataset, TimePeriod) {
        let start = CDateTime::parse_date("1980-12-01").unwrap();
        let ndays = 720usize;
        let time: Vec<CDateTime> = (0..ndays as i64).map(|d| start.add_days(d)).collect();

        let mut data = ArrayD::from_elem(IxDyn(&[ndays, 2, 2]), 1.0f32);
        for &(day, value) in spikes {
            data.index_axis_mut(ndarray::Axis(0), day as usize).fill(value);
        }

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
            "target_pr".to_string(),
            DataVar::new(
                vec![
                    TIME_DIM.to_string(),
                    "grid_latitude".to_string(),
                    "grid_longitude".to_string(),
                ],
                data,
            ),
        );
        let period = TimePeriod::new(start, start.add_days(ndays as i64 - 1));
        (ds, period)
    }

    #[test]
    fn most_intense_day_lands_in_first_extreme_split() {
        let (ds, period) = intensity_dataset(&[(100, 50.0)]);
        let partition =
            season_stratified_intensity_split(&ds, "target_pr", &props(), 42, &[period])
                .unwrap();

        let spike_day = ds.time[100].floor_day();
        // props iterate alphabetically, so 'test' is claimed first
        assert!(partition["extreme_test"].contains(&spike_day));
        // the lag window around the spike follows it
        assert!(partition["extreme_test"].contains(&spike_day.add_days(3)));
    }

    #[test]
    fn partition_is_complete_and_disjoint() {
        let (ds, period) = intensity_dataset(&[(30, 10.0), (200, 20.0), (400, 15.0)]);
        let partition =
            season_stratified_intensity_split(&ds, "target_pr", &props(), 42, &[period])
                .unwrap();

        let expected = unique_days_in_periods(&ds.time, &[period]);
        crate::dataset::split::check_partition(&partition, &expected).unwrap();

        for name in ["extreme_test", "extreme_val", "test", "val", "train"] {
            assert!(partition.contains_key(name), "missing split {}", name);
            assert!(!partition[name].is_empty(), "empty split {}", name);
        }
    }

    #[test]
    fn extreme_sizes_respect_targets() {
        let (ds, period) = intensity_dataset(&[]);
        let partition =
            season_stratified_intensity_split(&ds, "target_pr", &props(), 42, &[period])
                .unwrap();

        // 180 days per season over two years: targets are 18 (test) and 36
        // (val) per season, overshooting by at most a lag window per season
        let test_len = partition["extreme_test"].len();
        let val_len = partition["extreme_val"].len();
        assert!((72..=72 + 44).contains(&test_len), "test {}", test_len);
        assert!((144..=144 + 44).contains(&val_len), "val {}", val_len);
    }

    #[test]
    fn empty_props_assign_everything_to_train() {
        let (ds, period) = intensity_dataset(&[(100, 50.0)]);
        let empty = SplitProps::new(&std::collections::BTreeMap::new());
        let partition =
            season_stratified_intensity_split(&ds, "target_pr", &empty, 42, &[period]).unwrap();

        let expected = unique_days_in_periods(&ds.time, &[period]);
        crate::dataset::split::check_partition(&partition, &expected).unwrap();
        assert_eq!(partition.len(), 1);
        assert_eq!(partition["train"].len(), expected.len());
    }

    #[test]
    fn seed_determinism() {
        let (ds, period) = intensity_dataset(&[(50, 9.0)]);
        let a = season_stratified_intensity_split(&ds, "target_pr", &props(), 42, &[period])
            .unwrap();
        let b = season_stratified_intensity_split(&ds, "target_pr", &props(), 42, &[period])
            .unwrap();
        assert_eq!(a, b);
    }
}
