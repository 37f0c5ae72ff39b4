//! End-to-end tests over real netCDF files
//!
//! Fixtures are built with the crate's own writer into temporary
//! directories laid out like the production variable store, then pushed
//! through variable creation, dataset assembly and the maintenance
//! commands.

use climate_etl::calendar::CDateTime;
use climate_etl::config::{DatasetConfig, VariableConfig};
use climate_etl::cube::{Coord, DataVar, Dataset, TIME_DIM};
use climate_etl::dataset;
use climate_etl::errors::Result;
use climate_etl::metadata::{DatasetMeta, VariableMeta};
use climate_etl::{ncio, sample, variable};
use ndarray::{ArrayD, IxDyn};
use std::path::Path;
use tempfile::tempdir;

const NY: usize = 4;
const NX: usize = 4;

/// One meteorological year of daily data on a small rotated-pole grid.
fn daily_year(met_year: i64) -> Dataset {
    let start = CDateTime::from_ymdh(met_year - 1, 12, 1, 12).unwrap();
    let time: Vec<CDateTime> = (0..360).map(|d| start.add_days(d)).collect();
    let time_bnds = time
        .iter()
        .map(|t| (t.floor_day(), t.floor_day().add_days(1)))
        .collect();

    let mut ds = Dataset {
        time,
        time_bnds: Some(time_bnds),
        ..Dataset::default()
    };
    ds.coords.insert(
        "grid_latitude".to_string(),
        Coord::new_1d("grid_latitude", (0..NY).map(|i| -2.0 + 0.1 * i as f64).collect()),
    );
    ds.coords.insert(
        "grid_longitude".to_string(),
        Coord::new_1d("grid_longitude", (0..NX).map(|i| 358.0 + 0.1 * i as f64).collect()),
    );
    ds.coords
        .insert("rotated_latitude_longitude".to_string(), Coord::new_scalar());
    ds
}

fn with_var(mut ds: Dataset, name: &str, fill: f32) -> Dataset {
    let n = ds.time.len();
    let data: Vec<f32> = (0..n * NY * NX).map(|i| fill + (i % 7) as f32).collect();
    let mut var = DataVar::new(
        vec![
            TIME_DIM.to_string(),
            "grid_latitude".to_string(),
            "grid_longitude".to_string(),
        ],
        ArrayD::from_shape_vec(IxDyn(&[n, NY, NX]), data).unwrap(),
    );
    var.attrs
        .insert("grid_mapping".to_string(), "rotated_latitude_longitude".into());
    ds.vars.insert(name.to_string(), var);
    ds
}

fn source_meta(base_dir: &Path, var: &str, em: &str) -> VariableMeta {
    VariableMeta {
        base_dir: base_dir.to_path_buf(),
        variable: var.to_string(),
        frequency: "day".to_string(),
        domain: "bham".to_string(),
        resolution: "2.2km".to_string(),
        ensemble_member: em.to_string(),
        scenario: "rcp85".to_string(),
        collection: "land-cpm".to_string(),
    }
}

fn write_year(base_dir: &Path, var: &str, em: &str, met_year: i64, fill: f32) -> Result<()> {
    let ds = with_var(daily_year(met_year), var, fill);
    ncio::write_dataset(&ds, &source_meta(base_dir, var, em).filepath(met_year))
}

#[test]
fn netcdf_round_trip() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("roundtrip.nc");

    let mut original = with_var(daily_year(1981), "pr", 1.5);
    original.set_attr("domain", "bham");
    ncio::write_dataset(&original, &path)?;

    let restored = ncio::read_dataset(&path)?;
    assert_eq!(restored.time, original.time);
    assert_eq!(restored.time_bnds, original.time_bnds);
    assert_eq!(restored.attr_text("domain"), Some("bham"));
    assert!(restored.coords.contains_key("rotated_latitude_longitude"));

    let var = restored.var("pr")?;
    assert_eq!(var.dims, original.var("pr")?.dims);
    assert_eq!(var.data, original.var("pr")?.data);
    Ok(())
}

#[test]
fn variable_create_runs_action_chain() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp dir");
    let input = dir.path().join("raw");
    let output = dir.path().join("derived");
    write_year(&input, "pr", "01", 1981, 2.0)?;

    let yaml = r#"
variable: pr
sources:
  type: local
  collection: land-cpm
  frequency: day
  resolution: 2.2km
  domain: bham
  variables:
    - name: pr
spec:
  - action: coarsen
    parameters: {factor: 2}
attrs:
  units: "kg m-2 s-1"
"#;
    let config_path = dir.path().join("pr.yml");
    std::fs::write(&config_path, yaml)?;
    let config = VariableConfig::from_file(&config_path)?;

    let out_path = variable::create(&config, 1981, "rcp85", "01", &input, &output, true)?;
    assert!(out_path.exists());
    // coarsening is reflected in the output location
    assert!(out_path
        .to_string_lossy()
        .contains("2.2km-coarsened-2x"));

    let ds = ncio::read_dataset(&out_path)?;
    let var = ds.var("pr")?;
    assert_eq!(var.data.shape(), &[360, NY / 2, NX / 2]);
    assert_eq!(
        var.attrs.get("units").and_then(|a| a.as_text()),
        Some("kg m-2 s-1")
    );

    // the produced file passes its own validation
    let out_meta = VariableMeta {
        resolution: "2.2km-coarsened-2x".to_string(),
        ..source_meta(&output, "pr", "01")
    };
    let failures = variable::validate(&out_meta, 1981..=1981)?;
    assert!(failures.is_empty(), "{:?}", failures);

    // a missing year is reported
    let failures = variable::validate(&out_meta, 1981..=1982)?;
    assert_eq!(failures[&1982], vec!["no file".to_string()]);
    Ok(())
}

fn dataset_config_yaml() -> &'static str {
    r#"
domain: bham
scenario: rcp85
frequency: day
ensemble_members: ["01", "04"]
predictors:
  variables: [psl]
  frequency: day
  resolution: 2.2km
  collection: land-cpm
predictands:
  variables: [pr]
  frequency: day
  resolution: 2.2km
  collection: land-cpm
split:
  scheme: random
  props:
    val: 0.2
    test: 0.1
  seed: 42
  time_periods:
    - ["1980-12-01", "1981-11-30"]
"#
}

fn build_dataset_fixture(dir: &Path) -> Result<(std::path::PathBuf, std::path::PathBuf)> {
    let input = dir.join("derived");
    let output = dir.join("datasets");
    for em in ["01", "04"] {
        write_year(&input, "psl", em, 1981, 1000.0)?;
        write_year(&input, "pr", em, 1981, 3.0)?;
    }
    let config_path = dir.join("bham-pr.yml");
    std::fs::write(&config_path, dataset_config_yaml())?;
    dataset::create(&config_path, &input, &output)?;
    Ok((config_path, output))
}

#[test]
fn dataset_create_and_validate() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp dir");
    let (_, output) = build_dataset_fixture(dir.path())?;

    let meta = DatasetMeta::new(&output, "bham-pr");
    assert!(meta.config_path().is_file());
    assert_eq!(
        meta.existing_splits()?,
        vec!["test".to_string(), "train".to_string(), "val".to_string()]
    );
    assert!(meta.stats_path("train").is_file());

    let train = ncio::read_dataset(&meta.split_path("train"))?;
    let val = ncio::read_dataset(&meta.split_path("val"))?;
    let test = ncio::read_dataset(&meta.split_path("test"))?;

    // proportions of one 360-day year
    assert_eq!(train.time.len(), 252);
    assert_eq!(val.time.len(), 72);
    assert_eq!(test.time.len(), 36);

    // members are stacked and predictands renamed
    assert_eq!(train.ensemble_members, vec!["01", "04"]);
    let target = train.var("target_pr")?;
    assert_eq!(
        target.dims,
        vec!["ensemble_member", "time", "grid_latitude", "grid_longitude"]
    );
    assert_eq!(target.data.shape(), &[2, 252, NY, NX]);
    assert!(train.vars.contains_key("psl"));

    // splits are disjoint and sorted
    let mut all_days: Vec<CDateTime> = train
        .time
        .iter()
        .chain(val.time.iter())
        .chain(test.time.iter())
        .map(|t| t.floor_day())
        .collect();
    all_days.sort_unstable();
    all_days.dedup();
    assert_eq!(all_days.len(), 360);
    assert!(train.time.windows(2).all(|w| w[0] < w[1]));

    // stats sidecar agrees with a direct computation over the split
    let stats = climate_etl::statistics::summarize(&target.data);
    let sidecar = netcdf::open(meta.stats_path("train"))?;
    let row: Vec<f64> = sidecar
        .variable("target_pr")
        .expect("target_pr missing from stats sidecar")
        .get_values::<f64, _>(..)?;
    assert!((row[0] - stats.mean).abs() < 1e-9);
    assert!((row[1] - stats.std).abs() < 1e-9);
    assert_eq!(row[4], stats.count as f64);

    let failures = dataset::validate("bham-pr", &output)?;
    assert!(failures.is_empty(), "{:?}", failures);

    // creating over an existing dataset is refused
    let config_path = dir.path().join("bham-pr.yml");
    assert!(dataset::create(&config_path, &dir.path().join("derived"), &output).is_err());
    Ok(())
}

#[test]
fn dataset_maintenance_commands() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp dir");
    let (_, output) = build_dataset_fixture(dir.path())?;
    let meta = DatasetMeta::new(&output, "bham-pr");

    // seeded subset of the train split
    let subset_path =
        dataset::random_subset_split("bham-pr", &output, "train", 50, None, 42)?;
    assert_eq!(subset_path, meta.split_path("train-50pc"));
    let subset = ncio::read_dataset(&subset_path)?;
    assert_eq!(subset.time.len(), 126);
    assert!(subset.time.windows(2).all(|w| w[0] < w[1]));

    let again = dataset::random_subset_split("bham-pr", &output, "train", 50, Some("rep"), 42)?;
    let again = ncio::read_dataset(&again)?;
    assert_eq!(again.time, subset.time);

    // percentages outside 1..=100 are rejected
    assert!(dataset::random_subset_split("bham-pr", &output, "train", 150, None, 42).is_err());
    assert!(dataset::random_subset_split("bham-pr", &output, "train", 0, None, 42).is_err());

    // quantile of a constant-ish field stays within its range
    let q = dataset::quantile("bham-pr", &output, "train", "target_pr", 0.5)?;
    assert!((3.0..=9.0).contains(&q), "q = {}", q);
    assert!(dataset::quantile("bham-pr", &output, "train", "target_pr", 1.5).is_err());
    Ok(())
}

#[test]
fn dataset_filter_to_named_period() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp dir");
    let (_, output) = build_dataset_fixture(dir.path())?;

    let new_name = dataset::filter("bham-pr", &output, "historic")?;
    assert_eq!(new_name, "bham-pr-historic");

    let new_meta = DatasetMeta::new(&output, &new_name);
    let config = DatasetConfig::from_file(&new_meta.config_path())?;
    assert_eq!(config.filters.len(), 1);
    assert_eq!(config.filters[0].time_period, "historic");

    // the fixture year lies inside the historic period, so nothing is lost
    let train = ncio::read_dataset(&new_meta.split_path("train"))?;
    assert_eq!(train.time.len(), 252);

    assert!(dataset::filter("bham-pr", &output, "jurassic").is_err());
    Ok(())
}

#[test]
fn sample_thins_fixture_files() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp dir");
    let input = dir.path().join("full.nc");
    let output = dir.path().join("sampled.nc");

    let ds = with_var(daily_year(1981), "pr", 1.0);
    ncio::write_dataset(&ds, &input)?;
    sample::sample(&input, &output)?;

    let sampled = ncio::read_dataset(&output)?;
    // one day per month survives
    assert_eq!(sampled.time.len(), 12);
    assert!(sampled.time.iter().all(|t| t.day() == 30));
    Ok(())
}
