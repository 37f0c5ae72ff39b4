//! Command-line interface definitions using `clap`.

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

/// Climate-data ETL pipeline: build derived variables from model output and
/// assemble them into ML-ready train/val/test datasets.
#[derive(Parser, Debug)]
#[command(name = "climate-etl", version, about)]
pub struct Cli {
    /// Number of threads for parallel statistics. Defaults to all cores.
    #[arg(short = 't', long, global = true)]
    pub threads: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build or check per-year derived variable files
    #[command(subcommand)]
    Variable(VariableCommand),

    /// Build or maintain split datasets
    #[command(subcommand)]
    Dataset(DatasetCommand),

    /// Thin a netCDF file into a small fixture
    Sample {
        /// Input netCDF file
        file: PathBuf,
        /// Output netCDF file
        output_file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum VariableCommand {
    /// Create a variable file in project form from source data
    Create {
        /// Variable config files, one per derived variable
        #[arg(long = "config", required = true)]
        configs: Vec<PathBuf>,

        #[arg(long, required = true)]
        year: Vec<i64>,

        #[arg(long)]
        ensemble_member: String,

        #[arg(long, default_value = "rcp85")]
        scenario: String,

        #[arg(long)]
        input_base_dir: PathBuf,

        #[arg(long)]
        output_base_dir: PathBuf,

        /// Skip validation of the produced files
        #[arg(long, default_value_t = false)]
        no_validate: bool,
    },

    /// Check existing variable files for a meteorological year range
    Validate {
        #[arg(long)]
        variable: String,

        #[arg(long)]
        frequency: String,

        #[arg(long)]
        domain: String,

        #[arg(long)]
        resolution: String,

        #[arg(long)]
        ensemble_member: String,

        #[arg(long, default_value = "rcp85")]
        scenario: String,

        #[arg(long)]
        collection: String,

        #[arg(long)]
        base_dir: PathBuf,

        /// First and last meteorological year to check, inclusive
        #[arg(long)]
        first_year: i64,
        #[arg(long)]
        last_year: i64,
    },
}

#[derive(ClapArgs, Debug)]
pub struct DatasetLocation {
    /// Dataset name (the directory under the base dir)
    pub name: String,

    #[arg(long)]
    pub base_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum DatasetCommand {
    /// Create and save a dataset from a config file
    Create {
        /// Dataset config; its file stem names the dataset
        config: PathBuf,

        #[arg(long)]
        input_base_dir: PathBuf,

        #[arg(long)]
        output_base_dir: PathBuf,
    },

    /// Check the split files of a dataset
    Validate {
        #[command(flatten)]
        location: DatasetLocation,
    },

    /// Draw a seeded random subset of a split into a new split
    SubsetSplit {
        #[command(flatten)]
        location: DatasetLocation,

        #[arg(long, default_value = "train")]
        split: String,

        /// Percentage of timesteps to keep
        #[arg(long, default_value_t = 50)]
        pc: u32,

        /// Name of the new split. Defaults to `<split>-<pc>pc`
        #[arg(long)]
        new_split: Option<String>,

        #[arg(long, default_value_t = 42)]
        seed: u64,
    },

    /// Filter every split to a named time period, as a new dataset
    Filter {
        #[command(flatten)]
        location: DatasetLocation,

        /// One of: historic, present, future
        time_period: String,
    },

    /// Print a quantile of a variable in one split
    Quantile {
        #[command(flatten)]
        location: DatasetLocation,

        /// Quantile in [0, 1]
        p: f64,

        #[arg(long, default_value = "target_pr")]
        variable: String,

        #[arg(long, default_value = "train")]
        split: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_dataset_create() {
        let cli = Cli::try_parse_from([
            "climate-etl",
            "--threads",
            "4",
            "dataset",
            "create",
            "configs/bham64.yml",
            "--input-base-dir",
            "/data/derived",
            "--output-base-dir",
            "/data/datasets",
        ])
        .unwrap();
        assert_eq!(cli.threads, Some(4));
        match cli.command {
            Command::Dataset(DatasetCommand::Create { config, .. }) => {
                assert_eq!(config, PathBuf::from("configs/bham64.yml"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn parse_variable_create_with_years() {
        let cli = Cli::try_parse_from([
            "climate-etl",
            "variable",
            "create",
            "--config",
            "configs/pr.yml",
            "--year",
            "1981",
            "--year",
            "1982",
            "--ensemble-member",
            "01",
            "--input-base-dir",
            "/data/raw",
            "--output-base-dir",
            "/data/derived",
        ])
        .unwrap();
        match cli.command {
            Command::Variable(VariableCommand::Create { year, scenario, .. }) => {
                assert_eq!(year, vec![1981, 1982]);
                assert_eq!(scenario, "rcp85");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
