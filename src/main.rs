//! Entry point: CLI parsing, logging setup and command dispatch.

use clap::Parser;
use climate_etl::cli::{Cli, Command, DatasetCommand, VariableCommand};
use climate_etl::config::VariableConfig;
use climate_etl::errors::Result;
use climate_etl::metadata::VariableMeta;
use climate_etl::parallel::ParallelConfig;
use climate_etl::{dataset, sample, variable};
use log::{error, info};
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    ParallelConfig::new(cli.threads).setup_global_pool()?;

    match cli.command {
        Command::Variable(cmd) => run_variable(cmd),
        Command::Dataset(cmd) => run_dataset(cmd),
        Command::Sample { file, output_file } => sample::sample(&file, &output_file),
    }
}

fn run_variable(cmd: VariableCommand) -> Result<()> {
    match cmd {
        VariableCommand::Create {
            configs,
            year,
            ensemble_member,
            scenario,
            input_base_dir,
            output_base_dir,
            no_validate,
        } => {
            for config_path in &configs {
                let config = VariableConfig::from_file(config_path)?;
                for &y in &year {
                    let path = variable::create(
                        &config,
                        y,
                        &scenario,
                        &ensemble_member,
                        &input_base_dir,
                        &output_base_dir,
                        !no_validate,
                    )?;
                    info!("Created {}", path.display());
                }
            }
            Ok(())
        }
        VariableCommand::Validate {
            variable: var_name,
            frequency,
            domain,
            resolution,
            ensemble_member,
            scenario,
            collection,
            base_dir,
            first_year,
            last_year,
        } => {
            let meta = VariableMeta {
                base_dir,
                variable: var_name.clone(),
                frequency,
                domain,
                resolution,
                ensemble_member,
                scenario,
                collection,
            };
            let failures = variable::validate(&meta, first_year..=last_year)?;
            report_failures(&var_name, failures.iter().map(|(y, f)| (y.to_string(), f)));
            Ok(())
        }
    }
}

fn run_dataset(cmd: DatasetCommand) -> Result<()> {
    match cmd {
        DatasetCommand::Create {
            config,
            input_base_dir,
            output_base_dir,
        } => dataset::create(&config, &input_base_dir, &output_base_dir),
        DatasetCommand::Validate { location } => {
            let failures = dataset::validate(&location.name, &location.base_dir)?;
            report_failures(
                &location.name,
                failures.iter().map(|(s, f)| (s.clone(), f)),
            );
            Ok(())
        }
        DatasetCommand::SubsetSplit {
            location,
            split,
            pc,
            new_split,
            seed,
        } => {
            let path = dataset::random_subset_split(
                &location.name,
                &location.base_dir,
                &split,
                pc,
                new_split.as_deref(),
                seed,
            )?;
            info!("Created {}", path.display());
            Ok(())
        }
        DatasetCommand::Filter {
            location,
            time_period,
        } => {
            let new_name = dataset::filter(&location.name, &location.base_dir, &time_period)?;
            info!("Created dataset {}", new_name);
            Ok(())
        }
        DatasetCommand::Quantile {
            location,
            p,
            variable,
            split,
        } => {
            let q = dataset::quantile(&location.name, &location.base_dir, &split, &variable, p)?;
            println!("{}", q);
            Ok(())
        }
    }
}

fn report_failures<'a>(
    subject: &str,
    failures: impl Iterator<Item = (String, &'a Vec<String>)>,
) {
    let mut clean = true;
    for (unit, reasons) in failures {
        clean = false;
        for reason in reasons {
            println!("Failed '{}': {} for {}", reason, subject, unit);
        }
    }
    if clean {
        println!("{} ok", subject);
    }
}
