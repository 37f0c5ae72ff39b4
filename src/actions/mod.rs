//! Transform actions applied to a dataset in config order
//!
//! Each action consumes a [`Dataset`] and returns a new one. The chain is
//! driven by the `spec` list of a variable config; [`apply`] dispatches a
//! single step.

pub mod arith;
pub mod coarsen;
pub mod domain;
pub mod regrid;
pub mod resample;

use crate::config::ActionSpec;
use crate::cube::Dataset;
use crate::errors::Result;
use log::info;
use std::path::Path;

/// Apply one action from a variable spec.
///
/// `base_dir` anchors relative paths in actions that read auxiliary files
/// (currently only `regrid-to-target`).
pub fn apply(ds: Dataset, spec: &ActionSpec, base_dir: &Path) -> Result<Dataset> {
    info!("Applying action '{}'", spec.name());
    match spec {
        ActionSpec::Rename { mapping } => {
            let mut ds = ds;
            for (from, to) in mapping {
                ds.rename(from, to);
            }
            Ok(ds)
        }
        ActionSpec::DropVariables { variables } => {
            let mut ds = ds;
            ds.drop_vars(variables);
            Ok(ds)
        }
        ActionSpec::SelectSubdomain { domain, size } => {
            domain::select_subdomain(ds, domain, *size)
        }
        ActionSpec::Coarsen { factor } => coarsen::coarsen(ds, *factor),
        ActionSpec::RegridToTarget {
            target_grid,
            scheme,
        } => regrid::regrid_to_target(ds, &base_dir.join(target_grid), *scheme),
        ActionSpec::Resample { frequency } => resample::resample(ds, frequency),
        ActionSpec::Sum { variables, name } => arith::sum(ds, variables, name),
        ActionSpec::Diff { left, right, name } => arith::diff(ds, left, right, name),
        ActionSpec::ShiftLonBreak => domain::shift_lon_break(ds),
    }
}
