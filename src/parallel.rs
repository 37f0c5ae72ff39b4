//! Rayon thread pool configuration for the statistics reductions.

use crate::errors::{EtlError, Result};
use log::info;
use rayon::ThreadPoolBuilder;

/// Configuration for parallel processing
#[derive(Debug, Clone, Default)]
pub struct ParallelConfig {
    pub num_threads: Option<usize>,
}

impl ParallelConfig {
    pub fn new(num_threads: Option<usize>) -> Self {
        Self { num_threads }
    }

    /// Set up the global Rayon thread pool. Call once, before any
    /// reduction runs.
    pub fn setup_global_pool(&self) -> Result<()> {
        if let Some(num_threads) = self.num_threads {
            ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .build_global()
                .map_err(|e| {
                    EtlError::ThreadPool(format!(
                        "Failed to initialize thread pool with {} threads: {}",
                        num_threads, e
                    ))
                })?;
            info!("Configured parallel processing with {} threads", num_threads);
        } else {
            info!(
                "Using default thread pool ({} of {} cores)",
                rayon::current_num_threads(),
                num_cpus::get()
            );
        }
        Ok(())
    }
}
