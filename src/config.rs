//! Resolve a job configuration from layered YAML files and command line overrides
//!
//! A primary config (`configs/config.yaml` by default) may carry a `defaults` list naming other
//! files to compose, either plain files merged at the root or options picked from config groups
//! (subdirectories). Overrides like `slurm.n_gpus=4` are applied last.

/// Compose the primary config with its defaults list
pub mod compose;
pub mod error;
/// `${key}` references between config values
pub mod interpolation;
/// Parse and apply `key=value` style overrides
pub mod overrides;
mod tree;
