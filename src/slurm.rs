//! Render job scripts from a resolved config and submit them to SLURM

/// The `slurm` section of the config, deserialised into a struct
pub mod settings;

/// Render the `#SBATCH` directive script
pub mod directive;

/// Persist the config and render the script that starts training
pub mod launcher;

/// Write all job files into a working directory
pub mod job;

/// Hand the directive script to sbatch
pub mod submit;
