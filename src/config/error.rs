use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Everything that can go wrong while resolving a job configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("can't read config file {}: {source}", .path.display())]
    Read { path: PathBuf, source: std::io::Error },

    #[error("invalid YAML in {}: {source}", .path.display())]
    Yaml { path: PathBuf, source: serde_yaml::Error },

    #[error("invalid defaults entry in {}: {entry}", .path.display())]
    BadDefault { path: PathBuf, entry: String },

    #[error("can't parse override '{0}'")]
    BadOverride(String),

    #[error("could not override '{0}': key is not in the config, to append use +{0}=...")]
    KeyNotFound(String),

    #[error("could not append '{0}': key already exists, to override use ++{0}=...")]
    KeyExists(String),

    #[error("could not delete '{key}': value is not {expected}")]
    DeleteMismatch { key: String, expected: String },

    #[error("can't set '{0}': parent is not a mapping")]
    NotAMapping(String),

    #[error("interpolation ${{{0}}} refers to a missing key")]
    MissingInterpolationKey(String),

    #[error("environment variable {0} is not set and has no default")]
    MissingEnv(String),

    #[error("invalid time format '{0}' in ${{now:...}}")]
    BadTimeFormat(String),

    #[error("interpolation cycle while resolving ${{{0}}}")]
    InterpolationCycle(String),

    #[error("add slurm.run_name, slurm.n_gpus, slurm.time")]
    MissingSlurm,

    #[error("invalid slurm section: {0}")]
    InvalidSlurm(serde_yaml::Error),
}
