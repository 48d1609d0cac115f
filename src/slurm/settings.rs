use serde::de::Error;
use serde::{Deserialize, Deserializer};
use serde_yaml::Value;

use crate::config::error::ConfigError;
use crate::config::interpolation;
use crate::config::overrides::scalar_text;

/// The `slurm` section of a resolved job configuration
///
/// Other keys in the section are ignored, they stay in the persisted config for the training job
/// to use.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SlurmSettings {
    #[serde(deserialize_with = "scalar_string")]
    pub run_name: String,
    #[serde(deserialize_with = "gpu_count")]
    pub n_gpus: u32,
    /// Scheduler time limit syntax, e.g. `2-00:00:00` or `60` (minutes)
    #[serde(deserialize_with = "scalar_string")]
    pub time: String,
    #[serde(default)]
    pub constraint: Option<String>,
    #[serde(default)]
    pub nodelist: Option<String>,
}

impl SlurmSettings {
    /// Read the `slurm` section with interpolations resolved
    pub fn from_config(cfg: &Value) -> Result<SlurmSettings, ConfigError> {
        let section = match interpolation::resolve_at(cfg, "slurm")? {
            None | Some(Value::Null) => return Err(ConfigError::MissingSlurm),
            Some(section) => section,
        };
        let mut settings: SlurmSettings = serde_yaml::from_value(section).map_err(ConfigError::InvalidSlurm)?;
        // empty strings mean "not set"
        settings.constraint = settings.constraint.filter(|c| !c.is_empty());
        settings.nodelist = settings.nodelist.filter(|n| !n.is_empty());
        Ok(settings)
    }
}

/// Accept unquoted YAML numbers for fields that are really strings (`time: 60`)
fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        value @ (Value::String(_) | Value::Number(_)) => Ok(scalar_text(&value)),
        other => Err(D::Error::custom(format!("expected a string, found {other:?}"))),
    }
}

/// GPU count as a YAML integer or a string holding one (`${oc.env:...}` always gives a string)
fn gpu_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let count = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    };
    count.ok_or_else(|| D::Error::custom("n_gpus must be a non-negative integer"))
}
