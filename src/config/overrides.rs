use std::str::FromStr;

use serde_yaml::{Mapping, Value};

use crate::config::error::{ConfigError, Result};
use crate::config::tree;

/// A command line override, e.g. `slurm.n_gpus=4`, `+slurm.nodelist=n1`, `~model.dropout`
#[derive(Debug, Clone, PartialEq)]
pub enum Override {
    /// `key=value`, the key must already exist
    Set { key: String, value: Value },
    /// `+key=value`, the key must not exist yet
    Add { key: String, value: Value },
    /// `++key=value`, set whether or not the key exists
    Force { key: String, value: Value },
    /// `~key` or `~key=value`
    Delete { key: String, value: Option<Value> },
}

impl Override {
    pub fn key(&self) -> &str {
        match self {
            Override::Set { key, .. }
            | Override::Add { key, .. }
            | Override::Force { key, .. }
            | Override::Delete { key, .. } => key,
        }
    }

    /// Apply to a composed config tree
    pub fn apply(&self, cfg: &mut Value) -> Result<()> {
        match self {
            Override::Set { key, value } => {
                let slot = lookup_mut(cfg, key, false)?.ok_or_else(|| ConfigError::KeyNotFound(key.clone()))?;
                *slot = value.clone();
            }
            Override::Add { key, value } => {
                if tree::get(cfg, key).is_some() {
                    return Err(ConfigError::KeyExists(key.clone()));
                }
                insert(cfg, key, value.clone())?;
            }
            Override::Force { key, value } => insert(cfg, key, value.clone())?,
            Override::Delete { key, value } => {
                let current = tree::get(cfg, key).ok_or_else(|| ConfigError::KeyNotFound(key.clone()))?;
                if let Some(expected) = value {
                    if current != expected {
                        return Err(ConfigError::DeleteMismatch {
                            key: key.clone(),
                            expected: scalar_text(expected),
                        });
                    }
                }
                remove(cfg, key)?;
            }
        }
        Ok(())
    }
}

impl FromStr for Override {
    type Err = ConfigError;

    fn from_str(arg: &str) -> Result<Self> {
        let bad = || ConfigError::BadOverride(arg.to_string());

        if let Some(rest) = arg.strip_prefix('~') {
            return match rest.split_once('=') {
                Some((key, value)) => Ok(Override::Delete {
                    key: parse_key(key).ok_or_else(bad)?,
                    value: Some(parse_value(value).map_err(|_| bad())?),
                }),
                None => Ok(Override::Delete { key: parse_key(rest).ok_or_else(bad)?, value: None }),
            };
        }

        let (key, value) = arg.split_once('=').ok_or_else(bad)?;
        let value = parse_value(value).map_err(|_| bad())?;
        if let Some(key) = key.strip_prefix("++") {
            Ok(Override::Force { key: parse_key(key).ok_or_else(bad)?, value })
        } else if let Some(key) = key.strip_prefix('+') {
            Ok(Override::Add { key: parse_key(key).ok_or_else(bad)?, value })
        } else {
            Ok(Override::Set { key: parse_key(key).ok_or_else(bad)?, value })
        }
    }
}

/// Render a scalar the way it would be written on the command line
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => serde_yaml::to_string(other).map(|s| s.trim_end().to_string()).unwrap_or_default(),
    }
}

fn parse_key(key: &str) -> Option<String> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && !key.ends_with('.')
        && !key.contains("..")
        && !key.chars().any(|c| c.is_whitespace() || c == '+' || c == '~');
    valid.then(|| key.to_string())
}

/// Values are YAML, `key=` is the empty string
fn parse_value(text: &str) -> std::result::Result<Value, serde_yaml::Error> {
    if text.is_empty() {
        return Ok(Value::String(String::new()));
    }
    serde_yaml::from_str(text)
}

/// Walk to `key`, creating intermediate mappings when `create` is set
fn lookup_mut<'a>(cfg: &'a mut Value, key: &str, create: bool) -> Result<Option<&'a mut Value>> {
    let mut node = cfg;
    for segment in tree::segments(key) {
        let map = node.as_mapping_mut().ok_or_else(|| ConfigError::NotAMapping(key.to_string()))?;
        let name = Value::String(segment.to_string());
        if !map.contains_key(&name) {
            if !create {
                return Ok(None);
            }
            map.insert(name.clone(), Value::Mapping(Mapping::new()));
        }
        node = match map.get_mut(&name) {
            Some(child) => child,
            None => return Ok(None),
        };
    }
    Ok(Some(node))
}

fn insert(cfg: &mut Value, key: &str, value: Value) -> Result<()> {
    let slot = lookup_mut(cfg, key, true)?.ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;
    *slot = value;
    Ok(())
}

fn remove(cfg: &mut Value, key: &str) -> Result<()> {
    let (parent, leaf) = match key.rsplit_once('.') {
        Some((parent, leaf)) => (parent, leaf),
        None => ("", key),
    };
    let parent = lookup_mut(cfg, parent, false)?.ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;
    parent
        .as_mapping_mut()
        .and_then(|map| map.remove(leaf))
        .map(|_| ())
        .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))
}
