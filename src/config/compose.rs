use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde_yaml::Value;

use crate::config::error::{ConfigError, Result};
use crate::config::interpolation;
use crate::config::overrides::{scalar_text, Override};
use crate::config::tree;

/// Top-level key holding settings for this tool rather than the job, never persisted
pub static TOOL_NAMESPACE: &str = "hydra";

/// Where the job's files go unless `hydra.run.dir` says otherwise
pub static DEFAULT_RUN_DIR: &str = "outputs/${now:%Y-%m-%d}/${now:%H-%M-%S}";

/// Where the primary config lives: `<dir>/<name>.yaml`
pub struct ConfigSource {
    pub dir: PathBuf,
    pub name: String,
}

/// A composed config split into the job's part and the tool's part
pub struct ComposedConfig {
    /// Everything except the `hydra` namespace, this is what the training job sees
    pub job: Value,
    /// `hydra.run.dir` with interpolations resolved, relative paths are from the launch directory
    pub run_dir: PathBuf,
}

/// One entry of a primary config's `defaults` list
#[derive(Debug, Clone, PartialEq)]
enum DefaultEntry {
    /// `_self_`, the primary config's own content
    Primary,
    /// `name`, merged at the root
    File(String),
    /// `group: option`, `group@package: option` or `optional group: option`
    Group {
        group: String,
        package: Option<String>,
        option: Option<String>,
        optional: bool,
    },
}

impl DefaultEntry {
    fn parse(entry: &Value, path: &Path) -> Result<Self> {
        let bad = || ConfigError::BadDefault { path: path.to_path_buf(), entry: scalar_text(entry) };
        match entry {
            Value::String(s) if s == "_self_" => Ok(DefaultEntry::Primary),
            Value::String(s) => Ok(DefaultEntry::File(s.clone())),
            Value::Mapping(map) if map.len() == 1 => {
                let (key, option) = map.iter().next().ok_or_else(bad)?;
                let key = key.as_str().ok_or_else(bad)?;
                let option = match option {
                    Value::Null => None,
                    Value::String(s) => Some(s.clone()),
                    _ => return Err(bad()),
                };
                let (optional, key) = match key.strip_prefix("optional ") {
                    Some(rest) => (true, rest.trim()),
                    None => (false, key.strip_prefix("override ").unwrap_or(key).trim()),
                };
                let (group, package) = match key.split_once('@') {
                    Some((group, package)) => (group.to_string(), Some(package.to_string())),
                    None => (key.to_string(), None),
                };
                Ok(DefaultEntry::Group { group, package, option, optional })
            }
            _ => Err(bad()),
        }
    }

    fn group(&self) -> Option<&str> {
        match self {
            DefaultEntry::Group { group, .. } => Some(group),
            _ => None,
        }
    }
}

impl ConfigSource {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        ConfigSource { dir: dir.into(), name: name.into() }
    }

    /// Compose the primary config with its defaults list, then apply command line overrides
    ///
    /// `hydra.*` keys, from files or overrides, configure the run directory and are split off.
    pub fn compose(&self, overrides: &[Override]) -> Result<ComposedConfig> {
        let primary_path = self.dir.join(format!("{}.yaml", self.name));
        info!("Composing config from {}", primary_path.display());
        let mut primary = read_yaml(&primary_path)?;

        let mut defaults = match primary.as_mapping_mut().and_then(|map| map.remove("defaults")) {
            Some(Value::Sequence(entries)) => entries
                .iter()
                .map(|entry| DefaultEntry::parse(entry, &primary_path))
                .collect::<Result<Vec<_>>>()?,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(ConfigError::BadDefault { path: primary_path, entry: scalar_text(&other) });
            }
        };

        let (group_overrides, value_overrides): (Vec<&Override>, Vec<&Override>) =
            overrides.iter().partition(|o| self.is_group(o.key()));
        for o in group_overrides {
            select_group(&mut defaults, o)?;
        }

        if !defaults.contains(&DefaultEntry::Primary) {
            defaults.push(DefaultEntry::Primary);
        }

        let run_dir_key = format!("{}.run.dir", TOOL_NAMESPACE);
        let mut cfg = tree::wrap(Value::from(DEFAULT_RUN_DIR), &run_dir_key);
        for entry in defaults {
            match entry {
                DefaultEntry::Primary => tree::merge(&mut cfg, primary.clone()),
                DefaultEntry::File(name) => {
                    let layer = self.read_layer(&self.dir.join(format!("{name}.yaml")))?;
                    tree::merge(&mut cfg, layer);
                }
                DefaultEntry::Group { option: None, .. } => {}
                DefaultEntry::Group { group, package, option: Some(option), optional } => {
                    let path = self.dir.join(&group).join(format!("{option}.yaml"));
                    if optional && !path.exists() {
                        info!("Optional config {} not found, skipping", path.display());
                        continue;
                    }
                    let layer = self.read_layer(&path)?;
                    let package = package.unwrap_or_else(|| group.replace('/', "."));
                    match package.as_str() {
                        "_global_" => tree::merge(&mut cfg, layer),
                        package => tree::merge(&mut cfg, tree::wrap(layer, package)),
                    }
                }
            }
        }

        for o in value_overrides {
            info!("Applying override {}", o.key());
            o.apply(&mut cfg)?;
        }

        let run_dir = match interpolation::resolve_at(&cfg, &run_dir_key)? {
            Some(dir @ (Value::String(_) | Value::Number(_))) => PathBuf::from(scalar_text(&dir)),
            _ => return Err(ConfigError::KeyNotFound(run_dir_key)),
        };
        info!("Run directory {}", run_dir.display());
        if let Some(map) = cfg.as_mapping_mut() {
            map.remove(TOOL_NAMESPACE);
        }

        Ok(ComposedConfig { job: cfg, run_dir })
    }

    /// A key names a config group when the config directory has a subdirectory of that name
    fn is_group(&self, key: &str) -> bool {
        !key.contains('.') && self.dir.join(key).is_dir()
    }

    fn read_layer(&self, path: &Path) -> Result<Value> {
        let mut layer = read_yaml(path)?;
        if layer.as_mapping_mut().and_then(|map| map.remove("defaults")).is_some() {
            warn!("Nested defaults list in {} is not supported, ignoring it", path.display());
        }
        Ok(layer)
    }
}

/// Change which option of a group the defaults list loads
fn select_group(defaults: &mut Vec<DefaultEntry>, o: &Override) -> Result<()> {
    let key = o.key();
    let position = defaults.iter().position(|entry| entry.group() == Some(key));
    let option = |value: &Value| match value {
        Value::Null => None,
        other => Some(scalar_text(other)),
    };
    let new_entry = |value: &Value| DefaultEntry::Group {
        group: key.to_string(),
        package: None,
        option: option(value),
        optional: false,
    };

    match (o, position) {
        (Override::Set { value, .. } | Override::Force { value, .. }, Some(i)) => {
            if let DefaultEntry::Group { option: selected, .. } = &mut defaults[i] {
                *selected = option(value);
            }
        }
        (Override::Set { .. }, None) => return Err(ConfigError::KeyNotFound(key.to_string())),
        (Override::Add { .. }, Some(_)) => return Err(ConfigError::KeyExists(key.to_string())),
        (Override::Add { value, .. } | Override::Force { value, .. }, None) => defaults.push(new_entry(value)),
        (Override::Delete { .. }, Some(i)) => {
            defaults.remove(i);
        }
        (Override::Delete { .. }, None) => return Err(ConfigError::KeyNotFound(key.to_string())),
    }
    Ok(())
}

fn read_yaml(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    let value: Value =
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Yaml { path: path.to_path_buf(), source })?;
    Ok(match value {
        Value::Null => tree::empty(),
        value => value,
    })
}
