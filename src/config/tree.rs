use serde_yaml::{Mapping, Value};

/// Split a dotted key path (`slurm.n_gpus`) into its segments
pub fn segments(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

pub fn get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    segments(path)
        .into_iter()
        .try_fold(root, |node, key| node.as_mapping()?.get(key))
}

/// Deep merge `overlay` into `base`, mappings merge key by key and anything else is replaced
pub fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (k, v) in overlay_map {
                match base_map.get_mut(&k) {
                    Some(existing) => merge(existing, v),
                    None => {
                        base_map.insert(k, v);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Nest `value` under a dotted package path, `a.b` gives `{a: {b: value}}`
pub fn wrap(value: Value, package: &str) -> Value {
    segments(package).into_iter().rev().fold(value, |inner, key| {
        let mut map = Mapping::new();
        map.insert(Value::String(key.to_string()), inner);
        Value::Mapping(map)
    })
}

pub fn empty() -> Value {
    Value::Mapping(Mapping::new())
}
