use std::env;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use serde_yaml::{Mapping, Value};

use crate::config::error::{ConfigError, Result};
use crate::config::overrides::scalar_text;
use crate::config::tree;

/// Resolve `${dotted.key}`, `${oc.env:NAME[,default]}` and `${now:<strftime>}` references
/// against the whole tree
///
/// A string that is a single reference takes the type of what it points at, anything else is
/// concatenated as text. References nest (`${oc.env:USER,${default_user}}`) and `\${` is a
/// literal `${`.
pub fn resolve(root: &Value) -> Result<Value> {
    Resolver::new(root).value(root)
}

/// Resolve the subtree at `path` (references may point anywhere in the tree)
pub fn resolve_at(root: &Value, path: &str) -> Result<Option<Value>> {
    match tree::get(root, path) {
        Some(node) => Resolver::new(root).value(node).map(Some),
        None => Ok(None),
    }
}

enum Piece<'s> {
    Text(&'s str),
    Reference(&'s str),
}

fn pieces(s: &str) -> Vec<Piece<'_>> {
    let mut out = Vec::new();
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        if rest[..start].ends_with('\\') {
            if start > 1 {
                out.push(Piece::Text(&rest[..start - 1]));
            }
            out.push(Piece::Text("${"));
            rest = &rest[start + 2..];
            continue;
        }
        let Some(len) = closing_brace(&rest[start + 2..]) else { break };
        if start > 0 {
            out.push(Piece::Text(&rest[..start]));
        }
        out.push(Piece::Reference(rest[start + 2..start + 2 + len].trim()));
        rest = &rest[start + 3 + len..];
    }
    if !rest.is_empty() {
        out.push(Piece::Text(rest));
    }
    out
}

/// Offset of the `}` closing a reference body, skipping nested `{...}`
fn closing_brace(body: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in body.char_indices() {
        match c {
            '{' => depth += 1,
            '}' if depth == 0 => return Some(i),
            '}' => depth -= 1,
            _ => {}
        }
    }
    None
}

struct Resolver<'a> {
    root: &'a Value,
    stack: Vec<String>,
    /// one timestamp per resolution so `${now:..}` pieces agree
    now: DateTime<Local>,
}

impl<'a> Resolver<'a> {
    fn new(root: &'a Value) -> Resolver<'a> {
        Resolver { root, stack: Vec::new(), now: Local::now() }
    }

    fn value(&mut self, node: &Value) -> Result<Value> {
        match node {
            Value::String(s) => self.string(s),
            Value::Sequence(items) => items.iter().map(|item| self.value(item)).collect::<Result<Vec<_>>>().map(Value::Sequence),
            Value::Mapping(map) => {
                let mut out = Mapping::new();
                for (k, v) in map {
                    out.insert(k.clone(), self.value(v)?);
                }
                Ok(Value::Mapping(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn string(&mut self, s: &str) -> Result<Value> {
        match pieces(s).as_slice() {
            [Piece::Reference(reference)] => self.reference(reference),
            parts => {
                let mut text = String::new();
                for piece in parts {
                    match piece {
                        Piece::Text(t) => text.push_str(t),
                        Piece::Reference(reference) => text.push_str(&scalar_text(&self.reference(reference)?)),
                    }
                }
                Ok(Value::String(text))
            }
        }
    }

    fn reference(&mut self, reference: &str) -> Result<Value> {
        if reference.contains("${") {
            let expanded = scalar_text(&self.string(reference)?);
            return self.reference(&expanded);
        }
        if let Some(var) = reference.strip_prefix("oc.env:") {
            return env_var(var);
        }
        if let Some(format) = reference.strip_prefix("now:") {
            return self.timestamp(format);
        }
        if self.stack.iter().any(|seen| seen == reference) {
            return Err(ConfigError::InterpolationCycle(reference.to_string()));
        }
        let target = tree::get(self.root, reference)
            .ok_or_else(|| ConfigError::MissingInterpolationKey(reference.to_string()))?;

        self.stack.push(reference.to_string());
        let resolved = self.value(target);
        self.stack.pop();
        resolved
    }

    fn timestamp(&self, format: &str) -> Result<Value> {
        if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::BadTimeFormat(format.to_string()));
        }
        Ok(Value::String(self.now.format_with_items(StrftimeItems::new(format)).to_string()))
    }
}

fn env_var(arg: &str) -> Result<Value> {
    let (name, default) = match arg.split_once(',') {
        Some((name, default)) => (name.trim(), Some(default.trim())),
        None => (arg.trim(), None),
    };
    match (env::var(name), default) {
        (Ok(value), _) => Ok(Value::String(value)),
        (Err(_), Some(default)) => Ok(Value::String(default.to_string())),
        (Err(_), None) => Err(ConfigError::MissingEnv(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn whole_string_reference_keeps_type() {
        let cfg = yaml("trainer: {gpus: 4}\nslurm: {n_gpus: '${trainer.gpus}'}");
        let resolved = resolve(&cfg).unwrap();
        assert_eq!(tree::get(&resolved, "slurm.n_gpus"), Some(&Value::from(4)));
    }

    #[test]
    fn embedded_references_concatenate() {
        let cfg = yaml("model: {name: gpt, size: 125}\nslurm: {run_name: '${model.name}-${model.size}m'}");
        let slurm = resolve_at(&cfg, "slurm").unwrap().unwrap();
        assert_eq!(slurm, yaml("run_name: gpt-125m"));
    }

    #[test]
    fn references_chain() {
        let cfg = yaml("a: '${b}'\nb: '${c}'\nc: done");
        assert_eq!(resolve(&cfg).unwrap(), yaml("a: done\nb: done\nc: done"));
    }

    #[test]
    fn missing_key_is_an_error() {
        let cfg = yaml("a: '${nope.x}'");
        assert!(matches!(resolve(&cfg), Err(ConfigError::MissingInterpolationKey(k)) if k == "nope.x"));
    }

    #[test]
    fn cycles_are_detected() {
        let cfg = yaml("a: '${b}'\nb: '${a}'");
        assert!(matches!(resolve(&cfg), Err(ConfigError::InterpolationCycle(_))));
    }

    #[test]
    fn env_references_fall_back_to_default() {
        let cfg = yaml("user: '${oc.env:SLURM_SEND_SURELY_UNSET_VAR,nobody}'");
        assert_eq!(resolve(&cfg).unwrap(), yaml("user: nobody"));

        let cfg = yaml("user: '${oc.env:SLURM_SEND_SURELY_UNSET_VAR}'");
        assert!(matches!(resolve(&cfg), Err(ConfigError::MissingEnv(_))));
    }

    #[test]
    fn unterminated_reference_is_plain_text() {
        let cfg = yaml("a: 'cost ${5'");
        assert_eq!(resolve(&cfg).unwrap(), cfg);
    }

    #[test]
    fn nested_references_resolve_inside_out() {
        let cfg = yaml("fallback: guest\nuser: '${oc.env:SLURM_SEND_SURELY_UNSET_VAR,${fallback}}'");
        assert_eq!(tree::get(&resolve(&cfg).unwrap(), "user"), Some(&Value::from("guest")));

        let cfg = yaml("which: small\nsizes: {small: 6}\nlayers: '${sizes.${which}}'");
        assert_eq!(tree::get(&resolve(&cfg).unwrap(), "layers"), Some(&Value::from(6)));
    }

    #[test]
    fn escaped_reference_is_literal() {
        let cfg = yaml("a: 1\nprice: 'cost \\${a} or ${a}'");
        assert_eq!(tree::get(&resolve(&cfg).unwrap(), "price"), Some(&Value::from("cost ${a} or 1")));
    }

    #[test]
    fn now_formats_a_single_timestamp() {
        use chrono::TimeZone;

        let cfg = yaml("dir: 'outputs/${now:%Y-%m-%d}/${now:%H-%M-%S}'");
        let now = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let resolved = Resolver { root: &cfg, stack: Vec::new(), now }.value(&cfg).unwrap();
        assert_eq!(resolved, yaml("dir: outputs/2024-03-09/07-05-01"));

        let cfg = yaml("dir: '${now:%Y%}'");
        assert!(matches!(resolve(&cfg), Err(ConfigError::BadTimeFormat(_))));
    }

    #[test]
    fn unresolved_subtree_is_none() {
        assert!(resolve_at(&yaml("a: 1"), "slurm").unwrap().is_none());
    }
}
