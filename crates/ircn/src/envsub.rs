//! 🌍 `${VAR}` / `${VAR:-default}` / `$VAR` substitution in string config
//! values — shell expansion cosplay, minus the shell, minus the footguns.
//!
//! The client adapter runs this over `logDirectory` so configs can say
//! `${HOME}/Library/Logs` and stay portable between the laptop and the
//! server. One config to rule them all. 🦆

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::Value;

fn braced_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").unwrap())
}

fn bare_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)\b").unwrap())
}

/// 🔄 Substitute environment references in `input` using the process
/// environment.
pub fn expand_str(input: &str) -> String {
    expand_with(input, |name| std::env::var(name).ok())
}

/// 🧪 Substitution with an injectable variable lookup — tests hand in a
/// closure and nobody has to mutate the real environment like a barbarian.
///
/// `${VAR:-default}` falls back to the default when the variable is absent
/// or empty. `${VAR}` and word-bounded `$VAR` are replaced only when the
/// variable is present; an absent variable leaves the literal in place
/// (same crime-scene-intact school of debugging as the templates).
pub fn expand_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let braced = braced_pattern().replace_all(input, |caps: &Captures<'_>| {
        let name = &caps[1];
        let value = lookup(name);
        match (value, caps.get(2)) {
            (Some(v), Some(default)) if v.is_empty() => default.as_str().to_string(),
            (Some(v), _) => v,
            (None, Some(default)) => default.as_str().to_string(),
            (None, None) => caps[0].to_string(),
        }
    });
    bare_pattern()
        .replace_all(&braced, |caps: &Captures<'_>| match lookup(&caps[1]) {
            Some(v) => v,
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// 🌳 Apply substitution recursively to every string leaf of `value`.
pub fn expand_value(value: &Value) -> Value {
    expand_value_with(value, &|name| std::env::var(name).ok())
}

fn expand_value_with(value: &Value, lookup: &impl Fn(&str) -> Option<String>) -> Value {
    match value {
        Value::String(s) => Value::String(expand_with(s, lookup)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| expand_value_with(item, lookup))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), expand_value_with(v, lookup)))
                .collect(),
        ),
        other => other.clone(),
    }
}
