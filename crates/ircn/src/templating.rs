//! 🔤 `{{dotted.path}}` template expansion against a context object.
//! The mail merge of the pipeline. 📬
//!
//! An unresolved reference (missing key at any depth, or a terminal null)
//! is left verbatim in the output. That is deliberate: a notification that
//! reads `[{{server.displayName}}]` tells the operator exactly which path
//! failed to resolve, which beats an empty bracket every time.
//! Debugging by leaving the crime scene intact. 🕵️

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

fn ref_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").unwrap())
}

/// 🗺️ Resolve a dotted path by sequential lookup on `ctx`. Numeric
/// segments index into arrays. A null or missing intermediate yields
/// `None` — no panics, no drama, just a polite shrug.
pub fn lookup<'a>(ctx: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = ctx;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// 🔄 Expand every `{{path}}` reference in `template` against `ctx`.
pub fn expand(template: &str, ctx: &Value) -> String {
    ref_pattern()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let path = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            match lookup(ctx, path) {
                Some(value) if !value.is_null() => stringify(value),
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// 🌳 Recursively expand string leaves of `value`; non-strings pass
/// through untouched. Always returns a new value — the input is never
/// mutated, because surprise mutation is how trust dies.
pub fn expand_deep(value: &Value, ctx: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(expand(s, ctx)),
        Value::Array(items) => Value::Array(items.iter().map(|v| expand_deep(v, ctx)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), expand_deep(v, ctx)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// 👀 Does `s` contain at least one `{{...}}` reference?
pub fn has_refs(s: &str) -> bool {
    ref_pattern().is_match(s)
}

/// 📋 The dotted paths referenced by `s`, without delimiters, in order of
/// appearance. Duplicates are kept — we report, you dedupe.
pub fn extract_refs(s: &str) -> Vec<String> {
    ref_pattern()
        .captures_iter(s)
        .map(|caps| caps[1].to_string())
        .collect()
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // Compound values render as JSON so the reference stays inspectable.
        other => other.to_string(),
    }
}
