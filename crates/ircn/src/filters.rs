//! 🌲 Filter trees: AND/OR groups over predicate leaves, evaluated
//! against a record context. The bouncer's clipboard of the pipeline —
//! every record gets looked up and down before an event lets it in.
//!
//! Leaf values and patterns may themselves carry `{{...}}` references,
//! expanded at evaluation time. Yes, a filter can compare a field against
//! another field. Yes, people actually do this. 🦆

use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::templating;

/// 🎭 A node is either a group (`operator` + `filters`) or a leaf.
/// Untagged: the presence of `filters` decides which arm deserializes.
/// There is no third thing. There is only the enum.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterNode {
    Group(FilterGroup),
    Leaf(FilterLeaf),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterGroup {
    pub operator: GroupOp,
    pub filters: Vec<FilterNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupOp {
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterLeaf {
    pub field: String,
    pub operator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<String>,
}

/// ⚖️ Evaluate `node` against the serialized record context.
/// AND short-circuits on the first false, OR on the first true — we do
/// not evaluate leaves recreationally.
pub fn evaluate(node: &FilterNode, ctx: &Value) -> bool {
    match node {
        FilterNode::Group(group) => match group.operator {
            GroupOp::And => group.filters.iter().all(|child| evaluate(child, ctx)),
            GroupOp::Or => group.filters.iter().any(|child| evaluate(child, ctx)),
        },
        FilterNode::Leaf(leaf) => evaluate_leaf(leaf, ctx),
    }
}

fn evaluate_leaf(leaf: &FilterLeaf, ctx: &Value) -> bool {
    let field = templating::lookup(ctx, &leaf.field);
    match leaf.operator.as_str() {
        "equals" => eq(leaf, field, ctx),
        "notEquals" => !eq(leaf, field, ctx),
        "contains" => contains(leaf, field, ctx),
        "notContains" => !contains(leaf, field, ctx),
        "matches" => matches(leaf, field, ctx).unwrap_or(false),
        // An invalid regex fails the leaf for both polarities.
        "notMatches" => matches(leaf, field, ctx).map(|b| !b).unwrap_or(false),
        "exists" => exists(field),
        "notExists" => !exists(field),
        "in" => is_in(leaf, field, ctx),
        "notIn" => !is_in(leaf, field, ctx),
        other => {
            warn_unknown_operator(other);
            false
        }
    }
}

/// 🔄 The leaf's `value` with template references expanded: strings
/// expand, array elements expand element-wise, everything else passes
/// through untouched.
fn expanded_value(leaf: &FilterLeaf, ctx: &Value) -> Value {
    match &leaf.value {
        Some(Value::String(s)) => Value::String(templating::expand(s, ctx)),
        Some(Value::Array(items)) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Value::String(templating::expand(s, ctx)),
                    other => other.clone(),
                })
                .collect(),
        ),
        Some(other) => other.clone(),
        None => Value::Null,
    }
}

fn eq(leaf: &FilterLeaf, field: Option<&Value>, ctx: &Value) -> bool {
    match field {
        Some(actual) => *actual == expanded_value(leaf, ctx),
        None => false,
    }
}

fn contains(leaf: &FilterLeaf, field: Option<&Value>, ctx: &Value) -> bool {
    let needle = expanded_value(leaf, ctx);
    match field {
        Some(Value::String(haystack)) => haystack.contains(&value_text(&needle)),
        Some(Value::Array(items)) => items.contains(&needle),
        _ => false,
    }
}

fn matches(leaf: &FilterLeaf, field: Option<&Value>, ctx: &Value) -> Option<bool> {
    let Some(Value::String(text)) = field else {
        return Some(false);
    };
    let pattern = leaf.pattern.as_deref().unwrap_or_default();
    let pattern = if templating::has_refs(pattern) {
        templating::expand(pattern, ctx)
    } else {
        pattern.to_string()
    };
    match compile(&pattern, leaf.flags.as_deref().unwrap_or_default()) {
        Ok(re) => Some(re.is_match(text)),
        Err(err) => {
            warn!(pattern = %pattern, %err, "invalid filter regex");
            None
        }
    }
}

fn exists(field: Option<&Value>) -> bool {
    matches!(field, Some(value) if !value.is_null())
}

fn is_in(leaf: &FilterLeaf, field: Option<&Value>, ctx: &Value) -> bool {
    match (expanded_value(leaf, ctx), field) {
        (Value::Array(items), Some(actual)) => items.contains(actual),
        _ => false,
    }
}

/// 🔧 Compile a pattern with JS-style flag characters. `i`, `m`, `s` map
/// to the regex builder toggles; `g` has no per-match meaning here and is
/// accepted silently — configs wrote `g` for a decade, no point arguing.
pub fn compile(pattern: &str, flags: &str) -> Result<regex::Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .build()
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn warn_unknown_operator(operator: &str) {
    static SEEN: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();
    let seen = SEEN.get_or_init(|| Mutex::new(HashSet::new()));
    let mut seen = match seen.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if seen.insert(operator.to_string()) {
        warn!(operator, "unknown filter operator, leaf evaluates false");
    }
}
