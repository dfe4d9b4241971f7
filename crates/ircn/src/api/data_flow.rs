//! 🗺️ `/api/data-flow` — the full runtime graph of analyzed clients,
//! servers, sinks, events, and the cross-product of routing paths,
//! disabled components included. "Why didn't my notification fire?"
//! starts here, not in the logs. 🦆

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::api::SharedState;
use crate::filters::FilterNode;
use crate::store::model::{BaseEvent, EventConfig, SinkConfig};
use crate::templating;

pub async fn data_flow(State(state): State<SharedState>) -> Json<Value> {
    let store = state.orchestrator.store().read().await;

    let clients: Vec<Value> = store
        .clients
        .values()
        .map(|c| {
            let rules: Vec<Value> = c
                .parser_rules
                .iter()
                .map(|r| {
                    let captured: Vec<&String> = r.fields.values().collect();
                    json!({
                        "name": r.name,
                        "priority": r.priority,
                        "skip": r.skip,
                        "messageType": r.message_type,
                        "capturedFields": captured,
                    })
                })
                .collect();
            json!({
                "id": c.id,
                "name": c.name,
                "type": c.client_type,
                "enabled": c.enabled,
                "logDirectory": c.log_directory,
                "parserRules": rules,
            })
        })
        .collect();

    let servers: Vec<Value> = store
        .servers
        .values()
        .map(|s| {
            json!({
                "id": s.id,
                "displayName": s.display_name,
                "hostname": s.hostname,
                "enabled": s.enabled,
            })
        })
        .collect();

    let sinks: Vec<Value> = store.sinks.values().map(analyze_sink).collect();
    let events: Vec<Value> = store.events.values().map(analyze_event).collect();
    let paths = routing_paths(&store);

    let enabled = |values: &[Value]| values.iter().filter(|v| v["enabled"] == true).count();
    let statistics = json!({
        "clients": {"total": clients.len(), "enabled": enabled(&clients)},
        "servers": {"total": servers.len(), "enabled": enabled(&servers)},
        "sinks": {"total": sinks.len(), "enabled": enabled(&sinks)},
        "events": {"total": events.len(), "enabled": enabled(&events)},
        "paths": {"total": paths.len(), "enabled": enabled(&paths)},
    });

    Json(json!({
        "statistics": statistics,
        "clients": clients,
        "servers": servers,
        "sinks": sinks,
        "events": events,
        "paths": paths,
        "baseEventTypes": base_event_types(),
    }))
}

/// 🔍 Template references detected in the sink's title/body templates,
/// plus rate-limit posture.
fn analyze_sink(sink: &SinkConfig) -> Value {
    let refs = |template: Option<&String>| -> Vec<String> {
        template
            .map(|t| templating::extract_refs(t))
            .unwrap_or_default()
    };
    let template = sink.template.as_ref();
    json!({
        "id": sink.id,
        "kind": sink.kind,
        "name": sink.name,
        "enabled": sink.enabled,
        "templateFields": {
            "title": refs(template.and_then(|t| t.title.as_ref())),
            "body": refs(template.and_then(|t| t.body.as_ref())),
        },
        "hasRateLimit": sink.rate_limit.is_some(),
    })
}

fn analyze_event(event: &EventConfig) -> Value {
    json!({
        "id": event.id,
        "name": event.name,
        "enabled": event.enabled,
        "baseEvent": event.base_event,
        "priority": event.priority,
        "serverIds": event.server_ids,
        "sinkIds": event.sink_ids,
        "filterComplexity": event.filters.as_ref().map(filter_complexity).unwrap_or(0),
        "usesTemplates": value_uses_templates(&Value::Object(event.metadata.clone())),
    })
}

/// 🧮 Depth plus leaf count: a single leaf scores 2, a two-leaf AND
/// group scores 4, and so on. Not science, but a decent smell test for
/// "this filter tree has gotten out of hand".
fn filter_complexity(node: &FilterNode) -> usize {
    fn walk(node: &FilterNode, depth: usize, max_depth: &mut usize, leaves: &mut usize) {
        *max_depth = (*max_depth).max(depth);
        match node {
            FilterNode::Group(group) => {
                for child in &group.filters {
                    walk(child, depth + 1, max_depth, leaves);
                }
            }
            FilterNode::Leaf(_) => *leaves += 1,
        }
    }
    let mut max_depth = 0;
    let mut leaves = 0;
    walk(node, 1, &mut max_depth, &mut leaves);
    max_depth + leaves
}

fn value_uses_templates(value: &Value) -> bool {
    match value {
        Value::String(s) => templating::has_refs(s),
        Value::Array(items) => items.iter().any(value_uses_templates),
        Value::Object(map) => map.values().any(value_uses_templates),
        _ => false,
    }
}

/// 🛤️ client × server × event × sinks, expanded per the event's server
/// list (`*` fans out to every server). Sorted by event priority
/// descending, then event name ascending. Every road a notification could
/// travel, including the closed ones.
fn routing_paths(store: &crate::store::ConfigStore) -> Vec<Value> {
    let mut ordered_events: Vec<&EventConfig> = store.events.values().collect();
    ordered_events.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.name.cmp(&b.name))
    });

    let mut paths = Vec::new();
    for event in ordered_events {
        let server_ids: Vec<&String> = if event.server_ids.iter().any(|id| id == "*") {
            store.servers.keys().collect()
        } else {
            event
                .server_ids
                .iter()
                .filter(|id| store.servers.contains_key(*id))
                .collect()
        };
        let any_sink_enabled = event
            .sink_ids
            .iter()
            .any(|id| store.sinks.get(id).is_some_and(|s| s.enabled));
        for client in store.clients.values() {
            for server_id in &server_ids {
                let server = &store.servers[*server_id];
                paths.push(json!({
                    "clientId": client.id,
                    "serverId": server.id,
                    "eventId": event.id,
                    "eventName": event.name,
                    "eventPriority": event.priority,
                    "sinkIds": event.sink_ids,
                    "enabled": client.enabled
                        && server.enabled
                        && event.enabled
                        && any_sink_enabled,
                }));
            }
        }
    }
    paths
}

fn base_event_types() -> Value {
    let bases = [
        BaseEvent::Message,
        BaseEvent::Join,
        BaseEvent::Part,
        BaseEvent::Quit,
        BaseEvent::Nick,
        BaseEvent::Kick,
        BaseEvent::Mode,
        BaseEvent::Topic,
        BaseEvent::Connect,
        BaseEvent::Disconnect,
        BaseEvent::Any,
    ];
    let mut map = serde_json::Map::new();
    for base in bases {
        let key = serde_json::to_value(base)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default();
        let types = base
            .message_types()
            .map(|t| t.to_vec())
            .unwrap_or_else(|| vec!["*"]);
        map.insert(key, json!(types));
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_complexity_scores_depth_plus_leaves() {
        let leaf: FilterNode = serde_json::from_value(json!({
            "field": "message.content", "operator": "exists",
        }))
        .unwrap();
        assert_eq!(filter_complexity(&leaf), 2);

        let tree: FilterNode = serde_json::from_value(json!({
            "operator": "AND",
            "filters": [
                {"field": "a", "operator": "exists"},
                {"operator": "OR", "filters": [
                    {"field": "b", "operator": "exists"},
                    {"field": "c", "operator": "exists"},
                ]},
            ],
        }))
        .unwrap();
        // depth 3, leaves 3
        assert_eq!(filter_complexity(&tree), 6);
    }

    #[test]
    fn template_detection_walks_nested_metadata() {
        assert!(value_uses_templates(&json!({
            "sink": {"phone": {"title": "{{server.displayName}}"}},
        })));
        assert!(!value_uses_templates(&json!({"plain": ["x", 1, true]})));
    }

    #[test]
    fn base_event_types_cover_the_taxonomy() {
        let types = base_event_types();
        assert_eq!(types["message"], json!(["privmsg", "notice"]));
        assert_eq!(types["connect"], json!(["system"]));
        assert_eq!(types["any"], json!(["*"]));
    }
}
