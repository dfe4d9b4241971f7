//! 💓 `/api/health` and `/api/status` — "are you alive" and "how are you
//! really", respectively.

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::api::SharedState;

pub async fn health() -> Json<Value> {
    Json(json!({"ok": true}))
}

/// 📊 Flat runtime summary: per-category totals and key fields, watcher
/// count, and where the configuration lives. The daemon's annual report,
/// available on demand.
pub async fn status(State(state): State<SharedState>) -> Json<Value> {
    let orchestrator = &state.orchestrator;
    let store = orchestrator.store().read().await;

    let clients: Vec<Value> = store
        .clients
        .values()
        .map(|c| json!({"id": c.id, "enabled": c.enabled, "type": c.client_type, "name": c.name}))
        .collect();
    let servers: Vec<Value> = store
        .servers
        .values()
        .map(|s| {
            json!({
                "id": s.id,
                "enabled": s.enabled,
                "hostname": s.hostname,
                "displayName": s.display_name,
            })
        })
        .collect();
    let events: Vec<Value> = store
        .events
        .values()
        .map(|e| {
            json!({
                "id": e.id,
                "enabled": e.enabled,
                "baseEvent": e.base_event,
                "priority": e.priority,
                "sinkIds": e.sink_ids,
            })
        })
        .collect();
    let sinks: Vec<Value> = store
        .sinks
        .values()
        .map(|s| json!({"id": s.id, "enabled": s.enabled, "kind": s.kind, "name": s.name}))
        .collect();

    let category = |list: Vec<Value>, enabled: usize| {
        json!({"total": list.len(), "enabled": enabled, "list": list})
    };
    let enabled_count =
        |values: &[Value]| values.iter().filter(|v| v["enabled"] == true).count();

    let body = json!({
        "running": orchestrator.is_running(),
        "reloading": orchestrator.is_reloading(),
        "clients": category(clients.clone(), enabled_count(&clients)),
        "servers": category(servers.clone(), enabled_count(&servers)),
        "events": category(events.clone(), enabled_count(&events)),
        "sinks": category(sinks.clone(), enabled_count(&sinks)),
        "watchers": orchestrator.watcher_count().await,
        "configPath": store.root_path().display().to_string(),
        "configDirectory": store.config_dir().display().to_string(),
    });
    Json(body)
}
