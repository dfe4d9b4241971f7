//! ⚙️ The event processor — server enrichment, base-event matching,
//! filter evaluation, and per-event metadata expansion. The part of the
//! pipeline that decides whether a line is Your Problem or just scroll.
//!
//! Built fresh from each config snapshot: enabled events sorted by
//! descending priority (stable, so load order breaks ties) plus the full
//! server list. Disabled servers are retained so a record that matches
//! one can be dropped cleanly rather than silently un-enriched — a
//! disabled server is muted, not forgotten. 🔇

use serde_json::Value;
use tracing::{debug, trace};

use crate::record::{DEV_CLIENT_ID, DEV_SINK_ID, MessageRecord, ServerInfo};
use crate::store::model::{BaseEvent, EventConfig, ServerConfig};
use crate::{filters, templating};

pub struct EventProcessor {
    events: Vec<EventConfig>,
    servers: Vec<ServerConfig>,
}

impl EventProcessor {
    /// 🏗️ `events` may arrive in any order; disabled ones are dropped
    /// here and the rest sorted by priority. Highest first. It's a
    /// leaderboard.
    pub fn new(events: Vec<EventConfig>, servers: Vec<ServerConfig>) -> Self {
        let mut events: Vec<EventConfig> = events.into_iter().filter(|e| e.enabled).collect();
        events.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { events, servers }
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// 🔄 Enrich `record` with server/user context, then test it against
    /// every enabled event in priority order. Matched events come back
    /// with their metadata deep-expanded against the enriched record,
    /// ready for the dispatcher to work its mail merge.
    pub fn process_message(&self, record: &mut MessageRecord) -> Vec<EventConfig> {
        if let Some(server) = self.find_server(record) {
            if !server.enabled {
                debug!(server = %server.id, "dropping record for disabled server");
                return Vec::new();
            }
            enrich(record, server);
        }

        let ctx = record.to_context();
        let mut matched = Vec::new();
        for event in &self.events {
            if !base_event_matches(event.base_event, record) {
                continue;
            }
            if !server_ids_match(event, record) {
                continue;
            }
            if let Some(tree) = &event.filters
                && !filters::evaluate(tree, &ctx)
            {
                continue;
            }
            trace!(event = %event.id, "event matched");
            let mut hit = event.clone();
            let metadata = std::mem::take(&mut hit.metadata);
            hit.metadata = match templating::expand_deep(&Value::Object(metadata), &ctx) {
                Value::Object(map) => map,
                _ => Default::default(),
            };
            if record.client.id == DEV_CLIENT_ID {
                // test-generator traffic is redirected to the capture sink
                hit.sink_ids = vec![DEV_SINK_ID.to_string()];
            }
            matched.push(hit);
        }
        matched
    }

    /// 🪜 The server-lookup ladder. First hit wins, the rest go home:
    /// 1. exact hostname equality with `metadata.serverHostname`
    /// 2. `metadata.serverIdentifier` vs `metadata.uuid`, full then the
    ///    last three hyphen-separated segments (compatibility shim for
    ///    one client family's partial-UUID folder names)
    /// 3. case-insensitive equality with `displayName`
    /// 4. case-insensitive equality with `id`
    /// 5. case-insensitive prefix match against `displayName`
    /// 6. case-insensitive substring match against `id`
    fn find_server(&self, record: &MessageRecord) -> Option<&ServerConfig> {
        let meta_str = |key: &str| {
            record
                .metadata
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
        };

        if let Some(hostname) = meta_str("serverHostname")
            && let Some(server) = self.servers.iter().find(|s| s.hostname == hostname)
        {
            return Some(server);
        }

        let identifier = meta_str("serverIdentifier")?;
        let ident_lower = identifier.to_lowercase();

        for server in &self.servers {
            if let Some(uuid) = server.metadata.get("uuid").and_then(Value::as_str) {
                if uuid.eq_ignore_ascii_case(identifier) {
                    return Some(server);
                }
                if let Some(partial) = partial_uuid(uuid)
                    && partial.eq_ignore_ascii_case(identifier)
                {
                    return Some(server);
                }
            }
        }
        if let Some(server) = self
            .servers
            .iter()
            .find(|s| s.display_name.eq_ignore_ascii_case(identifier))
        {
            return Some(server);
        }
        if let Some(server) = self
            .servers
            .iter()
            .find(|s| s.id.eq_ignore_ascii_case(identifier))
        {
            return Some(server);
        }
        if let Some(server) = self.servers.iter().find(|s| {
            !s.display_name.is_empty()
                && ident_lower.starts_with(&s.display_name.to_lowercase())
        }) {
            return Some(server);
        }
        self.servers
            .iter()
            .find(|s| ident_lower.contains(&s.id.to_lowercase()))
    }
}

/// 📡 Attach server context and merge metadata. Server metadata first,
/// then known-user metadata on top — the user wins on conflicts, because
/// people outrank infrastructure.
fn enrich(record: &mut MessageRecord, server: &ServerConfig) {
    record.server = Some(ServerInfo {
        id: server.id.clone(),
        hostname: server.hostname.clone(),
        display_name: server.display_name.clone(),
        client_nickname: server.client_nickname.clone(),
        network: server.network.clone(),
        port: server.port,
        metadata: server.metadata.clone(),
    });
    for (key, value) in &server.metadata {
        record.metadata.insert(key.clone(), value.clone());
    }

    let Some(sender) = record.sender.as_mut() else {
        return;
    };
    let Some(user) = server.users.get(&sender.nickname) else {
        return;
    };
    if sender.realname.is_none() {
        sender.realname = user.realname.clone();
    }
    if sender.modes.is_none() {
        sender.modes = user.modes.clone();
    }
    for (key, value) in &user.metadata {
        record.metadata.insert(key.clone(), value.clone());
    }
}

/// ✂️ The last three hyphen-separated segments of a full UUID.
/// A compatibility shim for one client family's folder-naming habit —
/// they truncate UUIDs, we meet them where they are. 🤝
fn partial_uuid(uuid: &str) -> Option<String> {
    let segments: Vec<&str> = uuid.split('-').collect();
    if segments.len() < 3 {
        return None;
    }
    Some(segments[segments.len() - 3..].join("-"))
}

fn base_event_matches(base: BaseEvent, record: &MessageRecord) -> bool {
    let Some(allowed) = base.message_types() else {
        return true; // `any`
    };
    record
        .message
        .as_ref()
        .is_some_and(|m| allowed.contains(&m.kind.as_str()))
}

fn server_ids_match(event: &EventConfig, record: &MessageRecord) -> bool {
    if event.server_ids.iter().any(|id| id == "*") {
        return true;
    }
    record
        .server
        .as_ref()
        .is_some_and(|server| event.server_ids.iter().any(|id| *id == server.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ClientInfo, ParsedMessage, Sender};
    use serde_json::json;

    fn server(id: &str, enabled: bool) -> ServerConfig {
        serde_json::from_value(json!({
            "id": id,
            "hostname": format!("irc.{id}.chat"),
            "displayName": capitalize(id),
            "clientNickname": "tester",
            "enabled": enabled,
            "metadata": {"uuid": "AAAA-BBBB-CCCC-DDDD-EEEE"},
        }))
        .unwrap()
    }

    fn capitalize(s: &str) -> String {
        let mut chars = s.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    }

    fn event(id: &str, base: &str, servers: Vec<&str>, priority: i64) -> EventConfig {
        serde_json::from_value(json!({
            "id": id,
            "name": id,
            "baseEvent": base,
            "serverIds": servers,
            "sinkIds": ["console"],
            "priority": priority,
        }))
        .unwrap()
    }

    fn privmsg_record(identifier: Option<&str>) -> MessageRecord {
        let mut record = MessageRecord::new(
            "<alice> hey tester",
            ClientInfo {
                id: "textual".into(),
                client_type: "textual".into(),
                name: "Textual".into(),
                metadata: Default::default(),
            },
        );
        record.message = Some(ParsedMessage {
            content: "hey tester".into(),
            kind: "privmsg".into(),
        });
        record.sender = Some(Sender {
            nickname: "alice".into(),
            ..Default::default()
        });
        if let Some(identifier) = identifier {
            record
                .metadata
                .insert("serverIdentifier".into(), json!(identifier));
        }
        record
    }

    #[test]
    fn enriches_by_exact_hostname_first() {
        let processor = EventProcessor::new(
            vec![event("e", "message", vec!["*"], 0)],
            vec![server("libera", true), server("oftc", true)],
        );
        let mut record = privmsg_record(None);
        record
            .metadata
            .insert("serverHostname".into(), json!("irc.oftc.chat"));
        processor.process_message(&mut record);
        assert_eq!(record.server.as_ref().unwrap().id, "oftc");
    }

    #[test]
    fn matches_partial_uuid_identifier() {
        let processor = EventProcessor::new(
            vec![event("e", "message", vec!["*"], 0)],
            vec![server("libera", true)],
        );
        let mut record = privmsg_record(Some("CCCC-DDDD-EEEE"));
        processor.process_message(&mut record);
        assert_eq!(record.server.as_ref().unwrap().id, "libera");
    }

    #[test]
    fn falls_back_through_display_name_and_id() {
        let servers = vec![server("libera", true), server("oftc", true)];
        let processor = EventProcessor::new(vec![event("e", "message", vec!["*"], 0)], servers);

        let mut by_display = privmsg_record(Some("LIBERA"));
        processor.process_message(&mut by_display);
        assert_eq!(by_display.server.as_ref().unwrap().id, "libera");

        let mut by_prefix = privmsg_record(Some("Oftc (1234-5678)"));
        processor.process_message(&mut by_prefix);
        assert_eq!(by_prefix.server.as_ref().unwrap().id, "oftc");
    }

    #[test]
    fn disabled_server_drops_the_record() {
        let processor = EventProcessor::new(
            vec![event("e", "message", vec!["*"], 0)],
            vec![server("libera", false)],
        );
        let mut record = privmsg_record(Some("libera"));
        assert!(processor.process_message(&mut record).is_empty());
    }

    #[test]
    fn base_event_gates_on_message_type() {
        let processor = EventProcessor::new(
            vec![
                event("joins", "join", vec!["*"], 0),
                event("anything", "any", vec!["*"], 0),
            ],
            vec![],
        );
        let mut record = privmsg_record(None);
        let matched = processor.process_message(&mut record);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "anything");
    }

    #[test]
    fn server_ids_gate_non_wildcard_events() {
        let processor = EventProcessor::new(
            vec![
                event("only-oftc", "message", vec!["oftc"], 10),
                event("everywhere", "message", vec!["*"], 0),
            ],
            vec![server("libera", true)],
        );
        let mut record = privmsg_record(Some("libera"));
        let matched = processor.process_message(&mut record);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "everywhere");
    }

    #[test]
    fn events_come_back_in_priority_order() {
        let processor = EventProcessor::new(
            vec![
                event("low", "any", vec!["*"], 1),
                event("high", "any", vec!["*"], 99),
                event("mid", "any", vec!["*"], 50),
            ],
            vec![],
        );
        let mut record = privmsg_record(None);
        let ids: Vec<String> = processor
            .process_message(&mut record)
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["high", "mid", "low"]);
    }

    #[test]
    fn filters_run_against_the_enriched_record() {
        let mut with_filter = event("pinged", "message", vec!["*"], 0);
        with_filter.filters = Some(
            serde_json::from_value(json!({
                "field": "message.content",
                "operator": "contains",
                "value": "{{server.clientNickname}}",
            }))
            .unwrap(),
        );
        let processor =
            EventProcessor::new(vec![with_filter], vec![server("libera", true)]);
        let mut record = privmsg_record(Some("libera"));
        assert_eq!(processor.process_message(&mut record).len(), 1);

        let mut other = privmsg_record(Some("libera"));
        other.message.as_mut().unwrap().content = "nothing relevant".into();
        assert!(processor.process_message(&mut other).is_empty());
    }

    #[test]
    fn matched_event_metadata_is_deep_expanded() {
        let mut with_meta = event("meta", "message", vec!["*"], 0);
        with_meta.metadata = json!({
            "sink": {"console": {"title": "{{sender.nickname}} says"}},
        })
        .as_object()
        .unwrap()
        .clone();
        let processor = EventProcessor::new(vec![with_meta], vec![server("libera", true)]);
        let mut record = privmsg_record(Some("libera"));
        let matched = processor.process_message(&mut record);
        assert_eq!(
            matched[0].metadata["sink"]["console"]["title"],
            "alice says"
        );
    }

    #[test]
    fn known_user_metadata_wins_over_server_metadata() {
        let mut srv = server("libera", true);
        srv.metadata.insert("team".into(), json!("server-team"));
        srv.users.insert(
            "alice".into(),
            serde_json::from_value(json!({
                "realname": "Alice Example",
                "metadata": {"team": "user-team"},
            }))
            .unwrap(),
        );
        let processor = EventProcessor::new(vec![event("e", "message", vec!["*"], 0)], vec![srv]);
        let mut record = privmsg_record(Some("libera"));
        processor.process_message(&mut record);
        assert_eq!(record.metadata["team"], "user-team");
        assert_eq!(
            record.sender.as_ref().unwrap().realname.as_deref(),
            Some("Alice Example")
        );
    }

    #[test]
    fn dev_client_records_redirect_to_the_capture_sink() {
        let processor = EventProcessor::new(vec![event("e", "any", vec!["*"], 0)], vec![]);
        let mut record = privmsg_record(None);
        record.client.id = DEV_CLIENT_ID.to_string();
        let matched = processor.process_message(&mut record);
        assert_eq!(matched[0].sink_ids, vec![DEV_SINK_ID]);
    }
}
