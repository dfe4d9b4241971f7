//! 🖥️ Console sink — prints rendered notifications to stdout, either as
//! a human-readable block or as one JSON object per delivery.
//!
//! Yes, this daemon's premium notification channel is println!. Sometimes
//! the simplest sink is the one you actually read. 🦆

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use crate::sinks::{Notifier, RenderedNotification};
use crate::store::model::{SinkConfig, TemplateFormat};
use crate::templating;

pub struct ConsoleSink {
    sink_id: String,
    format: TemplateFormat,
}

impl ConsoleSink {
    pub fn new(config: &SinkConfig) -> Self {
        Self {
            sink_id: config.id.clone(),
            format: config
                .template
                .as_ref()
                .map(|t| t.format)
                .unwrap_or_default(),
        }
    }

    fn render(&self, note: &RenderedNotification) -> String {
        if self.format == TemplateFormat::Json {
            return json!({
                "sink": self.sink_id,
                "event": note.event.name,
                "title": note.title,
                "body": note.body,
                "context": note.context,
                "timestamp": note.timestamp.to_rfc3339(),
            })
            .to_string();
        }

        let mut block = format!("{}\n{}\n", note.title, note.body);
        block.push_str(&format!("  at {}", note.timestamp.to_rfc3339()));
        let details = [
            ("sender.nickname", "from"),
            ("target.name", "in"),
            ("server.displayName", "on"),
        ];
        for (path, label) in details {
            if let Some(value) = templating::lookup(&note.context, path)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
            {
                block.push_str(&format!(" {label} {value}"));
            }
        }
        block.push('\n');
        block
    }
}

#[async_trait]
impl Notifier for ConsoleSink {
    async fn deliver(&mut self, note: &RenderedNotification) -> Result<()> {
        println!("{}", self.render(note));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::EventIdentity;
    use crate::store::model::BaseEvent;
    use chrono::Utc;

    fn note() -> RenderedNotification {
        RenderedNotification {
            title: "[Libera] alice".into(),
            body: "hey tester".into(),
            event: EventIdentity {
                id: "ping".into(),
                name: "Ping".into(),
                base_event: BaseEvent::Message,
            },
            context: json!({
                "sender": {"nickname": "alice"},
                "target": {"name": "#gen"},
                "server": {"displayName": "Libera"},
            }),
            timestamp: Utc::now(),
            sink_options: Default::default(),
            event_metadata: Default::default(),
        }
    }

    #[test]
    fn text_block_carries_title_body_and_details() {
        let config = serde_json::from_value(json!({"id": "console", "kind": "console"})).unwrap();
        let sink = ConsoleSink::new(&config);
        let block = sink.render(&note());
        assert!(block.starts_with("[Libera] alice\nhey tester\n"));
        assert!(block.contains("from alice"));
        assert!(block.contains("in #gen"));
        assert!(block.contains("on Libera"));
    }

    #[test]
    fn json_format_emits_a_structured_object() {
        let config = serde_json::from_value(json!({
            "id": "console", "kind": "console", "template": {"format": "json"},
        }))
        .unwrap();
        let sink = ConsoleSink::new(&config);
        let parsed: serde_json::Value = serde_json::from_str(&sink.render(&note())).unwrap();
        assert_eq!(parsed["sink"], "console");
        assert_eq!(parsed["event"], "Ping");
        assert_eq!(parsed["title"], "[Libera] alice");
        assert_eq!(parsed["context"]["sender"]["nickname"], "alice");
    }
}
