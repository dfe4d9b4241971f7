//! 🪝 Webhook sink — one HTTP request per notification, JSON or
//! plain-text body, with per-event field and header injection via
//! `event.metadata.webhook`. The "integrate with literally anything"
//! sink: if it speaks HTTP, it can hear about your mentions. 🦆

use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::trace;

use crate::sinks::{Notifier, RenderedNotification};
use crate::store::model::SinkConfig;
use crate::templating;

fn default_method() -> String {
    "POST".to_string()
}

fn default_format() -> String {
    "json".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// `json` or `text`.
    #[serde(default = "default_format")]
    pub format: String,
}

pub struct WebhookSink {
    sink_id: String,
    config: WebhookConfig,
    method: reqwest::Method,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(sink: &SinkConfig, client: reqwest::Client) -> Result<Self> {
        let config: WebhookConfig =
            serde_json::from_value(Value::Object(sink.config.clone()))
                .context("webhook sink requires 'url'")?;
        let method = reqwest::Method::from_bytes(config.method.to_uppercase().as_bytes())
            .with_context(|| format!("'{}' is not a valid HTTP method", config.method))?;
        Ok(Self {
            sink_id: sink.id.clone(),
            config,
            method,
            client,
        })
    }

    /// 📦 The structured JSON body: title, body, event identity, a
    /// context snapshot, plus any `event.metadata.webhook.fields` merged
    /// on top — per-event payload sculpting for picky receivers.
    fn json_body(&self, note: &RenderedNotification) -> Value {
        let snapshot = |path: &str| {
            templating::lookup(&note.context, path)
                .cloned()
                .unwrap_or(Value::Null)
        };
        let mut body = json!({
            "title": note.title,
            "body": note.body,
            "event": {
                "id": note.event.id,
                "name": note.event.name,
                "baseEvent": note.event.base_event,
            },
            "context": {
                "client": snapshot("client"),
                "server": snapshot("server"),
                "sender": snapshot("sender"),
                "target": snapshot("target"),
                "message": snapshot("message"),
                "timestamp": note.timestamp.to_rfc3339(),
            },
        });
        if let Some(Value::Object(fields)) = note
            .event_metadata
            .get("webhook")
            .and_then(|w| w.get("fields"))
            && let Some(map) = body.as_object_mut()
        {
            for (key, value) in fields {
                map.insert(key.clone(), value.clone());
            }
        }
        body
    }

    fn extra_headers(&self, note: &RenderedNotification) -> BTreeMap<String, String> {
        let mut headers = self.config.headers.clone();
        if let Some(Value::Object(extra)) = note
            .event_metadata
            .get("webhook")
            .and_then(|w| w.get("headers"))
        {
            for (name, value) in extra {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                headers.insert(name.clone(), text);
            }
        }
        headers
    }
}

#[async_trait]
impl Notifier for WebhookSink {
    async fn deliver(&mut self, note: &RenderedNotification) -> Result<()> {
        let mut request = self.client.request(self.method.clone(), &self.config.url);
        request = if self.config.format == "text" {
            request
                .header("Content-Type", "text/plain")
                .body(format!("{}\n{}", note.title, note.body))
        } else {
            request
                .header("Content-Type", "application/json")
                .body(self.json_body(note).to_string())
        };
        for (name, value) in self.extra_headers(note) {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("webhook request to '{}' failed", self.config.url))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("webhook returned {status}: {body}"));
        }
        trace!(sink = %self.sink_id, "webhook delivered");
        Ok(())
    }
}
