//! 📱 Ntfy push sink — POST to `endpoint/topic` with title, priority,
//! and tags carried in headers and the rendered body as the payload.
//! The "someone said your nick, check your phone" express lane.
//!
//! ⚠️ Header values must be ASCII on the wire; anything else is stripped
//! without ceremony. Unicode content belongs in the body, where it can
//! sparkle ✨ legally.

use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::trace;

use crate::sinks::{Notifier, RenderedNotification};
use crate::store::model::SinkConfig;

fn default_priority() -> u8 {
    3
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NtfyConfig {
    pub url: String,
    pub topic: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

pub struct NtfySink {
    sink_id: String,
    config: NtfyConfig,
    client: reqwest::Client,
}

impl NtfySink {
    pub fn new(sink: &SinkConfig, client: reqwest::Client) -> Result<Self> {
        let config: NtfyConfig =
            serde_json::from_value(Value::Object(sink.config.clone()))
                .context("ntfy sink requires 'url' and 'topic'")?;
        Ok(Self {
            sink_id: sink.id.clone(),
            config,
            client,
        })
    }

    /// 🎛️ Per-event overrides from `event.metadata.sink[sinkId]`:
    /// `priority` (number or numeric string) and `tags` (list, or scalar
    /// coerced to a single-element list — one tag is still a list, it's
    /// just lonely).
    fn effective_priority(&self, note: &RenderedNotification) -> u8 {
        match note.sink_options.get("priority") {
            Some(Value::Number(n)) => n.as_u64().map(|n| n as u8).unwrap_or(self.config.priority),
            Some(Value::String(s)) => s.parse().unwrap_or(self.config.priority),
            _ => self.config.priority,
        }
    }

    fn effective_tags(&self, note: &RenderedNotification) -> Vec<String> {
        match note.sink_options.get("tags") {
            Some(Value::Array(items)) => items.iter().map(value_text).collect(),
            Some(scalar) if !scalar.is_null() => vec![value_text(scalar)],
            _ => self.config.tags.clone(),
        }
    }

    fn effective_headers(&self, note: &RenderedNotification) -> BTreeMap<String, String> {
        let mut headers = self.config.headers.clone();
        if let Some(Value::Object(extra)) = note.sink_options.get("headers") {
            for (name, value) in extra {
                headers.insert(name.clone(), value_text(value));
            }
        }
        headers
    }
}

#[async_trait]
impl Notifier for NtfySink {
    async fn deliver(&mut self, note: &RenderedNotification) -> Result<()> {
        let url = format!(
            "{}/{}",
            self.config.url.trim_end_matches('/'),
            self.config.topic
        );
        let mut request = self
            .client
            .post(&url)
            .header("Title", ascii_header(&note.title))
            .header("Priority", self.effective_priority(note).to_string());

        let tags = self.effective_tags(note);
        if !tags.is_empty() {
            request = request.header("Tags", ascii_header(&tags.join(",")));
        }
        if let Some(token) = &self.config.token {
            request = request.header("Authorization", format!("Bearer {}", ascii_header(token)));
        }
        for (name, value) in self.effective_headers(note) {
            request = request.header(name, ascii_header(&value));
        }

        eprintln!("DEBUG url={url} request={request:?}");
        let response = request
            .body(note.body.clone())
            .send()
            .await
            .with_context(|| {
                format!(
                    "💀 The ntfy request to '{url}' never arrived. We \
                     rendered the notification with love and the network \
                     responded with what can only be described as 'not \
                     vibing with it.'"
                )
            })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("ntfy returned {status}: {body}"));
        }
        trace!(sink = %self.sink_id, "ntfy notification delivered");
        Ok(())
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// ✂️ Drop every non-ASCII byte and control character from a header
/// value. HTTP headers are a 1990s neighborhood; emoji are not welcome
/// there.
fn ascii_header(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control())
        .collect()
}
