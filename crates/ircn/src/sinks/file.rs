//! 📂 File sink — notifications appended (or overwritten) as JSON lines
//! or timestamped text blocks. The parent directory is created on demand.
//!
//! Data goes in, data stays in. It's basically a digital shoebox under
//! the bed. Hope you labeled it. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;
use tracing::trace;

use crate::sinks::{Notifier, RenderedNotification};
use crate::store::model::SinkConfig;

fn default_append() -> bool {
    true
}

fn default_format() -> String {
    "text".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSinkConfig {
    pub path: PathBuf,
    #[serde(default = "default_append")]
    pub append: bool,
    /// `json` or `text`.
    #[serde(default = "default_format")]
    pub format: String,
}

pub struct FileSink {
    sink_id: String,
    config: FileSinkConfig,
}

impl FileSink {
    pub fn new(sink: &SinkConfig) -> Result<Self> {
        let config: FileSinkConfig =
            serde_json::from_value(Value::Object(sink.config.clone()))
                .context("file sink requires 'path'")?;
        Ok(Self {
            sink_id: sink.id.clone(),
            config,
        })
    }

    fn render(&self, note: &RenderedNotification) -> String {
        if self.config.format == "json" {
            let mut line = json!({
                "title": note.title,
                "body": note.body,
                "event": note.event.name,
                "timestamp": note.timestamp.to_rfc3339(),
                "context": note.context,
            })
            .to_string();
            line.push('\n');
            line
        } else {
            format!(
                "[{}] {}\n{}\n",
                note.timestamp.to_rfc3339(),
                note.title,
                note.body
            )
        }
    }
}

#[async_trait]
impl Notifier for FileSink {
    async fn deliver(&mut self, note: &RenderedNotification) -> Result<()> {
        if let Some(parent) = self.config.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("failed to create sink directory '{}'", parent.display())
            })?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(self.config.append)
            .write(true)
            .truncate(!self.config.append)
            .open(&self.config.path)
            .await
            .with_context(|| {
                format!("failed to open sink file '{}'", self.config.path.display())
            })?;
        file.write_all(self.render(note).as_bytes())
            .await
            .with_context(|| {
                format!("failed to write sink file '{}'", self.config.path.display())
            })?;
        file.flush().await?;
        trace!(sink = %self.sink_id, path = %self.config.path.display(), "notification written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::EventIdentity;
    use crate::store::model::BaseEvent;
    use chrono::Utc;

    fn note(title: &str) -> RenderedNotification {
        RenderedNotification {
            title: title.into(),
            body: "body text".into(),
            event: EventIdentity {
                id: "ping".into(),
                name: "Ping".into(),
                base_event: BaseEvent::Message,
            },
            context: json!({"server": {"id": "libera"}}),
            timestamp: Utc::now(),
            sink_options: Default::default(),
            event_metadata: Default::default(),
        }
    }

    fn sink(path: &std::path::Path, append: bool, format: &str) -> FileSink {
        let config: SinkConfig = serde_json::from_value(json!({
            "id": "logfile",
            "kind": "file",
            "config": {"path": path, "append": append, "format": format},
        }))
        .unwrap();
        FileSink::new(&config).unwrap()
    }

    #[tokio::test]
    async fn append_mode_accumulates_deliveries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.log");
        let mut sink = sink(&path, true, "text");
        sink.deliver(&note("first")).await.unwrap();
        sink.deliver(&note("second")).await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("first"));
        assert!(content.contains("second"));
    }

    #[tokio::test]
    async fn overwrite_mode_keeps_only_the_last() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.log");
        let mut sink = sink(&path, false, "text");
        sink.deliver(&note("first")).await.unwrap();
        sink.deliver(&note("second")).await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("first"));
        assert!(content.contains("second"));
    }

    #[tokio::test]
    async fn json_format_writes_one_record_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.jsonl");
        let mut sink = sink(&path, true, "json");
        sink.deliver(&note("a")).await.unwrap();
        sink.deliver(&note("b")).await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let record: Value = serde_json::from_str(line).unwrap();
            assert_eq!(record["event"], "Ping");
            assert_eq!(record["context"]["server"]["id"], "libera");
        }
    }

    #[tokio::test]
    async fn missing_parent_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deep/nested/notes.log");
        let mut sink = sink(&path, true, "text");
        sink.deliver(&note("x")).await.unwrap();
        assert!(path.is_file());
    }
}
