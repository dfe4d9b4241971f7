//! 📦 The message record — one parsed log line as it flows through the
//! pipeline. The postal worker of this codebase: it doesn't ask questions,
//! it carries the data. Please tip your postal workers. 🦆
//!
//! Every stage reads and enriches the same structure. Template and filter
//! lookups run against the camelCase serialized form, so field names here
//! ARE the template vocabulary (`{{server.displayName}}`,
//! `{{sender.nickname}}`). Rename a field and somewhere, someone's
//! notification template quietly stops resolving. No pressure.

use chrono::{DateTime, Datelike, Local, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Client id reserved for the test-data generator. Records carrying it get
/// their matched events redirected to [`DEV_SINK_ID`].
pub const DEV_CLIENT_ID: &str = "dev-client";

/// Sink id the dev-client override routes to.
pub const DEV_SINK_ID: &str = "dev-capture";

/// 📄 The unparsed line plus whatever timestamp text the parser rule
/// captured. The raw material. The before picture.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLine {
    pub line: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// 💬 Parsed message content and its fine-grained type (`privmsg`,
/// `notice`, `join`, `system`, ...). Base events match against `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedMessage {
    pub content: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sender {
    pub nickname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Channel,
    Query,
    Console,
}

/// 🎯 The IRC-side recipient context of a line — a channel, a query, or
/// the console pseudo-target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TargetKind,
}

/// 🖥️ Which client configuration produced this record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub client_type: String,
    pub name: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// 📡 Server context attached by the event processor after enrichment.
/// Absent until the lookup ladder finds a match; gospel afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub id: String,
    pub hostname: String,
    pub display_name: String,
    pub client_nickname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// 📦 The record threaded through watcher → adapter → processor → sinks.
/// Fields are `Option` because this codebase knows hope is fragile — a
/// line might have no sender, no target, and no idea which server it came
/// from. Relatable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub raw: RawLine,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<ParsedMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<Sender>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
    pub client: ClientInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerInfo>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl MessageRecord {
    /// 🏗️ A bare record for `line` attributed to `client`, stamped with
    /// the arrival time. It knows only one thing: its raw line. The
    /// adapter hydrates the rest from its rule captures. The record trusts
    /// the process. The record was not consulted.
    pub fn new(line: impl Into<String>, client: ClientInfo) -> Self {
        Self {
            raw: RawLine {
                line: line.into(),
                timestamp: None,
            },
            message: None,
            sender: None,
            target: None,
            client,
            server: None,
            timestamp: Utc::now(),
            metadata: Map::new(),
        }
    }

    /// Serialize into the context object templates and filters resolve
    /// dotted paths against. Missing optional members become `null`, which
    /// the expander treats as unresolved.
    pub fn to_context(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// ⏰ Lenient timestamp parsing for captured timestamp text.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` (local time), `MM-DD HH:MM:SS`
/// (current year) and bare `HH:MM:SS` (current local date). Anything else
/// is `None` and the record keeps its arrival time — every IRC client
/// invented its own timestamp format, and they were all wrong. 💀
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return local_to_utc(naive);
    }
    let today = Local::now().date_naive();
    if let Ok(naive) =
        NaiveDateTime::parse_from_str(&format!("{} {text}", today.year()), "%Y %m-%d %H:%M:%S")
    {
        return local_to_utc(naive);
    }
    if let Ok(time) = NaiveTime::parse_from_str(text, "%H:%M:%S") {
        return local_to_utc(today.and_time(time));
    }
    None
}

fn local_to_utc(naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    Local
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}
