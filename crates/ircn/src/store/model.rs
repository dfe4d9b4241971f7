//! 📋 Declarative config categories: clients, servers, events, sinks.
//! The four food groups of ircnotify. 🍽️
//!
//! On-disk format is one JSON object per file, camelCase field names,
//! basename matching the `id` field. Validation happens at load time and
//! rejects the individual file, never the whole load — one broken config
//! should not take down the other thirty-nine. We are not dominoes.

use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::filters::{self, FilterNode};

/// 🗂️ The four category sub-directories under the config root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Clients,
    Servers,
    Events,
    Sinks,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Clients,
        Category::Servers,
        Category::Events,
        Category::Sinks,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            Category::Clients => "clients",
            Category::Servers => "servers",
            Category::Events => "events",
            Category::Sinks => "sinks",
        }
    }

    pub fn from_dir_name(name: &str) -> Option<Self> {
        match name {
            "clients" => Some(Category::Clients),
            "servers" => Some(Category::Servers),
            "events" => Some(Category::Events),
            "sinks" => Some(Category::Sinks),
            _ => None,
        }
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// clients

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub client_type: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub log_directory: String,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_discovery: Option<ServerDiscoveryConfig>,
    #[serde(default)]
    pub file_type: FileTypeConfig,
    #[serde(default)]
    pub parser_rules: Vec<ParserRule>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// 🌐 Glob patterns enumerating log files, plus path-regexes that extract
/// target/server context from each discovered path. The treasure map, and
/// the instructions for reading the treasure map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub console: Vec<String>,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub queries: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console_pattern: Option<PathPattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_pattern: Option<PathPattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_pattern: Option<PathPattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_pattern: Option<PathPattern>,
}

/// 🎯 A regex plus the capture group carrying the interesting text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathPattern {
    pub pattern: String,
    #[serde(default = "default_group")]
    pub group: usize,
}

fn default_group() -> usize {
    1
}

/// 🔭 How the client learns which servers its log tree belongs to.
/// `sqlite` is schema-accepted but yields no servers — the descriptor
/// parses, the database stays unopened. Someday. Maybe. 💤
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum ServerDiscoveryConfig {
    Static {
        servers: Vec<String>,
    },
    Filesystem {
        pattern: String,
        hostname_pattern: PathPattern,
    },
    Json {
        path: String,
        hostname_field: String,
    },
    Sqlite {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        query: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTypeConfig {
    #[serde(default = "default_file_kind")]
    pub kind: FileKind,
    /// Read cadence in milliseconds for non-text kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<u64>,
}

impl Default for FileTypeConfig {
    fn default() -> Self {
        Self {
            kind: default_file_kind(),
            poll_interval: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Text,
    Sqlite,
    Json,
}

fn default_file_kind() -> FileKind {
    FileKind::Text
}

/// 🔤 One line-parsing rule. Rules evaluate in strictly descending
/// priority; the first match wins, and a matching `skip` rule discards
/// the line — a bouncer whose whole job is saying "not tonight, join
/// spam".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParserRule {
    pub name: String,
    pub pattern: String,
    #[serde(default)]
    pub flags: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    /// Named capture → semantic field (`timestamp`, `nickname`, `username`,
    /// `hostname`, `content`, `target`); anything else lands in metadata.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub priority: i64,
}

// ---------------------------------------------------------------------------
// servers

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub id: String,
    pub hostname: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub client_nickname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<bool>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// nickname → known-user record, used for sender enrichment.
    #[serde(default)]
    pub users: BTreeMap<String, KnownUser>,
    /// Free-form; a `uuid` sub-key participates in server matching.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modes: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// events

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventConfig {
    pub id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub base_event: BaseEvent,
    /// Server ids this event applies to; the single element `*` means all.
    #[serde(default)]
    pub server_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<FilterNode>,
    #[serde(default)]
    pub sink_ids: Vec<String>,
    #[serde(default)]
    pub priority: i64,
    /// Recognized sub-keys: `description`, `host`, `sink`.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseEvent {
    Message,
    Join,
    Part,
    Quit,
    Nick,
    Kick,
    Mode,
    Topic,
    Connect,
    Disconnect,
    Any,
}

impl BaseEvent {
    /// The fine-grained message types each base event admits. `Any` and
    /// `Connect`/`Disconnect` are special-cased by the caller's table.
    pub fn message_types(self) -> Option<&'static [&'static str]> {
        match self {
            BaseEvent::Any => None,
            BaseEvent::Message => Some(&["privmsg", "notice"]),
            BaseEvent::Join => Some(&["join"]),
            BaseEvent::Part => Some(&["part"]),
            BaseEvent::Quit => Some(&["quit"]),
            BaseEvent::Nick => Some(&["nick"]),
            BaseEvent::Kick => Some(&["kick"]),
            BaseEvent::Mode => Some(&["mode"]),
            BaseEvent::Topic => Some(&["topic"]),
            BaseEvent::Connect | BaseEvent::Disconnect => Some(&["system"]),
        }
    }
}

// ---------------------------------------------------------------------------
// sinks

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkConfig {
    pub id: String,
    pub kind: SinkKind,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Kind-specific settings, interpreted by the sink implementation.
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<TemplateConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,
    /// Advisory allow-list of metadata keys; sinks may ignore it.
    #[serde(default)]
    pub allowed_metadata: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Ntfy,
    Webhook,
    Console,
    File,
    Custom,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub format: TemplateFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateFormat {
    #[default]
    Text,
    Markdown,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_per_minute: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_per_hour: Option<u32>,
}

// ---------------------------------------------------------------------------
// validation

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            bail!("client config has an empty id");
        }
        for rule in &self.parser_rules {
            filters::compile(&rule.pattern, &rule.flags)
                .with_context(|| format!("parser rule '{}' has an invalid pattern", rule.name))?;
        }
        let patterns = [
            ("consolePattern", &self.discovery.console_pattern),
            ("channelPattern", &self.discovery.channel_pattern),
            ("queryPattern", &self.discovery.query_pattern),
            ("serverPattern", &self.discovery.server_pattern),
        ];
        for (label, pattern) in patterns {
            if let Some(p) = pattern {
                filters::compile(&p.pattern, "")
                    .with_context(|| format!("discovery {label} is not a valid regex"))?;
            }
        }
        if let Some(ServerDiscoveryConfig::Filesystem {
            hostname_pattern, ..
        }) = &self.server_discovery
        {
            filters::compile(&hostname_pattern.pattern, "")
                .context("serverDiscovery hostnamePattern is not a valid regex")?;
        }
        Ok(())
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            bail!("server config has an empty id");
        }
        if self.hostname.trim().is_empty() {
            bail!("server '{}' has an empty hostname", self.id);
        }
        Ok(())
    }
}

impl EventConfig {
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            bail!("event config has an empty id");
        }
        if let Some(filters) = &self.filters {
            validate_filter_patterns(filters)?;
        }
        Ok(())
    }
}

impl SinkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            bail!("sink config has an empty id");
        }
        Ok(())
    }
}

/// 🔧 Compile every `matches` pattern in the tree that carries no
/// template references. Patterns with `{{...}}` can only be checked at
/// match time — we can't compile what doesn't exist yet.
fn validate_filter_patterns(node: &FilterNode) -> Result<()> {
    match node {
        FilterNode::Group(group) => {
            for child in &group.filters {
                validate_filter_patterns(child)?;
            }
        }
        FilterNode::Leaf(leaf) => {
            if let Some(pattern) = &leaf.pattern
                && !crate::templating::has_refs(pattern)
            {
                filters::compile(pattern, leaf.flags.as_deref().unwrap_or_default())
                    .with_context(|| {
                        format!("filter on '{}' has an invalid pattern", leaf.field)
                    })?;
            }
        }
    }
    Ok(())
}
