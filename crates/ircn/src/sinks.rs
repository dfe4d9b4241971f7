//! 🔌 Notification sinks — where the real I/O happens.
//!
//! 🎭 This module is the casting agency for destinations. Need to POST to
//! ntfy? Hit a webhook? Print to a terminal? Append to a file? We've got
//! a sink for that. We've got sinks for days.
//!
//! A sink is PURE delivery. Template rendering, the per-sink host
//! override, and rate limiting all happen in the dispatcher; the sink
//! receives a fully rendered notification and performs its one side
//! effect. Like a postal worker who delivers the mail without reading it.
//! (Unlike your actual postal worker, Kevin.) 🦆

pub mod capture;
pub mod console;
pub mod dispatch;
pub mod file;
pub mod ntfy;
pub mod rate_limit;
pub mod webhook;

use std::collections::HashMap;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::store::model::{BaseEvent, SinkConfig, SinkKind};

pub use capture::CaptureSink;
pub use console::ConsoleSink;
pub use dispatch::Dispatcher;
pub use file::FileSink;
pub use ntfy::NtfySink;
pub use rate_limit::RateLimiter;
pub use webhook::WebhookSink;

/// 🎟️ The matched event's identity, exposed to sinks and templates.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventIdentity {
    pub id: String,
    pub name: String,
    pub base_event: BaseEvent,
}

/// 📬 Everything a sink needs after rendering: the title/body strings,
/// the event identity, the expansion context snapshot (host override and
/// `event` member already applied), per-sink options from
/// `event.metadata.sink[sinkId]`, and the full expanded event metadata.
/// The envelope, sealed and stamped. The sink just has to deliver it.
#[derive(Debug, Clone)]
pub struct RenderedNotification {
    pub title: String,
    pub body: String,
    pub event: EventIdentity,
    pub context: Value,
    pub timestamp: DateTime<Utc>,
    pub sink_options: Map<String, Value>,
    pub event_metadata: Map<String, Value>,
}

/// 📜 The delivery seam every sink kind implements.
///
/// # Contract
/// - `deliver` takes a fully rendered notification and sends it. That's it.
/// - No buffering. No transforming. No retries. I/O and nothing else.
/// - Ancient proverb: "He who puts business logic in the sink, debugs in
///   production." 💀
#[async_trait]
pub trait Notifier: Send {
    async fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    async fn deliver(&mut self, note: &RenderedNotification) -> Result<()>;

    async fn destroy(&mut self) -> Result<()> {
        Ok(())
    }
}

/// 🎭 The many faces of a sink — a polymorphic casting call for
/// notification destinations. The enum dispatches to the inner concrete
/// type, keeping the dispatcher blissfully ignorant of where data
/// actually lands. Ignorance is a feature. It's called "abstraction."
/// The `Custom` arm carries whatever a registry constructor produced.
pub enum SinkBackend {
    Console(ConsoleSink),
    Ntfy(NtfySink),
    Webhook(WebhookSink),
    File(FileSink),
    Custom(Box<dyn Notifier>),
}

#[async_trait]
impl Notifier for SinkBackend {
    async fn initialize(&mut self) -> Result<()> {
        match self {
            SinkBackend::Console(sink) => sink.initialize().await,
            SinkBackend::Ntfy(sink) => sink.initialize().await,
            SinkBackend::Webhook(sink) => sink.initialize().await,
            SinkBackend::File(sink) => sink.initialize().await,
            SinkBackend::Custom(sink) => sink.initialize().await,
        }
    }

    async fn deliver(&mut self, note: &RenderedNotification) -> Result<()> {
        match self {
            SinkBackend::Console(sink) => sink.deliver(note).await,
            SinkBackend::Ntfy(sink) => sink.deliver(note).await,
            SinkBackend::Webhook(sink) => sink.deliver(note).await,
            SinkBackend::File(sink) => sink.deliver(note).await,
            SinkBackend::Custom(sink) => sink.deliver(note).await,
        }
    }

    async fn destroy(&mut self) -> Result<()> {
        match self {
            SinkBackend::Console(sink) => sink.destroy().await,
            SinkBackend::Ntfy(sink) => sink.destroy().await,
            SinkBackend::Webhook(sink) => sink.destroy().await,
            SinkBackend::File(sink) => sink.destroy().await,
            SinkBackend::Custom(sink) => sink.destroy().await,
        }
    }
}

type SinkConstructor = Box<dyn Fn(&SinkConfig) -> Result<Box<dyn Notifier>> + Send + Sync>;

/// 🧰 Named constructors for `custom`-kind sinks. Ships with `capture`,
/// the in-memory sink the dev-client override and the tests rely on.
/// Registering a new kind is one closure. Go nuts. Responsibly.
pub struct CustomSinkRegistry {
    constructors: HashMap<String, SinkConstructor>,
}

impl Default for CustomSinkRegistry {
    fn default() -> Self {
        let mut registry = Self {
            constructors: HashMap::new(),
        };
        registry.register("capture", |_| Ok(Box::new(CaptureSink::default())));
        registry
    }
}

impl CustomSinkRegistry {
    pub fn register(
        &mut self,
        name: impl Into<String>,
        constructor: impl Fn(&SinkConfig) -> Result<Box<dyn Notifier>> + Send + Sync + 'static,
    ) {
        self.constructors.insert(name.into(), Box::new(constructor));
    }

    fn build(&self, config: &SinkConfig) -> Result<Box<dyn Notifier>> {
        let name = config
            .config
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("capture");
        let Some(constructor) = self.constructors.get(name) else {
            bail!("no custom sink registered under '{name}'");
        };
        constructor(config)
    }
}

/// 🏗️ Resolve a sink config into its backend. Kind-specific settings are
/// parsed here so a bad sink fails its own initialization, not the load —
/// one misconfigured webhook should not mute the console.
pub fn build_sink(
    config: &SinkConfig,
    http: &reqwest::Client,
    registry: &CustomSinkRegistry,
) -> Result<SinkBackend> {
    let backend = match config.kind {
        SinkKind::Console => SinkBackend::Console(ConsoleSink::new(config)),
        SinkKind::Ntfy => SinkBackend::Ntfy(
            NtfySink::new(config, http.clone())
                .with_context(|| format!("sink '{}' has invalid ntfy config", config.id))?,
        ),
        SinkKind::Webhook => SinkBackend::Webhook(
            WebhookSink::new(config, http.clone())
                .with_context(|| format!("sink '{}' has invalid webhook config", config.id))?,
        ),
        SinkKind::File => SinkBackend::File(
            FileSink::new(config)
                .with_context(|| format!("sink '{}' has invalid file config", config.id))?,
        ),
        SinkKind::Custom => SinkBackend::Custom(registry.build(config)?),
    };
    Ok(backend)
}
