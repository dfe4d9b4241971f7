//! 📮 The sink dispatcher — for each matched (record, event) pair, walk
//! the event's sink list in order, enforce rate limits, resolve and
//! expand the per-sink templates, and deliver.
//!
//! 🧠 Knowledge graph: the dispatcher does the thinking (templates, rate
//! limits, host overrides), the sinks do the lifting (I/O). A sink that
//! is missing or disabled is skipped silently — no eulogy. A failed
//! delivery is logged and dropped; nothing is retried or re-queued,
//! because a notification about something that happened ten minutes ago
//! is just a diary entry. 💀

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde_json::{Map, Value, json};
use tracing::{debug, error, warn};

use crate::record::MessageRecord;
use crate::sinks::{
    CustomSinkRegistry, EventIdentity, Notifier, RateLimiter, RenderedNotification, SinkBackend,
    build_sink,
};
use crate::store::model::{EventConfig, SinkConfig};
use crate::templating;

pub struct SinkInstance {
    pub config: SinkConfig,
    backend: tokio::sync::Mutex<SinkBackend>,
    limiter: std::sync::Mutex<RateLimiter>,
}

pub struct Dispatcher {
    sinks: HashMap<String, Arc<SinkInstance>>,
}

impl Dispatcher {
    /// 🏗️ Build one instance per enabled sink config. A sink whose
    /// kind-specific config fails to parse is rejected on its own and the
    /// rest still come up. One bad apple, etc.
    pub fn new(
        configs: impl IntoIterator<Item = SinkConfig>,
        registry: &CustomSinkRegistry,
    ) -> Result<Self> {
        Self::rebuild(None, configs, registry)
    }

    /// 🔄 Like [`Dispatcher::new`], but reuses instances from `previous`
    /// whose config is unchanged, so a reload keeps rate-limit history
    /// for surviving sinks. Editing an unrelated config file is not a
    /// get-out-of-rate-limit-free card.
    pub fn rebuild(
        previous: Option<&Dispatcher>,
        configs: impl IntoIterator<Item = SinkConfig>,
        registry: &CustomSinkRegistry,
    ) -> Result<Self> {
        // 🔧 10s connect because if the server can't handshake in 10
        // seconds it's not having a good time and neither are we; 30s
        // total because notification payloads are small and patience is not
        // a retry strategy
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .context(
                "💀 The HTTP client refused to be born. The TLS stack wept. \
                 Probably a missing cert bundle or a cursed system OpenSSL. \
                 Either way: tragic.",
            )?;

        let mut sinks = HashMap::new();
        for config in configs {
            if !config.enabled {
                debug!(sink = %config.id, "skipping disabled sink");
                continue;
            }
            if let Some(existing) = previous.and_then(|p| p.sinks.get(&config.id))
                && serde_json::to_value(&existing.config).ok() == serde_json::to_value(&config).ok()
            {
                sinks.insert(config.id.clone(), existing.clone());
                continue;
            }
            match build_sink(&config, &http, registry) {
                Ok(backend) => {
                    sinks.insert(
                        config.id.clone(),
                        Arc::new(SinkInstance {
                            config,
                            backend: tokio::sync::Mutex::new(backend),
                            limiter: std::sync::Mutex::new(RateLimiter::default()),
                        }),
                    );
                }
                Err(err) => warn!(sink = %config.id, err = format!("{err:#}"), "sink rejected"),
            }
        }
        Ok(Self { sinks })
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn contains(&self, sink_id: &str) -> bool {
        self.sinks.contains_key(sink_id)
    }

    pub async fn initialize(&self) -> Result<()> {
        let results = futures::future::join_all(self.sinks.values().map(|instance| async {
            (
                instance.config.id.clone(),
                instance.backend.lock().await.initialize().await,
            )
        }))
        .await;
        for (sink_id, result) in results {
            if let Err(err) = result {
                warn!(sink = %sink_id, err = format!("{err:#}"), "sink failed to initialize");
            }
        }
        Ok(())
    }

    pub async fn destroy(&self) {
        for instance in self.sinks.values() {
            if let Err(err) = instance.backend.lock().await.destroy().await {
                warn!(sink = %instance.config.id, err = format!("{err:#}"), "sink failed to shut down");
            }
        }
    }

    /// 📮 Deliver a matched event to every referenced sink, in list
    /// order. Returns how many deliveries succeeded.
    pub async fn dispatch(&self, record: &MessageRecord, event: &EventConfig) -> usize {
        let mut delivered = 0;
        for sink_id in &event.sink_ids {
            let Some(instance) = self.sinks.get(sink_id) else {
                continue;
            };

            let allowed = {
                let mut limiter = lock_limiter(instance);
                limiter.allows(instance.config.rate_limit.as_ref(), Instant::now())
            };
            if !allowed {
                debug!(sink = %sink_id, event = %event.id, "delivery dropped by rate limit");
                continue;
            }

            let note = render_notification(record, event, &instance.config);
            let result = instance.backend.lock().await.deliver(&note).await;
            match result {
                Ok(()) => {
                    lock_limiter(instance).record(Instant::now());
                    delivered += 1;
                }
                Err(err) => error!(
                    sink = %sink_id,
                    event = %event.id,
                    err = format!("{err:#}"),
                    "sink delivery failed"
                ),
            }
        }
        delivered
    }
}

fn lock_limiter(instance: &SinkInstance) -> std::sync::MutexGuard<'_, RateLimiter> {
    match instance.limiter.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// 🎨 Resolve and expand templates for one sink call.
///
/// Title falls back `event.metadata.sink[id].title` → `sink.template.title`
/// → `{{event.name}}`; body likewise down to `{{message.content}}`. A
/// three-tier fallback, like a wedding cake of defaults. 🎂
/// `event.metadata.host` merges over the context's `server` member, scoped
/// to this call only — the next sink gets pristine context, no leftovers —
/// and the context gains an `event` member before expansion.
pub fn render_notification(
    record: &MessageRecord,
    event: &EventConfig,
    sink: &SinkConfig,
) -> RenderedNotification {
    let sink_options: Map<String, Value> = event
        .metadata
        .get("sink")
        .and_then(|s| s.get(&sink.id))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let option_str = |key: &str| {
        sink_options
            .get(key)
            .and_then(Value::as_str)
            .map(String::from)
    };
    let template = sink.template.as_ref();
    let title_template = option_str("title")
        .or_else(|| template.and_then(|t| t.title.clone()))
        .unwrap_or_else(|| "{{event.name}}".to_string());
    let body_template = option_str("body")
        .or_else(|| template.and_then(|t| t.body.clone()))
        .unwrap_or_else(|| "{{message.content}}".to_string());

    let mut ctx = record.to_context();
    if let Some(Value::Object(host)) = event.metadata.get("host")
        && let Some(root) = ctx.as_object_mut()
    {
        match root.get_mut("server") {
            Some(Value::Object(server)) => {
                for (key, value) in host {
                    server.insert(key.clone(), value.clone());
                }
            }
            _ => {
                root.insert("server".to_string(), Value::Object(host.clone()));
            }
        }
    }
    let identity = EventIdentity {
        id: event.id.clone(),
        name: event.name.clone(),
        base_event: event.base_event,
    };
    if let Some(root) = ctx.as_object_mut() {
        root.insert("event".to_string(), json!(&identity));
    }

    RenderedNotification {
        title: templating::expand(&title_template, &ctx),
        body: templating::expand(&body_template, &ctx),
        event: identity,
        context: ctx,
        timestamp: record.timestamp,
        sink_options,
        event_metadata: event.metadata.clone(),
    }
}
