//! 🎬 *[camera pans across a dimly lit server room]*
//! 🎬 "In a world where watchers tail and sinks deliver..."
//! 🎬 "One orchestrator dared to own them all." *[record scratch]* 🦆
//!
//! 📦 The orchestrator — part middle manager, part helicopter parent. It
//! owns everything: the config store, the pipeline snapshot (adapters +
//! processor + dispatcher), the per-file watcher set, and the background
//! loops that keep them reconciled.
//!
//! 🧠 Knowledge graph: reloads are atomic from the pipeline's point of
//! view. A complete new snapshot is built and swapped in one `Arc` store;
//! any given record is processed entirely under the old snapshot or
//! entirely under the new. No half-configs. No chimera records.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adapters::ClientAdapter;
use crate::processor::EventProcessor;
use crate::record::MessageRecord;
use crate::sinks::{CustomSinkRegistry, Dispatcher};
use crate::store::{ConfigStore, ConfigWatcher, RELOAD_DEBOUNCE};
use crate::watchers::{LogFileWatcher, WatcherHandle};

const PIPELINE_QUEUE_CAPACITY: usize = 1024;
const FILE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// 📸 One immutable configuration generation, swapped wholesale on
/// reload. The pipeline never sees a config mid-costume-change.
pub struct PipelineState {
    pub clients: Vec<Arc<ClientAdapter>>,
    pub processor: EventProcessor,
    pub dispatcher: Dispatcher,
}

pub struct OrchestratorInner {
    pub store: RwLock<ConfigStore>,
    registry: CustomSinkRegistry,
    pipeline: RwLock<Arc<PipelineState>>,
    watchers: Mutex<Vec<WatcherHandle>>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
    config_watcher: std::sync::Mutex<Option<ConfigWatcher>>,
    record_tx: async_channel::Sender<MessageRecord>,
    record_rx: async_channel::Receiver<MessageRecord>,
    reload_tx: async_channel::Sender<()>,
    reload_rx: async_channel::Receiver<()>,
    running: AtomicBool,
    reloading: AtomicBool,
}

#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<OrchestratorInner>,
}

impl Orchestrator {
    pub fn new(store: ConfigStore, registry: CustomSinkRegistry) -> Result<Self> {
        let (record_tx, record_rx) = async_channel::bounded(PIPELINE_QUEUE_CAPACITY);
        let (reload_tx, reload_rx) = async_channel::bounded(8);
        let empty = PipelineState {
            clients: Vec::new(),
            processor: EventProcessor::new(Vec::new(), Vec::new()),
            dispatcher: Dispatcher::new(Vec::new(), &registry)?,
        };
        Ok(Self {
            inner: Arc::new(OrchestratorInner {
                store: RwLock::new(store),
                registry,
                pipeline: RwLock::new(Arc::new(empty)),
                watchers: Mutex::new(Vec::new()),
                tasks: std::sync::Mutex::new(Vec::new()),
                config_watcher: std::sync::Mutex::new(None),
                record_tx,
                record_rx,
                reload_tx,
                reload_rx,
                running: AtomicBool::new(false),
                reloading: AtomicBool::new(false),
            }),
        })
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn is_reloading(&self) -> bool {
        self.inner.reloading.load(Ordering::SeqCst)
    }

    pub async fn watcher_count(&self) -> usize {
        self.inner.watchers.lock().await.len()
    }

    pub fn store(&self) -> &RwLock<ConfigStore> {
        &self.inner.store
    }

    pub async fn pipeline(&self) -> Arc<PipelineState> {
        self.inner.pipeline.read().await.clone()
    }

    /// 📬 A sender the control plane uses to request a reload without
    /// holding any orchestrator locks. Fire and forget, but official.
    pub fn reload_sender(&self) -> async_channel::Sender<()> {
        self.inner.reload_tx.clone()
    }

    /// 🚀 Bring everything up: build the first pipeline snapshot, start
    /// the processing loop, the watcher refresh loop, the reload loop,
    /// and the config-directory watcher. Unleash the workers!
    pub async fn start(&self) -> Result<()> {
        let rescan = {
            let store = self.inner.store.read().await;
            let state = build_pipeline(&store, &self.inner.registry, None)?;
            *self.inner.pipeline.write().await = Arc::new(state);
            store.root.rescan_logs_on_startup
        };

        {
            let state = self.pipeline().await;
            state.dispatcher.initialize().await?;
            for client in &state.clients {
                client.initialize()?;
            }
            info!(
                clients = state.clients.len(),
                sinks = state.dispatcher.len(),
                events = state.processor.event_count(),
                "orchestrator starting"
            );
        }
        self.reconcile_watchers(rescan).await;

        // record processing loop
        let inner = self.inner.clone();
        self.push_task(tokio::spawn(async move {
            while let Ok(mut record) = inner.record_rx.recv().await {
                let state = inner.pipeline.read().await.clone();
                let events = state.processor.process_message(&mut record);
                for event in &events {
                    state.dispatcher.dispatch(&record, event).await;
                }
            }
        }));

        // periodic log-path refresh
        let this = self.clone();
        let refresh_interval = {
            let store = self.inner.store.read().await;
            Duration::from_millis(store.root.polling_interval.max(1000))
        };
        self.push_task(tokio::spawn(async move {
            loop {
                tokio::time::sleep(refresh_interval).await;
                this.reconcile_watchers(false).await;
            }
        }));

        // reload requests: manual (control plane) and directory-watch
        let this = self.clone();
        self.push_task(tokio::spawn(async move {
            while this.inner.reload_rx.recv().await.is_ok() {
                if let Err(err) = this.reload_full().await {
                    warn!(err = format!("{err:#}"), "reload failed, keeping old configuration");
                }
            }
        }));

        let config_dir = self.inner.store.read().await.config_dir().to_path_buf();
        match ConfigWatcher::spawn(&config_dir, RELOAD_DEBOUNCE, self.inner.reload_tx.clone()) {
            Ok(watcher) => {
                *lock_sync(&self.inner.config_watcher) = Some(watcher);
            }
            Err(err) => warn!(err = format!("{err:#}"), "config hot reload unavailable"),
        }

        self.inner.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// 🛑 Stop watchers, then sinks and clients in reverse initialization
    /// order, then the background loops. Last in, first out, everyone go
    /// home. 💤
    pub async fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        if let Some(watcher) = lock_sync(&self.inner.config_watcher).take() {
            watcher.stop();
        }
        for handle in self.inner.watchers.lock().await.drain(..) {
            handle.stop();
        }
        let state = self.pipeline().await;
        state.dispatcher.destroy().await;
        for client in state.clients.iter().rev() {
            client.destroy();
        }
        for task in lock_sync(&self.inner.tasks).drain(..) {
            task.abort();
        }
        info!("orchestrator stopped");
    }

    /// 🔄 Reparse configs and swap in a new pipeline snapshot. Failure
    /// leaves the old snapshot serving — a broken edit costs you nothing
    /// but a warn line.
    pub async fn reload_full(&self) -> Result<()> {
        self.inner.reloading.store(true, Ordering::SeqCst);
        let result = self.reload_inner().await;
        self.inner.reloading.store(false, Ordering::SeqCst);
        result
    }

    async fn reload_inner(&self) -> Result<()> {
        let mut store = self.inner.store.write().await;
        store.reload().context("configuration reload failed")?;

        let previous = self.inner.pipeline.read().await.clone();
        let state = build_pipeline(&store, &self.inner.registry, Some(&previous))?;
        drop(store);

        state.dispatcher.initialize().await?;
        for client in &state.clients {
            client.initialize()?;
        }

        let added_sinks = state.dispatcher.len();
        let kept_clients: Vec<&str> = previous
            .clients
            .iter()
            .filter(|old| state.clients.iter().any(|new| new.id() == old.id()))
            .map(|c| c.id())
            .collect();
        for old in &previous.clients {
            if !state.clients.iter().any(|new| new.id() == old.id()) {
                old.destroy();
            }
        }
        info!(
            clients = state.clients.len(),
            clients_kept = kept_clients.len(),
            sinks = added_sinks,
            events = state.processor.event_count(),
            "configuration reloaded"
        );

        *self.inner.pipeline.write().await = Arc::new(state);
        self.reconcile_watchers(false).await;
        Ok(())
    }

    /// 🔍 Diff the watcher set against the paths the enabled clients
    /// currently enumerate: start tailers for new paths, stop tailers for
    /// vanished ones. Files come and go; the watcher census keeps up.
    async fn reconcile_watchers(&self, rescan: bool) {
        let state = self.pipeline().await;
        let mut desired: Vec<(PathBuf, Arc<ClientAdapter>)> = Vec::new();
        for client in &state.clients {
            // only text logs are line-tailed; sqlite/json stores have no
            // line cursor to track
            if client.config().file_type.kind != crate::store::FileKind::Text {
                continue;
            }
            for path in client.list_log_paths() {
                if !desired.iter().any(|(p, _)| *p == path) {
                    desired.push((path, client.clone()));
                }
            }
        }

        let mut watchers = self.inner.watchers.lock().await;
        let mut stopped = 0;
        let mut kept = Vec::new();
        for handle in watchers.drain(..) {
            if desired.iter().any(|(p, _)| *p == handle.path) {
                kept.push(handle);
            } else {
                handle.stop();
                stopped += 1;
            }
        }
        let mut started = 0;
        for (path, adapter) in desired {
            if kept.iter().any(|h: &WatcherHandle| h.path == path) {
                continue;
            }
            let watcher = LogFileWatcher::new(
                path,
                adapter,
                self.inner.record_tx.clone(),
                rescan,
                FILE_POLL_INTERVAL,
            );
            kept.push(watcher.start());
            started += 1;
        }
        *watchers = kept;
        if started > 0 || stopped > 0 {
            debug!(started, stopped, total = watchers.len(), "watcher set reconciled");
        }
    }

    fn push_task(&self, task: JoinHandle<()>) {
        lock_sync(&self.inner.tasks).push(task);
    }
}

fn lock_sync<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// 🏗️ Assemble a pipeline snapshot from the store's current contents. A
/// client whose adapter fails to build is skipped with a warning; the
/// rest of the snapshot still comes up. The show goes on.
fn build_pipeline(
    store: &ConfigStore,
    registry: &CustomSinkRegistry,
    previous: Option<&PipelineState>,
) -> Result<PipelineState> {
    let mut clients = Vec::new();
    for config in store.clients.values() {
        if !config.enabled {
            continue;
        }
        match ClientAdapter::new(config.clone(), store.root.default_log_directory.as_deref()) {
            Ok(adapter) => clients.push(Arc::new(adapter)),
            Err(err) => warn!(client = %config.id, err = format!("{err:#}"), "client rejected"),
        }
    }
    let dispatcher = Dispatcher::rebuild(
        previous.map(|p| &p.dispatcher),
        store.sinks.values().cloned(),
        registry,
    )?;
    let processor = EventProcessor::new(
        store.events.values().cloned().collect(),
        store.servers.values().cloned().collect(),
    );
    Ok(PipelineState {
        clients,
        processor,
        dispatcher,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use std::io::Write;
    use std::path::Path;

    use crate::sinks::CaptureSink;

    fn seed(dir: &Path, category: &str, name: &str, value: &Value) {
        let cat_dir = dir.join(category);
        std::fs::create_dir_all(&cat_dir).unwrap();
        std::fs::write(
            cat_dir.join(format!("{name}.json")),
            serde_json::to_string_pretty(value).unwrap(),
        )
        .unwrap();
    }

    fn seed_full_config(config_dir: &Path, log_dir: &Path) {
        std::fs::write(
            config_dir.join("config.json"),
            json!({"pollingInterval": 1000}).to_string(),
        )
        .unwrap();
        seed(
            config_dir,
            "clients",
            "plain",
            &json!({
                "id": "plain",
                "type": "plain",
                "name": "Plain",
                "logDirectory": log_dir,
                "discovery": {
                    "channels": ["*.log"],
                    "channelPattern": {"pattern": r"/([^/]+)\.log$", "group": 1},
                },
                "parserRules": [{
                    "name": "privmsg",
                    "pattern": r"^<(?P<nick>[^>]+)> (?P<content>.*)$",
                    "fields": {"nick": "nickname", "content": "content"},
                    "priority": 10,
                }],
            }),
        );
        seed(
            config_dir,
            "servers",
            "libera",
            &json!({
                "id": "libera",
                "hostname": "irc.libera.chat",
                "displayName": "Libera",
                "clientNickname": "tester",
            }),
        );
        seed(
            config_dir,
            "sinks",
            "capture",
            &json!({
                "id": "capture",
                "kind": "custom",
                "config": {"name": "capture"},
                "template": {"title": "{{sender.nickname}}", "body": "{{message.content}}"},
            }),
        );
        seed(
            config_dir,
            "events",
            "everything",
            &json!({
                "id": "everything",
                "name": "Everything",
                "baseEvent": "message",
                "serverIds": ["*"],
                "sinkIds": ["capture"],
                "priority": 10,
            }),
        );
    }

    fn capture_registry() -> (CustomSinkRegistry, CaptureSink) {
        let capture = CaptureSink::default();
        let mut registry = CustomSinkRegistry::default();
        let shared = capture.clone();
        registry.register("capture", move |_| Ok(Box::new(shared.clone())));
        (registry, capture)
    }

    async fn wait_for<F>(mut check: F)
    where
        F: AsyncFnMut() -> bool,
    {
        for _ in 0..100 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("condition not reached within deadline");
    }

    #[tokio::test]
    async fn lines_flow_end_to_end_to_the_capture_sink() {
        let config_dir = tempfile::tempdir().unwrap();
        let log_dir = tempfile::tempdir().unwrap();
        seed_full_config(config_dir.path(), log_dir.path());
        std::fs::write(log_dir.path().join("general.log"), "").unwrap();

        let (registry, capture) = capture_registry();
        let store = ConfigStore::open(Some(&config_dir.path().join("config.json"))).unwrap();
        let orchestrator = Orchestrator::new(store, registry).unwrap();
        orchestrator.start().await.unwrap();
        assert!(orchestrator.is_running());
        assert_eq!(orchestrator.watcher_count().await, 1);

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(log_dir.path().join("general.log"))
            .unwrap();
        writeln!(file, "<alice> hello there").unwrap();
        file.flush().unwrap();

        wait_for(async || !capture.received.lock().await.is_empty()).await;
        {
            let received = capture.received.lock().await;
            assert_eq!(received[0].title, "alice");
            assert_eq!(received[0].body, "hello there");
        }
        orchestrator.stop().await;
        assert!(!orchestrator.is_running());
    }

    #[tokio::test]
    async fn new_log_files_get_watchers_on_refresh() {
        let config_dir = tempfile::tempdir().unwrap();
        let log_dir = tempfile::tempdir().unwrap();
        seed_full_config(config_dir.path(), log_dir.path());

        let (registry, _capture) = capture_registry();
        let store = ConfigStore::open(Some(&config_dir.path().join("config.json"))).unwrap();
        let orchestrator = Orchestrator::new(store, registry).unwrap();
        orchestrator.start().await.unwrap();
        assert_eq!(orchestrator.watcher_count().await, 0);

        std::fs::write(log_dir.path().join("fresh.log"), "").unwrap();
        let orch = orchestrator.clone();
        wait_for(async || {
            orch.reconcile_watchers(false).await;
            orch.watcher_count().await == 1
        })
        .await;
        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn reload_swaps_configuration_without_stopping() {
        let config_dir = tempfile::tempdir().unwrap();
        let log_dir = tempfile::tempdir().unwrap();
        seed_full_config(config_dir.path(), log_dir.path());

        let (registry, _capture) = capture_registry();
        let store = ConfigStore::open(Some(&config_dir.path().join("config.json"))).unwrap();
        let orchestrator = Orchestrator::new(store, registry).unwrap();
        orchestrator.start().await.unwrap();

        // disable the only event, then reload
        seed(
            config_dir.path(),
            "events",
            "everything",
            &json!({
                "id": "everything",
                "name": "Everything",
                "baseEvent": "message",
                "enabled": false,
                "serverIds": ["*"],
                "sinkIds": ["capture"],
            }),
        );
        orchestrator.reload_full().await.unwrap();
        assert_eq!(orchestrator.pipeline().await.processor.event_count(), 0);
        assert!(orchestrator.is_running());
        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn failed_reload_keeps_the_old_snapshot() {
        let config_dir = tempfile::tempdir().unwrap();
        let log_dir = tempfile::tempdir().unwrap();
        seed_full_config(config_dir.path(), log_dir.path());

        let (registry, _capture) = capture_registry();
        let store = ConfigStore::open(Some(&config_dir.path().join("config.json"))).unwrap();
        let orchestrator = Orchestrator::new(store, registry).unwrap();
        orchestrator.start().await.unwrap();
        let before = orchestrator.pipeline().await.processor.event_count();

        std::fs::write(config_dir.path().join("config.json"), "{broken").unwrap();
        assert!(orchestrator.reload_full().await.is_err());
        assert_eq!(orchestrator.pipeline().await.processor.event_count(), before);
        orchestrator.stop().await;
    }
}
