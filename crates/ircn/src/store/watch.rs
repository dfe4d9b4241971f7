//! 👀 Config-directory watching — any change under the config root (or
//! its category sub-directories) debounces for 500 ms, then emits one
//! reload signal. The orchestrator owns the receiving end.
//!
//! 🧠 Knowledge graph: editors are messy. One "save" can be a temp file, a
//! rename, and three modify events in a trench coat. The debounce waits
//! for the dust to settle and reloads once, not five times. 🦆

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const RELOAD_DEBOUNCE: Duration = Duration::from_millis(500);

/// 📦 Keeps the OS watcher and the debounce task alive. Dropping it stops
/// both — no zombie watchers haunting the config directory.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl ConfigWatcher {
    /// 🚀 Watch `config_dir` recursively; after `debounce` of quiet
    /// following any change, send one `()` on `reload_tx`. One signal per
    /// editing session, not one per keystroke.
    pub fn spawn(
        config_dir: &Path,
        debounce: Duration,
        reload_tx: async_channel::Sender<()>,
    ) -> Result<Self> {
        let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |result| match result {
            Ok(event) => {
                if is_relevant(&event) {
                    let _ = event_tx.send(());
                }
            }
            Err(err) => warn!(%err, "config watcher error"),
        })
        .context("failed to create config watcher")?;
        watcher
            .watch(config_dir, RecursiveMode::Recursive)
            .with_context(|| format!("failed to watch '{}'", config_dir.display()))?;

        let dir = config_dir.display().to_string();
        let task = tokio::spawn(async move {
            while event_rx.recv().await.is_some() {
                // coalesce the burst: keep resetting until it goes quiet
                loop {
                    match tokio::time::timeout(debounce, event_rx.recv()).await {
                        Ok(Some(())) => continue,
                        Ok(None) => return,
                        Err(_) => break,
                    }
                }
                debug!(config_dir = %dir, "config change settled, requesting reload");
                if reload_tx.send(()).await.is_err() {
                    return;
                }
            }
        });

        Ok(Self {
            _watcher: watcher,
            task,
        })
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

fn is_relevant(event: &notify::Event) -> bool {
    use notify::EventKind;
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn change_triggers_one_debounced_reload() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = async_channel::bounded(4);
        let watcher = ConfigWatcher::spawn(dir.path(), Duration::from_millis(100), tx).unwrap();

        // a burst of writes collapses into a single signal
        for i in 0..3 {
            std::fs::write(dir.path().join(format!("f{i}.json")), "{}").unwrap();
        }
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("reload signal within deadline")
            .unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(rx.is_empty(), "burst should debounce to one signal");
        watcher.stop();
    }

    #[tokio::test]
    async fn changes_in_subdirectories_are_seen() {
        let dir = tempfile::tempdir().unwrap();
        let events = dir.path().join("events");
        std::fs::create_dir_all(&events).unwrap();
        let (tx, rx) = async_channel::bounded(4);
        let watcher = ConfigWatcher::spawn(dir.path(), Duration::from_millis(50), tx).unwrap();

        std::fs::write(events.join("ping.json"), "{}").unwrap();
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("reload signal within deadline")
            .unwrap();
        watcher.stop();
    }
}
