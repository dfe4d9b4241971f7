//! 📂 Tailing one log file — cursor tracking, rotation/truncation
//! detection, newline-bounded reads.
//!
//! 🎬 *[a log file grows by one line. somewhere, a cursor stirs.]*
//!
//! The task wakes on an OS file event or a short poll tick, whichever
//! comes first, and reads from the cursor to the last complete line. The
//! cursor never crosses a partial trailing line, so a line written
//! without its newline surfaces intact once the newline arrives — half a
//! sentence is not a notification, it's a cliffhanger. 🦆

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::adapters::{ClientAdapter, PathContext};
use crate::record::MessageRecord;

pub struct LogFileWatcher {
    path: PathBuf,
    adapter: Arc<ClientAdapter>,
    tx: async_channel::Sender<MessageRecord>,
    rescan: bool,
    poll_interval: Duration,
}

/// 📦 Keeps the tailer task and its OS watch alive; dropping or stopping
/// it detaches the file. The file does not notice. Files never do.
pub struct WatcherHandle {
    pub path: PathBuf,
    task: JoinHandle<()>,
    _watcher: Option<RecommendedWatcher>,
}

impl WatcherHandle {
    pub fn stop(self) {
        self.task.abort();
    }
}

impl LogFileWatcher {
    pub fn new(
        path: PathBuf,
        adapter: Arc<ClientAdapter>,
        tx: async_channel::Sender<MessageRecord>,
        rescan: bool,
        poll_interval: Duration,
    ) -> Self {
        Self {
            path,
            adapter,
            tx,
            rescan,
            poll_interval,
        }
    }

    /// 🚀 Launch the tailer task. The OS watch is best-effort; polling
    /// alone keeps the file covered when the platform watch fails —
    /// belt, suspenders, and a one-second heartbeat.
    pub fn start(self) -> WatcherHandle {
        let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
        let watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            if result.is_ok() {
                let _ = event_tx.send(());
            }
        })
        .ok()
        .and_then(|mut w| match w.watch(&self.path, RecursiveMode::NonRecursive) {
            Ok(()) => Some(w),
            Err(err) => {
                debug!(path = %self.path.display(), %err, "file watch unavailable, polling only");
                None
            }
        });

        let path = self.path.clone();
        let task = tokio::spawn(async move {
            let context = self.adapter.extract_context_from_path(&self.path);
            let mut position = if self.rescan { 0 } else { self.current_size().await };
            debug!(path = %self.path.display(), position, "tailer attached");
            loop {
                tokio::select! {
                    _ = event_rx.recv() => {}
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
                // drain queued wakeups; one read covers them all
                while event_rx.try_recv().is_ok() {}
                if self.read_new_lines(&mut position, &context).await.is_err() {
                    // pipeline channel closed, we are shutting down
                    return;
                }
            }
        });

        WatcherHandle {
            path,
            task,
            _watcher: watcher,
        }
    }

    async fn current_size(&self) -> u64 {
        tokio::fs::metadata(&self.path)
            .await
            .map(|m| m.len())
            .unwrap_or(0)
    }

    /// 🔄 One read pass: detect rotation, read cursor→EOF, forward
    /// complete lines. Returns `Err` only when the pipeline channel is
    /// closed, which means the show is over and we can all go home.
    async fn read_new_lines(&self, position: &mut u64, context: &PathContext) -> Result<(), ()> {
        let size = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(_) => return Ok(()),
        };
        if size < *position {
            debug!(path = %self.path.display(), "file rotated or truncated, resetting cursor");
            *position = 0;
        }
        if size == *position {
            return Ok(());
        }

        let mut file = match tokio::fs::File::open(&self.path).await {
            Ok(file) => file,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "failed to open watched file");
                return Ok(());
            }
        };
        if file.seek(SeekFrom::Start(*position)).await.is_err() {
            return Ok(());
        }
        let mut buffer = Vec::with_capacity((size - *position) as usize);
        let mut reader = file.take(size - *position);
        if let Err(err) = reader.read_to_end(&mut buffer).await {
            warn!(path = %self.path.display(), %err, "failed to read watched file");
            return Ok(());
        }

        // advance only past the final newline; a trailing partial line is
        // re-read on the next pass
        let Some(last_newline) = memchr::memrchr(b'\n', &buffer) else {
            return Ok(());
        };
        let chunk = &buffer[..=last_newline];
        *position += (last_newline + 1) as u64;

        let text = String::from_utf8_lossy(chunk);
        for line in text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            trace!(path = %self.path.display(), line, "tailer picked up line");
            if let Some(record) = self.adapter.parse_line(line, context)
                && self.tx.send(record).await.is_err()
            {
                return Err(());
            }
        }
        Ok(())
    }
}
