//! 🧪 In-memory capture sink, registered under the `custom` kind as
//! `capture`. Deliveries land in a shared list for later inspection; the
//! dev-client override routes test-generator traffic here.
//!
//! It holds your notifications, beautifully, until the process ends and
//! takes everything with it like a sandcastle at high tide. 🌊 That's the
//! point. It's a test sink. No persistence. No regrets. Very YOLO.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::sinks::{Notifier, RenderedNotification};

#[derive(Debug, Clone)]
pub struct CapturedNotification {
    pub title: String,
    pub body: String,
    pub event_id: String,
}

#[derive(Debug, Default, Clone)]
pub struct CaptureSink {
    pub received: Arc<tokio::sync::Mutex<Vec<CapturedNotification>>>,
}

#[async_trait]
impl Notifier for CaptureSink {
    async fn deliver(&mut self, note: &RenderedNotification) -> Result<()> {
        self.received.lock().await.push(CapturedNotification {
            title: note.title.clone(),
            body: note.body.clone(),
            event_id: note.event.id.clone(),
        });
        Ok(())
    }
}
