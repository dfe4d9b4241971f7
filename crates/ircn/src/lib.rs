//! 🚀 ircn — the core library crate, the beating heart, the engine room
//! where someone saying your nick in #rust becomes a push notification
//! on your phone before you've even alt-tabbed.
//!
//! 📦 The pipeline is configuration-driven end to end: watchers feed the
//! generic client adapter, parsed records flow through the event
//! processor, and matched events fan out to sinks under rate-limit
//! control. An HTTP control plane manages the config set and serves log
//! reads. Adding a new IRC client is a JSON file, not a pull request. 🦆
//!
//! ⚠️ "The singularity will happen before anyone reads their backlog."

pub mod adapters;
pub mod api;
pub mod app_config;
pub mod envsub;
pub mod filters;
pub mod orchestrator;
pub mod processor;
pub mod record;
pub mod sinks;
pub mod store;
pub mod templating;
pub mod watchers;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::orchestrator::Orchestrator;
use crate::sinks::CustomSinkRegistry;
use crate::store::ConfigStore;

/// 🚀 The grand entry point. The big kahuna. The main event.
///
/// Bring the whole system up, serve until interrupted, then shut down
/// cleanly. This is the only entry point the CLI needs — everything else
/// is the orchestrator's problem. (Delegation. It's called delegation.)
pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let mut store = ConfigStore::open(config_path)?;
    if store.auto_import_backup()? {
        info!("configuration restored from backup bundle");
    }
    let api_settings = store.root.api.clone();
    let config_dir = store.config_dir().to_path_buf();

    let orchestrator = Orchestrator::new(store, CustomSinkRegistry::default())?;
    orchestrator.start().await?;

    let mut api_task = None;
    if let Some(settings) = api_settings.filter(|s| s.enabled) {
        let token = api::auth::load_or_create_token(&config_dir, settings.auth_token.as_deref())?;
        let state = Arc::new(api::ApiState {
            orchestrator: orchestrator.clone(),
            token,
            file_ops_enabled: settings.enable_file_ops,
        });
        let (task, _) = api::serve(state, &settings.host, settings.port).await?;
        api_task = Some(task);
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown requested");
    orchestrator.stop().await;
    if let Some(task) = api_task {
        task.abort();
    }
    Ok(())
}
