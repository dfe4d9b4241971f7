//! 🔭 Server discovery — how a client learns which server hostnames its
//! log tree belongs to. Three working modes (static list, filesystem
//! scan, JSON lookup); `sqlite` is schema-accepted and yields nothing.
//!
//! 🧠 Knowledge graph: static = "I was told", filesystem = "I went
//! looking", json = "I read the client's own notes". sqlite = "I
//! acknowledged the database exists and chose peace". 🦆

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::filters;
use crate::store::model::ServerDiscoveryConfig;
use crate::templating;

/// 🚀 Run the configured discovery mode relative to the client's log
/// directory, returning de-duplicated hostnames in discovery order.
pub fn discover_servers(
    config: &ServerDiscoveryConfig,
    log_directory: &Path,
) -> Result<Vec<String>> {
    let hostnames = match config {
        ServerDiscoveryConfig::Static { servers } => servers.clone(),
        ServerDiscoveryConfig::Filesystem {
            pattern,
            hostname_pattern,
        } => {
            let regex = filters::compile(&hostname_pattern.pattern, "")
                .context("serverDiscovery hostnamePattern is not a valid regex")?;
            let full = log_directory.join(pattern);
            let Some(full) = full.to_str() else {
                return Ok(Vec::new());
            };
            let mut found = Vec::new();
            for path in glob::glob(full)
                .with_context(|| format!("bad serverDiscovery glob '{pattern}'"))?
                .flatten()
            {
                let text = match std::fs::read_to_string(&path) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(file = %path.display(), %err, "skipping unreadable discovery file");
                        continue;
                    }
                };
                for captures in regex.captures_iter(&text) {
                    if let Some(m) = captures.get(hostname_pattern.group) {
                        found.push(m.as_str().to_string());
                    }
                }
            }
            found
        }
        ServerDiscoveryConfig::Json {
            path,
            hostname_field,
        } => {
            let file = log_directory.join(path);
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read server list '{}'", file.display()))?;
            let value: serde_json::Value = serde_json::from_str(&text)
                .with_context(|| format!("'{}' is not valid JSON", file.display()))?;
            let items = match &value {
                serde_json::Value::Array(items) => items.as_slice(),
                single => std::slice::from_ref(single),
            };
            items
                .iter()
                .filter_map(|item| templating::lookup(item, hostname_field))
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        }
        ServerDiscoveryConfig::Sqlite { .. } => {
            info!("sqlite server discovery is declared but not queried");
            Vec::new()
        }
    };

    let mut seen = std::collections::HashSet::new();
    Ok(hostnames
        .into_iter()
        .filter(|h| seen.insert(h.clone()))
        .collect())
}
