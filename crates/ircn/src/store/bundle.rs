//! 📦 Config bundles — the whole installation as one gzipped JSON
//! document. A moving box for your config, bubble wrap included. 🫁
//!
//! Export captures the raw on-disk files (unknown fields included) plus a
//! metadata stamp. Import either replaces the installation wholesale or
//! merges by id. Only `*.json` files participate; the auth-token file and
//! other sidecars never travel in a bundle — secrets stay home.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::store::loader::{ConfigStore, atomic_write_json, list_json_files, remove_existing};
use crate::store::model::Category;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    Replace,
    Merge { prefer_incoming: bool },
}

#[derive(Debug, Default)]
pub struct ImportSummary {
    pub written: usize,
    pub skipped: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Bundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    root: Option<Value>,
    #[serde(default)]
    clients: BTreeMap<String, Value>,
    #[serde(default)]
    servers: BTreeMap<String, Value>,
    #[serde(default)]
    events: BTreeMap<String, Value>,
    #[serde(default)]
    sinks: BTreeMap<String, Value>,
    metadata: BundleMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BundleMetadata {
    timestamp: String,
    config_directory: String,
}

impl Bundle {
    fn category(&self, category: Category) -> &BTreeMap<String, Value> {
        match category {
            Category::Clients => &self.clients,
            Category::Servers => &self.servers,
            Category::Events => &self.events,
            Category::Sinks => &self.sinks,
        }
    }
}

impl ConfigStore {
    /// 📤 Serialize the current installation into a gzipped bundle.
    pub fn export_bundle(&self) -> Result<Vec<u8>> {
        let mut bundle = Bundle {
            root: read_raw(self.root_path())?,
            clients: BTreeMap::new(),
            servers: BTreeMap::new(),
            events: BTreeMap::new(),
            sinks: BTreeMap::new(),
            metadata: BundleMetadata {
                timestamp: Utc::now().to_rfc3339(),
                config_directory: self.config_dir().display().to_string(),
            },
        };
        for category in Category::ALL {
            let entries = read_category_raw(&self.category_dir(category))?;
            match category {
                Category::Clients => bundle.clients = entries,
                Category::Servers => bundle.servers = entries,
                Category::Events => bundle.events = entries,
                Category::Sinks => bundle.sinks = entries,
            }
        }
        let json = serde_json::to_vec(&bundle)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json)?;
        Ok(encoder.finish()?)
    }

    /// 📥 Apply an uploaded bundle and reload the store from disk.
    ///
    /// `replace` deletes every category `*.json` and the root config
    /// first — scorched earth, then fresh sod. `merge` writes only ids
    /// not already present unless `prefer_incoming` flips the precedence.
    /// In both modes the imported root's `configDirectory` is adjusted to
    /// this installation when `adjust_config_directory` is set, because
    /// the bundle came from SOMEONE ELSE'S filesystem and their paths are
    /// not your paths.
    pub fn import_bundle(
        &mut self,
        bytes: &[u8],
        mode: ImportMode,
        adjust_config_directory: bool,
    ) -> Result<ImportSummary> {
        let bundle = decode_bundle(bytes)?;
        let mut summary = ImportSummary::default();

        if mode == ImportMode::Replace {
            for category in Category::ALL {
                for path in list_json_files(&self.category_dir(category))? {
                    remove_existing(&path)?;
                }
            }
            remove_existing(self.root_path())?;
        }

        let write_root = match mode {
            ImportMode::Replace => true,
            ImportMode::Merge { prefer_incoming } => prefer_incoming,
        };
        if write_root && let Some(mut root) = bundle.root.clone() {
            if adjust_config_directory
                && let Some(obj) = root.as_object_mut()
            {
                obj.insert(
                    "configDirectory".to_string(),
                    Value::String(self.config_dir().display().to_string()),
                );
            }
            atomic_write_json(self.root_path(), &root)?;
        }

        for category in Category::ALL {
            let dir = self.category_dir(category);
            fs::create_dir_all(&dir)?;
            for (id, value) in bundle.category(category) {
                let path = dir.join(format!("{id}.json"));
                let keep_existing = match mode {
                    ImportMode::Replace => false,
                    ImportMode::Merge { prefer_incoming } => !prefer_incoming && path.is_file(),
                };
                if keep_existing {
                    summary.skipped += 1;
                    continue;
                }
                atomic_write_json(&path, value)?;
                summary.written += 1;
            }
        }

        self.reload()?;
        info!(
            written = summary.written,
            skipped = summary.skipped,
            "imported configuration bundle"
        );
        Ok(summary)
    }

    /// 🛟 First-startup convenience: when the config set is completely
    /// empty and `<configDir>/backups/` holds bundles, import the one with
    /// the most recent embedded timestamp. Rising from the ashes, but for
    /// JSON files.
    pub fn auto_import_backup(&mut self) -> Result<bool> {
        let empty = self.clients.is_empty()
            && self.servers.is_empty()
            && self.events.is_empty()
            && self.sinks.is_empty();
        if !empty {
            return Ok(false);
        }
        let backups_dir = self.config_dir().join("backups");
        let Ok(entries) = fs::read_dir(&backups_dir) else {
            return Ok(false);
        };

        let mut newest: Option<(String, Vec<u8>)> = None;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("gz") {
                continue;
            }
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(file = %path.display(), %err, "skipping unreadable backup");
                    continue;
                }
            };
            match decode_bundle(&bytes) {
                Ok(bundle) => {
                    let stamp = bundle.metadata.timestamp.clone();
                    if newest.as_ref().is_none_or(|(best, _)| stamp > *best) {
                        newest = Some((stamp, bytes));
                    }
                }
                Err(err) => warn!(file = %path.display(), %err, "skipping invalid backup"),
            }
        }

        let Some((stamp, bytes)) = newest else {
            return Ok(false);
        };
        info!(timestamp = %stamp, "auto-importing most recent backup bundle");
        self.import_bundle(&bytes, ImportMode::Replace, true)?;
        Ok(true)
    }
}

fn decode_bundle(bytes: &[u8]) -> Result<Bundle> {
    let mut decoder = GzDecoder::new(bytes);
    let mut json = Vec::new();
    decoder
        .read_to_end(&mut json)
        .context("bundle is not valid gzip data")?;
    if json.is_empty() {
        bail!("bundle is empty");
    }
    serde_json::from_slice(&json).context("bundle payload is not a valid config document")
}

fn read_raw(path: &Path) -> Result<Option<Value>> {
    if !path.is_file() {
        return Ok(None);
    }
    let text = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&text)?))
}

fn read_category_raw(dir: &Path) -> Result<BTreeMap<String, Value>> {
    let mut entries = BTreeMap::new();
    for path in list_json_files(dir)? {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|text| serde_json::from_str::<Value>(&text).map_err(Into::into))
        {
            Ok(value) => {
                entries.insert(stem.to_string(), value);
            }
            Err(err) => warn!(file = %path.display(), %err, "skipping file during export"),
        }
    }
    Ok(entries)
}
