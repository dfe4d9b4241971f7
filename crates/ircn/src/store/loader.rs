//! 🗄️ The configuration store core — discovery, per-file loading with
//! validation, cross-reference pruning, atomic persistence, and the
//! write/delete operations the control plane builds on.
//!
//! 🧠 Knowledge graph: a single malformed file never aborts a load; it is
//! skipped and logged, because one fat-fingered JSON comma should not
//! silence every notification in the house. Pruning (stale sink/server
//! ids in events) sanitizes both the in-memory copy and the file on disk,
//! so what you read back is what the pipeline actually runs. 📜

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::app_config::{self, RootConfig};
use crate::store::model::{
    Category, ClientConfig, EventConfig, ServerConfig, SinkConfig,
};

#[derive(Debug)]
pub struct ConfigStore {
    root_path: PathBuf,
    config_dir: PathBuf,
    pub root: RootConfig,
    pub clients: BTreeMap<String, ClientConfig>,
    pub servers: BTreeMap<String, ServerConfig>,
    pub events: BTreeMap<String, EventConfig>,
    pub sinks: BTreeMap<String, SinkConfig>,
}

/// What a load pass found, for the startup/reload summary lines.
#[derive(Debug, Default)]
pub struct LoadSummary {
    pub clients: usize,
    pub servers: usize,
    pub events: usize,
    pub sinks: usize,
    pub pruned_events: usize,
    pub rejected: Vec<(String, String)>,
}

/// Outcome of a category write, reported back through the control plane.
#[derive(Debug)]
pub struct WriteOutcome {
    pub id: String,
    pub stored_name: String,
    pub requested_name: String,
    pub renamed: bool,
    pub cascade: Option<CascadeReport>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CascadeReport {
    pub updated_files: usize,
    pub total_files: usize,
}

#[derive(Debug)]
pub struct DeleteOutcome {
    pub deleted: bool,
    pub cascade: Option<CascadeReport>,
}

impl ConfigStore {
    /// 🚀 Open the store rooted at the resolved config path. Creates the
    /// root config file (with defaults) and the category sub-directories
    /// when they do not exist yet. First boot is a housewarming, not an
    /// error.
    pub fn open(explicit_root: Option<&Path>) -> Result<Self> {
        let root_path = app_config::resolve_root_path(explicit_root);
        if !root_path.is_file() {
            if let Some(parent) = root_path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create config directory '{}'", parent.display())
                })?;
            }
            let defaults = serde_json::to_value(RootConfig::default())?;
            atomic_write_json(&root_path, &defaults)?;
            info!(path = %root_path.display(), "created default root config");
        }

        let root = app_config::load_root(&root_path)?;
        let config_dir = match &root.config_directory {
            Some(dir) => PathBuf::from(dir),
            None => root_path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };

        let mut store = Self {
            root_path,
            config_dir,
            root,
            clients: BTreeMap::new(),
            servers: BTreeMap::new(),
            events: BTreeMap::new(),
            sinks: BTreeMap::new(),
        };
        store.ensure_layout()?;
        let summary = store.load_categories()?;
        store.log_summary("loaded", &summary);
        Ok(store)
    }

    /// 🔄 Re-read everything from disk. On any root-level failure the
    /// current state is left untouched and the error is returned — the
    /// old config keeps serving while you fix your typo. You're welcome.
    pub fn reload(&mut self) -> Result<LoadSummary> {
        let root = app_config::load_root(&self.root_path)?;
        let mut fresh = Self {
            root_path: self.root_path.clone(),
            config_dir: match &root.config_directory {
                Some(dir) => PathBuf::from(dir),
                None => self.config_dir.clone(),
            },
            root,
            clients: BTreeMap::new(),
            servers: BTreeMap::new(),
            events: BTreeMap::new(),
            sinks: BTreeMap::new(),
        };
        fresh.ensure_layout()?;
        let summary = fresh.load_categories()?;
        *self = fresh;
        self.log_summary("reloaded", &summary);
        Ok(summary)
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn category_dir(&self, category: Category) -> PathBuf {
        self.config_dir.join(category.dir_name())
    }

    fn ensure_layout(&self) -> Result<()> {
        for category in Category::ALL {
            let dir = self.category_dir(category);
            fs::create_dir_all(&dir).with_context(|| {
                format!("failed to create category directory '{}'", dir.display())
            })?;
        }
        Ok(())
    }

    fn load_categories(&mut self) -> Result<LoadSummary> {
        let mut summary = LoadSummary::default();

        self.clients = self.load_category_map(Category::Clients, &mut summary, |value| {
            let config: ClientConfig = serde_json::from_value(value)?;
            config.validate()?;
            Ok((config.id.clone(), config))
        })?;
        self.servers = self.load_category_map(Category::Servers, &mut summary, |value| {
            let config: ServerConfig = serde_json::from_value(value)?;
            config.validate()?;
            Ok((config.id.clone(), config))
        })?;
        self.sinks = self.load_category_map(Category::Sinks, &mut summary, |value| {
            let config: SinkConfig = serde_json::from_value(value)?;
            config.validate()?;
            Ok((config.id.clone(), config))
        })?;
        self.events = self.load_category_map(Category::Events, &mut summary, |value| {
            let config: EventConfig = serde_json::from_value(value)?;
            config.validate()?;
            Ok((config.id.clone(), config))
        })?;

        summary.clients = self.clients.len();
        summary.servers = self.servers.len();
        summary.sinks = self.sinks.len();
        summary.events = self.events.len();
        summary.pruned_events = self.prune_events()?;
        Ok(summary)
    }

    fn load_category_map<T>(
        &self,
        category: Category,
        summary: &mut LoadSummary,
        parse: impl Fn(Value) -> Result<(String, T)>,
    ) -> Result<BTreeMap<String, T>> {
        let mut map = BTreeMap::new();
        for path in list_json_files(&self.category_dir(category))? {
            let display_path = path.display().to_string();
            let value = match fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|text| serde_json::from_str::<Value>(&text).map_err(Into::into))
            {
                Ok(value) => value,
                Err(err) => {
                    warn!(file = %display_path, %err, "skipping unreadable config file");
                    summary.rejected.push((display_path, err.to_string()));
                    continue;
                }
            };
            match parse(value) {
                Ok((id, config)) => {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                        && stem != id
                    {
                        warn!(file = %display_path, id, "config basename does not match its id");
                    }
                    if map.contains_key(&id) {
                        warn!(file = %display_path, id, "duplicate id in category, keeping first");
                        continue;
                    }
                    map.insert(id, config);
                }
                Err(err) => {
                    warn!(file = %display_path, err = format!("{err:#}"), "rejecting invalid config");
                    summary.rejected.push((display_path, format!("{err:#}")));
                }
            }
        }
        Ok(map)
    }

    /// 🧹 Drop stale sink/server references from every event,
    /// de-duplicating while preserving order, and persist any event that
    /// changed. Events pointing at deleted sinks are pointing at ghosts,
    /// and we do not deliver to ghosts. 👻
    fn prune_events(&mut self) -> Result<usize> {
        let events_dir = self.category_dir(Category::Events);
        let mut pruned = 0;
        for event in self.events.values_mut() {
            let before_sinks = event.sink_ids.clone();
            let before_servers = event.server_ids.clone();

            dedup_retain(&mut event.sink_ids, |id| self.sinks.contains_key(id));
            dedup_retain(&mut event.server_ids, |id| {
                id == "*" || self.servers.contains_key(id)
            });

            if event.sink_ids != before_sinks || event.server_ids != before_servers {
                warn!(
                    event = %event.id,
                    sinks_before = ?before_sinks,
                    sinks_after = ?event.sink_ids,
                    servers_before = ?before_servers,
                    servers_after = ?event.server_ids,
                    "pruned stale references from event"
                );
                let path = events_dir.join(format!("{}.json", event.id));
                atomic_write_json(&path, &serde_json::to_value(&*event)?)?;
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    fn log_summary(&self, verb: &str, summary: &LoadSummary) {
        info!(
            clients = summary.clients,
            servers = summary.servers,
            events = summary.events,
            sinks = summary.sinks,
            pruned = summary.pruned_events,
            rejected = summary.rejected.len(),
            "{verb} configuration from {}",
            self.config_dir.display()
        );
    }

    // -- control-plane operations ------------------------------------------

    pub fn list_files(&self) -> BTreeMap<&'static str, Vec<String>> {
        let mut out = BTreeMap::new();
        for category in Category::ALL {
            let names = list_json_files(&self.category_dir(category))
                .unwrap_or_default()
                .into_iter()
                .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(String::from))
                .collect();
            out.insert(category.dir_name(), names);
        }
        out
    }

    pub fn read_file(&self, category: Category, name: &str) -> Result<Option<Value>> {
        let path = self.category_dir(category).join(format!("{name}.json"));
        if !path.is_file() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read '{}'", path.display()))?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    /// ✍️ Write a category config. The body's `id` decides the stored
    /// name; if the requested name differs the old file is removed and
    /// sink or server renames cascade through every event. The id is the
    /// law. The URL was merely a suggestion.
    pub fn write_file(
        &mut self,
        category: Category,
        requested_name: &str,
        mut body: Value,
    ) -> Result<WriteOutcome> {
        let id = match category {
            Category::Clients => {
                let config: ClientConfig = parse_body(&body)?;
                config.validate()?;
                let id = config.id.clone();
                self.clients.insert(id.clone(), config);
                id
            }
            Category::Servers => {
                let config: ServerConfig = parse_body(&body)?;
                config.validate()?;
                let id = config.id.clone();
                self.servers.insert(id.clone(), config);
                id
            }
            Category::Sinks => {
                let config: SinkConfig = parse_body(&body)?;
                config.validate()?;
                let id = config.id.clone();
                self.sinks.insert(id.clone(), config);
                id
            }
            Category::Events => {
                let mut config: EventConfig = parse_body(&body)?;
                config.validate()?;
                // stale references are dropped on the write path too
                dedup_retain(&mut config.sink_ids, |sid| self.sinks.contains_key(sid));
                dedup_retain(&mut config.server_ids, |sid| {
                    sid == "*" || self.servers.contains_key(sid)
                });
                body["sinkIds"] = serde_json::to_value(&config.sink_ids)?;
                body["serverIds"] = serde_json::to_value(&config.server_ids)?;
                let id = config.id.clone();
                self.events.insert(id.clone(), config);
                id
            }
        };

        let dir = self.category_dir(category);
        let path = dir.join(format!("{id}.json"));
        atomic_write_json(&path, &body)?;

        let renamed = requested_name != id;
        let mut cascade = None;
        if renamed {
            let stale = dir.join(format!("{requested_name}.json"));
            remove_existing(&stale)?;
            match category {
                Category::Sinks => {
                    self.sinks.remove(requested_name);
                    cascade = Some(self.cascade_replace_sink(requested_name, Some(&id))?);
                }
                Category::Servers => {
                    self.servers.remove(requested_name);
                    cascade = Some(self.cascade_replace_server(requested_name, Some(&id))?);
                }
                Category::Clients => {
                    self.clients.remove(requested_name);
                }
                Category::Events => {
                    self.events.remove(requested_name);
                }
            }
        }

        Ok(WriteOutcome {
            stored_name: id.clone(),
            requested_name: requested_name.to_string(),
            renamed,
            cascade,
            id,
        })
    }

    /// 🗑️ Delete a category config (and any legacy non-JSON sibling
    /// sharing its stem). Sink and server deletes cascade through events,
    /// so nothing is left referencing the dearly departed.
    pub fn delete_file(&mut self, category: Category, name: &str) -> Result<DeleteOutcome> {
        let dir = self.category_dir(category);
        let deleted = remove_existing(&dir.join(format!("{name}.json")))?;
        remove_legacy_siblings(&dir, name)?;

        let cascade = match category {
            Category::Clients => {
                self.clients.remove(name);
                None
            }
            Category::Servers => {
                self.servers.remove(name);
                Some(self.cascade_replace_server(name, None)?)
            }
            Category::Sinks => {
                self.sinks.remove(name);
                Some(self.cascade_replace_sink(name, None)?)
            }
            Category::Events => {
                self.events.remove(name);
                None
            }
        };
        Ok(DeleteOutcome { deleted, cascade })
    }

    /// ✍️ Replace the root config and persist it atomically.
    pub fn write_root(&mut self, body: Value) -> Result<()> {
        let mut root: RootConfig = parse_body(&body)?;
        app_config::apply_env_overrides(&mut root, |name| std::env::var(name).ok());
        atomic_write_json(&self.root_path, &body)?;
        self.root = root;
        Ok(())
    }

    /// 🔗 Remove or rename `sink_id` in every event's `sinkIds`.
    fn cascade_replace_sink(
        &mut self,
        sink_id: &str,
        replacement: Option<&str>,
    ) -> Result<CascadeReport> {
        let events_dir = self.category_dir(Category::Events);
        let mut report = CascadeReport {
            total_files: self.events.len(),
            ..Default::default()
        };
        for event in self.events.values_mut() {
            if !event.sink_ids.iter().any(|id| id == sink_id) {
                continue;
            }
            match replacement {
                Some(new_id) => {
                    for id in event.sink_ids.iter_mut() {
                        if id == sink_id {
                            *id = new_id.to_string();
                        }
                    }
                }
                None => event.sink_ids.retain(|id| id != sink_id),
            }
            dedup_in_place(&mut event.sink_ids);
            let path = events_dir.join(format!("{}.json", event.id));
            atomic_write_json(&path, &serde_json::to_value(&*event)?)?;
            report.updated_files += 1;
        }
        debug!(sink_id, updated = report.updated_files, "cascaded sink change");
        Ok(report)
    }

    /// 🔗 Remove or rename `server_id` in every event's `serverIds`; the
    /// `*` wildcard is never touched. The wildcard answers to no one.
    fn cascade_replace_server(
        &mut self,
        server_id: &str,
        replacement: Option<&str>,
    ) -> Result<CascadeReport> {
        let events_dir = self.category_dir(Category::Events);
        let mut report = CascadeReport {
            total_files: self.events.len(),
            ..Default::default()
        };
        for event in self.events.values_mut() {
            if !event.server_ids.iter().any(|id| id == server_id) {
                continue;
            }
            match replacement {
                Some(new_id) => {
                    for id in event.server_ids.iter_mut() {
                        if id == server_id {
                            *id = new_id.to_string();
                        }
                    }
                }
                None => event.server_ids.retain(|id| id != server_id),
            }
            dedup_in_place(&mut event.server_ids);
            let path = events_dir.join(format!("{}.json", event.id));
            atomic_write_json(&path, &serde_json::to_value(&*event)?)?;
            report.updated_files += 1;
        }
        debug!(server_id, updated = report.updated_files, "cascaded server change");
        Ok(report)
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &Value) -> Result<T> {
    if !body.is_object() {
        bail!("config body must be a JSON object");
    }
    serde_json::from_value(body.clone()).map_err(Into::into)
}

/// 📂 `*.json` files in `dir`, sorted by name for deterministic load
/// order. Same files, same order, every time. Chaos is for the logs.
pub fn list_json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to list '{}'", dir.display()));
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// ⚛️ Serialize to a sibling temp file, then rename into place. The temp
/// file is removed on any failure — readers see the old file or the new
/// file, never a half-written one. rename(2), the unsung hero.
pub fn atomic_write_json(path: &Path, value: &Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    let write_result = fs::write(&tmp, text.as_bytes())
        .and_then(|()| fs::rename(&tmp, path))
        .with_context(|| {
            format!(
                "💀 Atomic write of '{}' failed. We wrote the temp file with \
                 care, we asked rename(2) nicely, and the filesystem said \
                 'no'. Check disk space. Check permissions. Check your \
                 horoscope.",
                path.display()
            )
        });
    if write_result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    write_result
}

/// 🗑️ Remove `path` if present; reports whether a file existed.
pub fn remove_existing(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err).with_context(|| format!("failed to remove '{}'", path.display())),
    }
}

/// 🦴 Older installs kept sidecar files next to configs (`<id>.yaml` and
/// the like); a delete removes them too. Archaeology, but destructive.
fn remove_legacy_siblings(dir: &Path, stem: &str) -> Result<()> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Ok(());
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let matches_stem = path.file_stem().and_then(|s| s.to_str()) == Some(stem);
        let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
        if matches_stem && !is_json && path.is_file() {
            remove_existing(&path)?;
        }
    }
    Ok(())
}

/// 🧹 Retain ids passing `keep`, de-duplicating while preserving
/// first-seen order.
fn dedup_retain(ids: &mut Vec<String>, keep: impl Fn(&str) -> bool) {
    let mut seen = std::collections::HashSet::new();
    ids.retain(|id| keep(id) && seen.insert(id.clone()));
}

fn dedup_in_place(ids: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    ids.retain(|id| seen.insert(id.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seed(dir: &Path, category: &str, name: &str, value: &Value) {
        let cat_dir = dir.join(category);
        fs::create_dir_all(&cat_dir).unwrap();
        fs::write(
            cat_dir.join(format!("{name}.json")),
            serde_json::to_string_pretty(value).unwrap(),
        )
        .unwrap();
    }

    fn minimal_sink(id: &str) -> Value {
        json!({"id": id, "kind": "console", "name": id})
    }

    fn minimal_server(id: &str) -> Value {
        json!({"id": id, "hostname": format!("irc.{id}.net"), "displayName": id})
    }

    fn minimal_event(id: &str, sinks: Vec<&str>, servers: Vec<&str>) -> Value {
        json!({
            "id": id,
            "name": id,
            "baseEvent": "message",
            "sinkIds": sinks,
            "serverIds": servers,
        })
    }

    fn open_store(dir: &Path) -> ConfigStore {
        ConfigStore::open(Some(&dir.join("config.json"))).unwrap()
    }

    #[test]
    fn open_creates_layout_and_default_root() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(tmp.path());
        assert!(tmp.path().join("config.json").is_file());
        for category in ["clients", "servers", "events", "sinks"] {
            assert!(tmp.path().join(category).is_dir(), "{category} missing");
        }
        assert_eq!(store.root.polling_interval, 1000);
    }

    #[test]
    fn loads_categories_and_skips_invalid_files() {
        let tmp = tempfile::tempdir().unwrap();
        seed(tmp.path(), "sinks", "console", &minimal_sink("console"));
        seed(tmp.path(), "servers", "libera", &minimal_server("libera"));
        seed(
            tmp.path(),
            "events",
            "ping",
            &minimal_event("ping", vec!["console"], vec!["libera"]),
        );
        fs::write(tmp.path().join("sinks/broken.json"), "{oops").unwrap();
        let store = open_store(tmp.path());
        assert_eq!(store.sinks.len(), 1);
        assert_eq!(store.servers.len(), 1);
        assert_eq!(store.events.len(), 1);
    }

    #[test]
    fn auto_prunes_stale_references_and_persists() {
        let tmp = tempfile::tempdir().unwrap();
        seed(tmp.path(), "sinks", "console", &minimal_sink("console"));
        seed(
            tmp.path(),
            "events",
            "ping",
            &minimal_event("ping", vec!["gone", "console", "console"], vec!["ghost", "*"]),
        );
        let store = open_store(tmp.path());
        let event = &store.events["ping"];
        assert_eq!(event.sink_ids, vec!["console"]);
        assert_eq!(event.server_ids, vec!["*"]);
        // persisted in sanitized form
        let on_disk: Value = serde_json::from_str(
            &fs::read_to_string(tmp.path().join("events/ping.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(on_disk["sinkIds"], json!(["console"]));
        assert_eq!(on_disk["serverIds"], json!(["*"]));
    }

    #[test]
    fn event_referencing_nothing_loads_with_empty_sinks() {
        let tmp = tempfile::tempdir().unwrap();
        seed(
            tmp.path(),
            "events",
            "lonely",
            &minimal_event("lonely", vec!["gone"], vec![]),
        );
        let store = open_store(tmp.path());
        assert!(store.events["lonely"].sink_ids.is_empty());
    }

    #[test]
    fn write_stores_under_id_and_reports_rename() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = open_store(tmp.path());
        let outcome = store
            .write_file(Category::Sinks, "old-name", minimal_sink("new-name"))
            .unwrap();
        assert!(outcome.renamed);
        assert_eq!(outcome.stored_name, "new-name");
        assert!(tmp.path().join("sinks/new-name.json").is_file());
        assert!(!tmp.path().join("sinks/old-name.json").exists());
    }

    #[test]
    fn write_preserves_unknown_fields_on_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = open_store(tmp.path());
        let mut body = minimal_sink("console");
        body["customExtra"] = json!({"keep": true});
        store.write_file(Category::Sinks, "console", body).unwrap();
        let read = store.read_file(Category::Sinks, "console").unwrap().unwrap();
        assert_eq!(read["customExtra"]["keep"], true);
    }

    #[test]
    fn sink_rename_cascades_through_events() {
        let tmp = tempfile::tempdir().unwrap();
        seed(tmp.path(), "sinks", "x", &minimal_sink("x"));
        seed(
            tmp.path(),
            "events",
            "one",
            &minimal_event("one", vec!["x"], vec![]),
        );
        let mut store = open_store(tmp.path());
        let outcome = store
            .write_file(Category::Sinks, "x", minimal_sink("y"))
            .unwrap();
        assert!(outcome.renamed);
        assert_eq!(outcome.cascade.unwrap().updated_files, 1);
        assert_eq!(store.events["one"].sink_ids, vec!["y"]);
    }

    #[test]
    fn sink_delete_cascades_through_events() {
        let tmp = tempfile::tempdir().unwrap();
        seed(tmp.path(), "sinks", "x", &minimal_sink("x"));
        seed(tmp.path(), "sinks", "keep", &minimal_sink("keep"));
        seed(
            tmp.path(),
            "events",
            "one",
            &minimal_event("one", vec!["x", "keep"], vec![]),
        );
        seed(
            tmp.path(),
            "events",
            "two",
            &minimal_event("two", vec!["x"], vec![]),
        );
        let mut store = open_store(tmp.path());
        let outcome = store.delete_file(Category::Sinks, "x").unwrap();
        assert!(outcome.deleted);
        let cascade = outcome.cascade.unwrap();
        assert_eq!(cascade.updated_files, 2);
        assert_eq!(cascade.total_files, 2);
        assert_eq!(store.events["one"].sink_ids, vec!["keep"]);
        assert!(store.events["two"].sink_ids.is_empty());
    }

    #[test]
    fn server_delete_preserves_wildcard() {
        let tmp = tempfile::tempdir().unwrap();
        seed(tmp.path(), "servers", "libera", &minimal_server("libera"));
        seed(
            tmp.path(),
            "events",
            "one",
            &minimal_event("one", vec![], vec!["*", "libera"]),
        );
        let mut store = open_store(tmp.path());
        store.delete_file(Category::Servers, "libera").unwrap();
        assert_eq!(store.events["one"].server_ids, vec!["*"]);
    }

    #[test]
    fn delete_removes_legacy_sibling() {
        let tmp = tempfile::tempdir().unwrap();
        seed(tmp.path(), "sinks", "x", &minimal_sink("x"));
        fs::write(tmp.path().join("sinks/x.yaml"), "legacy: true").unwrap();
        let mut store = open_store(tmp.path());
        let outcome = store.delete_file(Category::Sinks, "x").unwrap();
        assert!(outcome.deleted);
        assert!(!tmp.path().join("sinks/x.yaml").exists());
    }

    #[test]
    fn delete_of_missing_file_reports_false() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = open_store(tmp.path());
        let outcome = store.delete_file(Category::Sinks, "nope").unwrap();
        assert!(!outcome.deleted);
    }

    #[test]
    fn reload_failure_keeps_state() {
        let tmp = tempfile::tempdir().unwrap();
        seed(tmp.path(), "sinks", "console", &minimal_sink("console"));
        let mut store = open_store(tmp.path());
        assert_eq!(store.sinks.len(), 1);
        fs::write(tmp.path().join("config.json"), "{broken").unwrap();
        assert!(store.reload().is_err());
        assert_eq!(store.sinks.len(), 1);
    }

    #[test]
    fn atomic_write_leaves_no_temp_files() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.json");
        atomic_write_json(&path, &json!({"ok": true})).unwrap();
        let names: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["out.json"]);
    }
}
