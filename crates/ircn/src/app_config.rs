//! 🔧 Root Configuration — the sacred JSON-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the
//! fridge. In the junk drawer. Nothing." — every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing config files is a form
//! of self-harm that even the borrow checker wouldn't approve of.
//! The file is the base layer, then `ENABLE_API`, `API_PORT`, `API_HOST`,
//! `API_TOKEN`, `API_ENABLE_FILE_OPS` and `LOG_DIR` pile on top.
//! Absent or empty variables politely defer to the file values.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Format, Json},
};
use serde::{Deserialize, Serialize};
use tracing::info;

// 🔢 1000ms: chosen by rolling a d20, getting a 10, and multiplying by 100.
// -- "load tested", as they say.
fn default_polling_interval() -> u64 {
    1000
}

// 🔌 8675: three-oh-nine. If you know, you know. If you don't, it's a port.
fn default_api_port() -> u16 {
    8675
}

// 🔒 localhost by default — the control plane does not greet strangers
fn default_api_host() -> String {
    "127.0.0.1".to_string()
}

fn default_true() -> bool {
    true
}

/// 📦 The RootConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
///
/// 🎯 Contains everything the daemon needs to know about itself,
/// which is more self-awareness than most daemons achieve in their lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootConfig {
    /// ⏱️ Global polling interval in milliseconds. Drives the log-path
    /// refresh cadence and the watcher poll fallback. Configurable,
    /// unlike my children.
    #[serde(default = "default_polling_interval")]
    pub polling_interval: u64,
    #[serde(default)]
    pub debug: bool,
    /// 📂 Where client logs live when a client config doesn't say.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_log_directory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_directory: Option<String>,
    /// 🔄 Stream every watched file from offset 0 on startup instead of
    /// seeking to EOF. The "read me the whole saga" switch.
    #[serde(default)]
    pub rescan_logs_on_startup: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<ApiSettings>,
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            polling_interval: default_polling_interval(),
            debug: false,
            default_log_directory: None,
            config_directory: None,
            rescan_logs_on_startup: false,
            api: None,
        }
    }
}

/// 🚪 The control-plane knobs — the velvet rope at the HTTP club.
///
/// 🧠 Knowledge graph: these live in their own sub-record because the API
/// is optional equipment. A headless install never touches any of this
/// and the pipeline hums along regardless.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_api_port")]
    pub port: u16,
    #[serde(default = "default_api_host")]
    pub host: String,
    /// 🔑 Overrides the `auth_token.txt` file token when set.
    /// The premium tier of authentication. This is not a democracy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(default = "default_true")]
    pub enable_file_ops: bool,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_api_port(),
            host: default_api_host(),
            auth_token: None,
            enable_file_ops: true,
        }
    }
}

/// 🗺️ Locate the root config file: the explicit path when given, otherwise
/// `config.json` in the working directory, otherwise `config/config.json`
/// (which is also where a fresh install lands).
///
/// 📐 DESIGN NOTE (no cap, this is tribal knowledge):
///   - explicit path → we trust you, even if it doesn't exist yet
///   - `./config.json` → the ol' reliable
///   - `./config/config.json` → the default nest for first boots
pub fn resolve_root_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    let cwd_candidate = PathBuf::from("config.json");
    if cwd_candidate.is_file() {
        return cwd_candidate;
    }
    PathBuf::from("config").join("config.json")
}

/// 🚀 Load the root config — from a file, from env vars, or from the sheer
/// power of hoping.
///
/// 🔧 A missing file yields defaults (figment shrugs and moves on).
/// A malformed file is an error, because silently ignoring broken JSON is
/// how 3am incidents are born. 💀
pub fn load_root(path: &Path) -> Result<RootConfig> {
    info!(path = %path.display(), "🔧 loading root configuration");
    let figment = if path.is_file() {
        Figment::new().merge(Json::file(path))
    } else {
        Figment::new()
    };
    let mut root: RootConfig = figment.extract().with_context(|| {
        format!(
            "💀 Failed to parse root config '{}'. The file exists in our \
             hearts, but apparently not as valid JSON.",
            path.display()
        )
    })?;
    apply_env_overrides(&mut root, |name| std::env::var(name).ok());
    Ok(root)
}

/// 🌍 Control-plane env vars override file values; empty values are
/// ignored (an empty string is the environment's way of saying "dunno").
pub fn apply_env_overrides(root: &mut RootConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(dir) = get("LOG_DIR") {
        root.default_log_directory = Some(dir);
    }

    // 🧠 Only materialize the api sub-record if someone actually asked for
    // it — either the file had one, or an env var showed up to the party
    let wants_api = [
        "ENABLE_API",
        "API_PORT",
        "API_HOST",
        "API_TOKEN",
        "API_ENABLE_FILE_OPS",
    ]
    .iter()
    .any(|name| get(name).is_some());
    if !wants_api && root.api.is_none() {
        return;
    }

    let api = root.api.get_or_insert_with(ApiSettings::default);
    if let Some(enabled) = get("ENABLE_API") {
        api.enabled = truthy(&enabled);
    }
    if let Some(port) = get("API_PORT").and_then(|p| p.parse().ok()) {
        api.port = port;
    }
    if let Some(host) = get("API_HOST") {
        api.host = host;
    }
    if let Some(token) = get("API_TOKEN") {
        api.auth_token = Some(token);
    }
    if let Some(flag) = get("API_ENABLE_FILE_OPS") {
        api.enable_file_ops = truthy(&flag);
    }
}

// ✅ "1", "true", "yes", "on" — the four horsemen of enthusiasm.
// Everything else is a no. Including "TRUE!!!", sorry Kevin.
fn truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
