//! 📖 Log read routes — target enumeration, paged reads, tails, and the
//! discovery listing. Read your backlog over HTTP like a civilized person.
//!
//! 🔒 Every `path` parameter must normalize to a file strictly inside an
//! enabled client's log directory. `../../etc/passwd` enthusiasts get a
//! 403 and our warmest regards.

use std::io::Write;
use std::path::PathBuf;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::adapters::ClientAdapter;
use crate::api::{ApiError, SharedState};
use crate::record::TargetKind;
use crate::store::model::ServerConfig;

const GZIP_THRESHOLD: usize = 4096;

fn default_read_limit() -> usize {
    10_000
}

fn default_message_limit() -> usize {
    100
}

fn default_tail_lines() -> usize {
    100
}

/// 🛂 Canonicalize `raw` and require it to live strictly inside at least
/// one enabled client's log directory. Symlinks are resolved first, so
/// creative-path enjoyers end up in the same queue as everyone else.
async fn resolve_safe_path(state: &SharedState, raw: &str) -> Result<PathBuf, ApiError> {
    let canonical = tokio::fs::canonicalize(raw)
        .await
        .map_err(|_| ApiError::forbidden("path is outside every log directory"))?;
    if !canonical.is_file() {
        return Err(ApiError::forbidden("path is not a log file"));
    }
    let pipeline = state.orchestrator.pipeline().await;
    for client in &pipeline.clients {
        let Ok(dir) = std::fs::canonicalize(client.log_directory()) else {
            continue;
        };
        if canonical.starts_with(&dir) && canonical != dir {
            return Ok(canonical);
        }
    }
    Err(ApiError::forbidden("path is outside every log directory"))
}

struct FileLines {
    lines: Vec<String>,
    size: u64,
    modified: Option<DateTime<Utc>>,
}

async fn read_file_lines(path: &PathBuf) -> Result<FileLines, ApiError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|err| ApiError::internal(err.into()))?;
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|err| ApiError::internal(err.into()))?;
    let text = String::from_utf8_lossy(&bytes);
    let mut lines: Vec<String> = text.split('\n').map(|l| l.trim_end_matches('\r').to_string()).collect();
    if lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    Ok(FileLines {
        lines,
        size: meta.len(),
        modified: meta.modified().ok().map(DateTime::<Utc>::from),
    })
}

fn iso(modified: Option<DateTime<Utc>>) -> Value {
    match modified {
        Some(ts) => json!(ts.to_rfc3339()),
        None => Value::Null,
    }
}

/// 🫁 Serialize to JSON, gzipping large bodies when the client
/// advertises support. Five thousand log lines travel better squished.
fn json_response(headers: &HeaderMap, value: Value) -> Response {
    let accepts_gzip = headers
        .get(header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("gzip"));
    let body = value.to_string();
    if accepts_gzip && body.len() > GZIP_THRESHOLD {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        if encoder.write_all(body.as_bytes()).is_ok()
            && let Ok(compressed) = encoder.finish()
        {
            return (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "application/json"),
                    (header::CONTENT_ENCODING, "gzip"),
                ],
                compressed,
            )
                .into_response();
        }
    }
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

/// 🪜 The server-filter heuristics mirror the processor's lookup ladder
/// for a single server: uuid (full then partial), display name, id.
fn identifier_matches_server(identifier: &str, server: &ServerConfig) -> bool {
    let ident_lower = identifier.to_lowercase();
    if let Some(uuid) = server.metadata.get("uuid").and_then(Value::as_str) {
        if uuid.eq_ignore_ascii_case(identifier) {
            return true;
        }
        let segments: Vec<&str> = uuid.split('-').collect();
        if segments.len() >= 3 {
            let partial = segments[segments.len() - 3..].join("-");
            if partial.eq_ignore_ascii_case(identifier) {
                return true;
            }
        }
    }
    if server.display_name.eq_ignore_ascii_case(identifier)
        || server.id.eq_ignore_ascii_case(identifier)
    {
        return true;
    }
    (!server.display_name.is_empty()
        && ident_lower.starts_with(&server.display_name.to_lowercase()))
        || ident_lower.contains(&server.id.to_lowercase())
}

fn target_kind_name(kind: TargetKind) -> &'static str {
    match kind {
        TargetKind::Channel => "channel",
        TargetKind::Query => "query",
        TargetKind::Console => "console",
    }
}

fn kind_rank(kind: TargetKind) -> u8 {
    match kind {
        TargetKind::Console => 0,
        TargetKind::Channel => 1,
        TargetKind::Query => 2,
    }
}

struct DiscoveredFile {
    client_id: String,
    path: PathBuf,
    target_name: Option<String>,
    target_kind: Option<TargetKind>,
    server_identifier: Option<String>,
}

async fn discover_files(
    state: &SharedState,
    client_filter: Option<&str>,
) -> Vec<DiscoveredFile> {
    let pipeline = state.orchestrator.pipeline().await;
    let mut files = Vec::new();
    for client in &pipeline.clients {
        if client_filter.is_some_and(|id| !id.eq_ignore_ascii_case(client.id())) {
            continue;
        }
        collect_client_files(client, &mut files);
    }
    files
}

fn collect_client_files(client: &ClientAdapter, files: &mut Vec<DiscoveredFile>) {
    for path in client.list_log_paths() {
        let context = client.extract_context_from_path(&path);
        files.push(DiscoveredFile {
            client_id: client.id().to_string(),
            path,
            target_name: context.target.as_ref().map(|t| t.name.clone()),
            target_kind: context.target.as_ref().map(|t| t.kind),
            server_identifier: context.server_identifier,
        });
    }
}

fn server_filter_matches(
    file: &DiscoveredFile,
    server: Option<&ServerConfig>,
) -> bool {
    let Some(server) = server else {
        return true;
    };
    file.server_identifier
        .as_deref()
        .is_some_and(|identifier| identifier_matches_server(identifier, server))
}

// ---------------------------------------------------------------------------
// /api/logs/targets

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetsParams {
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    server_id: Option<String>,
}

pub async fn targets(
    State(state): State<SharedState>,
    Query(params): Query<TargetsParams>,
) -> Result<Json<Value>, ApiError> {
    let server = resolve_server(&state, params.server_id.as_deref()).await?;
    let files = discover_files(&state, params.client_id.as_deref()).await;

    let mut entries = Vec::new();
    for file in files {
        let (Some(name), Some(kind)) = (file.target_name.clone(), file.target_kind) else {
            continue;
        };
        if !server_filter_matches(&file, server.as_ref()) {
            continue;
        }
        let meta = std::fs::metadata(&file.path).ok();
        entries.push((
            kind,
            name.clone(),
            json!({
                "name": name,
                "type": target_kind_name(kind),
                "clientId": file.client_id,
                "path": file.path.display().to_string(),
                "size": meta.as_ref().map(|m| m.len()).unwrap_or(0),
                "modified": iso(meta.and_then(|m| m.modified().ok()).map(DateTime::<Utc>::from)),
            }),
        ));
    }
    entries.sort_by(|a, b| {
        kind_rank(a.0)
            .cmp(&kind_rank(b.0))
            .then_with(|| a.1.to_lowercase().cmp(&b.1.to_lowercase()))
    });
    let targets: Vec<Value> = entries.into_iter().map(|(_, _, v)| v).collect();
    Ok(Json(json!({"targets": targets})))
}

async fn resolve_server(
    state: &SharedState,
    server_id: Option<&str>,
) -> Result<Option<ServerConfig>, ApiError> {
    let Some(server_id) = server_id else {
        return Ok(None);
    };
    let store = state.orchestrator.store().read().await;
    store
        .servers
        .get(server_id)
        .cloned()
        .map(Some)
        .ok_or_else(|| ApiError::not_found(format!("no server named '{server_id}'")))
}

// ---------------------------------------------------------------------------
// /api/logs/messages

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesParams {
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    server_id: Option<String>,
    target: String,
    #[serde(default, rename = "type")]
    target_type: Option<String>,
    #[serde(default)]
    offset: usize,
    #[serde(default = "default_message_limit")]
    limit: usize,
}

pub async fn messages(
    State(state): State<SharedState>,
    Query(params): Query<MessagesParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let server = resolve_server(&state, params.server_id.as_deref()).await?;
    let files = discover_files(&state, params.client_id.as_deref()).await;

    let mut best: Option<(std::time::SystemTime, PathBuf)> = None;
    for file in files {
        let name_matches = file
            .target_name
            .as_deref()
            .is_some_and(|name| name.eq_ignore_ascii_case(&params.target));
        let type_matches = params.target_type.as_deref().is_none_or(|wanted| {
            file.target_kind
                .is_some_and(|kind| target_kind_name(kind).eq_ignore_ascii_case(wanted))
        });
        if !name_matches || !type_matches || !server_filter_matches(&file, server.as_ref()) {
            continue;
        }
        let Some(modified) = std::fs::metadata(&file.path).and_then(|m| m.modified()).ok()
        else {
            continue;
        };
        if best.as_ref().is_none_or(|(ts, _)| modified > *ts) {
            best = Some((modified, file.path));
        }
    }
    let Some((_, path)) = best else {
        return Err(ApiError::not_found(format!(
            "no log file backs target '{}'",
            params.target
        )));
    };

    let file = read_file_lines(&path).await?;
    let total = file.lines.len();
    let window: Vec<&String> = file
        .lines
        .iter()
        .skip(params.offset)
        .take(params.limit)
        .collect();
    let returned = window.len();
    Ok(json_response(
        &headers,
        json!({
            "totalLines": total,
            "offset": params.offset,
            "limit": params.limit,
            "returnedLines": returned,
            "hasMore": params.offset + returned < total,
            "fileSize": file.size,
            "lastModified": iso(file.modified),
            "lines": window,
        }),
    ))
}

// ---------------------------------------------------------------------------
// /api/logs/discover

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverParams {
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    server_id: Option<String>,
    #[serde(default)]
    server: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    query: Option<String>,
    #[serde(default, rename = "type")]
    target_type: Option<String>,
}

pub async fn discover(
    State(state): State<SharedState>,
    Query(params): Query<DiscoverParams>,
) -> Result<Json<Value>, ApiError> {
    let server = resolve_server(&state, params.server_id.as_deref()).await?;
    let files = discover_files(&state, params.client_id.as_deref()).await;

    let mut grouped = serde_json::Map::new();
    for file in files {
        if !server_filter_matches(&file, server.as_ref()) {
            continue;
        }
        if let Some(wanted) = params.server.as_deref() {
            let hit = file
                .server_identifier
                .as_deref()
                .is_some_and(|id| id.to_lowercase().contains(&wanted.to_lowercase()));
            if !hit {
                continue;
            }
        }
        if let Some(wanted) = params.target_type.as_deref()
            && !file
                .target_kind
                .is_some_and(|kind| target_kind_name(kind).eq_ignore_ascii_case(wanted))
        {
            continue;
        }
        if let Some(wanted) = params.channel.as_deref() {
            let hit = file.target_kind == Some(TargetKind::Channel)
                && file
                    .target_name
                    .as_deref()
                    .is_some_and(|name| name.eq_ignore_ascii_case(wanted));
            if !hit {
                continue;
            }
        }
        if let Some(wanted) = params.query.as_deref() {
            let hit = file.target_kind == Some(TargetKind::Query)
                && file
                    .target_name
                    .as_deref()
                    .is_some_and(|name| name.eq_ignore_ascii_case(wanted));
            if !hit {
                continue;
            }
        }

        let entry = json!({
            "path": file.path.display().to_string(),
            "target": match (&file.target_name, file.target_kind) {
                (Some(name), Some(kind)) => json!({"name": name, "type": target_kind_name(kind)}),
                _ => Value::Null,
            },
            "serverIdentifier": file.server_identifier,
        });
        grouped
            .entry(file.client_id.clone())
            .or_insert_with(|| Value::Array(Vec::new()))
            .as_array_mut()
            .map(|list| list.push(entry));
    }
    Ok(Json(json!({"clients": grouped})))
}

// ---------------------------------------------------------------------------
// /api/logs/read and /api/logs/tail

#[derive(Debug, Deserialize)]
pub struct ReadParams {
    path: String,
    #[serde(default)]
    offset: usize,
    #[serde(default = "default_read_limit")]
    limit: usize,
}

pub async fn read(
    State(state): State<SharedState>,
    Query(params): Query<ReadParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let path = resolve_safe_path(&state, &params.path).await?;
    let file = read_file_lines(&path).await?;
    let total = file.lines.len();
    let window: Vec<&String> = file
        .lines
        .iter()
        .skip(params.offset)
        .take(params.limit)
        .collect();
    let returned = window.len();
    Ok(json_response(
        &headers,
        json!({
            "path": path.display().to_string(),
            "totalLines": total,
            "offset": params.offset,
            "limit": params.limit,
            "returnedLines": returned,
            "hasMore": params.offset + returned < total,
            "fileSize": file.size,
            "modified": iso(file.modified),
            "lines": window,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct TailParams {
    path: String,
    #[serde(default = "default_tail_lines")]
    lines: usize,
}

pub async fn tail(
    State(state): State<SharedState>,
    Query(params): Query<TailParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let path = resolve_safe_path(&state, &params.path).await?;
    let file = read_file_lines(&path).await?;
    let total = file.lines.len();
    let start = total.saturating_sub(params.lines);
    let window: Vec<&String> = file.lines[start..].iter().collect();
    Ok(json_response(
        &headers,
        json!({
            "path": path.display().to_string(),
            "totalLines": total,
            "requestedLines": params.lines,
            "returnedLines": window.len(),
            "fileSize": file.size,
            "modified": iso(file.modified),
            "lines": window,
        }),
    ))
}
