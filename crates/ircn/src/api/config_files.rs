//! ✍️ Config management routes — the root config, forced reloads, bundle
//! export/upload, and per-category file CRUD with cascades. The paperwork
//! wing of the control plane. Bring a pen (and a bearer token). 🦆

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::api::{ApiError, SharedState};
use crate::store::model::Category;
use crate::store::{CascadeReport, ImportMode};

fn parse_category(name: &str) -> Result<Category, ApiError> {
    Category::from_dir_name(name)
        .ok_or_else(|| ApiError::not_found(format!("unknown config category '{name}'")))
}

fn require_file_ops(state: &SharedState) -> Result<(), ApiError> {
    if state.file_ops_enabled {
        Ok(())
    } else {
        Err(ApiError::forbidden("config file operations are disabled"))
    }
}

fn cascade_json(cascade: Option<CascadeReport>) -> Value {
    match cascade {
        Some(report) => json!({
            "updatedFiles": report.updated_files,
            "totalFiles": report.total_files,
        }),
        None => Value::Null,
    }
}

pub async fn get_root(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let store = state.orchestrator.store().read().await;
    serde_json::to_value(&store.root)
        .map(Json)
        .map_err(|err| ApiError::internal(err.into()))
}

pub async fn put_root(
    State(state): State<SharedState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    require_file_ops(&state)?;
    {
        let mut store = state.orchestrator.store().write().await;
        store
            .write_root(body)
            .map_err(|err| ApiError::bad_request(format!("{err:#}")))?;
    }
    let _ = state.orchestrator.reload_sender().try_send(());
    Ok(Json(json!({"updated": true})))
}

pub async fn reload(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    state
        .orchestrator
        .reload_full()
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(json!({"reloaded": true})))
}

pub async fn export(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let store = state.orchestrator.store().read().await;
    let bytes = store.export_bundle().map_err(ApiError::internal)?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/gzip"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"config-bundle.json.gz\"",
            ),
        ],
        bytes,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadParams {
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    prefer_incoming: Option<bool>,
    #[serde(default)]
    adjust_config_directory: Option<bool>,
}

pub async fn upload(
    State(state): State<SharedState>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    require_file_ops(&state)?;
    let mode = match params.mode.as_deref().unwrap_or("replace") {
        "replace" => ImportMode::Replace,
        "merge" => ImportMode::Merge {
            prefer_incoming: params.prefer_incoming.unwrap_or(false),
        },
        other => {
            return Err(ApiError::bad_request(format!(
                "mode must be 'replace' or 'merge', got '{other}'"
            )));
        }
    };
    let summary = {
        let mut store = state.orchestrator.store().write().await;
        store
            .import_bundle(&body, mode, params.adjust_config_directory.unwrap_or(true))
            .map_err(|err| ApiError::bad_request(format!("{err:#}")))?
    };
    let _ = state.orchestrator.reload_sender().try_send(());
    Ok(Json(json!({
        "imported": true,
        "written": summary.written,
        "skipped": summary.skipped,
    })))
}

pub async fn list_files(State(state): State<SharedState>) -> Json<Value> {
    let store = state.orchestrator.store().read().await;
    Json(json!(store.list_files()))
}

pub async fn get_file(
    State(state): State<SharedState>,
    Path((category, name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let category = parse_category(&category)?;
    let store = state.orchestrator.store().read().await;
    store
        .read_file(category, &name)
        .map_err(ApiError::internal)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no config named '{name}'")))
}

pub async fn put_file(
    State(state): State<SharedState>,
    Path((category, name)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    require_file_ops(&state)?;
    let category = parse_category(&category)?;
    let outcome = {
        let mut store = state.orchestrator.store().write().await;
        store
            .write_file(category, &name, body)
            .map_err(|err| ApiError::bad_request(format!("{err:#}")))?
    };
    let _ = state.orchestrator.reload_sender().try_send(());
    Ok(Json(json!({
        "written": true,
        "id": outcome.id,
        "name": outcome.stored_name,
        "requestedName": outcome.requested_name,
        "renamed": outcome.renamed,
        "cascade": cascade_json(outcome.cascade),
    })))
}

pub async fn delete_file(
    State(state): State<SharedState>,
    Path((category, name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    require_file_ops(&state)?;
    let category = parse_category(&category)?;
    let outcome = {
        let mut store = state.orchestrator.store().write().await;
        store
            .delete_file(category, &name)
            .map_err(ApiError::internal)?
    };
    if !outcome.deleted {
        return Err(ApiError::not_found(format!("no config named '{name}'")));
    }
    let _ = state.orchestrator.reload_sender().try_send(());
    Ok(Json(json!({
        "deleted": true,
        "cascade": cascade_json(outcome.cascade),
    })))
}
