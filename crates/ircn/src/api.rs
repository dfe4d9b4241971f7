//! 🚪 The HTTP control plane — status, the data-flow graph, config CRUD,
//! bundle import/export, and log reads. The front desk of the operation.
//!
//! 🔒 Every route requires `Authorization: Bearer <token>`. No token, no
//! entry — this is not a democracy, it's a daemon. All responses are JSON
//! except the bundle download; client errors come back as
//! `{"error": "..."}` with a matching status code, because "500 Internal
//! Server Error" with an empty body is a war crime. 🦆

pub mod auth;
pub mod config_files;
pub mod data_flow;
pub mod logs;
pub mod status;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::info;

use crate::orchestrator::Orchestrator;

pub struct ApiState {
    pub orchestrator: Orchestrator,
    pub token: String,
    pub file_ops_enabled: bool,
}

pub type SharedState = Arc<ApiState>;

/// 💀 A status code plus message, rendered as the standard error body.
/// Every failure leaves the building in the same uniform.
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(err: anyhow::Error) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, axum::Json(json!({"error": self.message}))).into_response()
    }
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/health", get(status::health))
        .route("/api/status", get(status::status))
        .route("/api/data-flow", get(data_flow::data_flow))
        .route(
            "/api/config",
            get(config_files::get_root).put(config_files::put_root),
        )
        .route("/api/config/reload", post(config_files::reload))
        .route("/api/config/export", get(config_files::export))
        .route("/api/config/upload", post(config_files::upload))
        .route("/api/config/files", get(config_files::list_files))
        .route(
            "/api/config/file/{category}/{name}",
            get(config_files::get_file)
                .put(config_files::put_file)
                .post(config_files::put_file)
                .delete(config_files::delete_file),
        )
        .route("/api/logs/targets", get(logs::targets))
        .route("/api/logs/messages", get(logs::messages))
        .route("/api/logs/discover", get(logs::discover))
        .route("/api/logs/read", get(logs::read))
        .route("/api/logs/tail", get(logs::tail))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state)
}

async fn require_auth(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    match presented {
        Some(token) if token == state.token => next.run(request).await,
        _ => (
            StatusCode::UNAUTHORIZED,
            axum::Json(json!({"error": "missing or invalid bearer token"})),
        )
            .into_response(),
    }
}

/// 🚀 Bind and serve the control plane; returns the task and the bound
/// address (useful when the configured port is 0 and the OS picks).
pub async fn serve(state: SharedState, host: &str, port: u16) -> Result<(JoinHandle<()>, SocketAddr)> {
    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("failed to bind control plane on {host}:{port}"))?;
    let addr = listener.local_addr()?;
    info!(%addr, "control plane listening");
    let app = router(state);
    let task = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((task, addr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use std::path::Path;

    use crate::sinks::CustomSinkRegistry;
    use crate::store::ConfigStore;

    struct TestApi {
        base: String,
        http: reqwest::Client,
        orchestrator: Orchestrator,
        task: JoinHandle<()>,
        log_dir: tempfile::TempDir,
        _config_dir: tempfile::TempDir,
    }

    impl TestApi {
        fn url(&self, path: &str) -> String {
            format!("{}{path}", self.base)
        }

        fn get(&self, path: &str) -> reqwest::RequestBuilder {
            self.http.get(self.url(path)).bearer_auth("test-token")
        }

        fn put(&self, path: &str) -> reqwest::RequestBuilder {
            self.http.put(self.url(path)).bearer_auth("test-token")
        }

        fn post(&self, path: &str) -> reqwest::RequestBuilder {
            self.http.post(self.url(path)).bearer_auth("test-token")
        }

        fn delete(&self, path: &str) -> reqwest::RequestBuilder {
            self.http.delete(self.url(path)).bearer_auth("test-token")
        }

        async fn shutdown(self) {
            self.orchestrator.stop().await;
            self.task.abort();
        }
    }

    fn seed(dir: &Path, category: &str, name: &str, value: &Value) {
        let cat_dir = dir.join(category);
        std::fs::create_dir_all(&cat_dir).unwrap();
        std::fs::write(
            cat_dir.join(format!("{name}.json")),
            serde_json::to_string_pretty(value).unwrap(),
        )
        .unwrap();
    }

    async fn start_api(file_ops: bool) -> TestApi {
        let config_dir = tempfile::tempdir().unwrap();
        let log_dir = tempfile::tempdir().unwrap();
        std::fs::write(config_dir.path().join("config.json"), "{}").unwrap();
        seed(
            config_dir.path(),
            "clients",
            "plain",
            &json!({
                "id": "plain",
                "type": "plain",
                "name": "Plain",
                "logDirectory": log_dir.path(),
                "discovery": {
                    "console": ["Console.log"],
                    "channels": ["channels/*.log"],
                    "queries": ["queries/*.log"],
                    "consolePattern": {"pattern": r"/(Console)\.log$", "group": 1},
                    "channelPattern": {"pattern": r"/channels/([^/]+)\.log$", "group": 1},
                    "queryPattern": {"pattern": r"/queries/([^/]+)\.log$", "group": 1},
                },
                "parserRules": [{
                    "name": "all",
                    "pattern": r"^(?P<content>.+)$",
                    "fields": {"content": "content"},
                    "priority": 1,
                }],
            }),
        );
        seed(
            config_dir.path(),
            "servers",
            "libera",
            &json!({
                "id": "libera",
                "hostname": "irc.libera.chat",
                "displayName": "Libera",
                "clientNickname": "tester",
            }),
        );
        seed(
            config_dir.path(),
            "sinks",
            "x",
            &json!({"id": "x", "kind": "console"}),
        );
        seed(
            config_dir.path(),
            "events",
            "one",
            &json!({
                "id": "one", "name": "One", "baseEvent": "message",
                "serverIds": ["*"], "sinkIds": ["x"], "priority": 10,
            }),
        );
        seed(
            config_dir.path(),
            "events",
            "two",
            &json!({
                "id": "two", "name": "Two", "baseEvent": "any",
                "serverIds": ["libera"], "sinkIds": ["x"], "priority": 5,
            }),
        );

        let store = ConfigStore::open(Some(&config_dir.path().join("config.json"))).unwrap();
        let orchestrator = Orchestrator::new(store, CustomSinkRegistry::default()).unwrap();
        orchestrator.start().await.unwrap();

        let state = Arc::new(ApiState {
            orchestrator: orchestrator.clone(),
            token: "test-token".to_string(),
            file_ops_enabled: file_ops,
        });
        let (task, addr) = serve(state, "127.0.0.1", 0).await.unwrap();
        TestApi {
            base: format!("http://{addr}"),
            http: reqwest::Client::new(),
            orchestrator,
            task,
            log_dir,
            _config_dir: config_dir,
        }
    }

    #[tokio::test]
    async fn every_route_requires_the_bearer_token() {
        let api = start_api(true).await;
        let bare = api.http.get(api.url("/api/health")).send().await.unwrap();
        assert_eq!(bare.status(), 401);
        let wrong = api
            .http
            .get(api.url("/api/status"))
            .bearer_auth("nope")
            .send()
            .await
            .unwrap();
        assert_eq!(wrong.status(), 401);

        let ok = api.get("/api/health").send().await.unwrap();
        assert_eq!(ok.status(), 200);
        let body: Value = ok.json().await.unwrap();
        assert_eq!(body["ok"], true);
        api.shutdown().await;
    }

    #[tokio::test]
    async fn status_reports_categories_and_watchers() {
        let api = start_api(true).await;
        let body: Value = api.get("/api/status").send().await.unwrap().json().await.unwrap();
        assert_eq!(body["running"], true);
        assert_eq!(body["clients"]["total"], 1);
        assert_eq!(body["servers"]["enabled"], 1);
        assert_eq!(body["events"]["total"], 2);
        assert_eq!(body["sinks"]["list"][0]["id"], "x");
        assert!(body["configDirectory"].as_str().is_some());
        api.shutdown().await;
    }

    #[tokio::test]
    async fn config_file_put_then_get_round_trips() {
        let api = start_api(true).await;
        let sink = json!({"id": "fresh", "kind": "console", "name": "Fresh", "extra": {"keep": 1}});
        let write: Value = api
            .put("/api/config/file/sinks/fresh")
            .json(&sink)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(write["written"], true);
        assert_eq!(write["renamed"], false);

        let read: Value = api
            .get("/api/config/file/sinks/fresh")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(read, sink);
        api.shutdown().await;
    }

    #[tokio::test]
    async fn put_under_wrong_name_stores_by_id_and_reports_rename() {
        let api = start_api(true).await;
        let response: Value = api
            .put("/api/config/file/sinks/wrong-name")
            .json(&json!({"id": "right-name", "kind": "console"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(response["renamed"], true);
        assert_eq!(response["name"], "right-name");

        let by_id = api.get("/api/config/file/sinks/right-name").send().await.unwrap();
        assert_eq!(by_id.status(), 200);
        let by_url = api.get("/api/config/file/sinks/wrong-name").send().await.unwrap();
        assert_eq!(by_url.status(), 404);
        api.shutdown().await;
    }

    #[tokio::test]
    async fn sink_delete_cascades_through_both_events() {
        let api = start_api(true).await;
        let body: Value = api
            .delete("/api/config/file/sinks/x")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["deleted"], true);
        assert_eq!(body["cascade"]["updatedFiles"], 2);
        assert_eq!(body["cascade"]["totalFiles"], 2);

        let event: Value = api
            .get("/api/config/file/events/one")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(event["sinkIds"], json!([]));
        api.shutdown().await;
    }

    #[tokio::test]
    async fn file_ops_disabled_returns_403_for_writes_only() {
        let api = start_api(false).await;
        let write = api
            .put("/api/config/file/sinks/y")
            .json(&json!({"id": "y", "kind": "console"}))
            .send()
            .await
            .unwrap();
        assert_eq!(write.status(), 403);
        let delete = api.delete("/api/config/file/sinks/x").send().await.unwrap();
        assert_eq!(delete.status(), 403);
        let read = api.get("/api/config/file/sinks/x").send().await.unwrap();
        assert_eq!(read.status(), 200);
        api.shutdown().await;
    }

    #[tokio::test]
    async fn export_then_replace_upload_round_trips() {
        let api = start_api(true).await;
        let bundle = api
            .get("/api/config/export")
            .send()
            .await
            .unwrap();
        assert_eq!(
            bundle.headers().get("content-type").unwrap(),
            "application/gzip"
        );
        let bytes = bundle.bytes().await.unwrap();

        // wipe one sink, then restore from the bundle
        api.delete("/api/config/file/sinks/x").send().await.unwrap();
        let missing = api.get("/api/config/file/sinks/x").send().await.unwrap();
        assert_eq!(missing.status(), 404);

        let upload: Value = api
            .post("/api/config/upload?mode=replace")
            .body(bytes.to_vec())
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(upload["imported"], true);
        let restored = api.get("/api/config/file/sinks/x").send().await.unwrap();
        assert_eq!(restored.status(), 200);
        // events regained the pruned reference via the bundle copy
        let event: Value = api
            .get("/api/config/file/events/one")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(event["sinkIds"], json!(["x"]));
        api.shutdown().await;
    }

    #[tokio::test]
    async fn bad_upload_mode_is_a_400() {
        let api = start_api(true).await;
        let response = api
            .post("/api/config/upload?mode=overwrite")
            .body(Vec::new())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("mode"));
        api.shutdown().await;
    }

    #[tokio::test]
    async fn data_flow_exposes_paths_and_base_event_types() {
        let api = start_api(true).await;
        let body: Value = api
            .get("/api/data-flow")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["statistics"]["clients"]["total"], 1);
        assert_eq!(body["baseEventTypes"]["message"], json!(["privmsg", "notice"]));
        let paths = body["paths"].as_array().unwrap();
        // one client x one server x two events
        assert_eq!(paths.len(), 2);
        // sorted by event priority descending
        assert_eq!(paths[0]["eventId"], "one");
        assert_eq!(paths[0]["enabled"], true);
        api.shutdown().await;
    }

    #[tokio::test]
    async fn tail_returns_the_last_lines_in_order() {
        let api = start_api(true).await;
        let channels = api.log_dir.path().join("channels");
        std::fs::create_dir_all(&channels).unwrap();
        let path = channels.join("big.log");
        let mut content = String::new();
        for i in 1..=5000 {
            content.push_str(&format!("line {i}\n"));
        }
        std::fs::write(&path, content).unwrap();

        let body: Value = api
            .get(&format!("/api/logs/tail?path={}&lines=100", path.display()))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["totalLines"], 5000);
        assert_eq!(body["returnedLines"], 100);
        let lines = body["lines"].as_array().unwrap();
        assert_eq!(lines[0], "line 4901");
        assert_eq!(lines[99], "line 5000");
        api.shutdown().await;
    }

    #[tokio::test]
    async fn read_pages_through_a_file() {
        let api = start_api(true).await;
        let channels = api.log_dir.path().join("channels");
        std::fs::create_dir_all(&channels).unwrap();
        let path = channels.join("paged.log");
        std::fs::write(&path, "a\nb\nc\nd\ne\n").unwrap();

        let body: Value = api
            .get(&format!(
                "/api/logs/read?path={}&offset=1&limit=2",
                path.display()
            ))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["totalLines"], 5);
        assert_eq!(body["lines"], json!(["b", "c"]));
        assert_eq!(body["hasMore"], true);
        api.shutdown().await;
    }

    #[tokio::test]
    async fn paths_outside_log_directories_are_forbidden() {
        let api = start_api(true).await;
        let outside = tempfile::NamedTempFile::new().unwrap();
        let response = api
            .get(&format!(
                "/api/logs/read?path={}",
                outside.path().display()
            ))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 403);
        api.shutdown().await;
    }

    #[tokio::test]
    async fn targets_sort_console_then_channels_then_queries() {
        let api = start_api(true).await;
        let root = api.log_dir.path();
        std::fs::create_dir_all(root.join("channels")).unwrap();
        std::fs::create_dir_all(root.join("queries")).unwrap();
        std::fs::write(root.join("Console.log"), "x\n").unwrap();
        std::fs::write(root.join("channels/#zeta.log"), "x\n").unwrap();
        std::fs::write(root.join("channels/#alpha.log"), "x\n").unwrap();
        std::fs::write(root.join("queries/alice.log"), "x\n").unwrap();

        let body: Value = api
            .get("/api/logs/targets?clientId=plain")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let names: Vec<&str> = body["targets"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Console", "#alpha", "#zeta", "alice"]);
        api.shutdown().await;
    }

    #[tokio::test]
    async fn messages_read_the_most_recent_backing_file() {
        let api = start_api(true).await;
        let channels = api.log_dir.path().join("channels");
        std::fs::create_dir_all(&channels).unwrap();
        std::fs::write(channels.join("#gen.log"), "one\ntwo\nthree\n").unwrap();

        let body: Value = api
            .get("/api/logs/messages?clientId=plain&target=%23gen")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["totalLines"], 3);
        assert_eq!(body["returnedLines"], 3);
        assert_eq!(body["lines"], json!(["one", "two", "three"]));
        assert_eq!(body["hasMore"], false);
        api.shutdown().await;
    }

    #[tokio::test]
    async fn discover_groups_files_by_client_with_metadata() {
        let api = start_api(true).await;
        let channels = api.log_dir.path().join("channels");
        std::fs::create_dir_all(&channels).unwrap();
        std::fs::write(channels.join("#gen.log"), "x\n").unwrap();

        let body: Value = api
            .get("/api/logs/discover?type=channel")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let listing = body["clients"]["plain"].as_array().unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0]["target"]["name"], "#gen");
        assert_eq!(listing[0]["target"]["type"], "channel");
        api.shutdown().await;
    }

    #[tokio::test]
    async fn reload_endpoint_rebuilds_the_pipeline() {
        let api = start_api(true).await;
        api.put("/api/config/file/sinks/extra")
            .json(&json!({"id": "extra", "kind": "console"}))
            .send()
            .await
            .unwrap();
        let response: Value = api
            .post("/api/config/reload")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(response["reloaded"], true);
        let status: Value = api.get("/api/status").send().await.unwrap().json().await.unwrap();
        assert_eq!(status["sinks"]["total"], 2);
        api.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_category_is_a_404() {
        let api = start_api(true).await;
        let response = api.get("/api/config/file/widgets/x").send().await.unwrap();
        assert_eq!(response.status(), 404);
        api.shutdown().await;
    }
}
