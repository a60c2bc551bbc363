//! The shared configuration store: a small HTTP service that serves the
//! configuration document and merges updates into it.
//!
//! | Method           | Path                                 | Response                                  |
//! |------------------|--------------------------------------|-------------------------------------------|
//! | `GET`            | `/duratile-config.json`, `/config`   | the current document                      |
//! | `POST`, `PUT`    | `/duratile-config.json`, `/config`   | `{success, message, config}`              |
//! | `GET`            | `/status`                            | `{server, status, timestamp, ...}`        |
//! | anything else    | those paths / any other path         | `405` / `404` with `{error}`              |
//!
//! The document lives in one JSON file. Read-merge-write cycles are
//! serialized so concurrent updates never lose each other's changes.

use crate::config::validate_document;
use crate::document::{apply_update, default_document, iso8601, ChangeLogEntry};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, MethodRouter};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub const SERVER_NAME: &str = "D'Romico Global Config Server";

#[derive(Debug, Error)]
pub enum ServerError {
	#[error(transparent)]
	Io(#[from] io::Error),

	#[error("invalid JSON: {0}")]
	Json(#[from] serde_json::Error),

	#[error("invalid server configuration: {0}")]
	Config(String),

	#[error("{0}")]
	InvalidUpdate(String),
}

/// Settings of the config server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
	/// Address to listen on, `host:port`.
	pub bind: String,
	/// File holding the configuration document.
	pub document_path: PathBuf,
	/// Entries kept in `admin.changeLog`.
	pub change_log_limit: usize,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self {
			bind: "127.0.0.1:3000".to_string(),
			document_path: PathBuf::from("duratile-config.json"),
			change_log_limit: 10,
		}
	}
}

impl ServerConfig {
	/// Reads settings from TOML. Missing keys keep their defaults.
	///
	/// ```toml
	/// bind = "0.0.0.0:3000"
	/// document = "/var/lib/popsync/duratile-config.json"
	/// change_log_limit = 10
	/// ```
	pub fn from_toml(text: &str) -> Result<Self, ServerError> {
		let doc: toml_edit::DocumentMut = text
			.parse()
			.map_err(|e: toml_edit::TomlError| ServerError::Config(e.to_string()))?;

		let mut config = Self::default();
		if let Some(bind) = doc.get("bind").and_then(|item| item.as_str()) {
			config.bind = bind.to_string();
		}
		if let Some(path) = doc.get("document").and_then(|item| item.as_str()) {
			config.document_path = PathBuf::from(path);
		}
		if let Some(limit) = doc.get("change_log_limit").and_then(|item| item.as_integer()) {
			config.change_log_limit = usize::try_from(limit)
				.ok()
				.filter(|limit| *limit > 0)
				.ok_or_else(|| ServerError::Config(format!("change_log_limit must be positive, got {limit}")))?;
		}
		Ok(config)
	}

	pub fn from_file(path: &Path) -> Result<Self, ServerError> {
		Self::from_toml(&std::fs::read_to_string(path)?)
	}
}

/// The JSON file holding the document.
#[derive(Debug, Clone)]
pub struct DocumentFile {
	path: PathBuf,
}

impl DocumentFile {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// The stored document, or the default one if the file is missing or
	/// unreadable.
	pub async fn load(&self) -> Value {
		match tokio::fs::read_to_string(&self.path).await {
			Ok(text) => match serde_json::from_str(&text) {
				Ok(document) => return document,
				Err(e) => error!(path = %self.path.display(), "error loading config: {e}"),
			},
			Err(e) if e.kind() == io::ErrorKind::NotFound => {}
			Err(e) => error!(path = %self.path.display(), "error loading config: {e}"),
		}
		default_document(Utc::now())
	}

	/// Stamps `lastUpdated` and writes the document.
	pub async fn save(&self, document: &mut Value) -> Result<(), ServerError> {
		if let Value::Object(map) = document {
			map.insert("lastUpdated".into(), Value::String(iso8601(Utc::now())));
		}
		let text = serde_json::to_string_pretty(document)?;
		tokio::fs::write(&self.path, text).await?;
		info!(last_updated = %document["lastUpdated"], "configuration saved");
		Ok(())
	}
}

#[derive(Clone)]
pub struct AppState {
	file: Arc<Mutex<DocumentFile>>,
	change_log_limit: usize,
}

impl AppState {
	pub fn new(config: &ServerConfig) -> Self {
		Self {
			file: Arc::new(Mutex::new(DocumentFile::new(&config.document_path))),
			change_log_limit: config.change_log_limit,
		}
	}

	async fn current(&self) -> Value {
		self.file.lock().await.load().await
	}

	/// Merges a partial document into the stored one and saves it.
	async fn apply(&self, body: &[u8], source: &str) -> Result<Value, ServerError> {
		let updates: Value = serde_json::from_slice(body)?;
		if !updates.is_object() {
			return Err(ServerError::InvalidUpdate("update must be a JSON object".into()));
		}
		let popup_changes = updates
			.get("popup")
			.and_then(Value::as_object)
			.cloned()
			.unwrap_or_default();
		let modified_by = updates
			.pointer("/admin/lastModifiedBy")
			.and_then(Value::as_str)
			.filter(|s| !s.is_empty())
			.unwrap_or("api");

		let file = self.file.lock().await;
		let current = file.load().await;
		let entry = ChangeLogEntry::new(Utc::now(), "api_update", updates.clone()).with_source(source);
		let mut updated = apply_update(&current, &popup_changes, modified_by, entry, self.change_log_limit);

		validate_document(&updated).map_err(|e| ServerError::InvalidUpdate(e.to_string()))?;
		file.save(&mut updated).await?;
		info!(%updates, "configuration updated");
		Ok(updated)
	}
}

/// Builds the service with its CORS and tracing layers.
pub fn router(config: &ServerConfig) -> Router {
	Router::new()
		.route("/duratile-config.json", document_routes())
		.route("/config", document_routes())
		.route("/status", get(status))
		.fallback(not_found)
		.layer(cors())
		.layer(TraceLayer::new_for_http())
		.with_state(AppState::new(config))
}

fn document_routes() -> MethodRouter<AppState> {
	get(get_config)
		.post(update_config)
		.put(update_config)
		.options(preflight)
		.fallback(method_not_allowed)
}

fn cors() -> CorsLayer {
	CorsLayer::new()
		.allow_origin(Any)
		.allow_methods([
			Method::GET,
			Method::POST,
			Method::PUT,
			Method::DELETE,
			Method::OPTIONS,
		])
		.allow_headers([CONTENT_TYPE, AUTHORIZATION])
		.max_age(Duration::from_secs(86400))
}

async fn get_config(State(state): State<AppState>) -> Json<Value> {
	info!("configuration sent to client");
	Json(state.current().await)
}

async fn update_config(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
	let source = headers
		.get(USER_AGENT)
		.and_then(|v| v.to_str().ok())
		.unwrap_or("unknown");

	match state.apply(&body, source).await {
		Ok(config) => Json(json!({
			"success": true,
			"message": "Configuration updated successfully",
			"config": config,
		}))
		.into_response(),
		Err(e) => {
			error!("configuration update error: {e}");
			(
				StatusCode::BAD_REQUEST,
				Json(json!({ "success": false, "error": e.to_string() })),
			)
				.into_response()
		}
	}
}

async fn status(State(state): State<AppState>) -> Json<Value> {
	let document = state.current().await;
	Json(json!({
		"server": SERVER_NAME,
		"status": "running",
		"timestamp": iso8601(Utc::now()),
		"configLastUpdated": document.get("lastUpdated"),
		"version": document.get("version"),
	}))
}

async fn preflight() -> StatusCode {
	StatusCode::OK
}

async fn method_not_allowed() -> (StatusCode, Json<Value>) {
	(
		StatusCode::METHOD_NOT_ALLOWED,
		Json(json!({ "error": "Method not allowed" })),
	)
}

async fn not_found() -> (StatusCode, Json<Value>) {
	(StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" })))
}

/// Runs the server until Ctrl-C.
pub async fn serve(config: ServerConfig) -> Result<(), ServerError> {
	let listener = tokio::net::TcpListener::bind(&config.bind).await?;
	let document = DocumentFile::new(&config.document_path).load().await;

	info!("global configuration server started on http://{}", config.bind);
	info!("  GET  /duratile-config.json - get current configuration");
	info!("  POST /duratile-config.json - update configuration");
	info!("  GET  /status - server status");
	info!(
		enabled = %document["popup"]["enabled"],
		price = %document["popup"]["price"],
		last_updated = %document["lastUpdated"],
		"initial configuration loaded"
	);

	axum::serve(listener, router(&config))
		.with_graceful_shutdown(shutdown_signal())
		.await?;
	info!("server shut down");
	Ok(())
}

async fn shutdown_signal() {
	if let Err(e) = tokio::signal::ctrl_c().await {
		error!("failed to listen for shutdown signal: {e}");
	}
	info!("shutting down server");
}
