//! Whole configuration documents: the default document and the
//! shallow-merge-plus-change-log update shared by the config server and the
//! synchronizer's local cache rewrite.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// One entry of `admin.changeLog`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
	pub timestamp: String,
	pub action: String,
	pub changes: Value,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub source: Option<String>,
}

impl ChangeLogEntry {
	pub fn new(now: DateTime<Utc>, action: &str, changes: Value) -> Self {
		Self {
			timestamp: iso8601(now),
			action: action.to_string(),
			changes,
			source: None,
		}
	}

	pub fn with_source(mut self, source: impl Into<String>) -> Self {
		self.source = Some(source.into());
		self
	}
}

/// Formats a timestamp the way documents store them.
pub fn iso8601(at: DateTime<Utc>) -> String {
	at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The document served before anyone has saved one.
pub fn default_document(now: DateTime<Utc>) -> Value {
	json!({
		"version": "1.0.0",
		"lastUpdated": iso8601(now),
		"popup": {
			"enabled": true,
			"price": 70.00,
			"maxDisplays": 3,
			"cookieExpireDays": 30,
			"popupDelay": 2000,
			"message": crate::config::PopupMessage::default(),
		},
		"admin": {
			"lastModifiedBy": "system",
			"changeLog": [],
		}
	})
}

/// Produces the document that results from applying `popup_changes` to
/// `current`.
///
/// Fields of `popup_changes` replace the same fields of `current.popup`,
/// the other popup fields and every other top-level field are kept.
/// `admin.lastModifiedBy` becomes `modified_by` and `entry` is appended to
/// `admin.changeLog`, which then keeps only its last `log_limit` entries.
pub fn apply_update(
	current: &Value,
	popup_changes: &Map<String, Value>,
	modified_by: &str,
	entry: ChangeLogEntry,
	log_limit: usize,
) -> Value {
	let mut document = match current {
		Value::Object(map) => map.clone(),
		_ => Map::new(),
	};

	let mut popup = object_field(&document, "popup");
	for (key, value) in popup_changes {
		popup.insert(key.clone(), value.clone());
	}
	document.insert("popup".into(), Value::Object(popup));

	let mut admin = object_field(&document, "admin");
	let mut log = admin
		.get("changeLog")
		.and_then(Value::as_array)
		.cloned()
		.unwrap_or_default();
	log.push(serde_json::to_value(entry).unwrap_or(Value::Null));
	if log.len() > log_limit {
		log.drain(..log.len() - log_limit);
	}
	admin.insert("lastModifiedBy".into(), Value::String(modified_by.to_string()));
	admin.insert("changeLog".into(), Value::Array(log));
	document.insert("admin".into(), Value::Object(admin));

	Value::Object(document)
}

fn object_field(document: &Map<String, Value>, field: &str) -> Map<String, Value> {
	document
		.get(field)
		.and_then(Value::as_object)
		.cloned()
		.unwrap_or_default()
}
