//! Popup configuration: defaults, validation of remote documents and the
//! merge that turns a document into a [`PopupConfig`].
//!
//! A configuration document looks like
//!
//! ```json
//! {
//!   "version": "1.0.0",
//!   "lastUpdated": "2025-01-01T00:00:00Z",
//!   "popup": {
//!     "enabled": true,
//!     "price": 70.0,
//!     "maxDisplays": 3,
//!     "cookieExpireDays": 30,
//!     "popupDelay": 2000,
//!     "message": { "title": "...", "subtitle": "..." }
//!   },
//!   "admin": { "lastModifiedBy": "system", "changeLog": [] }
//! }
//! ```
//!
//! Only `popup.enabled` and `popup.price` are required. Everything else is
//! optional and falls back to the defaults.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

pub const DEFAULT_COOKIE_NAME: &str = "duratile_popup_count";
pub const DEFAULT_COOKIE_EXPIRE_DAYS: u32 = 30;
pub const DEFAULT_MAX_DISPLAYS: u32 = 3;
pub const DEFAULT_POPUP_DELAY_MS: u64 = 2000;
pub const DEFAULT_PRICE: f64 = 70.00;

/// Texts shown in the promotional overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopupMessage {
	pub title: String,
	pub subtitle: String,
	pub cta: String,
	pub button_primary: String,
	pub button_secondary: String,
}

impl Default for PopupMessage {
	fn default() -> Self {
		Self {
			title: "🎉 Special Promotion!".to_string(),
			subtitle: "Promotion Sale, Duratile".to_string(),
			cta: "Contact us for Enquiry".to_string(),
			button_primary: "Contact Us Now".to_string(),
			button_secondary: "Maybe Later".to_string(),
		}
	}
}

impl PopupMessage {
	fn merged(defaults: &PopupMessage, message: Option<&Map<String, Value>>) -> Self {
		let Some(message) = message else {
			return defaults.clone();
		};
		let text = |field: &str, fallback: &String| {
			message
				.get(field)
				.and_then(Value::as_str)
				.filter(|s| !s.is_empty())
				.map(str::to_string)
				.unwrap_or_else(|| fallback.clone())
		};
		Self {
			title: text("title", &defaults.title),
			subtitle: text("subtitle", &defaults.subtitle),
			cta: text("cta", &defaults.cta),
			button_primary: text("buttonPrimary", &defaults.button_primary),
			button_secondary: text("buttonSecondary", &defaults.button_secondary),
		}
	}
}

/// The runtime settings of the popup.
///
/// Invariants: `price >= 0`, `max_displays >= 1`, `cookie_expire_days >= 1`.
/// Serialized with the same camelCase names the configuration document
/// uses, so `{"popup": config}` is itself a valid document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopupConfig {
	pub enabled: bool,
	pub price: f64,
	pub max_displays: u32,
	pub cookie_expire_days: u32,
	/// Delay before the popup is shown, in milliseconds.
	pub popup_delay: u64,
	pub cookie_name: String,
	#[serde(default)]
	pub message: PopupMessage,
}

impl Default for PopupConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			price: DEFAULT_PRICE,
			max_displays: DEFAULT_MAX_DISPLAYS,
			cookie_expire_days: DEFAULT_COOKIE_EXPIRE_DAYS,
			popup_delay: DEFAULT_POPUP_DELAY_MS,
			cookie_name: DEFAULT_COOKIE_NAME.to_string(),
			message: PopupMessage::default(),
		}
	}
}

impl PopupConfig {
	/// Builds a configuration from a validated document's `popup` object.
	///
	/// `enabled` and `price` always come from the document. Each optional
	/// field comes from the document when present and in range, otherwise
	/// from `defaults`.
	pub fn merged(defaults: &PopupConfig, popup: &Map<String, Value>) -> Self {
		let positive = |field: &str| {
			popup
				.get(field)
				.and_then(Value::as_u64)
				.filter(|n| *n >= 1)
				.and_then(|n| u32::try_from(n).ok())
		};

		Self {
			enabled: popup
				.get("enabled")
				.and_then(Value::as_bool)
				.unwrap_or(defaults.enabled),
			price: popup
				.get("price")
				.and_then(Value::as_f64)
				.filter(|p| p.is_finite() && *p >= 0.0)
				.unwrap_or(defaults.price),
			max_displays: positive("maxDisplays").unwrap_or(defaults.max_displays),
			cookie_expire_days: positive("cookieExpireDays").unwrap_or(defaults.cookie_expire_days),
			popup_delay: popup
				.get("popupDelay")
				.and_then(Value::as_u64)
				.unwrap_or(defaults.popup_delay),
			cookie_name: popup
				.get("cookieName")
				.and_then(Value::as_str)
				.filter(|s| !s.is_empty())
				.map(str::to_string)
				.unwrap_or_else(|| defaults.cookie_name.clone()),
			message: PopupMessage::merged(&defaults.message, popup.get("message").and_then(Value::as_object)),
		}
	}

	/// Validates `document` and merges its `popup` object onto `defaults`.
	pub fn from_document(defaults: &PopupConfig, document: &Value) -> Result<Self> {
		let popup = validate_document(document)?;
		Ok(Self::merged(defaults, popup))
	}

	/// Wraps this configuration in a minimal valid document.
	pub fn to_document(&self) -> Value {
		serde_json::json!({ "popup": self })
	}

	pub fn popup_delay(&self) -> Duration {
		Duration::from_millis(self.popup_delay)
	}

	/// The price as shown to visitors, e.g. `RM70.00/box`.
	pub fn price_label(&self) -> String {
		format!("RM{:.2}/box", self.price)
	}
}

/// Checks the required shape of a configuration document and returns its
/// `popup` object.
///
/// A document is valid when it has a `popup` object whose `enabled` is a
/// boolean and whose `price` is a finite, non-negative number.
pub fn validate_document(document: &Value) -> Result<&Map<String, Value>> {
	let popup = document
		.get("popup")
		.and_then(Value::as_object)
		.ok_or_else(|| SyncError::SchemaInvalid("missing `popup` object".into()))?;

	if !popup.get("enabled").is_some_and(Value::is_boolean) {
		return Err(SyncError::SchemaInvalid("`popup.enabled` must be a boolean".into()));
	}

	match popup.get("price").and_then(Value::as_f64) {
		Some(price) if price.is_finite() && price >= 0.0 => Ok(popup),
		Some(price) => Err(SyncError::SchemaInvalid(format!(
			"`popup.price` must be non-negative, got {price}"
		))),
		None => Err(SyncError::SchemaInvalid("`popup.price` must be a number".into())),
	}
}

/// Settings of the popup system in one page.
///
/// The defaults match the production site; tests and alternative hosts
/// override individual fields with struct update syntax.
#[derive(Debug, Clone)]
pub struct Settings {
	/// URL of the remote configuration document.
	pub config_url: String,
	/// Store key of the price/stats record.
	pub stats_key: String,
	/// Store key of the cached configuration entry.
	pub cache_key: String,
	/// Key written and removed to check that the store is writable.
	pub check_key: String,
	/// Name of the cross-tab broadcast channel.
	pub channel_name: String,
	/// How long a cached configuration entry stays valid.
	pub cache_ttl: Duration,
	/// Time between hiding the overlay and removing it.
	pub fade_out: Duration,
	/// Maximum number of entries kept in a document's change log.
	pub change_log_limit: usize,
	/// Configuration used before any document is adopted, and as the base
	/// of every merge.
	pub defaults: PopupConfig,
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			config_url: "duratile-config.json".to_string(),
			stats_key: "duratile_price_data".to_string(),
			cache_key: "duratile_config_cache".to_string(),
			check_key: "duratile_test_storage".to_string(),
			channel_name: "duratile-popup-sync".to_string(),
			cache_ttl: Duration::from_secs(5 * 60),
			fade_out: Duration::from_millis(300),
			change_log_limit: 10,
			defaults: PopupConfig::default(),
		}
	}
}
