use crate::config::PopupConfig;
use crate::store::{self, LocalStore};
use serde::{Deserialize, Serialize};
use std::io::Result;

/// Price and display statistics kept in the local store.
///
/// Older pages read `price` and `enabled` from here, so every write
/// re-derives them from the authoritative [`PopupConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceStats {
	pub price: f64,
	#[serde(default)]
	pub last_updated: Option<String>,
	#[serde(default)]
	pub popup_display_count: u64,
	pub enabled: bool,
}

impl PriceStats {
	pub fn from_config(config: &PopupConfig) -> Self {
		Self {
			price: config.price,
			last_updated: None,
			popup_display_count: 0,
			enabled: config.enabled,
		}
	}
}

/// Accessor for the record stored under one key.
#[derive(Debug, Clone)]
pub struct StatsRecord {
	key: String,
}

impl StatsRecord {
	pub fn new(key: impl Into<String>) -> Self {
		Self { key: key.into() }
	}

	/// The stored record as written, without re-deriving anything.
	///
	/// Missing fields other than `price`/`enabled` take their defaults; a
	/// record lacking either of those is reported as absent.
	pub fn read_raw(&self, store: &dyn LocalStore) -> Result<Option<PriceStats>> {
		let Some(value) = store::read_json::<serde_json::Value>(store, &self.key)? else {
			return Ok(None);
		};
		Ok(serde_json::from_value(value).ok())
	}

	/// Whether a record with an `enabled` field exists.
	pub fn has_enabled(&self, store: &dyn LocalStore) -> bool {
		matches!(
			store::read_json::<serde_json::Value>(store, &self.key),
			Ok(Some(value)) if value.get("enabled").is_some_and(serde_json::Value::is_boolean)
		)
	}

	/// The record as the rest of the page sees it: stored counters, with
	/// `price` and `enabled` always taken from `config`.
	///
	/// An unreadable record reads as a fresh one.
	pub fn read(&self, store: &dyn LocalStore, config: &PopupConfig) -> PriceStats {
		let stored = match store::read_json::<serde_json::Value>(store, &self.key) {
			Ok(value) => value,
			Err(e) => {
				tracing::error!("error loading price data: {e}");
				None
			}
		};

		let mut stats = PriceStats::from_config(config);
		if let Some(stored) = stored {
			stats.last_updated = stored
				.get("lastUpdated")
				.and_then(serde_json::Value::as_str)
				.map(str::to_string);
			stats.popup_display_count = stored
				.get("popupDisplayCount")
				.and_then(serde_json::Value::as_u64)
				.unwrap_or(0);
		}
		stats
	}

	/// Rewrites the record from `config`, stamping `last_updated`.
	pub fn sync_from(&self, store: &dyn LocalStore, config: &PopupConfig, now: &str) -> Result<()> {
		let mut stats = self.read(store, config);
		stats.last_updated = Some(now.to_string());
		store::write_json(store, &self.key, &stats)
	}

	/// Writes the record only when none with an `enabled` field exists yet.
	pub fn initialize(&self, store: &dyn LocalStore, config: &PopupConfig) -> Result<bool> {
		if self.has_enabled(store) {
			return Ok(false);
		}
		tracing::debug!("initializing default enabled state");
		let stats = self.read(store, config);
		store::write_json(store, &self.key, &stats)?;
		Ok(true)
	}

	/// Adds one to `popupDisplayCount`.
	pub fn record_display(&self, store: &dyn LocalStore, config: &PopupConfig) -> Result<u64> {
		let mut stats = self.read(store, config);
		stats.popup_display_count += 1;
		store::write_json(store, &self.key, &stats)?;
		Ok(stats.popup_display_count)
	}
}
