//! The config synchronizer: obtains an authoritative [`PopupConfig`],
//! keeps it fresh, and propagates changes to the other tabs.
//!
//! ```text
//!            ┌──────────── load() ────────────┐
//!            │                                │
//!   cache (fresh?) ──yes──► adopt        fetch ──ok──► adopt ─► cache ─► broadcast
//!            │                                │
//!            no ───────────────────────────►  err ──► stats record fallback
//!
//!   other tab ── CONFIG_UPDATE ──► receive_broadcast() ──► adopt ─► cache
//!   set_enabled()/set_price() ──► cache rewrite ─► endpoint (best effort) ─► broadcast
//! ```
//!
//! Tabs race freely: whichever `CONFIG_UPDATE` is processed last wins. Every
//! adopted remote document and every local write takes a new revision,
//! carried by the cache entry and by outgoing messages, so a tab can at
//! least drop updates older than what it has.
//!
//! Revisions are hybrid timestamps: the next revision is the larger of the
//! current one plus one and the clock in epoch milliseconds. All tabs share
//! the cache entry and the wall clock, so a write made later in any tab
//! carries a larger revision than any write it could have seen.

use crate::broadcast::{BroadcastMessage, Broadcaster};
use crate::clock::Clock;
use crate::config::{PopupConfig, Settings};
use crate::document::{self, ChangeLogEntry};
use crate::endpoint::ConfigEndpoint;
use crate::error::{Result, SyncError};
use crate::stats::StatsRecord;
use crate::store::{self, LocalStore};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::rc::Rc;
use tracing::{debug, error, warn};

/// The cached configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
	pub config: Value,
	/// Write time in epoch milliseconds.
	pub timestamp: i64,
	/// Revision of the document, see the module docs.
	#[serde(default)]
	pub revision: u64,
}

/// Where the configuration adopted by [`ConfigSynchronizer::load`] came
/// from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
	Cache,
	Remote,
	/// The remote document was unavailable or invalid; the local stats
	/// record (or the previous configuration) is in use.
	LocalFallback,
}

/// What [`ConfigSynchronizer::receive_broadcast`] did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastOutcome {
	/// The message's configuration was adopted.
	Applied { enabled: bool },
	/// The message carried a revision older than this tab's.
	Stale { revision: u64 },
	/// The payload failed validation.
	Invalid,
	/// Not a configuration update.
	Ignored,
}

pub struct ConfigSynchronizer<E> {
	settings: Settings,
	endpoint: E,
	store: Rc<dyn LocalStore>,
	clock: Rc<dyn Clock>,
	broadcaster: Option<Box<dyn Broadcaster>>,
	stats: StatsRecord,
	config: PopupConfig,
	revision: u64,
}

impl<E: ConfigEndpoint> ConfigSynchronizer<E> {
	/// Creates a synchronizer holding the default configuration.
	///
	/// Without a broadcaster the synchronizer works for this tab only.
	pub fn new(
		settings: Settings,
		endpoint: E,
		store: Rc<dyn LocalStore>,
		clock: Rc<dyn Clock>,
		broadcaster: Option<Box<dyn Broadcaster>>,
	) -> Self {
		if broadcaster.is_none() {
			debug!("no broadcast channel, cross-tab sync disabled");
		}
		Self {
			stats: StatsRecord::new(settings.stats_key.clone()),
			config: settings.defaults.clone(),
			settings,
			endpoint,
			store,
			clock,
			broadcaster,
			revision: 0,
		}
	}

	pub fn config(&self) -> &PopupConfig {
		&self.config
	}

	pub fn revision(&self) -> u64 {
		self.revision
	}

	pub fn settings(&self) -> &Settings {
		&self.settings
	}

	pub fn stats(&self) -> &StatsRecord {
		&self.stats
	}

	pub fn store(&self) -> &dyn LocalStore {
		&*self.store
	}

	pub fn endpoint(&self) -> &E {
		&self.endpoint
	}

	/// Checks that the local store accepts writes.
	pub fn validate_storage_access(&self) -> Result<()> {
		let key = &self.settings.check_key;
		self.store
			.set_item(key, "test")
			.and_then(|_| self.store.remove_item(key))
			.map_err(|e| {
				error!("localStorage not accessible: {e}");
				SyncError::StorageUnavailable(e)
			})
	}

	/// Obtains the configuration from the cache, the remote endpoint or,
	/// failing both, the local stats record. Never fails.
	pub async fn load(&mut self) -> ConfigSource {
		if let Some(config) = self.fresh_cached_config() {
			debug!("using cached global configuration");
			self.config = config;
			return ConfigSource::Cache;
		}

		debug!("fetching global configuration");
		match self.fetch_remote().await {
			Ok((config, document)) => {
				self.config = config;
				self.revision = self.next_revision();
				self.cache_document(&document);
				self.sync_stats();
				self.broadcast(document);
				debug!("global configuration loaded");
				ConfigSource::Remote
			}
			Err(e) => {
				warn!("failed to load global config: {e}, falling back to local configuration");
				self.fall_back_to_local();
				ConfigSource::LocalFallback
			}
		}
	}

	/// Applies a message from another tab.
	pub fn receive_broadcast(&mut self, message: &BroadcastMessage) -> BroadcastOutcome {
		if !message.is_config_update() {
			return BroadcastOutcome::Ignored;
		}
		if let Some(revision) = message.revision {
			if revision < self.revision {
				debug!(revision, local = self.revision, "dropping stale configuration update");
				return BroadcastOutcome::Stale { revision };
			}
		}

		match PopupConfig::from_document(&self.settings.defaults, &message.config) {
			Ok(config) => {
				debug!("received configuration update from another tab");
				self.config = config;
				if let Some(revision) = message.revision {
					self.revision = self.revision.max(revision);
				}
				self.cache_document(&message.config);
				self.sync_stats();
				BroadcastOutcome::Applied {
					enabled: self.config.enabled,
				}
			}
			Err(e) => {
				warn!("ignoring configuration update: {e}");
				BroadcastOutcome::Invalid
			}
		}
	}

	/// Reloads after another tab changed one of our store keys.
	pub async fn on_storage_event(&mut self, key: &str) -> Option<ConfigSource> {
		if key != self.settings.stats_key && key != self.settings.cache_key {
			return None;
		}
		debug!(key, "storage change detected, updating configuration");
		Some(self.load().await)
	}

	pub async fn set_enabled(&mut self, enabled: bool) {
		self.config.enabled = enabled;
		let mut changes = Map::new();
		changes.insert("enabled".into(), Value::Bool(enabled));
		self.publish_local_change(changes).await;
		debug!(enabled, "popup state changed globally");
	}

	/// Sets the displayed price. Negative or non-finite prices are rejected
	/// and change nothing.
	pub async fn set_price(&mut self, price: f64) -> Result<()> {
		if !price.is_finite() || price < 0.0 {
			return Err(SyncError::SchemaInvalid(format!("invalid price value {price}")));
		}
		self.config.price = price;
		let mut changes = Map::new();
		changes.insert("price".into(), json!(price));
		self.publish_local_change(changes).await;
		debug!("price updated globally to RM{price:.2}");
		Ok(())
	}

	/// Flips `enabled` and returns the new value.
	pub async fn toggle(&mut self) -> bool {
		let enabled = !self.config.enabled;
		self.set_enabled(enabled).await;
		enabled
	}

	/// Writes the stats record if it has never been written.
	pub fn initialize_default_data(&self) {
		if let Err(e) = self.stats.initialize(&*self.store, &self.config) {
			error!("error initializing price data: {e}");
		}
	}

	pub fn close(&self) {
		if let Some(broadcaster) = &self.broadcaster {
			broadcaster.close();
		}
	}

	fn fresh_cached_config(&mut self) -> Option<PopupConfig> {
		let entry = match store::read_json::<CacheEntry>(&*self.store, &self.settings.cache_key) {
			Ok(entry) => entry?,
			Err(e) => {
				warn!("error reading cached config: {e}");
				return None;
			}
		};

		self.revision = self.revision.max(entry.revision);
		if !self.is_fresh(entry.timestamp) {
			return None;
		}

		match PopupConfig::from_document(&self.settings.defaults, &entry.config) {
			Ok(config) => Some(config),
			Err(e) => {
				warn!("cached configuration rejected: {e}");
				None
			}
		}
	}

	/// Whether a cache entry written at `timestamp` is still within the TTL.
	/// Entries stamped in the future are treated as expired.
	fn is_fresh(&self, timestamp: i64) -> bool {
		let ttl = i64::try_from(self.settings.cache_ttl.as_millis()).unwrap_or(i64::MAX);
		match self.clock.now_millis().checked_sub(timestamp) {
			Some(age) => (0..ttl).contains(&age),
			None => false,
		}
	}

	/// Raises the local revision to the cached one, even when the entry is
	/// expired, so the next revision taken here supersedes it.
	fn observe_cached_revision(&mut self) {
		if let Ok(Some(entry)) = store::read_json::<CacheEntry>(&*self.store, &self.settings.cache_key) {
			self.revision = self.revision.max(entry.revision);
		}
	}

	fn next_revision(&self) -> u64 {
		let now = u64::try_from(self.clock.now_millis()).unwrap_or(0);
		self.revision.saturating_add(1).max(now)
	}

	async fn fetch_remote(&self) -> Result<(PopupConfig, Value)> {
		let document = self.endpoint.fetch(self.clock.now_millis()).await?;
		let config = PopupConfig::from_document(&self.settings.defaults, &document)?;
		Ok((config, document))
	}

	fn fall_back_to_local(&mut self) {
		match self.stats.read_raw(&*self.store) {
			Ok(Some(stats)) => {
				self.config.enabled = stats.enabled;
				if stats.price.is_finite() && stats.price >= 0.0 {
					self.config.price = stats.price;
				}
			}
			Ok(None) => {}
			Err(e) => warn!("error reading local price data: {e}"),
		}
	}

	fn cache_document(&self, document: &Value) {
		let entry = CacheEntry {
			config: document.clone(),
			timestamp: self.clock.now_millis(),
			revision: self.revision,
		};
		if let Err(e) = store::write_json(&*self.store, &self.settings.cache_key, &entry) {
			warn!("error caching config: {e}");
		}
	}

	fn sync_stats(&self) {
		let now = document::iso8601(self.clock.now());
		if let Err(e) = self.stats.sync_from(&*self.store, &self.config, &now) {
			error!("error updating localStorage: {e}");
		}
	}

	fn broadcast(&self, document: Value) {
		let Some(broadcaster) = &self.broadcaster else {
			return;
		};
		let message = BroadcastMessage::config_update(document, self.clock.now_millis(), self.revision);
		match broadcaster.post(&message) {
			Ok(()) => debug!("configuration update broadcasted to other tabs"),
			Err(e) => warn!("broadcast failed: {e}"),
		}
	}

	async fn publish_local_change(&mut self, changes: Map<String, Value>) {
		self.observe_cached_revision();
		self.revision = self.next_revision();
		self.rewrite_cached_document(&changes);
		self.sync_stats();

		let update = json!({ "popup": changes, "admin": { "lastModifiedBy": "admin" } });
		match self.endpoint.update(&update).await {
			Ok(_) => debug!("global configuration stored remotely"),
			Err(e) => warn!("remote configuration update failed, change kept locally: {e}"),
		}

		self.broadcast(self.config.to_document());
	}

	/// Applies `changes` to the cached document, like a server would, so
	/// that reloads within the TTL see them.
	fn rewrite_cached_document(&self, changes: &Map<String, Value>) {
		let entry = match store::read_json::<CacheEntry>(&*self.store, &self.settings.cache_key) {
			Ok(Some(entry)) => entry,
			Ok(None) => return,
			Err(e) => {
				warn!("error reading cached config: {e}");
				return;
			}
		};

		let now = self.clock.now();
		let mut popup_changes = changes.clone();
		popup_changes.insert("lastUpdated".into(), Value::String(document::iso8601(now)));
		let log_entry = ChangeLogEntry::new(now, "update", Value::Object(changes.clone()));
		let updated = document::apply_update(
			&entry.config,
			&popup_changes,
			"admin",
			log_entry,
			self.settings.change_log_limit,
		);
		self.cache_document(&updated);
		debug!("global configuration updated (cached)");
	}
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
	use super::*;
	use crate::broadcast::{BusHandle, LocalBus};
	use crate::clock::ManualClock;
	use crate::store::MemoryStore;
	use chrono::Duration;
	use std::cell::{Cell, RefCell};

	/// Endpoint answering from a scripted document.
	#[derive(Default)]
	struct ScriptedEndpoint {
		document: RefCell<Option<Value>>,
		status: Cell<Option<u16>>,
		fetches: Cell<usize>,
		updates: RefCell<Vec<Value>>,
	}

	impl ScriptedEndpoint {
		fn serving(document: Value) -> Self {
			let endpoint = Self::default();
			*endpoint.document.borrow_mut() = Some(document);
			endpoint
		}

		fn failing(status: u16) -> Self {
			let endpoint = Self::default();
			endpoint.status.set(Some(status));
			endpoint
		}
	}

	impl ConfigEndpoint for ScriptedEndpoint {
		async fn fetch(&self, _cache_buster: i64) -> Result<Value> {
			self.fetches.set(self.fetches.get() + 1);
			if let Some(status) = self.status.get() {
				return Err(SyncError::HttpStatus {
					status,
					reason: "Internal Server Error".into(),
				});
			}
			self.document
				.borrow()
				.clone()
				.ok_or_else(|| SyncError::Network("unreachable".into()))
		}

		async fn update(&self, changes: &Value) -> Result<Value> {
			self.updates.borrow_mut().push(changes.clone());
			Err(SyncError::Network("read-only endpoint".into()))
		}
	}

	struct Fixture {
		store: Rc<MemoryStore>,
		clock: Rc<ManualClock>,
		bus: LocalBus,
		peer: BusHandle,
	}

	impl Fixture {
		fn new() -> Self {
			let bus = LocalBus::new();
			let peer = bus.join();
			Self {
				store: Rc::new(MemoryStore::new()),
				clock: Rc::new(ManualClock::default()),
				bus,
				peer,
			}
		}

		fn synchronizer(&self, endpoint: ScriptedEndpoint) -> ConfigSynchronizer<ScriptedEndpoint> {
			ConfigSynchronizer::new(
				Settings::default(),
				endpoint,
				self.store.clone(),
				self.clock.clone(),
				Some(Box::new(self.bus.join())),
			)
		}
	}

	fn remote_doc(enabled: bool, price: f64) -> Value {
		json!({"version": "1.0.0", "popup": {"enabled": enabled, "price": price, "maxDisplays": 5}})
	}

	#[tokio::test]
	async fn test_load_from_remote_caches_and_broadcasts() {
		let fx = Fixture::new();
		let mut sync = fx.synchronizer(ScriptedEndpoint::serving(remote_doc(false, 80.0)));

		assert_eq!(sync.load().await, ConfigSource::Remote);
		assert!(!sync.config().enabled);
		assert_eq!(sync.config().price, 80.0);
		assert_eq!(sync.config().max_displays, 5);
		assert_eq!(sync.config().popup_delay, 2000);

		let entry: CacheEntry = store::read_json(&*fx.store, "duratile_config_cache")
			.unwrap()
			.unwrap();
		assert_eq!(entry.config, remote_doc(false, 80.0));
		assert_eq!(entry.timestamp, fx.clock.now_millis());

		let received = fx.peer.drain();
		assert_eq!(received.len(), 1);
		assert_eq!(received[0].config, remote_doc(false, 80.0));
	}

	#[tokio::test]
	async fn test_fresh_cache_skips_fetch() {
		let fx = Fixture::new();
		let mut first = fx.synchronizer(ScriptedEndpoint::serving(remote_doc(true, 60.0)));
		first.load().await;

		let mut second = fx.synchronizer(ScriptedEndpoint::serving(remote_doc(true, 99.0)));
		fx.clock.advance(Duration::minutes(4));
		assert_eq!(second.load().await, ConfigSource::Cache);
		assert_eq!(second.config().price, 60.0);
		assert_eq!(second.endpoint().fetches.get(), 0);
	}

	#[tokio::test]
	async fn test_expired_cache_refetches() {
		let fx = Fixture::new();
		let mut first = fx.synchronizer(ScriptedEndpoint::serving(remote_doc(true, 60.0)));
		first.load().await;

		let mut second = fx.synchronizer(ScriptedEndpoint::serving(remote_doc(true, 99.0)));
		fx.clock.advance(Duration::minutes(5));
		assert_eq!(second.load().await, ConfigSource::Remote);
		assert_eq!(second.config().price, 99.0);
		assert_eq!(second.endpoint().fetches.get(), 1);
	}

	#[tokio::test]
	async fn test_http_error_falls_back_to_stats_record() {
		let fx = Fixture::new();
		fx.store
			.set_item("duratile_price_data", r#"{"price": 45.0, "enabled": false}"#)
			.unwrap();
		let mut sync = fx.synchronizer(ScriptedEndpoint::failing(500));

		assert_eq!(sync.load().await, ConfigSource::LocalFallback);
		assert!(!sync.config().enabled);
		assert_eq!(sync.config().price, 45.0);
		assert_eq!(sync.config().max_displays, 3);
	}

	#[tokio::test]
	async fn test_http_error_without_record_keeps_defaults() {
		let fx = Fixture::new();
		let mut sync = fx.synchronizer(ScriptedEndpoint::failing(500));

		assert_eq!(sync.load().await, ConfigSource::LocalFallback);
		assert_eq!(sync.config(), &PopupConfig::default());
	}

	#[tokio::test]
	async fn test_invalid_remote_document_leaves_config_unchanged() {
		let fx = Fixture::new();
		let mut sync = fx.synchronizer(ScriptedEndpoint::serving(remote_doc(false, 10.0)));
		sync.load().await;
		let before = sync.config().clone();

		for bad in [json!({}), json!({"popup": {"enabled": "no", "price": 1}}), json!({"popup": {"enabled": true, "price": -1}})] {
			*sync.endpoint.document.borrow_mut() = Some(bad);
			fx.clock.advance(Duration::minutes(10));
			assert_eq!(sync.load().await, ConfigSource::LocalFallback);
			assert_eq!(sync.config(), &before);
		}
	}

	#[tokio::test]
	async fn test_receive_broadcast() {
		let fx = Fixture::new();
		let mut sync = fx.synchronizer(ScriptedEndpoint::failing(500));

		let msg = BroadcastMessage::config_update(remote_doc(false, 30.0), 0, 0);
		assert_eq!(sync.receive_broadcast(&msg), BroadcastOutcome::Applied { enabled: false });
		assert_eq!(sync.config().price, 30.0);

		let stats = sync.stats().read_raw(sync.store()).unwrap().unwrap();
		assert!(!stats.enabled);
		assert_eq!(stats.price, 30.0);
	}

	#[tokio::test]
	async fn test_invalid_broadcast_is_ignored() {
		let fx = Fixture::new();
		let mut sync = fx.synchronizer(ScriptedEndpoint::failing(500));

		let msg = BroadcastMessage::config_update(json!({"popup": {"enabled": 1, "price": 3}}), 0, 0);
		assert_eq!(sync.receive_broadcast(&msg), BroadcastOutcome::Invalid);
		assert_eq!(sync.config(), &PopupConfig::default());

		let other = BroadcastMessage {
			kind: "PING".into(),
			..msg
		};
		assert_eq!(sync.receive_broadcast(&other), BroadcastOutcome::Ignored);
	}

	#[tokio::test]
	async fn test_stale_broadcast_is_dropped() {
		let fx = Fixture::new();
		let mut sync = fx.synchronizer(ScriptedEndpoint::failing(500));
		sync.set_price(10.0).await.unwrap();
		sync.set_price(11.0).await.unwrap();
		let now = fx.clock.now_millis() as u64;
		assert_eq!(sync.revision(), now + 1);

		let stale = BroadcastMessage::config_update(remote_doc(false, 1.0), 0, now);
		assert_eq!(sync.receive_broadcast(&stale), BroadcastOutcome::Stale { revision: now });
		assert_eq!(sync.config().price, 11.0);

		let legacy = BroadcastMessage {
			revision: None,
			..stale
		};
		assert_eq!(sync.receive_broadcast(&legacy), BroadcastOutcome::Applied { enabled: false });
	}

	#[tokio::test]
	async fn test_set_enabled_rewrites_cache_and_broadcasts() {
		let fx = Fixture::new();
		let mut sync = fx.synchronizer(ScriptedEndpoint::serving(remote_doc(true, 70.0)));
		sync.load().await;
		fx.peer.drain();

		sync.set_enabled(false).await;
		assert!(!sync.config().enabled);

		let entry: CacheEntry = store::read_json(&*fx.store, "duratile_config_cache")
			.unwrap()
			.unwrap();
		assert_eq!(entry.config["popup"]["enabled"], false);
		assert_eq!(entry.config["popup"]["maxDisplays"], 5);
		assert_eq!(entry.config["admin"]["lastModifiedBy"], "admin");
		assert_eq!(entry.config["admin"]["changeLog"][0]["changes"], json!({"enabled": false}));
		let revision = fx.clock.now_millis() as u64 + 1;
		assert_eq!(entry.revision, revision);

		// The endpoint refused the write but the local value stands
		assert_eq!(sync.endpoint().updates.borrow().len(), 1);

		let received = fx.peer.drain();
		assert_eq!(received.len(), 1);
		assert_eq!(received[0].revision, Some(revision));
		assert_eq!(received[0].config["popup"]["enabled"], false);
	}

	#[tokio::test]
	async fn test_cache_from_the_future_is_expired() {
		let fx = Fixture::new();
		let entry = CacheEntry {
			config: remote_doc(true, 1.0),
			timestamp: 9_000_000_000_000_000,
			revision: 0,
		};
		store::write_json(&*fx.store, "duratile_config_cache", &entry).unwrap();
		let mut sync = fx.synchronizer(ScriptedEndpoint::serving(remote_doc(true, 64.0)));

		fx.clock.advance(Duration::days(365));
		assert_eq!(sync.load().await, ConfigSource::Remote);
		assert_eq!(sync.config().price, 64.0);
	}

	#[tokio::test]
	async fn test_cache_timestamp_overflow_is_expired() {
		let fx = Fixture::new();
		fx.store
			.set_item(
				"duratile_config_cache",
				r#"{"config": {"popup": {"enabled": true, "price": 1}}, "timestamp": -9223372036854775808}"#,
			)
			.unwrap();
		let mut sync = fx.synchronizer(ScriptedEndpoint::serving(remote_doc(true, 64.0)));

		assert_eq!(sync.load().await, ConfigSource::Remote);
		assert_eq!(sync.config().price, 64.0);
	}

	#[tokio::test]
	async fn test_remote_load_supersedes_cached_revision() {
		let fx = Fixture::new();
		let entry = CacheEntry {
			config: remote_doc(true, 1.0),
			timestamp: 0,
			revision: u64::MAX - 5,
		};
		store::write_json(&*fx.store, "duratile_config_cache", &entry).unwrap();
		let mut sync = fx.synchronizer(ScriptedEndpoint::serving(remote_doc(true, 64.0)));

		assert_eq!(sync.load().await, ConfigSource::Remote);
		assert_eq!(sync.revision(), u64::MAX - 4);
		let cached: CacheEntry = store::read_json(&*fx.store, "duratile_config_cache")
			.unwrap()
			.unwrap();
		assert_eq!(cached.revision, u64::MAX - 4);
	}

	#[tokio::test]
	async fn test_set_price_validates() {
		let fx = Fixture::new();
		let mut sync = fx.synchronizer(ScriptedEndpoint::failing(500));

		assert!(sync.set_price(-1.0).await.is_err());
		assert!(sync.set_price(f64::NAN).await.is_err());
		assert_eq!(sync.config().price, 70.0);
		assert_eq!(fx.peer.pending(), 0);

		sync.set_price(0.0).await.unwrap();
		assert_eq!(sync.config().price, 0.0);
	}

	#[tokio::test]
	async fn test_toggle() {
		let fx = Fixture::new();
		let mut sync = fx.synchronizer(ScriptedEndpoint::failing(500));
		assert!(!sync.toggle().await);
		assert!(sync.toggle().await);
	}

	#[tokio::test]
	async fn test_storage_event_filter() {
		let fx = Fixture::new();
		let mut sync = fx.synchronizer(ScriptedEndpoint::serving(remote_doc(true, 1.0)));
		assert_eq!(sync.on_storage_event("unrelated").await, None);
		assert_eq!(
			sync.on_storage_event("duratile_config_cache").await,
			Some(ConfigSource::Remote)
		);
	}

	#[test]
	fn test_storage_access_check() {
		let sync = ConfigSynchronizer::new(
			Settings::default(),
			ScriptedEndpoint::default(),
			Rc::new(MemoryStore::read_only()),
			Rc::new(ManualClock::default()),
			None,
		);
		assert!(matches!(
			sync.validate_storage_access(),
			Err(SyncError::StorageUnavailable(_))
		));
	}
}
