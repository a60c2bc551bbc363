//! Multi-tab scenarios for PopupContext
//!
//! Every tab of one simulated browser shares the local store, the cookie jar
//! and the clock, and joins the same broadcast bus. The remote document
//! lives in a scripted server that merges updates like the config server.

#![cfg(not(target_arch = "wasm32"))]

use chrono::Duration as Elapsed;
use popsync::{
	apply_update, AdminCommand, BusHandle, ChangeLogEntry, Clock, CloseReason, ConfigEndpoint,
	Environment, HeadlessOverlay, LocalBus, LocalStore, ManualClock, MemoryCookieJar, MemoryStore,
	PageEvent, PopupContext, PresenterState, Settings, SuppressReason, SyncError, Timer,
};
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct ScriptedServer {
	document: Rc<RefCell<Option<Value>>>,
	status: Rc<Cell<Option<u16>>>,
	clock: Option<Rc<ManualClock>>,
}

impl ScriptedServer {
	fn unavailable(status: u16) -> Self {
		let server = Self::default();
		server.status.set(Some(status));
		server
	}

	fn document(&self) -> Value {
		self.document.borrow().clone().unwrap_or(Value::Null)
	}
}

impl ConfigEndpoint for ScriptedServer {
	async fn fetch(&self, _cache_buster: i64) -> popsync::Result<Value> {
		if let Some(status) = self.status.get() {
			return Err(SyncError::HttpStatus {
				status,
				reason: "Internal Server Error".into(),
			});
		}
		self.document
			.borrow()
			.clone()
			.ok_or_else(|| SyncError::Network("connection refused".into()))
	}

	async fn update(&self, changes: &Value) -> popsync::Result<Value> {
		let mut document = self.document.borrow_mut();
		let current = document
			.as_ref()
			.ok_or_else(|| SyncError::Network("connection refused".into()))?;
		let now = self.clock.as_ref().map(|c| c.now()).unwrap_or_default();
		let popup = changes["popup"].as_object().cloned().unwrap_or_default();
		let entry = ChangeLogEntry::new(now, "api_update", changes.clone()).with_source("test");
		let updated = apply_update(current, &popup, "admin", entry, 10);
		*document = Some(updated.clone());
		Ok(updated)
	}
}

struct Browser {
	store: Rc<MemoryStore>,
	cookies: Rc<MemoryCookieJar>,
	clock: Rc<ManualClock>,
	bus: LocalBus,
	server: ScriptedServer,
}

impl Browser {
	fn new(server: ScriptedServer) -> Self {
		let clock = Rc::new(ManualClock::default());
		Self {
			store: Rc::new(MemoryStore::new()),
			cookies: Rc::new(MemoryCookieJar::new(clock.clone())),
			clock: clock.clone(),
			bus: LocalBus::new(),
			server: ScriptedServer {
				clock: Some(clock),
				..server
			},
		}
	}

	fn serving(document: Value) -> Self {
		let server = ScriptedServer::default();
		*server.document.borrow_mut() = Some(document);
		Self::new(server)
	}

	fn open_tab(&self) -> Tab {
		let inbox = self.bus.join();
		let env = Environment {
			store: self.store.clone(),
			cookies: self.cookies.clone(),
			clock: self.clock.clone(),
			broadcaster: Some(Box::new(inbox.clone())),
			overlay: Box::new(HeadlessOverlay::default()),
		};
		Tab {
			ctx: PopupContext::new(Settings::default(), self.server.clone(), env),
			inbox,
		}
	}
}

struct Tab {
	ctx: PopupContext<ScriptedServer>,
	inbox: BusHandle,
}

impl Tab {
	/// Hands every pending broadcast to the context, returning the timers it
	/// asked for.
	async fn deliver(&mut self) -> Vec<Timer> {
		let mut timers = Vec::new();
		for message in self.inbox.drain() {
			timers.extend(self.ctx.handle(PageEvent::Broadcast(message)).await);
		}
		timers
	}

	/// Loads the page and, if a display was scheduled, lets the delay elapse.
	async fn load_and_show(&mut self) {
		let timer = self.ctx.init().await.unwrap().expect("display scheduled");
		self.ctx.handle(timer.event).await;
	}
}

fn remote_document(enabled: bool, price: f64) -> Value {
	json!({
		"version": "1.0.0",
		"lastUpdated": "2025-01-01T00:00:00.000Z",
		"popup": {"enabled": enabled, "price": price, "maxDisplays": 3, "popupDelay": 2000},
		"admin": {"lastModifiedBy": "system", "changeLog": []}
	})
}

// ---------------------------------------------------------------------------
// First page load
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_defaults_schedule_display_after_two_seconds() {
	let browser = Browser::new(ScriptedServer::default());
	let mut tab = browser.open_tab();

	let timer = tab.ctx.init().await.unwrap();
	assert_eq!(
		timer,
		Some(Timer {
			after: Duration::from_millis(2000),
			event: PageEvent::DelayElapsed,
		})
	);
	assert_eq!(tab.ctx.presenter().state(), PresenterState::Scheduled);

	tab.ctx.handle(PageEvent::DelayElapsed).await;
	let status = tab.ctx.status();
	assert!(status.has_active_popup);
	assert_eq!(status.current_count, 1);
	assert_eq!(status.price_data.popup_display_count, 1);
	assert_eq!(status.price_data.price, 70.0);
}

#[tokio::test]
async fn test_display_limit_suppresses_popup() {
	let browser = Browser::new(ScriptedServer::default());
	browser.cookies.insert("duratile_popup_count", "3");
	let mut tab = browser.open_tab();

	assert_eq!(tab.ctx.init().await.unwrap(), None);
	assert_eq!(
		tab.ctx.presenter().state(),
		PresenterState::Suppressed(SuppressReason::DisplayLimitReached)
	);
	assert!(!tab.ctx.status().has_active_popup);
}

#[tokio::test]
async fn test_garbage_counter_shows_popup() {
	let browser = Browser::new(ScriptedServer::default());
	browser.cookies.insert("duratile_popup_count", "many");
	let mut tab = browser.open_tab();

	tab.load_and_show().await;
	assert_eq!(tab.ctx.status().current_count, 1);
}

#[tokio::test]
async fn test_server_error_uses_local_price_data() {
	let browser = Browser::new(ScriptedServer::unavailable(500));
	browser
		.store
		.set_item("duratile_price_data", r#"{"price": 45.0, "enabled": true}"#)
		.unwrap();
	let mut tab = browser.open_tab();

	tab.load_and_show().await;
	assert_eq!(tab.ctx.config().price, 45.0);
	assert_eq!(tab.ctx.status().price_data.popup_display_count, 1);
}

#[tokio::test]
async fn test_remote_disable_skips_display() {
	let browser = Browser::serving(remote_document(false, 70.0));
	let mut tab = browser.open_tab();

	assert_eq!(tab.ctx.init().await.unwrap(), None);
	assert_eq!(
		tab.ctx.presenter().state(),
		PresenterState::Suppressed(SuppressReason::Disabled)
	);
}

#[tokio::test]
async fn test_disable_during_delay_cancels_display() {
	let browser = Browser::serving(remote_document(true, 70.0));
	let mut tab = browser.open_tab();
	let timer = tab.ctx.init().await.unwrap().unwrap();

	let disabled =
		popsync::BroadcastMessage::config_update(remote_document(false, 70.0), 0, u64::MAX);
	tab.ctx.handle(PageEvent::Broadcast(disabled)).await;
	tab.ctx.handle(timer.event).await;

	assert_eq!(
		tab.ctx.presenter().state(),
		PresenterState::Suppressed(SuppressReason::CancelledAtFire)
	);
	assert_eq!(tab.ctx.status().current_count, 0);
}

// ---------------------------------------------------------------------------
// Cross-tab propagation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_disable_in_one_tab_closes_the_other() {
	let browser = Browser::serving(remote_document(true, 70.0));
	let mut a = browser.open_tab();
	let mut b = browser.open_tab();
	a.load_and_show().await;
	b.load_and_show().await;
	b.deliver().await;
	assert!(b.ctx.status().has_active_popup);

	let fade = a.ctx.handle(PageEvent::Admin(AdminCommand::Disable)).await;
	assert_eq!(fade.map(|t| t.after), Some(Duration::from_millis(300)));

	let timers = b.deliver().await;
	assert_eq!(
		timers,
		vec![Timer {
			after: Duration::from_millis(300),
			event: PageEvent::FadeOutElapsed,
		}]
	);
	assert!(!b.ctx.config().enabled);
	assert_eq!(b.ctx.presenter().state(), PresenterState::Closed);

	b.ctx.handle(PageEvent::FadeOutElapsed).await;
	assert!(!b.ctx.status().has_active_popup);
}

#[tokio::test]
async fn test_price_change_reaches_other_tabs_and_server() {
	let browser = Browser::serving(remote_document(true, 70.0));
	let mut a = browser.open_tab();
	let mut b = browser.open_tab();
	a.ctx.init().await.unwrap();
	b.ctx.init().await.unwrap();
	b.deliver().await;

	a.ctx.handle(PageEvent::Admin(AdminCommand::UpdatePrice(55.0))).await;
	b.deliver().await;
	assert_eq!(b.ctx.config().price, 55.0);
	assert_eq!(b.ctx.synchronizer().revision(), a.ctx.synchronizer().revision());

	let stored = browser.server.document();
	assert_eq!(stored["popup"]["price"], 55.0);
	assert_eq!(stored["admin"]["changeLog"][0]["action"], "api_update");

	// A page opened after the cache expired reads the stored price
	browser.clock.advance(Elapsed::minutes(6));
	let mut c = browser.open_tab();
	c.ctx.init().await.unwrap();
	assert_eq!(c.ctx.config().price, 55.0);
}

#[tokio::test]
async fn test_storage_change_reloads_from_cache() {
	let browser = Browser::serving(remote_document(true, 70.0));
	let mut a = browser.open_tab();
	let mut b = browser.open_tab();
	a.ctx.init().await.unwrap();
	b.load_and_show().await;

	a.ctx.handle(PageEvent::Admin(AdminCommand::Disable)).await;
	// Tab b never saw the broadcast, only the storage write
	b.inbox.drain();
	let timer = b
		.ctx
		.handle(PageEvent::StorageChanged("duratile_config_cache".into()))
		.await;

	assert!(!b.ctx.config().enabled);
	assert_eq!(timer.map(|t| t.event), Some(PageEvent::FadeOutElapsed));
}

#[tokio::test]
async fn test_newer_tab_write_reaches_older_tab() {
	let browser = Browser::serving(remote_document(true, 70.0));
	let mut a = browser.open_tab();
	a.load_and_show().await;
	a.ctx.handle(PageEvent::Admin(AdminCommand::UpdatePrice(60.0))).await;
	a.ctx.handle(PageEvent::Admin(AdminCommand::UpdatePrice(65.0))).await;

	// b opens after the cache expired and loads the server document
	browser.clock.advance(Elapsed::minutes(6));
	let mut b = browser.open_tab();
	b.ctx.init().await.unwrap();
	assert!(b.ctx.synchronizer().revision() > a.ctx.synchronizer().revision());
	a.deliver().await;

	b.ctx.handle(PageEvent::Admin(AdminCommand::Disable)).await;
	let timers = a.deliver().await;

	assert!(!a.ctx.config().enabled);
	assert_eq!(a.ctx.presenter().state(), PresenterState::Closed);
	assert_eq!(timers.len(), 1);
	assert_eq!(a.ctx.synchronizer().revision(), b.ctx.synchronizer().revision());
}

#[tokio::test]
async fn test_cached_tab_write_reaches_writer_tab() {
	let browser = Browser::serving(remote_document(true, 70.0));
	let mut a = browser.open_tab();
	let mut b = browser.open_tab();
	a.load_and_show().await;
	a.ctx.handle(PageEvent::Admin(AdminCommand::UpdatePrice(60.0))).await;
	a.ctx.handle(PageEvent::Admin(AdminCommand::UpdatePrice(65.0))).await;

	// b loads from the cache a just rewrote, without advancing the clock
	b.ctx.init().await.unwrap();
	b.inbox.drain();
	b.ctx.handle(PageEvent::Admin(AdminCommand::Disable)).await;
	a.deliver().await;

	assert!(!a.ctx.config().enabled);
	assert_eq!(a.ctx.presenter().state(), PresenterState::Closed);
}

#[tokio::test]
async fn test_stale_update_is_dropped() {
	let browser = Browser::serving(remote_document(true, 70.0));
	let mut a = browser.open_tab();
	let mut b = browser.open_tab();
	a.ctx.init().await.unwrap();
	b.ctx.init().await.unwrap();

	a.ctx.handle(PageEvent::Admin(AdminCommand::UpdatePrice(60.0))).await;
	a.ctx.handle(PageEvent::Admin(AdminCommand::UpdatePrice(65.0))).await;
	let mut messages = b.inbox.drain();
	assert_eq!(messages.len(), 3);

	// Deliver the newest update before the older one
	let newest = messages.pop().unwrap();
	b.ctx.handle(PageEvent::Broadcast(newest)).await;
	for message in messages {
		b.ctx.handle(PageEvent::Broadcast(message)).await;
	}
	assert_eq!(b.ctx.config().price, 65.0);
}

// ---------------------------------------------------------------------------
// Operator commands
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_force_show_keeps_counter() {
	let browser = Browser::new(ScriptedServer::default());
	browser.cookies.insert("duratile_popup_count", "3");
	let mut tab = browser.open_tab();
	tab.ctx.init().await.unwrap();

	tab.ctx.handle(PageEvent::Admin(AdminCommand::ForceShow)).await;
	let status = tab.ctx.status();
	assert!(status.has_active_popup);
	assert_eq!(status.current_count, 3);
}

#[tokio::test]
async fn test_reset_count_allows_display_again() {
	let browser = Browser::new(ScriptedServer::default());
	browser.cookies.insert("duratile_popup_count", "3");
	let mut tab = browser.open_tab();
	tab.ctx.handle(PageEvent::Admin(AdminCommand::ResetCount)).await;

	tab.load_and_show().await;
	assert_eq!(tab.ctx.status().current_count, 1);
}

#[tokio::test]
async fn test_dismiss_then_teardown() {
	let browser = Browser::new(ScriptedServer::default());
	let mut tab = browser.open_tab();
	tab.load_and_show().await;

	let timer = tab.ctx.handle(PageEvent::Dismiss(CloseReason::EscapeKey)).await;
	assert!(timer.is_some());
	// A second close while fading does nothing
	assert_eq!(tab.ctx.handle(PageEvent::Dismiss(CloseReason::OutsideClick)).await, None);

	tab.ctx.teardown();
	assert!(tab.ctx.is_torn_down());
	assert!(!tab.ctx.status().has_active_popup);
	assert_eq!(tab.ctx.handle(PageEvent::Admin(AdminCommand::ForceShow)).await, None);
}

#[tokio::test]
async fn test_unwritable_storage_fails_init() {
	let browser = Browser::new(ScriptedServer::default());
	let env = Environment {
		store: Rc::new(MemoryStore::read_only()),
		cookies: browser.cookies.clone(),
		clock: browser.clock.clone(),
		broadcaster: None,
		overlay: Box::new(HeadlessOverlay::default()),
	};
	let mut ctx = PopupContext::new(Settings::default(), browser.server.clone(), env);

	assert!(matches!(ctx.init().await, Err(SyncError::StorageUnavailable(_))));
	assert!(!ctx.is_initialized());
}
