//! Promotional popup configuration, synchronized across browser tabs.
//!
//! A page builds one [`PopupContext`] from its [`Environment`] (local store,
//! cookies, clock, broadcast channel, overlay renderer) and a
//! [`ConfigEndpoint`], calls [`PopupContext::init`] on load and feeds it
//! [`PageEvent`]s afterwards. The `web` feature provides the browser
//! implementations of every seam and a driver that runs the whole thing
//! on the page's event loop; the `server` feature provides the companion
//! HTTP service that stores the shared configuration document.

mod broadcast;
mod clock;
mod config;
mod context;
mod cookie;
mod document;
mod endpoint;
mod error;
mod presenter;
mod stats;
mod store;
mod sync;

#[cfg(feature = "web")]
mod web;

#[cfg(feature = "server")]
pub mod server;

pub use broadcast::{BroadcastMessage, Broadcaster, BusHandle, LocalBus, CONFIG_UPDATE};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{validate_document, PopupConfig, PopupMessage, Settings};
pub use context::{AdminCommand, Environment, PageEvent, PopupContext, SystemStatus, Timer};
pub use cookie::{format_cookie, parse_cookie, CookieJar, DisplayCounter, MemoryCookieJar};
pub use document::{apply_update, default_document, iso8601, ChangeLogEntry};
pub use endpoint::{cache_busted, ConfigEndpoint};
pub use error::{Result, SyncError};
pub use presenter::{
	CloseReason, HeadlessOverlay, OverlayRenderer, PopupPresenter, PopupView, PresenterState,
	SuppressReason, OVERLAY_ID,
};
pub use stats::{PriceStats, StatsRecord};
pub use store::{read_json, write_json, LocalStore, MemoryStore};
pub use sync::{BroadcastOutcome, CacheEntry, ConfigSource, ConfigSynchronizer};

#[cfg(feature = "web")]
pub use web::{
	start, DomOverlay, FetchEndpoint, PopupHandle, WebBroadcast, WebCookieJar, WebLocalStore,
};
