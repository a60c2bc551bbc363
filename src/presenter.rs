//! The popup presenter decides whether and when the promotional overlay is
//! shown, counts displays, and tears the overlay down.
//!
//! ```text
//! Unshown ──check_and_show──► Scheduled ──delay, enabled──► Shown ──close──► Closed
//!    │                           │
//!    └── disabled / limit ──► Suppressed ◄── delay, disabled
//! ```
//!
//! The presenter never arms timers itself: [`PopupPresenter::check_and_show`]
//! and [`PopupPresenter::close`] return the delay and the host calls back
//! when it elapses.

use crate::config::PopupConfig;
use crate::cookie::DisplayCounter;
use crate::error::{Result, SyncError};
use crate::stats::StatsRecord;
use crate::store::LocalStore;
use serde::Serialize;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, error};

/// DOM id of the overlay element.
pub const OVERLAY_ID: &str = "duratile-popup";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SuppressReason {
	Disabled,
	DisplayLimitReached,
	/// Enabled when scheduled, disabled when the delay elapsed.
	CancelledAtFire,
	/// The overlay could not be rendered; nothing was counted.
	RenderFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "state", content = "reason")]
pub enum PresenterState {
	Unshown,
	Scheduled,
	Shown,
	Closed,
	Suppressed(SuppressReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
	/// Close or "Maybe Later" button.
	Dismissed,
	/// Click on the backdrop outside the dialog.
	OutsideClick,
	EscapeKey,
	/// Another tab disabled the popup.
	RemoteDisable,
}

/// Everything the overlay displays.
#[derive(Debug, Clone, PartialEq)]
pub struct PopupView {
	pub title: String,
	pub subtitle: String,
	pub price_label: String,
	pub cta: String,
	pub button_primary: String,
	pub button_secondary: String,
	/// Target of the primary button.
	pub contact_href: String,
	pub image_src: String,
}

impl PopupView {
	pub fn from_config(config: &PopupConfig) -> Self {
		let message = &config.message;
		Self {
			title: message.title.clone(),
			subtitle: message.subtitle.clone(),
			price_label: config.price_label(),
			cta: message.cta.clone(),
			button_primary: message.button_primary.clone(),
			button_secondary: message.button_secondary.clone(),
			contact_href: "contact.html#top".to_string(),
			image_src: "img/p4_1.jpg".to_string(),
		}
	}

	/// Overlay markup. Dismiss controls carry a `data-dismiss` attribute.
	pub fn to_html(&self) -> String {
		format!(
			r#"<div id="{id}" class="duratile-popup-overlay">
  <div class="duratile-popup-container">
    <div class="duratile-popup-header">
      <h2 style="color: #333333;">{title}</h2>
      <button class="duratile-popup-close" data-dismiss>&times;</button>
    </div>
    <div class="duratile-popup-content">
      <div class="duratile-popup-icon">
        <img src="{image}" alt="Duratile" style="width: 80px; height: 80px; border-radius: 8px; object-fit: cover;">
      </div>
      <div class="duratile-popup-message">
        <h3>{subtitle}</h3>
        <p class="duratile-popup-price">{price}</p>
        <p class="duratile-popup-cta">{cta}</p>
      </div>
    </div>
    <div class="duratile-popup-actions">
      <a href="{href}" class="duratile-popup-btn duratile-popup-btn-primary">{primary}</a>
      <button class="duratile-popup-btn duratile-popup-btn-secondary" data-dismiss>{secondary}</button>
    </div>
  </div>
</div>"#,
			id = OVERLAY_ID,
			title = escape_html(&self.title),
			image = escape_html(&self.image_src),
			subtitle = escape_html(&self.subtitle),
			price = escape_html(&self.price_label),
			cta = escape_html(&self.cta),
			href = escape_html(&self.contact_href),
			primary = escape_html(&self.button_primary),
			secondary = escape_html(&self.button_secondary),
		)
	}
}

fn escape_html(text: &str) -> String {
	let mut out = String::with_capacity(text.len());
	for c in text.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			'"' => out.push_str("&quot;"),
			'\'' => out.push_str("&#39;"),
			c => out.push(c),
		}
	}
	out
}

/// Puts the overlay on screen and takes it off.
pub trait OverlayRenderer {
	/// Builds and attaches the overlay.
	fn mount(&mut self, view: &PopupView) -> Result<()>;

	/// Starts the hide animation.
	fn begin_close(&mut self);

	/// Detaches the overlay. Safe to call when nothing is mounted.
	fn unmount(&mut self);
}

/// An [`OverlayRenderer`] without a screen, remembering what it was asked
/// to show.
#[derive(Debug, Default)]
pub struct HeadlessOverlay {
	pub current: Option<PopupView>,
	pub closing: bool,
	pub mounts: usize,
	/// When set, the next mount fails with this message.
	pub fail_next: Option<String>,
}

impl OverlayRenderer for HeadlessOverlay {
	fn mount(&mut self, view: &PopupView) -> Result<()> {
		if let Some(message) = self.fail_next.take() {
			return Err(SyncError::Render(message));
		}
		self.current = Some(view.clone());
		self.closing = false;
		self.mounts += 1;
		Ok(())
	}

	fn begin_close(&mut self) {
		self.closing = true;
	}

	fn unmount(&mut self) {
		self.current = None;
		self.closing = false;
	}
}

pub struct PopupPresenter {
	renderer: Box<dyn OverlayRenderer>,
	counter: DisplayCounter,
	store: Rc<dyn LocalStore>,
	stats: StatsRecord,
	fade_out: Duration,
	state: PresenterState,
	mounted: bool,
}

impl PopupPresenter {
	pub fn new(
		renderer: Box<dyn OverlayRenderer>,
		counter: DisplayCounter,
		store: Rc<dyn LocalStore>,
		stats: StatsRecord,
		fade_out: Duration,
	) -> Self {
		Self {
			renderer,
			counter,
			store,
			stats,
			fade_out,
			state: PresenterState::Unshown,
			mounted: false,
		}
	}

	pub fn state(&self) -> PresenterState {
		self.state
	}

	/// Whether an overlay is attached, including one fading out.
	pub fn has_active_popup(&self) -> bool {
		self.mounted
	}

	pub fn display_count(&self, config: &PopupConfig) -> u32 {
		self.counter.count(&config.cookie_name)
	}

	/// Decides whether to show the popup. Returns the delay after which the
	/// host must call [`PopupPresenter::on_delay_elapsed`], or `None` if the
	/// popup is suppressed.
	pub fn check_and_show(&mut self, config: &PopupConfig) -> Option<Duration> {
		if !config.enabled {
			debug!("popup disabled by global configuration, skipping display");
			self.state = PresenterState::Suppressed(SuppressReason::Disabled);
			return None;
		}

		let count = self.display_count(config);
		debug!("current popup count: {count}/{}", config.max_displays);
		if count >= config.max_displays {
			debug!("maximum popup displays reached, skipping display");
			self.state = PresenterState::Suppressed(SuppressReason::DisplayLimitReached);
			return None;
		}

		debug!("scheduling popup display in {}ms", config.popup_delay);
		self.state = PresenterState::Scheduled;
		Some(config.popup_delay())
	}

	/// The scheduled delay is over: show the popup unless it was disabled in
	/// the meantime.
	pub fn on_delay_elapsed(&mut self, config: &PopupConfig) -> bool {
		if self.state != PresenterState::Scheduled {
			return false;
		}
		if !config.enabled {
			debug!("popup was disabled during delay, cancelling display");
			self.state = PresenterState::Suppressed(SuppressReason::CancelledAtFire);
			return false;
		}
		self.show(config)
	}

	/// Renders the overlay and counts the display. A no-op while an overlay
	/// is already attached or when the popup is disabled.
	pub fn show(&mut self, config: &PopupConfig) -> bool {
		if self.mounted {
			debug!("popup already exists, skipping display");
			return false;
		}
		if !config.enabled {
			debug!("popup disabled during show attempt, aborting");
			return false;
		}

		debug!("creating popup with price {}", config.price_label());
		if let Err(e) = self.renderer.mount(&PopupView::from_config(config)) {
			error!("error creating popup: {e}");
			self.state = PresenterState::Suppressed(SuppressReason::RenderFailed);
			return false;
		}
		self.mounted = true;
		self.state = PresenterState::Shown;

		if let Err(e) = self
			.counter
			.increment(&config.cookie_name, config.cookie_expire_days)
		{
			error!("error updating display counter: {e}");
		}
		if let Err(e) = self.stats.record_display(&*self.store, config) {
			error!("error updating popup stats: {e}");
		}
		true
	}

	/// Shows the popup regardless of the display limit, leaving the counter
	/// as it was.
	pub fn force_show(&mut self, config: &PopupConfig) -> bool {
		debug!("force showing popup, bypassing frequency control");
		let original = self.display_count(config);
		let shown = self.show(config);
		if let Err(e) = self
			.counter
			.restore(&config.cookie_name, original, config.cookie_expire_days)
		{
			error!("error restoring display counter: {e}");
		}
		shown
	}

	/// Starts closing the overlay. Returns the fade-out delay after which
	/// the host must call [`PopupPresenter::on_fade_out_elapsed`], or `None`
	/// when nothing is shown.
	pub fn close(&mut self, reason: CloseReason) -> Option<Duration> {
		if !self.mounted || self.state != PresenterState::Shown {
			debug!(?reason, "no popup found to close");
			return None;
		}
		debug!(?reason, "closing popup");
		self.renderer.begin_close();
		self.state = PresenterState::Closed;
		Some(self.fade_out)
	}

	pub fn on_fade_out_elapsed(&mut self) {
		if self.mounted && self.state == PresenterState::Closed {
			self.renderer.unmount();
			self.mounted = false;
			debug!("popup removed");
		}
	}

	pub fn reset_count(&self, config: &PopupConfig) -> Result<()> {
		self.counter
			.reset(&config.cookie_name, config.cookie_expire_days)?;
		debug!("popup count reset to 0");
		Ok(())
	}

	/// Removes any overlay immediately, without fading.
	pub fn teardown(&mut self) {
		if self.mounted {
			self.renderer.unmount();
			self.mounted = false;
		}
		if self.state == PresenterState::Shown {
			self.state = PresenterState::Closed;
		}
	}
}
