//! One page's popup system: the synchronizer and the presenter behind a
//! single event entry point.
//!
//! The host (the browser driver in the `web` module, or a test) owns the
//! [`PopupContext`], feeds it [`PageEvent`]s and arms the [`Timer`]s it
//! returns. Nothing here sleeps or spawns.

use crate::broadcast::{BroadcastMessage, Broadcaster};
use crate::clock::Clock;
use crate::config::{PopupConfig, Settings};
use crate::cookie::{CookieJar, DisplayCounter};
use crate::endpoint::ConfigEndpoint;
use crate::error::Result;
use crate::presenter::{CloseReason, OverlayRenderer, PopupPresenter, PresenterState};
use crate::stats::{PriceStats, StatsRecord};
use crate::store::LocalStore;
use crate::sync::{BroadcastOutcome, ConfigSynchronizer};
use serde::Serialize;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, error, info};

/// The page's handles to the outside world.
pub struct Environment {
	pub store: Rc<dyn LocalStore>,
	pub cookies: Rc<dyn CookieJar>,
	pub clock: Rc<dyn Clock>,
	/// `None` when the browser has no broadcast channel.
	pub broadcaster: Option<Box<dyn Broadcaster>>,
	pub overlay: Box<dyn OverlayRenderer>,
}

/// Operator commands exposed on the debug console.
#[derive(Debug, Clone, PartialEq)]
pub enum AdminCommand {
	Enable,
	Disable,
	Toggle,
	UpdatePrice(f64),
	ResetCount,
	ForceShow,
	ReloadConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
	/// The display delay armed by `init` elapsed.
	DelayElapsed,
	/// The fade-out delay armed by a close elapsed.
	FadeOutElapsed,
	Broadcast(BroadcastMessage),
	/// Another tab wrote this local store key.
	StorageChanged(String),
	Dismiss(CloseReason),
	Admin(AdminCommand),
}

/// A delay the host must arm, delivering `event` when it elapses.
#[derive(Debug, Clone, PartialEq)]
pub struct Timer {
	pub after: Duration,
	pub event: PageEvent,
}

impl Timer {
	fn display(after: Duration) -> Self {
		Self {
			after,
			event: PageEvent::DelayElapsed,
		}
	}

	fn fade_out(after: Duration) -> Self {
		Self {
			after,
			event: PageEvent::FadeOutElapsed,
		}
	}
}

/// Snapshot for the debug console.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
	pub is_initialized: bool,
	pub is_enabled: bool,
	pub current_count: u32,
	pub max_displays: u32,
	pub price_data: PriceStats,
	pub has_active_popup: bool,
	pub revision: u64,
	/// Presenter state.
	pub state: PresenterState,
	pub config: PopupConfig,
}

pub struct PopupContext<E> {
	sync: ConfigSynchronizer<E>,
	presenter: PopupPresenter,
	initialized: bool,
	torn_down: bool,
}

impl<E: ConfigEndpoint> PopupContext<E> {
	pub fn new(settings: Settings, endpoint: E, env: Environment) -> Self {
		let presenter = PopupPresenter::new(
			env.overlay,
			DisplayCounter::new(env.cookies, env.clock.clone()),
			env.store.clone(),
			StatsRecord::new(settings.stats_key.clone()),
			settings.fade_out,
		);
		let sync = ConfigSynchronizer::new(settings, endpoint, env.store, env.clock, env.broadcaster);
		Self {
			sync,
			presenter,
			initialized: false,
			torn_down: false,
		}
	}

	/// Page load: loads the configuration and decides whether to schedule
	/// the popup.
	///
	/// Fails only when the local store is unusable, in which case the popup
	/// system stays off for this page.
	pub async fn init(&mut self) -> Result<Option<Timer>> {
		info!("initializing popup system");
		self.sync.validate_storage_access()?;

		let source = self.sync.load().await;
		debug!(?source, "configuration ready");
		self.sync.initialize_default_data();

		let timer = self.presenter.check_and_show(self.sync.config()).map(Timer::display);
		self.initialized = true;
		Ok(timer)
	}

	/// Processes one event. Returns the timer to arm, if any.
	pub async fn handle(&mut self, event: PageEvent) -> Option<Timer> {
		if self.torn_down {
			return None;
		}
		match event {
			PageEvent::DelayElapsed => {
				self.presenter.on_delay_elapsed(self.sync.config());
				None
			}
			PageEvent::FadeOutElapsed => {
				self.presenter.on_fade_out_elapsed();
				None
			}
			PageEvent::Broadcast(message) => match self.sync.receive_broadcast(&message) {
				BroadcastOutcome::Applied { enabled: false } => self.close(CloseReason::RemoteDisable),
				_ => None,
			},
			PageEvent::StorageChanged(key) => {
				self.sync.on_storage_event(&key).await;
				if !self.sync.config().enabled {
					return self.close(CloseReason::RemoteDisable);
				}
				None
			}
			PageEvent::Dismiss(reason) => self.close(reason),
			PageEvent::Admin(command) => self.admin(command).await,
		}
	}

	async fn admin(&mut self, command: AdminCommand) -> Option<Timer> {
		debug!(?command, "admin command");
		match command {
			AdminCommand::Enable => {
				self.sync.set_enabled(true).await;
				None
			}
			AdminCommand::Disable => {
				self.sync.set_enabled(false).await;
				self.close(CloseReason::Dismissed)
			}
			AdminCommand::Toggle => {
				if self.sync.toggle().await {
					None
				} else {
					self.close(CloseReason::Dismissed)
				}
			}
			AdminCommand::UpdatePrice(price) => {
				if let Err(e) = self.sync.set_price(price).await {
					error!("error updating price: {e}");
				}
				None
			}
			AdminCommand::ResetCount => {
				if let Err(e) = self.presenter.reset_count(self.sync.config()) {
					error!("error resetting popup count: {e}");
				}
				None
			}
			AdminCommand::ForceShow => {
				self.presenter.force_show(self.sync.config());
				None
			}
			AdminCommand::ReloadConfig => {
				self.sync.load().await;
				None
			}
		}
	}

	fn close(&mut self, reason: CloseReason) -> Option<Timer> {
		self.presenter.close(reason).map(Timer::fade_out)
	}

	/// Page unload: removes the overlay and leaves the broadcast channel.
	pub fn teardown(&mut self) {
		if self.torn_down {
			return;
		}
		self.presenter.teardown();
		self.sync.close();
		self.torn_down = true;
		debug!("popup system torn down");
	}

	pub fn is_initialized(&self) -> bool {
		self.initialized
	}

	pub fn is_torn_down(&self) -> bool {
		self.torn_down
	}

	pub fn config(&self) -> &PopupConfig {
		self.sync.config()
	}

	pub fn synchronizer(&self) -> &ConfigSynchronizer<E> {
		&self.sync
	}

	pub fn presenter(&self) -> &PopupPresenter {
		&self.presenter
	}

	pub fn status(&self) -> SystemStatus {
		let config = self.sync.config();
		SystemStatus {
			is_initialized: self.initialized,
			is_enabled: config.enabled,
			current_count: self.presenter.display_count(config),
			max_displays: config.max_displays,
			price_data: self.sync.stats().read(self.sync.store(), config),
			has_active_popup: self.presenter.has_active_popup(),
			revision: self.sync.revision(),
			state: self.presenter.state(),
			config: config.clone(),
		}
	}
}
