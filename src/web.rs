//! Browser implementations of every seam, and the driver that runs a
//! [`PopupContext`] on the page's event loop.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          page                                │
//! │                                                              │
//! │  BroadcastChannel.onmessage ─┐                               │
//! │  window "storage" ───────────┤                               │
//! │  overlay click / Escape ─────┼──► mpsc ──► drive() ──► PopupContext
//! │  PopupHandle (console) ──────┤                 │             │
//! │  TimeoutFuture ──────────────┘◄── Timer ───────┘             │
//! │                                                              │
//! │  window "pagehide" ──► close channel ──► teardown            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything runs on one thread; events are processed strictly one at a
//! time in arrival order.

use crate::broadcast::{BroadcastMessage, Broadcaster};
use crate::clock::SystemClock;
use crate::config::Settings;
use crate::context::{AdminCommand, Environment, PageEvent, PopupContext, SystemStatus, Timer};
use crate::cookie::{format_cookie, parse_cookie, CookieJar};
use crate::endpoint::{cache_busted, ConfigEndpoint};
use crate::error::SyncError;
use crate::presenter::{CloseReason, OverlayRenderer, PopupView, OVERLAY_ID};
use crate::store::LocalStore;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use gloo_timers::future::TimeoutFuture;
use serde_json::Value;
use std::cell::RefCell;
use std::io::{self, Error};
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{
	BroadcastChannel, Document, Element, Event, Headers, HtmlDocument, KeyboardEvent, MessageEvent,
	Request, RequestInit, Response, Storage, StorageEvent,
};

/// Delay before the overlay gets its "show" class, so the CSS transition runs.
const SHOW_ANIMATION_DELAY_MS: u32 = 100;

fn js_error(context: &str, e: JsValue) -> Error {
	Error::other(format!("{context}: {e:?}"))
}

fn window() -> io::Result<web_sys::Window> {
	web_sys::window().ok_or_else(|| Error::other("No window object"))
}

fn document() -> io::Result<Document> {
	window()?
		.document()
		.ok_or_else(|| Error::other("No document object"))
}

/// [`LocalStore`] over `window.localStorage`.
pub struct WebLocalStore {
	storage: Storage,
}

impl WebLocalStore {
	pub fn new() -> io::Result<Self> {
		let storage = window()?
			.local_storage()
			.map_err(|e| js_error("localStorage error", e))?
			.ok_or_else(|| Error::other("localStorage not available"))?;
		Ok(Self { storage })
	}
}

impl LocalStore for WebLocalStore {
	fn get_item(&self, key: &str) -> io::Result<Option<String>> {
		self.storage
			.get_item(key)
			.map_err(|e| js_error("getItem failed", e))
	}

	fn set_item(&self, key: &str, value: &str) -> io::Result<()> {
		self.storage
			.set_item(key, value)
			.map_err(|e| js_error("setItem failed", e))
	}

	fn remove_item(&self, key: &str) -> io::Result<()> {
		self.storage
			.remove_item(key)
			.map_err(|e| js_error("removeItem failed", e))
	}
}

/// [`CookieJar`] over `document.cookie`.
pub struct WebCookieJar {
	document: HtmlDocument,
}

impl WebCookieJar {
	pub fn new() -> io::Result<Self> {
		let document = document()?
			.dyn_into::<HtmlDocument>()
			.map_err(|_| Error::other("document is not an HTML document"))?;
		Ok(Self { document })
	}
}

impl CookieJar for WebCookieJar {
	fn get(&self, name: &str) -> io::Result<Option<String>> {
		let header = self
			.document
			.cookie()
			.map_err(|e| js_error("cookie read failed", e))?;
		Ok(parse_cookie(&header, name))
	}

	fn set(&self, name: &str, value: &str, expires: DateTime<Utc>) -> io::Result<()> {
		self.document
			.set_cookie(&format_cookie(name, value, expires))
			.map_err(|e| js_error("cookie write failed", e))
	}
}

/// [`Broadcaster`] over a `BroadcastChannel`. Incoming messages are
/// decoded and queued as [`PageEvent::Broadcast`].
pub struct WebBroadcast {
	channel: BroadcastChannel,
	_on_message: Closure<dyn FnMut(MessageEvent)>,
}

impl WebBroadcast {
	pub fn new(name: &str, events: UnboundedSender<PageEvent>) -> io::Result<Self> {
		let channel =
			BroadcastChannel::new(name).map_err(|e| js_error("BroadcastChannel unavailable", e))?;

		let on_message = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
			match decode_message(&event.data()) {
				Ok(message) => {
					let _ = events.unbounded_send(PageEvent::Broadcast(message));
				}
				Err(e) => {
					web_sys::console::warn_1(&format!("Undecodable broadcast message: {e}").into());
				}
			}
		});
		channel.set_onmessage(Some(on_message.as_ref().unchecked_ref()));

		Ok(Self {
			channel,
			_on_message: on_message,
		})
	}
}

fn decode_message(data: &JsValue) -> io::Result<BroadcastMessage> {
	let text = js_sys::JSON::stringify(data)
		.map_err(|e| js_error("JSON.stringify failed", e))?
		.as_string()
		.ok_or_else(|| Error::other("message is not JSON"))?;
	serde_json::from_str(&text).map_err(Error::other)
}

impl Broadcaster for WebBroadcast {
	fn post(&self, message: &BroadcastMessage) -> io::Result<()> {
		let text = serde_json::to_string(message).map_err(Error::other)?;
		let value = js_sys::JSON::parse(&text).map_err(|e| js_error("JSON.parse failed", e))?;
		self.channel
			.post_message(&value)
			.map_err(|e| js_error("postMessage failed", e))
	}

	fn close(&self) {
		self.channel.set_onmessage(None);
		self.channel.close();
	}
}

/// [`OverlayRenderer`] that inserts the overlay markup into `<body>`.
///
/// Clicks on the backdrop or on a `data-dismiss` control and the Escape
/// key are reported as [`PageEvent::Dismiss`].
pub struct DomOverlay {
	document: Document,
	events: UnboundedSender<PageEvent>,
	element: Option<Element>,
	on_click: Option<Closure<dyn FnMut(Event)>>,
	on_keydown: Option<Closure<dyn FnMut(Event)>>,
}

impl DomOverlay {
	pub fn new(events: UnboundedSender<PageEvent>) -> io::Result<Self> {
		Ok(Self {
			document: document()?,
			events,
			element: None,
			on_click: None,
			on_keydown: None,
		})
	}

	fn render_error(context: &str, e: JsValue) -> SyncError {
		SyncError::Render(format!("{context}: {e:?}"))
	}

	/// Wires the dismiss controls of `element` and the Escape key.
	fn listen(
		&self,
		element: &Element,
	) -> crate::Result<(Closure<dyn FnMut(Event)>, Closure<dyn FnMut(Event)>)> {
		let events = self.events.clone();
		let on_click = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
			let Some(target) = event.target().and_then(|t| t.dyn_into::<Element>().ok()) else {
				return;
			};
			let reason = if target.id() == OVERLAY_ID {
				CloseReason::OutsideClick
			} else if target.has_attribute("data-dismiss") {
				CloseReason::Dismissed
			} else {
				return;
			};
			let _ = events.unbounded_send(PageEvent::Dismiss(reason));
		});
		element
			.add_event_listener_with_callback("click", on_click.as_ref().unchecked_ref())
			.map_err(|e| Self::render_error("click listener failed", e))?;

		let events = self.events.clone();
		let on_keydown = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
			let escape = event
				.dyn_ref::<KeyboardEvent>()
				.is_some_and(|key| key.key() == "Escape");
			if escape {
				let _ = events.unbounded_send(PageEvent::Dismiss(CloseReason::EscapeKey));
			}
		});
		self.document
			.add_event_listener_with_callback("keydown", on_keydown.as_ref().unchecked_ref())
			.map_err(|e| Self::render_error("keydown listener failed", e))?;

		Ok((on_click, on_keydown))
	}
}

impl OverlayRenderer for DomOverlay {
	fn mount(&mut self, view: &PopupView) -> crate::Result<()> {
		let body = self
			.document
			.body()
			.ok_or_else(|| SyncError::Render("document has no body".into()))?;
		// Left behind by a page that never unmounted; there is only one overlay
		if let Some(stale) = self.document.get_element_by_id(OVERLAY_ID) {
			stale.remove();
		}
		body.insert_adjacent_html("beforeend", &view.to_html())
			.map_err(|e| Self::render_error("insertAdjacentHTML failed", e))?;
		let element = self
			.document
			.get_element_by_id(OVERLAY_ID)
			.ok_or_else(|| SyncError::Render("overlay element missing after insert".into()))?;

		let (on_click, on_keydown) = match self.listen(&element) {
			Ok(listeners) => listeners,
			Err(e) => {
				element.remove();
				return Err(e);
			}
		};

		let shown = element.clone();
		spawn_local(async move {
			TimeoutFuture::new(SHOW_ANIMATION_DELAY_MS).await;
			if let Err(e) = shown.class_list().add_1("duratile-popup-show") {
				web_sys::console::warn_1(&format!("Failed to show popup: {:?}", e).into());
			}
		});

		self.element = Some(element);
		self.on_click = Some(on_click);
		self.on_keydown = Some(on_keydown);
		Ok(())
	}

	fn begin_close(&mut self) {
		if let Some(element) = &self.element {
			if let Err(e) = element.class_list().add_1("duratile-popup-hide") {
				web_sys::console::warn_1(&format!("Failed to hide popup: {:?}", e).into());
			}
		}
	}

	fn unmount(&mut self) {
		if let Some(on_keydown) = self.on_keydown.take() {
			let _ = self
				.document
				.remove_event_listener_with_callback("keydown", on_keydown.as_ref().unchecked_ref());
		}
		if let Some(element) = self.element.take() {
			element.remove();
		}
		self.on_click = None;
	}
}

/// [`ConfigEndpoint`] over `window.fetch`.
pub struct FetchEndpoint {
	url: String,
}

impl FetchEndpoint {
	pub fn new(url: impl Into<String>) -> Self {
		Self { url: url.into() }
	}

	fn network_error(context: &str, e: JsValue) -> SyncError {
		SyncError::Network(format!("{context}: {e:?}"))
	}

	async fn send(promise: js_sys::Promise) -> crate::Result<Response> {
		let value = JsFuture::from(promise)
			.await
			.map_err(|e| Self::network_error("fetch failed", e))?;
		let response: Response = value
			.dyn_into()
			.map_err(|_| SyncError::Network("fetch did not return a Response".into()))?;
		if !response.ok() {
			return Err(SyncError::HttpStatus {
				status: response.status(),
				reason: response.status_text(),
			});
		}
		Ok(response)
	}

	async fn json_body(response: Response) -> crate::Result<Value> {
		let promise = response
			.text()
			.map_err(|e| Self::network_error("reading body failed", e))?;
		let text = JsFuture::from(promise)
			.await
			.map_err(|e| Self::network_error("reading body failed", e))?
			.as_string()
			.ok_or_else(|| SyncError::Network("response body is not text".into()))?;
		Ok(serde_json::from_str(&text)?)
	}
}

impl ConfigEndpoint for FetchEndpoint {
	async fn fetch(&self, cache_buster: i64) -> crate::Result<Value> {
		let window = window().map_err(|e| SyncError::Network(e.to_string()))?;
		let response = Self::send(window.fetch_with_str(&cache_busted(&self.url, cache_buster))).await?;
		Self::json_body(response).await
	}

	async fn update(&self, changes: &Value) -> crate::Result<Value> {
		let window = window().map_err(|e| SyncError::Network(e.to_string()))?;

		let headers = Headers::new().map_err(|e| Self::network_error("headers", e))?;
		headers
			.set("Content-Type", "application/json")
			.map_err(|e| Self::network_error("headers", e))?;

		let init = RequestInit::new();
		init.set_method("POST");
		init.set_headers(&headers);
		init.set_body(&JsValue::from_str(&serde_json::to_string(changes)?));

		let request = Request::new_with_str_and_init(&self.url, &init)
			.map_err(|e| Self::network_error("request", e))?;
		let response = Self::send(window.fetch_with_request(&request)).await?;

		// The server answers {success, message, config}
		let mut body = Self::json_body(response).await?;
		if body.get("config").is_some() {
			return Ok(body["config"].take());
		}
		Ok(body)
	}
}

/// Console handle of a running popup system.
///
/// Commands are queued behind whatever the page is currently processing.
#[wasm_bindgen]
pub struct PopupHandle {
	events: UnboundedSender<PageEvent>,
	status: Rc<RefCell<Option<SystemStatus>>>,
}

#[wasm_bindgen]
impl PopupHandle {
	/// Last status snapshot as JSON (`null` before initialization).
	#[wasm_bindgen(js_name = getStatus)]
	pub fn status(&self) -> String {
		serde_json::to_string(&*self.status.borrow()).unwrap_or_else(|_| "null".to_string())
	}

	pub fn enable(&self) {
		self.send(AdminCommand::Enable);
	}

	pub fn disable(&self) {
		self.send(AdminCommand::Disable);
	}

	pub fn toggle(&self) {
		self.send(AdminCommand::Toggle);
	}

	#[wasm_bindgen(js_name = updatePrice)]
	pub fn update_price(&self, price: f64) {
		self.send(AdminCommand::UpdatePrice(price));
	}

	pub fn reset(&self) {
		self.send(AdminCommand::ResetCount);
	}

	#[wasm_bindgen(js_name = forceShow)]
	pub fn force_show(&self) {
		self.send(AdminCommand::ForceShow);
	}

	#[wasm_bindgen(js_name = reloadConfig)]
	pub fn reload_config(&self) {
		self.send(AdminCommand::ReloadConfig);
	}

	/// Stops the popup system and removes any overlay.
	pub fn teardown(&self) {
		self.events.close_channel();
	}
}

impl PopupHandle {
	fn send(&self, command: AdminCommand) {
		if self.events.unbounded_send(PageEvent::Admin(command)).is_err() {
			web_sys::console::warn_1(&"Popup system is not running".into());
		}
	}
}

/// Starts the popup system with the production settings.
#[wasm_bindgen(js_name = startPopup)]
pub fn start_popup() -> Result<PopupHandle, JsValue> {
	start(Settings::default()).map_err(|e| {
		web_sys::console::error_1(&format!("Popup system not started: {e}").into());
		JsValue::from_str(&e.to_string())
	})
}

/// Wires the browser seams into a [`PopupContext`] and runs it until the
/// page hides or [`PopupHandle::teardown`] is called.
///
/// Fails when local storage is unavailable. A missing `BroadcastChannel`
/// only disables cross-tab sync.
pub fn start(settings: Settings) -> crate::Result<PopupHandle> {
	let (events, receiver) = unbounded();

	let store = WebLocalStore::new().map_err(SyncError::StorageUnavailable)?;
	let broadcaster: Option<Box<dyn Broadcaster>> =
		match WebBroadcast::new(&settings.channel_name, events.clone()) {
			Ok(channel) => Some(Box::new(channel)),
			Err(e) => {
				web_sys::console::warn_1(
					&format!("{e}, using storage events only").into(),
				);
				None
			}
		};

	let env = Environment {
		store: Rc::new(store),
		cookies: Rc::new(WebCookieJar::new()?),
		clock: Rc::new(SystemClock),
		broadcaster,
		overlay: Box::new(DomOverlay::new(events.clone())?),
	};
	let endpoint = FetchEndpoint::new(settings.config_url.clone());
	let context = PopupContext::new(settings, endpoint, env);

	listen_window_events(&events)?;

	let status = Rc::new(RefCell::new(None));
	spawn_local(drive(context, events.clone(), receiver, status.clone()));
	Ok(PopupHandle { events, status })
}

fn listen_window_events(events: &UnboundedSender<PageEvent>) -> io::Result<()> {
	let window = window()?;

	let sender = events.clone();
	let on_storage = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
		if let Some(key) = event.dyn_ref::<StorageEvent>().and_then(StorageEvent::key) {
			let _ = sender.unbounded_send(PageEvent::StorageChanged(key));
		}
	});
	window
		.add_event_listener_with_callback("storage", on_storage.as_ref().unchecked_ref())
		.map_err(|e| js_error("storage listener failed", e))?;
	on_storage.forget(); // Lives as long as the page

	let sender = events.clone();
	let on_page_hide = Closure::<dyn FnMut(Event)>::new(move |_event: Event| {
		sender.close_channel();
	});
	window
		.add_event_listener_with_callback("pagehide", on_page_hide.as_ref().unchecked_ref())
		.map_err(|e| js_error("pagehide listener failed", e))?;
	on_page_hide.forget();

	Ok(())
}

async fn drive(
	mut context: PopupContext<FetchEndpoint>,
	events: UnboundedSender<PageEvent>,
	mut receiver: UnboundedReceiver<PageEvent>,
	status: Rc<RefCell<Option<SystemStatus>>>,
) {
	match context.init().await {
		Ok(timer) => arm(&events, timer),
		Err(e) => {
			web_sys::console::error_1(&format!("Popup system initialization failed: {e}").into());
			return;
		}
	}
	*status.borrow_mut() = Some(context.status());

	while let Some(event) = receiver.next().await {
		let timer = context.handle(event).await;
		arm(&events, timer);
		*status.borrow_mut() = Some(context.status());
	}

	context.teardown();
	*status.borrow_mut() = Some(context.status());
}

fn arm(events: &UnboundedSender<PageEvent>, timer: Option<Timer>) {
	let Some(timer) = timer else { return };
	let events = events.clone();
	let millis = u32::try_from(timer.after.as_millis()).unwrap_or(u32::MAX);
	spawn_local(async move {
		TimeoutFuture::new(millis).await;
		// The channel is closed once the page is torn down
		let _ = events.unbounded_send(timer.event);
	});
}
