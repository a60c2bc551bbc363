//! Cross-tab messages.
//!
//! A [`Broadcaster`] delivers a message to every other tab of the origin in
//! send order, never back to the sender. [`LocalBus`] is an in-process hub
//! with those semantics for native hosts and tests; the browser's
//! `BroadcastChannel` backs the `web` feature.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::Result;
use std::rc::Rc;

pub const CONFIG_UPDATE: &str = "CONFIG_UPDATE";

/// A message on the sync channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastMessage {
	#[serde(rename = "type")]
	pub kind: String,
	/// A configuration document (at least `{"popup": {...}}`).
	#[serde(default)]
	pub config: Value,
	/// Send time in epoch milliseconds.
	#[serde(default)]
	pub timestamp: i64,
	/// Sender's revision; absent when sent by an older page.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub revision: Option<u64>,
}

impl BroadcastMessage {
	pub fn config_update(config: Value, timestamp: i64, revision: u64) -> Self {
		Self {
			kind: CONFIG_UPDATE.to_string(),
			config,
			timestamp,
			revision: Some(revision),
		}
	}

	pub fn is_config_update(&self) -> bool {
		self.kind == CONFIG_UPDATE
	}
}

/// Sending side of the cross-tab channel.
pub trait Broadcaster {
	fn post(&self, message: &BroadcastMessage) -> Result<()>;

	/// Stops receiving; called on page teardown.
	fn close(&self) {}
}

#[derive(Default)]
struct BusInner {
	next_id: usize,
	inboxes: Vec<(usize, VecDeque<BroadcastMessage>)>,
}

/// An in-process broadcast hub. Each [`BusHandle`] plays one tab.
#[derive(Clone, Default)]
pub struct LocalBus {
	inner: Rc<RefCell<BusInner>>,
}

impl LocalBus {
	pub fn new() -> Self {
		Self::default()
	}

	/// Opens a new endpoint on the bus.
	pub fn join(&self) -> BusHandle {
		let mut inner = self.inner.borrow_mut();
		let id = inner.next_id;
		inner.next_id += 1;
		inner.inboxes.push((id, VecDeque::new()));
		BusHandle {
			id,
			bus: self.clone(),
		}
	}
}

/// One tab's endpoint on a [`LocalBus`]. Clones share the same inbox.
#[derive(Clone)]
pub struct BusHandle {
	id: usize,
	bus: LocalBus,
}

impl BusHandle {
	/// Takes every message delivered to this endpoint, oldest first.
	pub fn drain(&self) -> Vec<BroadcastMessage> {
		let mut inner = self.bus.inner.borrow_mut();
		inner
			.inboxes
			.iter_mut()
			.find(|(id, _)| *id == self.id)
			.map(|(_, inbox)| inbox.drain(..).collect())
			.unwrap_or_default()
	}

	pub fn pending(&self) -> usize {
		let inner = self.bus.inner.borrow();
		inner
			.inboxes
			.iter()
			.find(|(id, _)| *id == self.id)
			.map_or(0, |(_, inbox)| inbox.len())
	}
}

impl Broadcaster for BusHandle {
	fn post(&self, message: &BroadcastMessage) -> Result<()> {
		let mut inner = self.bus.inner.borrow_mut();
		for (id, inbox) in inner.inboxes.iter_mut() {
			if *id != self.id {
				inbox.push_back(message.clone());
			}
		}
		Ok(())
	}

	fn close(&self) {
		self.bus
			.inner
			.borrow_mut()
			.inboxes
			.retain(|(id, _)| *id != self.id);
	}
}
