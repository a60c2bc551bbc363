//! Origin-scoped key/value storage.
//!
//! The browser's `localStorage` is the production backend (see the `web`
//! module); [`MemoryStore`] stands in for it on native hosts and in tests.
//! Values are always JSON-encoded documents stored as strings.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{Error, Result};

/// A persistent key/value store shared by every tab of an origin.
///
/// Methods take `&self`: the store is a shared resource mutated without
/// locks, and the last write wins.
pub trait LocalStore {
	/// Returns the raw string stored under `key`, if any.
	fn get_item(&self, key: &str) -> Result<Option<String>>;

	/// Stores `value` under `key`, replacing any previous value.
	fn set_item(&self, key: &str, value: &str) -> Result<()>;

	/// Removes `key`. Removing a missing key is not an error.
	fn remove_item(&self, key: &str) -> Result<()>;
}

/// Reads and decodes the JSON document stored under `key`.
///
/// A missing key yields `Ok(None)`; undecodable content is an error so the
/// caller can decide how to degrade.
pub fn read_json<T: DeserializeOwned>(store: &dyn LocalStore, key: &str) -> Result<Option<T>> {
	match store.get_item(key)? {
		Some(raw) => serde_json::from_str(&raw)
			.map(Some)
			.map_err(|e| Error::other(format!("corrupt value under {key}: {e}"))),
		None => Ok(None),
	}
}

/// Encodes `value` as JSON and stores it under `key`.
pub fn write_json<T: Serialize>(store: &dyn LocalStore, key: &str, value: &T) -> Result<()> {
	let raw = serde_json::to_string(value).map_err(Error::other)?;
	store.set_item(key, &raw)
}

/// An in-memory [`LocalStore`].
///
/// Clones are independent copies; share one instance through an `Rc` to
/// simulate several tabs of the same origin.
#[derive(Debug, Default)]
pub struct MemoryStore {
	items: RefCell<HashMap<String, String>>,
	read_only: bool,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// A store that rejects every write, like `localStorage` in some
	/// private-browsing modes.
	pub fn read_only() -> Self {
		Self {
			items: RefCell::default(),
			read_only: true,
		}
	}

	pub fn len(&self) -> usize {
		self.items.borrow().len()
	}

	pub fn is_empty(&self) -> bool {
		self.items.borrow().is_empty()
	}
}

impl LocalStore for MemoryStore {
	fn get_item(&self, key: &str) -> Result<Option<String>> {
		Ok(self.items.borrow().get(key).cloned())
	}

	fn set_item(&self, key: &str, value: &str) -> Result<()> {
		if self.read_only {
			return Err(Error::other("store is read-only"));
		}
		self.items.borrow_mut().insert(key.to_string(), value.to_string());
		Ok(())
	}

	fn remove_item(&self, key: &str) -> Result<()> {
		if self.read_only {
			return Err(Error::other("store is read-only"));
		}
		self.items.borrow_mut().remove(key);
		Ok(())
	}
}
