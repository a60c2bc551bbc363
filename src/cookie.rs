//! Cookie access and the display counter kept in a cookie.

use crate::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Result;
use std::rc::Rc;

/// Cookies of the current document.
pub trait CookieJar {
	/// Returns the value of cookie `name`, if set and not expired.
	fn get(&self, name: &str) -> Result<Option<String>>;

	/// Sets cookie `name` on path `/`, expiring at `expires`.
	fn set(&self, name: &str, value: &str, expires: DateTime<Utc>) -> Result<()>;
}

/// Finds cookie `name` in a `document.cookie` style header
/// (`a=1; b=2`).
pub fn parse_cookie(header: &str, name: &str) -> Option<String> {
	header.split(';').find_map(|pair| {
		let (key, value) = pair.trim_start().split_once('=')?;
		(key == name).then(|| value.to_string())
	})
}

/// Formats the string assigned to `document.cookie` to set one cookie.
pub fn format_cookie(name: &str, value: &str, expires: DateTime<Utc>) -> String {
	format!(
		"{name}={value};expires={};path=/",
		expires.format("%a, %d %b %Y %H:%M:%S GMT")
	)
}

/// An in-memory [`CookieJar`] that honours expiry against a [`Clock`].
pub struct MemoryCookieJar {
	clock: Rc<dyn Clock>,
	cookies: RefCell<HashMap<String, (String, DateTime<Utc>)>>,
}

impl MemoryCookieJar {
	pub fn new(clock: Rc<dyn Clock>) -> Self {
		Self {
			clock,
			cookies: RefCell::default(),
		}
	}

	/// Sets a raw value directly, bypassing the counter logic.
	pub fn insert(&self, name: &str, value: &str) {
		let expires = self.clock.now() + Duration::days(365);
		self.cookies
			.borrow_mut()
			.insert(name.to_string(), (value.to_string(), expires));
	}
}

impl CookieJar for MemoryCookieJar {
	fn get(&self, name: &str) -> Result<Option<String>> {
		let now = self.clock.now();
		let mut cookies = self.cookies.borrow_mut();
		match cookies.get(name) {
			Some((_, expires)) if *expires <= now => {
				cookies.remove(name);
				Ok(None)
			}
			Some((value, _)) => Ok(Some(value.clone())),
			None => Ok(None),
		}
	}

	fn set(&self, name: &str, value: &str, expires: DateTime<Utc>) -> Result<()> {
		self.cookies
			.borrow_mut()
			.insert(name.to_string(), (value.to_string(), expires));
		Ok(())
	}
}

/// How many times the popup has been shown to this browser.
///
/// The count is stored as a decimal string in one cookie. It only grows,
/// except through [`DisplayCounter::reset`] and [`DisplayCounter::restore`].
pub struct DisplayCounter {
	jar: Rc<dyn CookieJar>,
	clock: Rc<dyn Clock>,
}

impl DisplayCounter {
	pub fn new(jar: Rc<dyn CookieJar>, clock: Rc<dyn Clock>) -> Self {
		Self { jar, clock }
	}

	/// Current count for cookie `name`.
	///
	/// Missing, unreadable or non-numeric cookies count as zero, so a broken
	/// cookie never hides the promotion.
	pub fn count(&self, name: &str) -> u32 {
		match self.jar.get(name) {
			Ok(Some(raw)) => raw.trim().parse().unwrap_or(0),
			Ok(None) => 0,
			Err(e) => {
				tracing::warn!("error reading cookie {name}: {e}");
				0
			}
		}
	}

	/// Adds one and returns the new count.
	pub fn increment(&self, name: &str, expire_days: u32) -> Result<u32> {
		let next = self.count(name).saturating_add(1);
		self.write(name, next, expire_days)?;
		Ok(next)
	}

	/// Sets the count back to zero.
	pub fn reset(&self, name: &str, expire_days: u32) -> Result<()> {
		self.write(name, 0, expire_days)
	}

	/// Puts back a count read earlier with [`DisplayCounter::count`].
	pub fn restore(&self, name: &str, count: u32, expire_days: u32) -> Result<()> {
		self.write(name, count, expire_days)
	}

	fn write(&self, name: &str, count: u32, expire_days: u32) -> Result<()> {
		let expires = self.clock.now() + Duration::days(i64::from(expire_days));
		self.jar.set(name, &count.to_string(), expires)
	}
}
