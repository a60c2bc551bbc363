use chrono::{DateTime, Duration, Utc};
use std::cell::Cell;

/// Source of wall-clock time for TTL checks, cookie expiry and timestamps.
pub trait Clock {
	fn now(&self) -> DateTime<Utc>;

	/// Current time in epoch milliseconds, the unit used on the wire.
	fn now_millis(&self) -> i64 {
		self.now().timestamp_millis()
	}
}

/// The real clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
	now: Cell<DateTime<Utc>>,
}

impl ManualClock {
	pub fn new(start: DateTime<Utc>) -> Self {
		Self {
			now: Cell::new(start),
		}
	}

	pub fn advance(&self, by: Duration) {
		self.now.set(self.now.get() + by);
	}
}

impl Default for ManualClock {
	fn default() -> Self {
		Self::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default())
	}
}

impl Clock for ManualClock {
	fn now(&self) -> DateTime<Utc> {
		self.now.get()
	}
}
