use std::io;
use thiserror::Error;

/// Failures seen by the synchronizer and the presenter.
///
/// Only [`SyncError::StorageUnavailable`] ever aborts anything (page
/// initialization). Every other variant is logged and recovered from by
/// keeping the last known or default configuration.
#[derive(Debug, Error)]
pub enum SyncError {
	/// The persistent local store cannot be written to.
	#[error("local storage unavailable: {0}")]
	StorageUnavailable(#[source] io::Error),

	/// The remote endpoint answered with a non-success status.
	#[error("HTTP {status}: {reason}")]
	HttpStatus { status: u16, reason: String },

	/// The remote endpoint could not be reached at all.
	#[error("network error: {0}")]
	Network(String),

	/// A fetched, cached or broadcast document failed validation.
	#[error("invalid configuration document: {0}")]
	SchemaInvalid(String),

	/// The overlay could not be built.
	#[error("failed to render popup: {0}")]
	Render(String),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
