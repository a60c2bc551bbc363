use crate::error::Result;
use serde_json::Value;

/// The remote configuration document service.
///
/// `fetch` reads the whole document; `update` sends a partial document
/// (`{"popup": {...}}`) and returns the merged document the service
/// stored.
#[allow(async_fn_in_trait)]
pub trait ConfigEndpoint {
	/// Fetches the document. `cache_buster` goes into the query string so
	/// no intermediate cache answers the request.
	async fn fetch(&self, cache_buster: i64) -> Result<Value>;

	/// Sends a partial document to be merged into the stored one.
	async fn update(&self, changes: &Value) -> Result<Value>;
}

/// Appends the cache-busting query parameter to `url`.
pub fn cache_busted(url: &str, cache_buster: i64) -> String {
	let separator = if url.contains('?') { '&' } else { '?' };
	format!("{url}{separator}t={cache_buster}")
}
