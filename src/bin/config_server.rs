//! Serves the shared popup configuration document over HTTP.

use clap::Parser;
use popsync::server::{serve, ServerConfig};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "config-server", about = "Shared popup configuration server")]
struct Args {
	/// Host to bind to
	#[arg(long)]
	host: Option<String>,

	/// Port to listen on
	#[arg(short, long)]
	port: Option<u16>,

	/// JSON file holding the configuration document
	#[arg(short, long)]
	document: Option<PathBuf>,

	/// TOML settings file; flags override its values
	#[arg(short, long)]
	config: Option<PathBuf>,
}

impl Args {
	fn into_config(self) -> Result<ServerConfig, popsync::server::ServerError> {
		let mut config = match &self.config {
			Some(path) => ServerConfig::from_file(path)?,
			None => ServerConfig::default(),
		};

		if self.host.is_some() || self.port.is_some() {
			let (host, port) = config.bind.rsplit_once(':').unwrap_or((config.bind.as_str(), "3000"));
			let host = self.host.as_deref().unwrap_or(host);
			let port = self.port.map(|p| p.to_string()).unwrap_or_else(|| port.to_string());
			config.bind = format!("{host}:{port}");
		}
		if let Some(document) = self.document {
			config.document_path = document;
		}
		Ok(config)
	}
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	tracing_subscriber::registry()
		.with(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| "popsync=info,config_server=info,tower_http=info".into()),
		)
		.with(tracing_subscriber::fmt::layer())
		.init();

	let config = Args::parse().into_config()?;
	tracing::info!(document = %config.document_path.display(), "using configuration document");

	serve(config).await?;
	Ok(())
}
