use serde::{Deserialize, Deserializer};
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
	pub telemetry: TelemetryConfig,
	pub server: ServerConfig,
	pub storage: StorageConfig,
}

impl AppConfig {
	pub fn new() -> Result<Self, config::ConfigError> {
		use config::Config;
		let s = Config::builder()
			.add_source(config::File::from_str(
				include_str!("defaults.toml"),
				config::FileFormat::Toml,
			))
			.add_source(config::File::with_name("config.toml").required(false))
			.add_source(
				config::Environment::with_prefix("DICOM_DEPOT")
					.prefix_separator("_")
					.separator("__"),
			)
			.build()?;

		s.try_deserialize()
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
	/// Default logging level. `RUST_LOG` directives take precedence.
	#[serde(deserialize_with = "deserialize_level")]
	pub level: Level,
	/// Sentry DSN. Sentry stays disabled if this is not set.
	pub sentry: Option<String>,
}

fn deserialize_level<'de, D>(deserializer: D) -> Result<Level, D::Error>
where
	D: Deserializer<'de>,
{
	let s = String::deserialize(deserializer)?;
	Level::from_str(&s).map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
	pub http: HttpServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
	/// The interface the HTTP server will be listening on
	pub interface: IpAddr,
	/// The port for the HTTP server
	pub port: u16,
	/// Prefix for all routes, e.g. `/depot`
	pub base_path: String,
	/// Maximum size of a request body in bytes
	pub max_upload_size: usize,
	/// Request timeout in seconds
	pub request_timeout: u64,
	pub graceful_shutdown: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
	/// Directory holding the stored datasets. Created on first use.
	pub root: PathBuf,
	/// Upper bound in milliseconds for reading and parsing a stored dataset during a query.
	pub query_timeout: u64,
	/// Accept `application/json` uploads that name a file on the server instead of carrying
	/// the dataset. Any file readable by the server process can be ingested this way.
	pub allow_local_paths: bool,
	/// Serve the attribute query endpoint.
	pub attributes: bool,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_are_valid() {
		let config: AppConfig = config::Config::builder()
			.add_source(config::File::from_str(
				include_str!("defaults.toml"),
				config::FileFormat::Toml,
			))
			.build()
			.unwrap()
			.try_deserialize()
			.unwrap();

		assert_eq!(config.telemetry.level, Level::INFO);
		assert!(config.telemetry.sentry.is_none());
		assert_eq!(config.server.http.port, 8080);
		assert_eq!(config.server.http.base_path, "/");
		assert_eq!(config.storage.root, PathBuf::from("./dicom/out"));
		assert!(!config.storage.allow_local_paths);
		assert!(config.storage.attributes);
	}

	#[test]
	fn overrides_take_precedence() {
		let config: AppConfig = config::Config::builder()
			.add_source(config::File::from_str(
				include_str!("defaults.toml"),
				config::FileFormat::Toml,
			))
			.add_source(config::File::from_str(
				"[telemetry]\nlevel = \"debug\"\n[storage]\nroot = \"/var/lib/depot\"\nallow_local_paths = true",
				config::FileFormat::Toml,
			))
			.build()
			.unwrap()
			.try_deserialize()
			.unwrap();

		assert_eq!(config.telemetry.level, Level::DEBUG);
		assert_eq!(config.storage.root, PathBuf::from("/var/lib/depot"));
		assert!(config.storage.allow_local_paths);
		assert_eq!(config.storage.query_timeout, 10_000);
	}
}
