#![forbid(unsafe_code)]

//! Configuration for the board server: an optional on-disk TOML file
//! supplies defaults, environment variables override it. The environment is
//! authoritative; the file exists so a local/dev run needs no exported vars.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context as _};
use board_domain::Limits;
use serde::Deserialize;
use tracing::info;

/// Default config path: `~/.board_server/config.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".board_server").join("config.toml"))
}

/// Load the server config from TOML and env overrides.
#[allow(dead_code)]
pub fn load_server_config() -> anyhow::Result<ServerConfig> {
	let path = default_config_path()?;
	load_server_config_from_path(&path)
}

/// Same as `load_server_config` but with an explicit config path.
pub fn load_server_config_from_path(path: &Path) -> anyhow::Result<ServerConfig> {
	let file_cfg = read_toml_if_exists(path)
		.with_context(|| format!("read config from {}", path.display()))?
		.unwrap_or_default();

	let mut cfg = ServerConfig::from_file(file_cfg);
	apply_env_overrides(&mut cfg);
	Ok(cfg)
}

/// Board server configuration (v1).
#[derive(Debug, Clone)]
pub struct ServerConfig {
	/// Postgres connection string backing both the snapshot store and the
	/// owner-JWT/invite-resolution queries.
	pub supabase_url: Option<String>,
	/// Shared secret used both as the Postgres credential and as the HS256
	/// key validating Supabase-issued owner JWTs (see DESIGN.md).
	pub supabase_service_role_key: Option<String>,
	/// CSV allow-list for the `Origin` header on WebSocket upgrades; empty permits all.
	pub allowed_origins: String,
	/// Bind address for the WebSocket/HTTP listener.
	pub bind: String,
	/// Optional metrics exporter bind address (host:port); unset disables the exporter.
	pub metrics_bind: Option<String>,
	/// Optional OTLP trace exporter endpoint; unset runs with local structured logging only.
	pub otlp_endpoint: Option<String>,
	/// Runtime-overridable subset of §4.7's limits.
	pub limits: Limits,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self {
			supabase_url: None,
			supabase_service_role_key: None,
			allowed_origins: String::new(),
			bind: "0.0.0.0:8787".to_string(),
			metrics_bind: None,
			otlp_endpoint: None,
			limits: Limits::default(),
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	supabase_url: Option<String>,
	supabase_service_role_key: Option<String>,
	allowed_origins: Option<String>,
	bind: Option<String>,
	metrics_bind: Option<String>,
	otlp_endpoint: Option<String>,

	#[serde(default)]
	limits: FileLimits,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileLimits {
	max_message_bytes: Option<usize>,
	max_objects_per_board: Option<usize>,
	join_timeout_secs: Option<u64>,
	processed_op_ttl_secs: Option<u64>,
	snapshot_op_interval: Option<u64>,
	snapshot_time_ms: Option<u64>,
	snapshot_min_retry_ms: Option<u64>,
	max_ops_per_10s_per_client: Option<u32>,
	max_presence_per_10s_per_client: Option<u32>,
	max_join_attempts_per_minute_per_ip: Option<u32>,
}

impl ServerConfig {
	fn from_file(file: FileConfig) -> Self {
		let defaults = Limits::default();
		let limits = Limits {
			max_message_bytes: file.limits.max_message_bytes.unwrap_or(defaults.max_message_bytes),
			max_objects_per_board: file.limits.max_objects_per_board.unwrap_or(defaults.max_objects_per_board),
			join_timeout_secs: file.limits.join_timeout_secs.unwrap_or(defaults.join_timeout_secs),
			processed_op_ttl_secs: file.limits.processed_op_ttl_secs.unwrap_or(defaults.processed_op_ttl_secs),
			snapshot_op_interval: file.limits.snapshot_op_interval.unwrap_or(defaults.snapshot_op_interval),
			snapshot_time_ms: file.limits.snapshot_time_ms.unwrap_or(defaults.snapshot_time_ms),
			snapshot_min_retry_ms: file.limits.snapshot_min_retry_ms.unwrap_or(defaults.snapshot_min_retry_ms),
			max_ops_per_10s_per_client: file.limits.max_ops_per_10s_per_client.unwrap_or(defaults.max_ops_per_10s_per_client),
			max_presence_per_10s_per_client: file
				.limits
				.max_presence_per_10s_per_client
				.unwrap_or(defaults.max_presence_per_10s_per_client),
			max_join_attempts_per_minute_per_ip: file
				.limits
				.max_join_attempts_per_minute_per_ip
				.unwrap_or(defaults.max_join_attempts_per_minute_per_ip),
		};

		Self {
			supabase_url: file.supabase_url.filter(|s| !s.trim().is_empty()),
			supabase_service_role_key: file.supabase_service_role_key.filter(|s| !s.trim().is_empty()),
			allowed_origins: file.allowed_origins.unwrap_or_default(),
			bind: file.bind.filter(|s| !s.trim().is_empty()).unwrap_or_else(|| ServerConfig::default().bind),
			metrics_bind: file.metrics_bind.filter(|s| !s.trim().is_empty()),
			otlp_endpoint: file.otlp_endpoint.filter(|s| !s.trim().is_empty()),
			limits,
		}
	}
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
	match fs::read_to_string(path) {
		Ok(s) => {
			let cfg: FileConfig = toml::from_str(&s).context("parse TOML")?;
			Ok(Some(cfg))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(anyhow!(e).context("read config file")),
	}
}

fn apply_env_overrides(cfg: &mut ServerConfig) {
	if let Ok(v) = std::env::var("SUPABASE_URL") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.supabase_url = Some(v);
			info!("config: supabase_url overridden by env");
		}
	}

	if let Ok(v) = std::env::var("SUPABASE_SERVICE_ROLE_KEY") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.supabase_service_role_key = Some(v);
			info!("config: supabase_service_role_key overridden by env (value redacted)");
		}
	}

	if let Ok(v) = std::env::var("ALLOWED_ORIGINS") {
		cfg.allowed_origins = v;
		info!(value = %cfg.allowed_origins, "config: allowed_origins overridden by env");
	}

	if let Ok(v) = std::env::var("BOARD_SERVER_BIND") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.bind = v;
			info!(bind = %cfg.bind, "config: bind overridden by env");
		}
	}

	if let Ok(v) = std::env::var("BOARD_SERVER_METRICS_BIND") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.metrics_bind = Some(v);
			info!(bind = %cfg.metrics_bind.as_deref().unwrap_or(""), "config: metrics_bind overridden by env");
		}
	}

	if let Ok(v) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.otlp_endpoint = Some(v);
			info!(endpoint = %v, "config: otlp_endpoint overridden by env");
		}
	}

	apply_limit_override_u64("BOARD_SERVER_JOIN_TIMEOUT_SECS", &mut cfg.limits.join_timeout_secs);
	apply_limit_override_u64("BOARD_SERVER_PROCESSED_OP_TTL_SECS", &mut cfg.limits.processed_op_ttl_secs);
	apply_limit_override_u64("BOARD_SERVER_SNAPSHOT_OP_INTERVAL", &mut cfg.limits.snapshot_op_interval);
	apply_limit_override_u64("BOARD_SERVER_SNAPSHOT_TIME_MS", &mut cfg.limits.snapshot_time_ms);
	apply_limit_override_u64("BOARD_SERVER_SNAPSHOT_MIN_RETRY_MS", &mut cfg.limits.snapshot_min_retry_ms);
	apply_limit_override_usize("BOARD_SERVER_MAX_MESSAGE_BYTES", &mut cfg.limits.max_message_bytes);
	apply_limit_override_usize("BOARD_SERVER_MAX_OBJECTS_PER_BOARD", &mut cfg.limits.max_objects_per_board);
	apply_limit_override_u32("BOARD_SERVER_MAX_OPS_PER_10S_PER_CLIENT", &mut cfg.limits.max_ops_per_10s_per_client);
	apply_limit_override_u32(
		"BOARD_SERVER_MAX_PRESENCE_PER_10S_PER_CLIENT",
		&mut cfg.limits.max_presence_per_10s_per_client,
	);
	apply_limit_override_u32(
		"BOARD_SERVER_MAX_JOIN_ATTEMPTS_PER_MINUTE_PER_IP",
		&mut cfg.limits.max_join_attempts_per_minute_per_ip,
	);
}

fn apply_limit_override_u64(var: &str, field: &mut u64) {
	if let Ok(v) = std::env::var(var) {
		if let Ok(parsed) = v.trim().parse::<u64>() {
			*field = parsed;
			info!(%var, value = parsed, "config: limit overridden by env");
		}
	}
}

fn apply_limit_override_u32(var: &str, field: &mut u32) {
	if let Ok(v) = std::env::var(var) {
		if let Ok(parsed) = v.trim().parse::<u32>() {
			*field = parsed;
			info!(%var, value = parsed, "config: limit overridden by env");
		}
	}
}

fn apply_limit_override_usize(var: &str, field: &mut usize) {
	if let Ok(v) = std::env::var(var) {
		if let Ok(parsed) = v.trim().parse::<usize>() {
			*field = parsed;
			info!(%var, value = parsed, "config: limit overridden by env");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_match_limits_default() {
		let cfg = ServerConfig::from_file(FileConfig::default());
		assert_eq!(cfg.limits, Limits::default());
		assert!(cfg.supabase_url.is_none());
		assert_eq!(cfg.allowed_origins, "");
	}

	#[test]
	fn file_overrides_are_applied() {
		let file = FileConfig {
			bind: Some("127.0.0.1:9000".to_string()),
			limits: FileLimits { max_objects_per_board: Some(10), ..Default::default() },
			..Default::default()
		};
		let cfg = ServerConfig::from_file(file);
		assert_eq!(cfg.bind, "127.0.0.1:9000");
		assert_eq!(cfg.limits.max_objects_per_board, 10);
		assert_eq!(cfg.limits.join_timeout_secs, Limits::default().join_timeout_secs);
	}
}
