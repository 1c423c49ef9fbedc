use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key).as_deref() {
        Some("1") | Some("true") | Some("yes") => true,
        Some("0") | Some("false") | Some("no") => false,
        _ => default,
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub storage: StorageConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `FLIGHTDECK_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("FLIGHTDECK_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            storage: StorageConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  server:   bind={}, location={}",
            self.server.bind_addr(),
            self.server.location()
        );
        tracing::info!(
            "  execute:  timeout={}, control_channel_capacity={}",
            self.server
                .execute_timeout()
                .map(|t| format!("{}s", t.as_secs()))
                .unwrap_or_else(|| "none".to_string()),
            self.server.control_channel_capacity
        );
        tracing::info!(
            "  storage:  backend={}, data_dir={}, sample_data={}",
            self.storage.backend,
            self.storage.data_dir.display(),
            self.storage.load_sample_data
        );
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// URI handed to clients in flight endpoints. Derived from host/port when unset.
    pub advertised_location: Option<String>,
    /// Upper bound on a single plan execution, in seconds (0 = unbounded).
    pub execute_timeout_secs: u64,
    pub control_channel_capacity: usize,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_u16(p, "PORT", 8815),
            advertised_location: profiled_env_opt(p, "ADVERTISED_LOCATION"),
            execute_timeout_secs: profiled_env_u64(p, "EXECUTE_TIMEOUT_SECS", 0),
            control_channel_capacity: profiled_env_u64(p, "CONTROL_CHANNEL_CAPACITY", 16)
                .max(1) as usize,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn location(&self) -> String {
        self.advertised_location
            .clone()
            .unwrap_or_else(|| format!("grpc://{}:{}", self.host, self.port))
    }

    pub fn execute_timeout(&self) -> Option<Duration> {
        (self.execute_timeout_secs > 0).then(|| Duration::from_secs(self.execute_timeout_secs))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8815,
            advertised_location: None,
            execute_timeout_secs: 0,
            control_channel_capacity: 16,
        }
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "sql" (embedded relational engine) or "memory" (in-memory table provider).
    pub backend: String,
    pub data_dir: PathBuf,
    /// Load every CSV file under `data_dir` as a dataset at startup.
    pub load_sample_data: bool,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            backend: profiled_env_or(p, "BACKEND", "sql").to_lowercase(),
            data_dir: PathBuf::from(profiled_env_or(p, "DATA_DIR", "resources/data")),
            load_sample_data: profiled_env_bool(p, "LOAD_SAMPLE_DATA", true),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "sql".to_string(),
            data_dir: PathBuf::from("resources/data"),
            load_sample_data: true,
        }
    }
}
