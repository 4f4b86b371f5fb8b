use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use std::fmt;

#[derive(Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub sled_path: String,
    pub cors_origin: String,
    /// Bearer token for `/api/admin`. Empty disables the admin API.
    pub admin_token: String,
    pub worker: WorkerConfig,
    pub scoring: ScoringEnvConfig,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub is_leader: bool,
    pub batch_cron: String,
    pub collection_cron: String,
    pub enable_priority_trigger: bool,
}

/// Environment overrides layered on top of the scoring defaults or the JSON
/// file named by `SCORING_CONFIG_PATH`.
#[derive(Debug, Clone, Default)]
pub struct ScoringEnvConfig {
    pub config_path: Option<String>,
    pub batch_size: Option<usize>,
    pub jitter_min_ms: Option<u64>,
    pub jitter_max_ms: Option<u64>,
    pub grace_period_minutes: Option<i64>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("enable_file_logs", &self.enable_file_logs)
            .field("log_dir", &self.log_dir)
            .field("sled_path", &self.sled_path)
            .field("cors_origin", &self.cors_origin)
            .field("admin_token", &"***REDACTED***")
            .field("worker", &self.worker)
            .field("scoring", &self.scoring)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 3000_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            sled_path: env_or("SLED_PATH", "./data/scoring.sled"),
            cors_origin: env_or("CORS_ORIGIN", "http://localhost:5173"),
            admin_token: env_or("ADMIN_TOKEN", ""),
            worker: WorkerConfig {
                is_leader: env_or_bool("WORKER_LEADER", true),
                batch_cron: env_or("SCORE_BATCH_CRON", "0 0 * * * *"),
                collection_cron: env_or("COLLECTION_INDEX_CRON", "0 30 * * * *"),
                enable_priority_trigger: env_or_bool("ENABLE_PRIORITY_TRIGGER", true),
            },
            scoring: ScoringEnvConfig {
                config_path: env_opt("SCORING_CONFIG_PATH"),
                batch_size: env_opt_parse("SCORING_BATCH_SIZE"),
                jitter_min_ms: env_opt_parse("SCORING_JITTER_MIN_MS"),
                jitter_max_ms: env_opt_parse("SCORING_JITTER_MAX_MS"),
                grace_period_minutes: env_opt_parse("SCORING_GRACE_PERIOD_MINUTES"),
            },
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    env_opt_parse(key).unwrap_or(default)
}

/// Parsed value of `key`; unparsable values are logged and ignored.
pub fn env_opt_parse<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    let raw = env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(
                key,
                value = %raw,
                "Failed to parse env var, using default"
            );
            None
        }
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
