use std::env;
use std::str::FromStr;
use tracing::warn;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_LOG_FILTER: &str = "info";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_MAX_SESSIONS: usize = 1024;
pub const DEFAULT_MAX_UPLOAD_TOTAL_BYTES: usize = 256 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub max_upload_bytes: usize,
    pub max_sessions: usize,
    /// Bytes of uploaded files kept across all sessions.
    pub max_upload_total_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_sessions: DEFAULT_MAX_SESSIONS,
            max_upload_total_bytes: DEFAULT_MAX_UPLOAD_TOTAL_BYTES,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            port: parse_or(&lookup, "PORT", DEFAULT_PORT),
            max_upload_bytes: parse_or(&lookup, "DASHBOARD_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
            max_sessions: parse_or(&lookup, "DASHBOARD_MAX_SESSIONS", DEFAULT_MAX_SESSIONS),
            max_upload_total_bytes: parse_or(
                &lookup,
                "DASHBOARD_MAX_UPLOAD_TOTAL_BYTES",
                DEFAULT_MAX_UPLOAD_TOTAL_BYTES,
            ),
        }
    }
}

/// The `RUST_LOG` directives as given, or `info` when unset or unparsable.
pub fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn parse_or<T: FromStr + Copy>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("ignoring invalid {key}={raw:?}");
            default
        }),
        None => default,
    }
}
