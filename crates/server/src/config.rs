// Server configuration.
//
// Centralizes environment variable parsing with defaults for local
// development. The CORS module reads its own env var — this module covers
// the core server settings and the engine limits.

use std::net::SocketAddr;
use std::ops::RangeInclusive;

/// Core server configuration.
///
/// Constructed via [`ServerConfig::from_env`] which reads environment
/// variables and falls back to sensible development defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    /// Log filter directive (e.g. `info`, `livepoll_server=debug`).
    pub log_filter: String,
    /// Engine limits (history cap, time-limit bounds).
    pub limits: EngineLimits,
}

/// Bounds and defaults enforced by the session engine.
#[derive(Debug, Clone)]
pub struct EngineLimits {
    /// Maximum concluded polls kept in the history archive.
    pub history_cap: usize,
    /// Applied when a create-poll request's time limit is out of bounds.
    /// Out-of-range values are clamped to this, not rejected.
    pub default_time_limit_secs: u64,
    /// Accepted time-limit range in seconds.
    pub time_limit_bounds_secs: RangeInclusive<u64>,
    /// Display names are truncated to this many characters.
    pub max_name_chars: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            history_cap: 50,
            default_time_limit_secs: 60,
            time_limit_bounds_secs: 10..=300,
            max_name_chars: 64,
        }
    }
}

impl ServerConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `LIVEPOLL_HOST` | `0.0.0.0` |
    /// | `LIVEPOLL_PORT` | `5000` |
    /// | `LIVEPOLL_LOG_FILTER` | `info` |
    /// | `LIVEPOLL_HISTORY_CAP` | `50` |
    /// | `LIVEPOLL_DEFAULT_TIME_LIMIT_SECS` | `60` |
    /// | `LIVEPOLL_MIN_TIME_LIMIT_SECS` | `10` |
    /// | `LIVEPOLL_MAX_TIME_LIMIT_SECS` | `300` |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("LIVEPOLL_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env("LIVEPOLL_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(5000);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let log_filter = env("LIVEPOLL_LOG_FILTER").unwrap_or_else(|_| "info".into());

        let defaults = EngineLimits::default();
        let history_cap = env("LIVEPOLL_HISTORY_CAP")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|cap| *cap > 0)
            .unwrap_or(defaults.history_cap);
        let default_time_limit_secs = env("LIVEPOLL_DEFAULT_TIME_LIMIT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.default_time_limit_secs);
        let min_time_limit_secs = env("LIVEPOLL_MIN_TIME_LIMIT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(*defaults.time_limit_bounds_secs.start());
        let max_time_limit_secs = env("LIVEPOLL_MAX_TIME_LIMIT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|max| *max >= min_time_limit_secs)
            .unwrap_or(*defaults.time_limit_bounds_secs.end());

        Self {
            listen_addr,
            log_filter,
            limits: EngineLimits {
                history_cap,
                default_time_limit_secs,
                time_limit_bounds_secs: min_time_limit_secs..=max_time_limit_secs,
                max_name_chars: defaults.max_name_chars,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from_map(
        map: HashMap<&'static str, &'static str>,
    ) -> impl Fn(&str) -> Result<String, std::env::VarError> {
        move |key: &str| {
            map.get(key).map(|v| v.to_string()).ok_or(std::env::VarError::NotPresent)
        }
    }

    #[test]
    fn defaults_when_no_env_vars() {
        let cfg = ServerConfig::from_env_fn(env_from_map(HashMap::new()));
        assert_eq!(cfg.listen_addr.port(), 5000);
        assert_eq!(cfg.listen_addr.ip().to_string(), "0.0.0.0");
        assert_eq!(cfg.log_filter, "info");
        assert_eq!(cfg.limits.history_cap, 50);
        assert_eq!(cfg.limits.default_time_limit_secs, 60);
        assert_eq!(cfg.limits.time_limit_bounds_secs, 10..=300);
    }

    #[test]
    fn custom_host_and_port() {
        let mut m = HashMap::new();
        m.insert("LIVEPOLL_HOST", "127.0.0.1");
        m.insert("LIVEPOLL_PORT", "3000");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:3000");
    }

    #[test]
    fn unparseable_port_falls_back_to_default() {
        let mut m = HashMap::new();
        m.insert("LIVEPOLL_PORT", "not-a-port");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.listen_addr.port(), 5000);
    }

    #[test]
    fn history_cap_of_zero_is_rejected() {
        let mut m = HashMap::new();
        m.insert("LIVEPOLL_HISTORY_CAP", "0");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.limits.history_cap, 50);
    }

    #[test]
    fn custom_time_limit_bounds() {
        let mut m = HashMap::new();
        m.insert("LIVEPOLL_MIN_TIME_LIMIT_SECS", "5");
        m.insert("LIVEPOLL_MAX_TIME_LIMIT_SECS", "120");
        m.insert("LIVEPOLL_DEFAULT_TIME_LIMIT_SECS", "30");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.limits.time_limit_bounds_secs, 5..=120);
        assert_eq!(cfg.limits.default_time_limit_secs, 30);
    }

    #[test]
    fn inverted_time_limit_bounds_keep_default_max() {
        let mut m = HashMap::new();
        m.insert("LIVEPOLL_MIN_TIME_LIMIT_SECS", "30");
        m.insert("LIVEPOLL_MAX_TIME_LIMIT_SECS", "20");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.limits.time_limit_bounds_secs, 30..=300);
    }
}
