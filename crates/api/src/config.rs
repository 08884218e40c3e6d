use soilwatch_core::env::{parse_or, string_or};

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `4000`).
    pub port: u16,
    /// HTTP request timeout in seconds (default: `30`). Does not apply to
    /// an SSE stream once its headers are sent.
    pub request_timeout_secs: u64,
    /// Upper bound on graceful HTTP shutdown in seconds (default: `10`).
    pub shutdown_timeout_secs: u64,
    /// Interval between SSE keep-alive comments in seconds (default: `15`).
    pub sse_keep_alive_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 4000,
            request_timeout_secs: 30,
            shutdown_timeout_secs: 10,
            sse_keep_alive_secs: 15,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default   |
    /// |-------------------------|-----------|
    /// | `HOST`                  | `0.0.0.0` |
    /// | `PORT`                  | `4000`    |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`      |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `10`      |
    /// | `SSE_KEEP_ALIVE_SECS`   | `15`      |
    ///
    /// Unparsable numbers fall back to the default with a warning.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: string_or("HOST", &defaults.host),
            port: parse_or("PORT", defaults.port),
            request_timeout_secs: parse_or("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs),
            shutdown_timeout_secs: parse_or(
                "SHUTDOWN_TIMEOUT_SECS",
                defaults.shutdown_timeout_secs,
            ),
            sse_keep_alive_secs: parse_or("SSE_KEEP_ALIVE_SECS", defaults.sse_keep_alive_secs)
                .max(1),
        }
    }
}
