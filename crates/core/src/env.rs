//! Environment variable helpers shared by the `from_env` constructors.

use std::fmt::Display;
use std::str::FromStr;

/// Read `key` and parse it, falling back to `default` when the variable is
/// unset, empty, or fails to parse. Parse failures are logged.
pub fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => match raw.trim().parse() {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(value = %raw, error = %e, "Invalid value for {key}, using default {default}");
                default
            }
        },
        _ => default,
    }
}

/// Read `key` as a string, falling back to `default` when unset or empty.
pub fn string_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}
