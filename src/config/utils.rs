//! Parsing helpers shared by the environment and YAML loaders.

use std::str::FromStr;

/// Parse a boolean flag. Accepts `true/false`, `1/0`, `yes/no`, `on/off` in any case.
pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Read an environment variable, treating blank values as unset.
pub(crate) fn env_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read and parse an environment variable, naming the variable in the error.
pub(crate) fn env_parse<T>(key: &str) -> Result<Option<T>, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_var(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid value for {key}: '{raw}' ({e})").into()),
        None => Ok(None),
    }
}

/// Return `override_value` when present, `base` otherwise.
pub(crate) fn overlay<T>(base: T, override_value: Option<T>) -> T {
    override_value.unwrap_or(base)
}
