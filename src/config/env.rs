//! Environment variable loading.

use std::path::PathBuf;

use super::utils::{env_parse, env_var, parse_bool};
use super::{ServerConfig, TlsConfig};

/// Every variable the loader reads.
pub(crate) const ENV_KEYS: &[&str] = &[
    "HOST",
    "PORT",
    "TLS_ENABLED",
    "TLS_CERT_PATH",
    "TLS_KEY_PATH",
    "AWS_REGION",
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_SESSION_TOKEN",
    "BEDROCK_MODEL_ID",
    "VISION_MODEL_ID",
    "AGENT_URL",
    "WEATHER_GEOCODING_URL",
    "WEATHER_FORECAST_URL",
    "EXTERNAL_DATA_TIMEOUT_SECONDS",
    "CORS_ALLOWED_ORIGINS",
    "LOG_LEVEL",
    "LOGLEVEL",
];

/// Build a configuration from the process environment, falling back to defaults.
pub(crate) fn load_from_env() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = ServerConfig::default();

    if let Some(host) = env_var("HOST") {
        config.host = host;
    }
    if let Some(port) = env_parse::<u16>("PORT")? {
        config.port = port;
    }
    config.tls = load_tls_from_env()?;

    if let Some(region) = env_var("AWS_REGION") {
        config.aws_region = region;
    }
    config.aws_access_key_id = env_var("AWS_ACCESS_KEY_ID");
    config.aws_secret_access_key = env_var("AWS_SECRET_ACCESS_KEY");
    config.aws_session_token = env_var("AWS_SESSION_TOKEN");

    if let Some(model_id) = env_var("BEDROCK_MODEL_ID") {
        config.model_id = model_id;
    }
    if let Some(vision_model_id) = env_var("VISION_MODEL_ID") {
        config.vision_model_id = vision_model_id;
    }

    if let Some(agent_url) = env_var("AGENT_URL") {
        config.agent_url = agent_url;
    }
    if let Some(url) = env_var("WEATHER_GEOCODING_URL") {
        config.weather_geocoding_url = url;
    }
    if let Some(url) = env_var("WEATHER_FORECAST_URL") {
        config.weather_forecast_url = url;
    }
    if let Some(seconds) = env_parse::<u64>("EXTERNAL_DATA_TIMEOUT_SECONDS")? {
        config.external_data_timeout_seconds = seconds;
    }

    config.cors_allowed_origins = env_var("CORS_ALLOWED_ORIGINS");

    if let Some(level) = env_var("LOG_LEVEL").or_else(|| env_var("LOGLEVEL")) {
        config.log_level = level.to_lowercase();
    }

    Ok(config)
}

fn load_tls_from_env() -> Result<Option<TlsConfig>, Box<dyn std::error::Error>> {
    let enabled = match env_var("TLS_ENABLED") {
        Some(raw) => parse_bool(&raw)
            .ok_or_else(|| format!("Invalid value for TLS_ENABLED: '{raw}'"))?,
        None => false,
    };
    if !enabled {
        return Ok(None);
    }

    let cert_path = env_var("TLS_CERT_PATH")
        .ok_or("TLS_ENABLED is true but TLS_CERT_PATH is not set")?;
    let key_path =
        env_var("TLS_KEY_PATH").ok_or("TLS_ENABLED is true but TLS_KEY_PATH is not set")?;

    Ok(Some(TlsConfig {
        cert_path: PathBuf::from(cert_path),
        key_path: PathBuf::from(key_path),
    }))
}
