//! Validation of the merged configuration.

use url::Url;

use super::ServerConfig;

pub(crate) const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a fully merged configuration.
pub(crate) fn validate(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.port == 0 {
        return Err("port must be non-zero".into());
    }
    if config.external_data_timeout_seconds == 0 {
        return Err("external_data_timeout_seconds must be greater than zero".into());
    }

    validate_url("agent_url", &config.agent_url)?;
    validate_url("weather_geocoding_url", &config.weather_geocoding_url)?;
    validate_url("weather_forecast_url", &config.weather_forecast_url)?;
    validate_tls(config)?;
    validate_log_level(&config.log_level)?;

    Ok(())
}

fn validate_url(key: &str, value: &str) -> Result<(), Box<dyn std::error::Error>> {
    let url = Url::parse(value).map_err(|e| format!("Invalid URL for {key}: '{value}' ({e})"))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(format!("Invalid URL for {key}: unsupported scheme '{scheme}'").into()),
    }
}

fn validate_tls(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let Some(tls) = &config.tls else {
        return Ok(());
    };
    if !tls.cert_path.exists() {
        return Err(format!(
            "TLS certificate file not found: {}",
            tls.cert_path.display()
        )
        .into());
    }
    if !tls.key_path.exists() {
        return Err(format!("TLS key file not found: {}", tls.key_path.display()).into());
    }
    Ok(())
}

fn validate_log_level(level: &str) -> Result<(), Box<dyn std::error::Error>> {
    if LOG_LEVELS.contains(&level) {
        Ok(())
    } else {
        Err(format!(
            "Invalid log_level '{level}': expected one of {}",
            LOG_LEVELS.join(", ")
        )
        .into())
    }
}
