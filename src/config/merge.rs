//! Merging of environment-derived configuration with YAML overrides.

use std::path::PathBuf;

use super::env::load_from_env;
use super::utils::overlay;
use super::yaml::{TlsYaml, YamlConfig};
use super::{ServerConfig, TlsConfig};

/// Load the environment configuration and apply YAML values on top of it.
pub(crate) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = load_from_env()?;
    let Some(yaml) = yaml else {
        return Ok(config);
    };

    if let Some(server) = yaml.server {
        config.host = overlay(config.host.clone(), server.host);
        config.port = overlay(config.port, server.port);
        if let Some(tls) = server.tls {
            config.tls = merge_tls(config.tls.take(), tls)?;
        }
    }

    if let Some(aws) = yaml.aws {
        config.aws_region = overlay(config.aws_region.clone(), aws.region);
        if aws.access_key_id.is_some() {
            config.aws_access_key_id = aws.access_key_id;
        }
        if aws.secret_access_key.is_some() {
            config.aws_secret_access_key = aws.secret_access_key;
        }
        if aws.session_token.is_some() {
            config.aws_session_token = aws.session_token;
        }
    }

    if let Some(model) = yaml.model {
        config.model_id = overlay(config.model_id.clone(), model.id);
        config.vision_model_id = overlay(config.vision_model_id.clone(), model.vision_id);
    }

    if let Some(tools) = yaml.tools {
        config.agent_url = overlay(config.agent_url.clone(), tools.agent_url);
        config.weather_geocoding_url =
            overlay(config.weather_geocoding_url.clone(), tools.weather_geocoding_url);
        config.weather_forecast_url =
            overlay(config.weather_forecast_url.clone(), tools.weather_forecast_url);
        config.external_data_timeout_seconds = overlay(
            config.external_data_timeout_seconds,
            tools.external_data_timeout_seconds,
        );
    }

    if let Some(security) = yaml.security
        && security.cors_allowed_origins.is_some()
    {
        config.cors_allowed_origins = security.cors_allowed_origins;
    }

    if let Some(level) = yaml.logging.and_then(|logging| logging.level) {
        config.log_level = level.to_lowercase();
    }

    Ok(config)
}

/// `enabled: false` switches TLS off. Otherwise the YAML paths override the
/// environment paths, and `enabled: true` requires both paths to end up set.
fn merge_tls(
    base: Option<TlsConfig>,
    yaml: TlsYaml,
) -> Result<Option<TlsConfig>, Box<dyn std::error::Error>> {
    if yaml.enabled == Some(false) {
        return Ok(None);
    }

    let cert_path = yaml
        .cert_path
        .map(PathBuf::from)
        .or_else(|| base.as_ref().map(|tls| tls.cert_path.clone()));
    let key_path = yaml
        .key_path
        .map(PathBuf::from)
        .or_else(|| base.as_ref().map(|tls| tls.key_path.clone()));

    match (cert_path, key_path) {
        (Some(cert_path), Some(key_path)) => Ok(Some(TlsConfig {
            cert_path,
            key_path,
        })),
        (None, _) if yaml.enabled == Some(true) => {
            Err("server.tls.enabled is true but server.tls.cert_path is not set".into())
        }
        (_, None) if yaml.enabled == Some(true) => {
            Err("server.tls.enabled is true but server.tls.key_path is not set".into())
        }
        _ => Ok(base),
    }
}
