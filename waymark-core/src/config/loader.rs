use std::path::Path;

use super::{ConfigError, ServerConfig};

pub(crate) const PORT_ENV: &str = "WAYMARK_PORT";
pub(crate) const HOSTNAME_ENV: &str = "WAYMARK_HOSTNAME";

pub(crate) fn parse_yaml(content: &str) -> Result<ServerConfig, ConfigError> {
    if content.trim().is_empty() {
        return Ok(ServerConfig::default());
    }
    serde_yaml::from_str(content).map_err(|e| ConfigError::Load(e.to_string()))
}

pub(crate) fn load_yaml_file(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;
    parse_yaml(&content)
}

/// Overlay environment values; `lookup` abstracts `std::env::var` for tests.
pub(crate) fn apply_env(
    mut config: ServerConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ServerConfig, ConfigError> {
    if let Some(port) = lookup(PORT_ENV) {
        config.port = port.trim().parse().map_err(|_| ConfigError::Invalid {
            key: PORT_ENV.to_string(),
            message: format!("'{port}' is not a valid port"),
        })?;
    }
    if let Some(hostname) = lookup(HOSTNAME_ENV) {
        let hostname = hostname.trim();
        if hostname.is_empty() {
            return Err(ConfigError::Invalid {
                key: HOSTNAME_ENV.to_string(),
                message: "hostname must not be empty".to_string(),
            });
        }
        config.hostname = hostname.to_string();
    }
    Ok(config)
}
