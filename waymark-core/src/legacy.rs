//! Compatibility surface for the older configuration shape and method names.
//!
//! A legacy document looks like:
//!
//! ```yaml
//! port: "8080"          # number or numeric string
//! hostname: 0.0.0.0
//! middlewares: logger,cors
//! ```
//!
//! It converts to a [`ServerConfig`] and from there takes the same path as
//! any other configuration.

use std::net::SocketAddr;

use serde::Deserialize;

use crate::config::{ConfigError, DefaultMiddlewares, ServerConfig};
use crate::error::{Result, WaymarkError};
use crate::handler::{BoxedHandler, Handler};
use crate::method::IntoMethod;
use crate::server::Server;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LegacyConfig {
    pub port: Option<PortValue>,
    pub hostname: Option<String>,
    /// `"on"`, `"off"`, `"none"`, `"all"`, or a comma list drawn from
    /// `logger`, `cors`, `security-headers`. Absent means `"on"`.
    pub middlewares: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(u16),
    Text(String),
}

impl PortValue {
    fn resolve(&self) -> std::result::Result<u16, ConfigError> {
        match self {
            PortValue::Number(n) => Ok(*n),
            PortValue::Text(s) => s.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "port".to_string(),
                message: format!("'{s}' is not a valid port"),
            }),
        }
    }
}

impl LegacyConfig {
    pub fn from_yaml_str(content: &str) -> std::result::Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| ConfigError::Load(e.to_string()))
    }

    /// Convert to the structured configuration. Unset fields keep the
    /// [`ServerConfig`] defaults.
    pub fn into_config(self) -> std::result::Result<ServerConfig, ConfigError> {
        let mut config = ServerConfig::default();
        if let Some(port) = &self.port {
            config.port = port.resolve()?;
        }
        if let Some(hostname) = self.hostname {
            let hostname = hostname.trim();
            if hostname.is_empty() {
                return Err(ConfigError::Invalid {
                    key: "hostname".to_string(),
                    message: "hostname must not be empty".to_string(),
                });
            }
            config.hostname = hostname.to_string();
        }
        if let Some(flag) = self.middlewares.as_deref() {
            match parse_middleware_flag(flag)? {
                Some(selection) => config.default_middlewares = selection,
                None => config.use_default_middlewares = false,
            }
        }
        Ok(config)
    }
}

/// `None` disables the defaults entirely.
fn parse_middleware_flag(flag: &str) -> std::result::Result<Option<DefaultMiddlewares>, ConfigError> {
    match flag.trim().to_ascii_lowercase().as_str() {
        "on" | "all" | "true" | "default" => return Ok(Some(DefaultMiddlewares::default())),
        "off" | "none" | "false" | "" => return Ok(None),
        _ => {}
    }

    let mut selection = DefaultMiddlewares {
        logger: false,
        security_headers: false,
        cors: false,
    };
    for token in flag.split(',').map(|t| t.trim().to_ascii_lowercase()) {
        match token.as_str() {
            "logger" | "log" => selection.logger = true,
            "cors" => selection.cors = true,
            "security-headers" | "security_headers" | "headers" => {
                selection.security_headers = true
            }
            "" => {}
            other => {
                return Err(ConfigError::Invalid {
                    key: "middlewares".to_string(),
                    message: format!("unknown default middleware '{other}'"),
                })
            }
        }
    }
    Ok(Some(selection))
}

impl Server {
    /// Build a server from a [`LegacyConfig`].
    pub fn from_legacy(main_prefix: impl Into<String>, legacy: LegacyConfig) -> Result<Self> {
        let config = legacy.into_config().map_err(|e| {
            WaymarkError::initialization(format!("invalid legacy configuration: {e}")).with_source(e)
        })?;
        Server::new(main_prefix, config)
    }

    #[deprecated(note = "use `add_endpoint`")]
    pub fn add_route<M: IntoMethod, H: Handler>(
        &self,
        path: &str,
        method: M,
        handler: H,
    ) -> Result<&Self> {
        self.add_endpoint(path, method, handler)
    }

    #[deprecated(note = "use `add_multiple_methods`")]
    pub fn add_route_methods<M: IntoMethod>(
        &self,
        path: &str,
        methods: Vec<M>,
        handlers: Vec<BoxedHandler>,
    ) -> Result<&Self> {
        self.add_multiple_methods(path, methods, handlers)
    }

    #[deprecated(note = "use `start`")]
    pub async fn listen(&self) -> Result<SocketAddr> {
        self.start().await
    }

    #[deprecated(note = "use `stop`")]
    pub async fn close(&self) -> Result<()> {
        self.stop().await
    }

    #[deprecated(note = "use `force_stop`")]
    pub fn kill(&self) -> Result<()> {
        self.force_stop()
    }
}
