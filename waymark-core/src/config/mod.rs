mod loader;
pub mod size;

use std::time::Duration;

use serde::Deserialize;

pub use size::ByteSize;

/// Error type for configuration operations.
#[derive(Debug)]
pub enum ConfigError {
    /// An I/O or YAML parsing error occurred while loading config.
    Load(String),
    /// A value was present but not acceptable.
    Invalid { key: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Load(msg) => write!(f, "Config load error: {msg}"),
            ConfigError::Invalid { key, message } => {
                write!(f, "Invalid config value for '{key}': {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Server configuration.
///
/// Every field has a default, so a YAML document only needs the keys it
/// changes:
///
/// ```yaml
/// port: 8080
/// hostname: 0.0.0.0
/// cors:
///   origins: ["https://app.example.com"]
/// security_headers:
///   content_security_policy: false
/// json_limit: 1mb
/// shutdown:
///   grace_period_ms: 500
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub hostname: String,
    /// Install the logger, security-header and CORS middlewares under their
    /// reserved ids before any user middleware.
    pub use_default_middlewares: bool,
    /// Which defaults to install when `use_default_middlewares` is set.
    pub default_middlewares: DefaultMiddlewares,
    pub cors: CorsOptions,
    pub security_headers: SecurityHeaderOptions,
    pub log_format: RequestLogFormat,
    /// Body limit for `application/json` requests.
    pub json_limit: ByteSize,
    /// Body limit for `application/x-www-form-urlencoded` requests.
    pub url_encoded_limit: ByteSize,
    pub shutdown: ShutdownConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            hostname: "localhost".to_string(),
            use_default_middlewares: true,
            default_middlewares: DefaultMiddlewares::default(),
            cors: CorsOptions::default(),
            security_headers: SecurityHeaderOptions::default(),
            log_format: RequestLogFormat::default(),
            json_limit: ByteSize::kib(100),
            url_encoded_limit: ByteSize::kib(100),
            shutdown: ShutdownConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Parse a YAML document. Missing keys keep their defaults.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        loader::parse_yaml(content)
    }

    /// Load a YAML file. Missing keys keep their defaults.
    pub fn from_yaml_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        loader::load_yaml_file(path.as_ref())
    }

    /// Apply `WAYMARK_PORT` and `WAYMARK_HOSTNAME` from the environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        loader::apply_env(self, |key| std::env::var(key).ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DefaultMiddlewares {
    pub logger: bool,
    pub security_headers: bool,
    pub cors: bool,
}

impl Default for DefaultMiddlewares {
    fn default() -> Self {
        Self {
            logger: true,
            security_headers: true,
            cors: true,
        }
    }
}

/// Cross-origin policy of the `waymark:cors` default middleware.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorsOptions {
    /// Allowed origins. Empty or containing `"*"` allows any origin;
    /// otherwise only listed origins are echoed in
    /// `Access-Control-Allow-Origin`.
    pub origins: Vec<String>,
    pub methods: Vec<String>,
    /// Allowed request headers. Empty mirrors the preflight request.
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_secs: Option<u64>,
}

impl Default for CorsOptions {
    fn default() -> Self {
        Self {
            origins: vec!["*".to_string()],
            methods: ["GET", "HEAD", "PUT", "PATCH", "POST", "DELETE"]
                .into_iter()
                .map(String::from)
                .collect(),
            allowed_headers: Vec::new(),
            exposed_headers: Vec::new(),
            allow_credentials: false,
            max_age_secs: None,
        }
    }
}

impl CorsOptions {
    pub fn allows_any_origin(&self) -> bool {
        self.origins.is_empty() || self.origins.iter().any(|o| o == "*")
    }
}

/// A header family that can be switched off, switched on with its default
/// value, or given an explicit value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum HeaderToggle {
    Enabled(bool),
    Value(String),
}

impl HeaderToggle {
    pub fn resolve(&self, default: &str) -> Option<String> {
        match self {
            HeaderToggle::Enabled(true) => Some(default.to_string()),
            HeaderToggle::Enabled(false) => None,
            HeaderToggle::Value(v) => Some(v.clone()),
        }
    }
}

impl Default for HeaderToggle {
    fn default() -> Self {
        HeaderToggle::Enabled(true)
    }
}

/// Response headers of the `waymark:security-headers` default middleware.
///
/// Each field controls exactly one header family; disabling one leaves the
/// others active.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecurityHeaderOptions {
    pub content_security_policy: HeaderToggle,
    pub cross_origin_opener_policy: HeaderToggle,
    pub cross_origin_resource_policy: HeaderToggle,
    pub referrer_policy: HeaderToggle,
    pub frame_options: HeaderToggle,
    pub permitted_cross_domain_policies: HeaderToggle,
    pub strict_transport_security: bool,
    pub hsts_max_age: u64,
    pub hsts_include_subdomains: bool,
    pub content_type_options: bool,
    pub dns_prefetch_control: bool,
    pub xss_protection: bool,
    pub permissions_policy: Option<String>,
}

impl Default for SecurityHeaderOptions {
    fn default() -> Self {
        Self {
            content_security_policy: HeaderToggle::default(),
            cross_origin_opener_policy: HeaderToggle::default(),
            cross_origin_resource_policy: HeaderToggle::default(),
            referrer_policy: HeaderToggle::default(),
            frame_options: HeaderToggle::default(),
            permitted_cross_domain_policies: HeaderToggle::default(),
            strict_transport_security: true,
            hsts_max_age: 31536000,
            hsts_include_subdomains: true,
            content_type_options: true,
            dns_prefetch_control: true,
            xss_protection: true,
            permissions_policy: None,
        }
    }
}

/// Detail level of the `waymark:logger` request log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestLogFormat {
    /// One span per request with method and URI, response at `INFO`.
    #[default]
    Compact,
    /// Adds request headers to the span and reports latency in microseconds.
    Detailed,
    /// No request logging layer.
    Off,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Time in-flight requests get to finish before sockets are closed.
    pub grace_period_ms: u64,
    /// Hard upper bound on the whole stop sequence.
    pub timeout_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 1_000,
            timeout_ms: 10_000,
        }
    }
}

impl ShutdownConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
