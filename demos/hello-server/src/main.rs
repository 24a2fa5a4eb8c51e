use hello_server::{build_server, ItemStore, API_PREFIX};
use waymark::ServerConfig;

#[tokio::main]
async fn main() {
    waymark::init_tracing();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };
    let api_key = std::env::var("HELLO_API_KEY").unwrap_or_else(|_| "change-me".to_string());

    let server = match build_server(config, ItemStore::default(), api_key) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "failed to assemble server");
            std::process::exit(1);
        }
    };

    for endpoint in server.endpoints() {
        tracing::info!(%endpoint, prefix = API_PREFIX, "route");
    }

    if let Err(e) = server.run_until(waymark::shutdown_signal()).await {
        tracing::error!(error = %e, "server error");
        std::process::exit(1);
    }
}

/// `HELLO_CONFIG` names an optional YAML file; `WAYMARK_PORT` and
/// `WAYMARK_HOSTNAME` override it.
fn load_config() -> Result<ServerConfig, waymark::ConfigError> {
    let config = match std::env::var("HELLO_CONFIG") {
        Ok(path) => ServerConfig::from_yaml_file(path)?,
        Err(_) => ServerConfig::default(),
    };
    config.with_env_overrides()
}
