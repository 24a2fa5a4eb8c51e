use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::net::TcpListener;
use tracing::info;

use crate::compose::{compose, ComposeInput};
use crate::config::{RequestLogFormat, ServerConfig};
use crate::error::{Result, WaymarkError};
use crate::handler::{BoxedHandler, BoxedMiddleware, Handler, Middleware};
use crate::http::Router;
use crate::layers::{apply_trace_layer, cors_layer};
use crate::lifecycle::{Runtime, ServerState};
use crate::method::IntoMethod;
use crate::middleware::{
    validate_id, MiddlewareChain, MiddlewareKind, CORS_ID, LOGGER_ID, SECURITY_HEADERS_ID,
};
use crate::observer::{Observer, TracingObserver, Warning};
use crate::params::{validate_name, ParamChecker, ParamRegistry};
use crate::registry::{
    pair_endpoints, Endpoint, EndpointKey, Inserted, RouteDefinition, RoutePath, RouteRegistry,
};
use crate::secure_headers::SecureHeaders;

/// Snapshot returned by [`Server::server_info`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    /// The bound port while running, the configured port otherwise.
    pub port: u16,
    pub hostname: String,
    pub main_end_point: String,
    pub is_running: bool,
}

struct Inner {
    state: ServerState,
    routes: RouteRegistry,
    middlewares: MiddlewareChain,
    params: ParamRegistry,
    runtime: Option<Arc<Runtime>>,
}

impl Inner {
    /// Registries are frozen from `start` until the server is stopped again.
    fn ensure_mutable(&self) -> Result<()> {
        if self.state.is_idle() {
            Ok(())
        } else {
            Err(WaymarkError::server(format!(
                "registry frozen: cannot modify a {} server",
                self.state
            ))
            .with_context(serde_json::json!({ "state": self.state })))
        }
    }
}

/// An HTTP server: endpoint registry, middleware chain, parameter checkers
/// and the start/stop lifecycle.
///
/// ```ignore
/// let server = Server::new("/api/v1", ServerConfig::default())?;
/// server.add_endpoint("/", "GET", |_req: Request| async {
///     Ok::<_, WaymarkError>(Json(json!({ "message": "Hello World!" })))
/// })?;
/// let addr = server.start().await?;
/// // ...
/// server.stop().await?;
/// ```
///
/// All methods take `&self`; share the server across tasks with an `Arc`.
pub struct Server {
    prefix: String,
    config: ServerConfig,
    observer: Arc<dyn Observer>,
    inner: Mutex<Inner>,
}

impl Server {
    /// Create a server mounted under `main_prefix`.
    ///
    /// Fails with an `Initialization` error when the prefix does not start
    /// with `/` or contains path parameters, and with a `Middleware` error
    /// when the default CORS options are unusable.
    pub fn new(main_prefix: impl Into<String>, config: ServerConfig) -> Result<Self> {
        let prefix = validate_prefix(main_prefix.into())?;
        let mut middlewares = MiddlewareChain::default();
        if config.use_default_middlewares {
            install_defaults(&mut middlewares, &config)?;
        }

        Ok(Self {
            prefix,
            config,
            observer: Arc::new(TracingObserver),
            inner: Mutex::new(Inner {
                state: ServerState::Idle,
                routes: RouteRegistry::default(),
                middlewares,
                params: ParamRegistry::default(),
                runtime: None,
            }),
        })
    }

    /// Replace the default [`TracingObserver`].
    pub fn with_observer(mut self, observer: impl Observer) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transition(&self, inner: &mut Inner, to: ServerState) {
        let from = std::mem::replace(&mut inner.state, to);
        if from != to {
            self.observer.on_transition(from, to);
        }
    }

    // ── Registration ────────────────────────────────────────────────────

    pub fn add_endpoint<M, H>(&self, path: &str, method: M, handler: H) -> Result<&Self>
    where
        M: IntoMethod,
        H: Handler,
    {
        self.add_endpoint_with_middlewares(path, method, handler, Vec::new())
    }

    /// Register an endpoint whose handler runs behind `middlewares`
    /// (in order, after every global middleware).
    pub fn add_endpoint_with_middlewares<M, H>(
        &self,
        path: &str,
        method: M,
        handler: H,
        middlewares: Vec<BoxedMiddleware>,
    ) -> Result<&Self>
    where
        M: IntoMethod,
        H: Handler,
    {
        let endpoint = Endpoint {
            method: method.into_method()?,
            path: RoutePath::parse(path)?,
            handler: BoxedHandler::new(handler),
            middlewares,
        };
        self.register(vec![endpoint])
    }

    /// Bind `methods[i]` to `handlers[i]` on one path. Nothing is registered
    /// if any pair is invalid.
    pub fn add_multiple_methods<M: IntoMethod>(
        &self,
        path: &str,
        methods: Vec<M>,
        handlers: Vec<BoxedHandler>,
    ) -> Result<&Self> {
        let endpoints = pair_endpoints(path, methods, handlers, Vec::new())?;
        self.register(endpoints)
    }

    /// Register a batch of route definitions. The whole batch is validated
    /// before anything is inserted.
    pub fn add_routes(&self, definitions: Vec<RouteDefinition>) -> Result<&Self> {
        let mut endpoints = Vec::new();
        for definition in definitions {
            endpoints.extend(definition.resolve()?);
        }
        self.register(endpoints)
    }

    fn register(&self, endpoints: Vec<Endpoint>) -> Result<&Self> {
        let mut inner = self.lock();
        inner.ensure_mutable()?;
        inner.routes.check(&endpoints)?;
        for endpoint in endpoints {
            if let Inserted::Replaced(key) = inner.routes.insert(endpoint) {
                self.observer.on_warning(&Warning::EndpointReplaced(key));
            }
        }
        Ok(self)
    }

    /// Append a global middleware. Reusing an id replaces the middleware in
    /// its original position.
    pub fn add_middleware(&self, id: &str, middleware: impl Middleware) -> Result<&Self> {
        let id = validate_id(id)?;
        self.insert_middleware(id, MiddlewareKind::Request(BoxedMiddleware::new(middleware)))
    }

    /// Append a tower layer under `id`, same ordering rules as
    /// [`add_middleware`](Self::add_middleware).
    ///
    /// ```ignore
    /// server.add_layer("timeout", |router| router.layer(TimeoutLayer::new(Duration::from_secs(5))))?;
    /// ```
    pub fn add_layer<F>(&self, id: &str, layer: F) -> Result<&Self>
    where
        F: Fn(Router) -> Router + Send + Sync + 'static,
    {
        let id = validate_id(id)?;
        self.insert_middleware(id, MiddlewareKind::Layer(Arc::new(layer)))
    }

    fn insert_middleware(&self, id: String, kind: MiddlewareKind) -> Result<&Self> {
        let mut inner = self.lock();
        inner.ensure_mutable()?;
        if inner.middlewares.insert(id.clone(), kind) {
            self.observer.on_warning(&Warning::MiddlewareReplaced(id));
        }
        Ok(self)
    }

    pub fn add_param_checker(&self, name: &str, checker: impl ParamChecker) -> Result<&Self> {
        let name = validate_name(name)?;
        let mut inner = self.lock();
        inner.ensure_mutable()?;
        if inner.params.insert(name.clone(), Arc::new(checker)) {
            self.observer.on_warning(&Warning::ParamCheckerReplaced(name));
        }
        Ok(self)
    }

    // ── Observers ───────────────────────────────────────────────────────

    /// Registered endpoints as `"METHOD path"`, in registration order.
    pub fn endpoints(&self) -> Vec<String> {
        self.endpoint_keys().iter().map(ToString::to_string).collect()
    }

    pub fn endpoint_keys(&self) -> Vec<EndpointKey> {
        self.lock().routes.keys()
    }

    /// Global middleware ids in dispatch order.
    pub fn middleware_ids(&self) -> Vec<String> {
        self.lock().middlewares.ids()
    }

    pub fn param_checker_names(&self) -> Vec<String> {
        self.lock().params.names()
    }

    pub fn state(&self) -> ServerState {
        self.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lock().runtime.as_ref().map(|r| r.local_addr())
    }

    pub fn active_connections(&self) -> usize {
        self.lock()
            .runtime
            .as_ref()
            .map_or(0, |r| r.active_connections())
    }

    pub fn server_info(&self) -> ServerInfo {
        let inner = self.lock();
        let bound = inner.runtime.as_ref().map(|r| r.local_addr().port());
        ServerInfo {
            port: bound.unwrap_or(self.config.port),
            hostname: self.config.hostname.clone(),
            main_end_point: self.prefix.clone(),
            is_running: inner.state.is_running(),
        }
    }

    /// Compose the dispatch pipeline without binding a socket.
    pub fn build_router(&self) -> Router {
        let inner = self.lock();
        self.compose_locked(&inner)
    }

    fn compose_locked(&self, inner: &Inner) -> Router {
        compose(ComposeInput {
            prefix: &self.prefix,
            config: &self.config,
            routes: &inner.routes,
            middlewares: &inner.middlewares,
            params: &inner.params,
            observer: self.observer.clone(),
        })
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Compose the pipeline, bind `hostname:port` and start accepting.
    ///
    /// Returns the bound address (useful with port `0`). On bind failure the
    /// state rolls back and the `io::Error` is the error's `source()`.
    pub async fn start(&self) -> Result<SocketAddr> {
        let (router, previous) = {
            let mut inner = self.lock();
            if !inner.state.is_idle() {
                return Err(state_error("start", inner.state));
            }
            let previous = inner.state;
            self.transition(&mut inner, ServerState::Starting);
            (self.compose_locked(&inner), previous)
        };

        let hostname = self.config.hostname.as_str();
        let port = self.config.port;
        let bound = match TcpListener::bind((hostname, port)).await {
            Ok(listener) => Runtime::spawn(listener, router),
            Err(e) => Err(e),
        };
        let runtime = match bound {
            Ok(runtime) => runtime,
            Err(e) => {
                let mut inner = self.lock();
                self.transition(&mut inner, previous);
                return Err(WaymarkError::server(format!(
                    "failed to bind {hostname}:{port}: {e}"
                ))
                .with_context(serde_json::json!({ "hostname": hostname, "port": port }))
                .with_source(e));
            }
        };

        let addr = runtime.local_addr();
        {
            let mut inner = self.lock();
            inner.runtime = Some(runtime);
            self.transition(&mut inner, ServerState::Running);
        }
        info!(%addr, prefix = %self.prefix, "Waymark server listening");
        Ok(addr)
    }

    /// Stop accepting, drain open connections and release the port.
    ///
    /// Connections get `shutdown.grace_period` to finish; the rest are
    /// closed. The whole sequence is bounded by `shutdown.timeout`.
    pub async fn stop(&self) -> Result<()> {
        let runtime = {
            let mut inner = self.lock();
            if inner.state != ServerState::Running {
                return Err(state_error("stop", inner.state));
            }
            self.transition(&mut inner, ServerState::Stopping);
            inner.runtime.clone()
        };

        if let Some(runtime) = runtime {
            let shutdown = &self.config.shutdown;
            let drained =
                tokio::time::timeout(shutdown.timeout(), runtime.drain(shutdown.grace_period()))
                    .await;
            if drained.is_err() {
                tracing::warn!(
                    remaining = runtime.active_connections(),
                    "shutdown timeout elapsed, aborting remaining connections"
                );
                runtime.force_close();
            }
            runtime.join_accept().await;
            runtime.clear_connections();
        }

        let mut inner = self.lock();
        // A force_stop during the drain already finished the job.
        if inner.state == ServerState::Stopping {
            inner.runtime = None;
            self.transition(&mut inner, ServerState::Stopped);
        }
        info!("Waymark server stopped");
        Ok(())
    }

    /// Close everything immediately, without a grace period. Valid while
    /// running or while a [`stop`](Self::stop) is draining. The listener is
    /// closed before this returns, so the port can be bound again at once.
    pub fn force_stop(&self) -> Result<()> {
        let runtime = {
            let mut inner = self.lock();
            if !matches!(inner.state, ServerState::Running | ServerState::Stopping) {
                return Err(state_error("force-stop", inner.state));
            }
            let runtime = inner.runtime.take();
            self.transition(&mut inner, ServerState::Stopped);
            runtime
        };
        if let Some(runtime) = runtime {
            runtime.force_close();
        }
        info!("Waymark server force-stopped");
        Ok(())
    }

    pub async fn restart(&self) -> Result<SocketAddr> {
        self.stop().await?;
        self.start().await
    }

    /// Start, wait for `signal`, then stop.
    ///
    /// ```ignore
    /// server.run_until(waymark_core::shutdown_signal()).await?;
    /// ```
    pub async fn run_until<F>(&self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        signal.await;
        self.stop().await
    }
}

fn state_error(operation: &str, state: ServerState) -> WaymarkError {
    WaymarkError::server(format!("cannot {operation}: server is {state}"))
        .with_context(serde_json::json!({ "operation": operation, "state": state }))
}

fn validate_prefix(prefix: String) -> Result<String> {
    let trimmed = prefix.trim();
    let error = |reason: &str| {
        WaymarkError::initialization(format!("invalid main prefix '{trimmed}': {reason}"))
            .with_context(serde_json::json!({ "prefix": trimmed }))
    };
    if !trimmed.starts_with('/') {
        return Err(error("must start with '/'"));
    }
    if trimmed.contains(['{', '}', '*', ':']) {
        return Err(error("must not contain path parameters"));
    }
    if trimmed.contains("//") {
        return Err(error("must not contain empty segments"));
    }
    Ok(trimmed.to_string())
}

fn install_defaults(chain: &mut MiddlewareChain, config: &ServerConfig) -> Result<()> {
    let enabled = &config.default_middlewares;

    if enabled.logger && config.log_format != RequestLogFormat::Off {
        let format = config.log_format;
        chain.insert(
            LOGGER_ID.to_string(),
            MiddlewareKind::Layer(Arc::new(move |router| apply_trace_layer(router, format))),
        );
    }

    if enabled.security_headers {
        let headers = SecureHeaders::from_options(&config.security_headers);
        chain.insert(
            SECURITY_HEADERS_ID.to_string(),
            MiddlewareKind::Layer(headers.into_layer()),
        );
    }

    if enabled.cors {
        let cors = cors_layer(&config.cors)?;
        chain.insert(
            CORS_ID.to_string(),
            MiddlewareKind::Layer(Arc::new(move |router: Router| router.layer(cors.clone()))),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn prefix_validation() {
        assert_eq!(validate_prefix("/api/v1".into()).unwrap(), "/api/v1");
        assert_eq!(validate_prefix("/".into()).unwrap(), "/");
        for bad in ["", "api", "/api/:v", "/a//b"] {
            let err = validate_prefix(bad.into()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Initialization, "prefix {bad:?}");
            assert_eq!(err.code(), "CLASS_INITIALIZATION_ERROR");
        }
    }

    #[test]
    fn defaults_occupy_reserved_ids_in_order() {
        let server = Server::new("/", ServerConfig::default()).unwrap();
        assert_eq!(
            server.middleware_ids(),
            [LOGGER_ID, SECURITY_HEADERS_ID, CORS_ID]
        );
    }

    #[test]
    fn defaults_can_be_disabled() {
        let config = ServerConfig {
            use_default_middlewares: false,
            ..ServerConfig::default()
        };
        let server = Server::new("/", config).unwrap();
        assert!(server.middleware_ids().is_empty());
    }

    #[test]
    fn info_before_start_uses_configured_port() {
        let server = Server::new("/api", ServerConfig::default()).unwrap();
        let info = server.server_info();
        assert_eq!(info.port, 3000);
        assert_eq!(info.hostname, "localhost");
        assert_eq!(info.main_end_point, "/api");
        assert!(!info.is_running);
        assert_eq!(
            serde_json::to_value(&info).unwrap(),
            serde_json::json!({
                "port": 3000,
                "hostname": "localhost",
                "mainEndPoint": "/api",
                "isRunning": false,
            })
        );
    }
}
