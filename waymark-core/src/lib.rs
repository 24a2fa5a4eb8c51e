mod compose;
pub mod config;
mod connections;
pub mod error;
pub mod handler;
pub mod http;
pub mod layers;
pub mod legacy;
pub mod lifecycle;
pub mod method;
pub mod middleware;
pub mod observer;
pub mod params;
pub mod prelude;
pub mod registry;
pub mod secure_headers;
pub mod server;

pub use config::{
    ByteSize, ConfigError, CorsOptions, DefaultMiddlewares, HeaderToggle, RequestLogFormat,
    SecurityHeaderOptions, ServerConfig, ShutdownConfig,
};
pub use error::{BoxError, ErrorKind, Result, WaymarkError};
pub use handler::{
    json_body, BoxedHandler, BoxedMiddleware, Handler, HandlerResult, Middleware, Next, PathParams,
};
pub use layers::{catch_panic_layer, cors_layer, init_tracing, init_tracing_json};
pub use legacy::{LegacyConfig, PortValue};
pub use lifecycle::{shutdown_signal, ServerState};
pub use method::{HttpMethod, IntoMethod};
pub use middleware::{LayerFn, CORS_ID, LOGGER_ID, RESERVED_PREFIX, SECURITY_HEADERS_ID};
pub use observer::{Observer, TracingObserver, Warning};
pub use params::{ParamChecker, ParamContext};
pub use registry::{EndpointKey, OneOrMany, RouteDefinition};
pub use secure_headers::SecureHeaders;
pub use server::{Server, ServerInfo};
