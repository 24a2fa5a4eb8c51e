//! Waymark prelude: import everything a typical server needs with a single `use`.
//!
//! ```ignore
//! use waymark_core::prelude::*;
//!
//! let server = Server::new("/api/v1", ServerConfig::default())?;
//! server.add_endpoint("/users/:id", "GET", |req: Request| async move {
//!     let id = PathParams::of(&req).get("id").unwrap_or_default().to_string();
//!     Ok::<_, WaymarkError>(Json(serde_json::json!({ "id": id })))
//! })?;
//! ```

// ── Core types ──────────────────────────────────────────────────────────

pub use crate::config::{CorsOptions, RequestLogFormat, SecurityHeaderOptions, ServerConfig};
pub use crate::error::{BoxError, ErrorKind, WaymarkError};
pub use crate::handler::{json_body, BoxedHandler, BoxedMiddleware, Next, PathParams};
pub use crate::legacy::LegacyConfig;
pub use crate::lifecycle::{shutdown_signal, ServerState};
pub use crate::method::HttpMethod;
pub use crate::params::ParamContext;
pub use crate::registry::{OneOrMany, RouteDefinition};
pub use crate::server::Server;

// ── HTTP re-exports ─────────────────────────────────────────────────────

pub use crate::http::{Body, Bytes, HeaderMap, IntoResponse, Json, Request, Response, Router, StatusCode};
pub use crate::http::header::{HeaderName, HeaderValue, Method, CONTENT_TYPE};
