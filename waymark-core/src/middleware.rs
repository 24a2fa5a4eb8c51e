//! Middleware chain: ordered `id → middleware` mapping.
//!
//! Two kinds of entries share one ordering:
//!
//! - request middlewares ([`Middleware`](crate::handler::Middleware)), wrapped
//!   into the engine with `axum::middleware::from_fn`;
//! - layer functions (`Fn(Router) -> Router`), for tower layers such as
//!   tower-http's `CorsLayer`.
//!
//! The default middlewares occupy reserved ids under the `waymark:` prefix.

use std::sync::Arc;

use crate::error::{Result, WaymarkError};
use crate::handler::BoxedMiddleware;
use crate::http::Router;

/// Prefix reserved for the built-in middlewares.
pub const RESERVED_PREFIX: &str = "waymark:";

/// Request logging (tower-http `TraceLayer`).
pub const LOGGER_ID: &str = "waymark:logger";
/// Security response headers.
pub const SECURITY_HEADERS_ID: &str = "waymark:security-headers";
/// Cross-origin policy (tower-http `CorsLayer`).
pub const CORS_ID: &str = "waymark:cors";

/// A function applying a tower layer to the router.
pub type LayerFn = Arc<dyn Fn(Router) -> Router + Send + Sync>;

#[derive(Clone)]
pub(crate) enum MiddlewareKind {
    Request(BoxedMiddleware),
    Layer(LayerFn),
}

#[derive(Clone)]
pub(crate) struct MiddlewareEntry {
    pub(crate) id: String,
    pub(crate) kind: MiddlewareKind,
}

#[derive(Default, Clone)]
pub(crate) struct MiddlewareChain {
    entries: Vec<MiddlewareEntry>,
}

impl MiddlewareChain {
    pub(crate) fn iter(&self) -> impl Iterator<Item = &MiddlewareEntry> {
        self.entries.iter()
    }

    pub(crate) fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    /// Insert or overwrite in place. Returns `true` when an entry was replaced.
    pub(crate) fn insert(&mut self, id: String, kind: MiddlewareKind) -> bool {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.kind = kind;
                true
            }
            None => {
                self.entries.push(MiddlewareEntry { id, kind });
                false
            }
        }
    }
}

/// Validate a user-supplied middleware id.
pub(crate) fn validate_id(id: &str) -> Result<String> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(WaymarkError::middleware("middleware id must not be empty"));
    }
    if trimmed.starts_with(RESERVED_PREFIX) {
        return Err(WaymarkError::middleware(format!(
            "middleware id '{trimmed}' uses the reserved '{RESERVED_PREFIX}' prefix"
        ))
        .with_context(serde_json::json!({ "id": trimmed })));
    }
    Ok(trimmed.to_string())
}
