//! Route registry: ordered `(method, path) → handler chain` mapping.

use std::fmt;

use crate::error::{Result, WaymarkError};
use crate::handler::{BoxedHandler, BoxedMiddleware, Handler};
use crate::method::{HttpMethod, IntoMethod};

/// A parsed endpoint path.
///
/// Accepts both `:name` and `{name}` parameter syntax, and `*rest` /
/// `{*rest}` for a trailing catch-all. `route` is the engine form (always
/// braces) and doubles as the identity of the path: `/users/:id` and
/// `/users/{id}` are the same endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RoutePath {
    raw: String,
    route: String,
    shape: String,
    params: Vec<String>,
}

impl RoutePath {
    pub(crate) fn parse(path: &str) -> Result<Self> {
        let raw = path.trim();
        if raw.is_empty() {
            return Err(WaymarkError::endpoint("endpoint path must not be empty"));
        }
        if !raw.starts_with('/') {
            return Err(endpoint_error(raw, "endpoint path must start with '/'"));
        }

        let segments: Vec<&str> = raw[1..].split('/').collect();
        let mut route = String::with_capacity(raw.len() + 4);
        let mut shape = String::with_capacity(raw.len());
        let mut params: Vec<String> = Vec::new();

        for (i, segment) in segments.iter().enumerate() {
            let is_last = i + 1 == segments.len();
            route.push('/');
            shape.push('/');

            let (name, catch_all) = match parse_param(segment) {
                Some(param) => param,
                None => {
                    if segment.contains(['{', '}', '*', ':']) {
                        return Err(endpoint_error(
                            raw,
                            format!("malformed path segment '{segment}'"),
                        ));
                    }
                    route.push_str(segment);
                    shape.push_str(segment);
                    continue;
                }
            };

            if !is_identifier(name) {
                return Err(endpoint_error(
                    raw,
                    format!("invalid path parameter name '{name}'"),
                ));
            }
            if catch_all && !is_last {
                return Err(endpoint_error(
                    raw,
                    "catch-all parameter must be the last path segment",
                ));
            }
            if params.iter().any(|p| p == name) {
                return Err(endpoint_error(
                    raw,
                    format!("path parameter '{name}' appears more than once"),
                ));
            }

            if catch_all {
                route.push_str(&format!("{{*{name}}}"));
                shape.push_str("{*}");
            } else {
                route.push_str(&format!("{{{name}}}"));
                shape.push_str("{}");
            }
            params.push(name.to_string());
        }

        Ok(Self {
            raw: raw.to_string(),
            route,
            shape,
            params,
        })
    }

    pub(crate) fn raw(&self) -> &str {
        &self.raw
    }

    pub(crate) fn route(&self) -> &str {
        &self.route
    }

    pub(crate) fn params(&self) -> &[String] {
        &self.params
    }

    /// True when both paths agree up to a segment where one has a parameter
    /// and the other a catch-all. The router cannot hold both.
    fn catch_all_overlaps(&self, other: &RoutePath) -> bool {
        for (a, b) in self.shape.split('/').zip(other.shape.split('/')) {
            match (a, b) {
                ("{}", "{*}") | ("{*}", "{}") => return true,
                _ if a == b => continue,
                _ => return false,
            }
        }
        false
    }

    pub(crate) fn has_param(&self, name: &str) -> bool {
        self.params.iter().any(|p| p == name)
    }
}

/// Returns `(name, is_catch_all)` for a parameter segment.
fn parse_param(segment: &str) -> Option<(&str, bool)> {
    if let Some(inner) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        return Some(match inner.strip_prefix('*') {
            Some(name) => (name, true),
            None => (inner, false),
        });
    }
    if let Some(name) = segment.strip_prefix(':') {
        return Some((name, false));
    }
    segment.strip_prefix('*').map(|name| (name, true))
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn endpoint_error(path: &str, message: impl Into<String>) -> WaymarkError {
    WaymarkError::endpoint(message).with_context(serde_json::json!({ "path": path }))
}

/// Public identity of a registered endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointKey {
    pub method: HttpMethod,
    pub path: String,
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

#[derive(Clone)]
pub(crate) struct Endpoint {
    pub(crate) method: HttpMethod,
    pub(crate) path: RoutePath,
    pub(crate) handler: BoxedHandler,
    pub(crate) middlewares: Vec<BoxedMiddleware>,
}

impl Endpoint {
    pub(crate) fn key(&self) -> EndpointKey {
        EndpointKey {
            method: self.method,
            path: self.path.raw().to_string(),
        }
    }

    fn same_slot(&self, other: &Endpoint) -> bool {
        self.method == other.method && self.path.route == other.path.route
    }
}

/// Outcome of inserting one endpoint.
pub(crate) enum Inserted {
    New,
    Replaced(EndpointKey),
}

#[derive(Default, Clone)]
pub(crate) struct RouteRegistry {
    endpoints: Vec<Endpoint>,
}

impl RouteRegistry {
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }

    pub(crate) fn keys(&self) -> Vec<EndpointKey> {
        self.endpoints.iter().map(Endpoint::key).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Check a batch against the registry and itself without mutating.
    ///
    /// The engine cannot hold two routes with the same shape but different
    /// parameter names (`/u/{id}` and `/u/{name}`), so those are rejected here
    /// instead of failing at compose time.
    pub(crate) fn check(&self, batch: &[Endpoint]) -> Result<()> {
        for (i, candidate) in batch.iter().enumerate() {
            let earlier = self.endpoints.iter().chain(batch[..i].iter());
            for existing in earlier {
                if existing.path.shape == candidate.path.shape
                    && existing.path.route != candidate.path.route
                {
                    return Err(WaymarkError::endpoint(format!(
                        "path '{}' conflicts with registered path '{}': same route with different parameter names",
                        candidate.path.raw(),
                        existing.path.raw()
                    ))
                    .with_context(serde_json::json!({
                        "path": candidate.path.raw(),
                        "conflictsWith": existing.path.raw(),
                    })));
                }
                if existing.path.catch_all_overlaps(&candidate.path) {
                    return Err(WaymarkError::endpoint(format!(
                        "path '{}' conflicts with registered path '{}': parameter and catch-all at the same position",
                        candidate.path.raw(),
                        existing.path.raw()
                    ))
                    .with_context(serde_json::json!({
                        "path": candidate.path.raw(),
                        "conflictsWith": existing.path.raw(),
                    })));
                }
            }
        }
        Ok(())
    }

    /// Insert or overwrite in place; the original position is kept.
    pub(crate) fn insert(&mut self, endpoint: Endpoint) -> Inserted {
        match self.endpoints.iter_mut().find(|e| e.same_slot(&endpoint)) {
            Some(slot) => {
                let previous = slot.key();
                *slot = endpoint;
                Inserted::Replaced(previous)
            }
            None => {
                self.endpoints.push(endpoint);
                Inserted::New
            }
        }
    }
}

/// One value or a list of values.
///
/// Used by [`RouteDefinition`] so a definition can carry either a single
/// method/handler or parallel lists of them.
#[derive(Clone)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(v) => vec![v],
            OneOrMany::Many(vs) => vs,
        }
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(values: Vec<T>) -> Self {
        OneOrMany::Many(values)
    }
}

/// Declarative description of one or more endpoints sharing a path.
///
/// ```ignore
/// server.add_routes(vec![
///     RouteDefinition::new("/health", "GET", health),
///     RouteDefinition::multi("/items", ["GET", "POST"], vec![
///         BoxedHandler::new(list_items),
///         BoxedHandler::new(create_item),
///     ]),
/// ])?;
/// ```
pub struct RouteDefinition {
    pub path: String,
    pub methods: OneOrMany<String>,
    pub handlers: OneOrMany<BoxedHandler>,
    pub middlewares: Vec<BoxedMiddleware>,
}

impl RouteDefinition {
    pub fn new(path: impl Into<String>, method: impl Into<String>, handler: impl Handler) -> Self {
        Self {
            path: path.into(),
            methods: OneOrMany::One(method.into()),
            handlers: OneOrMany::One(BoxedHandler::new(handler)),
            middlewares: Vec::new(),
        }
    }

    pub fn multi<M, I>(path: impl Into<String>, methods: I, handlers: Vec<BoxedHandler>) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        Self {
            path: path.into(),
            methods: OneOrMany::Many(methods.into_iter().map(Into::into).collect()),
            handlers: OneOrMany::Many(handlers),
            middlewares: Vec::new(),
        }
    }

    /// Per-route middlewares applied to every endpoint of this definition.
    pub fn with_middlewares(mut self, middlewares: Vec<BoxedMiddleware>) -> Self {
        self.middlewares = middlewares;
        self
    }

    /// Resolve into endpoints, binding `methods[i]` to `handlers[i]`.
    pub(crate) fn resolve(self) -> Result<Vec<Endpoint>> {
        let methods = self.methods.into_vec();
        let handlers = self.handlers.into_vec();
        pair_endpoints(&self.path, methods, handlers, self.middlewares)
    }
}

/// Shared pairing rule for parallel method/handler lists.
pub(crate) fn pair_endpoints<M: IntoMethod>(
    path: &str,
    methods: Vec<M>,
    handlers: Vec<BoxedHandler>,
    middlewares: Vec<BoxedMiddleware>,
) -> Result<Vec<Endpoint>> {
    if methods.is_empty() {
        return Err(WaymarkError::callback(format!(
            "no methods given for path '{path}'"
        )));
    }
    if methods.len() != handlers.len() {
        return Err(WaymarkError::callback(format!(
            "methods and handlers must have the same length for path '{path}' ({} methods, {} handlers)",
            methods.len(),
            handlers.len()
        ))
        .with_context(serde_json::json!({
            "path": path,
            "methods": methods.len(),
            "handlers": handlers.len(),
        })));
    }

    let route = RoutePath::parse(path)?;
    let mut endpoints = Vec::with_capacity(methods.len());
    for (method, handler) in methods.into_iter().zip(handlers) {
        let method = method.into_method()?;
        if endpoints.iter().any(|e: &Endpoint| e.method == method) {
            return Err(WaymarkError::callback(format!(
                "method {method} listed twice for path '{path}'"
            )));
        }
        endpoints.push(Endpoint {
            method,
            path: route.clone(),
            handler,
            middlewares: middlewares.clone(),
        });
    }
    Ok(endpoints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn parses_both_param_syntaxes_to_the_same_route() {
        let colon = RoutePath::parse("/users/:id/posts/:post_id").unwrap();
        let brace = RoutePath::parse("/users/{id}/posts/{post_id}").unwrap();
        assert_eq!(colon.route(), "/users/{id}/posts/{post_id}");
        assert_eq!(colon.route(), brace.route());
        assert_eq!(colon.params(), ["id", "post_id"]);
        assert_eq!(colon.raw(), "/users/:id/posts/:post_id");
    }

    #[test]
    fn parses_catch_all() {
        let p = RoutePath::parse("/files/*rest").unwrap();
        assert_eq!(p.route(), "/files/{*rest}");
        assert!(p.has_param("rest"));
        assert!(RoutePath::parse("/files/*rest/more").is_err());
    }

    #[test]
    fn root_path_is_valid() {
        let p = RoutePath::parse("/").unwrap();
        assert_eq!(p.route(), "/");
        assert!(p.params().is_empty());
    }

    #[test]
    fn rejects_bad_paths() {
        for bad in ["", "   ", "users", "/users/:", "/users/:1id", "/a/{b", "/a/:x/:x", "/a/b:c"] {
            let err = RoutePath::parse(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Endpoint, "path {bad:?}");
        }
    }

    #[test]
    fn catch_all_overlap_only_at_the_same_position() {
        let overlaps = |a: &str, b: &str| {
            RoutePath::parse(a)
                .unwrap()
                .catch_all_overlaps(&RoutePath::parse(b).unwrap())
        };
        assert!(overlaps("/files/:name", "/files/*rest"));
        assert!(overlaps("/files/*rest", "/files/{name}/meta"));
        assert!(!overlaps("/files/readme", "/files/*rest"));
        assert!(!overlaps("/docs/:name", "/files/*rest"));
        assert!(!overlaps("/files/:a/x/:b", "/files/:a/y/*rest"));
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("id"));
        assert!(is_identifier("_x9"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("9x"));
        assert!(!is_identifier("a-b"));
    }
}
