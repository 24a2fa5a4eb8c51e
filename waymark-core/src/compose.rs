//! Dispatch composer: turns the frozen registries into an axum [`Router`].
//!
//! Stage order, outermost first:
//!
//! 1. panic guard
//! 2. global middlewares and layers, registration order (defaults first)
//! 3. panic guard
//! 4. body limit
//! 5. route match, or the 404 listing fallback
//! 6. parameter checkers of the matched route
//! 7. per-route middlewares, then the handler
//!
//! Errors raised in stages 2, 6 and 7 go through [`render_error`].
//!
//! An unregistered method on a known path is not a separate case: it gets
//! the same 404 listing as an unknown path, with code `ENDPOINT_ERROR`.
//! `METHOD_ERROR` only comes from registering an unrecognized verb.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::routing::MethodRouter;
use http_body_util::Limited;

use crate::config::ServerConfig;
use crate::error::{internal_error_response, is_length_limit, BoxError, ErrorKind, WaymarkError};
use crate::handler::{BoxedHandler, BoxedMiddleware, HandlerResult, Middleware, Next, PathParams};
use crate::http::{
    Body, IntoResponse, Json, Method, RawPathParams, Request, Response, Router, StatusCode,
    CONTENT_LENGTH, CONTENT_TYPE,
};
use crate::layers::catch_panic_layer;
use crate::middleware::{MiddlewareChain, MiddlewareKind};
use crate::observer::Observer;
use crate::params::{ParamContext, ParamRegistry, SharedChecker};
use crate::registry::{Endpoint, RouteRegistry};

/// Everything the composer reads. Borrowed from the server while its state
/// lock is held.
pub(crate) struct ComposeInput<'a> {
    pub(crate) prefix: &'a str,
    pub(crate) config: &'a ServerConfig,
    pub(crate) routes: &'a RouteRegistry,
    pub(crate) middlewares: &'a MiddlewareChain,
    pub(crate) params: &'a ParamRegistry,
    pub(crate) observer: Arc<dyn Observer>,
}

pub(crate) fn compose(input: ComposeInput<'_>) -> Router {
    let listing: Arc<[String]> = input.routes.keys().iter().map(ToString::to_string).collect();
    let mount = mount_prefix(input.prefix);

    let mut router = Router::new();
    for group in group_by_route(input.routes) {
        let mut method_router: MethodRouter = MethodRouter::new();
        for endpoint in &group {
            let pipeline = Arc::new(EndpointPipeline::new(
                endpoint,
                input.params,
                input.observer.clone(),
            ));
            method_router = method_router.on(endpoint.method.filter(), move |req: Request| {
                let pipeline = pipeline.clone();
                async move { pipeline.dispatch(req).await }
            });
        }
        method_router = method_router.fallback(not_found_handler(listing.clone()));

        let path = group[0].path.route();
        if path == "/" && !mount.is_empty() {
            router = router.route(mount, method_router.clone());
        }
        router = router.route(&format!("{mount}{path}"), method_router);
    }
    router = router.fallback(not_found_handler(listing));

    let limits = BodyLimits {
        json: input.config.json_limit.as_usize(),
        url_encoded: input.config.url_encoded_limit.as_usize(),
    };
    router = router
        .layer(axum::middleware::from_fn(
            move |req: Request, next: axum::middleware::Next| limit_body(limits, req, next),
        ))
        .layer(catch_panic_layer());

    // Applied innermost first, so the first registered entry ends up outermost.
    let entries: Vec<_> = input.middlewares.iter().collect();
    for entry in entries.into_iter().rev() {
        router = match &entry.kind {
            MiddlewareKind::Layer(apply) => apply(router),
            MiddlewareKind::Request(middleware) => {
                wrap_request_middleware(router, middleware.clone(), input.observer.clone())
            }
        };
    }

    // Covers panics raised by global middlewares themselves.
    router.layer(catch_panic_layer())
}

/// `"/"` and `""` mount at the root; a trailing `/` is dropped.
fn mount_prefix(prefix: &str) -> &str {
    prefix.trim_end_matches('/')
}

/// Endpoints grouped by engine route, in first-registration order.
fn group_by_route(routes: &RouteRegistry) -> Vec<Vec<&Endpoint>> {
    let mut groups: Vec<Vec<&Endpoint>> = Vec::new();
    for endpoint in routes.iter() {
        match groups
            .iter_mut()
            .find(|g| g[0].path.route() == endpoint.path.route())
        {
            Some(group) => group.push(endpoint),
            None => groups.push(vec![endpoint]),
        }
    }
    groups
}

fn wrap_request_middleware(
    router: Router,
    middleware: BoxedMiddleware,
    observer: Arc<dyn Observer>,
) -> Router {
    router.layer(axum::middleware::from_fn(
        move |req: Request, next: axum::middleware::Next| {
            let middleware = middleware.clone();
            let observer = observer.clone();
            async move {
                let method = req.method().clone();
                let path = req.uri().path().to_string();
                match middleware.call(req, Next::engine(next)).await {
                    Ok(response) => response,
                    Err(err) => render_error(err, &method, &path, observer.as_ref()),
                }
            }
        },
    ))
}

// ── Endpoint pipeline ───────────────────────────────────────────────────

struct EndpointPipeline {
    has_params: bool,
    checkers: Vec<(String, SharedChecker)>,
    stages: Arc<[BoxedMiddleware]>,
    handler: BoxedHandler,
    observer: Arc<dyn Observer>,
}

impl EndpointPipeline {
    fn new(endpoint: &Endpoint, params: &ParamRegistry, observer: Arc<dyn Observer>) -> Self {
        Self {
            has_params: !endpoint.path.params().is_empty(),
            checkers: params.for_params(endpoint.path.params()),
            stages: endpoint.middlewares.iter().cloned().collect(),
            handler: endpoint.handler.clone(),
            observer,
        }
    }

    async fn dispatch(&self, req: Request) -> Response {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        match self.run(req).await {
            Ok(response) => response,
            Err(err) => render_error(err, &method, &path, self.observer.as_ref()),
        }
    }

    async fn run(&self, req: Request) -> HandlerResult {
        let (mut parts, body) = req.into_parts();

        let mut params = PathParams::default();
        if self.has_params {
            // A segment that does not decode to UTF-8 never reaches checkers
            // or the handler.
            let raw = RawPathParams::from_request_parts(&mut parts, &())
                .await
                .map_err(|rejection| {
                    WaymarkError::parameter(format!(
                        "invalid path parameter: {}",
                        rejection.body_text()
                    ))
                    .with_context(serde_json::json!({ "path": parts.uri.path() }))
                })?;
            params = PathParams::from_pairs(raw.iter());
        }

        for (name, checker) in &self.checkers {
            let Some(value) = params.get(name).map(str::to_string) else {
                continue;
            };
            let ctx = ParamContext {
                name: name.clone(),
                value,
                method: parts.method.clone(),
                path: parts.uri.path().to_string(),
            };
            let normalized = checker.check(ctx).await?;
            params.set(name, normalized);
        }

        parts.extensions.insert(params);
        let req = Request::from_parts(parts, body);
        Next::chain(self.stages.clone(), self.handler.clone())
            .run(req)
            .await
    }
}

// ── Error stage ─────────────────────────────────────────────────────────

/// Render an error that escaped a handler, middleware or parameter checker.
///
/// A [`WaymarkError`] renders with its own status and body. A body that
/// overran its limit renders as 413. Anything else is reported to the
/// observer and answered with the generic 500.
pub(crate) fn render_error(
    err: BoxError,
    method: &Method,
    path: &str,
    observer: &dyn Observer,
) -> Response {
    let err = match err.downcast::<WaymarkError>() {
        Ok(domain) => return (*domain).into_response(),
        Err(other) => other,
    };
    if is_length_limit(err.as_ref()) {
        return payload_too_large(None);
    }
    observer.on_request_error(method.as_str(), path, &err);
    internal_error_response()
}

fn payload_too_large(limit: Option<usize>) -> Response {
    let mut err = WaymarkError::validation("request body too large")
        .with_status(StatusCode::PAYLOAD_TOO_LARGE);
    if let Some(limit) = limit {
        err = err.with_context(serde_json::json!({ "limit": limit }));
    }
    err.into_response()
}

// ── Fallback ────────────────────────────────────────────────────────────

fn not_found_handler(
    listing: Arc<[String]>,
) -> impl Fn(Request) -> std::future::Ready<Response> + Clone + Send + Sync + 'static {
    move |req: Request| std::future::ready(not_found(&listing, req.method(), req.uri().path()))
}

fn not_found(listing: &[String], method: &Method, path: &str) -> Response {
    let body = serde_json::json!({
        "error": true,
        "message": format!("Cannot {method} {path}"),
        "code": ErrorKind::Endpoint.code(),
        "availableEndpoints": listing,
    });
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

// ── Body limit ──────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
struct BodyLimits {
    json: usize,
    url_encoded: usize,
}

impl BodyLimits {
    fn for_request(&self, req: &Request) -> Option<usize> {
        let content_type = req.headers().get(CONTENT_TYPE)?.to_str().ok()?;
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if essence == "application/json" || essence.ends_with("+json") {
            Some(self.json)
        } else if essence == "application/x-www-form-urlencoded" {
            Some(self.url_encoded)
        } else {
            None
        }
    }
}

async fn limit_body(limits: BodyLimits, req: Request, next: axum::middleware::Next) -> Response {
    let Some(limit) = limits.for_request(&req) else {
        return next.run(req).await;
    };

    let declared = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    if declared.is_some_and(|len| len > limit as u64) {
        return payload_too_large(Some(limit));
    }

    let req = req.map(|body| Body::new(Limited::new(body, limit)));
    next.run(req).await
}
