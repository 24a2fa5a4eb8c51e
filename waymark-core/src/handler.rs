//! Handler and middleware abstractions.
//!
//! A handler is any `Fn(Request) -> impl Future<Output = Result<R, E>>` where
//! `R: IntoResponse` and `E` converts into a [`BoxError`]. A middleware is the
//! same shape with an extra [`Next`] argument:
//!
//! ```ignore
//! server.add_middleware("timing", |req: Request, next: Next| async move {
//!     let started = std::time::Instant::now();
//!     let res = next.run(req).await?;
//!     tracing::debug!(elapsed = ?started.elapsed(), "request done");
//!     Ok::<_, BoxError>(res)
//! })?;
//! ```
//!
//! Errors are never turned into responses here; they bubble up to the
//! dispatch error stage.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http_body_util::BodyExt;
use serde::de::DeserializeOwned;

use crate::error::{is_length_limit, BoxError, WaymarkError};
use crate::http::{IntoResponse, Request, Response, StatusCode};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What every stage of the pipeline produces.
pub type HandlerResult = Result<Response, BoxError>;

/// Terminal stage of an endpoint's pipeline.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, req: Request) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut, R, E> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse,
    E: Into<BoxError>,
{
    fn call(&self, req: Request) -> BoxFuture<'static, HandlerResult> {
        let fut = (self)(req);
        Box::pin(async move {
            fut.await
                .map(IntoResponse::into_response)
                .map_err(Into::into)
        })
    }
}

/// Type-erased, cheaply cloneable handler.
///
/// Used where handlers of different concrete types share a collection, e.g.
/// [`Server::add_multiple_methods`](crate::Server::add_multiple_methods).
#[derive(Clone)]
pub struct BoxedHandler(Arc<dyn Handler>);

impl BoxedHandler {
    pub fn new<H: Handler>(handler: H) -> Self {
        Self(Arc::new(handler))
    }
}

impl Handler for BoxedHandler {
    fn call(&self, req: Request) -> BoxFuture<'static, HandlerResult> {
        self.0.call(req)
    }
}

/// A request-processing step that may short-circuit or continue via [`Next`].
pub trait Middleware: Send + Sync + 'static {
    fn call(&self, req: Request, next: Next) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut, R, E> Middleware for F
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse,
    E: Into<BoxError>,
{
    fn call(&self, req: Request, next: Next) -> BoxFuture<'static, HandlerResult> {
        let fut = (self)(req, next);
        Box::pin(async move {
            fut.await
                .map(IntoResponse::into_response)
                .map_err(Into::into)
        })
    }
}

/// Type-erased, cheaply cloneable middleware.
#[derive(Clone)]
pub struct BoxedMiddleware(Arc<dyn Middleware>);

impl BoxedMiddleware {
    pub fn new<M: Middleware>(middleware: M) -> Self {
        Self(Arc::new(middleware))
    }
}

impl Middleware for BoxedMiddleware {
    fn call(&self, req: Request, next: Next) -> BoxFuture<'static, HandlerResult> {
        self.0.call(req, next)
    }
}

/// The continuation handed to a middleware.
///
/// Calling [`run`](Next::run) invokes the rest of the pipeline; dropping it
/// without calling short-circuits the chain.
pub struct Next {
    inner: NextInner,
}

enum NextInner {
    /// Global middleware: the rest of the pipeline lives in the engine's
    /// layer stack.
    Engine(axum::middleware::Next),
    /// Per-route middleware: remaining route stages, then the handler.
    Chain {
        stages: Arc<[BoxedMiddleware]>,
        index: usize,
        handler: BoxedHandler,
    },
}

impl Next {
    pub(crate) fn engine(next: axum::middleware::Next) -> Self {
        Self {
            inner: NextInner::Engine(next),
        }
    }

    pub(crate) fn chain(stages: Arc<[BoxedMiddleware]>, handler: BoxedHandler) -> Self {
        Self {
            inner: NextInner::Chain {
                stages,
                index: 0,
                handler,
            },
        }
    }

    pub async fn run(self, req: Request) -> HandlerResult {
        match self.inner {
            // Downstream errors were already rendered by the error stage.
            NextInner::Engine(next) => Ok(next.run(req).await),
            NextInner::Chain {
                stages,
                index,
                handler,
            } => match stages.get(index).cloned() {
                Some(stage) => {
                    let next = Next {
                        inner: NextInner::Chain {
                            stages,
                            index: index + 1,
                            handler,
                        },
                    };
                    stage.call(req, next).await
                }
                None => handler.call(req).await,
            },
        }
    }
}

/// Path parameters of the matched route, after parameter checkers ran.
///
/// Inserted into the request extensions before per-route middlewares and the
/// handler execute:
///
/// ```ignore
/// |req: Request| async move {
///     let id = PathParams::of(&req).get("id").unwrap_or_default().to_string();
///     Ok::<_, WaymarkError>(id)
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(Vec<(String, String)>);

impl PathParams {
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Read the params attached to a request (empty when none were attached).
    pub fn of(req: &Request) -> PathParams {
        req.extensions()
            .get::<PathParams>()
            .cloned()
            .unwrap_or_default()
    }

    /// Linear scan: routes carry one to three params.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub(crate) fn set(&mut self, name: &str, value: String) {
        if let Some(slot) = self.0.iter_mut().find(|(k, _)| k == name) {
            slot.1 = value;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Read the request body as JSON.
///
/// A body over the configured limit fails with a 413 `Validation` error; an
/// unreadable or malformed body with a 400 one.
///
/// ```ignore
/// |req: Request| async move {
///     let item: NewItem = json_body(req).await?;
///     Ok::<_, WaymarkError>(Json(item))
/// }
/// ```
pub async fn json_body<T: DeserializeOwned>(req: Request) -> Result<T, WaymarkError> {
    let bytes = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if is_length_limit(&e) => {
            return Err(WaymarkError::validation("request body too large")
                .with_status(StatusCode::PAYLOAD_TOO_LARGE))
        }
        Err(e) => {
            return Err(WaymarkError::validation("failed to read request body").with_source(e))
        }
    };
    serde_json::from_slice(&bytes).map_err(|e| {
        WaymarkError::validation(format!("invalid JSON body: {e}"))
            .with_context(serde_json::json!({ "line": e.line(), "column": e.column() }))
    })
}
