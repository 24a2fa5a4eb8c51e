//! Diagnostics sink for registration warnings, lifecycle transitions and
//! request-time failures.
//!
//! The default [`TracingObserver`] forwards everything to `tracing`. Tests or
//! embedders can install their own via
//! [`Server::with_observer`](crate::Server::with_observer).

use std::fmt;

use crate::error::BoxError;
use crate::lifecycle::ServerState;
use crate::registry::EndpointKey;

/// A non-fatal registration event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// An endpoint with the same method and path was replaced.
    EndpointReplaced(EndpointKey),
    /// A middleware id was registered again; the new function took its slot.
    MiddlewareReplaced(String),
    /// A parameter checker name was registered again.
    ParamCheckerReplaced(String),
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::EndpointReplaced(key) => write!(f, "endpoint {key} overwritten"),
            Warning::MiddlewareReplaced(id) => write!(f, "middleware '{id}' overwritten"),
            Warning::ParamCheckerReplaced(name) => {
                write!(f, "parameter checker '{name}' overwritten")
            }
        }
    }
}

pub trait Observer: Send + Sync + 'static {
    fn on_warning(&self, warning: &Warning);

    fn on_transition(&self, from: ServerState, to: ServerState) {
        let _ = (from, to);
    }

    /// Called for errors the dispatch error stage could not render as a
    /// structured response (they become a generic 500).
    fn on_request_error(&self, method: &str, path: &str, error: &BoxError) {
        let _ = (method, path, error);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_warning(&self, warning: &Warning) {
        tracing::warn!(%warning, "registration warning");
    }

    fn on_transition(&self, from: ServerState, to: ServerState) {
        tracing::debug!(?from, ?to, "server state changed");
    }

    fn on_request_error(&self, method: &str, path: &str, error: &BoxError) {
        tracing::error!(method, path, error = %error, "unhandled request error");
    }
}
