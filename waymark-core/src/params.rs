//! Path-parameter validators.
//!
//! A checker registered for `id` runs for every request whose matched route
//! contains an `id` parameter, before the route's own middlewares and
//! handler. It receives the raw value and returns the (possibly normalized)
//! value, or an error that the dispatch error stage renders:
//!
//! ```ignore
//! server.add_param_checker("id", |ctx: ParamContext| async move {
//!     match ctx.value.parse::<u64>() {
//!         Ok(n) => Ok(n.to_string()),
//!         Err(_) => Err(WaymarkError::validation(format!("invalid id '{}'", ctx.value))),
//!     }
//! })?;
//! ```

use std::future::Future;
use std::sync::Arc;

use crate::error::{BoxError, Result, WaymarkError};
use crate::handler::BoxFuture;
use crate::http::Method;
use crate::registry::is_identifier;

/// What a parameter checker sees.
#[derive(Debug, Clone)]
pub struct ParamContext {
    pub name: String,
    pub value: String,
    pub method: Method,
    pub path: String,
}

pub trait ParamChecker: Send + Sync + 'static {
    fn check(&self, ctx: ParamContext) -> BoxFuture<'static, Result<String, BoxError>>;
}

impl<F, Fut, V, E> ParamChecker for F
where
    F: Fn(ParamContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
    V: Into<String>,
    E: Into<BoxError>,
{
    fn check(&self, ctx: ParamContext) -> BoxFuture<'static, Result<String, BoxError>> {
        let fut = (self)(ctx);
        Box::pin(async move { fut.await.map(Into::into).map_err(Into::into) })
    }
}

pub(crate) type SharedChecker = Arc<dyn ParamChecker>;

#[derive(Default, Clone)]
pub(crate) struct ParamRegistry {
    checkers: Vec<(String, SharedChecker)>,
}

impl ParamRegistry {
    pub(crate) fn names(&self) -> Vec<String> {
        self.checkers.iter().map(|(n, _)| n.clone()).collect()
    }

    /// Checkers relevant to a route, in registration order.
    pub(crate) fn for_params(&self, params: &[String]) -> Vec<(String, SharedChecker)> {
        self.checkers
            .iter()
            .filter(|(name, _)| params.iter().any(|p| p == name))
            .cloned()
            .collect()
    }

    /// Insert or overwrite in place. Returns `true` when a checker was replaced.
    pub(crate) fn insert(&mut self, name: String, checker: SharedChecker) -> bool {
        match self.checkers.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => {
                slot.1 = checker;
                true
            }
            None => {
                self.checkers.push((name, checker));
                false
            }
        }
    }
}

pub(crate) fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(WaymarkError::parameter("parameter name must not be empty"));
    }
    if !is_identifier(trimmed) {
        return Err(WaymarkError::parameter(format!(
            "'{trimmed}' is not a valid path parameter name"
        ))
        .with_context(serde_json::json!({ "name": trimmed })));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn passthrough() -> SharedChecker {
        Arc::new(|ctx: ParamContext| async move { Ok::<_, BoxError>(ctx.value) })
    }

    #[test]
    fn selects_checkers_for_route_params_in_registration_order() {
        let mut registry = ParamRegistry::default();
        registry.insert("b".into(), passthrough());
        registry.insert("a".into(), passthrough());
        registry.insert("unused".into(), passthrough());

        let route = vec!["a".to_string(), "b".to_string()];
        let names: Vec<_> = registry.for_params(&route).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["b", "a"]);
    }

    #[test]
    fn overwrite_reports_replacement() {
        let mut registry = ParamRegistry::default();
        assert!(!registry.insert("id".into(), passthrough()));
        assert!(registry.insert("id".into(), passthrough()));
        assert_eq!(registry.names(), ["id"]);
    }

    #[test]
    fn names_are_validated() {
        assert_eq!(validate_name("id").unwrap(), "id");
        assert_eq!(validate_name("").unwrap_err().kind(), ErrorKind::Parameter);
        assert_eq!(validate_name("user-id").unwrap_err().kind(), ErrorKind::Parameter);
    }
}
