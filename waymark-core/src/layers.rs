use std::time::Duration;

use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer, ExposeHeaders};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::config::{CorsOptions, RequestLogFormat};
use crate::error::{internal_error_response, Result, WaymarkError};
use crate::http::{HeaderName, HeaderValue, Method, Response, Router};

const DEFAULT_FILTER: &str = "info,tower_http=debug";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialise the global `tracing` subscriber with a standard `fmt` layer.
///
/// Respects the `RUST_LOG` environment variable. Falls back to
/// `info,tower_http=debug` when `RUST_LOG` is not set.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_tracing() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .try_init()
        .is_ok()
}

/// Same as [`init_tracing`], with one JSON object per event.
pub fn init_tracing_json() -> bool {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter())
        .try_init()
        .is_ok()
}

/// Apply the request-logging `TraceLayer` for `format`.
///
/// `Off` leaves the router untouched.
pub fn apply_trace_layer(router: Router, format: RequestLogFormat) -> Router {
    match format {
        RequestLogFormat::Compact => router.layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        ),
        RequestLogFormat::Detailed => router.layer(
            TraceLayer::new_for_http()
                .make_span_with(
                    DefaultMakeSpan::new()
                        .level(Level::INFO)
                        .include_headers(true),
                )
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(LatencyUnit::Micros)
                        .include_headers(true),
                ),
        ),
        RequestLogFormat::Off => router,
    }
}

/// Build the CORS layer described by `options`.
///
/// Fails with a `Middleware` error for values that are not valid header
/// values or method names, and for credentials combined with a wildcard
/// origin (browsers refuse that combination).
pub fn cors_layer(options: &CorsOptions) -> Result<CorsLayer> {
    let mut layer = CorsLayer::new();

    if options.allows_any_origin() {
        if options.allow_credentials {
            return Err(WaymarkError::middleware(
                "CORS credentials cannot be combined with a wildcard origin",
            ));
        }
        layer = layer.allow_origin(AllowOrigin::any());
    } else {
        let origins = options
            .origins
            .iter()
            .map(|o| {
                HeaderValue::from_str(o.trim())
                    .map_err(|_| invalid_cors("origin", o))
            })
            .collect::<Result<Vec<_>>>()?;
        layer = layer.allow_origin(AllowOrigin::list(origins));
    }

    let methods = options
        .methods
        .iter()
        .map(|m| {
            Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes())
                .map_err(|_| invalid_cors("method", m))
        })
        .collect::<Result<Vec<_>>>()?;
    layer = layer.allow_methods(AllowMethods::list(methods));

    if options.allowed_headers.is_empty() {
        layer = layer.allow_headers(AllowHeaders::mirror_request());
    } else {
        layer = layer.allow_headers(AllowHeaders::list(parse_header_names(
            &options.allowed_headers,
        )?));
    }

    if !options.exposed_headers.is_empty() {
        layer = layer.expose_headers(ExposeHeaders::list(parse_header_names(
            &options.exposed_headers,
        )?));
    }

    if let Some(secs) = options.max_age_secs {
        layer = layer.max_age(Duration::from_secs(secs));
    }

    Ok(layer.allow_credentials(options.allow_credentials))
}

fn parse_header_names(names: &[String]) -> Result<Vec<HeaderName>> {
    names
        .iter()
        .map(|h| HeaderName::from_bytes(h.trim().as_bytes()).map_err(|_| invalid_cors("header", h)))
        .collect()
}

fn invalid_cors(what: &str, value: &str) -> WaymarkError {
    WaymarkError::middleware(format!("invalid CORS {what} '{value}'"))
        .with_context(serde_json::json!({ what: value }))
}

/// Returns a `CatchPanicLayer` that converts panics into the generic JSON 500.
pub fn catch_panic_layer() -> CatchPanicLayer<fn(Box<dyn std::any::Any + Send>) -> Response> {
    CatchPanicLayer::custom(panic_handler as fn(_) -> _)
}

fn panic_handler(err: Box<dyn std::any::Any + Send>) -> Response {
    let detail = err
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| err.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    tracing::error!(panic = %detail, "handler panicked");
    internal_error_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn wildcard_origin_with_credentials_is_rejected() {
        let options = CorsOptions {
            allow_credentials: true,
            ..CorsOptions::default()
        };
        let err = cors_layer(&options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Middleware);
    }

    #[test]
    fn listed_origins_with_credentials_are_fine() {
        let options = CorsOptions {
            origins: vec!["https://app.example.com".into()],
            allow_credentials: true,
            ..CorsOptions::default()
        };
        assert!(cors_layer(&options).is_ok());
    }

    #[test]
    fn bad_method_is_rejected() {
        let options = CorsOptions {
            methods: vec!["GE T".into()],
            ..CorsOptions::default()
        };
        assert_eq!(cors_layer(&options).unwrap_err().kind(), ErrorKind::Middleware);
    }
}
