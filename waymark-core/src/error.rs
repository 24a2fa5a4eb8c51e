use std::fmt;

use crate::http::{IntoResponse, Json, Response, StatusCode};

/// Boxed error type accepted from handlers, middlewares and parameter checkers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used by every registration and lifecycle operation.
pub type Result<T, E = WaymarkError> = std::result::Result<T, E>;

/// Category of a [`WaymarkError`].
///
/// Each kind has a stable wire code (sent in the `code` field of error
/// responses) and a default HTTP status used when the error reaches the
/// dispatch error stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid construction input (e.g. a main prefix without a leading `/`).
    Initialization,
    /// Invalid endpoint path.
    Endpoint,
    /// Unsupported HTTP verb.
    Method,
    /// Handler/method list shape violation.
    Callback,
    /// Invalid middleware id or registration failure.
    Middleware,
    /// Invalid parameter checker name or registration failure.
    Parameter,
    /// Illegal lifecycle transition, bind failure or shutdown failure.
    Server,
    /// Request-time rejection raised by application code.
    Validation,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Initialization => "CLASS_INITIALIZATION_ERROR",
            ErrorKind::Endpoint => "ENDPOINT_ERROR",
            ErrorKind::Method => "METHOD_ERROR",
            ErrorKind::Callback => "CALLBACK_ERROR",
            ErrorKind::Middleware => "MIDDLEWARE_ERROR",
            ErrorKind::Parameter => "PARAMETER_ERROR",
            ErrorKind::Server => "SERVER_ERROR",
            ErrorKind::Validation => "VALIDATION_ERROR",
        }
    }

    pub fn default_status(&self) -> StatusCode {
        match self {
            ErrorKind::Endpoint => StatusCode::NOT_FOUND,
            ErrorKind::Method => StatusCode::METHOD_NOT_ALLOWED,
            ErrorKind::Parameter | ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Initialization
            | ErrorKind::Callback
            | ErrorKind::Middleware
            | ErrorKind::Server => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Initialization => "Initialization",
            ErrorKind::Endpoint => "Endpoint",
            ErrorKind::Method => "Method",
            ErrorKind::Callback => "Callback",
            ErrorKind::Middleware => "Middleware",
            ErrorKind::Parameter => "Parameter",
            ErrorKind::Server => "Server",
            ErrorKind::Validation => "Validation",
        };
        f.write_str(name)
    }
}

/// The single domain error of Waymark.
///
/// Registration and lifecycle operations return it directly. Handlers,
/// middlewares and parameter checkers may return it (boxed) as well; the
/// dispatch error stage recognizes it and renders a structured response:
///
/// ```json
/// { "error": true, "message": "...", "code": "VALIDATION_ERROR", "context": { ... } }
/// ```
pub struct WaymarkError {
    kind: ErrorKind,
    message: String,
    context: Option<serde_json::Value>,
    status: Option<StatusCode>,
    source: Option<BoxError>,
}

impl WaymarkError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: None,
            status: None,
            source: None,
        }
    }

    pub fn initialization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Initialization, message)
    }

    pub fn endpoint(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Endpoint, message)
    }

    pub fn method(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Method, message)
    }

    pub fn callback(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Callback, message)
    }

    pub fn middleware(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Middleware, message)
    }

    pub fn parameter(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parameter, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Server, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Attach structured context, sent as the `context` field of the response.
    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Override the HTTP status used when this error is rendered.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach the underlying cause (e.g. the `io::Error` of a failed bind).
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> Option<&serde_json::Value> {
        self.context.as_ref()
    }

    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or_else(|| self.kind.default_status())
    }

    /// JSON body sent to clients for this error.
    pub fn to_body(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "error": true,
            "message": self.message,
            "code": self.code(),
        });
        if let Some(context) = &self.context {
            body["context"] = context.clone();
        }
        body
    }
}

impl fmt::Display for WaymarkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)
    }
}

impl fmt::Debug for WaymarkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("WaymarkError");
        d.field("kind", &self.kind).field("message", &self.message);
        if let Some(context) = &self.context {
            d.field("context", context);
        }
        if let Some(source) = &self.source {
            d.field("source", source);
        }
        d.finish()
    }
}

impl std::error::Error for WaymarkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl IntoResponse for WaymarkError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.to_body())).into_response()
    }
}

/// Generic 500 body. Never carries detail about the underlying failure.
pub fn internal_error_response() -> Response {
    let body = serde_json::json!({
        "error": true,
        "message": "Internal server error",
        "code": "INTERNAL_ERROR",
    });
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

/// Whether `err` or any of its sources is a body length-limit violation.
pub(crate) fn is_length_limit(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<http_body_util::LengthLimitError>() {
            return true;
        }
        current = e.source();
    }
    false
}
