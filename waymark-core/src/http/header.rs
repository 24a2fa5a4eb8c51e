pub use axum::http::header::{
    HeaderName, HeaderValue,
    // Common header constants
    ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, HOST, ORIGIN, USER_AGENT,
};
pub use axum::http::{HeaderMap, Method, StatusCode};
