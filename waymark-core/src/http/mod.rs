//! Re-exports of the HTTP types Waymark handlers and middlewares work with.
//!
//! Handlers never need to depend on `axum` directly; everything a handler
//! signature touches is available from here.

pub mod header;

pub use axum::body::Body;
pub use axum::extract::{RawPathParams, Request};
pub use axum::http::Uri;
pub use axum::response::{IntoResponse, Response};
pub use axum::{Json, Router};
pub use bytes::Bytes;
pub use self::header::{
    HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
    // Common header constants
    ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, HOST, ORIGIN, USER_AGENT,
};
