mod app;
mod tcp;

pub use app::{value_at, TestApp, TestRequest, TestResponse};
pub use tcp::{open_idle, raw_request, RawResponse};
