use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tower::util::ServiceExt;
use waymark_core::http::{Body, Router};
use waymark_core::Server;

/// In-process client over a composed Waymark pipeline.
///
/// Requests go through `tower::ServiceExt::oneshot`, so no port is bound.
/// The router is the one `Server::start` would serve: default middlewares,
/// user middlewares, parameter checkers, the error stage and the 404 listing.
pub struct TestApp {
    router: Router,
}

impl TestApp {
    pub fn new(router: Router) -> Self {
        Self { router }
    }

    /// Snapshot of the server's registries at call time.
    pub fn from_server(server: &Server) -> Self {
        Self::new(server.build_router())
    }

    pub fn get(&self, path: &str) -> TestRequest<'_> {
        TestRequest::new(self, Method::GET, path)
    }

    pub fn post(&self, path: &str) -> TestRequest<'_> {
        TestRequest::new(self, Method::POST, path)
    }

    pub fn put(&self, path: &str) -> TestRequest<'_> {
        TestRequest::new(self, Method::PUT, path)
    }

    pub fn patch(&self, path: &str) -> TestRequest<'_> {
        TestRequest::new(self, Method::PATCH, path)
    }

    pub fn delete(&self, path: &str) -> TestRequest<'_> {
        TestRequest::new(self, Method::DELETE, path)
    }

    /// CORS preflight or plain OPTIONS.
    pub fn options(&self, path: &str) -> TestRequest<'_> {
        TestRequest::new(self, Method::OPTIONS, path)
    }
}

pub struct TestRequest<'a> {
    app: &'a TestApp,
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl<'a> TestRequest<'a> {
    fn new(app: &'a TestApp, method: Method, path: &str) -> Self {
        Self {
            app,
            method,
            path: path.to_string(),
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        let name = HeaderName::from_bytes(name.as_bytes())
            .unwrap_or_else(|e| panic!("invalid header name {name:?}: {e}"));
        let value = HeaderValue::from_str(value)
            .unwrap_or_else(|e| panic!("invalid value for header {name}: {e}"));
        self.headers.insert(name, value);
        self
    }

    /// Serialize `body` as JSON and set `Content-Type: application/json`.
    /// No `Content-Length` is declared, so the body limit applies while reading.
    pub fn json(mut self, body: &impl Serialize) -> Self {
        self.body = serde_json::to_vec(body).expect("request body should serialize");
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self
    }

    /// Raw body, headers untouched.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Raw body with `Content-Type` and a declared `Content-Length`.
    pub fn typed_body(self, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        let mut req = self.header(CONTENT_TYPE.as_str(), content_type).body(body);
        req.headers.insert(CONTENT_LENGTH, req.body.len().into());
        req
    }

    pub async fn send(self) -> TestResponse {
        let mut request = Request::builder()
            .method(self.method)
            .uri(&self.path)
            .body(Body::from(self.body))
            .unwrap_or_else(|e| panic!("invalid request for {}: {e}", self.path));
        *request.headers_mut() = self.headers;

        let response = self
            .app
            .router
            .clone()
            .oneshot(request)
            .await
            .unwrap_or_else(|never| match never {});

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("response body should be readable")
            .to_bytes();

        TestResponse { status, headers, body }
    }
}

/// Look up `path` in a JSON document.
///
/// Segments are dot-separated field names, each optionally followed by
/// `[index]` lookups. A final `len()` yields the length of an array,
/// object or string. Missing fields and indices resolve to `null`.
///
/// ```ignore
/// value_at(&body, "availableEndpoints[0]");
/// value_at(&body, "availableEndpoints.len()");
/// ```
pub fn value_at(root: &Value, path: &str) -> Value {
    let mut current = root;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        if segment == "len()" {
            let len = match current {
                Value::Array(items) => items.len(),
                Value::Object(fields) => fields.len(),
                Value::String(text) => text.len(),
                other => panic!("len() of a non-collection in JSON path \"{path}\": {other}"),
            };
            return Value::from(len);
        }

        let (field, indices) = split_indices(segment, path);
        if !field.is_empty() {
            match current.get(field) {
                Some(next) => current = next,
                None => return Value::Null,
            }
        }
        for index in indices {
            match current.get(index) {
                Some(next) => current = next,
                None => return Value::Null,
            }
        }
    }
    current.clone()
}

/// `"items[0][2]"` → `("items", [0, 2])`.
fn split_indices<'s>(segment: &'s str, path: &str) -> (&'s str, Vec<usize>) {
    let Some(open) = segment.find('[') else {
        return (segment, Vec::new());
    };
    let (field, mut rest) = segment.split_at(open);
    let mut indices = Vec::new();
    while let Some(inner) = rest.strip_prefix('[') {
        let close = inner
            .find(']')
            .unwrap_or_else(|| panic!("unclosed '[' in JSON path \"{path}\""));
        let index = inner[..close]
            .parse()
            .unwrap_or_else(|_| panic!("bad index {:?} in JSON path \"{path}\"", &inner[..close]));
        indices.push(index);
        rest = &inner[close + 1..];
    }
    (field, indices)
}

/// A response from [`TestApp`], with assertions that chain by value.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn assert_ok(self) -> Self {
        self.assert_status(StatusCode::OK)
    }

    pub fn assert_created(self) -> Self {
        self.assert_status(StatusCode::CREATED)
    }

    pub fn assert_bad_request(self) -> Self {
        self.assert_status(StatusCode::BAD_REQUEST)
    }

    pub fn assert_unauthorized(self) -> Self {
        self.assert_status(StatusCode::UNAUTHORIZED)
    }

    pub fn assert_forbidden(self) -> Self {
        self.assert_status(StatusCode::FORBIDDEN)
    }

    pub fn assert_not_found(self) -> Self {
        self.assert_status(StatusCode::NOT_FOUND)
    }

    pub fn assert_payload_too_large(self) -> Self {
        self.assert_status(StatusCode::PAYLOAD_TOO_LARGE)
    }

    pub fn assert_internal_error(self) -> Self {
        self.assert_status(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn assert_status(self, expected: StatusCode) -> Self {
        assert_eq!(
            self.status,
            expected,
            "Expected {expected}, got {}\nBody: {}",
            self.status,
            self.text()
        );
        self
    }

    /// Assert the `{error: true, code}` envelope of the error stage.
    pub fn assert_error_code(self, code: &str) -> Self {
        let body: Value = self.json();
        assert_eq!(body["error"], true, "not an error body: {body}");
        assert_eq!(body["code"], code, "error code mismatch\n  Body: {body}");
        self
    }

    /// Assert the 404 listing for `METHOD path`, with the endpoints in
    /// registration order.
    pub fn assert_listing(self, method: &str, path: &str, endpoints: &[&str]) -> Self {
        let this = self.assert_not_found().assert_error_code("ENDPOINT_ERROR");
        let body: Value = this.json();
        assert_eq!(body["message"], format!("Cannot {method} {path}"));
        assert_eq!(
            this.available_endpoints(),
            endpoints,
            "availableEndpoints mismatch\n  Body: {body}"
        );
        this
    }

    /// The `availableEndpoints` list of a 404 body; empty if absent.
    pub fn available_endpoints(&self) -> Vec<String> {
        let body: Value = self.json();
        body["availableEndpoints"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn assert_json_path(self, path: &str, expected: impl Into<Value>) -> Self {
        let root: Value = self.json();
        let actual = value_at(&root, path);
        let expected = expected.into();
        assert_eq!(
            actual, expected,
            "JSON path \"{path}\" mismatch\n  Expected: {expected}\n  Actual:   {actual}\n  Body: {root}",
        );
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn assert_header(self, name: &str, expected: &str) -> Self {
        assert_eq!(
            self.header(name),
            Some(expected),
            "header \"{name}\" mismatch\n  Headers: {:?}",
            self.headers
        );
        self
    }

    pub fn assert_no_header(self, name: &str) -> Self {
        assert!(
            self.header(name).is_none(),
            "header \"{name}\" should be absent, got {:?}",
            self.header(name)
        );
        self
    }

    pub fn json<T: DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body)
            .unwrap_or_else(|e| panic!("body is not JSON: {e}\nBody: {}", self.text()))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
