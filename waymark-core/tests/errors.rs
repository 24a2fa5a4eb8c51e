use std::sync::{Arc, Mutex};

use serde::Deserialize;
use serde_json::json;
use waymark_core::http::{Json, Request, StatusCode};
use waymark_core::{
    json_body, BoxError, ByteSize, Observer, Server, ServerConfig, WaymarkError, Warning,
};
use waymark_test::TestApp;

#[derive(Clone, Default)]
struct ErrorLog {
    errors: Arc<Mutex<Vec<String>>>,
}

impl Observer for ErrorLog {
    fn on_warning(&self, _warning: &Warning) {}

    fn on_request_error(&self, method: &str, path: &str, error: &BoxError) {
        self.errors
            .lock()
            .unwrap()
            .push(format!("{method} {path}: {error}"));
    }
}

async fn explode(_req: Request) -> Result<String, WaymarkError> {
    panic!("handler blew up")
}

#[tokio::test]
async fn domain_errors_render_structured_bodies() {
    let server = Server::new("/", ServerConfig::default()).unwrap();
    server
        .add_endpoint("/teapot", "GET", |_req: Request| async {
            Err::<String, _>(
                WaymarkError::validation("short and stout")
                    .with_status(StatusCode::IM_A_TEAPOT)
                    .with_context(json!({ "handle": 1, "spout": 1 })),
            )
        })
        .unwrap();
    server
        .add_endpoint("/plain", "GET", |_req: Request| async {
            Err::<String, _>(WaymarkError::validation("nope"))
        })
        .unwrap();
    let app = TestApp::from_server(&server);

    app.get("/teapot")
        .send()
        .await
        .assert_status(StatusCode::IM_A_TEAPOT)
        .assert_json_path("error", true)
        .assert_json_path("message", "short and stout")
        .assert_json_path("code", "VALIDATION_ERROR")
        .assert_json_path("context.spout", 1);

    let res = app.get("/plain").send().await.assert_bad_request();
    let body: serde_json::Value = res.json();
    assert_eq!(body, json!({ "error": true, "message": "nope", "code": "VALIDATION_ERROR" }));
}

#[tokio::test]
async fn foreign_errors_are_hidden_and_reported() {
    let log = ErrorLog::default();
    let server = Server::new("/", ServerConfig::default())
        .unwrap()
        .with_observer(log.clone());
    server
        .add_endpoint("/db", "GET", |_req: Request| async {
            Err::<String, BoxError>("connection refused by 10.0.0.7".into())
        })
        .unwrap();

    let res = TestApp::from_server(&server)
        .get("/db")
        .send()
        .await
        .assert_internal_error()
        .assert_json_path("error", true)
        .assert_json_path("message", "Internal server error")
        .assert_json_path("code", "INTERNAL_ERROR");
    assert!(!res.text().contains("10.0.0.7"));
    assert_eq!(
        *log.errors.lock().unwrap(),
        ["GET /db: connection refused by 10.0.0.7"]
    );
}

#[tokio::test]
async fn panics_become_a_generic_500() {
    let server = Server::new("/", ServerConfig::default()).unwrap();
    server.add_endpoint("/boom", "GET", explode).unwrap();
    server
        .add_endpoint("/fine", "GET", |_req: Request| async { Ok::<_, WaymarkError>("fine") })
        .unwrap();
    let app = TestApp::from_server(&server);

    let res = app
        .get("/boom")
        .send()
        .await
        .assert_internal_error()
        .assert_json_path("code", "INTERNAL_ERROR");
    assert!(!res.text().contains("blew up"));

    // The pipeline keeps serving after a panic.
    app.get("/fine").send().await.assert_ok();
}

#[tokio::test]
async fn unknown_routes_list_available_endpoints() {
    let server = Server::new("/api/v1", ServerConfig::default()).unwrap();
    server
        .add_endpoint("/", "GET", |_req: Request| async { Ok::<_, WaymarkError>("root") })
        .unwrap()
        .add_endpoint("/users/:id", "DELETE", |_req: Request| async {
            Ok::<_, WaymarkError>("gone")
        })
        .unwrap();
    let app = TestApp::from_server(&server);

    app.get("/api/v1/nothing-here")
        .send()
        .await
        .assert_listing(
            "GET",
            "/api/v1/nothing-here",
            &["GET /", "DELETE /users/:id"],
        );
}

#[tokio::test]
async fn wrong_method_on_a_known_path_gets_the_listing() {
    let server = Server::new("/", ServerConfig::default()).unwrap();
    server
        .add_endpoint("/items", "GET", |_req: Request| async { Ok::<_, WaymarkError>("items") })
        .unwrap();

    TestApp::from_server(&server)
        .patch("/items")
        .send()
        .await
        .assert_listing("PATCH", "/items", &["GET /items"]);
}

#[tokio::test]
async fn empty_registry_still_answers_404() {
    let server = Server::new("/", ServerConfig::default()).unwrap();
    TestApp::from_server(&server)
        .get("/")
        .send()
        .await
        .assert_not_found()
        .assert_json_path("availableEndpoints.len()", 0);
}

#[derive(Debug, Deserialize)]
struct Note {
    text: String,
}

fn notes_server(json_limit: ByteSize) -> Server {
    let config = ServerConfig {
        json_limit,
        url_encoded_limit: ByteSize::b(16),
        ..ServerConfig::default()
    };
    let server = Server::new("/", config).unwrap();
    server
        .add_endpoint("/notes", "POST", |req: Request| async move {
            let note: Note = json_body(req).await?;
            Ok::<_, WaymarkError>(Json(json!({ "length": note.text.len() })))
        })
        .unwrap();
    server
        .add_endpoint("/form", "POST", |_req: Request| async { Ok::<_, WaymarkError>("form") })
        .unwrap();
    server
}

#[tokio::test]
async fn declared_oversized_bodies_are_rejected_with_413() {
    let app = TestApp::from_server(&notes_server(ByteSize::b(32)));
    let body = json!({ "text": "x".repeat(64) }).to_string();

    app.post("/notes")
        .typed_body("application/json", body)
        .send()
        .await
        .assert_payload_too_large()
        .assert_error_code("VALIDATION_ERROR")
        .assert_json_path("context.limit", 32);

    app.post("/form")
        .typed_body("application/x-www-form-urlencoded", "a=".to_string() + &"b".repeat(32))
        .send()
        .await
        .assert_payload_too_large()
        .assert_json_path("context.limit", 16);
}

#[tokio::test]
async fn undeclared_oversized_bodies_fail_while_reading() {
    let app = TestApp::from_server(&notes_server(ByteSize::b(32)));
    let body = json!({ "text": "x".repeat(64) }).to_string();

    app.post("/notes")
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .assert_payload_too_large()
        .assert_error_code("VALIDATION_ERROR");
}

#[tokio::test]
async fn bodies_within_the_limit_are_read() {
    let app = TestApp::from_server(&notes_server(ByteSize::kib(1)));
    app.post("/notes")
        .json(&json!({ "text": "hello" }))
        .send()
        .await
        .assert_ok()
        .assert_json_path("length", 5);

    app.post("/notes")
        .typed_body("application/json", "{\"text\": ")
        .send()
        .await
        .assert_bad_request()
        .assert_json_path("code", "VALIDATION_ERROR");
}

#[tokio::test]
async fn other_content_types_are_not_limited() {
    let app = TestApp::from_server(&notes_server(ByteSize::b(8)));
    app.post("/form")
        .typed_body("text/plain", "y".repeat(1024))
        .send()
        .await
        .assert_ok();
}
