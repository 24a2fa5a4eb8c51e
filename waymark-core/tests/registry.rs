use std::sync::{Arc, Mutex};

use serde_json::json;
use waymark_core::http::{Json, Request};
use waymark_core::{
    BoxedHandler, ErrorKind, HttpMethod, Observer, RouteDefinition, Server, ServerConfig,
    WaymarkError, Warning,
};
use waymark_test::TestApp;

fn server() -> Server {
    Server::new("/api", ServerConfig::default()).unwrap()
}

fn reply(tag: &'static str) -> BoxedHandler {
    BoxedHandler::new(move |_req: Request| async move {
        Ok::<_, WaymarkError>(Json(json!({ "handler": tag })))
    })
}

#[derive(Clone, Default)]
struct RecordingObserver {
    warnings: Arc<Mutex<Vec<Warning>>>,
}

impl Observer for RecordingObserver {
    fn on_warning(&self, warning: &Warning) {
        self.warnings.lock().unwrap().push(warning.clone());
    }
}

#[test]
fn invalid_paths_are_endpoint_errors() {
    let server = server();
    for bad in ["", "users", "/users/:", "/a/{b"] {
        let err = server
            .add_endpoint(bad, "GET", |_req: Request| async { Ok::<_, WaymarkError>("x") })
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Endpoint, "path {bad:?}");
        assert_eq!(err.code(), "ENDPOINT_ERROR");
    }
    assert!(server.endpoints().is_empty());
}

#[test]
fn unsupported_method_is_a_method_error() {
    let server = server();
    let err = server
        .add_endpoint("/x", "TRACE", |_req: Request| async { Ok::<_, WaymarkError>("x") })
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Method);
    assert_eq!(err.code(), "METHOD_ERROR");
}

#[test]
fn methods_are_case_insensitive() {
    let server = server();
    server
        .add_endpoint("/x", "post", |_req: Request| async { Ok::<_, WaymarkError>("x") })
        .unwrap();
    assert_eq!(server.endpoints(), ["POST /x"]);
}

#[test]
fn endpoints_keep_registration_order() {
    let server = server();
    server
        .add_endpoint("/b", "GET", |_req: Request| async { Ok::<_, WaymarkError>("b") })
        .unwrap()
        .add_endpoint("/a", "POST", |_req: Request| async { Ok::<_, WaymarkError>("a") })
        .unwrap()
        .add_endpoint("/users/:id", HttpMethod::Delete, |_req: Request| async {
            Ok::<_, WaymarkError>("d")
        })
        .unwrap();
    assert_eq!(server.endpoints(), ["GET /b", "POST /a", "DELETE /users/:id"]);

    let keys = server.endpoint_keys();
    assert_eq!(keys[2].method, HttpMethod::Delete);
    assert_eq!(keys[2].path, "/users/:id");
    assert_eq!(keys[0].to_string(), "GET /b");
}

#[tokio::test]
async fn re_registration_overwrites_in_place_and_warns() {
    let observer = RecordingObserver::default();
    let server = server().with_observer(observer.clone());
    server.add_multiple_methods("/items", vec!["GET"], vec![reply("first")]).unwrap();
    server.add_multiple_methods("/other", vec!["GET"], vec![reply("other")]).unwrap();
    server.add_multiple_methods("/items", vec!["GET"], vec![reply("second")]).unwrap();

    assert_eq!(server.endpoints(), ["GET /items", "GET /other"]);
    let warnings = observer.warnings.lock().unwrap().clone();
    assert_eq!(warnings.len(), 1);
    assert!(matches!(&warnings[0], Warning::EndpointReplaced(key) if key.to_string() == "GET /items"));

    TestApp::from_server(&server)
        .get("/api/items")
        .send()
        .await
        .assert_ok()
        .assert_json_path("handler", "second");
}

#[test]
fn colon_and_brace_params_name_the_same_endpoint() {
    let server = server();
    server.add_multiple_methods("/u/:id", vec!["GET"], vec![reply("colon")]).unwrap();
    server.add_multiple_methods("/u/{id}", vec!["GET"], vec![reply("brace")]).unwrap();
    assert_eq!(server.endpoints().len(), 1);
}

#[test]
fn conflicting_param_names_are_rejected() {
    let server = server();
    server.add_multiple_methods("/u/:id", vec!["GET"], vec![reply("id")]).unwrap();
    let err = server
        .add_multiple_methods("/u/:name", vec!["POST"], vec![reply("name")])
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Endpoint);
    assert_eq!(server.endpoints(), ["GET /u/:id"]);
}

#[tokio::test]
async fn param_and_catch_all_at_the_same_position_are_rejected() {
    let config = ServerConfig {
        hostname: "127.0.0.1".to_string(),
        port: 0,
        ..ServerConfig::default()
    };
    let server = Server::new("/api", config).unwrap();
    server.add_multiple_methods("/files/:name", vec!["GET"], vec![reply("one")]).unwrap();

    let err = server
        .add_multiple_methods("/files/*rest", vec!["GET"], vec![reply("any")])
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Endpoint);
    assert_eq!(err.context().unwrap()["conflictsWith"], "/files/:name");
    server.add_multiple_methods("/files/readme", vec!["GET"], vec![reply("readme")]).unwrap();
    assert_eq!(server.endpoints(), ["GET /files/:name", "GET /files/readme"]);

    server.start().await.unwrap();
    server.stop().await.unwrap();
}

#[test]
fn multiple_methods_is_all_or_nothing() {
    let server = server();

    let err = server
        .add_multiple_methods("/items", vec!["GET", "POST"], vec![reply("only-one")])
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Callback);
    assert_eq!(err.context().unwrap()["methods"], 2);

    let err = server
        .add_multiple_methods("/items", vec!["GET", "FETCH"], vec![reply("a"), reply("b")])
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Method);

    let err = server
        .add_multiple_methods("/items", vec!["GET", "get"], vec![reply("a"), reply("b")])
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Callback);

    let err = server
        .add_multiple_methods::<&str>("/items", vec![], vec![])
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Callback);

    assert!(server.endpoints().is_empty());
}

#[tokio::test]
async fn multiple_methods_pairs_by_index() {
    let server = server();
    server
        .add_multiple_methods(
            "/items",
            vec![HttpMethod::Get, HttpMethod::Post],
            vec![reply("list"), reply("create")],
        )
        .unwrap();

    let app = TestApp::from_server(&server);
    app.get("/api/items").send().await.assert_json_path("handler", "list");
    app.post("/api/items").send().await.assert_json_path("handler", "create");
}

#[test]
fn add_routes_validates_the_whole_batch_first() {
    let server = server();
    let err = server
        .add_routes(vec![
            RouteDefinition::new("/good", "GET", |_req: Request| async {
                Ok::<_, WaymarkError>("ok")
            }),
            RouteDefinition::new("bad", "GET", |_req: Request| async {
                Ok::<_, WaymarkError>("bad")
            }),
        ])
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Endpoint);
    assert!(server.endpoints().is_empty());
}

#[tokio::test]
async fn add_routes_accepts_single_and_multi_definitions() {
    let server = server();
    server
        .add_routes(vec![
            RouteDefinition::new("/health", "GET", |_req: Request| async {
                Ok::<_, WaymarkError>(Json(json!({ "handler": "health" })))
            }),
            RouteDefinition::multi("/items", ["GET", "PUT"], vec![reply("get"), reply("put")]),
        ])
        .unwrap();
    assert_eq!(server.endpoints(), ["GET /health", "GET /items", "PUT /items"]);

    let app = TestApp::from_server(&server);
    app.get("/api/health").send().await.assert_json_path("handler", "health");
    app.put("/api/items").send().await.assert_json_path("handler", "put");
}
