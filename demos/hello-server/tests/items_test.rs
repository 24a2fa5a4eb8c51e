use hello_server::{build_server, ItemStore, API_KEY_HEADER};
use serde_json::json;
use waymark::ServerConfig;
use waymark_test::TestApp;

const KEY: &str = "test-key";

fn app() -> (TestApp, ItemStore) {
    let store = ItemStore::default();
    let server = build_server(ServerConfig::default(), store.clone(), KEY.to_string()).unwrap();
    (TestApp::from_server(&server), store)
}

#[tokio::test]
async fn greets() {
    let (app, _) = app();
    app.get("/api/v1/")
        .send()
        .await
        .assert_ok()
        .assert_json_path("message", "Hello World!");
}

#[tokio::test]
async fn creates_and_lists_items() {
    let (app, store) = app();
    app.post("/api/v1/items")
        .json(&json!({ "name": "  lamp " }))
        .send()
        .await
        .assert_created()
        .assert_json_path("id", 1)
        .assert_json_path("name", "lamp");

    app.get("/api/v1/items")
        .send()
        .await
        .assert_ok()
        .assert_json_path("len()", 1)
        .assert_json_path("[0].name", "lamp");
    assert_eq!(store.list().len(), 1);
}

#[tokio::test]
async fn rejects_blank_and_malformed_items() {
    let (app, store) = app();
    app.post("/api/v1/items")
        .json(&json!({ "name": "   " }))
        .send()
        .await
        .assert_bad_request()
        .assert_json_path("code", "VALIDATION_ERROR");

    app.post("/api/v1/items")
        .typed_body("application/json", "{not json")
        .send()
        .await
        .assert_bad_request();
    assert!(store.list().is_empty());
}

#[tokio::test]
async fn id_checker_guards_item_routes() {
    let (app, store) = app();
    store.insert("chair".into());

    app.get("/api/v1/items/1")
        .send()
        .await
        .assert_ok()
        .assert_json_path("name", "chair");

    app.get("/api/v1/items/0")
        .send()
        .await
        .assert_bad_request()
        .assert_json_path("context.value", "0");

    app.get("/api/v1/items/abc").send().await.assert_bad_request();
    app.get("/api/v1/items/7").send().await.assert_not_found();
}

#[tokio::test]
async fn delete_requires_the_api_key() {
    let (app, store) = app();
    let item = store.insert("desk".into());
    let path = format!("/api/v1/items/{}", item.id);

    app.delete(&path).send().await.assert_unauthorized();
    app.delete(&path)
        .header(API_KEY_HEADER, "wrong")
        .send()
        .await
        .assert_unauthorized();
    assert!(store.get(item.id).is_some());

    app.delete(&path)
        .header(API_KEY_HEADER, KEY)
        .send()
        .await
        .assert_status(waymark::http::StatusCode::NO_CONTENT);
    assert!(store.get(item.id).is_none());
}
