//! Demo server: a greeting, an in-memory item store with a validated `id`
//! parameter, a timing middleware and a key-protected delete.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::json;
use waymark::prelude::*;

pub const API_PREFIX: &str = "/api/v1";
pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Item {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct NewItem {
    name: String,
}

#[derive(Default)]
struct Items {
    next_id: u64,
    by_id: BTreeMap<u64, Item>,
}

/// Shared in-memory store; cloning shares the same items.
#[derive(Clone, Default)]
pub struct ItemStore {
    inner: Arc<Mutex<Items>>,
}

impl ItemStore {
    fn with<R>(&self, f: impl FnOnce(&mut Items) -> R) -> R {
        let mut items = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut items)
    }

    pub fn list(&self) -> Vec<Item> {
        self.with(|items| items.by_id.values().cloned().collect())
    }

    pub fn insert(&self, name: String) -> Item {
        self.with(|items| {
            items.next_id += 1;
            let item = Item {
                id: items.next_id,
                name,
            };
            items.by_id.insert(item.id, item.clone());
            item
        })
    }

    pub fn get(&self, id: u64) -> Option<Item> {
        self.with(|items| items.by_id.get(&id).cloned())
    }

    pub fn remove(&self, id: u64) -> Option<Item> {
        self.with(|items| items.by_id.remove(&id))
    }
}

fn item_id(req: &Request) -> Result<u64, WaymarkError> {
    PathParams::of(req)
        .get("id")
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| WaymarkError::validation("missing item id"))
}

fn not_found(id: u64) -> WaymarkError {
    WaymarkError::validation(format!("item {id} not found"))
        .with_status(StatusCode::NOT_FOUND)
        .with_context(json!({ "id": id }))
}

/// Assemble the demo server. `api_key` guards `DELETE /items/:id`.
pub fn build_server(config: ServerConfig, store: ItemStore, api_key: String) -> waymark::Result<Server> {
    let server = Server::new(API_PREFIX, config)?;

    server.add_middleware("timing", |req: Request, next: Next| async move {
        let started = Instant::now();
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let res = next.run(req).await?;
        tracing::debug!(%method, %path, elapsed_us = started.elapsed().as_micros() as u64, "handled");
        Ok::<_, BoxError>(res)
    })?;

    server.add_param_checker("id", |ctx: ParamContext| async move {
        match ctx.value.parse::<u64>() {
            Ok(id) if id > 0 => Ok(id.to_string()),
            _ => Err(WaymarkError::validation(format!(
                "'{}' is not a valid item id",
                ctx.value
            ))
            .with_context(json!({ "param": ctx.name, "value": ctx.value }))),
        }
    })?;

    server.add_endpoint("/", "GET", |_req: Request| async {
        Ok::<_, WaymarkError>(Json(json!({ "message": "Hello World!" })))
    })?;

    let list = store.clone();
    let create = store.clone();
    server.add_multiple_methods(
        "/items",
        vec![HttpMethod::Get, HttpMethod::Post],
        vec![
            BoxedHandler::new(move |_req: Request| {
                let store = list.clone();
                async move { Ok::<_, WaymarkError>(Json(store.list())) }
            }),
            BoxedHandler::new(move |req: Request| {
                let store = create.clone();
                async move {
                    let new: NewItem = json_body(req).await?;
                    let name = new.name.trim().to_string();
                    if name.is_empty() {
                        return Err(WaymarkError::validation("item name must not be empty"));
                    }
                    Ok((StatusCode::CREATED, Json(store.insert(name))))
                }
            }),
        ],
    )?;

    let fetch = store.clone();
    let delete = store;
    let require_key = BoxedMiddleware::new(move |req: Request, next: Next| {
        let expected = api_key.clone();
        async move {
            let provided = req
                .headers()
                .get(API_KEY_HEADER)
                .and_then(|v| v.to_str().ok());
            if provided != Some(expected.as_str()) {
                let denied = WaymarkError::validation("missing or invalid API key")
                    .with_status(StatusCode::UNAUTHORIZED);
                return Ok(denied.into_response());
            }
            next.run(req).await
        }
    });

    server.add_routes(vec![
        RouteDefinition::new("/items/:id", "GET", move |req: Request| {
            let store = fetch.clone();
            async move {
                let id = item_id(&req)?;
                store.get(id).map(Json).ok_or_else(|| not_found(id))
            }
        }),
        RouteDefinition::new("/items/:id", "DELETE", move |req: Request| {
            let store = delete.clone();
            async move {
                let id = item_id(&req)?;
                store
                    .remove(id)
                    .map(|_| StatusCode::NO_CONTENT)
                    .ok_or_else(|| not_found(id))
            }
        })
        .with_middlewares(vec![require_key]),
    ])?;

    Ok(server)
}
