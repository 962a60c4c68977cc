use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use time::OffsetDateTime;
use tokio::net::TcpListener;

use clario::db::{DataError, RestClient, TodoStore};
use clario::models::{next_timestamp, NewTodo, Priority, Todo, TodoPatch};

const KEY: &str = "anon-key";

#[derive(Debug, Clone)]
struct Recorded {
    method: Method,
    query: HashMap<String, String>,
    headers: HeaderMap,
}

/// In-memory stand-in for a PostgREST table endpoint. Understands `eq.`
/// filters and the `prefer: return=representation` header, nothing more.
#[derive(Clone, Default)]
struct FakeTable {
    rows: Arc<Mutex<Vec<Map<String, Value>>>>,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl FakeTable {
    fn matching(&self, query: &HashMap<String, String>) -> Vec<usize> {
        let rows = self.rows.lock().unwrap();
        rows.iter()
            .enumerate()
            .filter(|(_, row)| {
                query.iter().all(|(column, filter)| {
                    if column == "select" {
                        return true;
                    }
                    let expected = filter.strip_prefix("eq.").unwrap_or(filter);
                    row.get(column).and_then(Value::as_str) == Some(expected)
                })
            })
            .map(|(i, _)| i)
            .collect()
    }

    fn last_request(&self) -> Recorded {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

async fn table(
    State(fake): State<FakeTable>,
    method: Method,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    fake.requests.lock().unwrap().push(Recorded {
        method: method.clone(),
        query: query.clone(),
        headers: headers.clone(),
    });

    if headers.get("apikey").map(|v| v != KEY).unwrap_or(true) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "Invalid API key"})),
        )
            .into_response();
    }

    let representation = headers
        .get("prefer")
        .map(|v| v == "return=representation")
        .unwrap_or(false);

    match method {
        Method::GET => {
            let matched = fake.matching(&query);
            let rows = fake.rows.lock().unwrap();
            let found: Vec<Value> = matched
                .into_iter()
                .map(|i| Value::Object(rows[i].clone()))
                .collect();
            Json(found).into_response()
        }
        Method::POST => {
            let row: Map<String, Value> = serde_json::from_slice(&body).unwrap();
            fake.rows.lock().unwrap().push(row);
            StatusCode::CREATED.into_response()
        }
        Method::PATCH => {
            let patch: Map<String, Value> = serde_json::from_slice(&body).unwrap();
            let matched = fake.matching(&query);
            let mut rows = fake.rows.lock().unwrap();
            let mut changed = Vec::new();
            for i in matched {
                rows[i].extend(patch.clone());
                changed.push(Value::Object(rows[i].clone()));
            }
            if representation {
                Json(changed).into_response()
            } else {
                StatusCode::NO_CONTENT.into_response()
            }
        }
        Method::DELETE => {
            let matched = fake.matching(&query);
            let mut rows = fake.rows.lock().unwrap();
            for i in matched.into_iter().rev() {
                rows.remove(i);
            }
            StatusCode::NO_CONTENT.into_response()
        }
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

async fn start_fake() -> (String, FakeTable) {
    let fake = FakeTable::default();
    let app = Router::new()
        .route("/rest/v1/todos", any(table))
        .with_state(fake.clone());

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let base = format!("http://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (base, fake)
}

fn new_todo(title: &str) -> Todo {
    Todo::new(NewTodo {
        title: title.to_string(),
        description: None,
        priority: Priority::Low,
        due_date: None,
    })
}

#[tokio::test]
async fn test_rest_client_round_trip() {
    let (base, fake) = start_fake().await;
    let client = RestClient::new(&base, KEY, "todos").unwrap();

    let todo = new_todo("Remote");
    client.insert_todo(&todo).await.unwrap();

    let request = fake.last_request();
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.headers["apikey"], KEY);
    assert_eq!(request.headers["authorization"], "Bearer anon-key");
    assert_eq!(request.headers["prefer"], "return=minimal");

    let todos = client.list_todos().await.unwrap();
    assert_eq!(todos, vec![todo.clone()]);
    assert_eq!(fake.last_request().query["select"], "*");

    let found = client.find_todo(&todo.id).await.unwrap();
    assert_eq!(found, Some(todo.clone()));
    assert_eq!(fake.last_request().query["id"], format!("eq.{}", todo.id));

    assert_eq!(client.find_todo("missing").await.unwrap(), None);
}

#[tokio::test]
async fn test_rest_client_patches_by_id() {
    let (base, fake) = start_fake().await;
    let client = RestClient::new(&base, KEY, "todos").unwrap();

    let todo = new_todo("Patch me");
    client.insert_todo(&todo).await.unwrap();

    let later = next_timestamp(todo.updated_at);
    let patch = TodoPatch {
        title: Some("Patched".to_string()),
        ..TodoPatch::touch(later)
    };
    client.update_todo(&todo.id, &patch).await.unwrap();

    let request = fake.last_request();
    assert_eq!(request.method, Method::PATCH);
    assert_eq!(request.query["id"], format!("eq.{}", todo.id));

    let found = client.find_todo(&todo.id).await.unwrap().unwrap();
    assert_eq!(found.title, "Patched");
    assert_eq!(found.priority, Priority::Low);
    assert_eq!(found.updated_at, later);
}

#[tokio::test]
async fn test_rest_client_conditional_update() {
    let (base, fake) = start_fake().await;
    let client = RestClient::new(&base, KEY, "todos").unwrap();

    let todo = new_todo("Guarded");
    client.insert_todo(&todo).await.unwrap();

    let patch = TodoPatch::toggle(&todo);
    let stale = todo.updated_at - time::Duration::seconds(5);
    assert!(!client
        .update_todo_if_unchanged(&todo.id, stale, &patch)
        .await
        .unwrap());

    assert!(client
        .update_todo_if_unchanged(&todo.id, todo.updated_at, &patch)
        .await
        .unwrap());
    let request = fake.last_request();
    assert_eq!(request.headers["prefer"], "return=representation");
    assert!(request.query["updated_at"].starts_with("eq."));

    let found = client.find_todo(&todo.id).await.unwrap().unwrap();
    assert!(found.completed);
}

#[tokio::test]
async fn test_rest_client_delete() {
    let (base, _fake) = start_fake().await;
    let client = RestClient::new(&base, KEY, "todos").unwrap();

    let keep = new_todo("keep");
    let gone = new_todo("gone");
    client.insert_todo(&keep).await.unwrap();
    client.insert_todo(&gone).await.unwrap();

    client.delete_todo(&gone.id).await.unwrap();
    client.delete_todo("missing").await.unwrap();

    assert_eq!(client.list_todos().await.unwrap(), vec![keep]);
}

#[tokio::test]
async fn test_rest_client_surfaces_error_status() {
    let (base, _fake) = start_fake().await;
    let client = RestClient::new(&base, "wrong-key", "todos").unwrap();

    let err = client.list_todos().await.unwrap_err();
    match err {
        DataError::Status { status, body } => {
            assert_eq!(status, 401);
            assert!(body.contains("Invalid API key"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_rest_client_unreachable_host() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let client = RestClient::new(&base, KEY, "todos").unwrap();
    let err = client
        .update_todo("any", &TodoPatch::touch(OffsetDateTime::now_utc()))
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::Http(_)));
}
