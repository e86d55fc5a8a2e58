//! Common test utilities and helpers
//!
//! In-process mock of the Tanzu Mission Control REST API and the VMware
//! Cloud services token endpoint.

#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Form, Json, Router};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{mpsc, Arc, Mutex};
use tmc_models::auth::AUTHORIZE_PATH;

/// API token the mock accepts
pub const API_TOKEN: &str = "api-token";

/// Access token granted in exchange for [`API_TOKEN`]
pub const ACCESS_TOKEN: &str = "access-123";

/// A request seen by the mock
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
}

#[derive(Default)]
struct Inner {
    entities: HashMap<String, Value>,
    /// Scripted GET responses, consumed front to back; the last one repeats
    sequences: HashMap<String, VecDeque<Value>>,
    requests: Vec<RecordedRequest>,
    next_uid: u64,
}

#[derive(Clone, Default)]
struct MockState {
    inner: Arc<Mutex<Inner>>,
}

/// Handle on a running mock server
pub struct MockTmc {
    pub base_url: String,
    state: MockState,
}

impl MockTmc {
    /// Start the mock on an ephemeral port, served from a dedicated thread
    /// so that callers may block on their own runtime.
    pub fn start() -> Self {
        let state = MockState::default();
        let app = Router::new()
            .route(AUTHORIZE_PATH, post(authorize))
            .fallback(entity)
            .with_state(state.clone());

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("Failed to build mock runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("Failed to bind mock listener");
                tx.send(listener.local_addr().expect("Failed to read mock address"))
                    .expect("Failed to report mock address");
                axum::serve(listener, app).await.expect("Mock server failed");
            });
        });

        let addr = rx.recv().expect("Mock server did not start");
        MockTmc {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    /// Seed an entity served at `path`
    pub fn insert(&self, path: &str, body: Value) {
        self.state
            .inner
            .lock()
            .unwrap()
            .entities
            .insert(path.to_string(), body);
    }

    /// Serve `bodies` in order to successive GETs of `path`. The last body
    /// keeps being served once the others are used up.
    pub fn push_sequence(&self, path: &str, bodies: Vec<Value>) {
        self.state
            .inner
            .lock()
            .unwrap()
            .sequences
            .insert(path.to_string(), bodies.into());
    }

    /// Stored entity at `path`
    pub fn entity(&self, path: &str) -> Option<Value> {
        self.state.inner.lock().unwrap().entities.get(path).cloned()
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.inner.lock().unwrap().requests.clone()
    }

    /// Requests received for `method` on `path`
    pub fn requests_to(&self, method: Method, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    /// Provider configuration pointing at this mock
    pub fn provider_config(&self) -> Value {
        json!({
            "endpoint": self.base_url,
            "vmw_cloud_api_token": API_TOKEN,
            "vmw_cloud_endpoint": self.base_url,
            "insecure_allow_unverified_ssl": false,
            "org_id": null
        })
    }
}

async fn authorize(Form(form): Form<HashMap<String, String>>) -> Response {
    if form.get("refresh_token").map(String::as_str) == Some(API_TOKEN) {
        Json(json!({
            "access_token": ACCESS_TOKEN,
            "token_type": "bearer",
            "expires_in": 1799
        }))
        .into_response()
    } else {
        (StatusCode::BAD_REQUEST, "invalid_grant").into_response()
    }
}

/// Generic entity store keyed by request path.
///
/// POST to a collection stores the wrapped entity under
/// `<collection>/<fullName.name>`; GET, PUT and DELETE address that key.
async fn entity(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    let mut inner = state.inner.lock().unwrap();
    inner.requests.push(RecordedRequest {
        method: method.clone(),
        path: path.clone(),
        query: uri.query().map(String::from),
    });

    let expected = format!("Bearer {}", ACCESS_TOKEN);
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }

    match method {
        Method::POST => {
            let Ok(mut body) = serde_json::from_slice::<Value>(&body) else {
                return (StatusCode::BAD_REQUEST, "invalid body").into_response();
            };
            let Some((_, entity)) = body
                .as_object_mut()
                .and_then(|wrapper| wrapper.iter_mut().next())
            else {
                return (StatusCode::BAD_REQUEST, "empty body").into_response();
            };
            let Some(name) = entity["fullName"]["name"].as_str().map(String::from) else {
                return (StatusCode::BAD_REQUEST, "missing fullName.name").into_response();
            };

            inner.next_uid += 1;
            entity["meta"]["uid"] = json!(format!("uid-{}", inner.next_uid));

            let key = format!("{}/{}", path, name);
            if inner.entities.contains_key(&key) {
                return (StatusCode::CONFLICT, "already exists").into_response();
            }
            inner.entities.insert(key, body.clone());
            Json(body).into_response()
        }
        Method::GET if inner.sequences.contains_key(&path) => {
            let bodies = inner.sequences.get_mut(&path).unwrap();
            let body = if bodies.len() > 1 {
                bodies.pop_front()
            } else {
                bodies.front().cloned()
            };
            match body {
                Some(body) => Json(body).into_response(),
                None => (StatusCode::NOT_FOUND, "not found").into_response(),
            }
        }
        Method::GET => match inner.entities.get(&path) {
            Some(entity) => Json(entity.clone()).into_response(),
            None => (StatusCode::NOT_FOUND, "not found").into_response(),
        },
        Method::PUT => {
            let Ok(body) = serde_json::from_slice::<Value>(&body) else {
                return (StatusCode::BAD_REQUEST, "invalid body").into_response();
            };
            match inner.entities.get_mut(&path) {
                Some(stored) => {
                    *stored = body.clone();
                    Json(body).into_response()
                }
                None => (StatusCode::NOT_FOUND, "not found").into_response(),
            }
        }
        Method::DELETE => match inner.entities.remove(&path) {
            Some(_) => Json(json!({})).into_response(),
            None => (StatusCode::NOT_FOUND, "not found").into_response(),
        },
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}
