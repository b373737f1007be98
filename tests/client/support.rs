//! Scripted transport and backend fixtures.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use training_desk::{ApiClient, ApiError, ApiRequest, CacheStore, ClientConfig, InMemoryCacheStore, QueryKey, Transport};

type Hook = Box<dyn Fn(&ApiRequest) + Send + Sync>;

/// In-process backend answering from per-route queues.
///
/// Routes are the request's display form, e.g. `GET /training_templates/?day_number=1`.
/// Once a route's queue is drained its last response is repeated.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Result<Value, ApiError>>>>,
    last: Mutex<HashMap<String, Result<Value, ApiError>>>,
    sent: Mutex<Vec<ApiRequest>>,
    hook: Mutex<Option<Hook>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, route: &str, response: Result<Value, ApiError>) {
        self.routes
            .lock()
            .unwrap()
            .entry(route.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn ok(&self, route: &str, body: Value) {
        self.respond(route, Ok(body));
    }

    pub fn fail(&self, route: &str, status: u16, detail: Option<&str>) {
        self.respond(
            route,
            Err(ApiError::Status {
                status,
                detail: detail.map(str::to_string),
            }),
        );
    }

    /// Run `hook` inside every `send`, before the response is produced.
    pub fn during_send<F>(&self, hook: F)
    where
        F: Fn(&ApiRequest) + Send + Sync + 'static,
    {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|r| r.to_string()).collect()
    }

    pub fn last_body(&self) -> Option<Value> {
        self.sent.lock().unwrap().last().and_then(|r| r.body.clone())
    }

    pub fn clear_sent(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let route = request.to_string();
        self.sent.lock().unwrap().push(request.clone());
        if let Some(hook) = self.hook.lock().unwrap().as_ref() {
            hook(&request);
        }

        let next = self
            .routes
            .lock()
            .unwrap()
            .get_mut(&route)
            .and_then(VecDeque::pop_front);
        let mut last = self.last.lock().unwrap();
        match next {
            Some(response) => {
                last.insert(route, response.clone());
                response
            }
            None => last.get(&route).cloned().unwrap_or_else(|| {
                Err(ApiError::Status {
                    status: 404,
                    detail: Some(format!("no scripted response for {route}")),
                })
            }),
        }
    }
}

pub type TestClient = ApiClient<Arc<ScriptedTransport>>;

pub fn client(config: ClientConfig) -> (TestClient, Arc<ScriptedTransport>, InMemoryCacheStore) {
    let transport = ScriptedTransport::new();
    let store = InMemoryCacheStore::new();
    let client = ApiClient::with_store(transport.clone(), store.clone(), config);
    (client, transport, store)
}

pub fn payload(store: &InMemoryCacheStore, key: &QueryKey) -> Value {
    store
        .get(key)
        .unwrap()
        .and_then(|entry| entry.payload)
        .unwrap_or(Value::Null)
}

pub fn template(id: i64, day_number: u8, start_time: &str) -> Value {
    json!({
        "id": id,
        "day_number": day_number,
        "start_time": start_time,
        "responsible_trainer_id": 3,
        "training_type_id": 2,
        "assigned_students": []
    })
}

pub fn real_training(id: i64, training_date: &str, start_time: &str) -> Value {
    json!({
        "id": id,
        "training_date": training_date,
        "start_time": start_time,
        "responsible_trainer_id": 3,
        "training_type_id": 2,
        "students": []
    })
}

/// Wait for async event listeners.
pub async fn wait_until<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..50 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
