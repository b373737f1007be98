//! Overlapping optimistic mutations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveTime;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use training_desk::api::{ListTrainingTemplates, TemplateFilter};
use training_desk::{
    ApiClient, ApiError, ApiRequest, CacheStore, ClientConfig, InMemoryCacheStore, Query,
    QueryKey, RollbackPolicy, Tag, Transport,
};

use crate::support::{payload, template};

/// Holds each request until the test releases its response.
#[derive(Default)]
struct GatedTransport {
    gates: Mutex<HashMap<String, oneshot::Receiver<Result<Value, ApiError>>>>,
}

impl GatedTransport {
    fn gate(&self, route: &str) -> oneshot::Sender<Result<Value, ApiError>> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(route.to_string(), rx);
        tx
    }
}

#[async_trait]
impl Transport for GatedTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let gate = self.gates.lock().unwrap().remove(&request.to_string());
        match gate {
            Some(gate) => gate
                .await
                .unwrap_or_else(|_| Err(ApiError::Transport("gate dropped".into()))),
            None => Err(ApiError::Status {
                status: 404,
                detail: None,
            }),
        }
    }
}

fn day(n: u8) -> QueryKey {
    QueryKey::new(ListTrainingTemplates::NAME, &TemplateFilter::day(n)).unwrap()
}

fn time(s: &str) -> NaiveTime {
    NaiveTime::parse_from_str(s, "%H:%M:%S").unwrap()
}

fn seeded(policy: RollbackPolicy) -> (ApiClient<Arc<GatedTransport>>, Arc<GatedTransport>, InMemoryCacheStore) {
    let transport = Arc::new(GatedTransport::default());
    let store = InMemoryCacheStore::new();
    let tags = vec![Tag::list("TrainingTemplate")];
    store
        .set(
            &day(1),
            json!([template(41, 1, "09:00:00"), template(42, 1, "10:00:00")]),
            tags.clone(),
        )
        .unwrap();
    store
        .set(&day(3), json!([template(50, 3, "18:00:00")]), tags)
        .unwrap();
    let config = ClientConfig::default().with_rollback(policy);
    let client = ApiClient::with_store(transport.clone(), store.clone(), config);
    (client, transport, store)
}

fn ids(list: &Value) -> Vec<i64> {
    list.as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_i64().unwrap())
        .collect()
}

/// Move 42 (fails) and 41 (succeeds) at the same time; 41 settles first.
async fn race(client: &ApiClient<Arc<GatedTransport>>, transport: &GatedTransport) {
    let fail_42 = transport.gate("PUT /training_templates/42");
    let ok_41 = transport.gate("PUT /training_templates/41");

    let templates = client.training_templates();
    let move_42 = templates.move_to(42, 3, time("14:00:00"));
    let move_41 = templates.move_to(41, 3, time("15:00:00"));
    let backend = async {
        tokio::task::yield_now().await;
        ok_41.send(Ok(template(41, 3, "15:00:00"))).unwrap();
        tokio::task::yield_now().await;
        fail_42
            .send(Err(ApiError::Status {
                status: 500,
                detail: None,
            }))
            .unwrap();
    };

    let (moved_42, moved_41, ()) = tokio::join!(move_42, move_41, backend);
    assert_eq!(moved_42.unwrap_err().status_code(), 500);
    assert_eq!(moved_41.unwrap().day_number, 3);
}

#[tokio::test]
async fn failed_rollback_does_not_clobber_a_confirmed_move() {
    let (client, transport, store) = seeded(RollbackPolicy::VersionChecked);
    race(&client, &transport).await;

    let day1 = payload(&store, &day(1));
    let day3 = payload(&store, &day(3));
    assert!(!ids(&day1).contains(&41));
    assert!(ids(&day3).contains(&41));
    let moved = day3
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["id"] == 41)
        .unwrap();
    assert_eq!(moved["start_time"], "15:00:00");

    // The rejected move of 42 is taken back inside the newer payloads.
    assert_eq!(day1, json!([template(42, 1, "10:00:00")]));
    assert_eq!(ids(&day3), vec![41, 50]);
}

#[tokio::test]
async fn rollback_leaves_a_record_moved_again_by_a_later_write() {
    let (client, transport, store) = seeded(RollbackPolicy::VersionChecked);
    let fail_first = transport.gate("PUT /training_templates/42");

    let templates = client.training_templates();
    let first = templates.move_to(42, 3, time("14:00:00"));
    let backend = async {
        tokio::task::yield_now().await;
        // The same record moves again while the first move is in flight.
        let second = templates.move_to(42, 3, time("16:00:00"));
        let ok_second = transport.gate("PUT /training_templates/42");
        ok_second.send(Ok(template(42, 3, "16:00:00"))).unwrap();
        second.await.unwrap();
        fail_first
            .send(Err(ApiError::Status {
                status: 500,
                detail: None,
            }))
            .unwrap();
    };

    let (failed, ()) = tokio::join!(first, backend);
    assert_eq!(failed.unwrap_err().status_code(), 500);

    assert_eq!(ids(&payload(&store, &day(1))), vec![41]);
    let day3 = payload(&store, &day(3));
    assert_eq!(ids(&day3), vec![42, 50]);
    assert_eq!(day3[0]["start_time"], "16:00:00");
}

#[tokio::test]
async fn unconditional_rollback_restores_the_pre_patch_state() {
    let (client, transport, store) = seeded(RollbackPolicy::Always);
    race(&client, &transport).await;

    // Both entries go back to what the failed move saw, undoing the other move too.
    assert_eq!(ids(&payload(&store, &day(1))), vec![41, 42]);
    assert_eq!(ids(&payload(&store, &day(3))), vec![50]);
}
