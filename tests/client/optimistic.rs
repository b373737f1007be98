//! Optimistic moves: multi-variant patching and exact rollback.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveTime};
use serde_json::{json, Value};
use training_desk::api::{
    ById, DateRange, GetTrainingTemplate, ListRealTrainings, ListTrainingTemplates, TemplateFilter,
};
use training_desk::cache::{PatchOutcome, RestoreOutcome};
use training_desk::{
    ApiClient, CacheEntry, CacheError, CacheStore, ClientConfig, EntryState, InMemoryCacheStore,
    Invalidated, InvalidationPolicy, Query, QueryKey, RollbackPolicy, Tag,
};

use crate::support::{client, payload, real_training, template, ScriptedTransport, TestClient};

fn time(s: &str) -> NaiveTime {
    NaiveTime::parse_from_str(s, "%H:%M:%S").unwrap()
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn day(n: u8) -> QueryKey {
    QueryKey::new(ListTrainingTemplates::NAME, &TemplateFilter::day(n)).unwrap()
}

fn week() -> QueryKey {
    QueryKey::new(ListTrainingTemplates::NAME, &TemplateFilter::default()).unwrap()
}

/// Day 1, day 3 and the whole week cached, template 42 cached on its own.
async fn seed_templates(client: &TestClient, transport: &ScriptedTransport) {
    transport.ok(
        "GET /training_templates/?day_number=1",
        json!([template(41, 1, "09:00:00"), template(42, 1, "10:00:00")]),
    );
    transport.ok(
        "GET /training_templates/?day_number=3",
        json!([template(50, 3, "18:00:00")]),
    );
    transport.ok(
        "GET /training_templates/",
        json!([
            template(41, 1, "09:00:00"),
            template(42, 1, "10:00:00"),
            template(50, 3, "18:00:00")
        ]),
    );
    transport.ok("GET /training_templates/42", template(42, 1, "10:00:00"));

    let templates = client.training_templates();
    templates.list(&TemplateFilter::day(1)).await.unwrap();
    templates.list(&TemplateFilter::day(3)).await.unwrap();
    templates.list(&TemplateFilter::default()).await.unwrap();
    templates.get(42).await.unwrap();
    transport.clear_sent();
}

fn ids(list: &Value) -> Vec<i64> {
    list.as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_i64().unwrap())
        .collect()
}

fn snapshot(store: &impl CacheStore, query: &str) -> Vec<(QueryKey, Value)> {
    store
        .keys_for_query(query)
        .unwrap()
        .into_iter()
        .map(|key| {
            let payload = store.get(&key).unwrap().unwrap().payload.unwrap();
            (key, payload)
        })
        .collect()
}

#[tokio::test]
async fn scenario_a_move_then_roll_back_on_server_error() {
    let (client, transport, store) = client(ClientConfig::default());
    seed_templates(&client, &transport).await;
    let before = snapshot(&store, ListTrainingTemplates::NAME);

    // What a view would render while the request is in flight.
    let in_flight = Arc::new(Mutex::new(None));
    {
        let store = store.clone();
        let in_flight = in_flight.clone();
        transport.during_send(move |_| {
            let day1 = store.get(&day(1)).unwrap().unwrap().payload.unwrap();
            let day3 = store.get(&day(3)).unwrap().unwrap().payload.unwrap();
            *in_flight.lock().unwrap() = Some((day1, day3));
        });
    }
    transport.fail("PUT /training_templates/42", 500, None);

    let err = client
        .training_templates()
        .move_to(42, 3, time("14:00:00"))
        .await
        .unwrap_err();

    let (day1, day3) = in_flight.lock().unwrap().take().unwrap();
    assert_eq!(ids(&day1), vec![41]);
    assert_eq!(ids(&day3), vec![42, 50]);
    assert_eq!(day3[0]["start_time"], "14:00:00");
    assert_eq!(day3[0]["day_number"], 3);

    assert_eq!(err.status_code(), 500);
    assert_eq!(err.user_message(), "Something went wrong. Please try again.");

    let restored = payload(&store, &day(1));
    assert_eq!(ids(&restored), vec![41, 42]);
    assert_eq!(restored[1]["start_time"], "10:00:00");
    assert_eq!(snapshot(&store, ListTrainingTemplates::NAME), before);
    assert_eq!(
        payload(&store, &QueryKey::new(GetTrainingTemplate::NAME, &ById { id: 42 }).unwrap()),
        template(42, 1, "10:00:00")
    );
    assert_eq!(transport.sent(), vec!["PUT /training_templates/42"]);
}

#[tokio::test]
async fn successful_move_updates_every_variant_identically() {
    let (client, transport, store) = client(ClientConfig::default());
    seed_templates(&client, &transport).await;
    let moved = template(42, 3, "14:00:00");
    transport.ok("PUT /training_templates/42", moved.clone());

    let result = client
        .training_templates()
        .move_to(42, 3, time("14:00:00"))
        .await
        .unwrap();
    assert_eq!(result.day_number, 3);
    assert_eq!(
        transport.last_body(),
        Some(json!({ "day_number": 3, "start_time": "14:00:00" }))
    );

    assert_eq!(ids(&payload(&store, &day(1))), vec![41]);
    let all = payload(&store, &week());
    assert_eq!(ids(&all), vec![41, 42, 50]);

    let in_day3 = payload(&store, &day(3))[0].clone();
    assert_eq!(in_day3, all[1]);
    assert_eq!(in_day3["day_number"], 3);
    assert_eq!(in_day3["start_time"], "14:00:00");

    let single = payload(&store, &QueryKey::new(GetTrainingTemplate::NAME, &ById { id: 42 }).unwrap());
    assert_eq!(single, moved);

    // The patch is trusted: no refetch follows the write.
    assert_eq!(transport.sent(), vec!["PUT /training_templates/42"]);
}

#[tokio::test]
async fn move_of_uncached_record_leaves_variants_alone() {
    let (client, transport, store) = client(ClientConfig::default());
    seed_templates(&client, &transport).await;
    let before = snapshot(&store, ListTrainingTemplates::NAME);
    let versions: Vec<u64> = before
        .iter()
        .map(|(key, _)| store.get(key).unwrap().unwrap().version)
        .collect();
    transport.ok("PUT /training_templates/77", template(77, 2, "08:00:00"));

    client
        .training_templates()
        .move_to(77, 2, time("08:00:00"))
        .await
        .unwrap();

    assert_eq!(snapshot(&store, ListTrainingTemplates::NAME), before);
    let after: Vec<u64> = before
        .iter()
        .map(|(key, _)| store.get(key).unwrap().unwrap().version)
        .collect();
    assert_eq!(after, versions);
}

#[tokio::test]
async fn real_training_move_leaves_the_week_it_no_longer_belongs_to() {
    let (client, transport, store) = client(ClientConfig::default());
    let this_week = DateRange::between(date("2024-03-04"), date("2024-03-10"));
    let next_week = DateRange::between(date("2024-03-11"), date("2024-03-17"));
    transport.ok(
        "GET /real-trainings/?start_date=2024-03-04&end_date=2024-03-10",
        json!([
            real_training(10, "2024-03-04", "18:00:00"),
            real_training(11, "2024-03-06", "18:00:00")
        ]),
    );
    transport.ok(
        "GET /real-trainings/?start_date=2024-03-11&end_date=2024-03-17",
        json!([real_training(12, "2024-03-13", "09:00:00")]),
    );
    let trainings = client.real_trainings();
    trainings.list(&this_week).await.unwrap();
    trainings.list(&next_week).await.unwrap();

    transport.ok(
        "PUT /real-trainings/10",
        real_training(10, "2024-03-12", "19:30:00"),
    );
    let moved = trainings
        .move_to(10, date("2024-03-12"), time("19:30:00"))
        .await
        .unwrap();
    assert_eq!(moved.training_date, date("2024-03-12"));

    let this_key = QueryKey::new(ListRealTrainings::NAME, &this_week).unwrap();
    let next_key = QueryKey::new(ListRealTrainings::NAME, &next_week).unwrap();
    assert_eq!(ids(&payload(&store, &this_key)), vec![11]);
    let next = payload(&store, &next_key);
    assert_eq!(ids(&next), vec![10, 12]);
    assert_eq!(next[0]["training_date"], "2024-03-12");
    assert_eq!(next[0]["start_time"], "19:30:00");
}

#[tokio::test]
async fn rollback_skips_entries_refetched_during_the_request() {
    let (client, transport, store) = client(ClientConfig::default());
    seed_templates(&client, &transport).await;

    let fresh_day3 = json!([template(50, 3, "18:00:00"), template(51, 3, "19:00:00")]);
    {
        let store = store.clone();
        let fresh = fresh_day3.clone();
        transport.during_send(move |_| {
            store.set(&day(3), fresh.clone(), vec![]).unwrap();
        });
    }
    transport.fail("PUT /training_templates/42", 409, Some("Slot already taken"));

    let err = client
        .training_templates()
        .move_to(42, 3, time("14:00:00"))
        .await
        .unwrap_err();
    assert_eq!(err.user_message(), "Slot already taken");

    // The authoritative write wins over the stale rollback.
    assert_eq!(payload(&store, &day(3)), fresh_day3);
    assert_eq!(ids(&payload(&store, &day(1))), vec![41, 42]);
}

#[tokio::test]
async fn unconditional_rollback_restores_over_newer_writes() {
    let config = ClientConfig::default().with_rollback(RollbackPolicy::Always);
    let (client, transport, store) = client(config);
    seed_templates(&client, &transport).await;

    {
        let store = store.clone();
        transport.during_send(move |_| {
            store.set(&day(3), json!([]), vec![]).unwrap();
        });
    }
    transport.fail("PUT /training_templates/42", 500, None);

    client
        .training_templates()
        .move_to(42, 3, time("14:00:00"))
        .await
        .unwrap_err();

    assert_eq!(payload(&store, &day(3)), json!([template(50, 3, "18:00:00")]));
}

#[tokio::test]
async fn invalidation_policy_adds_tags_after_a_move() {
    let policy = InvalidationPolicy::new().invalidate_after("move_training_template", "Student");
    let (client, transport, store) = client(ClientConfig::default().with_invalidation(policy));
    seed_templates(&client, &transport).await;

    transport.ok("GET /students/", json!([{ "id": 7, "first_name": "Ann", "last_name": "Lee" }]));
    client.students().list(&Default::default()).await.unwrap();
    transport.ok("PUT /training_templates/42", template(42, 3, "14:00:00"));

    client
        .training_templates()
        .move_to(42, 3, time("14:00:00"))
        .await
        .unwrap();

    let students = QueryKey::from_value("list_students", &json!({}));
    let entry = store.get(&students).unwrap().unwrap();
    assert_eq!(entry.state, EntryState::Stale);
}

#[tokio::test]
async fn failed_real_training_move_restores_both_weeks() {
    let (client, transport, store) = client(ClientConfig::default());
    let this_week = DateRange::between(date("2024-03-04"), date("2024-03-10"));
    let next_week = DateRange::between(date("2024-03-11"), date("2024-03-17"));
    transport.ok(
        "GET /real-trainings/?start_date=2024-03-04&end_date=2024-03-10",
        json!([
            real_training(10, "2024-03-04", "18:00:00"),
            real_training(11, "2024-03-06", "18:00:00")
        ]),
    );
    transport.ok(
        "GET /real-trainings/?start_date=2024-03-11&end_date=2024-03-17",
        json!([real_training(12, "2024-03-13", "09:00:00")]),
    );
    let trainings = client.real_trainings();
    trainings.list(&this_week).await.unwrap();
    trainings.list(&next_week).await.unwrap();
    let before = snapshot(&store, ListRealTrainings::NAME);

    let next_key = QueryKey::new(ListRealTrainings::NAME, &next_week).unwrap();
    let in_flight = Arc::new(Mutex::new(Vec::new()));
    {
        let store = store.clone();
        let in_flight = in_flight.clone();
        transport.during_send(move |_| {
            *in_flight.lock().unwrap() = ids(&payload(&store, &next_key));
        });
    }
    transport.fail("PUT /real-trainings/10", 400, Some("Trainer is busy at this time"));

    let err = trainings
        .move_to(10, date("2024-03-12"), time("19:30:00"))
        .await
        .unwrap_err();

    assert_eq!(*in_flight.lock().unwrap(), vec![10, 12]);
    assert_eq!(err.user_message(), "Trainer is busy at this time");
    assert_eq!(snapshot(&store, ListRealTrainings::NAME), before);
}

/// Store whose restores always fail.
struct BrokenRestore(InMemoryCacheStore);

impl CacheStore for BrokenRestore {
    fn get(&self, key: &QueryKey) -> Result<Option<CacheEntry>, CacheError> {
        self.0.get(key)
    }

    fn set(&self, key: &QueryKey, payload: Value, tags: Vec<Tag>) -> Result<u64, CacheError> {
        self.0.set(key, payload, tags)
    }

    fn begin_fetch(&self, key: &QueryKey) -> Result<(), CacheError> {
        self.0.begin_fetch(key)
    }

    fn fail(&self, key: &QueryKey, message: &str) -> Result<(), CacheError> {
        self.0.fail(key, message)
    }

    fn patch(
        &self,
        key: &QueryKey,
        edit: &mut dyn FnMut(&Value, &mut Value) -> bool,
    ) -> Result<Option<PatchOutcome>, CacheError> {
        self.0.patch(key, edit)
    }

    fn restore(
        &self,
        _key: &QueryKey,
        _prior: Value,
        _expected_version: Option<u64>,
    ) -> Result<RestoreOutcome, CacheError> {
        Err(CacheError::LockPoisoned("restore"))
    }

    fn keys_for_query(&self, query: &str) -> Result<Vec<QueryKey>, CacheError> {
        self.0.keys_for_query(query)
    }

    fn pending_refetch(&self) -> Result<Vec<QueryKey>, CacheError> {
        self.0.pending_refetch()
    }

    fn invalidate(&self, tags: &[Tag]) -> Result<Vec<Invalidated>, CacheError> {
        self.0.invalidate(tags)
    }

    fn subscribe(&self, key: &QueryKey) -> Result<usize, CacheError> {
        self.0.subscribe(key)
    }

    fn unsubscribe(&self, key: &QueryKey, now: Instant) -> Result<usize, CacheError> {
        self.0.unsubscribe(key, now)
    }

    fn evict_unused(&self, now: Instant, retention: Duration) -> Result<Vec<QueryKey>, CacheError> {
        self.0.evict_unused(now, retention)
    }
}

#[tokio::test]
async fn backend_error_survives_a_broken_rollback() {
    let store = InMemoryCacheStore::new();
    store
        .set(
            &day(1),
            json!([template(41, 1, "09:00:00"), template(42, 1, "10:00:00")]),
            vec![],
        )
        .unwrap();
    let transport = ScriptedTransport::new();
    transport.fail("PUT /training_templates/42", 400, Some("Trainer is busy at this time"));
    let client = ApiClient::with_store(transport.clone(), BrokenRestore(store), ClientConfig::default());

    let err = client
        .training_templates()
        .move_to(42, 3, time("14:00:00"))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 400);
    assert_eq!(err.detail(), Some("Trainer is busy at this time"));
}
