//! Tag invalidation and response-derived edits.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use serde_json::json;
use training_desk::api::{
    ById, GetTrainingTemplate, List, ListTrainingTemplates, PageArgs, Student, StudentInput,
    TemplateFilter, TrainingStudentTemplateInput,
};
use training_desk::client::CACHE_INVALIDATED;
use training_desk::{CacheStore, ClientConfig, EntryState, Query, QueryKey, Tag};

use crate::support::{client, payload, template, wait_until};

fn week() -> QueryKey {
    QueryKey::new(ListTrainingTemplates::NAME, &TemplateFilter::default()).unwrap()
}

fn single(id: i64) -> QueryKey {
    QueryKey::new(GetTrainingTemplate::NAME, &ById { id }).unwrap()
}

fn students_key() -> QueryKey {
    QueryKey::new(<List<Student>>::NAME, &PageArgs::all()).unwrap()
}

fn student(id: i64, first_name: &str) -> serde_json::Value {
    json!({ "id": id, "first_name": first_name, "last_name": "Lee", "is_active": true })
}

fn new_student() -> StudentInput {
    StudentInput {
        first_name: "Bo".into(),
        last_name: "Lee".into(),
        ..StudentInput::default()
    }
}

#[tokio::test]
async fn scenario_b_created_assignment_lands_in_parent_template() {
    let (client, transport, store) = client(ClientConfig::default());
    transport.ok(
        "GET /training_templates/",
        json!([template(41, 1, "09:00:00"), template(42, 1, "10:00:00")]),
    );
    transport.ok("GET /training_templates/42", template(42, 1, "10:00:00"));
    client.training_templates().list(&TemplateFilter::default()).await.unwrap();
    client.training_templates().get(42).await.unwrap();

    let created = json!({
        "id": 5,
        "training_template_id": 42,
        "student_id": 7,
        "start_date": "2024-01-01",
        "is_frozen": false
    });
    transport.ok("POST /training_student_templates/", created.clone());

    let input = TrainingStudentTemplateInput {
        training_template_id: 42,
        student_id: 7,
        start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
    };
    let assignment = client.student_templates().create(&input).await.unwrap();
    assert_eq!(assignment.id, 5);
    assert_eq!(
        transport.last_body(),
        Some(json!({ "training_template_id": 42, "student_id": 7, "start_date": "2024-01-01" }))
    );

    let list = payload(&store, &week());
    assert_eq!(list[1]["assigned_students"], json!([created.clone()]));
    assert_eq!(list[0]["assigned_students"], json!([]));
    assert_eq!(payload(&store, &single(42))["assigned_students"], json!([created]));

    // Nobody watches the template views, so they wait for their next read.
    assert_eq!(store.get(&week()).unwrap().unwrap().state, EntryState::Stale);
    assert_eq!(store.get(&single(42)).unwrap().unwrap().state, EntryState::Stale);
    assert_eq!(
        transport.sent().last().map(String::as_str),
        Some("POST /training_student_templates/")
    );
}

#[tokio::test]
async fn scenario_c_deleted_assignment_leaves_parent_template() {
    let (client, transport, store) = client(ClientConfig::default());
    let mut parent = template(42, 1, "10:00:00");
    parent["assigned_students"] = json!([
        { "id": 99, "training_template_id": 42, "student_id": 7, "start_date": "2024-01-01" },
        { "id": 100, "training_template_id": 42, "student_id": 8, "start_date": "2024-02-01" }
    ]);
    transport.ok("GET /training_templates/", json!([parent.clone()]));
    transport.ok("GET /training_templates/42", parent);
    client.training_templates().list(&TemplateFilter::default()).await.unwrap();
    client.training_templates().get(42).await.unwrap();

    transport.ok(
        "DELETE /training_student_templates/99",
        json!({ "id": 99, "training_template_id": 42, "student_id": 7, "start_date": "2024-01-01" }),
    );
    client.student_templates().delete(99).await.unwrap();

    for key in [week(), single(42)] {
        let remaining = payload(&store, &key);
        let students = if remaining.is_array() {
            remaining[0]["assigned_students"].clone()
        } else {
            remaining["assigned_students"].clone()
        };
        let ids: Vec<i64> = students
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![100], "{key}");
    }
    // Parent id came from the echoed record.
    assert_eq!(store.get(&single(42)).unwrap().unwrap().state, EntryState::Stale);
}

#[tokio::test]
async fn subscribed_entries_move_to_refetching() {
    let config = ClientConfig::default().with_refetch_on_invalidate(false);
    let (client, transport, store) = client(config);
    let key = client.subscribe::<List<Student>>(&PageArgs::all()).unwrap();
    transport.ok("GET /students/", json!([student(7, "Ann")]));
    client.students().list(&PageArgs::all()).await.unwrap();

    transport.ok("POST /students/", student(8, "Bo"));
    client.students().create(&new_student()).await.unwrap();

    let entry = store.get(&key).unwrap().unwrap();
    assert_eq!(entry.state, EntryState::Refetching);
    // The old payload stays visible until the refetch lands.
    assert_eq!(entry.payload, Some(json!([student(7, "Ann")])));
    assert_eq!(store.pending_refetch().unwrap(), vec![key.clone()]);

    transport.ok("GET /students/", json!([student(7, "Ann"), student(8, "Bo")]));
    let results = client.refetch_pending().await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].1.is_ok());

    let entry = store.get(&key).unwrap().unwrap();
    assert_eq!(entry.state, EntryState::Ready);
    assert_eq!(entry.payload, Some(json!([student(7, "Ann"), student(8, "Bo")])));
}

#[tokio::test]
async fn refetch_runs_right_after_the_write() {
    let (client, transport, store) = client(ClientConfig::default());
    let key = client.subscribe::<List<Student>>(&PageArgs::all()).unwrap();
    transport.ok("GET /students/", json!([student(7, "Ann")]));
    client.students().list(&PageArgs::all()).await.unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let store = store.clone();
        let seen = seen.clone();
        let key = key.clone();
        transport.during_send(move |request| {
            let state = store.get(&key).unwrap().unwrap().state;
            seen.lock().unwrap().push((request.to_string(), state));
        });
    }
    transport.ok("POST /students/", student(8, "Bo"));
    transport.ok("GET /students/", json!([student(7, "Ann"), student(8, "Bo")]));

    client.students().create(&new_student()).await.unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ("POST /students/".to_string(), EntryState::Ready),
            ("GET /students/".to_string(), EntryState::Refetching),
        ]
    );
    let entry = store.get(&key).unwrap().unwrap();
    assert_eq!(entry.state, EntryState::Ready);
    assert_eq!(entry.payload, Some(json!([student(7, "Ann"), student(8, "Bo")])));
}

#[tokio::test]
async fn unwatched_entries_refetch_lazily() {
    let (client, transport, store) = client(ClientConfig::default());
    transport.ok("GET /students/", json!([student(7, "Ann")]));
    client.students().list(&PageArgs::all()).await.unwrap();

    transport.ok("DELETE /students/7", json!({ "id": 7 }));
    client.students().delete(7).await.unwrap();
    assert_eq!(store.get(&students_key()).unwrap().unwrap().state, EntryState::Stale);
    assert_eq!(
        transport.sent(),
        vec!["GET /students/", "DELETE /students/7"]
    );

    transport.ok("GET /students/", json!([]));
    assert!(client.students().list(&PageArgs::all()).await.unwrap().is_empty());
    assert_eq!(transport.sent().len(), 3);
}

#[tokio::test]
async fn invalidating_an_unused_tag_is_a_no_op() {
    let (client, transport, _store) = client(ClientConfig::default());
    let touched = client.invalidate(&[Tag::list("Trainer")]).await.unwrap();
    assert!(touched.is_empty());
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn listeners_hear_about_invalidations() {
    let config = ClientConfig::default().with_refetch_on_invalidate(false);
    let (client, transport, _store) = client(config);
    let heard = Arc::new(Mutex::new(Vec::new()));
    {
        let heard = heard.clone();
        client.on(CACHE_INVALIDATED, move |key: String| {
            heard.lock().unwrap().push(key);
        });
    }

    transport.ok("GET /students/", json!([student(7, "Ann")]));
    client.students().list(&PageArgs::all()).await.unwrap();
    client.invalidate(&[Tag::id("Student", 7)]).await.unwrap();

    assert!(wait_until(|| !heard.lock().unwrap().is_empty()).await);
    assert_eq!(*heard.lock().unwrap(), vec![students_key().to_string()]);
}

#[tokio::test]
async fn unused_entries_survive_the_retention_window() {
    let (client, transport, store) = client(ClientConfig::default());
    let key = client.subscribe::<List<Student>>(&PageArgs::all()).unwrap();
    transport.ok("GET /students/", json!([]));
    client.students().list(&PageArgs::all()).await.unwrap();
    client.unsubscribe(&key).unwrap();

    let now = Instant::now();
    assert!(client.evict_unused_at(now + Duration::from_secs(30)).unwrap().is_empty());
    assert_eq!(
        client.evict_unused_at(now + Duration::from_secs(61)).unwrap(),
        vec![key.clone()]
    );
    assert!(store.get(&key).unwrap().is_none());
}
