use std::ops::Deref;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::resource::{Paged, Resource, Resources};
use crate::cache::{CacheStore, Tag};
use crate::client::{ApiClient, ClientError};
use crate::query::{list_tags, Query};
use crate::record::RecordId;
use crate::transport::{ApiRequest, Transport};
use crate::Record;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Record)]
pub struct Student {
    pub id: RecordId,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub parent_name: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentInput {
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,
    pub is_active: bool,
}

impl Resource for Student {
    const PATH: &'static str = "/students/";
    const SINGULAR: &'static str = "student";
    const GET_QUERY: &'static str = "get_student";
    type Input = StudentInput;
}

impl Paged for Student {
    const LIST_QUERY: &'static str = "list_students";
}

/// A subscription plan bought by one student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Record)]
pub struct StudentSubscription {
    pub id: RecordId,
    pub student_id: RecordId,
    pub subscription_id: RecordId,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub sessions_left: Option<i32>,
    #[serde(default)]
    pub is_auto_renew: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentSubscriptionInput {
    pub subscription_id: RecordId,
    pub start_date: NaiveDate,
    pub is_auto_renew: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentArgs {
    pub student_id: RecordId,
}

/// Subscriptions of one student, `GET /students/{id}/subscriptions`.
pub struct ListStudentSubscriptions;

impl Query for ListStudentSubscriptions {
    const NAME: &'static str = "list_student_subscriptions";
    const SORT_BY: &'static [&'static str] = &["start_date"];
    type Args = StudentArgs;
    type Output = Vec<StudentSubscription>;

    fn request(args: &StudentArgs) -> ApiRequest {
        ApiRequest::get(format!("{}/subscriptions", Student::item_path(args.student_id)))
    }

    fn provides(args: &StudentArgs, payload: &Value) -> Vec<Tag> {
        let mut tags = list_tags(StudentSubscription::KIND, payload);
        tags.push(Tag::id(Student::KIND, args.student_id));
        tags
    }

    fn matches(args: &StudentArgs, record: &Value) -> bool {
        record.get("student_id").and_then(Value::as_i64) == Some(args.student_id)
    }
}

/// Student CRUD plus the student's subscriptions.
pub struct Students<'a, T, S> {
    client: &'a ApiClient<T, S>,
    resources: Resources<'a, Student, T, S>,
}

impl<'a, T: Transport, S: CacheStore> Students<'a, T, S> {
    pub(crate) fn new(client: &'a ApiClient<T, S>) -> Self {
        Self {
            client,
            resources: Resources::new(client),
        }
    }

    pub async fn subscriptions(
        &self,
        student_id: RecordId,
    ) -> Result<Vec<StudentSubscription>, ClientError> {
        self.client
            .query::<ListStudentSubscriptions>(&StudentArgs { student_id })
            .await
    }

    /// Sell a subscription to a student.
    pub async fn add_subscription(
        &self,
        student_id: RecordId,
        input: &StudentSubscriptionInput,
    ) -> Result<StudentSubscription, ClientError> {
        let request = ApiRequest::post(format!(
            "{}/subscriptions",
            Student::item_path(student_id)
        ))
        .json(input)?;
        let response = self
            .client
            .mutation("add_student_subscription", request)
            .invalidates([
                Tag::list(StudentSubscription::KIND),
                Tag::id(Student::KIND, student_id),
            ])
            .send()
            .await?;
        Ok(serde_json::from_value(response)?)
    }
}

impl<'a, T, S> Deref for Students<'a, T, S> {
    type Target = Resources<'a, Student, T, S>;

    fn deref(&self) -> &Self::Target {
        &self.resources
    }
}
