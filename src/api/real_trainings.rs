//! Dated trainings on the calendar and their student rows.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::resource::{self, ById, Get, Resource};
use super::students::StudentSubscription;
use crate::cache::{CacheStore, Tag};
use crate::client::{ApiClient, ClientError};
use crate::mutation::RecordEdit;
use crate::query::{list_tags, Query};
use crate::record::RecordId;
use crate::transport::{ApiRequest, Transport};
use crate::Record;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Record)]
pub struct RealTraining {
    pub id: RecordId,
    pub training_date: NaiveDate,
    pub start_time: NaiveTime,
    pub responsible_trainer_id: RecordId,
    pub training_type_id: RecordId,
    #[serde(default)]
    pub template_id: Option<RecordId>,
    #[serde(default)]
    pub is_template_based: bool,
    #[serde(default)]
    pub cancelled_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
    #[serde(default)]
    pub students: Vec<RealTrainingStudent>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RealTraining {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealTrainingInput {
    pub training_date: NaiveDate,
    pub start_time: NaiveTime,
    pub responsible_trainer_id: RecordId,
    pub training_type_id: RecordId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    Registered,
    Present,
    Absent,
    Cancelled,
    #[serde(other)]
    Unknown,
}

/// A student's place in one dated training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Record)]
pub struct RealTrainingStudent {
    pub id: RecordId,
    pub real_training_id: RecordId,
    pub student_id: RecordId,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub cancelled_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealTrainingStudentInput {
    pub student_id: RecordId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_student_id: Option<RecordId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentCancellation {
    pub reason: String,
    /// When the student gave notice; the backend decides whether the session
    /// is refunded from it.
    pub notification_time: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingCancellation {
    pub reason: String,
    #[serde(default)]
    pub process_refunds: bool,
}

impl Resource for RealTraining {
    const PATH: &'static str = "/real-trainings/";
    const SINGULAR: &'static str = "real_training";
    const GET_QUERY: &'static str = "get_real_training";
    type Input = RealTrainingInput;
}

/// Calendar range; both bounds inclusive, either may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
}

impl DateRange {
    pub fn between(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date: Some(start_date),
            end_date: Some(end_date),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date.map_or(true, |start| date >= start)
            && self.end_date.map_or(true, |end| date <= end)
    }
}

pub struct ListRealTrainings;

impl Query for ListRealTrainings {
    const NAME: &'static str = "list_real_trainings";
    const SORT_BY: &'static [&'static str] = &["training_date", "start_time"];
    type Args = DateRange;
    type Output = Vec<RealTraining>;

    fn request(args: &DateRange) -> ApiRequest {
        ApiRequest::get(RealTraining::PATH)
            .param_opt("start_date", args.start_date)
            .param_opt("end_date", args.end_date)
    }

    fn provides(_args: &DateRange, payload: &Value) -> Vec<Tag> {
        list_tags(RealTraining::KIND, payload)
    }

    fn matches(args: &DateRange, record: &Value) -> bool {
        if args.start_date.is_none() && args.end_date.is_none() {
            return true;
        }
        record
            .get("training_date")
            .and_then(Value::as_str)
            .and_then(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok())
            .map_or(false, |date| args.contains(date))
    }
}

pub type GetRealTraining = Get<RealTraining>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingArgs {
    pub real_training_id: RecordId,
}

/// Student rows of one training, `GET /real-trainings/{id}/students`.
pub struct ListRealTrainingStudents;

impl Query for ListRealTrainingStudents {
    const NAME: &'static str = "list_real_training_students";
    type Args = TrainingArgs;
    type Output = Vec<RealTrainingStudent>;

    fn request(args: &TrainingArgs) -> ApiRequest {
        ApiRequest::get(students_path(args.real_training_id))
    }

    fn provides(args: &TrainingArgs, payload: &Value) -> Vec<Tag> {
        let mut tags = list_tags(RealTrainingStudent::KIND, payload);
        tags.push(Tag::id(RealTraining::KIND, args.real_training_id));
        tags
    }
}

const STUDENTS: &str = "students";

fn students_path(training_id: RecordId) -> String {
    format!("{}/students", RealTraining::item_path(training_id))
}

fn student_path(training_id: RecordId, student_id: RecordId) -> String {
    format!("{}/{}", students_path(training_id), student_id)
}

/// Tags of a child row change: the rows and the parent training.
fn student_row_tags(training_id: RecordId) -> [Tag; 2] {
    [
        Tag::list(RealTrainingStudent::KIND),
        Tag::id(RealTraining::KIND, training_id),
    ]
}

#[derive(Serialize)]
struct Move {
    training_date: NaiveDate,
    start_time: NaiveTime,
}

#[derive(Serialize)]
struct Attendance {
    status: AttendanceStatus,
}

/// Accessor for dated trainings, from `ApiClient::real_trainings`.
pub struct RealTrainings<'a, T, S> {
    client: &'a ApiClient<T, S>,
}

impl<'a, T: Transport, S: CacheStore> RealTrainings<'a, T, S> {
    pub(crate) fn new(client: &'a ApiClient<T, S>) -> Self {
        Self { client }
    }

    pub async fn list(&self, range: &DateRange) -> Result<Vec<RealTraining>, ClientError> {
        self.client.query::<ListRealTrainings>(range).await
    }

    pub async fn get(&self, id: RecordId) -> Result<RealTraining, ClientError> {
        self.client.query::<GetRealTraining>(&ById { id }).await
    }

    pub async fn students(&self, id: RecordId) -> Result<Vec<RealTrainingStudent>, ClientError> {
        self.client
            .query::<ListRealTrainingStudents>(&TrainingArgs { real_training_id: id })
            .await
    }

    pub async fn create(&self, input: &RealTrainingInput) -> Result<RealTraining, ClientError> {
        resource::create::<RealTraining, T, S>(self.client, input).await
    }

    pub async fn update(
        &self,
        id: RecordId,
        input: &RealTrainingInput,
    ) -> Result<RealTraining, ClientError> {
        resource::update::<RealTraining, T, S>(self.client, id, input).await
    }

    pub async fn delete(&self, id: RecordId) -> Result<(), ClientError> {
        resource::delete::<RealTraining, T, S>(self.client, id).await
    }

    /// Move a training to another date and time, optimistically.
    pub async fn move_to(
        &self,
        id: RecordId,
        training_date: NaiveDate,
        start_time: NaiveTime,
    ) -> Result<RealTraining, ClientError> {
        let body = Move {
            training_date,
            start_time,
        };
        let response = self
            .client
            .mutation(
                "move_real_training",
                ApiRequest::put(RealTraining::item_path(id)).json(&body)?,
            )
            .optimistic(RecordEdit::update(ListRealTrainings::NAME, id, &body)?)
            .optimistic(RecordEdit::update(GetRealTraining::NAME, id, &body)?)
            .send()
            .await?;
        Ok(serde_json::from_value(response)?)
    }

    pub async fn add_student(
        &self,
        id: RecordId,
        input: &RealTrainingStudentInput,
    ) -> Result<RealTrainingStudent, ClientError> {
        let response = self
            .client
            .mutation(
                "add_real_training_student",
                ApiRequest::post(students_path(id)).json(input)?,
            )
            .reconcile(move |row| {
                [ListRealTrainings::NAME, GetRealTraining::NAME]
                    .into_iter()
                    .map(|query| RecordEdit::UpsertChild {
                        query,
                        parent_id: id,
                        field: STUDENTS,
                        child: row.clone(),
                    })
                    .collect()
            })
            .invalidates(student_row_tags(id))
            .send()
            .await?;
        Ok(serde_json::from_value(response)?)
    }

    pub async fn remove_student(&self, id: RecordId, student_id: RecordId) -> Result<(), ClientError> {
        self.client
            .mutation(
                "remove_real_training_student",
                ApiRequest::delete(student_path(id, student_id)),
            )
            .invalidates(student_row_tags(id))
            .send()
            .await?;
        Ok(())
    }

    pub async fn mark_attendance(
        &self,
        id: RecordId,
        student_id: RecordId,
        status: AttendanceStatus,
    ) -> Result<RealTrainingStudent, ClientError> {
        let request = ApiRequest::put(format!("{}/attendance", student_path(id, student_id)))
            .json(&Attendance { status })?;
        let response = self
            .client
            .mutation("mark_attendance", request)
            .invalidates(student_row_tags(id))
            .send()
            .await?;
        Ok(serde_json::from_value(response)?)
    }

    /// Cancel one student's place. Session refunds change the student's
    /// subscriptions as well.
    pub async fn cancel_student(
        &self,
        id: RecordId,
        student_id: RecordId,
        cancellation: &StudentCancellation,
    ) -> Result<Value, ClientError> {
        let request = ApiRequest::post(format!("{}/cancel", student_path(id, student_id)))
            .json(cancellation)?;
        self.client
            .mutation("cancel_real_training_student", request)
            .invalidates(student_row_tags(id))
            .invalidates([Tag::list(StudentSubscription::KIND)])
            .send()
            .await
    }

    pub async fn cancel(
        &self,
        id: RecordId,
        cancellation: &TrainingCancellation,
    ) -> Result<RealTraining, ClientError> {
        let request = ApiRequest::post(format!("{}/cancel", RealTraining::item_path(id)))
            .json(cancellation)?;
        let response = self
            .client
            .mutation("cancel_real_training", request)
            .invalidates([
                Tag::list(RealTraining::KIND),
                Tag::id(RealTraining::KIND, id),
                Tag::list(StudentSubscription::KIND),
            ])
            .send()
            .await?;
        Ok(serde_json::from_value(response)?)
    }

    /// Create next week's trainings from the templates.
    pub async fn generate_next_week(&self) -> Result<Value, ClientError> {
        self.client
            .mutation(
                "generate_next_week",
                ApiRequest::post(format!("{}generate-next-week", RealTraining::PATH)),
            )
            .invalidates([Tag::list(RealTraining::KIND)])
            .send()
            .await
    }
}
