//! Weekly schedule: training templates and their assigned students.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::resource::{self, ById, Get, Resource};
use crate::cache::{CacheStore, Tag};
use crate::client::{ApiClient, ClientError};
use crate::mutation::RecordEdit;
use crate::query::{list_tags, Query};
use crate::record::{value_id, RecordId};
use crate::transport::{ApiRequest, Transport};
use crate::Record;

/// A recurring weekly slot. `day_number` runs 1 (Monday) to 7 (Sunday).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Record)]
pub struct TrainingTemplate {
    pub id: RecordId,
    pub day_number: u8,
    pub start_time: NaiveTime,
    pub responsible_trainer_id: RecordId,
    pub training_type_id: RecordId,
    #[serde(default)]
    pub assigned_students: Vec<TrainingStudentTemplate>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingTemplateInput {
    pub day_number: u8,
    pub start_time: NaiveTime,
    pub responsible_trainer_id: RecordId,
    pub training_type_id: RecordId,
}

/// A student assigned to a template from `start_date` on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Record)]
pub struct TrainingStudentTemplate {
    pub id: RecordId,
    pub training_template_id: RecordId,
    pub student_id: RecordId,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub is_frozen: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingStudentTemplateInput {
    pub training_template_id: RecordId,
    pub student_id: RecordId,
    pub start_date: NaiveDate,
}

impl Resource for TrainingTemplate {
    const PATH: &'static str = "/training_templates/";
    const SINGULAR: &'static str = "training_template";
    const GET_QUERY: &'static str = "get_training_template";
    type Input = TrainingTemplateInput;
}

impl Resource for TrainingStudentTemplate {
    const PATH: &'static str = "/training_student_templates/";
    const SINGULAR: &'static str = "training_student_template";
    const GET_QUERY: &'static str = "get_training_student_template";
    type Input = TrainingStudentTemplateInput;
}

/// Template list arguments; `None` lists the whole week.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_number: Option<u8>,
}

impl TemplateFilter {
    pub fn day(day_number: u8) -> Self {
        Self {
            day_number: Some(day_number),
        }
    }
}

pub struct ListTrainingTemplates;

impl Query for ListTrainingTemplates {
    const NAME: &'static str = "list_training_templates";
    const SORT_BY: &'static [&'static str] = &["day_number", "start_time"];
    type Args = TemplateFilter;
    type Output = Vec<TrainingTemplate>;

    fn request(args: &TemplateFilter) -> ApiRequest {
        ApiRequest::get(TrainingTemplate::PATH).param_opt("day_number", args.day_number)
    }

    fn provides(_args: &TemplateFilter, payload: &Value) -> Vec<Tag> {
        list_tags(TrainingTemplate::KIND, payload)
    }

    fn matches(args: &TemplateFilter, record: &Value) -> bool {
        match args.day_number {
            Some(day) => record.get("day_number").and_then(Value::as_u64) == Some(u64::from(day)),
            None => true,
        }
    }
}

pub type GetTrainingTemplate = Get<TrainingTemplate>;

const ASSIGNED_STUDENTS: &str = "assigned_students";

#[derive(Serialize)]
struct Move {
    day_number: u8,
    start_time: NaiveTime,
}

/// Accessor for templates, from `ApiClient::training_templates`.
pub struct TrainingTemplates<'a, T, S> {
    client: &'a ApiClient<T, S>,
}

impl<'a, T: Transport, S: CacheStore> TrainingTemplates<'a, T, S> {
    pub(crate) fn new(client: &'a ApiClient<T, S>) -> Self {
        Self { client }
    }

    pub async fn list(&self, filter: &TemplateFilter) -> Result<Vec<TrainingTemplate>, ClientError> {
        self.client.query::<ListTrainingTemplates>(filter).await
    }

    pub async fn get(&self, id: RecordId) -> Result<TrainingTemplate, ClientError> {
        self.client.query::<GetTrainingTemplate>(&ById { id }).await
    }

    pub async fn create(&self, input: &TrainingTemplateInput) -> Result<TrainingTemplate, ClientError> {
        resource::create::<TrainingTemplate, T, S>(self.client, input).await
    }

    pub async fn update(
        &self,
        id: RecordId,
        input: &TrainingTemplateInput,
    ) -> Result<TrainingTemplate, ClientError> {
        resource::update::<TrainingTemplate, T, S>(self.client, id, input).await
    }

    pub async fn delete(&self, id: RecordId) -> Result<(), ClientError> {
        resource::delete::<TrainingTemplate, T, S>(self.client, id).await
    }

    /// Move a template to another day and time.
    ///
    /// Every cached template list and the cached template itself show the new
    /// slot before the request is sent; a failed request puts them back.
    pub async fn move_to(
        &self,
        id: RecordId,
        day_number: u8,
        start_time: NaiveTime,
    ) -> Result<TrainingTemplate, ClientError> {
        let body = Move {
            day_number,
            start_time,
        };
        let response = self
            .client
            .mutation(
                "move_training_template",
                ApiRequest::put(TrainingTemplate::item_path(id)).json(&body)?,
            )
            .optimistic(RecordEdit::update(ListTrainingTemplates::NAME, id, &body)?)
            .optimistic(RecordEdit::update(GetTrainingTemplate::NAME, id, &body)?)
            .send()
            .await?;
        Ok(serde_json::from_value(response)?)
    }
}

/// Accessor for template assignments, from `ApiClient::student_templates`.
///
/// Writes splice the server's record into the parent template's
/// `assigned_students` wherever the template is cached, then invalidate.
pub struct StudentTemplates<'a, T, S> {
    client: &'a ApiClient<T, S>,
}

impl<'a, T: Transport, S: CacheStore> StudentTemplates<'a, T, S> {
    pub(crate) fn new(client: &'a ApiClient<T, S>) -> Self {
        Self { client }
    }

    pub async fn create(
        &self,
        input: &TrainingStudentTemplateInput,
    ) -> Result<TrainingStudentTemplate, ClientError> {
        let parent_id = input.training_template_id;
        let response = self
            .client
            .mutation(
                "create_training_student_template",
                ApiRequest::post(TrainingStudentTemplate::PATH).json(input)?,
            )
            .reconcile(move |created| upsert_assignment(parent_id, created))
            .invalidates(assignment_tags(parent_id))
            .send()
            .await?;
        Ok(serde_json::from_value(response)?)
    }

    pub async fn update(
        &self,
        id: RecordId,
        input: &TrainingStudentTemplateInput,
    ) -> Result<TrainingStudentTemplate, ClientError> {
        let parent_id = input.training_template_id;
        let response = self
            .client
            .mutation(
                "update_training_student_template",
                ApiRequest::put(TrainingStudentTemplate::item_path(id)).json(input)?,
            )
            .reconcile(move |updated| upsert_assignment(parent_id, updated))
            .invalidates(assignment_tags(parent_id))
            .invalidates([Tag::id(TrainingStudentTemplate::KIND, id)])
            .send()
            .await?;
        Ok(serde_json::from_value(response)?)
    }

    /// Delete an assignment. The parent comes from the echoed record.
    pub async fn delete(&self, id: RecordId) -> Result<TrainingStudentTemplate, ClientError> {
        let response = self
            .client
            .mutation(
                "delete_training_student_template",
                ApiRequest::delete(TrainingStudentTemplate::item_path(id)),
            )
            .reconcile(move |deleted| match parent_of(deleted) {
                Some(parent_id) => remove_assignment(parent_id, id),
                None => Vec::new(),
            })
            .invalidates([
                Tag::list(TrainingStudentTemplate::KIND),
                Tag::id(TrainingStudentTemplate::KIND, id),
                Tag::list(TrainingTemplate::KIND),
            ])
            .invalidates_from(|deleted| {
                parent_of(deleted)
                    .map(|parent_id| vec![Tag::id(TrainingTemplate::KIND, parent_id)])
                    .unwrap_or_default()
            })
            .send()
            .await?;
        Ok(serde_json::from_value(response)?)
    }
}

fn parent_of(record: &Value) -> Option<RecordId> {
    record.get("training_template_id").and_then(Value::as_i64)
}

fn assignment_tags(parent_id: RecordId) -> Vec<Tag> {
    vec![
        Tag::list(TrainingStudentTemplate::KIND),
        Tag::list(TrainingTemplate::KIND),
        Tag::id(TrainingTemplate::KIND, parent_id),
    ]
}

fn upsert_assignment(parent_id: RecordId, assignment: &Value) -> Vec<RecordEdit> {
    if value_id(assignment).is_none() {
        return Vec::new();
    }
    [ListTrainingTemplates::NAME, GetTrainingTemplate::NAME]
        .into_iter()
        .map(|query| RecordEdit::UpsertChild {
            query,
            parent_id,
            field: ASSIGNED_STUDENTS,
            child: assignment.clone(),
        })
        .collect()
}

fn remove_assignment(parent_id: RecordId, child_id: RecordId) -> Vec<RecordEdit> {
    [ListTrainingTemplates::NAME, GetTrainingTemplate::NAME]
        .into_iter()
        .map(|query| RecordEdit::RemoveChild {
            query,
            parent_id,
            field: ASSIGNED_STUDENTS,
            child_id,
        })
        .collect()
}
