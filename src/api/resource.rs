//! Plain CRUD resources: paged list, single record, create/update/delete with
//! tag invalidation.

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::{CacheStore, Tag};
use crate::client::{ApiClient, ClientError};
use crate::query::{list_tags, record_tags, Query};
use crate::record::{Record, RecordId};
use crate::transport::{ApiRequest, Transport};

/// A backend collection with `GET/POST {PATH}` and `GET/PUT/DELETE {PATH}{id}`.
pub trait Resource: Record + 'static {
    /// Collection path with trailing slash, e.g. `/students/`.
    const PATH: &'static str;
    /// Lowercase singular used in mutation names, e.g. `student`.
    const SINGULAR: &'static str;
    /// Query family of the single-record read.
    const GET_QUERY: &'static str;

    /// Create/update body.
    type Input: Serialize + Send + Sync;

    fn item_path(id: RecordId) -> String {
        format!("{}{}", Self::PATH, id)
    }
}

/// A resource whose collection is read with `skip`/`limit` paging only.
pub trait Paged: Resource {
    const LIST_QUERY: &'static str;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl PageArgs {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn page(skip: u32, limit: u32) -> Self {
        Self {
            skip: Some(skip),
            limit: Some(limit),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ById {
    pub id: RecordId,
}

/// Paged list of a resource.
pub struct List<R>(PhantomData<R>);

impl<R: Paged> Query for List<R> {
    const NAME: &'static str = R::LIST_QUERY;
    type Args = PageArgs;
    type Output = Vec<R>;

    fn request(args: &PageArgs) -> ApiRequest {
        ApiRequest::get(R::PATH)
            .param_opt("skip", args.skip)
            .param_opt("limit", args.limit)
    }

    fn provides(_args: &PageArgs, payload: &Value) -> Vec<Tag> {
        list_tags(R::KIND, payload)
    }
}

/// One record of a resource.
pub struct Get<R>(PhantomData<R>);

impl<R: Resource> Query for Get<R> {
    const NAME: &'static str = R::GET_QUERY;
    type Args = ById;
    type Output = R;

    fn request(args: &ById) -> ApiRequest {
        ApiRequest::get(R::item_path(args.id))
    }

    fn provides(_args: &ById, payload: &Value) -> Vec<Tag> {
        record_tags(R::KIND, payload)
    }

    fn matches(args: &ById, record: &Value) -> bool {
        crate::record::value_id(record) == Some(args.id)
    }
}

pub(crate) async fn create<R, T, S>(
    client: &ApiClient<T, S>,
    input: &R::Input,
) -> Result<R, ClientError>
where
    R: Resource,
    T: Transport,
    S: CacheStore,
{
    let request = ApiRequest::post(R::PATH).json(input)?;
    let response = client
        .mutation(format!("create_{}", R::SINGULAR), request)
        .invalidates([Tag::list(R::KIND)])
        .send()
        .await?;
    Ok(serde_json::from_value(response)?)
}

pub(crate) async fn update<R, T, S>(
    client: &ApiClient<T, S>,
    id: RecordId,
    input: &R::Input,
) -> Result<R, ClientError>
where
    R: Resource,
    T: Transport,
    S: CacheStore,
{
    let request = ApiRequest::put(R::item_path(id)).json(input)?;
    let response = client
        .mutation(format!("update_{}", R::SINGULAR), request)
        .invalidates([Tag::list(R::KIND), Tag::id(R::KIND, id)])
        .send()
        .await?;
    Ok(serde_json::from_value(response)?)
}

pub(crate) async fn delete<R, T, S>(client: &ApiClient<T, S>, id: RecordId) -> Result<(), ClientError>
where
    R: Resource,
    T: Transport,
    S: CacheStore,
{
    client
        .mutation(
            format!("delete_{}", R::SINGULAR),
            ApiRequest::delete(R::item_path(id)),
        )
        .invalidates([Tag::list(R::KIND), Tag::id(R::KIND, id)])
        .send()
        .await?;
    Ok(())
}

/// CRUD accessor for a resource, from `ApiClient::resources`.
pub struct Resources<'a, R, T, S> {
    client: &'a ApiClient<T, S>,
    _resource: PhantomData<fn() -> R>,
}

impl<'a, R, T, S> Resources<'a, R, T, S>
where
    R: Resource,
    T: Transport,
    S: CacheStore,
{
    pub(crate) fn new(client: &'a ApiClient<T, S>) -> Self {
        Self {
            client,
            _resource: PhantomData,
        }
    }

    pub async fn get(&self, id: RecordId) -> Result<R, ClientError> {
        self.client.query::<Get<R>>(&ById { id }).await
    }

    pub async fn create(&self, input: &R::Input) -> Result<R, ClientError> {
        create::<R, T, S>(self.client, input).await
    }

    pub async fn update(&self, id: RecordId, input: &R::Input) -> Result<R, ClientError> {
        update::<R, T, S>(self.client, id, input).await
    }

    pub async fn delete(&self, id: RecordId) -> Result<(), ClientError> {
        delete::<R, T, S>(self.client, id).await
    }
}

impl<'a, R, T, S> Resources<'a, R, T, S>
where
    R: Paged,
    T: Transport,
    S: CacheStore,
{
    pub async fn list(&self, page: &PageArgs) -> Result<Vec<R>, ClientError> {
        self.client.query::<List<R>>(page).await
    }
}
