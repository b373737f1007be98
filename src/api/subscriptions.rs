use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::resource::{Paged, Resource};
use crate::record::RecordId;
use crate::Record;

/// A subscription plan students can buy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Record)]
pub struct Subscription {
    pub id: RecordId,
    pub name: String,
    pub price: f64,
    pub number_of_sessions: u32,
    pub validity_days: u32,
    #[serde(default)]
    pub is_active: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionInput {
    pub name: String,
    pub price: f64,
    pub number_of_sessions: u32,
    pub validity_days: u32,
    pub is_active: bool,
}

impl Resource for Subscription {
    const PATH: &'static str = "/subscriptions/";
    const SINGULAR: &'static str = "subscription";
    const GET_QUERY: &'static str = "get_subscription";
    type Input = SubscriptionInput;
}

impl Paged for Subscription {
    const LIST_QUERY: &'static str = "list_subscriptions";
}
