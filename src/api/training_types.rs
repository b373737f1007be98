use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::resource::{Paged, Resource};
use crate::record::RecordId;
use crate::Record;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Record)]
pub struct TrainingType {
    pub id: RecordId,
    pub name: String,
    /// Calendar colour, `#rrggbb`.
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub max_participants: Option<u32>,
    #[serde(default)]
    pub is_subscription_only: bool,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingTypeInput {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_participants: Option<u32>,
    pub is_subscription_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

impl Resource for TrainingType {
    const PATH: &'static str = "/training_types/";
    const SINGULAR: &'static str = "training_type";
    const GET_QUERY: &'static str = "get_training_type";
    type Input = TrainingTypeInput;
}

impl Paged for TrainingType {
    const LIST_QUERY: &'static str = "list_training_types";
}
