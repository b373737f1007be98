use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::resource::{Paged, Resource};
use crate::record::RecordId;
use crate::Record;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Record)]
pub struct Trainer {
    pub id: RecordId,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub salary: Option<f64>,
    #[serde(default)]
    pub is_fixed_salary: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainerInput {
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salary: Option<f64>,
    pub is_fixed_salary: bool,
}

impl Resource for Trainer {
    const PATH: &'static str = "/trainers/";
    const SINGULAR: &'static str = "trainer";
    const GET_QUERY: &'static str = "get_trainer";
    type Input = TrainerInput;
}

impl Paged for Trainer {
    const LIST_QUERY: &'static str = "list_trainers";
}
