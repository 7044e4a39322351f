use serde::{Deserialize, Serialize};

use crate::store::{Item, Trip};

/// Body for creating or editing a trip. Dates are `YYYY-MM-DD`; empty means unset.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TripInput {
    pub title: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemInput {
    pub title: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    #[serde(default)]
    pub ids: Vec<i64>,
}

/// Ids of the whole scope in their new order.
#[derive(Debug, Serialize)]
pub struct ReorderResponse {
    pub ok: bool,
    pub ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct TripDetails {
    #[serde(flatten)]
    pub trip: Trip,
    pub items: Vec<Item>,
}
