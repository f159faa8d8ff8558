//! Relational row model returned by the repository.
//!
//! Keep this focused on the columns of `petitions`. Identity and URL rules
//! live in higher layers.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::model::{
    PetitionStatus, KEY_CREATED_AT, KEY_ENTITY_ID, KEY_LEGACY_ID, KEY_LEGACY_PATH, KEY_NICE_URL,
    KEY_SHORT_URL, KEY_STATUS, KEY_UPDATED_AT,
};

#[derive(Debug, Clone, PartialEq)]
pub struct PetitionRow {
    /// Entity id; `None` until the first insert.
    pub id: Option<i64>,
    pub legacy_id: Option<String>,
    pub status: PetitionStatus,
    pub nice_url: Option<String>,
    pub short_url: Option<String>,
    pub legacy_path: Option<String>,
    pub payload: Map<String, Value>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PetitionRow {
    /// Raw record in the same flat shape the document store returns, plus
    /// the row timestamps.
    pub fn to_flat(&self) -> Map<String, Value> {
        let mut flat = self.payload.clone();
        if let Some(id) = &self.legacy_id {
            flat.insert(KEY_LEGACY_ID.into(), Value::String(id.clone()));
        }
        if let Some(id) = self.id {
            flat.insert(KEY_ENTITY_ID.into(), Value::from(id));
        }
        flat.insert(KEY_STATUS.into(), Value::String(self.status.as_str().into()));
        if let Some(url) = &self.nice_url {
            flat.insert(KEY_NICE_URL.into(), Value::String(url.clone()));
        }
        if let Some(url) = &self.short_url {
            flat.insert(KEY_SHORT_URL.into(), Value::String(url.clone()));
        }
        if let Some(path) = &self.legacy_path {
            flat.insert(KEY_LEGACY_PATH.into(), Value::String(path.clone()));
        }
        if let Some(ts) = self.created_at {
            flat.insert(KEY_CREATED_AT.into(), Value::String(ts.to_rfc3339()));
        }
        if let Some(ts) = self.updated_at {
            flat.insert(KEY_UPDATED_AT.into(), Value::String(ts.to_rfc3339()));
        }
        flat
    }
}
