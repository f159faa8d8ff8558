use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::db::model::PetitionRow;
use crate::error::PetitionError;

/// Keys the flat document representation reserves for identity, status and
/// derived URL fields. Everything else is opaque payload.
pub const KEY_LEGACY_ID: &str = "_id";
pub const KEY_ENTITY_ID: &str = "entity_id";
pub const KEY_STATUS: &str = "status";
pub const KEY_NICE_URL: &str = "nice_url";
pub const KEY_SHORT_URL: &str = "short_url";
pub const KEY_LEGACY_PATH: &str = "legacy_path";
/// Row timestamps; present on relational raw records, owned by the database.
pub const KEY_CREATED_AT: &str = "created_at";
pub const KEY_UPDATED_AT: &str = "updated_at";

const RESERVED_KEYS: [&str; 8] = [
    KEY_LEGACY_ID,
    KEY_ENTITY_ID,
    KEY_STATUS,
    KEY_NICE_URL,
    KEY_SHORT_URL,
    KEY_LEGACY_PATH,
    KEY_CREATED_AT,
    KEY_UPDATED_AT,
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PetitionStatus {
    Draft,
    Published,
    UnderReview,
    Closed,
    Archived,
}

impl PetitionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PetitionStatus::Draft => "draft",
            PetitionStatus::Published => "published",
            PetitionStatus::UnderReview => "under_review",
            PetitionStatus::Closed => "closed",
            PetitionStatus::Archived => "archived",
        }
    }

    pub fn parse_status(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(PetitionStatus::Draft),
            "published" => Some(PetitionStatus::Published),
            "under_review" => Some(PetitionStatus::UnderReview),
            "closed" => Some(PetitionStatus::Closed),
            "archived" => Some(PetitionStatus::Archived),
            _ => None,
        }
    }

    pub fn is_draft(&self) -> bool {
        matches!(self, PetitionStatus::Draft)
    }
}

/// Caller-facing petition identifier. All-digit strings address the
/// relational store's entity id; anything else is a document-store key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PetitionRef {
    Legacy(String),
    Entity(i64),
}

impl PetitionRef {
    pub fn parse(raw: &str) -> Result<Self, PetitionError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(PetitionError::InvalidReference(raw.to_string()));
        }
        if raw.bytes().all(|b| b.is_ascii_digit()) {
            return raw
                .parse::<i64>()
                .map(PetitionRef::Entity)
                .map_err(|_| PetitionError::InvalidReference(raw.to_string()));
        }
        Ok(PetitionRef::Legacy(raw.to_string()))
    }

    pub fn parse_all<'a, I>(raw: I) -> Result<Vec<Self>, PetitionError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut refs: Vec<Self> = Vec::new();
        for r in raw {
            let parsed = Self::parse(r)?;
            if !refs.contains(&parsed) {
                refs.push(parsed);
            }
        }
        Ok(refs)
    }

    /// Split a reference set into legacy keys and entity ids.
    pub fn partition(refs: &[PetitionRef]) -> (Vec<String>, Vec<i64>) {
        let mut legacy = Vec::new();
        let mut entity = Vec::new();
        for r in refs {
            match r {
                PetitionRef::Legacy(id) => legacy.push(id.clone()),
                PetitionRef::Entity(id) => entity.push(*id),
            }
        }
        (legacy, entity)
    }

    /// Reference the item by its relational identity when it has one.
    pub fn for_item(item: &PetitionItem) -> Option<Self> {
        item.entity_id()
            .map(PetitionRef::Entity)
            .or_else(|| item.legacy_id().map(|id| PetitionRef::Legacy(id.to_string())))
    }
}

impl fmt::Display for PetitionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PetitionRef::Legacy(id) => f.write_str(id),
            PetitionRef::Entity(id) => write!(f, "{id}"),
        }
    }
}

/// In-memory petition used for the duration of a single save/load/delete.
///
/// Identity fields are only mutated through [`crate::identity`], which
/// refuses to overwrite an identifier once set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PetitionItem {
    pub(crate) legacy_id: Option<String>,
    pub(crate) entity_id: Option<i64>,
    pub status: PetitionStatus,
    pub(crate) nice_url: Option<String>,
    pub(crate) short_url: Option<String>,
    pub(crate) legacy_path: Option<String>,
    pub payload: Map<String, Value>,
}

impl PetitionItem {
    pub fn new(status: PetitionStatus, payload: Map<String, Value>) -> Self {
        Self {
            legacy_id: None,
            entity_id: None,
            status,
            nice_url: None,
            short_url: None,
            legacy_path: None,
            payload,
        }
    }

    pub fn legacy_id(&self) -> Option<&str> {
        self.legacy_id.as_deref()
    }

    pub fn entity_id(&self) -> Option<i64> {
        self.entity_id
    }

    pub fn nice_url(&self) -> Option<&str> {
        self.nice_url.as_deref()
    }

    pub fn short_url(&self) -> Option<&str> {
        self.short_url.as_deref()
    }

    pub fn legacy_path(&self) -> Option<&str> {
        self.legacy_path.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.payload
            .get("title")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
    }

    /// Flat document-store representation: payload fields at the top level
    /// plus the reserved keys that are set.
    pub fn to_flat(&self) -> Map<String, Value> {
        let mut flat = self.payload.clone();
        for key in RESERVED_KEYS {
            flat.remove(key);
        }
        if let Some(id) = &self.legacy_id {
            flat.insert(KEY_LEGACY_ID.into(), Value::String(id.clone()));
        }
        if let Some(id) = self.entity_id {
            flat.insert(KEY_ENTITY_ID.into(), Value::from(id));
        }
        flat.insert(KEY_STATUS.into(), Value::String(self.status.as_str().into()));
        let url_fields = [
            (KEY_NICE_URL, &self.nice_url),
            (KEY_SHORT_URL, &self.short_url),
            (KEY_LEGACY_PATH, &self.legacy_path),
        ];
        for (key, value) in url_fields {
            if let Some(v) = value {
                flat.insert(key.into(), Value::String(v.clone()));
            }
        }
        flat
    }

    /// Hydrate from a flat record (document-store or caller-supplied JSON).
    pub fn from_flat(mut flat: Map<String, Value>) -> Result<Self> {
        let status = match flat.remove(KEY_STATUS) {
            Some(Value::String(s)) => PetitionStatus::parse_status(&s)
                .ok_or_else(|| anyhow!("unknown petition status {}", s))?,
            Some(other) => return Err(anyhow!("status must be a string, got {}", other)),
            None => PetitionStatus::Draft,
        };
        let legacy_id = take_string(&mut flat, KEY_LEGACY_ID);
        let entity_id = match flat.remove(KEY_ENTITY_ID) {
            Some(Value::Number(n)) => Some(
                n.as_i64()
                    .ok_or_else(|| anyhow!("entity_id {} is not an integer", n))?,
            ),
            Some(Value::String(s)) if !s.is_empty() => Some(
                s.parse::<i64>()
                    .map_err(|_| anyhow!("entity_id {:?} is not an integer", s))?,
            ),
            _ => None,
        };
        flat.remove(KEY_CREATED_AT);
        flat.remove(KEY_UPDATED_AT);
        Ok(Self {
            legacy_id,
            entity_id,
            status,
            nice_url: take_string(&mut flat, KEY_NICE_URL),
            short_url: take_string(&mut flat, KEY_SHORT_URL),
            legacy_path: take_string(&mut flat, KEY_LEGACY_PATH),
            payload: flat,
        })
    }

    /// Relational representation. Embeds the legacy id when known, which is
    /// why document-store writes must finish first.
    pub fn to_row(&self) -> PetitionRow {
        PetitionRow {
            id: self.entity_id,
            legacy_id: self.legacy_id.clone(),
            status: self.status,
            nice_url: self.nice_url.clone(),
            short_url: self.short_url.clone(),
            legacy_path: self.legacy_path.clone(),
            payload: self.payload.clone(),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn from_row(row: PetitionRow) -> Self {
        Self {
            legacy_id: row.legacy_id,
            entity_id: row.id,
            status: row.status,
            nice_url: row.nice_url,
            short_url: row.short_url,
            legacy_path: row.legacy_path,
            payload: row.payload,
        }
    }

    pub fn matches(&self, r: &PetitionRef) -> bool {
        match r {
            PetitionRef::Legacy(id) => self.legacy_id.as_deref() == Some(id.as_str()),
            PetitionRef::Entity(id) => self.entity_id == Some(*id),
        }
    }
}

fn take_string(flat: &mut Map<String, Value>, key: &str) -> Option<String> {
    match flat.remove(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    }
}
