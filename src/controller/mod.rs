//! Phase-aware petition persistence.
//!
//! Every operation resolves the migration phase once at the start of the
//! call and routes reads and writes to the document store, the relational
//! store, or both. Nothing is cached between calls.
use serde::Serialize;
use std::sync::Arc;

use crate::docstore::DocumentStore;
use crate::db::RelationalStore;
use crate::error::Warning;
use crate::identity::UrlSettings;
use crate::model::PetitionItem;
use crate::phase::PhaseRegistry;
use crate::shortener::UrlShortener;

mod delete;
mod load;
mod save;

pub use load::{select_read_source, PetitionQuery, ReadSource};

#[derive(Clone)]
pub struct PetitionController {
    phases: PhaseRegistry,
    documents: Arc<dyn DocumentStore>,
    relational: Arc<dyn RelationalStore>,
    shortener: Arc<dyn UrlShortener>,
    urls: UrlSettings,
}

impl std::fmt::Debug for PetitionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PetitionController")
            .field("phases", &self.phases)
            .field("urls", &self.urls)
            .finish_non_exhaustive()
    }
}

impl PetitionController {
    pub fn new(
        phases: PhaseRegistry,
        documents: Arc<dyn DocumentStore>,
        relational: Arc<dyn RelationalStore>,
        shortener: Arc<dyn UrlShortener>,
        urls: UrlSettings,
    ) -> Self {
        Self {
            phases,
            documents,
            relational,
            shortener,
            urls,
        }
    }

    pub fn phases(&self) -> &PhaseRegistry {
        &self.phases
    }
}

/// What a save did. Identity and URL fields mirror the petition after the
/// call; `warnings` lists tolerated failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SaveOutcome {
    pub legacy_id: Option<String>,
    pub entity_id: Option<i64>,
    pub nice_url: Option<String>,
    pub short_url: Option<String>,
    pub wrote_document: bool,
    pub wrote_relational: bool,
    pub warnings: Vec<Warning>,
}

impl SaveOutcome {
    fn finish(mut self, item: &PetitionItem) -> Self {
        self.legacy_id = item.legacy_id().map(str::to_string);
        self.entity_id = item.entity_id();
        self.nice_url = item.nice_url().map(str::to_string);
        self.short_url = item.short_url().map(str::to_string);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    pub legacy_id: Option<String>,
    pub entity_id: Option<i64>,
    pub document_deleted: bool,
    pub relational_deleted: bool,
    pub warnings: Vec<Warning>,
}
