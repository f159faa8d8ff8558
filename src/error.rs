//! Error taxonomy for petition persistence and the non-fatal warnings that
//! travel back to callers inside save/delete outcomes.
use serde::Serialize;
use thiserror::Error;

/// Which identifier a reconciliation or URL derivation was about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityField {
    Legacy,
    Entity,
}

impl IdentityField {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityField::Legacy => "legacy_id",
            IdentityField::Entity => "entity_id",
        }
    }
}

impl std::fmt::Display for IdentityField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum PetitionError {
    #[error("{field} is already {existing}; refusing to overwrite with {incoming}")]
    IdentityConflict {
        field: IdentityField,
        existing: String,
        incoming: String,
    },
    #[error("{0} is not set")]
    MissingIdentity(IdentityField),
    #[error("invalid petition identifier {0:?}")]
    InvalidReference(String),
    #[error("document store write failed: {0:#}")]
    DocumentStoreWriteFailed(#[source] anyhow::Error),
    #[error("relational store write failed: {0:#}")]
    RelationalWriteFailed(#[source] anyhow::Error),
    #[error("relational store delete failed: {0:#}")]
    RelationalDeleteFailed(#[source] anyhow::Error),
    #[error("short url unavailable: {0:#}")]
    ShortUrlUnavailable(#[source] anyhow::Error),
    #[error("{source_name} read failed: {error:#}")]
    ReadFailed {
        source_name: &'static str,
        #[source]
        error: anyhow::Error,
    },
    #[error("petition {0} not found")]
    PetitionNotFound(String),
    #[error("no read source is enabled in the current migration phase")]
    NoReadSourceConfigured,
}

pub type Result<T, E = PetitionError> = std::result::Result<T, E>;

/// A failure that was tolerated by an orchestrator. Each one is also logged
/// at `warn` when it happens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    ShortUrlUnavailable { nice_url: String, reason: String },
    RelationalWriteFailed { reason: String },
    DocumentDeleteFailed { legacy_id: String, reason: String },
}
