//! Relational store: row model, SQL repository and the [`RelationalStore`]
//! seam the orchestrators talk to.
//!
//! - `model`: the `petitions` row as returned by queries.
//! - `repo`: SQL-only functions that map rows into models.

pub mod model;
pub mod repo;

pub use repo::*;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::model::PetitionRef;
use model::PetitionRow;

/// How stale a relational read may be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Read from the primary; sees every committed write.
    Realtime,
    /// May be served by a read replica.
    Lagging,
}

impl Freshness {
    pub fn for_realtime(realtime: bool) -> Self {
        if realtime {
            Freshness::Realtime
        } else {
            Freshness::Lagging
        }
    }
}

#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Insert (no id) or update (with id) a row and return its entity id.
    async fn save(&self, row: &PetitionRow) -> Result<i64>;

    async fn delete(&self, entity_id: i64) -> Result<()>;

    /// Resolve a whole reference set in one query. Missing ids are absent
    /// from the result.
    async fn find(&self, refs: &[PetitionRef], freshness: Freshness) -> Result<Vec<PetitionRow>>;
}

#[derive(Debug, Clone)]
pub struct SqliteRelationalStore {
    primary: Pool,
    replica: Option<Pool>,
}

impl SqliteRelationalStore {
    pub fn new(primary: Pool) -> Self {
        Self {
            primary,
            replica: None,
        }
    }

    pub fn with_replica(primary: Pool, replica: Pool) -> Self {
        Self {
            primary,
            replica: Some(replica),
        }
    }

    pub fn primary(&self) -> &Pool {
        &self.primary
    }

    fn pool_for(&self, freshness: Freshness) -> &Pool {
        match (freshness, &self.replica) {
            (Freshness::Lagging, Some(replica)) => replica,
            _ => &self.primary,
        }
    }
}

#[async_trait]
impl RelationalStore for SqliteRelationalStore {
    #[instrument(skip_all)]
    async fn save(&self, row: &PetitionRow) -> Result<i64> {
        match row.id {
            Some(id) => {
                update_petition(&self.primary, id, row).await?;
                Ok(id)
            }
            None => insert_petition(&self.primary, row).await,
        }
    }

    #[instrument(skip_all, fields(entity_id = entity_id))]
    async fn delete(&self, entity_id: i64) -> Result<()> {
        if !delete_petition(&self.primary, entity_id).await? {
            debug!(entity_id, "relational delete matched no row");
        }
        Ok(())
    }

    #[instrument(skip_all)]
    async fn find(&self, refs: &[PetitionRef], freshness: Freshness) -> Result<Vec<PetitionRow>> {
        let (legacy_ids, entity_ids) = PetitionRef::partition(refs);
        fetch_petitions(self.pool_for(freshness), &entity_ids, &legacy_ids).await
    }
}
