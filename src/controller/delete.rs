use tracing::{debug, info, instrument, warn};

use super::{DeleteOutcome, PetitionController};
use crate::db::Freshness;
use crate::error::{PetitionError, Result, Warning};
use crate::model::{PetitionItem, PetitionRef};
use crate::phase::Phase;

impl PetitionController {
    /// Remove a petition from every write target of the current phase.
    ///
    /// The document-store delete is best-effort: failures become warnings.
    /// The relational delete is authoritative and its failure is returned.
    /// Both run concurrently since neither depends on the other.
    #[instrument(skip_all, fields(id = id))]
    pub async fn delete(&self, id: &str) -> Result<DeleteOutcome> {
        let phase = self.phases.snapshot();
        let refs = vec![PetitionRef::parse(id)?];
        let item = self
            .query_in(&phase, true)?
            .objects(&refs)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PetitionError::PetitionNotFound(id.to_string()))?;

        let (document, relational) = futures::join!(
            self.delete_document(&phase, &item),
            self.delete_relational(&phase, &item)
        );
        let relational_entity = match relational {
            Ok(entity_id) => entity_id,
            Err(err) => {
                warn!(
                    legacy_id = item.legacy_id(),
                    document_deleted = matches!(document, Ok(true)),
                    document_failed = document.is_err(),
                    "relational delete failed after the document step ran"
                );
                return Err(err);
            }
        };

        let mut outcome = DeleteOutcome {
            legacy_id: item.legacy_id().map(str::to_string),
            entity_id: relational_entity.or(item.entity_id()),
            relational_deleted: relational_entity.is_some(),
            ..Default::default()
        };
        match document {
            Ok(deleted) => outcome.document_deleted = deleted,
            Err(warning) => outcome.warnings.push(warning),
        }

        info!(
            legacy_id = outcome.legacy_id.as_deref(),
            entity_id = outcome.entity_id,
            document_deleted = outcome.document_deleted,
            relational_deleted = outcome.relational_deleted,
            "petition deleted"
        );
        Ok(outcome)
    }

    /// Returns whether a delete was issued; failures come back as a warning.
    async fn delete_document(&self, phase: &Phase, item: &PetitionItem) -> Result<bool, Warning> {
        if !phase.mongo_write {
            return Ok(false);
        }
        let Some(legacy_id) = item.legacy_id() else {
            debug!("petition has no legacy id; skipping document delete");
            return Ok(false);
        };
        match self.documents.delete(legacy_id).await {
            Ok(()) => Ok(true),
            Err(err) => {
                warn!(?err, legacy_id, "document store delete failed; continuing");
                Err(Warning::DocumentDeleteFailed {
                    legacy_id: legacy_id.to_string(),
                    reason: format!("{err:#}"),
                })
            }
        }
    }

    /// Returns the entity id that was deleted, if any.
    async fn delete_relational(&self, phase: &Phase, item: &PetitionItem) -> Result<Option<i64>> {
        if !phase.mysql_write {
            return Ok(None);
        }
        let entity_id = if phase.reads_overlap() || item.entity_id().is_none() {
            self.resolve_entity_id(item).await?
        } else {
            item.entity_id()
        };
        let Some(entity_id) = entity_id else {
            debug!("petition has no relational record; skipping relational delete");
            return Ok(None);
        };
        self.relational
            .delete(entity_id)
            .await
            .map_err(PetitionError::RelationalDeleteFailed)?;
        Ok(Some(entity_id))
    }

    /// Look the petition up directly in the relational store. The located
    /// item may have come from the document store and lack an entity id.
    async fn resolve_entity_id(&self, item: &PetitionItem) -> Result<Option<i64>> {
        let mut refs = Vec::new();
        if let Some(id) = item.entity_id() {
            refs.push(PetitionRef::Entity(id));
        }
        if let Some(id) = item.legacy_id() {
            refs.push(PetitionRef::Legacy(id.to_string()));
        }
        if refs.is_empty() {
            return Ok(None);
        }
        let rows = self
            .relational
            .find(&refs, Freshness::Realtime)
            .await
            .map_err(PetitionError::RelationalDeleteFailed)?;
        let exact = rows
            .iter()
            .find(|row| item.entity_id().is_some() && row.id == item.entity_id());
        Ok(exact.or(rows.first()).and_then(|row| row.id))
    }
}
