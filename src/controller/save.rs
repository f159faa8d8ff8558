use tracing::{debug, info, instrument, warn};

use super::{PetitionController, SaveOutcome};
use crate::error::{PetitionError, Result, Warning};
use crate::identity;
use crate::model::PetitionItem;
use crate::phase::Phase;

/// The relational store owns the URL fields once it serves reads or is the
/// only write target. Until then it stores the document-derived URLs as is.
/// Once it owns them and the entity id is known, the document store carries
/// the same entity-derived URLs.
fn relational_owns_urls(phase: &Phase) -> bool {
    phase.mysql_write && (phase.mysql_read || !phase.mongo_write)
}

impl PetitionController {
    /// Persist `item` to every write target of the current phase.
    ///
    /// The document store is written first and must succeed before the
    /// relational write starts, because the relational row embeds the
    /// legacy id. A relational failure after a successful document write is
    /// reported as a warning; when the relational store is the only write
    /// target it is an error.
    #[instrument(skip_all, fields(legacy_id = item.legacy_id(), entity_id = item.entity_id()))]
    pub async fn save(&self, item: &mut PetitionItem) -> Result<SaveOutcome> {
        let phase = self.phases.snapshot();
        let mut outcome = SaveOutcome::default();

        if !phase.mongo_write && !phase.mysql_write {
            debug!("no write target enabled; nothing persisted");
            return Ok(outcome.finish(item));
        }

        let owns_urls = relational_owns_urls(&phase);

        if phase.mongo_write {
            self.save_document(item, owns_urls, &mut outcome).await?;
        }

        if phase.mysql_write {
            let result = self.save_relational(item, owns_urls, &mut outcome).await;
            match result {
                Ok(()) => {}
                Err(PetitionError::RelationalWriteFailed(err)) if phase.mongo_write => {
                    warn!(?err, legacy_id = item.legacy_id(), "relational write failed; document store keeps the record");
                    outcome.warnings.push(Warning::RelationalWriteFailed {
                        reason: format!("{err:#}"),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        let outcome = outcome.finish(item);
        info!(
            legacy_id = outcome.legacy_id.as_deref(),
            entity_id = outcome.entity_id,
            warnings = outcome.warnings.len(),
            "petition saved"
        );
        Ok(outcome)
    }

    /// Two writes: the first mints (or confirms) the legacy id, the second
    /// persists the URL fields derived from it.
    async fn save_document(
        &self,
        item: &mut PetitionItem,
        relational_urls: bool,
        outcome: &mut SaveOutcome,
    ) -> Result<()> {
        let legacy_id = self
            .documents
            .save(&item.to_flat())
            .await
            .map_err(PetitionError::DocumentStoreWriteFailed)?;
        identity::assign_legacy_identity(item, &legacy_id)?;

        let url = if relational_urls && item.entity_id().is_some() {
            identity::compute_nice_url_from_entity(item, &self.urls)?
        } else {
            identity::compute_nice_url_from_legacy(item, &self.urls)?
        };
        let changed = identity::apply_nice_url(item, url, &self.urls);
        let warning = identity::refresh_short_url(item, changed, self.shortener.as_ref()).await;
        outcome.warnings.extend(warning);

        let second = self
            .documents
            .save(&item.to_flat())
            .await
            .map_err(PetitionError::DocumentStoreWriteFailed)?;
        identity::assign_legacy_identity(item, &second)?;
        outcome.wrote_document = true;
        Ok(())
    }

    async fn save_relational(
        &self,
        item: &mut PetitionItem,
        owns_urls: bool,
        outcome: &mut SaveOutcome,
    ) -> Result<()> {
        let written = item.to_row();
        let entity_id = self
            .relational
            .save(&written)
            .await
            .map_err(PetitionError::RelationalWriteFailed)?;
        identity::assign_entity_identity(item, entity_id)?;
        outcome.wrote_relational = true;

        if !owns_urls {
            return Ok(());
        }

        let url = identity::compute_nice_url_from_entity(item, &self.urls)?;
        let nice_changed = identity::apply_nice_url(item, url, &self.urls);
        let warning =
            identity::refresh_short_url(item, nice_changed, self.shortener.as_ref()).await;
        outcome.warnings.extend(warning);

        let derived = item.to_row();
        if derived.nice_url != written.nice_url
            || derived.short_url != written.short_url
            || derived.legacy_path != written.legacy_path
        {
            self.relational
                .save(&derived)
                .await
                .map_err(PetitionError::RelationalWriteFailed)?;
        }
        Ok(())
    }
}
