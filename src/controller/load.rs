use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::PetitionController;
use crate::db::Freshness;
use crate::docstore::ReadPreference;
use crate::error::{PetitionError, Result};
use crate::model::{PetitionItem, PetitionRef};
use crate::phase::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    Document,
    Relational,
}

impl ReadSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadSource::Document => "document store",
            ReadSource::Relational => "relational store",
        }
    }
}

/// Pick the store a read goes to.
///
/// Realtime reads go to the relational store whenever it is readable.
/// Otherwise, with both stores readable, the read follows the single write
/// target to keep cross-store skew down; with zero or two write targets the
/// relational store wins.
pub fn select_read_source(phase: &Phase, realtime: bool) -> Result<ReadSource> {
    match (phase.mongo_read, phase.mysql_read) {
        (false, false) => Err(PetitionError::NoReadSourceConfigured),
        (true, false) => Ok(ReadSource::Document),
        (false, true) => Ok(ReadSource::Relational),
        (true, true) if realtime => Ok(ReadSource::Relational),
        (true, true) => match (phase.mongo_write, phase.mysql_write) {
            (true, false) => Ok(ReadSource::Document),
            _ => Ok(ReadSource::Relational),
        },
    }
}

/// A read bound to one source and freshness. Resolves a whole identifier
/// set with a single backend call.
#[derive(Debug, Clone, Copy)]
pub struct PetitionQuery<'a> {
    controller: &'a PetitionController,
    source: ReadSource,
    realtime: bool,
}

impl<'a> PetitionQuery<'a> {
    pub fn source(&self) -> ReadSource {
        self.source
    }

    pub fn is_realtime(&self) -> bool {
        self.realtime
    }

    fn read_failed(&self, error: anyhow::Error) -> PetitionError {
        PetitionError::ReadFailed {
            source_name: self.source.as_str(),
            error,
        }
    }

    /// Flat records as the backend returned them.
    pub async fn raw(&self, refs: &[PetitionRef]) -> Result<Vec<Map<String, Value>>> {
        if refs.is_empty() {
            return Ok(Vec::new());
        }
        match self.source {
            ReadSource::Document => self
                .controller
                .documents
                .find(refs, ReadPreference::for_realtime(self.realtime))
                .await
                .map_err(|e| self.read_failed(e)),
            ReadSource::Relational => {
                let rows = self
                    .controller
                    .relational
                    .find(refs, Freshness::for_realtime(self.realtime))
                    .await
                    .map_err(|e| self.read_failed(e))?;
                Ok(rows.iter().map(|r| r.to_flat()).collect())
            }
        }
    }

    pub async fn objects(&self, refs: &[PetitionRef]) -> Result<Vec<PetitionItem>> {
        if refs.is_empty() {
            return Ok(Vec::new());
        }
        match self.source {
            ReadSource::Document => {
                let docs = self.raw(refs).await?;
                docs.into_iter()
                    .map(|doc| PetitionItem::from_flat(doc).map_err(|e| self.read_failed(e)))
                    .collect()
            }
            ReadSource::Relational => {
                let rows = self
                    .controller
                    .relational
                    .find(refs, Freshness::for_realtime(self.realtime))
                    .await
                    .map_err(|e| self.read_failed(e))?;
                Ok(rows.into_iter().map(PetitionItem::from_row).collect())
            }
        }
    }
}

impl PetitionController {
    /// Query factory: bind a read to the source the current phase selects.
    pub fn query(&self, realtime: bool) -> Result<PetitionQuery<'_>> {
        self.query_in(&self.phases.snapshot(), realtime)
    }

    pub(super) fn query_in(&self, phase: &Phase, realtime: bool) -> Result<PetitionQuery<'_>> {
        let source = select_read_source(phase, realtime)?;
        debug!(source = source.as_str(), realtime, "selected read source");
        Ok(PetitionQuery {
            controller: self,
            source,
            realtime,
        })
    }

    #[instrument(skip_all, fields(id = id))]
    pub async fn load(&self, id: &str, realtime: bool) -> Result<Option<Map<String, Value>>> {
        let refs = vec![PetitionRef::parse(id)?];
        let mut found = self.query(realtime)?.raw(&refs).await?;
        Ok((!found.is_empty()).then(|| found.swap_remove(0)))
    }

    #[instrument(skip_all, fields(count = ids.len()))]
    pub async fn load_multiple<S: AsRef<str>>(
        &self,
        ids: &[S],
        realtime: bool,
    ) -> Result<Vec<Map<String, Value>>> {
        let refs = PetitionRef::parse_all(ids.iter().map(|s| s.as_ref()))?;
        self.query(realtime)?.raw(&refs).await
    }

    #[instrument(skip_all, fields(id = id))]
    pub async fn load_object(&self, id: &str, realtime: bool) -> Result<Option<PetitionItem>> {
        let refs = vec![PetitionRef::parse(id)?];
        let found = self.query(realtime)?.objects(&refs).await?;
        Ok(found.into_iter().next())
    }

    #[instrument(skip_all, fields(count = ids.len()))]
    pub async fn load_object_multiple<S: AsRef<str>>(
        &self,
        ids: &[S],
        realtime: bool,
    ) -> Result<Vec<PetitionItem>> {
        let refs = PetitionRef::parse_all(ids.iter().map(|s| s.as_ref()))?;
        self.query(realtime)?.objects(&refs).await
    }
}
