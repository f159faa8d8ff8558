//! Document store driver.
//!
//! Petitions live in a collection of flat JSON documents keyed by `_id`
//! (the legacy identifier). The store is reached over a small REST API; the
//! orchestrators only see the [`DocumentStore`] trait.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde_json::{json, Map, Value};
use std::fmt;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::docstore::model::{QueryDocumentsResp, SaveDocumentResp};
use crate::model::{PetitionRef, KEY_LEGACY_ID};

pub mod model;

/// Whether a read may be served by a lagging secondary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPreference {
    /// Must observe our own writes.
    Primary,
    SecondaryPreferred,
}

impl ReadPreference {
    pub fn for_realtime(realtime: bool) -> Self {
        if realtime {
            ReadPreference::Primary
        } else {
            ReadPreference::SecondaryPreferred
        }
    }

    pub fn as_header(&self) -> &'static str {
        match self {
            ReadPreference::Primary => "primary",
            ReadPreference::SecondaryPreferred => "secondaryPreferred",
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert (no `_id`) or replace (with `_id`) a flat record and return
    /// its legacy identifier.
    async fn save(&self, flat: &Map<String, Value>) -> Result<String>;

    async fn delete(&self, legacy_id: &str) -> Result<()>;

    /// Resolve a whole reference set in one call. Missing ids are absent
    /// from the result.
    async fn find(
        &self,
        refs: &[PetitionRef],
        preference: ReadPreference,
    ) -> Result<Vec<Map<String, Value>>>;
}

#[derive(Clone)]
pub struct HttpDocumentStore {
    http: Client,
    base_url: Url,
    token: String,
    collection: String,
}

impl fmt::Debug for HttpDocumentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpDocumentStore")
            .field("base_url", &self.base_url)
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

/// A handle bound to one read preference. Writes and deletes always go
/// through a primary connection.
#[derive(Debug, Clone, Copy)]
pub struct DocumentConnection<'a> {
    store: &'a HttpDocumentStore,
    preference: ReadPreference,
}

impl HttpDocumentStore {
    pub fn new(base_url: &str, token: String, collection: String) -> Result<Self> {
        let base_url = Url::parse(base_url).context("invalid document store URL")?;
        let http = Client::builder()
            .user_agent("petition-store/0.1")
            .build()
            .context("failed to build document store http client")?;
        Ok(Self {
            http,
            base_url,
            token,
            collection,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(
            &cfg.documents.base_url,
            cfg.documents.token.clone(),
            cfg.documents.collection.clone(),
        )
    }

    pub fn connection(&self, preference: ReadPreference) -> DocumentConnection<'_> {
        DocumentConnection {
            store: self,
            preference,
        }
    }

    /// Each segment is percent-encoded on its own, so a legacy id can never
    /// leave the collection path.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        if let Some(bad) = segments
            .iter()
            .find(|s| s.is_empty() || **s == "." || **s == "..")
        {
            return Err(anyhow!("invalid document path segment {:?}", bad));
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("document store URL cannot carry a path"))?
            .pop_if_empty()
            .extend(["v1", "collections", self.collection.as_str()])
            .extend(segments);
        Ok(url)
    }
}

impl DocumentConnection<'_> {
    pub fn preference(&self) -> ReadPreference {
        self.preference
    }

    pub fn build_request(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&Value>,
    ) -> Result<reqwest::Request> {
        let endpoint = self.store.endpoint(segments)?;
        let mut builder = self
            .store
            .http
            .request(method, endpoint)
            .header("Authorization", format!("Bearer {}", self.store.token))
            .header("Read-Preference", self.preference.as_header())
            .header("X-Request-Id", Uuid::new_v4().to_string());
        if let Some(body) = body {
            builder = builder.header("Content-Type", "application/json").json(body);
        }
        builder.build().context("failed to build document store request")
    }

    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        debug!(method=%request.method(), url=%request.url(), "document store request");
        let res = self
            .store
            .http
            .execute(request)
            .await
            .context("failed to reach document store")?;
        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("received 429 from document store: {}", body));
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("document store error {}: {}", status, body));
        }
        Ok(res)
    }

    pub async fn save(&self, flat: &Map<String, Value>) -> Result<String> {
        let body = Value::Object(flat.clone());
        let request = match flat.get(KEY_LEGACY_ID).and_then(Value::as_str) {
            Some(id) => self.build_request(Method::PUT, &["documents", id], Some(&body))?,
            None => self.build_request(Method::POST, &["documents"], Some(&body))?,
        };
        let res = self.execute(request).await?;
        let payload: SaveDocumentResp = res
            .json()
            .await
            .context("invalid document store save response")?;
        Ok(payload.id)
    }

    pub async fn delete(&self, legacy_id: &str) -> Result<()> {
        let request = self.build_request(Method::DELETE, &["documents", legacy_id], None)?;
        self.execute(request).await?;
        Ok(())
    }

    pub async fn find(&self, refs: &[PetitionRef]) -> Result<Vec<Map<String, Value>>> {
        let body = build_query_body(refs);
        let request = self.build_request(Method::POST, &["query"], Some(&body))?;
        let res = self.execute(request).await?;
        let payload: QueryDocumentsResp = res
            .json()
            .await
            .context("invalid document store query response")?;
        Ok(payload.documents)
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    #[instrument(skip_all)]
    async fn save(&self, flat: &Map<String, Value>) -> Result<String> {
        self.connection(ReadPreference::Primary).save(flat).await
    }

    #[instrument(skip_all, fields(legacy_id = %legacy_id))]
    async fn delete(&self, legacy_id: &str) -> Result<()> {
        self.connection(ReadPreference::Primary).delete(legacy_id).await
    }

    #[instrument(skip_all)]
    async fn find(
        &self,
        refs: &[PetitionRef],
        preference: ReadPreference,
    ) -> Result<Vec<Map<String, Value>>> {
        if refs.is_empty() {
            return Ok(Vec::new());
        }
        self.connection(preference).find(refs).await
    }
}

pub fn build_query_body(refs: &[PetitionRef]) -> Value {
    let (legacy_ids, entity_ids) = PetitionRef::partition(refs);
    json!({
        "legacy_ids": legacy_ids,
        "entity_ids": entity_ids,
    })
}
