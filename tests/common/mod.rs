#![allow(dead_code)]

use anyhow::{anyhow, Result};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use petition_store::db::model::PetitionRow;
use petition_store::db::{self, Freshness, RelationalStore, SqliteRelationalStore};
use petition_store::docstore::{DocumentStore, ReadPreference};
use petition_store::identity::UrlSettings;
use petition_store::phase::{PhaseRegistry, SharedPhase};
use petition_store::shortener::UrlShortener;
use petition_store::{Phase, PetitionController, PetitionItem, PetitionRef, PetitionStatus};

pub async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

pub fn urls() -> UrlSettings {
    UrlSettings {
        base_url: "https://p.example".into(),
        legacy_prefix: "petition".into(),
        entity_prefix: "petitions".into(),
    }
}

pub fn petition(status: PetitionStatus, title: &str) -> PetitionItem {
    let mut payload = Map::new();
    payload.insert("title".into(), json!(title));
    payload.insert("body".into(), json!("We ask that..."));
    PetitionItem::new(status, payload)
}

pub fn flat(v: Value) -> Map<String, Value> {
    v.as_object().cloned().unwrap()
}

/// In-memory document store that records every call.
#[derive(Clone, Default)]
pub struct RecordingDocuments {
    docs: Arc<Mutex<BTreeMap<String, Map<String, Value>>>>,
    saves: Arc<Mutex<Vec<Map<String, Value>>>>,
    deletes: Arc<Mutex<Vec<String>>>,
    finds: Arc<Mutex<Vec<(Vec<PetitionRef>, ReadPreference)>>>,
    next_id: Arc<AtomicU64>,
    fail_saves: Arc<AtomicBool>,
    fail_deletes: Arc<AtomicBool>,
    /// Ids returned instead of the real one, in order.
    forced_ids: Arc<Mutex<VecDeque<String>>>,
}

impl RecordingDocuments {
    pub async fn insert(&self, doc: Map<String, Value>) {
        let id = doc["_id"].as_str().unwrap().to_string();
        self.docs.lock().await.insert(id, doc);
    }

    pub async fn get(&self, id: &str) -> Option<Map<String, Value>> {
        self.docs.lock().await.get(id).cloned()
    }

    pub async fn saves(&self) -> Vec<Map<String, Value>> {
        self.saves.lock().await.clone()
    }

    pub async fn deletes(&self) -> Vec<String> {
        self.deletes.lock().await.clone()
    }

    pub async fn finds(&self) -> Vec<(Vec<PetitionRef>, ReadPreference)> {
        self.finds.lock().await.clone()
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub async fn force_next_id(&self, id: &str) {
        self.forced_ids.lock().await.push_back(id.to_string());
    }
}

#[async_trait::async_trait]
impl DocumentStore for RecordingDocuments {
    async fn save(&self, flat: &Map<String, Value>) -> Result<String> {
        self.saves.lock().await.push(flat.clone());
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(anyhow!("document store unavailable"));
        }
        let id = match flat.get("_id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => format!("doc-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
        };
        let mut doc = flat.clone();
        doc.insert("_id".into(), json!(id));
        self.docs.lock().await.insert(id.clone(), doc);
        if let Some(forced) = self.forced_ids.lock().await.pop_front() {
            return Ok(forced);
        }
        Ok(id)
    }

    async fn delete(&self, legacy_id: &str) -> Result<()> {
        self.deletes.lock().await.push(legacy_id.to_string());
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(anyhow!("document store unavailable"));
        }
        self.docs.lock().await.remove(legacy_id);
        Ok(())
    }

    async fn find(
        &self,
        refs: &[PetitionRef],
        preference: ReadPreference,
    ) -> Result<Vec<Map<String, Value>>> {
        self.finds.lock().await.push((refs.to_vec(), preference));
        let docs = self.docs.lock().await;
        Ok(docs
            .values()
            .filter(|doc| {
                refs.iter().any(|r| match r {
                    PetitionRef::Legacy(id) => doc.get("_id").and_then(Value::as_str) == Some(id),
                    PetitionRef::Entity(id) => doc.get("entity_id").and_then(Value::as_i64) == Some(*id),
                })
            })
            .cloned()
            .collect())
    }
}

/// Shortener with scripted responses; defaults to sequential short links.
#[derive(Clone, Default)]
pub struct RecordingShortener {
    responses: Arc<Mutex<VecDeque<Result<String>>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingShortener {
    pub async fn push_response(&self, response: Result<String>) {
        self.responses.lock().await.push_back(response);
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl UrlShortener for RecordingShortener {
    async fn shorten(&self, long_url: &str) -> Result<String> {
        let mut calls = self.calls.lock().await;
        calls.push(long_url.to_string());
        let n = calls.len();
        drop(calls);
        let mut responses = self.responses.lock().await;
        responses
            .pop_front()
            .unwrap_or_else(|| Ok(format!("https://sho.rt/{}", n)))
    }
}

/// Real SQLite store whose writes can be made to fail.
#[derive(Clone)]
pub struct FlakyRelational {
    inner: SqliteRelationalStore,
    fail_saves: Arc<AtomicBool>,
    fail_deletes: Arc<AtomicBool>,
    saves: Arc<Mutex<Vec<PetitionRow>>>,
}

impl FlakyRelational {
    pub fn new(inner: SqliteRelationalStore) -> Self {
        Self {
            inner,
            fail_saves: Arc::new(AtomicBool::new(false)),
            fail_deletes: Arc::new(AtomicBool::new(false)),
            saves: Arc::default(),
        }
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub async fn saves(&self) -> Vec<PetitionRow> {
        self.saves.lock().await.clone()
    }

    pub async fn rows(&self) -> Vec<PetitionRow> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM petitions ORDER BY id")
            .fetch_all(self.inner.primary())
            .await
            .unwrap();
        db::fetch_petitions(self.inner.primary(), &ids, &[])
            .await
            .unwrap()
    }

    pub async fn seed(&self, legacy_id: Option<&str>, title: &str) -> i64 {
        let mut row = PetitionItem::new(PetitionStatus::Published, {
            let mut payload = Map::new();
            payload.insert("title".into(), json!(title));
            payload
        })
        .to_row();
        row.legacy_id = legacy_id.map(str::to_string);
        db::insert_petition(self.inner.primary(), &row).await.unwrap()
    }
}

#[async_trait::async_trait]
impl RelationalStore for FlakyRelational {
    async fn save(&self, row: &PetitionRow) -> Result<i64> {
        self.saves.lock().await.push(row.clone());
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(anyhow!("relational store unavailable"));
        }
        self.inner.save(row).await
    }

    async fn delete(&self, entity_id: i64) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(anyhow!("relational store unavailable"));
        }
        self.inner.delete(entity_id).await
    }

    async fn find(&self, refs: &[PetitionRef], freshness: Freshness) -> Result<Vec<PetitionRow>> {
        self.inner.find(refs, freshness).await
    }
}

pub struct Harness {
    pub controller: PetitionController,
    pub phase: SharedPhase,
    pub documents: RecordingDocuments,
    pub relational: FlakyRelational,
    pub shortener: RecordingShortener,
}

pub async fn harness(phase: Phase) -> Harness {
    let shared = SharedPhase::new(Some(phase));
    let documents = RecordingDocuments::default();
    let relational = FlakyRelational::new(SqliteRelationalStore::new(setup_pool().await));
    let shortener = RecordingShortener::default();
    let controller = PetitionController::new(
        PhaseRegistry::new(Arc::new(shared.clone())),
        Arc::new(documents.clone()),
        Arc::new(relational.clone()),
        Arc::new(shortener.clone()),
        urls(),
    );
    Harness {
        controller,
        phase: shared,
        documents,
        relational,
        shortener,
    }
}
