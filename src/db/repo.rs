use super::model::PetitionRow;
use crate::model::PetitionStatus;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::str::FromStr;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::instrument;

pub type Pool = SqlitePool;

const PETITION_COLUMNS: &str =
    "id, legacy_id, status, nice_url, short_url, legacy_path, payload, created_at, updated_at";

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let options = SqliteConnectOptions::from_str(&normalized)
        .with_context(|| format!("invalid database url {}", normalized))?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .connect_with(options)
        .await
        .with_context(|| format!("failed to open {}", normalized))?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// Read replicas are opened read-only and never migrated.
pub async fn init_replica_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let options = SqliteConnectOptions::from_str(&normalized)
        .with_context(|| format!("invalid replica url {}", normalized))?
        .read_only(true);
    SqlitePoolOptions::new()
        .connect_with(options)
        .await
        .with_context(|| format!("failed to open replica {}", normalized))
}

/// Expand a leading `~/` in file-backed SQLite URLs and make sure the parent
/// directory exists. Other URLs pass through unchanged.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path.is_empty() {
        return url.to_string();
    }

    let path = match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path.to_string(),
    };
    if let Some(parent) = std::path::Path::new(&path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query {
        Some(q) => format!("sqlite://{}?{}", path, q),
        None => format!("sqlite://{}", path),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn row_to_petition(row: &SqliteRow) -> Result<PetitionRow> {
    let id: i64 = row.get("id");
    let status_str: String = row.get("status");
    let status = PetitionStatus::parse_status(&status_str)
        .ok_or_else(|| anyhow!("petition {} has unknown status {}", id, status_str))?;
    let payload_str: String = row.get("payload");
    let payload: Map<String, Value> = serde_json::from_str(&payload_str)
        .with_context(|| format!("petition {} has malformed payload", id))?;

    Ok(PetitionRow {
        id: Some(id),
        legacy_id: row
            .try_get::<Option<String>, _>("legacy_id")
            .ok()
            .flatten()
            .filter(|s| !s.trim().is_empty()),
        status,
        nice_url: row.try_get::<Option<String>, _>("nice_url").ok().flatten(),
        short_url: row.try_get::<Option<String>, _>("short_url").ok().flatten(),
        legacy_path: row
            .try_get::<Option<String>, _>("legacy_path")
            .ok()
            .flatten(),
        payload,
        created_at: row
            .try_get::<Option<DateTime<Utc>>, _>("created_at")
            .ok()
            .flatten(),
        updated_at: row
            .try_get::<Option<DateTime<Utc>>, _>("updated_at")
            .ok()
            .flatten(),
    })
}

/// Insert a petition, or adopt the existing row when one already carries
/// the same legacy id (backfilled records). Returns the entity id.
#[instrument(skip_all)]
pub async fn insert_petition(pool: &Pool, row: &PetitionRow) -> Result<i64> {
    let payload = serde_json::to_string(&row.payload)?;
    let now = Utc::now();
    let id: i64 = sqlx::query(
        "INSERT INTO petitions (legacy_id, status, nice_url, short_url, legacy_path, payload, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(legacy_id) DO UPDATE SET \
            status = excluded.status, nice_url = excluded.nice_url, short_url = excluded.short_url, \
            legacy_path = excluded.legacy_path, payload = excluded.payload, updated_at = excluded.updated_at \
         RETURNING id",
    )
    .bind(row.legacy_id.as_deref())
    .bind(row.status.as_str())
    .bind(row.nice_url.as_deref())
    .bind(row.short_url.as_deref())
    .bind(row.legacy_path.as_deref())
    .bind(payload)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?
    .get("id");
    Ok(id)
}

#[instrument(skip_all)]
pub async fn update_petition(pool: &Pool, id: i64, row: &PetitionRow) -> Result<()> {
    let payload = serde_json::to_string(&row.payload)?;
    let result = sqlx::query(
        "UPDATE petitions SET legacy_id = COALESCE(?, legacy_id), status = ?, nice_url = ?, short_url = ?, \
         legacy_path = ?, payload = ?, updated_at = ? WHERE id = ?",
    )
    .bind(row.legacy_id.as_deref())
    .bind(row.status.as_str())
    .bind(row.nice_url.as_deref())
    .bind(row.short_url.as_deref())
    .bind(row.legacy_path.as_deref())
    .bind(payload)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await
    .context("failed to update petition")?;
    if result.rows_affected() == 0 {
        return Err(anyhow!("petition {} not found", id));
    }
    Ok(())
}

/// Fetch every petition matching any of the entity ids or legacy ids in a
/// single query.
#[instrument(skip_all)]
pub async fn fetch_petitions(
    pool: &Pool,
    entity_ids: &[i64],
    legacy_ids: &[String],
) -> Result<Vec<PetitionRow>> {
    if entity_ids.is_empty() && legacy_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {} FROM petitions WHERE ", PETITION_COLUMNS));
    if !entity_ids.is_empty() {
        qb.push("id IN (");
        let mut ids = qb.separated(", ");
        for id in entity_ids {
            ids.push_bind(*id);
        }
        ids.push_unseparated(")");
    }
    if !legacy_ids.is_empty() {
        if !entity_ids.is_empty() {
            qb.push(" OR ");
        }
        qb.push("legacy_id IN (");
        let mut ids = qb.separated(", ");
        for id in legacy_ids {
            ids.push_bind(id.clone());
        }
        ids.push_unseparated(")");
    }
    qb.push(" ORDER BY id");

    let rows = qb.build().fetch_all(pool).await?;
    rows.iter().map(row_to_petition).collect()
}

/// Returns whether a row was removed.
#[instrument(skip_all)]
pub async fn delete_petition(pool: &Pool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM petitions WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[instrument(skip_all)]
pub async fn count_petitions(pool: &Pool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM petitions")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
