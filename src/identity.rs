//! Identifier reconciliation and derived URL fields.
//!
//! A petition has two identities: the document store's legacy key and the
//! relational store's entity id. Each may be assigned once; a second,
//! different value is a conflict. URLs are derived from whichever identity
//! exists when they are computed.
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::{IdentityField, PetitionError, Result, Warning};
use crate::model::PetitionItem;
use crate::shortener::UrlShortener;

const MAX_SLUG_LEN: usize = 60;

static NON_SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid slug pattern"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlSettings {
    pub base_url: String,
    pub legacy_prefix: String,
    pub entity_prefix: String,
}

pub fn assign_legacy_identity(item: &mut PetitionItem, raw: &str) -> Result<()> {
    let incoming = raw.trim();
    if incoming.is_empty() {
        return Err(PetitionError::MissingIdentity(IdentityField::Legacy));
    }
    match item.legacy_id.as_deref() {
        Some(existing) if existing == incoming => Ok(()),
        Some(existing) => Err(PetitionError::IdentityConflict {
            field: IdentityField::Legacy,
            existing: existing.to_string(),
            incoming: incoming.to_string(),
        }),
        None => {
            item.legacy_id = Some(incoming.to_string());
            Ok(())
        }
    }
}

pub fn assign_entity_identity(item: &mut PetitionItem, raw: i64) -> Result<()> {
    match item.entity_id {
        Some(existing) if existing == raw => Ok(()),
        Some(existing) => Err(PetitionError::IdentityConflict {
            field: IdentityField::Entity,
            existing: existing.to_string(),
            incoming: raw.to_string(),
        }),
        None => {
            item.entity_id = Some(raw);
            Ok(())
        }
    }
}

/// Lower-case ASCII slug of the petition title, or `None` when the title
/// has no usable characters.
pub fn slugify(title: &str) -> Option<String> {
    let lowered = title.to_lowercase();
    let slug = NON_SLUG.replace_all(&lowered, "-");
    let mut slug = slug.trim_matches('-').to_string();
    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
        slug = slug.trim_end_matches('-').to_string();
    }
    (!slug.is_empty()).then_some(slug)
}

fn nice_path(item: &PetitionItem, prefix: &str, id: &str) -> String {
    match item.title().and_then(slugify) {
        Some(slug) => format!("{}/{}/{}", prefix, slug, id),
        None => format!("{}/{}", prefix, id),
    }
}

pub fn compute_nice_url_from_legacy(item: &PetitionItem, urls: &UrlSettings) -> Result<String> {
    let id = item
        .legacy_id()
        .ok_or(PetitionError::MissingIdentity(IdentityField::Legacy))?;
    Ok(format!(
        "{}/{}",
        urls.base_url,
        nice_path(item, &urls.legacy_prefix, id)
    ))
}

pub fn compute_nice_url_from_entity(item: &PetitionItem, urls: &UrlSettings) -> Result<String> {
    let id = item
        .entity_id()
        .ok_or(PetitionError::MissingIdentity(IdentityField::Entity))?;
    Ok(format!(
        "{}/{}",
        urls.base_url,
        nice_path(item, &urls.entity_prefix, &id.to_string())
    ))
}

/// Set `nice_url` and mirror its path into `legacy_path`. Returns whether the
/// URL changed.
pub fn apply_nice_url(item: &mut PetitionItem, url: String, urls: &UrlSettings) -> bool {
    let path = url
        .strip_prefix(&urls.base_url)
        .unwrap_or(&url)
        .trim_start_matches('/')
        .to_string();
    let changed = item.nice_url.as_deref() != Some(url.as_str());
    item.legacy_path = Some(path);
    item.nice_url = Some(url);
    changed
}

pub async fn compute_short_url(item: &PetitionItem, shortener: &dyn UrlShortener) -> Result<String> {
    let nice = item
        .nice_url()
        .ok_or_else(|| PetitionError::ShortUrlUnavailable(anyhow::anyhow!("nice url is not set")))?;
    shortener
        .shorten(nice)
        .await
        .map_err(PetitionError::ShortUrlUnavailable)
}

/// Drafts never carry a short URL. Returns whether one was removed.
pub fn drop_draft_short_url(item: &mut PetitionItem) -> bool {
    item.status.is_draft() && item.short_url.take().is_some()
}

/// Bring `short_url` in line with status and the current nice URL.
///
/// The shortener is only called for non-drafts that have no short URL yet
/// or whose nice URL just changed. A failed shortening comes back as a
/// warning, and a short URL that points at an old nice URL is dropped
/// rather than kept.
pub async fn refresh_short_url(
    item: &mut PetitionItem,
    nice_url_changed: bool,
    shortener: &dyn UrlShortener,
) -> Option<Warning> {
    if item.status.is_draft() {
        drop_draft_short_url(item);
        return None;
    }
    if item.short_url.is_some() && !nice_url_changed {
        return None;
    }
    match compute_short_url(item, shortener).await {
        Ok(short) => {
            debug!(short_url=%short, "computed short url");
            item.short_url = Some(short);
            None
        }
        Err(err) => {
            let nice = item.nice_url().unwrap_or_default().to_string();
            warn!(error=%err, nice_url=%nice, "short url unavailable; continuing without it");
            item.short_url = None;
            Some(Warning::ShortUrlUnavailable {
                nice_url: nice,
                reason: err.to_string(),
            })
        }
    }
}
