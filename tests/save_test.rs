mod common;

use anyhow::anyhow;
use common::{flat, harness, petition};
use serde_json::json;

use petition_store::{PetitionError, PetitionItem, PetitionStatus, Phase, Warning};

#[tokio::test]
async fn legacy_phase_writes_documents_twice_and_leaves_entity_unset() {
    let h = harness(Phase::LEGACY).await;
    let mut item = petition(PetitionStatus::Published, "Save the Parks");

    let outcome = h.controller.save(&mut item).await.unwrap();

    let saves = h.documents.saves().await;
    assert_eq!(saves.len(), 2);
    assert!(saves[0].get("_id").is_none());
    assert!(saves[0].get("nice_url").is_none());
    assert_eq!(saves[1]["_id"], json!("doc-1"));
    assert_eq!(
        saves[1]["nice_url"],
        json!("https://p.example/petition/save-the-parks/doc-1")
    );
    assert_eq!(saves[1]["short_url"], json!("https://sho.rt/1"));
    assert_eq!(saves[1]["legacy_path"], json!("petition/save-the-parks/doc-1"));

    assert_eq!(item.legacy_id(), Some("doc-1"));
    assert_eq!(item.entity_id(), None);
    assert!(outcome.wrote_document);
    assert!(!outcome.wrote_relational);
    assert!(outcome.warnings.is_empty());
    assert!(h.relational.saves().await.is_empty());
}

#[tokio::test]
async fn relational_only_phase_leaves_legacy_unset() {
    let h = harness(Phase::RELATIONAL).await;
    let mut item = petition(PetitionStatus::Published, "Save the Parks");

    let outcome = h.controller.save(&mut item).await.unwrap();

    assert!(h.documents.saves().await.is_empty());
    assert_eq!(item.legacy_id(), None);
    assert_eq!(outcome.entity_id, Some(1));
    assert_eq!(
        outcome.nice_url.as_deref(),
        Some("https://p.example/petitions/save-the-parks/1")
    );
    assert_eq!(outcome.short_url.as_deref(), Some("https://sho.rt/1"));

    let rows = h.relational.rows().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].legacy_id, None);
    assert_eq!(rows[0].short_url.as_deref(), Some("https://sho.rt/1"));
    assert_eq!(rows[0].legacy_path.as_deref(), Some("petitions/save-the-parks/1"));
}

#[tokio::test]
async fn dual_write_embeds_legacy_id_in_relational_row() {
    let h = harness(Phase::DUAL_WRITE).await;
    let mut item = petition(PetitionStatus::Published, "Fix the road");

    let outcome = h.controller.save(&mut item).await.unwrap();

    assert!(outcome.wrote_document && outcome.wrote_relational);
    let rows = h.relational.rows().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].legacy_id.as_deref(), Some("doc-1"));
    assert_eq!(rows[0].id, outcome.entity_id);
    // document store still owns the URLs
    assert_eq!(
        rows[0].nice_url.as_deref(),
        Some("https://p.example/petition/fix-the-road/doc-1")
    );
    assert_eq!(h.shortener.calls().await.len(), 1);
    // one insert, no URL rewrite
    assert_eq!(h.relational.saves().await.len(), 1);
}

#[tokio::test]
async fn overlap_phase_derives_urls_from_entity_id() {
    let h = harness(Phase::OVERLAP).await;
    let mut item = petition(PetitionStatus::Published, "Fix the road");

    let outcome = h.controller.save(&mut item).await.unwrap();

    assert_eq!(
        outcome.nice_url.as_deref(),
        Some("https://p.example/petitions/fix-the-road/1")
    );
    assert_eq!(outcome.short_url.as_deref(), Some("https://sho.rt/2"));
    assert_eq!(
        h.shortener.calls().await,
        vec![
            "https://p.example/petition/fix-the-road/doc-1".to_string(),
            "https://p.example/petitions/fix-the-road/1".to_string(),
        ]
    );
    let rows = h.relational.rows().await;
    assert_eq!(rows[0].legacy_id.as_deref(), Some("doc-1"));
    assert_eq!(rows[0].short_url.as_deref(), Some("https://sho.rt/2"));
}

#[tokio::test]
async fn document_record_gets_short_url_while_relational_owns_urls() {
    for phase in [Phase::OVERLAP, Phase::DUAL_WRITE_RELATIONAL_READ] {
        let h = harness(phase).await;
        let mut item = petition(PetitionStatus::Published, "Fix the road");

        h.controller.save(&mut item).await.unwrap();

        let saves = h.documents.saves().await;
        assert_eq!(saves.len(), 2, "{:?}", phase);
        assert_eq!(
            saves[1]["nice_url"],
            json!("https://p.example/petition/fix-the-road/doc-1"),
            "{:?}",
            phase
        );
        assert_eq!(saves[1]["short_url"], json!("https://sho.rt/1"), "{:?}", phase);

        // once the entity id is known the document mirrors the relational URLs
        h.controller.save(&mut item).await.unwrap();

        let saves = h.documents.saves().await;
        assert_eq!(
            saves[3]["nice_url"],
            json!("https://p.example/petitions/fix-the-road/1"),
            "{:?}",
            phase
        );
        assert_eq!(saves[3]["short_url"], json!("https://sho.rt/2"), "{:?}", phase);
        assert_eq!(h.shortener.calls().await.len(), 2, "{:?}", phase);
    }
}

#[tokio::test]
async fn drafts_never_get_a_short_url() {
    let h = harness(Phase::LEGACY).await;
    let mut item = petition(PetitionStatus::Draft, "Early idea");

    let outcome = h.controller.save(&mut item).await.unwrap();

    assert!(outcome.nice_url.is_some());
    assert_eq!(outcome.short_url, None);
    assert!(h.shortener.calls().await.is_empty());

    let mut reverted = PetitionItem::from_flat(flat(json!({
        "_id": "legacy-7",
        "status": "draft",
        "title": "Back to draft",
        "short_url": "https://sho.rt/old",
    })))
    .unwrap();
    h.controller.save(&mut reverted).await.unwrap();
    assert_eq!(reverted.short_url(), None);
    let stored = h.documents.get("legacy-7").await.unwrap();
    assert!(stored.get("short_url").is_none());
}

#[tokio::test]
async fn resaving_unchanged_petition_keeps_short_url() {
    for phase in [Phase::LEGACY, Phase::OVERLAP, Phase::RELATIONAL] {
        let h = harness(phase).await;
        let mut item = petition(PetitionStatus::Published, "Same title");

        let first = h.controller.save(&mut item).await.unwrap();
        let calls = h.shortener.calls().await.len();
        let second = h.controller.save(&mut item).await.unwrap();

        assert!(first.short_url.is_some(), "{:?}", phase);
        assert_eq!(first.short_url, second.short_url, "{:?}", phase);
        assert_eq!(h.shortener.calls().await.len(), calls, "{:?}", phase);
    }
}

#[tokio::test]
async fn retitling_reshortens_the_new_url() {
    let h = harness(Phase::LEGACY).await;
    let mut item = petition(PetitionStatus::Published, "Old title");
    h.controller.save(&mut item).await.unwrap();

    item.payload.insert("title".into(), json!("New title"));
    let outcome = h.controller.save(&mut item).await.unwrap();

    let calls = h.shortener.calls().await;
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1], "https://p.example/petition/new-title/doc-1");
    assert_eq!(outcome.short_url.as_deref(), Some("https://sho.rt/2"));
}

#[tokio::test]
async fn shortener_failure_is_a_warning() {
    let h = harness(Phase::LEGACY).await;
    h.shortener
        .push_response(Err(anyhow!("rate limited")))
        .await;
    let mut item = petition(PetitionStatus::Published, "Clean the river");

    let outcome = h.controller.save(&mut item).await.unwrap();

    assert_eq!(outcome.short_url, None);
    assert!(outcome.nice_url.is_some());
    assert_eq!(outcome.warnings.len(), 1);
    assert!(matches!(
        &outcome.warnings[0],
        Warning::ShortUrlUnavailable { nice_url, .. }
            if nice_url == "https://p.example/petition/clean-the-river/doc-1"
    ));
    // the second write still happened
    assert_eq!(h.documents.saves().await.len(), 2);
}

#[tokio::test]
async fn document_failure_aborts_before_relational_write() {
    let h = harness(Phase::DUAL_WRITE).await;
    h.documents.fail_saves(true);
    let mut item = petition(PetitionStatus::Published, "Never stored");

    let err = h.controller.save(&mut item).await.unwrap_err();

    assert!(matches!(err, PetitionError::DocumentStoreWriteFailed(_)));
    assert!(h.relational.saves().await.is_empty());
    assert!(h.relational.rows().await.is_empty());
}

#[tokio::test]
async fn relational_failure_is_a_warning_when_documents_were_written() {
    let h = harness(Phase::DUAL_WRITE).await;
    h.relational.fail_saves(true);
    let mut item = petition(PetitionStatus::Published, "Half stored");

    let outcome = h.controller.save(&mut item).await.unwrap();

    assert_eq!(outcome.legacy_id.as_deref(), Some("doc-1"));
    assert_eq!(outcome.entity_id, None);
    assert!(outcome.wrote_document);
    assert!(!outcome.wrote_relational);
    assert!(matches!(
        outcome.warnings.as_slice(),
        [Warning::RelationalWriteFailed { .. }]
    ));
}

#[tokio::test]
async fn relational_failure_is_fatal_when_it_is_the_only_target() {
    let h = harness(Phase::RELATIONAL).await;
    h.relational.fail_saves(true);
    let mut item = petition(PetitionStatus::Published, "Not stored");

    let err = h.controller.save(&mut item).await.unwrap_err();

    assert!(matches!(err, PetitionError::RelationalWriteFailed(_)));
}

#[tokio::test]
async fn conflicting_legacy_id_is_fatal_in_every_document_phase() {
    for phase in [Phase::LEGACY, Phase::DUAL_WRITE, Phase::OVERLAP] {
        let h = harness(phase).await;
        h.documents.force_next_id("someone-else").await;
        let mut item = PetitionItem::from_flat(flat(json!({
            "_id": "original",
            "status": "published",
            "title": "Mine",
        })))
        .unwrap();

        let err = h.controller.save(&mut item).await.unwrap_err();

        assert!(
            matches!(err, PetitionError::IdentityConflict { .. }),
            "{:?}: {:?}",
            phase,
            err
        );
        assert_eq!(item.legacy_id(), Some("original"));
        assert!(h.relational.saves().await.is_empty());
    }
}

#[tokio::test]
async fn no_write_target_is_a_no_op() {
    let read_only = Phase {
        mongo_read: true,
        mongo_write: false,
        mysql_read: true,
        mysql_write: false,
    };
    let h = harness(read_only).await;
    let mut item = petition(PetitionStatus::Published, "Frozen");

    let outcome = h.controller.save(&mut item).await.unwrap();

    assert!(!outcome.wrote_document && !outcome.wrote_relational);
    assert_eq!(outcome.legacy_id, None);
    assert_eq!(outcome.entity_id, None);
    assert!(h.documents.saves().await.is_empty());
    assert!(h.relational.saves().await.is_empty());
    assert!(h.shortener.calls().await.is_empty());
}

#[tokio::test]
async fn phase_is_read_at_each_call() {
    let h = harness(Phase::LEGACY).await;
    let mut item = petition(PetitionStatus::Published, "Moving");
    h.controller.save(&mut item).await.unwrap();
    assert!(h.relational.rows().await.is_empty());

    h.phase.set(Some(Phase::DUAL_WRITE));
    let outcome = h.controller.save(&mut item).await.unwrap();

    assert!(outcome.wrote_relational);
    let rows = h.relational.rows().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].legacy_id.as_deref(), Some("doc-1"));
}

#[tokio::test]
async fn saving_a_loaded_record_keeps_row_timestamps_out_of_payload() {
    let h = harness(Phase::RELATIONAL).await;
    let entity_id = h.relational.seed(None, "Round trip").await;

    let raw = h
        .controller
        .load(&entity_id.to_string(), true)
        .await
        .unwrap()
        .unwrap();
    assert!(raw.contains_key("created_at"));
    let mut item = PetitionItem::from_flat(raw).unwrap();
    h.controller.save(&mut item).await.unwrap();

    let rows = h.relational.rows().await;
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].payload.contains_key("created_at"));
    assert!(!rows[0].payload.contains_key("updated_at"));
    assert!(rows[0].created_at.is_some());
}
