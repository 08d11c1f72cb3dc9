mod common;

use common::*;
use token_aggregator::sync::SyncStage;

fn empty_harness() -> Harness {
    harness(default_pairs(), FakeHolderSource::default(), FakeDexSource::default())
}

#[tokio::test]
async fn test_second_token_sync_changes_nothing() {
    let h = empty_harness();
    let sync = &h.context.sync;

    let platforms = sync.sync_platforms().await.unwrap();
    assert_eq!(platforms.inserted, 2);

    let first = sync.sync_tokens().await.unwrap();
    assert_eq!(first.tokens.inserted, 3);
    assert_eq!(first.records.inserted, 3);

    let second = sync.sync_tokens().await.unwrap();
    assert!(second.is_unchanged(), "unexpected writes: {:?}", second);

    let platforms = sync.sync_platforms().await.unwrap();
    assert!(platforms.is_unchanged());

    let eth = h.store.token(1027).unwrap();
    assert_eq!(eth.records.len(), 1);
    assert_eq!(eth.records[0].address, WETH);
}

#[tokio::test]
async fn test_changed_quote_counts_as_update() {
    let h = empty_harness();
    h.seed().await;

    h.primary
        .stats
        .lock()
        .unwrap()
        .insert("825".to_string(), quote(1.001, Some(("ethereum", USDT))));

    let report = h.context.sync.sync_tokens().await.unwrap();
    assert_eq!(report.tokens.updated, 1);
    assert_eq!(report.tokens.inserted, 0);
    assert!(report.records.is_unchanged());
}

#[tokio::test]
async fn test_native_token_survives_removal_from_catalog() {
    let h = empty_harness();
    h.seed().await;

    h.primary
        .tokens
        .lock()
        .unwrap()
        .retain(|token| token.provider_id == "24478");

    let report = h.context.sync.sync_tokens().await.unwrap();
    assert_eq!(report.tokens.deleted, 1);
    assert!(h.store.token(825).is_none());
    assert!(h.store.token(1027).is_some());
    assert!(h.store.token(24478).is_some());
}

#[tokio::test]
async fn test_token_without_complete_quote_is_not_stored() {
    let h = empty_harness();
    if let Some(stats) = h.primary.stats.lock().unwrap().get_mut("24478") {
        stats.percent_change_24h = None;
    }
    h.seed().await;

    assert_eq!(h.store.token_count(), 2);
    assert!(h.store.token(24478).is_none());
}

#[tokio::test]
async fn test_empty_plan_leaves_store_alone() {
    let h = empty_harness();
    h.seed().await;

    h.primary.stats.lock().unwrap().clear();
    tokio_test::assert_err!(h.context.sync.sync_tokens().await);
    assert_eq!(h.store.token_count(), 3);
}

#[tokio::test]
async fn test_failed_stage_ends_the_pass() {
    let h = empty_harness();
    *h.primary.fail_catalog.lock().unwrap() = true;

    let status = h.context.sync.run_pass().await;
    assert!(!status.succeeded());
    assert!(status.finished_at.is_some());

    let stages: Vec<SyncStage> = status.stages.iter().map(|outcome| outcome.stage).collect();
    assert_eq!(stages, vec![SyncStage::Platforms, SyncStage::Tokens]);
    assert!(status.stages[0].error.is_none());
    assert!(status.stages[1].error.as_deref().unwrap().contains("catalog"));

    let last = h.context.sync.last_status().await.unwrap();
    assert_eq!(last.pass_id, status.pass_id);
}

#[tokio::test]
async fn test_full_pass_stores_pairs() {
    let h = empty_harness();

    let status = h.context.sync.run_pass().await;
    assert!(status.succeeded(), "{:?}", status);
    assert_eq!(status.stages.len(), 4);

    // The three-leg pool is filtered out.
    assert_eq!(h.store.pair_count(), 1);
    let pepe = h.store.token(24478).unwrap();
    assert!(pepe.token.last_updated.is_some());
}
