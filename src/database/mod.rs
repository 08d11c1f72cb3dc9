pub mod operations;
pub mod store;
pub mod utils;

use crate::types::*;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

pub use operations::*;
pub use store::Store;

pub struct Database {
    pool: PgPool,
    tx_timeout: Duration,
}

impl Database {
    pub fn new(pool: PgPool, tx_timeout: Duration) -> Self {
        Self { pool, tx_timeout }
    }

    pub async fn connect(url: &str, max_connections: u32, tx_timeout: Duration) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .context("failed to connect to database")?;
        Ok(Self::new(pool, tx_timeout))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn create_tables(&self) -> Result<()> {
        SystemOperations::create_tables(&self.pool).await
    }

    /// Runs a transactional body under the configured deadline. A body that
    /// times out is dropped together with its open transaction, which rolls
    /// it back.
    async fn bounded<T>(&self, label: &str, body: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.tx_timeout, body).await {
            Ok(result) => result.with_context(|| format!("{} transaction failed", label)),
            Err(_) => Err(anyhow::anyhow!(
                "{} transaction exceeded {:?} and was rolled back",
                label,
                self.tx_timeout
            )),
        }
    }
}

#[async_trait]
impl Store for Database {
    async fn upsert_blockchains(&self, chains: &[Blockchain]) -> Result<UpsertReport> {
        self.bounded("blockchain sync", async {
            let mut tx = self.pool.begin().await?;
            let report = ChainOperations::upsert_all(&mut *tx, chains).await?;
            ChainOperations::link_native_tokens(&mut *tx).await?;
            tx.commit().await?;
            Ok(report)
        })
        .await
    }

    async fn list_blockchains(&self) -> Result<Vec<Blockchain>> {
        ChainOperations::list(&self.pool).await
    }

    async fn apply_token_sync(&self, plan: &[TokenUpsert]) -> Result<TokenSyncReport> {
        self.bounded("token sync", async {
            let mut tx = self.pool.begin().await?;
            let mut report = TokenSyncReport::default();

            let cmc_ids: Vec<i64> = plan.iter().map(|token| token.cmc_id).collect();
            report.tokens.deleted = TokenOperations::delete_missing(&mut *tx, &cmc_ids).await?;
            TokenOperations::release_coingecko_slugs(&mut *tx, plan).await?;

            for token in plan {
                TokenOperations::upsert(&mut *tx, token, &mut report.tokens).await?;
            }

            let ids = TokenOperations::ids_by_cmc_id(&mut *tx, &cmc_ids).await?;
            let mut claimed = HashSet::new();
            let mut claims = Vec::new();
            for token in plan {
                let Some(token_id) = ids.get(&token.cmc_id).copied() else {
                    continue;
                };
                for claim in &token.records {
                    if claimed.insert((&claim.blockchain, &claim.address)) {
                        claims.push((token_id, claim));
                    }
                }
            }

            for (token_id, claim) in &claims {
                TokenOperations::claim_record(&mut *tx, *token_id, claim, &mut report.records).await?;
            }

            let token_ids: Vec<Uuid> = ids.values().copied().collect();
            report.records.deleted =
                TokenOperations::delete_unclaimed_records(&mut *tx, &claims, &token_ids).await?;

            ChainOperations::link_native_tokens(&mut *tx).await?;
            tx.commit().await?;
            Ok(report)
        })
        .await
    }

    async fn upsert_exchanges(&self, exchanges: &[ExchangeUpsert]) -> Result<UpsertReport> {
        self.bounded("exchange sync", async {
            let mut tx = self.pool.begin().await?;
            let report = ExchangeOperations::upsert_all(&mut *tx, exchanges).await?;
            tx.commit().await?;
            Ok(report)
        })
        .await
    }

    async fn stale_tokens(&self, refreshed_before: DateTime<Utc>, limit: usize) -> Result<Vec<TokenWithRecords>> {
        TokenOperations::stale(&self.pool, refreshed_before, limit).await
    }

    async fn apply_pair_sync(&self, token_id: Uuid, pairs: &[PairUpsert]) -> Result<UpsertReport> {
        self.bounded("pair sync", async {
            let mut tx = self.pool.begin().await?;
            let mut report = UpsertReport::default();
            for pair in pairs {
                PairOperations::upsert(&mut *tx, pair, &mut report).await?;
            }
            TokenOperations::stamp_pairs_synced(&mut *tx, token_id).await?;
            tx.commit().await?;
            Ok(report)
        })
        .await
    }

    async fn purge_stale_pairs(&self, updated_before: DateTime<Utc>) -> Result<u64> {
        PairOperations::purge_older_than(&self.pool, updated_before).await
    }

    async fn list_tokens(&self, query: &TokenListQuery) -> Result<TokenPage> {
        TokenOperations::list(&self.pool, query).await
    }

    async fn token_by_slug(&self, cmc_slug: &str) -> Result<Option<TokenWithRecords>> {
        TokenOperations::by_slug(&self.pool, cmc_slug).await
    }

    async fn token_by_id(&self, id: Uuid) -> Result<Option<TokenWithRecords>> {
        TokenOperations::by_id(&self.pool, id).await
    }

    async fn pair_freshness(&self, token_id: Uuid) -> Result<Option<PairFreshness>> {
        TokenOperations::pair_freshness(&self.pool, token_id).await
    }

    async fn pairs_for_token(&self, token_id: Uuid, limit: i64) -> Result<Vec<PairView>> {
        PairOperations::for_token(&self.pool, token_id, limit).await
    }
}
