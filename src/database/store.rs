use crate::types::{
    Blockchain, ExchangeUpsert, PairFreshness, PairUpsert, PairView, TokenListQuery, TokenPage,
    TokenSyncReport, TokenUpsert, TokenWithRecords, UpsertReport,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Persistence seam of the sync pipeline and the read services. Every
/// mutating call is one bounded transaction.
#[async_trait]
pub trait Store: Send + Sync {
    /// Upserts the supported chains and deletes every other chain.
    async fn upsert_blockchains(&self, chains: &[Blockchain]) -> Result<UpsertReport>;

    async fn list_blockchains(&self) -> Result<Vec<Blockchain>>;

    /// Writes the full token universe: tokens absent from `plan` are deleted
    /// unless they are a chain's native asset, records follow their claims,
    /// and chains are linked to their native token.
    async fn apply_token_sync(&self, plan: &[TokenUpsert]) -> Result<TokenSyncReport>;

    /// Exchanges on chains missing from storage are skipped.
    async fn upsert_exchanges(&self, exchanges: &[ExchangeUpsert]) -> Result<UpsertReport>;

    /// Tokens whose pair watermark is missing or older than `refreshed_before`,
    /// best rank first.
    async fn stale_tokens(&self, refreshed_before: DateTime<Utc>, limit: usize) -> Result<Vec<TokenWithRecords>>;

    /// Upserts the token's pairs and stamps its pair watermark. Pairs whose
    /// base, quote or exchange are unknown are skipped.
    async fn apply_pair_sync(&self, token_id: Uuid, pairs: &[PairUpsert]) -> Result<UpsertReport>;

    async fn purge_stale_pairs(&self, updated_before: DateTime<Utc>) -> Result<u64>;

    async fn list_tokens(&self, query: &TokenListQuery) -> Result<TokenPage>;

    async fn token_by_slug(&self, cmc_slug: &str) -> Result<Option<TokenWithRecords>>;

    async fn token_by_id(&self, id: Uuid) -> Result<Option<TokenWithRecords>>;

    async fn pair_freshness(&self, token_id: Uuid) -> Result<Option<PairFreshness>>;

    /// Pairs where the token is base or quote, by volume descending.
    async fn pairs_for_token(&self, token_id: Uuid, limit: i64) -> Result<Vec<PairView>>;
}
