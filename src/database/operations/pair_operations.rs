use super::chain_operations::count_write;
use crate::database::utils::*;
use crate::types::{PairToken, PairUpsert, PairView, UpsertReport};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

pub struct PairOperations;

fn pair_from_row(row: &PgRow) -> Result<PairView> {
    Ok(PairView {
        id: row.try_get("id")?,
        pool_address: safe_get_string(row, "pool_address"),
        name: safe_get_string(row, "name"),
        base: PairToken {
            id: row.try_get("base_token_id")?,
            cmc_slug: safe_get_string(row, "base_slug"),
            cmc_id: safe_get_i64(row, "base_cmc_id"),
            symbol: safe_get_string(row, "base_symbol"),
            address: safe_get_string(row, "base_address"),
        },
        quote: PairToken {
            id: row.try_get("quote_token_id")?,
            cmc_slug: safe_get_string(row, "quote_slug"),
            cmc_id: safe_get_i64(row, "quote_cmc_id"),
            symbol: safe_get_string(row, "quote_symbol"),
            address: safe_get_string(row, "quote_address"),
        },
        blockchain: safe_get_string(row, "blockchain"),
        evm_chain_id: safe_get_i64(row, "evm_chain_id"),
        tx_url_format: safe_get_string(row, "explorer_tx_url_format"),
        dex_slug: safe_get_string(row, "dex_slug"),
        dex_name: safe_get_string(row, "dex_name"),
        reserve_usd: safe_get_optional_decimal(row, "reserve_usd"),
        volume_usd: safe_get_optional_decimal(row, "volume_usd"),
        price_usd: safe_get_optional_decimal(row, "price_usd"),
        price_change_24h: safe_get_optional_f64(row, "price_change_24h"),
        trades_24h: safe_get_optional_i64(row, "trades_24h"),
        buys_24h: safe_get_optional_i64(row, "buys_24h"),
        sells_24h: safe_get_optional_i64(row, "sells_24h"),
        unique_buyers: safe_get_optional_i64(row, "unique_buyers"),
        unique_sellers: safe_get_optional_i64(row, "unique_sellers"),
        updated_at: safe_get_datetime(row, "updated_at"),
    })
}

impl PairOperations {
    /// Pairs whose records or exchange are not stored are skipped.
    ///
    /// Unlike the other upserts this one has no `IS DISTINCT FROM` guard: a
    /// resync must advance `updated_at` on pairs it saw, even unchanged ones,
    /// or [`purge_older_than`](Self::purge_older_than) would drop live pools.
    pub async fn upsert(conn: &mut PgConnection, pair: &PairUpsert, report: &mut UpsertReport) -> Result<()> {
        let row = sqlx::query(
            r#"
            INSERT INTO exchange_pairs (
                base_record_id, quote_record_id, exchange_id, pool_address, name,
                reserve_usd, volume_usd, price_usd, price_change_24h,
                trades_24h, buys_24h, sells_24h, unique_buyers, unique_sellers
            )
            SELECT base.id, quote.id, ex.id, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15
            FROM blockchain_records base
            JOIN blockchain_records quote ON quote.blockchain = base.blockchain AND quote.address = $3
            JOIN exchanges ex ON ex.blockchain = base.blockchain AND ex.slug = $4
            WHERE base.blockchain = $1 AND base.address = $2
            ON CONFLICT (base_record_id, quote_record_id, exchange_id) DO UPDATE SET
                pool_address = EXCLUDED.pool_address,
                name = EXCLUDED.name,
                reserve_usd = EXCLUDED.reserve_usd,
                volume_usd = EXCLUDED.volume_usd,
                price_usd = EXCLUDED.price_usd,
                price_change_24h = EXCLUDED.price_change_24h,
                trades_24h = EXCLUDED.trades_24h,
                buys_24h = EXCLUDED.buys_24h,
                sells_24h = EXCLUDED.sells_24h,
                unique_buyers = EXCLUDED.unique_buyers,
                unique_sellers = EXCLUDED.unique_sellers,
                updated_at = NOW()
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(&pair.blockchain)
        .bind(&pair.base_address)
        .bind(&pair.quote_address)
        .bind(&pair.dex_slug)
        .bind(&pair.pool_address)
        .bind(&pair.name)
        .bind(pair.reserve_usd)
        .bind(pair.volume_usd)
        .bind(pair.price_usd)
        .bind(pair.price_change_24h)
        .bind(pair.trades_24h)
        .bind(pair.buys_24h)
        .bind(pair.sells_24h)
        .bind(pair.unique_buyers)
        .bind(pair.unique_sellers)
        .fetch_optional(&mut *conn)
        .await?;

        count_write(report, row.as_ref());
        Ok(())
    }

    pub async fn purge_older_than(pool: &PgPool, updated_before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM exchange_pairs WHERE updated_at < $1")
            .bind(updated_before)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn for_token(pool: &PgPool, token_id: Uuid, limit: i64) -> Result<Vec<PairView>> {
        let rows = sqlx::query(
            r#"
            SELECT
                p.*,
                base.address AS base_address,
                bt.id AS base_token_id, bt.cmc_slug AS base_slug, bt.cmc_id AS base_cmc_id, bt.symbol AS base_symbol,
                quote.address AS quote_address,
                qt.id AS quote_token_id, qt.cmc_slug AS quote_slug, qt.cmc_id AS quote_cmc_id, qt.symbol AS quote_symbol,
                b.slug AS blockchain, b.evm_chain_id, b.explorer_tx_url_format,
                ex.slug AS dex_slug, ex.name AS dex_name
            FROM exchange_pairs p
            JOIN blockchain_records base ON base.id = p.base_record_id
            JOIN tokens bt ON bt.id = base.token_id
            JOIN blockchain_records quote ON quote.id = p.quote_record_id
            JOIN tokens qt ON qt.id = quote.token_id
            JOIN exchanges ex ON ex.id = p.exchange_id
            JOIN blockchains b ON b.slug = base.blockchain
            WHERE bt.id = $1 OR qt.id = $1
            ORDER BY p.volume_usd DESC NULLS LAST, p.id
            LIMIT $2
            "#,
        )
        .bind(token_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        rows.iter().map(pair_from_row).collect()
    }
}
