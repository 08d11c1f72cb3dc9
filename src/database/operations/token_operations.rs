use super::chain_operations::count_write;
use crate::database::utils::*;
use crate::types::*;
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row};
use std::collections::HashMap;
use uuid::Uuid;

pub struct TokenOperations;

const UNPRICED_RECORD: &str = r#"
    NOT EXISTS (
        SELECT 1 FROM exchange_pairs p
        WHERE (p.base_record_id = r.id OR p.quote_record_id = r.id)
          AND p.price_usd IS NOT NULL
    )
"#;

fn token_from_row(row: &PgRow) -> Result<Token> {
    Ok(Token {
        id: row.try_get("id")?,
        cmc_id: row.try_get("cmc_id")?,
        cmc_slug: safe_get_string(row, "cmc_slug"),
        coingecko_slug: safe_get_optional_string(row, "coingecko_slug"),
        symbol: safe_get_string(row, "symbol"),
        name: safe_get_string(row, "name"),
        image: safe_get_optional_string(row, "image"),
        rank: safe_get_optional_i32(row, "rank"),
        price: safe_get_decimal(row, "price"),
        volume_24h: safe_get_decimal(row, "volume_24h"),
        volume_change_24h: safe_get_optional_f64(row, "volume_change_24h"),
        market_cap: safe_get_decimal(row, "market_cap"),
        fully_diluted_market_cap: safe_get_optional_decimal(row, "fully_diluted_market_cap"),
        circulating_supply: safe_get_decimal(row, "circulating_supply"),
        total_supply: safe_get_optional_decimal(row, "total_supply"),
        percent_change_1h: safe_get_f64(row, "percent_change_1h"),
        percent_change_24h: safe_get_f64(row, "percent_change_24h"),
        percent_change_7d: safe_get_optional_f64(row, "percent_change_7d"),
        last_updated: safe_get_optional_datetime(row, "last_updated"),
    })
}

fn record_from_row(row: &PgRow) -> Result<TokenRecord> {
    Ok(TokenRecord {
        id: row.try_get("id")?,
        token_id: row.try_get("token_id")?,
        blockchain: safe_get_string(row, "blockchain"),
        address: safe_get_string(row, "address"),
    })
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &TokenListQuery) {
    builder.push(" WHERE TRUE");

    if let Some(search) = &query.search {
        let needle = search.to_lowercase();
        let pattern = format!("%{}%", escape_like(&needle));
        builder
            .push(" AND (LOWER(t.symbol) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(t.name) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(t.cmc_slug) LIKE ")
            .push_bind(pattern)
            .push(" OR EXISTS (SELECT 1 FROM blockchain_records r WHERE r.token_id = t.id AND r.address = ")
            .push_bind(needle)
            .push("))");
    }

    if !query.chains.is_empty() {
        builder
            .push(" AND EXISTS (SELECT 1 FROM blockchain_records r WHERE r.token_id = t.id AND r.blockchain = ANY(")
            .push_bind(query.chains.clone())
            .push("))");
    }
}

impl TokenOperations {
    /// Deletes tokens missing from `keep_cmc_ids`, sparing native assets.
    pub async fn delete_missing(conn: &mut PgConnection, keep_cmc_ids: &[i64]) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM tokens t
            WHERE t.cmc_id <> ALL($1)
              AND NOT EXISTS (SELECT 1 FROM blockchains b WHERE b.parent_token_id = t.id)
            "#,
        )
        .bind(keep_cmc_ids)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Frees secondary slugs that are about to move to another token.
    pub async fn release_coingecko_slugs(conn: &mut PgConnection, plan: &[TokenUpsert]) -> Result<u64> {
        let (slugs, cmc_ids): (Vec<String>, Vec<i64>) = plan
            .iter()
            .filter_map(|token| Some((token.coingecko_slug.clone()?, token.cmc_id)))
            .unzip();

        if slugs.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            UPDATE tokens t
            SET coingecko_slug = NULL, updated_at = NOW()
            FROM UNNEST($1::text[], $2::bigint[]) AS claim(slug, cmc_id)
            WHERE t.coingecko_slug = claim.slug AND t.cmc_id <> claim.cmc_id
            "#,
        )
        .bind(&slugs)
        .bind(&cmc_ids)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn upsert(conn: &mut PgConnection, token: &TokenUpsert, report: &mut UpsertReport) -> Result<()> {
        let stats = &token.stats;
        let row = sqlx::query(
            r#"
            INSERT INTO tokens (
                cmc_id, cmc_slug, coingecko_slug, symbol, name, image, rank,
                price, volume_24h, volume_change_24h, market_cap, fully_diluted_market_cap,
                circulating_supply, total_supply, percent_change_1h, percent_change_24h, percent_change_7d
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (cmc_id) DO UPDATE SET
                cmc_slug = EXCLUDED.cmc_slug,
                coingecko_slug = EXCLUDED.coingecko_slug,
                symbol = EXCLUDED.symbol,
                name = EXCLUDED.name,
                image = EXCLUDED.image,
                rank = EXCLUDED.rank,
                price = EXCLUDED.price,
                volume_24h = EXCLUDED.volume_24h,
                volume_change_24h = EXCLUDED.volume_change_24h,
                market_cap = EXCLUDED.market_cap,
                fully_diluted_market_cap = EXCLUDED.fully_diluted_market_cap,
                circulating_supply = EXCLUDED.circulating_supply,
                total_supply = EXCLUDED.total_supply,
                percent_change_1h = EXCLUDED.percent_change_1h,
                percent_change_24h = EXCLUDED.percent_change_24h,
                percent_change_7d = EXCLUDED.percent_change_7d,
                updated_at = NOW()
            WHERE (
                tokens.cmc_slug, tokens.coingecko_slug, tokens.symbol, tokens.name, tokens.image, tokens.rank,
                tokens.price, tokens.volume_24h, tokens.volume_change_24h, tokens.market_cap,
                tokens.fully_diluted_market_cap, tokens.circulating_supply, tokens.total_supply,
                tokens.percent_change_1h, tokens.percent_change_24h, tokens.percent_change_7d
            ) IS DISTINCT FROM (
                EXCLUDED.cmc_slug, EXCLUDED.coingecko_slug, EXCLUDED.symbol, EXCLUDED.name, EXCLUDED.image,
                EXCLUDED.rank, EXCLUDED.price, EXCLUDED.volume_24h, EXCLUDED.volume_change_24h,
                EXCLUDED.market_cap, EXCLUDED.fully_diluted_market_cap, EXCLUDED.circulating_supply,
                EXCLUDED.total_supply, EXCLUDED.percent_change_1h, EXCLUDED.percent_change_24h,
                EXCLUDED.percent_change_7d
            )
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(token.cmc_id)
        .bind(&token.cmc_slug)
        .bind(&token.coingecko_slug)
        .bind(&token.symbol)
        .bind(&token.name)
        .bind(&token.image)
        .bind(token.rank)
        .bind(stats.price)
        .bind(stats.volume_24h)
        .bind(stats.volume_change_24h)
        .bind(stats.market_cap)
        .bind(stats.fully_diluted_market_cap)
        .bind(stats.circulating_supply)
        .bind(stats.total_supply)
        .bind(stats.percent_change_1h)
        .bind(stats.percent_change_24h)
        .bind(stats.percent_change_7d)
        .fetch_optional(&mut *conn)
        .await?;

        count_write(report, row.as_ref());
        Ok(())
    }

    pub async fn ids_by_cmc_id(conn: &mut PgConnection, cmc_ids: &[i64]) -> Result<HashMap<i64, Uuid>> {
        let rows = sqlx::query("SELECT id, cmc_id FROM tokens WHERE cmc_id = ANY($1)")
            .bind(cmc_ids)
            .fetch_all(&mut *conn)
            .await?;

        rows.iter()
            .map(|row| Ok((row.try_get("cmc_id")?, row.try_get("id")?)))
            .collect()
    }

    /// Points the record at `token_id`. Records on unknown chains are skipped.
    pub async fn claim_record(
        conn: &mut PgConnection,
        token_id: Uuid,
        claim: &RecordClaim,
        report: &mut UpsertReport,
    ) -> Result<()> {
        let row = sqlx::query(
            r#"
            INSERT INTO blockchain_records (token_id, blockchain, address)
            SELECT $1, $2, $3
            WHERE EXISTS (SELECT 1 FROM blockchains WHERE slug = $2)
            ON CONFLICT (blockchain, address) DO UPDATE SET token_id = EXCLUDED.token_id
            WHERE blockchain_records.token_id IS DISTINCT FROM EXCLUDED.token_id
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(token_id)
        .bind(&claim.blockchain)
        .bind(&claim.address)
        .fetch_optional(&mut *conn)
        .await?;

        count_write(report, row.as_ref());
        Ok(())
    }

    /// Drops records of the given tokens that are no longer claimed.
    pub async fn delete_unclaimed_records(
        conn: &mut PgConnection,
        claims: &[(Uuid, &RecordClaim)],
        token_ids: &[Uuid],
    ) -> Result<u64> {
        let owners: Vec<Uuid> = claims.iter().map(|(token_id, _)| *token_id).collect();
        let chains: Vec<String> = claims.iter().map(|(_, claim)| claim.blockchain.clone()).collect();
        let addresses: Vec<String> = claims.iter().map(|(_, claim)| claim.address.clone()).collect();

        let result = sqlx::query(
            r#"
            DELETE FROM blockchain_records r
            WHERE r.token_id = ANY($1)
              AND NOT EXISTS (
                  SELECT 1 FROM UNNEST($2::uuid[], $3::text[], $4::text[]) AS c(token_id, blockchain, address)
                  WHERE c.token_id = r.token_id AND c.blockchain = r.blockchain AND c.address = r.address
              )
            "#,
        )
        .bind(token_ids)
        .bind(&owners)
        .bind(&chains)
        .bind(&addresses)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn stamp_pairs_synced(conn: &mut PgConnection, token_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE tokens SET last_updated = NOW() WHERE id = $1")
            .bind(token_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn records_for(pool: &PgPool, token_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<TokenRecord>>> {
        let rows = sqlx::query(
            "SELECT * FROM blockchain_records WHERE token_id = ANY($1) ORDER BY blockchain, address",
        )
        .bind(token_ids)
        .fetch_all(pool)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<TokenRecord>> = HashMap::new();
        for row in &rows {
            let record = record_from_row(row)?;
            grouped.entry(record.token_id).or_default().push(record);
        }
        Ok(grouped)
    }

    async fn with_records(pool: &PgPool, tokens: Vec<Token>) -> Result<Vec<TokenWithRecords>> {
        let ids: Vec<Uuid> = tokens.iter().map(|token| token.id).collect();
        let mut records = Self::records_for(pool, &ids).await?;

        Ok(tokens
            .into_iter()
            .map(|token| TokenWithRecords {
                records: records.remove(&token.id).unwrap_or_default(),
                token,
            })
            .collect())
    }

    pub async fn stale(pool: &PgPool, refreshed_before: DateTime<Utc>, limit: usize) -> Result<Vec<TokenWithRecords>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM tokens
            WHERE last_updated IS NULL OR last_updated < $1
            ORDER BY rank ASC NULLS LAST, cmc_id ASC
            LIMIT $2
            "#,
        )
        .bind(refreshed_before)
        .bind(limit as i64)
        .fetch_all(pool)
        .await?;

        let tokens = rows.iter().map(token_from_row).collect::<Result<Vec<_>>>()?;
        Self::with_records(pool, tokens).await
    }

    pub async fn list(pool: &PgPool, query: &TokenListQuery) -> Result<TokenPage> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) AS total FROM tokens t");
        push_filters(&mut count, query);
        let total: i64 = count.build().fetch_one(pool).await?.try_get("total")?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT t.* FROM tokens t");
        push_filters(&mut select, query);
        select
            .push(format!(
                " ORDER BY t.{} {} NULLS LAST, t.cmc_id ASC",
                query.sort_by.column(),
                query.sort_order.sql()
            ))
            .push(" LIMIT ")
            .push_bind(query.limit)
            .push(" OFFSET ")
            .push_bind(query.offset);

        let rows = select.build().fetch_all(pool).await?;
        let tokens = rows.iter().map(token_from_row).collect::<Result<Vec<_>>>()?;

        Ok(TokenPage {
            tokens: Self::with_records(pool, tokens).await?,
            total,
        })
    }

    pub async fn by_slug(pool: &PgPool, cmc_slug: &str) -> Result<Option<TokenWithRecords>> {
        let row = sqlx::query("SELECT * FROM tokens WHERE cmc_slug = $1")
            .bind(cmc_slug)
            .fetch_optional(pool)
            .await?;
        Self::single(pool, row).await
    }

    pub async fn by_id(pool: &PgPool, id: Uuid) -> Result<Option<TokenWithRecords>> {
        let row = sqlx::query("SELECT * FROM tokens WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Self::single(pool, row).await
    }

    async fn single(pool: &PgPool, row: Option<PgRow>) -> Result<Option<TokenWithRecords>> {
        let Some(row) = row else {
            return Ok(None);
        };
        let token = token_from_row(&row)?;
        Ok(Self::with_records(pool, vec![token]).await?.into_iter().next())
    }

    pub async fn pair_freshness(pool: &PgPool, token_id: Uuid) -> Result<Option<PairFreshness>> {
        let query = format!(
            r#"
            SELECT
                t.last_updated,
                (SELECT COUNT(*) FROM blockchain_records r WHERE r.token_id = t.id) AS records,
                (SELECT COUNT(*) FROM blockchain_records r WHERE r.token_id = t.id AND {}) AS unpriced_records
            FROM tokens t
            WHERE t.id = $1
            "#,
            UNPRICED_RECORD
        );

        let row = sqlx::query(&query).bind(token_id).fetch_optional(pool).await?;

        Ok(row.map(|row| PairFreshness {
            last_updated: safe_get_optional_datetime(&row, "last_updated"),
            records: safe_get_i64(&row, "records"),
            unpriced_records: safe_get_i64(&row, "unpriced_records"),
        }))
    }
}
