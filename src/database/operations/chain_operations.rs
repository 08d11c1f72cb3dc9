use crate::database::utils::*;
use crate::types::{Blockchain, UpsertReport};
use anyhow::Result;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};

pub struct ChainOperations;

fn blockchain_from_row(row: &PgRow) -> Result<Blockchain> {
    Ok(Blockchain {
        slug: row.try_get("slug")?,
        evm_chain_id: safe_get_i64(row, "evm_chain_id"),
        name: safe_get_string(row, "name"),
        image: safe_get_string(row, "image"),
        explorer_url: safe_get_string(row, "explorer_url"),
        explorer_address_url_format: safe_get_string(row, "explorer_address_url_format"),
        explorer_token_url_format: safe_get_string(row, "explorer_token_url_format"),
        explorer_tx_url_format: safe_get_string(row, "explorer_tx_url_format"),
        bq_slug: safe_get_string(row, "bq_slug"),
        native_cmc_id: safe_get_i64(row, "native_cmc_id"),
        cmc_platform_id: safe_get_i64(row, "cmc_platform_id"),
        parent_token_id: row.try_get("parent_token_id")?,
    })
}

impl ChainOperations {
    pub async fn upsert_all(conn: &mut PgConnection, chains: &[Blockchain]) -> Result<UpsertReport> {
        let mut report = UpsertReport::default();

        for chain in chains {
            let row = sqlx::query(
                r#"
                INSERT INTO blockchains (
                    slug, evm_chain_id, name, image, explorer_url,
                    explorer_address_url_format, explorer_token_url_format, explorer_tx_url_format,
                    bq_slug, native_cmc_id, cmc_platform_id
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ON CONFLICT (slug) DO UPDATE SET
                    evm_chain_id = EXCLUDED.evm_chain_id,
                    name = EXCLUDED.name,
                    image = EXCLUDED.image,
                    explorer_url = EXCLUDED.explorer_url,
                    explorer_address_url_format = EXCLUDED.explorer_address_url_format,
                    explorer_token_url_format = EXCLUDED.explorer_token_url_format,
                    explorer_tx_url_format = EXCLUDED.explorer_tx_url_format,
                    bq_slug = EXCLUDED.bq_slug,
                    native_cmc_id = EXCLUDED.native_cmc_id,
                    cmc_platform_id = EXCLUDED.cmc_platform_id,
                    updated_at = NOW()
                WHERE (
                    blockchains.evm_chain_id, blockchains.name, blockchains.image, blockchains.explorer_url,
                    blockchains.explorer_address_url_format, blockchains.explorer_token_url_format,
                    blockchains.explorer_tx_url_format, blockchains.bq_slug, blockchains.native_cmc_id,
                    blockchains.cmc_platform_id
                ) IS DISTINCT FROM (
                    EXCLUDED.evm_chain_id, EXCLUDED.name, EXCLUDED.image, EXCLUDED.explorer_url,
                    EXCLUDED.explorer_address_url_format, EXCLUDED.explorer_token_url_format,
                    EXCLUDED.explorer_tx_url_format, EXCLUDED.bq_slug, EXCLUDED.native_cmc_id,
                    EXCLUDED.cmc_platform_id
                )
                RETURNING (xmax = 0) AS inserted
                "#,
            )
            .bind(&chain.slug)
            .bind(chain.evm_chain_id)
            .bind(&chain.name)
            .bind(&chain.image)
            .bind(&chain.explorer_url)
            .bind(&chain.explorer_address_url_format)
            .bind(&chain.explorer_token_url_format)
            .bind(&chain.explorer_tx_url_format)
            .bind(&chain.bq_slug)
            .bind(chain.native_cmc_id)
            .bind(chain.cmc_platform_id)
            .fetch_optional(&mut *conn)
            .await?;

            count_write(&mut report, row.as_ref());
        }

        let slugs: Vec<String> = chains.iter().map(|chain| chain.slug.clone()).collect();
        let deleted = sqlx::query("DELETE FROM blockchains WHERE slug <> ALL($1)")
            .bind(&slugs)
            .execute(&mut *conn)
            .await?;
        report.deleted = deleted.rows_affected();

        Ok(report)
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Blockchain>> {
        let rows = sqlx::query("SELECT * FROM blockchains ORDER BY evm_chain_id")
            .fetch_all(pool)
            .await?;

        rows.iter().map(blockchain_from_row).collect()
    }

    /// Points each chain at its native token when that token exists.
    pub async fn link_native_tokens(conn: &mut PgConnection) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE blockchains b
            SET parent_token_id = t.id, updated_at = NOW()
            FROM tokens t
            WHERE t.cmc_id = b.native_cmc_id
              AND b.parent_token_id IS DISTINCT FROM t.id
            "#,
        )
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }
}

/// Tallies one `RETURNING (xmax = 0) AS inserted` row; no row means the
/// guarded update found nothing to change.
pub(crate) fn count_write(report: &mut UpsertReport, row: Option<&PgRow>) {
    match row {
        Some(row) if safe_get_bool(row, "inserted") => report.inserted += 1,
        Some(_) => report.updated += 1,
        None => {}
    }
}
