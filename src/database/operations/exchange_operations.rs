use super::chain_operations::count_write;
use crate::types::{ExchangeUpsert, UpsertReport};
use anyhow::Result;
use sqlx::PgConnection;

pub struct ExchangeOperations;

impl ExchangeOperations {
    pub async fn upsert_all(conn: &mut PgConnection, exchanges: &[ExchangeUpsert]) -> Result<UpsertReport> {
        let mut report = UpsertReport::default();

        for exchange in exchanges {
            let row = sqlx::query(
                r#"
                INSERT INTO exchanges (blockchain, slug, name)
                SELECT $1, $2, $3
                WHERE EXISTS (SELECT 1 FROM blockchains WHERE slug = $1)
                ON CONFLICT (blockchain, slug) DO UPDATE SET name = EXCLUDED.name
                WHERE exchanges.name IS DISTINCT FROM EXCLUDED.name
                RETURNING (xmax = 0) AS inserted
                "#,
            )
            .bind(&exchange.blockchain)
            .bind(&exchange.slug)
            .bind(&exchange.name)
            .fetch_optional(&mut *conn)
            .await?;

            count_write(&mut report, row.as_ref());
        }

        Ok(report)
    }
}
