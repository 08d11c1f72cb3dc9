use anyhow::{Context, Result};
use sqlx::PgPool;

pub struct SystemOperations;

const SCHEMA: &[(&str, &str)] = &[
    (
        "tokens",
        r#"
        CREATE TABLE IF NOT EXISTS tokens (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            cmc_id BIGINT NOT NULL UNIQUE,
            cmc_slug TEXT NOT NULL UNIQUE,
            coingecko_slug TEXT UNIQUE,
            symbol TEXT NOT NULL,
            name TEXT NOT NULL,
            image TEXT,
            rank INTEGER,
            price NUMERIC NOT NULL,
            volume_24h NUMERIC NOT NULL,
            volume_change_24h DOUBLE PRECISION,
            market_cap NUMERIC NOT NULL,
            fully_diluted_market_cap NUMERIC,
            circulating_supply NUMERIC NOT NULL,
            total_supply NUMERIC,
            percent_change_1h DOUBLE PRECISION NOT NULL,
            percent_change_24h DOUBLE PRECISION NOT NULL,
            percent_change_7d DOUBLE PRECISION,
            last_updated TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "blockchains",
        r#"
        CREATE TABLE IF NOT EXISTS blockchains (
            slug TEXT PRIMARY KEY,
            evm_chain_id BIGINT NOT NULL,
            name TEXT NOT NULL,
            image TEXT NOT NULL,
            explorer_url TEXT NOT NULL,
            explorer_address_url_format TEXT NOT NULL,
            explorer_token_url_format TEXT NOT NULL,
            explorer_tx_url_format TEXT NOT NULL,
            bq_slug TEXT NOT NULL,
            native_cmc_id BIGINT NOT NULL,
            cmc_platform_id BIGINT NOT NULL,
            parent_token_id UUID REFERENCES tokens(id) ON DELETE SET NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "blockchain_records",
        r#"
        CREATE TABLE IF NOT EXISTS blockchain_records (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            token_id UUID NOT NULL REFERENCES tokens(id) ON DELETE CASCADE,
            blockchain TEXT NOT NULL REFERENCES blockchains(slug) ON DELETE CASCADE,
            address TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (blockchain, address)
        )
        "#,
    ),
    (
        "exchanges",
        r#"
        CREATE TABLE IF NOT EXISTS exchanges (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            blockchain TEXT NOT NULL REFERENCES blockchains(slug) ON DELETE CASCADE,
            slug TEXT NOT NULL,
            name TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (blockchain, slug)
        )
        "#,
    ),
    (
        "exchange_pairs",
        r#"
        CREATE TABLE IF NOT EXISTS exchange_pairs (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            base_record_id UUID NOT NULL REFERENCES blockchain_records(id) ON DELETE CASCADE,
            quote_record_id UUID NOT NULL REFERENCES blockchain_records(id) ON DELETE CASCADE,
            exchange_id UUID NOT NULL REFERENCES exchanges(id) ON DELETE CASCADE,
            pool_address TEXT NOT NULL,
            name TEXT NOT NULL,
            reserve_usd NUMERIC,
            volume_usd NUMERIC,
            price_usd NUMERIC,
            price_change_24h DOUBLE PRECISION,
            trades_24h BIGINT,
            buys_24h BIGINT,
            sells_24h BIGINT,
            unique_buyers BIGINT,
            unique_sellers BIGINT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (base_record_id, quote_record_id, exchange_id)
        )
        "#,
    ),
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_tokens_rank ON tokens(rank)",
    "CREATE INDEX IF NOT EXISTS idx_tokens_market_cap ON tokens(market_cap DESC)",
    "CREATE INDEX IF NOT EXISTS idx_tokens_last_updated ON tokens(last_updated)",
    "CREATE INDEX IF NOT EXISTS idx_records_token ON blockchain_records(token_id)",
    "CREATE INDEX IF NOT EXISTS idx_pairs_quote_record ON exchange_pairs(quote_record_id)",
    "CREATE INDEX IF NOT EXISTS idx_pairs_volume ON exchange_pairs(volume_usd DESC)",
    "CREATE INDEX IF NOT EXISTS idx_pairs_updated_at ON exchange_pairs(updated_at)",
];

impl SystemOperations {
    pub async fn create_tables(pool: &PgPool) -> Result<()> {
        for (name, ddl) in SCHEMA {
            sqlx::query(ddl)
                .execute(pool)
                .await
                .with_context(|| format!("failed to create {}", name))?;
        }

        for ddl in INDEXES {
            sqlx::query(ddl).execute(pool).await?;
        }

        Ok(())
    }
}
