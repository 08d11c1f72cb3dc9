use super::SyncService;
use crate::chains;
use crate::error::AppError;
use crate::providers::{PartialToken, QuoteStats};
use crate::reconcile::{supplement_stats, IdentityMap};
use crate::types::{RecordClaim, TokenSyncReport, TokenUpsert};
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Active tokens ranked within `limit`, best rank first, plus every chain's
/// native asset wherever it ranks.
pub fn select_universe(catalog: &[PartialToken], limit: usize) -> Vec<PartialToken> {
    let mut ranked: Vec<&PartialToken> = catalog
        .iter()
        .filter(|token| token.active && token.rank.is_some())
        .collect();
    ranked.sort_by_key(|token| token.rank);
    ranked.truncate(limit);

    let mut selected: HashSet<&str> = ranked.iter().map(|token| token.provider_id.as_str()).collect();
    for chain in chains::SUPPORTED_CHAINS.iter() {
        let native_id = chain.native_cmc_id.to_string();
        if selected.contains(native_id.as_str()) {
            continue;
        }
        if let Some(native) = catalog.iter().find(|token| token.provider_id == native_id) {
            selected.insert(native.provider_id.as_str());
            ranked.push(native);
        }
    }

    ranked.into_iter().cloned().collect()
}

/// Turns the reconciled universe into rows. Tokens whose quote fails the
/// validity predicate are dropped. Contract claims and secondary slugs are
/// granted to the best-ranked token that asks for them.
pub fn build_plan(
    universe: &[PartialToken],
    stats: &HashMap<String, QuoteStats>,
    secondary_catalog: &[PartialToken],
    identities: &IdentityMap,
) -> Vec<TokenUpsert> {
    let secondary: HashMap<&str, &PartialToken> = secondary_catalog
        .iter()
        .map(|token| (token.provider_id.as_str(), token))
        .collect();

    let mut claimed_records: HashSet<RecordClaim> = HashSet::new();
    let mut claimed_slugs: HashSet<String> = HashSet::new();
    let mut plan = Vec::with_capacity(universe.len());

    for token in universe {
        let Ok(cmc_id) = token.provider_id.parse::<i64>() else {
            debug!(token = %token.symbol, id = %token.provider_id, "non-numeric id, skipped");
            continue;
        };
        let Some(quote) = stats.get(&token.provider_id) else {
            debug!(token = %token.symbol, "{}", AppError::InsufficientData("no quote".to_string()));
            continue;
        };
        let Some(valid) = quote.validate() else {
            debug!(token = %token.symbol, "{}", AppError::InsufficientData(token.slug.clone()));
            continue;
        };

        let identity = identities.secondary_for(&token.provider_id);
        let coingecko_slug = identity
            .map(|found| found.secondary_id.clone())
            .filter(|slug| claimed_slugs.insert(slug.clone()));

        let mut candidates: Vec<RecordClaim> = Vec::new();
        if let Some(platform) = &quote.platform {
            if let Some(chain) = platform.chain.as_deref().and_then(chains::by_slug) {
                candidates.push(RecordClaim {
                    blockchain: chain.slug.to_string(),
                    address: platform.address.clone(),
                });
            }
        }

        let own_addresses: HashSet<&str> = token.contracts.iter().map(|c| c.address.as_str()).collect();
        let matched = identity.and_then(|found| secondary.get(found.secondary_id.as_str()));
        for contract in matched.map(|other| other.contracts.as_slice()).unwrap_or_default() {
            let Some(chain) = contract.chain.as_deref().and_then(chains::by_slug) else {
                continue;
            };
            if own_addresses.contains(contract.address.as_str()) {
                candidates.push(RecordClaim {
                    blockchain: chain.slug.to_string(),
                    address: contract.address.clone(),
                });
            }
        }

        let records = candidates
            .into_iter()
            .filter(|claim| claimed_records.insert(claim.clone()))
            .collect();

        plan.push(TokenUpsert {
            cmc_id,
            cmc_slug: token.slug.clone(),
            coingecko_slug,
            symbol: token.symbol.clone(),
            name: token.name.clone(),
            image: quote.image.clone(),
            rank: quote.rank.or(token.rank).and_then(|rank| i32::try_from(rank).ok()),
            stats: valid,
            records,
        });
    }

    plan
}

impl SyncService {
    /// Fetches catalogs and quotes, reconciles them and writes the token
    /// universe in one transaction.
    pub async fn sync_tokens(&self) -> Result<TokenSyncReport> {
        let primary = &self.providers.primary;
        let catalog = primary
            .list_tokens()
            .await
            .map_err(AppError::from)
            .with_context(|| format!("{} catalog", primary.kind()))?;

        let universe = select_universe(&catalog, self.config.token_limit);
        let ids: Vec<String> = universe.iter().map(|token| token.provider_id.clone()).collect();
        info!(catalog = catalog.len(), universe = universe.len(), "📥 Primary catalog fetched");

        let mut stats = primary
            .get_stats(&ids)
            .await
            .map_err(AppError::from)
            .with_context(|| format!("{} quotes", primary.kind()))?;

        let (secondary_catalog, identities) = self.reconcile_secondary(&universe, &mut stats).await;

        let plan = build_plan(&universe, &stats, &secondary_catalog, &identities);
        let dropped = universe.len() - plan.len();
        if plan.is_empty() {
            anyhow::bail!("no token passed validation, refusing to empty the store");
        }
        info!(tokens = plan.len(), dropped, "🧮 Token plan built");

        let report = self.store.apply_token_sync(&plan).await?;
        if report.is_unchanged() {
            info!("Tokens unchanged");
        } else {
            info!(tokens = ?report.tokens, records = ?report.records, "💾 Tokens written");
        }
        Ok(report)
    }

    /// Matches the secondary catalog and fills quote gaps from it. Any
    /// secondary failure leaves the primary data as it is.
    async fn reconcile_secondary(
        &self,
        universe: &[PartialToken],
        stats: &mut HashMap<String, QuoteStats>,
    ) -> (Vec<PartialToken>, IdentityMap) {
        let Some(secondary) = &self.providers.secondary else {
            return (Vec::new(), IdentityMap::default());
        };

        let catalog = match secondary.list_tokens().await {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!(provider = %secondary.kind(), "secondary catalog skipped: {}", e);
                return (Vec::new(), IdentityMap::default());
            }
        };

        let identities = self.reconciler.reconcile(universe, &catalog);
        info!(provider = %secondary.kind(), matched = identities.len(), "🔗 Catalogs reconciled");

        match secondary.get_stats(&identities.secondary_ids()).await {
            Ok(extra) => {
                let supplemented = supplement_stats(stats, &extra, &identities);
                debug!(supplemented, "quotes supplemented");
            }
            Err(e) => warn!(provider = %secondary.kind(), "secondary quotes skipped: {}", e),
        }

        (catalog, identities)
    }
}
