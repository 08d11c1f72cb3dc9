pub mod matchers;

pub use matchers::{Confidence, ContractAddressMatcher, Matcher, SymbolSlugMatcher};

use crate::providers::{PartialToken, QuoteStats};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityMatch {
    pub primary_id: String,
    pub secondary_id: String,
    pub confidence: Confidence,
}

/// Side mapping between the primary and secondary identifier schemes. Each
/// secondary id is assigned to at most one primary id.
#[derive(Debug, Default, Clone)]
pub struct IdentityMap {
    by_primary: HashMap<String, IdentityMatch>,
    by_secondary: HashMap<String, String>,
}

impl IdentityMap {
    pub fn secondary_for(&self, primary_id: &str) -> Option<&IdentityMatch> {
        self.by_primary.get(primary_id)
    }

    pub fn primary_for(&self, secondary_id: &str) -> Option<&str> {
        self.by_secondary.get(secondary_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_primary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_primary.is_empty()
    }

    pub fn secondary_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.by_secondary.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn insert(&mut self, found: IdentityMatch) {
        self.by_secondary
            .insert(found.secondary_id.clone(), found.primary_id.clone());
        self.by_primary.insert(found.primary_id.clone(), found);
    }
}

/// Matches a primary catalog against a secondary one.
///
/// Primary entries are processed in the order given, so callers pass them
/// ranked. For each one, the highest-confidence unclaimed secondary candidate
/// wins; among equals, the first candidate in secondary catalog order wins.
pub struct Reconciler {
    matchers: Vec<Box<dyn Matcher>>,
    min_confidence: Confidence,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(vec![Box::new(ContractAddressMatcher), Box::new(SymbolSlugMatcher)])
    }
}

impl Reconciler {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self {
            matchers,
            min_confidence: Confidence::Weak,
        }
    }

    pub fn with_min_confidence(mut self, min_confidence: Confidence) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn assess(&self, a: &PartialToken, b: &PartialToken) -> Confidence {
        self.matchers
            .iter()
            .map(|matcher| matcher.assess(a, b))
            .max()
            .unwrap_or(Confidence::None)
    }

    pub fn reconcile(&self, primary: &[PartialToken], secondary: &[PartialToken]) -> IdentityMap {
        let indexes: Vec<HashMap<String, Vec<usize>>> = self
            .matchers
            .iter()
            .map(|matcher| {
                let mut index: HashMap<String, Vec<usize>> = HashMap::new();
                for (position, token) in secondary.iter().enumerate() {
                    for key in matcher.keys(token) {
                        index.entry(key).or_default().push(position);
                    }
                }
                index
            })
            .collect();

        let mut claimed: HashSet<usize> = HashSet::new();
        let mut map = IdentityMap::default();

        for candidate in primary {
            let positions: BTreeSet<usize> = self
                .matchers
                .iter()
                .zip(&indexes)
                .flat_map(|(matcher, index)| {
                    matcher
                        .keys(candidate)
                        .into_iter()
                        .filter_map(|key| index.get(&key))
                        .flatten()
                        .copied()
                        .collect::<Vec<_>>()
                })
                .filter(|position| !claimed.contains(position))
                .collect();

            let mut best: Option<(Confidence, usize)> = None;
            for position in positions {
                let confidence = self.assess(candidate, &secondary[position]);
                if confidence < self.min_confidence {
                    continue;
                }
                if best.map_or(true, |(current, _)| confidence > current) {
                    best = Some((confidence, position));
                }
                if confidence == Confidence::Strong {
                    break;
                }
            }

            if let Some((confidence, position)) = best {
                claimed.insert(position);
                map.insert(IdentityMatch {
                    primary_id: candidate.provider_id.clone(),
                    secondary_id: secondary[position].provider_id.clone(),
                    confidence,
                });
            }
        }

        debug!(primary = primary.len(), matched = map.len(), "catalogs reconciled");
        map
    }
}

/// Fills gaps in primary quotes from the matched secondary quotes. A primary
/// id without any quote takes the secondary quote as a whole.
pub fn supplement_stats(
    primary: &mut HashMap<String, QuoteStats>,
    secondary: &HashMap<String, QuoteStats>,
    map: &IdentityMap,
) -> usize {
    let mut supplemented = 0;
    for (primary_id, found) in &map.by_primary {
        let Some(extra) = secondary.get(&found.secondary_id) else {
            continue;
        };
        match primary.get_mut(primary_id) {
            Some(stats) => {
                let before = stats.is_usable();
                stats.fill_missing(extra);
                if !before && stats.is_usable() {
                    supplemented += 1;
                }
            }
            None => {
                primary.insert(primary_id.clone(), extra.clone());
                if extra.is_usable() {
                    supplemented += 1;
                }
            }
        }
    }
    supplemented
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ContractRef;

    fn token(id: &str, slug: &str, symbol: &str, contracts: &[(&str, &str)]) -> PartialToken {
        PartialToken {
            provider_id: id.to_string(),
            slug: slug.to_string(),
            symbol: symbol.to_string(),
            name: slug.to_string(),
            rank: None,
            active: true,
            contracts: contracts
                .iter()
                .map(|(chain, address)| {
                    let chain = (!chain.is_empty()).then_some(*chain);
                    ContractRef::new(chain, address)
                })
                .collect(),
        }
    }

    #[test]
    fn test_contract_match_beats_earlier_symbol_match() {
        let primary = vec![token("24478", "pepe", "PEPE", &[("", "0xpepe")])];
        let secondary = vec![
            token("pepe-bsc", "pepe-bsc", "pepe", &[("binance-smart-chain", "0xother")]),
            token("pepe", "pepe-token", "pepe", &[("ethereum", "0xPEPE")]),
        ];

        let map = Reconciler::default().reconcile(&primary, &secondary);
        let found = map.secondary_for("24478").unwrap();

        assert_eq!(found.secondary_id, "pepe");
        assert_eq!(found.confidence, Confidence::Strong);
        assert_eq!(map.primary_for("pepe"), Some("24478"));
    }

    #[test]
    fn test_first_candidate_wins_ties() {
        let primary = vec![token("1", "alpha", "ABC", &[])];
        let secondary = vec![token("abc-one", "abc-one", "abc", &[]), token("abc-two", "abc-two", "abc", &[])];

        let map = Reconciler::default().reconcile(&primary, &secondary);
        assert_eq!(map.secondary_for("1").unwrap().secondary_id, "abc-one");
    }

    #[test]
    fn test_secondary_assigned_once_in_primary_order() {
        let primary = vec![token("1", "usd-coin", "USDC", &[]), token("2", "bridged-usdc", "USDC", &[])];
        let secondary = vec![token("usd-coin", "usd-coin", "usdc", &[])];

        let map = Reconciler::default().reconcile(&primary, &secondary);

        assert_eq!(map.secondary_for("1").unwrap().confidence, Confidence::Medium);
        assert!(map.secondary_for("2").is_none());
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_min_confidence_filters_symbol_matches() {
        let primary = vec![token("1", "alpha", "ABC", &[])];
        let secondary = vec![token("abc", "abc", "abc", &[])];

        let map = Reconciler::default()
            .with_min_confidence(Confidence::Medium)
            .reconcile(&primary, &secondary);
        assert!(map.is_empty());
    }

    #[test]
    fn test_supplement_makes_quote_usable() {
        let primary_catalog = vec![token("1", "pepe", "PEPE", &[])];
        let secondary_catalog = vec![token("pepe", "pepe", "pepe", &[])];
        let map = Reconciler::default().reconcile(&primary_catalog, &secondary_catalog);

        let mut primary = HashMap::from([(
            "1".to_string(),
            QuoteStats {
                price: Some(1.0),
                volume_24h: Some(10.0),
                circulating_supply: Some(100.0),
                percent_change_1h: Some(0.1),
                percent_change_24h: Some(0.2),
                ..Default::default()
            },
        )]);
        let secondary = HashMap::from([(
            "pepe".to_string(),
            QuoteStats {
                market_cap: Some(100.0),
                ..Default::default()
            },
        )]);

        assert_eq!(supplement_stats(&mut primary, &secondary, &map), 1);
        assert!(primary["1"].is_usable());
    }
}
