use crate::providers::{ContractRef, PartialToken};

/// How strongly two catalog entries are believed to be the same asset.
/// Variants are ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
    None,
    /// Same ticker symbol.
    Weak,
    /// Same slug.
    Medium,
    /// Shared contract address.
    Strong,
}

pub trait Matcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Keys under which a token is indexed; only entries sharing a key are
    /// ever assessed against each other.
    fn keys(&self, token: &PartialToken) -> Vec<String>;

    fn assess(&self, a: &PartialToken, b: &PartialToken) -> Confidence;
}

/// Equal lower-cased contract address, on the same chain when both sides
/// know the chain.
pub struct ContractAddressMatcher;

fn same_contract(a: &ContractRef, b: &ContractRef) -> bool {
    if a.address != b.address {
        return false;
    }
    match (&a.chain, &b.chain) {
        (Some(left), Some(right)) => left == right,
        _ => true,
    }
}

impl Matcher for ContractAddressMatcher {
    fn name(&self) -> &'static str {
        "contract-address"
    }

    fn keys(&self, token: &PartialToken) -> Vec<String> {
        token
            .contracts
            .iter()
            .map(|contract| contract.address.clone())
            .collect()
    }

    fn assess(&self, a: &PartialToken, b: &PartialToken) -> Confidence {
        let shared = a
            .contracts
            .iter()
            .any(|left| b.contracts.iter().any(|right| same_contract(left, right)));
        if shared {
            Confidence::Strong
        } else {
            Confidence::None
        }
    }
}

/// Case-insensitive slug equality, then symbol equality.
pub struct SymbolSlugMatcher;

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

impl Matcher for SymbolSlugMatcher {
    fn name(&self) -> &'static str {
        "symbol-slug"
    }

    fn keys(&self, token: &PartialToken) -> Vec<String> {
        vec![
            format!("slug:{}", normalize(&token.slug)),
            format!("symbol:{}", normalize(&token.symbol)),
        ]
    }

    fn assess(&self, a: &PartialToken, b: &PartialToken) -> Confidence {
        if normalize(&a.slug) == normalize(&b.slug) {
            Confidence::Medium
        } else if normalize(&a.symbol) == normalize(&b.symbol) {
            Confidence::Weak
        } else {
            Confidence::None
        }
    }
}
