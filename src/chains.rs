//! Supported chains and the identifiers each provider uses for them.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChainSpec {
    pub slug: &'static str,
    pub evm_chain_id: i64,
    pub name: &'static str,
    pub image: &'static str,
    pub explorer_url: &'static str,
    pub explorer_address_url_format: &'static str,
    pub explorer_token_url_format: &'static str,
    pub explorer_tx_url_format: &'static str,
    /// Market-data id of the chain's native asset.
    pub native_cmc_id: i64,
    /// Platform id used by the dexer endpoints.
    pub cmc_platform_id: u32,
    pub cmc_platform_name: &'static str,
    pub dex_label: &'static str,
    pub geckoterminal_network: &'static str,
    pub bitquery_network: &'static str,
}

pub const ETHEREUM: ChainSpec = ChainSpec {
    slug: "ethereum",
    evm_chain_id: 1,
    name: "Ethereum Mainnet",
    image: "https://s2.coinmarketcap.com/static/img/coins/64x64/1027.png",
    explorer_url: "https://etherscan.io",
    explorer_address_url_format: "https://etherscan.io/address/:address",
    explorer_token_url_format: "https://etherscan.io/token/:address",
    explorer_tx_url_format: "https://etherscan.io/tx/:hash",
    native_cmc_id: 1027,
    cmc_platform_id: 1,
    cmc_platform_name: "ethereum",
    dex_label: "uniswap",
    geckoterminal_network: "eth",
    bitquery_network: "ethereum",
};

pub const BINANCE_SMART_CHAIN: ChainSpec = ChainSpec {
    slug: "binance-smart-chain",
    evm_chain_id: 56,
    name: "Binance Smart Chain",
    image: "https://s2.coinmarketcap.com/static/img/coins/64x64/1839.png",
    explorer_url: "https://bscscan.com",
    explorer_address_url_format: "https://bscscan.com/address/:address",
    explorer_token_url_format: "https://bscscan.com/token/:address",
    explorer_tx_url_format: "https://bscscan.com/tx/:hash",
    native_cmc_id: 1839,
    cmc_platform_id: 14,
    cmc_platform_name: "bsc",
    dex_label: "pancakeswap",
    geckoterminal_network: "bsc",
    bitquery_network: "bsc",
};

pub const SUPPORTED_CHAINS: [ChainSpec; 2] = [ETHEREUM, BINANCE_SMART_CHAIN];

pub fn by_slug(slug: &str) -> Option<&'static ChainSpec> {
    SUPPORTED_CHAINS.iter().find(|chain| chain.slug == slug)
}

pub fn by_native_cmc_id(id: i64) -> Option<&'static ChainSpec> {
    SUPPORTED_CHAINS.iter().find(|chain| chain.native_cmc_id == id)
}

pub fn by_cmc_platform_id(id: u32) -> Option<&'static ChainSpec> {
    SUPPORTED_CHAINS.iter().find(|chain| chain.cmc_platform_id == id)
}

pub fn token_url(format: &str, address: &str) -> String {
    format.replace(":address", address)
}
