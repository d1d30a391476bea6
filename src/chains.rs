// src/chains.rs

//! Static chain catalog.
//!
//! Every chain the custody engine knows about is described here once: its family
//! (which selects the derivation, balance and sweep strategy), native asset,
//! derivation path, address encoding parameters, default endpoint tiers and the
//! tokens tracked for balance aggregation. Endpoint tiers can be overridden per
//! chain from `Settings`.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Chain family. Selects the handler used for derivation, balances and sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainFamily {
    /// Account/nonce model, gas priced in the native unit.
    Evm,
    /// Unspent-output model.
    Utxo,
    /// Account model with bandwidth/energy fees.
    Tron,
    /// Account model, ed25519 keys taken straight from the seed.
    Solana,
    /// Cosmos-style accounts: hash160 of the compressed key, bech32 encoded.
    CosmosBech32,
}

impl ChainFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Evm => "evm",
            Self::Utxo => "utxo",
            Self::Tron => "tron",
            Self::Solana => "solana",
            Self::CosmosBech32 => "cosmos_bech32",
        }
    }
}

impl fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a tracked token lives, in the family's own addressing scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenLocator {
    /// ERC-20 contract address.
    Erc20(&'static str),
    /// TRC-20 contract address (base58check).
    Trc20(&'static str),
    /// SPL token mint.
    SplMint(&'static str),
    /// Cosmos bank denom (native or IBC).
    BankDenom(&'static str),
}

impl TokenLocator {
    pub fn id(&self) -> &'static str {
        match self {
            Self::Erc20(id) | Self::Trc20(id) | Self::SplMint(id) | Self::BankDenom(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenDescriptor {
    pub symbol: &'static str,
    pub locator: TokenLocator,
    /// Used when the on-chain `decimals()` lookup is unavailable.
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainDescriptor {
    pub id: &'static str,
    pub name: &'static str,
    pub family: ChainFamily,
    pub native_symbol: &'static str,
    pub decimals: u8,
    /// BIP32 path. Solana derives from the raw seed and carries `None`.
    pub derivation_path: Option<&'static str>,
    pub evm_chain_id: Option<u64>,
    pub bech32_prefix: Option<&'static str>,
    /// Cosmos bank denom of the native asset.
    pub native_denom: Option<&'static str>,
    /// Default endpoint tiers, highest priority first.
    pub endpoints: &'static [&'static str],
    pub tokens: &'static [TokenDescriptor],
    pub enabled: bool,
}

impl ChainDescriptor {
    pub fn token(&self, symbol: &str) -> Option<&'static TokenDescriptor> {
        self.tokens
            .iter()
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
    }
}

static CHAINS: &[ChainDescriptor] = &[
    ChainDescriptor {
        id: "ethereum",
        name: "Ethereum",
        family: ChainFamily::Evm,
        native_symbol: "ETH",
        decimals: 18,
        derivation_path: Some("m/44'/60'/0'/0/0"),
        evm_chain_id: Some(1),
        bech32_prefix: None,
        native_denom: None,
        endpoints: &[
            "https://eth.llamarpc.com",
            "https://rpc.ankr.com/eth",
            "https://ethereum-rpc.publicnode.com",
        ],
        tokens: &[
            TokenDescriptor {
                symbol: "USDT",
                locator: TokenLocator::Erc20("0xdAC17F958D2ee523a2206206994597C13D831ec7"),
                decimals: 6,
            },
            TokenDescriptor {
                symbol: "USDC",
                locator: TokenLocator::Erc20("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
                decimals: 6,
            },
        ],
        enabled: true,
    },
    ChainDescriptor {
        id: "bsc",
        name: "BNB Smart Chain",
        family: ChainFamily::Evm,
        native_symbol: "BNB",
        decimals: 18,
        derivation_path: Some("m/44'/60'/0'/0/0"),
        evm_chain_id: Some(56),
        bech32_prefix: None,
        native_denom: None,
        endpoints: &[
            "https://bsc-dataseed.binance.org",
            "https://rpc.ankr.com/bsc",
            "https://bsc-rpc.publicnode.com",
        ],
        tokens: &[TokenDescriptor {
            symbol: "USDT",
            locator: TokenLocator::Erc20("0x55d398326f99059fF775485246999027B3197955"),
            decimals: 18,
        }],
        enabled: true,
    },
    ChainDescriptor {
        id: "polygon",
        name: "Polygon PoS",
        family: ChainFamily::Evm,
        native_symbol: "POL",
        decimals: 18,
        derivation_path: Some("m/44'/60'/0'/0/0"),
        evm_chain_id: Some(137),
        bech32_prefix: None,
        native_denom: None,
        endpoints: &[
            "https://polygon-rpc.com",
            "https://rpc.ankr.com/polygon",
            "https://polygon-bor-rpc.publicnode.com",
        ],
        tokens: &[TokenDescriptor {
            symbol: "USDT",
            locator: TokenLocator::Erc20("0xc2132D05D31c914a87C6611C10748AEb04B58e8F"),
            decimals: 6,
        }],
        enabled: true,
    },
    ChainDescriptor {
        id: "arbitrum",
        name: "Arbitrum One",
        family: ChainFamily::Evm,
        native_symbol: "ETH",
        decimals: 18,
        derivation_path: Some("m/44'/60'/0'/0/0"),
        evm_chain_id: Some(42161),
        bech32_prefix: None,
        native_denom: None,
        endpoints: &[
            "https://arb1.arbitrum.io/rpc",
            "https://rpc.ankr.com/arbitrum",
            "https://arbitrum-one-rpc.publicnode.com",
        ],
        tokens: &[TokenDescriptor {
            symbol: "USDC",
            locator: TokenLocator::Erc20("0xaf88d065e77c8cC2239327C5EDb3A432268e5831"),
            decimals: 6,
        }],
        enabled: true,
    },
    ChainDescriptor {
        id: "sepolia",
        name: "Ethereum Sepolia",
        family: ChainFamily::Evm,
        native_symbol: "ETH",
        decimals: 18,
        derivation_path: Some("m/44'/60'/0'/0/0"),
        evm_chain_id: Some(11155111),
        bech32_prefix: None,
        native_denom: None,
        endpoints: &[
            "https://ethereum-sepolia-rpc.publicnode.com",
            "https://rpc.sepolia.org",
        ],
        tokens: &[],
        enabled: false,
    },
    ChainDescriptor {
        id: "bitcoin",
        name: "Bitcoin",
        family: ChainFamily::Utxo,
        native_symbol: "BTC",
        decimals: 8,
        derivation_path: Some("m/84'/0'/0'/0/0"),
        evm_chain_id: None,
        bech32_prefix: Some("bc"),
        native_denom: None,
        endpoints: &[
            "https://blockstream.info/api",
            "https://mempool.space/api",
        ],
        tokens: &[],
        enabled: true,
    },
    ChainDescriptor {
        id: "tron",
        name: "Tron",
        family: ChainFamily::Tron,
        native_symbol: "TRX",
        decimals: 6,
        derivation_path: Some("m/44'/195'/0'/0/0"),
        evm_chain_id: None,
        bech32_prefix: None,
        native_denom: None,
        endpoints: &[
            "https://api.trongrid.io",
            "https://tron-rpc.publicnode.com",
            "https://api.tronstack.io",
        ],
        tokens: &[TokenDescriptor {
            symbol: "USDT",
            locator: TokenLocator::Trc20("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t"),
            decimals: 6,
        }],
        enabled: true,
    },
    ChainDescriptor {
        id: "solana",
        name: "Solana",
        family: ChainFamily::Solana,
        native_symbol: "SOL",
        decimals: 9,
        derivation_path: None,
        evm_chain_id: None,
        bech32_prefix: None,
        native_denom: None,
        endpoints: &[
            "https://api.mainnet-beta.solana.com",
            "https://solana-rpc.publicnode.com",
            "https://rpc.ankr.com/solana",
        ],
        tokens: &[TokenDescriptor {
            symbol: "USDC",
            locator: TokenLocator::SplMint("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"),
            decimals: 6,
        }],
        enabled: true,
    },
    ChainDescriptor {
        id: "cosmoshub",
        name: "Cosmos Hub",
        family: ChainFamily::CosmosBech32,
        native_symbol: "ATOM",
        decimals: 6,
        derivation_path: Some("m/44'/118'/0'/0/0"),
        evm_chain_id: None,
        bech32_prefix: Some("cosmos"),
        native_denom: Some("uatom"),
        endpoints: &[
            "https://cosmos-rest.publicnode.com",
            "https://rest.cosmos.directory/cosmoshub",
            "https://cosmos-api.polkachu.com",
        ],
        tokens: &[],
        enabled: true,
    },
    ChainDescriptor {
        id: "osmosis",
        name: "Osmosis",
        family: ChainFamily::CosmosBech32,
        native_symbol: "OSMO",
        decimals: 6,
        derivation_path: Some("m/44'/118'/0'/0/0"),
        evm_chain_id: None,
        bech32_prefix: Some("osmo"),
        native_denom: Some("uosmo"),
        endpoints: &[
            "https://osmosis-rest.publicnode.com",
            "https://rest.cosmos.directory/osmosis",
            "https://lcd.osmosis.zone",
        ],
        tokens: &[TokenDescriptor {
            symbol: "USDC",
            locator: TokenLocator::BankDenom(
                "ibc/498A0751C798A0D9A389AA3691123DADA57DAA4FE165D5C75894505B876BA6E4",
            ),
            decimals: 6,
        }],
        enabled: true,
    },
];

/// Ticker → CoinGecko id.
static PRICE_SOURCE_IDS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut map = HashMap::new();
    map.insert("ETH", "ethereum");
    map.insert("BNB", "binancecoin");
    map.insert("POL", "polygon-ecosystem-token");
    map.insert("MATIC", "matic-network");
    map.insert("BTC", "bitcoin");
    map.insert("TRX", "tron");
    map.insert("SOL", "solana");
    map.insert("ATOM", "cosmos");
    map.insert("OSMO", "osmosis");
    map.insert("USDT", "tether");
    map.insert("USDC", "usd-coin");
    map
});

/// Every known chain, enabled or not.
pub fn all_chains() -> &'static [ChainDescriptor] {
    CHAINS
}

pub fn enabled_chains() -> Vec<&'static ChainDescriptor> {
    CHAINS.iter().filter(|c| c.enabled).collect()
}

pub fn get_chain(chain_id: &str) -> Option<&'static ChainDescriptor> {
    CHAINS.iter().find(|c| c.id == chain_id)
}

pub fn family_of(chain_id: &str) -> Option<ChainFamily> {
    get_chain(chain_id).map(|c| c.family)
}

/// Canonical price-source id for a ticker (case-insensitive).
pub fn price_source_id(symbol: &str) -> Option<&'static str> {
    PRICE_SOURCE_IDS
        .get(symbol.to_ascii_uppercase().as_str())
        .copied()
}
